//! The remote test-management system, seen through the narrow interface the
//! synchronization core needs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Polarion                              │
//! │                                                               │
//! │  query_test_cases(query)   ───► Vec<WorkItemSummary>          │
//! │  query_requirements(query) ───► Vec<WorkItemSummary>          │
//! │  get_test_case / create_test_case / update_test_case          │
//! │  create_requirement        ───► WorkItemSummary               │
//! │  search_test_runs(query)   ───► Vec<TestRunSummary>           │
//! │  get_test_run / create_test_run / update_test_run             │
//! │  add_test_record(run, record)                                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records returned by `get_*`/`create_*` are local copies: callers mutate
//! them (steps, links, status, custom fields) and persist with the matching
//! `update_*` call.
//!
//! # Backends
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | In-memory | [`memory`] | Process-local store, used for dry runs and tests |
//! | Connector | [`connector`] | Shells out to an external bridge executable |
//!
//! # Error Handling
//!
//! All operations return [`PolarionResult<T>`]. Errors are split into
//! transient failures, which callers retry (see [`crate::retry`]), and
//! definitive ones, which are surfaced immediately.

pub mod connector;
pub mod memory;
pub mod model;

use async_trait::async_trait;

pub use connector::ConnectorPolarion;
pub use memory::InMemoryPolarion;
pub use model::{
    LinkedItem, RequirementFields, RunStatus, TestCaseFields, TestCaseRecord, TestCaseSnapshot,
    TestRecord, TestRunRecord, TestRunSummary, TestStep, VERIFIES, WorkItemSummary,
};

/// Result type for remote operations.
pub type PolarionResult<T> = Result<T, PolarionError>;

/// Errors returned by the remote system.
///
/// - **Transient**: `Connection`, `Timeout`, `CreateFailed`, `UpdateFailed`,
///   `Io`, `Other` - retried by the caller
/// - **Definitive**: `NotFound`, `Protocol` - retrying cannot help
#[derive(Debug, thiserror::Error)]
pub enum PolarionError {
    /// The service could not be reached or dropped the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The service did not answer in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The requested work item or test run does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The service rejected a create call.
    #[error("Failed to create {0}")]
    CreateFailed(String),

    /// The service rejected an update call.
    #[error("Failed to update {0}")]
    UpdateFailed(String),

    /// The backend answered with something that could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error talking to the backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific error not covered by other variants.
    #[error("Polarion error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PolarionError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, PolarionError::NotFound(_) | PolarionError::Protocol(_))
    }
}

/// Operations the synchronization core performs against the remote system.
///
/// Queries use the remote query language, e.g. `title:"rhsm.cli.tests.Foo"*`
/// for a title prefix match.
#[async_trait]
pub trait Polarion: Send + Sync {
    /// Query test cases; only `id` and `title` are populated.
    async fn query_test_cases(&self, query: &str) -> PolarionResult<Vec<WorkItemSummary>>;

    /// Query requirements; only `id` and `title` are populated.
    async fn query_requirements(&self, query: &str) -> PolarionResult<Vec<WorkItemSummary>>;

    /// Fetch a complete test case.
    async fn get_test_case(&self, id: &str) -> PolarionResult<TestCaseRecord>;

    /// Create a test case with the given metadata fields.
    async fn create_test_case(
        &self,
        project: &str,
        title: &str,
        description: &str,
        fields: &TestCaseFields,
    ) -> PolarionResult<TestCaseRecord>;

    /// Persist a (possibly modified) test case.
    async fn update_test_case(&self, test_case: &TestCaseRecord) -> PolarionResult<()>;

    /// Create a requirement.
    async fn create_requirement(
        &self,
        project: &str,
        title: &str,
        description: &str,
        fields: &RequirementFields,
    ) -> PolarionResult<WorkItemSummary>;

    /// Search test runs, oldest first by creation time.
    async fn search_test_runs(&self, query: &str) -> PolarionResult<Vec<TestRunSummary>>;

    /// Fetch a complete test run including its records.
    async fn get_test_run(&self, project: &str, id: &str) -> PolarionResult<TestRunRecord>;

    /// Create a test run from a template.
    async fn create_test_run(
        &self,
        project: &str,
        id: &str,
        template: &str,
    ) -> PolarionResult<TestRunRecord>;

    /// Persist status and custom fields of a test run.
    async fn update_test_run(&self, run: &TestRunRecord) -> PolarionResult<()>;

    /// Add one executed result to a test run.
    async fn add_test_record(&self, run_id: &str, record: &TestRecord) -> PolarionResult<()>;

    /// Backend name, for logging.
    fn name(&self) -> &str;
}
