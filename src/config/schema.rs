//! Configuration schema definitions for polarion-sync.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── generate_only          - Sync test cases only, create no test run
//! ├── PolarionConfig         - Project and remote backend settings
//! ├── ReportConfig           - Where the TestNG report comes from
//! ├── TestRunConfig          - Test-run template, naming and runner
//! ├── TestCasesConfig        - Title prefix and cache-priming queries
//! ├── RequirementsConfig     - Requirement naming, lookup and creation policy
//! └── DistroConfig           - Custom fields stored on the test run
//! ```

use serde::{Deserialize, Serialize};

use crate::naming::title_query;
use crate::requirement::RequirementPolicy;

/// Root configuration structure for polarion-sync.
///
/// # TOML Structure
///
/// ```toml
/// generate_only = false
///
/// [polarion]
/// project_id = "RHEL6"
/// connector = "python3 polarion_connector.py"
///
/// [report]
/// result_path = "test-output/testng-results.xml"
///
/// [testrun]
/// template = "sean toner template"
/// prefix = "RHSM"
/// suffix = "x86_64"
///
/// [testcases]
/// prefix = "RHSM-TC : "
/// queries = ['title:"RHSM-TC : rhsm.cli*"']
///
/// [requirements]
/// prefix = "RHSM-REQ : "
///
/// [distro]
/// arch = "x86_64"
/// variant = "Server"
/// ```
///
/// # Example
///
/// ```
/// use polarion_sync::config::Config;
///
/// let config: Config = toml::from_str(r#"
///     [polarion]
///     project_id = "RHEL6"
///
///     [report]
///     result_path = "testng-results.xml"
///
///     [testrun]
///     template = "smoke template"
/// "#).unwrap();
/// assert_eq!(config.testrun.runner, "stoner");
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Create and update test cases and requirements, but no test run.
    ///
    /// Default: false
    #[serde(default)]
    pub generate_only: bool,

    #[serde(default)]
    pub polarion: PolarionConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub testrun: TestRunConfig,

    #[serde(default)]
    pub testcases: TestCasesConfig,

    #[serde(default)]
    pub requirements: RequirementsConfig,

    #[serde(default)]
    pub distro: DistroConfig,
}

impl Config {
    /// The query used to bulk-load requirements: the configured one, or a
    /// wildcard title query on the requirement prefix.
    pub fn requirements_query(&self) -> String {
        match &self.requirements.query {
            Some(query) => query.clone(),
            None => title_query(&crate::naming::sanitize(&self.requirements.prefix)),
        }
    }

    pub fn requirement_policy(&self) -> RequirementPolicy {
        RequirementPolicy {
            quick_query: self.requirements.quick_query,
            query: self.requirements_query(),
            create: self.requirements.create,
        }
    }
}

/// Project and remote backend settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `project_id` | empty (must be set) |
/// | `connector` | None |
/// | `timeout_secs` | 300 |
/// | `dry_run` | false |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolarionConfig {
    /// Remote project id (e.g. `RHEL6`).
    #[serde(default)]
    pub project_id: String,

    /// External connector command implementing the remote protocol.
    ///
    /// Required unless `dry_run` is set.
    pub connector: Option<String>,

    /// Timeout for one connector call, in seconds.
    ///
    /// Default: 300
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Run against an in-memory backend; nothing is sent anywhere.
    ///
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for PolarionConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            connector: None,
            timeout_secs: default_timeout_secs(),
            dry_run: false,
        }
    }
}

fn default_timeout_secs() -> u64 {
    300
}

/// Where the TestNG report comes from.
///
/// # Example
///
/// ```toml
/// [report]
/// result_path = "https://jenkins.example.com/job/rhsm/lastBuild/artifact/testng-results.xml"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Local path or `http(s)://` URL of `testng-results.xml`.
    #[serde(default)]
    pub result_path: String,
}

/// Test-run settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `template` | empty (must be set) |
/// | `prefix` | empty |
/// | `suffix` | empty |
/// | `base` | None (derived per suite) |
/// | `runner` | `stoner` |
/// | `update_run` | None |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestRunConfig {
    /// Template new test runs are created from.
    #[serde(default)]
    pub template: String,

    /// Prepended to the suite name when deriving run ids.
    #[serde(default)]
    pub prefix: String,

    /// Appended to the suite name when deriving run ids.
    #[serde(default)]
    pub suffix: String,

    /// Explicit run id base, used instead of the derived one.
    pub base: Option<String>,

    /// User id recorded as the executor of every result.
    #[serde(default = "default_runner")]
    pub runner: String,

    /// Add results to this existing run instead of creating a new one.
    pub update_run: Option<String>,
}

impl Default for TestRunConfig {
    fn default() -> Self {
        Self {
            template: String::new(),
            prefix: String::new(),
            suffix: String::new(),
            base: None,
            runner: default_runner(),
            update_run: None,
        }
    }
}

fn default_runner() -> String {
    "stoner".to_string()
}

/// Test-case settings.
///
/// `queries` prime the matcher cache: each is run once up front and its
/// results are filtered in memory for every class, instead of one live query
/// per class.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TestCasesConfig {
    /// Title prefix of every test case.
    #[serde(default)]
    pub prefix: String,

    /// Broad title queries used to prime the test-case cache.
    #[serde(default)]
    pub queries: Vec<String>,
}

/// Requirement settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `prefix` | empty |
/// | `query` | `title:"<prefix>*"` |
/// | `quick_query` | true |
/// | `create` | true |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequirementsConfig {
    /// Prepended to the `<test>` name to form the requirement title.
    #[serde(default)]
    pub prefix: String,

    /// Query bulk-loading existing requirements in quick mode.
    pub query: Option<String>,

    /// Match against one bulk-loaded list instead of querying per title.
    #[serde(default = "default_true")]
    pub quick_query: bool,

    /// Create requirements that do not exist yet.
    #[serde(default = "default_true")]
    pub create: bool,
}

impl Default for RequirementsConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            query: None,
            quick_query: true,
            create: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Distribution under test, stored as custom fields on new test runs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DistroConfig {
    #[serde(default)]
    pub arch: String,

    #[serde(default)]
    pub variant: String,
}
