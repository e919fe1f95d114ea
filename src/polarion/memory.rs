//! In-process remote backend.
//!
//! Keeps test cases, requirements and test runs in memory. Used by
//! `--dry-run` and by the test suite, which also relies on the call counters
//! and on [`InMemoryPolarion::fail_next`] to simulate transient faults.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use tracing::debug;

use super::model::{
    RequirementFields, RunStatus, TestCaseFields, TestCaseRecord, TestRecord, TestRunRecord,
    TestRunSummary, WorkItemSummary,
};
use super::{Polarion, PolarionError, PolarionResult};

/// Remote operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    QueryTestCases,
    QueryRequirements,
    GetTestCase,
    CreateTestCase,
    UpdateTestCase,
    CreateRequirement,
    SearchTestRuns,
    GetTestRun,
    CreateTestRun,
    UpdateTestRun,
    AddTestRecord,
}

#[derive(Debug, Default)]
struct Store {
    next_id: u64,
    test_cases: Vec<TestCaseRecord>,
    requirements: Vec<WorkItemSummary>,
    requirement_details: HashMap<String, (String, RequirementFields)>,
    runs: Vec<(TestRunSummary, TestRunRecord)>,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, usize>,
}

impl Store {
    fn next_id(&mut self, project: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", project, self.next_id)
    }

    /// Count the call and consume one injected failure, if any.
    fn enter(&mut self, op: Operation) -> PolarionResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(remaining) = self.failures.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(PolarionError::Connection(format!(
                "injected failure for {:?}",
                op
            )));
        }
        Ok(())
    }
}

/// A [`Polarion`] implementation backed by process memory.
#[derive(Debug)]
pub struct InMemoryPolarion {
    project: String,
    store: Mutex<Store>,
}

impl InMemoryPolarion {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            store: Mutex::new(Store::default()),
        }
    }

    /// Seed an existing test case.
    pub fn with_test_case(self, record: TestCaseRecord) -> Self {
        self.lock().test_cases.push(record);
        self
    }

    /// Seed an existing requirement.
    pub fn with_requirement(self, id: &str, title: &str) -> Self {
        self.lock()
            .requirements
            .push(WorkItemSummary::new(id, title));
        self
    }

    /// Seed an existing test run, created `age_secs` seconds before now.
    pub fn with_test_run(self, id: &str, age_secs: i64) -> Self {
        let created = Utc::now() - Duration::seconds(age_secs);
        self.insert_run(id, &timestamp(created), String::new());
        self
    }

    /// Make the next `count` calls of `op` fail with a transient error.
    pub fn fail_next(&self, op: Operation, count: usize) {
        self.lock().failures.insert(op, count);
    }

    /// Number of times `op` has been called, failed calls included.
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn test_cases(&self) -> Vec<TestCaseRecord> {
        self.lock().test_cases.clone()
    }

    pub fn requirements(&self) -> Vec<WorkItemSummary> {
        self.lock().requirements.clone()
    }

    /// Fields a requirement was created with. Seeded requirements have none.
    pub fn requirement_fields(&self, id: &str) -> Option<RequirementFields> {
        self.lock()
            .requirement_details
            .get(id)
            .map(|(_, fields)| fields.clone())
    }

    pub fn requirement_description(&self, id: &str) -> Option<String> {
        self.lock()
            .requirement_details
            .get(id)
            .map(|(description, _)| description.clone())
    }

    pub fn test_runs(&self) -> Vec<TestRunRecord> {
        self.lock().runs.iter().map(|(_, run)| run.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // A poisoned store only means a test panicked mid-call; the data is
        // still consistent enough to inspect.
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert_run(&self, id: &str, created: &str, template: String) -> TestRunRecord {
        let run = TestRunRecord {
            id: id.to_string(),
            project: self.project.clone(),
            template,
            status: RunStatus::NotRun,
            custom_fields: Default::default(),
            records: Vec::new(),
        };
        let summary = TestRunSummary {
            id: id.to_string(),
            created: created.to_string(),
            status: RunStatus::NotRun,
        };
        self.lock().runs.push((summary, run.clone()));
        run
    }
}

/// Fixed-width RFC 3339, so creation times sort as strings.
fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Match a title against a query like `title:"pkg.Cls*"` or `"pkg.Cls"`.
///
/// A trailing `*` means prefix match; otherwise the text must be contained.
fn query_matches(query: &str, value: &str) -> bool {
    let mut text = query.trim();
    for field in ["title:", "id:"] {
        if let Some(rest) = text.strip_prefix(field) {
            text = rest;
        }
    }
    // Both `"pkg.Cls"*` and `"pkg.Cls*"` are prefix queries.
    let wildcard = text.trim_matches('"').ends_with('*');
    let text = text.trim_matches(|c| c == '"' || c == '*');
    if wildcard {
        value.starts_with(text)
    } else {
        value.contains(text)
    }
}

#[async_trait]
impl Polarion for InMemoryPolarion {
    async fn query_test_cases(&self, query: &str) -> PolarionResult<Vec<WorkItemSummary>> {
        let mut store = self.lock();
        store.enter(Operation::QueryTestCases)?;
        Ok(store
            .test_cases
            .iter()
            .filter(|tc| query_matches(query, &tc.title))
            .map(|tc| WorkItemSummary::new(&tc.id, &tc.title))
            .collect())
    }

    async fn query_requirements(&self, query: &str) -> PolarionResult<Vec<WorkItemSummary>> {
        let mut store = self.lock();
        store.enter(Operation::QueryRequirements)?;
        Ok(store
            .requirements
            .iter()
            .filter(|r| query_matches(query, &r.title))
            .cloned()
            .collect())
    }

    async fn get_test_case(&self, id: &str) -> PolarionResult<TestCaseRecord> {
        let mut store = self.lock();
        store.enter(Operation::GetTestCase)?;
        store
            .test_cases
            .iter()
            .find(|tc| tc.id == id)
            .cloned()
            .ok_or_else(|| PolarionError::NotFound(format!("test case {}", id)))
    }

    async fn create_test_case(
        &self,
        project: &str,
        title: &str,
        description: &str,
        fields: &TestCaseFields,
    ) -> PolarionResult<TestCaseRecord> {
        let mut store = self.lock();
        store.enter(Operation::CreateTestCase)?;
        let record = TestCaseRecord {
            id: store.next_id(project),
            project: project.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            fields: fields.clone(),
            steps: Vec::new(),
            linked_items: Vec::new(),
        };
        debug!("Created test case {} ({})", record.id, title);
        store.test_cases.push(record.clone());
        Ok(record)
    }

    async fn update_test_case(&self, test_case: &TestCaseRecord) -> PolarionResult<()> {
        let mut store = self.lock();
        store.enter(Operation::UpdateTestCase)?;
        let existing = store
            .test_cases
            .iter_mut()
            .find(|tc| tc.id == test_case.id)
            .ok_or_else(|| PolarionError::NotFound(format!("test case {}", test_case.id)))?;
        *existing = test_case.clone();
        Ok(())
    }

    async fn create_requirement(
        &self,
        project: &str,
        title: &str,
        description: &str,
        fields: &RequirementFields,
    ) -> PolarionResult<WorkItemSummary> {
        let mut store = self.lock();
        store.enter(Operation::CreateRequirement)?;
        let id = store.next_id(project);
        let summary = WorkItemSummary::new(id, title);
        debug!("Created requirement {} ({})", summary.id, title);
        store
            .requirement_details
            .insert(summary.id.clone(), (description.to_string(), fields.clone()));
        store.requirements.push(summary.clone());
        Ok(summary)
    }

    async fn search_test_runs(&self, query: &str) -> PolarionResult<Vec<TestRunSummary>> {
        let mut store = self.lock();
        store.enter(Operation::SearchTestRuns)?;
        let mut found: Vec<TestRunSummary> = store
            .runs
            .iter()
            .filter(|(summary, _)| query_matches(query, &summary.id))
            .map(|(summary, run)| TestRunSummary {
                status: run.status,
                ..summary.clone()
            })
            .collect();
        // Stable: runs created within the same millisecond keep insertion order.
        found.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(found)
    }

    async fn get_test_run(&self, project: &str, id: &str) -> PolarionResult<TestRunRecord> {
        let mut store = self.lock();
        store.enter(Operation::GetTestRun)?;
        store
            .runs
            .iter()
            .map(|(_, run)| run)
            .find(|run| run.id == id && run.project == project)
            .cloned()
            .ok_or_else(|| PolarionError::NotFound(format!("test run {}", id)))
    }

    async fn create_test_run(
        &self,
        project: &str,
        id: &str,
        template: &str,
    ) -> PolarionResult<TestRunRecord> {
        {
            let mut store = self.lock();
            store.enter(Operation::CreateTestRun)?;
            if store.runs.iter().any(|(s, _)| s.id == id) {
                return Err(PolarionError::CreateFailed(format!(
                    "test run {} already exists",
                    id
                )));
            }
            if project != self.project {
                return Err(PolarionError::NotFound(format!("project {}", project)));
            }
        }
        Ok(self.insert_run(id, &timestamp(Utc::now()), template.to_string()))
    }

    async fn update_test_run(&self, run: &TestRunRecord) -> PolarionResult<()> {
        let mut store = self.lock();
        store.enter(Operation::UpdateTestRun)?;
        let (summary, existing) = store
            .runs
            .iter_mut()
            .find(|(s, _)| s.id == run.id)
            .ok_or_else(|| PolarionError::NotFound(format!("test run {}", run.id)))?;
        summary.status = run.status;
        existing.status = run.status;
        existing.custom_fields = run.custom_fields.clone();
        Ok(())
    }

    async fn add_test_record(&self, run_id: &str, record: &TestRecord) -> PolarionResult<()> {
        let mut store = self.lock();
        store.enter(Operation::AddTestRecord)?;
        let (_, run) = store
            .runs
            .iter_mut()
            .find(|(s, _)| s.id == run_id)
            .ok_or_else(|| PolarionError::NotFound(format!("test run {}", run_id)))?;
        run.records.push(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
