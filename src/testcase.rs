//! A logical test (`class.method`) reconciled against the remote system.
//!
//! # Lifecycle
//!
//! ```text
//!            ┌──► Matched ──┐
//! Unbound ───┤              ├──► Linked ──► Finalized
//!            └──► Created ──┘
//! ```
//!
//! - **Unbound**: built from the first `<test-method>` seen for its key;
//!   later contiguous invocations append iteration results.
//! - **Matched**: an existing remote test case was found. Unset metadata
//!   fields are back-filled and the step list is normalized to one step.
//! - **Created**: no match; a new test case was created with default fields.
//! - **Linked**: the requirement (if any) is linked with a `verifies` link,
//!   duplicate links pruned to one.
//! - **Finalized**: the remote test case has been persisted.

use std::sync::OnceLock;

use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::naming::class_method;
use crate::polarion::{
    Polarion, TestCaseFields, TestCaseRecord, TestCaseSnapshot, TestRecord, TestStep, VERIFIES,
    WorkItemSummary,
};
use crate::report::TestMethod;
use crate::result::{IterationResult, Status, arg_names, now_timestamp};
use crate::retry::retry;

/// Expected result recorded on every generated test step.
pub const EXPECTED_RESULT: &str = "PASS";

/// Separator between entries of a record comment.
const LINE_BREAK: &str = "<br>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unbound,
    Matched,
    Created,
    Linked,
    Finalized,
}

/// One logical test and everything needed to report it upstream.
#[derive(Debug, Clone)]
pub struct ReconciledTestCase {
    class_name: String,
    method_name: String,
    /// Attributes of the first invocation seen.
    first: TestMethod,
    iterations: Vec<IterationResult>,
    project: String,
    prefix: String,
    /// Name of the `<test>` grouping this test belongs to.
    group: String,
    requirement: Option<WorkItemSummary>,
    test_case: Option<TestCaseRecord>,
    lifecycle: Lifecycle,
    status: OnceLock<Status>,
}

impl ReconciledTestCase {
    pub fn new(
        project: impl Into<String>,
        prefix: impl Into<String>,
        group: impl Into<String>,
        class_name: impl Into<String>,
        method: &TestMethod,
        requirement: Option<WorkItemSummary>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method.name.clone(),
            first: method.clone(),
            iterations: method.iteration_result().into_iter().collect(),
            project: project.into(),
            prefix: prefix.into(),
            group: group.into(),
            requirement,
            test_case: None,
            lifecycle: Lifecycle::Unbound,
            status: OnceLock::new(),
        }
    }

    /// The `class.method` key.
    pub fn title(&self) -> String {
        class_method(&self.class_name, &self.method_name)
    }

    /// Title of the remote test case: the configured prefix plus the key.
    pub fn remote_title(&self) -> String {
        format!("{}{}", self.prefix, self.title())
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn description(&self) -> &str {
        self.first.description.as_deref().unwrap_or_default()
    }

    pub fn iterations(&self) -> &[IterationResult] {
        &self.iterations
    }

    pub fn requirement(&self) -> Option<&WorkItemSummary> {
        self.requirement.as_ref()
    }

    pub fn test_case(&self) -> Option<&TestCaseRecord> {
        self.test_case.as_ref()
    }

    pub fn test_case_id(&self) -> Option<&str> {
        self.test_case.as_ref().map(|tc| tc.id.as_str())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Merge another invocation of the same method.
    ///
    /// Invocations without a data provider carry no iteration result and are
    /// ignored.
    pub fn add_invocation(&mut self, method: &TestMethod) {
        if let Some(iteration) = method.iteration_result() {
            self.iterations.push(iteration);
            self.status.take();
        }
    }

    /// Overall status, computed once.
    ///
    /// FAIL if the first invocation failed or any iteration failed;
    /// otherwise the first invocation's status. SKIP is never escalated.
    pub fn status(&self) -> Status {
        *self.status.get_or_init(|| {
            debug!(
                "Checking {} iteration results of {}",
                self.iterations.len(),
                self.title()
            );
            let iteration_failed = self
                .iterations
                .iter()
                .any(|it| !matches!(it.status(), Status::Pass | Status::Skip));
            if iteration_failed {
                Status::Fail
            } else {
                self.first.status
            }
        })
    }

    /// The status is derived from the report and can not be assigned.
    pub fn override_status(&self, status: Status) -> SyncResult<()> {
        error!(
            "Can not set status of {}. Value of {} being ignored",
            self.title(),
            status
        );
        Err(SyncError::StatusOverride(self.title()))
    }

    /// Start timestamp and duration in seconds.
    ///
    /// With iterations, the run spans from the first iteration's start to the
    /// last one's start (in whole seconds), plus the last iteration's own
    /// duration. Without, the method's own attributes are used.
    pub fn timing(&self) -> (String, f64) {
        match (self.iterations.first(), self.iterations.last()) {
            (Some(first), Some(last)) => {
                let span = match (first.started_at(), last.started_at()) {
                    (Ok(start), Ok(finish)) => (finish - start).num_seconds().max(0),
                    _ => {
                        warn!("Unparseable iteration timestamps for {}", self.title());
                        0
                    }
                };
                (first.started().to_string(), span as f64 + last.duration())
            }
            _ => {
                let started = self
                    .first
                    .started_at
                    .clone()
                    .unwrap_or_else(now_timestamp);
                (started, self.first.duration_secs())
            }
        }
    }

    /// Per-iteration status and failure details, `<br>`-separated.
    pub fn comment(&self) -> String {
        self.iterations
            .iter()
            .enumerate()
            .map(|(i, it)| {
                let mut entry = format!("{} {}\t", i, it.status());
                if let Some(exc) = it.exception() {
                    entry.push_str(LINE_BREAK);
                    entry.push_str(&exc.message);
                    entry.push_str(LINE_BREAK);
                    entry.push_str(&exc.stack_trace);
                    entry.push_str(LINE_BREAK);
                }
                entry
            })
            .collect::<Vec<_>>()
            .join(LINE_BREAK)
    }

    /// The single step describing the parameters (`Arg0,Arg1,...`).
    pub fn test_step(&self) -> TestStep {
        let count = self.iterations.first().map_or(0, |it| it.params().len());
        TestStep {
            args: arg_names(count).join(","),
            expected_result: EXPECTED_RESULT.to_string(),
        }
    }

    /// Bind to `existing` (fetched and normalized) or create a new remote
    /// test case.
    pub async fn bind<P>(&mut self, polarion: &P, existing: Option<&WorkItemSummary>) -> SyncResult<()>
    where
        P: Polarion + ?Sized,
    {
        let title = self.remote_title();
        match existing {
            Some(summary) => {
                info!("Getting TestCase for {}: {}", title, self.description());
                let mut tc = retry("get test case", || polarion.get_test_case(&summary.id)).await?;

                let filled = tc.fields.backfill(&TestCaseFields::defaults());
                if filled > 0 {
                    debug!("Back-filled {} fields of {}", filled, tc.id);
                }
                if !tc.title.starts_with(&self.prefix) {
                    tc.title = format!("{}{}", self.prefix, tc.title);
                }
                // Several steps is the legacy one-row-per-iteration layout.
                if tc.steps().len() != 1 {
                    tc.set_steps(vec![self.test_step()]);
                }

                self.test_case = Some(tc);
                self.lifecycle = Lifecycle::Matched;
            }
            None => {
                info!("Generating new TestCase for {}: {}", title, self.description());
                let description = self.description();
                let fields = TestCaseFields::defaults();
                let mut tc = retry("create test case", || {
                    polarion.create_test_case(&self.project, &title, description, &fields)
                })
                .await?;
                if !self.iterations.is_empty() {
                    tc.set_steps(vec![self.test_step()]);
                }

                self.test_case = Some(tc);
                self.lifecycle = Lifecycle::Created;
            }
        }
        Ok(())
    }

    /// Link the requirement to the bound test case with exactly one
    /// `verifies` link.
    pub fn link(&mut self) -> SyncResult<()> {
        let title = self.title();
        let tc = self
            .test_case
            .as_mut()
            .ok_or_else(|| SyncError::Unbound(title))?;

        match &self.requirement {
            None => warn!("No requirement exists for test case {}", tc.id),
            Some(requirement) => {
                let links = tc.links_to(&requirement.id, VERIFIES);
                if links == 0 {
                    info!("Linking requirement {} to TestCase {}", requirement.id, tc.id);
                    tc.add_linked_item(&requirement.id, VERIFIES);
                } else if links > 1 {
                    warn!(
                        "Found duplicate linked Requirements {} for TestCase {}. Cleaning...",
                        requirement.id, tc.id
                    );
                    for _ in 1..links {
                        tc.remove_linked_item(&requirement.id, VERIFIES);
                    }
                } else {
                    info!("Requirement {} already linked to TestCase {}", requirement.id, tc.id);
                }
            }
        }

        self.lifecycle = Lifecycle::Linked;
        Ok(())
    }

    /// Persist the bound test case.
    pub async fn finalize<P>(&mut self, polarion: &P) -> SyncResult<()>
    where
        P: Polarion + ?Sized,
    {
        let tc = self
            .test_case
            .as_ref()
            .ok_or_else(|| SyncError::Unbound(self.title()))?;
        retry("update test case", || polarion.update_test_case(tc)).await?;
        self.lifecycle = Lifecycle::Finalized;
        Ok(())
    }

    /// Bind, link and finalize in one go.
    pub async fn reconcile<P>(&mut self, polarion: &P, existing: Option<&WorkItemSummary>) -> SyncResult<()>
    where
        P: Polarion + ?Sized,
    {
        self.bind(polarion, existing).await?;
        self.link()?;
        self.finalize(polarion).await
    }

    /// The result record for this test, or `None` for skipped tests.
    pub fn to_record(&self, runner: &str) -> SyncResult<Option<TestRecord>> {
        let test_case_id = self
            .test_case_id()
            .ok_or_else(|| SyncError::Unbound(self.title()))?;

        let status = self.status();
        if status == Status::Skip {
            info!("Skipping TestRecord for {} due to status of SKIP", test_case_id);
            return Ok(None);
        }

        let (executed, duration) = self.timing();
        Ok(Some(TestRecord {
            test_case_id: test_case_id.to_string(),
            result: status.to_record_result(),
            comment: self.comment(),
            executed,
            duration,
            executed_by: runner.to_string(),
        }))
    }

    /// Add this test's result to a run. Returns whether a record was added.
    pub async fn create_test_record<P>(&self, polarion: &P, run_id: &str, runner: &str) -> SyncResult<bool>
    where
        P: Polarion + ?Sized,
    {
        let Some(record) = self.to_record(runner)? else {
            return Ok(false);
        };
        info!("Creating TestRecord for {}", self.title());
        retry("add test record", || polarion.add_test_record(run_id, &record)).await?;
        Ok(true)
    }

    /// Printable view of the bound test case.
    pub fn snapshot(&self) -> Option<TestCaseSnapshot> {
        self.test_case.as_ref().map(TestCaseSnapshot::from)
    }
}
