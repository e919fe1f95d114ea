//! Turning a parsed report into reconciled test cases.
//!
//! ```text
//!   Report
//!     │ suites()
//!     ▼
//!   Suite ── Test ──► RequirementResolver::resolve("<req prefix><test name>")
//!               │
//!               └── Class ── TestMethod, TestMethod, ...
//!                               │  skip is-config
//!                               │  merge contiguous same-name invocations
//!                               ▼
//!                        ReconciledTestCase (Unbound)
//! ```
//!
//! The transformer only reads the report and resolves requirements. Binding
//! each test case to a remote test case is left to the
//! [`Exporter`](crate::exporter::Exporter), which drives the
//! [`TestCaseMatcher`] owned here.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::info;

use crate::config::Config;
use crate::error::SyncResult;
use crate::matcher::TestCaseMatcher;
use crate::naming::{base_testrun_id, requirement_title};
use crate::polarion::Polarion;
use crate::report::{Report, ReportReader, Suite};
use crate::requirement::RequirementResolver;
use crate::testcase::ReconciledTestCase;

/// Reconciled test cases per suite name, suites and test cases in report
/// order.
pub type SuiteMap = IndexMap<String, Vec<ReconciledTestCase>>;

/// Builds [`ReconciledTestCase`]s from a report.
pub struct Transformer<'a, P: ?Sized> {
    config: &'a Config,
    polarion: Arc<P>,
    matcher: TestCaseMatcher<P>,
    requirements: RequirementResolver<P>,
}

impl<'a, P> Transformer<'a, P>
where
    P: Polarion + ?Sized,
{
    /// Create a transformer, priming the test-case cache with the configured
    /// `testcases.queries`.
    pub async fn new(config: &'a Config, polarion: Arc<P>) -> SyncResult<Self> {
        let mut matcher = TestCaseMatcher::new(polarion.clone(), &config.testcases.prefix);
        let primed = matcher.prime(&config.testcases.queries).await?;
        if matcher.is_primed() {
            info!(
                "Cached {} test cases from {} queries",
                primed,
                config.testcases.queries.len()
            );
        }

        let requirements = RequirementResolver::new(
            polarion.clone(),
            &config.polarion.project_id,
            config.requirement_policy(),
        );

        Ok(Self {
            config,
            polarion,
            matcher,
            requirements,
        })
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn polarion(&self) -> &Arc<P> {
        &self.polarion
    }

    pub fn matcher_mut(&mut self) -> &mut TestCaseMatcher<P> {
        &mut self.matcher
    }

    /// Read the configured report and parse every suite in it.
    pub async fn transform(&mut self) -> SyncResult<SuiteMap> {
        let report = ReportReader::new(&self.config.report.result_path)
            .read()
            .await?;
        self.parse_suite(&report).await
    }

    /// Parse every suite of `report`.
    ///
    /// Suites sharing a name are collected under one entry, at the position
    /// of the first of them.
    pub async fn parse_suite(&mut self, report: &Report) -> SyncResult<SuiteMap> {
        let mut suites = SuiteMap::new();
        for suite in report.suites() {
            let suite = suite?;
            info!("Getting tests from suite {}...", suite.name);
            let tests = self.parse_tests(&suite).await?;
            suites.entry(suite.name).or_default().extend(tests);
        }
        info!("End parsing of xml results file");
        Ok(suites)
    }

    async fn parse_tests(&mut self, suite: &Suite) -> SyncResult<Vec<ReconciledTestCase>> {
        let config = self.config;
        let project = config.polarion.project_id.as_str();
        let prefix = config.testcases.prefix.as_str();
        let mut cases: Vec<ReconciledTestCase> = Vec::new();

        for test in &suite.tests {
            let title = requirement_title(&config.requirements.prefix, &test.name);
            let requirement = self.requirements.resolve(&title).await?;

            for class in &test.classes {
                // Index into `cases` of the test case the previous method built.
                let mut current: Option<usize> = None;
                let mut iteration = 1;

                for method in class.methods.iter().filter(|m| !m.is_config) {
                    let merge = current.filter(|&i| cases[i].method_name() == method.name);
                    if merge.is_none() {
                        iteration = 1;
                    }
                    info!(
                        "\tIteration {}: parsing {}.{} {}",
                        iteration,
                        class.name,
                        method.name,
                        method.started_at.as_deref().unwrap_or_default()
                    );
                    iteration += 1;

                    match merge {
                        Some(i) => cases[i].add_invocation(method),
                        None => {
                            cases.push(ReconciledTestCase::new(
                                project,
                                prefix,
                                &test.name,
                                &class.name,
                                method,
                                requirement.clone(),
                            ));
                            current = Some(cases.len() - 1);
                        }
                    }
                }
            }
        }
        Ok(cases)
    }

    /// Run id base for `suite_name`: the configured base, or one derived from
    /// the suite name and the configured prefix and suffix.
    pub fn base_testrun_id(&self, suite_name: &str) -> String {
        match &self.config.testrun.base {
            Some(base) => base.clone(),
            None => base_testrun_id(
                &self.config.testrun.prefix,
                suite_name,
                &self.config.testrun.suffix,
            ),
        }
    }
}
