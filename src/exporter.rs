//! Pushing reconciled test cases and their results upstream.
//!
//! # Export Flow
//!
//! 1. **Collect**: parse the report with the [`Transformer`], drop test cases
//!    whose overall status is SKIP, then match or create, link and persist the
//!    remote test case of every remaining one.
//! 2. **Record**: depending on configuration, either
//!    - create one new test run per suite (`<base> <n+1>`) and add a result
//!      record for every test case, or
//!    - add records to an existing run for test cases not already in it, or
//!    - stop after collecting (`generate_only`).

use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::naming::{next_testrun_id, phrase_query, run_number};
use crate::polarion::{Polarion, RunStatus, TestRunRecord, TestRunSummary};
use crate::report::Report;
use crate::result::Status;
use crate::retry::retry;
use crate::transformer::{SuiteMap, Transformer};

/// What an export did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Number of suites in the report.
    pub suites: usize,
    /// Test cases matched or created remotely.
    pub test_cases: usize,
    /// Test cases left out because their overall status is SKIP.
    pub skipped: usize,
    /// Result records added to test runs.
    pub records: usize,
    /// Ids of the test runs created or updated.
    pub runs: Vec<String>,
}

/// The most recently created run whose id is `"{base} <n>"`.
///
/// The phrase search also returns runs that merely contain `base`; those are
/// dropped.
pub async fn latest_test_run<P>(polarion: &P, base: &str) -> SyncResult<Option<TestRunSummary>>
where
    P: Polarion + ?Sized,
{
    let query = phrase_query(base);
    let runs = retry("search test runs", || polarion.search_test_runs(&query)).await?;
    Ok(runs
        .into_iter()
        .rev()
        .find(|run| run_number(base, &run.id).is_some()))
}

/// Reconciles test cases and records their results in test runs.
pub struct Exporter<'a, P: ?Sized> {
    transformer: Transformer<'a, P>,
    tests: SuiteMap,
    skipped: usize,
}

impl<'a, P> Exporter<'a, P>
where
    P: Polarion + ?Sized,
{
    pub fn new(transformer: Transformer<'a, P>) -> Self {
        Self {
            transformer,
            tests: SuiteMap::new(),
            skipped: 0,
        }
    }

    /// Reconciled test cases per suite, as of the last collect.
    pub fn tests(&self) -> &SuiteMap {
        &self.tests
    }

    /// Read the configured report and reconcile every test in it.
    pub async fn collect(&mut self) -> SyncResult<&SuiteMap> {
        let suites = self.transformer.transform().await?;
        self.reconcile(suites).await
    }

    /// Reconcile every test in an already loaded report.
    pub async fn collect_report(&mut self, report: &Report) -> SyncResult<&SuiteMap> {
        let suites = self.transformer.parse_suite(report).await?;
        self.reconcile(suites).await
    }

    async fn reconcile(&mut self, suites: SuiteMap) -> SyncResult<&SuiteMap> {
        let polarion = self.transformer.polarion().clone();
        self.tests.clear();
        self.skipped = 0;

        for (suite, cases) in suites {
            let total = cases.len();
            let (mut not_skipped, skipped): (Vec<_>, Vec<_>) = cases
                .into_iter()
                .partition(|tc| tc.status() != Status::Skip);
            for tc in &skipped {
                debug!("Not reconciling {} due to status of SKIP", tc.title());
            }
            self.skipped += skipped.len();

            let last = not_skipped.len().saturating_sub(1);
            for (i, tc) in not_skipped.iter_mut().enumerate() {
                info!("Getting TestCase: {} out of {}", i, last);
                let existing = self
                    .transformer
                    .matcher_mut()
                    .lookup(tc.class_name(), tc.method_name())
                    .await?;
                tc.reconcile(&*polarion, existing.as_ref()).await?;
            }

            info!(
                "Reconciled {} of {} test cases in suite {}",
                not_skipped.len(),
                total,
                suite
            );
            self.tests.insert(suite, not_skipped);
        }
        Ok(&self.tests)
    }

    /// Create one new test run per suite and record every result in it.
    ///
    /// `base` overrides the run id base derived from each suite name.
    /// Returns the ids of the created runs and the number of records added.
    pub async fn create_test_run(
        &self,
        template: &str,
        base: Option<&str>,
        runner: &str,
    ) -> SyncResult<(Vec<String>, usize)> {
        let config = self.transformer.config();
        let polarion = self.transformer.polarion();
        let project = config.polarion.project_id.as_str();
        let mut created = Vec::new();
        let mut records = 0;

        for (suite, cases) in &self.tests {
            let base = match base {
                Some(base) => base.to_string(),
                None => self.transformer.base_testrun_id(suite),
            };
            let latest = self.latest_test_run(&base).await?;
            let id = next_testrun_id(&base, latest.as_ref().map(|run| run.id.as_str()));
            info!("Creating new Test Run ID: {}", id);

            let mut run = retry("create test run", || {
                polarion.create_test_run(project, &id, template)
            })
            .await?;
            run.status = RunStatus::InProgress;
            run.set_custom_field("arch", &config.distro.arch);
            run.set_custom_field("variant", &config.distro.variant);
            retry("update test run", || polarion.update_test_run(&run)).await?;

            for tc in cases {
                if tc.create_test_record(&**polarion, &run.id, runner).await? {
                    records += 1;
                }
            }

            info!("Created test run for {}", id);
            run.status = RunStatus::Finished;
            retry("update test run", || polarion.update_test_run(&run)).await?;
            created.push(run.id);
        }
        Ok((created, records))
    }

    /// Add records to `run` for every test case not already in it.
    ///
    /// Returns the number of records added.
    pub async fn update_test_run(&self, run: &TestRunRecord, runner: &str) -> SyncResult<usize> {
        let polarion = self.transformer.polarion();
        let mut records = 0;
        for tc in self.tests.values().flatten() {
            let id = tc
                .test_case_id()
                .ok_or_else(|| SyncError::Unbound(tc.title()))?;
            if run.contains_test_case(id) {
                debug!("{} already has a record in {}", id, run.id);
                continue;
            }
            if tc.create_test_record(&**polarion, &run.id, runner).await? {
                records += 1;
            }
        }
        Ok(records)
    }

    /// The most recently created run whose id matches `base`.
    pub async fn latest_test_run(&self, base: &str) -> SyncResult<Option<TestRunSummary>> {
        latest_test_run(&**self.transformer.polarion(), base).await
    }

    /// Fetch the run identified by `id`.
    ///
    /// An exact id match is preferred over the first search result.
    pub async fn get_test_run(&self, id: &str) -> SyncResult<TestRunRecord> {
        let polarion = self.transformer.polarion();
        let project = self.transformer.config().polarion.project_id.as_str();
        let query = phrase_query(id);
        let runs = retry("search test runs", || polarion.search_test_runs(&query)).await?;
        let summary = runs
            .iter()
            .find(|run| run.id == id)
            .or_else(|| runs.first())
            .ok_or_else(|| SyncError::MissingRun(id.to_string()))?;
        let run = retry("get test run", || polarion.get_test_run(project, &summary.id)).await?;
        Ok(run)
    }

    /// Collect, then record results as configured.
    pub async fn export(&mut self) -> SyncResult<ExportSummary> {
        self.collect().await?;
        self.record().await
    }

    /// Record results of the already collected test cases as configured.
    pub async fn record(&self) -> SyncResult<ExportSummary> {
        let config = self.transformer.config();
        let mut summary = ExportSummary {
            suites: self.tests.len(),
            test_cases: self.tests.values().map(Vec::len).sum(),
            skipped: self.skipped,
            ..Default::default()
        };

        if config.generate_only {
            info!("Generate-only mode: no test run created");
            return Ok(summary);
        }

        let runner = config.testrun.runner.as_str();
        match &config.testrun.update_run {
            Some(id) => {
                let run = self.get_test_run(id).await?;
                info!("Updating test run {}", run.id);
                summary.records = self.update_test_run(&run, runner).await?;
                summary.runs.push(run.id);
            }
            None => {
                let (runs, records) = self
                    .create_test_run(&config.testrun.template, None, runner)
                    .await?;
                summary.runs = runs;
                summary.records = records;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::polarion::memory::Operation;
    use crate::polarion::{InMemoryPolarion, VERIFIES};
    use crate::result::RecordResult;

    const DATA_PROVIDER_REPORT: &str = r#"<testng-results>
  <suite name="S">
    <test name="GroupA">
      <class name="pkg.Cls">
        <test-method status="PASS" name="dataTest" duration-ms="1000" started-at="2016-01-01T00:00:00Z" data-provider="dp">
          <params><param index="0"><value><![CDATA[1]]></value></param></params>
        </test-method>
        <test-method status="PASS" name="dataTest" duration-ms="250" started-at="2016-01-01T00:00:02Z" data-provider="dp">
          <params><param index="0"><value><![CDATA[2]]></value></param></params>
        </test-method>
      </class>
    </test>
  </suite>
</testng-results>
"#;

    const SKIP_REPORT: &str = r#"<testng-results>
  <suite name="S">
    <test name="GroupA">
      <class name="pkg.Cls">
        <test-method status="SKIP" name="blocked" duration-ms="0" started-at="2016-01-01T00:00:00Z"/>
        <test-method status="PASS" name="works" duration-ms="10" started-at="2016-01-01T00:00:01Z"/>
      </class>
    </test>
  </suite>
</testng-results>
"#;

    fn config() -> Config {
        let mut config = Config::default();
        config.polarion.project_id = "RHEL6".into();
        config.testrun.template = "tmpl".into();
        config.distro.arch = "x86_64".into();
        config.distro.variant = "Server".into();
        config
    }

    async fn exporter<'a>(
        config: &'a Config,
        polarion: &Arc<InMemoryPolarion>,
        xml: &str,
    ) -> Exporter<'a, InMemoryPolarion> {
        let transformer = Transformer::new(config, polarion.clone()).await.unwrap();
        let mut exporter = Exporter::new(transformer);
        let report = Report::parse_str(xml).unwrap();
        exporter.collect_report(&report).await.unwrap();
        exporter
    }

    #[tokio::test]
    async fn test_end_to_end_data_provider() {
        let config = config();
        let polarion = Arc::new(InMemoryPolarion::new("RHEL6"));
        let exporter = exporter(&config, &polarion, DATA_PROVIDER_REPORT).await;

        let cases = &exporter.tests()["S"];
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].title(), "pkg.Cls.dataTest");
        assert_eq!(cases[0].iterations().len(), 2);
        assert_eq!(cases[0].status(), Status::Pass);

        let summary = exporter.record().await.unwrap();
        assert_eq!(summary.test_cases, 1);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.runs, vec!["S 1"]);

        let requirements = polarion.requirements();
        assert_eq!(requirements.len(), 1);
        assert_eq!(requirements[0].title, "GroupA");

        let test_cases = polarion.test_cases();
        assert_eq!(test_cases.len(), 1);
        assert_eq!(test_cases[0].title, "pkg.Cls.dataTest");
        assert_eq!(test_cases[0].links_to(&requirements[0].id, VERIFIES), 1);
        assert_eq!(polarion.calls(Operation::CreateTestCase), 1);

        let runs = polarion.test_runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Finished);
        assert_eq!(runs[0].custom_fields["arch"], "x86_64");
        assert_eq!(runs[0].custom_fields["variant"], "Server");
        assert_eq!(runs[0].records.len(), 1);
        assert_eq!(runs[0].records[0].result, RecordResult::Passed);
        assert_eq!(runs[0].records[0].result.as_str(), "passed");
        assert!((runs[0].records[0].duration - 2.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_skipped_tests_are_never_recorded() {
        let config = config();
        let polarion = Arc::new(InMemoryPolarion::new("RHEL6"));
        let exporter = exporter(&config, &polarion, SKIP_REPORT).await;

        let cases = &exporter.tests()["S"];
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].method_name(), "works");

        let summary = exporter.record().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.records, 1);
        assert_eq!(polarion.calls(Operation::AddTestRecord), 1);
        assert!(
            polarion
                .test_cases()
                .iter()
                .all(|tc| tc.title != "pkg.Cls.blocked")
        );
    }

    #[tokio::test]
    async fn test_run_id_follows_latest() {
        let config = config();
        let polarion = Arc::new(
            InMemoryPolarion::new("RHEL6")
                .with_test_run("S 4", 100)
                .with_test_run("S 5", 10),
        );
        let exporter = exporter(&config, &polarion, DATA_PROVIDER_REPORT).await;

        assert_eq!(exporter.latest_test_run("S").await.unwrap().unwrap().id, "S 5");
        let (runs, _) = exporter.create_test_run("tmpl", None, "stoner").await.unwrap();
        assert_eq!(runs, vec!["S 6"]);

        let (runs, _) = exporter
            .create_test_run("tmpl", Some("Jenkins Run"), "jenkins")
            .await
            .unwrap();
        assert_eq!(runs, vec!["Jenkins Run 1"]);
        let run = exporter.get_test_run("Jenkins Run 1").await.unwrap();
        assert_eq!(run.records[0].executed_by, "jenkins");
    }

    #[tokio::test]
    async fn test_run_id_ignores_other_suites() {
        let config = config();
        let polarion = Arc::new(
            InMemoryPolarion::new("RHEL6")
                .with_test_run("A S 1", 10)
                .with_test_run("S nightly", 5),
        );
        let exporter = exporter(&config, &polarion, DATA_PROVIDER_REPORT).await;

        assert!(exporter.latest_test_run("S").await.unwrap().is_none());
        let (runs, _) = exporter.create_test_run("tmpl", None, "stoner").await.unwrap();
        assert_eq!(runs, vec!["S 1"]);
        assert_eq!(exporter.latest_test_run("S").await.unwrap().unwrap().id, "S 1");
    }

    #[tokio::test]
    async fn test_run_creation_retried() {
        let config = config();
        let polarion = Arc::new(InMemoryPolarion::new("RHEL6"));
        let exporter = exporter(&config, &polarion, DATA_PROVIDER_REPORT).await;

        polarion.fail_next(Operation::CreateTestRun, 2);
        let (runs, _) = exporter.create_test_run("tmpl", None, "stoner").await.unwrap();
        assert_eq!(runs, vec!["S 1"]);

        polarion.fail_next(Operation::CreateTestRun, 3);
        let err = exporter.create_test_run("tmpl", None, "stoner").await.unwrap_err();
        assert!(matches!(err, SyncError::Polarion(_)));
        assert_eq!(polarion.test_runs().len(), 1);
    }

    #[tokio::test]
    async fn test_update_run_adds_only_missing_records() {
        let config = config();
        let polarion = Arc::new(InMemoryPolarion::new("RHEL6"));
        let first = exporter(&config, &polarion, DATA_PROVIDER_REPORT).await;
        first.record().await.unwrap();

        let mut update = config.clone();
        update.testrun.update_run = Some("S 1".into());
        let second = exporter(&update, &polarion, DATA_PROVIDER_REPORT).await;
        let summary = second.record().await.unwrap();

        assert_eq!(summary.runs, vec!["S 1"]);
        assert_eq!(summary.records, 0);
        assert_eq!(polarion.calls(Operation::CreateTestCase), 1);
        assert_eq!(polarion.calls(Operation::CreateRequirement), 1);
        assert_eq!(polarion.test_runs()[0].records.len(), 1);
    }

    #[tokio::test]
    async fn test_update_of_missing_run() {
        let mut config = config();
        config.testrun.update_run = Some("Nightly 9".into());
        let polarion = Arc::new(InMemoryPolarion::new("RHEL6"));
        let exporter = exporter(&config, &polarion, DATA_PROVIDER_REPORT).await;

        let err = exporter.record().await.unwrap_err();
        assert!(matches!(err, SyncError::MissingRun(id) if id == "Nightly 9"));
    }

    #[tokio::test]
    async fn test_generate_only_creates_no_run() {
        let mut config = config();
        config.generate_only = true;
        let polarion = Arc::new(InMemoryPolarion::new("RHEL6"));
        let exporter = exporter(&config, &polarion, DATA_PROVIDER_REPORT).await;

        let summary = exporter.record().await.unwrap();
        assert!(summary.runs.is_empty());
        assert_eq!(summary.test_cases, 1);
        assert_eq!(polarion.test_cases().len(), 1);
        assert_eq!(polarion.calls(Operation::CreateTestRun), 0);
    }
}
