//! Remote backend that shells out to an external connector executable.
//!
//! The connector bridges polarion-sync to the real service. It can be
//! written in any language; only the protocol below is fixed.
//!
//! # Protocol
//!
//! ```bash
//! connector <operation>
//! ```
//!
//! The request is a single JSON object written to stdin. The response is a
//! JSON envelope on the last `{`-prefixed line of stdout:
//!
//! ```json
//! {"ok": true, "data": [{"id": "RHEL6-1", "title": "pkg.Cls.test"}]}
//! {"ok": false, "kind": "not_found", "error": "no such test case"}
//! ```
//!
//! | `kind` | Error |
//! |--------|-------|
//! | `not_found` | [`PolarionError::NotFound`] |
//! | `timeout` | [`PolarionError::Timeout`] |
//! | `create_failed` | [`PolarionError::CreateFailed`] |
//! | `update_failed` | [`PolarionError::UpdateFailed`] |
//! | anything else | [`PolarionError::Connection`] |
//!
//! # Operations
//!
//! | Operation | Request | `data` |
//! |-----------|---------|--------|
//! | `query_test_cases` | `{query}` | `[WorkItemSummary]` |
//! | `query_requirements` | `{query}` | `[WorkItemSummary]` |
//! | `get_test_case` | `{id}` | `TestCaseRecord` |
//! | `create_test_case` | `{project, title, description, fields}` | `TestCaseRecord` |
//! | `update_test_case` | `TestCaseRecord` | `null` |
//! | `create_requirement` | `{project, title, description, fields}` | `WorkItemSummary` |
//! | `search_test_runs` | `{query}` | `[TestRunSummary]`, oldest first |
//! | `get_test_run` | `{project, id}` | `TestRunRecord` |
//! | `create_test_run` | `{project, id, template}` | `TestRunRecord` |
//! | `update_test_run` | `TestRunRecord` | `null` |
//! | `add_test_record` | `{run_id, record}` | `null` |
//!
//! # Example Connector (Python)
//! ```python
//! #!/usr/bin/env python3
//! import json, sys
//!
//! request = json.load(sys.stdin)
//! if sys.argv[1] == "query_test_cases":
//!     data = [{"id": tc.work_item_id, "title": tc.title}
//!             for tc in TestCase.query(request["query"], fields=["title"])]
//!     print(json.dumps({"ok": True, "data": data}))
//! ```

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::model::{
    RequirementFields, TestCaseFields, TestCaseRecord, TestRecord, TestRunRecord, TestRunSummary,
    WorkItemSummary,
};
use super::{Polarion, PolarionError, PolarionResult};
use crate::profiling::Timer;

/// Response envelope printed by a connector.
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    kind: Option<String>,
}

impl Envelope {
    fn into_result(self, operation: &str) -> PolarionResult<Value> {
        if self.ok {
            return Ok(self.data);
        }
        let message = self
            .error
            .unwrap_or_else(|| format!("{} failed", operation));
        Err(match self.kind.as_deref() {
            Some("not_found") => PolarionError::NotFound(message),
            Some("timeout") => PolarionError::Timeout(message),
            Some("create_failed") => PolarionError::CreateFailed(message),
            Some("update_failed") => PolarionError::UpdateFailed(message),
            _ => PolarionError::Connection(message),
        })
    }
}

/// A [`Polarion`] backend that runs an external command per operation.
pub struct ConnectorPolarion {
    /// The base command to run (e.g., "uv run connector.py")
    command: String,
    /// Working directory for the command
    working_dir: Option<PathBuf>,
    /// Timeout in seconds, per operation
    timeout_secs: u64,
}

impl ConnectorPolarion {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            timeout_secs: 300,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Split the command string into parts, respecting quotes.
    fn command_parts(&self) -> PolarionResult<Vec<String>> {
        let parts = shell_words::split(&self.command)
            .map_err(|e| PolarionError::Protocol(format!("Invalid connector command: {}", e)))?;
        if parts.is_empty() {
            return Err(PolarionError::Protocol(
                "Connector command is empty".to_string(),
            ));
        }
        Ok(parts)
    }

    /// Run one operation and decode its `data` payload.
    async fn call<T: DeserializeOwned>(&self, operation: &str, request: Value) -> PolarionResult<T> {
        let _timer = Timer::start(operation);

        let mut parts = self.command_parts()?;
        parts.push(operation.to_string());
        debug!("Running connector: {:?}", parts);

        let mut cmd = tokio::process::Command::new(&parts[0]);
        cmd.args(&parts[1..]);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            PolarionError::Connection(format!("Failed to run connector: {}", e))
        })?;

        let payload = serde_json::to_vec(&request)
            .map_err(|e| PolarionError::Protocol(format!("Failed to encode request: {}", e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            let written = async {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await
            }
            .await;
            // A connector may answer without reading its request.
            if let Err(e) = written {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
                debug!("Connector {} closed stdin early", operation);
            }
        }

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| PolarionError::Timeout(format!("{} timed out", operation)))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Connector {} exited with {}: {}", operation, output.status, stderr.trim());
        }

        // Look for the last line that looks like JSON
        let line = stdout
            .lines()
            .rev()
            .find(|line| line.trim().starts_with('{'))
            .ok_or_else(|| {
                PolarionError::Connection(format!("Connector {} produced no response", operation))
            })?;
        let envelope: Envelope = serde_json::from_str(line)
            .map_err(|e| PolarionError::Protocol(format!("Invalid response envelope: {}", e)))?;

        let data = envelope.into_result(operation)?;
        serde_json::from_value(data)
            .map_err(|e| PolarionError::Protocol(format!("Invalid {} payload: {}", operation, e)))
    }
}

#[async_trait]
impl Polarion for ConnectorPolarion {
    async fn query_test_cases(&self, query: &str) -> PolarionResult<Vec<WorkItemSummary>> {
        self.call("query_test_cases", json!({ "query": query })).await
    }

    async fn query_requirements(&self, query: &str) -> PolarionResult<Vec<WorkItemSummary>> {
        self.call("query_requirements", json!({ "query": query }))
            .await
    }

    async fn get_test_case(&self, id: &str) -> PolarionResult<TestCaseRecord> {
        self.call("get_test_case", json!({ "id": id })).await
    }

    async fn create_test_case(
        &self,
        project: &str,
        title: &str,
        description: &str,
        fields: &TestCaseFields,
    ) -> PolarionResult<TestCaseRecord> {
        let request = json!({
            "project": project,
            "title": title,
            "description": description,
            "fields": fields,
        });
        self.call("create_test_case", request).await
    }

    async fn update_test_case(&self, test_case: &TestCaseRecord) -> PolarionResult<()> {
        let request = serde_json::to_value(test_case)
            .map_err(|e| PolarionError::Protocol(e.to_string()))?;
        self.call::<Value>("update_test_case", request).await?;
        Ok(())
    }

    async fn create_requirement(
        &self,
        project: &str,
        title: &str,
        description: &str,
        fields: &RequirementFields,
    ) -> PolarionResult<WorkItemSummary> {
        let request = json!({
            "project": project,
            "title": title,
            "description": description,
            "fields": fields,
        });
        self.call("create_requirement", request).await
    }

    async fn search_test_runs(&self, query: &str) -> PolarionResult<Vec<TestRunSummary>> {
        self.call("search_test_runs", json!({ "query": query })).await
    }

    async fn get_test_run(&self, project: &str, id: &str) -> PolarionResult<TestRunRecord> {
        self.call("get_test_run", json!({ "project": project, "id": id }))
            .await
    }

    async fn create_test_run(
        &self,
        project: &str,
        id: &str,
        template: &str,
    ) -> PolarionResult<TestRunRecord> {
        let request = json!({ "project": project, "id": id, "template": template });
        self.call("create_test_run", request).await
    }

    async fn update_test_run(&self, run: &TestRunRecord) -> PolarionResult<()> {
        let request =
            serde_json::to_value(run).map_err(|e| PolarionError::Protocol(e.to_string()))?;
        self.call::<Value>("update_test_run", request).await?;
        Ok(())
    }

    async fn add_test_record(&self, run_id: &str, record: &TestRecord) -> PolarionResult<()> {
        let request = json!({ "run_id": run_id, "record": record });
        self.call::<Value>("add_test_record", request).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.command
    }
}
