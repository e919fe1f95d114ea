//! Execution results read from a TestNG report.
//!
//! A TestNG `<test-method>` element records one invocation of a test method.
//! Parameterized (data-provider) methods are invoked many times, and each
//! invocation becomes an [`IterationResult`]. The overall outcome of a
//! logical test is a [`Status`], which is translated into a
//! [`RecordResult`] when it is reported upstream.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format TestNG uses for `started-at` / `finished-at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Outcome of a test method invocation as written by TestNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
    Skip,
}

impl Status {
    /// The string TestNG uses for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Skip => "SKIP",
        }
    }

    /// Translate into the value recorded on a test run.
    pub fn to_record_result(self) -> RecordResult {
        match self {
            Status::Pass => RecordResult::Passed,
            Status::Fail => RecordResult::Failed,
            Status::Skip => RecordResult::Waiting,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status attribute that is not one of `PASS`, `FAIL` or `SKIP`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown test status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PASS" => Ok(Status::Pass),
            "FAIL" => Ok(Status::Fail),
            "SKIP" => Ok(Status::Skip),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Result value stored on a remote test record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordResult {
    Passed,
    Failed,
    /// Never sent upstream; skipped tests produce no record.
    Waiting,
}

impl RecordResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordResult::Passed => "passed",
            RecordResult::Failed => "failed",
            RecordResult::Waiting => "waiting",
        }
    }
}

impl fmt::Display for RecordResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure details attached to a test method invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestException {
    /// Fully qualified exception class, from `<exception class="...">`.
    pub class_name: Option<String>,
    pub message: String,
    pub stack_trace: String,
}

/// One executed invocation of a parameterized test method.
///
/// Immutable once built; fields are exposed through accessors only.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationResult {
    status: Status,
    /// Duration in seconds.
    duration: f64,
    /// Start timestamp in [`TIMESTAMP_FORMAT`].
    started: String,
    exception: Option<TestException>,
    params: Vec<String>,
}

impl IterationResult {
    pub fn new(
        status: Status,
        duration: f64,
        started: impl Into<String>,
        exception: Option<TestException>,
        params: Vec<String>,
    ) -> Self {
        Self {
            status,
            duration,
            started: started.into(),
            exception,
            params,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn started(&self) -> &str {
        &self.started
    }

    pub fn exception(&self) -> Option<&TestException> {
        self.exception.as_ref()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Positional argument names (`Arg0`, `Arg1`, ...) for the parameters.
    pub fn arg_names(&self) -> Vec<String> {
        arg_names(self.params.len())
    }

    /// Parse the start timestamp.
    pub fn started_at(&self) -> Result<NaiveDateTime, chrono::ParseError> {
        parse_timestamp(&self.started)
    }
}

/// Positional argument names for `count` parameters.
pub fn arg_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("Arg{}", i)).collect()
}

/// Parse a TestNG timestamp.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
}

/// Current UTC time formatted like a TestNG timestamp.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}
