//! Typed records exchanged with the remote system.
//!
//! These are explicit local copies of the fields the synchronization core
//! reads and writes, not live handles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::result::RecordResult;

/// Link role from a test case to the requirement it covers.
pub const VERIFIES: &str = "verifies";

/// Lightweight query result: just enough to match by title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemSummary {
    pub id: String,
    pub title: String,
}

impl WorkItemSummary {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Test-case metadata fields.
///
/// | Field | Default |
/// |-------|---------|
/// | `caseimportance` | `high` |
/// | `caselevel` | `component` |
/// | `caseposneg` | `positive` |
/// | `testtype` | `functional` |
/// | `subtype1` | `reliability` |
/// | `caseautomation` | `automated` |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caseimportance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caselevel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caseposneg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caseautomation: Option<String>,
}

impl TestCaseFields {
    /// Fields given to every newly created test case.
    pub fn defaults() -> Self {
        Self {
            caseimportance: Some("high".to_string()),
            caselevel: Some("component".to_string()),
            caseposneg: Some("positive".to_string()),
            testtype: Some("functional".to_string()),
            subtype1: Some("reliability".to_string()),
            caseautomation: Some("automated".to_string()),
        }
    }

    /// Fill every unset field from `defaults`, never overwriting a value.
    /// Blank strings count as unset.
    ///
    /// Returns the number of fields that were filled.
    pub fn backfill(&mut self, defaults: &TestCaseFields) -> usize {
        let pairs = [
            (&mut self.caseimportance, &defaults.caseimportance),
            (&mut self.caselevel, &defaults.caselevel),
            (&mut self.caseposneg, &defaults.caseposneg),
            (&mut self.testtype, &defaults.testtype),
            (&mut self.subtype1, &defaults.subtype1),
            (&mut self.caseautomation, &defaults.caseautomation),
        ];
        let mut filled = 0;
        for (field, default) in pairs {
            let unset = field.as_deref().is_none_or(|value| value.trim().is_empty());
            if unset && default.is_some() {
                *field = default.clone();
                filled += 1;
            }
        }
        filled
    }
}

/// One step of a test case: argument names and the expected outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    /// Comma-separated argument names, e.g. `Arg0,Arg1`.
    pub args: String,
    pub expected_result: String,
}

/// A link from a work item to another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedItem {
    pub work_item_id: String,
    pub role: String,
}

/// A complete test case as fetched from (or created in) the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseRecord {
    pub id: String,
    pub project: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fields: TestCaseFields,
    #[serde(default)]
    pub steps: Vec<TestStep>,
    #[serde(default)]
    pub linked_items: Vec<LinkedItem>,
}

impl TestCaseRecord {
    pub fn steps(&self) -> &[TestStep] {
        &self.steps
    }

    /// Replace all steps.
    pub fn set_steps(&mut self, steps: Vec<TestStep>) {
        self.steps = steps;
    }

    /// Links to `work_item_id` with the given role.
    pub fn links_to(&self, work_item_id: &str, role: &str) -> usize {
        self.linked_items
            .iter()
            .filter(|l| l.work_item_id == work_item_id && l.role == role)
            .count()
    }

    pub fn add_linked_item(&mut self, work_item_id: &str, role: &str) {
        self.linked_items.push(LinkedItem {
            work_item_id: work_item_id.to_string(),
            role: role.to_string(),
        });
    }

    /// Remove one link to `work_item_id` with the given role.
    ///
    /// Returns whether a link was removed.
    pub fn remove_linked_item(&mut self, work_item_id: &str, role: &str) -> bool {
        match self
            .linked_items
            .iter()
            .position(|l| l.work_item_id == work_item_id && l.role == role)
        {
            Some(index) => {
                self.linked_items.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Requirement metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementFields {
    pub severity: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for RequirementFields {
    fn default() -> Self {
        Self {
            severity: "should_have".to_string(),
            kind: "functional".to_string(),
        }
    }
}

/// Status of a test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    #[serde(rename = "notrun")]
    NotRun,
    #[serde(rename = "inprogress")]
    InProgress,
    Finished,
}

/// Search result for test runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunSummary {
    pub id: String,
    /// Creation time as an RFC 3339 string.
    pub created: String,
    #[serde(default)]
    pub status: RunStatus,
}

/// One executed result on a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub test_case_id: String,
    pub result: RecordResult,
    pub comment: String,
    /// Start time in the report's timestamp format.
    pub executed: String,
    /// Duration in seconds.
    pub duration: f64,
    pub executed_by: String,
}

/// A complete test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunRecord {
    pub id: String,
    pub project: String,
    pub template: String,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub records: Vec<TestRecord>,
}

impl TestRunRecord {
    /// Whether a record for `test_case_id` already exists.
    pub fn contains_test_case(&self, test_case_id: &str) -> bool {
        self.records.iter().any(|r| r.test_case_id == test_case_id)
    }

    pub fn set_custom_field(&mut self, key: &str, value: &str) {
        self.custom_fields
            .insert(key.to_string(), value.to_string());
    }
}

/// Printable snapshot of the test-case fields the core cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCaseSnapshot {
    pub id: String,
    pub title: String,
    pub fields: TestCaseFields,
    pub step_count: usize,
    pub verifies: Vec<String>,
}

impl From<&TestCaseRecord> for TestCaseSnapshot {
    fn from(record: &TestCaseRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            fields: record.fields.clone(),
            step_count: record.steps.len(),
            verifies: record
                .linked_items
                .iter()
                .filter(|l| l.role == VERIFIES)
                .map(|l| l.work_item_id.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TestCaseRecord {
        TestCaseRecord {
            id: "RHEL6-100".into(),
            project: "RHEL6".into(),
            title: "pkg.Cls.test".into(),
            description: String::new(),
            fields: TestCaseFields::default(),
            steps: Vec::new(),
            linked_items: Vec::new(),
        }
    }

    #[test]
    fn test_backfill_keeps_existing_values() {
        let mut fields = TestCaseFields {
            caseimportance: Some("low".into()),
            ..Default::default()
        };
        let filled = fields.backfill(&TestCaseFields::defaults());
        assert_eq!(filled, 5);
        assert_eq!(fields.caseimportance.as_deref(), Some("low"));
        assert_eq!(fields.caselevel.as_deref(), Some("component"));
        assert_eq!(fields.caseautomation.as_deref(), Some("automated"));

        assert_eq!(fields.backfill(&TestCaseFields::defaults()), 0);
    }

    #[test]
    fn test_backfill_replaces_blank_values() {
        let mut fields = TestCaseFields {
            caseimportance: Some(String::new()),
            caselevel: Some("  ".into()),
            testtype: Some("nonfunctional".into()),
            ..Default::default()
        };
        let filled = fields.backfill(&TestCaseFields::defaults());
        assert_eq!(filled, 5);
        assert_eq!(fields.caseimportance.as_deref(), Some("high"));
        assert_eq!(fields.caselevel.as_deref(), Some("component"));
        assert_eq!(fields.testtype.as_deref(), Some("nonfunctional"));
    }

    #[test]
    fn test_linked_items() {
        let mut tc = record();
        tc.add_linked_item("RHEL6-1", VERIFIES);
        tc.add_linked_item("RHEL6-1", VERIFIES);
        tc.add_linked_item("RHEL6-2", "relates_to");
        assert_eq!(tc.links_to("RHEL6-1", VERIFIES), 2);

        assert!(tc.remove_linked_item("RHEL6-1", VERIFIES));
        assert_eq!(tc.links_to("RHEL6-1", VERIFIES), 1);
        assert!(!tc.remove_linked_item("RHEL6-9", VERIFIES));

        let snapshot = TestCaseSnapshot::from(&tc);
        assert_eq!(snapshot.verifies, vec!["RHEL6-1"]);
    }

    #[test]
    fn test_run_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&RunStatus::InProgress).unwrap(),
            "\"inprogress\""
        );
        assert_eq!(
            serde_json::from_str::<RunStatus>("\"finished\"").unwrap(),
            RunStatus::Finished
        );
    }

    #[test]
    fn test_requirement_fields_serialize_type() {
        let json = serde_json::to_value(RequirementFields::default()).unwrap();
        assert_eq!(json["type"], "functional");
        assert_eq!(json["severity"], "should_have");
    }
}
