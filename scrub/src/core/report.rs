//! Issue reports produced by inspection or captured from failed executions.

use serde::{Deserialize, Serialize};

/// Structured description of dataset defects, or of a failed cleaning attempt.
///
/// An empty issue list with no failure trace means the dataset is valid.
/// When a cleaning script raised an error instead of producing bad data, the
/// captured trace lives in `failure` and takes precedence over quality issues
/// when the report is handed to the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueReport {
    /// Human-readable issue descriptions, in the order they were detected.
    #[serde(default)]
    pub issues: Vec<String>,
    /// Captured error trace from the previous execution attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl IssueReport {
    /// Report that signals a valid dataset.
    pub fn clean() -> Self {
        Self::default()
    }

    /// Report carrying only an execution failure trace.
    pub fn from_failure(trace: impl Into<String>) -> Self {
        Self {
            issues: Vec::new(),
            failure: Some(trace.into()),
        }
    }

    /// True when there is nothing left to fix.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.failure.is_none()
    }

    /// One-line description for event summaries.
    pub fn summary(&self) -> String {
        match (&self.failure, self.issues.len()) {
            (Some(_), _) => "execution failure".to_string(),
            (None, 0) => "no issues".to_string(),
            (None, 1) => "1 issue".to_string(),
            (None, n) => format!("{n} issues"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_report_has_nothing_to_fix() {
        assert!(IssueReport::clean().is_clean());
        assert_eq!(IssueReport::clean().summary(), "no issues");
    }

    #[test]
    fn failure_trace_marks_report_dirty() {
        let report = IssueReport::from_failure("Traceback: boom");
        assert!(!report.is_clean());
        assert_eq!(report.summary(), "execution failure");
    }

    #[test]
    fn summary_counts_issues() {
        let report = IssueReport {
            issues: vec!["null value in 'name'".to_string(), "duplicate record".to_string()],
            failure: None,
        };
        assert_eq!(report.summary(), "2 issues");
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = IssueReport {
            issues: vec!["keys not snake_case".to_string()],
            failure: Some("trace".to_string()),
        };
        let json = serde_json::to_string(&report).expect("serialize");
        let parsed: IssueReport = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, report);
    }
}
