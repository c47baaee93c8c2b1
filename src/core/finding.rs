use crate::core::{Evidence, Severity};
use serde::{Deserialize, Serialize};

/// Outcome of one probe run. `title` is unique per probe and orders the audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub title: String,
    pub description: String,
    pub impact: String,
    pub severity: Severity,
    /// Whether the probe observed the issue on the target.
    pub result: bool,
    pub evidence: Vec<Evidence>,
}

/// Sorts findings by title, then id, so the order never depends on execution order.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
}
