mod evidence;
mod finding;
mod report;
mod severity;

pub use evidence::{Evidence, EvidenceKind};
pub use finding::{Finding, sort_findings};
pub use report::ScanReport;
pub use severity::Severity;
