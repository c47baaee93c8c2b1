use crate::core::Finding;
use crate::fingerprint::EngineReport;
use crate::graph::SchemaArtifacts;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub schema_version: String,
    pub tool_version: String,
    pub generated_at: String,
    pub target: String,
    pub engine: EngineReport,
    pub audit: Vec<Finding>,
    pub schema: SchemaArtifacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection: Option<Value>,
}

impl ScanReport {
    pub fn vulnerable_findings(&self) -> impl Iterator<Item = &Finding> {
        self.audit.iter().filter(|f| f.result)
    }
}
