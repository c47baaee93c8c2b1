use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Request,
    Response,
    Command,
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub value: String,
}

impl Evidence {
    pub fn request(value: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Request,
            value: value.into(),
        }
    }

    pub fn response(value: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Response,
            value: value.into(),
        }
    }

    pub fn command(value: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Command,
            value: value.into(),
        }
    }

    pub fn note(value: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Note,
            value: value.into(),
        }
    }
}
