//! Error taxonomy shared by the analysis pipeline.

use std::time::Duration;

use serde_json::Value;

/// Network, timeout or HTTP status failure while talking to the target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP client setup failed: {message}")]
    Client { message: String },

    #[error("invalid target URL `{target}`: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("request to {target} failed: {message}")]
    Request { target: String, message: String },

    #[error("request to {target} timed out after {after:?}")]
    Timeout { target: String, after: Duration },

    #[error("{target} responded with HTTP {status}")]
    Status { target: String, status: u16 },

    #[error("invalid request header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// The target answered, but the body was not JSON.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{target} did not return valid JSON: {message}")]
pub struct ParseError {
    pub target: String,
    pub message: String,
}

/// Introspection succeeded at the transport level but the schema is unusable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaExtractionError {
    #[error("introspection is unavailable ({} error(s) returned by the server)", .errors.len())]
    IntrospectionDisabled { errors: Vec<Value> },

    #[error("response has no `__schema` object")]
    MissingSchema,

    #[error("`__schema.types` is missing")]
    MissingTypes,

    #[error("`__schema.types` is not a list")]
    TypesNotSequence,

    #[error("`__schema.types[{index}]` is invalid: {reason}")]
    InvalidType { index: usize, reason: String },
}

impl SchemaExtractionError {
    /// GraphQL errors reported by the server, when it sent any.
    pub fn server_errors(&self) -> &[Value] {
        match self {
            Self::IntrospectionDisabled { errors } => errors,
            _ => &[],
        }
    }
}

/// One probe capability failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("probe `{probe}` failed: {message}")]
    Failed { probe: String, message: String },

    #[error("probe `{probe}` timed out after {after:?}")]
    TimedOut { probe: String, after: Duration },

    #[error("probe `{probe}` panicked")]
    Panicked { probe: String },

    #[error("probe `{probe}`: {source}")]
    Transport {
        probe: String,
        #[source]
        source: TransportError,
    },
}

impl ProbeError {
    pub fn probe(&self) -> &str {
        match self {
            Self::Failed { probe, .. }
            | Self::TimedOut { probe, .. }
            | Self::Panicked { probe }
            | Self::Transport { probe, .. } => probe,
        }
    }
}

/// Malformed operator input, rejected before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid headers JSON: {0}")]
    InvalidHeaders(String),

    #[error("invalid variables JSON: {0}")]
    InvalidVariables(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Audit-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("audit failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("duplicate probe id `{0}` in catalog")]
    DuplicateProbe(String),

    #[error("invalid probe filter `{pattern}`: {reason}")]
    InvalidFilter { pattern: String, reason: String },

    #[error("invalid probe definition `{probe}`: {reason}")]
    InvalidProbe { probe: String, reason: String },

    #[error("probe catalog could not be parsed: {0}")]
    Catalog(String),
}

/// Any failure of a scan, from input validation to report assembly.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    SchemaExtraction(#[from] SchemaExtractionError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl ScanError {
    /// Status code used by the request/response contract.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Transport(_) | Self::Parse(_) => 502,
            Self::SchemaExtraction(_) | Self::Audit(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Transport(_) => "transport",
            Self::Parse(_) => "parse",
            Self::SchemaExtraction(_) => "schema_extraction",
            Self::Audit(_) => "probe",
        }
    }
}
