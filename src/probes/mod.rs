//! Declarative probes: a GraphQL document plus a detection rule, loaded from TOML.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::audit::{Probe, ProbeCatalog, ProbeOptions};
use crate::core::{Evidence, Finding, Severity};
use crate::error::{AuditError, ProbeError};
use crate::transport::{Headers, Transport, TransportRequest, curl_command};

const DEFAULT_CATALOG: &str = include_str!("default_catalog.toml");
const REPEAT_PLACEHOLDER: &str = "{{repeat}}";
const MAX_MULTIPLIER: usize = 1000;
const MAX_RESPONSE_EVIDENCE: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSpec {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub impact: String,
    pub severity: Severity,
    pub query: String,
    /// Send the document this many times in one JSON array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Repeat>,
    pub detect: Detect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Repeat {
    pub count: usize,
    /// `{i}` is replaced by the copy index.
    pub fragment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detect {
    /// Dotted path under `data` resolves to a non-null value.
    DataPresent { path: String },
    ErrorContains { needle: String },
    /// A batch request came back as an array with one entry per operation.
    BatchAccepted,
    ExtensionPresent { key: String },
    ErrorCountAtLeast { count: usize },
}

impl ProbeSpec {
    pub fn validate(&self) -> Result<(), AuditError> {
        let invalid = |reason: &str| AuditError::InvalidProbe {
            probe: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(invalid("title must not be empty"));
        }
        if let Some(batch) = self.batch {
            if !(2..=MAX_MULTIPLIER).contains(&batch) {
                return Err(invalid("batch must be between 2 and 1000"));
            }
        }
        match &self.repeat {
            Some(repeat) => {
                if !(1..=MAX_MULTIPLIER).contains(&repeat.count) {
                    return Err(invalid("repeat.count must be between 1 and 1000"));
                }
                if !self.query.contains(REPEAT_PLACEHOLDER) {
                    return Err(invalid("query must contain {{repeat}} when repeat is set"));
                }
            }
            None => {
                if self.query.contains(REPEAT_PLACEHOLDER) {
                    return Err(invalid("{{repeat}} used without a repeat table"));
                }
            }
        }
        if self.detect == Detect::BatchAccepted && self.batch.is_none() {
            return Err(invalid("batch_accepted detection requires batch"));
        }
        Ok(())
    }

    /// The GraphQL document with `{{repeat}}` expanded.
    pub fn document(&self) -> String {
        match &self.repeat {
            Some(repeat) => {
                let expanded = (0..repeat.count)
                    .map(|i| repeat.fragment.replace("{i}", &i.to_string()))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.query.replace(REPEAT_PLACEHOLDER, &expanded)
            }
            None => self.query.clone(),
        }
    }

    pub fn payload(&self) -> Value {
        let operation = json!({ "query": self.document() });
        match self.batch {
            Some(n) => Value::Array(vec![operation; n]),
            None => operation,
        }
    }
}

impl Detect {
    pub fn matches(&self, body: &Value, batch: Option<usize>) -> bool {
        if let Detect::BatchAccepted = self {
            return match body.as_array() {
                Some(items) => items.len() >= batch.unwrap_or(2),
                None => false,
            };
        }
        let body = match body {
            Value::Array(items) => match items.first() {
                Some(first) => first,
                None => return false,
            },
            other => other,
        };
        match self {
            Detect::DataPresent { path } => {
                let mut cur = body.get("data");
                for segment in path.split('.').filter(|s| !s.is_empty()) {
                    cur = cur.and_then(|v| v.get(segment));
                }
                cur.is_some_and(|v| !v.is_null())
            }
            Detect::ErrorContains { needle } => errors(body).iter().any(|e| {
                e.get("message")
                    .and_then(Value::as_str)
                    .is_some_and(|m| m.contains(needle.as_str()))
            }),
            Detect::ExtensionPresent { key } => body
                .get("extensions")
                .and_then(|ext| ext.get(key))
                .is_some_and(|v| !v.is_null()),
            Detect::ErrorCountAtLeast { count } => errors(body).len() >= *count,
            Detect::BatchAccepted => false,
        }
    }
}

fn errors(body: &Value) -> &[Value] {
    body.get("errors")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub struct DeclarativeProbe {
    spec: ProbeSpec,
    transport: Arc<dyn Transport>,
}

impl DeclarativeProbe {
    pub fn new(spec: ProbeSpec, transport: Arc<dyn Transport>) -> Result<Self, AuditError> {
        spec.validate()?;
        Ok(Self { spec, transport })
    }

    fn finding(&self, result: bool, evidence: Vec<Evidence>) -> Finding {
        Finding {
            id: self.spec.id.clone(),
            title: self.spec.title.clone(),
            description: self.spec.description.clone(),
            impact: self.spec.impact.clone(),
            severity: self.spec.severity,
            result,
            evidence,
        }
    }
}

impl Probe for DeclarativeProbe {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn title(&self) -> &str {
        &self.spec.title
    }

    fn severity(&self) -> Severity {
        self.spec.severity
    }

    fn run(
        &self,
        target: &str,
        options: &ProbeOptions,
        headers: &Headers,
        verbose: bool,
    ) -> Result<Finding, ProbeError> {
        let payload = self.spec.payload();
        let response = self
            .transport
            .send(&TransportRequest {
                target,
                headers,
                payload: &payload,
                timeout: Some(options.request_timeout),
            })
            .map_err(|source| ProbeError::Transport {
                probe: self.spec.id.clone(),
                source,
            })?;

        let mut evidence = vec![
            Evidence::request(payload.to_string()),
            Evidence::command(curl_command(target, headers, &payload)),
        ];
        // Rejections count as "not vulnerable", not as probe failures.
        let result = if !response.is_success() {
            evidence.push(Evidence::note(format!("HTTP {}", response.status)));
            false
        } else {
            match response.json(target) {
                Ok(body) => self.spec.detect.matches(&body, self.spec.batch),
                Err(_) => {
                    evidence.push(Evidence::note("response body is not JSON"));
                    false
                }
            }
        };
        if verbose {
            evidence.push(Evidence::response(
                response.body.chars().take(MAX_RESPONSE_EVIDENCE).collect::<String>(),
            ));
        }
        debug!(probe = %self.spec.id, status = response.status, result, "probe finished");
        Ok(self.finding(result, evidence))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    probe: Vec<ProbeSpec>,
}

pub fn parse_specs(text: &str) -> Result<Vec<ProbeSpec>, AuditError> {
    let file: CatalogFile = toml::from_str(text).map_err(|e| AuditError::Catalog(e.to_string()))?;
    Ok(file.probe)
}

pub fn default_specs() -> Result<Vec<ProbeSpec>, AuditError> {
    parse_specs(DEFAULT_CATALOG)
}

/// Built-in probes followed by `extra`; duplicate ids are rejected.
pub fn build_catalog(
    transport: Arc<dyn Transport>,
    extra: &[ProbeSpec],
) -> Result<ProbeCatalog, AuditError> {
    let mut catalog = ProbeCatalog::new();
    for spec in default_specs()?.into_iter().chain(extra.iter().cloned()) {
        let probe = DeclarativeProbe::new(spec, Arc::clone(&transport))?;
        catalog.register(Arc::new(probe))?;
    }
    Ok(catalog)
}
