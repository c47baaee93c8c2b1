//! JSON request/response contract for front-ends: `analyze` and `query`.
//!
//! Every handler returns a status code and a JSON body. Failures are `{error, kind, details?}`.

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::core::ScanReport;
use crate::engine::Engine;
use crate::error::{ScanError, ValidationError};
use crate::transport::Headers;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

impl From<ScanError> for ApiResponse {
    fn from(err: ScanError) -> Self {
        let mut body = Map::new();
        body.insert("error".to_string(), json!(err.to_string()));
        body.insert("kind".to_string(), json!(err.kind()));
        if let ScanError::SchemaExtraction(inner) = &err {
            if !inner.server_errors().is_empty() {
                body.insert("details".to_string(), Value::Array(inner.server_errors().to_vec()));
            }
        }
        Self {
            status: err.status(),
            body: Value::Object(body),
        }
    }
}

/// Operator headers: absent, an object, or a JSON object encoded as a string. Values are stringified.
pub fn parse_headers(raw: Option<&Value>) -> Result<Headers, ValidationError> {
    let object = match raw {
        None | Some(Value::Null) => return Ok(Headers::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Headers::new()),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .map_err(|e| ValidationError::InvalidHeaders(e.to_string()))?,
        Some(other) => other.clone(),
    };
    let Value::Object(map) = object else {
        return Err(ValidationError::InvalidHeaders(
            "headers must be a JSON object".to_string(),
        ));
    };
    Ok(map
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect())
}

/// Variables: absent, a JSON value, or JSON encoded as a string.
pub fn parse_variables(raw: Option<&Value>) -> Result<Option<Value>, ValidationError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => serde_json::from_str(s)
            .map(Some)
            .map_err(|e| ValidationError::InvalidVariables(e.to_string())),
        Some(other) => Ok(Some(other.clone())),
    }
}

fn request_object(request: &Value) -> Result<&Map<String, Value>, ScanError> {
    request.as_object().ok_or_else(|| {
        ValidationError::InvalidRequest("request body must be a JSON object".to_string()).into()
    })
}

fn required_str<'a>(
    request: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    request
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::MissingField(field))
}

/// `{target, headers}` → full scan report.
pub fn handle_analyze(engine: &Engine, request: &Value) -> ApiResponse {
    let report = match analyze(engine, request) {
        Ok(report) => report,
        Err(err) => return failure(err),
    };
    match serde_json::to_value(&report) {
        Ok(body) => ApiResponse::ok(body),
        Err(err) => ApiResponse {
            status: 500,
            body: json!({ "error": format!("report serialization failed: {err}"), "kind": "internal" }),
        },
    }
}

fn analyze(engine: &Engine, request: &Value) -> Result<ScanReport, ScanError> {
    let request = request_object(request)?;
    let target = required_str(request, "target")?;
    let headers = parse_headers(request.get("headers"))?;
    engine.analyze(target, &headers)
}

/// `{target, headers, query, variables, operationName}` → `{result}`.
pub fn handle_query(engine: &Engine, request: &Value) -> ApiResponse {
    match query(engine, request) {
        Ok(body) => ApiResponse::ok(json!({ "result": body })),
        Err(err) => failure(err),
    }
}

fn query(engine: &Engine, request: &Value) -> Result<Value, ScanError> {
    let request = request_object(request)?;
    let target = required_str(request, "target")?;
    let query = required_str(request, "query")?;
    let headers = parse_headers(request.get("headers"))?;
    let variables = parse_variables(request.get("variables"))?;
    let operation_name = request
        .get("operationName")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    engine.query(target, &headers, query, variables.as_ref(), operation_name)
}

fn failure(err: ScanError) -> ApiResponse {
    warn!(kind = err.kind(), error = %err, "request failed");
    err.into()
}
