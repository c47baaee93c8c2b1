use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;

use crate::error::{ParseError, ScanError, TransportError};

/// Header name → value. Ordered so anything derived from it is deterministic.
pub type Headers = BTreeMap<String, String>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Debug, Clone)]
pub struct TransportRequest<'a> {
    pub target: &'a str,
    pub headers: &'a Headers,
    pub payload: &'a Value,
    /// Overrides the transport-wide timeout for this request.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Lowercased names; repeated headers joined with `, `.
    pub headers: Headers,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self, target: &str) -> Result<Value, ParseError> {
        serde_json::from_str(&self.body).map_err(|e| ParseError {
            target: target.to_string(),
            message: e.to_string(),
        })
    }
}

/// Sends one JSON POST to a GraphQL endpoint. Implementations must apply a bounded timeout.
pub trait Transport: Send + Sync {
    fn send(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("gqlscope/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(opts: &TransportOptions) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(opts.timeout)
            .user_agent(opts.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Client {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            timeout: opts.timeout,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, TransportError> {
        let url = parse_target(request.target)?;
        let timeout = request.timeout.unwrap_or(self.timeout);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in request.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        debug!(target_url = %url, timeout = ?timeout, "sending GraphQL request");
        let response = self
            .client
            .post(url)
            .headers(headers)
            .timeout(timeout)
            .json(request.payload)
            .send()
            .map_err(|e| request_error(request.target, timeout, &e))?;

        let status = response.status().as_u16();
        let mut response_headers = Headers::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).to_string();
            response_headers
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        let body = response
            .text()
            .map_err(|e| request_error(request.target, timeout, &e))?;
        debug!(status, bytes = body.len(), "GraphQL response received");

        Ok(TransportResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

fn request_error(target: &str, timeout: Duration, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout {
            target: target.to_string(),
            after: timeout,
        };
    }
    TransportError::Request {
        target: target.to_string(),
        message: err.to_string(),
    }
}

/// Accepts absolute `http`/`https` URLs only.
pub fn parse_target(target: &str) -> Result<Url, TransportError> {
    let url = Url::parse(target).map_err(|e| TransportError::InvalidTarget {
        target: target.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TransportError::InvalidTarget {
            target: target.to_string(),
            reason: format!("unsupported scheme `{other}`"),
        }),
    }
}

pub fn graphql_payload(query: &str, variables: Option<&Value>, operation_name: Option<&str>) -> Value {
    let mut payload = Map::new();
    payload.insert("query".to_string(), Value::String(query.to_string()));
    if let Some(variables) = variables {
        payload.insert("variables".to_string(), variables.clone());
    }
    if let Some(name) = operation_name.filter(|n| !n.is_empty()) {
        payload.insert("operationName".to_string(), json!(name));
    }
    Value::Object(payload)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphqlResponse {
    pub body: Value,
    pub headers: Headers,
}

/// POSTs a GraphQL operation and returns the parsed body with the response headers.
///
/// Non-2xx statuses surface as [`TransportError::Status`], non-JSON bodies as [`ParseError`].
pub fn execute(
    transport: &dyn Transport,
    target: &str,
    headers: &Headers,
    query: &str,
    variables: Option<&Value>,
    operation_name: Option<&str>,
) -> Result<GraphqlResponse, ScanError> {
    let payload = graphql_payload(query, variables, operation_name);
    let response = transport.send(&TransportRequest {
        target,
        headers,
        payload: &payload,
        timeout: None,
    })?;
    if !response.is_success() {
        return Err(TransportError::Status {
            target: target.to_string(),
            status: response.status,
        }
        .into());
    }
    let body = response.json(target)?;
    Ok(GraphqlResponse {
        body,
        headers: response.headers,
    })
}

/// A `curl` command line reproducing a request, for evidence.
pub fn curl_command(target: &str, headers: &Headers, payload: &Value) -> String {
    let mut parts = vec!["curl -X POST".to_string()];
    parts.push(format!("-H {}", shell_quote("Content-Type: application/json")));
    for (name, value) in headers {
        parts.push(format!("-H {}", shell_quote(&format!("{name}: {value}"))));
    }
    parts.push(format!("-d {}", shell_quote(&payload.to_string())));
    parts.push(shell_quote(target));
    parts.join(" ")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tiny_http::{Header, Response, Server};

    fn serve_once(status: u16, body: &'static str, headers: Vec<(&'static str, &'static str)>) -> String {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let mut response = Response::from_string(body).with_status_code(status);
                for (k, v) in headers {
                    response.add_header(Header::from_bytes(k.as_bytes(), v.as_bytes()).unwrap());
                }
                let _ = request.respond(response);
            }
        });
        format!("http://{addr}/graphql")
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(&TransportOptions {
            timeout: Duration::from_secs(5),
            ..TransportOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn execute_returns_body_and_lowercased_headers() {
        let url = serve_once(
            200,
            r#"{"data":{"__typename":"Query"}}"#,
            vec![("X-Powered-By", "Hasura GraphQL Engine")],
        );
        let resp = execute(&transport(), &url, &Headers::new(), "{ __typename }", None, None).unwrap();
        assert_eq!(resp.body["data"]["__typename"], "Query");
        assert_eq!(
            resp.headers.get("x-powered-by").map(String::as_str),
            Some("Hasura GraphQL Engine")
        );
    }

    #[test]
    fn execute_rejects_error_status() {
        let url = serve_once(503, "{}", vec![]);
        let err = execute(&transport(), &url, &Headers::new(), "{ a }", None, None).unwrap_err();
        assert!(matches!(
            err,
            ScanError::Transport(TransportError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn execute_rejects_non_json_body() {
        let url = serve_once(200, "<html>nope</html>", vec![]);
        let err = execute(&transport(), &url, &Headers::new(), "{ a }", None, None).unwrap_err();
        assert!(matches!(err, ScanError::Parse(_)));
    }

    #[test]
    fn unsupported_scheme_is_rejected_before_sending() {
        let err = parse_target("ftp://example.com/graphql").unwrap_err();
        assert!(matches!(err, TransportError::InvalidTarget { .. }));
        assert!(parse_target("not a url").is_err());
        assert!(parse_target("https://example.com/graphql").is_ok());
    }

    #[test]
    fn payload_omits_empty_optionals() {
        let payload = graphql_payload("{ a }", None, Some(""));
        assert_eq!(payload, json!({"query": "{ a }"}));

        let vars = json!({"id": 1});
        let payload = graphql_payload("query Q($id: ID) { a }", Some(&vars), Some("Q"));
        assert_eq!(payload["operationName"], "Q");
        assert_eq!(payload["variables"]["id"], 1);
    }

    #[test]
    fn curl_command_quotes_single_quotes() {
        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());
        let cmd = curl_command("http://h/graphql", &headers, &json!({"query": "{ a(x: \"it's\") }"}));
        assert!(cmd.starts_with("curl -X POST"));
        assert!(cmd.contains("-H 'Authorization: Bearer t'"));
        assert!(cmd.contains(r"it'\''s"));
        assert!(cmd.ends_with("'http://h/graphql'"));
    }
}
