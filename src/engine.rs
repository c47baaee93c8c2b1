use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use crate::audit::{AuditOptions, ProbeCatalog, combine_headers, run_audit};
use crate::core::ScanReport;
use crate::error::{ScanError, ValidationError};
use crate::transport::{Headers, Transport, execute, parse_target};

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub audit: AuditOptions,
    /// Sent with every probe, overridden by operator headers.
    pub audit_headers: Headers,
    pub include_introspection: bool,
    pub show_progress: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            audit: AuditOptions::default(),
            audit_headers: Headers::new(),
            include_introspection: true,
            show_progress: false,
        }
    }
}

/// One scan pipeline bound to a transport and a probe catalog.
#[derive(Clone)]
pub struct Engine {
    transport: Arc<dyn Transport>,
    catalog: ProbeCatalog,
    opts: EngineOptions,
}

impl Engine {
    pub fn new(transport: Arc<dyn Transport>, catalog: ProbeCatalog, opts: EngineOptions) -> Self {
        Self {
            transport,
            catalog,
            opts,
        }
    }

    pub fn catalog(&self) -> &ProbeCatalog {
        &self.catalog
    }

    /// Introspection, extraction, audit, classification and graph for one target.
    pub fn analyze(&self, target: &str, headers: &Headers) -> Result<ScanReport, ScanError> {
        let target = validate_target(target)?;

        let progress = Progress::start(self.opts.show_progress, "Running introspection...");
        let result = self.analyze_inner(&target, headers, &progress);
        progress.finish();
        result
    }

    fn analyze_inner(
        &self,
        target: &str,
        headers: &Headers,
        progress: &Progress,
    ) -> Result<ScanReport, ScanError> {
        let response = crate::introspection::introspect(self.transport.as_ref(), target, headers)?;
        let schema = crate::schema::extract(&response.body)?;
        debug!(
            types = schema.types.len(),
            directives = schema.directives.len(),
            "schema extracted"
        );

        progress.set_message(format!("Running {} probes...", self.catalog.len()));
        let audit_headers = combine_headers(&self.opts.audit_headers, headers);
        let audit = run_audit(target, &audit_headers, &self.catalog, &self.opts.audit)?;

        let engine = crate::fingerprint::classify(&schema, &response.headers);
        info!(engine = %engine.engine, confidence = engine.confidence, "engine classified");
        let schema_artifacts = crate::graph::build(&schema);

        let introspection = if self.opts.include_introspection {
            Some(crate::schema::introspection_data(&response.body).clone())
        } else {
            None
        };

        Ok(ScanReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: now_rfc3339(),
            target: target.to_string(),
            engine,
            audit,
            schema: schema_artifacts,
            introspection,
        })
    }

    /// Runs an arbitrary operation and returns the raw response body.
    pub fn query(
        &self,
        target: &str,
        headers: &Headers,
        query: &str,
        variables: Option<&Value>,
        operation_name: Option<&str>,
    ) -> Result<Value, ScanError> {
        let target = validate_target(target)?;
        if query.trim().is_empty() {
            return Err(ValidationError::MissingField("query").into());
        }
        let response = execute(
            self.transport.as_ref(),
            &target,
            headers,
            query,
            variables,
            operation_name,
        )?;
        Ok(response.body)
    }
}

fn validate_target(target: &str) -> Result<String, ValidationError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ValidationError::MissingField("target"));
    }
    parse_target(target).map_err(|e| ValidationError::InvalidTarget(e.to_string()))?;
    Ok(target.to_string())
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

struct Progress(Option<indicatif::ProgressBar>);

impl Progress {
    fn start(enabled: bool, message: &'static str) -> Self {
        if !enabled || !std::io::stderr().is_terminal() {
            return Self(None);
        }
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(120));
        Self(Some(pb))
    }

    fn set_message(&self, message: String) {
        if let Some(pb) = &self.0 {
            pb.set_message(message);
        }
    }

    fn finish(self) {
        if let Some(pb) = self.0 {
            pb.finish_and_clear();
        }
    }
}
