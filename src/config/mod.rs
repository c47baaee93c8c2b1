use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditOptions, ProbeOptions};
use crate::probes::ProbeSpec;
use crate::transport::{DEFAULT_TIMEOUT, Headers, TransportOptions};

pub const CONFIG_ENV: &str = "GQLSCOPE_CONFIG";

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    pub ui: UiConfig,
    pub transport: TransportConfig,
    pub audit: AuditConfig,
    pub report: ReportConfig,
    #[serde(rename = "probe", skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<ProbeSpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransportConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditConfig {
    pub concurrent: bool,
    pub probe_timeout_secs: u64,
    pub skip: Vec<String>,
    pub headers: Headers,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub include_introspection: bool,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        let transport = TransportOptions::default();
        Self {
            config_path: None,
            ui: UiConfig {
                color: true,
                max_table_rows: 30,
            },
            transport: TransportConfig {
                timeout_secs: DEFAULT_TIMEOUT.as_secs(),
                user_agent: transport.user_agent,
            },
            audit: AuditConfig {
                concurrent: true,
                probe_timeout_secs: crate::audit::DEFAULT_PROBE_TIMEOUT.as_secs(),
                skip: vec![],
                headers: Headers::new(),
            },
            report: ReportConfig {
                include_introspection: true,
            },
            probes: vec![],
        }
    }
}

impl EffectiveConfig {
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            timeout: Duration::from_secs(self.transport.timeout_secs),
            user_agent: self.transport.user_agent.clone(),
        }
    }

    pub fn audit_options(&self, verbose: bool) -> AuditOptions {
        AuditOptions {
            concurrent: self.audit.concurrent,
            probe_timeout: Duration::from_secs(self.audit.probe_timeout_secs),
            probe: ProbeOptions {
                request_timeout: Duration::from_secs(self.transport.timeout_secs),
            },
            verbose,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    ui: Option<RawUiConfig>,
    transport: Option<RawTransportConfig>,
    audit: Option<RawAuditConfig>,
    report: Option<RawReportConfig>,
    #[serde(default)]
    probe: Vec<ProbeSpec>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
    max_table_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawTransportConfig {
    timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAuditConfig {
    concurrent: Option<bool>,
    probe_timeout_secs: Option<u64>,
    skip: Option<Vec<String>>,
    headers: Option<Headers>,
}

#[derive(Debug, Deserialize)]
struct RawReportConfig {
    include_introspection: Option<bool>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/gqlscope/config.toml")
}

/// `--config`, then `$GQLSCOPE_CONFIG`, then the per-user default.
pub fn resolve_config_path(explicit: Option<&Path>, home_dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var(CONFIG_ENV) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => default_config_path(home_dir),
    }
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = resolve_config_path(config_path, home_dir);
    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&s)
            .with_context(|| format!("failed to parse config file (TOML): {}", path.display()))?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    } else if config_path.is_some() {
        anyhow::bail!("config file not found: {}", path.display());
    }

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
        if let Some(max_table_rows) = ui.max_table_rows {
            cfg.ui.max_table_rows = max_table_rows;
        }
    }

    if let Some(transport) = raw.transport {
        if let Some(timeout_secs) = transport.timeout_secs {
            cfg.transport.timeout_secs = timeout_secs;
        }
        if let Some(user_agent) = transport.user_agent {
            cfg.transport.user_agent = user_agent;
        }
    }

    if let Some(audit) = raw.audit {
        if let Some(concurrent) = audit.concurrent {
            cfg.audit.concurrent = concurrent;
        }
        if let Some(probe_timeout_secs) = audit.probe_timeout_secs {
            cfg.audit.probe_timeout_secs = probe_timeout_secs;
        }
        if let Some(skip) = audit.skip {
            cfg.audit.skip = skip;
        }
        if let Some(headers) = audit.headers {
            cfg.audit.headers = headers;
        }
    }

    if let Some(report) = raw.report {
        if let Some(include_introspection) = report.include_introspection {
            cfg.report.include_introspection = include_introspection;
        }
    }

    cfg.probes.extend(raw.probe);
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("GQLSCOPE_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).context("GQLSCOPE_UI_COLOR")?;
    }
    if let Ok(v) = std::env::var("GQLSCOPE_UI_MAX_TABLE_ROWS") {
        cfg.ui.max_table_rows = v
            .trim()
            .parse::<usize>()
            .context("GQLSCOPE_UI_MAX_TABLE_ROWS")?;
    }
    if let Ok(v) = std::env::var("GQLSCOPE_TRANSPORT_TIMEOUT_SECS") {
        cfg.transport.timeout_secs = v
            .trim()
            .parse::<u64>()
            .context("GQLSCOPE_TRANSPORT_TIMEOUT_SECS")?;
    }
    if let Ok(v) = std::env::var("GQLSCOPE_AUDIT_CONCURRENT") {
        cfg.audit.concurrent = parse_bool(&v).context("GQLSCOPE_AUDIT_CONCURRENT")?;
    }
    if let Ok(v) = std::env::var("GQLSCOPE_AUDIT_PROBE_TIMEOUT_SECS") {
        cfg.audit.probe_timeout_secs = v
            .trim()
            .parse::<u64>()
            .context("GQLSCOPE_AUDIT_PROBE_TIMEOUT_SECS")?;
    }
    if let Ok(v) = std::env::var("GQLSCOPE_AUDIT_SKIP") {
        let parts: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        if !parts.is_empty() {
            cfg.audit.skip = parts;
        }
    }
    if let Ok(v) = std::env::var("GQLSCOPE_REPORT_INCLUDE_INTROSPECTION") {
        cfg.report.include_introspection =
            parse_bool(&v).context("GQLSCOPE_REPORT_INCLUDE_INTROSPECTION")?;
    }

    Ok(())
}

/// Checks value ranges. Re-run after CLI overrides are applied.
pub fn validate(cfg: &EffectiveConfig) -> Result<()> {
    if cfg.transport.timeout_secs == 0 {
        anyhow::bail!("transport.timeout_secs must be greater than 0");
    }
    if cfg.audit.probe_timeout_secs == 0 {
        anyhow::bail!("audit.probe_timeout_secs must be greater than 0");
    }
    if cfg.audit.probe_timeout_secs < cfg.transport.timeout_secs {
        anyhow::bail!(
            "audit.probe_timeout_secs ({}) must be at least transport.timeout_secs ({})",
            cfg.audit.probe_timeout_secs,
            cfg.transport.timeout_secs
        );
    }
    for spec in &cfg.probes {
        spec.validate()?;
    }
    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "invalid boolean: {s} (expected true|false|1|0|yes|no|on|off)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for s in ["1", "true", "YES", " on "] {
            assert!(parse_bool(s).unwrap());
        }
        for s in ["0", "false", "No", "off"] {
            assert!(!parse_bool(s).unwrap());
        }
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn raw_config_overrides_defaults() {
        let raw: RawConfig = toml::from_str(
            r#"
[transport]
timeout_secs = 5

[audit]
concurrent = false
skip = ["batching"]
headers = { "User-Agent" = "scanner" }

[[probe]]
id = "typename"
title = "Typename"
description = "Typename resolves"
severity = "INFO"
query = "{ __typename }"
detect = { kind = "data_present", path = "__typename" }
"#,
        )
        .unwrap();
        let mut cfg = EffectiveConfig::default();
        apply_raw_config(&mut cfg, raw);
        validate(&cfg).unwrap();

        assert_eq!(cfg.transport.timeout_secs, 5);
        assert!(!cfg.audit.concurrent);
        assert_eq!(cfg.audit.skip, vec!["batching"]);
        assert_eq!(cfg.audit.headers["User-Agent"], "scanner");
        assert_eq!(cfg.probes.len(), 1);
        assert!(cfg.report.include_introspection);

        let audit = cfg.audit_options(true);
        assert_eq!(audit.probe.request_timeout, Duration::from_secs(5));
        assert!(audit.verbose);
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(toml::from_str::<RawConfig>("[scan]\ndeep = true").is_err());
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let mut cfg = EffectiveConfig::default();
        cfg.transport.timeout_secs = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn probe_timeout_must_cover_request_timeout() {
        let mut cfg = EffectiveConfig::default();
        cfg.transport.timeout_secs = 120;
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("audit.probe_timeout_secs (60)"));

        cfg.audit.probe_timeout_secs = 120;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn effective_config_renders_as_toml() {
        let s = toml::to_string(&EffectiveConfig::default()).unwrap();
        assert!(s.contains("[transport]"));
        assert!(s.contains("include_introspection = true"));
    }
}
