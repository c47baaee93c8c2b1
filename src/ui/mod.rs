use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::audit::ProbeCatalog;
use crate::core::{Finding, ScanReport, Severity};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stdout_is_tty: bool,
    pub stderr_is_tty: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "error:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "caused by:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "next:");
    let _ = writeln!(stderr, "  - re-run with `--verbose` for request-level logs");
    let _ = writeln!(
        stderr,
        "  - see `gqlscope --help` for available commands and options"
    );
}

pub fn print_report(report: &ScanReport, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    write_report(&mut out, report, cfg);
}

pub fn write_report(out: &mut dyn Write, report: &ScanReport, cfg: &UiConfig) {
    let engine = &report.engine;
    let _ = writeln!(out, "Target: {}", report.target);
    let _ = writeln!(
        out,
        "Engine: {} (confidence {})",
        engine.engine, engine.confidence
    );
    if cfg.verbose {
        for signal in &engine.matched {
            let _ = writeln!(
                out,
                "  signal: {} +{} ({:?} `{}`)",
                signal.engine, signal.weight, signal.source, signal.literal
            );
        }
    }
    for note in engine.security_notes {
        let _ = writeln!(out, "- {note}");
    }

    let schema = &report.schema;
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Schema: objects={}  edges={}  roots: query={} mutation={} subscription={}",
        schema.object_count,
        schema.graph.edges.len(),
        schema.query_type.as_deref().unwrap_or("-"),
        schema.mutation_type.as_deref().unwrap_or("-"),
        schema.subscription_type.as_deref().unwrap_or("-"),
    );
    let kinds = schema
        .kind_counts
        .iter()
        .map(|(kind, n)| format!("{kind}={n}"))
        .collect::<Vec<_>>()
        .join("  ");
    if !kinds.is_empty() {
        let _ = writeln!(out, "Types: {kinds}");
    }

    let total = report.audit.len();
    let rows = cfg.max_table_rows.min(total);
    let vulnerable = report.vulnerable_findings().count();
    let _ = writeln!(out);
    if total > rows {
        let _ = writeln!(
            out,
            "Audit ({vulnerable} of {total} detected, showing {rows}):"
        );
    } else {
        let _ = writeln!(out, "Audit ({vulnerable} of {total} detected):");
    }
    write_findings_table(out, &report.audit, rows, cfg.color);

    if cfg.verbose && !schema.objects.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Objects:");
        for object in schema.objects.iter().take(cfg.max_table_rows) {
            let _ = writeln!(
                out,
                "  {}  {}",
                pad_start_display(&object.field_count.to_string(), 4),
                object.name
            );
        }
    }
}

pub fn print_probes(catalog: &ProbeCatalog, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    write_probes(&mut out, catalog, cfg.color);
}

pub fn write_probes(out: &mut dyn Write, catalog: &ProbeCatalog, color: bool) {
    let label_id = "ID";
    let label_sev = "SEVERITY";
    let id_w = catalog
        .ids()
        .map(visible_width_ansi)
        .max()
        .unwrap_or(0)
        .max(label_id.len());
    let sev_w = label_sev.len();

    let _ = writeln!(
        out,
        "{}  {}  TITLE",
        pad_end_display(label_id, id_w),
        pad_end_display(label_sev, sev_w)
    );
    let _ = writeln!(out, "{}  {}  {}", "-".repeat(id_w), "-".repeat(sev_w), "-".repeat(5));
    for probe in catalog.iter() {
        let _ = writeln!(
            out,
            "{}  {}  {}",
            pad_end_display(probe.id(), id_w),
            pad_end_display(&format_severity(probe.severity(), color), sev_w),
            probe.title()
        );
    }
}

fn write_findings_table(out: &mut dyn Write, findings: &[Finding], rows: usize, color: bool) {
    let label_sev = "SEVERITY";
    let label_result = "RESULT";
    let label_title = "TITLE";

    let sev_w = visible_width_ansi(label_sev);
    let result_w = visible_width_ansi(label_result).max("detected".len());
    let title_w = findings
        .iter()
        .take(rows)
        .map(|f| visible_width_ansi(&f.title))
        .max()
        .unwrap_or(0)
        .max(label_title.len());

    let _ = writeln!(
        out,
        "{}  {}  {}  IMPACT",
        pad_end_display(label_sev, sev_w),
        pad_end_display(label_result, result_w),
        pad_end_display(label_title, title_w)
    );
    let _ = writeln!(
        out,
        "{}  {}  {}  {}",
        "-".repeat(sev_w),
        "-".repeat(result_w),
        "-".repeat(title_w),
        "-".repeat(6)
    );

    for finding in findings.iter().take(rows) {
        let result = if finding.result { "detected" } else { "-" };
        let _ = writeln!(
            out,
            "{}  {}  {}  {}",
            pad_end_display(&format_severity(finding.severity, color), sev_w),
            pad_end_display(result, result_w),
            pad_end_display(&finding.title, title_w),
            truncate_middle(&finding.impact, 48)
        );
    }
}

fn format_severity(severity: Severity, color: bool) -> String {
    let s = severity.as_str();
    if !color {
        return s.to_string();
    }

    let code = match severity {
        Severity::Info => "90",
        Severity::Low => "32",
        Severity::Medium => "33",
        Severity::High => "31",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

fn truncate_middle(s: &str, max_chars: usize) -> String {
    let len = s.chars().count();
    if len <= max_chars {
        return s.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let left = keep / 2;
    let right = keep.saturating_sub(left);

    let prefix: String = s.chars().take(left).collect();
    let suffix: String = s.chars().skip(len - right).collect();

    format!("{prefix}...{suffix}")
}

fn pad_end_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn pad_start_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{}{}", " ".repeat(width - w), s)
}

fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}
