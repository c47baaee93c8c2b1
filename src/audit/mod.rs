//! Runs a catalog of independent probes against one target and aggregates their findings.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};

use crate::core::{Finding, Severity, sort_findings};
use crate::error::{AuditError, ProbeError};
use crate::transport::{DEFAULT_TIMEOUT, Headers};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-run settings handed to every probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Budget for each network request a probe issues.
    pub request_timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One vulnerability check. Implementations must not share mutable state between runs.
pub trait Probe: Send + Sync {
    fn id(&self) -> &str;
    fn title(&self) -> &str;
    fn severity(&self) -> Severity;
    fn run(
        &self,
        target: &str,
        options: &ProbeOptions,
        headers: &Headers,
        verbose: bool,
    ) -> Result<Finding, ProbeError>;
}

#[derive(Clone, Default)]
pub struct ProbeCatalog {
    probes: BTreeMap<String, Arc<dyn Probe>>,
}

impl ProbeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, probe: Arc<dyn Probe>) -> Result<(), AuditError> {
        let id = probe.id().to_string();
        if self.probes.contains_key(&id) {
            return Err(AuditError::DuplicateProbe(id));
        }
        self.probes.insert(id, probe);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.probes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Probe>> {
        self.probes.values()
    }

    /// Keeps probes matching any `only` glob (all when empty) and none of the `skip` globs.
    pub fn filter(&self, only: &[String], skip: &[String]) -> Result<ProbeCatalog, AuditError> {
        let only_set = build_globset(only)?;
        let skip_set = build_globset(skip)?;
        let probes = self
            .probes
            .iter()
            .filter(|(id, _)| only.is_empty() || only_set.is_match(id.as_str()))
            .filter(|(id, _)| !skip_set.is_match(id.as_str()))
            .map(|(id, probe)| (id.clone(), Arc::clone(probe)))
            .collect();
        Ok(ProbeCatalog { probes })
    }
}

impl std::fmt::Debug for ProbeCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, AuditError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| AuditError::InvalidFilter {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| AuditError::InvalidFilter {
        pattern: patterns.join(","),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    pub concurrent: bool,
    pub probe_timeout: Duration,
    pub probe: ProbeOptions,
    pub verbose: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            concurrent: true,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe: ProbeOptions::default(),
            verbose: false,
        }
    }
}

/// Default audit headers overlaid by the operator's headers.
///
/// Header names compare case-insensitively: an operator `User-Agent` replaces a default `user-agent`.
pub fn combine_headers(defaults: &Headers, operator: &Headers) -> Headers {
    let mut combined: Headers = defaults
        .iter()
        .filter(|(name, _)| !operator.keys().any(|op| op.eq_ignore_ascii_case(name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    for (name, value) in operator {
        combined.insert(name.clone(), value.clone());
    }
    combined
}

type Outcome = (String, Result<Finding, ProbeError>);

/// Runs every probe once and returns the findings sorted by title.
///
/// Any failed, panicking or late probe fails the audit. With several failures the one with the
/// smallest probe id is returned.
pub fn run_audit(
    target: &str,
    headers: &Headers,
    catalog: &ProbeCatalog,
    opts: &AuditOptions,
) -> Result<Vec<Finding>, AuditError> {
    info!(
        probes = catalog.len(),
        concurrent = opts.concurrent,
        "starting audit"
    );
    let mut findings = if opts.concurrent {
        run_concurrent(target, headers, catalog, opts)?
    } else {
        run_sequential(target, headers, catalog, opts)?
    };
    sort_findings(&mut findings);
    Ok(findings)
}

fn run_sequential(
    target: &str,
    headers: &Headers,
    catalog: &ProbeCatalog,
    opts: &AuditOptions,
) -> Result<Vec<Finding>, AuditError> {
    let mut findings = Vec::with_capacity(catalog.len());
    for probe in catalog.iter() {
        let (tx, rx) = mpsc::channel();
        spawn_probe(Arc::clone(probe), target, headers, opts, tx);
        let finding = match rx.recv_timeout(opts.probe_timeout) {
            Ok((_, outcome)) => outcome?,
            Err(_) => return Err(timed_out(probe.id(), opts.probe_timeout).into()),
        };
        findings.push(finding);
    }
    Ok(findings)
}

fn run_concurrent(
    target: &str,
    headers: &Headers,
    catalog: &ProbeCatalog,
    opts: &AuditOptions,
) -> Result<Vec<Finding>, AuditError> {
    let (tx, rx) = mpsc::channel();
    for probe in catalog.iter() {
        spawn_probe(Arc::clone(probe), target, headers, opts, tx.clone());
    }
    drop(tx);

    let deadline = Instant::now() + opts.probe_timeout;
    let mut outcomes: BTreeMap<String, Result<Finding, ProbeError>> = BTreeMap::new();
    while outcomes.len() < catalog.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((id, outcome)) => {
                outcomes.insert(id, outcome);
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for id in catalog.ids() {
        if !outcomes.contains_key(id) {
            outcomes.insert(id.to_string(), Err(timed_out(id, opts.probe_timeout)));
        }
    }

    let mut findings = Vec::with_capacity(outcomes.len());
    for (_, outcome) in outcomes {
        findings.push(outcome?);
    }
    Ok(findings)
}

fn spawn_probe(
    probe: Arc<dyn Probe>,
    target: &str,
    headers: &Headers,
    opts: &AuditOptions,
    tx: mpsc::Sender<Outcome>,
) {
    let target = target.to_string();
    let headers = headers.clone();
    let options = opts.probe.clone();
    let verbose = opts.verbose;
    thread::spawn(move || {
        let id = probe.id().to_string();
        debug!(probe = %id, "probe started");
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            probe.run(&target, &options, &headers, verbose)
        }))
        .unwrap_or_else(|_| Err(ProbeError::Panicked { probe: id.clone() }));
        if let Err(err) = &outcome {
            warn!(probe = %id, error = %err, "probe failed");
        }
        // The receiver is gone once the audit gave up on this probe.
        let _ = tx.send((id, outcome));
    });
}

fn timed_out(id: &str, after: Duration) -> ProbeError {
    ProbeError::TimedOut {
        probe: id.to_string(),
        after,
    }
}
