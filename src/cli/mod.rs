use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::config::EffectiveConfig;
use crate::engine::{Engine, EngineOptions};
use crate::exit::{ExitCode, ExitError};
use crate::transport::{HttpTransport, Transport};
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "gqlscope",
    version,
    about = "Fingerprint, map and audit a GraphQL endpoint from its introspection schema"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Per-request timeout in seconds (overrides `transport.timeout_secs`).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Introspect, fingerprint, map and audit a target.
    Analyze(AnalyzeArgs),
    /// Send one GraphQL operation and print the raw response.
    Query(QueryArgs),
    /// List the effective probe catalog.
    Probes,
    /// Serve one API request: request JSON on stdin, response JSON on stdout.
    Api(ApiArgs),
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[arg(long)]
    pub target: String,
    /// JSON object of extra request headers.
    #[arg(long)]
    pub headers: Option<String>,
    /// Skip probes whose id matches this glob (repeatable).
    #[arg(long)]
    pub skip: Vec<String>,
    /// Run only probes whose id matches this glob (repeatable).
    #[arg(long)]
    pub only: Vec<String>,
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[arg(long)]
    pub target: String,
    #[arg(long)]
    pub query: String,
    #[arg(long)]
    pub variables: Option<String>,
    #[arg(long)]
    pub operation_name: Option<String>,
    #[arg(long)]
    pub headers: Option<String>,
}

#[derive(Debug, Args)]
pub struct ApiArgs {
    #[command(subcommand)]
    pub command: ApiCommand,
}

#[derive(Debug, Subcommand)]
pub enum ApiCommand {
    Analyze,
    Query,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Serialize)]
struct ProbeListing<'a> {
    id: &'a str,
    title: &'a str,
    severity: crate::core::Severity,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    crate::logs::init(cli.verbose, cli.quiet).map_err(crate::exit::invalid_args_err)?;

    let home_dir = home_dir()?;
    let mut cfg =
        crate::config::load(cli.config.as_deref(), &home_dir).map_err(crate::exit::invalid_args_err)?;
    if let Some(timeout) = cli.timeout {
        if timeout == 0 {
            return Err(crate::exit::invalid_args("--timeout must be greater than 0"));
        }
        cfg.transport.timeout_secs = timeout;
        crate::config::validate(&cfg).map_err(crate::exit::invalid_args_err)?;
    }

    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();
    let ui_cfg = UiConfig {
        color: stdout_is_tty && cfg.ui.color && !cli.no_color,
        stdout_is_tty,
        stderr_is_tty,
        max_table_rows: cfg.ui.max_table_rows,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Analyze(args) => {
            let headers = crate::api::parse_headers(args.headers.map(Value::String).as_ref())
                .map_err(|e| crate::exit::scan_err(e.into()))?;
            let mut skip = cfg.audit.skip.clone();
            skip.extend(args.skip);
            skip.sort();
            skip.dedup();

            let transport = build_transport(&cfg)?;
            let catalog = crate::probes::build_catalog(Arc::clone(&transport), &cfg.probes)
                .and_then(|catalog| catalog.filter(&args.only, &skip))
                .map_err(|e| crate::exit::invalid_args_err(e.into()))?;

            let mut opts = engine_options(&cfg, cli.verbose);
            opts.audit.concurrent = opts.audit.concurrent && !args.sequential;
            opts.show_progress = ui_cfg.stderr_is_tty && !cli.quiet && !cli.json;
            let engine = Engine::new(transport, catalog, opts);

            let report = engine
                .analyze(&args.target, &headers)
                .map_err(crate::exit::scan_err)?;
            if cli.json {
                write_json(&report)?;
            } else {
                crate::ui::print_report(&report, &ui_cfg);
            }
        }
        Commands::Query(args) => {
            let headers = crate::api::parse_headers(args.headers.map(Value::String).as_ref())
                .map_err(|e| crate::exit::scan_err(e.into()))?;
            let variables = crate::api::parse_variables(args.variables.map(Value::String).as_ref())
                .map_err(|e| crate::exit::scan_err(e.into()))?;
            let engine = build_engine(&cfg, cli.verbose)?;
            let body = engine
                .query(
                    &args.target,
                    &headers,
                    &args.query,
                    variables.as_ref(),
                    args.operation_name.as_deref(),
                )
                .map_err(crate::exit::scan_err)?;
            write_json(&body)?;
        }
        Commands::Probes => {
            let engine = build_engine(&cfg, cli.verbose)?;
            if cli.json {
                let listing: Vec<ProbeListing<'_>> = engine
                    .catalog()
                    .iter()
                    .map(|p| ProbeListing {
                        id: p.id(),
                        title: p.title(),
                        severity: p.severity(),
                    })
                    .collect();
                write_json(&listing)?;
            } else {
                crate::ui::print_probes(engine.catalog(), &ui_cfg);
            }
        }
        Commands::Api(args) => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("failed to read request from stdin")?;
            let engine = build_engine(&cfg, cli.verbose)?;
            let response = match serde_json::from_str::<Value>(&input) {
                Ok(request) => match args.command {
                    ApiCommand::Analyze => crate::api::handle_analyze(&engine, &request),
                    ApiCommand::Query => crate::api::handle_query(&engine, &request),
                },
                Err(err) => crate::api::ApiResponse::from(crate::error::ScanError::from(
                    crate::error::ValidationError::InvalidRequest(err.to_string()),
                )),
            };
            write_json(&response.body)?;
            if !response.is_success() {
                return Err(ExitError::new(
                    exit_code_for_status(response.status),
                    anyhow::anyhow!("request failed with status {}", response.status),
                )
                .into());
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "gqlscope", &mut out);
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    write_json(&cfg)?;
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: use `gqlscope config --show`");
            }
        }
    }

    Ok(())
}

fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("HOME is not set"))
}

fn build_transport(cfg: &EffectiveConfig) -> Result<Arc<dyn Transport>> {
    let transport =
        HttpTransport::new(&cfg.transport_options()).map_err(|e| crate::exit::scan_err(e.into()))?;
    Ok(Arc::new(transport))
}

fn engine_options(cfg: &EffectiveConfig, verbose: bool) -> EngineOptions {
    EngineOptions {
        audit: cfg.audit_options(verbose),
        audit_headers: cfg.audit.headers.clone(),
        include_introspection: cfg.report.include_introspection,
        show_progress: false,
    }
}

/// Engine over the configured catalog minus `audit.skip`.
fn build_engine(cfg: &EffectiveConfig, verbose: bool) -> Result<Engine> {
    let transport = build_transport(cfg)?;
    let catalog = crate::probes::build_catalog(Arc::clone(&transport), &cfg.probes)
        .and_then(|catalog| catalog.filter(&[], &cfg.audit.skip))
        .map_err(|e| crate::exit::invalid_args_err(e.into()))?;
    Ok(Engine::new(transport, catalog, engine_options(cfg, verbose)))
}

fn exit_code_for_status(status: u16) -> ExitCode {
    match status {
        400..=499 => ExitCode::InvalidArgs,
        502 => ExitCode::TargetUnreachable,
        _ => ExitCode::ScanFailed,
    }
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "unsupported shell: {other} (expected bash|zsh|fish)"
        ))),
    }
}
