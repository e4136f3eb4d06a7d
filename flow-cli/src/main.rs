//! flow-run: load a flow file, fire a trigger, print the results as JSON

mod tracing_support;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use flow_api::{Grants, SideEffect, TriggerContext, TriggerType, Value};
use flow_host::audit::{AuditSink, FileAuditSink, NullAuditSink};
use flow_host::capability::{DeniedSandbox, LoggingUi, SandboxCapability};
use flow_host::{
    default_flow_dirs, EngineConfig, FlowEngine, FlowLoader, FlowRuntime, FlowScanner,
    NodeRegistry, PluginState,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_support::{init_subscriber, TracingConfig, TracingFormat};

#[derive(Parser, Debug)]
#[command(name = "flow-run", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter directive (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = TracingFormat::Pretty)]
    log_format: TracingFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a flow file without running it
    Validate(FlowArgs),
    /// Load every *.flow.json in a directory, or in the default flow directories
    Scan {
        dir: Option<PathBuf>,
        #[command(flatten)]
        grants: GrantArgs,
    },
    /// Fire a trigger into a flow
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct GrantArgs {
    /// Granted side effects; all when omitted
    #[arg(long, value_delimiter = ',')]
    grant: Vec<String>,
}

impl GrantArgs {
    fn grants(&self) -> anyhow::Result<Grants> {
        if self.grant.is_empty() {
            return Ok(Grants::all());
        }
        self.grant.iter().try_fold(Grants::none(), |grants, name| {
            let effect = SideEffect::ALL
                .into_iter()
                .find(|e| e.as_str().eq_ignore_ascii_case(name.trim()))
                .with_context(|| format!("unknown side effect '{}'", name))?;
            Ok(grants.with(effect))
        })
    }
}

#[derive(Args, Debug)]
struct FlowArgs {
    /// Flow definition (JSON)
    flow: PathBuf,
    #[command(flatten)]
    grants: GrantArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    flow: FlowArgs,

    /// Trigger type, e.g. OnClick, OnTimer, OnMessage
    #[arg(long, default_value = "OnClick")]
    trigger: String,

    /// Target id (UI triggers) or message type (OnMessage)
    #[arg(long)]
    selector: Option<String>,

    /// Trigger payload entry, key=value
    #[arg(long = "data", value_parser = parse_pair)]
    data: Vec<(String, Value)>,

    /// Initial plugin state entry, key=value
    #[arg(long = "state", value_parser = parse_pair)]
    state: Vec<(String, Value)>,

    /// Engine configuration file (JSON)
    #[arg(long, env = "FLOW_ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Append audit events to this JSONL file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Refuse all network access
    #[arg(long)]
    offline: bool,

    /// Print the final plugin state after the runs
    #[arg(long)]
    print_state: bool,
}

/// `key=value`; the value is read as JSON when it parses, else as text
fn parse_pair(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let value = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.trim().to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber(&TracingConfig {
        level: cli.log_level.clone(),
        format: cli.log_format,
        ..TracingConfig::default()
    })?;

    match cli.command {
        Command::Validate(args) => validate(&args),
        Command::Scan { dir, grants } => scan(dir, &grants),
        Command::Run(args) => run(args).await,
    }
}

fn validate(args: &FlowArgs) -> anyhow::Result<()> {
    let loaded = FlowLoader::default()
        .load_file(&args.flow, &args.grants.grants()?)
        .with_context(|| format!("loading {}", args.flow.display()))?;
    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }
    println!("{} ok ({})", loaded.flow_id(), loaded.hash);
    Ok(())
}

fn scan(dir: Option<PathBuf>, grants: &GrantArgs) -> anyhow::Result<()> {
    let scanner = FlowScanner::new(FlowLoader::default(), grants.grants()?);
    let result = match dir {
        Some(dir) => scanner.scan_directory(&dir)?,
        None => scanner.scan_directories(existing_dirs(default_flow_dirs(env!("CARGO_PKG_NAME")))),
    };
    for flow in &result.flows {
        println!("{} ok ({})", flow.flow_id(), flow.hash);
    }
    for (path, error) in &result.failures {
        eprintln!("{}: {}", path.display(), error);
    }
    if !result.is_success() {
        bail!("{} of {} flows failed to load", result.failures.len(), result.total_found());
    }
    Ok(())
}

/// Default directories that are actually present
fn existing_dirs(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    dirs.into_iter()
        .filter(|dir| {
            let present = dir.is_dir();
            if !present {
                tracing::debug!(dir = %dir.display(), "Skipping missing flow directory");
            }
            present
        })
        .collect()
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    let audit: Arc<dyn AuditSink> = match &args.audit_log {
        Some(path) => Arc::new(FileAuditSink::new(path)?),
        None => Arc::new(NullAuditSink),
    };

    let registry = NodeRegistry::shared();
    let loaded = FlowLoader::new(Arc::clone(&registry))
        .with_audit(Arc::clone(&audit))
        .load_file(&args.flow.flow, &args.flow.grants.grants()?)
        .with_context(|| format!("loading {}", args.flow.flow.display()))?;

    let state = Arc::new(PluginState::from_map(args.state.into_iter().collect()));
    let engine = FlowEngine::builder()
        .registry(registry)
        .state(Arc::clone(&state))
        .ui(Arc::new(LoggingUi))
        .sandbox(sandbox(&config, args.offline))
        .audit(Arc::clone(&audit))
        .config(config)
        .build();

    let ctx = args
        .data
        .into_iter()
        .fold(TriggerContext::new(), |ctx, (k, v)| ctx.with_data(k, v));
    let runtime = FlowRuntime::new(loaded, Arc::new(engine));
    let results = runtime
        .dispatch(&TriggerType::from(args.trigger.as_str()), args.selector.as_deref(), ctx)
        .await;
    tracing::info!(flow_id = %runtime.flow().flow_id(), runs = results.len(), "Dispatched trigger");
    audit.flush()?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    if args.print_state {
        println!("{}", serde_json::to_string_pretty(&state.snapshot())?);
    }
    if results.is_empty() {
        bail!("no trigger matched {}", args.trigger);
    }
    Ok(())
}

#[cfg(feature = "net")]
fn sandbox(config: &EngineConfig, offline: bool) -> Arc<dyn SandboxCapability> {
    if offline {
        Arc::new(DeniedSandbox)
    } else {
        Arc::new(flow_host::NetworkSandbox::new(config.network.clone()))
    }
}

#[cfg(not(feature = "net"))]
fn sandbox(_config: &EngineConfig, _offline: bool) -> Arc<dyn SandboxCapability> {
    Arc::new(DeniedSandbox)
}
