#![forbid(unsafe_code)]

//! `spike-repl`: command-line client for the LEGO SPIKE hub REPL.
//!
//! Connects to the hub, then either runs one command (`exec`, `eval`) or an
//! interactive shell over stdin.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use spike_repl::config::PORT_ENV_VAR;
use spike_repl::repl::tag::parse_tagged_line;
use spike_repl::{AppError, HubPort, PairSlot, ReplConfig, ReplSession, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "spike-repl", about = "LEGO SPIKE hub REPL client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial device of the hub; overrides `port_name` from the config.
    #[arg(long)]
    port: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Do not send the prelude statements after connecting.
    #[arg(long)]
    no_prelude: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send statements without waiting for output.
    Exec {
        /// Statements, sent in order.
        #[arg(required = true)]
        statements: Vec<String>,
    },

    /// Evaluate an expression and print its value.
    Eval {
        /// Expression to evaluate on the hub.
        expr: String,
        /// Reply deadline; defaults to `wait_timeout_ms` from the config.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Read statements from stdin.
    ///
    /// `?<expr>` evaluates and prints, `:pair <L> <R>`, `:unpair <L> <R>`
    /// and `:slots` manage motor pairs, anything else is sent as is.
    Shell,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let session = ReplSession::serial(resolve_config(&args)?);
    session.connect().await?;
    info!(port = %session.config().port_name, "connected to hub");

    let outcome = match args.command {
        Command::Exec { statements } => session.send_code(&statements).await,
        Command::Eval { expr, timeout_ms } => session
            .send_code_and_wait_result(&expr, timeout_ms.map(Duration::from_millis))
            .await
            .map(|value| println!("{value}")),
        Command::Shell => run_shell(&session).await,
    };

    if let Err(err) = session.disconnect().await {
        error!(%err, "disconnect failed");
    }
    outcome
}

fn resolve_config(args: &Cli) -> Result<ReplConfig> {
    let mut config = match (&args.config, &args.port) {
        (Some(path), _) => ReplConfig::load_from_path(path)?,
        (None, Some(port)) => ReplConfig::for_port(port.clone()),
        (None, None) => ReplConfig::for_port(std::env::var(PORT_ENV_VAR).unwrap_or_default()),
    };

    if let Some(port) = &args.port {
        config.port_name.clone_from(port);
    }
    if args.no_prelude {
        config.prelude.clear();
    }

    config.validate()?;
    Ok(config)
}

async fn run_shell(session: &ReplSession) -> Result<()> {
    // Echo program output; tagged replies are printed by their callers.
    let mut output = session.subscribe_output();
    let echo = tokio::spawn(async move {
        while let Ok(line) = output.recv().await {
            if parse_tagged_line(&line).is_none() {
                println!("{line}");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = shutdown_signal() => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        if let Err(err) = run_shell_line(session, line.trim()).await {
            eprintln!("{err}");
        }
    }

    echo.abort();
    Ok(())
}

async fn run_shell_line(session: &ReplSession, line: &str) -> Result<()> {
    if line.is_empty() {
        return Ok(());
    }

    if let Some(expr) = line.strip_prefix('?') {
        let value = session.send_code_and_wait_result(expr.trim(), None).await?;
        println!("{value}");
        return Ok(());
    }

    let mut words = line.split_whitespace();
    match words.next() {
        Some(":pair") => {
            let (left, right) = parse_ports(words)?;
            let slot = session.acquire_pair_slot(left, right).await?;
            println!("pair slot {}", slot.index);
        }
        Some(":unpair") => {
            let (left, right) = parse_ports(words)?;
            let slot = session
                .pair_slots()
                .into_iter()
                .map(|(slot, _)| slot)
                .find(|slot: &PairSlot| slot.left == left && slot.right == right)
                .ok_or_else(|| AppError::NotFound(format!("no pair bound to ({left}, {right})")))?;
            session.release_pair_slot(slot).await?;
        }
        Some(":slots") => {
            for (slot, status) in session.pair_slots() {
                println!("{}: ({}, {}) {status:?}", slot.index, slot.left, slot.right);
            }
        }
        _ => session.send_code(&[line]).await?,
    }
    Ok(())
}

fn parse_ports<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<(HubPort, HubPort)> {
    match (words.next(), words.next()) {
        (Some(left), Some(right)) => Ok((left.parse()?, right.parse()?)),
        _ => Err(AppError::Config("expected two ports, e.g. `A B`".into())),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
