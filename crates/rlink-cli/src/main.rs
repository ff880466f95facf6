//! rlink CLI - evaluate R commands through an rlink session.
//!
//! Commands come from the argument list, or one per line from stdin when no
//! arguments are given. Warnings are printed to stderr; the first error
//! stops evaluation with a non-zero exit.

use anyhow::{Context, Result};
use clap::Parser;
use rlink::config::InterpreterConfig;
use rlink::{check_dependencies, RlinkError, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "rlink")]
#[command(about = "Evaluate R commands through a long-lived R session")]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Pass R's own output through to this terminal
    #[arg(long)]
    show_output: bool,

    /// R executable (defaults to $RLINK_R_BINARY, then R)
    #[arg(long)]
    r_binary: Option<String>,

    /// Skip checking for the required R packages
    #[arg(long)]
    skip_dependency_check: bool,

    /// Only check that R and the required packages are available
    #[arg(long)]
    check: bool,

    /// Commands to evaluate in order (read from stdin when omitted)
    commands: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout belongs to R. RUST_LOG overrides --debug.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(args.debug)));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let program = args
        .r_binary
        .clone()
        .unwrap_or_else(InterpreterConfig::binary_from_env);

    if args.check {
        check_dependencies(&program)
            .await
            .with_context(|| format!("{} is not usable by rlink", program))?;
        println!("{}: ok", program);
        return Ok(());
    }

    let mut session = Session::builder()
        .r_binary(program.as_str())
        .debug(args.show_output)
        .skip_dependency_check(args.skip_dependency_check)
        .connect()
        .await
        .with_context(|| format!("Failed to start {}", program))?;

    info!("R session ready");

    let outcome = if args.commands.is_empty() {
        evaluate_stdin(&mut session).await
    } else {
        evaluate_all(&mut session, &args.commands).await
    };

    let closed = session.close().await;
    outcome?;
    closed.context("Failed to shut down the R session")?;
    Ok(())
}

fn default_log_level(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

async fn evaluate_all(session: &mut Session, commands: &[String]) -> Result<()> {
    for command in commands {
        evaluate(session, command).await?;
    }
    Ok(())
}

async fn evaluate_stdin(session: &mut Session) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        evaluate(session, command).await?;
    }
    Ok(())
}

async fn evaluate(session: &mut Session, command: &str) -> Result<()> {
    debug!("Evaluating: {}", command);
    match session.run(command).await {
        Ok(()) => Ok(()),
        Err(RlinkError::InterpreterWarning(message)) => {
            eprintln!("Warning: {}", message);
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("Command failed: {}", command))),
    }
}
