//! Interpreter process handling.
//!
//! The session only needs to write text to the interpreter's input and, on
//! close, wait for it to exit. That surface is the [`Interpreter`] trait;
//! [`RProcess`] implements it over a spawned `R` child process.

use crate::config::InterpreterConfig;
use crate::{Result, RlinkError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

/// Input side of a running interpreter.
#[async_trait]
pub trait Interpreter: Send {
    /// Write text to the interpreter's input stream.
    async fn write_input(&mut self, text: &str) -> Result<()>;

    /// Close the input stream. Further writes fail.
    async fn close_input(&mut self) -> Result<()>;

    /// Wait for the interpreter to exit. A non-success exit is an error.
    async fn wait(&mut self) -> Result<()>;
}

/// A spawned R process fed through its stdin.
///
/// The child is killed if this value is dropped without [`Interpreter::wait`].
#[derive(Debug)]
pub struct RProcess {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl RProcess {
    /// Spawn `program --no-save`.
    ///
    /// With `debug` set the interpreter's stdout/stderr are inherited,
    /// otherwise they are discarded.
    pub fn spawn(program: &str, debug: bool) -> Result<Self> {
        Self::spawn_with_args(program, InterpreterConfig::SESSION_ARGS, debug)
    }

    /// Spawn `program` with explicit arguments.
    pub fn spawn_with_args(program: &str, args: &[&str], debug: bool) -> Result<Self> {
        let output = || if debug { Stdio::inherit() } else { Stdio::null() };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(output())
            .stderr(output())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RlinkError::Launch {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| RlinkError::Launch {
            program: program.to_string(),
            message: "stdin was not captured".to_string(),
        })?;

        info!("Started {} (PID {:?})", program, child.id());

        Ok(Self {
            program: program.to_string(),
            child,
            stdin: Some(stdin),
        })
    }

    /// OS process id, if the process is still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl Interpreter for RProcess {
    async fn write_input(&mut self, text: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| RlinkError::Transport {
            message: format!("{} input is closed", self.program),
        })?;
        stdin.write_all(text.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn close_input(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await?;
        }
        Ok(())
    }

    async fn wait(&mut self) -> Result<()> {
        let status = self.child.wait().await?;
        debug!("{} exited with {}", self.program, status);
        if status.success() {
            Ok(())
        } else {
            warn!("{} exited unsuccessfully: {}", self.program, status);
            Err(RlinkError::ProcessExit {
                status: status.to_string(),
            })
        }
    }
}

/// R expression printing `TRUE` when every required package is installed.
pub fn dependency_check_script() -> String {
    let packages = InterpreterConfig::REQUIRED_PACKAGES
        .iter()
        .map(|p| format!("\"{}\"", p))
        .collect::<Vec<_>>()
        .join(", ");
    format!("cat(all(c({}) %in% installed.packages()[, 1]))", packages)
}

/// Verify that `program` is runnable and has the packages rlink relies on.
pub async fn check_dependencies(program: &str) -> Result<()> {
    let output = Command::new(program)
        .args(InterpreterConfig::CHECK_ARGS)
        .arg(dependency_check_script())
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| RlinkError::Launch {
            program: program.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(RlinkError::Dependency {
            message: format!(
                "dependency check exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.trim() != "TRUE" {
        debug!("Dependency check printed: {:?}", stdout);
        return Err(RlinkError::Dependency {
            message: format!(
                "need to install {}",
                InterpreterConfig::REQUIRED_PACKAGES
                    .iter()
                    .map(|p| format!("'{}'", p))
                    .collect::<Vec<_>>()
                    .join(" and ")
            ),
        });
    }

    Ok(())
}
