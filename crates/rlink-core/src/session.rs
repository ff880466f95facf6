//! A connection to a long-lived R interpreter.
//!
//! [`Session`] owns the interpreter and the transfer endpoint and turns the
//! asynchronous exchange into a sequence of awaited calls:
//!
//! ```no_run
//! # async fn demo() -> rlink::Result<()> {
//! let mut session = rlink::Session::builder().connect().await?;
//! session.push(&[4.0, 5.0, 6.0], "mydata").await?;
//! session.run("mydata = mydata + 1").await?;
//! let out: Vec<f64> = session.pull("mydata").await?;
//! session.close().await
//! # }
//! ```
//!
//! Once an interpreter error or a decode failure happens, the session
//! latches it: every later call returns that error without doing anything
//! until [`Session::take_error`] clears it. Warnings are reported but never
//! latch.

use crate::config::{EndpointConfig, InterpreterConfig, ProtocolConfig};
use crate::endpoint::{EndpointHandle, TransferEndpoint};
use crate::interpreter::{check_dependencies, Interpreter, RProcess};
use crate::protocol::{self, validate_name};
use crate::store::BlobStore;
use crate::table::Table;
use crate::{Result, RlinkError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Builder for [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    r_binary: Option<String>,
    debug: bool,
    skip_dependency_check: bool,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// R executable to run. Defaults to `$RLINK_R_BINARY`, then `R`.
    pub fn r_binary(mut self, path: impl Into<String>) -> Self {
        self.r_binary = Some(path.into());
        self
    }

    /// Pass the interpreter's stdout/stderr through instead of discarding it.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn skip_dependency_check(mut self, skip: bool) -> Self {
        self.skip_dependency_check = skip;
        self
    }

    /// Check dependencies, start R and connect to it.
    pub async fn connect(self) -> Result<Session> {
        let program = self
            .r_binary
            .unwrap_or_else(InterpreterConfig::binary_from_env);

        if self.skip_dependency_check {
            debug!("Skipping dependency check for {}", program);
        } else {
            check_dependencies(&program).await?;
        }

        let process = RProcess::spawn(&program, self.debug)?;
        Session::with_interpreter(process).await
    }
}

/// Removes a pushed blob when the push returns.
struct BlobGuard {
    blobs: Arc<BlobStore>,
    key: String,
}

impl Drop for BlobGuard {
    fn drop(&mut self) {
        self.blobs.remove(&self.key);
    }
}

/// A connection to one interpreter.
///
/// Every operation takes `&mut self`: one command is in flight at a time.
pub struct Session {
    endpoint: EndpointHandle,
    interpreter: Box<dyn Interpreter>,
    error: Option<RlinkError>,
    next_id: u64,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Connect over an already running interpreter.
    ///
    /// Starts the transfer endpoint and loads the R packages the command
    /// templates use.
    pub async fn with_interpreter(interpreter: impl Interpreter + 'static) -> Result<Self> {
        let endpoint = TransferEndpoint::start().await?;
        let mut session = Session {
            endpoint,
            interpreter: Box::new(interpreter),
            error: None,
            next_id: 0,
        };

        // The template itself needs these, so they go in unwrapped.
        let preamble: String = InterpreterConfig::REQUIRED_PACKAGES
            .iter()
            .map(|p| format!("library({})\n", p))
            .collect();
        session.interpreter.write_input(&preamble).await?;

        info!("Session connected on port {}", session.port());
        Ok(session)
    }

    /// Port of the transfer endpoint.
    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    /// The latched error, if any.
    pub fn error(&self) -> Option<&RlinkError> {
        self.error.as_ref()
    }

    /// Clear and return the latched error.
    pub fn take_error(&mut self) -> Option<RlinkError> {
        self.error.take()
    }

    fn check(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn latch<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_sticky() && self.error.is_none() {
                error!("Session error: {}", err);
                self.error = Some(err.clone());
            }
        }
        result
    }

    fn next_key(&mut self, prefix: &str) -> String {
        let key = format!("{}.{}", prefix, self.next_id);
        self.next_id += 1;
        key
    }

    /// Run an R command.
    ///
    /// Returns `Err(RlinkError::InterpreterWarning)` when the command only
    /// warned; that does not latch.
    pub async fn run(&mut self, command: &str) -> Result<()> {
        self.check()?;
        let result = protocol::execute(&self.endpoint, self.interpreter.as_mut(), command).await;
        self.latch(result)
    }

    /// Assign the JSON encoding of `value` to the R variable `name`.
    pub async fn push<T: Serialize + ?Sized>(&mut self, value: &T, name: &str) -> Result<()> {
        self.check()?;
        validate_name(name)?;
        let encoded = serde_json::to_vec(value).map_err(RlinkError::from);
        let bytes = self.latch(encoded)?;
        self.push_bytes(bytes, name, protocol::fetch_command).await
    }

    /// Build the R data.frame `name` from `table`.
    ///
    /// The table is validated first; a mixed column is a non-latching error.
    pub async fn push_table(&mut self, table: &Table, name: &str) -> Result<()> {
        self.check()?;
        validate_name(name)?;
        table.validate()?;
        let encoded = serde_json::to_vec(table).map_err(RlinkError::from);
        let bytes = self.latch(encoded)?;
        self.push_bytes(bytes, name, protocol::fetch_table_command)
            .await
    }

    async fn push_bytes(
        &mut self,
        bytes: Vec<u8>,
        name: &str,
        build_command: fn(&str, &str) -> String,
    ) -> Result<()> {
        let key = self.next_key(ProtocolConfig::PUSH_KEY_PREFIX);
        let blobs = self.endpoint.blobs().clone();
        debug!("Pushing {} bytes to {} as {}", bytes.len(), name, key);
        blobs.put(key.clone(), bytes);
        let guard = BlobGuard { blobs, key };

        let command = build_command(name, &self.endpoint.url_for(&guard.key));
        let result = protocol::execute(&self.endpoint, self.interpreter.as_mut(), &command).await;
        self.latch(result)
    }

    /// Decode the R variable `name` into `T`.
    pub async fn pull<T: DeserializeOwned>(&mut self, name: &str) -> Result<T> {
        self.check()?;
        validate_name(name)?;
        self.pull_with(name, protocol::deliver_command).await
    }

    /// Read the R data.frame `name` into a [`Table`].
    pub async fn pull_table(&mut self, name: &str) -> Result<Table> {
        self.check()?;
        validate_name(name)?;
        self.pull_with(name, protocol::deliver_table_command).await
    }

    async fn pull_with<T: DeserializeOwned>(
        &mut self,
        name: &str,
        build_command: fn(&str, &str) -> String,
    ) -> Result<T> {
        let key = self.next_key(ProtocolConfig::PULL_KEY_PREFIX);
        let mut slot = self.endpoint.rendezvous().register(key.as_str());
        let command = build_command(name, &self.endpoint.url_for(&key));
        debug!("Pulling {} through {}", name, key);

        // The data arrives before the result record, so a command that
        // succeeded has already handed its payload over. A failed command
        // may never deliver, so the receive side is dropped.
        let outcome = {
            let receive = async {
                let delivery = slot.wait().await?;
                let bytes = delivery
                    .read_to_end(EndpointConfig::MAX_DELIVERY_BYTES)
                    .await?;
                serde_json::from_slice::<T>(&bytes)
                    .map_err(|e| RlinkError::decode(format!("variable {}", name), e))
            };
            let execute = protocol::execute(&self.endpoint, self.interpreter.as_mut(), &command);
            tokio::pin!(receive);
            tokio::pin!(execute);

            tokio::select! {
                executed = &mut execute => match executed {
                    Ok(()) => receive.await,
                    Err(e) => Err(e),
                },
                received = &mut receive => {
                    let executed = execute.await;
                    executed.and(received)
                }
            }
        };
        self.latch(outcome)
    }

    /// Quit the interpreter and stop the endpoint.
    ///
    /// Every step is attempted; the first failure is returned.
    pub async fn close(mut self) -> Result<()> {
        info!("Closing session on port {}", self.port());
        let quit = self
            .interpreter
            .write_input(InterpreterConfig::QUIT_COMMAND)
            .await;
        let closed = self.interpreter.close_input().await;
        let exited = self.interpreter.wait().await;
        let stopped = self.endpoint.shutdown().await;
        quit.and(closed).and(exited).and(stopped)
    }
}
