//! Centralized configuration for rlink.
//!
//! Constants for the transfer endpoint, the command protocol and the R
//! interpreter process. Runtime choices (binary path, debug output) live on
//! [`crate::SessionBuilder`].

/// Transfer endpoint configuration.
pub struct EndpointConfig;

impl EndpointConfig {
    /// Host the endpoint binds to and the interpreter calls back on.
    pub const LOOPBACK_HOST: &'static str = "127.0.0.1";
    /// Upper bound on a single delivered body read into memory.
    pub const MAX_DELIVERY_BYTES: usize = 1 << 30; // 1GiB
}

/// Command/result protocol configuration.
pub struct ProtocolConfig;

impl ProtocolConfig {
    /// Fixed rendezvous key for command results.
    pub const RESULT_KEY: &'static str = "r.result";
    /// Prefix for blobs pushed from the host into R.
    pub const PUSH_KEY_PREFIX: &'static str = "host.data";
    /// Prefix for payloads pulled from R into the host.
    pub const PULL_KEY_PREFIX: &'static str = "r.data";
    /// R variable holding the result record while a command runs.
    pub const RESULT_VAR: &'static str = "..rlink.ret";
    /// R scratch variable used by table transfers.
    pub const TABLE_SCRATCH_VAR: &'static str = "..rlink.tbl";
}

/// R interpreter process configuration.
pub struct InterpreterConfig;

impl InterpreterConfig {
    /// Default R executable looked up on `PATH`.
    pub const DEFAULT_BINARY: &'static str = "R";
    /// Environment variable overriding the default binary.
    pub const BINARY_ENV_VAR: &'static str = "RLINK_R_BINARY";
    /// Arguments for the long-lived interpreter.
    pub const SESSION_ARGS: &'static [&'static str] = &["--no-save"];
    /// Arguments for the one-shot dependency check (the check script follows).
    pub const CHECK_ARGS: &'static [&'static str] = &["--no-save", "-s", "-e"];
    /// R packages the command templates rely on.
    pub const REQUIRED_PACKAGES: &'static [&'static str] = &["jsonlite", "RCurl"];
    /// Command sent on close to end the interpreter.
    pub const QUIT_COMMAND: &'static str = "q()\n";

    /// Resolve the R binary from the environment, falling back to the default.
    pub fn binary_from_env() -> String {
        std::env::var(Self::BINARY_ENV_VAR)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_BINARY.to_string())
    }
}
