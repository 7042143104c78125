//! Sandbox configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bootstrap program run by node-compatible runtimes via `-e`.
pub const NODE_BOOTSTRAP: &str = include_str!("runtime/bootstrap.js");

/// Parent variables copied into the base environment of every subprocess.
const INHERITED_VARS: [&str; 3] = ["HOME", "PATH", "USER"];

/// How handler subprocesses are started.
///
/// The child is invoked as `program args... <handler-path> <function-name>
/// <timeout-ms> <socket-path>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SandboxConfig {
    /// Runtime binary, absolute or looked up on `PATH`.
    pub program: PathBuf,

    /// Arguments placed before the invocation arguments.
    pub args: Vec<String>,

    /// Directory where per-invocation Unix sockets are created.
    pub socket_dir: PathBuf,

    /// How long a child may keep running after its terminal message before
    /// it is killed.
    pub grace_period: Duration,

    /// Environment every subprocess starts from. Request entries override it.
    pub base_env: BTreeMap<String, String>,
}

impl SandboxConfig {
    /// Config for a node-compatible `program` running the embedded bootstrap.
    ///
    /// The base environment holds `HOME`, `PATH` and `USER` as they are when
    /// this is called; later changes to the gateway's environment are not seen.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let base_env = INHERITED_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| ((*name).to_owned(), value)))
            .collect();
        Self {
            program: program.into(),
            args: vec!["-e".to_owned(), NODE_BOOTSTRAP.to_owned()],
            socket_dir: std::env::temp_dir().join("mimic-sockets"),
            grace_period: Duration::from_millis(500),
            base_env,
        }
    }

    /// Replace the arguments placed before the invocation arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Use `socket_dir` for IPC sockets.
    #[must_use]
    pub fn with_socket_dir(mut self, socket_dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = socket_dir.into();
        self
    }

    /// Add entries to the base environment.
    #[must_use]
    pub fn with_base_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.base_env.extend(env);
        self
    }

    /// Set the post-completion grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new("node")
    }
}
