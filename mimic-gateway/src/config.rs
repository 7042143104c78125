//! Command-line and environment configuration.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mimic_executor::SandboxConfig;

/// Run a local API gateway that invokes handlers in sandboxed subprocesses.
#[derive(Debug, Clone, Parser)]
#[command(name = "mimic-gateway", version, about)]
#[non_exhaustive]
pub struct GatewayConfig {
    /// API document (JSON, or YAML with a .yaml/.yml extension).
    #[arg(long, env = "MIMIC_SPEC")]
    pub spec: PathBuf,

    /// Directory holding one `<function>/function.json` per handler.
    #[arg(long, env = "MIMIC_FUNCTIONS_DIR", default_value = "functions")]
    pub functions_dir: PathBuf,

    /// Address to listen on.
    #[arg(long, env = "MIMIC_LISTEN_ADDR", default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Stage name reported in `$context.stage`.
    #[arg(long, default_value = "dev")]
    pub stage: String,

    /// Stage variable visible as `$stageVariables.KEY` (repeatable).
    #[arg(long = "stage-variable", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub stage_variables: Vec<(String, String)>,

    /// Environment variable passed to every handler (repeatable).
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Node-compatible runtime binary.
    #[arg(long, env = "MIMIC_RUNTIME", default_value = "node")]
    pub runtime: PathBuf,

    /// Directory for per-invocation IPC sockets.
    #[arg(long)]
    pub socket_dir: Option<PathBuf>,

    /// Timeout for handlers whose descriptor declares none.
    #[arg(long, default_value_t = 6000)]
    pub default_timeout_ms: u64,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl GatewayConfig {
    #[must_use]
    pub fn stage_variable_map(&self) -> BTreeMap<String, String> {
        self.stage_variables.iter().cloned().collect()
    }

    #[must_use]
    pub fn env_map(&self) -> BTreeMap<String, String> {
        self.env.iter().cloned().collect()
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Sandbox settings derived from the runtime options.
    #[must_use]
    pub fn sandbox_config(&self) -> SandboxConfig {
        let config = SandboxConfig::new(self.runtime.clone());
        match &self.socket_dir {
            Some(dir) => config.with_socket_dir(dir.clone()),
            None => config,
        }
    }
}

/// Parse `KEY=VALUE`; the value may itself contain `=`.
fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
