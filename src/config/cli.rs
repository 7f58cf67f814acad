use clap::Parser;
use parking_lot::RwLock;
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use super::types::LogLevel;

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static CLI_CONFIG: OnceLock<Arc<RwLock<CliConfig>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub config_file_location: Option<PathBuf>,
    pub log_level: LogLevel,
}

impl CliConfig {
    pub fn init() {
        CLI_CONFIG.get_or_init(|| {
            let cfg = Self::from_args(Args::parse_env_or_panic());
            cfg.validate();
            Arc::new(RwLock::new(cfg))
        });
    }

    pub fn snapshot() -> CliConfig {
        handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_args(args: Args) -> Self {
        Self {
            listen_addr: SocketAddr::from((args.host, args.port)),
            config_file_location: args.config_file,
            log_level: args.log_level,
        }
    }

    fn validate(&self) {
        if let Some(path) = self.config_file_location.as_deref() {
            must_exist_file(path, "--config / WSGATE_CONFIG_FILE");
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "wsgate", version, about = "WebSocket gateway for request/stream protocols")]
struct Args {
    // IPv4 or IPv6 literal (e.g., 0.0.0.0, 127.0.0.1, ::, ::1).
    #[arg(long = "host", short = 'H', env = "WSGATE_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(long = "port", short = 'p', env = "WSGATE_PORT", default_value_t = 8545)]
    port: u16,

    #[arg(long = "log", default_value = "info")]
    log_level: LogLevel,

    // Optional; every [gateway] key has a default.
    #[arg(long = "config", env = "WSGATE_CONFIG_FILE")]
    config_file: Option<PathBuf>,
}

impl Args {
    fn parse_env_or_panic() -> Self {
        Args::try_parse().unwrap_or_else(|e| panic!("Invalid CLI/ENV: {e}"))
    }
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn handle() -> Arc<RwLock<CliConfig>> {
    CLI_CONFIG
        .get()
        .expect("cli config not initialized; call Config::init().await first")
        .clone()
}

fn must_exist_file(path: &Path, hint: &str) {
    let md = fs::metadata(path).unwrap_or_else(|_| {
        panic!("required file missing: {} (from {hint})", path.display());
    });

    if !md.is_file() {
        panic!("path is not a file: {} (from {hint})", path.display());
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
