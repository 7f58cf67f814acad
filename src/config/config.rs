use parking_lot::RwLock;
use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use super::{
    cli::CliConfig,
    gateway_file::{ConfigError, GatewayFileConfig},
    options::GatewayOptions,
    types::LogLevel,
};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static ROOT_CONFIG: OnceLock<Arc<RwLock<Config>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub config_file_location: Option<PathBuf>,
    pub gateway: GatewayOptions,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Init: panic on any error. Do not continue with a bad state.
    pub async fn init() {
        CliConfig::init();

        let next = Self::load()
            .await
            .unwrap_or_else(|e| panic!("failed to load gateway config: {e}"));

        Self::store(next);
    }

    pub fn snapshot() -> Config {
        Self::handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Public --------------------------------------------------------

impl Config {
    pub fn gateway_options(&self) -> GatewayOptions {
        self.gateway.clone().with_listen_addr(self.listen_addr)
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    async fn load() -> Result<Config, ConfigError> {
        let cli = CliConfig::snapshot();

        let file = match cli.config_file_location.as_deref() {
            Some(path) => GatewayFileConfig::from_file_async(path).await?,
            None => GatewayFileConfig::default(),
        };

        Ok(Config {
            listen_addr: cli.listen_addr,
            log_level: cli.log_level,
            config_file_location: cli.config_file_location,
            gateway: file.apply(GatewayOptions::default().with_listen_addr(cli.listen_addr)),
        })
    }

    fn store(next: Config) {
        if let Some(handle) = ROOT_CONFIG.get() {
            *handle.write() = next;
        } else {
            let _ = ROOT_CONFIG.set(Arc::new(RwLock::new(next)));
        }
    }

    fn handle() -> Arc<RwLock<Config>> {
        ROOT_CONFIG
            .get()
            .expect("Config not initialized; call Config::init().await first")
            .clone()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
