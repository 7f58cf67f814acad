pub mod cli;
pub mod config;
pub mod gateway_file;
pub mod options;
pub mod types;

pub use config::Config;
pub use gateway_file::{ConfigError, GatewayFileConfig};
pub use options::GatewayOptions;
pub use types::{HandlerFaultPolicy, LogLevel};
