use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use wsgate::{Config, Gateway, GatewayError, JsonRpcEngine};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "wsgate";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    setup().await;
    run_forever().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() {
    // This has to be the first thing we do, because it initializes the config
    Config::init().await;

    init_tracing();
}

fn init_tracing() {
    let config = Config::snapshot();
    let filter = EnvFilter::try_new(config.log_level.as_str()).unwrap();
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever() -> Result<(), GatewayError> {
    let config = Config::snapshot();

    let gateway = Gateway::bind(config.gateway_options(), JsonRpcEngine::with_builtins()).await?;

    info!("{} listening on {}", APP_NAME, gateway.local_addr());

    if let Err(e) = signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
    }

    info!("{} shutting down", APP_NAME);
    gateway.close().await?;

    Ok(())
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
