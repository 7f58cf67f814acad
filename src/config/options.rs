use std::{net::SocketAddr, time::Duration};

use super::types::HandlerFaultPolicy;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const DEFAULT_LISTEN_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8545);
pub const DEFAULT_MAX_PAYLOAD_LENGTH: usize = 16 * 1024;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_DRAIN_THRESHOLD: usize = 16 * 1024;

// -----------------------------------------------------------------------------
// ----- GatewayOptions --------------------------------------------------------

/// Everything `Gateway::bind` needs. Built from `Config` by the binary, or
/// directly by embedders and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayOptions {
    pub listen_addr: SocketAddr,
    pub max_payload_length: usize,
    /// `None` disables the idle check.
    pub idle_timeout: Option<Duration>,
    pub drain_threshold: usize,
    pub handler_fault_policy: HandlerFaultPolicy,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(DEFAULT_LISTEN_ADDR),
            max_payload_length: DEFAULT_MAX_PAYLOAD_LENGTH,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            drain_threshold: DEFAULT_DRAIN_THRESHOLD,
            handler_fault_policy: HandlerFaultPolicy::default(),
        }
    }
}

impl GatewayOptions {
    pub fn with_listen_addr(mut self, listen_addr: SocketAddr) -> Self {
        self.listen_addr = listen_addr;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_handler_fault_policy(mut self, policy: HandlerFaultPolicy) -> Self {
        self.handler_fault_policy = policy;
        self
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
