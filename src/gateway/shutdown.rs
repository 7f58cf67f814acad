use tracing::info;

use super::registry::ConnectionRegistry;
use crate::close_codes::CLOSE_GOING_AWAY;
use crate::transport::TransportHandle;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const SHUTDOWN_REASON: &str = "Server closed by client";

// -----------------------------------------------------------------------------
// ----- ShutdownCoordinator ---------------------------------------------------

/// Ends every connection with CLOSE_GOING_AWAY. Best effort: the close
/// handshake is not awaited.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    completed: bool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many connections were told to go away.
    pub fn close<H: TransportHandle>(&mut self, registry: &mut ConnectionRegistry<H>) -> usize {
        let ended = registry.close_all(CLOSE_GOING_AWAY, SHUTDOWN_REASON);

        if !self.completed {
            info!("shutdown: closed {ended} connection(s)");
        }
        self.completed = true;

        ended
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
