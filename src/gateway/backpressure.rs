use tracing::info;

use super::registry::{ConnectionId, ConnectionRegistry};
use crate::transport::TransportHandle;

// -----------------------------------------------------------------------------
// ----- BackpressureStats -----------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackpressureStats {
    pub drains: u64,
    pub last_buffered: usize,
    pub peak_buffered: usize,
}

// -----------------------------------------------------------------------------
// ----- BackpressureMonitor ---------------------------------------------------

/// Reports drain notifications. Observation only: nothing here slows down,
/// queues or rejects traffic, however much a socket has buffered.
///
/// A drain carries the bytes the socket still had queued when its backlog
/// fell back to the drain threshold.
#[derive(Debug, Default)]
pub struct BackpressureMonitor {
    stats: BackpressureStats,
}

impl BackpressureMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_drain<H: TransportHandle>(
        &mut self,
        registry: &ConnectionRegistry<H>,
        connection: ConnectionId,
        buffered: usize,
    ) {
        if registry.handle(connection).is_none() {
            return;
        }

        self.record(connection, buffered);
    }

    pub fn record(&mut self, connection: ConnectionId, buffered: usize) {
        info!("WebSocket backpressure: {buffered} ({connection})");

        self.stats.drains += 1;
        self.stats.last_buffered = buffered;
        self.stats.peak_buffered = self.stats.peak_buffered.max(buffered);
    }

    pub fn snapshot(&self) -> BackpressureStats {
        self.stats
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
