//! Transport seam: what the gateway needs from a socket, and the
//! tokio-tungstenite server that provides it.

pub mod outbox;
pub mod ws;

use bytes::Bytes;

pub use outbox::{Outbound, Outbox, OutboxReceiver};
pub use ws::{WsHandle, WsTransport};

// -----------------------------------------------------------------------------
// ----- TransportHandle -------------------------------------------------------

/// Operations the gateway issues against one live socket.
///
/// All of them are fire-and-forget: failures after the peer went away are
/// swallowed by the implementation.
pub trait TransportHandle: Clone + Send + 'static {
    fn send(&self, frame: Bytes, is_binary: bool);

    fn end(&self, code: u16, reason: &str);

    fn buffered_amount(&self) -> usize;
}

// -----------------------------------------------------------------------------
// ----- InboundFrame ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub data: Bytes,
    pub is_binary: bool,
}

impl InboundFrame {
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            is_binary: true,
        }
    }

    pub fn text(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            is_binary: false,
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
