//! The protocol side of the gateway. The gateway never looks inside a
//! payload: it parses, hands off, and formats through this trait.

pub mod jsonrpc;

use bytes::Bytes;
use std::{fmt::Display, sync::Arc};

use crate::emitter::ResultEmitter;
use crate::errors::HandlerFault;
use crate::gateway::ConnectionId;

pub use jsonrpc::JsonRpcEngine;

// -----------------------------------------------------------------------------
// ----- ProtocolEngine --------------------------------------------------------

pub trait ProtocolEngine: Send + Sync + 'static {
    type Payload: Send + Sync + 'static;
    type Output: Send + 'static;
    type ParseError: Display;

    /// Decode one inbound frame. An error closes the connection.
    fn parse(&self, raw: &[u8]) -> Result<Self::Payload, Self::ParseError>;

    /// Start serving a request. Runs on the gateway loop, so it must return
    /// right away and push any real work onto its own task.
    fn handle(
        &self,
        payload: Arc<Self::Payload>,
        connection: ConnectionId,
    ) -> Result<ResultEmitter<Self::Output>, HandlerFault>;

    /// Encode an intermediate or terminal result for the request it answers.
    fn format(&self, result: &Self::Output, payload: &Self::Payload) -> Bytes;

    /// Encode a fault, if the protocol has a way to say so.
    fn format_fault(&self, _fault: &HandlerFault, _payload: &Self::Payload) -> Option<Bytes> {
        None
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
