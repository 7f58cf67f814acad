// WebSocket gateway core; wire formats live behind the ProtocolEngine seam.
pub mod close_codes;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod transport;

pub use config::{Config, GatewayOptions, HandlerFaultPolicy};
pub use emitter::{CancelHook, Emission, EmitterSink, EmitterState, ResultEmitter};
pub use engine::{JsonRpcEngine, ProtocolEngine};
pub use errors::{GatewayError, HandlerFault};
pub use gateway::{ConnectionId, Gateway, GatewayHandle, RequestId};
pub use transport::{InboundFrame, TransportHandle};
