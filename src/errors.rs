use std::net::SocketAddr;
use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- GatewayError ----------------------------------------------------------

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("gateway event loop is no longer running")]
    LoopStopped,
}

// -----------------------------------------------------------------------------
// ----- HandlerFault ----------------------------------------------------------

/// A request that was parsed fine but could not be served by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerFault {
    /// `ProtocolEngine::handle` refused the request outright.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The asynchronous work behind an emitter reported a failure.
    #[error("request failed: {0}")]
    Failed(String),

    /// The producer went away without settling.
    #[error("request abandoned before settling")]
    Abandoned,
}

impl HandlerFault {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_render_their_detail() {
        assert_eq!(
            HandlerFault::failed("boom").to_string(),
            "request failed: boom"
        );
        assert_eq!(
            HandlerFault::Abandoned.to_string(),
            "request abandoned before settling"
        );
    }

    #[test]
    fn bind_error_names_the_address() {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let err = GatewayError::Bind {
            addr,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:9: in use");
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
