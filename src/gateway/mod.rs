//! The gateway core and its public entry point.

pub mod backpressure;
pub mod dispatcher;
pub mod event_loop;
pub mod registry;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod testing;

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    net::{TcpListener, TcpSocket},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use backpressure::{BackpressureMonitor, BackpressureStats};
pub use dispatcher::{EmissionEvent, RequestDispatcher};
pub use event_loop::{GatewayHandle, GatewayLoop, GatewayStats, LoopEvent};
pub use registry::{ConnectionId, ConnectionRegistry, RequestId};
pub use shutdown::{SHUTDOWN_REASON, ShutdownCoordinator};

use crate::config::GatewayOptions;
use crate::engine::ProtocolEngine;
use crate::errors::GatewayError;
use crate::transport::{WsHandle, WsTransport};

// -----------------------------------------------------------------------------
// ----- Gateway ---------------------------------------------------------------

/// A bound, running gateway: accept loop plus event loop.
pub struct Gateway {
    local_addr: SocketAddr,
    handle: GatewayHandle<WsHandle>,
    stop_accepting: CancellationToken,
    accept_task: JoinHandle<()>,
    loop_task: JoinHandle<()>,
}

// -----------------------------------------------------------------------------
// ----- Gateway: Static -------------------------------------------------------

impl Gateway {
    pub async fn bind<E: ProtocolEngine>(
        options: GatewayOptions,
        engine: E,
    ) -> Result<Gateway, GatewayError> {
        let listener = listen(options.listen_addr)?;
        let local_addr = listener.local_addr()?;

        let (handle, loop_task) =
            GatewayLoop::spawn(Arc::new(engine), options.handler_fault_policy);

        let stop_accepting = CancellationToken::new();
        let transport = WsTransport::new(&options);
        let accept_task = tokio::spawn(transport.serve(
            listener,
            handle.clone(),
            stop_accepting.clone(),
        ));

        info!("gateway listening on {local_addr}");

        Ok(Gateway {
            local_addr,
            handle,
            stop_accepting,
            accept_task,
            loop_task,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Gateway: Public -------------------------------------------------------

impl Gateway {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> GatewayHandle<WsHandle> {
        self.handle.clone()
    }

    /// Stop accepting, end every live connection with CLOSE_GOING_AWAY and
    /// stop the event loop. Returns how many connections were ended.
    pub async fn close(self) -> Result<usize, GatewayError> {
        self.stop_accepting.cancel();
        let _ = self.accept_task.await;

        let ended = self.handle.shutdown().await?;
        let _ = self.loop_task.await;

        info!("gateway closed; {ended} connection(s) ended");
        Ok(ended)
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

fn listen(addr: SocketAddr) -> Result<TcpListener, GatewayError> {
    let bind_err = |source| GatewayError::Bind { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;
    socket.listen(1024).map_err(bind_err)
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
