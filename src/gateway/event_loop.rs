//! The gateway's single logical thread.
//!
//! One task owns the registry, the dispatcher and the monitors. Transport
//! notifications arrive as [`LoopEvent`]s, emitter output arrives as
//! `EmissionEvent`s; both are handled here one at a time, so a close and a
//! write for the same connection can never interleave.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::{
    select,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info};

use super::{
    backpressure::{BackpressureMonitor, BackpressureStats},
    dispatcher::{EmissionEvent, RequestDispatcher},
    registry::{ConnectionId, ConnectionRegistry},
    shutdown::ShutdownCoordinator,
};
use crate::config::HandlerFaultPolicy;
use crate::engine::ProtocolEngine;
use crate::errors::GatewayError;
use crate::transport::{InboundFrame, TransportHandle};

// -----------------------------------------------------------------------------
// ----- LoopEvent -------------------------------------------------------------

#[derive(Debug)]
pub enum LoopEvent<H> {
    Open {
        handle: H,
        reply: oneshot::Sender<ConnectionId>,
    },
    Message {
        connection: ConnectionId,
        frame: InboundFrame,
    },
    Drain {
        connection: ConnectionId,
        buffered: usize,
    },
    Close {
        connection: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<GatewayStats>,
    },
    Shutdown {
        ack: oneshot::Sender<usize>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub connections: usize,
    pub backpressure: BackpressureStats,
}

// -----------------------------------------------------------------------------
// ----- GatewayLoop -----------------------------------------------------------

pub struct GatewayLoop<H: TransportHandle, E: ProtocolEngine> {
    registry: ConnectionRegistry<H>,
    dispatcher: RequestDispatcher<E>,
    backpressure: BackpressureMonitor,
    shutdown: ShutdownCoordinator,
    events: mpsc::UnboundedReceiver<LoopEvent<H>>,
    emissions: mpsc::UnboundedReceiver<EmissionEvent<E>>,
}

// -----------------------------------------------------------------------------
// ----- GatewayLoop: Static ---------------------------------------------------

impl<H: TransportHandle, E: ProtocolEngine> GatewayLoop<H, E> {
    pub fn new(engine: Arc<E>, fault_policy: HandlerFaultPolicy) -> (Self, GatewayHandle<H>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (dispatcher, emissions) = RequestDispatcher::new(engine, fault_policy);

        let event_loop = Self {
            registry: ConnectionRegistry::new(),
            dispatcher,
            backpressure: BackpressureMonitor::new(),
            shutdown: ShutdownCoordinator::new(),
            events: rx,
            emissions,
        };

        (event_loop, GatewayHandle { events: tx })
    }

    pub fn spawn(
        engine: Arc<E>,
        fault_policy: HandlerFaultPolicy,
    ) -> (GatewayHandle<H>, JoinHandle<()>) {
        let (event_loop, handle) = Self::new(engine, fault_policy);
        let task = tokio::spawn(event_loop.run());
        (handle, task)
    }
}

// -----------------------------------------------------------------------------
// ----- GatewayLoop: Public ---------------------------------------------------

impl<H: TransportHandle, E: ProtocolEngine> GatewayLoop<H, E> {
    pub async fn run(mut self) {
        loop {
            select! {
                biased;

                // -- Transport notifications --
                event = self.events.recv() => {
                    let Some(event) = event else { break; };
                    if self.on_event(event).is_break() {
                        break;
                    }
                }

                // -- Emitter output --
                Some(event) = self.emissions.recv() => {
                    self.dispatcher.on_emission(&mut self.registry, event);
                }
            }
        }

        // every handle dropped without an explicit shutdown
        if !self.shutdown.is_complete() {
            self.shutdown.close(&mut self.registry);
        }

        debug!("gateway loop stopped");
    }
}

// -----------------------------------------------------------------------------
// ----- GatewayLoop: Private --------------------------------------------------

impl<H: TransportHandle, E: ProtocolEngine> GatewayLoop<H, E> {
    fn on_event(&mut self, event: LoopEvent<H>) -> ControlFlow<()> {
        match event {
            LoopEvent::Open { handle, reply } => {
                let id = self.registry.open(handle);
                if reply.send(id).is_err() {
                    // the connection task went away before hearing back
                    self.registry.close(id);
                }
            }

            LoopEvent::Message { connection, frame } => {
                self.dispatcher
                    .on_message(&mut self.registry, connection, frame);
            }

            LoopEvent::Drain {
                connection,
                buffered,
            } => {
                self.backpressure
                    .on_drain(&self.registry, connection, buffered);
            }

            LoopEvent::Close { connection } => {
                self.registry.close(connection);
            }

            LoopEvent::Stats { reply } => {
                let _ = reply.send(GatewayStats {
                    connections: self.registry.len(),
                    backpressure: self.backpressure.snapshot(),
                });
            }

            LoopEvent::Shutdown { ack } => {
                info!("gateway shutting down");
                let ended = self.shutdown.close(&mut self.registry);
                let _ = ack.send(ended);
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }
}

// -----------------------------------------------------------------------------
// ----- GatewayHandle ---------------------------------------------------------

/// How transports and embedders talk to a running gateway loop.
#[derive(Debug)]
pub struct GatewayHandle<H> {
    events: mpsc::UnboundedSender<LoopEvent<H>>,
}

impl<H> Clone for GatewayHandle<H> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
        }
    }
}

impl<H: TransportHandle> GatewayHandle<H> {
    pub async fn open(&self, handle: H) -> Result<ConnectionId, GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.post(LoopEvent::Open { handle, reply })?;
        rx.await.map_err(|_| GatewayError::LoopStopped)
    }

    pub fn message(&self, connection: ConnectionId, frame: InboundFrame) -> Result<(), GatewayError> {
        self.post(LoopEvent::Message { connection, frame })
    }

    /// `buffered` is what the socket still had queued when its backlog fell
    /// back to the drain threshold.
    pub fn drain(&self, connection: ConnectionId, buffered: usize) -> Result<(), GatewayError> {
        self.post(LoopEvent::Drain {
            connection,
            buffered,
        })
    }

    pub fn close(&self, connection: ConnectionId) -> Result<(), GatewayError> {
        self.post(LoopEvent::Close { connection })
    }

    pub async fn stats(&self) -> Result<GatewayStats, GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.post(LoopEvent::Stats { reply })?;
        rx.await.map_err(|_| GatewayError::LoopStopped)
    }

    pub async fn connection_count(&self) -> Result<usize, GatewayError> {
        Ok(self.stats().await?.connections)
    }

    pub async fn backpressure(&self) -> Result<BackpressureStats, GatewayError> {
        Ok(self.stats().await?.backpressure)
    }

    /// End every connection with CLOSE_GOING_AWAY and stop the loop.
    /// Returns how many connections were ended.
    pub async fn shutdown(&self) -> Result<usize, GatewayError> {
        let (ack, rx) = oneshot::channel();
        self.post(LoopEvent::Shutdown { ack })?;
        rx.await.map_err(|_| GatewayError::LoopStopped)
    }

    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }

    fn post(&self, event: LoopEvent<H>) -> Result<(), GatewayError> {
        self.events.send(event).map_err(|_| GatewayError::LoopStopped)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
