use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{trace, warn};

use super::registry::{ConnectionId, ConnectionRegistry, RequestId};
use crate::close_codes::{CLOSE_PROTOCOL_ERROR, clamp_reason};
use crate::config::HandlerFaultPolicy;
use crate::emitter::{Emission, ResultEmitter};
use crate::engine::ProtocolEngine;
use crate::errors::HandlerFault;
use crate::transport::{InboundFrame, TransportHandle};

// -----------------------------------------------------------------------------
// ----- EmissionEvent ---------------------------------------------------------

/// One emission, carried back onto the gateway loop together with what the
/// loop needs to write it.
pub struct EmissionEvent<E: ProtocolEngine> {
    pub connection: ConnectionId,
    pub request: RequestId,
    pub payload: Arc<E::Payload>,
    pub is_binary: bool,
    pub emission: Emission<E::Output>,
}

// -----------------------------------------------------------------------------
// ----- RequestDispatcher -----------------------------------------------------

pub struct RequestDispatcher<E: ProtocolEngine> {
    engine: Arc<E>,
    emissions: mpsc::UnboundedSender<EmissionEvent<E>>,
    fault_policy: HandlerFaultPolicy,
    next_request: u64,
}

// -----------------------------------------------------------------------------
// ----- RequestDispatcher: Static ---------------------------------------------

impl<E: ProtocolEngine> RequestDispatcher<E> {
    /// The receiver must be drained on the same loop that owns the registry.
    pub fn new(
        engine: Arc<E>,
        fault_policy: HandlerFaultPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<EmissionEvent<E>>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let dispatcher = Self {
            engine,
            emissions: tx,
            fault_policy,
            next_request: 1,
        };

        (dispatcher, rx)
    }
}

// -----------------------------------------------------------------------------
// ----- RequestDispatcher: Public ---------------------------------------------

impl<E: ProtocolEngine> RequestDispatcher<E> {
    /// Parse, hand off, and subscribe to one inbound frame.
    ///
    /// Returns the request id when an emitter was registered.
    pub fn on_message<H: TransportHandle>(
        &mut self,
        registry: &mut ConnectionRegistry<H>,
        connection: ConnectionId,
        frame: InboundFrame,
    ) -> Option<RequestId> {
        let Some(handle) = registry.handle(connection).cloned() else {
            trace!("{connection} gone; dropping inbound frame");
            return None;
        };

        if registry.is_ending(connection) {
            trace!("{connection} ending; dropping inbound frame");
            return None;
        }

        // 1) parse; on failure the close-notification does the teardown
        let payload = match self.engine.parse(&frame.data) {
            Ok(payload) => Arc::new(payload),
            Err(e) => {
                let reason = format!("Received a malformed frame: {e}");
                warn!("{connection}: {reason}");
                registry.mark_ending(connection);
                handle.end(CLOSE_PROTOCOL_ERROR, clamp_reason(&reason));
                return None;
            }
        };

        let request = self.allocate_request();

        // 2) hand off
        let emitter = match self.engine.handle(payload.clone(), connection) {
            Ok(emitter) => emitter,
            Err(fault) => {
                self.deliver_fault(&handle, connection, request, &fault, &payload, frame.is_binary);
                return None;
            }
        };

        // 3) register before anything can be observed
        if !registry.register(connection, request, emitter.cancel_hook()) {
            return None;
        }

        // 4+5) subscribe
        self.subscribe(connection, request, payload, frame.is_binary, emitter);

        Some(request)
    }

    /// Write one emission if its request is still live.
    pub fn on_emission<H: TransportHandle>(
        &self,
        registry: &mut ConnectionRegistry<H>,
        event: EmissionEvent<E>,
    ) {
        let EmissionEvent {
            connection,
            request,
            payload,
            is_binary,
            emission,
        } = event;

        // cancelled or closed: whatever was still in flight is dropped
        if !registry.is_pending(connection, request) {
            trace!("{connection} {request} no longer pending; dropping emission");
            return;
        }

        let Some(handle) = registry.handle(connection).cloned() else {
            return;
        };

        match emission {
            Emission::Intermediate(result) => {
                handle.send(self.engine.format(&result, &payload), is_binary);
            }
            Emission::Terminal(Ok(result)) => {
                handle.send(self.engine.format(&result, &payload), is_binary);
                registry.unregister(connection, request);
            }
            Emission::Terminal(Err(fault)) => {
                self.deliver_fault(&handle, connection, request, &fault, &payload, is_binary);
                registry.unregister(connection, request);
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- RequestDispatcher: Private --------------------------------------------

impl<E: ProtocolEngine> RequestDispatcher<E> {
    fn allocate_request(&mut self) -> RequestId {
        let id = RequestId::from_raw(self.next_request);
        self.next_request += 1;
        id
    }

    fn subscribe(
        &self,
        connection: ConnectionId,
        request: RequestId,
        payload: Arc<E::Payload>,
        is_binary: bool,
        mut emitter: ResultEmitter<E::Output>,
    ) {
        let emissions = self.emissions.clone();

        tokio::spawn(async move {
            while let Some(emission) = emitter.next().await {
                let terminal = emission.is_terminal();

                let event = EmissionEvent {
                    connection,
                    request,
                    payload: payload.clone(),
                    is_binary,
                    emission,
                };

                if emissions.send(event).is_err() || terminal {
                    break;
                }
            }
        });
    }

    fn deliver_fault<H: TransportHandle>(
        &self,
        handle: &H,
        connection: ConnectionId,
        request: RequestId,
        fault: &HandlerFault,
        payload: &E::Payload,
        is_binary: bool,
    ) {
        warn!("{connection} {request}: {fault}");

        if self.fault_policy == HandlerFaultPolicy::Drop {
            return;
        }

        match self.engine.format_fault(fault, payload) {
            Some(frame) => handle.send(frame, is_binary),
            None => trace!("{connection} {request}: engine has no fault encoding; dropped"),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
