//! WebSocket server transport on tokio-tungstenite.
//!
//! Each accepted socket runs in its own task: it reads frames and forwards
//! them to the gateway loop, and writes whatever the loop pushed into the
//! socket's [`Outbox`]. The gateway never touches the socket directly.

use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Instant, sleep_until, timeout},
};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async_with_config,
    tungstenite::{
        Error as WsError, Message,
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        protocol::{CloseFrame, WebSocketConfig, frame::coding::CloseCode},
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::{InboundFrame, Outbound, Outbox, OutboxReceiver, TransportHandle};
use crate::close_codes::{CLOSE_GOING_AWAY, CLOSE_TOO_LARGE, clamp_reason};
use crate::config::GatewayOptions;
use crate::errors::GatewayError;
use crate::gateway::{ConnectionId, GatewayHandle};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const IDLE_REASON: &str = "Idle timeout";
const TOO_LARGE_REASON: &str = "Message too big";

/// How long to wait for the peer's close reply after we sent ours.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

// -----------------------------------------------------------------------------
// ----- WsHandle --------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WsHandle {
    outbox: Outbox,
    peer: SocketAddr,
}

impl WsHandle {
    pub fn new(outbox: Outbox, peer: SocketAddr) -> Self {
        Self { outbox, peer }
    }
}

impl TransportHandle for WsHandle {
    fn send(&self, frame: Bytes, is_binary: bool) {
        if !self.outbox.push(frame, is_binary) {
            trace!("{}: send after end discarded", self.peer);
        }
    }

    fn end(&self, code: u16, reason: &str) {
        self.outbox.end(code, clamp_reason(reason));
    }

    fn buffered_amount(&self) -> usize {
        self.outbox.buffered_amount()
    }
}

// -----------------------------------------------------------------------------
// ----- WsTransport -----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WsTransport {
    max_payload_length: usize,
    idle_timeout: Option<Duration>,
    drain_threshold: usize,
}

// -----------------------------------------------------------------------------
// ----- WsTransport: Static ---------------------------------------------------

impl WsTransport {
    pub fn new(options: &GatewayOptions) -> Self {
        Self {
            max_payload_length: options.max_payload_length,
            idle_timeout: options.idle_timeout,
            drain_threshold: options.drain_threshold,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- WsTransport: Public ---------------------------------------------------

impl WsTransport {
    /// Accept loop. Runs until `stop` fires; sockets already accepted keep
    /// running until the gateway ends them.
    pub async fn serve(
        self,
        listener: TcpListener,
        gateway: GatewayHandle<WsHandle>,
        stop: CancellationToken,
    ) {
        loop {
            select! {
                _ = stop.cancelled() => {
                    debug!("accept loop stopped");
                    break;
                }

                accept_res = listener.accept() => {
                    let (stream, peer) = match accept_res {
                        Ok(v) => v,
                        Err(e) => { error!("accept error: {e}"); continue; }
                    };

                    let _ = stream.set_nodelay(true);

                    let transport = self.clone();
                    let gateway = gateway.clone();

                    tokio::spawn(async move {
                        if let Err(e) = transport.serve_connection(stream, peer, gateway).await {
                            warn!("client {peer} error: {e}");
                        }
                    });
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- WsTransport: Private --------------------------------------------------

impl WsTransport {
    fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_payload_length);
        config.max_frame_size = Some(self.max_payload_length);
        config
    }

    async fn serve_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        gateway: GatewayHandle<WsHandle>,
    ) -> Result<(), GatewayError> {
        let ws =
            accept_hdr_async_with_config(stream, only_root_path, Some(self.websocket_config()))
                .await?;

        let (mut sink, mut source) = ws.split();
        let (outbox, mut outbound) = Outbox::new(self.drain_threshold);

        let connection = gateway.open(WsHandle::new(outbox.clone(), peer)).await?;
        debug!("{connection} opened from {peer}");

        let res = self
            .pump(connection, &gateway, &outbox, &mut outbound, &mut sink, &mut source)
            .await;

        // the one and only close-notification for this socket
        let _ = gateway.close(connection);
        debug!("{connection} closed");

        res
    }

    async fn pump(
        &self,
        connection: ConnectionId,
        gateway: &GatewayHandle<WsHandle>,
        outbox: &Outbox,
        outbound: &mut OutboxReceiver,
        sink: &mut WsSink,
        source: &mut WsSource,
    ) -> Result<(), GatewayError> {
        let mut idle_at = self.next_idle_deadline();

        loop {
            select! {
                _ = sleep_until_opt(idle_at) => {
                    debug!("{connection} idle for {:?}", self.idle_timeout);
                    idle_at = None;
                    outbox.end(CLOSE_GOING_AWAY, IDLE_REASON);
                }

                read = source.next() => {
                    idle_at = self.next_idle_deadline();

                    let frame = match read {
                        Some(Ok(Message::Text(text))) => {
                            InboundFrame::text(Bytes::copy_from_slice(text.as_str().as_bytes()))
                        }
                        Some(Ok(Message::Binary(data))) => InboundFrame::binary(data),
                        Some(Ok(Message::Close(_))) => {
                            // push out the close reply tungstenite queued
                            let _ = timeout(CLOSE_GRACE, sink.close()).await;
                            return Ok(());
                        }
                        None => return Ok(()),
                        Some(Ok(_)) => continue,
                        Some(Err(WsError::Capacity(e))) => {
                            warn!("{connection}: {e}");
                            outbox.end(CLOSE_TOO_LARGE, TOO_LARGE_REASON);
                            continue;
                        }
                        Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(e.into()),
                    };

                    if gateway.message(connection, frame).is_err() {
                        return Ok(());
                    }
                }

                next = outbound.recv() => {
                    let Some(next) = next else { return Ok(()); };

                    match next {
                        Outbound::Frame { data, is_binary } => {
                            let len = data.len();
                            sink.send(into_message(data, is_binary)).await?;

                            if let Some(buffered) = outbound.written(len) {
                                trace!("{connection} drained to {buffered} bytes");
                                if gateway.drain(connection, buffered).is_err() {
                                    return Ok(());
                                }
                            }
                        }

                        Outbound::End { code, reason } => {
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.into(),
                            };
                            let _ = sink.send(Message::Close(Some(frame))).await;
                            let _ = timeout(CLOSE_GRACE, wait_for_close(source)).await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn next_idle_deadline(&self) -> Option<Instant> {
        self.idle_timeout.map(|limit| Instant::now() + limit)
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

fn only_root_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == "/" {
        return Ok(response);
    }

    let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

fn into_message(data: Bytes, is_binary: bool) -> Message {
    if is_binary {
        return Message::binary(data);
    }

    match std::str::from_utf8(&data) {
        Ok(text) => Message::text(text.to_owned()),
        Err(_) => Message::binary(data),
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_for_close(source: &mut WsSource) {
    while let Some(Ok(message)) = source.next().await {
        if message.is_close() {
            break;
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
