#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{net::TcpStream, time::{sleep, timeout}};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};

use wsgate::{Gateway, GatewayOptions, JsonRpcEngine};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

// -----------------------------------------------------------------------------
// ----- TestGateway -----------------------------------------------------------

/// In-process gateway on an ephemeral port. Besides the built-in methods it
/// serves `park`, which never settles and counts how often it was cancelled.
pub struct TestGateway {
    pub gateway: Gateway,
    pub parked: Arc<AtomicUsize>,
    pub cancelled: Arc<AtomicUsize>,
}

impl TestGateway {
    pub fn url(&self) -> String {
        format!("ws://{}/", self.gateway.local_addr())
    }

    pub async fn connect(&self) -> Client {
        connect(&self.url()).await
    }

    pub async fn connection_count(&self) -> usize {
        self.gateway
            .handle()
            .connection_count()
            .await
            .expect("gateway loop running")
    }

    pub async fn wait_for_connections(&self, expected: usize) {
        for _ in 0..200 {
            if self.connection_count().await == expected {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {expected} connection(s)");
    }
}

pub fn local_options() -> GatewayOptions {
    GatewayOptions::default().with_listen_addr("127.0.0.1:0".parse().unwrap())
}

pub async fn start() -> TestGateway {
    start_with(local_options()).await
}

pub async fn start_with(options: GatewayOptions) -> TestGateway {
    let parked = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicUsize::new(0));

    let engine = {
        let parked = parked.clone();
        let cancelled = cancelled.clone();

        JsonRpcEngine::with_builtins().method("park", move |_params, sink| {
            let parked = parked.clone();
            let cancelled = cancelled.clone();
            async move {
                parked.fetch_add(1, Ordering::SeqCst);
                sink.cancelled().await;
                cancelled.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let gateway = Gateway::bind(options, engine)
        .await
        .expect("bind test gateway");

    TestGateway {
        gateway,
        parked,
        cancelled,
    }
}

// -----------------------------------------------------------------------------
// ----- Client helpers --------------------------------------------------------

pub async fn connect(url: &str) -> Client {
    let (client, _response) = connect_async(url).await.expect("websocket connect");
    client
}

pub async fn call(client: &mut Client, id: u64, method: &str, params: Value) {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    });
    send_text(client, &body.to_string()).await;
}

pub async fn send_text(client: &mut Client, text: &str) {
    client
        .send(Message::text(text.to_string()))
        .await
        .expect("send frame");
}

/// Next data or close frame, skipping control frames.
pub async fn next_message(client: &mut Client) -> Option<Message> {
    loop {
        let next = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for a frame");

        match next {
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(message)) => return Some(message),
            Some(Err(_)) | None => return None,
        }
    }
}

pub async fn next_json(client: &mut Client) -> Value {
    match next_message(client).await {
        Some(Message::Text(text)) => serde_json::from_str(text.as_str()).expect("json frame"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

pub async fn next_close(client: &mut Client) -> (u16, String) {
    match next_message(client).await {
        Some(Message::Close(Some(frame))) => (u16::from(frame.code), frame.reason.as_str().to_string()),
        other => panic!("expected a close frame, got {other:?}"),
    }
}

pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
