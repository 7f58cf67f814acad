//! engine/jsonrpc.rs
//!
//! JSON-RPC 2.0 over WebSocket. One request per frame; the response echoes
//! the request `id`. Methods that stream push `subscription` notifications
//! tagged with that same `id` before their final response.

use bytes::Bytes;
use futures_util::{FutureExt, future::BoxFuture};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::debug;

use super::ProtocolEngine;
use crate::emitter::{EmitterSink, ResultEmitter};
use crate::errors::HandlerFault;
use crate::gateway::ConnectionId;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const JSONRPC_VERSION: &str = "2.0";
pub const SUBSCRIPTION_METHOD: &str = "subscription";

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INTERNAL_ERROR: i64 = -32603;

const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

// -----------------------------------------------------------------------------
// ----- RpcRequest / RpcOutput ------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub id: Value,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutput {
    /// The method's final answer.
    Result(Value),
    /// One item of a stream.
    Notification(Value),
}

type MethodHandler =
    Arc<dyn Fn(Value, EmitterSink<RpcOutput>) -> BoxFuture<'static, ()> + Send + Sync>;

// -----------------------------------------------------------------------------
// ----- JsonRpcEngine ---------------------------------------------------------

#[derive(Clone, Default)]
pub struct JsonRpcEngine {
    methods: HashMap<String, MethodHandler>,
}

// -----------------------------------------------------------------------------
// ----- JsonRpcEngine: Static -------------------------------------------------

impl JsonRpcEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ping`, `echo` and `subscribe_ticks`.
    pub fn with_builtins() -> Self {
        Self::new()
            .method("ping", ping)
            .method("echo", echo)
            .method("subscribe_ticks", subscribe_ticks)
    }
}

// -----------------------------------------------------------------------------
// ----- JsonRpcEngine: Builder ------------------------------------------------

impl JsonRpcEngine {
    /// Register `handler` under `name`. The handler runs on its own task and
    /// must settle or fail the sink exactly once.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, EmitterSink<RpcOutput>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: MethodHandler = Arc::new(move |params, sink| handler(params, sink).boxed());
        self.methods.insert(name.into(), handler);
        self
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }
}

// -----------------------------------------------------------------------------
// ----- JsonRpcEngine: ProtocolEngine -----------------------------------------

impl ProtocolEngine for JsonRpcEngine {
    type Payload = RpcRequest;
    type Output = RpcOutput;
    type ParseError = RpcParseError;

    fn parse(&self, raw: &[u8]) -> Result<RpcRequest, RpcParseError> {
        let doc: RawRequest = serde_json::from_slice(raw)?;

        if doc.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
            return Err(RpcParseError::Version(doc.jsonrpc));
        }

        let Some(method) = doc.method else {
            return Err(RpcParseError::MissingMethod);
        };

        let id = doc.id.unwrap_or(Value::Null);
        if !(id.is_null() || id.is_number() || id.is_string()) {
            return Err(RpcParseError::InvalidId);
        }

        Ok(RpcRequest {
            id,
            method,
            params: doc.params,
        })
    }

    fn handle(
        &self,
        payload: Arc<RpcRequest>,
        connection: ConnectionId,
    ) -> Result<ResultEmitter<RpcOutput>, HandlerFault> {
        let Some(handler) = self.methods.get(&payload.method) else {
            return Err(HandlerFault::rejected(format!(
                "method not found: {}",
                payload.method
            )));
        };

        debug!("{connection} calls {}", payload.method);

        let (sink, emitter) = ResultEmitter::channel();
        tokio::spawn(handler(payload.params.clone(), sink));

        Ok(emitter)
    }

    fn format(&self, result: &RpcOutput, payload: &RpcRequest) -> Bytes {
        let body = match result {
            RpcOutput::Result(value) => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": payload.id,
                "result": value,
            }),
            RpcOutput::Notification(value) => json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": SUBSCRIPTION_METHOD,
                "params": {
                    "subscription": payload.id,
                    "result": value,
                },
            }),
        };

        Bytes::from(body.to_string())
    }

    fn format_fault(&self, fault: &HandlerFault, payload: &RpcRequest) -> Option<Bytes> {
        let code = match fault {
            HandlerFault::Rejected(_) => METHOD_NOT_FOUND,
            HandlerFault::Failed(_) | HandlerFault::Abandoned => INTERNAL_ERROR,
        };

        let body = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": payload.id,
            "error": {
                "code": code,
                "message": fault.to_string(),
            },
        });

        Some(Bytes::from(body.to_string()))
    }
}

// -----------------------------------------------------------------------------
// ----- Built-in Methods ------------------------------------------------------

async fn ping(_params: Value, sink: EmitterSink<RpcOutput>) {
    sink.settle(RpcOutput::Result(json!("pong")));
}

async fn echo(params: Value, sink: EmitterSink<RpcOutput>) {
    sink.settle(RpcOutput::Result(params));
}

#[derive(Debug, Deserialize)]
struct TicksParams {
    count: u64,

    #[serde(default = "default_tick_interval_ms")]
    interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

async fn subscribe_ticks(params: Value, sink: EmitterSink<RpcOutput>) {
    let ticks: TicksParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => {
            sink.fail(HandlerFault::failed(format!("invalid params: {e}")));
            return;
        }
    };

    let interval = Duration::from_millis(ticks.interval_ms);

    // interval 0 emits back-to-back
    for tick in 0..ticks.count {
        if !interval.is_zero()
            && sink
                .until_cancelled(tokio::time::sleep(interval))
                .await
                .is_none()
        {
            debug!("subscription cancelled after {tick} ticks");
            return;
        }

        if !sink.notify(RpcOutput::Notification(json!(tick))) {
            return;
        }
    }

    sink.settle(RpcOutput::Result(json!(ticks.count)));
}

// -----------------------------------------------------------------------------
// ----- Internal: Wire format -------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    jsonrpc: Option<String>,

    #[serde(default)]
    id: Option<Value>,

    #[serde(default)]
    method: Option<String>,

    #[serde(default)]
    params: Value,
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RpcParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported jsonrpc version {0:?}")]
    Version(Option<String>),

    #[error("missing method")]
    MissingMethod,

    #[error("id must be a string, a number or null")]
    InvalidId,
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Emission;

    fn request(method: &str, params: Value) -> Arc<RpcRequest> {
        Arc::new(RpcRequest {
            id: json!(7),
            method: method.to_string(),
            params,
        })
    }

    fn as_json(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn parses_a_well_formed_request() {
        let engine = JsonRpcEngine::with_builtins();
        let req = engine
            .parse(br#"{"jsonrpc":"2.0","id":"a1","method":"echo","params":[1,2]}"#)
            .unwrap();

        assert_eq!(req.id, json!("a1"));
        assert_eq!(req.method, "echo");
        assert_eq!(req.params, json!([1, 2]));
    }

    #[test]
    fn rejects_malformed_requests() {
        let engine = JsonRpcEngine::new();

        let err = engine.parse(b"not json").unwrap_err();
        assert!(matches!(err, RpcParseError::Json(_)));

        let err = engine.parse(br#"{"jsonrpc":"1.0","method":"x"}"#).unwrap_err();
        assert!(matches!(err, RpcParseError::Version(Some(_))));

        let err = engine.parse(br#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert!(matches!(err, RpcParseError::MissingMethod));

        let err = engine
            .parse(br#"{"jsonrpc":"2.0","id":{"x":1},"method":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, RpcParseError::InvalidId));
    }

    #[test]
    fn formats_results_and_notifications() {
        let engine = JsonRpcEngine::new();
        let req = request("echo", Value::Null);

        let result = as_json(&engine.format(&RpcOutput::Result(json!("ok")), &req));
        assert_eq!(result, json!({"jsonrpc": "2.0", "id": 7, "result": "ok"}));

        let note = as_json(&engine.format(&RpcOutput::Notification(json!(3)), &req));
        assert_eq!(note["method"], "subscription");
        assert_eq!(note["params"]["subscription"], 7);
        assert_eq!(note["params"]["result"], 3);
    }

    #[test]
    fn formats_faults_with_error_codes() {
        let engine = JsonRpcEngine::new();
        let req = request("nope", Value::Null);

        let body = engine
            .format_fault(&HandlerFault::rejected("method not found: nope"), &req)
            .unwrap();
        assert_eq!(as_json(&body)["error"]["code"], METHOD_NOT_FOUND);

        let body = engine.format_fault(&HandlerFault::Abandoned, &req).unwrap();
        assert_eq!(as_json(&body)["error"]["code"], INTERNAL_ERROR);
    }

    #[test]
    fn unknown_method_is_rejected_synchronously() {
        let engine = JsonRpcEngine::with_builtins();
        let err = engine
            .handle(request("eth_mine", Value::Null), ConnectionId::from_raw(1))
            .unwrap_err();
        assert_eq!(err, HandlerFault::Rejected("method not found: eth_mine".into()));
    }

    #[tokio::test]
    async fn ping_settles_with_pong() {
        let engine = JsonRpcEngine::with_builtins();
        let mut emitter = engine
            .handle(request("ping", Value::Null), ConnectionId::from_raw(1))
            .unwrap();

        assert_eq!(
            emitter.next().await,
            Some(Emission::Terminal(Ok(RpcOutput::Result(json!("pong")))))
        );
    }

    #[tokio::test]
    async fn subscribe_ticks_streams_then_settles() {
        let engine = JsonRpcEngine::with_builtins();
        let params = json!({"count": 3, "interval_ms": 1});
        let mut emitter = engine
            .handle(request("subscribe_ticks", params), ConnectionId::from_raw(1))
            .unwrap();

        for tick in 0..3 {
            assert_eq!(
                emitter.next().await,
                Some(Emission::Intermediate(RpcOutput::Notification(json!(tick))))
            );
        }
        assert_eq!(
            emitter.next().await,
            Some(Emission::Terminal(Ok(RpcOutput::Result(json!(3)))))
        );
    }

    #[tokio::test]
    async fn subscribe_ticks_without_interval_is_a_burst() {
        let engine = JsonRpcEngine::with_builtins();
        let params = json!({"count": 50, "interval_ms": 0});
        let mut emitter = engine
            .handle(request("subscribe_ticks", params), ConnectionId::from_raw(1))
            .unwrap();

        let mut notifications = 0;
        while let Some(emission) = emitter.next().await {
            match emission {
                Emission::Intermediate(_) => notifications += 1,
                Emission::Terminal(outcome) => {
                    assert_eq!(outcome, Ok(RpcOutput::Result(json!(50))));
                }
            }
        }
        assert_eq!(notifications, 50);
    }

    #[tokio::test]
    async fn subscribe_ticks_with_bad_params_fails() {
        let engine = JsonRpcEngine::with_builtins();
        let mut emitter = engine
            .handle(request("subscribe_ticks", json!("x")), ConnectionId::from_raw(1))
            .unwrap();

        let Some(Emission::Terminal(Err(HandlerFault::Failed(msg)))) = emitter.next().await else {
            panic!("expected a failed terminal");
        };
        assert!(msg.starts_with("invalid params"));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
