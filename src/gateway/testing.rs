//! Test doubles shared by the gateway unit tests.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::emitter::{EmitterSink, ResultEmitter};
use crate::engine::ProtocolEngine;
use crate::errors::HandlerFault;
use crate::gateway::ConnectionId;
use crate::transport::TransportHandle;

// -----------------------------------------------------------------------------
// ----- RecordingHandle -------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wire {
    Send { data: Bytes, is_binary: bool },
    End { code: u16, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct RecordingHandle {
    wire: Arc<Mutex<Vec<Wire>>>,
    buffered: Arc<AtomicUsize>,
}

impl RecordingHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wire(&self) -> Vec<Wire> {
        self.wire.lock().clone()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.wire
            .lock()
            .iter()
            .filter_map(|w| match w {
                Wire::Send { data, .. } => Some(data.clone()),
                Wire::End { .. } => None,
            })
            .collect()
    }

    pub fn ends(&self) -> Vec<(u16, String)> {
        self.wire
            .lock()
            .iter()
            .filter_map(|w| match w {
                Wire::End { code, reason } => Some((*code, reason.clone())),
                Wire::Send { .. } => None,
            })
            .collect()
    }

}

impl TransportHandle for RecordingHandle {
    fn send(&self, frame: Bytes, is_binary: bool) {
        self.buffered.fetch_add(frame.len(), Ordering::Relaxed);
        self.wire.lock().push(Wire::Send {
            data: frame,
            is_binary,
        });
    }

    fn end(&self, code: u16, reason: &str) {
        self.wire.lock().push(Wire::End {
            code,
            reason: reason.to_string(),
        });
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }
}

// -----------------------------------------------------------------------------
// ----- ScriptedEngine --------------------------------------------------------

/// Payloads are UTF-8 commands:
/// `settle:X`, `fail:X`, `reject`, `hold`, `!...` (unparseable), anything
/// else settles with itself.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    held: Mutex<Vec<EmitterSink<String>>>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take_held(&self) -> Vec<EmitterSink<String>> {
        std::mem::take(&mut *self.held.lock())
    }
}

impl ProtocolEngine for ScriptedEngine {
    type Payload = String;
    type Output = String;
    type ParseError = String;

    fn parse(&self, raw: &[u8]) -> Result<String, String> {
        let text = std::str::from_utf8(raw).map_err(|e| e.to_string())?;
        if text.starts_with('!') {
            return Err(format!("unexpected token at 0: {text}"));
        }
        Ok(text.to_string())
    }

    fn handle(
        &self,
        payload: Arc<String>,
        _connection: ConnectionId,
    ) -> Result<ResultEmitter<String>, HandlerFault> {
        match payload.split_once(':') {
            Some(("settle", v)) => return Ok(ResultEmitter::settled(v.to_string())),
            Some(("fail", v)) => return Ok(ResultEmitter::faulted(HandlerFault::failed(v))),
            _ => {}
        }

        match payload.as_str() {
            "reject" => Err(HandlerFault::rejected("no such command")),
            "hold" => {
                let (sink, emitter) = ResultEmitter::channel();
                self.held.lock().push(sink);
                Ok(emitter)
            }
            other => Ok(ResultEmitter::settled(other.to_string())),
        }
    }

    fn format(&self, result: &String, payload: &String) -> Bytes {
        Bytes::from(format!("{payload}={result}"))
    }

    fn format_fault(&self, fault: &HandlerFault, payload: &String) -> Option<Bytes> {
        Some(Bytes::from(format!("{payload}!{fault}")))
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
