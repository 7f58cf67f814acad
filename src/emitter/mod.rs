//! Per-request result streams.
//!
//! `ProtocolEngine::handle` hands back a [`ResultEmitter`]; the work producing
//! results keeps the matching [`EmitterSink`]. Everything travels over a
//! single channel of [`Emission`]s, so intermediate notifications and the
//! terminal result stay in emission order. A [`CancelHook`] taken from the
//! emitter stops the stream: once it fires, `next()` never yields again, no
//! matter what the producer keeps pushing.

use std::future::Future;

use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::HandlerFault;

// -----------------------------------------------------------------------------
// ----- Emission --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission<R> {
    Intermediate(R),
    Terminal(Result<R, HandlerFault>),
}

impl<R> Emission<R> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Emission::Terminal(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    Active,
    Settled,
    Cancelled,
}

// -----------------------------------------------------------------------------
// ----- ResultEmitter ---------------------------------------------------------

#[derive(Debug)]
pub struct ResultEmitter<R> {
    events: mpsc::UnboundedReceiver<Emission<R>>,
    token: CancellationToken,
    state: EmitterState,
}

// -----------------------------------------------------------------------------
// ----- ResultEmitter: Static -------------------------------------------------

impl<R> ResultEmitter<R> {
    pub fn channel() -> (EmitterSink<R>, ResultEmitter<R>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let sink = EmitterSink {
            events: tx,
            token: token.clone(),
        };

        let emitter = ResultEmitter {
            events: rx,
            token,
            state: EmitterState::Active,
        };

        (sink, emitter)
    }

    /// An emitter that is already settled with `result`.
    pub fn settled(result: R) -> Self {
        let (sink, emitter) = Self::channel();
        sink.settle(result);
        emitter
    }

    /// An emitter that is already settled with a fault.
    pub fn faulted(fault: HandlerFault) -> Self {
        let (sink, emitter) = Self::channel();
        sink.fail(fault);
        emitter
    }
}

// -----------------------------------------------------------------------------
// ----- ResultEmitter: Public -------------------------------------------------

impl<R> ResultEmitter<R> {
    pub fn cancel_hook(&self) -> CancelHook {
        CancelHook {
            token: self.token.clone(),
        }
    }

    pub fn state(&self) -> EmitterState {
        if self.state == EmitterState::Active && self.token.is_cancelled() {
            return EmitterState::Cancelled;
        }

        self.state
    }

    /// Next emission in order, or `None` once settled or cancelled.
    ///
    /// Cancellation wins over anything still queued.
    pub async fn next(&mut self) -> Option<Emission<R>> {
        if self.state() != EmitterState::Active {
            return None;
        }

        let received = select! {
            biased;

            _ = self.token.cancelled() => {
                self.state = EmitterState::Cancelled;
                return None;
            }

            received = self.events.recv() => received,
        };

        match received {
            Some(Emission::Intermediate(result)) => Some(Emission::Intermediate(result)),
            Some(Emission::Terminal(outcome)) => {
                self.state = EmitterState::Settled;
                Some(Emission::Terminal(outcome))
            }
            None => {
                self.state = EmitterState::Settled;
                Some(Emission::Terminal(Err(HandlerFault::Abandoned)))
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- EmitterSink -----------------------------------------------------------

/// Producer half. Dropping it without settling reports `HandlerFault::Abandoned`.
#[derive(Debug)]
pub struct EmitterSink<R> {
    events: mpsc::UnboundedSender<Emission<R>>,
    token: CancellationToken,
}

impl<R> EmitterSink<R> {
    /// Push an intermediate result. Returns false once nobody is listening.
    pub fn notify(&self, result: R) -> bool {
        if self.token.is_cancelled() {
            return false;
        }

        self.events.send(Emission::Intermediate(result)).is_ok()
    }

    pub fn settle(self, result: R) {
        self.finish(Ok(result));
    }

    pub fn fail(self, fault: HandlerFault) {
        self.finish(Err(fault));
    }

    pub fn finish(self, outcome: Result<R, HandlerFault>) {
        if self.token.is_cancelled() {
            return;
        }

        let _ = self.events.send(Emission::Terminal(outcome));
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Drive `work` unless the request gets cancelled first.
    pub async fn until_cancelled<F>(&self, work: F) -> Option<F::Output>
    where
        F: Future,
    {
        select! {
            biased;
            _ = self.token.cancelled() => None,
            out = work => Some(out),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- CancelHook ------------------------------------------------------------

/// Move-only, so whoever owns it can fire it at most once.
#[derive(Debug)]
pub struct CancelHook {
    token: CancellationToken,
}

impl CancelHook {
    pub fn cancel(self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
