//! transport/outbox.rs
//!
//! Outbound queue for one socket. Producers push frames from the gateway
//! loop, the connection's writer task drains them. The outbox keeps a running
//! count of queued payload bytes so the gateway can ask for the buffered
//! amount, and reports a drain once a backlog above the threshold falls back
//! to it.

use bytes::Bytes;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::sync::mpsc;

// -----------------------------------------------------------------------------
// ----- Outbound --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame { data: Bytes, is_binary: bool },
    End { code: u16, reason: String },
}

// -----------------------------------------------------------------------------
// ----- Outbox ----------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
    buffered: Arc<AtomicUsize>,
    ended: Arc<AtomicBool>,
}

impl Outbox {
    pub fn new(drain_threshold: usize) -> (Outbox, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));

        let outbox = Outbox {
            tx,
            buffered: buffered.clone(),
            ended: Arc::new(AtomicBool::new(false)),
        };

        let receiver = OutboxReceiver {
            rx,
            buffered,
            drain_threshold,
            backlogged: false,
        };

        (outbox, receiver)
    }
}

// -----------------------------------------------------------------------------
// ----- Outbox: Public --------------------------------------------------------

impl Outbox {
    /// Queue a data frame. Returns false once the socket was ended.
    pub fn push(&self, data: Bytes, is_binary: bool) -> bool {
        if self.ended.load(Ordering::Acquire) {
            return false;
        }

        let len = data.len();
        self.buffered.fetch_add(len, Ordering::AcqRel);

        if self.tx.send(Outbound::Frame { data, is_binary }).is_err() {
            self.buffered.fetch_sub(len, Ordering::AcqRel);
            return false;
        }

        true
    }

    /// Queue a close frame behind everything already pushed. Only the first
    /// call has any effect.
    pub fn end(&self, code: u16, reason: &str) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.tx.send(Outbound::End {
            code,
            reason: reason.to_string(),
        });
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    pub fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }
}

// -----------------------------------------------------------------------------
// ----- OutboxReceiver --------------------------------------------------------

#[derive(Debug)]
pub struct OutboxReceiver {
    rx: mpsc::UnboundedReceiver<Outbound>,
    buffered: Arc<AtomicUsize>,
    drain_threshold: usize,
    backlogged: bool,
}

impl OutboxReceiver {
    pub async fn recv(&mut self) -> Option<Outbound> {
        let next = self.rx.recv().await?;

        if self.buffered.load(Ordering::Acquire) > self.drain_threshold {
            self.backlogged = true;
        }

        Some(next)
    }

    /// Account for `len` bytes that reached the socket. Once a backlog falls
    /// back to the drain threshold, returns the bytes still queued.
    pub fn written(&mut self, len: usize) -> Option<usize> {
        let before = self.buffered.fetch_sub(len, Ordering::AcqRel);
        let now = before.saturating_sub(len);

        if self.backlogged && now <= self.drain_threshold {
            self.backlogged = false;
            return Some(now);
        }

        None
    }

    pub fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(len: usize) -> Bytes {
        Bytes::from(vec![0xAA; len])
    }

    #[tokio::test]
    async fn push_counts_buffered_bytes_until_written() {
        let (outbox, mut rx) = Outbox::new(1024);
        assert!(outbox.push(frame(10), true));
        assert!(outbox.push(frame(5), false));
        assert_eq!(outbox.buffered_amount(), 15);

        let Some(Outbound::Frame { data, is_binary }) = rx.recv().await else {
            panic!("expected a frame");
        };
        assert!(is_binary);
        assert_eq!(rx.written(data.len()), None);
        assert_eq!(outbox.buffered_amount(), 5);
    }

    #[tokio::test]
    async fn end_is_queued_once_and_blocks_later_pushes() {
        let (outbox, mut rx) = Outbox::new(1024);
        outbox.push(frame(3), true);
        outbox.end(1002, "bad");
        outbox.end(1001, "again");

        assert!(outbox.is_ended());
        assert!(!outbox.push(frame(3), true));
        assert_eq!(outbox.buffered_amount(), 3);

        assert!(matches!(rx.recv().await, Some(Outbound::Frame { .. })));
        assert_eq!(
            rx.recv().await,
            Some(Outbound::End {
                code: 1002,
                reason: "bad".into()
            })
        );

        drop(outbox);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn drain_reports_what_is_left_once_backlog_falls_to_threshold() {
        let (outbox, mut rx) = Outbox::new(8);
        for _ in 0..4 {
            outbox.push(frame(6), true);
        }

        let mut drains = Vec::new();
        for _ in 0..4 {
            let Some(Outbound::Frame { data, .. }) = rx.recv().await else {
                panic!("expected a frame");
            };
            if let Some(remaining) = rx.written(data.len()) {
                drains.push(remaining);
            }
        }

        // 24 -> 18 -> 12 -> 6: fires at 6, not again at 0
        assert_eq!(drains, vec![6]);
        assert_eq!(rx.buffered_amount(), 0);
    }

    #[tokio::test]
    async fn backlog_can_drain_more_than_once() {
        let (outbox, mut rx) = Outbox::new(8);
        outbox.push(frame(6), true);
        outbox.push(frame(6), true);

        rx.recv().await.unwrap();
        assert_eq!(rx.written(6), Some(6));

        outbox.push(frame(6), true);
        rx.recv().await.unwrap();
        assert_eq!(rx.written(6), Some(6));
    }

    #[tokio::test]
    async fn no_drain_without_backlog() {
        let (outbox, mut rx) = Outbox::new(64);
        outbox.push(frame(6), true);

        rx.recv().await.unwrap();
        assert_eq!(rx.written(6), None);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
