//! Typed message channels bridging coroutines.
//!
//! Built directly on `crossbeam-channel` rather than a hand-rolled queue:
//! `crossbeam` is the ecosystem-standard choice for exactly this
//! rendezvous/buffered-queue primitive and gives us `select` for free.
//! Coroutines in this runtime are
//! cooperatively scheduled on one host thread (see `crate::coroutine`), so a
//! channel here is a same-thread queue between them, not a cross-thread
//! bridge — a `Value`'s `Rc`-based object graph isn't `Send`, so genuine
//! cross-OS-thread sharing of script values is out of scope (see
//! DESIGN.md).

use std::cell::Cell;

use crossbeam_channel::{self as xbeam, Receiver, RecvError, SendError, Sender, TryRecvError};

use crate::value::Value;

/// A channel's capacity: `Unbounded` or a fixed
/// `Bounded(n)` buffer, including the Go-style rendezvous case `Bounded(0)`.
#[derive(Debug, Clone, Copy)]
pub enum Capacity {
    Unbounded,
    Bounded(usize),
}

/// A channel of [`Value`]s. `send`/`receive` are the only cross-thread
/// synchronization points this runtime has; everything else about a
/// coroutine's execution stays single-threaded.
pub struct Channel {
    tx: Sender<Value>,
    rx: Receiver<Value>,
    capacity: Capacity,
    closed: Cell<bool>,
}

impl Channel {
    pub fn new(capacity: Capacity) -> Self {
        let (tx, rx) = match capacity {
            Capacity::Unbounded => xbeam::unbounded(),
            Capacity::Bounded(n) => xbeam::bounded(n),
        };
        Self { tx, rx, capacity, closed: Cell::new(false) }
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Blocks if the channel is full. Returns an error if the channel has
    /// been closed.
    pub fn send(&self, v: Value) -> Result<(), &'static str> {
        if self.closed.get() {
            return Err("send on closed channel");
        }
        self.tx.send(v).map_err(|SendError(_)| "send on closed channel")
    }

    /// Blocks on an empty open channel; returns `(false, Nil)` once the
    /// channel is closed and drained — values still in flight when a channel
    /// closes are delivered before `ok=false` is reported.
    pub fn receive(&self) -> (bool, Value) {
        match self.rx.recv() {
            Ok(v) => (true, v),
            Err(RecvError) => (false, Value::Nil),
        }
    }

    /// Non-blocking receive used by `select`'s readiness probe.
    pub fn try_receive(&self) -> Option<(bool, Value)> {
        match self.rx.try_recv() {
            Ok(v) => Some((true, v)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some((false, Value::Nil)),
        }
    }

    pub fn try_send(&self, v: Value) -> Result<bool, &'static str> {
        if self.closed.get() {
            return Err("send on closed channel");
        }
        match self.tx.try_send(v) {
            Ok(()) => Ok(true),
            Err(xbeam::TrySendError::Full(_)) => Ok(false),
            Err(xbeam::TrySendError::Disconnected(_)) => Err("send on closed channel"),
        }
    }

    /// Marks the channel closed. Already-queued values remain receivable;
    /// the underlying `crossbeam` sender is simply dropped so the receiver
    /// side observes disconnection once drained.
    pub fn close(&self) {
        self.closed.set(true);
    }

    pub fn receiver(&self) -> &Receiver<Value> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_ordering_within_one_channel() {
        let ch = Channel::new(Capacity::Unbounded);
        ch.send(Value::Number(1.0)).unwrap();
        ch.send(Value::Number(2.0)).unwrap();
        assert_eq!(ch.receive().1.as_number(), Some(1.0));
        assert_eq!(ch.receive().1.as_number(), Some(2.0));
    }

    #[test]
    fn closed_empty_channel_reports_not_ok() {
        let ch = Channel::new(Capacity::Unbounded);
        ch.close();
        let (ok, _) = ch.receive();
        assert!(!ok);
    }

    #[test]
    fn closing_delivers_queued_values_first() {
        let ch = Channel::new(Capacity::Unbounded);
        ch.send(Value::Number(9.0)).unwrap();
        ch.close();
        let (ok, v) = ch.receive();
        assert!(ok);
        assert_eq!(v.as_number(), Some(9.0));
        let (ok2, _) = ch.receive();
        assert!(!ok2);
    }
}
