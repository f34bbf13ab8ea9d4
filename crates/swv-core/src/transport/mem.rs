use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::{Either, select};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use crate::{Frame, TransportError};

use super::DEFAULT_CHANNEL_CAPACITY;

/// In-process transport: a pair of bounded channels, frames are moved
/// without serialization.
#[derive(Clone, Debug)]
pub struct MemTransport {
    inner: Arc<InProcInner>,
}

#[derive(Debug)]
struct InProcInner {
    /// Dropped on close so the peer's receiver observes the end of stream.
    tx: Mutex<Option<mpsc::Sender<Frame>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl MemTransport {
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(capacity.max(1));
        let (tx_b, rx_b) = mpsc::channel(capacity.max(1));

        let inner_a = Arc::new(InProcInner::new(tx_b, rx_a));
        let inner_b = Arc::new(InProcInner::new(tx_a, rx_b));

        (Self { inner: inner_a }, Self { inner: inner_b })
    }

    pub async fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let tx = self
            .inner
            .tx
            .lock()
            .clone()
            .ok_or(TransportError::Closed)?;

        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    pub async fn recv_frame(&self) -> Result<Frame, TransportError> {
        // Registered before the flag check so a concurrent close() cannot
        // slip between the check and the wait.
        let notified = pin!(self.inner.close_notify.notified());
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut rx = self.inner.rx.lock().await;
        let recv = pin!(rx.recv());
        match select(recv, notified).await {
            Either::Left((frame, _)) => frame.ok_or(TransportError::Closed),
            Either::Right(_) => Err(TransportError::Closed),
        }
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.tx.lock().take();
        self.inner.close_notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl InProcInner {
    fn new(tx: mpsc::Sender<Frame>, rx: mpsc::Receiver<Frame>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallFrame, CapId};

    fn call(call_id: u64) -> Frame {
        Frame::Call(CallFrame {
            call_id,
            target: CapId::BOOTSTRAP,
            method: "ping".into(),
            args: Vec::new(),
        })
    }

    #[tokio::test]
    async fn frames_cross_in_order() {
        let (a, b) = MemTransport::pair();
        a.send_frame(call(1)).await.unwrap();
        a.send_frame(call(2)).await.unwrap();
        assert_eq!(b.recv_frame().await.unwrap().call_id(), 1);
        assert_eq!(b.recv_frame().await.unwrap().call_id(), 2);
    }

    #[tokio::test]
    async fn close_is_observed_by_both_ends() {
        let (a, b) = MemTransport::pair();
        a.close();
        assert_eq!(a.send_frame(call(1)).await, Err(TransportError::Closed));
        assert_eq!(a.recv_frame().await.unwrap_err(), TransportError::Closed);
        // The peer sees the end of the stream once our sender is gone.
        assert_eq!(b.recv_frame().await.unwrap_err(), TransportError::Closed);
    }
}
