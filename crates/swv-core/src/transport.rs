//! Transport enum.
//!
//! The public API is the [`Transport`] enum. Each backend lives in its own
//! module under `transport/`. Only the in-process backend exists today; the
//! network side of the backend is somebody else's process.

use crate::{Frame, TransportError};

/// Default number of frames buffered in each direction.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub enum Transport {
    Mem(mem::MemTransport),
}

impl Transport {
    pub async fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        match self {
            Transport::Mem(t) => t.send_frame(frame).await,
        }
    }

    pub async fn recv_frame(&self) -> Result<Frame, TransportError> {
        match self {
            Transport::Mem(t) => t.recv_frame().await,
        }
    }

    pub fn close(&self) {
        match self {
            Transport::Mem(t) => t.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Transport::Mem(t) => t.is_closed(),
        }
    }

    pub fn inproc_pair() -> (Self, Self) {
        Self::inproc_pair_with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn inproc_pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (a, b) = mem::MemTransport::pair_with_capacity(capacity);
        (Transport::Mem(a), Transport::Mem(b))
    }
}

pub mod mem;
