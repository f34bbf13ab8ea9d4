//! Frames exchanged between the two ends of a session.

use crate::{CapId, Datum, RemoteError, Response};

/// A method invocation on a remote object.
#[derive(Clone, Debug, PartialEq)]
pub struct CallFrame {
    pub call_id: u64,
    pub target: CapId,
    pub method: String,
    pub args: Vec<Datum>,
}

/// The outcome of a call, correlated by `call_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnFrame {
    pub call_id: u64,
    pub result: Result<Response, RemoteError>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Call(CallFrame),
    Return(ReturnFrame),
}

impl Frame {
    pub fn call_id(&self) -> u64 {
        match self {
            Frame::Call(call) => call.call_id,
            Frame::Return(ret) => ret.call_id,
        }
    }
}
