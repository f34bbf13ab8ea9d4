//! RPC session: call/return correlation on top of a [`Transport`].
//!
//! A session owns the pending-call table. The initiating side issues calls
//! with [`RpcSession::call`]; the accepting side installs a dispatcher with
//! [`RpcSession::set_dispatcher`]. Either way, [`RpcSession::run`] must be
//! driven for frames to flow:
//!
//! ```ignore
//! let session = Arc::new(RpcSession::new(transport));
//! tokio::task::spawn_local(session.clone().run());
//! let response = session.call(CapId::BOOTSTRAP, "increment", vec![Datum::UInt(1)]).await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    CallFrame, CapId, Datum, ErrorCode, Frame, RemoteError, Response, ReturnFrame, RpcError,
    Transport, TransportError,
};

/// Default cap on calls awaiting a response.
pub const DEFAULT_MAX_PENDING_CALLS: usize = 1024;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub max_pending_calls: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_pending_calls: DEFAULT_MAX_PENDING_CALLS,
        }
    }
}

impl SessionConfig {
    pub fn with_max_pending_calls(mut self, limit: usize) -> Self {
        self.max_pending_calls = limit;
        self
    }
}

/// Future returned by a dispatcher.
pub type DispatchFuture = Pin<Box<dyn Future<Output = Result<Response, RemoteError>> + Send>>;

type Dispatcher = Arc<dyn Fn(CallFrame) -> DispatchFuture + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Initiator,
    Acceptor,
}

pub struct RpcSession {
    transport: Transport,
    role: Role,
    config: SessionConfig,
    next_call_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Response, RpcError>>>>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl std::fmt::Debug for RpcSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcSession")
            .field("role", &self.role)
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl RpcSession {
    /// Create the initiating side of a session.
    pub fn new(transport: Transport) -> Self {
        Self::with_role(transport, Role::Initiator, SessionConfig::default())
    }

    /// Create the accepting (serving) side of a session.
    pub fn new_acceptor(transport: Transport) -> Self {
        Self::with_role(transport, Role::Acceptor, SessionConfig::default())
    }

    pub fn with_config(transport: Transport, config: SessionConfig) -> Self {
        Self::with_role(transport, Role::Initiator, config)
    }

    fn with_role(transport: Transport, role: Role, config: SessionConfig) -> Self {
        // Initiators use odd call ids, acceptors even ones, so the two
        // directions never collide.
        let first_id = match role {
            Role::Initiator => 1,
            Role::Acceptor => 2,
        };
        Self {
            transport,
            role,
            config,
            next_call_id: AtomicU64::new(first_id),
            pending: Mutex::new(HashMap::new()),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Install the handler for incoming calls.
    pub fn set_dispatcher<F>(&self, dispatcher: F)
    where
        F: Fn(CallFrame) -> DispatchFuture + Send + Sync + 'static,
    {
        *self.dispatcher.lock() = Some(Arc::new(dispatcher));
    }

    pub fn next_call_id(&self) -> u64 {
        self.next_call_id.fetch_add(2, Ordering::Relaxed)
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().len()
    }

    /// Invoke `method` on `target` and wait for its return frame.
    pub async fn call(
        &self,
        target: CapId,
        method: &str,
        args: Vec<Datum>,
    ) -> Result<Response, RpcError> {
        if self.transport.is_closed() {
            return Err(TransportError::Closed.into());
        }

        let call_id = self.next_call_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.len() >= self.config.max_pending_calls {
                return Err(TransportError::TooManyPendingCalls {
                    limit: self.config.max_pending_calls,
                }
                .into());
            }
            pending.insert(call_id, tx);
        }

        tracing::debug!(call_id, %target, method, args = args.len(), "sending call");
        let frame = Frame::Call(CallFrame {
            call_id,
            target,
            method: method.to_owned(),
            args,
        });
        if let Err(e) = self.transport.send_frame(frame).await {
            self.pending.lock().remove(&call_id);
            return Err(e.into());
        }

        // The sender is dropped without a value only when the session shuts down.
        rx.await.unwrap_or(Err(TransportError::Closed.into()))
    }

    /// Receive loop. Completes pending calls and dispatches incoming ones
    /// until the transport closes.
    pub async fn run(self: Arc<Self>) -> Result<(), TransportError> {
        tracing::debug!(role = ?self.role, "session started");
        loop {
            match self.transport.recv_frame().await {
                Ok(Frame::Return(ret)) => self.complete(ret),
                Ok(Frame::Call(call)) => self.dispatch(call),
                Err(TransportError::Closed) => {
                    tracing::debug!(role = ?self.role, "session closed");
                    self.fail_pending();
                    return Ok(());
                }
                Err(e) => {
                    self.fail_pending();
                    return Err(e);
                }
            }
        }
    }

    /// Close the transport and fail every pending call.
    pub fn close(&self) {
        self.transport.close();
        self.fail_pending();
    }

    fn complete(&self, ret: ReturnFrame) {
        let Some(tx) = self.pending.lock().remove(&ret.call_id) else {
            tracing::warn!(call_id = ret.call_id, "return frame for unknown call");
            return;
        };
        tracing::debug!(call_id = ret.call_id, ok = ret.result.is_ok(), "call returned");
        // The caller may have stopped waiting; the result is dropped then.
        let _ = tx.send(ret.result.map_err(RpcError::Remote));
    }

    fn dispatch(self: &Arc<Self>, call: CallFrame) {
        let call_id = call.call_id;
        let Some(dispatcher) = self.dispatcher.lock().clone() else {
            tracing::warn!(call_id, method = %call.method, "incoming call without a dispatcher");
            let session = self.clone();
            tokio::spawn(async move {
                let result = Err(RemoteError::new(
                    ErrorCode::Unimplemented,
                    format!("no handler for `{}`", call.method),
                ));
                session.reply(call_id, result).await;
            });
            return;
        };

        let session = self.clone();
        tokio::spawn(async move {
            let result = dispatcher(call).await;
            session.reply(call_id, result).await;
        });
    }

    async fn reply(&self, call_id: u64, result: Result<Response, RemoteError>) {
        let frame = Frame::Return(ReturnFrame { call_id, result });
        if let Err(e) = self.transport.send_frame(frame).await {
            tracing::debug!(call_id, error = %e, "dropping reply");
        }
    }

    fn fail_pending(&self) {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "failing pending calls");
        }
        for (_, tx) in pending {
            let _ = tx.send(Err(TransportError::Closed.into()));
        }
    }
}
