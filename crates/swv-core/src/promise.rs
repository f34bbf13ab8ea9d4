//! UI-facing promises.
//!
//! The front end does not consume Rust futures. It receives a [`Promise`]
//! that settles exactly once, fulfilled with a list of UI values or rejected
//! with a [`PromiseError`]. [`PromiseConverter::wrap`] bridges an RPC future
//! into such a promise through a projection step that reshapes the raw
//! response.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::IntoFuture;
use std::rc::{Rc, Weak};

use tokio::sync::Notify;

use crate::{ProjectionError, RpcError, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// Which stage of a call produced a rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Remote,
    Projection,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Remote => "remote",
            ErrorKind::Projection => "projection",
            ErrorKind::InvalidRequest => "invalid request",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The reason a promise was rejected, in a form the UI can display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromiseError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PromiseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for PromiseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for PromiseError {}

impl From<RpcError> for PromiseError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Transport(e) => PromiseError::new(ErrorKind::Transport, e.to_string()),
            RpcError::Remote(e) => PromiseError::new(ErrorKind::Remote, e.to_string()),
            RpcError::InvalidRequest(reason) => {
                PromiseError::new(ErrorKind::InvalidRequest, reason)
            }
        }
    }
}

impl From<ProjectionError> for PromiseError {
    fn from(e: ProjectionError) -> Self {
        PromiseError::new(ErrorKind::Projection, e.to_string())
    }
}

type Outcome = Result<Vec<Value>, PromiseError>;
type FulfilledHandler = Box<dyn FnOnce(&[Value])>;
type RejectedHandler = Box<dyn FnOnce(&PromiseError)>;

struct Inner {
    id: u64,
    outcome: Option<Outcome>,
    /// Set while settlement handlers run; handlers attached meanwhile are
    /// queued behind them.
    notifying: bool,
    on_fulfilled: Vec<FulfilledHandler>,
    on_rejected: Vec<RejectedHandler>,
}

/// A single-settlement result handed to the UI.
///
/// Not `Clone`: the caller owns it. Dropping it before settlement does not
/// cancel the underlying call.
pub struct Promise {
    inner: Rc<RefCell<Inner>>,
    notify: Rc<Notify>,
}

impl Promise {
    fn pending(id: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                id,
                outcome: None,
                notifying: false,
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
            })),
            notify: Rc::new(Notify::new()),
        }
    }

    /// A promise rejected before any call was made.
    pub fn rejected(error: PromiseError) -> Self {
        let promise = Self::pending(0);
        promise.inner.borrow_mut().outcome = Some(Err(error));
        promise
    }

    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    pub fn state(&self) -> PromiseState {
        match &self.inner.borrow().outcome {
            None => PromiseState::Pending,
            Some(Ok(_)) => PromiseState::Fulfilled,
            Some(Err(_)) => PromiseState::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// The settled values or error, without waiting.
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.borrow().outcome.clone()
    }

    /// Run `handler` with the values once the promise is fulfilled.
    ///
    /// Runs immediately if it already was; never runs if it is rejected.
    pub fn on_fulfilled<F>(&self, handler: F)
    where
        F: FnOnce(&[Value]) + 'static,
    {
        let values = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match (&inner.outcome, inner.notifying) {
                (None, _) | (Some(Ok(_)), true) => {
                    inner.on_fulfilled.push(Box::new(handler));
                    return;
                }
                (Some(Ok(values)), false) => values.clone(),
                (Some(Err(_)), _) => return,
            }
        };
        handler(&values);
    }

    /// Run `handler` with the error once the promise is rejected.
    pub fn on_rejected<F>(&self, handler: F)
    where
        F: FnOnce(&PromiseError) + 'static,
    {
        let error = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match (&inner.outcome, inner.notifying) {
                (None, _) | (Some(Err(_)), true) => {
                    inner.on_rejected.push(Box::new(handler));
                    return;
                }
                (Some(Err(error)), false) => error.clone(),
                (Some(Ok(_)), _) => return,
            }
        };
        handler(&error);
    }

    /// Wait for settlement.
    pub async fn settled(&self) -> Outcome {
        loop {
            let notified = self.notify.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

fn settle(cell: &RefCell<Inner>, notify: &Notify, outcome: Outcome) {
    let id = {
        let mut inner = cell.borrow_mut();
        if inner.outcome.is_some() {
            return;
        }
        inner.outcome = Some(outcome.clone());
        inner.notifying = true;
        inner.id
    };
    notify.notify_waiters();

    match &outcome {
        Ok(values) => tracing::debug!(promise_id = id, values = values.len(), "promise fulfilled"),
        Err(error) => tracing::debug!(promise_id = id, error = %error, "promise rejected"),
    }

    // Handlers attached by a running handler land in the lists again and run
    // in the next round.
    loop {
        let (on_fulfilled, on_rejected) = {
            let mut inner = cell.borrow_mut();
            let on_fulfilled = std::mem::take(&mut inner.on_fulfilled);
            let on_rejected = std::mem::take(&mut inner.on_rejected);
            if on_fulfilled.is_empty() && on_rejected.is_empty() {
                inner.notifying = false;
                return;
            }
            (on_fulfilled, on_rejected)
        };
        match &outcome {
            Ok(values) => on_fulfilled.into_iter().for_each(|handler| handler(values)),
            Err(error) => on_rejected.into_iter().for_each(|handler| handler(error)),
        }
    }
}

/// Counts a wrapped call as pending until its task finishes or is dropped.
struct PendingGuard(Rc<Cell<usize>>);

impl PendingGuard {
    fn new(pending: &Rc<Cell<usize>>) -> Self {
        pending.set(pending.get() + 1);
        Self(pending.clone())
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Creates [`Promise`]s from RPC futures.
///
/// Cheap to clone; clones share the promise counter.
#[derive(Clone, Debug, Default)]
pub struct PromiseConverter {
    next_id: Rc<Cell<u64>>,
    pending: Rc<Cell<usize>>,
}

impl PromiseConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of promises created by this converter that have not settled.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Bridge `future` into a promise. `projection` reshapes a successful
    /// response into UI values; its error rejects the promise.
    ///
    /// Returns immediately. Must be called inside a `tokio::task::LocalSet`.
    pub fn wrap<F, T, P>(&self, future: F, projection: P) -> Promise
    where
        F: IntoFuture<Output = Result<T, RpcError>>,
        F::IntoFuture: 'static,
        T: 'static,
        P: FnOnce(T) -> Result<Vec<Value>, ProjectionError> + 'static,
    {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let guard = PendingGuard::new(&self.pending);

        let promise = Promise::pending(id);
        let inner: Weak<RefCell<Inner>> = Rc::downgrade(&promise.inner);
        let notify = promise.notify.clone();
        let future = future.into_future();

        tracing::trace!(promise_id = id, "promise created");
        tokio::task::spawn_local(async move {
            let outcome: Outcome = match future.await {
                Ok(response) => projection(response).map_err(PromiseError::from),
                Err(e) => Err(e.into()),
            };
            drop(guard);

            match inner.upgrade() {
                Some(inner) => settle(&inner, &notify, outcome),
                None => tracing::trace!(promise_id = id, "promise dropped before settling"),
            }
        });

        promise
    }
}
