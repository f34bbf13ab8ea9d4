//! Pipelining client.
//!
//! A [`PendingRequest`] may target a capability that has not been returned
//! yet ([`PromisedCap`]) and may take arguments that are fields of responses
//! that have not arrived yet ([`PipelinedField`]). [`Client::send`] returns
//! immediately; the spawned send task waits for those dependencies and only
//! then writes the call. If a dependency fails, the request fails with the
//! same error and is never written.
//!
//! Pipelined references can only be taken from a [`SentRequest`], so a
//! reference is never consumed before its source has been sent.

use std::cell::Cell;
use std::fmt;
use std::future::IntoFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::{
    Branch, CapId, Datum, ForkState, ForkedFuture, Response, RpcError, RpcSession,
};

/// Lifecycle of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendState {
    Unsent,
    Sent,
    Resolved,
    Failed,
}

/// The object a request is addressed to.
#[derive(Clone, Debug)]
pub enum Target {
    Bootstrap,
    Object(CapId),
    Promised(PromisedCap),
}

impl Target {
    async fn resolve(self) -> Result<CapId, RpcError> {
        match self {
            Target::Bootstrap => Ok(CapId::BOOTSTRAP),
            Target::Object(id) => Ok(id),
            Target::Promised(cap) => cap.resolve().await,
        }
    }
}

impl From<CapId> for Target {
    fn from(id: CapId) -> Self {
        Target::Object(id)
    }
}

impl From<PromisedCap> for Target {
    fn from(cap: PromisedCap) -> Self {
        Target::Promised(cap)
    }
}

/// A capability that will be known once some response arrives.
#[derive(Clone, Debug)]
pub struct PromisedCap {
    cap: ForkedFuture<CapId>,
}

impl PromisedCap {
    pub fn from_fork(cap: ForkedFuture<CapId>) -> Self {
        Self { cap }
    }

    pub fn resolved(id: CapId) -> Self {
        Self::from_fork(ForkedFuture::resolved(id))
    }

    /// Start building a call on this capability.
    pub fn request(&self, method: impl Into<String>) -> PendingRequest {
        PendingRequest::new(Target::Promised(self.clone()), method)
    }

    pub async fn resolve(&self) -> Result<CapId, RpcError> {
        self.cap.add_branch().await
    }

    pub fn fork(&self) -> &ForkedFuture<CapId> {
        &self.cap
    }
}

/// A field of a response that has not necessarily arrived yet.
#[derive(Clone, Debug)]
pub struct PipelinedField {
    source: ForkedFuture<Response>,
    field: String,
}

impl PipelinedField {
    async fn resolve(self) -> Result<Datum, RpcError> {
        let response = self.source.add_branch().await?;
        Ok(response.field(&self.field)?.clone())
    }
}

#[derive(Clone, Debug)]
enum Arg {
    Value(Datum),
    Pipelined(PipelinedField),
}

impl Arg {
    async fn resolve(self) -> Result<Datum, RpcError> {
        match self {
            Arg::Value(datum) => Ok(datum),
            Arg::Pipelined(field) => field.resolve().await,
        }
    }
}

/// An unsent call descriptor.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    target: Target,
    method: String,
    args: Vec<Arg>,
    after: Vec<ForkedFuture<Response>>,
}

impl PendingRequest {
    pub fn new(target: impl Into<Target>, method: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            args: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Append a concrete argument.
    pub fn arg(mut self, value: impl Into<Datum>) -> Self {
        self.args.push(Arg::Value(value.into()));
        self
    }

    /// Append an argument taken from another request's future response.
    pub fn pipelined_arg(mut self, field: PipelinedField) -> Self {
        self.args.push(Arg::Pipelined(field));
        self
    }

    /// Do not write this request before `dependency` has resolved; fail with
    /// its error if it fails.
    pub fn after(mut self, dependency: &SentRequest) -> Self {
        self.after.push(dependency.response.clone());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn state(&self) -> SendState {
        SendState::Unsent
    }

    fn validate(&self) -> Result<(), RpcError> {
        if self.method.is_empty() {
            return Err(RpcError::invalid_request("empty method name"));
        }
        Ok(())
    }
}

/// A request handed to the client. Cloning shares the same response.
#[derive(Clone)]
pub struct SentRequest {
    id: u64,
    method: Rc<str>,
    response: ForkedFuture<Response>,
}

impl SentRequest {
    /// A request that failed before it could be sent.
    pub fn failed(method: impl Into<Rc<str>>, error: RpcError) -> Self {
        Self {
            id: 0,
            method: method.into(),
            response: ForkedFuture::rejected(error),
        }
    }

    /// Client-local request number; `0` for requests that were never sent.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn state(&self) -> SendState {
        match self.response.state() {
            ForkState::Pending => SendState::Sent,
            ForkState::Resolved => SendState::Resolved,
            ForkState::Rejected => SendState::Failed,
        }
    }

    /// Reference `name` in this request's response, for use as an argument.
    pub fn field(&self, name: impl Into<String>) -> PipelinedField {
        PipelinedField {
            source: self.response.clone(),
            field: name.into(),
        }
    }

    /// The capability held in field `name` of this request's response.
    pub fn cap(&self, name: impl Into<String>) -> PromisedCap {
        let response = self.response.add_branch();
        let field = name.into();
        PromisedCap::from_fork(ForkedFuture::new(async move {
            Ok(response.await?.cap(&field)?)
        }))
    }

    pub fn response(&self) -> Branch<Response> {
        self.response.add_branch()
    }

    pub fn fork(&self) -> &ForkedFuture<Response> {
        &self.response
    }
}

impl IntoFuture for SentRequest {
    type Output = Result<Response, RpcError>;
    type IntoFuture = Branch<Response>;

    fn into_future(self) -> Self::IntoFuture {
        self.response.add_branch()
    }
}

impl fmt::Debug for SentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("state", &self.state())
            .finish()
    }
}

/// Issues pipelined requests over an [`RpcSession`].
#[derive(Clone, Debug)]
pub struct Client {
    session: Arc<RpcSession>,
    next_request: Rc<Cell<u64>>,
}

impl Client {
    pub fn new(session: Arc<RpcSession>) -> Self {
        Self {
            session,
            next_request: Rc::new(Cell::new(1)),
        }
    }

    pub fn session(&self) -> &Arc<RpcSession> {
        &self.session
    }

    /// The object the session is bootstrapped with.
    pub fn bootstrap(&self) -> Target {
        Target::Bootstrap
    }

    /// Start building a call on the bootstrap object.
    pub fn request(&self, method: impl Into<String>) -> PendingRequest {
        PendingRequest::new(self.bootstrap(), method)
    }

    /// Hand `request` to the RPC layer. Returns without waiting for anything;
    /// the call is written once its target and arguments are available.
    pub fn send(&self, request: PendingRequest) -> SentRequest {
        let id = self.next_request.get();
        self.next_request.set(id + 1);

        if let Err(e) = request.validate() {
            tracing::debug!(request = id, error = %e, "request rejected before send");
            return SentRequest {
                id,
                method: request.method.into(),
                response: ForkedFuture::rejected(e),
            };
        }

        let PendingRequest {
            target,
            method,
            args,
            after,
        } = request;
        let name: Rc<str> = method.as_str().into();
        let session = self.session.clone();

        tracing::trace!(request = id, method = %method, args = args.len(), "request sent");
        let response = ForkedFuture::new(async move {
            for dependency in after {
                dependency.add_branch().await?;
            }
            let target = target.resolve().await?;
            let mut resolved = Vec::with_capacity(args.len());
            for arg in args {
                resolved.push(arg.resolve().await?);
            }
            session.call(target, &method, resolved).await
        });

        SentRequest {
            id,
            method: name,
            response,
        }
    }
}
