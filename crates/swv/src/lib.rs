#![doc = include_str!("../README.md")]

// Re-export swv_core for callers that drive sessions directly
#[doc(hidden)]
pub extern crate swv_core;

pub use swv_core::{
    // Pipelining
    CachedHandle,
    Client,
    ForkedFuture,
    PendingRequest,
    RequestChain,
    SentRequest,
    // UI-facing results
    ErrorKind,
    Promise,
    PromiseConverter,
    PromiseError,
    PromiseState,
    Value,
    // RPC boundary
    RpcError,
    RpcSession,
    SessionConfig,
    Transport,
    TransportError,
};

mod backend;
mod contest;
mod creation;
mod filter;
mod generator;
pub mod schema;

pub use backend::*;
pub use contest::*;
pub use creation::*;
pub use filter::*;
pub use generator::*;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use swv::prelude::*;
///
/// let backend = BackendWrapper::new(client, PromiseConverter::new());
/// backend.increment(4).on_fulfilled(|values| println!("{:?}", values));
/// ```
pub mod prelude {
    pub use crate::{
        BackendWrapper, Client, ContestCreationRequest, ContestGeneratorWrapper, Filter,
        FilterType, Promise, PromiseConverter, PromiseError, RpcSession, Transport, Value,
    };
}
