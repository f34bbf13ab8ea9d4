//! Multi-step pipelined interactions.
//!
//! Step N's request is built against step N-1's [`SentRequest`] before that
//! request has resolved, so the whole chain costs one round trip of latency
//! on the caller's side instead of one per step.
//!
//! ```ignore
//! let contests = RequestChain::new(client.clone(), client.request("getContestGenerator"))
//!     .then(|generator| Ok(generator.cap("generator").request("next")))
//!     .issue();
//! let response = contests.await?;
//! ```

use std::future::Future;

use futures_util::future::try_join;

use crate::{Client, PendingRequest, RpcError, SentRequest};

type Step = Box<dyn FnOnce(&SentRequest) -> Result<PendingRequest, RpcError>>;

pub struct RequestChain {
    client: Client,
    first: PendingRequest,
    steps: Vec<Step>,
}

impl RequestChain {
    pub fn new(client: Client, first: PendingRequest) -> Self {
        Self {
            client,
            first,
            steps: Vec::new(),
        }
    }

    /// Append a step built from the previous step's (unresolved) request.
    pub fn then<F>(mut self, step: F) -> Self
    where
        F: FnOnce(&SentRequest) -> Result<PendingRequest, RpcError> + 'static,
    {
        self.steps.push(Box::new(step));
        self
    }

    /// Number of requests the chain will send, the first one included.
    pub fn steps(&self) -> usize {
        self.steps.len() + 1
    }

    /// Send every step without waiting on the network between them.
    ///
    /// Returns the last step's request. If a step cannot be built, nothing
    /// after it is built or sent and the returned request fails with the
    /// step's error. A failure of step N propagates unchanged to every later
    /// step, none of which is then written.
    pub fn issue(self) -> SentRequest {
        let total = self.steps();
        let mut previous = self.client.send(self.first);

        for (index, step) in self.steps.into_iter().enumerate() {
            let request = match step(&previous) {
                Ok(request) => request.after(&previous),
                Err(e) => {
                    tracing::debug!(step = index + 2, total, error = %e, "chain stopped");
                    return SentRequest::failed(format!("chain step {}", index + 2), e);
                }
            };
            previous = self.client.send(request);
        }

        previous
    }
}

/// Wait for two independent futures and pair their results, failing with
/// the first error.
pub fn join<A, B, FA, FB>(a: FA, b: FB) -> impl Future<Output = Result<(A, B), RpcError>>
where
    FA: Future<Output = Result<A, RpcError>>,
    FB: Future<Output = Result<B, RpcError>>,
{
    try_join(a, b)
}
