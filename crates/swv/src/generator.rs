use swv_core::{Client, Promise, PromiseConverter, PromisedCap};

use crate::contest;
use crate::schema::generator;

/// A contest generator, usable before the capability naming it has
/// arrived: calls on it are pipelined behind the request that returns it.
#[derive(Clone, Debug)]
pub struct ContestGeneratorWrapper {
    client: Client,
    converter: PromiseConverter,
    generator: PromisedCap,
}

impl ContestGeneratorWrapper {
    pub fn new(client: Client, converter: PromiseConverter, generator: PromisedCap) -> Self {
        Self {
            client,
            converter,
            generator,
        }
    }

    /// Fulfilled with `[contest]`.
    pub fn get_contest(&self) -> Promise {
        let next = self.client.send(self.generator.request(generator::NEXT));
        self.converter.wrap(next, contest::project_next)
    }

    /// Fulfilled with `[[contest, ...]]`, at most `count` contests.
    pub fn get_contests(&self, count: u64) -> Promise {
        tracing::debug!(count, "requesting contests");
        let next = self
            .client
            .send(self.generator.request(generator::NEXT_COUNT).arg(count));
        self.converter.wrap(next, contest::project_next_count)
    }

    pub fn generator(&self) -> &PromisedCap {
        &self.generator
    }
}
