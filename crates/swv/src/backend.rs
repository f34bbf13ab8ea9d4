//! The bootstrap object of the voting backend, as seen by the UI.

use swv_core::{
    CachedHandle, CapId, Client, Datum, Promise, PromiseConverter, PromisedCap, Response, Value,
};

use crate::schema::backend;
use crate::{ContestCreationRequest, ContestGeneratorWrapper, Filter};

/// Turns backend calls into UI promises.
///
/// The feed generator and the contest creator are fetched at most once per
/// wrapper (a failed fetch is retried on next use) and shared by every
/// operation that needs them.
pub struct BackendWrapper {
    client: Client,
    converter: PromiseConverter,
    generator: CachedHandle<CapId>,
    creator: CachedHandle<CapId>,
}

impl BackendWrapper {
    pub fn new(client: Client, converter: PromiseConverter) -> Self {
        let generator = {
            let client = client.clone();
            CachedHandle::new(move || {
                tracing::debug!("fetching the contest feed generator");
                client
                    .send(client.request(backend::GET_CONTEST_GENERATOR))
                    .cap(backend::GENERATOR)
                    .fork()
                    .clone()
            })
        };
        let creator = {
            let client = client.clone();
            CachedHandle::new(move || {
                tracing::debug!("fetching the contest creator");
                client
                    .send(client.request(backend::GET_CONTEST_CREATOR))
                    .cap(backend::CREATOR)
                    .fork()
                    .clone()
            })
        };

        Self {
            client,
            converter,
            generator,
            creator,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn converter(&self) -> &PromiseConverter {
        &self.converter
    }

    /// Fulfilled with `[result]`.
    pub fn increment(&self, num: u8) -> Promise {
        let request = self
            .client
            .request(backend::INCREMENT)
            .arg(u64::from(num));
        self.converter
            .wrap(self.client.send(request), |response: Response| {
                Ok(vec![Value::Int(response.int(backend::RESULT)?)])
            })
    }

    /// The next contest of the feed, `[contest]`.
    pub fn get_contest(&self) -> Promise {
        self.get_feed_generator().get_contest()
    }

    /// Up to `count` contests of the feed, `[[contest, ...]]`.
    pub fn get_contests(&self, count: u64) -> Promise {
        self.get_feed_generator().get_contests(count)
    }

    /// The unfiltered contest feed, backed by the cached generator.
    pub fn get_feed_generator(&self) -> ContestGeneratorWrapper {
        self.generator_wrapper(PromisedCap::from_fork(self.generator.get()))
    }

    pub fn get_contests_by_creator(&self, creator: impl Into<String>) -> ContestGeneratorWrapper {
        self.search(vec![Filter::creator(creator)])
    }

    pub fn get_contests_by_coin(&self, coin_id: u64) -> ContestGeneratorWrapper {
        self.search(vec![Filter::coin(coin_id)])
    }

    /// A generator over the contests matching every filter. Each search
    /// issues its own `searchContests` call.
    pub fn search(&self, filters: Vec<Filter>) -> ContestGeneratorWrapper {
        tracing::debug!(filters = filters.len(), "searching contests");
        let filters: Vec<Datum> = filters.iter().map(Filter::to_datum).collect();
        let search = self
            .client
            .send(self.client.request(backend::SEARCH_CONTESTS).arg(filters));
        self.generator_wrapper(search.cap(backend::GENERATOR))
    }

    /// A new contest draft. Price schedule and limits are requested right
    /// away from the cached contest creator.
    pub fn get_contest_creation_request(&self) -> ContestCreationRequest {
        ContestCreationRequest::new(
            self.client.clone(),
            self.converter.clone(),
            PromisedCap::from_fork(self.creator.get()),
        )
    }

    fn generator_wrapper(&self, generator: PromisedCap) -> ContestGeneratorWrapper {
        ContestGeneratorWrapper::new(self.client.clone(), self.converter.clone(), generator)
    }
}

impl std::fmt::Debug for BackendWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendWrapper")
            .field("generator", &self.generator)
            .field("creator", &self.creator)
            .finish_non_exhaustive()
    }
}
