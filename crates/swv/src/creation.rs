//! Drafting and purchasing a new contest.

use swv_core::{
    Client, Datum, ErrorKind, ForkedFuture, Promise, PromiseConverter, PromiseError, PromisedCap,
    Response, Struct, Value, join,
};

use crate::schema::{self, contest};

/// Fewest contestants a contest can be purchased with.
pub const MIN_CONTESTANTS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contestant {
    pub name: String,
    pub description: String,
}

/// A contest being drafted against the backend's contest creator.
///
/// Creating the draft fires `getPriceSchedule` and `getContestLimits` in
/// parallel. Their joined result is forked, so reading it any number of
/// times never re-issues the calls. Purchasing does not wait for it.
pub struct ContestCreationRequest {
    client: Client,
    converter: PromiseConverter,
    creator: PromisedCap,
    prices_and_limits: ForkedFuture<(Response, Response)>,
    name: String,
    description: String,
    contestants: Vec<Contestant>,
    expiration: Option<u64>,
}

impl ContestCreationRequest {
    pub fn new(client: Client, converter: PromiseConverter, creator: PromisedCap) -> Self {
        let prices = client.send(creator.request(schema::creator::GET_PRICE_SCHEDULE));
        let limits = client.send(creator.request(schema::creator::GET_CONTEST_LIMITS));
        let prices_and_limits =
            ForkedFuture::new(async move { join(prices.response(), limits.response()).await });

        Self {
            client,
            converter,
            creator,
            prices_and_limits,
            name: String::new(),
            description: String::new(),
            contestants: Vec::new(),
            expiration: None,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn add_contestant(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.contestants.push(Contestant {
            name: name.into(),
            description: description.into(),
        });
    }

    /// Expiration as milliseconds since the Unix epoch.
    pub fn set_expiration(&mut self, ms: u64) {
        self.expiration = Some(ms);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn contestants(&self) -> &[Contestant] {
        &self.contestants
    }

    pub fn expiration(&self) -> Option<u64> {
        self.expiration
    }

    /// Fulfilled with `[prices, limits]`, both records.
    pub fn prices_and_limits(&self) -> Promise {
        self.converter.wrap(
            self.prices_and_limits.add_branch(),
            |(prices, limits): (Response, Response)| {
                Ok(vec![
                    Value::try_from(prices.record(schema::creator::PRICES)?)?,
                    Value::try_from(limits.record(schema::creator::LIMITS)?)?,
                ])
            },
        )
    }

    /// Purchase the contest. Fulfilled with `[contestId]` as a hex string.
    ///
    /// An incomplete draft is rejected without contacting the backend.
    pub fn submit(&self) -> Promise {
        if let Err(e) = self.validate() {
            tracing::debug!(error = %e, "contest draft rejected");
            return Promise::rejected(e);
        }

        let purchase = self.client.send(
            self.creator
                .request(schema::creator::PURCHASE_CONTEST)
                .arg(self.to_struct()),
        );
        self.converter.wrap(purchase, |response: Response| {
            Ok(vec![Value::hex(response.data(schema::creator::CONTEST_ID)?)])
        })
    }

    fn validate(&self) -> Result<(), PromiseError> {
        if self.name.trim().is_empty() {
            return Err(PromiseError::new(
                ErrorKind::InvalidRequest,
                "contest name is empty",
            ));
        }
        if self.contestants.len() < MIN_CONTESTANTS {
            return Err(PromiseError::new(
                ErrorKind::InvalidRequest,
                format!(
                    "a contest needs at least {} contestants, got {}",
                    MIN_CONTESTANTS,
                    self.contestants.len()
                ),
            ));
        }
        Ok(())
    }

    fn to_struct(&self) -> Struct {
        let contestants: Vec<Datum> = self
            .contestants
            .iter()
            .map(|c| {
                Datum::from(
                    Struct::new()
                        .with(contest::NAME, c.name.as_str())
                        .with(contest::DESCRIPTION, c.description.as_str()),
                )
            })
            .collect();

        let mut s = Struct::new()
            .with(contest::NAME, self.name.as_str())
            .with(contest::DESCRIPTION, self.description.as_str())
            .with(contest::CONTESTANTS, contestants);
        if let Some(ms) = self.expiration {
            s.set(contest::EXPIRATION, ms);
        }
        s
    }
}

impl std::fmt::Debug for ContestCreationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContestCreationRequest")
            .field("name", &self.name)
            .field("contestants", &self.contestants.len())
            .field("prices_and_limits", &self.prices_and_limits)
            .finish_non_exhaustive()
    }
}
