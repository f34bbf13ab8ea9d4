//! In-process test backend for swv.
//!
//! [`MockBackend`] serves the voting interface over an acceptor
//! [`RpcSession`] and records every call it receives, so tests can assert
//! how many sends an operation cost:
//!
//! ```ignore
//! let backend = MockBackend::new();
//! let client = backend.connect();
//! // ... drive the client inside a LocalSet ...
//! assert_eq!(backend.count("getContestGenerator"), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use swv_core::{
    CallFrame, CapId, Client, Datum, DispatchFuture, ErrorCode, RemoteError, Response, RpcSession,
    Struct, Transport,
};

/// Install a `RUST_LOG`-driven subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One call received by the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct CallRecord {
    pub target: CapId,
    pub method: String,
    pub args: Vec<Datum>,
}

/// A contest the backend knows about, with the attributes searches match on.
#[derive(Clone, Debug)]
pub struct ContestFixture {
    pub id: Bytes,
    pub voting_stake: u64,
    pub tracks_live_results: bool,
    pub creator: String,
    pub coin: u64,
}

impl ContestFixture {
    /// The `ListedContest` struct a generator returns.
    pub fn listed(&self) -> Struct {
        Struct::new()
            .with("contestId", self.id.clone())
            .with("votingStake", self.voting_stake)
            .with("tracksLiveResults", self.tracks_live_results)
    }

    fn matches(&self, filter: &SearchFilter) -> bool {
        match filter.filter_type.as_str() {
            "CONTEST_CREATOR" => filter.arguments.iter().any(|a| *a == self.creator),
            "CONTEST_COIN" => filter.arguments.iter().any(|a| *a == self.coin.to_string()),
            _ => false,
        }
    }
}

/// Three contests: two by `alice`, two weighted by coin 42.
pub fn voting_fixtures() -> Vec<ContestFixture> {
    vec![
        ContestFixture {
            id: Bytes::from_static(&[0xde, 0xad, 0x00, 0x01]),
            voting_stake: 1000,
            tracks_live_results: true,
            creator: "alice".into(),
            coin: 0,
        },
        ContestFixture {
            id: Bytes::from_static(&[0xde, 0xad, 0x00, 0x02]),
            voting_stake: 250,
            tracks_live_results: false,
            creator: "bob".into(),
            coin: 42,
        },
        ContestFixture {
            id: Bytes::from_static(&[0xde, 0xad, 0x00, 0x03]),
            voting_stake: 7,
            tracks_live_results: true,
            creator: "alice".into(),
            coin: 42,
        },
    ]
}

#[derive(Clone, Debug)]
struct SearchFilter {
    filter_type: String,
    arguments: Vec<String>,
}

#[derive(Debug)]
enum Object {
    Backend,
    Generator {
        filters: Vec<SearchFilter>,
        cursor: usize,
    },
    Creator,
}

#[derive(Clone, Copy, Debug)]
enum Role {
    Backend,
    Generator,
    Creator,
}

impl Object {
    fn role(&self) -> Role {
        match self {
            Object::Backend => Role::Backend,
            Object::Generator { .. } => Role::Generator,
            Object::Creator => Role::Creator,
        }
    }
}

#[derive(Debug)]
struct State {
    contests: Vec<ContestFixture>,
    objects: HashMap<CapId, Object>,
    next_cap: u32,
    purchased: Vec<Struct>,
    failures: HashMap<String, RemoteError>,
    calls: Vec<CallRecord>,
}

/// Scripted voting backend. Cheap to clone; clones share state.
#[derive(Clone, Debug)]
pub struct MockBackend {
    state: Arc<Mutex<State>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A backend serving [`voting_fixtures`].
    pub fn new() -> Self {
        Self::with_contests(voting_fixtures())
    }

    pub fn with_contests(contests: Vec<ContestFixture>) -> Self {
        let mut objects = HashMap::new();
        objects.insert(CapId::BOOTSTRAP, Object::Backend);
        Self {
            state: Arc::new(Mutex::new(State {
                contests,
                objects,
                next_cap: 1,
                purchased: Vec::new(),
                failures: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Answer every later `method` call with `error`.
    pub fn fail(&self, method: &str, error: RemoteError) {
        self.state.lock().failures.insert(method.to_owned(), error);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().calls.clone()
    }

    /// How many `method` calls were received.
    pub fn count(&self, method: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Contest descriptions received by `purchaseContest`.
    pub fn purchased(&self) -> Vec<Struct> {
        self.state.lock().purchased.clone()
    }

    /// Serve this backend on `transport`. Spawns the session's receive loop.
    pub fn serve(&self, transport: Transport) -> Arc<RpcSession> {
        let session = Arc::new(RpcSession::new_acceptor(transport));
        let backend = self.clone();
        session.set_dispatcher(move |call: CallFrame| -> DispatchFuture {
            let result = backend.handle(call);
            Box::pin(async move { result })
        });
        tokio::spawn(session.clone().run());
        session
    }

    /// Connect a new client to this backend over an in-process transport.
    pub fn connect(&self) -> Client {
        let (client_transport, server_transport) = Transport::inproc_pair();
        self.serve(server_transport);

        let session = Arc::new(RpcSession::new(client_transport));
        tokio::spawn(session.clone().run());
        Client::new(session)
    }

    fn handle(&self, call: CallFrame) -> Result<Response, RemoteError> {
        let mut state = self.state.lock();
        state.calls.push(CallRecord {
            target: call.target,
            method: call.method.clone(),
            args: call.args.clone(),
        });
        tracing::debug!(cap = %call.target, method = %call.method, "mock backend call");

        if let Some(error) = state.failures.get(&call.method) {
            return Err(error.clone());
        }
        state.handle(call)
    }
}

impl State {
    fn handle(&mut self, call: CallFrame) -> Result<Response, RemoteError> {
        let role = self
            .objects
            .get(&call.target)
            .map(Object::role)
            .ok_or_else(|| {
                RemoteError::new(ErrorCode::NotFound, format!("no object {}", call.target))
            })?;

        match (role, call.method.as_str()) {
            (Role::Backend, "increment") => {
                let num = uint_arg(&call, 0)?;
                let result = i64::try_from(num)
                    .ok()
                    .and_then(|n| n.checked_add(1))
                    .ok_or_else(|| invalid("increment overflows"))?;
                Ok(Struct::new().with("result", result))
            }
            (Role::Backend, "getContestGenerator") => {
                let generator = self.export(Object::Generator {
                    filters: Vec::new(),
                    cursor: 0,
                });
                Ok(Struct::new().with("generator", generator))
            }
            (Role::Backend, "searchContests") => {
                let filters = search_filters(&call)?;
                let generator = self.export(Object::Generator { filters, cursor: 0 });
                Ok(Struct::new().with("generator", generator))
            }
            (Role::Backend, "getContestCreator") => {
                let creator = self.export(Object::Creator);
                Ok(Struct::new().with("creator", creator))
            }
            (Role::Generator, "next") => {
                let mut contests = self.advance(call.target, 1);
                match contests.pop() {
                    Some(contest) => Ok(Struct::new().with("nextContest", contest)),
                    None => Err(RemoteError::new(ErrorCode::NotFound, "no more contests")),
                }
            }
            (Role::Generator, "nextCount") => {
                let count = usize::try_from(uint_arg(&call, 0)?)
                    .map_err(|_| invalid("count too large"))?;
                let contests = self.advance(call.target, count);
                Ok(Struct::new().with("nextContests", contests))
            }
            (Role::Creator, "getPriceSchedule") => Ok(Struct::new().with(
                "prices",
                Struct::new()
                    .with("contestBase", 100u64)
                    .with("perContestant", 10u64),
            )),
            (Role::Creator, "getContestLimits") => Ok(Struct::new().with(
                "limits",
                Struct::new()
                    .with("nameLength", 100u64)
                    .with("maxContestants", 32u64),
            )),
            (Role::Creator, "purchaseContest") => {
                let contest = match call.args.first() {
                    Some(Datum::Struct(s)) => s.clone(),
                    _ => return Err(invalid("purchaseContest takes a contest struct")),
                };
                let serial = u8::try_from(self.purchased.len() + 1)
                    .map_err(|_| invalid("contest ids exhausted"))?;
                self.purchased.push(contest);
                let id = Bytes::from(vec![0xc0, serial]);
                Ok(Struct::new().with("contestId", id))
            }
            (_, method) => Err(RemoteError::new(
                ErrorCode::Unimplemented,
                format!("{} does not implement `{}`", call.target, method),
            )),
        }
    }

    fn export(&mut self, object: Object) -> CapId {
        let id = CapId(self.next_cap);
        self.next_cap += 1;
        self.objects.insert(id, object);
        id
    }

    /// Up to `count` contests the generator `id` has not returned yet.
    fn advance(&mut self, id: CapId, count: usize) -> Vec<Struct> {
        let Some(Object::Generator { filters, cursor }) = self.objects.get_mut(&id) else {
            return Vec::new();
        };
        let matching: Vec<Struct> = self
            .contests
            .iter()
            .filter(|c| filters.iter().all(|f| c.matches(f)))
            .skip(*cursor)
            .take(count)
            .map(ContestFixture::listed)
            .collect();
        *cursor += matching.len();
        matching
    }
}

fn invalid(message: &str) -> RemoteError {
    RemoteError::new(ErrorCode::InvalidArgument, message)
}

fn uint_arg(call: &CallFrame, index: usize) -> Result<u64, RemoteError> {
    match call.args.get(index) {
        Some(Datum::UInt(n)) => Ok(*n),
        _ => Err(invalid(&format!(
            "`{}` argument {} must be an unsigned integer",
            call.method, index
        ))),
    }
}

fn search_filters(call: &CallFrame) -> Result<Vec<SearchFilter>, RemoteError> {
    let Some(Datum::List(items)) = call.args.first() else {
        return Err(invalid("searchContests takes a list of filters"));
    };
    items
        .iter()
        .map(|item| {
            let Datum::Struct(filter) = item else {
                return Err(invalid("a filter must be a struct"));
            };
            let filter_type = filter
                .text("type")
                .map_err(|e| invalid(&e.to_string()))?
                .to_owned();
            let arguments = filter
                .list("arguments")
                .map_err(|e| invalid(&e.to_string()))?
                .iter()
                .map(|a| match a {
                    Datum::Text(t) => Ok(t.clone()),
                    _ => Err(invalid("filter arguments must be text")),
                })
                .collect::<Result<_, _>>()?;
            Ok(SearchFilter {
                filter_type,
                arguments,
            })
        })
        .collect()
}
