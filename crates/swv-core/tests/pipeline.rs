//! End-to-end pipelining over an in-process session.

use std::sync::Arc;

use parking_lot::Mutex;
use swv_core::{
    CallFrame, CapId, Client, Datum, DispatchFuture, ErrorCode, ErrorKind, ProjectionError,
    PromiseConverter, RemoteError, RequestChain, RpcError, RpcSession, SendState, SentRequest,
    Struct, Transport, TransportError, Value, join,
};
use tokio::task::LocalSet;

const COUNTER: CapId = CapId(1);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

type CallLog = Arc<Mutex<Vec<String>>>;

/// Serves a tiny object graph:
///
/// - bootstrap `open` returns `{counter: cap#1}`
/// - `cap#1.value` returns `{value: 10}`
/// - `double(x)` on any object returns `{value: 2x}`
/// - `fail` on any object returns a remote error
fn serve(transport: Transport, log: CallLog) -> Arc<RpcSession> {
    let session = Arc::new(RpcSession::new_acceptor(transport));
    session.set_dispatcher(move |call: CallFrame| -> DispatchFuture {
        log.lock().push(call.method.clone());
        Box::pin(async move {
            match (call.target, call.method.as_str(), call.args.as_slice()) {
                (CapId::BOOTSTRAP, "open", []) => Ok(Struct::new().with("counter", COUNTER)),
                (COUNTER, "value", []) => Ok(Struct::new().with("value", 10u64)),
                (_, "double", [Datum::UInt(x)]) => Ok(Struct::new().with("value", x * 2)),
                (target, method, _) => Err(RemoteError::new(
                    ErrorCode::NotFound,
                    format!("{} has no `{}`", target, method),
                )),
            }
        })
    });
    tokio::spawn(session.clone().run());
    session
}

fn connect() -> (Client, CallLog) {
    init_tracing();
    let (client_transport, server_transport) = Transport::inproc_pair();
    let log = CallLog::default();
    serve(server_transport, log.clone());

    let session = Arc::new(RpcSession::new(client_transport));
    tokio::spawn(session.clone().run());
    (Client::new(session), log)
}

#[tokio::test]
async fn chain_sends_each_step_once() {
    LocalSet::new()
        .run_until(async {
            let (client, log) = connect();
            let chain = RequestChain::new(client.clone(), client.request("open"))
                .then(|open| Ok(open.cap("counter").request("value")))
                .then({
                    let client = client.clone();
                    move |value: &SentRequest| {
                        Ok(client.request("double").pipelined_arg(value.field("value")))
                    }
                });
            assert_eq!(chain.steps(), 3);

            let last = chain.issue();
            assert_eq!(last.state(), SendState::Sent);
            let response = last.clone().await.expect("chain failed");

            assert_eq!(response.uint("value"), Ok(20));
            assert_eq!(last.state(), SendState::Resolved);
            assert_eq!(*log.lock(), ["open", "value", "double"]);
        })
        .await;
}

#[tokio::test]
async fn failing_step_stops_the_chain() {
    LocalSet::new()
        .run_until(async {
            let (client, log) = connect();
            let last = RequestChain::new(client.clone(), client.request("fail"))
                .then(|failed| Ok(failed.cap("counter").request("value")))
                .then(|value| Ok(value.cap("nothing").request("value")))
                .issue();

            let err = last.await.unwrap_err();
            assert_eq!(
                err,
                RpcError::Remote(RemoteError::new(
                    ErrorCode::NotFound,
                    "cap#0 has no `fail`"
                ))
            );
            assert_eq!(*log.lock(), ["fail"]);
        })
        .await;
}

#[tokio::test]
async fn failing_middle_step_stops_later_steps() {
    LocalSet::new()
        .run_until(async {
            let (client, log) = connect();
            let last = RequestChain::new(client.clone(), client.request("open"))
                .then(|open| Ok(open.cap("counter").request("fail")))
                .then({
                    let client = client.clone();
                    // Does not use the failed step's results.
                    move |_: &SentRequest| Ok(client.request("double").arg(1u64))
                })
                .issue();

            assert_eq!(
                last.await.unwrap_err(),
                RpcError::Remote(RemoteError::new(
                    ErrorCode::NotFound,
                    "cap#1 has no `fail`"
                ))
            );
            assert_eq!(*log.lock(), ["open", "fail"]);
        })
        .await;
}

#[tokio::test]
async fn closed_transport_rejects_without_sending() {
    LocalSet::new()
        .run_until(async {
            let (client, log) = connect();
            client.session().close();

            let last = RequestChain::new(client.clone(), client.request("open"))
                .then(|open| Ok(open.cap("counter").request("value")))
                .issue();

            assert_eq!(
                last.await.unwrap_err(),
                RpcError::Transport(TransportError::Closed)
            );
            assert!(log.lock().is_empty());
        })
        .await;
}

#[tokio::test]
async fn step_construction_error_short_circuits() {
    LocalSet::new()
        .run_until(async {
            let (client, _log) = connect();
            let built_third = std::rc::Rc::new(std::cell::Cell::new(false));
            let flag = built_third.clone();

            let last = RequestChain::new(client.clone(), client.request("open"))
                .then(|_| Err(RpcError::invalid_request("no counter for you")))
                .then(move |open| {
                    flag.set(true);
                    Ok(open.cap("counter").request("value"))
                })
                .issue();

            assert_eq!(last.id(), 0);
            assert_eq!(
                last.await.unwrap_err(),
                RpcError::InvalidRequest("no counter for you".into())
            );
            assert!(!built_third.get());
        })
        .await;
}

#[tokio::test]
async fn non_capability_field_is_an_invalid_request() {
    LocalSet::new()
        .run_until(async {
            let (client, log) = connect();
            let open = client.send(client.request("open"));
            let bogus = client.send(
                client
                    .send(open.cap("counter").request("value"))
                    .cap("value")
                    .request("value"),
            );

            let err = bogus.await.unwrap_err();
            assert!(matches!(err, RpcError::InvalidRequest(_)), "{:?}", err);
            assert_eq!(*log.lock(), ["open", "value"]);
        })
        .await;
}

#[tokio::test]
async fn forked_response_feeds_many_consumers() {
    LocalSet::new()
        .run_until(async {
            let (client, log) = connect();
            let open = client.send(client.request("open"));
            let counter = open.cap("counter");

            let a = client.send(counter.request("value"));
            let b = client.send(counter.request("double").arg(4u64));
            let (a, b) = join(a.response(), b.response()).await.unwrap();

            assert_eq!(a.uint("value"), Ok(10));
            assert_eq!(b.uint("value"), Ok(8));
            assert_eq!(log.lock().iter().filter(|m| *m == "open").count(), 1);
        })
        .await;
}

#[tokio::test]
async fn chain_result_reaches_a_promise() {
    LocalSet::new()
        .run_until(async {
            let (client, _log) = connect();
            let converter = PromiseConverter::new();

            let chain = RequestChain::new(client.clone(), client.request("open"))
                .then(|open| Ok(open.cap("counter").request("value")))
                .issue();
            let promise = converter.wrap(chain, |response: Struct| {
                Ok(vec![Value::from_u64(response.uint("value")?)?])
            });
            assert_eq!(promise.settled().await, Ok(vec![Value::Int(10)]));

            let failing = client.send(client.request("fail"));
            let promise =
                converter.wrap(failing, |_: Struct| Err(ProjectionError::malformed("unused")));
            let err = promise.settled().await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Remote);
            assert_eq!(converter.pending(), 0);
        })
        .await;
}
