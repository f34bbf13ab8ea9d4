use swv_core::{CapId, Datum, ErrorCode, RemoteError, RpcError, Struct};
use swv_testkit::{MockBackend, init_tracing};
use tokio::task::LocalSet;

#[tokio::test]
async fn serves_the_generator_interface() {
    init_tracing();
    LocalSet::new()
        .run_until(async {
            let backend = MockBackend::new();
            let client = backend.connect();
            let session = client.session();

            let response = session
                .call(CapId::BOOTSTRAP, "getContestGenerator", Vec::new())
                .await
                .unwrap();
            let generator = response.cap("generator").unwrap();

            let first = session.call(generator, "next", Vec::new()).await.unwrap();
            assert_eq!(
                first.record("nextContest").unwrap().uint("votingStake"),
                Ok(1000)
            );

            let rest = session
                .call(generator, "nextCount", vec![Datum::UInt(10)])
                .await
                .unwrap();
            assert_eq!(rest.list("nextContests").unwrap().len(), 2);

            let err = session.call(generator, "next", Vec::new()).await.unwrap_err();
            assert_eq!(
                err,
                RpcError::Remote(RemoteError::new(ErrorCode::NotFound, "no more contests"))
            );
            assert_eq!(backend.calls().len(), 4);
        })
        .await;
}

#[tokio::test]
async fn search_applies_filters() {
    init_tracing();
    LocalSet::new()
        .run_until(async {
            let backend = MockBackend::new();
            let client = backend.connect();
            let session = client.session();

            let filter = Struct::new()
                .with("type", "CONTEST_CREATOR")
                .with("arguments", vec!["alice"]);
            let response = session
                .call(
                    CapId::BOOTSTRAP,
                    "searchContests",
                    vec![Datum::List(vec![filter.into()])],
                )
                .await
                .unwrap();
            let generator = response.cap("generator").unwrap();

            let contests = session
                .call(generator, "nextCount", vec![Datum::UInt(10)])
                .await
                .unwrap();
            let ids: Vec<_> = contests
                .records("nextContests")
                .unwrap()
                .into_iter()
                .map(|c| c.data("contestId").unwrap())
                .collect();
            assert_eq!(ids, [&[0xde, 0xad, 0x00, 0x01][..], &[0xde, 0xad, 0x00, 0x03][..]]);
        })
        .await;
}

#[tokio::test]
async fn scripted_failures_apply_until_cleared() {
    init_tracing();
    LocalSet::new()
        .run_until(async {
            let backend = MockBackend::new();
            let client = backend.connect();
            backend.fail(
                "increment",
                RemoteError::new(ErrorCode::ResourceExhausted, "try later"),
            );

            let session = client.session();
            let args = vec![Datum::UInt(1)];
            assert!(
                session
                    .call(CapId::BOOTSTRAP, "increment", args.clone())
                    .await
                    .is_err()
            );

            backend.clear_failures();
            let response = session
                .call(CapId::BOOTSTRAP, "increment", args)
                .await
                .unwrap();
            assert_eq!(response.int("result"), Ok(2));
            assert_eq!(backend.count("increment"), 2);
        })
        .await;
}

#[tokio::test]
async fn purchases_stop_when_contest_ids_run_out() {
    init_tracing();
    LocalSet::new()
        .run_until(async {
            let backend = MockBackend::new();
            let client = backend.connect();
            let session = client.session();

            let creator = session
                .call(CapId::BOOTSTRAP, "getContestCreator", Vec::new())
                .await
                .unwrap()
                .cap("creator")
                .unwrap();
            let contest = || vec![Datum::from(Struct::new().with("name", "poll"))];

            let mut last = None;
            for _ in 0..255 {
                last = Some(
                    session
                        .call(creator, "purchaseContest", contest())
                        .await
                        .unwrap(),
                );
            }
            let id = last.unwrap().data("contestId").unwrap();
            assert_eq!(&id[..], &[0xc0, 0xff][..]);

            let err = session
                .call(creator, "purchaseContest", contest())
                .await
                .unwrap_err();
            assert_eq!(
                err,
                RpcError::Remote(RemoteError::new(
                    ErrorCode::InvalidArgument,
                    "contest ids exhausted"
                ))
            );
            assert_eq!(backend.purchased().len(), 255);
        })
        .await;
}
