//! Rate-limited dispatcher tests
//!
//! Time is paused, so quota windows and retry delays elapse instantly but in order.
//!
//! Run with: cargo test -p integration-tests --test dispatcher_tests

use courier_http::{BucketKey, HttpError, HttpResponse, Method, RequestDispatcher, Route};
use futures::future::join_all;
use integration_tests::*;
use std::sync::Arc;
use std::time::Duration;

const MESSAGES: &str = "/channels/1/messages";
const PINS: &str = "/channels/1/pins";

// ============================================================================
// Ordering and quota
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_same_bucket_dispatches_in_submission_order() {
    let server = Arc::new(QuotaServer::new(1, Duration::from_secs(1)));
    let dispatcher = RequestDispatcher::new(Arc::clone(&server), dispatcher_config());

    let pending: Vec<_> = ["A", "B", "C"]
        .into_iter()
        .map(|tag| dispatcher.submit(tagged(Method::Post, MESSAGES, tag)))
        .collect();
    for result in join_all(pending).await {
        assert_eq!(result.unwrap().status, 200);
    }

    assert_eq!(server.tags(), ["A", "B", "C"]);
    assert_eq!(server.violations(), 0);

    let calls = server.calls();
    assert!(calls[2].at - calls[0].at >= Duration::from_secs(2) - Duration::from_millis(5));
}

#[tokio::test(start_paused = true)]
async fn test_never_dispatches_over_quota() {
    let server = Arc::new(QuotaServer::new(2, Duration::from_secs(1)));
    let dispatcher = RequestDispatcher::new(Arc::clone(&server), dispatcher_config());

    let pending: Vec<_> = (0..7)
        .map(|i| dispatcher.submit(tagged(Method::Post, MESSAGES, &i.to_string())))
        .collect();
    let results = join_all(pending).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(server.violations(), 0);

    // Seven calls at two per window span four windows
    let calls = server.calls();
    assert_eq!(calls.len(), 7);
    assert!(calls[6].at - calls[0].at >= Duration::from_secs(3) - Duration::from_millis(5));
}

#[tokio::test(start_paused = true)]
async fn test_routes_sharing_a_bucket_keep_submission_order() {
    let shared = || ok_with_quota(10, 9, Duration::from_secs(10)).with_header("x-ratelimit-bucket", "shared");
    let http = Arc::new(
        ScriptedHttp::new()
            .script("warm-messages", [shared()])
            .script("warm-pins", [shared()])
            .latency(Duration::from_millis(50)),
    );
    let dispatcher = RequestDispatcher::new(Arc::clone(&http), dispatcher_config());

    // Both routes learn that they share one server bucket
    dispatcher.submit(tagged(Method::Post, MESSAGES, "warm-messages")).await.unwrap();
    dispatcher.submit(tagged(Method::Get, PINS, "warm-pins")).await.unwrap();
    assert_eq!(
        dispatcher.bucket_snapshot(&Route::post(MESSAGES)).unwrap().key,
        dispatcher.bucket_snapshot(&Route::get(PINS)).unwrap().key
    );

    let a = dispatcher.submit(tagged(Method::Post, MESSAGES, "A"));
    let b = dispatcher.submit(tagged(Method::Post, MESSAGES, "B"));
    let c = dispatcher.submit(tagged(Method::Get, PINS, "C"));
    let (a, b, c) = tokio::join!(a, b, c);
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(http.tags()[2..], ["A", "B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_queued_requests_follow_route_to_server_bucket() {
    let http = Arc::new(
        ScriptedHttp::new()
            .script(
                "x1",
                [ok_with_quota(3, 0, Duration::from_secs(4)).with_header("x-ratelimit-bucket", "beta")],
            )
            .latency(Duration::from_millis(20)),
    );
    let dispatcher = RequestDispatcher::new(Arc::clone(&http), dispatcher_config());

    let pending: Vec<_> = ["x1", "x2", "x3"]
        .into_iter()
        .map(|tag| dispatcher.submit(tagged(Method::Get, MESSAGES, tag)))
        .collect();
    for result in join_all(pending).await {
        result.unwrap();
    }

    assert_eq!(http.tags(), ["x1", "x2", "x3"]);
    let snapshot = dispatcher.bucket_snapshot(&Route::get(MESSAGES)).unwrap();
    assert_eq!(snapshot.key, BucketKey::from_server("beta", Some("1")));

    // x2 and x3 moved to the server bucket and waited for its reset
    let x1 = http.calls_for("x1")[0].at;
    assert!(http.calls_for("x2")[0].at - x1 >= Duration::from_secs(4));
}

// ============================================================================
// 429 handling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rate_limit_respects_retry_after_without_consuming_quota() {
    let http = Arc::new(
        ScriptedHttp::new()
            .script("first", [ok_with_quota(5, 3, Duration::from_secs(10))])
            .script("second", [rate_limited(Duration::from_secs(2)), ok()]),
    );
    let dispatcher = RequestDispatcher::new(Arc::clone(&http), dispatcher_config());
    let route = Route::get(MESSAGES);

    dispatcher.submit(tagged(Method::Get, MESSAGES, "first")).await.unwrap();
    dispatcher.submit(tagged(Method::Get, MESSAGES, "second")).await.unwrap();

    let second = http.calls_for("second");
    assert_eq!(second.len(), 2);
    assert!(second[1].at - second[0].at >= Duration::from_secs(2));

    // Three left after the first call; only the successful retry took one
    let snapshot = dispatcher.bucket_snapshot(&route).unwrap();
    assert_eq!(snapshot.remaining, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_global_rate_limit_holds_every_route() {
    let http = Arc::new(
        ScriptedHttp::new().script("a", [globally_rate_limited(Duration::from_secs(3))]),
    );
    let dispatcher = RequestDispatcher::new(Arc::clone(&http), dispatcher_config());

    let a = dispatcher.submit(tagged(Method::Post, MESSAGES, "a"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    let b = dispatcher.submit(tagged(Method::Get, "/guilds/2/members", "b"));

    let (a, b) = tokio::join!(a, b);
    a.unwrap();
    b.unwrap();

    let first = http.calls_for("a")[0].at;
    assert!(http.calls_for("b")[0].at - first >= Duration::from_secs(3));
    assert_eq!(http.calls_for("a").len(), 2);
    assert_eq!(dispatcher.global_snapshot().retry_in, None);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_retries_are_bounded() {
    let http = Arc::new(ScriptedHttp::new().script(
        "spam",
        std::iter::repeat_with(|| rate_limited(Duration::from_millis(500))).take(10),
    ));
    let dispatcher = RequestDispatcher::new(Arc::clone(&http), dispatcher_config());

    let error = dispatcher
        .submit(tagged(Method::Post, MESSAGES, "spam"))
        .await
        .unwrap_err();

    assert!(matches!(error, HttpError::RateLimitExceeded { attempts: 4, .. }));
    assert_eq!(http.calls().len(), 4);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancelled_waiting_request_never_reaches_transport() {
    let http = Arc::new(
        ScriptedHttp::new().script("a", [ok_with_quota(1, 0, Duration::from_secs(5))]),
    );
    let dispatcher = RequestDispatcher::new(Arc::clone(&http), dispatcher_config());

    dispatcher.submit(tagged(Method::Post, MESSAGES, "a")).await.unwrap();

    let b = dispatcher.submit(tagged(Method::Post, MESSAGES, "b"));
    let c = dispatcher.submit(tagged(Method::Post, MESSAGES, "c"));

    // b is now waiting for the bucket reset
    tokio::time::sleep(Duration::from_secs(1)).await;
    drop(b);

    c.await.unwrap();
    assert_eq!(http.tags(), ["a", "c"]);

    let calls = http.calls();
    assert!(calls[1].at - calls[0].at >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_queued_request_is_removed() {
    let http = Arc::new(
        ScriptedHttp::new().script("a", [ok_with_quota(1, 0, Duration::from_secs(5))]),
    );
    let dispatcher = RequestDispatcher::new(Arc::clone(&http), dispatcher_config());
    let route = Route::post(MESSAGES);

    dispatcher.submit(tagged(Method::Post, MESSAGES, "a")).await.unwrap();

    let b = dispatcher.submit(tagged(Method::Post, MESSAGES, "b"));
    let c = dispatcher.submit(tagged(Method::Post, MESSAGES, "c"));
    let d = dispatcher.submit(tagged(Method::Post, MESSAGES, "d"));
    tokio::time::sleep(Duration::from_millis(10)).await;

    c.cancel();
    assert_eq!(dispatcher.queued(&route), 1);

    let (b, d) = tokio::join!(b, d);
    b.unwrap();
    d.unwrap();
    assert_eq!(http.tags(), ["a", "b", "d"]);
}

// ============================================================================
// Bucket mapping and failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_route_follows_remapped_bucket() {
    let http = Arc::new(
        ScriptedHttp::new()
            .script(
                "x1",
                [ok_with_quota(5, 4, Duration::from_secs(5)).with_header("x-ratelimit-bucket", "alpha")],
            )
            .script(
                "x2",
                [ok_with_quota(5, 0, Duration::from_secs(4)).with_header("x-ratelimit-bucket", "beta")],
            ),
    );
    let dispatcher = RequestDispatcher::new(Arc::clone(&http), dispatcher_config());
    let route = Route::get(MESSAGES);

    for tag in ["x1", "x2", "x3"] {
        dispatcher.submit(tagged(Method::Get, MESSAGES, tag)).await.unwrap();
    }

    let snapshot = dispatcher.bucket_snapshot(&route).unwrap();
    assert_eq!(snapshot.key, BucketKey::from_server("beta", Some("1")));

    // x3 waited on the new bucket, not the old one with quota left
    let x2 = http.calls_for("x2")[0].at;
    assert!(http.calls_for("x3")[0].at - x2 >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_client_error_fails_fast() {
    let http = Arc::new(ScriptedHttp::new().script("missing", [HttpResponse::new(404)]));
    let dispatcher = RequestDispatcher::new(Arc::clone(&http), dispatcher_config());

    let error = dispatcher
        .submit(tagged(Method::Get, "/channels/9", "missing"))
        .await
        .unwrap_err();

    assert!(matches!(error, HttpError::Client { status: 404, .. }));
    assert_eq!(http.calls().len(), 1);
}
