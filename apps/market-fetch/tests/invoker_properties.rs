//! Retrying Invoker Integration Tests
//!
//! Exercises the public invoker API with virtual time so backoff delays are
//! asserted exactly without sleeping.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use market_fetch::{
    CancellationToken, FailureKind, RetryConfig, RetryingInvoker, retry_with_backoff,
};

fn counted_failure(
    calls: &Arc<AtomicU32>,
    kind: FailureKind,
) -> impl FnMut() -> std::future::Ready<Result<&'static str, FailureKind>> + use<> {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Err(kind))
    }
}

#[tokio::test(start_paused = true)]
async fn first_success_is_returned_immediately() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let start = Instant::now();

    let quote = retry_with_backoff(&RetryConfig::default(), || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, FailureKind>("TCS.NS 3890.45") }
    })
    .await
    .unwrap();

    assert_eq!(quote, "TCS.NS 3890.45");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn retryable_failures_are_bounded() {
    for max_retries in [0, 1, 3, 6] {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::default().with_max_retries(max_retries);

        let result =
            retry_with_backoff(&config, counted_failure(&calls, FailureKind::Network)).await;

        assert_eq!(result, Err(FailureKind::Network));
        assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn client_error_outside_set_fails_fast() {
    let calls = Arc::new(AtomicU32::new(0));
    let config = RetryConfig::default().with_max_retries(50);
    let start = Instant::now();

    let result = retry_with_backoff(&config, counted_failure(&calls, FailureKind::HttpStatus(409)))
        .await;

    assert_eq!(result, Err(FailureKind::HttpStatus(409)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn waits_grow_exponentially_up_to_cap() {
    let config = RetryConfig::default().with_max_retries(5);
    let invoker = RetryingInvoker::<FailureKind>::new(config).unwrap();
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stamps);
    let start = Instant::now();

    let _ = invoker
        .invoke(|| {
            sink.lock().unwrap().push(start.elapsed());
            async { Err::<(), _>(FailureKind::HttpStatus(503)) }
        })
        .await;

    let stamps = stamps.lock().unwrap();
    let gaps: Vec<u128> = stamps
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis())
        .collect();
    assert_eq!(gaps, vec![1000, 2000, 4000, 8000, 10_000]);
}

#[tokio::test(start_paused = true)]
async fn observer_sees_each_retry_but_not_final_failure() {
    let calls = Arc::new(AtomicU32::new(0));
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&attempts);
    let invoker = RetryingInvoker::<FailureKind>::default().on_retry(move |attempt, error| {
        sink.lock().unwrap().push((attempt, *error));
    });

    let _ = invoker
        .invoke(counted_failure(&calls, FailureKind::Timeout))
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(
        *attempts.lock().unwrap(),
        vec![
            (1, FailureKind::Timeout),
            (2, FailureKind::Timeout),
            (3, FailureKind::Timeout),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn custom_status_set_replaces_defaults() {
    let config = RetryConfig::default().with_retryable_status_codes([418]);

    let teapot = Arc::new(AtomicU32::new(0));
    let _ = retry_with_backoff(&config, counted_failure(&teapot, FailureKind::HttpStatus(418)))
        .await;
    assert_eq!(teapot.load(Ordering::SeqCst), 4);

    let server_error = Arc::new(AtomicU32::new(0));
    let _ = retry_with_backoff(
        &config,
        counted_failure(&server_error, FailureKind::HttpStatus(500)),
    )
    .await;
    assert_eq!(server_error.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn independent_invocations_do_not_share_state() {
    let invoker = Arc::new(RetryingInvoker::<FailureKind>::default());
    let fast_calls = Arc::new(AtomicU32::new(0));
    let slow_calls = Arc::new(AtomicU32::new(0));

    let failing = {
        let invoker = Arc::clone(&invoker);
        let op = counted_failure(&slow_calls, FailureKind::HttpStatus(502));
        tokio::spawn(async move { invoker.invoke(op).await })
    };
    let succeeding = {
        let invoker = Arc::clone(&invoker);
        let counter = Arc::clone(&fast_calls);
        tokio::spawn(async move {
            invoker
                .invoke(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, FailureKind>(7) }
                })
                .await
        })
    };

    assert_eq!(succeeding.await.unwrap(), Ok(7));
    assert_eq!(failing.await.unwrap(), Err(FailureKind::HttpStatus(502)));
    assert_eq!(fast_calls.load(Ordering::SeqCst), 1);
    assert_eq!(slow_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_stops_retrying() {
    let calls = Arc::new(AtomicU32::new(0));
    let invoker = RetryingInvoker::<FailureKind>::default();
    let token = CancellationToken::new();

    let task = {
        let token = token.clone();
        let op = counted_failure(&calls, FailureKind::HttpStatus(503));
        tokio::spawn(async move { invoker.invoke_until_cancelled(op, &token).await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    token.cancel();

    let outcome = task.await.unwrap();
    assert!(outcome.unwrap_err().is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // No further attempts once cancelled.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
