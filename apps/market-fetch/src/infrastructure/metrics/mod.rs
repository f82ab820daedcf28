//! Prometheus Metrics Module
//!
//! Retry instrumentation recorded through the `metrics` facade. Without an
//! installed recorder every call is a no-op, so library users pay nothing
//! unless they opt in with [`init_metrics`].
//!
//! # Metrics
//!
//! - `market_fetch_attempts_total`: operation attempts, first tries included
//! - `market_fetch_retries_total{kind}`: retries scheduled, by failure kind
//! - `market_fetch_failures_total{kind, outcome}`: errors handed back to callers
//! - `market_fetch_cancellations_total`: cancelled invocations
//! - `market_fetch_backoff_seconds{kind}`: delays slept between attempts

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::retry::FailureKind;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and describe all metrics.
///
/// Later calls return the handle installed by the first one.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "market_fetch_attempts_total",
        "Operation attempts made by the retrying invoker"
    );
    describe_counter!(
        "market_fetch_retries_total",
        "Retries scheduled after a transient failure"
    );
    describe_counter!(
        "market_fetch_failures_total",
        "Failures propagated to callers by outcome"
    );
    describe_counter!(
        "market_fetch_cancellations_total",
        "Invocations interrupted by cancellation"
    );
    describe_histogram!(
        "market_fetch_backoff_seconds",
        "Delay slept before each retry"
    );
}

/// Why a failure left the invoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The classifier rejected the failure.
    NonRetryable,
    /// The retry budget ran out.
    Exhausted,
}

impl FailureOutcome {
    /// Label value for this outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NonRetryable => "non_retryable",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Record one attempt.
pub fn record_attempt() {
    counter!("market_fetch_attempts_total").increment(1);
}

/// Record a scheduled retry and its delay.
pub fn record_retry(kind: FailureKind, delay: Duration) {
    counter!("market_fetch_retries_total", "kind" => kind.as_str()).increment(1);
    histogram!("market_fetch_backoff_seconds", "kind" => kind.as_str())
        .record(delay.as_secs_f64());
}

/// Record a failure returned to the caller.
pub fn record_failure(kind: FailureKind, outcome: FailureOutcome) {
    counter!(
        "market_fetch_failures_total",
        "kind" => kind.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a cancelled invocation.
pub fn record_cancelled() {
    counter!("market_fetch_cancellations_total").increment(1);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;
    use crate::application::RetryingInvoker;

    #[test]
    fn outcome_labels() {
        assert_eq!(FailureOutcome::NonRetryable.as_str(), "non_retryable");
        assert_eq!(FailureOutcome::Exhausted.as_str(), "exhausted");
    }

    /// Run `invocation` on a paused current-thread runtime with a local
    /// Prometheus recorder and return the rendered exposition text.
    fn render_after<F, Fut>(invocation: F) -> String
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        ::metrics::with_local_recorder(&recorder, || runtime.block_on(invocation()));
        handle.render()
    }

    fn has_sample(rendered: &str, series: &str, value: &str) -> bool {
        rendered
            .lines()
            .any(|line| line.strip_prefix(series).map(str::trim) == Some(value))
    }

    #[test]
    fn recovered_invocation_counts_attempts_and_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let rendered = render_after(|| async move {
            let result = RetryingInvoker::<FailureKind>::default()
                .invoke(|| {
                    let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if call < 3 {
                            Err(FailureKind::HttpStatus(503))
                        } else {
                            Ok(call)
                        }
                    }
                })
                .await;
            assert_eq!(result, Ok(3));
        });

        assert!(has_sample(&rendered, "market_fetch_attempts_total", "3"), "{rendered}");
        assert!(
            has_sample(&rendered, r#"market_fetch_retries_total{kind="http_status"}"#, "2"),
            "{rendered}"
        );
        assert!(
            has_sample(&rendered, r#"market_fetch_backoff_seconds_count{kind="http_status"}"#, "2"),
            "{rendered}"
        );
        assert!(!rendered.contains("market_fetch_failures_total"), "{rendered}");
    }

    #[test]
    fn propagated_failures_are_labelled_by_outcome() {
        let rendered = render_after(|| async {
            let invoker = RetryingInvoker::<FailureKind>::new(
                crate::domain::retry::RetryConfig::default().with_max_retries(1),
            )
            .unwrap();
            let _ = invoker
                .invoke(|| async { Err::<(), _>(FailureKind::HttpStatus(404)) })
                .await;
            let _ = invoker
                .invoke(|| async { Err::<(), _>(FailureKind::Timeout) })
                .await;
        });

        assert!(
            has_sample(
                &rendered,
                r#"market_fetch_failures_total{kind="http_status",outcome="non_retryable"}"#,
                "1"
            ),
            "{rendered}"
        );
        assert!(
            has_sample(
                &rendered,
                r#"market_fetch_failures_total{kind="timeout",outcome="exhausted"}"#,
                "1"
            ),
            "{rendered}"
        );
        assert!(has_sample(&rendered, "market_fetch_attempts_total", "3"), "{rendered}");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_attempt();
        record_retry(FailureKind::Network, Duration::from_millis(250));
        record_failure(FailureKind::HttpStatus(404), FailureOutcome::NonRetryable);
        record_cancelled();
    }
}
