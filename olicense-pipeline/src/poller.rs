//! The background poller that drives fetch → parse → build → publish.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use olicense_status::{parse_status, StatusError};
use olicense_types::{NormalizedStatus, Snapshot};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};

use crate::builder;
use crate::source::{RawStatus, StatusSource};
use crate::store::SnapshotStore;

/// Where the poller is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollPhase {
    Idle,
    Fetching,
    Parsing,
    Building,
    Publishing,
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PollPhase::Idle => "idle",
            PollPhase::Fetching => "fetching",
            PollPhase::Parsing => "parsing",
            PollPhase::Building => "building",
            PollPhase::Publishing => "publishing",
        })
    }
}

/// Poller settings that can never work.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollerConfigError {
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    #[error("fetch timeout must be greater than zero")]
    ZeroTimeout,
}

/// Runs scrape cycles on a fixed schedule and publishes each result.
///
/// Cycles never overlap. The interval is measured from the start of one
/// cycle to the start of the next; a cycle that overruns is followed
/// immediately by the next one. A failed cycle is never retried early.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use olicense_pipeline::{Poller, SnapshotStore, StatusSource};
///
/// # async fn example(source: Arc<dyn StatusSource>) {
/// let store = Arc::new(SnapshotStore::new());
/// let poller = Poller::builder(source, store.clone())
///     .interval(Duration::from_secs(15))
///     .build()
///     .unwrap();
///
/// let handle = poller.start();
/// // ... serve `store` over HTTP ...
/// handle.shutdown(Duration::from_secs(5)).await;
/// # }
/// ```
#[derive(Debug)]
pub struct Poller {
    source: Arc<dyn StatusSource>,
    store: Arc<SnapshotStore>,
    interval: Duration,
    fetch_timeout: Duration,
    phase: PollPhase,
    sequence: u64,
}

impl Poller {
    /// Create a builder for a poller reading from `source` and publishing
    /// into `store`.
    pub fn builder(source: Arc<dyn StatusSource>, store: Arc<SnapshotStore>) -> PollerBuilder {
        PollerBuilder::new(source, store)
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Run one complete cycle and publish its snapshot.
    ///
    /// Never fails: any error is logged and turned into a failure snapshot
    /// that keeps the last good status.
    pub async fn run_cycle(&mut self) -> Arc<Snapshot> {
        let started = Instant::now();
        self.sequence += 1;
        let previous = self.store.current();

        let outcome = self
            .scrape(previous.as_deref().and_then(Snapshot::status))
            .await;
        let duration = started.elapsed().as_secs_f64();

        self.enter(PollPhase::Building);
        let snapshot = match outcome {
            Ok(status) => builder::build(status, duration, self.sequence),
            Err(err) => {
                tracing::warn!(
                    source = self.source.description(),
                    kind = err.kind(),
                    error = %err,
                    duration_seconds = duration,
                    "scrape failed, keeping last good data"
                );
                builder::build_failure(previous.as_deref(), duration, self.sequence)
            }
        };

        self.enter(PollPhase::Publishing);
        let published = self.store.replace(snapshot);
        self.enter(PollPhase::Idle);

        tracing::debug!(
            sequence = published.sequence,
            success = published.succeeded(),
            duration_seconds = duration,
            "published snapshot"
        );
        published
    }

    async fn scrape(
        &mut self,
        previous: Option<&NormalizedStatus>,
    ) -> Result<NormalizedStatus, StatusError> {
        self.enter(PollPhase::Fetching);
        let raw = self.fetch().await?;
        tracing::debug!(bytes = raw.text.len(), "fetched status output");

        self.enter(PollPhase::Parsing);
        let parsed = catch_unwind(AssertUnwindSafe(|| parse_status(&raw.text, previous)))
            .map_err(|panic| StatusError::Internal(panic_message(panic.as_ref())))??;

        for warning in &parsed.warnings {
            tracing::warn!(format = %parsed.format, %warning, "status parse warning");
        }
        Ok(parsed.status)
    }

    /// Fetch on a separate task, bounded by the fetch timeout. The task is
    /// aborted if it times out or if this future is dropped.
    async fn fetch(&self) -> Result<RawStatus, StatusError> {
        let source = self.source.clone();
        let task = AbortOnDrop(tokio::spawn(async move { source.fetch().await }));

        match tokio::time::timeout(self.fetch_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(join_failure(join_error)),
            Err(_) => Err(StatusError::SourceUnavailable(format!(
                "{} did not respond within {:?}",
                self.source.description(),
                self.fetch_timeout
            ))),
        }
    }

    fn enter(&mut self, phase: PollPhase) {
        tracing::trace!(sequence = self.sequence, from = %self.phase, to = %phase, "poll phase");
        self.phase = phase;
    }

    /// Loop forever, running a cycle on every tick until `stop` turns true
    /// or its sender is dropped. A cycle in progress when stop arrives is
    /// abandoned and publishes nothing.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        tracing::info!(
            source = self.source.description(),
            interval_seconds = self.interval.as_secs_f64(),
            "starting status poller"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.run_cycle() => {}
                        _ = async { stop.wait_for(|stopped| *stopped).await.map(|_| ()) } => {
                            tracing::info!(sequence = self.sequence, "abandoning in-flight scrape");
                            break;
                        }
                    }
                }
                _ = async { stop.wait_for(|stopped| *stopped).await.map(|_| ()) } => break,
            }
        }

        self.phase = PollPhase::Idle;
        tracing::info!("status poller stopped");
    }

    /// Spawn the poll loop on the tokio runtime.
    pub fn start(self) -> PollerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        PollerHandle { stop_tx, task }
    }
}

/// Builder for configuring a [`Poller`].
#[derive(Debug)]
pub struct PollerBuilder {
    source: Arc<dyn StatusSource>,
    store: Arc<SnapshotStore>,
    interval: Option<Duration>,
    fetch_timeout: Option<Duration>,
}

impl PollerBuilder {
    pub fn new(source: Arc<dyn StatusSource>, store: Arc<SnapshotStore>) -> Self {
        Self {
            source,
            store,
            interval: None,
            fetch_timeout: None,
        }
    }

    /// Set the poll interval. Defaults to 15 seconds.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the upper bound on a single fetch. Defaults to 30 seconds.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Build the poller.
    pub fn build(self) -> Result<Poller, PollerConfigError> {
        let interval = self.interval.unwrap_or(Duration::from_secs(15));
        let fetch_timeout = self.fetch_timeout.unwrap_or(Duration::from_secs(30));
        if interval.is_zero() {
            return Err(PollerConfigError::ZeroInterval);
        }
        if fetch_timeout.is_zero() {
            return Err(PollerConfigError::ZeroTimeout);
        }

        Ok(Poller {
            source: self.source,
            store: self.store,
            interval,
            fetch_timeout,
            phase: PollPhase::Idle,
            sequence: 0,
        })
    }
}

/// Handle for controlling a running poller.
///
/// Dropping the handle also stops the poller.
#[derive(Debug)]
pub struct PollerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal the poller to stop. Returns immediately.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop the poller and wait up to `grace` for it to exit. The task is
    /// aborted if it does not. Returns `true` on a clean exit.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.stop();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(result) => result.is_ok(),
            Err(_) => {
                tracing::warn!(grace_seconds = grace.as_secs_f64(), "poller did not stop in time, aborting");
                self.task.abort();
                false
            }
        }
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn join_failure(err: JoinError) -> StatusError {
    if err.is_panic() {
        StatusError::Internal(panic_message(err.into_panic().as_ref()))
    } else {
        StatusError::Internal("status fetch was cancelled".to_string())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays scripted fetch results, then keeps failing.
    #[derive(Debug, Default)]
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<String, String>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch(&self) -> Result<RawStatus, StatusError> {
            *self.calls.lock() += 1;
            match self.script.lock().pop_front() {
                Some(Ok(text)) => Ok(RawStatus::new(text)),
                Some(Err(msg)) => Err(StatusError::SourceUnavailable(msg)),
                None => Err(StatusError::SourceUnavailable("script exhausted".into())),
            }
        }

        fn description(&self) -> &str {
            "scripted"
        }
    }

    #[derive(Debug)]
    struct HangingSource;

    #[async_trait]
    impl StatusSource for HangingSource {
        async fn fetch(&self) -> Result<RawStatus, StatusError> {
            std::future::pending::<()>().await;
            unreachable!()
        }

        fn description(&self) -> &str {
            "hanging"
        }
    }

    #[derive(Debug)]
    struct PanickingSource;

    #[async_trait]
    impl StatusSource for PanickingSource {
        async fn fetch(&self) -> Result<RawStatus, StatusError> {
            panic!("reader blew up")
        }

        fn description(&self) -> &str {
            "panicking"
        }
    }

    const GOOD: &str = r#"{"total":100,"inUse":40,"denials":2,"features":[{"name":"cad","total":10,"inUse":3,"denials":0}]}"#;

    fn poller(source: Arc<dyn StatusSource>, store: Arc<SnapshotStore>) -> Poller {
        Poller::builder(source, store)
            .interval(Duration::from_secs(1))
            .fetch_timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_rejects_zero_durations() {
        let source = ScriptedSource::new(vec![]);
        let store = Arc::new(SnapshotStore::new());
        assert_eq!(
            Poller::builder(source.clone(), store.clone())
                .interval(Duration::ZERO)
                .build()
                .unwrap_err(),
            PollerConfigError::ZeroInterval
        );
        assert_eq!(
            Poller::builder(source, store)
                .fetch_timeout(Duration::ZERO)
                .build()
                .unwrap_err(),
            PollerConfigError::ZeroTimeout
        );
    }

    #[tokio::test]
    async fn successful_cycle_publishes_status() {
        let store = Arc::new(SnapshotStore::new());
        let mut poller = poller(ScriptedSource::new(vec![Ok(GOOD)]), store.clone());

        let snapshot = poller.run_cycle().await;

        assert!(snapshot.succeeded());
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.status().unwrap().licenses_available, 60);
        assert_eq!(poller.phase(), PollPhase::Idle);
        assert_eq!(store.current().unwrap().sequence, 1);
    }

    #[tokio::test]
    async fn failures_keep_last_good_data() {
        let store = Arc::new(SnapshotStore::new());
        let mut poller = poller(
            ScriptedSource::new(vec![Ok(GOOD), Ok(GOOD), Err("exit status 1"), Ok("")]),
            store.clone(),
        );

        let good = poller.run_cycle().await;
        poller.run_cycle().await;
        let source_error = poller.run_cycle().await;
        let empty = poller.run_cycle().await;

        for failed in [&source_error, &empty] {
            assert!(!failed.succeeded());
            assert_eq!(failed.status, good.status);
        }
        assert_eq!(empty.sequence, 4);
    }

    #[tokio::test]
    async fn first_cycle_failure_publishes_empty_snapshot() {
        let store = Arc::new(SnapshotStore::new());
        let mut poller = poller(ScriptedSource::new(vec![Ok("garbage in")]), store.clone());

        let snapshot = poller.run_cycle().await;
        assert!(!snapshot.succeeded());
        assert!(snapshot.status.is_none());
        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn invalid_field_uses_previous_cycle_value() {
        let store = Arc::new(SnapshotStore::new());
        let mut poller = poller(
            ScriptedSource::new(vec![Ok(GOOD), Ok(r#"{"total":100,"inUse":"??"}"#)]),
            store,
        );

        poller.run_cycle().await;
        let second = poller.run_cycle().await;

        assert!(second.succeeded());
        assert_eq!(second.status().unwrap().licenses_in_use, 40);
        assert!(second.status().unwrap().features.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_source_times_out() {
        let store = Arc::new(SnapshotStore::new());
        let mut poller = Poller::builder(Arc::new(HangingSource), store)
            .fetch_timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        let snapshot = poller.run_cycle().await;
        assert!(!snapshot.succeeded());
        assert!(snapshot.scrape.duration_seconds >= 2.0);
    }

    #[tokio::test]
    async fn panicking_source_is_contained() {
        let store = Arc::new(SnapshotStore::new());
        let mut poller = poller(Arc::new(PanickingSource), store);

        let snapshot = poller.run_cycle().await;
        assert!(!snapshot.succeeded());
        assert_eq!(poller.phase(), PollPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_runs_on_interval_until_stopped() {
        let source = ScriptedSource::new(vec![Ok(GOOD), Ok(GOOD), Ok(GOOD), Ok(GOOD)]);
        let store = Arc::new(SnapshotStore::new());
        let handle = poller(source.clone(), store.clone()).start();

        // First tick fires immediately, then once per second.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(source.calls(), 3);
        assert!(handle.shutdown(Duration::from_secs(1)).await);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(store.current().unwrap().sequence, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_abandons_in_flight_fetch_without_publishing() {
        let store = Arc::new(SnapshotStore::new());
        let handle = Poller::builder(Arc::new(HangingSource), store.clone())
            .fetch_timeout(Duration::from_secs(600))
            .build()
            .unwrap()
            .start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.shutdown(Duration::from_secs(1)).await);
        assert!(store.current().is_none());
    }
}
