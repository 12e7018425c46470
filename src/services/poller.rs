//! Periodic analytics fetcher.
//!
//! One fetch at start, then one per period until stopped. Each fetch runs as
//! its own task; responses are applied in the order they resolve, so with
//! overlapping fetches the last one to finish wins.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapters::AnalyticsSource;
use crate::coordination::Teardown;
use crate::domain::AggregateReport;
use crate::error::{Result, SyncError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    /// Last successfully fetched report, kept across failures
    pub report: Option<Arc<AggregateReport>>,
    pub loading: bool,
    pub error: Option<SyncError>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub successful_fetches: u64,
    pub failed_fetches: u64,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            report: None,
            loading: true,
            error: None,
            last_fetched_at: None,
            successful_fetches: 0,
            failed_fetches: 0,
        }
    }
}

impl PollState {
    fn apply(&mut self, outcome: Result<AggregateReport>) {
        self.loading = false;
        match outcome {
            Ok(report) => {
                self.report = Some(Arc::new(report));
                self.error = None;
                self.last_fetched_at = Some(Utc::now());
                self.successful_fetches += 1;
            }
            Err(e) => {
                self.error = Some(e);
                self.failed_fetches += 1;
            }
        }
    }
}

#[derive(Debug)]
enum Control {
    Refresh,
    SetInterval(Duration),
}

pub struct AnalyticsPoller {
    state: watch::Receiver<PollState>,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
    period_ms: AtomicU64,
    stopped: AtomicBool,
}

impl AnalyticsPoller {
    pub fn spawn(source: Arc<dyn AnalyticsSource>, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let (state_tx, state) = watch::channel(PollState::default());
        let (control, control_rx) = mpsc::unbounded_channel();

        info!("Starting analytics poller (interval: {:?})", period);
        let task = tokio::spawn(run(source, period, state_tx, control_rx));

        Self {
            state,
            control,
            task,
            period_ms: AtomicU64::new(period.as_millis() as u64),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Fetch now, outside the tick schedule.
    pub fn refresh(&self) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        self.control.send(Control::Refresh).is_ok()
    }

    /// Replace the running ticker with one of the new period. The next
    /// scheduled fetch happens one full new period from now.
    pub fn set_interval(&self, period: Duration) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        let period = period.max(Duration::from_millis(1));
        self.period_ms
            .store(period.as_millis() as u64, Ordering::SeqCst);
        self.control.send(Control::SetInterval(period)).is_ok()
    }

    /// Cancel the ticker and every in-flight fetch. Idempotent.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.task.abort();
        info!("Analytics poller stopped");
        true
    }
}

impl Drop for AnalyticsPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Teardown for AnalyticsPoller {
    fn component(&self) -> String {
        "analytics-poller".to_string()
    }

    fn teardown(&self) {
        self.stop();
    }
}

async fn run(
    source: Arc<dyn AnalyticsSource>,
    period: Duration,
    state: watch::Sender<PollState>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    // First tick completes immediately.
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut fetches: JoinSet<Result<AggregateReport>> = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("Analytics poll tick");
                spawn_fetch(&mut fetches, &source);
            }
            cmd = control.recv() => match cmd {
                Some(Control::Refresh) => {
                    debug!("Analytics manual refresh");
                    spawn_fetch(&mut fetches, &source);
                }
                Some(Control::SetInterval(next)) => {
                    info!("Analytics poll interval changed to {:?}", next);
                    ticker = interval_at(Instant::now() + next, next);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                }
                None => break,
            },
            Some(joined) = fetches.join_next(), if !fetches.is_empty() => {
                let outcome = flatten(joined);
                if let Err(e) = &outcome {
                    warn!("Analytics poll failed: {}", e);
                }
                state.send_modify(|s| s.apply(outcome));
            }
        }
    }

    fetches.abort_all();
}

fn spawn_fetch(fetches: &mut JoinSet<Result<AggregateReport>>, source: &Arc<dyn AnalyticsSource>) {
    let source = Arc::clone(source);
    fetches.spawn(async move { source.fetch_report().await });
}

fn flatten(joined: std::result::Result<Result<AggregateReport>, JoinError>) -> Result<AggregateReport> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => Err(SyncError::Cancelled),
        Err(e) => Err(SyncError::Internal(format!("analytics fetch task failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAnalyticsSource;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn report(total_startups: u64) -> AggregateReport {
        AggregateReport {
            total_startups,
            ..Default::default()
        }
    }

    fn scripted_mock() -> MockAnalyticsSource {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mock = MockAnalyticsSource::new();
        mock.expect_fetch_report().returning(move || {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(report(1)),
                1 => Err(SyncError::Http("503 Service Unavailable".into())),
                n => Ok(report(n as u64 + 1)),
            }
        });
        mock
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_report() {
        let poller = AnalyticsPoller::spawn(Arc::new(scripted_mock()), Duration::from_secs(30));
        let mut rx = poller.subscribe();
        assert!(rx.borrow().loading);

        let first = rx.wait_for(|s| s.successful_fetches == 1).await.unwrap().clone();
        assert!(!first.loading);
        assert_eq!(first.error, None);
        assert_eq!(first.report.as_deref(), Some(&report(1)));

        let second = rx.wait_for(|s| s.failed_fetches == 1).await.unwrap().clone();
        assert_eq!(second.report.as_deref(), Some(&report(1)));
        assert!(matches!(second.error, Some(SyncError::Http(_))));
        assert_eq!(second.last_fetched_at, first.last_fetched_at);

        let third = rx.wait_for(|s| s.successful_fetches == 2).await.unwrap().clone();
        assert_eq!(third.error, None);
        assert_eq!(third.report.as_deref(), Some(&report(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_follow_period() {
        let mut mock = MockAnalyticsSource::new();
        mock.expect_fetch_report().returning(|| Ok(report(7)));
        let poller = AnalyticsPoller::spawn(Arc::new(mock), Duration::from_secs(30));
        let mut rx = poller.subscribe();

        let start = Instant::now();
        rx.wait_for(|s| s.successful_fetches == 1).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        rx.wait_for(|s| s.successful_fetches == 3).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_is_out_of_band() {
        let mut mock = MockAnalyticsSource::new();
        mock.expect_fetch_report().returning(|| Ok(report(1)));
        let poller = AnalyticsPoller::spawn(Arc::new(mock), Duration::from_secs(300));
        let mut rx = poller.subscribe();
        rx.wait_for(|s| s.successful_fetches == 1).await.unwrap();

        let start = Instant::now();
        assert!(poller.refresh());
        rx.wait_for(|s| s.successful_fetches == 2).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_interval_restarts_ticker() {
        let mut mock = MockAnalyticsSource::new();
        mock.expect_fetch_report().returning(|| Ok(report(1)));
        let poller = AnalyticsPoller::spawn(Arc::new(mock), Duration::from_secs(300));
        let mut rx = poller.subscribe();
        rx.wait_for(|s| s.successful_fetches == 1).await.unwrap();

        let start = Instant::now();
        assert!(poller.set_interval(Duration::from_secs(5)));
        assert_eq!(poller.period(), Duration::from_secs(5));

        rx.wait_for(|s| s.successful_fetches == 2).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_halts_fetching() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut mock = MockAnalyticsSource::new();
        mock.expect_fetch_report().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(report(1))
        });

        let poller = AnalyticsPoller::spawn(Arc::new(mock), Duration::from_secs(10));
        let mut rx = poller.subscribe();
        rx.wait_for(|s| s.successful_fetches == 1).await.unwrap();

        assert!(poller.stop());
        assert!(!poller.stop());
        assert!(!poller.refresh());
        assert!(!poller.is_running());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Source whose responses resolve after scripted delays.
    struct DelayedSource {
        script: Mutex<Vec<(Duration, u64)>>,
    }

    #[async_trait]
    impl AnalyticsSource for DelayedSource {
        async fn fetch_report(&self) -> Result<AggregateReport> {
            let (delay, value) = self.script.lock().unwrap().remove(0);
            tokio::time::sleep(delay).await;
            Ok(report(value))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_fetches_last_resolver_wins() {
        let source = DelayedSource {
            script: Mutex::new(vec![
                (Duration::from_secs(10), 1),
                (Duration::from_secs(1), 2),
            ]),
        };
        let poller = AnalyticsPoller::spawn(Arc::new(source), Duration::from_secs(300));
        let mut rx = poller.subscribe();

        tokio::task::yield_now().await;
        assert!(poller.refresh());

        let first = rx.wait_for(|s| s.successful_fetches == 1).await.unwrap().clone();
        assert_eq!(first.report.as_deref(), Some(&report(2)));

        let second = rx.wait_for(|s| s.successful_fetches == 2).await.unwrap().clone();
        assert_eq!(second.report.as_deref(), Some(&report(1)));
    }
}
