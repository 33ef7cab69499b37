//! Deployment freshness watcher.
//!
//! Polls the deployed build marker and forces one full reload when it
//! changes, so a long-lived session never keeps running a stale build.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use beacon_core::{defaults, ExecutionContext, Navigator, VersionSource};

pub struct FreshnessWatcher {
    source: Arc<dyn VersionSource>,
    navigator: Arc<dyn Navigator>,
    poll_interval: Duration,
    context: ExecutionContext,
}

impl FreshnessWatcher {
    pub fn new(source: Arc<dyn VersionSource>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            source,
            navigator,
            poll_interval: Duration::from_secs(defaults::VERSION_POLL_INTERVAL_SECS),
            context: ExecutionContext::Interactive,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    /// Fetch the baseline marker now, then poll on the configured interval.
    ///
    /// Returns `None` outside an interactive session. Dropping the returned
    /// handle stops polling.
    pub fn start_polling(self) -> Option<WatcherHandle> {
        if !self.context.is_interactive() {
            debug!("Non-interactive context, freshness watcher not started");
            return None;
        }

        let reloaded = Arc::new(AtomicBool::new(false));
        let flag = reloaded.clone();
        let task = tokio::spawn(async move { self.run(flag).await });
        Some(WatcherHandle { task, reloaded })
    }

    async fn run(self, reloaded: Arc<AtomicBool>) {
        let mut baseline = match self.source.fetch().await {
            Ok(marker) => {
                debug!(hash = %marker.hash, "Version baseline recorded");
                Some(marker.hash)
            }
            Err(e) => {
                debug!(error = %e, "Version baseline fetch failed");
                None
            }
        };

        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let current = match self.source.fetch().await {
                Ok(marker) => marker.hash,
                Err(e) => {
                    debug!(error = %e, "Version poll failed");
                    continue;
                }
            };

            if let Some(previous) = baseline.as_deref() {
                if previous != current {
                    info!(previous, current = %current, "New deployment detected, reloading");
                    reloaded.store(true, Ordering::SeqCst);
                    self.navigator.reload();
                    return;
                }
            }
            baseline = Some(current);
        }
    }
}

/// Owns the polling task; dropping it stops polling.
pub struct WatcherHandle {
    task: JoinHandle<()>,
    reloaded: Arc<AtomicBool>,
}

impl WatcherHandle {
    /// Whether polling has ended (a reload was triggered).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn reload_triggered(&self) -> bool {
        self.reloaded.load(Ordering::SeqCst)
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use beacon_core::{Error, Result, VersionMarker};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::time::sleep;

    /// Returns scripted markers; `None` entries fail. Repeats the last entry.
    struct ScriptedSource {
        script: Mutex<VecDeque<Option<&'static str>>>,
        last: Mutex<Option<&'static str>>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: &[Option<&'static str>]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.iter().copied().collect()),
                last: Mutex::new(None),
                fetches: AtomicUsize::new(0),
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VersionSource for ScriptedSource {
        async fn fetch(&self) -> Result<VersionMarker> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let next = match self.script.lock().unwrap().pop_front() {
                Some(entry) => {
                    *self.last.lock().unwrap() = entry;
                    entry
                }
                None => *self.last.lock().unwrap(),
            };
            match next {
                Some(hash) => Ok(VersionMarker {
                    hash: hash.to_string(),
                    timestamp: None,
                }),
                None => Err(Error::Status {
                    status: 503,
                    url: "/version.json".into(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct CountingNavigator {
        reloads: AtomicUsize,
    }

    impl Navigator for CountingNavigator {
        fn reload(&self) {
            self.reloads.fetch_add(1, Ordering::SeqCst);
        }
        fn navigate(&self, _route: &str) {}
    }

    fn watcher(source: Arc<ScriptedSource>, nav: Arc<CountingNavigator>) -> FreshnessWatcher {
        FreshnessWatcher::new(source, nav).with_poll_interval(Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_baseline_never_reloads() {
        let source = ScriptedSource::new(&[Some("abc")]);
        let nav = Arc::new(CountingNavigator::default());
        let handle = watcher(source.clone(), nav.clone()).start_polling().unwrap();

        sleep(Duration::from_secs(1)).await;
        assert_eq!(source.fetches(), 1);
        assert_eq!(nav.reloads.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(nav.reloads.load(Ordering::SeqCst), 0);
        assert!(!handle.reload_triggered());
        assert!(!handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_marker_reloads_once_and_stops() {
        let source = ScriptedSource::new(&[Some("abc"), Some("def")]);
        let nav = Arc::new(CountingNavigator::default());
        let handle = watcher(source.clone(), nav.clone()).start_polling().unwrap();

        sleep(Duration::from_secs(31)).await;
        assert_eq!(nav.reloads.load(Ordering::SeqCst), 1);
        assert!(handle.reload_triggered());
        assert!(handle.is_finished());

        sleep(Duration::from_secs(300)).await;
        assert_eq!(source.fetches(), 2);
        assert_eq!(nav.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_keeps_baseline() {
        let source = ScriptedSource::new(&[Some("abc"), None, None, Some("abc"), Some("xyz")]);
        let nav = Arc::new(CountingNavigator::default());
        let _handle = watcher(source.clone(), nav.clone()).start_polling().unwrap();

        sleep(Duration::from_secs(91)).await;
        assert_eq!(source.fetches(), 4);
        assert_eq!(nav.reloads.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(nav.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_baseline_adopts_first_success() {
        let source = ScriptedSource::new(&[None, Some("abc"), Some("def")]);
        let nav = Arc::new(CountingNavigator::default());
        let _handle = watcher(source.clone(), nav.clone()).start_polling().unwrap();

        sleep(Duration::from_secs(31)).await;
        assert_eq!(nav.reloads.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(nav.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let source = ScriptedSource::new(&[Some("abc")]);
        let nav = Arc::new(CountingNavigator::default());
        let handle = watcher(source.clone(), nav.clone()).start_polling().unwrap();

        sleep(Duration::from_secs(31)).await;
        assert_eq!(source.fetches(), 2);
        drop(handle);

        sleep(Duration::from_secs(300)).await;
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_prerender_does_not_start() {
        let source = ScriptedSource::new(&[Some("abc")]);
        let nav = Arc::new(CountingNavigator::default());
        let handle = watcher(source.clone(), nav)
            .with_context(ExecutionContext::Prerender)
            .start_polling();
        assert!(handle.is_none());
        assert_eq!(source.fetches(), 0);
    }
}
