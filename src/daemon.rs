// Monitoring daemon - the scheduler loop driving the per-certificate pipeline
//
// One steady-state cycle: for every configured certificate, read its source,
// evaluate urgency, ask the tracker whether a notification is due, dispatch
// it, and record the outcome. Certificates are checked concurrently behind a
// semaphore; a failure on one never aborts the others. The configuration is
// re-read at each cycle boundary so list edits take effect without a restart.

use crate::config::Config;
use crate::dispatcher::{DispatchResult, NotificationPayload, WebhookDispatcher};
use crate::evaluator::{self, UrgencyState};
use crate::inventory::CertificateDescriptor;
use crate::reader;
use crate::tracker::NotificationTracker;
use crate::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, Semaphore};

/// Main monitoring daemon
pub struct MonitorDaemon {
    config_path: PathBuf,
    tracker: Arc<Mutex<NotificationTracker>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

/// What one evaluation cycle did
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub checked: usize,
    pub unreadable: usize,
    pub notified: usize,
    pub dispatch_failures: usize,
}

/// Notification outcome for a single certificate within a cycle
enum NotifyOutcome {
    /// Tracker decided nothing is due
    NotDue,
    /// Payload delivered and recorded
    Sent,
    /// Delivery failed after retries; will be retried next cycle
    Failed,
    /// A notification was due but no webhook is configured
    NoWebhook,
}

impl MonitorDaemon {
    /// Create the daemon, rehydrating tracker state from a previous run
    pub fn new(config_path: PathBuf, config: &Config) -> Self {
        let tracker = NotificationTracker::load(
            &config.watch.state_path,
            config.watch.renotify_interval_hours,
        );

        Self {
            config_path,
            tracker: Arc::new(Mutex::new(tracker)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Run evaluation cycles until the process is signalled to stop
    pub async fn run(&self) -> Result<()> {
        tracing::info!("starting certwatch monitoring daemon");

        self.running.store(true, Ordering::SeqCst);
        self.spawn_signal_listener();

        let mut config = Config::from_file(&self.config_path)?;
        tracing::info!(
            "monitoring {} certificate(s), cycle every {}s",
            config.certificates.len(),
            config.watch.check_interval_seconds
        );
        if config.watch.webhook.is_none() {
            tracing::warn!("no webhook configured; due notifications will only be logged");
        }

        while self.running.load(Ordering::SeqCst) {
            match self.run_cycle(&config).await {
                Ok(stats) => {
                    tracing::info!(
                        checked = stats.checked,
                        unreadable = stats.unreadable,
                        notified = stats.notified,
                        dispatch_failures = stats.dispatch_failures,
                        "cycle complete"
                    );
                }
                Err(e) => tracing::error!("error in evaluation cycle: {:#}", e),
            }

            let pause = Duration::from_secs(config.watch.check_interval_seconds.max(1));
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.shutdown.notified() => break,
            }

            // Pick up list and settings edits at the cycle boundary
            match Config::from_file(&self.config_path) {
                Ok(next) => {
                    self.apply_watch_settings(&next).await;
                    config = next;
                }
                Err(e) => {
                    tracing::warn!("failed to reload config, keeping previous: {:#}", e);
                }
            }
        }

        tracing::info!("monitoring daemon stopped");
        Ok(())
    }

    /// Signal the loop to stop after the in-flight cycle finishes
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Push reloaded settings into the tracker so they govern the next cycle
    async fn apply_watch_settings(&self, config: &Config) {
        let mut tracker = self.tracker.lock().await;
        tracker.set_renotify_interval(config.watch.renotify_interval_hours);
        if let Err(err) = tracker.set_state_path(&config.watch.state_path) {
            tracing::error!("failed to move notification state: {}", err);
        }
    }

    /// Run a single evaluation cycle over the given configuration snapshot
    pub async fn run_cycle(&self, config: &Config) -> Result<CycleStats> {
        let mut stats = CycleStats::default();

        if config.certificates.is_empty() {
            tracing::debug!("no certificates configured, skipping cycle");
            return Ok(stats);
        }

        let dispatcher = match &config.watch.webhook {
            Some(webhook) => Some(Arc::new(WebhookDispatcher::new(webhook.clone())?)),
            None => None,
        };

        let permits = config.watch.max_concurrent_checks.max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let threshold_days = config.watch.threshold_days;

        let mut tasks = Vec::new();
        for descriptor in config.certificates.iter().cloned() {
            let dispatcher = dispatcher.clone();
            let tracker = Arc::clone(&self.tracker);
            let semaphore = Arc::clone(&semaphore);

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                Self::check_certificate(descriptor, threshold_days, dispatcher, tracker).await
            }));
        }

        for task in tasks {
            match task.await {
                Ok((state, outcome)) => {
                    stats.checked += 1;
                    if state == UrgencyState::Unreadable {
                        stats.unreadable += 1;
                    }
                    match outcome {
                        NotifyOutcome::Sent => stats.notified += 1,
                        NotifyOutcome::Failed => stats.dispatch_failures += 1,
                        NotifyOutcome::NotDue | NotifyOutcome::NoWebhook => {}
                    }
                }
                Err(e) => tracing::error!("certificate check task failed: {}", e),
            }
        }

        Ok(stats)
    }

    /// Check one certificate: read, evaluate, consult the tracker, dispatch
    ///
    /// Operations for the same certificate are strictly sequential; the
    /// tracker record is only written after a successful dispatch, so a
    /// failed delivery is retried on a later cycle.
    async fn check_certificate(
        descriptor: CertificateDescriptor,
        global_threshold_days: i64,
        dispatcher: Option<Arc<WebhookDispatcher>>,
        tracker: Arc<Mutex<NotificationTracker>>,
    ) -> (UrgencyState, NotifyOutcome) {
        tracing::debug!(certificate = %descriptor.id, "checking");

        let outcome = reader::read_certificate(&descriptor.source).await;
        if let Err(err) = &outcome {
            tracing::warn!(certificate = %descriptor.id, "failed to read certificate: {}", err);
        }

        let now = Utc::now();
        let threshold = descriptor.threshold_days.unwrap_or(global_threshold_days);
        let evaluation = evaluator::evaluate(now, &outcome, threshold);

        tracing::debug!(
            certificate = %descriptor.id,
            state = %evaluation.state,
            days_remaining = ?evaluation.days_remaining,
            "evaluated"
        );

        let due = tracker
            .lock()
            .await
            .should_notify(&descriptor.id, evaluation.state, now);
        if !due {
            return (evaluation.state, NotifyOutcome::NotDue);
        }

        let Some(dispatcher) = dispatcher else {
            tracing::warn!(
                certificate = %descriptor.id,
                state = %evaluation.state,
                days_remaining = ?evaluation.days_remaining,
                "notification due but no webhook is configured"
            );
            return (evaluation.state, NotifyOutcome::NoWebhook);
        };

        let payload =
            NotificationPayload::new(&descriptor, &evaluation, outcome.as_ref().ok(), now);

        match dispatcher.dispatch(&payload).await {
            DispatchResult::Success { attempts } => {
                tracing::info!(
                    certificate = %descriptor.id,
                    state = %evaluation.state,
                    attempts,
                    "notification delivered"
                );
                let mut tracker = tracker.lock().await;
                if let Err(err) = tracker.record(&descriptor.id, evaluation.state, now) {
                    tracing::error!(
                        certificate = %descriptor.id,
                        "failed to persist notification record: {}",
                        err
                    );
                }
                (evaluation.state, NotifyOutcome::Sent)
            }
            DispatchResult::Failure { attempts, error } => {
                tracing::error!(
                    certificate = %descriptor.id,
                    attempts,
                    "notification failed, will retry next cycle: {}",
                    error
                );
                (evaluation.state, NotifyOutcome::Failed)
            }
        }
    }

    /// Stop on SIGTERM/SIGINT; the in-flight cycle is awaited before exit
    fn spawn_signal_listener(&self) {
        let running = Arc::clone(&self.running);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};

                let mut sigterm =
                    signal(SignalKind::terminate()).expect("failed to set up SIGTERM handler");
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("failed to set up SIGINT handler");

                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                    _ = sigint.recv() => tracing::info!("received SIGINT"),
                }
            }

            #[cfg(not(unix))]
            {
                tokio::signal::ctrl_c()
                    .await
                    .expect("failed to set up Ctrl+C handler");
                tracing::info!("received Ctrl+C");
            }

            running.store(false, Ordering::SeqCst);
            shutdown.notify_waiters();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_cycle() {
        let config = Config::default();
        let daemon = MonitorDaemon::new(PathBuf::from("unused.toml"), &config);

        let stats = daemon.run_cycle(&config).await.unwrap();
        assert_eq!(stats.checked, 0);
        assert_eq!(stats.notified, 0);
    }

    #[tokio::test]
    async fn test_reloaded_settings_reach_the_tracker() {
        use chrono::Duration;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.watch.state_path = dir.path().join("state.json");

        let daemon = MonitorDaemon::new(dir.path().join("certwatch.toml"), &config);
        let now = Utc::now();
        daemon
            .tracker
            .lock()
            .await
            .record("a", UrgencyState::Warning, now)
            .unwrap();
        assert!(!daemon
            .tracker
            .lock()
            .await
            .should_notify("a", UrgencyState::Warning, now + Duration::hours(2)));

        // Shrink the renotify interval and move the state file
        let mut next = config.clone();
        next.watch.renotify_interval_hours = 1;
        next.watch.state_path = dir.path().join("moved.json");
        daemon.apply_watch_settings(&next).await;

        assert!(daemon
            .tracker
            .lock()
            .await
            .should_notify("a", UrgencyState::Warning, now + Duration::hours(2)));
        assert!(dir.path().join("moved.json").exists());
    }

    #[tokio::test]
    async fn test_unreadable_without_webhook_counts() {
        use crate::inventory::{parse_target, CertificateDescriptor};

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.watch.state_path = dir.path().join("state.json");
        config
            .certificates
            .add(CertificateDescriptor::new(
                parse_target(dir.path().join("missing.pem").to_str().unwrap()).unwrap(),
            ))
            .unwrap();

        let daemon = MonitorDaemon::new(dir.path().join("certwatch.toml"), &config);
        let stats = daemon.run_cycle(&config).await.unwrap();

        assert_eq!(stats.checked, 1);
        assert_eq!(stats.unreadable, 1);
        // Due but not deliverable: nothing recorded, nothing counted as sent
        assert_eq!(stats.notified, 0);
        assert_eq!(stats.dispatch_failures, 0);
    }
}
