//! Presence monitoring: the timer-driven poller and the service that launches it.
//!
//! Each poller owns a bounded queue feeding one record worker, so offline samples are
//! handed off without blocking the tick loop while writes for a user stay sequential.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    config::DEFAULT_RECORD_QUEUE_CAPACITY,
    domain::{format_epoch, PresenceSample, StatusEvent, UserId},
    errors::Error,
    ports::AccountClient,
    recorder::{RecordOutcome, Recorder},
};

/// Samples one user's presence on a fixed interval.
///
/// `start` consumes the poller: once it returns the poller is gone, so there is no
/// way back to the idle state.
pub struct Poller {
    client: Arc<dyn AccountClient>,
    recorder: Arc<Recorder>,
    interval: Duration,
    queue_capacity: usize,
}

impl Poller {
    pub fn new(client: Arc<dyn AccountClient>, recorder: Arc<Recorder>, interval: Duration) -> Self {
        Self {
            client,
            recorder,
            interval,
            queue_capacity: DEFAULT_RECORD_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Poll `user_id` until `cancel` fires. Cancellation is the normal way out.
    pub async fn start(self, cancel: CancellationToken, user_id: UserId) {
        let span = info_span!("poller", user_id = user_id.0);
        self.run(cancel, user_id).instrument(span).await
    }

    async fn run(self, cancel: CancellationToken, user_id: UserId) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            "monitoring started"
        );

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let worker = tokio::spawn(record_worker(self.recorder.clone(), rx).in_current_span());

        // First sample one interval after start, like a plain ticker.
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = ticker.tick() => self.tick(user_id, &tx).await,
            }
        }

        // Closing the queue lets the worker finish what is already buffered.
        drop(tx);
        if let Err(e) = worker.await {
            error!(error = %e, "record worker aborted");
        }

        info!("monitoring stopped");
    }

    async fn tick(&self, user_id: UserId, tx: &mpsc::Sender<StatusEvent>) {
        let presence = match self.client.user_presence(user_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "presence lookup failed");
                return;
            }
        };

        let sample = PresenceSample { user_id, presence };
        let Some(event) = sample.offline_event() else {
            debug!("user is online");
            return;
        };

        debug!(
            last_online = event.last_online,
            offline_since = %format_epoch(event.last_online),
            "user is offline"
        );

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                warn!(last_online = ev.last_online, "record queue full, dropping sample");
            }
            Err(TrySendError::Closed(ev)) => {
                error!(last_online = ev.last_online, "record worker gone, dropping sample");
            }
        }
    }
}

async fn record_worker(recorder: Arc<Recorder>, mut rx: mpsc::Receiver<StatusEvent>) {
    while let Some(event) = rx.recv().await {
        let rec = recorder.clone();
        let result = tokio::task::spawn_blocking(move || {
            rec.record_if_changed(event.user_id, event.last_online)
        })
        .await
        .unwrap_or_else(|e| Err(Error::External(format!("record task failed: {e}"))));

        match result {
            Ok(RecordOutcome::Recorded) => info!(
                last_online = event.last_online,
                offline_since = %format_epoch(event.last_online),
                "status change recorded"
            ),
            Ok(RecordOutcome::Unchanged) => {
                debug!(last_online = event.last_online, "status unchanged")
            }
            Err(e) => error!(
                error = %e,
                last_online = event.last_online,
                "failed to persist status change"
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    ShuttingDown,
}

/// Entry point used by the command front end to start monitoring a user.
///
/// Every poller it launches is governed by the one root cancellation token; there is
/// no way to stop a single poller. After cancelling, `wait` until queued samples are
/// written.
#[derive(Clone)]
pub struct MonitorService {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    client: Arc<dyn AccountClient>,
    recorder: Arc<Recorder>,
    interval: Duration,
    queue_capacity: usize,
    cancel: CancellationToken,
    tasks: TaskTracker,
    active: Mutex<HashSet<UserId>>,
}

impl MonitorService {
    pub fn new(
        client: Arc<dyn AccountClient>,
        recorder: Arc<Recorder>,
        interval: Duration,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                client,
                recorder,
                interval,
                queue_capacity,
                cancel,
                tasks: TaskTracker::new(),
                active: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Spawn a poller for `user_id` unless one is already live.
    pub fn start(&self, user_id: UserId) -> StartOutcome {
        if self.inner.cancel.is_cancelled() {
            return StartOutcome::ShuttingDown;
        }
        if !self.active().insert(user_id) {
            return StartOutcome::AlreadyRunning;
        }

        let poller = Poller::new(
            self.inner.client.clone(),
            self.inner.recorder.clone(),
            self.inner.interval,
        )
        .with_queue_capacity(self.inner.queue_capacity);

        let svc = self.clone();
        self.inner.tasks.spawn(async move {
            poller.start(svc.inner.cancel.clone(), user_id).await;
            svc.active().remove(&user_id);
        });

        StartOutcome::Started
    }

    /// Wait for every launched poller, and its record worker, to finish.
    ///
    /// Returns once the pollers have observed cancellation and drained their queues;
    /// no new pollers are tracked afterwards.
    pub async fn wait(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }

    pub fn is_monitoring(&self, user_id: UserId) -> bool {
        self.active().contains(&user_id)
    }

    fn active(&self) -> std::sync::MutexGuard<'_, HashSet<UserId>> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::Presence, errors::Error, Result};
    use async_trait::async_trait;
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Clone, Copy, Debug)]
    enum Step {
        Online,
        Offline(i64),
        Fail,
    }

    /// Replays a script of presence answers; the last step repeats forever.
    struct FakeClient {
        script: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl FakeClient {
        fn new(steps: &[Step]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(steps.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AccountClient for FakeClient {
        async fn user_presence(&self, _user_id: UserId) -> Result<Presence> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().copied()
                }
            };
            match step.unwrap_or(Step::Online) {
                Step::Online => Ok(Presence::Online),
                Step::Offline(t) => Ok(Presence::OfflineSince(t)),
                Step::Fail => Err(Error::External("flood wait".to_string())),
            }
        }

        async fn list_dialogs(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    const TICK: Duration = Duration::from_millis(10);

    fn recorder_in(dir: &tempfile::TempDir) -> Arc<Recorder> {
        Arc::new(Recorder::new(
            dir.path().join("user_status.json"),
            dir.path().join("last_status.json"),
        ))
    }

    async fn run_for(poller: Poller, user_id: UserId, dur: Duration) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.start(cancel.clone(), user_id));
        tokio::time::sleep(dur).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop on cancellation")
            .unwrap();
    }

    fn history(rec: &Recorder) -> String {
        std::fs::read_to_string(rec.history_path()).unwrap_or_default()
    }

    #[tokio::test]
    async fn repeated_offline_samples_record_once() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder_in(&dir);
        let client = FakeClient::new(&[Step::Offline(1000)]);

        run_for(
            Poller::new(client.clone(), rec.clone(), TICK),
            UserId(42),
            Duration::from_millis(150),
        )
        .await;

        assert!(client.calls() >= 2);
        assert_eq!(history(&rec), "{\"user_id\":42,\"last_online\":1000}\n");
    }

    #[tokio::test]
    async fn online_samples_never_touch_the_stores() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder_in(&dir);
        let client = FakeClient::new(&[Step::Online]);

        run_for(
            Poller::new(client.clone(), rec.clone(), TICK),
            UserId(42),
            Duration::from_millis(100),
        )
        .await;

        assert!(client.calls() >= 2);
        assert!(!rec.history_path().exists());
        assert!(!rec.last_status_path().exists());
    }

    #[tokio::test]
    async fn lookup_failures_do_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder_in(&dir);
        let client = FakeClient::new(&[Step::Fail, Step::Fail, Step::Offline(1000)]);

        run_for(
            Poller::new(client.clone(), rec.clone(), TICK),
            UserId(42),
            Duration::from_millis(200),
        )
        .await;

        assert!(client.calls() >= 3);
        assert_eq!(history(&rec).lines().count(), 1);
    }

    #[tokio::test]
    async fn transitions_are_recorded_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder_in(&dir);
        let client = FakeClient::new(&[
            Step::Offline(1000),
            Step::Online,
            Step::Offline(1000),
            Step::Offline(2000),
        ]);

        run_for(
            Poller::new(client, rec.clone(), TICK),
            UserId(42),
            Duration::from_millis(200),
        )
        .await;

        assert_eq!(
            history(&rec),
            "{\"user_id\":42,\"last_online\":1000}\n{\"user_id\":42,\"last_online\":2000}\n"
        );
    }

    #[tokio::test]
    async fn cancellation_before_first_tick_returns_without_sampling() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeClient::new(&[Step::Offline(1000)]);
        let poller = Poller::new(client.clone(), recorder_in(&dir), Duration::from_secs(3600));

        run_for(poller, UserId(42), Duration::from_millis(20)).await;
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn service_refuses_duplicate_pollers() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let svc = MonitorService::new(
            FakeClient::new(&[Step::Online]),
            recorder_in(&dir),
            TICK,
            DEFAULT_RECORD_QUEUE_CAPACITY,
            cancel.clone(),
        );

        assert_eq!(svc.start(UserId(42)), StartOutcome::Started);
        assert_eq!(svc.start(UserId(42)), StartOutcome::AlreadyRunning);
        assert!(svc.is_monitoring(UserId(42)));
        assert!(!svc.is_monitoring(UserId(7)));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), svc.wait())
            .await
            .expect("pollers did not stop on cancellation");
        assert!(!svc.is_monitoring(UserId(42)));
        assert_eq!(svc.start(UserId(42)), StartOutcome::ShuttingDown);
    }

    #[tokio::test]
    async fn wait_lets_queued_samples_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder_in(&dir);
        let cancel = CancellationToken::new();
        let svc = MonitorService::new(
            FakeClient::new(&[Step::Offline(1000)]),
            rec.clone(),
            TICK,
            DEFAULT_RECORD_QUEUE_CAPACITY,
            cancel.clone(),
        );

        assert_eq!(svc.start(UserId(42)), StartOutcome::Started);
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), svc.wait())
            .await
            .expect("pollers did not drain on shutdown");

        assert_eq!(history(&rec), "{\"user_id\":42,\"last_online\":1000}\n");
        assert_eq!(
            rec.last_status().unwrap().map(|ev| ev.last_online),
            Some(1000)
        );
    }
}
