//! Per-alarm evaluation jobs.
//!
//! Every armed alarm gets its own tokio task holding a child of the
//! scheduler's master [`CancellationToken`]. The task waits one full period
//! before its first tick and then ticks once per period until cancelled.
//! Cancellation is cooperative: it is checked before each tick and never
//! interrupts a tick that is already running.
//!
//! Runtime state changes for one alarm are serialized by a per-ARN lock
//! shared by ticks and manual state changes. A tick queries the metric
//! source without the lock and applies its outcome to the runtime state read
//! under it.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use metricwatch_core::alarm::{AlarmDefinition, AlarmRuntimeState, AlarmState, PeriodOutcome};
use metricwatch_core::error::CoreError;
use metricwatch_core::evaluation::{classify, evaluate};
use metricwatch_core::types::Timestamp;
use metricwatch_events::{ActionNotifier, AlarmTransition, EventBus, MonitoringEvent};
use metricwatch_store::{align_to_period, MetricSource, StatisticQuery};

use crate::config::SchedulerConfig;
use crate::registry::{AlarmRegistry, StoredAlarm};

/// Floor for job intervals; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Owns one recurring evaluation job per alarm ARN.
pub struct AlarmScheduler {
    evaluator: Arc<Evaluator>,
    /// Active jobs indexed by alarm ARN.
    jobs: Mutex<HashMap<String, ScheduledJob>>,
    /// Master cancellation token, cancelled by [`AlarmScheduler::shutdown`].
    cancel: CancellationToken,
}

struct ScheduledJob {
    period: Duration,
    /// Per-job token (child of the master token).
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AlarmScheduler {
    pub fn new(
        registry: Arc<dyn AlarmRegistry>,
        metrics: Arc<dyn MetricSource>,
        notifier: Arc<dyn ActionNotifier>,
        bus: Arc<EventBus>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            evaluator: Arc::new(Evaluator {
                registry,
                metrics,
                notifier,
                bus,
                config,
                alarm_locks: Mutex::new(HashMap::new()),
            }),
            jobs: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Arm the job for `definition`, replacing any job already running for
    /// the same ARN. The first tick fires one period from now.
    pub async fn start(&self, definition: &AlarmDefinition) {
        if self.cancel.is_cancelled() {
            tracing::warn!(arn = %definition.arn, "Scheduler is shut down, alarm not armed");
            return;
        }

        let period = definition.period().max(MIN_PERIOD);
        let mut jobs = self.jobs.lock().await;

        let cancel = self.cancel.child_token();
        let handle = tokio::spawn(run_job(
            Arc::clone(&self.evaluator),
            definition.arn.clone(),
            period,
            cancel.clone(),
        ));
        let job = ScheduledJob {
            period,
            cancel,
            handle,
        };

        match jobs.insert(definition.arn.clone(), job) {
            Some(previous) => {
                previous.cancel.cancel();
                tracing::debug!(arn = %definition.arn, period_secs = period.as_secs(), "Alarm job re-armed");
            }
            None => {
                tracing::debug!(arn = %definition.arn, period_secs = period.as_secs(), "Alarm job armed");
            }
        }
    }

    /// Cancel and forget the job for `arn`. Returns `false` if there was
    /// none.
    pub async fn delete(&self, arn: &str) -> bool {
        let removed = self.jobs.lock().await.remove(arn);
        self.evaluator.prune_alarm_locks().await;
        match removed {
            Some(job) => {
                job.cancel.cancel();
                tracing::debug!(arn, "Alarm job cancelled");
                true
            }
            None => false,
        }
    }

    /// Arm a job for every alarm in the registry. Runtime state, including
    /// the outcome buffer, is picked up from the registry on the next tick.
    pub async fn restart_existing_alarms(&self) -> Result<usize, CoreError> {
        let alarms = self.evaluator.registry.list_all().await?;
        for alarm in &alarms {
            self.start(&alarm.definition).await;
        }
        tracing::info!(count = alarms.len(), "Re-armed existing alarms");
        Ok(alarms.len())
    }

    /// Cancel every job and wait for in-flight ticks to finish. The
    /// scheduler stays usable.
    pub async fn cancel_all(&self) -> usize {
        let count = self.stop_jobs().await;
        tracing::debug!(count, "All alarm jobs cancelled");
        count
    }

    /// Cancel every job and wait for in-flight ticks to finish. No job can
    /// be armed afterwards.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down alarm scheduler");
        self.cancel.cancel();
        self.stop_jobs().await;
        tracing::info!("Alarm scheduler shut down complete");
    }

    /// Drain the job map, cancel every job and join them all under one
    /// grace period.
    async fn stop_jobs(&self) -> usize {
        let drained: Vec<ScheduledJob> = self
            .jobs
            .lock()
            .await
            .drain()
            .map(|(_, job)| job)
            .collect();
        let count = drained.len();
        for job in &drained {
            job.cancel.cancel();
        }

        let grace = self.evaluator.config.shutdown_grace;
        let handles = drained.into_iter().map(|job| job.handle);
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!(
                count,
                grace_ms = grace.as_millis() as u64,
                "Alarm jobs did not stop within the grace period"
            );
        }

        self.evaluator.prune_alarm_locks().await;
        count
    }

    /// Evaluate `arn` once, now.
    pub async fn tick(&self, arn: &str) -> Result<Option<AlarmTransition>, CoreError> {
        self.evaluator.tick(arn, Utc::now()).await
    }

    /// Evaluate `arn` as if the clock read `now`.
    pub async fn tick_at(
        &self,
        arn: &str,
        now: Timestamp,
    ) -> Result<Option<AlarmTransition>, CoreError> {
        self.evaluator.tick(arn, now).await
    }

    /// Force the state of `arn`. Actions fire if the state changes; the
    /// next tick evaluates normally.
    pub async fn set_state(
        &self,
        arn: &str,
        state: AlarmState,
        reason: String,
        reason_data: Option<serde_json::Value>,
    ) -> Result<Option<AlarmTransition>, CoreError> {
        self.evaluator
            .set_state(arn, state, reason, reason_data, Utc::now())
            .await
    }

    /// ARNs with a live job, sorted.
    pub async fn active_jobs(&self) -> Vec<String> {
        let jobs = self.jobs.lock().await;
        let mut arns: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| !job.handle.is_finished())
            .map(|(arn, _)| arn.clone())
            .collect();
        arns.sort();
        arns
    }

    pub async fn is_scheduled(&self, arn: &str) -> bool {
        self.jobs
            .lock()
            .await
            .get(arn)
            .is_some_and(|job| !job.handle.is_finished())
    }

    /// Interval of the job currently armed for `arn`.
    pub async fn scheduled_period(&self, arn: &str) -> Option<Duration> {
        self.jobs.lock().await.get(arn).map(|job| job.period)
    }
}

// ---------------------------------------------------------------------------
// Job loop
// ---------------------------------------------------------------------------

async fn run_job(evaluator: Arc<Evaluator>, arn: String, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if cancel.is_cancelled() {
                    break;
                }
                if !evaluator.guarded_tick(&arn).await {
                    break;
                }
            }
        }
    }

    tracing::debug!(arn = %arn, "Alarm job stopped");
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

struct Evaluator {
    registry: Arc<dyn AlarmRegistry>,
    metrics: Arc<dyn MetricSource>,
    notifier: Arc<dyn ActionNotifier>,
    bus: Arc<EventBus>,
    config: SchedulerConfig,
    /// Runtime-state locks indexed by alarm ARN.
    alarm_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Evaluator {
    async fn lock_alarm(&self, arn: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.alarm_locks.lock().await;
            Arc::clone(locks.entry(arn.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Forget locks nobody holds or waits on.
    async fn prune_alarm_locks(&self) {
        self.alarm_locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Run one tick, containing errors and panics. Returns `false` when the
    /// job should stop because its alarm no longer exists.
    async fn guarded_tick(&self, arn: &str) -> bool {
        match AssertUnwindSafe(self.tick(arn, Utc::now())).catch_unwind().await {
            Ok(Ok(_)) => true,
            Ok(Err(CoreError::NotFound { .. })) => {
                tracing::info!(arn, "Alarm no longer registered, stopping its job");
                false
            }
            Ok(Err(e)) => {
                tracing::error!(arn, error = %e, "Alarm evaluation failed");
                true
            }
            Err(panic) => {
                tracing::error!(arn, panic = %panic_message(&*panic), "Alarm evaluation panicked");
                true
            }
        }
    }

    async fn tick(&self, arn: &str, now: Timestamp) -> Result<Option<AlarmTransition>, CoreError> {
        let queried = self
            .registry
            .get(arn)
            .await?
            .ok_or_else(|| CoreError::alarm_not_found(arn))?
            .definition;

        let end = align_to_period(&now, queried.period_secs);
        let start = end - chrono::Duration::seconds(i64::from(queried.period_secs));
        let value = self.period_value(&queried, start, end).await;

        let _guard = self.lock_alarm(arn).await;
        let StoredAlarm {
            definition,
            mut runtime,
        } = self
            .registry
            .get(arn)
            .await?
            .ok_or_else(|| CoreError::alarm_not_found(arn))?;

        if !same_query(&queried, &definition) {
            tracing::debug!(arn, "Alarm metric changed during evaluation, period skipped");
            return Ok(None);
        }

        if let Some(kind) = classify(&definition, value) {
            runtime.record(
                PeriodOutcome {
                    period_start: start,
                    kind,
                    value,
                },
                definition.evaluation_periods as usize,
            );
        }

        let previous = runtime.state;
        let decision = evaluate(&definition, &runtime.recent_outcomes, previous);
        runtime.last_evaluated_at = Some(now);

        let transition = if decision.state != previous {
            runtime.state = decision.state;
            runtime.reason = decision.reason;
            runtime.reason_data = Some(decision.reason_data);
            runtime.state_updated_at = now;
            Some(transition(&definition, previous, &runtime))
        } else {
            None
        };

        tracing::trace!(arn, state = %runtime.state, "Alarm evaluated");
        self.registry.save_runtime(arn, runtime).await?;

        if let Some(transition) = &transition {
            self.announce(&definition, transition);
        }
        Ok(transition)
    }

    async fn set_state(
        &self,
        arn: &str,
        state: AlarmState,
        reason: String,
        reason_data: Option<serde_json::Value>,
        now: Timestamp,
    ) -> Result<Option<AlarmTransition>, CoreError> {
        let _guard = self.lock_alarm(arn).await;
        let StoredAlarm {
            definition,
            mut runtime,
        } = self
            .registry
            .get(arn)
            .await?
            .ok_or_else(|| CoreError::alarm_not_found(arn))?;

        let previous = runtime.state;
        runtime.state = state;
        runtime.reason = reason;
        runtime.reason_data = reason_data;
        runtime.state_updated_at = now;

        let transition = (state != previous).then(|| transition(&definition, previous, &runtime));
        self.registry.save_runtime(arn, runtime).await?;

        if let Some(transition) = &transition {
            self.announce(&definition, transition);
        }
        Ok(transition)
    }

    /// Statistic of the period `[start, end)`, or `None` when the period
    /// has no data or the query failed or timed out.
    async fn period_value(
        &self,
        definition: &AlarmDefinition,
        start: Timestamp,
        end: Timestamp,
    ) -> Option<f64> {
        let query = StatisticQuery::new(
            definition.metric.clone(),
            start,
            end,
            definition.period_secs,
            definition.statistic,
        )
        .with_unit(definition.unit);

        match tokio::time::timeout(self.config.query_timeout, self.metrics.statistics(&query)).await {
            Ok(Ok(buckets)) => buckets.first().map(|b| b.value),
            Ok(Err(e)) => {
                tracing::warn!(arn = %definition.arn, error = %e, "Metric query failed, period treated as missing");
                None
            }
            Err(_) => {
                tracing::warn!(
                    arn = %definition.arn,
                    timeout_ms = self.config.query_timeout.as_millis() as u64,
                    "Metric query timed out, period treated as missing"
                );
                None
            }
        }
    }

    /// Publish the transition and fire the matching actions. Deliveries run
    /// detached; failures are only logged.
    fn announce(&self, definition: &AlarmDefinition, transition: &AlarmTransition) {
        tracing::info!(
            arn = %transition.alarm_arn,
            old_state = %transition.old_state,
            new_state = %transition.new_state,
            "Alarm state changed"
        );
        self.bus.publish(MonitoringEvent::state_changed(transition));

        if !definition.actions_enabled {
            return;
        }
        for target in definition.actions.for_state(transition.new_state) {
            let notifier = Arc::clone(&self.notifier);
            let target = target.clone();
            let transition = transition.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&target, &transition).await {
                    tracing::warn!(
                        arn = %transition.alarm_arn,
                        target = %target,
                        error = %e,
                        "Alarm action delivery failed"
                    );
                }
            });
        }
    }
}

/// Whether a value queried for `a` is still meaningful for `b`.
fn same_query(a: &AlarmDefinition, b: &AlarmDefinition) -> bool {
    a.metric == b.metric
        && a.unit == b.unit
        && a.statistic == b.statistic
        && a.period_secs == b.period_secs
}

fn transition(
    definition: &AlarmDefinition,
    old_state: AlarmState,
    runtime: &AlarmRuntimeState,
) -> AlarmTransition {
    AlarmTransition {
        alarm_arn: definition.arn.clone(),
        alarm_name: definition.name.clone(),
        account_id: definition.context().account_id.clone(),
        region: definition.context().region.clone(),
        old_state,
        new_state: runtime.state,
        reason: runtime.reason.clone(),
        reason_data: runtime.reason_data.clone(),
        timestamp: runtime.state_updated_at,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;
    use metricwatch_core::alarm::{MissingDataPolicy, OutcomeKind};
    use metricwatch_core::metric::Datapoint;
    use metricwatch_events::{DeliveryError, EVENT_ALARM_STATE_CHANGED};
    use metricwatch_store::{MetricStore, StatisticBucket, StoreSource};
    use tokio::sync::{mpsc, Notify};

    use super::*;
    use crate::registry::InMemoryAlarmRegistry;
    use crate::test_support::definition;

    const OPS_TOPIC: &str = "arn:aws:sns:us-east-1:000000000000:ops";

    struct RecordingNotifier {
        tx: mpsc::UnboundedSender<(String, AlarmTransition)>,
    }

    #[async_trait]
    impl ActionNotifier for RecordingNotifier {
        async fn notify(&self, target: &str, transition: &AlarmTransition) -> Result<(), DeliveryError> {
            let _ = self.tx.send((target.to_string(), transition.clone()));
            Ok(())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl MetricSource for FailingSource {
        async fn statistics(&self, _: &StatisticQuery) -> Result<Vec<StatisticBucket>, CoreError> {
            Err(CoreError::Unavailable("store offline".into()))
        }
    }

    struct HangingSource;

    #[async_trait]
    impl MetricSource for HangingSource {
        async fn statistics(&self, _: &StatisticQuery) -> Result<Vec<StatisticBucket>, CoreError> {
            std::future::pending().await
        }
    }

    /// Parks every query until released, then answers with `value`.
    struct GatedSource {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        value: f64,
    }

    #[async_trait]
    impl MetricSource for GatedSource {
        async fn statistics(&self, query: &StatisticQuery) -> Result<Vec<StatisticBucket>, CoreError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![StatisticBucket {
                timestamp: query.start,
                value: self.value,
            }])
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl MetricSource for PanickingSource {
        async fn statistics(&self, _: &StatisticQuery) -> Result<Vec<StatisticBucket>, CoreError> {
            panic!("store exploded")
        }
    }

    struct Harness {
        registry: Arc<InMemoryAlarmRegistry>,
        store: Arc<MetricStore>,
        bus: Arc<EventBus>,
        scheduler: AlarmScheduler,
        actions: mpsc::UnboundedReceiver<(String, AlarmTransition)>,
    }

    fn build(
        store: Arc<MetricStore>,
        metrics: Arc<dyn MetricSource>,
        config: SchedulerConfig,
    ) -> Harness {
        let registry = Arc::new(InMemoryAlarmRegistry::new());
        let bus = Arc::new(EventBus::default());
        let (tx, actions) = mpsc::unbounded_channel();
        let scheduler = AlarmScheduler::new(
            Arc::clone(&registry) as Arc<dyn AlarmRegistry>,
            metrics,
            Arc::new(RecordingNotifier { tx }),
            Arc::clone(&bus),
            config,
        );
        Harness {
            registry,
            store,
            bus,
            scheduler,
            actions,
        }
    }

    fn harness() -> Harness {
        let store = Arc::new(MetricStore::new());
        build(
            Arc::clone(&store),
            Arc::new(StoreSource::new(store)),
            SchedulerConfig::default(),
        )
    }

    fn harness_with(source: Arc<dyn MetricSource>) -> Harness {
        build(Arc::new(MetricStore::new()), source, SchedulerConfig::default())
    }

    fn at(minute: u32, second: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 1, 1, 10, minute, second).unwrap()
    }

    fn put(h: &Harness, def: &AlarmDefinition, minute: u32, value: f64) {
        h.store
            .put(&def.metric, Datapoint::single(at(minute, 30), value))
            .unwrap();
    }

    async fn runtime(h: &Harness, arn: &str) -> AlarmRuntimeState {
        h.registry.get(arn).await.unwrap().unwrap().runtime
    }

    #[tokio::test]
    async fn breaching_periods_raise_alarm_and_fire_actions() {
        let mut h = harness();
        let mut events = h.bus.subscribe();
        let mut def = definition("cpu", 3, 2);
        def.actions.alarm = vec![OPS_TOPIC.to_string()];
        def.actions.ok = vec!["https://example.invalid/ok".to_string()];
        let arn = def.arn.clone();
        h.registry.put_alarm(def.clone()).await.unwrap();

        put(&h, &def, 0, 80.0);
        put(&h, &def, 1, 90.0);
        put(&h, &def, 2, 20.0);

        // Two breaching periods are not enough until N periods were seen.
        assert_eq!(h.scheduler.tick_at(&arn, at(1, 5)).await.unwrap(), None);
        assert_eq!(h.scheduler.tick_at(&arn, at(2, 5)).await.unwrap(), None);
        assert_eq!(runtime(&h, &arn).await.state, AlarmState::InsufficientData);

        let transition = h
            .scheduler
            .tick_at(&arn, at(3, 5))
            .await
            .unwrap()
            .expect("a full window with two breaching periods should raise the alarm");
        assert_eq!(transition.old_state, AlarmState::InsufficientData);
        assert_eq!(transition.new_state, AlarmState::Alarm);

        let stored = runtime(&h, &arn).await;
        assert_eq!(stored.state, AlarmState::Alarm);
        assert_eq!(stored.state_updated_at, at(3, 5));
        assert!(stored.reason.starts_with("Threshold Crossed"));

        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type, EVENT_ALARM_STATE_CHANGED);

        let (target, fired) = tokio::time::timeout(Duration::from_secs(1), h.actions.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target, OPS_TOPIC);
        assert_eq!(fired.new_state, AlarmState::Alarm);
    }

    #[tokio::test]
    async fn unchanged_state_keeps_reason_and_fires_nothing() {
        let mut h = harness();
        let mut def = definition("cpu", 1, 1);
        def.actions.ok = vec![OPS_TOPIC.to_string()];
        let arn = def.arn.clone();
        h.registry.put_alarm(def.clone()).await.unwrap();
        put(&h, &def, 0, 10.0);
        put(&h, &def, 1, 20.0);

        assert!(h.scheduler.tick_at(&arn, at(1, 5)).await.unwrap().is_some());
        let first = runtime(&h, &arn).await;
        let _ = h.actions.recv().await;

        assert_eq!(h.scheduler.tick_at(&arn, at(2, 5)).await.unwrap(), None);
        let second = runtime(&h, &arn).await;
        assert_eq!(second.state, AlarmState::Ok);
        assert_eq!(second.reason, first.reason);
        assert_eq!(second.state_updated_at, first.state_updated_at);
        assert_eq!(second.last_evaluated_at, Some(at(2, 5)));
        assert!(h.actions.try_recv().is_err());
    }

    #[tokio::test]
    async fn disabled_actions_still_publish_the_transition() {
        let mut h = harness();
        let mut events = h.bus.subscribe();
        let mut def = definition("cpu", 1, 1);
        def.actions_enabled = false;
        def.actions.alarm = vec![OPS_TOPIC.to_string()];
        let arn = def.arn.clone();
        h.registry.put_alarm(def.clone()).await.unwrap();
        put(&h, &def, 0, 99.0);

        assert!(h.scheduler.tick_at(&arn, at(1, 5)).await.unwrap().is_some());
        assert_eq!(events.recv().await.unwrap().event_type, EVENT_ALARM_STATE_CHANGED);
        tokio::task::yield_now().await;
        assert!(h.actions.try_recv().is_err());
    }

    #[tokio::test]
    async fn ignored_periods_extend_the_window() {
        let h = harness();
        let mut def = definition("cpu", 2, 2);
        def.treat_missing_data = MissingDataPolicy::Ignore;
        let arn = def.arn.clone();
        h.registry.put_alarm(def.clone()).await.unwrap();

        put(&h, &def, 1, 10.0);
        put(&h, &def, 3, 20.0);

        for minute in 1..=4 {
            h.scheduler.tick_at(&arn, at(minute, 5)).await.unwrap();
        }

        let state = runtime(&h, &arn).await;
        assert_eq!(state.recent_outcomes.len(), 2);
        assert!(state
            .recent_outcomes
            .iter()
            .all(|o| o.kind == OutcomeKind::NotBreaching));
        assert_eq!(state.state, AlarmState::Ok);
    }

    #[tokio::test]
    async fn restart_continues_from_persisted_history() {
        let values = [10.0, 80.0, 90.0];

        // Uninterrupted run.
        let continuous = harness();
        let def = definition("cpu", 3, 2);
        let arn = def.arn.clone();
        continuous.registry.put_alarm(def.clone()).await.unwrap();
        for (minute, value) in values.iter().enumerate() {
            put(&continuous, &def, minute as u32, *value);
        }
        for minute in 1..=3 {
            continuous.scheduler.tick_at(&arn, at(minute, 5)).await.unwrap();
        }
        let expected = runtime(&continuous, &arn).await;
        assert_eq!(expected.state, AlarmState::Alarm);

        // Same run with a restart after two ticks.
        let before = harness();
        before.registry.put_alarm(def.clone()).await.unwrap();
        for (minute, value) in values.iter().enumerate() {
            put(&before, &def, minute as u32, *value);
        }
        for minute in 1..=2 {
            before.scheduler.tick_at(&arn, at(minute, 5)).await.unwrap();
        }
        let persisted =
            serde_json::to_string(&before.registry.list_all().await.unwrap()).unwrap();
        before.scheduler.shutdown().await;

        let after = harness();
        for (minute, value) in values.iter().enumerate() {
            put(&after, &def, minute as u32, *value);
        }
        after
            .registry
            .restore(serde_json::from_str(&persisted).unwrap())
            .await
            .unwrap();
        assert_eq!(after.scheduler.restart_existing_alarms().await.unwrap(), 1);
        assert!(after.scheduler.is_scheduled(&arn).await);

        after.scheduler.tick_at(&arn, at(3, 5)).await.unwrap();
        let resumed = runtime(&after, &arn).await;
        assert_eq!(resumed.state, expected.state);
        assert_eq!(resumed.recent_outcomes, expected.recent_outcomes);

        after.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn failed_query_counts_as_missing() {
        let h = harness_with(Arc::new(FailingSource));
        let def = definition("cpu", 1, 1);
        let arn = def.arn.clone();
        h.registry.put_alarm(def).await.unwrap();

        h.scheduler.tick_at(&arn, at(1, 5)).await.unwrap();
        let state = runtime(&h, &arn).await;
        assert_eq!(state.recent_outcomes.len(), 1);
        assert_eq!(state.recent_outcomes[0].kind, OutcomeKind::Missing);
        assert_eq!(state.state, AlarmState::InsufficientData);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_query_times_out_as_missing() {
        let h = harness_with(Arc::new(HangingSource));
        let mut def = definition("cpu", 1, 1);
        def.treat_missing_data = MissingDataPolicy::Breaching;
        let arn = def.arn.clone();
        h.registry.put_alarm(def).await.unwrap();

        let transition = h.scheduler.tick_at(&arn, at(1, 5)).await.unwrap();
        assert_eq!(transition.map(|t| t.new_state), Some(AlarmState::Alarm));
        let state = runtime(&h, &arn).await;
        assert_eq!(state.recent_outcomes[0].kind, OutcomeKind::Breaching);
        assert_eq!(state.recent_outcomes[0].value, None);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_fires_one_period_after_arming() {
        let h = harness();
        let def = definition("cpu", 1, 1);
        let arn = def.arn.clone();
        h.registry.put_alarm(def.clone()).await.unwrap();
        h.scheduler.start(&def).await;

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(runtime(&h, &arn).await.last_evaluated_at, None);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(runtime(&h, &arn).await.last_evaluated_at.is_some());

        h.scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_tick_does_not_kill_the_job() {
        let h = harness_with(Arc::new(PanickingSource));
        let def = definition("cpu", 1, 1);
        let arn = def.arn.clone();
        h.registry.put_alarm(def.clone()).await.unwrap();
        h.scheduler.start(&def).await;

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert!(h.scheduler.is_scheduled(&arn).await);
        assert_eq!(runtime(&h, &arn).await.last_evaluated_at, None);

        h.scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn job_stops_once_alarm_is_gone() {
        let h = harness();
        let def = definition("cpu", 1, 1);
        let arn = def.arn.clone();
        h.registry.put_alarm(def.clone()).await.unwrap();
        h.scheduler.start(&def).await;
        h.registry.remove(&arn).await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!h.scheduler.is_scheduled(&arn).await);
    }

    #[tokio::test]
    async fn rearming_replaces_the_job() {
        let h = harness();
        let mut def = definition("cpu", 1, 1);
        h.scheduler.start(&def).await;
        def.period_secs = 120;
        h.scheduler.start(&def).await;

        assert_eq!(h.scheduler.active_jobs().await, vec![def.arn.clone()]);
        assert_eq!(
            h.scheduler.scheduled_period(&def.arn).await,
            Some(Duration::from_secs(120))
        );
        h.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn delete_twice_is_a_noop() {
        let h = harness();
        let def = definition("cpu", 1, 1);
        h.scheduler.start(&def).await;

        assert!(h.scheduler.delete(&def.arn).await);
        assert!(!h.scheduler.delete(&def.arn).await);
        assert!(!h.scheduler.is_scheduled(&def.arn).await);
    }

    #[tokio::test]
    async fn shutdown_cancels_everything_and_refuses_new_jobs() {
        let h = harness();
        h.scheduler.start(&definition("a", 1, 1)).await;
        h.scheduler.start(&definition("b", 1, 1)).await;
        assert_eq!(h.scheduler.active_jobs().await.len(), 2);

        h.scheduler.shutdown().await;
        assert!(h.scheduler.active_jobs().await.is_empty());

        let late = definition("c", 1, 1);
        h.scheduler.start(&late).await;
        assert!(!h.scheduler.is_scheduled(&late.arn).await);
    }

    #[tokio::test]
    async fn cancel_all_keeps_scheduler_usable() {
        let h = harness();
        h.scheduler.start(&definition("a", 1, 1)).await;
        assert_eq!(h.scheduler.cancel_all().await, 1);

        let next = definition("b", 1, 1);
        h.scheduler.start(&next).await;
        assert!(h.scheduler.is_scheduled(&next.arn).await);
        h.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn manual_state_change_fires_actions_once() {
        let mut h = harness();
        let mut def = definition("cpu", 1, 1);
        def.actions.alarm = vec![OPS_TOPIC.to_string()];
        let arn = def.arn.clone();
        h.registry.put_alarm(def).await.unwrap();

        let first = h
            .scheduler
            .set_state(&arn, AlarmState::Alarm, "testing".into(), None)
            .await
            .unwrap();
        assert!(first.is_some());
        let (target, _) = h.actions.recv().await.unwrap();
        assert_eq!(target, OPS_TOPIC);

        let second = h
            .scheduler
            .set_state(&arn, AlarmState::Alarm, "again".into(), None)
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(runtime(&h, &arn).await.reason, "again");
    }

    fn gated(value: f64) -> (Harness, Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let h = harness_with(Arc::new(GatedSource {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
            value,
        }));
        (h, entered, release)
    }

    #[tokio::test]
    async fn manual_state_set_during_a_tick_is_kept() {
        let (h, entered, release) = gated(80.0);
        let mut events = h.bus.subscribe();
        let def = definition("cpu", 1, 1);
        let arn = def.arn.clone();
        h.registry.put_alarm(def).await.unwrap();

        let operator = async {
            entered.notified().await;
            let changed = h
                .scheduler
                .set_state(&arn, AlarmState::Alarm, "operator override".into(), None)
                .await
                .unwrap();
            release.notify_one();
            changed
        };
        let (ticked, manual) = tokio::join!(h.scheduler.tick_at(&arn, at(1, 5)), operator);

        assert_eq!(manual.map(|t| t.new_state), Some(AlarmState::Alarm));
        assert_eq!(ticked.unwrap(), None);

        let stored = runtime(&h, &arn).await;
        assert_eq!(stored.state, AlarmState::Alarm);
        assert_eq!(stored.reason, "operator override");
        assert_eq!(stored.recent_outcomes.len(), 1);
        assert_eq!(stored.last_evaluated_at, Some(at(1, 5)));

        assert_eq!(events.recv().await.unwrap().event_type, EVENT_ALARM_STATE_CHANGED);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn tick_after_manual_state_reports_its_own_transition() {
        let (h, entered, release) = gated(10.0);
        let def = definition("cpu", 1, 1);
        let arn = def.arn.clone();
        h.registry.put_alarm(def).await.unwrap();

        let operator = async {
            entered.notified().await;
            h.scheduler
                .set_state(&arn, AlarmState::Alarm, "operator override".into(), None)
                .await
                .unwrap();
            release.notify_one();
        };
        let (ticked, ()) = tokio::join!(h.scheduler.tick_at(&arn, at(1, 5)), operator);

        let transition = ticked.unwrap().expect("evaluation should leave the manual state");
        assert_eq!(transition.old_state, AlarmState::Alarm);
        assert_eq!(transition.new_state, AlarmState::Ok);
        assert_eq!(runtime(&h, &arn).await.state, AlarmState::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_returns_after_the_tick_in_flight() {
        let (h, entered, release) = gated(80.0);
        let def = definition("cpu", 1, 1);
        let arn = def.arn.clone();
        h.registry.put_alarm(def.clone()).await.unwrap();
        h.scheduler.start(&def).await;

        entered.notified().await;
        let releaser = async {
            tokio::task::yield_now().await;
            release.notify_one();
        };
        let (cancelled, ()) = tokio::join!(h.scheduler.cancel_all(), releaser);

        assert_eq!(cancelled, 1);
        let stored = runtime(&h, &arn).await;
        assert_eq!(stored.state, AlarmState::Alarm);
        assert!(stored.last_evaluated_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_all_jobs_under_one_grace_period() {
        let config = SchedulerConfig {
            query_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        };
        let h = build(Arc::new(MetricStore::new()), Arc::new(HangingSource), config);
        for name in ["a", "b", "c"] {
            let def = definition(name, 1, 1);
            h.registry.put_alarm(def.clone()).await.unwrap();
            h.scheduler.start(&def).await;
        }

        // Every job is now parked inside a tick.
        tokio::time::sleep(Duration::from_secs(61)).await;

        let started = Instant::now();
        h.scheduler.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(h.scheduler.active_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_alarm_is_not_found() {
        let h = harness();
        let err = h.scheduler.tick("arn:missing").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
