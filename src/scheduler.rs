//! # Job Scheduler
//!
//! Owns the registered maintenance jobs and fires each one on its trigger.
//! Every run executes on its own task; a run that errors or panics is logged
//! and reported without disturbing the loop or other jobs.
//!
//! A job never overlaps with itself. A firing that finds the previous run
//! still in flight is dropped rather than queued, and there is no in-process
//! retry: the next firing is the retry.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::jobs::{Job, JobContext, JobError, JobReport, TriggerSource};
use crate::trigger::{Clock, Trigger};

/// Upper bound on a single idle wait so clock adjustments are noticed.
const MAX_IDLE_WAIT: StdDuration = StdDuration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("job {0} is already registered")]
    DuplicateJob(String),
    #[error("no job named {0}")]
    UnknownJob(String),
    #[error("job {0} is already running")]
    AlreadyRunning(String),
}

/// Record of one finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct JobOutcome {
    pub job: String,
    pub run_id: Uuid,
    pub triggered_by: TriggerSource,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub items_processed: u64,
    pub items_affected: u64,
    pub items_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    fn status(&self) -> &'static str {
        if self.succeeded() { "success" } else { "failure" }
    }
}

/// Receives every finished run.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: &JobOutcome);
}

/// Logs outcomes and feeds the run metrics.
#[derive(Debug, Default)]
pub struct TracingOutcomeSink;

impl OutcomeSink for TracingOutcomeSink {
    fn record(&self, outcome: &JobOutcome) {
        counter!("job_runs_total", "job" => outcome.job.clone(), "status" => outcome.status())
            .increment(1);
        histogram!("job_run_duration_ms", "job" => outcome.job.clone())
            .record(outcome.duration_ms as f64);

        match &outcome.error {
            None => info!(
                job = %outcome.job,
                run_id = %outcome.run_id,
                triggered_by = %outcome.triggered_by,
                duration_ms = outcome.duration_ms,
                processed = outcome.items_processed,
                affected = outcome.items_affected,
                failed = outcome.items_failed,
                "Job run succeeded"
            ),
            Some(err) => error!(
                job = %outcome.job,
                run_id = %outcome.run_id,
                triggered_by = %outcome.triggered_by,
                duration_ms = outcome.duration_ms,
                error = %err,
                "Job run failed"
            ),
        }
    }
}

/// Keeps the latest outcome per job in memory for the operator API.
#[derive(Debug, Default)]
pub struct OutcomeLog {
    last: RwLock<HashMap<String, JobOutcome>>,
}

impl OutcomeLog {
    pub fn last(&self, job: &str) -> Option<JobOutcome> {
        self.last
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job)
            .cloned()
    }
}

impl OutcomeSink for OutcomeLog {
    fn record(&self, outcome: &JobOutcome) {
        self.last
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(outcome.job.clone(), outcome.clone());
    }
}

/// Registry entry, shared with in-flight runs.
struct RegisteredJob {
    job: Arc<dyn Job>,
    trigger: Trigger,
    enabled: bool,
    running: AtomicBool,
}

/// Operator view of one registered job.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobSummary {
    pub name: String,
    pub description: String,
    /// Trigger in configuration syntax, e.g. `every 30m`
    pub trigger: String,
    pub enabled: bool,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<JobOutcome>,
}

/// A dispatched run.
pub struct RunHandle {
    pub run_id: Uuid,
    join: JoinHandle<JobOutcome>,
}

impl RunHandle {
    /// Wait for the run to finish.
    pub async fn outcome(self) -> Option<JobOutcome> {
        self.join.await.ok()
    }
}

pub struct JobScheduler {
    jobs: BTreeMap<String, Arc<RegisteredJob>>,
    clock: Arc<dyn Clock>,
    sinks: Vec<Arc<dyn OutcomeSink>>,
    outcomes: Arc<OutcomeLog>,
    tracker: TaskTracker,
}

impl JobScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let outcomes = Arc::new(OutcomeLog::default());
        Self {
            jobs: BTreeMap::new(),
            clock,
            sinks: vec![Arc::new(TracingOutcomeSink), outcomes.clone()],
            outcomes,
            tracker: TaskTracker::new(),
        }
    }

    /// Add a further outcome sink.
    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Register a job. Names must be unique.
    pub fn register(
        &mut self,
        job: Arc<dyn Job>,
        trigger: Trigger,
        enabled: bool,
    ) -> Result<(), SchedulerError> {
        let name = job.name().to_string();
        if self.jobs.contains_key(&name) {
            return Err(SchedulerError::DuplicateJob(name));
        }

        info!(job = %name, trigger = %trigger, enabled, "Registered job");
        self.jobs.insert(
            name,
            Arc::new(RegisteredJob {
                job,
                trigger,
                enabled,
                running: AtomicBool::new(false),
            }),
        );
        gauge!("scheduler_registered_jobs").set(self.jobs.len() as f64);
        Ok(())
    }

    pub fn outcomes(&self) -> &OutcomeLog {
        &self.outcomes
    }

    pub fn is_running(&self, name: &str) -> Result<bool, SchedulerError> {
        self.jobs
            .get(name)
            .map(|entry| entry.running.load(Ordering::SeqCst))
            .ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))
    }

    /// Registered jobs in name order.
    pub fn jobs(&self) -> Vec<JobSummary> {
        let now = self.clock.now();
        self.jobs
            .iter()
            .map(|(name, entry)| JobSummary {
                name: name.clone(),
                description: entry.job.description().to_string(),
                trigger: entry.trigger.to_string(),
                enabled: entry.enabled,
                running: entry.running.load(Ordering::SeqCst),
                next_run_at: entry
                    .enabled
                    .then(|| entry.trigger.next_after(now))
                    .flatten(),
                last_outcome: self.outcomes.last(name),
            })
            .collect()
    }

    /// Run a job now, outside its schedule. Disabled jobs may be run this way.
    pub fn trigger_now(&self, name: &str) -> Result<RunHandle, SchedulerError> {
        let entry = self
            .jobs
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))?;
        self.dispatch(entry, TriggerSource::Manual)
    }

    fn dispatch(
        &self,
        entry: &Arc<RegisteredJob>,
        source: TriggerSource,
    ) -> Result<RunHandle, SchedulerError> {
        let name = entry.job.name().to_string();
        if entry
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(job = %name, triggered_by = %source, "Previous run still in flight, dropping firing");
            counter!("job_firings_dropped_total", "job" => name.clone()).increment(1);
            return Err(SchedulerError::AlreadyRunning(name));
        }

        let ctx = JobContext::new(source, self.clock.now());
        let run_id = ctx.run_id;
        let entry = Arc::clone(entry);
        let sinks = self.sinks.clone();

        let join = self.tracker.spawn(async move {
            let _running = scopeguard::guard(&entry.running, |flag| {
                flag.store(false, Ordering::SeqCst);
            });

            debug!(job = %name, run_id = %ctx.run_id, triggered_by = %ctx.triggered_by, "Job run starting");
            let started = Instant::now();
            let result = execute(Arc::clone(&entry.job), ctx.clone()).await;
            let outcome = outcome_for(&name, &ctx, started.elapsed(), result);

            for sink in &sinks {
                sink.record(&outcome);
            }
            outcome
        });

        Ok(RunHandle { run_id, join })
    }

    /// Drive all enabled jobs until `shutdown` fires, then wait for in-flight runs.
    #[instrument(skip_all)]
    pub async fn run_forever(&self, shutdown: CancellationToken) {
        let start = self.clock.now();
        let mut next_due: BTreeMap<&str, DateTime<Utc>> = self
            .jobs
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .filter_map(|(name, entry)| {
                entry
                    .trigger
                    .next_after(start)
                    .map(|due| (name.as_str(), due))
            })
            .collect();

        info!(scheduled = next_due.len(), "Job scheduler started");

        loop {
            let wait = next_due
                .values()
                .min()
                .map(|due| (*due - self.clock.now()).to_std().unwrap_or(StdDuration::ZERO))
                .unwrap_or(MAX_IDLE_WAIT)
                .min(MAX_IDLE_WAIT);

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Job scheduler shutdown requested");
                    break;
                }
                _ = sleep(wait) => {}
            }

            let now = self.clock.now();
            let due: Vec<&str> = next_due
                .iter()
                .filter(|(_, at)| **at <= now)
                .map(|(name, _)| *name)
                .collect();

            for name in due {
                let Some(entry) = self.jobs.get(name) else {
                    continue;
                };
                // Overlaps are logged and counted inside dispatch.
                let _ = self.dispatch(entry, TriggerSource::Schedule);

                match entry.trigger.next_after(now) {
                    Some(next) => {
                        next_due.insert(name, next);
                    }
                    None => {
                        warn!(job = name, "Trigger has no further firings");
                        next_due.remove(name);
                    }
                }
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        info!("Job scheduler stopped");
    }

    /// Spawn the loop on its own task.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let join = tokio::spawn(async move { self.run_forever(loop_token).await });
        SchedulerHandle { token, join }
    }
}

/// Lifecycle handle returned by [`JobScheduler::start`].
pub struct SchedulerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop firing and wait for in-flight runs to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.join.await {
            error!(error = %err, "Job scheduler task ended abnormally");
        }
    }
}

/// Run the job on a separate task so a panic surfaces as a `JoinError`.
async fn execute(job: Arc<dyn Job>, ctx: JobContext) -> Result<JobReport, JobError> {
    let handle = tokio::spawn(async move { job.run(&ctx).await });
    match handle.await {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            let payload = err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(JobError::Panicked(message))
        }
        Err(err) => Err(JobError::Failed {
            message: err.to_string(),
        }),
    }
}

fn outcome_for(
    name: &str,
    ctx: &JobContext,
    elapsed: StdDuration,
    result: Result<JobReport, JobError>,
) -> JobOutcome {
    let (report, error) = match result {
        Ok(report) => (report, None),
        Err(err) => (JobReport::default(), Some(err.to_string())),
    };
    JobOutcome {
        job: name.to_string(),
        run_id: ctx.run_id,
        triggered_by: ctx.triggered_by,
        started_at: ctx.started_at,
        duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        items_processed: report.items_processed,
        items_affected: report.items_affected,
        items_failed: report.items_failed,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::SystemClock;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    struct CountingJob {
        name: &'static str,
        runs: AtomicU32,
        delay: StdDuration,
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "counts runs"
        }
        async fn run(&self, _ctx: &JobContext) -> Result<JobReport, JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(JobReport {
                items_processed: 1,
                ..JobReport::default()
            })
        }
    }

    struct PanickingJob;

    #[async_trait]
    impl Job for PanickingJob {
        fn name(&self) -> &str {
            "panics"
        }
        fn description(&self) -> &str {
            "always panics"
        }
        async fn run(&self, _ctx: &JobContext) -> Result<JobReport, JobError> {
            panic!("boom")
        }
    }

    #[derive(Default)]
    struct FailingJob {
        runs: AtomicU32,
    }

    #[async_trait]
    impl Job for FailingJob {
        fn name(&self) -> &str {
            "fails"
        }
        fn description(&self) -> &str {
            "always errors"
        }
        async fn run(&self, _ctx: &JobContext) -> Result<JobReport, JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Err(JobError::Failed {
                message: "disk full".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<JobOutcome>>);

    impl CollectingSink {
        fn for_job(&self, name: &str) -> Vec<JobOutcome> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|o| o.job == name)
                .cloned()
                .collect()
        }
    }

    impl OutcomeSink for CollectingSink {
        fn record(&self, outcome: &JobOutcome) {
            self.0.lock().unwrap().push(outcome.clone());
        }
    }

    fn counting(name: &'static str, delay_ms: u64) -> Arc<CountingJob> {
        Arc::new(CountingJob {
            name,
            runs: AtomicU32::new(0),
            delay: StdDuration::from_millis(delay_ms),
        })
    }

    fn hourly() -> Trigger {
        Trigger::Interval(StdDuration::from_secs(3600))
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut scheduler = JobScheduler::new(Arc::new(SystemClock));
        scheduler
            .register(counting("a", 0), hourly(), true)
            .unwrap();
        let err = scheduler
            .register(counting("a", 0), hourly(), true)
            .unwrap_err();
        assert_eq!(err, SchedulerError::DuplicateJob("a".into()));
    }

    #[tokio::test]
    async fn unknown_job_cannot_be_triggered() {
        let scheduler = JobScheduler::new(Arc::new(SystemClock));
        assert!(matches!(
            scheduler.trigger_now("nope"),
            Err(SchedulerError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn overlapping_trigger_is_dropped() {
        let job = counting("slow", 200);
        let mut scheduler = JobScheduler::new(Arc::new(SystemClock));
        scheduler.register(job.clone(), hourly(), true).unwrap();

        let first = scheduler.trigger_now("slow").unwrap();
        assert_eq!(
            scheduler.trigger_now("slow").err(),
            Some(SchedulerError::AlreadyRunning("slow".into()))
        );

        let outcome = first.outcome().await.unwrap();
        assert!(outcome.succeeded());
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running("slow").unwrap());

        // The flag is released, so a later trigger runs again.
        scheduler.trigger_now("slow").unwrap().outcome().await.unwrap();
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panic_is_reported_and_flag_released() {
        let sink = Arc::new(CollectingSink::default());
        let mut scheduler = JobScheduler::new(Arc::new(SystemClock)).with_sink(sink.clone());
        scheduler
            .register(Arc::new(PanickingJob), hourly(), true)
            .unwrap();

        let outcome = scheduler.trigger_now("panics").unwrap().outcome().await.unwrap();

        assert!(!outcome.succeeded());
        assert!(outcome.error.as_deref().unwrap().contains("boom"));
        assert_eq!(outcome.triggered_by, TriggerSource::Manual);
        assert!(!scheduler.is_running("panics").unwrap());
        assert_eq!(sink.0.lock().unwrap().len(), 1);
        assert_eq!(
            scheduler.outcomes().last("panics").unwrap().run_id,
            outcome.run_id
        );
    }

    #[tokio::test]
    async fn loop_fires_enabled_jobs_and_skips_disabled() {
        let fast = counting("fast", 0);
        let disabled = counting("disabled", 0);
        let mut scheduler = JobScheduler::new(Arc::new(SystemClock));
        scheduler
            .register(
                fast.clone(),
                Trigger::Interval(StdDuration::from_millis(20)),
                true,
            )
            .unwrap();
        scheduler
            .register(
                disabled.clone(),
                Trigger::Interval(StdDuration::from_millis(20)),
                false,
            )
            .unwrap();

        let handle = Arc::new(scheduler).start();
        tokio::time::sleep(StdDuration::from_millis(200)).await;
        handle.stop().await;

        assert!(fast.runs.load(Ordering::SeqCst) >= 2);
        assert_eq!(disabled.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn loop_keeps_firing_after_failures() {
        let every_20ms = || Trigger::Interval(StdDuration::from_millis(20));
        let failing = Arc::new(FailingJob::default());
        let healthy = counting("healthy", 0);
        let sink = Arc::new(CollectingSink::default());

        let mut scheduler = JobScheduler::new(Arc::new(SystemClock)).with_sink(sink.clone());
        scheduler.register(failing.clone(), every_20ms(), true).unwrap();
        scheduler.register(Arc::new(PanickingJob), every_20ms(), true).unwrap();
        scheduler.register(healthy.clone(), every_20ms(), true).unwrap();

        let handle = Arc::new(scheduler).start();
        tokio::time::sleep(StdDuration::from_millis(250)).await;
        handle.stop().await;

        assert!(failing.runs.load(Ordering::SeqCst) >= 2);
        assert!(healthy.runs.load(Ordering::SeqCst) >= 2);

        let failures = sink.for_job("fails");
        assert!(failures.len() >= 2);
        assert!(failures.iter().all(|o| !o.succeeded()
            && o.error.as_deref().is_some_and(|e| e.contains("disk full"))));

        let panics = sink.for_job("panics");
        assert!(panics.len() >= 2);
        assert!(panics.iter().all(|o| !o.succeeded()));

        let healthy_runs = sink.for_job("healthy");
        assert!(healthy_runs.len() >= 2);
        assert!(healthy_runs.iter().all(|o| o.succeeded()
            && o.triggered_by == TriggerSource::Schedule));
    }

    #[tokio::test]
    async fn loop_drops_firings_while_run_in_flight() {
        let slow = counting("slow", 300);
        let mut scheduler = JobScheduler::new(Arc::new(SystemClock));
        scheduler
            .register(
                slow.clone(),
                Trigger::Interval(StdDuration::from_millis(20)),
                true,
            )
            .unwrap();

        let handle = Arc::new(scheduler).start();
        tokio::time::sleep(StdDuration::from_millis(150)).await;
        handle.stop().await;

        // Several firings fell inside the first run; only that run happened.
        assert_eq!(slow.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn summaries_list_jobs_in_name_order() {
        let mut scheduler = JobScheduler::new(Arc::new(SystemClock));
        scheduler.register(counting("b", 0), hourly(), true).unwrap();
        scheduler.register(counting("a", 0), hourly(), false).unwrap();

        let jobs = scheduler.jobs();
        assert_eq!(jobs[0].name, "a");
        assert!(jobs[0].next_run_at.is_none());
        assert_eq!(jobs[1].name, "b");
        assert!(jobs[1].next_run_at.is_some());
        assert_eq!(jobs[1].trigger, "every 1h");
    }
}
