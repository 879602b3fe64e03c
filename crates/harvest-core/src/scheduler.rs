//! Single-job polling loop.
//!
//! The loop owns the job slot. Selection and execution run on a spawned task
//! that reports its progress back over a channel; the loop is the only place
//! the slot state is read or written.
use std::{sync::Arc, time::Duration};

use harvest_model::{JobOutcome, Task, TaskId};
use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, watch},
    task::{JoinError, JoinHandle},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, trace, warn};

use crate::{
    api::{BatchUploader, ControlPlane, RecordSource},
    backoff::BackoffPolicy,
    batch::{BatchConfig, Batcher},
    error::ControlPlaneError,
    heartbeat::HeartbeatMonitor,
    ingest::Ingestor,
    select::select_due,
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Poll / heartbeat interval.
    pub tick: Duration,
    pub batch: BatchConfig,
    pub backoff: BackoffPolicy,
    /// Value of `meta.type` in ingest envelopes.
    pub source_type: String,
    /// How long a cancelled job may take to report its end.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            batch: BatchConfig::default(),
            backoff: BackoffPolicy::default(),
            source_type: "azure".to_string(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Job slot state as seen by the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    /// A selection unit is fetching and starting a task.
    Selecting,
    /// A task holds the slot.
    Running,
    /// The running task is reporting its outcome.
    Reporting,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Selecting => "selecting",
            SchedulerState::Running => "running",
            SchedulerState::Reporting => "reporting",
        }
    }
}

/// Point-in-time view of the loop, published on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub state: SchedulerState,
    pub task: Option<TaskId>,
    pub started_at: Option<OffsetDateTime>,
    pub jobs_completed: u64,
    pub jobs_degraded: u64,
}

/// Progress messages from the job unit to the loop.
#[derive(Debug)]
enum JobEvent {
    /// No task was started; the slot is free again.
    Deferred,
    Started {
        task: TaskId,
        at: OffsetDateTime,
    },
    Reporting,
    Finished {
        outcome: JobOutcome,
    },
}

/// Everything a job unit needs, cloned into each spawned unit.
#[derive(Clone)]
struct JobContext {
    control_plane: Arc<dyn ControlPlane>,
    source: Arc<dyn RecordSource>,
    ingestor: Ingestor,
    batch: BatchConfig,
    shutdown_grace: Duration,
}

pub struct Scheduler {
    job: JobContext,
    heartbeat: HeartbeatMonitor,
    tick: Duration,
    span: Span,
    snapshot_tx: watch::Sender<SchedulerSnapshot>,
}

impl Scheduler {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        source: Arc<dyn RecordSource>,
        uploader: Arc<dyn BatchUploader>,
        cfg: SchedulerConfig,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SchedulerSnapshot::default());
        let ingestor = Ingestor::new(uploader, cfg.source_type, cfg.backoff);

        Self {
            heartbeat: HeartbeatMonitor::new(Arc::clone(&control_plane), cfg.tick),
            job: JobContext {
                control_plane,
                source,
                ingestor,
                batch: cfg.batch,
                shutdown_grace: cfg.shutdown_grace,
            },
            tick: cfg.tick,
            span: info_span!("harvest.scheduler"),
            snapshot_tx,
        }
    }

    /// Run every event of the loop and its job units under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Receiver of loop snapshots.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Poll until `ctx` is cancelled.
    ///
    /// On cancellation an in-flight job is given `shutdown_grace` to report
    /// its end before this returns.
    pub async fn run(self, ctx: CancellationToken) {
        let span = self.span.clone();
        self.run_loop(ctx).instrument(span).await
    }

    async fn run_loop(self, ctx: CancellationToken) {
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut snapshot = SchedulerSnapshot::default();
        let mut unit: Option<JoinHandle<()>> = None;

        info!(tick_ms = self.tick.as_millis() as u64, "waiting for tasks");
        loop {
            tokio::select! {
                biased;

                _ = ctx.cancelled() => break,
                Some(event) = events_rx.recv() => {
                    self.apply(&mut snapshot, event);
                }
                joined = join_unit(&mut unit), if unit.is_some() => {
                    unit = None;
                    if let Err(e) = joined {
                        self.recover(&mut snapshot, e, &ctx).await;
                    }
                }
                _ = ticker.tick() => match (snapshot.state, snapshot.task) {
                    (SchedulerState::Running, Some(task)) => {
                        self.heartbeat.beat(task, &ctx).await;
                    }
                    (SchedulerState::Idle, _) => {
                        trace!("checking for available collection tasks");
                        snapshot.state = SchedulerState::Selecting;
                        self.publish(&snapshot);

                        let job = self.job.clone();
                        let events = events_tx.clone();
                        let unit_ctx = ctx.clone();
                        unit = Some(tokio::spawn(
                            select_and_run(job, events, unit_ctx).instrument(Span::current()),
                        ));
                    }
                    (state, _) => trace!(state = state.as_str(), "job unit busy, skipping tick"),
                },
            }
        }

        info!("scheduler stopping");
        if let Some(handle) = unit {
            if !handle.is_finished() {
                info!("waiting for the current job to report its end");
            }
            let wait = self.job.shutdown_grace.saturating_mul(2);
            let joined = tokio::time::timeout(wait, handle).await;
            while let Ok(event) = events_rx.try_recv() {
                self.apply(&mut snapshot, event);
            }
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.recover(&mut snapshot, e, &ctx).await,
                Err(_) => warn!("job unit did not finish within the shutdown grace period"),
            }
        }
        while let Ok(event) = events_rx.try_recv() {
            self.apply(&mut snapshot, event);
        }
    }

    /// Release the slot after the job unit died without finishing.
    ///
    /// A task it had started is reported as ended with errors, best effort.
    async fn recover(&self, snapshot: &mut SchedulerSnapshot, err: JoinError, ctx: &CancellationToken) {
        error!(
            error = %err,
            state = snapshot.state.as_str(),
            task_id = ?snapshot.task,
            "job unit failed"
        );
        let Some(task) = snapshot.task else {
            self.apply(snapshot, JobEvent::Deferred);
            return;
        };

        let outcome = JobOutcome::with_errors(JobOutcome::FAILED_MESSAGE);
        if let Err(e) = report_end(&self.job, &outcome, ctx).await {
            error!(task_id = task, error = %e, "failed to end task");
        }
        self.apply(snapshot, JobEvent::Finished { outcome });
    }

    fn apply(&self, snapshot: &mut SchedulerSnapshot, event: JobEvent) {
        match event {
            JobEvent::Deferred => {
                snapshot.state = SchedulerState::Idle;
            }
            JobEvent::Started { task, at } => {
                snapshot.state = SchedulerState::Running;
                snapshot.task = Some(task);
                snapshot.started_at = Some(at);
            }
            JobEvent::Reporting => {
                snapshot.state = SchedulerState::Reporting;
            }
            JobEvent::Finished { outcome } => {
                snapshot.state = SchedulerState::Idle;
                snapshot.task = None;
                snapshot.started_at = None;
                snapshot.jobs_completed += 1;
                if !outcome.is_clean() {
                    snapshot.jobs_degraded += 1;
                }
            }
        }
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: &SchedulerSnapshot) {
        self.snapshot_tx.send_replace(snapshot.clone());
    }
}

/// Completion of the spawned job unit; never resolves while the slot is empty.
async fn join_unit(unit: &mut Option<JoinHandle<()>>) -> Result<(), JoinError> {
    match unit {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// Await `fut` unless `ctx` is cancelled first.
async fn guarded<T, F>(ctx: &CancellationToken, fut: F) -> Result<T, ControlPlaneError>
where
    F: Future<Output = Result<T, ControlPlaneError>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(ControlPlaneError::Cancelled),
        result = fut => result,
    }
}

/// Pick a due task, start it, run it and report its end.
///
/// Every path ends with exactly one `Deferred` or `Finished` event.
async fn select_and_run(job: JobContext, events: mpsc::Sender<JobEvent>, ctx: CancellationToken) {
    let Some(task) = select_task(&job, &ctx).await else {
        let _ = events.send(JobEvent::Deferred).await;
        return;
    };

    let started = Instant::now();
    let started_at = OffsetDateTime::now_utc();
    let _ = events
        .send(JobEvent::Started {
            task: task.id,
            at: started_at,
        })
        .await;

    let records = job.source.records(ctx.child_token());
    let batches = Batcher::new(records, job.batch, ctx.clone()).into_stream();
    let report = job.ingestor.ingest(batches, &ctx).await;
    let duration = started.elapsed();

    let outcome = if report.cancelled {
        JobOutcome::with_errors(JobOutcome::INTERRUPTED_MESSAGE)
    } else {
        JobOutcome::from_ingest(report.has_errors())
    };
    debug!(
        task_id = task.id,
        accepted = report.accepted,
        records = report.records,
        degraded = report.degraded,
        aborted = report.aborted,
        "ingest pass finished"
    );

    let _ = events.send(JobEvent::Reporting).await;
    match report_end(&job, &outcome, &ctx).await {
        Ok(()) => info!(
            task_id = task.id,
            duration = ?duration,
            status = %outcome.status,
            "{}",
            outcome.message
        ),
        Err(e) => error!(task_id = task.id, error = %e, "failed to end task"),
    }
    let _ = events.send(JobEvent::Finished { outcome }).await;
}

async fn select_task(job: &JobContext, ctx: &CancellationToken) -> Option<Task> {
    let available = match guarded(ctx, job.control_plane.available_tasks()).await {
        Ok(tasks) => tasks,
        Err(ControlPlaneError::Cancelled) => return None,
        Err(e) => {
            error!(error = %e, "unable to fetch available tasks");
            return None;
        }
    };

    let Some(task) = select_due(available, OffsetDateTime::now_utc()) else {
        trace!("there are no tasks to complete at this time");
        return None;
    };

    info!(task_id = task.id, execution_time = %task.execution_time, "beginning collection task");
    match guarded(ctx, job.control_plane.start_task(task.id)).await {
        Ok(()) => Some(task),
        Err(ControlPlaneError::Cancelled) => None,
        Err(e) => {
            error!(task_id = task.id, error = %e, "failed to start task, will retry on next tick");
            None
        }
    }
}

/// Report the job end; once `ctx` is cancelled the call gets `shutdown_grace`.
async fn report_end(
    job: &JobContext,
    outcome: &JobOutcome,
    ctx: &CancellationToken,
) -> Result<(), ControlPlaneError> {
    let grace = job.shutdown_grace;
    let expired = async {
        ctx.cancelled().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = job.control_plane.end_job(outcome) => result,
        _ = expired => Err(ControlPlaneError::Cancelled),
    }
}
