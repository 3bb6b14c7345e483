use super::handle::{JobEntry, SchedulerCommand, SchedulerHandle, SchedulerState};
use super::job::{
    BackgroundJob, HookEvent, JobContext, JobError, JobRun, JobRunStatus, Trigger,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest the loop sleeps without looking at its jobs again.
const MAX_IDLE: Duration = Duration::from_secs(60);

/// How long shutdown waits for a cancelled run to wind down.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

struct ActiveRun {
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Runs registered jobs on their interval and hooks.
///
/// At most one run of each job is in flight. A tick that comes due while the
/// previous run is still going is dropped, not queued.
pub struct JobScheduler {
    state: Arc<RwLock<SchedulerState>>,
    active: HashMap<String, ActiveRun>,
    commands: mpsc::Receiver<SchedulerCommand>,
    /// Runs send their job id here once recorded.
    finished_tx: mpsc::UnboundedSender<String>,
    finished_rx: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
}

impl JobScheduler {
    fn new(
        commands: mpsc::Receiver<SchedulerCommand>,
        shutdown: CancellationToken,
        state: Arc<RwLock<SchedulerState>>,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            state,
            active: HashMap::new(),
            commands,
            finished_tx,
            finished_rx,
            shutdown,
        }
    }

    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        info!("Registering job: {} - {}", job.id(), job.description());
        let mut state = self.state.write().await;
        state.jobs.insert(job.id().to_string(), JobEntry::new(job));
    }

    pub async fn job_count(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    /// Returns once the shutdown token is cancelled and running jobs have
    /// wound down.
    pub async fn run(&mut self) {
        info!(
            "Starting job scheduler with {} registered jobs",
            self.job_count().await
        );
        self.fire_hook(HookEvent::OnStartup).await;

        loop {
            self.reap_finished().await;
            let idle = self.next_wakeup().await;
            debug!("Scheduler idle for {:?}", idle);

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.stop_active().await;
                    break;
                }
                Some(command) = self.commands.recv() => {
                    self.handle_command(command).await;
                }
                Some(job_id) = self.finished_rx.recv() => {
                    debug!("Job {} finished", job_id);
                }
                _ = tokio::time::sleep(idle) => {
                    self.fire_due_ticks().await;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Trigger { job_id, response } => {
                let result = self.trigger(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    async fn trigger(&mut self, job_id: &str) -> Result<(), JobError> {
        {
            let state = self.state.read().await;
            match state.jobs.get(job_id) {
                None => return Err(JobError::NotFound),
                Some(entry) if entry.running => return Err(JobError::AlreadyRunning),
                Some(_) => {}
            }
        }
        self.start_run(job_id, Trigger::Manual).await;
        Ok(())
    }

    async fn next_wakeup(&self) -> Duration {
        let state = self.state.read().await;
        let now = Utc::now();
        state
            .jobs
            .values()
            .filter_map(|entry| entry.due_at(now))
            .map(|due| (due - now).to_std().unwrap_or(Duration::ZERO))
            .fold(MAX_IDLE, Duration::min)
    }

    async fn fire_due_ticks(&mut self) {
        let now = Utc::now();
        let mut due = Vec::new();
        {
            let mut state = self.state.write().await;
            for (job_id, entry) in state.jobs.iter_mut() {
                match entry.due_at(now) {
                    Some(due_at) if due_at <= now => {}
                    _ => continue,
                }
                if entry.running {
                    entry.skip_tick(now);
                    debug!(
                        "Job {} still running, dropped tick ({} so far)",
                        job_id, entry.dropped_ticks
                    );
                    continue;
                }
                due.push(job_id.clone());
            }
        }

        for job_id in due {
            self.start_run(&job_id, Trigger::Schedule).await;
        }
    }

    async fn fire_hook(&mut self, event: HookEvent) {
        let listeners: Vec<String> = {
            let state = self.state.read().await;
            state
                .jobs
                .iter()
                .filter(|(_, entry)| !entry.running && entry.job.schedule().listens_to(event))
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        for job_id in listeners {
            self.start_run(&job_id, Trigger::Hook(event)).await;
        }
    }

    async fn start_run(&mut self, job_id: &str, trigger: Trigger) {
        let job = {
            let mut state = self.state.write().await;
            let Some(entry) = state.jobs.get_mut(job_id) else {
                error!("Attempted to start unknown job: {}", job_id);
                return;
            };
            entry.mark_started(Utc::now());
            Arc::clone(&entry.job)
        };

        info!("Starting job: {} (triggered_by: {})", job_id, trigger);
        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(execute_run(
            job,
            JobContext::new(cancel.clone()),
            trigger,
            Arc::clone(&self.state),
            self.finished_tx.clone(),
        ));
        self.active
            .insert(job_id.to_string(), ActiveRun { task, cancel });
    }

    async fn reap_finished(&mut self) {
        let finished: Vec<String> = self
            .active
            .iter()
            .filter(|(_, run)| run.task.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in finished {
            if let Some(run) = self.active.remove(&job_id) {
                let _ = run.task.await;
            }
        }
    }

    async fn stop_active(&mut self) {
        for (job_id, run) in &self.active {
            debug!("Cancelling job: {}", job_id);
            run.cancel.cancel();
        }

        for (job_id, run) in self.active.drain() {
            if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, run.task)
                .await
                .is_err()
            {
                warn!(
                    "Job {} did not stop within {:?}",
                    job_id, SHUTDOWN_GRACE_PERIOD
                );
            }
        }
        info!("Scheduler shutdown complete");
    }
}

/// Runs one execution on a blocking thread and records its outcome.
async fn execute_run(
    job: Arc<dyn BackgroundJob>,
    ctx: JobContext,
    trigger: Trigger,
    state: Arc<RwLock<SchedulerState>>,
    finished_tx: mpsc::UnboundedSender<String>,
) {
    let job_id = job.id().to_string();
    let started_at = Utc::now();
    let clock = Instant::now();

    let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
    let (status, error_message) = run_outcome(&job_id, result, clock.elapsed());

    {
        let mut state = state.write().await;
        if let Some(entry) = state.jobs.get_mut(&job_id) {
            entry.record_run(JobRun {
                job_id: job_id.clone(),
                started_at,
                finished_at: Utc::now(),
                status,
                error_message,
                triggered_by: trigger,
            });
        }
    }

    let _ = finished_tx.send(job_id);
}

fn run_outcome(
    job_id: &str,
    result: Result<Result<(), JobError>, JoinError>,
    elapsed: Duration,
) -> (JobRunStatus, Option<String>) {
    match result {
        Ok(Ok(())) => {
            info!("Job {} completed in {:?}", job_id, elapsed);
            (JobRunStatus::Completed, None)
        }
        Ok(Err(JobError::Cancelled)) => {
            info!("Job {} was cancelled after {:?}", job_id, elapsed);
            (JobRunStatus::Cancelled, Some(JobError::Cancelled.to_string()))
        }
        Ok(Err(e)) => {
            error!("Job {} failed after {:?}: {}", job_id, elapsed, e);
            (JobRunStatus::Failed, Some(e.to_string()))
        }
        Err(e) => {
            error!("Job {} panicked after {:?}: {}", job_id, elapsed, e);
            (JobRunStatus::Failed, Some(format!("Task panic: {}", e)))
        }
    }
}

/// Creates a scheduler and the handle used to talk to it.
pub fn create_scheduler(shutdown: CancellationToken) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let state = Arc::new(RwLock::new(SchedulerState::default()));

    let scheduler = JobScheduler::new(command_rx, shutdown, Arc::clone(&state));
    let handle = SchedulerHandle::new(command_tx, state);

    (scheduler, handle)
}
