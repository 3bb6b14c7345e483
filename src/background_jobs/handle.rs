use super::job::{BackgroundJob, HookEvent, JobError, JobRun};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Finished runs kept per job.
pub const JOB_HISTORY_LIMIT: usize = 50;

/// Point-in-time view of a registered job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub interval: Option<Duration>,
    pub runs_on_startup: bool,
    pub is_running: bool,
    pub last_run: Option<JobRun>,
    pub next_run_at: Option<DateTime<Utc>>,
    /// Interval ticks that came due while the job was still running.
    pub dropped_ticks: u64,
}

/// Scheduler bookkeeping for one registered job.
pub(crate) struct JobEntry {
    pub job: Arc<dyn BackgroundJob>,
    pub running: bool,
    /// Unset until an interval job first starts, which makes it due at once.
    pub next_run_at: Option<DateTime<Utc>>,
    pub dropped_ticks: u64,
    /// Most recent last.
    pub history: VecDeque<JobRun>,
}

impl JobEntry {
    pub fn new(job: Arc<dyn BackgroundJob>) -> Self {
        Self {
            job,
            running: false,
            next_run_at: None,
            dropped_ticks: 0,
            history: VecDeque::new(),
        }
    }

    fn interval_after(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let interval = self.job.schedule().interval()?;
        Some(instant + chrono::Duration::from_std(interval).unwrap_or_default())
    }

    /// When the next interval tick is due, `None` for hook-only jobs.
    pub fn due_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.job.schedule().interval()?;
        Some(self.next_run_at.unwrap_or(now))
    }

    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        self.running = true;
        if let Some(next) = self.interval_after(now) {
            self.next_run_at = Some(next);
        }
    }

    /// Drops the tick due at `now` and waits for the following one.
    pub fn skip_tick(&mut self, now: DateTime<Utc>) {
        self.dropped_ticks += 1;
        if let Some(next) = self.interval_after(now) {
            self.next_run_at = Some(next);
        }
    }

    pub fn record_run(&mut self, run: JobRun) {
        self.running = false;
        if self.history.len() == JOB_HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(run);
    }

    pub fn info(&self, id: &str) -> JobInfo {
        let schedule = self.job.schedule();
        JobInfo {
            id: id.to_string(),
            name: self.job.name().to_string(),
            description: self.job.description().to_string(),
            interval: schedule.interval(),
            runs_on_startup: schedule.listens_to(HookEvent::OnStartup),
            is_running: self.running,
            last_run: self.history.back().cloned(),
            next_run_at: self.next_run_at,
            dropped_ticks: self.dropped_ticks,
        }
    }
}

/// State shared between the scheduler loop and its handles.
#[derive(Default)]
pub(crate) struct SchedulerState {
    pub jobs: HashMap<String, JobEntry>,
}

pub(crate) enum SchedulerCommand {
    Trigger {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// Cloneable access to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    state: Arc<RwLock<SchedulerState>>,
}

impl SchedulerHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<SchedulerCommand>,
        state: Arc<RwLock<SchedulerState>>,
    ) -> Self {
        Self { commands, state }
    }

    /// All registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let state = self.state.read().await;
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .iter()
            .map(|(id, entry)| entry.info(id))
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        let state = self.state.read().await;
        state.jobs.get(job_id).map(|entry| entry.info(job_id))
    }

    /// Starts a run now, unless one is already in flight.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        let (response, answer) = oneshot::channel();
        self.commands
            .send(SchedulerCommand::Trigger {
                job_id: job_id.to_string(),
                response,
            })
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler not available".to_string()))?;

        answer
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler did not respond".to_string()))?
    }

    /// Finished runs, most recent first.
    pub async fn get_job_history(&self, job_id: &str, limit: usize) -> Vec<JobRun> {
        let state = self.state.read().await;
        state
            .jobs
            .get(job_id)
            .map(|entry| entry.history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_job_running(&self, job_id: &str) -> bool {
        let state = self.state.read().await;
        state.jobs.get(job_id).is_some_and(|entry| entry.running)
    }

    pub async fn job_exists(&self, job_id: &str) -> bool {
        self.state.read().await.jobs.contains_key(job_id)
    }
}
