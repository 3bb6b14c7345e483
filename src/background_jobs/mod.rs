//! Background job scheduling and execution.
//!
//! Jobs run on a fixed-rate interval, on hooks such as startup, or when
//! triggered through a [`SchedulerHandle`]. The daemon's recurring scrobble
//! sync is the main user.

mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use handle::{JobInfo, SchedulerHandle, JOB_HISTORY_LIMIT};
pub use job::{
    BackgroundJob, HookEvent, JobContext, JobError, JobRun, JobRunStatus, JobSchedule, Trigger,
};
pub use scheduler::{create_scheduler, JobScheduler};
