//! Scrobble synchronization: pagination, normalization and deduplication of
//! the remote feed into the local store.

mod engine;
mod normalize;
mod progress;
mod report;
mod retry;

pub use engine::{SyncCursor, SyncEngine, SyncError, SyncSettings};
pub use normalize::{
    classify, parse_listen_timestamp, RecordDisposition, TimestampError, LISTEN_TIME_FORMAT,
};
pub use progress::ImportProgress;
pub use report::{LogReporter, NullReporter, PassOutcome, SyncMode, SyncReport, SyncReporter};
pub use retry::RetryPolicy;
