//! Specific background job implementations.

pub mod scrobble_sync;

pub use scrobble_sync::ScrobbleSyncJob;
