//! Notification delivery engine.
//!
//! Payments are recorded as PENDING tasks by the [`ingest::Ingestor`]. The
//! [`loader::Loader`] periodically moves due tasks onto an in-memory queue and a
//! fixed pool of [`worker::Worker`]s delivers them, writing each outcome back to
//! the [`store::TaskStore`]. Failed tasks become due again according to the
//! [`backoff::BackoffSchedule`] until they succeed or hit the retry ceiling.

pub mod backoff;
pub mod clock;
pub mod engine;
pub mod ingest;
pub mod loader;
pub mod query;
pub mod queue;
pub mod store;
pub mod worker;

pub use engine::{EngineHandles, EngineSettings, NotificationEngine};
