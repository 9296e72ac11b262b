//! Background job scheduling.
//!
//! Asynchronous commands are serialized into a [`Request`](dockyard_events::Request)
//! and queued with a [`JobPolicy`](dockyard_deployment::JobPolicy):
//!
//! - `Default`: runs as soon as possible
//! - `Merge`: folded into a pending job with the same name and resource
//! - `WaitForOthersResourceId`: runs once every earlier job on the resource is done
//!
//! Jobs on the same resource never run concurrently. Failures are retried with
//! backoff until the retry policy gives up.

pub mod in_memory;
pub mod types;

pub use in_memory::{InMemoryScheduler, SchedulerError};
pub use types::{BackoffStrategy, Job, JobAttemptRecord, JobId, JobOutcome, JobStatus, RetryPolicy};
