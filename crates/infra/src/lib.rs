//! `dockyard-infra`: adapters and runtime around the deployment domain.
//!
//! - [`store`]: in-memory readers and writers publishing committed events
//! - [`scheduler`]: job queue honouring the job policies
//! - [`handlers`]: commands and the jobs they spawn
//! - [`reactions`]: events turned into jobs
//! - [`runtime`]: the loop tying everything together

pub mod config;
pub mod error;
pub mod handlers;
pub mod reactions;
pub mod runtime;
pub mod scheduler;
pub mod store;

pub use config::{ConfigError, SchedulerSettings, Settings};
pub use error::{HandlerError, HandlerResult};
pub use handlers::{Context, Patch, dispatch};
pub use runtime::{Runtime, RuntimeStats, StepReport};
pub use scheduler::{InMemoryScheduler, JobOutcome, JobStatus, RetryPolicy};
pub use store::{DomainEventBus, InMemoryStore};

#[cfg(test)]
mod testing;
