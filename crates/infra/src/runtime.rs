//! Single process runtime: drains published events into reactions and runs the
//! jobs they queue.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use dockyard_core::UserId;
use dockyard_deployment::{DomainEvent, Provider, TargetId, TargetUrlRequirement, TargetsReader};
use dockyard_events::{Event, EventBus, EventEnvelope, Subscription};

use crate::config::Settings;
use crate::error::HandlerResult;
use crate::handlers::deployments::{FailRunningDeployments, fail_running_deployments};
use crate::handlers::targets::{CreateTarget, create_target};
use crate::handlers::{Context, dispatch};
use crate::reactions::react;
use crate::scheduler::{InMemoryScheduler, JobOutcome, JobStatus, SchedulerError};
use crate::store::{DomainEventBus, InMemoryStore};

/// Name of the target seeded from the default url.
pub const DEFAULT_TARGET_NAME: &str = "local";

/// Author of what the runtime creates by itself.
pub const SYSTEM_USER: &str = "system";

/// Upper bound on [`Runtime::settle`] rounds, reached only by jobs delaying each other forever.
const MAX_SETTLE_ROUNDS: usize = 256;

/// Counters since the runtime started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub events_handled: u64,
    pub reactions_failed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_delayed: u64,
    pub jobs_dead_lettered: u64,
}

/// What a single [`Runtime::step`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub events: usize,
    pub jobs: usize,
    /// Jobs which ran to an outcome other than a delay.
    pub progressed: usize,
}

impl StepReport {
    pub fn is_idle(&self) -> bool {
        self.events == 0 && self.progressed == 0
    }
}

pub struct Runtime {
    ctx: Context,
    store: Arc<InMemoryStore>,
    scheduler: Arc<InMemoryScheduler>,
    events: Subscription<EventEnvelope<DomainEvent>>,
    poll_interval: std::time::Duration,
    stats: RuntimeStats,
}

impl Runtime {
    pub fn new(settings: &Settings, provider: Arc<dyn Provider>) -> Self {
        let bus = Arc::new(DomainEventBus::new());
        let events = bus.subscribe();
        let store = Arc::new(InMemoryStore::new(bus));
        let scheduler = Arc::new(InMemoryScheduler::new(settings.scheduler.retry_policy()));

        let ctx = Context::new(
            store.clone(),
            scheduler.clone(),
            provider,
            settings.scheduler.retry_delay,
        );

        Self {
            ctx,
            store,
            scheduler,
            events,
            poll_interval: settings.scheduler.poll_interval,
            stats: RuntimeStats::default(),
        }
    }

    /// Handlers entry point, to issue commands.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<InMemoryScheduler> {
        &self.scheduler
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    /// Fail deployments left running by a previous process, then create the
    /// default target if a url is configured and no target uses it yet.
    pub async fn bootstrap(&self, settings: &Settings) -> HandlerResult<Option<TargetId>> {
        let failed =
            fail_running_deployments(&self.ctx, FailRunningDeployments::default()).await?;

        if failed > 0 {
            tracing::warn!(failed, "running deployments failed on startup");
        }

        let Some(url) = &settings.default_target_url else {
            return Ok(None);
        };

        if !is_free(&self.ctx.targets.check_url_availability(url, None).await?) {
            tracing::debug!(%url, "default target already exists");
            return Ok(None);
        }

        let id = create_target(
            &self.ctx,
            CreateTarget {
                name: DEFAULT_TARGET_NAME.to_string(),
                url: Some(url.to_string()),
                provider: serde_json::json!({ "kind": "docker", "data": {} }),
                created_by: UserId::from(SYSTEM_USER),
            },
        )
        .await?;

        tracing::info!(target_id = %id, %url, "default target created");

        Ok(Some(id))
    }

    /// React to pending events, then run every job ready at `now`.
    pub async fn step(&mut self, now: DateTime<Utc>) -> Result<StepReport, SchedulerError> {
        let mut report = StepReport::default();

        for envelope in self.events.drain() {
            report.events += 1;
            self.stats.events_handled += 1;

            if let Err(err) = react(&self.ctx, &envelope).await {
                self.stats.reactions_failed += 1;
                tracing::error!(
                    event_id = %envelope.event_id(),
                    event_type = envelope.payload().event_type(),
                    aggregate_id = envelope.aggregate_id(),
                    error = %err,
                    "reaction failed"
                );
            }
        }

        // Taken up front: a job never runs twice in the same step.
        let mut batch = Vec::new();
        while let Some(job) = self.scheduler.next_ready(now)? {
            batch.push(job);
        }

        for job in batch {
            report.jobs += 1;
            let started_at = Utc::now();
            let outcome = dispatch(&self.ctx, &job.request).await;

            if !matches!(outcome, JobOutcome::Delay(_)) {
                report.progressed += 1;
            }

            match self.scheduler.complete(job.id, started_at, outcome)? {
                JobStatus::Completed => self.stats.jobs_succeeded += 1,
                JobStatus::Pending => self.stats.jobs_delayed += 1,
                JobStatus::Failed { .. } => self.stats.jobs_failed += 1,
                JobStatus::DeadLettered { .. } => self.stats.jobs_dead_lettered += 1,
                JobStatus::Running => {}
            }
        }

        // Dead letters stay around for inspection.
        let pruned = self.scheduler.prune()?;
        if pruned > 0 {
            tracing::trace!(pruned, "completed jobs pruned");
        }

        Ok(report)
    }

    /// Step until nothing moves anymore, ignoring backoff delays.
    pub async fn settle(&mut self) -> Result<(), SchedulerError> {
        for _ in 0..MAX_SETTLE_ROUNDS {
            if self.step(DateTime::<Utc>::MAX_UTC).await?.is_idle() {
                return Ok(());
            }
        }

        tracing::warn!(rounds = MAX_SETTLE_ROUNDS, "runtime did not settle");

        Ok(())
    }

    /// Poll until `shutdown` resolves.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), SchedulerError> {
        let mut interval = tokio::time::interval(self.poll_interval);
        tokio::pin!(shutdown);

        tracing::info!(poll_interval = ?self.poll_interval, "runtime started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.step(Utc::now()).await?;
                }
            }
        }

        tracing::info!(stats = ?self.stats, "runtime stopped");

        Ok(())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("poll_interval", &self.poll_interval)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn is_free(requirement: &TargetUrlRequirement) -> bool {
    requirement.check().is_ok()
}
