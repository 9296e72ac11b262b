//! In-memory job queue honouring the job policies.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

use dockyard_deployment::{JobPolicy, Scheduler};
use dockyard_events::Request;

use super::types::{Job, JobId, JobOutcome, JobStatus, RetryPolicy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler lock poisoned")]
    Poisoned,

    #[error("unknown job {0}")]
    UnknownJob(JobId),
}

/// Jobs kept in queue order. Finished jobs stay around until pruned.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    jobs: Mutex<Vec<Job>>,
    retry_policy: RetryPolicy,
}

impl InMemoryScheduler {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            retry_policy,
        }
    }

    pub fn enqueue(&self, request: Request, policy: JobPolicy) -> Result<JobId, SchedulerError> {
        let mut jobs = self.jobs.lock().map_err(|_| SchedulerError::Poisoned)?;

        if policy == JobPolicy::Merge {
            let pending = jobs.iter_mut().find(|job| {
                job.status == JobStatus::Pending
                    && job.name() == request.name()
                    && job.resource_id() == request.resource_id()
            });

            if let Some(job) = pending {
                tracing::debug!(job_id = %job.id, name = job.name(), "merged into pending job");
                job.request.merge(request);
                job.updated_at = Utc::now();
                return Ok(job.id);
            }
        }

        let job = Job::new(request, policy).with_retry_policy(self.retry_policy);
        let id = job.id;

        tracing::info!(
            job_id = %id,
            name = job.name(),
            resource_id = job.resource_id(),
            policy = ?policy,
            "job queued"
        );
        jobs.push(job);

        Ok(id)
    }

    /// Pick the oldest job that can run at `now` and mark it running.
    pub fn next_ready(&self, now: DateTime<Utc>) -> Result<Option<Job>, SchedulerError> {
        let mut jobs = self.jobs.lock().map_err(|_| SchedulerError::Poisoned)?;

        let position = {
            // A running job on the same resource blocks everyone else.
            let busy: HashSet<&str> = jobs
                .iter()
                .filter(|job| job.status == JobStatus::Running)
                .map(Job::resource_id)
                .collect();

            // Resources with an unfinished job earlier in the queue.
            let mut queued: HashSet<&str> = HashSet::new();

            jobs.iter().position(|job| {
                let resource = job.resource_id();
                let waiting_on_others = job.policy == JobPolicy::WaitForOthersResourceId
                    && queued.contains(resource);

                if job.is_ready(now) && !busy.contains(resource) && !waiting_on_others {
                    return true;
                }

                if !job.status.is_terminal() {
                    queued.insert(resource);
                }

                false
            })
        };

        Ok(position.map(|idx| {
            let job = &mut jobs[idx];
            job.mark_running();
            job.clone()
        }))
    }

    /// Report how a running job went.
    pub fn complete(
        &self,
        id: JobId,
        started_at: DateTime<Utc>,
        outcome: JobOutcome,
    ) -> Result<JobStatus, SchedulerError> {
        let mut jobs = self.jobs.lock().map_err(|_| SchedulerError::Poisoned)?;
        let job = jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or(SchedulerError::UnknownJob(id))?;

        match outcome {
            JobOutcome::Success => job.mark_completed(started_at),
            JobOutcome::Delay(delay) => {
                tracing::debug!(job_id = %id, name = job.name(), ?delay, "job delayed");
                job.mark_delayed(delay);
            }
            JobOutcome::Failure(error) => {
                job.mark_failed(error, started_at);

                match &job.status {
                    JobStatus::DeadLettered { error, attempts } => tracing::error!(
                        job_id = %id,
                        name = job.name(),
                        attempts,
                        error = error.as_str(),
                        "job dead-lettered"
                    ),
                    status => tracing::warn!(
                        job_id = %id,
                        name = job.name(),
                        ?status,
                        "job failed, will retry"
                    ),
                }
            }
        }

        Ok(job.status.clone())
    }

    pub fn jobs(&self) -> Result<Vec<Job>, SchedulerError> {
        Ok(self
            .jobs
            .lock()
            .map_err(|_| SchedulerError::Poisoned)?
            .clone())
    }

    pub fn dead_letters(&self) -> Result<Vec<Job>, SchedulerError> {
        Ok(self
            .jobs()?
            .into_iter()
            .filter(|job| matches!(job.status, JobStatus::DeadLettered { .. }))
            .collect())
    }

    /// Number of jobs not finished yet, delayed ones included.
    pub fn outstanding(&self) -> Result<usize, SchedulerError> {
        Ok(self
            .jobs
            .lock()
            .map_err(|_| SchedulerError::Poisoned)?
            .iter()
            .filter(|job| !job.status.is_terminal())
            .count())
    }

    /// Drop completed jobs. Dead letters are kept.
    pub fn prune(&self) -> Result<usize, SchedulerError> {
        let mut jobs = self.jobs.lock().map_err(|_| SchedulerError::Poisoned)?;
        let before = jobs.len();
        jobs.retain(|job| job.status != JobStatus::Completed);
        Ok(before - jobs.len())
    }
}

#[async_trait::async_trait]
impl Scheduler for InMemoryScheduler {
    async fn queue(&self, request: Request, policy: JobPolicy) -> anyhow::Result<()> {
        self.enqueue(request, policy)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::Serialize;

    use dockyard_events::Command;

    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Touch {
        kind: &'static str,
        resource: &'static str,
        value: u32,
    }

    impl Command for Touch {
        fn name(&self) -> &'static str {
            self.kind
        }

        fn resource_id(&self) -> String {
            self.resource.to_string()
        }
    }

    fn request(kind: &'static str, resource: &'static str, value: u32) -> Request {
        Request::from_command(&Touch {
            kind,
            resource,
            value,
        })
        .unwrap()
    }

    fn scheduler() -> InMemoryScheduler {
        InMemoryScheduler::new(RetryPolicy::fixed(2, Duration::ZERO))
    }

    fn run(scheduler: &InMemoryScheduler, outcome: JobOutcome) -> Option<Job> {
        let job = scheduler.next_ready(Utc::now()).unwrap()?;
        scheduler.complete(job.id, Utc::now(), outcome).unwrap();
        Some(job)
    }

    #[test]
    fn merge_replaces_the_payload_of_a_pending_job() {
        let scheduler = scheduler();

        scheduler.enqueue(request("configure", "t1", 1), JobPolicy::Merge).unwrap();
        scheduler.enqueue(request("configure", "t1", 2), JobPolicy::Merge).unwrap();
        scheduler.enqueue(request("configure", "t2", 3), JobPolicy::Merge).unwrap();

        let jobs = scheduler.jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].request.payload()["value"], 2);
    }

    #[test]
    fn merge_does_not_touch_running_jobs() {
        let scheduler = scheduler();
        scheduler.enqueue(request("configure", "t1", 1), JobPolicy::Merge).unwrap();
        let running = scheduler.next_ready(Utc::now()).unwrap().unwrap();

        scheduler.enqueue(request("configure", "t1", 2), JobPolicy::Merge).unwrap();

        let jobs = scheduler.jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, running.id);
        assert_eq!(jobs[0].request.payload()["value"], 1);
    }

    #[test]
    fn waiting_jobs_run_after_every_earlier_job_on_the_resource() {
        let scheduler = scheduler();
        scheduler.enqueue(request("cleanup", "t1", 0), JobPolicy::Default).unwrap();
        scheduler.enqueue(request("delete", "t1", 0), JobPolicy::WaitForOthersResourceId).unwrap();
        scheduler.enqueue(request("other", "t2", 0), JobPolicy::Default).unwrap();

        let first = scheduler.next_ready(Utc::now()).unwrap().unwrap();
        assert_eq!(first.name(), "cleanup");

        // cleanup still running: delete must wait, the other resource does not.
        let second = scheduler.next_ready(Utc::now()).unwrap().unwrap();
        assert_eq!(second.name(), "other");
        assert!(scheduler.next_ready(Utc::now()).unwrap().is_none());

        scheduler.complete(first.id, Utc::now(), JobOutcome::Success).unwrap();

        let third = scheduler.next_ready(Utc::now()).unwrap().unwrap();
        assert_eq!(third.name(), "delete");
    }

    #[test]
    fn failed_jobs_are_retried_until_dead_lettered() {
        let scheduler = scheduler();
        scheduler.enqueue(request("deploy", "a1", 0), JobPolicy::Default).unwrap();

        run(&scheduler, JobOutcome::Failure("boom".into())).unwrap();
        assert!(scheduler.dead_letters().unwrap().is_empty());

        run(&scheduler, JobOutcome::Failure("boom".into())).unwrap();
        assert_eq!(scheduler.dead_letters().unwrap().len(), 1);
        assert_eq!(scheduler.outstanding().unwrap(), 0);
        assert!(run(&scheduler, JobOutcome::Success).is_none());
    }

    #[test]
    fn delayed_jobs_wait_for_their_schedule() {
        let scheduler = scheduler();
        scheduler.enqueue(request("cleanup", "t1", 0), JobPolicy::Default).unwrap();

        run(&scheduler, JobOutcome::Delay(Duration::from_secs(60))).unwrap();

        assert!(scheduler.next_ready(Utc::now()).unwrap().is_none());
        assert_eq!(scheduler.outstanding().unwrap(), 1);

        let later = Utc::now() + chrono::Duration::seconds(61);
        let job = scheduler.next_ready(later).unwrap().unwrap();
        assert_eq!(job.attempt, 1);
    }

    #[test]
    fn completed_jobs_can_be_pruned() {
        let scheduler = scheduler();
        scheduler.enqueue(request("deploy", "a1", 0), JobPolicy::Default).unwrap();
        run(&scheduler, JobOutcome::Success).unwrap();

        assert_eq!(scheduler.prune().unwrap(), 1);
        assert!(scheduler.jobs().unwrap().is_empty());
    }

    #[test]
    fn pruning_keeps_dead_letters_and_outstanding_jobs() {
        let scheduler = scheduler();
        scheduler.enqueue(request("deploy", "a1", 0), JobPolicy::Default).unwrap();
        scheduler.enqueue(request("deploy", "a2", 0), JobPolicy::Default).unwrap();
        scheduler.enqueue(request("deploy", "a3", 0), JobPolicy::Default).unwrap();

        run(&scheduler, JobOutcome::Success).unwrap();
        run(&scheduler, JobOutcome::Failure("boom".into())).unwrap();
        run(&scheduler, JobOutcome::Failure("boom".into())).unwrap();
        run(&scheduler, JobOutcome::Failure("boom".into())).unwrap();
        run(&scheduler, JobOutcome::Failure("boom".into())).unwrap();

        assert_eq!(scheduler.prune().unwrap(), 1);
        assert_eq!(scheduler.jobs().unwrap().len(), 2);
        assert_eq!(scheduler.dead_letters().unwrap().len(), 2);
    }
}
