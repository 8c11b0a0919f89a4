use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::jobs::{EnqueueError, JobQueue, JobRequest, names};

/// Enqueues the recurring jobs on fixed intervals: the weekly digest, the
/// due-date reminders and the retention sweep. Each loop sleeps through a
/// full interval before its first enqueue; nothing fires at startup.
pub struct Scheduler {
    jobs: Arc<dyn JobQueue>,
    digest_every: Duration,
    reminder_every: Duration,
    cleanup_every: Duration,
}

impl Scheduler {
    pub fn new(
        jobs: Arc<dyn JobQueue>,
        digest_every: Duration,
        reminder_every: Duration,
        cleanup_every: Duration,
    ) -> Self {
        Self {
            jobs,
            digest_every,
            reminder_every,
            cleanup_every,
        }
    }

    pub fn from_env(jobs: Arc<dyn JobQueue>) -> Self {
        Self::new(
            jobs,
            env_interval("HUDDLE_DIGEST_INTERVAL_SECS", 604_800),
            env_interval("HUDDLE_REMINDER_INTERVAL_SECS", 86_400),
            env_interval("HUDDLE_SWEEP_INTERVAL_SECS", 86_400),
        )
    }

    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        vec![
            spawn_periodic(self.jobs.clone(), self.digest_every, || {
                JobRequest::new(names::WEEKLY_SUMMARY)
            }),
            spawn_periodic(self.jobs.clone(), self.reminder_every, || {
                JobRequest::new(names::DUE_DATE_REMINDERS)
                    .with_retries(3, Duration::from_secs(300))
            }),
            spawn_periodic(self.jobs, self.cleanup_every, || {
                JobRequest::new(names::CLEANUP_OLD_ACTIVITIES)
            }),
        ]
    }
}

fn spawn_periodic<F>(jobs: Arc<dyn JobQueue>, every: Duration, make: F) -> JoinHandle<()>
where
    F: Fn() -> JobRequest + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            let job = make();
            let name = job.name.clone();
            match jobs.enqueue(job).await {
                Ok(()) => tracing::debug!(job = %name, "scheduled job enqueued"),
                Err(EnqueueError::Closed) => {
                    tracing::info!(job = %name, "job queue closed, stopping schedule");
                    break;
                }
            }
        }
    })
}

fn env_interval(var: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(var)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
