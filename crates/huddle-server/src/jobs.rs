use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Job names, shared between the enqueue sites and the handler registry.
pub mod names {
    pub const TASK_ASSIGNMENT_EMAIL: &str = "send_task_assignment_email";
    pub const COMMENT_NOTIFICATION: &str = "send_comment_notification";
    pub const WEEKLY_SUMMARY: &str = "send_weekly_summary";
    pub const DUE_DATE_REMINDERS: &str = "send_due_date_reminders";
    pub const CLEANUP_OLD_ACTIVITIES: &str = "cleanup_old_activities";
}

/// One unit of deferred work. Args are JSON values so the queue stays
/// agnostic of what each handler needs.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub name: String,
    pub args: Vec<serde_json::Value>,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl JobRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            max_retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn arg(mut self, value: serde_json::Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("job queue is shut down")]
    Closed,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: JobRequest) -> Result<(), EnqueueError>;
}

/// Channel-backed queue; jobs run on the same runtime as the server.
pub struct TokioJobQueue {
    tx: mpsc::UnboundedSender<JobRequest>,
}

impl TokioJobQueue {
    pub fn new() -> (Arc<Self>, JobRunner) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self { tx }),
            JobRunner {
                rx,
                handlers: HashMap::new(),
            },
        )
    }
}

#[async_trait]
impl JobQueue for TokioJobQueue {
    async fn enqueue(&self, job: JobRequest) -> Result<(), EnqueueError> {
        self.tx.send(job).map_err(|_| EnqueueError::Closed)
    }
}

type JobHandler =
    Arc<dyn Fn(Vec<serde_json::Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Receives jobs and drives each through its handler, retrying failures
/// on a fixed delay until the request's retry budget runs out.
pub struct JobRunner {
    rx: mpsc::UnboundedReceiver<JobRequest>,
    handlers: HashMap<String, JobHandler>,
}

impl JobRunner {
    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Vec<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers
            .insert(name.to_string(), Arc::new(move |args| Box::pin(handler(args))));
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let handlers = Arc::new(self.handlers);
        while let Some(job) = self.rx.recv().await {
            let handlers = handlers.clone();
            // Each job gets its own task so a long retry loop never blocks
            // the jobs queued behind it.
            tokio::spawn(run_job(handlers, job));
        }
        tracing::info!("job runner stopped");
    }
}

async fn run_job(handlers: Arc<HashMap<String, JobHandler>>, job: JobRequest) {
    let Some(handler) = handlers.get(&job.name) else {
        tracing::warn!(job = %job.name, "no handler registered, dropping job");
        return;
    };

    let mut attempt: u32 = 0;
    loop {
        match handler(job.args.clone()).await {
            Ok(()) => {
                if attempt > 0 {
                    tracing::info!(job = %job.name, attempt, "job succeeded after retry");
                }
                return;
            }
            Err(err) if attempt < job.max_retries => {
                attempt += 1;
                tracing::warn!(%err, job = %job.name, attempt,
                    max_retries = job.max_retries, "job failed, retrying");
                tokio::time::sleep(job.retry_delay).await;
            }
            Err(err) => {
                tracing::error!(%err, job = %job.name, attempts = attempt + 1,
                    "job failed permanently");
                return;
            }
        }
    }
}
