use std::future::Future;
use std::pin::Pin;

type Hook = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Side effects queued up during a mutation and released only once the
/// transaction has committed: cache invalidation, room broadcasts, job
/// enqueues. Each hook runs in the order it was pushed; a failing hook is
/// logged and the rest still run, the durable write already happened.
#[derive(Default)]
pub struct PostCommit {
    hooks: Vec<(&'static str, Hook)>,
}

impl PostCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, label: &'static str, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.push((label, Box::pin(fut)));
    }

    pub async fn run(self) {
        for (label, hook) in self.hooks {
            if let Err(err) = hook.await {
                tracing::warn!(%err, hook = label, "post-commit hook failed");
            }
        }
    }
}
