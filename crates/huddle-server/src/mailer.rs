use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery seam for the email jobs. The default implementation only logs;
/// wiring a real provider means implementing this trait and swapping it in
/// at startup.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> anyhow::Result<()>;
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutboundEmail) -> anyhow::Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        tracing::debug!(body = %email.body, "email body");
        Ok(())
    }
}
