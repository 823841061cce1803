use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::Mailbox,
    transport::smtp::authentication::Credentials,
};

/// Outbound notifications. Delivery is fire-and-forget: failures are
/// logged and never surfaced to the user who triggered the send.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_invitation(
        &self,
        to_email: &str,
        project_name: &str,
        inviter_name: &str,
    ) -> anyhow::Result<()>;
}

/// Default notifier when no SMTP relay is configured: the message is
/// only traced.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_invitation(
        &self,
        to_email: &str,
        project_name: &str,
        inviter_name: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(
            to = to_email,
            project = project_name,
            inviter = inviter_name,
            "Invitation email (logging only, SMTP not configured)"
        );
        Ok(())
    }
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(
        relay: &str,
        username: String,
        password: String,
        from: &str,
    ) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(relay)?
            .credentials(Credentials::new(username, password))
            .build();
        Ok(Self {
            transport,
            from: from.parse()?,
        })
    }

    /// Reads `SMTP_RELAY`, `SMTP_USERNAME`, `SMTP_PASSWORD` and
    /// `SMTP_FROM`; absent relay means SMTP is not configured.
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let Ok(relay) = std::env::var("SMTP_RELAY") else {
            return Ok(None);
        };
        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
        let from = std::env::var("SMTP_FROM")
            .unwrap_or_else(|_| "no-reply@cadence.local".to_string());
        Ok(Some(Self::new(&relay, username, password, &from)?))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_invitation(
        &self,
        to_email: &str,
        project_name: &str,
        inviter_name: &str,
    ) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to_email.parse()?)
            .subject(format!("You have been invited to {project_name}"))
            .body(format!(
                "{inviter_name} invited you to join the project \"{project_name}\".\n\
                 Sign in to accept or decline the invitation."
            ))?;

        self.transport.send(message).await?;
        Ok(())
    }
}

/// Fire-and-forget send. The inviting request does not wait on, or learn
/// about, delivery.
pub fn spawn_invitation(
    notifier: Arc<dyn Notifier>,
    to_email: String,
    project_name: String,
    inviter_name: String,
) {
    tokio::spawn(async move {
        if let Err(err) = notifier
            .send_invitation(&to_email, &project_name, &inviter_name)
            .await
        {
            tracing::warn!(to = %to_email, error = %err, "Failed to send invitation email");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotifier {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send_invitation(&self, _: &str, _: &str, _: &str) -> anyhow::Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn spawned_invitation_is_delivered_in_the_background() {
        let notifier = Arc::new(CountingNotifier {
            sent: AtomicUsize::new(0),
        });

        spawn_invitation(
            notifier.clone(),
            "grace@example.com".to_string(),
            "Apollo".to_string(),
            "ada".to_string(),
        );

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }
}
