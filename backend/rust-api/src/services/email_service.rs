use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

use crate::{
    config::{Config, SmtpConfig},
    metrics::EMAILS_TOTAL,
    services::audit_service::mask_email,
};

/// Pending emails beyond this are dropped with a warning.
pub const EMAIL_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    MfaCode {
        to: String,
        username: String,
        code: String,
        expires_minutes: i64,
    },
    VerificationLink {
        to: String,
        username: String,
        link: String,
    },
    Invitation {
        to: String,
        inviter: String,
        link: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::MfaCode { .. } => "mfa_code",
            Notification::VerificationLink { .. } => "verification_link",
            Notification::Invitation { .. } => "invitation",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Notification::MfaCode { to, .. }
            | Notification::VerificationLink { to, .. }
            | Notification::Invitation { to, .. } => to,
        }
    }

    // The code never goes into the subject: subjects show up in previews and logs.
    pub fn subject(&self) -> &'static str {
        match self {
            Notification::MfaCode { .. } => "NihongoWOW - Your Login Verification Code",
            Notification::VerificationLink { .. } => "NihongoWOW - Confirm Your Email Address",
            Notification::Invitation { .. } => "NihongoWOW - You're Invited!",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notification::MfaCode {
                username,
                code,
                expires_minutes,
                ..
            } => format!(
                "Hello {username},\n\nYour verification code is: {code}\n\n\
                 The code expires in {expires_minutes} minutes. If you did not try to log in, \
                 you can ignore this email.\n"
            ),
            Notification::VerificationLink { username, link, .. } => format!(
                "Hello {username},\n\nPlease confirm your email address by opening this link:\n\n\
                 {link}\n\nThe link is valid for 24 hours.\n"
            ),
            Notification::Invitation { inviter, link, .. } => format!(
                "Hello,\n\n{inviter} has invited you to join NihongoWOW, a fun way to learn \
                 Japanese vocabulary.\n\nCreate your account with this link:\n\n{link}\n\n\
                 This invitation expires in 7 days. If you did not expect it, you can ignore \
                 this email.\n"
            ),
        }
    }
}

/// Queues emails for the background worker. Enqueueing never waits.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, notification: Notification) {
        let kind = notification.kind();
        match self.tx.try_send(notification) {
            Ok(()) => {
                EMAILS_TOTAL.with_label_values(&[kind, "queued"]).inc();
            }
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    kind,
                    to = %mask_email(dropped.recipient()),
                    "Email queue full, dropping notification"
                );
                EMAILS_TOTAL.with_label_values(&[kind, "dropped"]).inc();
            }
            Err(TrySendError::Closed(dropped)) => {
                tracing::error!(
                    kind,
                    to = %mask_email(dropped.recipient()),
                    "Email worker is not running, dropping notification"
                );
                EMAILS_TOTAL.with_label_values(&[kind, "dropped"]).inc();
            }
        }
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(settings: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = format!("{} <{}>", settings.from_name, settings.from_email)
            .parse()
            .context("Invalid from email address")?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .context("Invalid SMTP server for STARTTLS")?
            .port(settings.port);
        if !settings.user.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.user.clone(),
                settings.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let to: Mailbox = notification
            .recipient()
            .parse()
            .context("Invalid recipient email address")?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject())
            .body(notification.body())
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;
        Ok(())
    }
}

/// Used when SMTP is not configured or sending is disabled.
pub struct LogMailer;

#[async_trait]
impl MailTransport for LogMailer {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            kind = notification.kind(),
            to = %mask_email(notification.recipient()),
            "Email sending disabled, notification not delivered"
        );
        Ok(())
    }
}

pub fn transport_for(config: &Config) -> Result<Arc<dyn MailTransport>> {
    if config.email_send_disabled || !config.smtp.is_configured() {
        tracing::warn!("SMTP not configured or disabled, emails will only be logged");
        return Ok(Arc::new(LogMailer));
    }
    Ok(Arc::new(SmtpMailer::from_config(&config.smtp)?))
}

/// Drains the queue until every `Notifier` is dropped. Failures are logged
/// and never retried.
pub fn spawn_email_worker(
    mut rx: mpsc::Receiver<Notification>,
    transport: Arc<dyn MailTransport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            let kind = notification.kind();
            match transport.deliver(&notification).await {
                Ok(()) => {
                    tracing::info!(
                        kind,
                        to = %mask_email(notification.recipient()),
                        "Email sent"
                    );
                    EMAILS_TOTAL.with_label_values(&[kind, "sent"]).inc();
                }
                Err(e) => {
                    tracing::error!(
                        kind,
                        to = %mask_email(notification.recipient()),
                        "Failed to send email: {:#}",
                        e
                    );
                    EMAILS_TOTAL.with_label_values(&[kind, "failed"]).inc();
                }
            }
        }
        tracing::info!("Email worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording(Mutex<Vec<Notification>>, bool);

    #[async_trait]
    impl MailTransport for Recording {
        async fn deliver(&self, notification: &Notification) -> Result<()> {
            self.0.lock().unwrap().push(notification.clone());
            if self.1 {
                anyhow::bail!("smtp down");
            }
            Ok(())
        }
    }

    fn code(to: &str) -> Notification {
        Notification::MfaCode {
            to: to.to_string(),
            username: "kenji".to_string(),
            code: "123456".to_string(),
            expires_minutes: 10,
        }
    }

    #[test]
    fn code_is_in_body_not_subject() {
        let n = code("k@example.com");
        assert!(!n.subject().contains("123456"));
        assert!(n.body().contains("123456"));
    }

    #[test]
    fn invitation_names_the_inviter() {
        let n = Notification::Invitation {
            to: "yuki@example.com".to_string(),
            inviter: "sensei".to_string(),
            link: "http://localhost:3000/register?invitation_token=abc".to_string(),
        };
        assert_eq!(n.kind(), "invitation");
        assert_eq!(n.recipient(), "yuki@example.com");
        assert!(n.body().contains("sensei has invited you"));
        assert!(n.body().contains("invitation_token=abc"));
    }

    #[test]
    fn enqueue_on_full_queue_does_not_block() {
        let (notifier, _rx) = Notifier::channel(1);
        notifier.enqueue(code("a@example.com"));
        notifier.enqueue(code("b@example.com"));
    }

    #[tokio::test]
    async fn worker_delivers_and_survives_failures() {
        let transport = Arc::new(Recording(Mutex::new(Vec::new()), true));
        let (notifier, rx) = Notifier::channel(8);
        let worker = spawn_email_worker(rx, transport.clone());

        notifier.enqueue(code("a@example.com"));
        notifier.enqueue(code("b@example.com"));
        drop(notifier);
        worker.await.unwrap();

        assert_eq!(transport.0.lock().unwrap().len(), 2);
    }
}
