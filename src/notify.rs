//! Outbound notification channels.
//!
//! The monitor only knows the `Notifier` trait. Concrete channels:
//! - `LogNotifier`: writes the notification to the log (fallback)
//! - `NtfyNotifier`: push via an ntfy server
//! - `DesktopNotifier`: desktop notification (feature `desktop`)
//! - `EmailNotifier`: SMTP with STARTTLS to several recipients (feature `email`)
//! - `CombinedNotifier`: fan-out to several channels
//! - `MockNotifier`: records calls for tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "email")]
use crate::config::EmailConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier misconfigured: {0}")]
    Config(String),
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Delivers a human-readable notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

// ==================== Log ====================

/// Writes notifications to the log. Used when no other channel is set up.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        tracing::info!("{}\n{}", subject, body);
        Ok(())
    }
}

// ==================== ntfy ====================

pub const DEFAULT_NTFY_SERVER: &str = "https://ntfy.sh";

/// Push notification through an ntfy topic.
#[derive(Debug, Clone)]
pub struct NtfyNotifier {
    client: reqwest::Client,
    url: String,
}

impl NtfyNotifier {
    pub fn new(server: &str, topic: &str, timeout: Duration) -> Result<Self, NotifyError> {
        if topic.trim().is_empty() {
            return Err(NotifyError::Config("ntfy topic is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/{}", server.trim_end_matches('/'), topic.trim()),
        })
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .header("Title", subject)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("ntfy request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery(format!("ntfy returned status {status}")));
        }
        Ok(())
    }
}

// ==================== Desktop ====================

/// Run a blocking delivery call on the blocking pool.
#[cfg_attr(not(feature = "desktop"), allow(dead_code))]
async fn run_blocking<F>(deliver: F) -> Result<(), NotifyError>
where
    F: FnOnce() -> Result<(), NotifyError> + Send + 'static,
{
    tokio::task::spawn_blocking(deliver)
        .await
        .map_err(|e| NotifyError::Delivery(format!("notification task failed: {e}")))?
}

#[cfg(feature = "desktop")]
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier;

#[cfg(feature = "desktop")]
#[async_trait]
impl Notifier for DesktopNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let subject = subject.to_string();
        let body = body.to_string();

        // `show` blocks on the session bus.
        run_blocking(move || {
            notify_rust::Notification::new()
                .summary(&subject)
                .body(&body)
                .appname("Roadtest Monitor")
                .show()
                .map(|_| ())
                .map_err(|e| NotifyError::Delivery(format!("desktop notification failed: {e}")))
        })
        .await
    }
}

// ==================== Email ====================

/// Sends one plain-text mail per recipient over a single STARTTLS session.
#[cfg(feature = "email")]
pub struct EmailNotifier {
    mailer: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
    from: lettre::message::Mailbox,
    to: Vec<lettre::message::Mailbox>,
}

#[cfg(feature = "email")]
impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        use lettre::message::Mailbox;
        use lettre::transport::smtp::authentication::Credentials;

        let from: Mailbox = config
            .sender_address
            .parse()
            .map_err(|e| NotifyError::Config(format!("invalid sender address: {e}")))?;
        let to = config
            .receiver_addresses
            .iter()
            .map(|address| {
                address
                    .parse::<Mailbox>()
                    .map_err(|e| NotifyError::Config(format!("invalid receiver {address:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(NotifyError::Config("no receiver addresses".to_string()));
        }

        let mailer =
            lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&config.smtp_server)
                .map_err(|e| NotifyError::Config(format!("invalid SMTP server: {e}")))?
                .port(config.smtp_port)
                .credentials(Credentials::new(
                    config.sender_address.clone(),
                    config.sender_pass.clone(),
                ))
                .build();

        Ok(Self { mailer, from, to })
    }
}

#[cfg(feature = "email")]
#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        use lettre::message::header::ContentType;
        use lettre::{AsyncTransport, Message};

        let mut failures = Vec::new();
        for recipient in &self.to {
            let message = Message::builder()
                .from(self.from.clone())
                .to(recipient.clone())
                .subject(subject)
                .header(ContentType::TEXT_PLAIN)
                .body(body.to_string())
                .map_err(|e| NotifyError::Delivery(format!("failed to build message: {e}")))?;

            if let Err(e) = self.mailer.send(message).await {
                tracing::error!("Failed to send email to {}: {}", recipient, e);
                failures.push(format!("{recipient}: {e}"));
            }
        }

        if failures.is_empty() {
            tracing::info!("Emails sent successfully to {} recipient(s)", self.to.len());
            Ok(())
        } else {
            Err(NotifyError::Delivery(failures.join("; ")))
        }
    }
}

// ==================== Combined ====================

/// Sends to every channel. One channel failing does not stop the others;
/// the result is an error if any channel failed.
#[derive(Clone, Default)]
pub struct CombinedNotifier {
    channels: Vec<Arc<dyn Notifier>>,
}

impl CombinedNotifier {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn push(&mut self, channel: Arc<dyn Notifier>) {
        self.channels.push(channel);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl Notifier for CombinedNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let mut failures = Vec::new();
        for channel in &self.channels {
            if let Err(e) = channel.send(subject, body).await {
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Delivery(failures.join("; ")))
        }
    }
}

// ==================== Mock ====================

/// Mock notifier for testing that records every call.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    notifications: Arc<Mutex<Vec<(String, String)>>>,
    failing: Arc<AtomicBool>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails (the call is still recorded).
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get_notifications(&self) -> Vec<(String, String)> {
        self.notifications
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.lock().map(|list| list.len()).unwrap_or(0)
    }

    pub fn was_called(&self) -> bool {
        self.notification_count() > 0
    }

    pub fn clear(&self) {
        if let Ok(mut list) = self.notifications.lock() {
            list.clear();
        }
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        if let Ok(mut list) = self.notifications.lock() {
            list.push((subject.to_string(), body.to_string()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("mock failure".to_string()));
        }
        Ok(())
    }
}
