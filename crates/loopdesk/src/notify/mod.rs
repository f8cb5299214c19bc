//! Email notifications to administrators about loop activity.
//!
//! Messages are composed synchronously from the committed record and
//! delivered fire-and-forget on the ambient tokio runtime. Delivery never
//! blocks or fails the mutation that triggered it.

pub mod messages;
pub mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::user_repo::{self, Subscription};
use crate::db::{Database, DatabaseError};
use crate::hooks::{CommitEvent, CommitKind, HookError, PostCommitHook};
use crate::sanitize::redact_email;

pub use smtp::SmtpMailer;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email build error: {0}")]
    Build(String),

    #[error("Mailer configuration error: {0}")]
    Config(String),
}

/// A fully composed message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Used when SMTP is not configured: messages are logged, not sent.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        log::info!(
            "Email (not sent, SMTP disabled) to {}: {}",
            redact_email(&email.to),
            email.subject
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct LoopNotifier {
    db: Database,
    mailer: Arc<dyn Mailer>,
}

impl LoopNotifier {
    pub fn new(db: Database, mailer: Arc<dyn Mailer>) -> Self {
        Self { db, mailer }
    }

    /// Messages owed for a committed event, one per subscribed admin.
    pub fn messages_for(&self, event: &CommitEvent) -> Result<Vec<OutgoingEmail>, DatabaseError> {
        let messages = match &event.kind {
            CommitKind::LoopCreated { record } => {
                user_repo::subscribed_admins(&self.db, Subscription::NewLoops)?
                    .into_iter()
                    .filter_map(|admin| admin.email)
                    .map(|to| messages::new_loop(&to, record, &event.actor.name))
                    .collect()
            }
            CommitKind::LoopUpdated { record, changed } => {
                user_repo::subscribed_admins(&self.db, Subscription::UpdatedLoops)?
                    .into_iter()
                    .filter_map(|admin| admin.email)
                    .map(|to| messages::updated_loop(&to, record, &event.actor.name, changed))
                    .collect()
            }
            _ => Vec::new(),
        };
        Ok(messages)
    }

    /// Schedules delivery on the current tokio runtime and returns at once.
    pub fn dispatch(&self, messages: Vec<OutgoingEmail>) {
        if messages.is_empty() {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!(
                    "No async runtime available, dropping {} notification(s)",
                    messages.len()
                );
                return;
            }
        };

        let mailer = Arc::clone(&self.mailer);
        handle.spawn(async move {
            let total = messages.len();
            let mut sent = 0;
            for message in &messages {
                match mailer.send(message).await {
                    Ok(()) => sent += 1,
                    Err(e) => log::error!(
                        "Failed to send notification to {}: {}",
                        redact_email(&message.to),
                        e
                    ),
                }
            }
            log::info!("Loop notification sent to {}/{} admin(s)", sent, total);
        });
    }
}

/// Sends new/updated loop notifications after commit.
pub struct NotificationHook {
    notifier: LoopNotifier,
}

impl NotificationHook {
    pub fn new(notifier: LoopNotifier) -> Self {
        Self { notifier }
    }
}

impl PostCommitHook for NotificationHook {
    fn name(&self) -> &'static str {
        "notifications"
    }

    fn after_commit(&self, event: &CommitEvent) -> Result<(), HookError> {
        let messages = self.notifier.messages_for(event)?;
        self.notifier.dispatch(messages);
        Ok(())
    }
}
