//! Dispatch loop — poll, classify, reply.
//!
//! Sequential ticks, one message in flight at a time. Each tick fetches the
//! latest unread message, skips it when the provider flags it as spam,
//! otherwise classifies it and sends the customer acknowledgement plus the
//! admin action plan. On any failure the message is returned to unread so a
//! later tick retries it; there is no partial-send path.
//!
//! Retries are bounded: after `max_attempts` consecutive failures a message
//! is dead-lettered (marked read so it stops recycling) and logged as an
//! error for operator follow-up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::classify::Classifier;
use crate::error::Error;
use crate::mailbox::{InboundEmail, MailboxGateway, OutboundEmail};

/// Dispatch configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Address receiving the internal action-plan email.
    pub admin_address: String,
    /// Delay between polling ticks.
    pub poll_interval: Duration,
    /// Consecutive failures before a message is dead-lettered.
    pub max_attempts: u32,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No unread mail.
    Idle,
    /// Message was spam-flagged; no classification, no state change.
    SpamSkipped,
    /// Both outbound emails sent, message marked read.
    Dispatched,
    /// Classification or send failed; message returned to unread.
    Failed,
    /// Attempts exhausted; message marked read and abandoned.
    DeadLettered,
}

/// The polling loop. Owns the per-message attempt counter; nothing else is
/// shared between ticks.
pub struct DispatchLoop {
    gateway: Arc<dyn MailboxGateway>,
    classifier: Classifier,
    config: DispatchConfig,
    attempts: HashMap<String, u32>,
}

impl DispatchLoop {
    pub fn new(
        gateway: Arc<dyn MailboxGateway>,
        classifier: Classifier,
        config: DispatchConfig,
    ) -> Self {
        Self {
            gateway,
            classifier,
            config,
            attempts: HashMap::new(),
        }
    }

    /// Run until externally terminated.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            admin = %self.config.admin_address,
            "Dispatch loop started"
        );

        let mut tick = tokio::time::interval(self.config.poll_interval);
        loop {
            tick.tick().await;
            self.tick().await;
        }
    }

    /// One poll-classify-reply cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        let email = match self.gateway.fetch_latest_unread().await {
            Ok(Some(email)) => email,
            Ok(None) => return TickOutcome::Idle,
            Err(e) => {
                error!(error = %e, "Mailbox fetch failed");
                return TickOutcome::Failed;
            }
        };

        info!(
            message_id = %email.message_id,
            sender = %email.sender,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "Unread message fetched"
        );

        match self.gateway.is_spam(&email.message_id).await {
            Ok(true) => {
                info!(message_id = %email.message_id, "Message is spam-flagged; skipping");
                return TickOutcome::SpamSkipped;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(message_id = %email.message_id, error = %e, "Spam check failed");
                return self.handle_failure(&email, e.into()).await;
            }
        }

        match self.process(&email).await {
            Ok(()) => {
                self.attempts.remove(&email.message_id);
                info!(message_id = %email.message_id, "Message dispatched");
                TickOutcome::Dispatched
            }
            Err(e) => self.handle_failure(&email, e).await,
        }
    }

    /// Classify and send both outbound emails, then consume the unread flag.
    async fn process(&self, email: &InboundEmail) -> Result<(), Error> {
        let plan = self.classifier.classify_email(email).await?;
        debug!(
            message_id = %email.message_id,
            admin_subject = %plan.admin_mail_subject,
            "Action plan received"
        );

        let customer_reply = OutboundEmail::new(
            email.sender.clone(),
            reply_subject(&email.subject),
            plan.customer_reply,
        )
        .in_reply_to(email.wire_message_id.clone());
        self.gateway.send(customer_reply).await?;

        let admin_plan = OutboundEmail::new(
            self.config.admin_address.clone(),
            plan.admin_mail_subject,
            plan.admin_mail_body,
        )
        .with_attachments(email.attachments.clone());
        self.gateway.send(admin_plan).await?;

        self.gateway.mark_read(&email.message_id).await?;
        Ok(())
    }

    /// Return the message to unread for a later retry, or dead-letter it
    /// once the attempt budget is spent.
    async fn handle_failure(&mut self, email: &InboundEmail, cause: Error) -> TickOutcome {
        let attempts = *self
            .attempts
            .entry(email.message_id.clone())
            .and_modify(|n| *n += 1)
            .or_insert(1);

        if attempts >= self.config.max_attempts {
            error!(
                message_id = %email.message_id,
                sender = %email.sender,
                attempts,
                error = %cause,
                "Attempts exhausted; dead-lettering message"
            );
            self.attempts.remove(&email.message_id);
            if let Err(e) = self.gateway.mark_read(&email.message_id).await {
                error!(message_id = %email.message_id, error = %e, "Failed to dead-letter message");
            }
            return TickOutcome::DeadLettered;
        }

        warn!(
            message_id = %email.message_id,
            attempt = attempts,
            max_attempts = self.config.max_attempts,
            error = %cause,
            "Processing failed; message stays unread for retry"
        );
        // Some providers set the seen flag as a fetch side effect; restore.
        if let Err(e) = self.gateway.mark_unread(&email.message_id).await {
            error!(message_id = %email.message_id, error = %e, "Failed to mark message unread");
        }
        TickOutcome::Failed
    }
}

/// Reply subject, avoiding stacked `Re:` prefixes.
fn reply_subject(subject: &str) -> String {
    if subject.trim_start().to_lowercase().starts_with("re:") {
        subject.trim_start().to_string()
    } else {
        format!("Re: {subject}")
    }
}
