//! Mailbox gateway — inbound fetch and outbound send over a mail provider.
//!
//! The [`MailboxGateway`] trait is the seam between the dispatch loop and the
//! actual mail provider. The production implementation lives in [`imap`]
//! (IMAP over rustls for inbound, SMTP via lettre for outbound); tests use
//! in-memory fakes.

pub mod imap;

use async_trait::async_trait;

pub use imap::{ImapMailbox, MailboxConfig};

use crate::error::MailboxError;

// ── Inbound types ───────────────────────────────────────────────────

/// One attachment as listed from a message.
///
/// Created when the message is fetched, consumed once when the model request
/// is composed, discarded after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    /// Declared media type, e.g. `text/plain`, `application/pdf`, `image/png`.
    pub media_type: String,
    /// Original filename.
    pub filename: String,
    /// Raw payload bytes.
    pub data: Vec<u8>,
}

impl EmailAttachment {
    pub fn new(media_type: impl Into<String>, filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            filename: filename.into(),
            data,
        }
    }

    /// Primary media-type category: `"text"` for `text/plain`, etc.
    pub fn primary_type(&self) -> &str {
        self.media_type
            .split('/')
            .next()
            .unwrap_or(&self.media_type)
    }
}

/// An unread email as fetched from the mailbox. Immutable once read.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// Provider-native message id, used for flag updates.
    pub message_id: String,
    /// RFC 5322 Message-ID header, used to thread the reply. Empty when the
    /// message carried none.
    pub wire_message_id: String,
    /// Sender address.
    pub sender: String,
    /// Date header, verbatim.
    pub date: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Attachments in original order.
    pub attachments: Vec<EmailAttachment>,
}

// ── Outbound types ──────────────────────────────────────────────────

/// An email to send through the gateway.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Attachments to forward, in order.
    pub attachments: Vec<EmailAttachment>,
    /// Message-ID to thread against (sets In-Reply-To and References).
    pub in_reply_to: Option<String>,
}

impl OutboundEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
            in_reply_to: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<EmailAttachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn in_reply_to(mut self, wire_message_id: impl Into<String>) -> Self {
        let id = wire_message_id.into();
        if !id.is_empty() {
            self.in_reply_to = Some(id);
        }
        self
    }
}

// ── Gateway trait ───────────────────────────────────────────────────

/// Mail provider boundary — pure I/O, no classification logic.
#[async_trait]
pub trait MailboxGateway: Send + Sync {
    /// Fetch the most recent unread message, with attachments. `None` when
    /// the inbox has no unread mail. Fetching does not consume the unread
    /// flag; callers decide via [`mark_read`](Self::mark_read) /
    /// [`mark_unread`](Self::mark_unread).
    async fn fetch_latest_unread(&self) -> Result<Option<InboundEmail>, MailboxError>;

    /// Whether the provider has flagged this message as spam.
    async fn is_spam(&self, message_id: &str) -> Result<bool, MailboxError>;

    async fn mark_read(&self, message_id: &str) -> Result<(), MailboxError>;

    async fn mark_unread(&self, message_id: &str) -> Result<(), MailboxError>;

    async fn send(&self, email: OutboundEmail) -> Result<(), MailboxError>;
}
