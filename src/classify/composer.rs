//! Request composer — assembles the model request body for one email.
//!
//! Output is an ordered fragment sequence: a fixed-format header rendering of
//! the email, an attachment-presence sentinel, then the materialized
//! fragments of each attachment in original order. The composition is
//! deterministic: identical input produces a byte-identical sequence.

use crate::classify::fragment::ContentFragment;
use crate::classify::materialize::materialize;
use crate::error::MaterializeError;
use crate::mailbox::InboundEmail;

/// Fixed sentinel wording announcing whether attachments follow.
///
/// Injectable so deployments can tune how the attachment context is phrased
/// without growing a second composer.
#[derive(Debug, Clone)]
pub struct AttachmentCue {
    pub present: String,
    pub absent: String,
}

impl Default for AttachmentCue {
    fn default() -> Self {
        Self {
            present: "These are the attachments included in the email.".to_string(),
            absent: "No attachments were included in the email.".to_string(),
        }
    }
}

/// Composes the full fragment sequence for one inbound email.
#[derive(Debug, Clone, Default)]
pub struct RequestComposer {
    cue: AttachmentCue,
}

impl RequestComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cue(cue: AttachmentCue) -> Self {
        Self { cue }
    }

    /// Build the ordered fragment sequence for `email`.
    ///
    /// Attachment order and within-attachment fragment order are preserved.
    pub async fn compose(
        &self,
        email: &InboundEmail,
    ) -> Result<Vec<ContentFragment>, MaterializeError> {
        let mut fragments = Vec::with_capacity(2 + email.attachments.len());

        fragments.push(ContentFragment::text(render_email_header(email)));
        fragments.push(ContentFragment::text(if email.attachments.is_empty() {
            self.cue.absent.clone()
        } else {
            self.cue.present.clone()
        }));

        for attachment in &email.attachments {
            fragments.extend(materialize(attachment).await?);
        }

        Ok(fragments)
    }
}

/// Fixed-format rendering of the email envelope and body.
pub fn render_email_header(email: &InboundEmail) -> String {
    format!(
        "Analyze this insurance-related email and categorize it.\n\n\
         Email content:\n\
         From: {}\n\
         Date: {}\n\
         Subject: {}\n\
         Body:\n{}",
        email.sender, email.date, email.subject, email.body
    )
}
