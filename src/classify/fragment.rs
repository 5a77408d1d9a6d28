//! Content fragments — the units of a model request body.
//!
//! A fragment sequence is ordered and the order is meaningful: it mirrors the
//! attachment order of the source email. The serde shape matches the
//! provider's content-block wire format, so a request body is just the
//! serialized fragment list.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// One unit of request content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentFragment {
    /// Plain text.
    Text { text: String },
    /// Inline media (rasterized PDF pages, image attachments).
    Image { source: MediaSource },
    /// Long-form document payload. Tagging concern only — consumers that
    /// don't distinguish documents from inline media treat both the same.
    Document { source: MediaSource },
}

/// Base64-encoded media payload with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    Base64 { media_type: String, data: String },
}

impl ContentFragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Base64-encode raw bytes into an inline media fragment.
    pub fn image(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self::Image {
            source: MediaSource::Base64 {
                media_type: media_type.into(),
                data: BASE64.encode(data),
            },
        }
    }

    /// Base64-encode raw bytes into a document fragment.
    pub fn document(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self::Document {
            source: MediaSource::Base64 {
                media_type: media_type.into(),
                data: BASE64.encode(data),
            },
        }
    }

    /// The declared media type, for media-bearing fragments.
    pub fn media_type(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Image { source } | Self::Document { source } => {
                let MediaSource::Base64 { media_type, .. } = source;
                Some(media_type)
            }
        }
    }
}
