//! Classification invoker — one model call under a forced structured-output
//! contract, strict extraction of the resulting action plan.
//!
//! The provider is required to answer with a use of the `action_plan` schema.
//! Exactly one structured entry is accepted; zero entries and multiple
//! entries are both malformed responses. A forced single-schema call cannot
//! legitimately produce more than one, so multiplicity is surfaced as a
//! contract violation instead of quietly taking the first entry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::classify::composer::RequestComposer;
use crate::classify::fragment::ContentFragment;
use crate::error::ClassifyError;
use crate::mailbox::InboundEmail;

/// Name of the structured-output schema the provider must invoke.
pub const ACTION_PLAN_TOOL: &str = "action_plan";

// ── Structured output ───────────────────────────────────────────────

/// The model's classification result. All three fields are required and
/// non-empty; anything less is rejected before a value is ever produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    /// Subject for the internal admin email, naming the request category.
    pub admin_mail_subject: String,
    /// Instructions guiding the admin and related departments.
    pub admin_mail_body: String,
    /// Short acknowledgement sent back to the customer.
    pub customer_reply: String,
}

// ── Provider boundary ───────────────────────────────────────────────

/// A callable structured-output schema.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// The `action_plan` schema: three required string fields.
pub fn action_plan_schema() -> ToolSchema {
    ToolSchema {
        name: ACTION_PLAN_TOOL.to_string(),
        description: "Generate customer reply and admin actions for an insurance email"
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "adminMailSubject": {
                    "type": "string",
                    "description": "Subject for the admin mail naming the primary category of the policyholder request"
                },
                "adminMailBody": {
                    "type": "string",
                    "description": "Instructions for the admin to guide related departments"
                },
                "customerReply": {
                    "type": "string",
                    "description": "A reply of around 20-50 words with instructions for the customer if needed"
                }
            },
            "required": ["adminMailSubject", "adminMailBody", "customerReply"]
        }),
    }
}

/// One classification request: system instruction, composed fragments, and
/// the schema the response must use.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub system: String,
    pub fragments: Vec<ContentFragment>,
    pub schema: ToolSchema,
}

/// One entry of a provider response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEntry {
    /// Free-form text the provider produced alongside (or instead of) the
    /// structured result.
    Text(String),
    /// A structured-schema invocation.
    Structured {
        name: String,
        input: serde_json::Value,
    },
}

/// Raw provider response, before contract checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub entries: Vec<ResponseEntry>,
}

/// Model provider boundary — one synchronous classify call.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn classify(&self, request: ClassifyRequest) -> Result<ProviderResponse, ClassifyError>;
}

// ── Classifier ──────────────────────────────────────────────────────

/// Composes a request for one email, invokes the provider, and extracts the
/// action plan under the single-structured-result contract.
pub struct Classifier {
    provider: Arc<dyn ModelProvider>,
    composer: RequestComposer,
    system_instruction: String,
}

impl Classifier {
    pub fn new(provider: Arc<dyn ModelProvider>, system_instruction: impl Into<String>) -> Self {
        Self {
            provider,
            composer: RequestComposer::new(),
            system_instruction: system_instruction.into(),
        }
    }

    pub fn with_composer(mut self, composer: RequestComposer) -> Self {
        self.composer = composer;
        self
    }

    /// Classify one email into an [`ActionPlan`].
    pub async fn classify_email(&self, email: &InboundEmail) -> Result<ActionPlan, ClassifyError> {
        let fragments = self.composer.compose(email).await?;
        tracing::debug!(
            fragments = fragments.len(),
            attachments = email.attachments.len(),
            "Composed classification request"
        );

        let request = ClassifyRequest {
            system: self.system_instruction.clone(),
            fragments,
            schema: action_plan_schema(),
        };

        let response = self.provider.classify(request).await?;
        extract_action_plan(&response)
    }
}

/// Enforce the response contract: exactly one `action_plan` invocation with
/// all three fields populated.
pub fn extract_action_plan(response: &ProviderResponse) -> Result<ActionPlan, ClassifyError> {
    let structured: Vec<(&String, &serde_json::Value)> = response
        .entries
        .iter()
        .filter_map(|entry| match entry {
            ResponseEntry::Structured { name, input } => Some((name, input)),
            ResponseEntry::Text(_) => None,
        })
        .collect();

    let (name, input) = match structured.as_slice() {
        [] => {
            return Err(ClassifyError::MalformedResponse {
                reason: "no structured result in response".into(),
            });
        }
        [single] => *single,
        many => {
            return Err(ClassifyError::MalformedResponse {
                reason: format!(
                    "{} structured results for a single forced schema",
                    many.len()
                ),
            });
        }
    };

    if name != ACTION_PLAN_TOOL {
        return Err(ClassifyError::MalformedResponse {
            reason: format!("unexpected schema invocation '{name}'"),
        });
    }

    let plan: ActionPlan =
        serde_json::from_value(input.clone()).map_err(|e| ClassifyError::MalformedResponse {
            reason: format!("schema mismatch: {e}"),
        })?;

    for (field, value) in [
        ("adminMailSubject", &plan.admin_mail_subject),
        ("adminMailBody", &plan.admin_mail_body),
        ("customerReply", &plan.customer_reply),
    ] {
        if value.trim().is_empty() {
            return Err(ClassifyError::MalformedResponse {
                reason: format!("required field {field} is empty"),
            });
        }
    }

    Ok(plan)
}
