//! Anthropic provider — reqwest client for the Messages API.
//!
//! One POST per classification with the fragment list as the user message
//! content and `tool_choice` forcing the structured schema.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::classify::invoker::{ClassifyRequest, ModelProvider, ProviderResponse, ResponseEntry};
use crate::error::ClassifyError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
}

impl AnthropicConfig {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 1000,
        }
    }
}

/// [`ModelProvider`] backed by the Anthropic Messages API.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn provider_err(&self, reason: impl Into<String>) -> ClassifyError {
        ClassifyError::Provider {
            provider: self.provider_name().to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn classify(&self, request: ClassifyRequest) -> Result<ProviderResponse, ClassifyError> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let body = build_request_body(&self.config.model, self.config.max_tokens, &request)?;

        let response = self
            .http
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.provider_err(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(self.provider_err(format!("HTTP {status}: {detail}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| self.provider_err(format!("invalid response body: {e}")))?;

        tracing::debug!(model = %self.config.model, "Classification response received");
        Ok(parse_response(&payload))
    }
}

/// Assemble the Messages API request body.
fn build_request_body(
    model: &str,
    max_tokens: u32,
    request: &ClassifyRequest,
) -> Result<Value, ClassifyError> {
    Ok(json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": request.system,
        "messages": [{
            "role": "user",
            "content": serde_json::to_value(&request.fragments)?,
        }],
        "tools": [{
            "name": request.schema.name,
            "description": request.schema.description,
            "input_schema": request.schema.input_schema,
        }],
        "tool_choice": {"type": "tool", "name": request.schema.name},
    }))
}

/// Map the response content blocks onto provider-neutral entries. Unknown
/// block types are dropped; contract checks happen in the invoker.
fn parse_response(payload: &Value) -> ProviderResponse {
    let entries = payload["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| match block["type"].as_str() {
                    Some("text") => block["text"]
                        .as_str()
                        .map(|t| ResponseEntry::Text(t.to_string())),
                    Some("tool_use") => Some(ResponseEntry::Structured {
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        input: block["input"].clone(),
                    }),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    ProviderResponse { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::fragment::ContentFragment;
    use crate::classify::invoker::action_plan_schema;

    fn sample_request() -> ClassifyRequest {
        ClassifyRequest {
            system: "Act as an insurance desk.".into(),
            fragments: vec![
                ContentFragment::text("header"),
                ContentFragment::image("image/png", b"img"),
            ],
            schema: action_plan_schema(),
        }
    }

    #[test]
    fn request_body_forces_the_schema() {
        let body = build_request_body("claude-3-5-sonnet-latest", 1000, &sample_request()).unwrap();

        assert_eq!(body["model"], "claude-3-5-sonnet-latest");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["system"], "Act as an insurance desk.");
        assert_eq!(body["tool_choice"]["type"], "tool");
        assert_eq!(body["tool_choice"]["name"], "action_plan");
        assert_eq!(body["tools"].as_array().unwrap().len(), 1);
        assert_eq!(body["tools"][0]["name"], "action_plan");
    }

    #[test]
    fn request_body_carries_fragments_as_user_content() {
        let body = build_request_body("m", 1000, &sample_request()).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");

        let content = messages[0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["source"]["type"], "base64");
    }

    #[test]
    fn parse_response_maps_tool_use_blocks() {
        let payload = json!({
            "content": [
                {"type": "text", "text": "classifying"},
                {"type": "tool_use", "id": "t1", "name": "action_plan", "input": {"customerReply": "ok"}}
            ]
        });
        let response = parse_response(&payload);
        assert_eq!(response.entries.len(), 2);
        assert_eq!(
            response.entries[0],
            ResponseEntry::Text("classifying".into())
        );
        match &response.entries[1] {
            ResponseEntry::Structured { name, input } => {
                assert_eq!(name, "action_plan");
                assert_eq!(input["customerReply"], "ok");
            }
            other => panic!("Expected Structured, got {other:?}"),
        }
    }

    #[test]
    fn parse_response_without_content_is_empty() {
        let response = parse_response(&json!({"id": "msg_1"}));
        assert!(response.entries.is_empty());
    }

    #[test]
    fn parse_response_ignores_unknown_block_types() {
        let payload = json!({
            "content": [{"type": "thinking", "thinking": "hmm"}]
        });
        let response = parse_response(&payload);
        assert!(response.entries.is_empty());
    }
}
