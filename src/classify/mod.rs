//! Email classification — request composition, provider invocation, and
//! structured-result extraction.

pub mod anthropic;
pub mod composer;
pub mod fragment;
pub mod invoker;
pub mod materialize;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use composer::{AttachmentCue, RequestComposer};
pub use fragment::{ContentFragment, MediaSource};
pub use invoker::{
    ActionPlan, ClassifyRequest, Classifier, ModelProvider, ProviderResponse, ResponseEntry,
    ToolSchema, action_plan_schema,
};
pub use materialize::materialize;
