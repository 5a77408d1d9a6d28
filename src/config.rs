//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::classify::AnthropicConfig;
use crate::dispatch::DispatchConfig;
use crate::error::ConfigError;
use crate::mailbox::MailboxConfig;

/// Default system instruction for the classification call. Deployments
/// override it with `CLAIMFLOW_SYSTEM_PROMPT` (inline) or
/// `CLAIMFLOW_SYSTEM_PROMPT_FILE` (path).
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are the intake desk of an insurance company. You read incoming \
policyholder emails, including their attachments, and produce an action \
plan: a subject and body for an internal admin email that routes the \
request to the right department, and a short reply acknowledging the \
customer. Be factual and concise; never promise coverage decisions.";

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mailbox: MailboxConfig,
    pub anthropic: AnthropicConfig,
    pub dispatch: DispatchConfig,
    pub system_instruction: String,
}

impl AppConfig {
    /// Build the full configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mailbox = MailboxConfig::from_env()?;

        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            ConfigError::MissingRequired {
                key: "ANTHROPIC_API_KEY".into(),
                hint: "export ANTHROPIC_API_KEY=sk-ant-...".into(),
            }
        })?;
        let model = std::env::var("CLAIMFLOW_MODEL")
            .unwrap_or_else(|_| "claude-3-5-sonnet-latest".to_string());
        let anthropic = AnthropicConfig::new(SecretString::from(api_key), model);

        let admin_address = std::env::var("CLAIMFLOW_ADMIN_ADDRESS").map_err(|_| {
            ConfigError::MissingRequired {
                key: "CLAIMFLOW_ADMIN_ADDRESS".into(),
                hint: "address that receives the internal action-plan email".into(),
            }
        })?;

        let poll_interval_secs: u64 = std::env::var("CLAIMFLOW_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let max_attempts: u32 = std::env::var("CLAIMFLOW_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let dispatch = DispatchConfig {
            admin_address,
            poll_interval: Duration::from_secs(poll_interval_secs),
            max_attempts,
        };

        let system_instruction = resolve_system_instruction(
            std::env::var("CLAIMFLOW_SYSTEM_PROMPT").ok(),
            std::env::var("CLAIMFLOW_SYSTEM_PROMPT_FILE")
                .ok()
                .map(PathBuf::from),
        )?;

        Ok(Self {
            mailbox,
            anthropic,
            dispatch,
            system_instruction,
        })
    }
}

/// Pick the system instruction: inline text wins over a file path, and the
/// built-in default covers the rest.
pub fn resolve_system_instruction(
    inline: Option<String>,
    file: Option<PathBuf>,
) -> Result<String, ConfigError> {
    if let Some(text) = inline {
        if text.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CLAIMFLOW_SYSTEM_PROMPT".into(),
                message: "must not be empty".into(),
            });
        }
        return Ok(text);
    }
    if let Some(path) = file {
        let text = std::fs::read_to_string(&path)?;
        if text.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CLAIMFLOW_SYSTEM_PROMPT_FILE".into(),
                message: format!("{} is empty", path.display()),
            });
        }
        return Ok(text);
    }
    Ok(DEFAULT_SYSTEM_INSTRUCTION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn inline_instruction_wins() {
        let result =
            resolve_system_instruction(Some("custom".into()), Some(PathBuf::from("/missing")))
                .unwrap();
        assert_eq!(result, "custom");
    }

    #[test]
    fn empty_inline_instruction_is_invalid() {
        assert!(resolve_system_instruction(Some("  ".into()), None).is_err());
    }

    #[test]
    fn file_instruction_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "file instruction").unwrap();
        let result =
            resolve_system_instruction(None, Some(file.path().to_path_buf())).unwrap();
        assert_eq!(result.trim(), "file instruction");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = resolve_system_instruction(None, Some(PathBuf::from("/no/such/file")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn default_instruction_when_nothing_configured() {
        let result = resolve_system_instruction(None, None).unwrap();
        assert_eq!(result, DEFAULT_SYSTEM_INSTRUCTION);
    }
}
