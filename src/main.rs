use std::sync::Arc;

use anyhow::Context;
use claimflow::classify::{AnthropicProvider, Classifier};
use claimflow::config::AppConfig;
use claimflow::dispatch::DispatchLoop;
use claimflow::mailbox::ImapMailbox;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;

    eprintln!("📬 claimflow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   IMAP: {}", config.mailbox.imap_host);
    eprintln!("   SMTP: {}", config.mailbox.smtp_host);
    eprintln!("   Model: {}", config.anthropic.model);
    eprintln!("   Admin: {}", config.dispatch.admin_address);
    eprintln!(
        "   Polling every {}s, {} attempts per message\n",
        config.dispatch.poll_interval.as_secs(),
        config.dispatch.max_attempts
    );

    let gateway = Arc::new(ImapMailbox::new(config.mailbox));
    let provider = Arc::new(AnthropicProvider::new(config.anthropic));
    let classifier = Classifier::new(provider, config.system_instruction);

    DispatchLoop::new(gateway, classifier, config.dispatch)
        .run()
        .await;

    Ok(())
}
