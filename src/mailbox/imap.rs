//! IMAP + SMTP mailbox gateway.
//!
//! Inbound side speaks raw IMAP over rustls on a blocking socket (run under
//! `spawn_blocking`); outbound side uses lettre's SMTP transport. Each
//! operation opens a fresh short-lived IMAP session.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders};

use crate::error::{ConfigError, MailboxError};
use crate::mailbox::{EmailAttachment, InboundEmail, MailboxGateway, OutboundEmail};

// ── Configuration ───────────────────────────────────────────────────

/// Mailbox connection configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl MailboxConfig {
    /// Build config from environment variables. `CLAIMFLOW_IMAP_HOST`,
    /// `CLAIMFLOW_USERNAME` and `CLAIMFLOW_PASSWORD` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_host = require_env("CLAIMFLOW_IMAP_HOST", "e.g. imap.gmail.com")?;

        let imap_port: u16 = std::env::var("CLAIMFLOW_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host = std::env::var("CLAIMFLOW_SMTP_HOST")
            .unwrap_or_else(|_| imap_host.replace("imap", "smtp"));

        let smtp_port: u16 = std::env::var("CLAIMFLOW_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = require_env("CLAIMFLOW_USERNAME", "mailbox login")?;
        let password = require_env("CLAIMFLOW_PASSWORD", "mailbox password or app token")?;
        let from_address =
            std::env::var("CLAIMFLOW_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Ok(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

fn require_env(key: &str, hint: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    })
}

// ── Gateway ─────────────────────────────────────────────────────────

/// Production [`MailboxGateway`] over IMAP (inbound) and SMTP (outbound).
pub struct ImapMailbox {
    config: MailboxConfig,
}

impl ImapMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&MailboxConfig) -> Result<T, MailboxError> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || op(&config))
            .await
            .map_err(|e| MailboxError::Protocol(format!("blocking task failed: {e}")))?
    }
}

fn send_email(config: &MailboxConfig, email: &OutboundEmail) -> Result<(), MailboxError> {
    let creds = Credentials::new(config.username.clone(), config.password.clone());

    let transport = SmtpTransport::relay(&config.smtp_host)
        .map_err(|e| MailboxError::SendFailed {
            to: email.to.clone(),
            reason: format!("SMTP relay error: {e}"),
        })?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    let message = build_message(&config.from_address, email)?;

    transport
        .send(&message)
        .map_err(|e| MailboxError::SendFailed {
            to: email.to.clone(),
            reason: format!("SMTP send failed: {e}"),
        })?;

    tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
    Ok(())
}

#[async_trait]
impl MailboxGateway for ImapMailbox {
    async fn fetch_latest_unread(&self) -> Result<Option<InboundEmail>, MailboxError> {
        self.run_blocking(fetch_latest_unread_imap).await
    }

    async fn is_spam(&self, message_id: &str) -> Result<bool, MailboxError> {
        let uid = message_id.to_string();
        self.run_blocking(move |cfg| {
            let mut session = ImapSession::connect(cfg)?;
            let flags = session.fetch_flags(&uid)?;
            session.logout();
            Ok(flags.iter().any(|f| f.eq_ignore_ascii_case("$junk")
                || f.eq_ignore_ascii_case("junk")
                || f.eq_ignore_ascii_case("\\junk")))
        })
        .await
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MailboxError> {
        let uid = message_id.to_string();
        self.run_blocking(move |cfg| {
            let mut session = ImapSession::connect(cfg)?;
            session.store_flags(&uid, "+FLAGS", "\\Seen")?;
            session.logout();
            Ok(())
        })
        .await
    }

    async fn mark_unread(&self, message_id: &str) -> Result<(), MailboxError> {
        let uid = message_id.to_string();
        self.run_blocking(move |cfg| {
            let mut session = ImapSession::connect(cfg)?;
            session.store_flags(&uid, "-FLAGS", "\\Seen")?;
            session.logout();
            Ok(())
        })
        .await
    }

    async fn send(&self, email: OutboundEmail) -> Result<(), MailboxError> {
        self.run_blocking(move |cfg| send_email(cfg, &email)).await
    }
}

// ── Outbound message assembly ───────────────────────────────────────

/// Build a lettre [`Message`] from an [`OutboundEmail`]: plain body, optional
/// forwarded attachments, optional In-Reply-To/References threading.
pub fn build_message(from: &str, email: &OutboundEmail) -> Result<Message, MailboxError> {
    let from_mailbox: Mailbox = from.parse().map_err(|e| MailboxError::SendFailed {
        to: email.to.clone(),
        reason: format!("Invalid from address: {e}"),
    })?;
    let to_mailbox: Mailbox = email.to.parse().map_err(|e| MailboxError::SendFailed {
        to: email.to.clone(),
        reason: format!("Invalid to address: {e}"),
    })?;

    let mut builder = Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(&email.subject);

    if let Some(ref wire_id) = email.in_reply_to {
        builder = builder
            .in_reply_to(wire_id.clone())
            .references(wire_id.clone());
    }

    let message = if email.attachments.is_empty() {
        builder
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
    } else {
        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(email.body.clone()));
        for att in &email.attachments {
            let content_type = ContentType::parse(&att.media_type)
                .unwrap_or(ContentType::parse("application/octet-stream").unwrap());
            multipart = multipart
                .singlepart(Attachment::new(att.filename.clone()).body(att.data.clone(), content_type));
        }
        builder.multipart(multipart)
    };

    message.map_err(|e| MailboxError::SendFailed {
        to: email.to.clone(),
        reason: format!("Failed to build email: {e}"),
    })
}

// ── Blocking IMAP session ───────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Short-lived IMAP session over TLS with INBOX selected.
struct ImapSession {
    tls: TlsStream,
    tag_counter: u32,
}

impl ImapSession {
    fn connect(config: &MailboxConfig) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port)).map_err(|e| {
            MailboxError::ConnectFailed {
                host: config.imap_host.clone(),
                port: config.imap_port,
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name: rustls::pki_types::ServerName<'_> =
            rustls::pki_types::ServerName::try_from(config.imap_host.clone())
                .map_err(|e| MailboxError::Protocol(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Protocol(format!("TLS setup failed: {e}")))?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let mut session = Self { tls, tag_counter: 0 };

        // Greeting
        session.read_line()?;

        let login = session.command(&format!(
            "LOGIN \"{}\" \"{}\"",
            config.username, config.password
        ))?;
        if !response_ok(&login) {
            return Err(MailboxError::AuthFailed {
                username: config.username.clone(),
            });
        }

        let select = session.command("SELECT \"INBOX\"")?;
        if !response_ok(&select) {
            return Err(MailboxError::Protocol("SELECT INBOX failed".into()));
        }

        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match std::io::Read::read(&mut self.tls, &mut byte) {
                Ok(0) => return Err(MailboxError::Protocol("IMAP connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send one command and collect response lines up to the tagged line.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, MailboxError> {
        self.tag_counter += 1;
        let tag = format!("C{}", self.tag_counter);
        let full = format!("{tag} {cmd}\r\n");
        IoWrite::write_all(&mut self.tls, full.as_bytes())?;
        IoWrite::flush(&mut self.tls)?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(lines)
    }

    /// UIDs of unseen messages in INBOX, in mailbox order.
    fn search_unseen(&mut self) -> Result<Vec<String>, MailboxError> {
        let resp = self.command("SEARCH UNSEEN")?;
        let mut uids = Vec::new();
        for line in &resp {
            if line.starts_with("* SEARCH") {
                uids.extend(
                    line.split_whitespace()
                        .skip(2)
                        .map(|s| s.trim().to_string()),
                );
            }
        }
        Ok(uids)
    }

    /// Fetch the full raw message without touching the \Seen flag.
    fn fetch_raw(&mut self, uid: &str) -> Result<String, MailboxError> {
        let resp = self.command(&format!("FETCH {uid} BODY.PEEK[]"))?;
        if resp.len() < 3 {
            return Err(MailboxError::FetchFailed(format!(
                "short FETCH response for {uid}"
            )));
        }
        // First line is the untagged FETCH header, last two are the closing
        // paren and the tagged OK.
        let raw: String = resp
            .iter()
            .skip(1)
            .take(resp.len().saturating_sub(3))
            .cloned()
            .collect();
        Ok(raw)
    }

    fn fetch_flags(&mut self, uid: &str) -> Result<Vec<String>, MailboxError> {
        let resp = self.command(&format!("FETCH {uid} FLAGS"))?;
        for line in &resp {
            if let Some(start) = line.find("FLAGS (")
                && let Some(end) = line[start + 7..].find(')')
            {
                return Ok(line[start + 7..start + 7 + end]
                    .split_whitespace()
                    .map(|s| s.to_string())
                    .collect());
            }
        }
        Ok(Vec::new())
    }

    fn store_flags(&mut self, uid: &str, op: &str, flag: &str) -> Result<(), MailboxError> {
        let resp = self.command(&format!("STORE {uid} {op} ({flag})"))?;
        if response_ok(&resp) {
            Ok(())
        } else {
            Err(MailboxError::FlagFailed {
                message_id: uid.to_string(),
                reason: format!("STORE {op} {flag} rejected"),
            })
        }
    }

    fn logout(&mut self) {
        let _ = self.command("LOGOUT");
    }
}

fn response_ok(lines: &[String]) -> bool {
    lines.last().is_some_and(|l| l.contains("OK"))
}

/// One blocking poll: latest unseen message, parsed, with attachments.
fn fetch_latest_unread_imap(config: &MailboxConfig) -> Result<Option<InboundEmail>, MailboxError> {
    let mut session = ImapSession::connect(config)?;

    let uids = session.search_unseen()?;
    let Some(uid) = uids.last().cloned() else {
        session.logout();
        return Ok(None);
    };

    let raw = session.fetch_raw(&uid)?;
    session.logout();

    let parsed = MessageParser::default()
        .parse(raw.as_bytes())
        .ok_or_else(|| MailboxError::FetchFailed(format!("unparseable message {uid}")))?;

    Ok(Some(parsed_to_inbound(&uid, &parsed)))
}

/// Convert a parsed message into the gateway's inbound shape.
fn parsed_to_inbound(uid: &str, parsed: &mail_parser::Message) -> InboundEmail {
    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into());

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();
    let wire_message_id = parsed
        .message_id()
        .map(|s| format!("<{s}>"))
        .unwrap_or_default();
    let date = parsed.date().map(|d| d.to_rfc3339()).unwrap_or_default();
    let body = extract_text(parsed);

    let attachments = parsed
        .attachments()
        .map(|part| {
            let media_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".into());
            let filename = part.attachment_name().unwrap_or("attachment").to_string();
            EmailAttachment::new(media_type, filename, part.contents().to_vec())
        })
        .collect();

    InboundEmail {
        message_id: uid.to_string(),
        wire_message_id,
        sender,
        date,
        subject,
        body,
        attachments,
    }
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    "(no readable content)".to_string()
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn strip_html_whitespace_normalized() {
        assert_eq!(strip_html("<p>  Hello   World  </p>"), "Hello World");
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("No HTML here"), "No HTML here");
    }

    #[test]
    fn parsed_message_maps_headers_and_attachments() {
        let raw = concat!(
            "From: Alice <alice@example.com>\r\n",
            "To: claims@example.com\r\n",
            "Subject: Claim status\r\n",
            "Message-ID: <abc123@example.com>\r\n",
            "Date: Mon, 1 Jan 2024 10:00:00 +0000\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "Please check my claim\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=\"notes.txt\"\r\n",
            "\r\n",
            "attached notes\r\n",
            "--b1--\r\n",
        );
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let inbound = parsed_to_inbound("42", &parsed);

        assert_eq!(inbound.message_id, "42");
        assert_eq!(inbound.sender, "alice@example.com");
        assert_eq!(inbound.subject, "Claim status");
        assert_eq!(inbound.wire_message_id, "<abc123@example.com>");
        assert!(inbound.body.contains("Please check my claim"));
        assert_eq!(inbound.attachments.len(), 1);
        assert_eq!(inbound.attachments[0].filename, "notes.txt");
        assert_eq!(inbound.attachments[0].primary_type(), "text");
    }

    #[test]
    fn parsed_message_without_optional_headers() {
        let raw = "From: bob@x.com\r\n\r\nbody only\r\n";
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let inbound = parsed_to_inbound("7", &parsed);

        assert_eq!(inbound.subject, "(no subject)");
        assert_eq!(inbound.wire_message_id, "");
        assert!(inbound.attachments.is_empty());
    }

    #[test]
    fn build_message_plain_without_attachments() {
        let email = OutboundEmail::new("alice@example.com", "Re: Claim status", "We received it.")
            .in_reply_to("<abc@example.com>");
        let message = build_message("claims@example.com", &email).unwrap();
        let rendered = String::from_utf8(message.formatted()).unwrap();

        assert!(rendered.contains("Subject: Re: Claim status"));
        assert!(rendered.contains("In-Reply-To: <abc@example.com>"));
        assert!(rendered.contains("References: <abc@example.com>"));
        assert!(rendered.contains("We received it."));
    }

    #[test]
    fn build_message_forwards_attachments() {
        let email = OutboundEmail::new("admin@example.com", "Action plan", "Handle this.")
            .with_attachments(vec![EmailAttachment::new(
                "application/pdf",
                "claim.pdf",
                b"%PDF-1.4 fake".to_vec(),
            )]);
        let message = build_message("claims@example.com", &email).unwrap();
        let rendered = String::from_utf8(message.formatted()).unwrap();

        assert!(rendered.contains("multipart/mixed"));
        assert!(rendered.contains("claim.pdf"));
    }

    #[test]
    fn build_message_rejects_bad_address() {
        let email = OutboundEmail::new("not-an-address", "x", "y");
        assert!(build_message("claims@example.com", &email).is_err());
    }

    #[test]
    fn response_ok_checks_tagged_line() {
        let lines = vec!["* SEARCH 1 2".to_string(), "C1 OK SEARCH done".to_string()];
        assert!(response_ok(&lines));
        let lines = vec!["C1 NO SEARCH failed".to_string()];
        assert!(!response_ok(&lines));
    }
}
