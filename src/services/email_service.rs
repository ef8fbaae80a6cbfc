use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::error::AppError;

/// Outbound email seam. The dispatcher only depends on this trait so tests
/// can substitute a recording transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError>;
}

pub struct EmailService {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailService {
    pub fn new(config: SmtpConfig) -> Result<Self, AppError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::Config(format!("smtp transport: {e}")))?
            .port(config.port);

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError> {
        if to.trim().is_empty() {
            return Err(AppError::Validation("recipient email cannot be empty".into()));
        }

        let from = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid from address: {e}")))?;
        let to = to
            .parse()
            .map_err(|e| AppError::Validation(format!("invalid to address: {e}")))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(strip_tags(html)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .map_err(|e| AppError::Transport(format!("build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Transport(format!("send email: {e}")))?;

        Ok(())
    }
}

/// Crude plaintext alternative for the multipart body; good enough for the
/// short notification templates below.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Subject and HTML body for the new-message nudge. The subject carries the
/// sender's name and listing title so the email is meaningful from the inbox
/// list alone.
pub fn new_message_email(
    sender_name: &str,
    listing_title: &str,
    preview: &str,
    link: &str,
) -> (String, String) {
    let subject = format!("{sender_name} messaged you about \"{listing_title}\"");
    let preview = if preview.chars().count() > 140 {
        let truncated: String = preview.chars().take(140).collect();
        format!("{truncated}…")
    } else {
        preview.to_string()
    };
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>New message on CampusMarket</h2>
    <p><strong>{sender_name}</strong> sent you a message about <strong>{listing_title}</strong>:</p>
    <blockquote style="border-left: 3px solid #ddd; margin: 16px 0; padding: 8px 16px; color: #555;">{preview}</blockquote>
    <p><a href="{link}" style="display: inline-block; background-color: #007bff; color: white; padding: 10px 20px; text-decoration: none; border-radius: 4px;">Reply on CampusMarket</a></p>
    <p style="font-size: 12px; color: #888;">You receive at most one email per conversation until you visit the site again.</p>
  </div>
</body>
</html>"#
    );
    (subject, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_names_sender_and_listing() {
        let (subject, html) =
            new_message_email("Ana", "Desk lamp", "Is this still available?", "http://x/l/1");
        assert!(subject.contains("Ana"));
        assert!(subject.contains("Desk lamp"));
        assert!(html.contains("Is this still available?"));
    }

    #[test]
    fn long_previews_are_truncated() {
        let long = "a".repeat(500);
        let (_, html) = new_message_email("Ana", "Desk lamp", &long, "http://x");
        assert!(!html.contains(&long));
        assert!(html.contains('…'));
    }

    #[test]
    fn strip_tags_flattens_markup() {
        assert_eq!(strip_tags("<p>hi <b>there</b></p>"), "hi there");
    }
}
