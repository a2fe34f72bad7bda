//! Verification e-mail delivery.
//!
//! Registration hands a [`VerificationEmail`] to an [`EmailSender`] and does
//! not wait for it. `LogEmailSender` is the development default and writes
//! the link to the log; `SmtpEmailSender` delivers through an SMTP relay.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

/// Email sending error.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A verification link addressed to one registrant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationEmail {
    pub to: String,
    pub first_name: Option<String>,
    pub link: String,
}

impl VerificationEmail {
    pub fn subject(&self) -> &'static str {
        "Zafira Solidaire : confirmez votre adresse e-mail"
    }

    fn greeting(&self) -> String {
        match self.first_name.as_deref() {
            Some(name) => format!("Bonjour {name},"),
            None => "Bonjour,".to_string(),
        }
    }

    pub fn text_body(&self) -> String {
        format!(
            "{}\n\nMerci de votre inscription. Confirmez votre adresse e-mail en ouvrant ce lien \
             (valable 24 heures) :\n\n{}\n\nSi vous n'êtes pas à l'origine de cette demande, \
             ignorez ce message.\n",
            self.greeting(),
            self.link
        )
    }

    pub fn html_body(&self) -> String {
        format!(
            "<p>{}</p><p>Merci de votre inscription. Confirmez votre adresse e-mail \
             (lien valable 24 heures) :</p><p><a href=\"{link}\">{link}</a></p>\
             <p>Si vous n'êtes pas à l'origine de cette demande, ignorez ce message.</p>",
            self.greeting(),
            link = self.link
        )
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_verification(&self, email: &VerificationEmail) -> Result<(), EmailError>;
}

/// Local dev sender that logs the link instead of sending real email.
#[derive(Debug, Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_verification(&self, email: &VerificationEmail) -> Result<(), EmailError> {
        info!(to = %email.to, link = %email.link, "verification email (log sender)");
        Ok(())
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    /// `From:` header, e.g. `Zafira Solidaire <no-reply@zafira.org>`.
    pub from: String,
}

/// Sender delivering through an SMTP relay.
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(settings: SmtpSettings) -> Result<Self, EmailError> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| EmailError::InvalidConfig(format!("Invalid from address: {e}")))?;

        let mut builder = if settings.use_tls {
            let tls_params = TlsParameters::new(settings.host.clone())
                .map_err(|e| EmailError::InvalidConfig(format!("TLS configuration error: {e}")))?;

            // Port 465 uses implicit TLS, other ports use STARTTLS
            if settings.port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                    .map_err(|e| EmailError::InvalidConfig(format!("SMTP relay error: {e}")))?
                    .port(settings.port)
                    .tls(Tls::Wrapper(tls_params))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(|e| EmailError::InvalidConfig(format!("SMTP relay error: {e}")))?
                    .port(settings.port)
                    .tls(Tls::Required(tls_params))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
                .port(settings.port)
        };

        if let (Some(user), Some(pass)) = (settings.username, settings.password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_verification(&self, email: &VerificationEmail) -> Result<(), EmailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| EmailError::SendFailed(format!("Invalid to address: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body()),
                    ),
            )
            .map_err(|e| EmailError::SendFailed(format!("Failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> VerificationEmail {
        VerificationEmail {
            to: "a@x.com".into(),
            first_name: Some("Ada".into()),
            link: "http://localhost:3000/verify-email?token=abc".into(),
        }
    }

    #[test]
    fn bodies_contain_link_and_greeting() {
        let email = email();
        assert!(email.text_body().contains(&email.link));
        assert!(email.html_body().contains(&email.link));
        assert!(email.text_body().starts_with("Bonjour Ada,"));
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        assert!(LogEmailSender.send_verification(&email()).await.is_ok());
    }

    #[test]
    fn smtp_sender_without_tls() {
        let sender = SmtpEmailSender::new(SmtpSettings {
            host: "localhost".into(),
            port: 25,
            username: None,
            password: None,
            use_tls: false,
            from: "Zafira Solidaire <no-reply@zafira.org>".into(),
        });
        assert!(sender.is_ok());
    }

    #[test]
    fn smtp_sender_rejects_bad_from() {
        let sender = SmtpEmailSender::new(SmtpSettings {
            host: "localhost".into(),
            port: 25,
            username: Some("user".into()),
            password: Some("pass".into()),
            use_tls: false,
            from: "not an address".into(),
        });
        assert!(matches!(sender, Err(EmailError::InvalidConfig(_))));
    }
}
