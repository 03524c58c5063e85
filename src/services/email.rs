//! Transactional email delivery.
//!
//! One opaque operation: `send_code(address, code, purpose)`. Delivery
//! failures are logged and retried out-of-band; they never abort the
//! user-visible operation.

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

/// SMTP configuration; absent in development, where sends are logged only
#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
}

impl EmailConfig {
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        let smtp_port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(587);
        let smtp_username = std::env::var("SMTP_USERNAME").ok()?;
        let smtp_password = std::env::var("SMTP_PASSWORD").ok()?;
        let from_email = std::env::var("SMTP_FROM_EMAIL").ok()?;
        let from_name =
            std::env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Gatehouse".to_string());

        Some(Self {
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            from_email,
            from_name,
        })
    }
}

#[derive(Clone)]
pub struct EmailService {
    inner: Option<Arc<Inner>>,
}

struct Inner {
    config: EmailConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailService {
    /// Build from SMTP config; `None` yields a log-only service
    pub fn new(config: Option<EmailConfig>) -> anyhow::Result<Self> {
        let inner = match config {
            Some(config) => {
                let credentials = Credentials::new(
                    config.smtp_username.clone(),
                    config.smtp_password.clone(),
                );
                let mailer =
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                        .port(config.smtp_port)
                        .credentials(credentials)
                        .build();
                Some(Arc::new(Inner { config, mailer }))
            }
            None => {
                tracing::warn!("email_delivery_disabled_log_only");
                None
            }
        };

        Ok(Self { inner })
    }

    /// Send a verification code. Fire-and-forget from the caller's
    /// perspective: errors are logged, never propagated.
    pub async fn send_code(&self, address: &str, code: &str, purpose: &str) {
        let Some(inner) = &self.inner else {
            tracing::info!(address, purpose, "email_send_skipped_no_transport");
            return;
        };

        let subject = match purpose {
            "verification" => "Verify your account",
            "password reset" => "Reset your password",
            "login verification" => "Your login code",
            _ => "Your verification code",
        };

        let body = format!(
            "Your code is: {}\n\nThis code expires in 10 minutes. \
             If you did not request it, you can ignore this message.",
            code
        );

        let message = Message::builder()
            .from(Mailbox::new(
                Some(inner.config.from_name.clone()),
                match inner.config.from_email.parse() {
                    Ok(addr) => addr,
                    Err(e) => {
                        tracing::error!(error = %e, "email_invalid_from_address");
                        return;
                    }
                },
            ))
            .to(match address.parse() {
                Ok(addr) => Mailbox::new(None, addr),
                Err(e) => {
                    tracing::error!(error = %e, "email_invalid_recipient");
                    return;
                }
            })
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body);

        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, "email_build_failed");
                return;
            }
        };

        match inner.mailer.send(message).await {
            Ok(_) => {
                tracing::info!(purpose, "email_sent");
            }
            Err(e) => {
                // Retried out-of-band; the calling flow has already succeeded.
                tracing::error!(error = %e, purpose, "email_send_failed");
            }
        }
    }
}
