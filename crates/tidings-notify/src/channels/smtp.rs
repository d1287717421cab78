use crate::error::NotifyError;
use crate::{EmailMessage, Mailer};
use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

const MAX_ATTEMPTS: u32 = 3;

/// SMTP relay settings (the `[smtp]` table of the server config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> crate::error::Result<Self> {
        if config.host.trim().is_empty() {
            return Err(NotifyError::InvalidConfig("smtp host is empty".to_string()));
        }
        let from = parse_mailbox(&config.from)?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.port(config.port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

fn parse_mailbox(address: &str) -> crate::error::Result<Mailbox> {
    address.parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&message.to)?)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?;

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.transport.send(email.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        recipient = %message.to,
                        error = %e,
                        "Email send failed, retrying"
                    );
                    last_err = Some(e);
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(std::time::Duration::from_millis(
                            100 * 2u64.pow(attempt),
                        ))
                        .await;
                    }
                }
            }
        }

        match last_err {
            Some(e) => Err(anyhow::anyhow!(
                "email to {} failed after {MAX_ATTEMPTS} attempts: {e}",
                message.to
            )),
            None => Ok(()),
        }
    }

    fn transport_name(&self) -> &str {
        "smtp"
    }
}
