use std::time::Duration;

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::contracts::{MailError, MailTransport, OutgoingMail};
use crate::mail::compose::{build_message, parse_mailbox};
use crate::mail::SmtpConfig;

const TEST_SUBJECT: &str = "Test de connexion SMTP";
const TEST_BODY: &str = "Si vous recevez cet email, la configuration SMTP est correcte.";

/// SMTP mail transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    user: String,
    description: String,
}

impl SmtpMailer {
    /// Builds a transport from config. Does not connect.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from = parse_mailbox(config.sender())
            .map_err(|e| MailError::InvalidMessage(format!("invalid sender: {}", e)))?;

        let tls_params = TlsParameters::new(config.host.clone())
            .map_err(|e| MailError::Smtp(e.to_string()))?;
        let tls = if config.implicit_tls() {
            Tls::Wrapper(tls_params)
        } else {
            Tls::Opportunistic(tls_params)
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
            .port(config.port)
            .tls(tls)
            .credentials(Credentials::new(config.user.clone(), config.password.clone()))
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        let description = format!(
            "smtp://{}:{} ({})",
            config.host,
            config.port,
            if config.implicit_tls() { "tls" } else { "starttls" }
        );
        tracing::info!(
            host = %config.host,
            port = config.port,
            user = %config.user,
            "SMTP transporter initialized"
        );

        Ok(Self {
            transport,
            from,
            user: config.user.clone(),
            description,
        })
    }

    async fn deliver(&self, message: Message) -> Result<(), MailError> {
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| MailError::Smtp(e.to_string()))
    }

    /// Sends a fixed test message to the configured user.
    pub async fn send_test_message(&self) -> Result<(), MailError> {
        let mail = OutgoingMail {
            to: vec![self.user.clone()],
            subject: TEST_SUBJECT.into(),
            body: TEST_BODY.into(),
            attachments: Vec::new(),
        };
        self.send(&mail).await
    }
}

impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = build_message(&self.from, mail)?;
        self.deliver(message).await
    }

    async fn verify(&self) -> Result<(), MailError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailError::Smtp("SMTP server did not answer NOOP".into())),
            Err(e) => Err(MailError::Smtp(e.to_string())),
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16) -> SmtpConfig {
        SmtpConfig {
            host: "127.0.0.1".into(),
            port,
            user: "ops@example.com".into(),
            password: "wrong".into(),
            from: None,
            timeout_secs: 2,
        }
    }

    #[test]
    fn rejects_unparseable_sender() {
        let mut c = config(587);
        c.user = "apikey".into();
        assert!(matches!(
            SmtpMailer::new(&c),
            Err(MailError::InvalidMessage(_))
        ));
    }

    #[test]
    fn description_hides_credentials() {
        let mailer = SmtpMailer::new(&config(465)).unwrap();
        let d = mailer.describe();
        assert_eq!(d, "smtp://127.0.0.1:465 (tls)");
        assert!(!d.contains("wrong"));
    }

    #[tokio::test]
    async fn unreachable_server_reports_diagnostic() {
        // Nothing listens on port 1 locally
        let mailer = SmtpMailer::new(&config(1)).unwrap();
        let mail = OutgoingMail {
            to: vec!["client@example.com".into()],
            subject: "s".into(),
            body: "b".into(),
            attachments: Vec::new(),
        };
        match mailer.send(&mail).await {
            Err(MailError::Smtp(msg)) => assert!(!msg.is_empty()),
            other => panic!("expected SMTP error, got {:?}", other),
        }
    }
}
