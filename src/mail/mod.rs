//! Outbound mail: SMTP transport, message composition and relay.

mod classify;
pub mod compose;
mod config;
mod smtp;

pub use classify::{classify_smtp_error, SmtpFailure};
pub use compose::{draft_for_slip, validate, EmailDraft};
pub use config::{SmtpConfig, IMPLICIT_TLS_PORT};
pub use smtp::SmtpMailer;

use crate::contracts::{MailError, MailTransport, OutgoingMail};

/// Validates `mail` and hands it to `transport` exactly once.
///
/// A missing transport means SMTP was never configured.
pub async fn relay<M: MailTransport>(
    transport: Option<&M>,
    mail: &OutgoingMail,
) -> Result<(), MailError> {
    let transport = transport.ok_or(MailError::NotConfigured)?;
    validate(mail)?;

    tracing::info!(
        recipients = mail.to.len(),
        attachments = mail.attachments.len(),
        subject = %mail.subject,
        "Relaying email"
    );

    match transport.send(mail).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "Error sending email");
            Err(e)
        }
    }
}
