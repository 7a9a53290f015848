use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::Message;
use serde::Serialize;

use crate::contracts::{MailAttachment, MailError, OutgoingMail, Party, Slip, SlipKind};

/// An attachment after base64 decoding and MIME parsing.
pub struct DecodedAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: ContentType,
}

/// Parses one recipient address.
pub fn parse_mailbox(addr: &str) -> Result<Mailbox, MailError> {
    addr.trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::InvalidRecipient(format!("{}: {}", addr, e)))
}

/// Decodes an attachment. Accepts raw base64 or a `data:` URL and ignores
/// embedded whitespace.
pub fn decode_attachment(att: &MailAttachment) -> Result<DecodedAttachment, MailError> {
    let invalid = |reason: String| MailError::InvalidAttachment {
        filename: att.filename.clone(),
        reason,
    };

    let payload = match att.content.split_once(";base64,") {
        Some((head, rest)) if head.starts_with("data:") => rest,
        _ => att.content.as_str(),
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| invalid(e.to_string()))?;
    let content_type =
        ContentType::parse(&att.content_type).map_err(|e| invalid(e.to_string()))?;

    Ok(DecodedAttachment {
        filename: att.filename.clone(),
        bytes,
        content_type,
    })
}

/// Checks a message without sending it. Everything that can be rejected
/// before touching the network is rejected here.
pub fn validate(mail: &OutgoingMail) -> Result<(), MailError> {
    if mail.to.is_empty() {
        return Err(MailError::NoRecipients);
    }
    for addr in &mail.to {
        parse_mailbox(addr)?;
    }
    for att in &mail.attachments {
        decode_attachment(att)?;
    }
    Ok(())
}

/// HTML alternative of a plain-text body: newlines become `<br>`.
pub fn html_body(body: &str) -> String {
    body.replace("\r\n", "\n").replace('\n', "<br>")
}

/// Builds the MIME message: text + HTML alternative, then attachments.
pub fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<Message, MailError> {
    if mail.to.is_empty() {
        return Err(MailError::NoRecipients);
    }

    let mut builder = Message::builder()
        .from(from.clone())
        .subject(mail.subject.clone());
    for addr in &mail.to {
        builder = builder.to(parse_mailbox(addr)?);
    }

    let mut parts = MultiPart::mixed().multipart(MultiPart::alternative_plain_html(
        mail.body.clone(),
        html_body(&mail.body),
    ));
    for att in &mail.attachments {
        let decoded = decode_attachment(att)?;
        parts = parts.singlepart(
            Attachment::new(decoded.filename).body(decoded.bytes, decoded.content_type),
        );
    }

    builder
        .multipart(parts)
        .map_err(|e| MailError::InvalidMessage(e.to_string()))
}

/// Pre-filled email for sending a bordereau to the slip's client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailDraft {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment_filename: String,
}

pub fn draft_for_slip(slip: &Slip, client: Option<&Party>) -> EmailDraft {
    let client_name = client.map(|c| c.name.as_str()).unwrap_or("Client");
    let (subject, document) = match slip.kind {
        SlipKind::Transport => (
            format!("Bordereau de transport - {} - {}", client_name, slip.number),
            "de transport",
        ),
        SlipKind::Freight => (
            format!("Confirmation d'affrètement - {} - {}", client_name, slip.number),
            "d'affrètement",
        ),
    };

    EmailDraft {
        to: client.and_then(|c| c.email.clone()).into_iter().collect(),
        subject,
        body: format!(
            "Bonjour,\n\nVeuillez trouver ci-joint le bordereau {}.\n\nCordialement,\nMZN Transport",
            document
        ),
        attachment_filename: format!("bordereau_{}.pdf", slip.number),
    }
}
