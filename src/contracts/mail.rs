use std::future::Future;

use serde::{Deserialize, Deserializer, Serialize};

use crate::contracts::error::MailError;

/// A file attached to an outgoing mail, as it arrives over JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailAttachment {
    pub filename: String,
    /// Base64-encoded bytes.
    pub content: String,
    #[serde(rename = "contentType", alias = "content_type")]
    pub content_type: String,
}

/// Message handed to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMail {
    /// Accepts either a single address or a list.
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<MailAttachment>,
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Outbound mail transport.
///
/// # Behavior
/// - A message is sent whole or not at all
/// - Failures carry the transport's own diagnostic
/// - No retries; callers decide whether to resend
pub trait MailTransport: Send + Sync {
    /// Sends one message.
    fn send(&self, mail: &OutgoingMail) -> impl Future<Output = Result<(), MailError>> + Send;

    /// Checks that the transport can connect and authenticate.
    fn verify(&self) -> impl Future<Output = Result<(), MailError>> + Send;

    /// Short transport description for health output (never includes secrets).
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_accepts_single_address() {
        let mail: OutgoingMail = serde_json::from_value(serde_json::json!({
            "to": "client@example.com",
            "subject": "s",
            "body": "b"
        }))
        .unwrap();
        assert_eq!(mail.to, vec!["client@example.com".to_string()]);
        assert!(mail.attachments.is_empty());
    }

    #[test]
    fn attachment_accepts_camel_case_content_type() {
        let mail: OutgoingMail = serde_json::from_value(serde_json::json!({
            "to": ["a@example.com", "b@example.com"],
            "subject": "s",
            "body": "b",
            "attachments": [
                { "filename": "x.pdf", "content": "AAAA", "contentType": "application/pdf" }
            ]
        }))
        .unwrap();
        assert_eq!(mail.to.len(), 2);
        assert_eq!(mail.attachments[0].content_type, "application/pdf");
    }
}
