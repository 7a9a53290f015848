//! SMTP error classification.

use serde::Serialize;

/// Broad cause of an SMTP failure, derived from the transport's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpFailure {
    ConnectionRefused,
    Authentication,
    Certificate,
    Timeout,
    Other,
}

impl SmtpFailure {
    /// Localized summary shown to the end user next to the raw diagnostic.
    pub fn summary(&self) -> &'static str {
        match self {
            SmtpFailure::ConnectionRefused => "Connexion refusée - vérifiez l'hôte et le port",
            SmtpFailure::Authentication => "Authentification échouée - vérifiez les identifiants",
            SmtpFailure::Certificate => {
                "Erreur de certificat SSL/TLS - vérifiez les paramètres de sécurité"
            }
            SmtpFailure::Timeout => "Délai d'attente dépassé - le serveur SMTP ne répond pas",
            SmtpFailure::Other => "Erreur de connexion SMTP",
        }
    }
}

/// Classifies an SMTP error message.
///
/// Matching is case-insensitive and checked in order: connection, then
/// authentication, then certificate, then timeout.
pub fn classify_smtp_error(err: &str) -> SmtpFailure {
    const CONNECTION: [&str; 4] = [
        "connection refused",
        "os error 111",
        "no route to host",
        "failed to lookup address",
    ];
    const AUTHENTICATION: [&str; 5] = [
        "authentication failed",
        "authentication unsuccessful",
        "invalid credentials",
        "(535)",
        "(534)",
    ];
    const CERTIFICATE: [&str; 3] = ["certificate", "handshake", "invalid peer"];
    const TIMEOUT: [&str; 2] = ["timeout", "timed out"];

    let err_lower = err.to_lowercase();
    let hit = |patterns: &[&str]| patterns.iter().any(|p| err_lower.contains(p));

    if hit(&CONNECTION) {
        SmtpFailure::ConnectionRefused
    } else if hit(&AUTHENTICATION) {
        SmtpFailure::Authentication
    } else if hit(&CERTIFICATE) {
        SmtpFailure::Certificate
    } else if hit(&TIMEOUT) {
        SmtpFailure::Timeout
    } else {
        SmtpFailure::Other
    }
}
