use std::fmt;

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Port on which SMTP speaks TLS from the first byte.
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP connection settings.
#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    #[serde(alias = "smtp_host", default)]
    pub host: String,
    #[serde(
        alias = "smtp_port",
        default = "default_port",
        deserialize_with = "port_from_number_or_string"
    )]
    pub port: u16,
    #[serde(alias = "smtp_user", default)]
    pub user: String,
    #[serde(alias = "smtp_pass", default)]
    pub password: String,
    /// Sender address. Falls back to `user` when absent.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    587
}

fn default_timeout_secs() -> u64 {
    30
}

/// Settings forms post the port as text; an empty string means "unset" (0).
fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(n) => Ok(n),
        Port::Text(t) if t.trim().is_empty() => Ok(0),
        Port::Text(t) => t.trim().parse().map_err(de::Error::custom),
    }
}

// Never print the password
impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("from", &self.from)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SmtpConfig {
    /// Reads SMTP settings from the environment.
    ///
    /// Returns `None` when `BORDEREAU_SMTP_HOST` is unset, in which case the
    /// relay stays uninitialized.
    ///
    /// Reads:
    /// - `BORDEREAU_SMTP_HOST`
    /// - `BORDEREAU_SMTP_PORT` (default: 587)
    /// - `BORDEREAU_SMTP_USER`
    /// - `BORDEREAU_SMTP_PASSWORD`
    /// - `BORDEREAU_SMTP_FROM` (default: the user)
    /// - `BORDEREAU_SMTP_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("BORDEREAU_SMTP_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())?;

        Some(Self {
            host,
            port: std::env::var("BORDEREAU_SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_port),
            user: std::env::var("BORDEREAU_SMTP_USER").unwrap_or_default(),
            password: std::env::var("BORDEREAU_SMTP_PASSWORD").unwrap_or_default(),
            from: std::env::var("BORDEREAU_SMTP_FROM").ok(),
            timeout_secs: std::env::var("BORDEREAU_SMTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout_secs),
        })
    }

    /// Port 465 gets implicit TLS; anything else negotiates STARTTLS if the
    /// server offers it.
    pub fn implicit_tls(&self) -> bool {
        self.port == IMPLICIT_TLS_PORT
    }

    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.user)
    }

    /// True when every field needed to authenticate is filled in.
    pub fn is_complete(&self) -> bool {
        !self.host.trim().is_empty()
            && self.port != 0
            && !self.user.trim().is_empty()
            && !self.password.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port,
            user: "contact@example.com".into(),
            password: "hunter2".into(),
            from: None,
            timeout_secs: 30,
        }
    }

    #[test]
    fn tls_mode_follows_port() {
        assert!(config(465).implicit_tls());
        assert!(!config(587).implicit_tls());
        assert!(!config(25).implicit_tls());
    }

    #[test]
    fn sender_defaults_to_user() {
        let mut c = config(587);
        assert_eq!(c.sender(), "contact@example.com");
        c.from = Some("\"MZN Transport\" <noreply@example.com>".into());
        assert_eq!(c.sender(), "\"MZN Transport\" <noreply@example.com>");
    }

    #[test]
    fn debug_redacts_password() {
        let out = format!("{:?}", config(587));
        assert!(!out.contains("hunter2"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn deserializes_settings_form_field_names() {
        let c: SmtpConfig = serde_json::from_value(serde_json::json!({
            "smtp_host": "smtp.example.com",
            "smtp_port": 465,
            "smtp_user": "u@example.com",
            "smtp_pass": "p"
        }))
        .unwrap();
        assert!(c.implicit_tls());
        assert!(c.is_complete());
    }

    #[test]
    fn port_may_arrive_as_text() {
        let c: SmtpConfig = serde_json::from_value(serde_json::json!({
            "smtp_host": "smtp.example.com",
            "smtp_port": "587",
            "smtp_user": "u@example.com",
            "smtp_pass": "p"
        }))
        .unwrap();
        assert_eq!(c.port, 587);

        let empty: SmtpConfig = serde_json::from_value(serde_json::json!({
            "smtp_host": "",
            "smtp_port": ""
        }))
        .unwrap();
        assert!(!empty.is_complete());
    }

    #[test]
    fn incomplete_without_password() {
        let mut c = config(587);
        c.password.clear();
        assert!(!c.is_complete());
    }

    #[test]
    fn from_env_reads_settings() {
        std::env::set_var("BORDEREAU_SMTP_HOST", "mail.example.org");
        std::env::set_var("BORDEREAU_SMTP_PORT", "465");
        std::env::set_var("BORDEREAU_SMTP_USER", "ops@example.org");
        std::env::set_var("BORDEREAU_SMTP_PASSWORD", "secret");
        std::env::set_var("BORDEREAU_SMTP_TIMEOUT_SECS", "not-a-number");

        let c = SmtpConfig::from_env().unwrap();
        assert_eq!(c.host, "mail.example.org");
        assert_eq!(c.port, 465);
        assert_eq!(c.timeout_secs, 30);
        assert_eq!(c.sender(), "ops@example.org");

        std::env::set_var("BORDEREAU_SMTP_HOST", "  ");
        assert!(SmtpConfig::from_env().is_none());

        std::env::remove_var("BORDEREAU_SMTP_HOST");
        std::env::remove_var("BORDEREAU_SMTP_PORT");
        std::env::remove_var("BORDEREAU_SMTP_USER");
        std::env::remove_var("BORDEREAU_SMTP_PASSWORD");
        std::env::remove_var("BORDEREAU_SMTP_TIMEOUT_SECS");
    }
}
