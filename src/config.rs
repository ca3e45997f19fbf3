//! Configuration types, built from environment variables.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Mailbox (Gmail API) configuration.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// OAuth2 client id.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: SecretString,
    /// Long-lived refresh token used to mint access tokens.
    pub refresh_token: SecretString,
    /// Mailbox owner address (used for logging only).
    pub user_email: String,
    /// Maximum messages fetched per poll.
    pub page_size: u32,
}

impl MailboxConfig {
    /// Build config from environment variables.
    ///
    /// Requires `GMAIL_CLIENT_ID`, `GMAIL_CLIENT_SECRET` and
    /// `GMAIL_REFRESH_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id = require_env("GMAIL_CLIENT_ID")?;
        let client_secret = SecretString::from(require_env("GMAIL_CLIENT_SECRET")?);
        let refresh_token = SecretString::from(require_env("GMAIL_REFRESH_TOKEN")?);

        let user_email = std::env::var("GMAIL_USER_EMAIL").unwrap_or_default();

        let page_size: u32 = std::env::var("MAILBOX_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);

        Ok(Self {
            client_id,
            client_secret,
            refresh_token,
            user_email,
            page_size,
        })
    }
}

/// Mail poller configuration.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Seconds between polling runs.
    pub interval_secs: u64,
    /// How far back the first poll looks, in hours.
    pub lookback_hours: i64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            lookback_hours: 24,
        }
    }
}

impl PollConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let interval_secs = std::env::var("MAIL_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.interval_secs);

        let lookback_hours = std::env::var("MAIL_POLL_LOOKBACK_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.lookback_hours);

        Self {
            interval_secs,
            lookback_hours,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub port: u16,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl HttpConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        Self {
            port,
            max_upload_bytes: defaults.max_upload_bytes,
        }
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_config_defaults() {
        let cfg = PollConfig::default();
        assert_eq!(cfg.interval_secs, 300);
        assert_eq!(cfg.lookback_hours, 24);
    }

    #[test]
    fn http_config_upload_cap_is_10mb() {
        let cfg = HttpConfig::default();
        assert_eq!(cfg.max_upload_bytes, 10 * 1024 * 1024);
    }
}
