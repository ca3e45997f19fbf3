//! OAuth2 authorization-code exchange — operator tooling, not part of
//! the steady-state pipeline. Used once to obtain the long-lived
//! refresh token the mailbox adapter runs on.

use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::MailboxConfig;
use crate::error::MailboxError;

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Result of an authorization-code exchange.
#[derive(Debug, Deserialize)]
pub struct ExchangedTokens {
    pub access_token: String,
    /// Absent when the consent screen was not prompted for offline
    /// access; the operator must redo the consent flow in that case.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Exchange an authorization code for tokens.
pub async fn exchange_authorization_code(
    config: &MailboxConfig,
    code: &str,
    redirect_uri: &str,
) -> Result<ExchangedTokens, MailboxError> {
    let client = reqwest::Client::new();
    let resp = client
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    if !resp.status().is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MailboxError::Auth(format!("Code exchange failed: {body}")));
    }

    Ok(resp.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_response_deserialization() {
        let json = r#"{
            "access_token": "ya29.abc",
            "refresh_token": "1//rt",
            "expires_in": 3599,
            "token_type": "Bearer"
        }"#;
        let tokens: ExchangedTokens = serde_json::from_str(json).unwrap();
        assert_eq!(tokens.access_token, "ya29.abc");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//rt"));
    }

    #[test]
    fn refresh_token_may_be_absent() {
        let json = r#"{"access_token": "ya29.abc"}"#;
        let tokens: ExchangedTokens = serde_json::from_str(json).unwrap();
        assert!(tokens.refresh_token.is_none());
    }
}
