//! Gmail REST v1 implementation of `MailboxSource`.
//!
//! Lists unread inbox messages (`is:unread in:inbox [after:<unix>]`,
//! page size capped), fetches full content, and clears the UNREAD
//! label. Access tokens are minted from the configured refresh token
//! and cached until shortly before expiry.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::MailboxConfig;
use crate::error::MailboxError;
use crate::mailbox::{FullMessage, MailboxSource, MessageHandle, MessageHeader, MessagePart};

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

// ── API response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<PayloadNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadNode {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<HeaderEntry>,
    #[serde(default)]
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<PayloadNode>,
}

#[derive(Debug, Deserialize)]
struct HeaderEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadBody {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

// ── Mailbox ─────────────────────────────────────────────────────────

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Gmail-backed mailbox source.
pub struct GmailMailbox {
    client: reqwest::Client,
    config: MailboxConfig,
    token: Mutex<Option<CachedToken>>,
}

impl GmailMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    /// Get a valid access token, minting a fresh one from the refresh
    /// token when the cached one is missing or about to expire.
    async fn access_token(&self) -> Result<String, MailboxError> {
        let mut guard = self.token.lock().await;
        if let Some(ref cached) = *guard {
            if cached.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(cached.access_token.clone());
            }
        }

        let resp = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("refresh_token", self.config.refresh_token.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailboxError::Auth(format!("Token refresh failed: {body}")));
        }

        let token: TokenResponse = resp.json().await?;
        let expires_in = token.expires_in.unwrap_or(3600);
        let access = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(expires_in as i64),
        });
        Ok(access)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, MailboxError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MailboxError::Auth("Access token rejected".into()));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MailboxError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }
}

fn node_to_part(node: PayloadNode) -> MessagePart {
    MessagePart {
        mime_type: node.mime_type,
        body_data: node.body.and_then(|b| b.data),
        parts: node.parts.into_iter().map(node_to_part).collect(),
    }
}

fn detail_to_message(detail: MessageDetail) -> FullMessage {
    let internal_timestamp = detail
        .internal_date
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    let (headers, payload) = match detail.payload {
        Some(mut node) => {
            let headers = std::mem::take(&mut node.headers)
                .into_iter()
                .map(|h| MessageHeader {
                    name: h.name,
                    value: h.value,
                })
                .collect();
            (headers, Some(node_to_part(node)))
        }
        None => (Vec::new(), None),
    };

    FullMessage {
        id: detail.id,
        thread_id: detail.thread_id,
        snippet: detail.snippet,
        headers,
        payload,
        internal_timestamp,
    }
}

#[async_trait]
impl MailboxSource for GmailMailbox {
    async fn list_candidate_messages(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MessageHandle>, MailboxError> {
        let token = self.access_token().await?;

        let cutoff = since.unwrap_or_else(|| Utc::now() - Duration::hours(24));
        let query = format!("is:unread in:inbox after:{}", cutoff.timestamp());
        debug!(query = %query, "Listing mailbox candidates");

        let resp = self
            .client
            .get(format!("{GMAIL_BASE}/messages"))
            .bearer_auth(&token)
            .query(&[
                ("q", query.as_str()),
                ("maxResults", &self.config.page_size.to_string()),
            ])
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let list: MessageListResponse = resp.json().await?;
        Ok(list
            .messages
            .into_iter()
            .map(|m| MessageHandle { id: m.id })
            .collect())
    }

    async fn fetch_full_message(
        &self,
        handle: &MessageHandle,
    ) -> Result<FullMessage, MailboxError> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .get(format!("{GMAIL_BASE}/messages/{}", handle.id))
            .bearer_auth(&token)
            .query(&[("format", "full")])
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let detail: MessageDetail = resp.json().await?;
        if detail.id.is_empty() {
            return Err(MailboxError::MalformedPayload(format!(
                "Message {} came back without an id",
                handle.id
            )));
        }
        Ok(detail_to_message(detail))
    }

    async fn mark_read(&self, handle: &MessageHandle) -> Result<(), MailboxError> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .post(format!("{GMAIL_BASE}/messages/{}/modify", handle.id))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "removeLabelIds": ["UNREAD"] }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_list_deserialization() {
        let json = r#"{
            "messages": [{"id": "m1", "threadId": "t1"}, {"id": "m2", "threadId": "t2"}],
            "resultSizeEstimate": 2
        }"#;
        let resp: MessageListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.messages.len(), 2);
        assert_eq!(resp.messages[0].id, "m1");
    }

    #[test]
    fn message_list_empty() {
        let json = r#"{"resultSizeEstimate": 0}"#;
        let resp: MessageListResponse = serde_json::from_str(json).unwrap();
        assert!(resp.messages.is_empty());
    }

    #[test]
    fn detail_maps_to_full_message() {
        let json = r#"{
            "id": "m1",
            "threadId": "t1",
            "snippet": "Thanks, sounds good",
            "internalDate": "1754300000000",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "From", "value": "Jane Doe <jane@acme.com>"},
                    {"name": "In-Reply-To", "value": "<abc@smtp>"}
                ],
                "parts": [
                    {"mimeType": "text/plain", "body": {"data": "eWVz"}, "parts": []}
                ]
            }
        }"#;
        let detail: MessageDetail = serde_json::from_str(json).unwrap();
        let msg = detail_to_message(detail);

        assert_eq!(msg.id, "m1");
        assert_eq!(msg.thread_id, "t1");
        assert_eq!(msg.header("from"), Some("Jane Doe <jane@acme.com>"));
        assert_eq!(msg.header("In-Reply-To"), Some("<abc@smtp>"));
        let payload = msg.payload.unwrap();
        assert_eq!(payload.parts.len(), 1);
        assert_eq!(payload.parts[0].mime_type, "text/plain");
        assert_eq!(msg.internal_timestamp.timestamp_millis(), 1754300000000);
    }

    #[test]
    fn detail_without_payload() {
        let json = r#"{"id": "m1", "threadId": "t1", "snippet": ""}"#;
        let detail: MessageDetail = serde_json::from_str(json).unwrap();
        let msg = detail_to_message(detail);
        assert!(msg.payload.is_none());
        assert!(msg.headers.is_empty());
    }
}
