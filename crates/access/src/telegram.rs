//! Telegram Bot API client
//!
//! Thin reqwest-based client for the handful of Bot API methods the access
//! executor needs: invite link management, member removal, and direct
//! messages. Errors carry the permanent/transient split the executor's
//! swallow-or-rethrow policy depends on.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::error::{AccessError, AccessResult};

/// Telegram Bot API errors
#[derive(Debug, Error)]
pub enum TelegramError {
    /// The API answered with ok=false. 4xx responses (bad request, missing
    /// permissions, entity already in the target state) are permanent;
    /// 429 and 5xx are transient.
    #[error("API error {code}: {description}")]
    Api { code: i64, description: String },

    /// Transport-level failure before a response was decoded
    #[error("Network error: {0}")]
    Network(String),
}

impl TelegramError {
    /// Whether a retry could change the outcome
    pub fn is_retryable(&self) -> bool {
        match self {
            TelegramError::Network(_) => true,
            TelegramError::Api { code, .. } => *code == 429 || *code >= 500,
        }
    }
}

/// Telegram bot configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    pub bot_token: String,
    /// API base URL, overridable for tests
    pub api_base: String,
}

impl TelegramConfig {
    pub fn from_env() -> AccessResult<Self> {
        Ok(Self {
            bot_token: std::env::var("TELEGRAM_BOT_TOKEN")
                .map_err(|_| AccessError::Config("TELEGRAM_BOT_TOKEN not set".to_string()))?,
            api_base: std::env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

/// An invite link as returned by the Bot API
#[derive(Debug, Clone, Deserialize)]
pub struct ChatInviteLink {
    pub invite_link: String,
    #[serde(default)]
    pub is_revoked: bool,
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> AccessResult<Self> {
        Ok(Self::new(TelegramConfig::from_env()?))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<T, TelegramError> {
        let url = format!(
            "{}/bot{}/{}",
            self.config.api_base, self.config.bot_token, method
        );

        let response = self
            .client
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| TelegramError::Network(e.to_string()))?;

        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            // A 5xx with an unparseable body is still a transient failure
            if status.is_server_error() {
                TelegramError::Network(format!("HTTP {}: {}", status, e))
            } else {
                TelegramError::Api {
                    code: status.as_u16() as i64,
                    description: format!("Unparseable response: {}", e),
                }
            }
        })?;

        if body.ok {
            body.result.ok_or_else(|| TelegramError::Api {
                code: 500,
                description: "ok response without result".to_string(),
            })
        } else {
            Err(TelegramError::Api {
                code: body.error_code.unwrap_or(status.as_u16() as i64),
                description: body
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    /// Create a fresh invite link for a channel
    pub async fn create_invite_link(
        &self,
        chat_id: i64,
        expire_date: Option<i64>,
        member_limit: Option<i32>,
    ) -> Result<ChatInviteLink, TelegramError> {
        let mut params = serde_json::json!({ "chat_id": chat_id });
        if let Some(expire) = expire_date {
            params["expire_date"] = serde_json::json!(expire);
        }
        if let Some(limit) = member_limit {
            params["member_limit"] = serde_json::json!(limit);
        }
        self.call("createChatInviteLink", &params).await
    }

    /// Revoke a previously issued invite link
    pub async fn revoke_invite_link(
        &self,
        chat_id: i64,
        invite_link: &str,
    ) -> Result<ChatInviteLink, TelegramError> {
        let params = serde_json::json!({ "chat_id": chat_id, "invite_link": invite_link });
        self.call("revokeChatInviteLink", &params).await
    }

    /// Ban a member from a channel
    pub async fn ban_chat_member(&self, chat_id: i64, user_id: i64) -> Result<bool, TelegramError> {
        let params = serde_json::json!({ "chat_id": chat_id, "user_id": user_id });
        self.call("banChatMember", &params).await
    }

    /// Lift a ban so the member can rejoin on a future purchase
    pub async fn unban_chat_member(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<bool, TelegramError> {
        let params =
            serde_json::json!({ "chat_id": chat_id, "user_id": user_id, "only_if_banned": true });
        self.call("unbanChatMember", &params).await
    }

    /// Send a direct message to a user
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let params = serde_json::json!({ "chat_id": chat_id, "text": text });
        let _: serde_json::Value = self.call("sendMessage", &params).await?;
        Ok(())
    }
}

/// Extract the hash component of an invite link for storage
pub fn invite_hash(invite_link: &str) -> Option<String> {
    invite_link
        .rsplit('/')
        .next()
        .map(|h| h.trim_start_matches('+').to_string())
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn test_client(server_url: &str) -> TelegramClient {
        TelegramClient::new(TelegramConfig {
            bot_token: "test-token".to_string(),
            api_base: server_url.to_string(),
        })
    }

    #[test]
    fn test_invite_hash_extraction() {
        assert_eq!(
            invite_hash("https://t.me/+AbCdEfGh123"),
            Some("AbCdEfGh123".to_string())
        );
        assert_eq!(
            invite_hash("https://t.me/joinchat/XyZ"),
            Some("XyZ".to_string())
        );
        assert_eq!(invite_hash(""), None);
    }

    #[test]
    fn test_error_retryability() {
        let permission = TelegramError::Api {
            code: 403,
            description: "not enough rights".to_string(),
        };
        assert!(!permission.is_retryable());

        let rate_limited = TelegramError::Api {
            code: 429,
            description: "Too Many Requests".to_string(),
        };
        assert!(rate_limited.is_retryable());

        let server = TelegramError::Api {
            code: 502,
            description: "Bad Gateway".to_string(),
        };
        assert!(server.is_retryable());

        let network = TelegramError::Network("connection reset".to_string());
        assert!(network.is_retryable());
    }

    #[tokio::test]
    async fn test_create_invite_link_passes_limits() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottest-token/createChatInviteLink")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "chat_id": -100123,
                "expire_date": 1_700_000_000i64,
                "member_limit": 1,
            })))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "ok": true,
                    "result": { "invite_link": "https://t.me/+fresh123", "is_revoked": false }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let link = client
            .create_invite_link(-100123, Some(1_700_000_000), Some(1))
            .await
            .unwrap();

        assert_eq!(link.invite_link, "https://t.me/+fresh123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_carries_code_and_description() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bottest-token/banChatMember")
            .with_status(400)
            .with_body(
                serde_json::json!({
                    "ok": false,
                    "error_code": 400,
                    "description": "Bad Request: USER_NOT_PARTICIPANT"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client.ban_chat_member(-100123, 42).await.unwrap_err();

        match err {
            TelegramError::Api { code, description } => {
                assert_eq!(code, 400);
                assert!(description.contains("USER_NOT_PARTICIPANT"));
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }
}
