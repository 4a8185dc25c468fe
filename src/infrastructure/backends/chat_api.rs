#[cfg(test)]
#[path = "chat_api_test.rs"]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::ChatError;
use crate::domain::models::ChatReply;
use crate::domain::models::HistoryEntry;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(rename = "conversationHistory")]
    conversation_history: Vec<HistoryEntry>,
}

/// Client for the companion's Node sidecar, which fronts the actual LLM.
pub struct ChatApi {
    url: String,
    chat_timeout_millis: u64,
    health_timeout_millis: u64,
}

impl Default for ChatApi {
    fn default() -> ChatApi {
        return ChatApi {
            url: Config::get(ConfigKey::BackendURL),
            chat_timeout_millis: Config::get_millis(ConfigKey::BackendChatTimeout),
            health_timeout_millis: Config::get_millis(ConfigKey::BackendHealthCheckTimeout),
        };
    }
}

#[async_trait]
impl Backend for ChatApi {
    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<(), ChatError> {
        let res = reqwest::Client::new()
            .get(format!("{url}/health", url = self.url))
            .timeout(Duration::from_millis(self.health_timeout_millis))
            .send()
            .await;

        let res = match res {
            Err(err) => {
                tracing::debug!(error = ?err, "backend health check failed");
                return Err(ChatError::from_request_error(&err));
            }
            Ok(res) => res,
        };

        if !res.status().is_success() {
            tracing::debug!(status = res.status().as_u16(), "backend health check failed");
            return Err(ChatError::from_status(res.status().as_u16()));
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn send_message(
        &self,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<ChatReply, ChatError> {
        let req = ChatRequest {
            message: message.to_string(),
            conversation_history: history.to_vec(),
        };

        let res = reqwest::Client::new()
            .post(format!("{url}/chat/message", url = self.url))
            .timeout(Duration::from_millis(self.chat_timeout_millis))
            .json(&req)
            .send()
            .await;

        let res = match res {
            Err(err) => {
                tracing::error!(error = ?err, "chat request failed");
                return Err(ChatError::from_request_error(&err));
            }
            Ok(res) => res,
        };

        if !res.status().is_success() {
            tracing::error!(status = res.status().as_u16(), "chat request rejected");
            return Err(ChatError::from_status(res.status().as_u16()));
        }

        match res.json::<ChatReply>().await {
            Ok(reply) => {
                tracing::debug!(timestamp = reply.timestamp, "chat reply received");
                return Ok(reply);
            }
            Err(err) => {
                tracing::error!(error = ?err, "chat reply was unreadable");
                return Err(ChatError::ParseError);
            }
        }
    }
}
