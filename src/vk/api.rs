//! VK API client over reqwest.
//!
//! Thin wrappers over the handful of methods the bot needs. All calls carry a
//! bounded timeout distinct from the long poll's own.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Settings;
use crate::error::BotError;
use crate::vk::longpoll::LongPollSession;
use crate::vk::types::ApiMessageItems;
use crate::vk::{first_doc, DocInfo, OutgoingMessage, VkTransport};

const API_BASE: &str = "https://api.vk.com/method";
const API_TIMEOUT_SECS: u64 = 15;

pub struct VkApi {
    http: reqwest::Client,
    token: String,
    group_id: i64,
    api_version: String,
}

impl VkApi {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(settings: &Settings) -> Result<Self, BotError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            token: settings.vk_token.clone(),
            group_id: settings.vk_group_id,
            api_version: settings.vk_api_version.clone(),
        })
    }

    /// Invoke one API method and unwrap the `response` envelope.
    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, BotError> {
        let url = format!("{API_BASE}/{method}");
        let mut query: Vec<(&str, String)> = vec![
            ("access_token", self.token.clone()),
            ("v", self.api_version.clone()),
        ];
        query.extend(params.iter().cloned());

        let body: Value = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = body.get("error") {
            let code = err.get("error_code").and_then(Value::as_i64).unwrap_or(0);
            let message = err
                .get("error_msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(BotError::Api { code, message });
        }

        Ok(body.get("response").cloned().unwrap_or(Value::Null))
    }

    /// Bootstrap a long-poll session: `(endpoint, key, cursor)`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an API-level error.
    pub async fn get_long_poll_server(&self) -> Result<LongPollSession, BotError> {
        let response = self
            .call(
                "groups.getLongPollServer",
                &[("group_id", self.group_id.to_string())],
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    async fn docs_from_items(&self, response: Value) -> Result<Option<DocInfo>, BotError> {
        let items: ApiMessageItems = serde_json::from_value(response)?;
        Ok(items
            .items
            .first()
            .and_then(|msg| first_doc(&msg.attachments)))
    }
}

#[async_trait]
impl VkTransport for VkApi {
    async fn send_message(&self, msg: &OutgoingMessage) -> Result<(), BotError> {
        let mut params = vec![
            ("peer_id", msg.peer_id.to_string()),
            // Client-generated dedup token, unique per call.
            ("random_id", rand::random::<i32>().to_string()),
            ("message", msg.text.clone()),
        ];
        if let Some(keyboard) = &msg.keyboard {
            params.push(("keyboard", keyboard.clone()));
        }
        if let Some(attachment) = &msg.attachment {
            params.push(("attachment", attachment.clone()));
        }
        self.call("messages.send", &params).await?;
        Ok(())
    }

    async fn is_member(&self, user_id: i64) -> Result<bool, BotError> {
        let response = self
            .call(
                "groups.isMember",
                &[
                    ("group_id", self.group_id.to_string()),
                    ("user_id", user_id.to_string()),
                ],
            )
            .await?;
        Ok(response.as_i64() == Some(1))
    }

    async fn doc_by_message_id(&self, message_id: i64) -> Result<Option<DocInfo>, BotError> {
        let response = self
            .call(
                "messages.getById",
                &[
                    ("message_ids", message_id.to_string()),
                    ("group_id", self.group_id.to_string()),
                ],
            )
            .await?;
        self.docs_from_items(response).await
    }

    async fn doc_by_conversation_id(
        &self,
        peer_id: i64,
        conversation_message_id: i64,
    ) -> Result<Option<DocInfo>, BotError> {
        let response = self
            .call(
                "messages.getByConversationMessageId",
                &[
                    ("peer_id", peer_id.to_string()),
                    (
                        "conversation_message_ids",
                        conversation_message_id.to_string(),
                    ),
                    ("group_id", self.group_id.to_string()),
                ],
            )
            .await?;
        self.docs_from_items(response).await
    }
}
