//! Wire models for the VK Bots Long Poll protocol and message fetch calls.

use serde::Deserialize;

/// Raw long-poll response body.
///
/// `failed: 1` means the cursor fell out of server retention (resume with the
/// returned `ts`); `failed: 2 | 3` means the session key is no longer valid.
#[derive(Debug, Clone, Deserialize)]
pub struct LongPollResponse {
    pub failed: Option<i64>,
    pub ts: Option<String>,
    #[serde(default)]
    pub updates: Option<Vec<RawUpdate>>,
}

/// One raw event as delivered by the long-poll server.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub object: Option<UpdateObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateObject {
    pub message: Option<LpMessage>,
}

/// Inbound message payload of a `message_new` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LpMessage {
    /// Platform-global message id; `0` when the group token cannot see it.
    #[serde(default)]
    pub id: i64,
    /// Conversation-local sequence number.
    #[serde(default)]
    pub conversation_message_id: i64,
    pub from_id: i64,
    pub peer_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    /// JSON-encoded button payload string, if the message came from a button.
    #[serde(default)]
    pub payload: Option<String>,
    /// Referral tag, present only on a session-initiating event.
    #[serde(rename = "ref", default)]
    pub ref_tag: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<LpAttachment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LpAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub doc: Option<LpDoc>,
}

/// Document attachment body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LpDoc {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Message shape returned by `messages.getById` and
/// `messages.getByConversationMessageId`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub attachments: Vec<LpAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessageItems {
    #[serde(default)]
    pub items: Vec<ApiMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_new_deserializes() {
        let raw = serde_json::json!({
            "type": "message_new",
            "object": {
                "message": {
                    "id": 10,
                    "conversation_message_id": 3,
                    "from_id": 101,
                    "peer_id": 101,
                    "text": "hello",
                    "ref": "m123abc",
                    "attachments": [
                        {"type": "doc", "doc": {"id": 7, "owner_id": 101, "access_key": "k", "url": "https://x/doc"}}
                    ]
                }
            }
        });
        let update: RawUpdate = serde_json::from_value(raw).expect("update parses");
        assert_eq!(update.kind, "message_new");
        let msg = update
            .object
            .and_then(|o| o.message)
            .expect("message present");
        assert_eq!(msg.from_id, 101);
        assert_eq!(msg.ref_tag.as_deref(), Some("m123abc"));
        assert_eq!(msg.attachments.map(|a| a.len()), Some(1));
    }

    #[test]
    fn sparse_message_uses_defaults() {
        let raw = serde_json::json!({
            "type": "message_new",
            "object": {"message": {"from_id": 1, "peer_id": 2}}
        });
        let update: RawUpdate = serde_json::from_value(raw).expect("update parses");
        let msg = update
            .object
            .and_then(|o| o.message)
            .expect("message present");
        assert_eq!(msg.id, 0);
        assert!(msg.text.is_none());
        assert!(msg.payload.is_none());
    }
}
