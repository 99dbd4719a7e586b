//! VK platform boundary: transport trait, wire types, long-poll client,
//! keyboard markup.
//!
//! Everything that touches the network lives behind [`VkTransport`] so the
//! decision layers can be exercised hermetically in tests.

pub mod api;
pub mod keyboard;
pub mod longpoll;
pub mod types;

use async_trait::async_trait;

use crate::error::BotError;
use types::{LpAttachment, LpDoc};

pub use api::VkApi;

/// Normalized attachment reference plus optional direct download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocInfo {
    /// `doc<ownerId>_<docId>[_<accessKey>]`
    pub attachment: String,
    pub url: Option<String>,
}

/// One outbound send request. The dedup token is generated per call by the
/// transport implementation, never by callers.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub peer_id: i64,
    pub text: String,
    /// Rendered keyboard JSON (see [`keyboard`]).
    pub keyboard: Option<String>,
    pub attachment: Option<String>,
}

impl OutgoingMessage {
    #[must_use]
    pub fn text(peer_id: i64, text: impl Into<String>) -> Self {
        Self {
            peer_id,
            text: text.into(),
            keyboard: None,
            attachment: None,
        }
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: String) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: impl Into<String>) -> Self {
        self.attachment = Some(attachment.into());
        self
    }
}

/// Outbound operations against the platform.
#[async_trait]
pub trait VkTransport: Send + Sync {
    /// `messages.send` with a fresh client-generated dedup token.
    async fn send_message(&self, msg: &OutgoingMessage) -> Result<(), BotError>;

    /// `groups.isMember`. Callers treat transport failures as "not a member".
    async fn is_member(&self, user_id: i64) -> Result<bool, BotError>;

    /// Fetch a message by its platform-global id and extract its document.
    async fn doc_by_message_id(&self, message_id: i64) -> Result<Option<DocInfo>, BotError>;

    /// Fetch a message by `(peer, conversation-local id)` and extract its
    /// document.
    async fn doc_by_conversation_id(
        &self,
        peer_id: i64,
        conversation_message_id: i64,
    ) -> Result<Option<DocInfo>, BotError>;
}

/// Build the normalized attachment reference for a document.
#[must_use]
pub fn doc_reference(doc: &LpDoc) -> DocInfo {
    let mut attachment = format!("doc{}_{}", doc.owner_id, doc.id);
    if let Some(key) = doc.access_key.as_deref() {
        if !key.is_empty() {
            attachment.push('_');
            attachment.push_str(key);
        }
    }
    DocInfo {
        attachment,
        url: doc.url.clone(),
    }
}

/// First document among a message's attachments, if any.
#[must_use]
pub fn first_doc(attachments: &[LpAttachment]) -> Option<DocInfo> {
    attachments.iter().find_map(|att| {
        if att.kind == "doc" {
            att.doc.as_ref().map(doc_reference)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_reference_with_access_key() {
        let doc = LpDoc {
            id: 7,
            owner_id: 101,
            access_key: Some("abc".to_string()),
            title: None,
            url: Some("https://x/doc".to_string()),
        };
        let info = doc_reference(&doc);
        assert_eq!(info.attachment, "doc101_7_abc");
        assert_eq!(info.url.as_deref(), Some("https://x/doc"));
    }

    #[test]
    fn doc_reference_without_access_key() {
        let doc = LpDoc {
            id: 7,
            owner_id: 101,
            ..LpDoc::default()
        };
        assert_eq!(doc_reference(&doc).attachment, "doc101_7");
    }

    #[test]
    fn first_doc_skips_other_attachment_kinds() {
        let attachments = vec![
            LpAttachment {
                kind: "photo".to_string(),
                doc: None,
            },
            LpAttachment {
                kind: "doc".to_string(),
                doc: Some(LpDoc {
                    id: 1,
                    owner_id: 2,
                    ..LpDoc::default()
                }),
            },
        ];
        let info = first_doc(&attachments).expect("doc found");
        assert_eq!(info.attachment, "doc2_1");
    }
}
