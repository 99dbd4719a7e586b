//! Document resolution for admin-supplied files.
//!
//! Group tokens do not always see attachment bodies in long-poll events, so
//! resolution is a ladder: the embedded attachment first, then a re-fetch by
//! global message id, then by conversation-local id. Fetch errors are logged
//! and treated as "no document".

use tracing::warn;

use crate::bot::BotService;
use crate::vk::types::LpMessage;
use crate::vk::{first_doc, DocInfo, VkTransport};

impl<T: VkTransport> BotService<T> {
    pub(crate) async fn resolve_doc(&self, message: &LpMessage) -> Option<DocInfo> {
        if let Some(info) = message.attachments.as_deref().and_then(first_doc) {
            return Some(info);
        }
        if message.id > 0 {
            match self.vk.doc_by_message_id(message.id).await {
                Ok(Some(info)) => return Some(info),
                Ok(None) => {}
                Err(err) => {
                    warn!(message_id = message.id, error = %err, "message re-fetch failed");
                }
            }
        }
        if message.conversation_message_id > 0 {
            match self
                .vk
                .doc_by_conversation_id(message.peer_id, message.conversation_message_id)
                .await
            {
                Ok(info) => return info,
                Err(err) => {
                    warn!(
                        peer_id = message.peer_id,
                        cmid = message.conversation_message_id,
                        error = %err,
                        "conversation message re-fetch failed"
                    );
                }
            }
        }
        None
    }
}
