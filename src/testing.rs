//! Test doubles and builders shared by unit and integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::bot::router::{parse_payload, Interaction};
use crate::error::BotError;
use crate::vk::types::LpMessage;
use crate::vk::{DocInfo, OutgoingMessage, VkTransport};

/// In-memory transport that records every outbound send.
///
/// Membership and per-peer send failures are scripted by the test; document
/// lookups come from a preloaded map.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMessage>>,
    member: AtomicBool,
    failing_peers: Mutex<HashSet<i64>>,
    docs_by_message: Mutex<HashMap<i64, DocInfo>>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_member(&self, member: bool) {
        self.member.store(member, Ordering::SeqCst);
    }

    /// Every send to `peer_id` will fail from now on.
    pub fn fail_sends_to(&self, peer_id: i64) {
        lock(&self.failing_peers).insert(peer_id);
    }

    pub fn put_doc_for_message(&self, message_id: i64, info: DocInfo) {
        lock(&self.docs_by_message).insert(message_id, info);
    }

    /// Snapshot of everything sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        lock(&self.sent).clone()
    }

    /// Texts of everything sent so far, in order.
    #[must_use]
    pub fn sent_texts(&self) -> Vec<String> {
        lock(&self.sent).iter().map(|m| m.text.clone()).collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl VkTransport for RecordingTransport {
    async fn send_message(&self, msg: &OutgoingMessage) -> Result<(), BotError> {
        if lock(&self.failing_peers).contains(&msg.peer_id) {
            return Err(BotError::Api {
                code: 902,
                message: "can't send messages to this user".to_string(),
            });
        }
        lock(&self.sent).push(msg.clone());
        Ok(())
    }

    async fn is_member(&self, _user_id: i64) -> Result<bool, BotError> {
        Ok(self.member.load(Ordering::SeqCst))
    }

    async fn doc_by_message_id(&self, message_id: i64) -> Result<Option<DocInfo>, BotError> {
        Ok(lock(&self.docs_by_message).get(&message_id).cloned())
    }

    async fn doc_by_conversation_id(
        &self,
        _peer_id: i64,
        _conversation_message_id: i64,
    ) -> Result<Option<DocInfo>, BotError> {
        Ok(None)
    }
}

/// Interaction for a plain text message from `user_id`.
#[must_use]
pub fn text_interaction(user_id: i64, text: &str) -> Interaction {
    Interaction {
        user_id,
        peer_id: user_id,
        text: text.trim().to_string(),
        payload: None,
        ref_tag: None,
        message: LpMessage {
            from_id: user_id,
            peer_id: user_id,
            text: Some(text.to_string()),
            ..LpMessage::default()
        },
    }
}

/// Interaction for a button press carrying the given payload JSON.
#[must_use]
pub fn payload_interaction(user_id: i64, payload_json: &str) -> Interaction {
    Interaction {
        user_id,
        peer_id: user_id,
        text: String::new(),
        payload: parse_payload(payload_json),
        ref_tag: None,
        message: LpMessage {
            from_id: user_id,
            peer_id: user_id,
            payload: Some(payload_json.to_string()),
            ..LpMessage::default()
        },
    }
}

/// Interaction for a `/start` arriving through a referral deep link.
#[must_use]
pub fn start_with_ref(user_id: i64, ref_code: &str) -> Interaction {
    let mut ix = text_interaction(user_id, "/start");
    ix.ref_tag = Some(ref_code.to_string());
    ix.message.ref_tag = Some(ref_code.to_string());
    ix
}
