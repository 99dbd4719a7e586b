//! Event classification.
//!
//! Pure functions mapping one raw long-poll event into a normalized
//! [`Interaction`], or dropping it. Only `message_new` events are in scope.

use serde::Deserialize;

use crate::vk::types::{LpMessage, RawUpdate};

/// Parsed structured button payload.
///
/// A flat record whose side fields depend on `cmd`. A missing or unknown
/// `cmd` is treated as "no structured command" wherever one is required.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Payload {
    pub cmd: Option<String>,
    pub id: Option<i64>,
    pub page: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub field: Option<String>,
    pub value: Option<i64>,
}

impl Payload {
    #[must_use]
    pub fn cmd_is(&self, expected: &str) -> bool {
        self.cmd.as_deref() == Some(expected)
    }
}

/// One normalized inbound event: a user's message or button press.
#[derive(Debug, Clone, Default)]
pub struct Interaction {
    pub user_id: i64,
    pub peer_id: i64,
    /// Trimmed free text; empty when absent.
    pub text: String,
    pub payload: Option<Payload>,
    /// Referral tag, present only on a session-initiating event.
    pub ref_tag: Option<String>,
    /// Raw message, kept for lazy document resolution.
    pub message: LpMessage,
}

/// Classify one raw event. Anything other than a `message_new` carrying a
/// message body is ignored.
#[must_use]
pub fn classify(update: &RawUpdate) -> Option<Interaction> {
    if update.kind != "message_new" {
        return None;
    }
    let message = update.object.as_ref()?.message.clone()?;
    let text = message.text.as_deref().unwrap_or("").trim().to_string();
    let payload = message.payload.as_deref().and_then(parse_payload);
    Some(Interaction {
        user_id: message.from_id,
        peer_id: message.peer_id,
        text,
        payload,
        ref_tag: message.ref_tag.clone().filter(|r| !r.is_empty()),
        message,
    })
}

/// Parse the raw payload string. Malformed payloads degrade to `None`, never
/// an error.
#[must_use]
pub fn parse_payload(raw: &str) -> Option<Payload> {
    if raw.is_empty() {
        return None;
    }
    serde_json::from_str(raw).ok()
}

/// Session-start trigger: `/start` and its aliases, or a `start` payload.
#[must_use]
pub fn is_start(text: &str, payload: Option<&Payload>) -> bool {
    let t = text.to_lowercase();
    if matches!(t.as_str(), "/start" | "start" | "старт" | "начать" | "меню") {
        return true;
    }
    payload.is_some_and(|p| p.cmd_is("start"))
}

/// Admin-menu trigger: `/admin` and aliases, or any `admin_*` payload.
#[must_use]
pub fn is_admin_menu(text: &str, payload: Option<&Payload>) -> bool {
    let t = text.to_lowercase();
    if matches!(t.as_str(), "/admin" | "admin" | "админ") {
        return true;
    }
    payload
        .and_then(|p| p.cmd.as_deref())
        .is_some_and(|cmd| cmd.starts_with("admin_"))
}

/// Item selection: a structured payload with the expected command, or a bare
/// numeric id typed as text.
#[must_use]
pub fn extract_id(payload: Option<&Payload>, text: &str, expected_cmd: &str) -> Option<i64> {
    if let Some(p) = payload {
        if p.cmd_is(expected_cmd) {
            return p.id;
        }
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(value: serde_json::Value) -> RawUpdate {
        serde_json::from_value(value).expect("valid update")
    }

    #[test]
    fn drops_other_event_kinds() {
        let u = update(serde_json::json!({"type": "message_reply", "object": {}}));
        assert!(classify(&u).is_none());
    }

    #[test]
    fn classifies_message_new() {
        let u = update(serde_json::json!({
            "type": "message_new",
            "object": {"message": {
                "from_id": 5, "peer_id": 5, "text": "  hello  ",
                "payload": "{\"cmd\":\"magnet\",\"id\":3}"
            }}
        }));
        let ix = classify(&u).expect("interaction");
        assert_eq!(ix.user_id, 5);
        assert_eq!(ix.text, "hello");
        let p = ix.payload.expect("payload");
        assert!(p.cmd_is("magnet"));
        assert_eq!(p.id, Some(3));
    }

    #[test]
    fn malformed_payload_degrades_to_none() {
        let u = update(serde_json::json!({
            "type": "message_new",
            "object": {"message": {"from_id": 5, "peer_id": 5, "payload": "not json"}}
        }));
        let ix = classify(&u).expect("interaction");
        assert!(ix.payload.is_none());
    }

    #[test]
    fn start_triggers() {
        assert!(is_start("/start", None));
        assert!(is_start("СТАРТ", None));
        assert!(is_start("меню", None));
        assert!(!is_start("hello", None));
        let p = parse_payload("{\"cmd\":\"start\"}");
        assert!(is_start("", p.as_ref()));
    }

    #[test]
    fn admin_triggers() {
        assert!(is_admin_menu("/admin", None));
        assert!(is_admin_menu("Админ", None));
        let p = parse_payload("{\"cmd\":\"admin_edit\"}");
        assert!(is_admin_menu("", p.as_ref()));
        assert!(!is_admin_menu("start", None));
    }

    #[test]
    fn id_extraction() {
        let p = parse_payload("{\"cmd\":\"admin_edit_select\",\"id\":12}");
        assert_eq!(extract_id(p.as_ref(), "", "admin_edit_select"), Some(12));
        // Wrong command: payload ignored, text wins.
        assert_eq!(extract_id(p.as_ref(), "7", "admin_delete_select"), Some(7));
        assert_eq!(extract_id(None, " 42 ", "x"), Some(42));
        assert_eq!(extract_id(None, "abc", "x"), None);
        assert_eq!(extract_id(None, "", "x"), None);
    }
}
