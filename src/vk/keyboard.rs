//! Structured keyboard markup rendering.
//!
//! Pure formatting: builds the `{one_time, buttons}` JSON object VK expects.
//! Button payloads are JSON objects serialized into a string, with a `cmd`
//! field plus command-specific side fields.

use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
pub struct Keyboard {
    pub one_time: bool,
    pub buttons: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Button {
    pub action: ButtonAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ButtonAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// Build a text button with a structured payload and a color.
#[must_use]
pub fn button(label: &str, payload: Value, color: &str) -> Button {
    Button {
        action: ButtonAction {
            kind: "text".to_string(),
            label: label.to_string(),
            payload: Some(payload.to_string()),
        },
        color: Some(color.to_string()),
    }
}

/// Payload carrying only a command.
#[must_use]
pub fn payload(cmd: &str) -> Value {
    json!({ "cmd": cmd })
}

/// Payload carrying a command plus one side field.
#[must_use]
pub fn payload_with(cmd: &str, key: &str, value: impl Into<Value>) -> Value {
    json!({ "cmd": cmd, key: value.into() })
}

/// Render rows of buttons into the keyboard JSON string VK expects.
#[must_use]
pub fn render(rows: Vec<Vec<Button>>, one_time: bool) -> String {
    let kb = Keyboard {
        one_time,
        buttons: rows,
    };
    // Serialization of these plain structs cannot fail.
    serde_json::to_string(&kb).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_expected_shape() {
        let rows = vec![vec![button(
            "Проверить подписку",
            payload("check_sub"),
            "positive",
        )]];
        let rendered = render(rows, true);
        let value: Value = serde_json::from_str(&rendered).expect("valid json");

        assert_eq!(value["one_time"], json!(true));
        let btn = &value["buttons"][0][0];
        assert_eq!(btn["action"]["type"], json!("text"));
        assert_eq!(btn["action"]["label"], json!("Проверить подписку"));
        assert_eq!(btn["color"], json!("positive"));

        // The payload is itself a JSON string.
        let inner: Value = serde_json::from_str(
            btn["action"]["payload"].as_str().expect("payload string"),
        )
        .expect("payload json");
        assert_eq!(inner["cmd"], json!("check_sub"));
    }

    #[test]
    fn payload_side_fields() {
        let p = payload_with("list", "page", 2);
        assert_eq!(p["cmd"], json!("list"));
        assert_eq!(p["page"], json!(2));
    }
}
