use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Binary,
}

/// An application message: structured `data` plus the bytes that go on the wire.
///
/// `payload` always reflects `data`; the only mutator, [`Message::set_data`],
/// re-serializes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    data: Value,
    #[serde(skip)]
    payload: Vec<u8>,
    kind: MessageKind,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// A text message from structured data.
    pub fn json(data: Value) -> Self {
        let payload = serialize(&data);
        Self {
            data,
            payload,
            kind: MessageKind::Text,
            timestamp: Utc::now(),
        }
    }

    /// A text message from a string. JSON text is parsed into `data`;
    /// anything else becomes a JSON string.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        let data = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()));
        Self {
            data,
            payload: text.into_bytes(),
            kind: MessageKind::Text,
            timestamp: Utc::now(),
        }
    }

    /// Opaque bytes; `data` is `null`.
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Value::Null,
            payload: payload.into(),
            kind: MessageKind::Binary,
            timestamp: Utc::now(),
        }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The payload as UTF-8, for text messages.
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Text => std::str::from_utf8(&self.payload).ok(),
            MessageKind::Binary => None,
        }
    }

    /// Look up a top-level field of object data.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Replace `data` and re-serialize the payload. The message becomes text.
    pub fn set_data(&mut self, data: Value) {
        self.payload = serialize(&data);
        self.data = data;
        self.kind = MessageKind::Text;
    }
}

fn serialize(data: &Value) -> Vec<u8> {
    // Serializing a `Value` cannot fail.
    serde_json::to_vec(data).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_message() {
        let m = Message::json(json!({"type": "chat", "body": "hi"}));
        assert_eq!(m.kind(), MessageKind::Text);
        assert_eq!(m.get("type"), Some(&json!("chat")));
        let reparsed: Value = serde_json::from_slice(m.payload()).unwrap();
        assert_eq!(&reparsed, m.data());
    }

    #[test]
    fn test_text_parses_json_when_possible() {
        let m = Message::text(r#"{"n":1}"#);
        assert_eq!(m.get("n"), Some(&json!(1)));
        assert_eq!(m.as_text(), Some(r#"{"n":1}"#));

        let plain = Message::text("hello");
        assert_eq!(plain.data(), &json!("hello"));
        assert_eq!(plain.payload(), b"hello");
    }

    #[test]
    fn test_binary() {
        let m = Message::binary(vec![0, 159, 146, 150]);
        assert_eq!(m.kind(), MessageKind::Binary);
        assert!(m.data().is_null());
        assert!(m.as_text().is_none());
    }

    #[test]
    fn test_set_data_reserializes() {
        let mut m = Message::binary(vec![1, 2, 3]);
        m.set_data(json!({"ok": true}));
        assert_eq!(m.kind(), MessageKind::Text);
        assert_eq!(m.as_text(), Some(r#"{"ok":true}"#));
    }
}
