use serde::{Deserialize, Serialize};

use crate::messaging::ChannelEvent;

/// A single Phoenix frame as it travels over the socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeMessage {
    pub topic: String,
    pub event: ChannelEvent,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl RealtimeMessage {
    pub fn new(topic: String, event: ChannelEvent, payload: serde_json::Value) -> Self {
        Self {
            topic,
            event,
            payload,
            r#ref: None,
            join_ref: None,
        }
    }

    pub fn with_ref(mut self, r#ref: String) -> Self {
        self.r#ref = Some(r#ref);
        self
    }

    pub fn with_join_ref(mut self, join_ref: String) -> Self {
        self.join_ref = Some(join_ref);
        self
    }

    /// Status of a `phx_reply` payload, if present
    pub fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::SystemEvent;

    #[test]
    fn test_realtime_message() {
        let message = RealtimeMessage::new(
            "realtime:expenses-changes-u1".to_string(),
            ChannelEvent::PostgresChanges,
            serde_json::Value::Null,
        );
        assert_eq!(message.topic, "realtime:expenses-changes-u1");
        assert_eq!(message.event, ChannelEvent::PostgresChanges);
        assert_eq!(message.payload, serde_json::Value::Null);
        assert_eq!(message.r#ref, None);
        assert_eq!(message.join_ref, None);
    }

    #[test]
    fn test_serialization_without_ref_and_join_ref() {
        let message = RealtimeMessage::new(
            "phoenix".to_string(),
            ChannelEvent::System(SystemEvent::Heartbeat),
            serde_json::json!({}),
        );

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""event":"heartbeat""#));
        assert!(!json.contains(r#""ref":"#));
        assert!(!json.contains(r#""join_ref":"#));
    }

    #[test]
    fn test_serialization_with_ref_and_join_ref() {
        let message = RealtimeMessage::new(
            "realtime:income-changes-u1".to_string(),
            ChannelEvent::System(SystemEvent::Join),
            serde_json::json!({}),
        )
        .with_ref("123".to_string())
        .with_join_ref("321".to_string());

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""event":"phx_join""#));
        assert!(json.contains(r#""ref":"123""#));
        assert!(json.contains(r#""join_ref":"321""#));
    }

    #[test]
    fn test_parse_server_reply_frame() {
        let raw = r#"{
            "topic": "realtime:expenses-changes-u1",
            "event": "phx_reply",
            "payload": {"status": "ok", "response": {"postgres_changes": []}},
            "ref": "2",
            "join_ref": "1"
        }"#;

        let message: RealtimeMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.event, ChannelEvent::System(SystemEvent::Reply));
        assert_eq!(message.reply_status(), Some("ok"));
        assert_eq!(message.r#ref.as_deref(), Some("2"));
    }

    #[test]
    fn test_parse_frame_with_null_refs() {
        let raw = r#"{"topic":"realtime:x","event":"postgres_changes","payload":{},"ref":null}"#;
        let message: RealtimeMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.r#ref, None);
        assert_eq!(message.join_ref, None);
    }
}
