//! Text frame codec for channel events

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ValidationError;
use crate::models::Validate;

/// Encode an event as a JSON text frame.
pub fn encode<E: Serialize>(event: &E) -> Result<String, ValidationError> {
    Ok(serde_json::to_string(event)?)
}

/// Decode and validate a JSON text frame.
pub fn decode<E: DeserializeOwned + Validate>(text: &str) -> Result<E, ValidationError> {
    let event: E = serde_json::from_str(text)?;
    event.validate()?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientEvent, MessagePayload, Participants, ServerEvent};

    #[test]
    fn test_decode_server_message_read() {
        let ev: ServerEvent =
            decode(r#"{"event":"message_read","data":{"sender":"bob","receiver":"alice"}}"#).unwrap();
        assert_eq!(ev.name(), "message_read");
    }

    #[test]
    fn test_decode_unknown_event_is_malformed() {
        let err = decode::<ServerEvent>(r#"{"event":"poke","data":{}}"#).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn test_decode_not_json_is_malformed() {
        assert!(matches!(
            decode::<ServerEvent>("2::"),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_missing_participant_fails_validation() {
        let err = decode::<ClientEvent>(
            r#"{"event":"send_message","data":{"sender":"alice","receiver":"","message":"x"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::MissingField("receiver")));
    }

    #[test]
    fn test_encode_send_message() {
        let ev = ClientEvent::SendMessage(MessagePayload {
            client_id: None,
            sender: "alice".into(),
            receiver: "bob".into(),
            message: "hello".into(),
            created_at: None,
            read: Some(false),
        });
        let text = encode(&ev).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["event"], "send_message");
        assert_eq!(v["data"]["message"], "hello");
        assert_eq!(v["data"]["read"], false);
    }

    #[test]
    fn test_client_frame_decodes_on_relay_side() {
        let text = encode(&ClientEvent::StopTyping(Participants::new("alice", "bob"))).unwrap();
        let back: ClientEvent = decode(&text).unwrap();
        assert_eq!(back, ClientEvent::StopTyping(Participants::new("alice", "bob")));
    }
}
