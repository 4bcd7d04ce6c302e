//! # Line Decoder
//!
//! Parses received lines and sorts them into telemetry, command replies and
//! everything else.

use serde_json::{Map, Value};

use super::message::{Reply, CMD_KEY, TELEMETRY_TYPE, TYPE_KEY};
use crate::error::DecodeError;

/// A decoded incoming line, by role
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Object typed `"telemetry"`; fields are not validated yet
    Telemetry(Map<String, Value>),
    /// Object carrying `cmd` that is not telemetry
    Reply(Reply),
    /// Any other object (boot banners, debug output)
    Other(Map<String, Value>),
}

/// Decode one line into a JSON object
///
/// # Arguments
///
/// * `line` - Line contents without the trailing newline
///
/// # Errors
///
/// Returns error if:
/// - The text is not valid JSON
/// - The JSON value is not an object
pub fn decode_line(line: &str) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_str::<Value>(line)? {
        Value::Object(object) => Ok(object),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// Whether an object is a telemetry frame
pub fn is_telemetry(object: &Map<String, Value>) -> bool {
    object.get(TYPE_KEY).and_then(Value::as_str) == Some(TELEMETRY_TYPE)
}

/// Classify a decoded object
///
/// Telemetry is checked first, so a telemetry frame that happens to carry
/// `cmd` is still telemetry.
pub fn classify(object: Map<String, Value>) -> Inbound {
    if is_telemetry(&object) {
        Inbound::Telemetry(object)
    } else if object.contains_key(CMD_KEY) {
        Inbound::Reply(Reply::confirmed(object))
    } else {
        Inbound::Other(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_object() {
        let object = decode_line(r#"{"cmd":"ping","state":"idle"}"#).unwrap();
        assert_eq!(object["cmd"], "ping");
        assert_eq!(object["state"], "idle");
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(matches!(decode_line("ets Jun  8 2016 00:22:57"), Err(DecodeError::Json(_))));
        assert!(matches!(decode_line(r#"{"cmd":"pi"#), Err(DecodeError::Json(_))));
        assert!(matches!(decode_line(""), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_non_object_is_error() {
        assert!(matches!(decode_line("[1,2,3]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(decode_line("\"ok\""), Err(DecodeError::NotAnObject)));
        assert!(matches!(decode_line("42"), Err(DecodeError::NotAnObject)));
    }

    #[test]
    fn test_classify_telemetry() {
        let object = decode_line(r#"{"type":"telemetry","joints":[0,0,0,0,0,0]}"#).unwrap();
        assert!(matches!(classify(object), Inbound::Telemetry(_)));
    }

    #[test]
    fn test_classify_telemetry_wins_over_cmd() {
        let object = decode_line(r#"{"type":"telemetry","cmd":"ping","state":"idle"}"#).unwrap();
        assert!(matches!(classify(object), Inbound::Telemetry(_)));
    }

    #[test]
    fn test_classify_reply() {
        let object = decode_line(r#"{"cmd":"set_joints","status":"ok"}"#).unwrap();
        match classify(object) {
            Inbound::Reply(reply) => {
                assert_eq!(reply.cmd(), Some("set_joints"));
                assert!(reply.is_confirmed());
            }
            other => panic!("Expected reply, got: {:?}", other),
        }
    }

    #[test]
    fn test_classify_reply_with_other_type() {
        let object = decode_line(r#"{"type":"response","cmd":"ping","state":"idle"}"#).unwrap();
        assert!(matches!(classify(object), Inbound::Reply(_)));
    }

    #[test]
    fn test_classify_other() {
        let object = decode_line(r#"{"msg":"boot complete"}"#).unwrap();
        assert!(matches!(classify(object), Inbound::Other(_)));

        let object = decode_line(r#"{"type":"log","state":"idle"}"#).unwrap();
        assert!(matches!(classify(object), Inbound::Other(_)));
    }
}
