use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, ErrorPayload};
use crate::model::ConnectionInfo;

/// What a popup posts back to its opener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum PopupMessage {
    /// The user signed in (empty identity) or signed up
    Identity(ConnectionInfo),
    /// The chained identity and permission flow finished, forwarded to the provider by the host
    ConnectionComplete(ConnectionInfo),
    Grant,
    Deny,
    /// The window went away before anything was submitted
    Closed,
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid data returned")]
    Empty,
    #[error("invalid seed returned")]
    InvalidSeed,
    #[error("unrecognized message: {0}")]
    Unrecognized(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConnectionComplete {
    message_type: String,
    connection_info: ConnectionInfo,
}

impl PopupMessage {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        PopupMessage::Error(ErrorPayload::new(kind, message))
    }

    pub fn to_value(&self) -> Value {
        // A tagged enum of plain data always serializes
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decodes a message posted by a popup. Besides the tagged form this accepts the bare shapes
    /// older popups post: `"closed"`, `"grant"`, `"deny"`, `{seed, identity}`,
    /// `{messageType: "connectionComplete", connectionInfo}` and free-text error strings. Empty
    /// data is never a cancellation here, see [`PopupMessage::decode_consent`]
    pub fn decode(data: &Value) -> Result<Self, DecodeError> {
        match data {
            Value::Null => Err(DecodeError::Empty),
            Value::String(text) if text.is_empty() => Err(DecodeError::Empty),
            Value::String(text) => Ok(match text.as_str() {
                "closed" => PopupMessage::Closed,
                "grant" => PopupMessage::Grant,
                "deny" => PopupMessage::Deny,
                text => PopupMessage::error(ErrorKind::Unknown, text),
            }),
            Value::Object(object) if object.contains_key("kind") => {
                serde_json::from_value(data.clone()).map_err(|error| DecodeError::Unrecognized(error.to_string()))
            }
            Value::Object(object) if object.contains_key("messageType") => {
                let legacy: LegacyConnectionComplete = serde_json::from_value(data.clone())
                    .map_err(|error| DecodeError::Unrecognized(error.to_string()))?;
                if legacy.message_type != "connectionComplete" {
                    return Err(DecodeError::Unrecognized(legacy.message_type));
                }
                Ok(PopupMessage::ConnectionComplete(legacy.connection_info))
            }
            Value::Object(object) if object.contains_key("seed") => {
                let info: ConnectionInfo = serde_json::from_value(data.clone()).map_err(|_| DecodeError::InvalidSeed)?;
                if info.seed.is_empty() {
                    return Err(DecodeError::InvalidSeed);
                }
                Ok(PopupMessage::Identity(info))
            }
            other => Err(DecodeError::Unrecognized(other.to_string())),
        }
    }

    /// Answer of the permission popup, which posts `""` when its window goes away
    pub fn decode_consent(data: &Value) -> Result<Self, DecodeError> {
        match data {
            Value::String(text) if text.is_empty() => Ok(PopupMessage::Closed),
            data => Self::decode(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_tagged_round_trip() {
        let message = PopupMessage::Identity(ConnectionInfo::new("alice-seed", "alice"));
        let value = message.to_value();
        assert_eq!(value, json!({ "kind": "identity", "payload": { "seed": "alice-seed", "identity": "alice" } }));
        assert_eq!(PopupMessage::decode(&value), Ok(message));
    }

    #[test]
    fn test_unit_kinds_are_tagged() {
        assert_eq!(PopupMessage::Closed.to_value(), json!({ "kind": "closed" }));
        assert_eq!(PopupMessage::decode(&json!({ "kind": "grant" })), Ok(PopupMessage::Grant));
    }

    #[test]
    fn test_legacy_sentinels() {
        assert_eq!(PopupMessage::decode(&json!("closed")), Ok(PopupMessage::Closed));
        assert_eq!(PopupMessage::decode(&json!("grant")), Ok(PopupMessage::Grant));
        assert_eq!(PopupMessage::decode(&json!("deny")), Ok(PopupMessage::Deny));
    }

    #[test]
    fn test_empty_data_closes_consent_only() {
        assert_eq!(PopupMessage::decode(&json!("")), Err(DecodeError::Empty));
        assert_eq!(PopupMessage::decode_consent(&json!("")), Ok(PopupMessage::Closed));
        assert_eq!(PopupMessage::decode_consent(&json!("deny")), Ok(PopupMessage::Deny));
    }

    #[test]
    fn test_legacy_free_text_error() {
        let decoded = PopupMessage::decode(&json!("Parameter 'skappName' not found")).unwrap();
        assert_eq!(decoded, PopupMessage::error(ErrorKind::Unknown, "Parameter 'skappName' not found"));
    }

    #[test]
    fn test_legacy_connected_info() {
        let decoded = PopupMessage::decode(&json!({ "seed": "alice-seed", "identity": "" })).unwrap();
        assert_eq!(decoded, PopupMessage::Identity(ConnectionInfo::sign_in("alice-seed")));
    }

    #[test]
    fn test_legacy_empty_seed_rejected() {
        assert_eq!(PopupMessage::decode(&json!({ "seed": "", "identity": "alice" })), Err(DecodeError::InvalidSeed));
        assert_eq!(PopupMessage::decode(&json!({ "seed": 7 })), Err(DecodeError::InvalidSeed));
    }

    #[test]
    fn test_legacy_connection_complete() {
        let data = json!({
            "messageType": "connectionComplete",
            "connectionInfo": { "seed": "alice-seed", "identity": "alice" },
        });
        assert_eq!(
            PopupMessage::decode(&data),
            Ok(PopupMessage::ConnectionComplete(ConnectionInfo::new("alice-seed", "alice")))
        );
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(PopupMessage::decode(&Value::Null), Err(DecodeError::Empty));
        assert!(matches!(PopupMessage::decode(&json!(42)), Err(DecodeError::Unrecognized(_))));
        assert!(matches!(PopupMessage::decode(&json!({ "kind": "teleport" })), Err(DecodeError::Unrecognized(_))));
        assert!(matches!(PopupMessage::decode(&json!({ "messageType": "hello", "connectionInfo": { "seed": "x" } })), Err(DecodeError::Unrecognized(_))));
    }
}
