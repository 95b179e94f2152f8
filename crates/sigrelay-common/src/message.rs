//! JSON signaling messages.
//!
//! Every message is a flat JSON object with a `type` discriminator plus
//! type-specific fields. Session description and ICE payloads are carried
//! as opaque JSON values; the relay never looks inside them.

use crate::types::Pin;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors produced while decoding an inbound message.
///
/// The `Display` output is the exact text sent back to the client in an
/// `error` message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not JSON, or JSON that does not match the shape of its `type`.
    #[error("Invalid JSON")]
    InvalidJson,
    /// Well-formed message whose `type` is not part of the protocol.
    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Claim the camera slot of a pin.
    #[serde(rename = "camera:register")]
    CameraRegister {
        /// Pin to register under.
        pin: Pin,
    },
    /// Take the dashboard slot of a pin.
    #[serde(rename = "dashboard:join")]
    DashboardJoin {
        /// Pin to join.
        pin: Pin,
    },
    /// Session description offer, relayed to the dashboard.
    #[serde(rename = "offer")]
    Offer {
        /// Opaque offer payload.
        offer: Value,
    },
    /// Session description answer, relayed to the camera.
    #[serde(rename = "answer")]
    Answer {
        /// Opaque answer payload.
        answer: Value,
    },
    /// ICE candidate, relayed to the other side.
    #[serde(rename = "ice")]
    Ice {
        /// Opaque candidate payload.
        candidate: Value,
    },
}

impl ClientMessage {
    /// Every `type` value a client may send.
    pub const TYPES: [&'static str; 5] = [
        "camera:register",
        "dashboard:join",
        "offer",
        "answer",
        "ice",
    ];

    /// Decode a text frame.
    ///
    /// The discriminator is checked before the fields so that an unknown
    /// `type` is reported as such rather than as a shape mismatch.
    ///
    /// # Errors
    ///
    /// [`DecodeError::InvalidJson`] if the text is not a JSON object with a
    /// string `type`, or if the fields do not fit a known type.
    /// [`DecodeError::UnknownType`] if `type` is a string outside
    /// [`Self::TYPES`].
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text).map_err(|_| DecodeError::InvalidJson)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::InvalidJson)?;
        if !Self::TYPES.contains(&kind) {
            return Err(DecodeError::UnknownType(kind.to_owned()));
        }
        serde_json::from_value(value).map_err(|_| DecodeError::InvalidJson)
    }

    /// The wire `type` of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CameraRegister { .. } => "camera:register",
            Self::DashboardJoin { .. } => "dashboard:join",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Ice { .. } => "ice",
        }
    }

    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for these variants.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Messages the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Camera registration accepted.
    #[serde(rename = "camera:registered")]
    CameraRegistered {
        /// Registered pin.
        pin: Pin,
    },
    /// A camera is present on the pin.
    #[serde(rename = "camera:online")]
    CameraOnline {
        /// Pin the camera is on.
        pin: Pin,
    },
    /// No camera is present on the pin, or it just left.
    #[serde(rename = "camera:offline")]
    CameraOffline {
        /// Pin the camera was expected on.
        pin: Pin,
    },
    /// A dashboard joined the camera's pin.
    #[serde(rename = "dashboard:ready")]
    DashboardReady {
        /// Pin the dashboard joined.
        pin: Pin,
    },
    /// Relayed offer.
    #[serde(rename = "offer")]
    Offer {
        /// Opaque offer payload.
        offer: Value,
    },
    /// Relayed answer.
    #[serde(rename = "answer")]
    Answer {
        /// Opaque answer payload.
        answer: Value,
    },
    /// Relayed ICE candidate.
    #[serde(rename = "ice")]
    Ice {
        /// Opaque candidate payload.
        candidate: Value,
    },
    /// Protocol or conflict error, sent only to the offending client.
    #[serde(rename = "error")]
    Error {
        /// Human-readable reason.
        msg: String,
    },
}

impl ServerMessage {
    /// Build an `error` message.
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error { msg: msg.into() }
    }

    /// The wire `type` of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CameraRegistered { .. } => "camera:registered",
            Self::CameraOnline { .. } => "camera:online",
            Self::CameraOffline { .. } => "camera:offline",
            Self::DashboardReady { .. } => "dashboard:ready",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Ice { .. } => "ice",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for these variants.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a text frame received from the relay.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error if the text is not a known server message.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl From<DecodeError> for ServerMessage {
    fn from(err: DecodeError) -> Self {
        Self::error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_camera_register() {
        let msg = ClientMessage::parse(r#"{"type":"camera:register","pin":"123"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::CameraRegister {
                pin: "123".to_string()
            }
        );
    }

    #[test]
    fn parse_keeps_opaque_payloads_intact() {
        let text = r#"{"type":"ice","candidate":{"candidate":"candidate:1 1 udp 2113937151 10.0.0.2 54400 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
        let ClientMessage::Ice { candidate } = ClientMessage::parse(text).unwrap() else {
            panic!("expected ice");
        };
        assert_eq!(candidate["sdpMid"], "0");
        assert_eq!(candidate["sdpMLineIndex"], 0);
    }

    #[test]
    fn parse_ignores_extra_fields() {
        let msg =
            ClientMessage::parse(r#"{"type":"dashboard:join","pin":"456","client":"web"}"#).unwrap();
        assert_eq!(msg.kind(), "dashboard:join");
    }

    #[test]
    fn non_json_is_invalid() {
        assert_eq!(
            ClientMessage::parse("not json{"),
            Err(DecodeError::InvalidJson)
        );
    }

    #[test]
    fn json_without_type_is_invalid() {
        assert_eq!(
            ClientMessage::parse(r#"{"pin":"1"}"#),
            Err(DecodeError::InvalidJson)
        );
        assert_eq!(ClientMessage::parse("[1,2]"), Err(DecodeError::InvalidJson));
        assert_eq!(
            ClientMessage::parse(r#"{"type":7}"#),
            Err(DecodeError::InvalidJson)
        );
    }

    #[test]
    fn unknown_type_is_reported_by_name() {
        let err = ClientMessage::parse(r#"{"type":"camera:reboot"}"#).unwrap_err();
        assert_eq!(err, DecodeError::UnknownType("camera:reboot".to_string()));
        assert_eq!(err.to_string(), "Unknown message type: camera:reboot");
    }

    #[test]
    fn known_type_with_wrong_fields_is_invalid() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"camera:register"}"#),
            Err(DecodeError::InvalidJson)
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"camera:register","pin":123}"#),
            Err(DecodeError::InvalidJson)
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"offer"}"#),
            Err(DecodeError::InvalidJson)
        );
    }

    #[test]
    fn server_messages_use_flat_wire_shape() {
        let text = ServerMessage::DashboardReady {
            pin: "789".to_string(),
        }
        .to_text()
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "dashboard:ready", "pin": "789"}));

        let text = ServerMessage::from(DecodeError::InvalidJson).to_text().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "error", "msg": "Invalid JSON"}));
    }

    #[test]
    fn client_text_is_accepted_by_parse() {
        let msg = ClientMessage::Answer {
            answer: json!({"type": "answer", "sdp": "v=0"}),
        };
        let text = msg.to_text().unwrap();
        assert_eq!(ClientMessage::parse(&text).unwrap(), msg);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "answer");
    }

    #[test]
    fn kinds_cover_every_client_type() {
        for kind in ClientMessage::TYPES {
            let err = ClientMessage::parse(&format!(r#"{{"type":"{kind}"}}"#)).unwrap_err();
            assert_eq!(err, DecodeError::InvalidJson, "{kind} should be known");
        }
    }
}
