use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::constants::MessageType;

/// Error details attached to an envelope.
///
/// `code` comes from the `ERR_*` vocabulary in [`crate::constants`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsError {
    pub code: i32,
    pub message: String,
}

impl WsError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Envelope for all WebSocket communication.
///
/// The `payload` field uses `serde_json::value::RawValue` so dispatch can
/// route on `type` without deserializing the payload twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WsError>,
}

impl Message {
    /// Builds an envelope, serializing the payload (if any) to raw JSON.
    pub fn new<T: Serialize>(
        id: impl Into<String>,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let payload = payload
            .map(|p| serde_json::to_string(p).and_then(RawValue::from_string))
            .transpose()?;
        Ok(Self {
            id: id.into(),
            msg_type,
            payload,
            error: None,
        })
    }

    /// Deserializes the payload, or `None` if the envelope carried none.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        self.payload
            .as_deref()
            .map(|raw| serde_json::from_str(raw.get()))
            .transpose()
    }

    /// Builds a response to this request, carrying the same correlation id.
    pub fn reply<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Message::new(&self.id, msg_type, payload)
    }

    /// Builds an error response to this request.
    ///
    /// `code` should be one of the `ERR_*` constants.
    pub fn reply_error(&self, code: i32, message: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            msg_type: MessageType::Error,
            payload: None,
            error: Some(WsError::new(code, message)),
        }
    }
}
