//! Control-channel envelope.
//!
//! Control messages are small JSON objects carried by the same
//! length-prefixed framing as the transfer protocol. The `data` field is
//! an arbitrary JSON object whose shape depends on `action`.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SOURCE;

/// Broad category of a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Command,
    Response,
    Request,
    Notification,
}

/// Operation a control message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ColorChange,
    ColorChangeAck,
    WifiHotspotInfo,
    WifiConnectionStatus,
    FileTransferRequest,
    FileTransferResponse,
    Error,
}

/// Colors understood by the demo peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorType {
    Red,
    Yellow,
    Green,
}

/// System-level error codes carried in [`ActionType::Error`] messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    E001,
    E002,
    E003,
    E004,
    E005,
    E006,
    E007,
    E008,
}

impl ErrorCode {
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::E001 => "Bluetooth connection failed",
            ErrorCode::E002 => "Wi-Fi hotspot creation failed",
            ErrorCode::E003 => "Wi-Fi connection failed",
            ErrorCode::E004 => "File transfer initialization failed",
            ErrorCode::E005 => "File transfer interrupted",
            ErrorCode::E006 => "Checksum verification failed",
            ErrorCode::E007 => "Invalid message format",
            ErrorCode::E008 => "Unsupported operation",
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorChange {
    pub color: ColorType,
}

/// Access-point credentials announced to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiHotspotInfo {
    pub ssid: String,
    pub password: String,
    pub ip_address: String,
    pub port: u16,
    pub security_type: String,
}

/// Asks the peer to take part in a file transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTransferRequest {
    pub file_size: u64,
    pub file_name: String,
    pub transfer_direction: String,
    pub checksum_type: String,
    pub compression: bool,
}

/// Answer to a [`FileTransferRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTransferResponse {
    pub accepted: bool,
    pub tcp_port: u16,
    pub ready_for_transfer: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error_code: ErrorCode,
    pub error_type: String,
    pub error_message: String,
    pub recovery_suggestions: Vec<String>,
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Envelope for every control-channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub message_id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub action: ActionType,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub timestamp: String,
    pub source: String,
}

impl ControlMessage {
    /// Creates a message with a fresh id and the current UTC timestamp.
    ///
    /// Fails if `data` does not serialize to a JSON object.
    pub fn new<T: Serialize>(
        msg_type: MessageType,
        action: ActionType,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        let data = match serde_json::to_value(data)? {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(serde::ser::Error::custom(format!(
                    "control payload must be a JSON object, got {other}"
                )));
            }
        };
        Ok(Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            msg_type,
            action,
            data,
            timestamp: now_rfc3339(),
            source: DEFAULT_SOURCE.into(),
        })
    }

    /// Overrides the source tag.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Parses and validates a message from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes `data` into the given payload type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.data.clone()))
    }

    pub fn color_change(color: ColorType) -> Self {
        Self::from_payload(
            MessageType::Command,
            ActionType::ColorChange,
            &ColorChange { color },
        )
    }

    pub fn color_change_ack(color: ColorType) -> Self {
        Self::from_payload(
            MessageType::Response,
            ActionType::ColorChangeAck,
            &ColorChange { color },
        )
    }

    pub fn wifi_hotspot_info(
        ssid: impl Into<String>,
        password: impl Into<String>,
        ip_address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self::from_payload(
            MessageType::Notification,
            ActionType::WifiHotspotInfo,
            &WifiHotspotInfo {
                ssid: ssid.into(),
                password: password.into(),
                ip_address: ip_address.into(),
                port,
                security_type: "WPA2".into(),
            },
        )
    }

    pub fn file_transfer_request(
        file_size: u64,
        file_name: impl Into<String>,
        transfer_direction: impl Into<String>,
    ) -> Self {
        Self::from_payload(
            MessageType::Request,
            ActionType::FileTransferRequest,
            &FileTransferRequest {
                file_size,
                file_name: file_name.into(),
                transfer_direction: transfer_direction.into(),
                checksum_type: "SHA256".into(),
                compression: false,
            },
        )
    }

    pub fn file_transfer_response(
        accepted: bool,
        tcp_port: u16,
        error_message: Option<String>,
    ) -> Self {
        Self::from_payload(
            MessageType::Response,
            ActionType::FileTransferResponse,
            &FileTransferResponse {
                accepted,
                tcp_port,
                ready_for_transfer: accepted,
                error_message,
            },
        )
    }

    pub fn error(
        error_code: ErrorCode,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        recovery_suggestions: Vec<String>,
    ) -> Self {
        Self::from_payload(
            MessageType::Response,
            ActionType::Error,
            &ErrorPayload {
                error_code,
                error_type: error_type.into(),
                error_message: error_message.into(),
                recovery_suggestions,
                timestamp: now_rfc3339(),
            },
        )
    }

    // Payload structs in this module always serialize to objects.
    fn from_payload<T: Serialize>(msg_type: MessageType, action: ActionType, data: &T) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            msg_type,
            action,
            data,
            timestamp: now_rfc3339(),
            source: DEFAULT_SOURCE.into(),
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
