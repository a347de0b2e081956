use synergy_data_channel::DataChannelError;

/// Errors from the control channel.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Framing(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid control message: {0}")]
    InvalidMessage(String),

    #[error("connection closed")]
    Disconnected,
}

impl From<DataChannelError> for ControlError {
    fn from(err: DataChannelError) -> Self {
        match err {
            DataChannelError::Io(e) => Self::Io(e),
            DataChannelError::Json(e) => Self::Json(e),
            DataChannelError::Framing(msg) => Self::Framing(msg),
            DataChannelError::Cancelled => Self::Disconnected,
            other => Self::InvalidMessage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_error_display() {
        assert_eq!(ControlError::Disconnected.to_string(), "connection closed");
        assert_eq!(
            ControlError::InvalidMessage("missing action".into()).to_string(),
            "invalid control message: missing action"
        );
    }

    #[test]
    fn framing_errors_keep_their_kind() {
        let err: ControlError = DataChannelError::Framing("eof".into()).into();
        assert!(matches!(err, ControlError::Framing(_)));
    }
}
