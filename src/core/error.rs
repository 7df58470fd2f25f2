//! Error types for the Wi-Fi provisioner

use thiserror::Error;

/// Result type for domain validation
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for wire codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for provisioning client operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Result type for session state machine events
pub type SessionResult<T> = Result<T, SessionError>;

/// Domain values that violate a size invariant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("SSID too long: {0} bytes (max 32)")]
    SsidTooLong(usize),

    #[error("Passphrase too long: {0} bytes (max 64)")]
    PassphraseTooLong(usize),
}

/// Errors related to encoding or decoding protocol messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}

impl From<prost::DecodeError> for CodecError {
    fn from(e: prost::DecodeError) -> Self {
        CodecError::MalformedMessage(e.to_string())
    }
}

impl From<ValidationError> for CodecError {
    fn from(e: ValidationError) -> Self {
        CodecError::MalformedMessage(e.to_string())
    }
}

/// Errors related to the transport layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Device disconnected")]
    DeviceDisconnected,

    #[error("No response to command within deadline")]
    CommandTimeout,

    #[error("Provisioning service {0} not found")]
    ServiceNotFound(uuid::Uuid),

    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(uuid::Uuid),

    #[error("BLE error: {0}")]
    Ble(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<bluer::Error> for TransportError {
    fn from(e: bluer::Error) -> Self {
        TransportError::Ble(e.to_string())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e.to_string())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

/// Failure codes a device reports in a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    InvalidArgument,
    InvalidProto,
    InternalError,
}

/// Uniform error taxonomy of the provisioning client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("Device rejected request: {0:?}")]
    Response(ResponseCode),

    #[error("Notification timeout")]
    NotificationTimeout,

    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

impl From<TransportError> for ProvisionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::CommandTimeout => ProvisionError::NotificationTimeout,
            other => ProvisionError::Transport(other),
        }
    }
}

/// Errors raised by session events
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No device selected")]
    NoDeviceSelected,

    #[error("Device status not loaded")]
    StatusNotLoaded,

    #[error("No network selected")]
    NoNetworkSelected,

    #[error("Password required for this network")]
    PasswordRequired,

    #[error("Session finished")]
    Finished,

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors of the persisted password cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
