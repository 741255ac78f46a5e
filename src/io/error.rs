// src/io/error.rs
//
// Error types for the serial CAN bridge.

use thiserror::Error;

/// Why a single wire line was rejected by the codec.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Line does not follow `CanBus <Rx|Tx> [0x]<id> <bytes...>`
    #[error("line does not match the CanBus grammar")]
    NoMatch,
    /// Identifier digits are not a valid 32-bit hex value
    #[error("invalid identifier: {0}")]
    InvalidId(String),
    /// A payload token is not a two-digit hex byte
    #[error("invalid data byte: {0}")]
    InvalidByte(String),
}

/// Errors raised by sessions and transports.
#[derive(Debug, Error)]
pub enum IoError {
    /// Transport could not be opened (busy, missing, permission denied)
    #[error("{device}: connection failed: {message}")]
    Connection { device: String, message: String },

    /// A send failed; the connection is left as it was
    #[error("{device}: write failed: {message}")]
    Write { device: String, message: String },

    /// The transport broke while reading
    #[error("{device}: read failed: {message}")]
    Read { device: String, message: String },

    /// Payload did not fit the expected message layout
    #[error("{context}: {message}")]
    Protocol { context: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Anything else that went wrong inside the session loop
    #[error("unexpected error: {0}")]
    Unexpected(String),

    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl IoError {
    pub fn connection(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn write(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Write {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn read(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Read {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn protocol(context: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Protocol {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        IoError::Configuration(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        IoError::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_device() {
        let err = IoError::connection("/dev/ttyUSB0", "device busy");
        assert_eq!(err.to_string(), "/dev/ttyUSB0: connection failed: device busy");

        let err = IoError::write("COM3", "broken pipe");
        assert_eq!(err.to_string(), "COM3: write failed: broken pipe");
    }

    #[test]
    fn test_parse_error_converts() {
        let err: IoError = ParseError::InvalidByte("ABC".to_string()).into();
        assert_eq!(err.to_string(), "invalid data byte: ABC");
    }
}
