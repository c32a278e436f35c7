//! Error types for Sirius DAQ operations.
//!
//! `SiriusError` covers the failure modes that are propagated to the caller:
//! connection problems, index errors while resolving channels and signals,
//! reader lifecycle misuse and read timeouts.
//!
//! Two failure classes are deliberately *not* represented here because they
//! are recovered where they occur:
//!
//! - a requested channel setting that is not in the property's legal-value
//!   list is logged and collected in a [`ConfigureReport`](crate::channel::ConfigureReport);
//! - an unhandled unit combination in the converter is logged and the
//!   scale-only value is returned.

use thiserror::Error;

/// Result type alias for Sirius DAQ operations.
pub type Result<T> = std::result::Result<T, SiriusError>;

/// Errors that can occur while controlling or reading a DAQ device.
#[derive(Error, Debug)]
pub enum SiriusError {
    /// The device transport rejected the connection string
    #[error("Failed to connect to '{connection_string}': {message}")]
    ConnectionFailed {
        /// Address that was tried
        connection_string: String,
        /// Reason reported by the transport
        message: String,
    },

    /// An operation needed a device but none is connected
    #[error("No device connected")]
    NotConnected,

    /// An operation needed a channel configuration but none was applied
    #[error("No channel configuration applied; call configure_channels first")]
    NotConfigured,

    /// Channel index does not exist in the device's channel list
    #[error("Invalid channel {index}: device has {available} channels")]
    ChannelIndexOutOfRange {
        /// Requested channel index
        index: usize,
        /// Number of channels on the device
        available: usize,
    },

    /// Channel index does not exist in the analog-input signal list
    #[error("Invalid signal index {index}: device has {available} analog-input signals")]
    SignalIndexOutOfRange {
        /// Requested signal index
        index: usize,
        /// Number of analog-input signals on the device
        available: usize,
    },

    /// The channel exposes no signal-conditioning block to configure
    #[error("Channel {channel} has no signal-conditioning function block")]
    MissingFunctionBlock {
        /// Channel index
        channel: usize,
    },

    /// A named property does not exist on the target object
    #[error("Unknown property '{name}' on {owner}")]
    UnknownProperty {
        /// Object the property was looked up on
        owner: String,
        /// Property name
        name: String,
    },

    /// A property was written with a value of the wrong type
    #[error("Property '{name}' expects {expected}, got {actual}")]
    PropertyType {
        /// Property name
        name: String,
        /// Type or range the property accepts
        expected: String,
        /// What was supplied
        actual: String,
    },

    /// `read` was called without an active reader (never created or stopped)
    #[error("No active reader: create and start a reader before reading")]
    ReaderNotActive,

    /// `read` was called on a reader that skipped the warm-up read
    #[error("Reader has not been started: prime it with start_reader before reading")]
    ReaderNotPrimed,

    /// The reader did not deliver all requested samples within the timeout
    #[error(
        "Read timed out after {timeout_ms} ms: requested {requested} samples per channel, received {received}"
    )]
    ReadTimeout {
        /// Samples per channel requested
        requested: usize,
        /// Samples per channel delivered before the timeout
        received: usize,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// The acquisition time cannot be turned into a sample count or timeout
    #[error("Acquisition of {duration_secs} s at {sample_rate} Hz is too long")]
    AcquisitionTooLong {
        /// Requested acquisition time in seconds
        duration_secs: f64,
        /// Sample rate in Hz
        sample_rate: f64,
    },

    /// Error reported by the underlying device driver
    #[error("Driver error during {operation}: {message}")]
    Driver {
        /// Driver call that failed
        operation: String,
        /// Driver message
        message: String,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong
        message: String,
    },
}

impl From<figment::Error> for SiriusError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl SiriusError {
    /// Shorthand for a driver-level failure.
    pub fn driver(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Driver {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if this is a read timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout { .. })
    }

    /// Check if this is a channel or signal indexing failure.
    pub fn is_index_error(&self) -> bool {
        matches!(
            self,
            Self::ChannelIndexOutOfRange { .. } | Self::SignalIndexOutOfRange { .. }
        )
    }

    /// Check if this is a connection failure.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SiriusError::ChannelIndexOutOfRange {
            index: 12,
            available: 8,
        };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("8"));
    }

    #[test]
    fn test_timeout_context() {
        let err = SiriusError::ReadTimeout {
            requested: 2000,
            received: 1500,
            timeout_ms: 4000,
        };
        let msg = err.to_string();
        assert!(msg.contains("2000"));
        assert!(msg.contains("1500"));
        assert!(msg.contains("4000 ms"));
        assert!(err.is_timeout());
        assert!(!err.is_index_error());
    }

    #[test]
    fn test_predicates() {
        assert!(SiriusError::SignalIndexOutOfRange {
            index: 3,
            available: 2
        }
        .is_index_error());
        assert!(SiriusError::NotConnected.is_connection_error());
        assert!(SiriusError::ConnectionFailed {
            connection_string: "daq.sim://nowhere".into(),
            message: "unreachable".into(),
        }
        .is_connection_error());
        assert!(!SiriusError::ReaderNotActive.is_connection_error());
    }
}
