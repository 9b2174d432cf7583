//! Common error types for ft231x-bridge.
//!
//! This module provides a centralized Error enum using thiserror. Every
//! fallible operation of the port, the encoders and the configuration
//! loader reports through it.

use std::io;
use thiserror::Error;

use crate::transport::EndpointDirection;

/// Main error type for ft231x-bridge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A transfer or configuration was attempted without an open connection
    #[error("Port is not connected")]
    NotConnected,

    /// Out-of-domain value (baud rate 0, unknown data bits, parity or stop bits)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Valid value the chip cannot represent (5/6 data bits, 1.5 stop bits,
    /// unreachable baud rates)
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The host returned no handle for the device
    #[error("Failed to connect to device")]
    ConnectFailed,

    /// The access broker refused access to the device
    #[error("Permission to access the device was denied")]
    PermissionDenied,

    /// `open()` called on a port that is already ready
    #[error("Port is already open")]
    AlreadyOpen,

    /// The claimed interface has no bulk endpoint for a direction
    #[error("No bulk {0} endpoint on interface")]
    EndpointNotFound(EndpointDirection),

    /// A control or bulk transfer failed
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// The caller's cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap a transport error with the name of the failed operation.
    pub fn io(operation: &'static str, source: io::Error) -> Self {
        Error::Io { operation, source }
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
