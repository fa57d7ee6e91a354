//! Fault model of the Modbus link.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single exchange on the wire.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Serial open failed: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Exception: {0}")]
    Exception(String),
    #[error("No response within {0:?}")]
    Timeout(Duration),
}

/// The link could not be brought up.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Failed to open link: {0}")]
    Open(#[source] TransportError),
    #[error("Warm-up transaction failed: {0}")]
    WarmUp(#[source] TransportError),
}

/// Root cause behind a failed transaction.
#[derive(Debug, Error)]
pub enum LinkFault {
    #[error("Link unavailable: {0}")]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Value {0} does not fit a 16-bit register")]
    ValueOutOfRange(i32),
}

/// A single-register transaction failed.
#[derive(Debug, Error)]
pub enum ModbusFault {
    #[error("Modbus read of register {address:#06x} failed: {source}")]
    FailedRead {
        address: u16,
        #[source]
        source: LinkFault,
    },
    #[error("Modbus write to register {address:#06x} failed: {source}")]
    FailedWrite {
        address: u16,
        #[source]
        source: LinkFault,
    },
}

impl ModbusFault {
    pub fn address(&self) -> u16 {
        match self {
            ModbusFault::FailedRead { address, .. } | ModbusFault::FailedWrite { address, .. } => {
                *address
            }
        }
    }

    pub fn cause(&self) -> &LinkFault {
        match self {
            ModbusFault::FailedRead { source, .. } | ModbusFault::FailedWrite { source, .. } => {
                source
            }
        }
    }
}
