//! Error types.
//!
//! Radio faults propagate out of the driver and engine with `?`; command errors are produced
//! while parsing a BLE frame. The [`Dispatcher`](crate::dispatcher::Dispatcher) is the only
//! place either is turned into a status byte, and neither ever stops the bridge.

use thiserror::Error;

/// Faults reported by a [`Transceiver`](crate::radio::Transceiver).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RadioError {
    /// The SPI transaction failed.
    #[error("spi transfer failed")]
    Spi,
    /// The transceiver never reported `ModeReady` within the configured ceiling.
    #[error("transceiver did not reach the requested mode")]
    ModeTimeout,
    /// A forced RSSI measurement never completed.
    #[error("rssi measurement did not complete")]
    RssiTimeout,
}

/// Problems with a command frame or its parameters.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum CommandError {
    /// The length prefix does not match the frame, or the frame has no opcode.
    #[error("malformed frame")]
    Malformed,
    /// The opcode is not part of the command set.
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),
    /// The payload does not fit in a command record.
    #[error("payload of {0} bytes is too long")]
    TooLong(usize),
    /// The payload is shorter than the command's fixed parameters.
    #[error("expected at least {expected} payload bytes, got {actual}")]
    ShortPayload {
        /// Minimum number of bytes the command needs.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },
    /// `SetSoftwareEncoding` named an encoding that does not exist.
    #[error("invalid encoding selector {0}")]
    InvalidEncoding(u8),
    /// The encoded packet does not fit in the transmit buffer.
    #[error("encoded packet of {0} bytes is too long")]
    EncodedTooLong(usize),
    /// The command queue already holds a pending command, or the register ring is full.
    #[error("command queue is full")]
    QueueFull,
}

/// Anything that can stop a command from completing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error {
    /// The transceiver misbehaved.
    #[error(transparent)]
    Radio(#[from] RadioError),
    /// The command itself was unusable.
    #[error(transparent)]
    Command(#[from] CommandError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CommandError::UnknownOpcode(0x42).to_string(),
            "unknown opcode 0x42"
        );
        assert_eq!(
            CommandError::ShortPayload {
                expected: 6,
                actual: 2
            }
            .to_string(),
            "expected at least 6 payload bytes, got 2"
        );
        assert_eq!(
            RadioError::ModeTimeout.to_string(),
            "transceiver did not reach the requested mode"
        );
        assert_eq!(
            Error::from(CommandError::InvalidEncoding(7)).to_string(),
            "invalid encoding selector 7"
        );
    }
}
