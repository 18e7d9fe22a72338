//! Wire command frames and their parameter blocks.
//!
//! A BLE write carries one frame, `[len][opcode][payload...]` with `len == 1 + payload.len()`.
//! Multi-byte parameters are big-endian on the wire.

use heapless::Vec;

use crate::consts::MAX_COMMAND_PAYLOAD;
use crate::error::CommandError;

/// Command opcodes understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Reports that the bridge is alive.
    GetState = 0x01,
    /// Reports the firmware version string.
    GetVersion = 0x02,
    /// Listens for one packet.
    GetPacket = 0x03,
    /// Transmits a packet, optionally repeated.
    SendPacket = 0x04,
    /// Transmits, then listens with retries.
    SendAndListen = 0x05,
    /// Writes a client-visible register. Runs as soon as it arrives.
    UpdateRegister = 0x06,
    /// Accepted and ignored.
    Reset = 0x07,
    /// Accepted, answered, no effect.
    Led = 0x08,
    /// Reads a client-visible register.
    ReadRegister = 0x09,
    /// Accepted, answered, no effect.
    SetModeRegister = 0x0a,
    /// Selects the software line code.
    SetSoftwareEncoding = 0x0b,
    /// Stores the preamble word.
    SetPreamble = 0x0c,
    /// Reloads the active radio table and clears encoding and preamble.
    ResetRadioConfig = 0x0d,
    /// Reports uptime and packet counters.
    GetStatistics = 0x0e,
}

impl TryFrom<u8> for Opcode {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => Opcode::GetState,
            0x02 => Opcode::GetVersion,
            0x03 => Opcode::GetPacket,
            0x04 => Opcode::SendPacket,
            0x05 => Opcode::SendAndListen,
            0x06 => Opcode::UpdateRegister,
            0x07 => Opcode::Reset,
            0x08 => Opcode::Led,
            0x09 => Opcode::ReadRegister,
            0x0a => Opcode::SetModeRegister,
            0x0b => Opcode::SetSoftwareEncoding,
            0x0c => Opcode::SetPreamble,
            0x0d => Opcode::ResetRadioConfig,
            0x0e => Opcode::GetStatistics,
            other => return Err(CommandError::UnknownOpcode(other)),
        })
    }
}

/// A validated frame borrowed from the transport's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Raw opcode byte. Not checked here; unknown opcodes are answered at dispatch.
    pub opcode: u8,
    /// Everything after the opcode.
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Checks the length prefix and splits off the opcode.
    pub fn parse(raw: &'a [u8]) -> Result<Self, CommandError> {
        match raw {
            [len, opcode, payload @ ..] if usize::from(*len) == raw.len() - 1 => Ok(Self {
                opcode: *opcode,
                payload,
            }),
            _ => Err(CommandError::Malformed),
        }
    }
}

/// A command waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    /// Raw opcode byte.
    pub opcode: u8,
    /// BLE signal strength when the frame arrived.
    pub rssi: i8,
    /// Copy of the frame payload.
    pub payload: Vec<u8, MAX_COMMAND_PAYLOAD>,
}

impl QueuedCommand {
    /// Copies `frame` into a fixed-size record.
    pub fn new(frame: &Frame<'_>, rssi: i8) -> Result<Self, CommandError> {
        let payload = Vec::from_slice(frame.payload)
            .map_err(|()| CommandError::TooLong(frame.payload.len()))?;
        Ok(Self {
            opcode: frame.opcode,
            rssi,
            payload,
        })
    }
}

fn require(payload: &[u8], expected: usize) -> Result<(), CommandError> {
    if payload.len() < expected {
        return Err(CommandError::ShortPayload {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// `GetPacket` parameters: `[channel][timeout_ms:u32]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetPacket {
    /// Listen channel. Kept for compatibility; the frequency registers decide.
    pub channel: u8,
    /// Listen timeout in ms, 0 for no deadline.
    pub timeout_ms: u32,
}

impl GetPacket {
    /// Fixed parameter size.
    pub const LEN: usize = 5;

    /// Parses the parameter block.
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        require(payload, Self::LEN)?;
        Ok(Self {
            channel: payload[0],
            timeout_ms: be_u32(&payload[1..5]),
        })
    }
}

/// `SendPacket` parameters: `[channel][repeat][interval_ms:u16][preamble_ext_ms:u16][packet...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendPacket<'a> {
    /// Send channel. Kept for compatibility; the frequency registers decide.
    pub channel: u8,
    /// Extra sends after the first.
    pub repeat: u8,
    /// Pause between sends, in ms.
    pub interval_ms: u16,
    /// Preamble extension for the bit-banged framing, in ms.
    pub preamble_ext_ms: u16,
    /// Packet bytes, before line coding.
    pub packet: &'a [u8],
}

impl<'a> SendPacket<'a> {
    /// Size of the fixed header before the packet.
    pub const HEADER_LEN: usize = 6;

    /// Parses the parameter block.
    pub fn parse(payload: &'a [u8]) -> Result<Self, CommandError> {
        require(payload, Self::HEADER_LEN)?;
        Ok(Self {
            channel: payload[0],
            repeat: payload[1],
            interval_ms: be_u16(&payload[2..4]),
            preamble_ext_ms: be_u16(&payload[4..6]),
            packet: &payload[Self::HEADER_LEN..],
        })
    }
}

/// `SendAndListen` parameters:
/// `[send_channel][repeat][interval_ms:u16][listen_channel][timeout_ms:u32][retries][preamble_ext_ms:u16][packet...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendAndListen<'a> {
    /// Send channel.
    pub send_channel: u8,
    /// Extra sends after the first, for the initial send only.
    pub repeat: u8,
    /// Pause between sends, in ms.
    pub interval_ms: u16,
    /// Listen channel.
    pub listen_channel: u8,
    /// Listen timeout in ms, 0 for no deadline.
    pub timeout_ms: u32,
    /// Resend-and-listen rounds allowed after a timeout.
    pub retries: u8,
    /// Preamble extension for the bit-banged framing, in ms.
    pub preamble_ext_ms: u16,
    /// Packet bytes, before line coding.
    pub packet: &'a [u8],
}

impl<'a> SendAndListen<'a> {
    /// Size of the fixed header before the packet.
    pub const HEADER_LEN: usize = 12;

    /// Parses the parameter block.
    pub fn parse(payload: &'a [u8]) -> Result<Self, CommandError> {
        require(payload, Self::HEADER_LEN)?;
        Ok(Self {
            send_channel: payload[0],
            repeat: payload[1],
            interval_ms: be_u16(&payload[2..4]),
            listen_channel: payload[4],
            timeout_ms: be_u32(&payload[5..9]),
            retries: payload[9],
            preamble_ext_ms: be_u16(&payload[10..12]),
            packet: &payload[Self::HEADER_LEN..],
        })
    }
}

/// `UpdateRegister` parameters: `[addr][value]`. Longer payloads are accepted; the rest is
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    /// Client register address.
    pub addr: u8,
    /// New value.
    pub value: u8,
}

impl RegisterWrite {
    /// Fixed parameter size.
    pub const LEN: usize = 2;

    /// Parses the parameter block.
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        require(payload, Self::LEN)?;
        Ok(Self {
            addr: payload[0],
            value: payload[1],
        })
    }
}

/// First payload byte, for the single-byte commands.
pub fn single_byte(payload: &[u8]) -> Result<u8, CommandError> {
    require(payload, 1)?;
    Ok(payload[0])
}

/// Big-endian `u16` parameter, for `SetPreamble`.
pub fn word(payload: &[u8]) -> Result<u16, CommandError> {
    require(payload, 2)?;
    Ok(be_u16(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_length_prefix() {
        assert_eq!(
            Frame::parse(&[1, 0x01]),
            Ok(Frame {
                opcode: 0x01,
                payload: &[]
            })
        );
        assert_eq!(
            Frame::parse(&[3, 0x06, 0x09, 0x26]),
            Ok(Frame {
                opcode: 0x06,
                payload: &[0x09, 0x26]
            })
        );
        assert_eq!(Frame::parse(&[3, 0x01]), Err(CommandError::Malformed));
        assert_eq!(Frame::parse(&[5, 0x01]), Err(CommandError::Malformed));
        assert_eq!(Frame::parse(&[0]), Err(CommandError::Malformed));
        assert_eq!(Frame::parse(&[]), Err(CommandError::Malformed));
    }

    #[test]
    fn test_opcodes() {
        assert_eq!(Opcode::try_from(0x05), Ok(Opcode::SendAndListen));
        assert_eq!(Opcode::try_from(0x0e), Ok(Opcode::GetStatistics));
        assert_eq!(Opcode::try_from(0x00), Err(CommandError::UnknownOpcode(0x00)));
        assert_eq!(Opcode::try_from(0x42), Err(CommandError::UnknownOpcode(0x42)));
    }

    #[test]
    fn test_queued_command_capacity() {
        let payload = [0u8; MAX_COMMAND_PAYLOAD + 1];
        let frame = Frame {
            opcode: 0x04,
            payload: &payload,
        };
        assert_eq!(
            QueuedCommand::new(&frame, -40),
            Err(CommandError::TooLong(MAX_COMMAND_PAYLOAD + 1))
        );
        let fits = Frame {
            opcode: 0x04,
            payload: &payload[..MAX_COMMAND_PAYLOAD],
        };
        let queued = QueuedCommand::new(&fits, -40).unwrap();
        assert_eq!(queued.rssi, -40);
        assert_eq!(queued.payload.len(), MAX_COMMAND_PAYLOAD);
    }

    #[test]
    fn test_send_and_listen_layout() {
        let payload = [
            0x00, 0x02, 0x00, 0x64, 0x00, 0x00, 0x00, 0x01, 0xf4, 0x03, 0x01, 0x2c, 0xa7, 0x12,
        ];
        let params = SendAndListen::parse(&payload).unwrap();
        assert_eq!(params.repeat, 2);
        assert_eq!(params.interval_ms, 100);
        assert_eq!(params.listen_channel, 0);
        assert_eq!(params.timeout_ms, 500);
        assert_eq!(params.retries, 3);
        assert_eq!(params.preamble_ext_ms, 300);
        assert_eq!(params.packet, &[0xa7, 0x12]);
        assert_eq!(params.send_channel, 0);
    }

    #[test]
    fn test_short_parameter_blocks() {
        assert_eq!(
            GetPacket::parse(&[0, 0, 0]),
            Err(CommandError::ShortPayload {
                expected: 5,
                actual: 3
            })
        );
        assert!(SendPacket::parse(&[0; 5]).is_err());
        assert!(RegisterWrite::parse(&[0x09]).is_err());
        assert!(single_byte(&[]).is_err());
        assert!(word(&[0x12]).is_err());
    }

    #[test]
    fn test_big_endian_parameters() {
        let get = GetPacket::parse(&[0x00, 0x00, 0x00, 0x27, 0x10]).unwrap();
        assert_eq!(get.timeout_ms, 10_000);
        assert_eq!(get.channel, 0);

        let send = SendPacket::parse(&[0x00, 0x01, 0x01, 0x00, 0x00, 0x0a, 0x55]).unwrap();
        assert_eq!(send.repeat, 1);
        assert_eq!(send.interval_ms, 256);
        assert_eq!(send.preamble_ext_ms, 10);
        assert_eq!(send.packet, &[0x55]);
        assert_eq!(send.channel, 0);

        assert_eq!(word(&[0x12, 0x34]), Ok(0x1234));
        assert_eq!(
            RegisterWrite::parse(&[0x09, 0x26, 0xff]),
            Ok(RegisterWrite {
                addr: 0x09,
                value: 0x26
            })
        );
    }
}
