//! Constants used across the bridge.
//!
//! This module defines the wire-level status bytes, buffer sizing, the band windows
//! used to pick a pump protocol from a frequency, and the strings the client checks
//! on connect.
//!
//! ## Key Concepts
//!
//! - **Status bytes**: first byte of every response sent back over BLE.
//! - **Buffer Sizing**: command records, receive buffers and transmit buffers are all
//!   fixed-capacity so the crate never allocates.
//! - **Band windows**: inclusive frequency ranges that select a [`PumpMode`](crate::engine::PumpMode).
//! - **Client frequency register**: the client speaks in CC111x-style 24-bit frequency
//!   registers clocked from a 24 MHz crystal, independent of the transceiver's own step.
//!
//! These values must stay in sync with the client applications; most of them are part of
//! the wire protocol.

/// Response byte for a completed command. Multi-byte responses start with it.
pub const RESPONSE_SUCCESS: u8 = 0xdd;

/// Response byte for a listen that ran out of time (or lost the BLE link).
pub const RESPONSE_RX_TIMEOUT: u8 = 0xaa;

/// Response byte for a listen aborted because a newer command arrived.
pub const RESPONSE_INTERRUPTED: u8 = 0xbb;

/// Response byte for a command whose parameters could not be used.
pub const RESPONSE_PARAM_ERROR: u8 = 0x11;

/// Response byte for an opcode this firmware does not know.
/// Followed by the offending opcode.
pub const RESPONSE_UNKNOWN_COMMAND: u8 = 0x22;

/// Returned by `GetState`.
pub const STATE_OK: &[u8] = b"OK";

/// Returned by `GetVersion`. Clients match on this string to pick their command dialect.
pub const FIRMWARE_VERSION: &[u8] = b"subg_rfspy 2.2";

/// Placeholder returned by `ReadRegister` for addresses that are not tracked.
pub const READ_REGISTER_PLACEHOLDER: u8 = 0x5a;

/// Maximum number of fixed parameter bytes carried by any command.
pub const MAX_PARAM_LEN: usize = 16;

/// Largest over-the-air packet this bridge handles.
///
/// A 71-byte 4b6b packet encodes to 107 bytes; the 433 MHz protocol tops out at 80.
pub const MAX_PACKET_LEN: usize = 107;

/// Capacity of a queued command's payload.
pub const MAX_COMMAND_PAYLOAD: usize = MAX_PARAM_LEN + MAX_PACKET_LEN;

/// Maximum length of a response handed to the BLE transport.
pub const MAX_RESPONSE_LEN: usize = 150;

/// Capacity of the transmit staging buffer.
pub const TX_BUF_LEN: usize = 255;

/// Largest encoded payload accepted for transmission.
///
/// Leaves room for the 433 MHz sync word and trailer inside [`TX_BUF_LEN`].
pub const MAX_ENCODED_LEN: usize = TX_BUF_LEN - 3;

/// Depth of the command ring buffer. One slot is always kept free, so exactly one
/// command can be pending.
pub const QUEUE_DEPTH: usize = 2;

/// Depth of the register-write ring buffer. Clients write the three frequency bytes back
/// to back, so several writes can arrive between two ticks.
pub const REGISTER_QUEUE_DEPTH: usize = 8;

/// Period of the dispatcher tick, in milliseconds. Uptime is counted in ticks.
pub const TICK_PERIOD_MS: u32 = 10;

/// Crystal frequency the client's frequency registers are expressed against.
pub const CLIENT_FXOSC_HZ: u64 = 24_000_000;

/// Reset value of the client-visible frequency registers (0x09..=0x0B).
pub const DEFAULT_FREQ_REGISTERS: [u8; 3] = [0x12, 0x14, 0x83];

/// Lower edge of the 868 MHz band window.
pub const MIN_868_HZ: u32 = 866_000_000;
/// Upper edge of the 868 MHz band window.
pub const MAX_868_HZ: u32 = 870_000_000;
/// Lower edge of the 916 MHz band window.
pub const MIN_916_HZ: u32 = 914_000_000;
/// Upper edge of the 916 MHz band window.
pub const MAX_916_HZ: u32 = 918_000_000;
/// Lower edge of the 433 MHz band window.
pub const MIN_433_HZ: u32 = 431_000_000;
/// Upper edge of the 433 MHz band window.
pub const MAX_433_HZ: u32 = 435_000_000;

/// `UpdateRegister` address holding the fixed receive packet length.
pub const REG_ADDR_PKT_LEN: u8 = 0x02;
/// `UpdateRegister` address of the frequency register MSB.
pub const REG_ADDR_FREQ2: u8 = 0x09;
/// `UpdateRegister` address of the frequency register middle byte.
pub const REG_ADDR_FREQ1: u8 = 0x0a;
/// `UpdateRegister` address of the frequency register LSB.
pub const REG_ADDR_FREQ0: u8 = 0x0b;
/// `UpdateRegister` address used by clients to force the 868 MHz protocol.
pub const REG_ADDR_MDMCFG4: u8 = 0x0c;
/// Value written at [`REG_ADDR_MDMCFG4`] that selects the 868 MHz protocol.
pub const MDMCFG4_WWL_MAGIC: u8 = 0x59;

/// Offset between transceiver dBm and the CC111x RSSI scale the clients expect.
pub const CC111X_RSSI_OFFSET: i16 = 73;

/// RSSI reported before any packet has been received, in dBm.
pub const DEFAULT_RSSI_DBM: i16 = -140;

/// Converts an RSSI in dBm to the CC111x register scale used in responses.
///
/// The result wraps like the 8-bit register it imitates.
pub const fn rssi_to_cc111x(rssi_dbm: i16) -> u8 {
    ((rssi_dbm + CC111X_RSSI_OFFSET) * 2) as u8
}

/// Decodes the client's 24-bit frequency register into Hz (floor).
pub const fn client_register_to_hz(reg: [u8; 3]) -> u32 {
    let value = ((reg[0] as u64) << 16) | ((reg[1] as u64) << 8) | reg[2] as u64;
    ((value * CLIENT_FXOSC_HZ) >> 16) as u32
}

/// Encodes a frequency in Hz as the client's 24-bit frequency register (floor).
pub const fn hz_to_client_register(hz: u32) -> [u8; 3] {
    let value = ((hz as u64) << 16) / CLIENT_FXOSC_HZ;
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rssi_conversion() {
        assert_eq!(rssi_to_cc111x(-73), 0);
        assert_eq!(rssi_to_cc111x(-60), 26);
        // below the offset the register wraps
        assert_eq!(rssi_to_cc111x(-74), 0xfe);
    }

    #[test]
    fn test_default_registers_decode_to_433_band() {
        let hz = client_register_to_hz(DEFAULT_FREQ_REGISTERS);
        assert!((MIN_433_HZ..=MAX_433_HZ).contains(&hz));
    }

    #[test]
    fn test_client_register_round_trip_within_one_step() {
        let step = (CLIENT_FXOSC_HZ >> 16) as u32 + 1;
        for hz in [433_920_000u32, 868_350_000, 916_500_000, 869_999_999] {
            let back = client_register_to_hz(hz_to_client_register(hz));
            assert!(back <= hz);
            assert!(hz - back < step);
        }
    }
}
