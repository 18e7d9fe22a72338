//! RFM69 (SX1231) register map, bit fields, and the per-band configuration tables.
//!
//! Only the registers this bridge touches are listed. Values follow the SX1231 datasheet
//! for a 32 MHz crystal.

use super::Band;

/// FIFO read/write access.
pub const REG_FIFO: u8 = 0x00;
/// Operating mode.
pub const REG_OPMODE: u8 = 0x01;
/// Data processing mode and modulation scheme.
pub const REG_DATAMODUL: u8 = 0x02;
/// Bit rate MSB.
pub const REG_BITRATEMSB: u8 = 0x03;
/// Bit rate LSB.
pub const REG_BITRATELSB: u8 = 0x04;
/// Frequency deviation MSB.
pub const REG_FDEVMSB: u8 = 0x05;
/// Frequency deviation LSB.
pub const REG_FDEVLSB: u8 = 0x06;
/// Carrier frequency MSB.
pub const REG_FRFMSB: u8 = 0x07;
/// Carrier frequency middle byte.
pub const REG_FRFMID: u8 = 0x08;
/// Carrier frequency LSB.
pub const REG_FRFLSB: u8 = 0x09;
/// PA selection and output power.
pub const REG_PALEVEL: u8 = 0x11;
/// Channel filter bandwidth.
pub const REG_RXBW: u8 = 0x19;
/// RSSI trigger and status.
pub const REG_RSSICONFIG: u8 = 0x23;
/// Last RSSI sample, `-2 * dBm`.
pub const REG_RSSIVALUE: u8 = 0x24;
/// DIO0..DIO3 mapping.
pub const REG_DIOMAPPING1: u8 = 0x25;
/// DIO4/DIO5 mapping and ClkOut.
pub const REG_DIOMAPPING2: u8 = 0x26;
/// Mode and sync status flags.
pub const REG_IRQFLAGS1: u8 = 0x27;
/// FIFO and packet status flags.
pub const REG_IRQFLAGS2: u8 = 0x28;
/// RSSI trigger level.
pub const REG_RSSITHRESH: u8 = 0x29;
/// Preamble length MSB.
pub const REG_PREAMBLEMSB: u8 = 0x2c;
/// Preamble length LSB.
pub const REG_PREAMBLELSB: u8 = 0x2d;
/// Sync word generation and detection.
pub const REG_SYNCCONFIG: u8 = 0x2e;
/// Sync word byte 1.
pub const REG_SYNCVALUE1: u8 = 0x2f;
/// Sync word byte 2.
pub const REG_SYNCVALUE2: u8 = 0x30;
/// Sync word byte 3.
pub const REG_SYNCVALUE3: u8 = 0x31;
/// Sync word byte 4.
pub const REG_SYNCVALUE4: u8 = 0x32;
/// Packet format, DC-free coding, CRC and address filtering.
pub const REG_PACKETCONFIG1: u8 = 0x37;
/// Payload length (fixed mode) or max length (variable mode).
pub const REG_PAYLOADLENGTH: u8 = 0x38;
/// TX start condition and FIFO level threshold.
pub const REG_FIFOTHRESH: u8 = 0x3c;
/// RX restart and AES.
pub const REG_PACKETCONFIG2: u8 = 0x3d;
/// Fading margin improvement.
pub const REG_TESTDAGC: u8 = 0x6f;

/// Set on the address byte of an SPI write.
pub const SPI_WRITE: u8 = 0x80;

/// Sequencer off bit in `RegOpMode` (set = manual mode control).
pub const OPMODE_SEQUENCER_OFF: u8 = 0x80;
/// Mode bits in `RegOpMode`.
pub const OPMODE_MODE_MASK: u8 = 0x1c;
/// `RegOpMode` sleep.
pub const OPMODE_SLEEP: u8 = 0x00;
/// `RegOpMode` standby.
pub const OPMODE_STANDBY: u8 = 0x04;
/// `RegOpMode` frequency synthesizer.
pub const OPMODE_SYNTHESIZER: u8 = 0x08;
/// `RegOpMode` transmitter.
pub const OPMODE_TRANSMITTER: u8 = 0x0c;
/// `RegOpMode` receiver.
pub const OPMODE_RECEIVER: u8 = 0x10;

/// Packet mode, FSK, no shaping.
pub const DATAMODUL_PACKET_FSK: u8 = 0x00;
/// Packet mode, OOK, no shaping.
pub const DATAMODUL_PACKET_OOK: u8 = 0x08;

/// Output power bits in `RegPaLevel`.
pub const PALEVEL_OUTPUT_POWER_MASK: u8 = 0x1f;
/// Highest output power index.
pub const MAX_POWER_LEVEL: u8 = 31;

/// DCC 16 % / mantissa 16 / exponent 0: 250 kHz OOK channel filter.
pub const RXBW_OOK_250KHZ: u8 = 0x00;
/// DCC 16 % / mantissa 20 / exponent 0: 200 kHz OOK channel filter.
pub const RXBW_OOK_200KHZ: u8 = 0x08;
/// DCC 4 % / mantissa 20 / exponent 2: 50 kHz FSK channel filter.
pub const RXBW_FSK_50KHZ: u8 = 0x4a;

/// Starts an RSSI measurement.
pub const RSSI_START: u8 = 0x01;
/// RSSI measurement complete.
pub const RSSI_DONE: u8 = 0x02;

/// DIO0 mapping 00 (PayloadReady / PacketSent).
pub const DIOMAPPING1_DIO0_00: u8 = 0x00;
/// ClkOut disabled.
pub const DIOMAPPING2_CLKOUT_OFF: u8 = 0x07;

/// `RegIrqFlags1`: requested mode is ready.
pub const IRQFLAGS1_MODEREADY: u8 = 0x80;
/// `RegIrqFlags1`: sync word matched.
pub const IRQFLAGS1_SYNCADDRESSMATCH: u8 = 0x01;

/// `RegIrqFlags2`: FIFO full.
pub const IRQFLAGS2_FIFOFULL: u8 = 0x80;
/// `RegIrqFlags2`: FIFO holds at least one byte.
pub const IRQFLAGS2_FIFONOTEMPTY: u8 = 0x40;
/// `RegIrqFlags2`: FIFO level above threshold.
pub const IRQFLAGS2_FIFOLEVEL: u8 = 0x20;
/// `RegIrqFlags2`: FIFO overrun; writing it clears the FIFO.
pub const IRQFLAGS2_FIFOOVERRUN: u8 = 0x10;

/// Sync word on bit in `RegSyncConfig`.
pub const SYNC_ON: u8 = 0x80;
/// Sync on, FIFO fill on sync, 4 sync bytes, no tolerated errors.
pub const SYNCCONFIG_4_BYTES: u8 = 0x98;

/// Variable length bit in `RegPacketConfig1`.
pub const PACKET1_FORMAT_VARIABLE: u8 = 0x80;
/// Fixed length, no DC-free coding, no CRC, no address filter.
pub const PACKETCONFIG1_FIXED_RAW: u8 = 0x08;

/// TX starts on FIFO not empty, FIFO threshold 15.
pub const FIFOTHRESH_TX_ON_NOT_EMPTY: u8 = 0x8f;
/// No auto RX restart, AES off.
pub const PACKETCONFIG2_MANUAL: u8 = 0x00;
/// DAGC improved for low modulation index.
pub const DAGC_IMPROVED_LOWBETA0: u8 = 0x30;
/// -114 dBm RSSI threshold.
pub const RSSI_THRESHOLD: u8 = 228;

/// Depth of the transceiver FIFO.
pub const FIFO_SIZE: usize = 66;

/// A register table: `(address, value)` pairs written in order.
pub type RegisterTable = &'static [(u8, u8)];

/// 916 MHz OOK, 16384 bps, sync `FF 00 FF 00`.
pub static CONFIG_916: [(u8, u8); 24] = [
    (REG_OPMODE, OPMODE_STANDBY),
    (REG_DATAMODUL, DATAMODUL_PACKET_OOK),
    (REG_BITRATEMSB, 0x07),
    (REG_BITRATELSB, 0xa1),
    (REG_FRFMSB, 0xe5),
    (REG_FRFMID, 0x00),
    (REG_FRFLSB, 0x00),
    (REG_RXBW, RXBW_OOK_200KHZ),
    (REG_DIOMAPPING1, DIOMAPPING1_DIO0_00),
    (REG_DIOMAPPING2, DIOMAPPING2_CLKOUT_OFF),
    (REG_IRQFLAGS2, IRQFLAGS2_FIFOOVERRUN),
    (REG_RSSITHRESH, RSSI_THRESHOLD),
    (REG_PREAMBLEMSB, 0x00),
    (REG_PREAMBLELSB, 0x03),
    (REG_SYNCCONFIG, SYNCCONFIG_4_BYTES),
    (REG_SYNCVALUE1, 0xff),
    (REG_SYNCVALUE2, 0x00),
    (REG_SYNCVALUE3, 0xff),
    (REG_SYNCVALUE4, 0x00),
    (REG_PACKETCONFIG1, PACKETCONFIG1_FIXED_RAW),
    (REG_PAYLOADLENGTH, 0xff),
    (REG_FIFOTHRESH, FIFOTHRESH_TX_ON_NOT_EMPTY),
    (REG_PACKETCONFIG2, PACKETCONFIG2_MANUAL),
    (REG_TESTDAGC, DAGC_IMPROVED_LOWBETA0),
];

/// 868 MHz OOK, 16384 bps, sync `FF 00 FF 00`.
pub static CONFIG_868: [(u8, u8); 24] = [
    (REG_OPMODE, OPMODE_STANDBY),
    (REG_DATAMODUL, DATAMODUL_PACKET_OOK),
    (REG_BITRATEMSB, 0x07),
    (REG_BITRATELSB, 0xa1),
    (REG_FRFMSB, 0xd9),
    (REG_FRFMID, 0x00),
    (REG_FRFLSB, 0x00),
    (REG_RXBW, RXBW_OOK_250KHZ),
    (REG_DIOMAPPING1, DIOMAPPING1_DIO0_00),
    (REG_DIOMAPPING2, DIOMAPPING2_CLKOUT_OFF),
    (REG_IRQFLAGS2, IRQFLAGS2_FIFOOVERRUN),
    (REG_RSSITHRESH, RSSI_THRESHOLD),
    (REG_PREAMBLEMSB, 0x00),
    (REG_PREAMBLELSB, 0x03),
    (REG_SYNCCONFIG, SYNCCONFIG_4_BYTES),
    (REG_SYNCVALUE1, 0xff),
    (REG_SYNCVALUE2, 0x00),
    (REG_SYNCVALUE3, 0xff),
    (REG_SYNCVALUE4, 0x00),
    (REG_PACKETCONFIG1, PACKETCONFIG1_FIXED_RAW),
    (REG_PAYLOADLENGTH, 0xff),
    (REG_FIFOTHRESH, FIFOTHRESH_TX_ON_NOT_EMPTY),
    (REG_PACKETCONFIG2, PACKETCONFIG2_MANUAL),
    (REG_TESTDAGC, DAGC_IMPROVED_LOWBETA0),
];

/// 433.9 MHz FSK, 40625 bps, 26.4 kHz deviation, sync `66 65 A5 5A`.
pub static CONFIG_433: [(u8, u8); 26] = [
    (REG_OPMODE, OPMODE_STANDBY),
    (REG_DATAMODUL, DATAMODUL_PACKET_FSK),
    (REG_BITRATEMSB, 0x03),
    (REG_BITRATELSB, 0x14),
    (REG_FDEVMSB, 0x01),
    (REG_FDEVLSB, 0xb0),
    (REG_FRFMSB, 0x6c),
    (REG_FRFMID, 0x80),
    (REG_FRFLSB, 0x00),
    (REG_RXBW, RXBW_FSK_50KHZ),
    (REG_DIOMAPPING1, DIOMAPPING1_DIO0_00),
    (REG_DIOMAPPING2, DIOMAPPING2_CLKOUT_OFF),
    (REG_IRQFLAGS2, IRQFLAGS2_FIFOOVERRUN),
    (REG_RSSITHRESH, RSSI_THRESHOLD),
    (REG_PREAMBLEMSB, 0x00),
    (REG_PREAMBLELSB, 0x03),
    (REG_SYNCCONFIG, SYNCCONFIG_4_BYTES),
    (REG_SYNCVALUE1, 0x66),
    (REG_SYNCVALUE2, 0x65),
    (REG_SYNCVALUE3, 0xa5),
    (REG_SYNCVALUE4, 0x5a),
    (REG_PACKETCONFIG1, PACKETCONFIG1_FIXED_RAW),
    (REG_PAYLOADLENGTH, 0xff),
    (REG_FIFOTHRESH, FIFOTHRESH_TX_ON_NOT_EMPTY),
    (REG_PACKETCONFIG2, PACKETCONFIG2_MANUAL),
    (REG_TESTDAGC, DAGC_IMPROVED_LOWBETA0),
];

/// Register table loaded by [`Transceiver::apply_config`](super::Transceiver::apply_config).
pub fn config_table(band: Band) -> RegisterTable {
    match band {
        Band::F433 => &CONFIG_433,
        Band::F868 => &CONFIG_868,
        Band::F916 => &CONFIG_916,
    }
}
