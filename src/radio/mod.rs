//! Transceiver abstraction and the RFM69 driver.
//!
//! The protocol engine talks to radios only through [`Transceiver`]. [`rf69::Rf69`] is
//! the hardware implementation; each physical unit is one `Rf69` owning its own
//! `SpiDevice` (and therefore its own chip-select line).
//!
//! ## Frequency register
//!
//! The carrier is programmed as a 24-bit count of [`FSTEP`] steps. Encoding floors,
//! decoding rounds, so `frequency_from_register(frequency_to_register(hz))` is always
//! within one step of `hz`.

pub mod registers;
pub mod rf69;

use crate::error::RadioError;

/// Transceiver crystal frequency.
pub const FXOSC_HZ: u32 = 32_000_000;

/// Frequency synthesizer step, `FXOSC / 2^19`.
pub const FSTEP: f64 = FXOSC_HZ as f64 / 524_288.0;

/// Converts a carrier frequency to the transceiver's 24-bit register value (floor).
pub const fn frequency_to_register(hz: u32) -> u32 {
    (((hz as u64) << 19) / FXOSC_HZ as u64) as u32
}

/// Converts the transceiver's 24-bit register value to Hz (rounded to nearest).
pub fn frequency_from_register(reg: u32) -> u32 {
    libm::round(f64::from(reg & 0x00ff_ffff) * FSTEP) as u32
}

/// Operating mode of a transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RadioMode {
    /// Lowest power, registers retained.
    #[default]
    Sleep,
    /// Crystal running, ready to switch.
    Standby,
    /// PLL locked on the carrier.
    Synthesizer,
    /// Receiving.
    Receive,
    /// Transmitting.
    Transmit,
}

/// Register table selector for [`Transceiver::apply_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Band {
    /// 433.9 MHz FSK, bit-banged preamble.
    F433,
    /// 868 MHz OOK byte stream.
    F868,
    /// 916 MHz OOK byte stream.
    F916,
}

/// Receiver channel filter presets for OOK reception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum OokBandwidth {
    /// 200 kHz.
    Khz200,
    /// 250 kHz.
    Khz250,
}

/// Register-level contract of one sub-GHz transceiver.
///
/// Every operation talks to the device and can therefore fail with [`RadioError`].
/// Implementations settle mode changes before returning.
pub trait Transceiver {
    /// Last mode set through [`set_mode`](Transceiver::set_mode).
    fn mode(&self) -> RadioMode;

    /// Switches mode and waits for the device to report ready. Setting the current mode
    /// is a no-op.
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError>;

    /// Reads back the programmed carrier frequency in Hz.
    fn frequency(&mut self) -> Result<u32, RadioError>;

    /// Retunes the carrier without emitting while the synthesizer moves.
    fn set_frequency(&mut self, hz: u32) -> Result<(), RadioError>;

    /// Sets the PA output power index, clamped to 0..=31.
    fn set_power_level(&mut self, level: u8) -> Result<(), RadioError>;

    /// Returns the RSSI in dBm, triggering a fresh measurement first when `force` is set.
    fn read_rssi(&mut self, force: bool) -> Result<i16, RadioError>;

    /// `true` when the FIFO holds no data.
    fn is_fifo_empty(&mut self) -> Result<bool, RadioError>;

    /// `true` when the FIFO cannot take another byte.
    fn is_fifo_full(&mut self) -> Result<bool, RadioError>;

    /// `true` when the FIFO level exceeds the configured threshold.
    fn is_fifo_over_threshold(&mut self) -> Result<bool, RadioError>;

    /// Discards everything in the FIFO.
    fn clear_fifo(&mut self) -> Result<(), RadioError>;

    /// Writes one byte into the FIFO.
    fn xmit_byte(&mut self, byte: u8) -> Result<(), RadioError>;

    /// Writes `data` into the FIFO in a single burst.
    fn xmit_burst(&mut self, data: &[u8]) -> Result<(), RadioError>;

    /// Pops one byte from the FIFO.
    fn recv_byte(&mut self) -> Result<u8, RadioError>;

    /// `true` once the sync word has been matched.
    fn packet_seen(&mut self) -> Result<bool, RadioError>;

    /// Loads a band's register table and leaves the device asleep.
    fn apply_config(&mut self, band: Band) -> Result<(), RadioError>;

    /// Switches to fixed-length packets of `len` bytes.
    fn set_payload_len(&mut self, len: u8) -> Result<(), RadioError>;

    /// Enables or disables sync word detection.
    fn set_sync(&mut self, on: bool) -> Result<(), RadioError>;

    /// Sets the hardware preamble length in bytes.
    fn set_preamble_size(&mut self, size: u16) -> Result<(), RadioError>;

    /// Switches to unlimited-length packets.
    fn set_unlimited_len(&mut self) -> Result<(), RadioError>;

    /// Selects an OOK receiver bandwidth.
    fn set_ook_bandwidth(&mut self, bandwidth: OokBandwidth) -> Result<(), RadioError>;

    /// Turns the automatic mode sequencer on or off.
    fn set_sequencer(&mut self, on: bool) -> Result<(), RadioError>;

    /// Restores the default DIO pin mapping.
    fn set_dio_mapping(&mut self) -> Result<(), RadioError>;
}
