//! Register-level driver for one HopeRF RFM69 (SX1231) transceiver.
//!
//! The driver owns an `embedded_hal::spi::SpiDevice`. Because the device manages its own
//! chip-select line, two radios on a shared bus are simply two `Rf69` values built from
//! two `SpiDevice`s; nothing in the driver selects a unit by identifier.
//!
//! ## Register access
//!
//! - read: `[addr & 0x7f, 0x00]`, value returned in the second byte
//! - write: `[addr | 0x80, value]`
//! - FIFO burst: `[0x80, data...]` in one transaction
//!
//! ## Busy-waits
//!
//! Mode-ready and RSSI-ready polls are bounded by [`Rf69::poll_limit`] register reads.
//! Running out surfaces as [`RadioError::ModeTimeout`] or [`RadioError::RssiTimeout`]
//! instead of hanging the control loop.

use embedded_hal::spi::{Operation, SpiDevice};

use super::registers::*;
use super::{Band, OokBandwidth, RadioMode, Transceiver, frequency_from_register, frequency_to_register};
use crate::error::RadioError;

/// Default number of status reads before a mode or RSSI poll gives up.
pub const DEFAULT_POLL_LIMIT: u32 = 10_000;

/// One RFM69 transceiver on its own `SpiDevice`.
#[derive(Debug)]
pub struct Rf69<SPI> {
    spi: SPI,
    mode: RadioMode,
    poll_limit: u32,
}

impl<SPI: SpiDevice> Rf69<SPI> {
    /// Wraps `spi`. The cached mode starts as [`RadioMode::Sleep`]; call
    /// [`apply_config`](Transceiver::apply_config) before use.
    pub fn new(spi: SPI) -> Self {
        Self {
            spi,
            mode: RadioMode::Sleep,
            poll_limit: DEFAULT_POLL_LIMIT,
        }
    }

    /// Replaces the status-poll ceiling. A limit of zero is treated as one read.
    pub fn with_poll_limit(mut self, limit: u32) -> Self {
        self.poll_limit = limit.max(1);
        self
    }

    /// Current status-poll ceiling.
    pub fn poll_limit(&self) -> u32 {
        self.poll_limit
    }

    /// Releases the SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }

    fn read_register(&mut self, addr: u8) -> Result<u8, RadioError> {
        let mut buf = [addr & !SPI_WRITE, 0x00];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(|_| RadioError::Spi)?;
        Ok(buf[1])
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), RadioError> {
        self.spi
            .write(&[addr | SPI_WRITE, value])
            .map_err(|_| RadioError::Spi)
    }

    fn modify_register(&mut self, addr: u8, f: impl FnOnce(u8) -> u8) -> Result<(), RadioError> {
        let value = self.read_register(addr)?;
        self.write_register(addr, f(value))
    }

    fn poll_flag(&mut self, addr: u8, mask: u8, err: RadioError) -> Result<(), RadioError> {
        for _ in 0..self.poll_limit {
            if self.read_register(addr)? & mask != 0 {
                return Ok(());
            }
        }
        Err(err)
    }
}

const fn opmode_bits(mode: RadioMode) -> u8 {
    match mode {
        RadioMode::Sleep => OPMODE_SLEEP,
        RadioMode::Standby => OPMODE_STANDBY,
        RadioMode::Synthesizer => OPMODE_SYNTHESIZER,
        RadioMode::Receive => OPMODE_RECEIVER,
        RadioMode::Transmit => OPMODE_TRANSMITTER,
    }
}

impl<SPI: SpiDevice> Transceiver for Rf69<SPI> {
    fn mode(&self) -> RadioMode {
        self.mode
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        if mode == self.mode {
            return Ok(());
        }
        self.modify_register(REG_OPMODE, |r| {
            (r & !OPMODE_MODE_MASK) | opmode_bits(mode)
        })?;
        if let Err(e) = self.poll_flag(REG_IRQFLAGS1, IRQFLAGS1_MODEREADY, RadioError::ModeTimeout)
        {
            error!("rf69: mode {:?} never became ready", mode);
            return Err(e);
        }
        self.mode = mode;
        Ok(())
    }

    fn frequency(&mut self) -> Result<u32, RadioError> {
        let msb = self.read_register(REG_FRFMSB)?;
        let mid = self.read_register(REG_FRFMID)?;
        let lsb = self.read_register(REG_FRFLSB)?;
        let frf = (u32::from(msb) << 16) | (u32::from(mid) << 8) | u32::from(lsb);
        Ok(frequency_from_register(frf))
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), RadioError> {
        let previous = self.mode;
        if previous == RadioMode::Transmit {
            self.set_mode(RadioMode::Receive)?;
        }
        let frf = frequency_to_register(hz);
        self.write_register(REG_FRFMSB, (frf >> 16) as u8)?;
        self.write_register(REG_FRFMID, (frf >> 8) as u8)?;
        self.write_register(REG_FRFLSB, frf as u8)?;
        if previous == RadioMode::Receive {
            self.set_mode(RadioMode::Synthesizer)?;
        }
        self.set_mode(previous)
    }

    fn set_power_level(&mut self, level: u8) -> Result<(), RadioError> {
        let level = level.min(MAX_POWER_LEVEL);
        self.modify_register(REG_PALEVEL, |r| (r & !PALEVEL_OUTPUT_POWER_MASK) | level)
    }

    fn read_rssi(&mut self, force: bool) -> Result<i16, RadioError> {
        if force {
            self.write_register(REG_RSSICONFIG, RSSI_START)?;
            self.poll_flag(REG_RSSICONFIG, RSSI_DONE, RadioError::RssiTimeout)?;
        }
        let raw = self.read_register(REG_RSSIVALUE)?;
        Ok(-i16::from(raw) >> 1)
    }

    fn is_fifo_empty(&mut self) -> Result<bool, RadioError> {
        Ok(self.read_register(REG_IRQFLAGS2)? & IRQFLAGS2_FIFONOTEMPTY == 0)
    }

    fn is_fifo_full(&mut self) -> Result<bool, RadioError> {
        Ok(self.read_register(REG_IRQFLAGS2)? & IRQFLAGS2_FIFOFULL != 0)
    }

    fn is_fifo_over_threshold(&mut self) -> Result<bool, RadioError> {
        Ok(self.read_register(REG_IRQFLAGS2)? & IRQFLAGS2_FIFOLEVEL != 0)
    }

    fn clear_fifo(&mut self) -> Result<(), RadioError> {
        self.write_register(REG_IRQFLAGS2, IRQFLAGS2_FIFOOVERRUN)
    }

    fn xmit_byte(&mut self, byte: u8) -> Result<(), RadioError> {
        self.write_register(REG_FIFO, byte)
    }

    fn xmit_burst(&mut self, data: &[u8]) -> Result<(), RadioError> {
        self.spi
            .transaction(&mut [
                Operation::Write(&[REG_FIFO | SPI_WRITE]),
                Operation::Write(data),
            ])
            .map_err(|_| RadioError::Spi)
    }

    fn recv_byte(&mut self) -> Result<u8, RadioError> {
        self.read_register(REG_FIFO)
    }

    fn packet_seen(&mut self) -> Result<bool, RadioError> {
        Ok(self.read_register(REG_IRQFLAGS1)? & IRQFLAGS1_SYNCADDRESSMATCH != 0)
    }

    fn apply_config(&mut self, band: Band) -> Result<(), RadioError> {
        debug!("rf69: loading {:?} register table", band);
        for &(addr, value) in config_table(band) {
            self.write_register(addr, value)?;
        }
        // the table leaves the chip in standby
        self.mode = RadioMode::Standby;
        self.set_mode(RadioMode::Sleep)
    }

    fn set_payload_len(&mut self, len: u8) -> Result<(), RadioError> {
        self.modify_register(REG_PACKETCONFIG1, |r| r & !PACKET1_FORMAT_VARIABLE)?;
        self.write_register(REG_PAYLOADLENGTH, len)
    }

    fn set_sync(&mut self, on: bool) -> Result<(), RadioError> {
        self.modify_register(REG_SYNCCONFIG, |r| {
            if on { r | SYNC_ON } else { r & !SYNC_ON }
        })
    }

    fn set_preamble_size(&mut self, size: u16) -> Result<(), RadioError> {
        let [msb, lsb] = size.to_be_bytes();
        self.write_register(REG_PREAMBLEMSB, msb)?;
        self.write_register(REG_PREAMBLELSB, lsb)
    }

    fn set_unlimited_len(&mut self) -> Result<(), RadioError> {
        self.modify_register(REG_PACKETCONFIG1, |r| r & !PACKET1_FORMAT_VARIABLE)?;
        self.write_register(REG_PAYLOADLENGTH, 0)
    }

    fn set_ook_bandwidth(&mut self, bandwidth: OokBandwidth) -> Result<(), RadioError> {
        let value = match bandwidth {
            OokBandwidth::Khz200 => RXBW_OOK_200KHZ,
            OokBandwidth::Khz250 => RXBW_OOK_250KHZ,
        };
        self.write_register(REG_RXBW, value)
    }

    fn set_sequencer(&mut self, on: bool) -> Result<(), RadioError> {
        self.modify_register(REG_OPMODE, |r| {
            if on {
                r & !OPMODE_SEQUENCER_OFF
            } else {
                r | OPMODE_SEQUENCER_OFF
            }
        })
    }

    fn set_dio_mapping(&mut self) -> Result<(), RadioError> {
        self.write_register(REG_DIOMAPPING1, DIOMAPPING1_DIO0_00)
    }
}
