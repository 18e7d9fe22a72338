//! Simulated radios and host used by the engine and dispatcher tests.
//!
//! All parts share one microsecond clock. Delays advance it, and so does every clock read,
//! so the busy receive loops always reach their deadline.

use std::boxed::Box;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::engine::{CancelFlag, Engine, Timing};
use crate::error::RadioError;
use crate::host::Host;
use crate::radio::registers::FIFO_SIZE;
use crate::radio::{Band, OokBandwidth, RadioMode, Transceiver};

type Clock = Rc<Cell<u64>>;

const FIFO_THRESHOLD: usize = 15;

/// Bytes the simulated modulator pulls out of the FIFO per millisecond.
const DRAIN_BYTES_PER_MS: u64 = 4;

/// A transceiver that records what the engine does to it.
#[derive(Debug)]
pub(crate) struct SimRadio {
    clock: Clock,
    mode: RadioMode,
    fifo_level: usize,
    drained_at_us: u64,
    pub(crate) configs: Vec<Band>,
    pub(crate) frequency: u32,
    pub(crate) rx: VecDeque<u8>,
    pub(crate) rssi_raw: u8,
    pub(crate) written: Vec<u8>,
    pub(crate) transmissions: usize,
    pub(crate) drain_bytes_per_ms: u64,
    pub(crate) fifo_threshold: usize,
    pub(crate) overruns: usize,
    pub(crate) payload_len: Option<u8>,
    pub(crate) sync: Option<bool>,
    pub(crate) preamble_size: Option<u16>,
    pub(crate) unlimited: bool,
    pub(crate) bandwidth: Option<OokBandwidth>,
    pub(crate) fail_mode_changes: bool,
}

impl SimRadio {
    fn new(clock: Clock) -> Self {
        Self {
            clock,
            mode: RadioMode::Sleep,
            fifo_level: 0,
            drained_at_us: 0,
            configs: Vec::new(),
            frequency: 0,
            rx: VecDeque::new(),
            rssi_raw: 0,
            written: Vec::new(),
            transmissions: 0,
            drain_bytes_per_ms: DRAIN_BYTES_PER_MS,
            fifo_threshold: FIFO_THRESHOLD,
            overruns: 0,
            payload_len: None,
            sync: None,
            preamble_size: None,
            unlimited: false,
            bandwidth: None,
            fail_mode_changes: false,
        }
    }

    fn drain(&mut self) {
        if self.mode != RadioMode::Transmit || self.drain_bytes_per_ms == 0 {
            return;
        }
        let now = self.clock.get();
        let bytes = (now - self.drained_at_us) * self.drain_bytes_per_ms / 1000;
        if bytes > 0 {
            self.fifo_level = self.fifo_level.saturating_sub(bytes as usize);
            self.drained_at_us = now;
        }
    }

    /// Bytes written past a full fifo are lost and counted.
    fn load(&mut self, count: usize) {
        self.drain();
        let level = self.fifo_level + count;
        self.overruns += level.saturating_sub(FIFO_SIZE);
        self.fifo_level = level.min(FIFO_SIZE);
    }
}

impl Transceiver for SimRadio {
    fn mode(&self) -> RadioMode {
        self.mode
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        if self.fail_mode_changes {
            return Err(RadioError::ModeTimeout);
        }
        if mode == self.mode {
            return Ok(());
        }
        if mode == RadioMode::Transmit {
            self.transmissions += 1;
            self.drained_at_us = self.clock.get();
        }
        self.mode = mode;
        Ok(())
    }

    fn frequency(&mut self) -> Result<u32, RadioError> {
        Ok(self.frequency)
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), RadioError> {
        self.frequency = hz;
        Ok(())
    }

    fn set_power_level(&mut self, _level: u8) -> Result<(), RadioError> {
        Ok(())
    }

    fn read_rssi(&mut self, _force: bool) -> Result<i16, RadioError> {
        Ok(-i16::from(self.rssi_raw) >> 1)
    }

    fn is_fifo_empty(&mut self) -> Result<bool, RadioError> {
        if self.mode == RadioMode::Receive {
            return Ok(self.rx.is_empty());
        }
        self.drain();
        Ok(self.fifo_level == 0)
    }

    fn is_fifo_full(&mut self) -> Result<bool, RadioError> {
        self.drain();
        Ok(self.fifo_level >= FIFO_SIZE)
    }

    fn is_fifo_over_threshold(&mut self) -> Result<bool, RadioError> {
        self.drain();
        Ok(self.fifo_level > self.fifo_threshold)
    }

    fn clear_fifo(&mut self) -> Result<(), RadioError> {
        self.fifo_level = 0;
        Ok(())
    }

    fn xmit_byte(&mut self, byte: u8) -> Result<(), RadioError> {
        self.written.push(byte);
        self.load(1);
        Ok(())
    }

    fn xmit_burst(&mut self, data: &[u8]) -> Result<(), RadioError> {
        self.written.extend_from_slice(data);
        self.load(data.len());
        Ok(())
    }

    fn recv_byte(&mut self) -> Result<u8, RadioError> {
        Ok(self.rx.pop_front().unwrap_or(0))
    }

    fn packet_seen(&mut self) -> Result<bool, RadioError> {
        Ok(self.mode == RadioMode::Receive && !self.rx.is_empty())
    }

    fn apply_config(&mut self, band: Band) -> Result<(), RadioError> {
        self.configs.push(band);
        self.mode = RadioMode::Standby;
        self.set_mode(RadioMode::Sleep)
    }

    fn set_payload_len(&mut self, len: u8) -> Result<(), RadioError> {
        self.payload_len = Some(len);
        self.unlimited = false;
        Ok(())
    }

    fn set_sync(&mut self, on: bool) -> Result<(), RadioError> {
        self.sync = Some(on);
        Ok(())
    }

    fn set_preamble_size(&mut self, size: u16) -> Result<(), RadioError> {
        self.preamble_size = Some(size);
        Ok(())
    }

    fn set_unlimited_len(&mut self) -> Result<(), RadioError> {
        self.unlimited = true;
        Ok(())
    }

    fn set_ook_bandwidth(&mut self, bandwidth: OokBandwidth) -> Result<(), RadioError> {
        self.bandwidth = Some(bandwidth);
        Ok(())
    }

    fn set_sequencer(&mut self, _on: bool) -> Result<(), RadioError> {
        Ok(())
    }

    fn set_dio_mapping(&mut self) -> Result<(), RadioError> {
        Ok(())
    }
}

type Hook<'a> = Box<dyn FnMut() + 'a>;

/// Host with a simulated clock, scripted link loss, an optional scripted interrupt and an
/// optional callback fired once at a given time.
pub(crate) struct SimHost<'a> {
    clock: Clock,
    poll_cost_us: u64,
    advertising_after_ms: Option<u32>,
    interrupt: Option<(u32, &'a CancelFlag)>,
    hook: RefCell<Option<(u32, Hook<'a>)>>,
    pub(crate) watchdog_feeds: usize,
}

impl fmt::Debug for SimHost<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimHost")
            .field("clock_us", &self.clock.get())
            .field("advertising_after_ms", &self.advertising_after_ms)
            .field("watchdog_feeds", &self.watchdog_feeds)
            .finish_non_exhaustive()
    }
}

impl<'a> SimHost<'a> {
    pub(crate) fn new() -> Self {
        Self {
            clock: Rc::new(Cell::new(0)),
            poll_cost_us: 100,
            advertising_after_ms: None,
            interrupt: None,
            hook: RefCell::new(None),
            watchdog_feeds: 0,
        }
    }

    /// Drops the BLE link once the clock reaches `ms`.
    pub(crate) fn advertising_after(mut self, ms: u32) -> Self {
        self.advertising_after_ms = Some(ms);
        self
    }

    /// Raises `flag` once the clock reaches `ms`, as if a command had arrived.
    pub(crate) fn interrupt_at(mut self, ms: u32, flag: &'a CancelFlag) -> Self {
        self.interrupt = Some((ms, flag));
        self
    }

    /// Runs `hook` once, the first time the clock is read at or after `ms`. Stands in for
    /// an interrupt handler that preempts the busy loops.
    pub(crate) fn call_at(self, ms: u32, hook: impl FnMut() + 'a) -> Self {
        *self.hook.borrow_mut() = Some((ms, Box::new(hook)));
        self
    }

    fn advance(&self, us: u64) {
        self.clock.set(self.clock.get() + us);
        if let Some((at, flag)) = self.interrupt {
            if self.millis() >= at {
                flag.raise();
            }
        }
        let due = self
            .hook
            .borrow()
            .as_ref()
            .is_some_and(|(at, _)| self.millis() >= *at);
        if due {
            let taken = self.hook.borrow_mut().take();
            if let Some((_, mut hook)) = taken {
                hook();
            }
        }
    }

    fn millis(&self) -> u32 {
        (self.clock.get() / 1000) as u32
    }
}

impl DelayNs for SimHost<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(u64::from(ns) / 1000);
    }
}

impl Host for SimHost<'_> {
    fn now_ms(&self) -> u32 {
        self.advance(self.poll_cost_us);
        self.millis()
    }

    fn is_advertising(&self) -> bool {
        self.advertising_after_ms.is_some_and(|at| self.millis() >= at)
    }

    fn feed_watchdog(&mut self) {
        self.watchdog_feeds += 1;
    }
}

/// Engine over two simulated radios sharing `host`'s clock.
pub(crate) fn rig(host: SimHost<'_>) -> Engine<SimRadio, SimRadio, SimHost<'_>> {
    let low = SimRadio::new(Rc::clone(&host.clock));
    let high = SimRadio::new(Rc::clone(&host.clock));
    Engine::new(low, high, host, Timing::default())
}

/// Response sink that keeps every response, plus a handle to read them back.
pub(crate) fn recorder() -> (Rc<RefCell<Vec<Vec<u8>>>>, impl FnMut(&[u8])) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink_log = Rc::clone(&log);
    (log, move |response: &[u8]| sink_log.borrow_mut().push(response.to_vec()))
}
