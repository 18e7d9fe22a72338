//! Protocol mode engine.
//!
//! The engine owns both transceivers and the [`Host`], and turns "send this payload" or
//! "listen for a packet" into the register traffic of the active [`PumpMode`]:
//!
//! | Mode            | Radio     | Framing |
//! |-----------------|-----------|---------|
//! | `Omnipod433`    | low band  | bit-banged: `0x66`/`0x65` preamble written by hand, sync `A5 5A`, trailer `FF` |
//! | `Medtronic916`  | high band | byte stream: FIFO preload, streamed tail, zero terminator |
//! | `Medtronic868`  | high band | byte stream, wider receiver filter |
//!
//! Every wait is a bounded busy-wait driven by the host's delay and millisecond clock; the
//! limits live in [`Timing`]. A transmit that runs out of FIFO budget stops early and is
//! logged, it is not an error. Receives return [`RxStatus::Timeout`] when the deadline
//! passes or the BLE link falls back to advertising, and [`RxStatus::Interrupted`] as soon
//! as the shared [`CancelFlag`] is raised.

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;

use crate::consts::{
    MAX_433_HZ, MAX_868_HZ, MAX_916_HZ, MAX_ENCODED_LEN, MAX_PACKET_LEN, MIN_433_HZ,
    MIN_868_HZ, MIN_916_HZ, DEFAULT_RSSI_DBM, TX_BUF_LEN, rssi_to_cc111x,
};
use crate::error::RadioError;
use crate::host::Host;
use crate::radio::registers::FIFO_SIZE;
use crate::radio::{Band, OokBandwidth, RadioMode, Transceiver};

/// Bytes accepted by the byte-stream receiver before it stops on its own.
const MEDTRONIC_RX_LEN: usize = MAX_PACKET_LEN;
/// Bytes accepted by the bit-banged receiver before it stops on its own.
const OMNIPOD_RX_LEN: usize = 80;

/// Preamble symbol that starts a pair.
const PREAMBLE_HIGH: u8 = 0x66;
/// Preamble symbol that closes a pair.
const PREAMBLE_LOW: u8 = 0x65;
/// Sync bytes sent after the bit-banged preamble.
const OMNIPOD_SYNC: [u8; 2] = [0xa5, 0x5a];
/// Trailer sent after a bit-banged payload.
const OMNIPOD_TRAILER: u8 = 0xff;
/// Terminator appended to a byte-stream transmission.
const MEDTRONIC_TERMINATOR: u8 = 0x00;

/// Which pump protocol, and therefore which radio and framing, is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PumpMode {
    /// 433 MHz, low-band radio, bit-banged preamble framing.
    Omnipod433,
    /// 916 MHz, high-band radio, byte-stream framing.
    #[default]
    Medtronic916,
    /// 868 MHz, high-band radio, byte-stream framing.
    Medtronic868,
}

impl PumpMode {
    /// Register table for this mode.
    pub const fn band(self) -> Band {
        match self {
            PumpMode::Omnipod433 => Band::F433,
            PumpMode::Medtronic916 => Band::F916,
            PumpMode::Medtronic868 => Band::F868,
        }
    }

    /// Picks the mode whose band window contains `hz`. Windows are inclusive and are
    /// checked 868, 916, then 433.
    pub fn from_frequency(hz: u32) -> Option<Self> {
        if (MIN_868_HZ..=MAX_868_HZ).contains(&hz) {
            Some(PumpMode::Medtronic868)
        } else if (MIN_916_HZ..=MAX_916_HZ).contains(&hz) {
            Some(PumpMode::Medtronic916)
        } else if (MIN_433_HZ..=MAX_433_HZ).contains(&hz) {
            Some(PumpMode::Omnipod433)
        } else {
            None
        }
    }

    const fn uses_low_band(self) -> bool {
        matches!(self, PumpMode::Omnipod433)
    }
}

/// Busy-wait budgets.
///
/// Every blocking loop in the engine is bounded by one of these. The defaults match the
/// deployed firmware; tests shrink them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Timing {
    /// 1 ms polls spent waiting for room in the FIFO before a byte-stream transmit gives up.
    pub fifo_wait_ms: u32,
    /// 1 ms polls spent waiting for the FIFO to empty after a byte-stream transmit.
    pub tx_done_ms: u32,
    /// Consecutive 1 ms polls the bit-banged transmitter tolerates with the FIFO above
    /// threshold before it gives up on the payload.
    pub fifo_stall_ms: u32,
    /// Interval between FIFO-empty polls at the end of a bit-banged transmit, in µs.
    pub drain_poll_us: u32,
    /// Number of FIFO-empty polls at the end of a bit-banged transmit.
    pub drain_polls: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            fifo_wait_ms: 100,
            tx_done_ms: 150,
            fifo_stall_ms: 100,
            drain_poll_us: 200,
            drain_polls: 5_000,
        }
    }
}

/// Interrupt-requested flag shared between the dispatcher and receive loops.
///
/// Raised when a new command is queued, cleared when the dispatcher picks a command up,
/// and polled on every receive iteration. Any context holding a reference may raise it.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    /// A lowered flag.
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Requests that an in-flight receive stops.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Lowers the flag.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// `true` if a stop has been requested.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How a receive ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RxStatus {
    /// Reception finished; the payload may still be empty.
    Ok,
    /// The deadline passed or the BLE link was lost.
    Timeout,
    /// A newer command asked for the receive to stop.
    Interrupted,
}

/// Result of a receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxOutcome {
    /// How the receive ended.
    pub status: RxStatus,
    /// Raw (still line-coded) bytes received.
    pub payload: Vec<u8, MAX_PACKET_LEN>,
    /// RSSI of the last non-empty packet, in dBm.
    pub rssi: i16,
    /// Packets received so far.
    pub rx_count: u16,
    /// Transmissions so far.
    pub tx_count: u16,
}

impl RxOutcome {
    /// [`rssi`](Self::rssi) on the CC111x register scale.
    pub fn cc111x_rssi(&self) -> u8 {
        rssi_to_cc111x(self.rssi)
    }
}

/// One transmit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transmission<'p> {
    /// Line-coded bytes to send.
    pub payload: &'p [u8],
    /// Extra sends after the first.
    pub repeat: u8,
    /// Pause between sends, in ms.
    pub interval_ms: u16,
    /// How long the bit-banged preamble runs past one FIFO's worth, in ms.
    pub preamble_ext_ms: u16,
}

/// The protocol engine. `LO` drives the 433 MHz radio, `HI` the 916/868 MHz radio.
#[derive(Debug)]
pub struct Engine<LO, HI, H> {
    low: LO,
    high: HI,
    host: H,
    timing: Timing,
    mode: PumpMode,
    packet_len: Option<u8>,
    preamble: u16,
    rssi: i16,
    rx_count: u16,
    tx_count: u16,
}

impl<LO, HI, H> Engine<LO, HI, H>
where
    LO: Transceiver,
    HI: Transceiver,
    H: Host,
{
    /// Builds an engine in [`PumpMode::Medtronic916`] with no packet length, preamble 0 and
    /// zeroed counters. Radios are left untouched until [`init`](Self::init).
    pub fn new(low: LO, high: HI, host: H, timing: Timing) -> Self {
        Self {
            low,
            high,
            host,
            timing,
            mode: PumpMode::default(),
            packet_len: None,
            preamble: 0,
            rssi: DEFAULT_RSSI_DBM,
            rx_count: 0,
            tx_count: 0,
        }
    }

    /// Loads the 916 MHz table into the high-band radio and the 433 MHz table into the
    /// low-band radio. Both end up asleep.
    pub fn init(&mut self) -> Result<(), RadioError> {
        self.high.apply_config(Band::F916)?;
        self.low.apply_config(Band::F433)?;
        info!("engine: radios configured");
        Ok(())
    }

    /// Active pump mode.
    pub fn mode(&self) -> PumpMode {
        self.mode
    }

    /// Switches the active pump mode. Does not touch the radios.
    pub fn set_mode(&mut self, mode: PumpMode) {
        if mode != self.mode {
            info!("engine: mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
    }

    /// Reloads the active mode's register table into its radio.
    pub fn configure(&mut self) -> Result<(), RadioError> {
        let band = self.mode.band();
        self.radio().apply_config(band)
    }

    /// Retunes the active mode's radio.
    pub fn set_frequency(&mut self, hz: u32) -> Result<(), RadioError> {
        debug!("engine: tune {:?} to {} Hz", self.mode, hz);
        self.radio().set_frequency(hz)
    }

    /// Fixed packet length used to end bit-banged receptions early, if set.
    pub fn packet_len(&self) -> Option<u8> {
        self.packet_len
    }

    /// Sets the fixed packet length and enables it.
    pub fn set_packet_len(&mut self, len: u8) {
        self.packet_len = Some(len);
    }

    /// Stored preamble word.
    pub fn preamble(&self) -> u16 {
        self.preamble
    }

    /// Stores a preamble word.
    pub fn set_preamble(&mut self, preamble: u16) {
        self.preamble = preamble;
    }

    /// RSSI of the last non-empty packet, in dBm.
    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    /// Packets received, wrapping.
    pub fn rx_count(&self) -> u16 {
        self.rx_count
    }

    /// Transmissions, wrapping. Every repeat and every retry counts.
    pub fn tx_count(&self) -> u16 {
        self.tx_count
    }

    /// Busy-wait budgets in use.
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Low-band (433 MHz) radio.
    pub fn low(&self) -> &LO {
        &self.low
    }

    /// High-band (916/868 MHz) radio.
    pub fn high(&self) -> &HI {
        &self.high
    }

    /// Low-band radio, for settings the engine does not manage (output power, for one).
    pub fn low_mut(&mut self) -> &mut LO {
        &mut self.low
    }

    /// High-band radio, for settings the engine does not manage.
    pub fn high_mut(&mut self) -> &mut HI {
        &mut self.high
    }

    /// Host services.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Gives back the radios and host.
    pub fn release(self) -> (LO, HI, H) {
        (self.low, self.high, self.host)
    }

    fn radio(&mut self) -> &mut dyn Transceiver {
        if self.mode.uses_low_band() {
            &mut self.low
        } else {
            &mut self.high
        }
    }

    fn parts(&mut self) -> (&mut dyn Transceiver, &mut H, &Timing) {
        let radio: &mut dyn Transceiver = if self.mode.uses_low_band() {
            &mut self.low
        } else {
            &mut self.high
        };
        (radio, &mut self.host, &self.timing)
    }

    /// Sends `tx.payload` `tx.repeat + 1` times, then puts the radio to sleep.
    ///
    /// Repeats stop early if the BLE link drops to advertising. The host watchdog is fed
    /// after every inter-repeat pause.
    pub fn send(&mut self, tx: &Transmission<'_>) -> Result<(), RadioError> {
        trace!("engine: tx {:?}", tx.payload);
        let result = self.transmit(tx);
        let stopped = self.stop();
        result.and(stopped)
    }

    fn transmit(&mut self, tx: &Transmission<'_>) -> Result<(), RadioError> {
        self.prepare_tx(tx.payload.len())?;
        let total = u16::from(tx.repeat) + 1;
        for attempt in 0..total {
            if self.host.is_advertising() {
                debug!("engine: link lost, {} of {} sent", attempt, total);
                break;
            }
            if attempt > 0 && tx.interval_ms > 0 {
                self.host.delay_ms(u32::from(tx.interval_ms));
                self.host.feed_watchdog();
            }
            self.tx_count = self.tx_count.wrapping_add(1);
            let mode = self.mode;
            let (radio, host, timing) = self.parts();
            if mode.uses_low_band() {
                omnipod_tx(radio, host, timing, tx.payload, tx.preamble_ext_ms)?;
            } else {
                medtronic_tx(radio, host, timing, tx.payload)?;
            }
        }
        Ok(())
    }

    fn prepare_tx(&mut self, len: usize) -> Result<(), RadioError> {
        // payload plus terminator, as far as the length register reaches
        let fixed_len = u8::try_from(len + 1).unwrap_or(u8::MAX);
        match self.mode {
            PumpMode::Omnipod433 => {
                self.low.set_mode(RadioMode::Standby)?;
                self.low.set_sync(false)?;
                self.low.set_unlimited_len()?;
                self.low.set_preamble_size(0)
            }
            PumpMode::Medtronic916 => {
                self.high.set_mode(RadioMode::Standby)?;
                self.high.set_ook_bandwidth(OokBandwidth::Khz200)?;
                self.high.set_payload_len(fixed_len)
            }
            PumpMode::Medtronic868 => {
                self.high.set_mode(RadioMode::Standby)?;
                self.high.set_ook_bandwidth(OokBandwidth::Khz250)?;
                self.high.set_payload_len(fixed_len)
            }
        }
    }

    /// Listens for one packet, then puts the radio to sleep.
    ///
    /// A `timeout_ms` of zero waits until the packet ends, the link drops, or `cancel` is
    /// raised.
    pub fn receive(
        &mut self,
        timeout_ms: u32,
        cancel: &CancelFlag,
    ) -> Result<RxOutcome, RadioError> {
        let mut payload = Vec::new();
        let status = self.listen(timeout_ms, cancel, &mut payload);
        let stopped = self.stop();
        let status = status?;
        stopped?;
        if status == RxStatus::Ok {
            trace!("engine: rx {:?}", payload.as_slice());
        } else {
            debug!("engine: rx ended with {:?}", status);
        }
        Ok(RxOutcome {
            status,
            payload,
            rssi: self.rssi,
            rx_count: self.rx_count,
            tx_count: self.tx_count,
        })
    }

    fn listen(
        &mut self,
        timeout_ms: u32,
        cancel: &CancelFlag,
        payload: &mut Vec<u8, MAX_PACKET_LEN>,
    ) -> Result<RxStatus, RadioError> {
        let mode = self.mode;
        let packet_len = self.packet_len;
        let (radio, host, _) = self.parts();
        let status = if mode.uses_low_band() {
            omnipod_rx(radio, host, timeout_ms, packet_len, cancel, payload)?
        } else {
            medtronic_rx(radio, host, timeout_ms, cancel, payload)?
        };
        if status == RxStatus::Ok && !payload.is_empty() {
            let rssi = radio.read_rssi(false)?;
            self.rx_count = self.rx_count.wrapping_add(1);
            self.rssi = rssi;
        }
        Ok(status)
    }

    /// Sends once, then listens. Each timeout spends one retry on a single resend (no
    /// repeats) and another listen, until a packet arrives, the listen is interrupted, or
    /// the retries run out.
    pub fn send_and_listen(
        &mut self,
        tx: &Transmission<'_>,
        timeout_ms: u32,
        retries: u8,
        cancel: &CancelFlag,
    ) -> Result<RxOutcome, RadioError> {
        self.send(tx)?;
        let mut outcome = self.receive(timeout_ms, cancel)?;
        let retry = Transmission { repeat: 0, ..*tx };
        let mut remaining = retries;
        while outcome.status == RxStatus::Timeout && remaining > 0 {
            debug!("engine: retry, {} left", remaining);
            self.send(&retry)?;
            outcome = self.receive(timeout_ms, cancel)?;
            remaining -= 1;
        }
        Ok(outcome)
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.radio().set_mode(RadioMode::Sleep)
    }
}

/// `true` once the deadline has passed or the link is gone.
fn expired<H: Host>(host: &H, start: u32, timeout_ms: u32) -> bool {
    let elapsed = host.elapsed_since(start);
    (timeout_ms > 0 && elapsed > timeout_ms) || host.is_advertising()
}

fn wait_fifo_not_full<R, H>(
    radio: &mut R,
    host: &mut H,
    timing: &Timing,
) -> Result<bool, RadioError>
where
    R: Transceiver + ?Sized,
    H: Host,
{
    for _ in 0..timing.fifo_wait_ms {
        if !radio.is_fifo_full()? {
            return Ok(true);
        }
        host.delay_ms(1);
    }
    Ok(false)
}

fn wait_tx_done<R, H>(radio: &mut R, host: &mut H, timing: &Timing) -> Result<(), RadioError>
where
    R: Transceiver + ?Sized,
    H: Host,
{
    for _ in 0..timing.tx_done_ms {
        if radio.is_fifo_empty()? {
            return Ok(());
        }
        host.delay_ms(1);
    }
    warn!("engine: fifo did not drain after transmit");
    Ok(())
}

fn medtronic_tx<R, H>(
    radio: &mut R,
    host: &mut H,
    timing: &Timing,
    payload: &[u8],
) -> Result<(), RadioError>
where
    R: Transceiver + ?Sized,
    H: Host,
{
    radio.set_mode(RadioMode::Standby)?;
    radio.clear_fifo()?;

    let preload = payload.len().min(FIFO_SIZE);
    radio.xmit_burst(&payload[..preload])?;
    radio.set_mode(RadioMode::Transmit)?;

    for (i, &byte) in payload.iter().enumerate().skip(preload) {
        if !wait_fifo_not_full(radio, host, timing)? {
            warn!("engine: fifo stuck full, truncated at {} of {}", i, payload.len());
            return Ok(());
        }
        radio.xmit_byte(byte)?;
    }

    if wait_fifo_not_full(radio, host, timing)? {
        radio.xmit_byte(MEDTRONIC_TERMINATOR)?;
    }

    // the sequencer leaves transmit by itself once the packet is out
    wait_tx_done(radio, host, timing)
}

/// Alternating preamble symbols written straight into the FIFO.
#[derive(Debug, Default)]
struct Preamble {
    /// Last symbol written was [`PREAMBLE_HIGH`].
    open: bool,
}

impl Preamble {
    fn next(&mut self) -> u8 {
        self.open = !self.open;
        if self.open { PREAMBLE_HIGH } else { PREAMBLE_LOW }
    }

    fn fill<R: Transceiver + ?Sized>(&mut self, radio: &mut R) -> Result<(), RadioError> {
        for _ in 0..FIFO_SIZE {
            if radio.is_fifo_full()? {
                break;
            }
            radio.xmit_byte(self.next())?;
        }
        Ok(())
    }
}

fn omnipod_tx<R, H>(
    radio: &mut R,
    host: &mut H,
    timing: &Timing,
    payload: &[u8],
    preamble_ext_ms: u16,
) -> Result<(), RadioError>
where
    R: Transceiver + ?Sized,
    H: Host,
{
    let body = &payload[..payload.len().min(MAX_ENCODED_LEN)];
    let mut frame: Vec<u8, TX_BUF_LEN> = Vec::new();
    // sync + body + trailer always fits in TX_BUF_LEN
    let _ = frame.extend_from_slice(&OMNIPOD_SYNC);
    let _ = frame.extend_from_slice(body);
    let _ = frame.push(OMNIPOD_TRAILER);

    radio.clear_fifo()?;
    let mut preamble = Preamble::default();
    preamble.fill(radio)?;
    radio.set_mode(RadioMode::Transmit)?;

    let start = host.now_ms();
    while host.elapsed_since(start) < u32::from(preamble_ext_ms) {
        if !radio.is_fifo_over_threshold()? {
            preamble.fill(radio)?;
        }
        host.delay_ms(1);
    }

    let mut sent = 0;
    let mut stalled = 0;
    while sent < frame.len() {
        if radio.is_fifo_over_threshold()? {
            stalled += 1;
            if stalled > timing.fifo_stall_ms {
                warn!("engine: fifo stuck, truncated at {} of {}", sent, frame.len());
                break;
            }
        } else {
            stalled = 0;
            while sent < frame.len() && !radio.is_fifo_full()? {
                if sent == 0 && preamble.open {
                    // close the last preamble pair before the sync word
                    radio.xmit_byte(preamble.next())?;
                    continue;
                }
                radio.xmit_byte(frame[sent])?;
                sent += 1;
            }
        }
        host.delay_ms(1);
    }

    for _ in 0..timing.drain_polls {
        if radio.is_fifo_empty()? {
            return Ok(());
        }
        host.delay_us(timing.drain_poll_us);
    }
    warn!("engine: fifo did not drain after transmit");
    Ok(())
}

fn medtronic_rx<R, H>(
    radio: &mut R,
    host: &mut H,
    timeout_ms: u32,
    cancel: &CancelFlag,
    payload: &mut Vec<u8, MAX_PACKET_LEN>,
) -> Result<RxStatus, RadioError>
where
    R: Transceiver + ?Sized,
    H: Host,
{
    radio.set_mode(RadioMode::Standby)?;
    radio.set_payload_len(MEDTRONIC_RX_LEN as u8)?;
    radio.set_mode(RadioMode::Receive)?;

    let start = host.now_ms();
    loop {
        if !radio.is_fifo_empty()? {
            let byte = radio.recv_byte()?;
            if byte == 0 {
                debug!("engine: zero byte, end of packet");
                break;
            }
            let _ = payload.push(byte);
        }
        if payload.len() >= MEDTRONIC_RX_LEN {
            debug!("engine: max length reached");
            break;
        }
        if expired(&*host, start, timeout_ms) {
            return Ok(RxStatus::Timeout);
        }
        if cancel.is_raised() {
            return Ok(RxStatus::Interrupted);
        }
    }

    // the demodulator sometimes emits one or two lone high bits after the last symbol
    if let Some(&last) = payload.last() {
        if last == 0x80 || last == 0xc0 {
            debug!("engine: end-of-packet glitch {:#x}", last >> 6);
            let _ = payload.pop();
        }
    }
    Ok(RxStatus::Ok)
}

fn omnipod_rx<R, H>(
    radio: &mut R,
    host: &mut H,
    timeout_ms: u32,
    packet_len: Option<u8>,
    cancel: &CancelFlag,
    payload: &mut Vec<u8, MAX_PACKET_LEN>,
) -> Result<RxStatus, RadioError>
where
    R: Transceiver + ?Sized,
    H: Host,
{
    radio.set_mode(RadioMode::Standby)?;
    radio.set_sync(true)?;
    radio.set_payload_len(OMNIPOD_RX_LEN as u8)?;
    radio.set_mode(RadioMode::Receive)?;

    let start = host.now_ms();
    loop {
        if !radio.is_fifo_empty()? {
            let byte = radio.recv_byte()?;
            let top = byte >> 6;
            if top == 0b11 || top == 0b00 {
                debug!("engine: desync byte {:#x}, end of packet", byte);
                break;
            }
            let _ = payload.push(byte);
        }
        if payload.len() >= OMNIPOD_RX_LEN {
            debug!("engine: max length reached");
            break;
        }
        if packet_len.is_some_and(|len| usize::from(len) == payload.len()) {
            debug!("engine: packet length reached");
            break;
        }
        if expired(&*host, start, timeout_ms) {
            return Ok(RxStatus::Timeout);
        }
        if cancel.is_raised() {
            return Ok(RxStatus::Interrupted);
        }
    }
    Ok(RxStatus::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimHost, rig};
    use std::vec;

    fn tx(payload: &[u8]) -> Transmission<'_> {
        Transmission {
            payload,
            repeat: 0,
            interval_ms: 0,
            preamble_ext_ms: 0,
        }
    }

    #[test]
    fn test_mode_from_frequency() {
        assert_eq!(PumpMode::from_frequency(868_350_000), Some(PumpMode::Medtronic868));
        assert_eq!(PumpMode::from_frequency(916_500_000), Some(PumpMode::Medtronic916));
        assert_eq!(PumpMode::from_frequency(433_910_000), Some(PumpMode::Omnipod433));
        assert_eq!(PumpMode::from_frequency(866_000_000), Some(PumpMode::Medtronic868));
        assert_eq!(PumpMode::from_frequency(918_000_001), None);
        assert_eq!(PumpMode::from_frequency(315_000_000), None);
    }

    #[test]
    fn test_init_loads_both_tables() {
        let mut engine = rig(SimHost::new());
        engine.init().unwrap();
        assert_eq!(engine.high().configs, vec![Band::F916]);
        assert_eq!(engine.low().configs, vec![Band::F433]);
        assert_eq!(engine.high().mode(), RadioMode::Sleep);
        assert_eq!(engine.mode(), PumpMode::Medtronic916);
        assert_eq!(engine.rssi(), DEFAULT_RSSI_DBM);
    }

    #[test]
    fn test_configure_and_tune_follow_mode() {
        let mut engine = rig(SimHost::new());
        engine.set_mode(PumpMode::Omnipod433);
        engine.configure().unwrap();
        engine.set_frequency(433_910_000).unwrap();
        assert_eq!(engine.low().configs, vec![Band::F433]);
        assert_eq!(engine.low().frequency, 433_910_000);
        assert!(engine.high().configs.is_empty());
    }

    #[test]
    fn test_medtronic_send_streams_past_fifo_and_terminates() {
        let mut engine = rig(SimHost::new());
        let payload: vec::Vec<u8> = (1..=100).collect();
        engine.send(&tx(&payload)).unwrap();

        let high = engine.high();
        assert_eq!(&high.written[..100], payload.as_slice());
        assert_eq!(high.written[100..], [MEDTRONIC_TERMINATOR]);
        assert_eq!(high.transmissions, 1);
        assert_eq!(high.payload_len, Some(101));
        assert_eq!(high.bandwidth, Some(OokBandwidth::Khz200));
        assert_eq!(high.mode(), RadioMode::Sleep);
        assert_eq!(engine.tx_count(), 1);
    }

    #[test]
    fn test_medtronic_send_truncates_when_fifo_never_drains() {
        let mut engine = rig(SimHost::new());
        engine.high_mut().drain_bytes_per_ms = 0;
        let payload = [0x11; 80];
        engine.send(&tx(&payload)).unwrap();
        // only the preload made it
        assert_eq!(engine.high().written.len(), FIFO_SIZE);
        assert_eq!(engine.high().mode(), RadioMode::Sleep);
    }

    #[test]
    fn test_868_send_uses_wide_filter() {
        let mut engine = rig(SimHost::new());
        engine.set_mode(PumpMode::Medtronic868);
        engine.send(&tx(&[0xa7, 0x12])).unwrap();
        assert_eq!(engine.high().bandwidth, Some(OokBandwidth::Khz250));
        assert_eq!(engine.high().payload_len, Some(3));
    }

    #[test]
    fn test_omnipod_send_frames_payload_after_preamble() {
        let mut engine = rig(SimHost::new());
        engine.set_mode(PumpMode::Omnipod433);
        let send = Transmission {
            preamble_ext_ms: 20,
            ..tx(&[0x12, 0x34, 0x56])
        };
        engine.send(&send).unwrap();

        let low = engine.low();
        assert_eq!(low.sync, Some(false));
        assert!(low.unlimited);
        assert_eq!(low.preamble_size, Some(0));
        assert_eq!(low.transmissions, 1);

        let written = &low.written;
        let sync = written.len() - 6;
        assert_eq!(written[sync..], [0xa5, 0x5a, 0x12, 0x34, 0x56, 0xff]);
        // the preamble is whole 66/65 pairs
        assert_eq!(sync % 2, 0);
        assert!(sync > FIFO_SIZE);
        for pair in written[..sync].chunks(2) {
            assert_eq!(pair, [PREAMBLE_HIGH, PREAMBLE_LOW]);
        }
        assert!(engine.host().elapsed_since(0) >= 20);
    }

    #[test]
    fn test_omnipod_send_never_overfills_fifo() {
        for ext in 0..8 {
            let mut engine = rig(SimHost::new());
            engine.set_mode(PumpMode::Omnipod433);
            // slow modulator and no threshold: every write lands on an almost full fifo
            engine.low_mut().fifo_threshold = FIFO_SIZE;
            engine.low_mut().drain_bytes_per_ms = 1;
            let send = Transmission {
                preamble_ext_ms: ext,
                ..tx(&[0x11, 0x22])
            };
            engine.send(&send).unwrap();

            let low = engine.low();
            assert_eq!(low.overruns, 0, "preamble extension {} ms", ext);
            let tail = &low.written[low.written.len() - 6..];
            assert_eq!(tail, [PREAMBLE_LOW, 0xa5, 0x5a, 0x11, 0x22, 0xff]);
        }
    }

    #[test]
    fn test_repeats_pause_and_feed_watchdog() {
        let mut engine = rig(SimHost::new());
        let send = Transmission {
            repeat: 2,
            interval_ms: 50,
            ..tx(&[0x01, 0x02])
        };
        engine.send(&send).unwrap();
        assert_eq!(engine.tx_count(), 3);
        assert_eq!(engine.high().transmissions, 3);
        assert_eq!(engine.host().watchdog_feeds, 2);
        assert!(engine.host().elapsed_since(0) >= 100);
    }

    #[test]
    fn test_repeats_stop_when_link_lost() {
        let mut engine = rig(SimHost::new().advertising_after(30));
        let send = Transmission {
            repeat: 10,
            interval_ms: 20,
            ..tx(&[0x01])
        };
        engine.send(&send).unwrap();
        assert!(engine.tx_count() < 11);
        assert!(engine.tx_count() >= 1);
        assert_eq!(engine.high().mode(), RadioMode::Sleep);
    }

    #[test]
    fn test_medtronic_receive_stops_on_zero_and_trims_glitch() {
        let mut engine = rig(SimHost::new());
        engine.high_mut().rx.extend([0xa9, 0x6c, 0x72, 0xc0, 0x00, 0x55]);
        engine.high_mut().rssi_raw = 120;
        let cancel = CancelFlag::new();
        let outcome = engine.receive(100, &cancel).unwrap();

        assert_eq!(outcome.status, RxStatus::Ok);
        assert_eq!(outcome.payload.as_slice(), &[0xa9, 0x6c, 0x72]);
        assert_eq!(outcome.rssi, -60);
        assert_eq!(outcome.cc111x_rssi(), 26);
        assert_eq!(outcome.rx_count, 1);
        assert_eq!(engine.high().payload_len, Some(MEDTRONIC_RX_LEN as u8));
        assert_eq!(engine.high().mode(), RadioMode::Sleep);
    }

    #[test]
    fn test_medtronic_receive_caps_length() {
        let mut engine = rig(SimHost::new());
        engine.high_mut().rx.extend([0x55; 120]);
        let outcome = engine.receive(0, &CancelFlag::new()).unwrap();
        assert_eq!(outcome.status, RxStatus::Ok);
        assert_eq!(outcome.payload.len(), MEDTRONIC_RX_LEN);
    }

    #[test]
    fn test_receive_times_out_without_touching_counters() {
        let mut engine = rig(SimHost::new());
        let outcome = engine.receive(50, &CancelFlag::new()).unwrap();
        assert_eq!(outcome.status, RxStatus::Timeout);
        assert!(outcome.payload.is_empty());
        assert_eq!(outcome.rx_count, 0);
        assert_eq!(outcome.rssi, DEFAULT_RSSI_DBM);
        assert!(engine.host().elapsed_since(0) > 50);
        assert_eq!(engine.high().mode(), RadioMode::Sleep);
    }

    #[test]
    fn test_receive_times_out_when_link_lost() {
        let mut engine = rig(SimHost::new().advertising_after(5));
        let outcome = engine.receive(0, &CancelFlag::new()).unwrap();
        assert_eq!(outcome.status, RxStatus::Timeout);
    }

    #[test]
    fn test_receive_interrupted_by_cancel() {
        let cancel = CancelFlag::new();
        let mut engine = rig(SimHost::new().interrupt_at(10, &cancel));
        let outcome = engine.receive(0, &cancel).unwrap();
        assert_eq!(outcome.status, RxStatus::Interrupted);
    }

    #[test]
    fn test_empty_packet_is_ok_and_keeps_rssi() {
        let mut engine = rig(SimHost::new());
        engine.high_mut().rx.extend([0x00]);
        let outcome = engine.receive(100, &CancelFlag::new()).unwrap();
        assert_eq!(outcome.status, RxStatus::Ok);
        assert!(outcome.payload.is_empty());
        assert_eq!(outcome.rx_count, 0);
        assert_eq!(outcome.rssi, DEFAULT_RSSI_DBM);
    }

    #[test]
    fn test_omnipod_receive_stops_on_desync_byte() {
        let mut engine = rig(SimHost::new());
        engine.set_mode(PumpMode::Omnipod433);
        engine.low_mut().rx.extend([0x54, 0x65, 0xa6, 0xff]);
        let outcome = engine.receive(100, &CancelFlag::new()).unwrap();
        assert_eq!(outcome.status, RxStatus::Ok);
        assert_eq!(outcome.payload.as_slice(), &[0x54, 0x65, 0xa6]);
        assert_eq!(engine.low().sync, Some(true));
        assert_eq!(engine.low().payload_len, Some(OMNIPOD_RX_LEN as u8));

        // top bits 00 end the packet too
        engine.low_mut().rx.extend([0x65, 0x3f]);
        let outcome = engine.receive(100, &CancelFlag::new()).unwrap();
        assert_eq!(outcome.payload.as_slice(), &[0x65]);
        assert_eq!(outcome.rx_count, 2);
    }

    #[test]
    fn test_omnipod_receive_honours_packet_len() {
        let mut engine = rig(SimHost::new());
        engine.set_mode(PumpMode::Omnipod433);
        engine.set_packet_len(2);
        assert_eq!(engine.packet_len(), Some(2));
        engine.low_mut().rx.extend([0x65, 0x66, 0x95, 0x96]);
        let outcome = engine.receive(100, &CancelFlag::new()).unwrap();
        assert_eq!(outcome.payload.as_slice(), &[0x65, 0x66]);
    }

    #[test]
    fn test_send_and_listen_retries_on_timeout() {
        let mut engine = rig(SimHost::new());
        let send = Transmission {
            repeat: 3,
            ..tx(&[0x01, 0x02])
        };
        let outcome = engine
            .send_and_listen(&send, 20, 2, &CancelFlag::new())
            .unwrap();
        assert_eq!(outcome.status, RxStatus::Timeout);
        // four sends first, then one per retry
        assert_eq!(engine.tx_count(), 6);
        assert_eq!(outcome.tx_count, 6);
    }

    #[test]
    fn test_send_and_listen_stops_retrying_on_packet() {
        let mut engine = rig(SimHost::new());
        engine.high_mut().rx.extend([0x42, 0x00]);
        let outcome = engine
            .send_and_listen(&tx(&[0x01]), 20, 5, &CancelFlag::new())
            .unwrap();
        assert_eq!(outcome.status, RxStatus::Ok);
        assert_eq!(outcome.payload.as_slice(), &[0x42]);
        assert_eq!(engine.tx_count(), 1);
    }

    #[test]
    fn test_radio_fault_propagates_and_radio_is_stopped() {
        let mut engine = rig(SimHost::new());
        engine.high_mut().fail_mode_changes = true;
        assert_eq!(
            engine.receive(10, &CancelFlag::new()),
            Err(RadioError::ModeTimeout)
        );
    }

    #[test]
    fn test_preamble_word_is_stored() {
        let mut engine = rig(SimHost::new());
        engine.set_preamble(0x5555);
        assert_eq!(engine.preamble(), 0x5555);
        assert_eq!(engine.timing(), &Timing::default());
        let (low, high, _) = engine.release();
        assert!(low.written.is_empty() && high.written.is_empty());
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::default();
        assert!(!flag.is_raised());
        flag.raise();
        assert!(flag.is_raised());
        flag.clear();
        assert!(!flag.is_raised());
    }
}
