//! Command dispatcher.
//!
//! The BLE transport hands every write to an [`Inbox`] and gets responses back through a
//! [`ResponseSink`]. A periodic timer calls [`Dispatcher::tick`], which applies pending
//! register writes and then runs at most one queued command to completion, radio
//! busy-waits included.
//!
//! The inbox and the dispatcher are the two halves of one
//! [`CommandQueue`](crate::queue::CommandQueue), so the inbox can keep accepting writes from
//! an interrupt while a command is executing:
//!
//! ```rust,ignore
//! static CANCEL: CancelFlag = CancelFlag::new();
//! let queue: &'static mut CommandQueue = singleton!(: CommandQueue = CommandQueue::new())?;
//! let (producer, consumer) = queue.split();
//! let mut inbox = Inbox::new(producer, &CANCEL);
//! let mut dispatcher = Dispatcher::new(engine, consumer, &CANCEL, notify);
//! ```
//!
//! ## Admission
//!
//! | Frame | Result |
//! |-------|--------|
//! | length prefix wrong | dropped, no response |
//! | `UpdateRegister` | applied and answered at the start of the next tick |
//! | anything else, queue has room | queued, [`CancelFlag`] raised |
//! | anything else, queue full | dropped, no response |
//!
//! Raising the flag on admission is what stops a listen that is still running for the
//! previous command. Register writes skip the command slot, so they take effect before any
//! command queued after them, and they never interrupt a listen.
//!
//! ## Responses
//!
//! Single-byte responses are a bare status byte. Responses with a body start with
//! [`RESPONSE_SUCCESS`]. Parameter problems answer [`RESPONSE_PARAM_ERROR`], radio faults
//! answer [`RESPONSE_RX_TIMEOUT`], unknown opcodes answer [`RESPONSE_UNKNOWN_COMMAND`]
//! followed by the opcode. Nothing stops the bridge.

use heapless::Vec;

pub use crate::engine::CancelFlag;

use crate::command::{
    Frame, GetPacket, Opcode, QueuedCommand, RegisterWrite, SendAndListen, SendPacket,
    single_byte, word,
};
use crate::consts::{
    FIRMWARE_VERSION, MAX_ENCODED_LEN, MAX_PACKET_LEN, MAX_RESPONSE_LEN, MDMCFG4_WWL_MAGIC,
    DEFAULT_FREQ_REGISTERS, READ_REGISTER_PLACEHOLDER, REG_ADDR_FREQ0, REG_ADDR_FREQ2,
    REG_ADDR_MDMCFG4, REG_ADDR_PKT_LEN, RESPONSE_INTERRUPTED, RESPONSE_PARAM_ERROR,
    RESPONSE_RX_TIMEOUT, RESPONSE_SUCCESS, RESPONSE_UNKNOWN_COMMAND, STATE_OK, TICK_PERIOD_MS,
    client_register_to_hz,
};
use crate::encoding::Encoding;
use crate::engine::{Engine, PumpMode, RxOutcome, RxStatus, Transmission};
use crate::error::{CommandError, Error};
use crate::host::Host;
use crate::queue::{CommandConsumer, CommandProducer};
use crate::radio::Transceiver;

/// Size of the `GetStatistics` body.
const STATISTICS_LEN: usize = 20;

/// Outbound half of the transport.
pub trait ResponseSink {
    /// Delivers one response to the client.
    fn send_response(&mut self, response: &[u8]);
}

impl<F> ResponseSink for F
where
    F: FnMut(&[u8]),
{
    fn send_response(&mut self, response: &[u8]) {
        self(response)
    }
}

/// What [`Inbox::enqueue`] did with an accepted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Admission {
    /// Waiting in the command slot; any running listen was told to stop.
    Queued,
    /// A register write, applied at the start of the next tick.
    Register,
}

/// Write side of the dispatcher, owned by whatever context delivers BLE writes.
///
/// Only touches the queue's producer half and the cancel flag, so it can run while
/// [`Dispatcher::tick`] is busy with a command.
#[derive(Debug)]
pub struct Inbox<'a> {
    producer: CommandProducer<'a>,
    cancel: &'a CancelFlag,
}

impl<'a> Inbox<'a> {
    /// Pairs the producer half of a [`CommandQueue`](crate::queue::CommandQueue) with the
    /// flag the dispatcher listens on.
    pub fn new(producer: CommandProducer<'a>, cancel: &'a CancelFlag) -> Self {
        Self { producer, cancel }
    }

    /// Accepts one BLE write.
    ///
    /// Errors mean the frame was dropped without a response.
    pub fn enqueue(&mut self, raw: &[u8], rssi: i8) -> Result<Admission, CommandError> {
        let frame =
            Frame::parse(raw).inspect_err(|_| debug!("inbox: malformed frame {:?}", raw))?;

        if frame.opcode == Opcode::UpdateRegister as u8 {
            self.producer
                .push_register(RegisterWrite::parse(frame.payload))
                .inspect_err(|_| warn!("inbox: register ring full, write dropped"))?;
            return Ok(Admission::Register);
        }

        let command =
            QueuedCommand::new(&frame, rssi).inspect_err(|err| warn!("inbox: {:?}", err))?;
        self.producer
            .push(command)
            .inspect_err(|_| warn!("inbox: queue full, dropped {:#x}", frame.opcode))?;
        self.cancel.raise();
        Ok(Admission::Queued)
    }

    /// `true` while a command is waiting for its tick.
    pub fn is_full(&self) -> bool {
        self.producer.is_full()
    }
}

/// Owns the engine and all client-visible state.
#[derive(Debug)]
pub struct Dispatcher<'a, LO, HI, H, S> {
    engine: Engine<LO, HI, H>,
    queue: CommandConsumer<'a>,
    cancel: &'a CancelFlag,
    sink: S,
    encoding: Encoding,
    freq_regs: [u8; 3],
    running: bool,
    ticks: u32,
}

impl<'a, LO, HI, H, S> Dispatcher<'a, LO, HI, H, S>
where
    LO: Transceiver,
    HI: Transceiver,
    H: Host,
    S: ResponseSink,
{
    /// Wraps an initialised engine. The dispatcher starts stopped.
    ///
    /// `cancel` must be the flag the matching [`Inbox`] raises.
    pub fn new(
        engine: Engine<LO, HI, H>,
        queue: CommandConsumer<'a>,
        cancel: &'a CancelFlag,
        sink: S,
    ) -> Self {
        Self {
            engine,
            queue,
            cancel,
            sink,
            encoding: Encoding::None,
            freq_regs: DEFAULT_FREQ_REGISTERS,
            running: false,
            ticks: 0,
        }
    }

    /// Lets [`tick`](Self::tick) run commands. Call when a client connects.
    pub fn start(&mut self) {
        info!("dispatcher: started");
        self.running = true;
    }

    /// Parks [`tick`](Self::tick). Call when the client disconnects.
    pub fn stop(&mut self) {
        info!("dispatcher: stopped");
        self.running = false;
    }

    /// `true` between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Applies pending register writes, then runs the oldest queued command, if any.
    /// Call every [`TICK_PERIOD_MS`].
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        self.ticks = self.ticks.wrapping_add(1);
        while let Some(write) = self.queue.pop_register() {
            let result = write
                .map_err(Error::from)
                .and_then(|write| self.update_register(write));
            self.settle(Opcode::UpdateRegister, result);
        }
        // cleared before the pop: a command queued from here on interrupts this one
        self.cancel.clear();
        if let Some(command) = self.queue.pop() {
            self.execute(&command);
        }
    }

    /// Commands waiting for a tick.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Milliseconds of running time, counted in ticks.
    pub fn uptime_ms(&self) -> u32 {
        self.ticks.wrapping_mul(TICK_PERIOD_MS)
    }

    /// Active software encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Client-visible frequency registers, MSB first.
    pub fn frequency_registers(&self) -> [u8; 3] {
        self.freq_regs
    }

    /// The protocol engine.
    pub fn engine(&self) -> &Engine<LO, HI, H> {
        &self.engine
    }

    /// The protocol engine, mutably.
    pub fn engine_mut(&mut self) -> &mut Engine<LO, HI, H> {
        &mut self.engine
    }

    /// The response sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn execute(&mut self, command: &QueuedCommand) {
        let opcode = match Opcode::try_from(command.opcode) {
            Ok(opcode) => opcode,
            Err(err) => {
                warn!("dispatcher: {:?}", err);
                self.respond(&[RESPONSE_UNKNOWN_COMMAND, command.opcode]);
                return;
            }
        };
        debug!("dispatcher: {:?} rssi {}", opcode, command.rssi);
        let result = self.run(opcode, &command.payload);
        self.settle(opcode, result);
    }

    fn run(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), Error> {
        match opcode {
            Opcode::GetState => self.respond_with(STATE_OK),
            Opcode::GetVersion => self.respond_with(FIRMWARE_VERSION),
            Opcode::GetPacket => return self.get_packet(payload),
            Opcode::SendPacket => return self.send_packet(payload),
            Opcode::SendAndListen => return self.send_and_listen(payload),
            Opcode::UpdateRegister => return self.update_register(RegisterWrite::parse(payload)?),
            Opcode::Reset => {}
            Opcode::Led | Opcode::SetModeRegister => self.respond(&[RESPONSE_SUCCESS]),
            Opcode::ReadRegister => {
                let addr = single_byte(payload)?;
                let value = match addr {
                    REG_ADDR_FREQ2..=REG_ADDR_FREQ0 => {
                        self.freq_regs[usize::from(addr - REG_ADDR_FREQ2)]
                    }
                    _ => READ_REGISTER_PLACEHOLDER,
                };
                self.respond_with(&[value]);
            }
            Opcode::SetSoftwareEncoding => {
                self.encoding = Encoding::try_from(single_byte(payload)?)?;
                info!("dispatcher: encoding {:?}", self.encoding);
                self.respond(&[RESPONSE_SUCCESS]);
            }
            Opcode::SetPreamble => {
                self.engine.set_preamble(word(payload)?);
                self.respond(&[RESPONSE_SUCCESS]);
            }
            Opcode::ResetRadioConfig => {
                self.engine.configure()?;
                self.encoding = Encoding::None;
                self.engine.set_preamble(0);
                self.respond(&[RESPONSE_SUCCESS]);
            }
            Opcode::GetStatistics => {
                let body = self.statistics();
                self.respond_with(&body);
            }
        }
        Ok(())
    }

    fn settle(&mut self, opcode: Opcode, result: Result<(), Error>) {
        match result {
            Ok(()) => {}
            Err(Error::Command(err)) => {
                warn!("dispatcher: {:?} rejected: {:?}", opcode, err);
                self.respond(&[RESPONSE_PARAM_ERROR]);
            }
            Err(Error::Radio(err)) => {
                error!("dispatcher: {:?} radio fault: {:?}", opcode, err);
                self.respond(&[RESPONSE_RX_TIMEOUT]);
            }
        }
    }

    fn get_packet(&mut self, payload: &[u8]) -> Result<(), Error> {
        let params = GetPacket::parse(payload)?;
        debug!("dispatcher: listen {} ms", params.timeout_ms);
        let outcome = self.engine.receive(params.timeout_ms, self.cancel)?;
        self.report(&outcome);
        Ok(())
    }

    fn send_packet(&mut self, payload: &[u8]) -> Result<(), Error> {
        let params = SendPacket::parse(payload)?;
        let mut encoded = [0u8; MAX_ENCODED_LEN];
        let len = self.encode(params.packet, &mut encoded)?;
        self.engine.send(&Transmission {
            payload: &encoded[..len],
            repeat: params.repeat,
            interval_ms: params.interval_ms,
            preamble_ext_ms: params.preamble_ext_ms,
        })?;
        self.respond(&[RESPONSE_SUCCESS]);
        Ok(())
    }

    fn send_and_listen(&mut self, payload: &[u8]) -> Result<(), Error> {
        let params = SendAndListen::parse(payload)?;
        let mut encoded = [0u8; MAX_ENCODED_LEN];
        let len = self.encode(params.packet, &mut encoded)?;
        let tx = Transmission {
            payload: &encoded[..len],
            repeat: params.repeat,
            interval_ms: params.interval_ms,
            preamble_ext_ms: params.preamble_ext_ms,
        };
        let outcome =
            self.engine
                .send_and_listen(&tx, params.timeout_ms, params.retries, self.cancel)?;
        self.report(&outcome);
        Ok(())
    }

    /// Line-codes `packet` into `out`. Outside the bit-banged mode a single trailing zero is
    /// a training byte from the client and is not sent.
    fn encode(&self, packet: &[u8], out: &mut [u8]) -> Result<usize, CommandError> {
        let packet = match packet {
            [rest @ .., 0] if self.engine.mode() != PumpMode::Omnipod433 => {
                debug!("dispatcher: trailing zero dropped");
                rest
            }
            _ => packet,
        };
        let codec = self.encoding.codec();
        let len = codec.encoded_len(packet.len());
        if len > out.len() {
            return Err(CommandError::EncodedTooLong(len));
        }
        codec
            .encode(packet, out)
            .ok_or(CommandError::EncodedTooLong(len))
    }

    fn report(&mut self, outcome: &RxOutcome) {
        match outcome.status {
            RxStatus::Ok => {
                let mut body = [0u8; 2 + MAX_PACKET_LEN];
                body[0] = outcome.cc111x_rssi();
                body[1] = outcome.rx_count as u8;
                let len = self.encoding.codec().decode(&outcome.payload, &mut body[2..]);
                trace!("dispatcher: decoded {} of {} bytes", len, outcome.payload.len());
                self.respond_with(&body[..2 + len]);
            }
            RxStatus::Timeout => self.respond(&[RESPONSE_RX_TIMEOUT]),
            RxStatus::Interrupted => self.respond(&[RESPONSE_INTERRUPTED]),
        }
    }

    fn update_register(&mut self, write: RegisterWrite) -> Result<(), Error> {
        let RegisterWrite { addr, value } = write;
        match addr {
            REG_ADDR_PKT_LEN => {
                debug!("dispatcher: packet length {}", value);
                self.engine.set_packet_len(value);
            }
            REG_ADDR_FREQ2..=REG_ADDR_FREQ0 => {
                self.freq_regs[usize::from(addr - REG_ADDR_FREQ2)] = value;
                self.retune()?;
            }
            REG_ADDR_MDMCFG4
                if value == MDMCFG4_WWL_MAGIC && self.engine.mode() != PumpMode::Medtronic868 =>
            {
                self.engine.set_mode(PumpMode::Medtronic868);
                self.engine.configure()?;
            }
            _ => debug!("dispatcher: register {:#x} ignored", addr),
        }
        self.respond(&[RESPONSE_SUCCESS]);
        Ok(())
    }

    fn retune(&mut self) -> Result<(), Error> {
        let hz = client_register_to_hz(self.freq_regs);
        match PumpMode::from_frequency(hz) {
            Some(mode) => {
                self.engine.set_mode(mode);
                self.engine.set_frequency(hz)?;
                info!("dispatcher: tuned to {} Hz", hz);
            }
            None => warn!("dispatcher: invalid frequency {} Hz", hz),
        }
        Ok(())
    }

    fn statistics(&self) -> [u8; STATISTICS_LEN] {
        let mut body = [0u8; STATISTICS_LEN];
        body[0..4].copy_from_slice(&self.uptime_ms().to_be_bytes());
        // rx overflow and rx fifo overflow stay zero
        body[8..10].copy_from_slice(&self.engine.rx_count().to_be_bytes());
        body[10..12].copy_from_slice(&self.engine.tx_count().to_be_bytes());
        // crc failures, spi sync failures and two reserved words stay zero
        body
    }

    fn respond(&mut self, response: &[u8]) {
        self.sink.send_response(response);
    }

    fn respond_with(&mut self, body: &[u8]) {
        let mut response: Vec<u8, MAX_RESPONSE_LEN> = Vec::new();
        let _ = response.push(RESPONSE_SUCCESS);
        let body = &body[..body.len().min(MAX_RESPONSE_LEN - 1)];
        let _ = response.extend_from_slice(body);
        self.sink.send_response(&response);
    }
}
