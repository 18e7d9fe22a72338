//! Command rings between the BLE write path and the dispatcher tick.
//!
//! Backed by `heapless` single-producer single-consumer rings. [`CommandQueue`] is the
//! storage; [`CommandQueue::split`] hands out a [`CommandProducer`] for whatever context
//! delivers BLE writes and a [`CommandConsumer`] for the tick. The two halves only share
//! the rings' atomics, so a write can be pushed while a command is still executing.
//!
//! Two rings are kept:
//! - commands, with [`QUEUE_DEPTH`] of 2: the ring keeps one slot free to tell full from
//!   empty, so exactly one command can be pending. Pushing onto a full ring drops the new
//!   command and leaves the pending one untouched.
//! - register writes, with [`REGISTER_QUEUE_DEPTH`], drained in full at the start of
//!   every tick. Writes are parsed on arrival; a write that failed to parse is kept as its
//!   error so the tick can still answer it.

use core::fmt;

use heapless::spsc::{Consumer, Producer, Queue};

use crate::command::{QueuedCommand, RegisterWrite};
use crate::consts::{QUEUE_DEPTH, REGISTER_QUEUE_DEPTH};
use crate::error::CommandError;

/// A register write as it arrived: parsed, or the reason it could not be.
pub type PendingWrite = Result<RegisterWrite, CommandError>;

/// Storage for pending commands and register writes.
#[derive(Debug)]
pub struct CommandQueue {
    commands: Queue<QueuedCommand, QUEUE_DEPTH>,
    registers: Queue<PendingWrite, REGISTER_QUEUE_DEPTH>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    /// Empty rings. `const` so the storage can live in a `static`.
    pub const fn new() -> Self {
        Self {
            commands: Queue::new(),
            registers: Queue::new(),
        }
    }

    /// Splits the storage into its write and read halves.
    pub fn split(&mut self) -> (CommandProducer<'_>, CommandConsumer<'_>) {
        let (commands_in, commands_out) = self.commands.split();
        let (registers_in, registers_out) = self.registers.split();
        (
            CommandProducer {
                commands: commands_in,
                registers: registers_in,
            },
            CommandConsumer {
                commands: commands_out,
                registers: registers_out,
            },
        )
    }
}

/// Write half, owned by the BLE side.
pub struct CommandProducer<'a> {
    commands: Producer<'a, QueuedCommand, QUEUE_DEPTH>,
    registers: Producer<'a, PendingWrite, REGISTER_QUEUE_DEPTH>,
}

impl CommandProducer<'_> {
    /// Appends `command`, or hands back [`CommandError::QueueFull`] and drops it.
    pub fn push(&mut self, command: QueuedCommand) -> Result<(), CommandError> {
        self.commands
            .enqueue(command)
            .map_err(|_| CommandError::QueueFull)
    }

    /// Appends a register write, or hands back [`CommandError::QueueFull`] and drops it.
    pub fn push_register(&mut self, write: PendingWrite) -> Result<(), CommandError> {
        self.registers
            .enqueue(write)
            .map_err(|_| CommandError::QueueFull)
    }

    /// `true` when the next [`push`](Self::push) would be dropped.
    pub fn is_full(&self) -> bool {
        !self.commands.ready()
    }
}

impl fmt::Debug for CommandProducer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandProducer")
            .field("commands", &self.commands.len())
            .field("registers", &self.registers.len())
            .finish()
    }
}

/// Read half, owned by the dispatcher.
pub struct CommandConsumer<'a> {
    commands: Consumer<'a, QueuedCommand, QUEUE_DEPTH>,
    registers: Consumer<'a, PendingWrite, REGISTER_QUEUE_DEPTH>,
}

impl CommandConsumer<'_> {
    /// Takes the oldest pending command.
    pub fn pop(&mut self) -> Option<QueuedCommand> {
        self.commands.dequeue()
    }

    /// Takes the oldest pending register write.
    pub fn pop_register(&mut self) -> Option<PendingWrite> {
        self.registers.dequeue()
    }

    /// Number of pending commands, register writes excluded.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// `true` when no command is pending.
    pub fn is_empty(&self) -> bool {
        !self.commands.ready()
    }
}

impl fmt::Debug for CommandConsumer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandConsumer")
            .field("commands", &self.commands.len())
            .field("registers", &self.registers.len())
            .finish()
    }
}
