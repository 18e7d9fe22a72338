//! # subg-bridge
//!
//! A portable, no_std Rust bridge between a Bluetooth Low Energy command channel and the
//! sub-GHz radios used by insulin pumps, built around HopeRF RFM69 (SX1231) transceivers.
//!
//! A diabetes-management application writes compact binary commands over BLE; this crate
//! parses them, queues them, and on a periodic tick turns each one into radio operations:
//! retuning, transmitting a packet (optionally repeated), and listening for a reply with
//! timeout, retry and cancellation.
//!
//! This crate is built from:
//! - `embedded-hal` traits for SPI and timing, one `SpiDevice` per transceiver
//! - a register-level [`Rf69`](radio::rf69::Rf69) driver with bounded busy-waits
//! - a protocol [`Engine`](engine::Engine) with two framings: byte-stream OOK (916/868 MHz)
//!   and a bit-banged preamble framing (433 MHz)
//! - software line codes (Manchester and 4b6b) applied to payloads
//! - a [`Dispatcher`](dispatcher::Dispatcher) that drains a one-slot command queue per tick,
//!   fed by an [`Inbox`](dispatcher::Inbox) that stays usable while a command runs
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support |
//! | `delay-loop`          | Blocking tick loop driven by `embedded_hal::delay::DelayNs` |
//! | `timer-isr` (default) | Global dispatcher slot guarded by `critical_section` for timer interrupts |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use subg_bridge::dispatcher::{CancelFlag, Dispatcher, Inbox};
//! use subg_bridge::{engine::{Engine, Timing}, queue::CommandQueue, radio::rf69::Rf69};
//!
//! let low = Rf69::new(spi_433);
//! let high = Rf69::new(spi_916);
//! let mut engine = Engine::new(low, high, host, Timing::default());
//! engine.init()?;
//!
//! let cancel = CancelFlag::new();
//! let mut queue = CommandQueue::new();
//! let (producer, consumer) = queue.split();
//! let mut inbox = Inbox::new(producer, &cancel);
//! let mut dispatcher = Dispatcher::new(engine, consumer, &cancel, |resp: &[u8]| ble_notify(resp));
//! dispatcher.start();
//!
//! // BLE write callback, may run while a tick is busy
//! inbox.enqueue(&frame, rssi);
//! // every 10 ms
//! dispatcher.tick();
//! ```
//!
//! ## Integration Notes
//!
//! - Radio operations busy-wait; while a command executes the tick does not return
//! - Only one command runs at a time and commands run in arrival order
//! - Receive loops abort as soon as the shared [`CancelFlag`](dispatcher::CancelFlag) is raised,
//!   which the [`Inbox`](dispatcher::Inbox) does for every queued command
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(test, not(feature = "std")))]
extern crate std;

#[cfg(feature = "timer-isr")]
pub use critical_section;

pub use heapless;

#[macro_use]
mod fmt;

pub mod command;
pub mod consts;
pub mod dispatcher;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod host;
pub mod queue;
pub mod radio;
pub mod timer;

#[cfg(test)]
pub(crate) mod sim;
