//! Tick scheduling for the dispatcher.
//!
//! The dispatcher needs [`Dispatcher::tick`](crate::dispatcher::Dispatcher::tick) called
//! every [`TICK_PERIOD_MS`](crate::consts::TICK_PERIOD_MS). This employs two approaches: an
//! interrupt service routine using `critical_section::with` (`timer-isr` feature), or a
//! busy-loop delay timer (`delay-loop` feature).
//!
//! Contains helpers for polling- and ISR-based scheduling, including:
//! - `run_dispatcher_loop`: blocking loop driven by `DelayNs` (feature `delay-loop`)
//! - `global_dispatcher_tick` and `tick_bridge!()`: interrupt-based tick callback wrapper
//!   (feature `timer-isr`)
//! - `global_dispatcher_enqueue` and `enqueue_bridge!()`: BLE write entry point through a
//!   separate inbox slot, usable while a tick is running (feature `timer-isr`)

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use macros::*;
