//! Services the bridge borrows from the surrounding firmware.
//!
//! Everything time-related flows through [`Host`]: busy-wait delays come from its
//! [`DelayNs`] supertrait and deadlines are measured against [`Host::now_ms`]. Tests swap
//! in a simulated clock so the blocking radio loops finish instantly.

use embedded_hal::delay::DelayNs;

/// Clock, link state and watchdog access.
pub trait Host: DelayNs {
    /// Free-running millisecond counter. Wraps; callers compare with `wrapping_sub`.
    fn now_ms(&self) -> u32;

    /// `true` while the BLE link has no connected peer.
    ///
    /// Transmit repeats and listens stop early when this turns true, since nobody is left
    /// to receive the response.
    fn is_advertising(&self) -> bool {
        false
    }

    /// Kicks the hardware watchdog. Called between transmit repeats.
    fn feed_watchdog(&mut self) {}

    /// Milliseconds elapsed since `start`.
    fn elapsed_since(&self, start: u32) -> u32 {
        self.now_ms().wrapping_sub(start)
    }
}
