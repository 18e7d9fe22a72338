use crate::consts::TICK_PERIOD_MS;
use crate::dispatcher::{Dispatcher, ResponseSink};
use crate::host::Host;
use crate::radio::Transceiver;
use embedded_hal::delay::DelayNs;

/// Runs a blocking loop that repeatedly calls `tick()` on the provided dispatcher.
///
/// This is a simple timing loop for use in environments where timer interrupts are
/// unavailable or undesired. BLE writes go to the matching
/// [`Inbox`](crate::dispatcher::Inbox), which the BLE stack's own callbacks can own; a
/// write landing while a listen runs interrupts it.
///
/// # Arguments
/// - `dispatcher`: The dispatcher to drive.
/// - `delay`: A delay provider implementing `DelayNs`, typically from the HAL.
/// - `on_idle`: Called after every tick with the dispatcher, for connection bookkeeping.
///
/// # Example
/// ```rust,ignore
/// run_dispatcher_loop(&mut dispatcher, &mut delay, |d| {
///     match ble.poll_link() {
///         Some(Link::Connected) => d.start(),
///         Some(Link::Disconnected) => d.stop(),
///         None => {}
///     }
/// });
/// ```
///
/// # Notes
/// - This loop will never return; it is intended for single-purpose polling firmware.
/// - The pause between ticks is [`TICK_PERIOD_MS`]; time spent executing a command is not
///   subtracted, so uptime drifts while the radio is busy.
pub fn run_dispatcher_loop<'a, D, LO, HI, H, S, F>(
    dispatcher: &mut Dispatcher<'a, LO, HI, H, S>,
    delay: &mut D,
    mut on_idle: F,
) -> !
where
    D: DelayNs,
    LO: Transceiver,
    HI: Transceiver,
    H: Host,
    S: ResponseSink,
    F: FnMut(&mut Dispatcher<'a, LO, HI, H, S>),
{
    loop {
        dispatcher.tick();
        on_idle(dispatcher);
        delay.delay_ms(TICK_PERIOD_MS);
    }
}
