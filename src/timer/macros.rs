/// Declares the static global `BRIDGE` dispatcher slot and `BRIDGE_INBOX` inbox slot,
/// both protected by a `critical_section` mutex.
///
/// This macro creates `static` singletons suitable for use in interrupt-based environments:
/// the tick ISR drives `BRIDGE`, the BLE callbacks feed `BRIDGE_INBOX`, and neither waits on
/// the other.
///
/// # Arguments
/// - `$lo`: The concrete type of the low-band (433 MHz) radio
/// - `$hi`: The concrete type of the high-band (916/868 MHz) radio
/// - `$host`: The concrete [`Host`](crate::host::Host) type
/// - `$sink`: The concrete [`ResponseSink`](crate::dispatcher::ResponseSink) type, typically
///   `fn(&[u8])`
///
/// # Example
/// ```rust,ignore
/// init_bridge!(Rf69<Spi0Device>, Rf69<Spi1Device>, Board, fn(&[u8]));
/// ```
#[macro_export]
macro_rules! init_bridge {
    ( $lo:ty, $hi:ty, $host:ty, $sink:ty ) => {
        pub static BRIDGE: $crate::timer::DispatcherSlot<'static, $lo, $hi, $host, $sink> =
            $crate::timer::global_dispatcher_init();
        pub static BRIDGE_INBOX: $crate::timer::InboxSlot<'static> =
            $crate::timer::global_inbox_init();
    };
}

/// Moves a ready dispatcher into `BRIDGE` and its inbox into `BRIDGE_INBOX`.
///
/// # Example
/// ```rust,ignore
/// static CANCEL: CancelFlag = CancelFlag::new();
///
/// fn main() {
///     let queue = singleton!(: CommandQueue = CommandQueue::new()).unwrap();
///     let (producer, consumer) = queue.split();
///     let sink: fn(&[u8]) = ble_notify;
///     let mut dispatcher = Dispatcher::new(engine, consumer, &CANCEL, sink);
///     dispatcher.start();
///     setup_bridge!(dispatcher, Inbox::new(producer, &CANCEL));
/// }
/// ```
///
/// # Notes
/// - Requires `init_bridge!` to have been used earlier.
#[macro_export]
macro_rules! setup_bridge {
    ( $dispatcher:expr, $inbox:expr ) => {
        $crate::timer::global_dispatcher_setup(&BRIDGE, &BRIDGE_INBOX, $dispatcher, $inbox)
    };
}

/// Runs one tick of the global `BRIDGE` if it has been set up.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIMER1() {
///     tick_bridge!();
/// }
/// ```
///
/// # Notes
/// - Call every [`TICK_PERIOD_MS`](crate::consts::TICK_PERIOD_MS).
/// - Safe to call before `setup_bridge!`; it silently does nothing.
#[macro_export]
macro_rules! tick_bridge {
    () => {
        $crate::timer::global_dispatcher_tick(&BRIDGE)
    };
}

/// Hands a BLE write to the global `BRIDGE_INBOX`. Safe to call while `tick_bridge!` is
/// executing a command.
///
/// Evaluates to `None` before `setup_bridge!`, otherwise to the result of
/// [`Inbox::enqueue`](crate::dispatcher::Inbox::enqueue).
///
/// # Example
/// ```rust,ignore
/// fn on_ble_write(data: &[u8], rssi: i8) {
///     let _ = enqueue_bridge!(data, rssi);
/// }
/// ```
#[macro_export]
macro_rules! enqueue_bridge {
    ( $frame:expr, $rssi:expr ) => {
        $crate::timer::global_dispatcher_enqueue(&BRIDGE_INBOX, $frame, $rssi)
    };
}
