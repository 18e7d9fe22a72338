use crate::dispatcher::{Admission, Dispatcher, Inbox, ResponseSink};
use crate::error::CommandError;
use crate::host::Host;
use crate::radio::Transceiver;
use core::cell::RefCell;
use critical_section::Mutex;

/// The dispatcher, shared between `main` and the tick interrupt.
///
/// Empty while a tick is executing a command.
pub type DispatcherSlot<'a, LO, HI, H, S> = Mutex<RefCell<Option<Dispatcher<'a, LO, HI, H, S>>>>;

/// The inbox, shared between `main` and the BLE callbacks.
pub type InboxSlot<'a> = Mutex<RefCell<Option<Inbox<'a>>>>;

/// Used to initialize the global static dispatcher slot for use with
/// `critical_section`.
///
/// # Returns
/// * An empty slot
///
/// # Example
/// ```rust,ignore
/// static BRIDGE: DispatcherSlot<'static, Radio, Radio, Board, fn(&[u8])> =
///     global_dispatcher_init();
/// ```
pub const fn global_dispatcher_init<'a, LO, HI, H, S>() -> DispatcherSlot<'a, LO, HI, H, S> {
    Mutex::new(RefCell::new(None))
}

/// Used to initialize the global static inbox slot.
///
/// # Example
/// ```rust,ignore
/// static BRIDGE_INBOX: InboxSlot<'static> = global_inbox_init();
/// ```
pub const fn global_inbox_init<'a>() -> InboxSlot<'a> {
    Mutex::new(RefCell::new(None))
}

/// Moves a ready dispatcher and its inbox into their slots, replacing whatever was there.
///
/// # Example
/// ```rust,ignore
/// let (producer, consumer) = QUEUE.split();
/// let mut dispatcher = Dispatcher::new(engine, consumer, &CANCEL, notify);
/// dispatcher.start();
/// global_dispatcher_setup(&BRIDGE, &BRIDGE_INBOX, dispatcher, Inbox::new(producer, &CANCEL));
/// ```
pub fn global_dispatcher_setup<'a, LO, HI, H, S>(
    slot: &DispatcherSlot<'a, LO, HI, H, S>,
    inbox_slot: &InboxSlot<'a>,
    dispatcher: Dispatcher<'a, LO, HI, H, S>,
    inbox: Inbox<'a>,
) {
    critical_section::with(|cs| {
        let _ = slot.borrow(cs).replace(Some(dispatcher));
        let _ = inbox_slot.borrow(cs).replace(Some(inbox));
    });
}

/// Runs one dispatcher tick. Does nothing until the slot is set up, or while another
/// tick still holds the dispatcher.
///
/// The dispatcher is taken out of the slot for the duration of the command, so the
/// critical section only covers the take and the put-back. Radio busy-waits run with
/// interrupts enabled, and BLE writes reaching [`global_dispatcher_enqueue`] meanwhile
/// can interrupt a running listen.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIMER1() {
///     global_dispatcher_tick(&BRIDGE);
/// }
/// ```
pub fn global_dispatcher_tick<LO, HI, H, S>(slot: &DispatcherSlot<'_, LO, HI, H, S>)
where
    LO: Transceiver,
    HI: Transceiver,
    H: Host,
    S: ResponseSink,
{
    let taken = critical_section::with(|cs| slot.borrow(cs).borrow_mut().take());
    let Some(mut dispatcher) = taken else {
        return;
    };
    dispatcher.tick();
    critical_section::with(|cs| {
        let _ = slot.borrow(cs).borrow_mut().replace(dispatcher);
    });
}

/// Hands a BLE write to the inbox in the slot. Safe to call while a tick is running.
///
/// # Returns
/// * `None` if the slot has not been set up
/// * The inbox's verdict otherwise
pub fn global_dispatcher_enqueue(
    inbox_slot: &InboxSlot<'_>,
    frame: &[u8],
    rssi: i8,
) -> Option<Result<Admission, CommandError>> {
    critical_section::with(|cs| {
        inbox_slot
            .borrow(cs)
            .borrow_mut()
            .as_mut()
            .map(|inbox| inbox.enqueue(frame, rssi))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{RESPONSE_INTERRUPTED, RESPONSE_SUCCESS};
    use crate::dispatcher::CancelFlag;
    use crate::queue::CommandQueue;
    use crate::sim::{SimHost, recorder, rig};
    use std::rc::Rc;
    use std::vec;
    use std::vec::Vec;

    #[test]
    fn test_slot_round_trip() {
        let cancel = CancelFlag::new();
        let mut queue = CommandQueue::new();
        let (producer, consumer) = queue.split();
        let (log, sink) = recorder();
        let inbox_slot = global_inbox_init();
        let slot = global_dispatcher_init();

        // nothing happens before setup
        assert_eq!(global_dispatcher_enqueue(&inbox_slot, &[1, 0x01], 0), None);
        global_dispatcher_tick(&slot);

        let mut dispatcher = Dispatcher::new(rig(SimHost::new()), consumer, &cancel, sink);
        dispatcher.start();
        global_dispatcher_setup(&slot, &inbox_slot, dispatcher, Inbox::new(producer, &cancel));

        assert_eq!(
            global_dispatcher_enqueue(&inbox_slot, &[1, 0x01], 0),
            Some(Ok(Admission::Queued))
        );
        global_dispatcher_tick(&slot);
        assert_eq!(log.borrow().as_slice(), [b"\xddOK".to_vec()]);
    }

    #[test]
    fn test_write_during_tick_interrupts_listen() {
        let cancel = CancelFlag::new();
        let mut queue = CommandQueue::new();
        let (producer, consumer) = queue.split();
        let inbox_slot = global_inbox_init();
        let admissions = RefCell::new(Vec::new());

        // the write arrives through the slot while the tick is 5 ms into the listen
        let host = SimHost::new().call_at(5, || {
            let admission = global_dispatcher_enqueue(&inbox_slot, &[1, 0x01], 0);
            admissions.borrow_mut().push(admission);
        });
        let (log, sink) = recorder();
        let slot = global_dispatcher_init();
        let mut dispatcher = Dispatcher::new(rig(host), consumer, &cancel, sink);
        dispatcher.start();
        global_dispatcher_setup(&slot, &inbox_slot, dispatcher, Inbox::new(producer, &cancel));

        // listen with no timeout: only the new command can end it
        let get_packet = [6, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            global_dispatcher_enqueue(&inbox_slot, &get_packet, 0),
            Some(Ok(Admission::Queued))
        );
        global_dispatcher_tick(&slot);
        assert_eq!(*admissions.borrow(), vec![Some(Ok(Admission::Queued))]);
        assert_eq!(*log.borrow(), vec![vec![RESPONSE_INTERRUPTED]]);

        global_dispatcher_tick(&slot);
        assert_eq!(last_response(&log), [RESPONSE_SUCCESS, b'O', b'K']);
    }

    fn last_response(log: &Rc<RefCell<Vec<Vec<u8>>>>) -> Vec<u8> {
        log.borrow().last().cloned().unwrap_or_default()
    }
}
