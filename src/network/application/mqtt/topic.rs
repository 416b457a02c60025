//! Topic-filter wildcard matching and the fixed-capacity handler table.

use super::packet::QoS;

/// Number of subscription slots a [`Client`](super::client::Client) carries.
///
/// Fixed at compile time, matching the fixed-capacity design of the rest of
/// the engine's state (no dynamic allocation, see the crate's `DESIGN.md`).
pub const MAX_MESSAGE_HANDLERS: usize = 8;

/// Decide whether a subscription `filter` matches a concrete `topic`.
///
/// `+` matches exactly one path segment (including an empty one); `#` may
/// appear only as the final segment and matches that segment and everything
/// after it, including zero remaining segments (so `"a/#"` matches `"a"`
/// itself, per MQTT 3.1.1, not just topics strictly below it).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut f = filter.split('/');
    let mut t = topic.split('/');
    loop {
        match (f.next(), t.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some("+"), None) => return false,
            (Some(fs), Some(ts)) if fs == ts => continue,
            (Some(_), _) => return false,
            (None, None) => return true,
            (None, Some(_)) => return false,
        }
    }
}

/// An inbound PUBLISH handed to a matching callback.
///
/// `topic` and `payload` borrow from the engine's receive buffer and are
/// only valid for the duration of the callback invocation.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    /// The topic the broker published on.
    pub topic: &'a str,
    /// The message payload.
    pub payload: &'a [u8],
    /// Delivery QoS the broker used for this message.
    pub qos: QoS,
    /// Set if the broker is replaying a retained message.
    pub retained: bool,
    /// Set if this is a redelivery of a message already sent once.
    pub dup: bool,
    /// Present for QoS 1 and 2 messages.
    pub packet_id: Option<u16>,
}

/// One row of the fixed-capacity subscription table.
///
/// The callback is an opaque `FnMut` closure rather than a raw function
/// pointer plus a context value: in Rust, a closure capturing its context
/// *is* the "tagged pair" the engine's design calls for, without reaching
/// for a raw pointer or a global singleton.
pub struct HandlerSlot<'a> {
    /// The subscription filter this slot was registered for.
    pub filter: &'a str,
    callback: &'a mut dyn FnMut(&Message),
}

/// Register `callback` under `filter` in the first empty slot.
///
/// Returns `Err(())` if every slot is occupied; the caller (the engine's
/// `subscribe` command) turns that into a documented capacity hazard rather
/// than a protocol error, since the SUBACK itself already succeeded.
pub(crate) fn register<'a>(
    slots: &mut [Option<HandlerSlot<'a>>],
    filter: &'a str,
    callback: &'a mut dyn FnMut(&Message),
) -> Result<(), ()> {
    for slot in slots.iter_mut() {
        if slot.is_none() {
            *slot = Some(HandlerSlot { filter, callback });
            return Ok(());
        }
    }
    Err(())
}

/// Clear every slot whose filter is byte-equal to `filter`.
///
/// Unconditional: called on both the success and failure path of
/// `unsubscribe`, matching the reference engine's behavior.
pub(crate) fn unregister(slots: &mut [Option<HandlerSlot<'_>>], filter: &str) {
    for slot in slots.iter_mut() {
        if slot.as_ref().is_some_and(|s| s.filter == filter) {
            *slot = None;
        }
    }
}

/// Empty every slot, e.g. on `disconnect`.
pub(crate) fn clear_all(slots: &mut [Option<HandlerSlot<'_>>]) {
    for slot in slots.iter_mut() {
        *slot = None;
    }
}

/// Dispatch `message` to every matching slot, in slot order, falling back to
/// `default_handler` only if nothing matched.
///
/// Dispatch order is part of the engine's observable contract (lowest slot
/// index first); callers relying on dispatch order for, say, a logging
/// handler registered before a business-logic handler depend on this.
pub(crate) fn dispatch<'a>(
    slots: &mut [Option<HandlerSlot<'a>>],
    default_handler: &mut Option<&'a mut dyn FnMut(&Message)>,
    message: &Message,
) {
    let mut matched = false;
    for slot in slots.iter_mut() {
        if let Some(s) = slot {
            if s.filter == message.topic || topic_matches(s.filter, message.topic) {
                (s.callback)(message);
                matched = true;
            }
        }
    }
    if !matched {
        if let Some(cb) = default_handler {
            cb(message);
        }
    }
}
