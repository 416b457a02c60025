//! Error type returned by the MQTT session engine.
//!
//! A flat enum, one variant per error kind, with `defmt::Format` behind the
//! `defmt` feature carrying a one-line arm per variant. The one addition
//! over that shape is [`ClientError::Transport`], which wraps the
//! transport's own associated error type instead of collapsing every I/O
//! fault into one case.

/// Errors the engine can return from a command or a receive cycle.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ClientError<E> {
    /// The command failed locally (bad arguments, serialization, a
    /// malformed inbound packet) without necessarily meaning the connection
    /// is lost.
    Failure,
    /// The connection is presumed dead: a write shortfall, a read error, a
    /// keep-alive timeout, or no ack within the deadline.
    ConnectionLost,
    /// A command other than `connect`/`is_connected` was issued while not
    /// connected.
    NotConnected,
    /// A serializer could not fit the packet in the caller-provided buffer.
    BufferTooSmall,
    /// An inbound packet's `remaining_length` exceeded `recv_buf`'s capacity.
    /// The overflow has been drained from the transport and discarded.
    PacketTooLarge,
    /// The underlying transport reported an error.
    Transport(E),
}

#[cfg(feature = "defmt")]
impl<E: defmt::Format> defmt::Format for ClientError<E> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ClientError::Failure => defmt::write!(f, "Failure"),
            ClientError::ConnectionLost => defmt::write!(f, "ConnectionLost"),
            ClientError::NotConnected => defmt::write!(f, "NotConnected"),
            ClientError::BufferTooSmall => defmt::write!(f, "BufferTooSmall"),
            ClientError::PacketTooLarge => defmt::write!(f, "PacketTooLarge"),
            ClientError::Transport(e) => defmt::write!(f, "Transport({})", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug> core::fmt::Display for ClientError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug> std::error::Error for ClientError<E> {}
