//! Deadline-aware byte transport.
//!
//! The session engine is transport agnostic: it only needs something it can
//! open, read from and write to within a bounded time, and close. Plaintext
//! TCP and a TLS stream look identical from here. Every call bakes in a
//! deadline because the engine's liveness guarantees depend on never
//! blocking past a caller-specified bound.
use core::fmt;

/// A byte-oriented stream with bounded-time reads and writes.
pub trait Transport {
    /// Error type for connection failures, malformed addresses, and the like.
    type Error: fmt::Debug;

    /// Establish the stream to `host:port`.
    fn connect(&mut self, host: &str, port: u16) -> Result<(), Self::Error>;

    /// Read up to `buf.len()` bytes, returning early if `deadline_ms`
    /// elapses before any (or all) of the buffer is filled.
    ///
    /// A timeout with no bytes read is `Ok(0)`, not an error: only a
    /// genuine I/O fault (connection reset, socket error) is `Err`.
    fn read(&mut self, buf: &mut [u8], deadline_ms: u32) -> Result<usize, Self::Error>;

    /// Write as much of `buf` as possible before `deadline_ms` elapses.
    ///
    /// As with `read`, writing fewer bytes than requested because the
    /// deadline ran out is a successful partial write, not an error.
    fn write(&mut self, buf: &[u8], deadline_ms: u32) -> Result<usize, Self::Error>;

    /// Tear down the stream. Idempotent.
    fn disconnect(&mut self) -> Result<(), Self::Error>;
}
