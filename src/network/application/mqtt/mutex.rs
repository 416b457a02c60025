//! The mutual-exclusion primitive guarding a [`Client`](super::client::Client).
//!
//! Every command and every receive cycle runs under this lock so that
//! `send_buf`/`recv_buf` are never touched by two callers at once and so
//! outbound packets stay globally ordered. The primitive itself is supplied
//! by the caller (a microcontroller might back it with a critical section,
//! a hosted target with an OS mutex), so the engine only depends on this
//! narrow trait.
//!
//! Callbacks run synchronously while the lock is held. [`RawMutex`]
//! implementations are expected to be **non-reentrant**: a callback that
//! calls back into the same [`Client`] will deadlock rather than silently
//! succeed. A recursive mutex would hide that bug until a different thread
//! interleaving turned it into a real one; failing fast here is the point
//! (see the crate's `DESIGN.md` for the tradeoff).

/// A non-reentrant lock guarding the engine's mutable state.
pub trait RawMutex {
    /// Acquire the lock, blocking the calling thread until it is free.
    fn lock(&self);

    /// Release a lock previously acquired with `lock`.
    fn unlock(&self);
}

/// RAII guard that releases a [`RawMutex`] on drop.
///
/// Mirrors the lock/unlock pairing the engine needs around every command,
/// without requiring every call site to remember the matching `unlock`.
pub(crate) struct MutexGuard<'a, M: RawMutex> {
    mutex: &'a M,
}

impl<'a, M: RawMutex> MutexGuard<'a, M> {
    pub(crate) fn new(mutex: &'a M) -> Self {
        mutex.lock();
        Self { mutex }
    }
}

impl<'a, M: RawMutex> Drop for MutexGuard<'a, M> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

/// A busy-wait spinlock usable as a default [`RawMutex`] on any target.
///
/// Suitable for single-core embedded targets and tests. Hosted platforms
/// with real contention should supply their own OS-backed implementation
/// instead.
#[derive(Debug, Default)]
pub struct SpinRawMutex {
    locked: core::sync::atomic::AtomicBool,
}

impl RawMutex for SpinRawMutex {
    fn lock(&self) {
        use core::sync::atomic::Ordering;
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.locked
            .store(false, core::sync::atomic::Ordering::Release);
    }
}
