//! # Application layer network protocols
//!
//! This module contains implementations of application layer (OSI Layer 7)
//! network protocols. Currently that's just [`mqtt`].
//!
//! ## Design principles
//!
//! - **`no_std` compatible**: designed for embedded systems without heap
//!   allocation.
//! - **Resource conscious**: fixed-size buffers and minimal memory.
//! - **Caller-supplied transport**: protocol clients are generic over the
//!   byte-stream trait they need rather than owning a connection type.

/// MQTT client implementation.
///
/// Provides an MQTT 3.1.1 client for lightweight publish-subscribe messaging,
/// commonly used in IoT applications.
pub mod mqtt;
