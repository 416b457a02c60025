//! # Network abstraction layer
//!
//! This crate's only protocol implementation lives under [`application::mqtt`].
//! The module is kept as its own layer (rather than flattened into the crate
//! root) so a future sibling application-layer protocol has somewhere to go
//! without touching the MQTT engine's paths.

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// OSI Layer 7: Application layer protocol implementations.
pub mod application;
