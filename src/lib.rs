//! # embedded-mqtt
//!
//! An embedded MQTT 3.1.1 client core for constrained devices: fixed-size
//! pre-allocated buffers, no dynamic allocation within the protocol engine,
//! and a cooperative single-threaded pump. Connects to a broker, subscribes
//! with per-topic callbacks, publishes at QoS 0/1/2, and maintains the
//! session with PING keep-alive.
//!
//! ## What's here
//!
//! - **Wire codec** ([`network::application::mqtt::packet`]): MQTT 3.1.1
//!   control packet (de)serialization, including the variable-byte
//!   "remaining length" integer encoding.
//! - **Topic matching** ([`network::application::mqtt::topic`]): `+`/`#`
//!   wildcard matching and a fixed-capacity handler table.
//! - **Session engine** ([`network::application::mqtt::client::Client`]):
//!   the request/acknowledge state machine, keep-alive timing, and the
//!   public command surface (connect, subscribe, unsubscribe, publish,
//!   disconnect, yield).
//! - **Collaborator traits**: [`network::application::mqtt::Transport`],
//!   [`network::application::mqtt::Timer`], and
//!   [`network::application::mqtt::RawMutex`]: the three narrow interfaces
//!   the engine needs from its host, supplied by the caller.
//!
//! ## Deliberately out of scope
//!
//! The transport layer itself (plain TCP or TLS), a platform timer, and a
//! mutex implementation are collaborators the engine consumes through the
//! traits above rather than provides. MQTT 5, persistent session storage
//! across restarts, multi-broker failover, and automatic reconnection are
//! likewise left to the caller; the engine surfaces connection loss, it does
//! not react to it.
//!
//! ## Optional features
//!
//! - `std`: enables `std::error::Error` on [`network::application::mqtt::ClientError`].
//! - `defmt`: enables `defmt::Format` on the crate's error and logging-adjacent types.
//!
//! ## Example
//!
//! ```rust,no_run
//! use embedded_mqtt::network::application::mqtt::{
//!     Client, ConnectOptions, Message, QoS, SpinRawMutex, Timer, Transport,
//! };
//!
//! # struct StdTimer(Option<std::time::Instant>, u32);
//! # impl Default for StdTimer {
//! #     fn default() -> Self { Self(None, 0) }
//! # }
//! # impl Timer for StdTimer {
//! #     fn arm(&mut self, ms: u32) { self.0 = Some(std::time::Instant::now()); self.1 = ms; }
//! #     fn remaining_ms(&self) -> u32 {
//! #         match self.0 {
//! #             Some(start) => self.1.saturating_sub(start.elapsed().as_millis() as u32),
//! #             None => 0,
//! #         }
//! #     }
//! # }
//! # struct TcpTransport(std::net::TcpStream);
//! # impl Transport for TcpTransport {
//! #     type Error = std::io::Error;
//! #     fn connect(&mut self, _host: &str, _port: u16) -> Result<(), Self::Error> { Ok(()) }
//! #     fn read(&mut self, buf: &mut [u8], _deadline_ms: u32) -> Result<usize, Self::Error> {
//! #         use std::io::Read;
//! #         self.0.read(buf)
//! #     }
//! #     fn write(&mut self, buf: &[u8], _deadline_ms: u32) -> Result<usize, Self::Error> {
//! #         use std::io::Write;
//! #         self.0.write(buf)
//! #     }
//! #     fn disconnect(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # fn run() {
//! let stream = std::net::TcpStream::connect("broker.example.com:1883").unwrap();
//! let mut send_buf = [0u8; 256];
//! let mut recv_buf = [0u8; 256];
//! let mut client: Client<TcpTransport, StdTimer, SpinRawMutex> =
//!     Client::new(TcpTransport(stream), &mut send_buf, &mut recv_buf, SpinRawMutex::default());
//!
//! client.connect("broker.example.com", 1883, &ConnectOptions::new("device-1")).unwrap();
//!
//! let mut on_message = |msg: &Message| {
//!     let _ = (msg.topic, msg.payload);
//! };
//! client.subscribe("sensors/+/temp", QoS::AtLeastOnce, &mut on_message).unwrap();
//! client.publish("status", b"online", QoS::AtMostOnce, false).unwrap();
//! # }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

/// Network abstraction layer: the MQTT session engine and the narrow
/// transport/connection traits it builds on.
pub mod network;

/// Device configuration surface for turning a provisioned blob into
/// connect-time options.
pub mod config;
