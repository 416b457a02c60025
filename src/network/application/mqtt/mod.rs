//! MQTT 3.1.1 session engine for embedded systems.
//!
//! This module implements an MQTT 3.1.1 client core designed for constrained
//! devices: fixed-size caller-provided buffers, no dynamic allocation within
//! the protocol engine, and a cooperative single-threaded pump. MQTT
//! (Message Queuing Telemetry Transport) is a lightweight publish-subscribe
//! messaging protocol ideal for IoT applications.
//!
//! # Protocol overview
//!
//! MQTT uses a publish-subscribe pattern where:
//! - **Publishers** send messages to topics
//! - **Subscribers** receive messages from topics they're interested in
//! - **Brokers** route messages between publishers and subscribers
//!
//! # Key features
//!
//! - MQTT 3.1.1 specification compliance
//! - Quality of Service (QoS) levels 0, 1, and 2, including the inbound
//!   QoS-2 PUBREL/PUBCOMP completion the reference implementation this
//!   engine is informed by leaves unhandled
//! - Topic filtering with `+`/`#` wildcards and slot-ordered dispatch
//! - Keep-alive PINGREQ/PINGRESP with connection-loss detection
//! - No heap allocation anywhere in the engine
//!
//! # Design
//!
//! The engine is generic over three small collaborator traits so it runs
//! unmodified on a microcontroller or a hosted target:
//! - [`Transport`]: a byte stream with deadline-bounded read/write.
//! - [`Timer`]: a monotonic countdown.
//! - [`RawMutex`]: a non-reentrant lock guarding the engine's state.
//!
//! [`client::Client`] ties these together with caller-provided `send_buf`/
//! `recv_buf` byte slices and a fixed-capacity handler table.
//!
//! # Usage
//!
//! ```rust,no_run
//! use embedded_mqtt::network::application::mqtt::{
//!     Client, ConnectOptions, Message, QoS, RawMutex, SpinRawMutex, Timer, Transport,
//! };
//!
//! struct StdTimer(Option<std::time::Instant>, u32);
//! impl Default for StdTimer {
//!     fn default() -> Self {
//!         Self(None, 0)
//!     }
//! }
//! impl Timer for StdTimer {
//!     fn arm(&mut self, ms: u32) {
//!         self.0 = Some(std::time::Instant::now());
//!         self.1 = ms;
//!     }
//!     fn remaining_ms(&self) -> u32 {
//!         match self.0 {
//!             Some(start) => {
//!                 let elapsed = start.elapsed().as_millis() as u32;
//!                 self.1.saturating_sub(elapsed)
//!             }
//!             None => 0,
//!         }
//!     }
//! }
//!
//! struct TcpTransport(std::net::TcpStream);
//! impl Transport for TcpTransport {
//!     type Error = std::io::Error;
//!     fn connect(&mut self, _host: &str, _port: u16) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!     fn read(&mut self, buf: &mut [u8], _deadline_ms: u32) -> Result<usize, Self::Error> {
//!         use std::io::Read;
//!         self.0.read(buf)
//!     }
//!     fn write(&mut self, buf: &[u8], _deadline_ms: u32) -> Result<usize, Self::Error> {
//!         use std::io::Write;
//!         self.0.write(buf)
//!     }
//!     fn disconnect(&mut self) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! # fn run() {
//! let stream = std::net::TcpStream::connect("broker.example.com:1883").unwrap();
//! let mut send_buf = [0u8; 256];
//! let mut recv_buf = [0u8; 256];
//! let mut client: Client<TcpTransport, StdTimer, SpinRawMutex> =
//!     Client::new(TcpTransport(stream), &mut send_buf, &mut recv_buf, SpinRawMutex::default());
//!
//! let options = ConnectOptions::new("iot_device_123");
//! client.connect("broker.example.com", 1883, &options).unwrap();
//!
//! let mut on_message = |msg: &Message| {
//!     let _ = (msg.topic, msg.payload);
//! };
//! client.subscribe("sensors/+", QoS::AtLeastOnce, &mut on_message).unwrap();
//! client.publish("status", b"online", QoS::AtMostOnce, false).unwrap();
//! # }
//! ```

pub mod client;
pub mod error;
pub mod packet;
pub mod timer;
pub mod topic;
pub mod transport;

mod mutex;

pub use client::{Client, ConnectOptions, ConnectResult, DEFAULT_COMMAND_TIMEOUT_MS, MAX_QOS2_INBOUND};
pub use error::ClientError;
pub use mutex::{RawMutex, SpinRawMutex};
pub use packet::{ConnAck, ConnAckReturnCode, QoS, SubAck, SubscribeResult, Will};
pub use timer::Timer;
pub use topic::{Message, MAX_MESSAGE_HANDLERS};
pub use transport::Transport;
