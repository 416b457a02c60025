//! The MQTT 3.1.1 session engine: connect/subscribe/publish/disconnect
//! commands, the receive cycle, and keep-alive bookkeeping.
//!
//! Every public command acquires [`mutex`](super::mutex), serializes a
//! request into `send_buf`, writes it with a deadline, then blocks on
//! [`Client::waitfor`] for the matching acknowledgment. A separate
//! [`Client::yield_now`] call pumps the receive loop outside of a command,
//! picking up inbound PUBLISH, PUBREC, and PINGRESP, and emitting keep-alive
//! PINGREQs as needed.

use heapless::Vec;

use super::error::ClientError;
use super::mutex::{MutexGuard, RawMutex};
use super::packet::{
    self, CodecError, ConnAckReturnCode, PacketType, QoS, SubAck, SubscribeResult, Will,
};
use super::timer::Timer;
use super::topic::{self, HandlerSlot, Message, MAX_MESSAGE_HANDLERS};
use super::transport::Transport;

/// Capacity of the inbound QoS-2 "awaiting PUBREL" set.
pub const MAX_QOS2_INBOUND: usize = 8;

/// Default per-command deadline, in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u32 = 5_000;

/// Connect-time configuration.
///
/// A plain struct rather than a builder: every field is directly
/// constructible, and the `&str`/slice fields borrow from the caller instead
/// of owning a copy.
pub struct ConnectOptions<'a> {
    /// MQTT protocol level: 3 or 4.
    pub mqtt_version: u8,
    /// The client identifier sent in CONNECT.
    pub client_id: &'a str,
    /// Whether the broker should discard any prior session state.
    pub clean_session: bool,
    /// Keep-alive interval in seconds; 0 disables keep-alive.
    pub keep_alive_seconds: u16,
    /// Last Will and Testament, if any.
    pub will: Option<Will<'a>>,
    /// Username for broker authentication.
    pub username: Option<&'a str>,
    /// Password for broker authentication.
    pub password: Option<&'a [u8]>,
}

impl<'a> ConnectOptions<'a> {
    /// Defaults: protocol level 4, clean session, 60s keep-alive, no will,
    /// no credentials.
    pub fn new(client_id: &'a str) -> Self {
        Self {
            mqtt_version: 4,
            client_id,
            clean_session: true,
            keep_alive_seconds: 60,
            will: None,
            username: None,
            password: None,
        }
    }
}

/// The broker's response to a `connect` call.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ConnectResult {
    /// Whether the broker resumed an existing session.
    pub session_present: bool,
    /// The broker's connect return code.
    pub return_code: ConnAckReturnCode,
}

/// What a completed receive cycle observed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum CycleOutcome {
    /// A packet arrived and was dispatched.
    Packet(PacketType),
    /// No packet arrived before the deadline, and no keep-alive failure was
    /// detected. A clean, ordinary timeout.
    Idle,
    /// A keep-alive PINGREQ went unanswered past `pingresp_timer`. The
    /// session is presumed dead.
    ConnectionLost,
}

/// The MQTT 3.1.1 session engine.
///
/// Generic over the transport, the timer, and the mutex so the same engine
/// runs on a microcontroller's bare-metal loop or a hosted target's thread
/// pool without a cfg switch. `'a` is the lifetime of the caller-owned
/// buffers, handler filters, and callbacks: the engine borrows all of them
/// rather than owning copies.
pub struct Client<'a, C: Transport, T: Timer, M: RawMutex> {
    transport: C,
    send_buf: &'a mut [u8],
    recv_buf: &'a mut [u8],
    next_packet_id: u16,
    keep_alive_seconds: u16,
    ping_timer: T,
    pingresp_timer: T,
    ping_outstanding: bool,
    connected: bool,
    command_timeout_ms: u32,
    handlers: [Option<HandlerSlot<'a>>; MAX_MESSAGE_HANDLERS],
    default_handler: Option<&'a mut dyn FnMut(&Message)>,
    mutex: M,
    qos2_inbound: Vec<u16, MAX_QOS2_INBOUND>,
    last_connack: Option<packet::ConnAck>,
    last_suback: Option<SubAck>,
}

impl<'a, C: Transport, T: Timer, M: RawMutex> Client<'a, C, T, M> {
    /// Build a new engine around caller-owned buffers, a transport, and a
    /// lock. Not yet connected; `command_timeout_ms` defaults to
    /// [`DEFAULT_COMMAND_TIMEOUT_MS`].
    pub fn new(transport: C, send_buf: &'a mut [u8], recv_buf: &'a mut [u8], mutex: M) -> Self {
        Self {
            transport,
            send_buf,
            recv_buf,
            next_packet_id: 1,
            keep_alive_seconds: 0,
            ping_timer: T::default(),
            pingresp_timer: T::default(),
            ping_outstanding: false,
            connected: false,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            handlers: core::array::from_fn(|_| None),
            default_handler: None,
            mutex,
            qos2_inbound: Vec::new(),
            last_connack: None,
            last_suback: None,
        }
    }

    /// Override the default per-command deadline.
    pub fn set_command_timeout_ms(&mut self, timeout_ms: u32) {
        self.command_timeout_ms = timeout_ms;
    }

    /// Install a fallback callback invoked when an inbound PUBLISH matches
    /// no subscribed filter.
    pub fn set_default_handler(&mut self, handler: &'a mut dyn FnMut(&Message)) {
        self.default_handler = Some(handler);
    }

    /// Whether the engine believes the session is connected. May be called
    /// without holding the lock.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn allocate_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = if id == 65535 { 1 } else { id + 1 };
        id
    }

    fn rearm_ping_timer(&mut self) {
        if self.keep_alive_seconds > 0 {
            self.ping_timer.arm(self.keep_alive_seconds as u32 * 1000);
        }
    }

    /// Write `self.send_buf[..len]` to the transport, retrying partial
    /// writes until the command deadline. A successful write always rearms
    /// the keep-alive timer, per the protocol's "any outbound packet counts
    /// as activity" rule.
    fn write_all(&mut self, len: usize) -> Result<(), ClientError<C::Error>> {
        let deadline_ms = self.command_timeout_ms;
        let mut written = 0;
        while written < len {
            let n = self
                .transport
                .write(&self.send_buf[written..len], deadline_ms)
                .map_err(ClientError::Transport)?;
            if n == 0 {
                return Err(ClientError::ConnectionLost);
            }
            written += n;
        }
        self.rearm_ping_timer();
        Ok(())
    }

    fn send_packet<F>(&mut self, encode: F) -> Result<(), ClientError<C::Error>>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, CodecError>,
    {
        let len = encode(self.send_buf).map_err(|_| ClientError::BufferTooSmall)?;
        self.write_all(len)
    }

    /// Read exactly one inbound packet into `recv_buf`.
    ///
    /// `Ok(None)` means no header byte arrived before `deadline_ms` elapsed.
    /// An oversized `remaining_length` is capped: the overflow is drained
    /// and discarded straight from the transport so the stream stays framed
    /// for the next packet, and `PacketTooLarge` is returned instead of
    /// writing past `recv_buf`'s end.
    fn read_packet(
        &mut self,
        deadline_ms: u32,
    ) -> Result<Option<(PacketType, usize, usize)>, ClientError<C::Error>> {
        let mut header = [0u8; 1];
        let n = self
            .transport
            .read(&mut header, deadline_ms)
            .map_err(ClientError::Transport)?;
        if n == 0 {
            return Ok(None);
        }
        let packet_type = PacketType::from_header_byte(header[0]).ok_or(ClientError::Failure)?;
        if self.recv_buf.is_empty() {
            return Err(ClientError::BufferTooSmall);
        }
        self.recv_buf[0] = header[0];

        let mut decoder = packet::RemainingLengthDecoder::new();
        let mut rl_len = 0usize;
        let remaining_length = loop {
            let mut byte = [0u8; 1];
            let n = self
                .transport
                .read(&mut byte, deadline_ms)
                .map_err(ClientError::Transport)?;
            if n == 0 {
                return Ok(None);
            }
            if 1 + rl_len >= self.recv_buf.len() {
                return Err(ClientError::PacketTooLarge);
            }
            self.recv_buf[1 + rl_len] = byte[0];
            rl_len += 1;
            match decoder.push(byte[0]) {
                Ok(Some(value)) => break value as usize,
                Ok(None) => continue,
                Err(_) => return Err(ClientError::Failure),
            }
        };

        let body_start = 1 + rl_len;
        if body_start + remaining_length > self.recv_buf.len() {
            let mut scratch = [0u8; 32];
            let mut remaining = remaining_length;
            while remaining > 0 {
                let chunk = remaining.min(scratch.len());
                let n = self
                    .transport
                    .read(&mut scratch[..chunk], deadline_ms)
                    .map_err(ClientError::Transport)?;
                if n == 0 {
                    break;
                }
                remaining -= n;
            }
            return Err(ClientError::PacketTooLarge);
        }

        let mut read_total = 0usize;
        while read_total < remaining_length {
            let n = self
                .transport
                .read(
                    &mut self.recv_buf[body_start + read_total..body_start + remaining_length],
                    deadline_ms,
                )
                .map_err(ClientError::Transport)?;
            if n == 0 {
                return Ok(None);
            }
            read_total += n;
        }

        Ok(Some((packet_type, body_start, remaining_length)))
    }

    fn handle_packet(
        &mut self,
        packet_type: PacketType,
        body_start: usize,
        body_len: usize,
    ) -> Result<(), ClientError<C::Error>> {
        match packet_type {
            PacketType::Connack => {
                let body = &self.recv_buf[body_start..body_start + body_len];
                let ack = packet::decode_connack(body).map_err(|_| ClientError::Failure)?;
                self.last_connack = Some(ack);
                Ok(())
            }
            PacketType::Publish => {
                let flags = self.recv_buf[0] & 0x0F;
                let body = &self.recv_buf[body_start..body_start + body_len];
                let publish = packet::decode_publish(flags, body).map_err(|_| ClientError::Failure)?;
                let message = Message {
                    topic: publish.topic,
                    payload: publish.payload,
                    qos: publish.qos,
                    retained: publish.retain,
                    dup: publish.dup,
                    packet_id: publish.packet_id,
                };
                topic::dispatch(&mut self.handlers, &mut self.default_handler, &message);

                match publish.qos {
                    QoS::AtMostOnce => Ok(()),
                    QoS::AtLeastOnce => {
                        let id = publish.packet_id.ok_or(ClientError::Failure)?;
                        self.send_packet(|buf| packet::encode_puback(buf, id))
                    }
                    QoS::ExactlyOnce => {
                        let id = publish.packet_id.ok_or(ClientError::Failure)?;
                        if !self.qos2_inbound.contains(&id) && self.qos2_inbound.push(id).is_err() {
                            return Err(ClientError::Failure);
                        }
                        self.send_packet(|buf| packet::encode_pubrec(buf, id))
                    }
                }
            }
            PacketType::Pubrec => {
                let body = &self.recv_buf[body_start..body_start + body_len];
                let id = packet::decode_pubrec(body).map_err(|_| ClientError::Failure)?;
                self.send_packet(|buf| packet::encode_pubrel(buf, id))
            }
            PacketType::Pubrel => {
                let body = &self.recv_buf[body_start..body_start + body_len];
                let id = packet::decode_pubrel(body).map_err(|_| ClientError::Failure)?;
                if let Some(pos) = self.qos2_inbound.iter().position(|&x| x == id) {
                    self.qos2_inbound.swap_remove(pos);
                }
                self.send_packet(|buf| packet::encode_pubcomp(buf, id))
            }
            PacketType::Suback => {
                let body = &self.recv_buf[body_start..body_start + body_len];
                let ack = packet::decode_suback(body).map_err(|_| ClientError::Failure)?;
                self.last_suback = Some(ack);
                Ok(())
            }
            PacketType::Pingresp => {
                self.ping_outstanding = false;
                Ok(())
            }
            PacketType::Puback | PacketType::Unsuback | PacketType::Pubcomp => Ok(()),
            PacketType::Connect
            | PacketType::Subscribe
            | PacketType::Unsubscribe
            | PacketType::Pingreq
            | PacketType::Disconnect => Err(ClientError::Failure),
        }
    }

    /// Send a PINGREQ if `ping_timer` has expired and none is outstanding.
    /// Declaring the broker unresponsive only happens at the call site that
    /// checks `pingresp_timer` (see `cycle`/`yield_now`).
    fn run_keep_alive(&mut self) -> Result<(), ClientError<C::Error>> {
        if self.keep_alive_seconds == 0 || self.ping_outstanding {
            return Ok(());
        }
        if self.ping_timer.expired() {
            let len = packet::encode_pingreq(self.send_buf).map_err(|_| ClientError::BufferTooSmall)?;
            let written = self
                .transport
                .write(&self.send_buf[..len], 1_000)
                .map_err(ClientError::Transport)?;
            if written == len {
                self.ping_timer.arm(self.keep_alive_seconds as u32 * 1000);
                self.pingresp_timer.arm(self.command_timeout_ms);
                self.ping_outstanding = true;
            }
        }
        Ok(())
    }

    /// One receive step: read a packet, dispatch it, run keep-alive, and
    /// detect a keep-alive timeout.
    ///
    /// A read that times out with no header byte is, on its own, a clean
    /// [`CycleOutcome::Idle`]: no bytes within the window just means nothing
    /// was waiting to be read. It only becomes [`CycleOutcome::ConnectionLost`]
    /// when a PINGREQ went unanswered past `pingresp_timer`, checked here the
    /// same way whether or not a packet arrived in this cycle.
    fn cycle(&mut self, deadline_ms: u32) -> Result<CycleOutcome, ClientError<C::Error>> {
        match self.read_packet(deadline_ms) {
            Ok(None) => {
                self.run_keep_alive()?;
                if self.ping_outstanding && self.pingresp_timer.expired() {
                    self.connected = false;
                    return Ok(CycleOutcome::ConnectionLost);
                }
                Ok(CycleOutcome::Idle)
            }
            Ok(Some((packet_type, body_start, body_len))) => {
                self.handle_packet(packet_type, body_start, body_len)?;
                self.run_keep_alive()?;
                if self.ping_outstanding && self.pingresp_timer.expired() {
                    self.connected = false;
                    return Ok(CycleOutcome::ConnectionLost);
                }
                Ok(CycleOutcome::Packet(packet_type))
            }
            Err(ClientError::Failure) | Err(ClientError::PacketTooLarge) => {
                self.run_keep_alive()?;
                Err(ClientError::Failure)
            }
            Err(e) => Err(e),
        }
    }

    /// Pump `cycle` until it yields `expected`, reports connection loss, or
    /// `deadline` runs out.
    ///
    /// An idle cycle here is treated the same as a genuine connection loss:
    /// this is a bounded wait for one specific ack, so a whole deadline
    /// passing with nothing arriving means the command failed, whether or
    /// not the link itself is still alive.
    fn waitfor(&mut self, expected: PacketType, deadline: &T) -> Result<(), ClientError<C::Error>> {
        loop {
            let remaining = deadline.remaining_ms();
            if remaining == 0 {
                return Err(ClientError::ConnectionLost);
            }
            match self.cycle(remaining)? {
                CycleOutcome::Packet(ty) if ty == expected => return Ok(()),
                CycleOutcome::Packet(_) => continue,
                CycleOutcome::Idle | CycleOutcome::ConnectionLost => {
                    self.connected = false;
                    return Err(ClientError::ConnectionLost);
                }
            }
        }
    }

    /// Open the transport and perform the CONNECT/CONNACK handshake.
    ///
    /// Unlike every other command, this one is allowed while `connected` is
    /// false: it is how `connected` becomes true in the first place.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        options: &ConnectOptions,
    ) -> Result<ConnectResult, ClientError<C::Error>> {
        let _guard = MutexGuard::new(&self.mutex);

        self.transport
            .connect(host, port)
            .map_err(ClientError::Transport)?;

        self.keep_alive_seconds = options.keep_alive_seconds;
        self.next_packet_id = 1;
        self.ping_outstanding = false;
        self.qos2_inbound.clear();

        let len = packet::encode_connect(
            self.send_buf,
            options.mqtt_version,
            options.client_id,
            options.clean_session,
            options.keep_alive_seconds,
            options.will.as_ref(),
            options.username,
            options.password,
        )
        .map_err(|_| ClientError::BufferTooSmall)?;
        self.write_all(len)?;

        let mut deadline = T::default();
        deadline.arm(self.command_timeout_ms);
        self.waitfor(PacketType::Connack, &deadline)?;

        let ack = self.last_connack.take().ok_or(ClientError::Failure)?;
        if ack.return_code == ConnAckReturnCode::Accepted {
            self.connected = true;
            self.rearm_ping_timer();
        }
        Ok(ConnectResult {
            session_present: ack.session_present,
            return_code: ack.return_code,
        })
    }

    /// Subscribe to `filter` at `qos`, registering `callback` on success.
    ///
    /// If the handler table is full, the SUBACK result is still returned
    /// truthfully (the subscription reached the broker), but no callback
    /// will fire for it locally; see the crate's `DESIGN.md`.
    pub fn subscribe(
        &mut self,
        filter: &'a str,
        qos: QoS,
        callback: &'a mut dyn FnMut(&Message),
    ) -> Result<SubscribeResult, ClientError<C::Error>> {
        let _guard = MutexGuard::new(&self.mutex);
        if !self.connected {
            return Err(ClientError::NotConnected);
        }

        let packet_id = self.allocate_packet_id();
        let len = packet::encode_subscribe(self.send_buf, packet_id, filter, qos)
            .map_err(|_| ClientError::BufferTooSmall)?;
        self.write_all(len)?;

        let mut deadline = T::default();
        deadline.arm(self.command_timeout_ms);
        self.waitfor(PacketType::Suback, &deadline)?;

        let ack = self.last_suback.take().ok_or(ClientError::Failure)?;
        if let SubscribeResult::Granted(_) = ack.result {
            let _ = topic::register(&mut self.handlers, filter, callback);
        }
        Ok(ack.result)
    }

    /// Unsubscribe from `filter`. Clears every matching handler slot
    /// unconditionally, even if the broker never acknowledges.
    pub fn unsubscribe(&mut self, filter: &str) -> Result<(), ClientError<C::Error>> {
        let _guard = MutexGuard::new(&self.mutex);
        if !self.connected {
            return Err(ClientError::NotConnected);
        }

        let packet_id = self.allocate_packet_id();
        let len = packet::encode_unsubscribe(self.send_buf, packet_id, filter)
            .map_err(|_| ClientError::BufferTooSmall)?;
        self.write_all(len)?;

        let mut deadline = T::default();
        deadline.arm(self.command_timeout_ms);
        let result = self.waitfor(PacketType::Unsuback, &deadline);
        topic::unregister(&mut self.handlers, filter);
        result
    }

    /// Publish `payload` to `topic_name`. Returns once the write completes
    /// (QoS 0) or once the matching ack arrives (QoS 1/2).
    pub fn publish(
        &mut self,
        topic_name: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), ClientError<C::Error>> {
        let _guard = MutexGuard::new(&self.mutex);
        if !self.connected {
            return Err(ClientError::NotConnected);
        }

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            Some(self.allocate_packet_id())
        };
        let len = packet::encode_publish(self.send_buf, topic_name, payload, qos, false, retain, packet_id)
            .map_err(|_| ClientError::BufferTooSmall)?;
        self.write_all(len)?;

        match qos {
            QoS::AtMostOnce => Ok(()),
            QoS::AtLeastOnce => {
                let mut deadline = T::default();
                deadline.arm(self.command_timeout_ms);
                self.waitfor(PacketType::Puback, &deadline)
            }
            QoS::ExactlyOnce => {
                let mut deadline = T::default();
                deadline.arm(self.command_timeout_ms);
                self.waitfor(PacketType::Pubcomp, &deadline)
            }
        }
    }

    /// Best-effort DISCONNECT, then tear down local state regardless of
    /// whether the broker saw it.
    pub fn disconnect(&mut self) -> Result<(), ClientError<C::Error>> {
        let _guard = MutexGuard::new(&self.mutex);
        if let Ok(len) = packet::encode_disconnect(self.send_buf) {
            let _ = self.write_all(len);
        }
        let _ = self.transport.disconnect();
        self.connected = false;
        self.ping_outstanding = false;
        self.qos2_inbound.clear();
        topic::clear_all(&mut self.handlers);
        Ok(())
    }

    /// Cooperatively pump the receive loop for up to `timeout_ms`,
    /// processing inbound PUBLISH/PUBREC/PINGRESP and emitting keep-alive
    /// PINGREQs, without waiting for any specific packet.
    ///
    /// A clean timeout with nothing to read is success: it returns `Ok(())`
    /// rather than treating idleness as connection loss. Only a PINGREQ left
    /// unanswered past `pingresp_timer` is reported as `ConnectionLost`.
    /// Callers on a live keep-alive interval should call this repeatedly
    /// with a timeout well under `keep_alive_seconds`, not once with the
    /// whole interval: a single call only samples liveness (and emits at
    /// most one PINGREQ) at the granularity of its own timeout, not
    /// continuously across it.
    pub fn yield_now(&mut self, timeout_ms: u32) -> Result<(), ClientError<C::Error>> {
        let _guard = MutexGuard::new(&self.mutex);
        let mut deadline = T::default();
        deadline.arm(timeout_ms);
        loop {
            let remaining = deadline.remaining_ms();
            if remaining == 0 {
                return Ok(());
            }
            match self.cycle(remaining)? {
                CycleOutcome::Packet(_) => continue,
                CycleOutcome::Idle => return Ok(()),
                CycleOutcome::ConnectionLost => {
                    self.connected = false;
                    return Err(ClientError::ConnectionLost);
                }
            }
        }
    }
}
