//! MQTT 3.1.1 control packet wire codec.
//!
//! Implements the fixed header, the variable-byte "remaining length" field,
//! and the per-packet-type (de)serializers needed by the session engine.
//! Encoders take the destination buffer by reference and return the number
//! of bytes written; decoders take the packet body (everything after the
//! fixed header) and return a parsed value borrowing from it. Nothing here
//! touches a transport; framing a packet off the wire is `read_packet`'s
//! job (see `client.rs`), this module only knows about bytes already in
//! memory.

use core::convert::TryFrom;

/// Upper bound for the variable-byte "remaining length" encoding
/// (`0xFF, 0xFF, 0xFF, 0x7F`).
pub const MAX_VARIABLE_BYTE_INT: u32 = 268_435_455;

/// A remaining-length field may not spill past this many bytes.
pub const MAX_REMAINING_LENGTH_BYTES: usize = 4;

/// Errors from encoding or decoding a single packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CodecError {
    /// The destination buffer was too small to hold the packet.
    BufferTooSmall,
    /// The input bytes do not form a valid packet of the expected type.
    Malformed,
}

/// The MQTT control packet types, keyed by the fixed header's high nibble.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Recover the packet type from a fixed header's first byte.
    pub fn from_header_byte(byte: u8) -> Option<Self> {
        match byte >> 4 {
            1 => Some(PacketType::Connect),
            2 => Some(PacketType::Connack),
            3 => Some(PacketType::Publish),
            4 => Some(PacketType::Puback),
            5 => Some(PacketType::Pubrec),
            6 => Some(PacketType::Pubrel),
            7 => Some(PacketType::Pubcomp),
            8 => Some(PacketType::Subscribe),
            9 => Some(PacketType::Suback),
            10 => Some(PacketType::Unsubscribe),
            11 => Some(PacketType::Unsuback),
            12 => Some(PacketType::Pingreq),
            13 => Some(PacketType::Pingresp),
            14 => Some(PacketType::Disconnect),
            _ => None,
        }
    }
}

/// Quality of Service levels for MQTT messages.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// At most once delivery (fire and forget).
    AtMostOnce = 0,
    /// At least once delivery (PUBACK), duplicates possible.
    AtLeastOnce = 1,
    /// Exactly once delivery (PUBREC/PUBREL/PUBCOMP).
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(CodecError::Malformed),
        }
    }
}

/// Incremental decoder for the variable-byte "remaining length" field.
///
/// `read_packet` feeds this one transport byte at a time so it can re-emit
/// each byte into `recv_buf` as it goes (see `client.rs`); this type only
/// tracks the arithmetic.
#[derive(Debug, Default)]
pub(crate) struct RemainingLengthDecoder {
    value: u32,
    multiplier: u32,
    bytes_consumed: usize,
}

impl RemainingLengthDecoder {
    pub(crate) fn new() -> Self {
        Self {
            value: 0,
            multiplier: 1,
            bytes_consumed: 0,
        }
    }

    /// Feed one more byte. Returns the final length once the continuation
    /// bit is clear, `None` if more bytes are needed.
    pub(crate) fn push(&mut self, byte: u8) -> Result<Option<u32>, CodecError> {
        self.bytes_consumed += 1;
        if self.bytes_consumed > MAX_REMAINING_LENGTH_BYTES {
            return Err(CodecError::Malformed);
        }
        self.value += (byte & 0x7F) as u32 * self.multiplier;
        self.multiplier *= 128;
        if byte & 0x80 == 0 {
            Ok(Some(self.value))
        } else {
            Ok(None)
        }
    }
}

/// Decode a remaining-length field already sitting in memory.
///
/// Returns the decoded value and the number of bytes it occupied. Used by
/// tests and by callers decoding a packet that is already fully buffered.
pub fn decode_remaining_length(buf: &[u8]) -> Result<(u32, usize), CodecError> {
    let mut decoder = RemainingLengthDecoder::new();
    for (i, &byte) in buf.iter().enumerate() {
        if let Some(value) = decoder.push(byte)? {
            return Ok((value, i + 1));
        }
    }
    Err(CodecError::Malformed)
}

/// Encode `len` as a variable-byte integer into `buf`, returning the number
/// of bytes written.
pub fn encode_remaining_length(buf: &mut [u8], mut len: u32) -> Result<usize, CodecError> {
    if len > MAX_VARIABLE_BYTE_INT {
        return Err(CodecError::Malformed);
    }
    let mut written = 0;
    loop {
        if written >= buf.len() {
            return Err(CodecError::BufferTooSmall);
        }
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf[written] = byte;
        written += 1;
        if len == 0 {
            break;
        }
    }
    Ok(written)
}

/// A forward-only cursor for writing packet bytes into a fixed buffer.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn put_u8(&mut self, b: u8) -> Result<(), CodecError> {
        if self.remaining() < 1 {
            return Err(CodecError::BufferTooSmall);
        }
        self.buf[self.pos] = b;
        self.pos += 1;
        Ok(())
    }

    fn put_u16(&mut self, v: u16) -> Result<(), CodecError> {
        self.put_bytes(&v.to_be_bytes())
    }

    fn put_bytes(&mut self, data: &[u8]) -> Result<(), CodecError> {
        if self.remaining() < data.len() {
            return Err(CodecError::BufferTooSmall);
        }
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
        Ok(())
    }

    fn put_length_prefixed(&mut self, data: &[u8]) -> Result<(), CodecError> {
        if data.len() > u16::MAX as usize {
            return Err(CodecError::Malformed);
        }
        self.put_u16(data.len() as u16)?;
        self.put_bytes(data)
    }

    fn put_remaining_length(&mut self, len: u32) -> Result<(), CodecError> {
        let n = encode_remaining_length(&mut self.buf[self.pos..], len)?;
        self.pos += n;
        Ok(())
    }

    fn position(&self) -> usize {
        self.pos
    }
}

const PROTOCOL_NAME: &[u8] = b"MQTT";

/// A Last Will and Testament registered at CONNECT time.
#[derive(Debug, Clone, Copy)]
pub struct Will<'a> {
    /// Topic the broker publishes the will message to on ungraceful disconnect.
    pub topic: &'a str,
    /// The will payload.
    pub message: &'a [u8],
    /// QoS the will is published at.
    pub qos: QoS,
    /// Whether the will is published as a retained message.
    pub retain: bool,
}

fn connect_remaining_length(
    client_id: &str,
    will: Option<&Will>,
    username: Option<&str>,
    password: Option<&[u8]>,
) -> usize {
    let mut len = 2 + PROTOCOL_NAME.len() // protocol name
        + 1 // protocol level
        + 1 // connect flags
        + 2 // keep alive
        + 2 + client_id.len(); // client id
    if let Some(w) = will {
        len += 2 + w.topic.len();
        len += 2 + w.message.len();
    }
    if let Some(u) = username {
        len += 2 + u.len();
    }
    if let Some(p) = password {
        len += 2 + p.len();
    }
    len
}

/// Serialize a CONNECT packet.
#[allow(clippy::too_many_arguments)]
pub fn encode_connect(
    buf: &mut [u8],
    protocol_level: u8,
    client_id: &str,
    clean_session: bool,
    keep_alive_seconds: u16,
    will: Option<&Will>,
    username: Option<&str>,
    password: Option<&[u8]>,
) -> Result<usize, CodecError> {
    let remaining_length = connect_remaining_length(client_id, will, username, password);

    let mut w = Writer::new(buf);
    w.put_u8((PacketType::Connect as u8) << 4)?;
    w.put_remaining_length(remaining_length as u32)?;

    w.put_length_prefixed(PROTOCOL_NAME)?;
    w.put_u8(protocol_level)?;

    let mut flags = 0u8;
    if clean_session {
        flags |= 0x02;
    }
    if let Some(w_) = will {
        flags |= 0x04;
        flags |= (w_.qos as u8) << 3;
        if w_.retain {
            flags |= 0x20;
        }
    }
    if username.is_some() {
        flags |= 0x80;
    }
    if password.is_some() {
        flags |= 0x40;
    }
    w.put_u8(flags)?;
    w.put_u16(keep_alive_seconds)?;

    w.put_length_prefixed(client_id.as_bytes())?;
    if let Some(w_) = will {
        w.put_length_prefixed(w_.topic.as_bytes())?;
        w.put_length_prefixed(w_.message)?;
    }
    if let Some(u) = username {
        w.put_length_prefixed(u.as_bytes())?;
    }
    if let Some(p) = password {
        w.put_length_prefixed(p)?;
    }

    Ok(w.position())
}

/// CONNACK return codes as defined by MQTT 3.1.1.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnAckReturnCode {
    /// Connection accepted.
    Accepted = 0,
    /// The broker does not support the requested protocol level.
    UnacceptableProtocolVersion = 1,
    /// The client identifier was rejected.
    IdentifierRejected = 2,
    /// The broker is unavailable.
    ServerUnavailable = 3,
    /// Username or password is malformed.
    BadUsernameOrPassword = 4,
    /// The client is not authorized to connect.
    NotAuthorized = 5,
}

impl TryFrom<u8> for ConnAckReturnCode {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnAckReturnCode::Accepted),
            1 => Ok(ConnAckReturnCode::UnacceptableProtocolVersion),
            2 => Ok(ConnAckReturnCode::IdentifierRejected),
            3 => Ok(ConnAckReturnCode::ServerUnavailable),
            4 => Ok(ConnAckReturnCode::BadUsernameOrPassword),
            5 => Ok(ConnAckReturnCode::NotAuthorized),
            _ => Err(CodecError::Malformed),
        }
    }
}

/// A decoded CONNACK.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ConnAck {
    /// Whether the broker resumed an existing session.
    pub session_present: bool,
    /// The broker's connect result.
    pub return_code: ConnAckReturnCode,
}

/// Decode a CONNACK body (the two bytes after the fixed header).
pub fn decode_connack(body: &[u8]) -> Result<ConnAck, CodecError> {
    if body.len() != 2 {
        return Err(CodecError::Malformed);
    }
    Ok(ConnAck {
        session_present: body[0] & 0x01 != 0,
        return_code: ConnAckReturnCode::try_from(body[1])?,
    })
}

/// A decoded inbound PUBLISH.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Publish<'a> {
    /// The topic the message was published to.
    pub topic: &'a str,
    /// The message payload.
    pub payload: &'a [u8],
    /// Delivery QoS for this message.
    pub qos: QoS,
    /// Set if the broker has sent this message before (retry).
    pub dup: bool,
    /// Set if the broker is replaying a retained message.
    pub retain: bool,
    /// Present for QoS 1 and 2.
    pub packet_id: Option<u16>,
}

/// Decode a PUBLISH body. `flags` is the fixed header's low nibble.
pub fn decode_publish<'a>(flags: u8, body: &'a [u8]) -> Result<Publish<'a>, CodecError> {
    let dup = flags & 0x08 != 0;
    let qos = QoS::try_from((flags >> 1) & 0x03)?;
    let retain = flags & 0x01 != 0;

    if body.len() < 2 {
        return Err(CodecError::Malformed);
    }
    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let mut pos = 2 + topic_len;
    if pos > body.len() {
        return Err(CodecError::Malformed);
    }
    let topic = core::str::from_utf8(&body[2..pos]).map_err(|_| CodecError::Malformed)?;

    let packet_id = if qos != QoS::AtMostOnce {
        if pos + 2 > body.len() {
            return Err(CodecError::Malformed);
        }
        let id = u16::from_be_bytes([body[pos], body[pos + 1]]);
        pos += 2;
        Some(id)
    } else {
        None
    };

    Ok(Publish {
        topic,
        payload: &body[pos..],
        qos,
        dup,
        retain,
        packet_id,
    })
}

/// Serialize a PUBLISH packet.
pub fn encode_publish(
    buf: &mut [u8],
    topic: &str,
    payload: &[u8],
    qos: QoS,
    dup: bool,
    retain: bool,
    packet_id: Option<u16>,
) -> Result<usize, CodecError> {
    let remaining_length =
        2 + topic.len() + if qos != QoS::AtMostOnce { 2 } else { 0 } + payload.len();

    let mut w = Writer::new(buf);
    let mut header = (PacketType::Publish as u8) << 4;
    if dup {
        header |= 0x08;
    }
    header |= (qos as u8) << 1;
    if retain {
        header |= 0x01;
    }
    w.put_u8(header)?;
    w.put_remaining_length(remaining_length as u32)?;

    w.put_length_prefixed(topic.as_bytes())?;
    if qos != QoS::AtMostOnce {
        let id = packet_id.ok_or(CodecError::Malformed)?;
        w.put_u16(id)?;
    }
    w.put_bytes(payload)?;

    Ok(w.position())
}

fn encode_packet_id_only(buf: &mut [u8], ty: PacketType, packet_id: u16) -> Result<usize, CodecError> {
    let mut w = Writer::new(buf);
    let header = match ty {
        PacketType::Pubrel => ((ty as u8) << 4) | 0x02,
        _ => (ty as u8) << 4,
    };
    w.put_u8(header)?;
    w.put_remaining_length(2)?;
    w.put_u16(packet_id)?;
    Ok(w.position())
}

fn decode_packet_id_only(body: &[u8]) -> Result<u16, CodecError> {
    if body.len() != 2 {
        return Err(CodecError::Malformed);
    }
    Ok(u16::from_be_bytes([body[0], body[1]]))
}

/// Serialize a PUBACK packet.
pub fn encode_puback(buf: &mut [u8], packet_id: u16) -> Result<usize, CodecError> {
    encode_packet_id_only(buf, PacketType::Puback, packet_id)
}

/// Decode a PUBACK body.
pub fn decode_puback(body: &[u8]) -> Result<u16, CodecError> {
    decode_packet_id_only(body)
}

/// Serialize a PUBREC packet.
pub fn encode_pubrec(buf: &mut [u8], packet_id: u16) -> Result<usize, CodecError> {
    encode_packet_id_only(buf, PacketType::Pubrec, packet_id)
}

/// Decode a PUBREC body.
pub fn decode_pubrec(body: &[u8]) -> Result<u16, CodecError> {
    decode_packet_id_only(body)
}

/// Serialize a PUBREL packet. PUBREL's fixed header reserves flags `0b0010`.
pub fn encode_pubrel(buf: &mut [u8], packet_id: u16) -> Result<usize, CodecError> {
    encode_packet_id_only(buf, PacketType::Pubrel, packet_id)
}

/// Decode a PUBREL body.
pub fn decode_pubrel(body: &[u8]) -> Result<u16, CodecError> {
    decode_packet_id_only(body)
}

/// Serialize a PUBCOMP packet.
pub fn encode_pubcomp(buf: &mut [u8], packet_id: u16) -> Result<usize, CodecError> {
    encode_packet_id_only(buf, PacketType::Pubcomp, packet_id)
}

/// Decode a PUBCOMP body.
pub fn decode_pubcomp(body: &[u8]) -> Result<u16, CodecError> {
    decode_packet_id_only(body)
}

/// Serialize a SUBSCRIBE packet requesting a single topic filter.
pub fn encode_subscribe(
    buf: &mut [u8],
    packet_id: u16,
    filter: &str,
    qos: QoS,
) -> Result<usize, CodecError> {
    let remaining_length = 2 + 2 + filter.len() + 1;

    let mut w = Writer::new(buf);
    w.put_u8(((PacketType::Subscribe as u8) << 4) | 0x02)?;
    w.put_remaining_length(remaining_length as u32)?;
    w.put_u16(packet_id)?;
    w.put_length_prefixed(filter.as_bytes())?;
    w.put_u8(qos as u8)?;

    Ok(w.position())
}

/// The broker's response to a single-filter SUBSCRIBE.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SubscribeResult {
    /// The subscription was accepted at the given QoS.
    Granted(QoS),
    /// The broker rejected the subscription (`0x80`).
    Failure,
}

/// A decoded SUBACK (single filter).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SubAck {
    /// Echoes the packet id from the SUBSCRIBE.
    pub packet_id: u16,
    /// The granted QoS, or rejection.
    pub result: SubscribeResult,
}

/// Decode a SUBACK body for a single-filter subscription.
pub fn decode_suback(body: &[u8]) -> Result<SubAck, CodecError> {
    if body.len() != 3 {
        return Err(CodecError::Malformed);
    }
    let packet_id = u16::from_be_bytes([body[0], body[1]]);
    let result = match body[2] {
        0x80 => SubscribeResult::Failure,
        code => SubscribeResult::Granted(QoS::try_from(code)?),
    };
    Ok(SubAck { packet_id, result })
}

/// Serialize an UNSUBSCRIBE packet for a single topic filter.
pub fn encode_unsubscribe(buf: &mut [u8], packet_id: u16, filter: &str) -> Result<usize, CodecError> {
    let remaining_length = 2 + 2 + filter.len();

    let mut w = Writer::new(buf);
    w.put_u8(((PacketType::Unsubscribe as u8) << 4) | 0x02)?;
    w.put_remaining_length(remaining_length as u32)?;
    w.put_u16(packet_id)?;
    w.put_length_prefixed(filter.as_bytes())?;

    Ok(w.position())
}

/// Decode an UNSUBACK body.
pub fn decode_unsuback(body: &[u8]) -> Result<u16, CodecError> {
    decode_packet_id_only(body)
}

/// Serialize a PINGREQ packet (empty body).
pub fn encode_pingreq(buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut w = Writer::new(buf);
    w.put_u8((PacketType::Pingreq as u8) << 4)?;
    w.put_remaining_length(0)?;
    Ok(w.position())
}

/// Serialize a DISCONNECT packet (empty body).
pub fn encode_disconnect(buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut w = Writer::new(buf);
    w.put_u8((PacketType::Disconnect as u8) << 4)?;
    w.put_remaining_length(0)?;
    Ok(w.position())
}
