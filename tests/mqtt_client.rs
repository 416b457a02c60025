//! End-to-end session-engine tests driven by a scripted in-memory transport
//! and a manually-advanced timer, per the scenarios worked through in
//! `SPEC_FULL.md` section 8. No network access; every broker response is
//! queued into the mock transport ahead of the call that consumes it.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_mqtt::network::application::mqtt::packet::{self, ConnAckReturnCode, QoS, SubscribeResult};
use embedded_mqtt::network::application::mqtt::{
    Client, ClientError, ConnectOptions, Message, SpinRawMutex, Timer, Transport,
};

thread_local! {
    static CLOCK_MS: Cell<u32> = Cell::new(0);
}

fn advance_clock(ms: u32) {
    CLOCK_MS.with(|c| c.set(c.get() + ms));
}

/// A countdown whose notion of "now" is a test-controlled virtual clock
/// rather than a wall clock, so idle periods and keep-alive expiry are
/// exercised deterministically instead of by sleeping in the test.
#[derive(Debug, Default)]
struct FakeTimer {
    expiry: Option<u32>,
}

impl Timer for FakeTimer {
    fn arm(&mut self, ms: u32) {
        let now = CLOCK_MS.with(|c| c.get());
        self.expiry = Some(now.saturating_add(ms));
    }

    fn remaining_ms(&self) -> u32 {
        let now = CLOCK_MS.with(|c| c.get());
        match self.expiry {
            Some(exp) => exp.saturating_sub(now),
            None => 0,
        }
    }
}

#[derive(Default)]
struct MockState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
}

/// A byte-oriented transport backed by a shared in-memory queue: bytes
/// queued into `inbound` (from the test's handle) are handed out to the
/// engine's reads, and every write is appended to `outbound` for inspection.
/// Cloning shares the same underlying queues, so the test keeps a handle
/// alongside the one moved into the [`Client`].
#[derive(Clone, Default)]
struct MockTransport(Rc<RefCell<MockState>>);

impl MockTransport {
    fn queue(&self, bytes: &[u8]) {
        self.0.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    fn outbound_len(&self) -> usize {
        self.0.borrow().outbound.len()
    }

    fn outbound_since(&self, start: usize) -> Vec<u8> {
        self.0.borrow().outbound[start..].to_vec()
    }
}

impl Transport for MockTransport {
    type Error = ();

    fn connect(&mut self, _host: &str, _port: u16) -> Result<(), Self::Error> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _deadline_ms: u32) -> Result<usize, Self::Error> {
        let mut state = self.0.borrow_mut();
        let n = buf.len().min(state.inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.inbound.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8], _deadline_ms: u32) -> Result<usize, Self::Error> {
        self.0.borrow_mut().outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

fn connack_bytes(session_present: bool, return_code: u8) -> [u8; 4] {
    [0x20, 0x02, session_present as u8, return_code]
}

fn suback_bytes(packet_id: u16, result: u8) -> [u8; 5] {
    let [hi, lo] = packet_id.to_be_bytes();
    [0x90, 0x03, hi, lo, result]
}

type TestClient<'a> = Client<'a, MockTransport, FakeTimer, SpinRawMutex>;

fn new_client<'a>(send_buf: &'a mut [u8], recv_buf: &'a mut [u8]) -> (TestClient<'a>, MockTransport) {
    let transport = MockTransport::default();
    let handle = transport.clone();
    (Client::new(transport, send_buf, recv_buf, SpinRawMutex::default()), handle)
}

fn connect_accepted(client: &mut TestClient<'_>, transport: &MockTransport, keep_alive_seconds: u16) {
    transport.queue(&connack_bytes(false, 0));
    let mut options = ConnectOptions::new("device-1");
    options.keep_alive_seconds = keep_alive_seconds;
    let result = client.connect("broker.example.com", 1883, &options).unwrap();
    assert_eq!(result.return_code, ConnAckReturnCode::Accepted);
    assert!(!result.session_present);
}

#[test]
fn scenario_a_qos0_publish_round_trip() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, transport) = new_client(&mut send_buf, &mut recv_buf);
    connect_accepted(&mut client, &transport, 60);

    let before = transport.outbound_len();
    client.publish("t", b"hi", QoS::AtMostOnce, false).unwrap();
    let written = transport.outbound_since(before);

    let mut expected = [0u8; 16];
    let n = packet::encode_publish(&mut expected, "t", b"hi", QoS::AtMostOnce, false, false, None).unwrap();
    assert_eq!(written, expected[..n]);
}

#[test]
fn scenario_b_qos1_publish_waits_for_puback() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, transport) = new_client(&mut send_buf, &mut recv_buf);
    connect_accepted(&mut client, &transport, 60);

    let mut puback = [0u8; 8];
    let n = packet::encode_puback(&mut puback, 1).unwrap();
    transport.queue(&puback[..n]);

    let before = transport.outbound_len();
    client.publish("t", b"hi", QoS::AtLeastOnce, false).unwrap();
    let written = transport.outbound_since(before);

    let mut expected = [0u8; 16];
    let m = packet::encode_publish(&mut expected, "t", b"hi", QoS::AtLeastOnce, false, false, Some(1)).unwrap();
    assert_eq!(written, expected[..m]);
}

#[test]
fn scenario_c_qos2_publish_runs_full_handshake() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, transport) = new_client(&mut send_buf, &mut recv_buf);
    connect_accepted(&mut client, &transport, 60);

    // Both broker replies are queued up front: the engine answers PUBREC
    // with PUBREL inside the same `waitfor` loop that is still looking for
    // PUBCOMP, so nothing needs to be injected mid-flight.
    let mut pubrec = [0u8; 8];
    let n = packet::encode_pubrec(&mut pubrec, 1).unwrap();
    let mut pubcomp = [0u8; 8];
    let m = packet::encode_pubcomp(&mut pubcomp, 1).unwrap();
    transport.queue(&pubrec[..n]);
    transport.queue(&pubcomp[..m]);

    let before = transport.outbound_len();
    client.publish("t", b"hi", QoS::ExactlyOnce, false).unwrap();
    let written = transport.outbound_since(before);

    let mut expected_publish = [0u8; 16];
    let p = packet::encode_publish(&mut expected_publish, "t", b"hi", QoS::ExactlyOnce, false, false, Some(1)).unwrap();
    let mut expected_pubrel = [0u8; 8];
    let r = packet::encode_pubrel(&mut expected_pubrel, 1).unwrap();

    assert_eq!(written[..p], expected_publish[..p]);
    assert_eq!(written[p..p + r], expected_pubrel[..r]);
}

#[test]
fn scenario_d_subscribe_then_dispatch_sends_puback() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, transport) = new_client(&mut send_buf, &mut recv_buf);
    connect_accepted(&mut client, &transport, 60);

    transport.queue(&suback_bytes(1, 1));

    let received: RefCell<Vec<(String, Vec<u8>)>> = RefCell::new(Vec::new());
    let mut on_message = |msg: &Message| {
        received.borrow_mut().push((msg.topic.to_string(), msg.payload.to_vec()));
    };
    let result = client
        .subscribe("sensors/+/temp", QoS::AtLeastOnce, &mut on_message)
        .unwrap();
    assert_eq!(result, SubscribeResult::Granted(QoS::AtLeastOnce));

    let mut publish = [0u8; 32];
    let n = packet::encode_publish(&mut publish, "sensors/42/temp", b"21", QoS::AtLeastOnce, false, false, Some(9)).unwrap();
    transport.queue(&publish[..n]);

    let before = transport.outbound_len();
    client.yield_now(10).unwrap();
    assert!(client.is_connected());
    let written = transport.outbound_since(before);

    assert_eq!(received.borrow().len(), 1);
    assert_eq!(received.borrow()[0].0, "sensors/42/temp");
    assert_eq!(received.borrow()[0].1, b"21");

    let mut expected = [0u8; 8];
    let m = packet::encode_puback(&mut expected, 9).unwrap();
    assert_eq!(written, expected[..m]);
}

#[test]
fn scenario_g_qos2_inbound_completion_invokes_handler_once() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, transport) = new_client(&mut send_buf, &mut recv_buf);
    connect_accepted(&mut client, &transport, 60);

    transport.queue(&suback_bytes(1, 2));
    let call_count = Cell::new(0u32);
    let mut on_message = |_msg: &Message| call_count.set(call_count.get() + 1);
    client
        .subscribe("sensors/+/temp", QoS::ExactlyOnce, &mut on_message)
        .unwrap();

    let mut publish = [0u8; 32];
    let n = packet::encode_publish(&mut publish, "sensors/42/temp", b"21", QoS::ExactlyOnce, false, false, Some(7)).unwrap();
    transport.queue(&publish[..n]);
    let before = transport.outbound_len();
    client.yield_now(10).unwrap();
    let pubrec_written = transport.outbound_since(before);
    let mut expected_pubrec = [0u8; 8];
    let m = packet::encode_pubrec(&mut expected_pubrec, 7).unwrap();
    assert_eq!(pubrec_written, expected_pubrec[..m]);
    assert_eq!(call_count.get(), 1);

    let mut pubrel = [0u8; 8];
    let r = packet::encode_pubrel(&mut pubrel, 7).unwrap();
    transport.queue(&pubrel[..r]);
    let before = transport.outbound_len();
    client.yield_now(10).unwrap();
    let pubcomp_written = transport.outbound_since(before);
    let mut expected_pubcomp = [0u8; 8];
    let c = packet::encode_pubcomp(&mut expected_pubcomp, 7).unwrap();
    assert_eq!(pubcomp_written, expected_pubcomp[..c]);

    // The handler only fires on the original PUBLISH, never again on PUBREL.
    assert_eq!(call_count.get(), 1);
}

#[test]
fn unsubscribe_clears_handler_even_when_unsuback_never_arrives() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, transport) = new_client(&mut send_buf, &mut recv_buf);
    connect_accepted(&mut client, &transport, 60);

    transport.queue(&suback_bytes(1, 0));
    let call_count = Cell::new(0u32);
    let mut on_message = |_msg: &Message| call_count.set(call_count.get() + 1);
    client
        .subscribe("status", QoS::AtMostOnce, &mut on_message)
        .unwrap();

    // No UNSUBACK queued: the broker never answers, so `waitfor` reports
    // connection loss, yet the handler table is still cleared per
    // SPEC_FULL.md section 4.9's unconditional-clear rule.
    let result = client.unsubscribe("status");
    assert_eq!(result, Err(ClientError::ConnectionLost));

    let mut publish = [0u8; 16];
    let n = packet::encode_publish(&mut publish, "status", b"x", QoS::AtMostOnce, false, false, None).unwrap();
    transport.queue(&publish[..n]);
    client.yield_now(10).unwrap();
    assert_eq!(call_count.get(), 0);
}

#[test]
fn commands_before_connect_return_not_connected() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, _transport) = new_client(&mut send_buf, &mut recv_buf);

    assert!(!client.is_connected());
    let mut on_message = |_msg: &Message| {};
    assert_eq!(
        client.subscribe("t", QoS::AtMostOnce, &mut on_message),
        Err(ClientError::NotConnected)
    );
    assert_eq!(client.unsubscribe("t"), Err(ClientError::NotConnected));
    assert_eq!(
        client.publish("t", b"x", QoS::AtMostOnce, false),
        Err(ClientError::NotConnected)
    );
}

#[test]
fn scenario_e_keep_alive_pingreq_leaves_session_connected() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, transport) = new_client(&mut send_buf, &mut recv_buf);
    connect_accepted(&mut client, &transport, 1);

    advance_clock(1_001);
    let before = transport.outbound_len();
    // The keep-alive timer has expired with nothing queued to read: a
    // PINGREQ goes out, and the idle cycle that follows it is clean since
    // `pingresp_timer` has not expired yet.
    let result = client.yield_now(10);
    assert_eq!(result, Ok(()));
    assert!(client.is_connected());

    let written = transport.outbound_since(before);
    let mut expected = [0u8; 8];
    let n = packet::encode_pingreq(&mut expected).unwrap();
    assert_eq!(written, expected[..n]);
}

#[test]
fn scenario_f_keep_alive_timeout_without_pingresp_loses_connection() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, transport) = new_client(&mut send_buf, &mut recv_buf);
    connect_accepted(&mut client, &transport, 1);

    advance_clock(1_001);
    client.yield_now(10).unwrap();
    assert!(client.is_connected());

    // No PINGRESP ever arrives; once `pingresp_timer` itself expires the
    // next yield reports the session as dead.
    advance_clock(embedded_mqtt::network::application::mqtt::DEFAULT_COMMAND_TIMEOUT_MS + 1);
    let result = client.yield_now(10);
    assert_eq!(result, Err(ClientError::ConnectionLost));
    assert!(!client.is_connected());
}

#[test]
fn packet_ids_increment_across_successive_qos1_publishes() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, transport) = new_client(&mut send_buf, &mut recv_buf);
    connect_accepted(&mut client, &transport, 60);

    for expected_id in 1u16..=3 {
        let mut puback = [0u8; 8];
        let n = packet::encode_puback(&mut puback, expected_id).unwrap();
        transport.queue(&puback[..n]);

        let before = transport.outbound_len();
        client.publish("t", b"x", QoS::AtLeastOnce, false).unwrap();
        let written = transport.outbound_since(before);

        let mut expected = [0u8; 16];
        let m = packet::encode_publish(&mut expected, "t", b"x", QoS::AtLeastOnce, false, false, Some(expected_id)).unwrap();
        assert_eq!(written, expected[..m]);
    }
}

#[test]
fn connect_rejection_surfaces_return_code_without_panicking() {
    let mut send_buf = [0u8; 128];
    let mut recv_buf = [0u8; 128];
    let (mut client, transport) = new_client(&mut send_buf, &mut recv_buf);

    transport.queue(&connack_bytes(false, 5));
    let options = ConnectOptions::new("device-1");
    let result = client.connect("broker.example.com", 1883, &options).unwrap();
    assert_eq!(result.return_code, ConnAckReturnCode::NotAuthorized);
    assert!(!client.is_connected());
}
