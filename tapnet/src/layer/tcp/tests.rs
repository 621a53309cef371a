//! Tcp layer tests.
//!
//! For the lack of proper end-to-end connection testing we instead play the peer by hand: inbound
//! segments are built with the wire representation and everything the endpoint answers is
//! recorded in place of the ip layer.
use crate::layer::{ip, Error, Result};
use crate::time::{Duration, Instant};
use crate::wire::{tcp_packet, IpProtocol, Ipv4Address, Ipv4Repr, TcpFlags, TcpRepr, TcpSeqNumber};

use super::{Endpoint, FourTuple, IsnGenerator, State, DEFAULT_MSL, RTO_INITIAL};

const IP_ADDR_HOST: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
const IP_ADDR_PEER: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);
const HOST_PORT: u16 = 50000;
const PEER_PORT: u16 = 80;
const PEER_ISS: TcpSeqNumber = TcpSeqNumber(7000);

/// Records all segments instead of writing them.
#[derive(Default)]
struct Recorder {
    sent: Vec<(ip::Socket, Vec<u8>)>,
    /// Refuse every segment, like an ip layer without room for another pending datagram.
    exhausted: bool,
}

impl ip::Send for Recorder {
    fn send(&mut self, socket: ip::Socket, payload: &[u8]) -> Result<ip::Delivery> {
        assert_eq!(socket.protocol, IpProtocol::Tcp);
        if self.exhausted {
            return Err(Error::Exhausted)
        }
        self.sent.push((socket, payload.to_vec()));
        Ok(ip::Delivery::Sent(payload.len()))
    }
}

impl Recorder {
    /// Parse and remove all recorded segments.
    fn segments(&mut self) -> Vec<(TcpRepr, Vec<u8>)> {
        self.sent.drain(..)
            .map(|(socket, bytes)| {
                let packet = tcp_packet::new_checked(&bytes).unwrap();
                let repr = TcpRepr::parse(packet, socket.src_addr, socket.dst_addr).unwrap();
                (repr, packet.payload_slice().to_vec())
            })
            .collect()
    }

    /// Parse and remove the only recorded segment.
    fn single(&mut self) -> (TcpRepr, Vec<u8>) {
        let mut segments = self.segments();
        assert_eq!(segments.len(), 1, "expected exactly one segment: {:?}", segments);
        segments.remove(0)
    }
}

fn endpoint() -> Endpoint {
    Endpoint::new(1460, 64240, DEFAULT_MSL)
        .with_isn(IsnGenerator::from_key(0x0123, 0x4567))
}

fn flags(syn: bool, fin: bool, rst: bool) -> TcpFlags {
    let mut flags = TcpFlags::default();
    flags.set_syn(syn);
    flags.set_fin(fin);
    flags.set_rst(rst);
    flags
}

/// A segment of the peer.
fn peer(
    (src_port, dst_port): (u16, u16),
    flags: TcpFlags,
    seq_number: TcpSeqNumber,
    ack_number: Option<TcpSeqNumber>,
) -> TcpRepr {
    TcpRepr {
        src_port,
        dst_port,
        flags,
        seq_number,
        ack_number,
        window_len: 64240,
        window_scale: None,
        max_seg_size: None,
        sack_permitted: false,
        timestamp: None,
        payload_len: 0,
    }
}

/// Hand a segment of the peer to the endpoint.
fn deliver(tcp: &mut Endpoint, ip: &mut Recorder, mut repr: TcpRepr, payload: &[u8], now: Instant)
    -> Result<()>
{
    repr.payload_len = payload.len() as u16;
    let mut bytes = vec![0; repr.buffer_len()];
    let packet = tcp_packet::new_unchecked_mut(&mut bytes);
    repr.emit(packet);
    packet.payload_mut_slice().copy_from_slice(payload);
    packet.fill_checksum(IP_ADDR_PEER, IP_ADDR_HOST);

    let header = Ipv4Repr {
        src_addr: IP_ADDR_PEER,
        dst_addr: IP_ADDR_HOST,
        protocol: IpProtocol::Tcp,
        payload_len: bytes.len(),
        hop_limit: 64,
        ident: 0,
    };
    tcp.receive(&header, &bytes, ip, now)
}

/// Actively open a connection and complete the handshake at 10ms.
///
/// Returns the tuple and our initial sequence number.
fn establish(tcp: &mut Endpoint, ip: &mut Recorder) -> (FourTuple, TcpSeqNumber) {
    let tuple = tcp.connect(IP_ADDR_HOST, IP_ADDR_PEER, HOST_PORT, PEER_PORT, ip, Instant::from_millis(0))
        .unwrap();
    let (syn, _) = ip.single();
    let iss = syn.seq_number;

    let mut synack = peer((PEER_PORT, HOST_PORT), flags(true, false, false), PEER_ISS, Some(iss + 1));
    synack.max_seg_size = Some(1460);
    deliver(tcp, ip, synack, &[], Instant::from_millis(10)).unwrap();
    ip.sent.clear();
    (tuple, iss)
}

/// An acknowledgement of the peer on an established connection.
fn peer_ack(seq: TcpSeqNumber, ack: TcpSeqNumber) -> TcpRepr {
    peer((PEER_PORT, HOST_PORT), TcpFlags::default(), seq, Some(ack))
}

#[test]
fn establish_active() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();

    let tuple = tcp.connect(IP_ADDR_HOST, IP_ADDR_PEER, HOST_PORT, PEER_PORT, &mut ip, Instant::from_millis(0))
        .unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::SynSent));

    let (syn, payload) = ip.single();
    assert!(syn.flags.syn());
    assert!(!syn.flags.ack());
    assert_eq!(syn.ack_number, None);
    assert_eq!(syn.max_seg_size, Some(1460));
    assert_eq!((syn.src_port, syn.dst_port), (HOST_PORT, PEER_PORT));
    assert!(payload.is_empty());
    let iss = syn.seq_number;

    let synack = peer((PEER_PORT, HOST_PORT), flags(true, false, false), PEER_ISS, Some(iss + 1));
    deliver(&mut tcp, &mut ip, synack, &[], Instant::from_millis(10)).unwrap();

    let connection = tcp.get(&tuple).unwrap();
    assert_eq!(connection.state(), State::Established);
    assert_eq!(connection.recv.next, PEER_ISS + 1);
    assert_eq!(connection.recv.initial_seq, Some(PEER_ISS));
    assert_eq!(connection.send.unacked, iss + 1);
    assert!(connection.write_queue().is_empty());
    assert_eq!(connection.rto_expires, None);
    // Without option the peer admits 536 bytes.
    assert_eq!(connection.mss, 536);
    assert_eq!(connection.congestion_window, 4 * 536);

    let (ack, payload) = ip.single();
    assert!(!ack.flags.syn());
    assert!(!ack.flags.fin());
    assert_eq!(ack.seq_number, iss + 1);
    assert_eq!(ack.ack_number, Some(PEER_ISS + 1));
    assert!(payload.is_empty());
}

#[test]
fn refused_in_syn_sent() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();

    let tuple = tcp.connect(IP_ADDR_HOST, IP_ADDR_PEER, HOST_PORT, PEER_PORT, &mut ip, Instant::from_millis(0))
        .unwrap();
    let (syn, _) = ip.single();

    let rst = peer((PEER_PORT, HOST_PORT), flags(false, false, true), TcpSeqNumber(0), Some(syn.seq_number + 1));
    assert_eq!(deliver(&mut tcp, &mut ip, rst, &[], Instant::from_millis(5)), Err(Error::PeerRefused));
    assert!(ip.sent.is_empty());
    assert_eq!(tcp.state(&tuple), None);
    assert_eq!(tcp.send(&tuple, b"x", &mut ip, Instant::from_millis(6)), Err(Error::PeerRefused));
    assert_eq!(tcp.send(&tuple, b"x", &mut ip, Instant::from_millis(7)), Err(Error::InvalidHandle));
}

#[test]
fn unacceptable_ack_in_syn_sent() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();

    let tuple = tcp.connect(IP_ADDR_HOST, IP_ADDR_PEER, HOST_PORT, PEER_PORT, &mut ip, Instant::from_millis(0))
        .unwrap();
    let (syn, _) = ip.single();
    let bogus = syn.seq_number + 1000;

    let synack = peer((PEER_PORT, HOST_PORT), flags(true, false, false), PEER_ISS, Some(bogus));
    deliver(&mut tcp, &mut ip, synack, &[], Instant::from_millis(5)).unwrap();

    let (rst, _) = ip.single();
    assert!(rst.flags.rst());
    assert_eq!(rst.seq_number, bogus);
    assert_eq!(tcp.state(&tuple), Some(State::SynSent));
}

#[test]
fn retransmit_on_timeout() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);

    let sent_at = Instant::from_millis(1000);
    assert_eq!(tcp.send(&tuple, b"hello", &mut ip, sent_at), Ok(5));
    let (first, payload) = ip.single();
    assert_eq!(first.seq_number, iss + 1);
    assert!(first.flags.psh());
    assert_eq!(payload, b"hello");
    assert_eq!(tcp.get(&tuple).unwrap().rto.rto(), RTO_INITIAL);
    assert_eq!(tcp.get(&tuple).unwrap().rto_expires, Some(sent_at + RTO_INITIAL));

    tcp.slow_timer(&mut ip, sent_at + Duration::from_millis(999));
    assert!(ip.sent.is_empty());

    tcp.slow_timer(&mut ip, sent_at + Duration::from_millis(1000));
    let connection = tcp.get(&tuple).unwrap();
    assert_eq!(connection.rto.rto(), Duration::from_millis(2000));
    assert_eq!(connection.send.next, iss + 6);
    let (again, payload) = ip.single();
    assert_eq!(again, first);
    assert_eq!(payload, b"hello");

    // An acknowledgement of a retransmission is no round trip sample.
    let srtt = connection.rto.srtt();
    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 1, iss + 6), &[], Instant::from_millis(2500)).unwrap();
    let connection = tcp.get(&tuple).unwrap();
    assert_eq!(connection.rto.srtt(), srtt);
    assert!(connection.write_queue().is_empty());
    assert_eq!(connection.rto_expires, None);
}

#[test]
fn samples_round_trip() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);
    // The handshake took 10ms.
    assert_eq!(tcp.get(&tuple).unwrap().rto.srtt(), Some(Duration::from_millis(10)));

    tcp.send(&tuple, b"data", &mut ip, Instant::from_millis(100)).unwrap();
    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 1, iss + 5), &[], Instant::from_millis(190)).unwrap();

    let rto = tcp.get(&tuple).unwrap().rto;
    // srtt = 7/8 * 10 + 1/8 * 90, rttvar = 3/4 * 5 + 1/4 * 80
    assert_eq!(rto.srtt(), Some(Duration::from_millis(20)));
    assert_eq!(rto.rttvar(), Duration::from_micros(23_750));
    assert_eq!(rto.rto(), Duration::from_millis(1000));
}

#[test]
fn respects_send_window() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();

    let tuple = tcp.connect(IP_ADDR_HOST, IP_ADDR_PEER, HOST_PORT, PEER_PORT, &mut ip, Instant::from_millis(0))
        .unwrap();
    let (syn, _) = ip.single();
    let iss = syn.seq_number;

    let mut synack = peer((PEER_PORT, HOST_PORT), flags(true, false, false), PEER_ISS, Some(iss + 1));
    synack.max_seg_size = Some(10);
    synack.window_len = 20;
    deliver(&mut tcp, &mut ip, synack, &[], Instant::from_millis(10)).unwrap();
    ip.sent.clear();

    let data: Vec<u8> = (0..35).collect();
    assert_eq!(tcp.send(&tuple, &data, &mut ip, Instant::from_millis(20)), Ok(35));
    let segments = ip.segments();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].0.seq_number, iss + 1);
    assert_eq!(segments[0].1, &data[..10]);
    assert_eq!(segments[1].0.seq_number, iss + 11);
    assert_eq!(segments[1].1, &data[10..20]);
    assert_eq!(tcp.get(&tuple).unwrap().write_queue().len(), 4);

    let mut ack = peer_ack(PEER_ISS + 1, iss + 11);
    ack.window_len = 20;
    deliver(&mut tcp, &mut ip, ack, &[], Instant::from_millis(30)).unwrap();
    let (third, payload) = ip.single();
    assert_eq!(third.seq_number, iss + 21);
    assert_eq!(payload, &data[20..30]);
    assert!(!third.flags.psh());

    let mut ack = peer_ack(PEER_ISS + 1, iss + 31);
    ack.window_len = 20;
    deliver(&mut tcp, &mut ip, ack, &[], Instant::from_millis(40)).unwrap();
    let (last, payload) = ip.single();
    assert_eq!(last.seq_number, iss + 31);
    assert_eq!(payload, &data[30..]);
    assert!(last.flags.psh());
}

#[test]
fn graceful_close_by_peer() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);

    let fin = peer((PEER_PORT, HOST_PORT), flags(false, true, false), PEER_ISS + 1, Some(iss + 1));
    deliver(&mut tcp, &mut ip, fin, &[], Instant::from_millis(100)).unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::CloseWait));
    assert_eq!(tcp.get(&tuple).unwrap().recv.next, PEER_ISS + 2);
    let (ack, _) = ip.single();
    assert_eq!(ack.ack_number, Some(PEER_ISS + 2));
    assert!(!ack.flags.fin());

    let mut buffer = [0; 16];
    assert_eq!(tcp.recv(&tuple, &mut buffer), Ok(0));

    tcp.close(&tuple, &mut ip, Instant::from_millis(200)).unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::LastAck));
    let (fin, _) = ip.single();
    assert!(fin.flags.fin());
    assert_eq!(fin.seq_number, iss + 1);
    assert_eq!(fin.ack_number, Some(PEER_ISS + 2));

    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 2, iss + 2), &[], Instant::from_millis(300)).unwrap();
    assert!(ip.sent.is_empty());
    assert!(tcp.get(&tuple).is_none());
    assert_eq!(tcp.state(&tuple), None);
    assert!(tcp.is_empty());

    assert_eq!(tcp.send(&tuple, b"late", &mut ip, Instant::from_millis(400)), Err(Error::Closed));
    assert_eq!(tcp.send(&tuple, b"late", &mut ip, Instant::from_millis(400)), Err(Error::InvalidHandle));
}

#[test]
fn active_close_through_time_wait() {
    let mut tcp = Endpoint::new(1460, 64240, Duration::from_secs(1))
        .with_isn(IsnGenerator::from_key(1, 2));
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);

    tcp.close(&tuple, &mut ip, Instant::from_millis(100)).unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::FinWait1));
    let (fin, _) = ip.single();
    assert!(fin.flags.fin());
    assert_eq!(tcp.send(&tuple, b"late", &mut ip, Instant::from_millis(110)), Err(Error::Illegal));

    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 1, iss + 2), &[], Instant::from_millis(150)).unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::FinWait2));

    let fin = peer((PEER_PORT, HOST_PORT), flags(false, true, false), PEER_ISS + 1, Some(iss + 2));
    deliver(&mut tcp, &mut ip, fin, &[], Instant::from_millis(200)).unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::TimeWait));
    let (ack, _) = ip.single();
    assert_eq!(ack.ack_number, Some(PEER_ISS + 2));

    // A retransmitted FIN is acknowledged again and restarts the wait.
    deliver(&mut tcp, &mut ip, fin, &[], Instant::from_millis(1000)).unwrap();
    let (ack, _) = ip.single();
    assert_eq!(ack.ack_number, Some(PEER_ISS + 2));

    tcp.slow_timer(&mut ip, Instant::from_millis(2999));
    assert_eq!(tcp.state(&tuple), Some(State::TimeWait));
    tcp.slow_timer(&mut ip, Instant::from_millis(3000));
    assert_eq!(tcp.state(&tuple), None);
    assert_eq!(tcp.take_event(&tuple), Some(Error::Closed));
}

#[test]
fn simultaneous_close() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);

    tcp.close(&tuple, &mut ip, Instant::from_millis(100)).unwrap();
    ip.sent.clear();

    // The FIN of the peer crosses ours.
    let fin = peer((PEER_PORT, HOST_PORT), flags(false, true, false), PEER_ISS + 1, Some(iss + 1));
    deliver(&mut tcp, &mut ip, fin, &[], Instant::from_millis(110)).unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::Closing));

    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 2, iss + 2), &[], Instant::from_millis(120)).unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::TimeWait));
}

#[test]
fn receive_in_order_data() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);

    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 1, iss + 1), b"abc", Instant::from_millis(100)).unwrap();
    // The acknowledgement is delayed.
    assert!(ip.sent.is_empty());
    assert!(tcp.get(&tuple).unwrap().delayed_ack);
    assert_eq!(tcp.get(&tuple).unwrap().recv.window, 64240 - 3);

    tcp.fast_timer(&mut ip);
    let (ack, _) = ip.single();
    assert_eq!(ack.ack_number, Some(PEER_ISS + 4));
    assert!(!tcp.get(&tuple).unwrap().delayed_ack);
    tcp.fast_timer(&mut ip);
    assert!(ip.sent.is_empty());

    // Every second segment is acknowledged at once.
    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 4, iss + 1), b"def", Instant::from_millis(200)).unwrap();
    assert!(ip.sent.is_empty());
    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 7, iss + 1), b"gh", Instant::from_millis(210)).unwrap();
    let (ack, _) = ip.single();
    assert_eq!(ack.ack_number, Some(PEER_ISS + 9));

    // A retransmission overlapping received data contributes its new tail.
    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 7, iss + 1), b"ghij", Instant::from_millis(220)).unwrap();

    let mut buffer = [0; 16];
    assert_eq!(tcp.recv(&tuple, &mut buffer), Ok(10));
    assert_eq!(&buffer[..10], b"abcdefghij");
    assert_eq!(tcp.get(&tuple).unwrap().recv.window, 64240);
    assert_eq!(tcp.recv(&tuple, &mut buffer), Err(Error::Exhausted));
}

#[test]
fn data_beyond_next_is_dropped() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);

    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 11, iss + 1), b"later", Instant::from_millis(100)).unwrap();
    let (ack, _) = ip.single();
    assert_eq!(ack.ack_number, Some(PEER_ISS + 1));
    assert_eq!(tcp.get(&tuple).unwrap().readable(), 0);
}

#[test]
fn out_of_window_is_acknowledged() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);

    let stale = peer_ack(PEER_ISS + 100_000, iss + 1);
    assert_eq!(deliver(&mut tcp, &mut ip, stale, b"xyz", Instant::from_millis(100)),
        Err(Error::SequenceOutOfWindow));
    let (ack, _) = ip.single();
    assert_eq!(ack.seq_number, iss + 1);
    assert_eq!(ack.ack_number, Some(PEER_ISS + 1));
    assert_eq!(tcp.state(&tuple), Some(State::Established));

    // Never answer a reset, even an unacceptable one.
    let rst = peer((PEER_PORT, HOST_PORT), flags(false, false, true), PEER_ISS + 100_000, None);
    assert_eq!(deliver(&mut tcp, &mut ip, rst, &[], Instant::from_millis(110)),
        Err(Error::SequenceOutOfWindow));
    assert!(ip.sent.is_empty());
    assert_eq!(tcp.state(&tuple), Some(State::Established));
}

#[test]
fn ack_of_unsent_data() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);

    deliver(&mut tcp, &mut ip, peer_ack(PEER_ISS + 1, iss + 500), &[], Instant::from_millis(100)).unwrap();
    let (ack, _) = ip.single();
    assert_eq!(ack.seq_number, iss + 1);
    assert_eq!(tcp.get(&tuple).unwrap().send.unacked, iss + 1);
}

#[test]
fn reset_by_peer() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, _) = establish(&mut tcp, &mut ip);

    let rst = peer((PEER_PORT, HOST_PORT), flags(false, false, true), PEER_ISS + 1, None);
    assert_eq!(deliver(&mut tcp, &mut ip, rst, &[], Instant::from_millis(100)), Err(Error::PeerReset));
    assert!(ip.sent.is_empty());
    assert_eq!(tcp.state(&tuple), None);

    let mut buffer = [0; 4];
    assert_eq!(tcp.recv(&tuple, &mut buffer), Err(Error::PeerReset));
    assert_eq!(tcp.recv(&tuple, &mut buffer), Err(Error::InvalidHandle));
}

#[test]
fn syn_in_synchronized_state() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);

    let syn = peer((PEER_PORT, HOST_PORT), flags(true, false, false), PEER_ISS + 1, None);
    assert_eq!(deliver(&mut tcp, &mut ip, syn, &[], Instant::from_millis(100)), Err(Error::PeerReset));
    let (rst, _) = ip.single();
    assert!(rst.flags.rst());
    assert_eq!(rst.seq_number, iss + 1);
    assert_eq!(tcp.state(&tuple), None);
}

#[test]
fn closed_port_resets() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();

    // A SYN is answered with RST+ACK covering it.
    let syn = peer((PEER_PORT, HOST_PORT), flags(true, false, false), TcpSeqNumber(100), None);
    assert_eq!(deliver(&mut tcp, &mut ip, syn, &[], Instant::from_millis(0)), Err(Error::NoMatchingConnection));
    let (rst, _) = ip.single();
    assert!(rst.flags.rst());
    assert_eq!(rst.seq_number, TcpSeqNumber(0));
    assert_eq!(rst.ack_number, Some(TcpSeqNumber(101)));
    assert_eq!((rst.src_port, rst.dst_port), (HOST_PORT, PEER_PORT));

    // Data without ACK is covered with its length.
    let data = peer((PEER_PORT, HOST_PORT), TcpFlags::default(), TcpSeqNumber(100), None);
    assert!(deliver(&mut tcp, &mut ip, data, b"12345", Instant::from_millis(0)).is_err());
    let (rst, _) = ip.single();
    assert_eq!(rst.ack_number, Some(TcpSeqNumber(105)));

    // An ACK is answered with a reset at the acknowledged number.
    let ack = peer_ack(TcpSeqNumber(100), TcpSeqNumber(4242));
    assert!(deliver(&mut tcp, &mut ip, ack, &[], Instant::from_millis(0)).is_err());
    let (rst, _) = ip.single();
    assert!(rst.flags.rst());
    assert_eq!(rst.seq_number, TcpSeqNumber(4242));
    assert_eq!(rst.ack_number, None);

    // A reset is never answered.
    let rst = peer((PEER_PORT, HOST_PORT), flags(false, false, true), TcpSeqNumber(100), None);
    assert_eq!(deliver(&mut tcp, &mut ip, rst, &[], Instant::from_millis(0)), Err(Error::NoMatchingConnection));
    assert!(ip.sent.is_empty());
    assert!(tcp.is_empty());
}

#[test]
fn wrong_checksum_is_dropped() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();

    let mut repr = peer((PEER_PORT, HOST_PORT), flags(true, false, false), TcpSeqNumber(100), None);
    repr.payload_len = 0;
    let mut bytes = vec![0; repr.buffer_len()];
    let packet = tcp_packet::new_unchecked_mut(&mut bytes);
    repr.emit(packet);
    packet.fill_checksum(IP_ADDR_PEER, IP_ADDR_HOST);
    bytes[16] ^= 0xff;

    let header = Ipv4Repr {
        src_addr: IP_ADDR_PEER,
        dst_addr: IP_ADDR_HOST,
        protocol: IpProtocol::Tcp,
        payload_len: bytes.len(),
        hop_limit: 64,
        ident: 0,
    };
    assert_eq!(tcp.receive(&header, &bytes, &mut ip, Instant::from_millis(0)), Err(Error::ChecksumMismatch));
    assert!(ip.sent.is_empty());
}

#[test]
fn passive_open() {
    const LISTEN_PORT: u16 = 8080;
    const CLIENT_PORT: u16 = 40000;
    let mut tcp = endpoint();
    let mut ip = Recorder::default();

    assert_eq!(tcp.accept(LISTEN_PORT), Err(Error::InvalidHandle));
    tcp.listen(LISTEN_PORT).unwrap();
    assert_eq!(tcp.listen(LISTEN_PORT), Err(Error::Illegal));

    // A stray ACK on a listening port.
    let stray = peer((CLIENT_PORT, LISTEN_PORT), TcpFlags::default(), TcpSeqNumber(5), Some(TcpSeqNumber(77)));
    assert!(deliver(&mut tcp, &mut ip, stray, &[], Instant::from_millis(0)).is_err());
    let (rst, _) = ip.single();
    assert!(rst.flags.rst());
    assert_eq!(rst.seq_number, TcpSeqNumber(77));
    assert!(tcp.is_empty());

    let mut syn = peer((CLIENT_PORT, LISTEN_PORT), flags(true, false, false), PEER_ISS, None);
    syn.max_seg_size = Some(1000);
    deliver(&mut tcp, &mut ip, syn, &[], Instant::from_millis(10)).unwrap();

    let tuple = FourTuple {
        local_addr: IP_ADDR_HOST,
        remote_addr: IP_ADDR_PEER,
        local_port: LISTEN_PORT,
        remote_port: CLIENT_PORT,
    };
    assert_eq!(tcp.state(&tuple), Some(State::SynReceived));
    let (synack, _) = ip.single();
    assert!(synack.flags.syn());
    assert_eq!(synack.ack_number, Some(PEER_ISS + 1));
    assert_eq!(synack.max_seg_size, Some(1460));
    let iss = synack.seq_number;
    assert_eq!(tcp.accept(LISTEN_PORT), Ok(None));

    // The peer repeats its SYN, our SYN+ACK is repeated as well.
    deliver(&mut tcp, &mut ip, syn, &[], Instant::from_millis(20)).unwrap();
    let (again, _) = ip.single();
    assert_eq!(again, synack);

    // An ACK that does not cover our SYN.
    let early = peer((CLIENT_PORT, LISTEN_PORT), TcpFlags::default(), PEER_ISS + 1, Some(iss));
    deliver(&mut tcp, &mut ip, early, &[], Instant::from_millis(25)).unwrap();
    let (rst, _) = ip.single();
    assert!(rst.flags.rst());
    assert_eq!(tcp.state(&tuple), Some(State::SynReceived));

    let ack = peer((CLIENT_PORT, LISTEN_PORT), TcpFlags::default(), PEER_ISS + 1, Some(iss + 1));
    deliver(&mut tcp, &mut ip, ack, &[], Instant::from_millis(30)).unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::Established));
    assert_eq!(tcp.get(&tuple).unwrap().mss, 1000);
    assert_eq!(tcp.accept(LISTEN_PORT), Ok(Some(tuple)));
    assert_eq!(tcp.accept(LISTEN_PORT), Ok(None));
}

#[test]
fn duplicate_tuple_rejected() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();

    let tuple = tcp.connect(IP_ADDR_HOST, IP_ADDR_PEER, HOST_PORT, PEER_PORT, &mut ip, Instant::from_millis(0))
        .unwrap();
    assert_eq!(
        tcp.open(IP_ADDR_HOST, IP_ADDR_PEER, HOST_PORT, PEER_PORT, Instant::from_millis(1)),
        Err(Error::Illegal));
    assert_eq!(tcp.len(), 1);
    assert_eq!(tcp.state(&tuple), Some(State::SynSent));

    // Another port is fine.
    let other = tcp.open(IP_ADDR_HOST, IP_ADDR_PEER, 0, PEER_PORT, Instant::from_millis(2)).unwrap();
    assert_ne!(other, tuple);
    assert!(super::EPHEMERAL_PORTS.contains(&other.local_port));
    assert_eq!(tcp.state(&other), Some(State::Closed));
    assert_eq!(tcp.len(), 2);
}

#[test]
fn free_is_idempotent() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, _) = establish(&mut tcp, &mut ip);

    assert!(tcp.free(&tuple));
    assert!(!tcp.free(&tuple));
    assert!(tcp.get(&tuple).is_none());
    assert_eq!(tcp.close(&tuple, &mut ip, Instant::from_millis(100)), Err(Error::InvalidHandle));
}

#[test]
fn syn_is_retransmitted() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();

    let tuple = tcp.connect(IP_ADDR_HOST, IP_ADDR_PEER, HOST_PORT, PEER_PORT, &mut ip, Instant::from_millis(0))
        .unwrap();
    let (syn, _) = ip.single();

    // Data waits for the handshake.
    assert_eq!(tcp.send(&tuple, b"early", &mut ip, Instant::from_millis(1)), Ok(5));
    assert!(ip.sent.is_empty());

    tcp.slow_timer(&mut ip, Instant::from_millis(1000));
    let (again, _) = ip.single();
    assert_eq!(again, syn);

    let synack = peer((PEER_PORT, HOST_PORT), flags(true, false, false), PEER_ISS, Some(syn.seq_number + 1));
    deliver(&mut tcp, &mut ip, synack, &[], Instant::from_millis(1100)).unwrap();
    // The bare ACK and then the queued data.
    let segments = ip.segments();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].1, b"");
    assert_eq!(segments[1].0.seq_number, syn.seq_number + 1);
    assert_eq!(segments[1].1, b"early");
    // The SYN was sent twice, no sample was taken.
    assert_eq!(tcp.get(&tuple).unwrap().rto.srtt(), None);

    tcp.close(&tuple, &mut ip, Instant::from_millis(1200)).unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::FinWait1));
}

#[test]
fn close_in_syn_sent_frees() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();

    let tuple = tcp.connect(IP_ADDR_HOST, IP_ADDR_PEER, HOST_PORT, PEER_PORT, &mut ip, Instant::from_millis(0))
        .unwrap();
    tcp.close(&tuple, &mut ip, Instant::from_millis(1)).unwrap();
    assert_eq!(tcp.state(&tuple), None);
    assert_eq!(tcp.close(&tuple, &mut ip, Instant::from_millis(2)), Err(Error::InvalidHandle));
}

#[test]
fn opened_block_resets() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let tuple = tcp.open(IP_ADDR_HOST, IP_ADDR_PEER, HOST_PORT, PEER_PORT, Instant::from_millis(0))
        .unwrap();
    assert_eq!(tcp.state(&tuple), Some(State::Closed));

    let ack = peer_ack(TcpSeqNumber(100), TcpSeqNumber(4242));
    assert_eq!(deliver(&mut tcp, &mut ip, ack, &[], Instant::from_millis(0)), Err(Error::NoMatchingConnection));
    let (rst, _) = ip.single();
    assert!(rst.flags.rst());
    assert_eq!(rst.seq_number, TcpSeqNumber(4242));
    assert_eq!(rst.ack_number, None);

    let syn = peer((PEER_PORT, HOST_PORT), flags(true, false, false), TcpSeqNumber(100), None);
    assert_eq!(deliver(&mut tcp, &mut ip, syn, &[], Instant::from_millis(0)), Err(Error::NoMatchingConnection));
    let (rst, _) = ip.single();
    assert!(rst.flags.rst());
    assert_eq!(rst.ack_number, Some(TcpSeqNumber(101)));

    let rst = peer((PEER_PORT, HOST_PORT), flags(false, false, true), TcpSeqNumber(100), None);
    assert_eq!(deliver(&mut tcp, &mut ip, rst, &[], Instant::from_millis(0)), Err(Error::NoMatchingConnection));
    assert!(ip.sent.is_empty());
    assert_eq!(tcp.state(&tuple), Some(State::Closed));
}

#[test]
fn teardown_without_transmit() {
    let mut tcp = endpoint();
    let mut ip = Recorder::default();
    let (tuple, iss) = establish(&mut tcp, &mut ip);
    ip.exhausted = true;

    // The FIN is processed even though its ACK can not be sent.
    let fin = peer((PEER_PORT, HOST_PORT), flags(false, true, false), PEER_ISS + 1, Some(iss + 1));
    assert_eq!(deliver(&mut tcp, &mut ip, fin, &[], Instant::from_millis(100)), Ok(()));
    assert_eq!(tcp.state(&tuple), Some(State::CloseWait));

    // The reset answering a SYN is lost, the connection is freed regardless.
    let syn = peer((PEER_PORT, HOST_PORT), flags(true, false, false), PEER_ISS + 2, None);
    assert_eq!(deliver(&mut tcp, &mut ip, syn, &[], Instant::from_millis(200)), Err(Error::PeerReset));
    assert!(ip.sent.is_empty());
    assert_eq!(tcp.state(&tuple), None);
    assert_eq!(tcp.take_event(&tuple), Some(Error::PeerReset));
}
