use core::fmt;
use std::collections::VecDeque;

use crate::storage::PacketBuffer;
use crate::time::{Duration, Instant};
use crate::wire::{Ipv4Address, TcpSeqNumber};

use super::timer::RtoEstimator;

/// The identity of a connection.
///
/// Immutable for the lifetime of the connection and the key of the connection registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FourTuple {
    /// Our own address.
    pub local_addr: Ipv4Address,
    /// The address of the peer.
    pub remote_addr: Ipv4Address,
    /// Our own port.
    pub local_port: u16,
    /// The port of the peer.
    pub remote_port: u16,
}

/// The state of a connection.
///
/// Includes current state machine state, the configuration state that is required to stay constant
/// during a connection, and the in- and out-buffers.
#[derive(Clone, Debug)]
pub struct Connection {
    tuple: FourTuple,

    /// The current state of the state machine.
    pub current: State,

    /// Whether the connection was created by a listener.
    pub passive: bool,

    /// The sending state.
    ///
    /// In RFC793 this is referred to as `SND`.
    pub send: Send,

    /// The receiving state.
    ///
    /// In RFC793 this is referred to as `RCV`.
    pub recv: Receive,

    /// The SMSS is the size of the largest segment that the sender can transmit.
    ///
    /// Derived from the device MTU and lowered to the MSS option of the peer, if it sent one.
    /// The size does not include the TCP/IP headers and options.
    pub mss: u16,

    /// The MSS we announce in our SYN.
    local_mss: u16,

    /// The window dictated by congestion, in bytes.
    ///
    /// Keeps the initial value of RFC5681 section 3.1, there is no congestion avoidance.
    pub congestion_window: u32,

    /// The retransmission timeout estimation.
    pub rto: RtoEstimator,

    /// When the oldest outstanding segment is retransmitted.
    ///
    /// `None` while nothing is outstanding.
    pub rto_expires: Option<Instant>,

    /// An acknowledgement is owed to the peer and will be sent by the fast timer.
    pub delayed_ack: bool,

    /// When a connection in `TIME-WAIT` is released.
    pub time_wait_expires: Option<Instant>,

    /// The length of `TIME-WAIT`, twice the maximum segment lifetime.
    pub time_wait: Duration,

    /// Segments not yet fully acknowledged, in sequence order.
    ///
    /// Contains our SYN and FIN as well since they occupy sequence space.
    write_queue: VecDeque<PacketBuffer>,

    /// Data received in order but not yet read by the application.
    read_queue: VecDeque<u8>,

    /// Our FIN has been queued, nothing may be sent after it.
    fin_queued: bool,
}

/// The sequence space of sent data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Send {
    /// The next not yet acknowledged sequence number.
    ///
    /// In RFC793 this is referred to as `SND.UNA`.
    pub unacked: TcpSeqNumber,

    /// The next sequence number to use for transmission.
    ///
    /// In RFC793 this is referred to as `SND.NXT`.
    pub next: TcpSeqNumber,

    /// The send window size indicated by the receiver.
    ///
    /// Must not send packet containing a sequence number beyond `unacked + window`. In RFC793 this
    /// is referred to as `SND.WND`.
    pub window: u32,

    /// The sequence number of the segment last used to update the window.
    ///
    /// In RFC793 this is referred to as `SND.WL1`.
    pub last_window_seq: TcpSeqNumber,

    /// The acknowledgement number of the segment last used to update the window.
    ///
    /// In RFC793 this is referred to as `SND.WL2`.
    pub last_window_ack: TcpSeqNumber,

    /// The initial sequence number.
    ///
    /// In RFC793 this is referred to as `ISS`.
    pub initial_seq: TcpSeqNumber,
}

/// The sequence space of received data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Receive {
    /// The next expected sequence number.
    ///
    /// In RFC793 this is referred to as `RCV.NXT`.
    pub next: TcpSeqNumber,

    /// The receive window size indicated by us.
    ///
    /// Shrinks with data waiting in the read queue. In RFC793 this is referred to as `RCV.WND`.
    pub window: u32,

    /// The initial receive sequence number, learned from the SYN of the peer.
    ///
    /// In RFC793 this is referred to as `IRS`.
    pub initial_seq: Option<TcpSeqNumber>,
}

/// State enum of the statemachine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// Marker state fo an unintended/uninitialized connection state.
    Closed,

    /// A listening connection.
    ///
    /// Akin to an open server socket. Listeners are kept apart from connections, a connection is
    /// never in this state.
    Listen,

    /// An open connection request.
    SynSent,

    /// Connection request we intend to answer, waiting on ack.
    SynReceived,

    /// An open connection.
    Established,

    /// Closed our side of the connection.
    FinWait1,

    /// Closing connection nicely, initiated by us and acknowledged.
    FinWait2,

    /// Closed both sides but we don't know the other knows.
    Closing,

    /// Both sides recognized connection as closed.
    TimeWait,

    /// Other side closed its connection.
    CloseWait,

    /// Connection closed after other side closed its already.
    LastAck,
}

/// The initial congestion window of RFC5681 section 3.1.
pub fn initial_window(mss: u16) -> u32 {
    let mss = u32::from(mss);
    if mss > 2190 {
        2 * mss
    } else if mss > 1095 {
        3 * mss
    } else {
        4 * mss
    }
}

impl Connection {
    /// Initialize a closed connection.
    ///
    /// The raw method is near useless, transition the connection to an appropriate state
    /// afterwards.
    pub fn new(tuple: FourTuple, iss: TcpSeqNumber, mss: u16, receive_window: u32) -> Self {
        Connection {
            tuple,
            current: State::Closed,
            passive: false,
            send: Send {
                unacked: iss,
                next: iss,
                window: 0,
                last_window_seq: TcpSeqNumber::default(),
                last_window_ack: iss,
                initial_seq: iss,
            },
            recv: Receive {
                next: TcpSeqNumber::default(),
                window: receive_window,
                initial_seq: None,
            },
            mss,
            local_mss: mss,
            congestion_window: initial_window(mss),
            rto: RtoEstimator::new(),
            rto_expires: None,
            delayed_ack: false,
            time_wait_expires: None,
            time_wait: Duration::from_secs(60),
            write_queue: VecDeque::new(),
            read_queue: VecDeque::new(),
            fin_queued: false,
        }
    }

    /// The identity of the connection.
    pub fn tuple(&self) -> FourTuple {
        self.tuple
    }

    /// The largest segment our side accepts.
    pub fn local_mss(&self) -> u16 {
        self.local_mss
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.current
    }

    /// Segments awaiting transmission or acknowledgement.
    pub fn write_queue(&self) -> &VecDeque<PacketBuffer> {
        &self.write_queue
    }

    /// The number of received bytes the application has not read yet.
    pub fn readable(&self) -> usize {
        self.read_queue.len()
    }

    /// Whether our FIN was queued.
    pub fn fin_queued(&self) -> bool {
        self.fin_queued
    }

    /// Whether our FIN was queued and everything up to it acknowledged.
    pub fn fin_acked(&self) -> bool {
        self.fin_queued && self.write_queue.is_empty()
    }

    /// Whether the peer closed its side of the connection.
    pub fn peer_closed(&self) -> bool {
        match self.current {
            State::CloseWait | State::LastAck | State::Closing | State::TimeWait => true,
            _ => false,
        }
    }

    /// Learn the MSS option of the peer and set the congestion window accordingly.
    ///
    /// Without option the peer accepts at least 536 bytes [RFC1122].
    pub fn negotiate(&mut self, peer_mss: Option<u16>) {
        let peer_mss = peer_mss.unwrap_or(536);
        self.mss = self.mss.min(peer_mss).max(1);
        self.congestion_window = initial_window(self.mss);
    }

    /// The segment acceptance test of RFC793, section 3.3.
    ///
    /// `len` is the length of the segment in sequence space.
    pub fn is_acceptable(&self, seq: TcpSeqNumber, len: usize) -> bool {
        let next = self.recv.next;
        let window = self.recv.window as usize;
        let in_window = |seq: TcpSeqNumber| next <= seq && seq < next + window;

        match (len, window) {
            (0, 0) => seq == next,
            (0, _) => in_window(seq),
            (_, 0) => false,
            (_, _) => in_window(seq) || in_window(seq + (len - 1)),
        }
    }

    /// The number of bytes the peer currently admits, beyond those in flight.
    pub fn usable_window(&self) -> usize {
        let window = self.send.window.min(self.congestion_window) as usize;
        let in_flight = self.send.next - self.send.unacked;
        window.saturating_sub(in_flight)
    }

    /// Enter `TIME-WAIT`, or restart its timer.
    pub fn enter_time_wait(&mut self, now: Instant) {
        self.current = State::TimeWait;
        self.time_wait_expires = Some(now + self.time_wait);
        self.rto_expires = None;
    }

    /// Take in-order data from the peer, within our window.
    ///
    /// Returns the number of bytes taken.
    pub(crate) fn push_received(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(self.recv.window as usize);
        self.read_queue.extend(&data[..len]);
        self.recv.next += len;
        self.recv.window -= len as u32;
        len
    }

    /// Move received data into a buffer, reopening the window.
    pub(crate) fn read(&mut self, buffer: &mut [u8]) -> usize {
        let len = buffer.len().min(self.read_queue.len());
        for (slot, byte) in buffer.iter_mut().zip(self.read_queue.drain(..len)) {
            *slot = byte;
        }
        self.recv.window += len as u32;
        len
    }

    pub(crate) fn queue_mut(&mut self) -> &mut VecDeque<PacketBuffer> {
        &mut self.write_queue
    }

    pub(crate) fn set_fin_queued(&mut self) {
        self.fin_queued = true;
    }

    /// Drop all queued segments and unread data.
    pub(crate) fn release(&mut self) {
        self.current = State::Closed;
        self.write_queue.clear();
        self.read_queue.clear();
        self.rto_expires = None;
        self.time_wait_expires = None;
        self.delayed_ack = false;
    }
}

impl State {
    /// Whether the state has seen the SYN of the peer and our own was acknowledged.
    pub fn is_synchronized(self) -> bool {
        match self {
            State::Closed | State::Listen | State::SynSent | State::SynReceived => false,
            _ => true,
        }
    }
}

impl Default for State {
    fn default() -> Self {
        State::Closed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            State::Closed => "CLOSED",
            State::Listen => "LISTEN",
            State::SynSent => "SYN-SENT",
            State::SynReceived => "SYN-RECEIVED",
            State::Established => "ESTABLISHED",
            State::FinWait1 => "FIN-WAIT-1",
            State::FinWait2 => "FIN-WAIT-2",
            State::Closing => "CLOSING",
            State::TimeWait => "TIME-WAIT",
            State::CloseWait => "CLOSE-WAIT",
            State::LastAck => "LAST-ACK",
        };
        f.write_str(name)
    }
}

impl fmt::Display for FourTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}-{}:{}", self.local_addr, self.local_port, self.remote_addr, self.remote_port)
    }
}
