//! Building and transmitting segments.
//!
//! Control segments without sequence space (bare ACK, RST) are written directly. Everything that
//! occupies sequence space (SYN, data, FIN) goes through the write queue so that it is
//! retransmitted until acknowledged.
use crate::layer::{ip, Error, Result};
use crate::storage::PacketBuffer;
use crate::time::Instant;
use crate::wire::{tcp_packet, IpProtocol, TcpFlags, TcpRepr, TcpSeqNumber};

use super::connection::{Connection, FourTuple, State};

impl Connection {
    /// The header of a segment from this connection.
    ///
    /// Acknowledges everything received once the SYN of the peer is known.
    pub(crate) fn segment(&self, mut flags: TcpFlags, seq_number: TcpSeqNumber, payload_len: usize)
        -> TcpRepr
    {
        let ack_number = self.recv.initial_seq.map(|_| self.recv.next);
        flags.set_ack(ack_number.is_some());
        TcpRepr {
            src_port: self.tuple().local_port,
            dst_port: self.tuple().remote_port,
            flags,
            seq_number,
            ack_number,
            window_len: self.recv.window.min(u32::from(u16::max_value())) as u16,
            window_scale: None,
            max_seg_size: if flags.syn() { Some(self.local_mss()) } else { None },
            sack_permitted: false,
            timestamp: None,
            payload_len: payload_len as u16,
        }
    }

    /// Send an acknowledgement for everything received so far.
    ///
    /// Replaces any delayed acknowledgement.
    pub(crate) fn send_ack(&mut self, ip: &mut dyn ip::Send) -> Result<()> {
        self.delayed_ack = false;
        let repr = self.segment(TcpFlags::default(), self.send.next, 0);
        transmit(ip, &self.tuple(), repr, &[])
    }

    /// Open the connection actively.
    pub(crate) fn send_syn(&mut self, ip: &mut dyn ip::Send, now: Instant) -> Result<()> {
        debug_assert_eq!(self.current, State::Closed);
        self.current = State::SynSent;
        self.enqueue(PacketBuffer::with_control(Vec::new(), syn_flags()));
        self.flush(ip, now).map(drop)
    }

    /// Answer the SYN of a peer.
    pub(crate) fn send_synack(&mut self, ip: &mut dyn ip::Send, now: Instant) -> Result<()> {
        debug_assert!(self.recv.initial_seq.is_some());
        self.current = State::SynReceived;
        self.enqueue(PacketBuffer::with_control(Vec::new(), syn_flags()));
        self.flush(ip, now).map(drop)
    }

    /// Close our side of the connection after all queued data.
    pub(crate) fn send_fin(&mut self, ip: &mut dyn ip::Send, now: Instant) -> Result<()> {
        let mut flags = TcpFlags::default();
        flags.set_fin(true);
        self.enqueue(PacketBuffer::with_control(Vec::new(), flags));
        self.flush(ip, now).map(drop)
    }

    /// Queue data in segments of at most one MSS and send as much as the window admits.
    ///
    /// The last segment carries PSH.
    pub(crate) fn send_data(&mut self, data: &[u8], ip: &mut dyn ip::Send, now: Instant)
        -> Result<usize>
    {
        if self.fin_queued() {
            return Err(Error::Illegal)
        }

        let mut chunks = data.chunks(usize::from(self.mss)).peekable();
        while let Some(chunk) = chunks.next() {
            let mut flags = TcpFlags::default();
            flags.set_psh(chunks.peek().is_none());
            self.enqueue(PacketBuffer::with_control(chunk.to_vec(), flags));
        }

        self.flush(ip, now)?;
        Ok(data.len())
    }
}

fn syn_flags() -> TcpFlags {
    let mut flags = TcpFlags::default();
    flags.set_syn(true);
    flags
}

/// Answer a segment that carried an ACK with a reset at the acknowledged sequence number.
pub(crate) fn send_rst(ip: &mut dyn ip::Send, tuple: &FourTuple, seq_number: TcpSeqNumber)
    -> Result<()>
{
    let mut flags = TcpFlags::default();
    flags.set_rst(true);
    let repr = reset(tuple, flags, seq_number, None);
    transmit(ip, tuple, repr, &[])
}

/// Answer a segment without ACK with a reset acknowledging all of it.
pub(crate) fn send_rst_ack(ip: &mut dyn ip::Send, tuple: &FourTuple, ack_number: TcpSeqNumber)
    -> Result<()>
{
    let mut flags = TcpFlags::default();
    flags.set_rst(true);
    let repr = reset(tuple, flags, TcpSeqNumber(0), Some(ack_number));
    transmit(ip, tuple, repr, &[])
}

fn reset(tuple: &FourTuple, flags: TcpFlags, seq_number: TcpSeqNumber, ack_number: Option<TcpSeqNumber>)
    -> TcpRepr
{
    TcpRepr {
        src_port: tuple.local_port,
        dst_port: tuple.remote_port,
        flags,
        seq_number,
        ack_number,
        window_len: 0,
        window_scale: None,
        max_seg_size: None,
        sack_permitted: false,
        timestamp: None,
        payload_len: 0,
    }
}

/// Emit a segment with its payload and checksum and hand it to the ip layer.
///
/// A datagram deferred by address resolution counts as sent.
pub(crate) fn transmit(ip: &mut dyn ip::Send, tuple: &FourTuple, repr: TcpRepr, payload: &[u8])
    -> Result<()>
{
    debug_assert_eq!(usize::from(repr.payload_len), payload.len());
    let mut buffer = vec![0; repr.buffer_len()];
    let packet = tcp_packet::new_unchecked_mut(&mut buffer);
    repr.emit(packet);
    packet.payload_mut_slice().copy_from_slice(payload);
    packet.fill_checksum(tuple.local_addr, tuple.remote_addr);

    net_trace!("tcp: {} {}", tuple, repr);
    let socket = ip::Socket {
        protocol: IpProtocol::Tcp,
        src_addr: tuple.local_addr,
        dst_addr: tuple.remote_addr,
    };
    match ip.send(socket, &buffer)? {
        ip::Delivery::Sent(_) => (),
        ip::Delivery::Deferred => {
            net_trace!("tcp: {} segment awaits address resolution", tuple);
        },
    }
    Ok(())
}
