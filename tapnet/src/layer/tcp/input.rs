//! Processing of inbound segments, following the event processing of RFC793 section 3.9.
//!
//! Relevant material for reading:
//! Main TCP rfc (skip if confident): https://tools.ietf.org/html/rfc793
//! Errata and comments: https://tools.ietf.org/html/rfc1122#section-4.2
//! RST handling specifically: https://www.snellman.net/blog/archive/2016-02-01-tcp-rst/
use crate::layer::{ip, Error, Result};
use crate::time::Instant;
use crate::wire::{tcp_packet, Ipv4Repr, TcpRepr, TcpSeqNumber};

use super::connection::{Connection, FourTuple, State};
use super::endpoint::Endpoint;
use super::output::{send_rst, send_rst_ack};

/// What happens to a connection after a segment arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Nothing beyond the changes to the connection itself.
    Keep,

    /// A passively opened connection completed its handshake.
    Accept,

    /// The connection is finished and must be freed, reporting the event.
    Free(Error),
}

impl Endpoint {
    /// Process the payload of a datagram carrying tcp.
    ///
    /// Segments with a wrong checksum or malformed options are dropped without answer. Segments
    /// for unknown connections open a new one if a listener is bound to the port, and are answered
    /// with a reset otherwise.
    pub fn receive(&mut self, header: &Ipv4Repr, payload: &[u8], ip: &mut dyn ip::Send, now: Instant)
        -> Result<()>
    {
        let packet = tcp_packet::new_checked(payload)?;
        let repr = TcpRepr::parse(packet, header.src_addr, header.dst_addr)?;
        let data = packet.payload_slice();

        let tuple = FourTuple {
            local_addr: header.dst_addr,
            remote_addr: header.src_addr,
            local_port: repr.dst_port,
            remote_port: repr.src_port,
        };
        net_trace!("tcp: {} {}", tuple, repr);

        let verdict = match self.get_mut(&tuple) {
            Some(connection) => connection.arrives(&repr, data, ip, now)?,
            None => return self.arrives_unknown(tuple, &repr, ip, now),
        };

        match verdict {
            Verdict::Keep => Ok(()),
            Verdict::Accept => {
                self.enqueue_accepted(tuple);
                Ok(())
            },
            Verdict::Free(Error::Closed) => {
                self.free_with(&tuple, Error::Closed);
                Ok(())
            },
            Verdict::Free(err) => {
                self.free_with(&tuple, err);
                Err(err)
            },
        }
    }

    /// Handle a segment without connection: either a passive open or the `CLOSED` state rules.
    fn arrives_unknown(&mut self, tuple: FourTuple, repr: &TcpRepr, ip: &mut dyn ip::Send, now: Instant)
        -> Result<()>
    {
        if repr.flags.rst() {
            // Never answer a reset.
            return Err(Error::NoMatchingConnection)
        }

        if self.is_listening(tuple.local_port) {
            if let Some(ack) = repr.ack_number {
                // What are you acking? A previous connection.
                send_rst(ip, &tuple, ack)?;
                return Err(Error::NoMatchingConnection)
            }

            if !repr.flags.syn() {
                // Doesn't have any useful flags. Why was this even sent?
                return Err(Error::NoMatchingConnection)
            }

            return self.open_passive(tuple, repr, ip, now)
        }

        net_debug!("tcp: no connection for {}", tuple);
        match repr.ack_number {
            Some(ack) => send_rst(ip, &tuple, ack)?,
            None => send_rst_ack(ip, &tuple, repr.seq_number + repr.sequence_len())?,
        }
        Err(Error::NoMatchingConnection)
    }
}

impl Connection {
    pub(crate) fn arrives(&mut self, segment: &TcpRepr, data: &[u8], ip: &mut dyn ip::Send, now: Instant)
        -> Result<Verdict>
    {
        match self.current {
            State::Closed | State::Listen => self.arrives_closed(segment, ip),
            State::SynSent => self.arrives_syn_sent(segment, ip, now),
            _ => self.arrives_synchronized(segment, data, ip, now),
        }
    }

    /// A block that was opened but never sent anything answers like a closed port.
    fn arrives_closed(&self, segment: &TcpRepr, ip: &mut dyn ip::Send) -> Result<Verdict> {
        if !segment.flags.rst() {
            match segment.ack_number {
                Some(ack) => send_rst(ip, &self.tuple(), ack)?,
                None => send_rst_ack(ip, &self.tuple(), segment.seq_number + segment.sequence_len())?,
            }
        }
        Err(Error::NoMatchingConnection)
    }

    /// Record the SYN of the peer.
    pub(crate) fn synchronize(&mut self, segment: &TcpRepr) {
        self.recv.initial_seq = Some(segment.seq_number);
        self.recv.next = segment.seq_number + 1;
        self.negotiate(segment.max_seg_size);
        self.send.window = u32::from(segment.window_len);
        self.send.last_window_seq = segment.seq_number;
    }

    fn arrives_syn_sent(&mut self, segment: &TcpRepr, ip: &mut dyn ip::Send, now: Instant)
        -> Result<Verdict>
    {
        if let Some(ack) = segment.ack_number {
            if !(self.send.initial_seq < ack && ack <= self.send.next) {
                if !segment.flags.rst() {
                    logged(self.tuple(), send_rst(ip, &self.tuple(), ack));
                }
                net_debug!("tcp: {} unacceptable ack {} in SYN-SENT", self.tuple(), ack);
                return Ok(Verdict::Keep)
            }
        }

        if segment.flags.rst() {
            if segment.ack_number.is_some() {
                net_debug!("tcp: {} connection refused", self.tuple());
                return Ok(Verdict::Free(Error::PeerRefused))
            }
            return Ok(Verdict::Keep)
        }

        if !segment.flags.syn() {
            return Ok(Verdict::Keep)
        }

        self.synchronize(segment);

        match segment.ack_number {
            Some(ack) => {
                self.send.unacked = ack;
                self.send.last_window_ack = ack;
                self.clear_acked(ack, now);
                self.current = State::Established;
                net_debug!("tcp: {} established", self.tuple());
                logged(self.tuple(), self.send_ack(ip));
                logged(self.tuple(), self.flush(ip, now));
            },
            None => {
                // Simultaneous open, our SYN is sent again together with the ACK.
                self.current = State::SynReceived;
                logged(self.tuple(), self.retransmit_head(ip, now));
            },
        }

        Ok(Verdict::Keep)
    }

    fn arrives_synchronized(&mut self, segment: &TcpRepr, data: &[u8], ip: &mut dyn ip::Send, now: Instant)
        -> Result<Verdict>
    {
        let seq = segment.seq_number;

        // The peer did not see our SYN+ACK and repeats its SYN.
        if self.current == State::SynReceived
            && segment.flags.syn()
            && !segment.flags.rst()
            && segment.ack_number.is_none()
            && Some(seq) == self.recv.initial_seq
        {
            logged(self.tuple(), self.retransmit_head(ip, now));
            return Ok(Verdict::Keep)
        }

        // A retransmitted FIN of the peer restarts the wait.
        if self.current == State::TimeWait
            && segment.flags.fin()
            && !segment.flags.rst()
            && seq + (data.len() + 1) == self.recv.next
        {
            logged(self.tuple(), self.send_ack(ip));
            self.enter_time_wait(now);
            return Ok(Verdict::Keep)
        }

        // first check sequence number
        if !self.is_acceptable(seq, segment.sequence_len()) {
            if !segment.flags.rst() {
                logged(self.tuple(), self.send_ack(ip));
            }
            return Err(Error::SequenceOutOfWindow)
        }

        // second check the RST bit
        if segment.flags.rst() {
            return Ok(Verdict::Free(match self.current {
                State::SynReceived => Error::PeerRefused,
                _ => Error::PeerReset,
            }))
        }

        // fourth, check the SYN bit
        if segment.flags.syn() {
            logged(self.tuple(), send_rst(ip, &self.tuple(), self.send.next));
            return Ok(Verdict::Free(Error::PeerReset))
        }

        // fifth check the ACK field
        let ack = match segment.ack_number {
            Some(ack) => ack,
            None => return Ok(Verdict::Keep),
        };

        let mut verdict = Verdict::Keep;
        if self.current == State::SynReceived {
            if !(self.send.unacked < ack && ack <= self.send.next) {
                logged(self.tuple(), send_rst(ip, &self.tuple(), ack));
                return Ok(Verdict::Keep)
            }

            self.current = State::Established;
            self.send.last_window_seq = seq;
            self.send.last_window_ack = ack;
            net_debug!("tcp: {} established", self.tuple());
            if self.passive {
                verdict = Verdict::Accept;
            }
        }

        match self.current {
            State::TimeWait => {
                // The only thing that can arrive here is a retransmission of the remote FIN.
                logged(self.tuple(), self.send_ack(ip));
                self.enter_time_wait(now);
                return Ok(Verdict::Keep)
            },
            _ => {
                if self.send.next < ack {
                    // Acknowledges something not yet sent.
                    logged(self.tuple(), self.send_ack(ip));
                    return Ok(Verdict::Keep)
                }

                self.update_acked(segment, ack, now);
            },
        }

        match self.current {
            State::FinWait1 if self.fin_acked() => self.current = State::FinWait2,
            State::Closing if self.fin_acked() => {
                self.enter_time_wait(now);
                return Ok(Verdict::Keep)
            },
            State::LastAck if self.fin_acked() => return Ok(Verdict::Free(Error::Closed)),
            _ => (),
        }

        logged(self.tuple(), self.flush(ip, now));

        // sixth, check the URG bit: not supported.

        // seventh, process the segment text
        let mut fin_seq = seq + data.len();
        match self.current {
            State::Established | State::FinWait1 | State::FinWait2 if !data.is_empty() => {
                if self.recv.next < seq {
                    // A hole before this segment, ask for the missing data.
                    logged(self.tuple(), self.send_ack(ip));
                    return Ok(verdict)
                }

                let offset = self.recv.next - seq;
                if offset < data.len() {
                    let taken = self.push_received(&data[offset..]);
                    if offset + taken < data.len() {
                        // Truncated to our window, the FIN is beyond it.
                        fin_seq = self.recv.next + 1;
                    }

                    if self.delayed_ack {
                        // At least every second segment is acknowledged.
                        logged(self.tuple(), self.send_ack(ip));
                    } else {
                        self.delayed_ack = true;
                    }
                }
            },
            _ => (),
        }

        // eighth, check the FIN bit
        if segment.flags.fin() && fin_seq == self.recv.next {
            self.recv.next += 1;
            match self.current {
                State::SynReceived | State::Established => {
                    self.current = State::CloseWait;
                },
                State::FinWait1 if self.fin_acked() => self.enter_time_wait(now),
                State::FinWait1 => self.current = State::Closing,
                State::FinWait2 => self.enter_time_wait(now),
                _ => (),
            }
            net_debug!("tcp: {} peer closed, now {}", self.tuple(), self.current);
            logged(self.tuple(), self.send_ack(ip));
        }

        Ok(verdict)
    }

    /// Advance `SND.UNA` and update the send window from an acceptable ACK.
    fn update_acked(&mut self, segment: &TcpRepr, ack: TcpSeqNumber, now: Instant) {
        if self.send.unacked < ack {
            self.send.unacked = ack;
            self.clear_acked(ack, now);
        }

        if ack < self.send.unacked {
            // An old duplicate, it must not move the window.
            return
        }

        let seq = segment.seq_number;
        let wl1 = self.send.last_window_seq;
        let wl2 = self.send.last_window_ack;
        if wl1 < seq || (wl1 == seq && wl2 <= ack) {
            self.send.window = u32::from(segment.window_len);
            self.send.last_window_seq = seq;
            self.send.last_window_ack = ack;
        }
    }
}

/// Transmission failures while a segment is processed are only logged.
///
/// The state change of the segment stands, lost segments are recovered by retransmission.
fn logged<T>(tuple: FourTuple, result: Result<T>) {
    if let Err(err) = result {
        net_debug!("tcp: {} could not send: {}", tuple, err);
    }
}
