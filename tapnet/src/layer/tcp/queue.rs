//! The write queue of a connection.
//!
//! Buffers are owned by the queue from `enqueue` until they are fully acknowledged. Transmission
//! only borrows them, so a retransmission sends the very same bytes at the same sequence numbers
//! with a fresh acknowledgement and window.
use crate::layer::{ip, Result};
use crate::storage::PacketBuffer;
use crate::time::Instant;

use super::connection::{Connection, State};
use super::output::transmit;

impl Connection {
    /// Append a buffer to the tail of the write queue.
    pub(crate) fn enqueue(&mut self, buffer: PacketBuffer) {
        if buffer.control().fin() {
            self.set_fin_queued();
        }
        self.queue_mut().push_back(buffer);
    }

    /// Send queued buffers for the first time, as far as the window admits.
    ///
    /// Buffers are admitted in order. Control segments without payload are always admitted, data
    /// only while it fits the usable window and only once the handshake completed. Returns the
    /// number of segments sent.
    pub(crate) fn flush(&mut self, ip: &mut dyn ip::Send, now: Instant) -> Result<usize> {
        let mut sent = 0;
        let mut idx = 0;

        while idx < self.write_queue().len() {
            let buffer = &self.write_queue()[idx];
            if buffer.seq().is_some() {
                idx += 1;
                continue;
            }

            if !buffer.control().syn() {
                if let State::SynSent | State::SynReceived = self.current {
                    break;
                }
            }

            if !buffer.is_empty() && buffer.len() > self.usable_window() {
                break;
            }

            let seq = self.send.next;
            let repr = self.segment(buffer.control(), seq, buffer.len());
            transmit(ip, &self.tuple(), repr, buffer.payload())?;

            let buffer = &mut self.queue_mut()[idx];
            buffer.schedule(seq);
            buffer.mark_sent(now);
            let seq_len = buffer.seq_len();
            self.send.next += seq_len;
            self.delayed_ack = false;
            if self.rto_expires.is_none() {
                self.rto_expires = Some(now + self.rto.rto());
            }

            sent += 1;
            idx += 1;
        }

        Ok(sent)
    }

    /// Remove all buffers that are fully acknowledged by `ack`.
    ///
    /// Each removed buffer that was sent only once is a round trip time sample. The timer restarts
    /// if anything remains outstanding, and stops otherwise.
    pub(crate) fn clear_acked(&mut self, ack: crate::wire::TcpSeqNumber, now: Instant) {
        let mut removed = false;

        loop {
            match self.write_queue().front().and_then(PacketBuffer::seq_end) {
                Some(end) if end <= ack => (),
                _ => break,
            }

            let buffer = match self.queue_mut().pop_front() {
                Some(buffer) => buffer,
                None => break,
            };
            removed = true;

            // Karn's algorithm: ambiguous samples of retransmitted buffers are skipped.
            if buffer.retransmits() == 0 {
                if let Some(sent_at) = buffer.sent_at() {
                    self.rto.sample(now.saturating_since(sent_at));
                }
            }
        }

        let outstanding = self.write_queue().front().map_or(false, |buffer| buffer.seq().is_some());
        if !outstanding {
            self.rto_expires = None;
        } else if removed {
            self.rto_expires = Some(now + self.rto.rto());
        }
    }

    /// Send the oldest outstanding buffer again and restart the timer.
    pub(crate) fn retransmit_head(&mut self, ip: &mut dyn ip::Send, now: Instant) -> Result<()> {
        let (seq, control, len) = match self.write_queue().front() {
            Some(buffer) => match buffer.seq() {
                Some(seq) => (seq, buffer.control(), buffer.len()),
                None => {
                    self.rto_expires = None;
                    return Ok(())
                },
            },
            None => {
                self.rto_expires = None;
                return Ok(())
            },
        };

        let repr = self.segment(control, seq, len);
        if let Some(buffer) = self.write_queue().front() {
            transmit(ip, &self.tuple(), repr, buffer.payload())?;
        }

        if let Some(buffer) = self.queue_mut().front_mut() {
            buffer.mark_sent(now);
        }
        self.delayed_ack = false;
        self.rto_expires = Some(now + self.rto.rto());
        Ok(())
    }
}
