//! Owned packet buffers shared between the layers.
//!
//! A [`PacketBuffer`] is the unit that is queued anywhere in the stack: on the write queue of a
//! TCP connection until it is acknowledged, and on the pending queue of an ARP entry until the
//! next hop is resolved. The buffer owns its bytes so it can outlive the call that produced it.
//!
//! [`PacketBuffer`]: struct.PacketBuffer.html
use crate::time::Instant;
use crate::wire::{TcpFlags, TcpSeqNumber};

/// An owned buffer with the bookkeeping needed for retransmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketBuffer {
    data: Vec<u8>,
    control: TcpFlags,
    seq: Option<TcpSeqNumber>,
    sent_at: Option<Instant>,
    retransmits: u32,
}

impl PacketBuffer {
    /// Wrap some bytes.
    pub fn new(data: Vec<u8>) -> Self {
        PacketBuffer {
            data,
            control: TcpFlags::default(),
            seq: None,
            sent_at: None,
            retransmits: 0,
        }
    }

    /// Wrap a segment payload together with the control flags that occupy sequence space.
    pub fn with_control(data: Vec<u8>, control: TcpFlags) -> Self {
        PacketBuffer {
            control,
            ..PacketBuffer::new(data)
        }
    }

    /// The owned bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// The number of owned bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no bytes are owned.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Release the owned bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// The control flags carried alongside the payload.
    pub fn control(&self) -> TcpFlags {
        self.control
    }

    /// The length in sequence space, counting SYN and FIN as one each.
    pub fn seq_len(&self) -> usize {
        self.data.len() + self.control.sequence_len()
    }

    /// The first sequence number, once assigned.
    pub fn seq(&self) -> Option<TcpSeqNumber> {
        self.seq
    }

    /// One past the last sequence number, once assigned.
    pub fn seq_end(&self) -> Option<TcpSeqNumber> {
        self.seq.map(|seq| seq + self.seq_len())
    }

    /// Assign the starting sequence number.
    ///
    /// Retransmissions keep the sequence number of the first transmission.
    pub fn schedule(&mut self, seq: TcpSeqNumber) {
        self.seq = Some(seq);
    }

    /// Record a transmission at `now`.
    ///
    /// Every transmission after the first counts as a retransmission.
    pub fn mark_sent(&mut self, now: Instant) {
        if self.sent_at.is_some() {
            self.retransmits += 1;
        }
        self.sent_at = Some(now);
    }

    /// The time of the latest transmission.
    pub fn sent_at(&self) -> Option<Instant> {
        self.sent_at
    }

    /// How often the buffer was sent again after its first transmission.
    pub fn retransmits(&self) -> u32 {
        self.retransmits
    }
}

impl From<Vec<u8>> for PacketBuffer {
    fn from(data: Vec<u8>) -> Self {
        PacketBuffer::new(data)
    }
}
