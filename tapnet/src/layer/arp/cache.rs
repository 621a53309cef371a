// Heads up! Before working on this file you should read, at least,
// the parts of RFC 1122 that discuss ARP.
use std::collections::VecDeque;

use crate::layer::{Error, Result};
use crate::storage::PacketBuffer;
use crate::time::{Duration, Instant};
use crate::wire::{EthernetAddress, EthernetProtocol, Ipv4Address};

/// The resolution state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// A request is outstanding, outbound datagrams wait in the entry.
    Waiting,

    /// The hardware address is known.
    Active,
}

/// A cached neighbor.
///
/// A mapping from a protocol address to a hardware address. While the hardware address is still
/// unknown the entry owns all datagrams for the address, in the order they were deferred.
#[derive(Debug, Clone)]
pub struct Entry {
    protocol_type: EthernetProtocol,
    address: Ipv4Address,
    mac: EthernetAddress,
    state: State,
    pending: VecDeque<PacketBuffer>,
    last_used: Instant,
    requested_at: Instant,
    retries: u8,
}

/// The outcome of learning a mapping from a received arp packet.
#[derive(Debug)]
pub enum Learned {
    /// A new active entry was created.
    Inserted,

    /// An entry was waiting for this mapping; these datagrams are now deliverable, oldest first.
    Resolved(VecDeque<PacketBuffer>),

    /// The address was already resolved; the entry was left untouched.
    Known,
}

/// The entries dropped by a retry sweep and the addresses to request again.
#[derive(Debug, Default)]
pub struct Retries {
    /// Addresses whose request is repeated now.
    pub repeat: Vec<Ipv4Address>,
    /// Entries that ran out of retries, with their undeliverable datagrams.
    pub expired: Vec<Entry>,
}

/// A bounded arp cache.
///
/// Lookups are a linear scan; the cache is intended to hold the handful of hosts on the local
/// link that the stack talks to. When full, the least recently used resolved entry is evicted.
/// Waiting entries are never evicted since they own deferred datagrams.
#[derive(Debug)]
pub struct Cache {
    entries: Vec<Entry>,
    capacity: usize,
}

impl Entry {
    fn new(address: Ipv4Address, mac: EthernetAddress, state: State, now: Instant) -> Self {
        Entry {
            protocol_type: EthernetProtocol::Ipv4,
            address,
            mac,
            state,
            pending: VecDeque::new(),
            last_used: now,
            requested_at: now,
            retries: 0,
        }
    }

    /// The protocol of the address.
    pub fn protocol_type(&self) -> EthernetProtocol {
        self.protocol_type
    }

    /// The protocol address.
    pub fn address(&self) -> Ipv4Address {
        self.address
    }

    /// The hardware address, all zero until resolved.
    pub fn mac(&self) -> EthernetAddress {
        self.mac
    }

    /// Whether the entry is resolved.
    pub fn state(&self) -> State {
        self.state
    }

    /// The deferred datagrams, oldest first.
    pub fn pending(&self) -> &VecDeque<PacketBuffer> {
        &self.pending
    }

    /// Append a datagram to the pending queue.
    pub fn defer(&mut self, buffer: PacketBuffer) {
        debug_assert_eq!(self.state, State::Waiting);
        self.pending.push_back(buffer);
    }

    /// The number of requests repeated after the first one.
    pub fn retries(&self) -> u8 {
        self.retries
    }
}

impl Cache {
    /// Create an empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Cache {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry of an address, without side effects.
    pub fn lookup(&self, protocol_type: EthernetProtocol, address: Ipv4Address) -> Option<&Entry> {
        self.entries.iter()
            .find(|entry| entry.protocol_type == protocol_type && entry.address == address)
    }

    /// Find the entry of an IPv4 address and mark it as used.
    pub fn lookup_mut(&mut self, address: Ipv4Address, now: Instant) -> Option<&mut Entry> {
        let entry = self.entries.iter_mut()
            .find(|entry| entry.protocol_type == EthernetProtocol::Ipv4 && entry.address == address)?;
        entry.last_used = now;
        Some(entry)
    }

    /// Insert a waiting entry for an address without entry.
    ///
    /// Fails with `Exhausted` when the cache is full and no resolved entry can be evicted.
    pub fn insert_waiting(&mut self, address: Ipv4Address, now: Instant) -> Result<&mut Entry> {
        debug_assert!(self.lookup(EthernetProtocol::Ipv4, address).is_none());
        self.make_room()?;
        self.entries.push(Entry::new(address, EthernetAddress::UNSPECIFIED, State::Waiting, now));
        let last = self.entries.len() - 1;
        Ok(&mut self.entries[last])
    }

    /// Record a mapping seen in a request or reply.
    ///
    /// The first resolution wins: a resolved entry is never updated. A waiting entry becomes
    /// resolved and hands back its pending datagrams.
    pub fn learn(&mut self, address: Ipv4Address, mac: EthernetAddress, now: Instant)
        -> Result<Learned>
    {
        if let Some(entry) = self.lookup_mut(address, now) {
            return Ok(match entry.state {
                State::Active => Learned::Known,
                State::Waiting => {
                    entry.mac = mac;
                    entry.state = State::Active;
                    Learned::Resolved(core::mem::replace(&mut entry.pending, VecDeque::new()))
                },
            })
        }

        self.make_room()?;
        self.entries.push(Entry::new(address, mac, State::Active, now));
        Ok(Learned::Inserted)
    }

    /// Find waiting entries whose request is due again.
    ///
    /// Requests repeat every `interval`. An entry that already repeated its request `limit` times
    /// is removed instead, together with its pending datagrams.
    pub fn retry(&mut self, now: Instant, interval: Duration, limit: u8) -> Retries {
        let mut retries = Retries::default();
        let mut idx = 0;
        while idx < self.entries.len() {
            let entry = &mut self.entries[idx];
            if entry.state != State::Waiting || now < entry.requested_at + interval {
                idx += 1;
                continue;
            }

            if entry.retries >= limit {
                retries.expired.push(self.entries.remove(idx));
                continue;
            }

            entry.retries += 1;
            entry.requested_at = now;
            retries.repeat.push(entry.address);
            idx += 1;
        }
        retries
    }

    fn make_room(&mut self) -> Result<()> {
        if self.entries.len() < self.capacity {
            return Ok(())
        }

        let victim = self.entries.iter()
            .enumerate()
            .filter(|(_, entry)| entry.state == State::Active)
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(idx, _)| idx);

        match victim {
            Some(idx) => {
                let evicted = self.entries.swap_remove(idx);
                net_trace!("arp: evicted {} ({})", evicted.address, evicted.mac);
                Ok(())
            },
            None => Err(Error::Exhausted),
        }
    }
}
