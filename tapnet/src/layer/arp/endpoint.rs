//! As noted in RFC 826, arp assumes that at least the mapping and identities of the own host are
//! fully known to the resolver. Furthermore, we are expected to only keep a very small cache of
//! immediate communication hosts. Outbound datagrams to a host whose address is not yet known
//! are deferred in the cache and written once the reply arrives.
use std::collections::VecDeque;

use crate::layer::{eth, Error, Result};
use crate::storage::PacketBuffer;
use crate::time::{Duration, Instant};
use crate::wire::{arp_packet, ArpOperation, ArpRepr};
use crate::wire::{EthernetAddress, EthernetProtocol, Ipv4Address};

use super::cache::{Cache, Entry, Learned, State};

/// The interval between repeated requests for an unresolved address.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// The number of times a request is repeated before the address is given up.
pub const RETRY_LIMIT: u8 = 3;

/// An arp traffic handler.
#[derive(Debug)]
pub struct Endpoint {
    /// The protocol address we answer requests for.
    protocol_addr: Ipv4Address,
    cache: Cache,
    retry_interval: Duration,
    retry_limit: u8,
}

/// The result of resolving a next hop for an outbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The datagram was written to this hardware address.
    Sent(EthernetAddress),

    /// The datagram is held until the address has been resolved.
    Deferred,
}

impl Endpoint {
    /// Create an endpoint answering for `protocol_addr` with a cache of `capacity` entries.
    pub fn new(protocol_addr: Ipv4Address, capacity: usize) -> Self {
        Endpoint {
            protocol_addr,
            cache: Cache::new(capacity),
            retry_interval: RETRY_INTERVAL,
            retry_limit: RETRY_LIMIT,
        }
    }

    /// Configure how often and how long unresolved addresses are requested again.
    pub fn with_retries(self, retry_interval: Duration, retry_limit: u8) -> Self {
        Endpoint {
            retry_interval,
            retry_limit,
            ..self
        }
    }

    /// The protocol address we answer for.
    pub fn protocol_addr(&self) -> Ipv4Address {
        self.protocol_addr
    }

    /// The resolved and unresolved neighbors.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Find the entry of an address.
    pub fn lookup(&self, address: Ipv4Address) -> Option<&Entry> {
        self.cache.lookup(EthernetProtocol::Ipv4, address)
    }

    /// Write an IPv4 datagram to its next hop, or hold it until the next hop is resolved.
    ///
    /// The first datagram for an unknown address broadcasts a request. Datagrams for an address
    /// with an outstanding request are appended to the entry and later written in order.
    pub fn resolve_or_defer(
        &mut self,
        eth: &mut eth::Sender,
        next_hop: Ipv4Address,
        datagram: &[u8],
        now: Instant,
    ) -> Result<Resolution> {
        if let Some(entry) = self.cache.lookup_mut(next_hop, now) {
            return match entry.state() {
                State::Active => {
                    let mac = entry.mac();
                    eth.transmit(mac, EthernetProtocol::Ipv4, datagram)?;
                    Ok(Resolution::Sent(mac))
                },
                State::Waiting => {
                    entry.defer(PacketBuffer::new(datagram.to_vec()));
                    net_trace!("arp: deferred {} bytes for {}", datagram.len(), next_hop);
                    Ok(Resolution::Deferred)
                },
            }
        }

        self.cache.insert_waiting(next_hop, now)?
            .defer(PacketBuffer::new(datagram.to_vec()));
        self.request(eth, next_hop)?;
        Ok(Resolution::Deferred)
    }

    /// Broadcast a request for the hardware address of `target`.
    pub fn request(&self, eth: &mut eth::Sender, target: Ipv4Address) -> Result<()> {
        let repr = ArpRepr {
            operation: ArpOperation::Request,
            source_hardware_addr: eth.src_addr(),
            source_protocol_addr: self.protocol_addr,
            target_hardware_addr: EthernetAddress::UNSPECIFIED,
            target_protocol_addr: target,
        };
        net_debug!("arp: who has {}? tell {}", target, self.protocol_addr);
        Self::transmit(eth, EthernetAddress::BROADCAST, repr)
    }

    /// Answer a request that asked for our address.
    pub fn reply(&self, eth: &mut eth::Sender, requester: &ArpRepr) -> Result<()> {
        let repr = ArpRepr {
            operation: ArpOperation::Reply,
            source_hardware_addr: eth.src_addr(),
            source_protocol_addr: self.protocol_addr,
            target_hardware_addr: requester.source_hardware_addr,
            target_protocol_addr: requester.source_protocol_addr,
        };
        net_debug!("arp: {} is at {}", self.protocol_addr, repr.source_hardware_addr);
        Self::transmit(eth, requester.source_hardware_addr, repr)
    }

    /// Handle an inbound arp packet.
    ///
    /// The sender mapping is learned (the first mapping of an address is kept), deferred
    /// datagrams of a newly resolved address are written in the order they were deferred, and
    /// requests for our own address are answered. A malformed packet is dropped without any
    /// change to the cache.
    pub fn receive(&mut self, eth: &mut eth::Sender, payload: &[u8], now: Instant) -> Result<()> {
        let packet = arp_packet::new_checked(payload)?;
        let repr = ArpRepr::parse(packet)?;
        net_trace!("arp: {}", repr);

        if repr.source_protocol_addr.is_unspecified() || !repr.source_hardware_addr.is_unicast() {
            // Probes and bogus senders are never cached.
            return Ok(())
        }

        let mut flushed = Ok(());
        match self.cache.learn(repr.source_protocol_addr, repr.source_hardware_addr, now) {
            Ok(Learned::Resolved(pending)) => {
                net_debug!("arp: resolved {} to {}, flushing {} datagrams",
                    repr.source_protocol_addr, repr.source_hardware_addr, pending.len());
                flushed = Self::flush(eth, repr.source_hardware_addr, pending);
            },
            Ok(Learned::Inserted) | Ok(Learned::Known) => (),
            // A full cache does not prevent answering.
            Err(err) => {
                net_debug!("arp: not caching {}: {}", repr.source_protocol_addr, err);
            },
        }

        if repr.operation == ArpOperation::Request && repr.target_protocol_addr == self.protocol_addr {
            self.reply(eth, &repr)?;
        }

        flushed
    }

    /// Write all deferred datagrams of a resolved address, in order.
    ///
    /// A failed write loses only its own datagram. The first failure is returned after all
    /// others were written.
    fn flush(eth: &mut eth::Sender, dst_addr: EthernetAddress, pending: VecDeque<PacketBuffer>)
        -> Result<()>
    {
        let mut first_err = None;
        for buffer in pending {
            if let Err(err) = eth.transmit(dst_addr, EthernetProtocol::Ipv4, buffer.payload()) {
                net_debug!("arp: lost deferred datagram for {}: {}", dst_addr, err);
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Repeat outstanding requests and give up on unresponsive addresses.
    ///
    /// Returns the number of datagrams that were dropped because their next hop never answered.
    pub fn slow_timer(&mut self, eth: &mut eth::Sender, now: Instant) -> Result<usize> {
        let retries = self.cache.retry(now, self.retry_interval, self.retry_limit);

        let mut dropped = 0;
        for entry in &retries.expired {
            net_warn!("arp: {} unreachable, dropping {} datagrams",
                entry.address(), entry.pending().len());
            dropped += entry.pending().len();
        }

        for target in retries.repeat {
            self.request(eth, target)?;
        }

        Ok(dropped)
    }

    fn transmit(eth: &mut eth::Sender, dst_addr: EthernetAddress, repr: ArpRepr) -> Result<()> {
        let mut buffer = vec![0; repr.buffer_len()];
        repr.emit(arp_packet::new_unchecked_mut(&mut buffer));
        match eth.transmit(dst_addr, EthernetProtocol::Arp, &buffer) {
            Ok(_) => Ok(()),
            Err(Error::BadSize) => Err(Error::AllocationFailure),
            Err(err) => Err(err),
        }
    }
}
