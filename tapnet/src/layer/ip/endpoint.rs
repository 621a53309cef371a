use crate::layer::{arp, eth, Error, Result};
use crate::time::Instant;
use crate::wire::{ipv4_packet, Ipv4Address, Ipv4Cidr, Ipv4Repr};
use crate::wire::{IPV4_DEFAULT_HOP_LIMIT, IPV4_HEADER_LEN};

use super::{Delivery, Send, Socket};

/// The address assignment and routing of an interface.
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Our own address and the subnet considered on-link.
    cidr: Ipv4Cidr,

    /// The router for destinations outside the subnet.
    gateway: Option<Ipv4Address>,

    /// The identification of the next datagram.
    ident: u16,
}

/// A received datagram addressed to us.
#[derive(Debug)]
pub struct Inbound<'a> {
    /// The parsed header.
    pub repr: Ipv4Repr,
    /// The payload, bounded by the total length of the header.
    pub payload: &'a [u8],
}

/// An endpoint borrowed with the lower layers for sending.
pub struct Sender<'a> {
    endpoint: &'a mut Endpoint,
    arp: &'a mut arp::Endpoint,
    eth: eth::Sender<'a>,
    now: Instant,
}

impl Endpoint {
    /// Create an endpoint with the given address assignment.
    ///
    /// The identification of the first datagram is chosen randomly.
    pub fn new(cidr: Ipv4Cidr, gateway: Option<Ipv4Address>) -> Self {
        Endpoint {
            cidr,
            gateway,
            ident: rand::random(),
        }
    }

    /// Our own address.
    pub fn addr(&self) -> Ipv4Address {
        self.cidr.address()
    }

    /// The address assignment.
    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    /// The default gateway.
    pub fn gateway(&self) -> Option<Ipv4Address> {
        self.gateway
    }

    /// Find the link-local address to which a datagram for `dst_addr` is written.
    pub fn next_hop(&self, dst_addr: Ipv4Address) -> Ipv4Address {
        match self.gateway {
            Some(gateway) if !self.cidr.contains_addr(dst_addr) => gateway,
            _ => dst_addr,
        }
    }

    /// Check if a destination address is ours.
    pub fn accepts(&self, dst_addr: Ipv4Address) -> bool {
        dst_addr == self.cidr.address()
            || dst_addr.is_broadcast()
            || Some(dst_addr) == self.cidr.broadcast()
    }

    /// Parse a received datagram and filter those that are not for us.
    ///
    /// Fragments are rejected as a protocol violation, foreign destinations as `Unreachable`.
    pub fn receive<'a>(&self, payload: &'a [u8]) -> Result<Inbound<'a>> {
        let packet = ipv4_packet::new_checked(payload)?;
        let repr = Ipv4Repr::parse(packet)?;

        if !self.accepts(repr.dst_addr) {
            net_trace!("ip: datagram for {} ignored", repr.dst_addr);
            return Err(Error::Unreachable)
        }

        net_trace!("ip: {}", repr);
        Ok(Inbound { repr, payload: packet.payload_slice() })
    }

    /// Borrow the endpoint together with the lower layers for sending.
    pub fn sender<'a>(&'a mut self, arp: &'a mut arp::Endpoint, eth: eth::Sender<'a>, now: Instant)
        -> Sender<'a>
    {
        Sender { endpoint: self, arp, eth, now }
    }

    fn next_ident(&mut self) -> u16 {
        let ident = self.ident;
        self.ident = self.ident.wrapping_add(1);
        ident
    }
}

impl Send for Sender<'_> {
    fn send(&mut self, socket: Socket, payload: &[u8]) -> Result<Delivery> {
        if socket.src_addr != self.endpoint.addr() {
            net_debug!("ip: {} is not a local address", socket.src_addr);
            return Err(Error::Unreachable)
        }

        let total_len = IPV4_HEADER_LEN + payload.len();
        if total_len > self.eth.mtu() {
            return Err(Error::BadSize)
        }

        let repr = Ipv4Repr {
            src_addr: socket.src_addr,
            dst_addr: socket.dst_addr,
            protocol: socket.protocol,
            payload_len: payload.len(),
            hop_limit: IPV4_DEFAULT_HOP_LIMIT,
            ident: self.endpoint.next_ident(),
        };

        let mut datagram = vec![0; total_len];
        let packet = ipv4_packet::new_unchecked_mut(&mut datagram);
        repr.emit(packet);
        packet.payload_mut_slice().copy_from_slice(payload);

        let next_hop = self.endpoint.next_hop(socket.dst_addr);
        match self.arp.resolve_or_defer(&mut self.eth, next_hop, &datagram, self.now)? {
            arp::Resolution::Sent(_) => Ok(Delivery::Sent(total_len)),
            arp::Resolution::Deferred => Ok(Delivery::Deferred),
        }
    }
}
