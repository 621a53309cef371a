//! The IP layer.
//!
//! Connects the transport protocols to the link. Outbound payloads are wrapped into an IPv4
//! header and handed to the arp endpoint, which either knows the hardware address of the next hop
//! or holds the datagram until it does. Both outcomes are a success for the caller; a deferred
//! datagram is not an error.
//!
//! It does **not** provide fragment reassembly. Fragments are dropped on receive and every
//! emitted datagram carries the don't-fragment flag.
//!
//! ## Structure
//!
//! The IP endpoint stores the address assignment of the interface and the optional default
//! gateway. The next hop of a destination inside the local subnet is the destination itself,
//! everything else is routed through the gateway. Without a gateway all destinations are treated
//! as on-link.
//!
//! ## Receiving packets
//!
//! The header checksum is validated and destinations other than our own address or a broadcast
//! address are dropped. The caller dispatches the payload by the protocol in the header.
//!
//! ## Transmitting packets
//!
//! Transport protocols do not depend on the endpoint directly but on the [`Send`] trait so that
//! their segments can be captured in tests.
//!
//! [`Send`]: trait.Send.html
mod endpoint;

use crate::layer::Result;
use crate::wire::{IpProtocol, Ipv4Address};

pub use endpoint::{
    Endpoint,
    Inbound,
    Sender,
};

/// The addressing of an outbound datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Socket {
    /// The encapsulated protocol.
    pub protocol: IpProtocol,
    /// Our own address.
    pub src_addr: Ipv4Address,
    /// The final destination, not the next hop.
    pub dst_addr: Ipv4Address,
}

/// What happened to a sent datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// The datagram of this length was written to the device.
    Sent(usize),

    /// The datagram waits for the hardware address of its next hop.
    Deferred,
}

/// A sink for upper layer payloads.
pub trait Send {
    /// Wrap `payload` into a datagram and deliver it.
    fn send(&mut self, socket: Socket, payload: &[u8]) -> Result<Delivery>;
}

impl<S: Send + ?Sized> Send for &'_ mut S {
    fn send(&mut self, socket: Socket, payload: &[u8]) -> Result<Delivery> {
        (**self).send(socket, payload)
    }
}
