use crate::layer::{Error, Result};
use crate::nic::Device;
use crate::wire::{ethernet_frame, EthernetAddress, EthernetProtocol, EthernetRepr};

/// The link layer state of an interface.
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Our own address.
    ///
    /// We ignored any packets with mismatching destination.
    addr: EthernetAddress,
}

/// An endpoint borrowed together with the device for sending.
pub struct Sender<'a> {
    endpoint: &'a Endpoint,
    device: &'a mut dyn Device,
}

/// A received frame addressed to us.
#[derive(Debug)]
pub struct Inbound<'a> {
    /// The parsed header.
    pub repr: EthernetRepr,
    /// The encapsulated upper layer packet.
    pub payload: &'a [u8],
}

impl Endpoint {
    /// Create an endpoint for the interface with the given hardware address.
    pub fn new(addr: EthernetAddress) -> Self {
        Endpoint { addr }
    }

    /// The hardware address of the interface.
    pub fn addr(&self) -> EthernetAddress {
        self.addr
    }

    /// Borrow the endpoint with a device for writing frames.
    pub fn sender<'a>(&'a self, device: &'a mut dyn Device) -> Sender<'a> {
        Sender { endpoint: self, device }
    }

    /// Parse a received frame and filter those that are not for us.
    ///
    /// Frames to other unicast addresses are reported as `Unreachable`.
    pub fn receive<'a>(&self, frame: &'a [u8]) -> Result<Inbound<'a>> {
        let frame = ethernet_frame::new_checked(frame)?;
        let repr = EthernetRepr::parse(frame)?;

        if !self.accepts(repr.dst_addr) {
            net_trace!("eth: frame for {} ignored", repr.dst_addr);
            return Err(Error::Unreachable)
        }

        Ok(Inbound { repr, payload: frame.payload_slice() })
    }

    fn accepts(&self, dst_addr: EthernetAddress) -> bool {
        dst_addr == self.addr || dst_addr.is_broadcast()
    }
}

impl Sender<'_> {
    /// The hardware address of the interface.
    pub fn src_addr(&self) -> EthernetAddress {
        self.endpoint.addr
    }

    /// The largest payload a single frame can carry.
    pub fn mtu(&self) -> usize {
        self.device.personality().mtu()
    }

    /// Frame `payload` and write it to the device.
    ///
    /// Returns the number of bytes written, including the header.
    pub fn transmit(&mut self, dst_addr: EthernetAddress, ethertype: EthernetProtocol, payload: &[u8])
        -> Result<usize>
    {
        if payload.len() > self.mtu() {
            return Err(Error::BadSize)
        }

        let repr = EthernetRepr {
            src_addr: self.endpoint.addr,
            dst_addr,
            ethertype,
        };

        let mut buffer = vec![0; ethernet_frame::buffer_len(payload.len())];
        let frame = ethernet_frame::new_unchecked_mut(&mut buffer);
        repr.emit(frame);
        frame.payload_mut_slice().copy_from_slice(payload);

        net_trace!("eth: {}", repr);
        Ok(self.device.transmit(&buffer)?)
    }
}
