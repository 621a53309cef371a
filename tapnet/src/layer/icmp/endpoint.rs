use crate::layer::{ip, Result};
use crate::wire::{icmpv4_packet, Icmpv4Repr, IpProtocol, Ipv4Repr};

/// An icmp traffic handler.
#[derive(Debug, Default)]
pub struct Endpoint {
    /// Echo requests are dropped unanswered.
    silent: bool,

    /// The number of echo requests answered.
    answered: u64,
}

impl Endpoint {
    /// Create a new endpoint that answers echo requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to drop echo requests instead of answering them.
    pub fn silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// The number of echo requests answered so far.
    pub fn answered(&self) -> u64 {
        self.answered
    }

    /// Handle the payload of a datagram carrying icmp.
    ///
    /// The checksum is verified before anything else; a mismatch drops the message.
    pub fn receive(&mut self, header: &Ipv4Repr, payload: &[u8], ip: &mut dyn ip::Send)
        -> Result<()>
    {
        let packet = icmpv4_packet::new_checked(payload)?;
        let repr = Icmpv4Repr::parse(packet)?;

        match repr {
            Icmpv4Repr::EchoRequest { ident, seq_no, data } => {
                if self.silent {
                    return Ok(())
                }

                let reply = Icmpv4Repr::EchoReply { ident, seq_no, data };
                let mut buffer = vec![0; reply.buffer_len()];
                reply.emit(icmpv4_packet::new_unchecked_mut(&mut buffer));

                let socket = ip::Socket {
                    protocol: IpProtocol::Icmp,
                    src_addr: header.dst_addr,
                    dst_addr: header.src_addr,
                };
                net_trace!("icmp: echo reply to {} ident={} seq={}", header.src_addr, ident, seq_no);
                ip.send(socket, &buffer)?;
                self.answered += 1;
            },
            Icmpv4Repr::EchoReply { ident, seq_no, .. } => {
                net_debug!("icmp: echo reply from {} ident={} seq={}", header.src_addr, ident, seq_no);
            },
            Icmpv4Repr::DstUnreachable { code } => {
                net_warn!("icmp: {} reports destination unreachable (code {})", header.src_addr, code);
            },
            Icmpv4Repr::TimeExceeded { code } => {
                net_warn!("icmp: {} reports time exceeded (code {})", header.src_addr, code);
            },
        }

        Ok(())
    }
}
