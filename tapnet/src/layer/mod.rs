//! The process logic of protocol layers.
//!
//! ## Layering
//!
//! Each protocol layer is split into two parts; the packet logic contained in `wire` and the
//! processing part in this module. An endpoint represents the local state of a protocol. This
//! state can be used to process packets of that layer. The state is open to modifications as part
//! of a user program while processing does not take place, similar to reconfiguration on the OS
//! level with utilities such as `arp`, `ifconfig`, etc.
//!
//! ## Receiving
//!
//! An inbound frame travels upwards: [`eth`] strips the Ethernet header and hands the payload to
//! [`arp`] or [`ip`], which in turn dispatches to [`tcp`] or [`icmp`]. Every step returns a
//! [`Result`]; an `Err` drops the frame and nothing else.
//!
//! ## Sending
//!
//! Upper layers never touch the device. They hand a finished payload to the layer below through
//! a borrowed sender: [`tcp`] and [`icmp`] write into an [`ip::Send`] implementation, the ip
//! sender resolves the next hop through [`arp`] and the arp endpoint finally writes frames with
//! an [`eth::Sender`]. A datagram whose next hop is still unresolved is parked in the arp cache
//! and reported as [`ip::Delivery::Deferred`], which is not an error.
//!
//! [`eth`]: eth/index.html
//! [`arp`]: arp/index.html
//! [`ip`]: ip/index.html
//! [`tcp`]: tcp/index.html
//! [`icmp`]: icmp/index.html
//! [`Result`]: type.Result.html
//! [`ip::Send`]: ip/trait.Send.html
//! [`eth::Sender`]: eth/struct.Sender.html
//! [`ip::Delivery::Deferred`]: ip/enum.Delivery.html#variant.Deferred
use core::fmt;

pub mod arp;
pub mod eth;
pub mod icmp;
pub mod ip;
pub mod tcp;

/// The result type of all layer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The errors of processing packets and of the application surface.
///
/// None of them is fatal to the stack. An error while processing an inbound packet means the
/// packet was dropped; an error returned to the application concerns only that call or that
/// connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// A checksum (ipv4, tcp or icmp) did not verify.
    ChecksumMismatch,

    /// The packet violates its protocol or uses an unsupported feature of it.
    ///
    /// Examples are arp packets for a hardware or protocol type other than Ethernet/IPv4, or tcp
    /// options of unknown kind.
    ProtocolViolation,

    /// A tcp segment arrived for a 4-tuple without connection.
    NoMatchingConnection,

    /// A tcp segment did not pass the sequence acceptance test and was answered with an ack.
    SequenceOutOfWindow,

    /// The peer reset the connection.
    PeerReset,

    /// The peer refused the connection.
    PeerRefused,

    /// No buffer could be allocated for a packet.
    AllocationFailure,

    /// Unable to find a route towards the destination address.
    Unreachable,

    /// Not enough space for the requested packet.
    BadSize,

    /// The operation was not permitted.
    ///
    /// Returned when the connection state or endpoint configuration does not allow an
    /// operation, for example sending on a connection that already sent its FIN.
    Illegal,

    /// The action could not be completed because there were not enough resources.
    ///
    /// The main difference towards `Illegal` is that implies that it would have been legal with
    /// more resources.
    Exhausted,

    /// The connection handle does not refer to any connection.
    InvalidHandle,

    /// The connection was closed in an orderly manner.
    Closed,

    /// The device failed to transmit or receive.
    Io,
}

/// Can convert from a wire error.
///
/// This indicates some layer tried to parse a packet but failed.
impl From<crate::wire::Error> for Error {
    fn from(err: crate::wire::Error) -> Self {
        match err {
            crate::wire::Error::WrongChecksum => Error::ChecksumMismatch,
            _ => Error::ProtocolViolation,
        }
    }
}

/// Can convert from a device error.
impl From<crate::nic::Error> for Error {
    fn from(err: crate::nic::Error) -> Self {
        match err {
            crate::nic::Error::Io(_) => Error::Io,
            crate::nic::Error::TooLarge => Error::BadSize,
            crate::nic::Error::Exhausted => Error::Exhausted,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Error::ChecksumMismatch => "checksum mismatch",
            Error::ProtocolViolation => "protocol violation",
            Error::NoMatchingConnection => "no matching connection",
            Error::SequenceOutOfWindow => "sequence number out of window",
            Error::PeerReset => "connection reset by peer",
            Error::PeerRefused => "connection refused by peer",
            Error::AllocationFailure => "packet allocation failed",
            Error::Unreachable => "destination unreachable",
            Error::BadSize => "bad packet size",
            Error::Illegal => "illegal operation",
            Error::Exhausted => "resources exhausted",
            Error::InvalidHandle => "invalid connection handle",
            Error::Closed => "connection closed",
            Error::Io => "device i/o error",
        })
    }
}

impl std::error::Error for Error {}
