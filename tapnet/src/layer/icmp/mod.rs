//! Receiving and sending Icmp messages.
//!
//! Only supports Icmpv4.
//!
//! Tuned to automate the icmp procedures *internally*: echo requests are answered with a reply
//! carrying the identifier, sequence number and data of the request. Error messages about our own
//! traffic (destination unreachable, time exceeded) are reported to the log. Everything else is
//! silently discarded, in accordance with RFC1812:
//!
//! > 4.3.2.1 Unknown Message Types
//!
//!   If an ICMP message of unknown type is received, it MUST be passed to
//!   the ICMP user interface (if the router has one) or silently discarded
//!   (if the router does not have one).
mod endpoint;

pub use endpoint::Endpoint;
