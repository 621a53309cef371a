//! A user-space TCP/IPv4 network stack running over a tap interface.
//!
//! ## Table of contents
//!
//! 1. [Design](#design-and-relevant-core-concepts)
//! 2. [The wire module](wire/index.html)
//! 3. [The layers](layer/index.html)
//!    1. [Arp](layer/arp/index.html)
//!    1. [Ip](layer/ip/index.html)
//!    1. [Tcp](layer/tcp/index.html)
//! 4. [Network interfaces](nic/index.html)
//! 5. [The stack context](stack/index.html)
//!
//! ## Design and relevant core concepts
//!
//! All protocol state of one interface lives in a single [`Interface`] value: the device, the
//! link and address layer endpoints, the arp cache and the tcp connection registry. Every method
//! that processes a frame or a timer tick takes `&mut Interface` and the current [`Instant`], so
//! the complete stack is deterministic and can be driven by hand in tests.
//!
//! The [`Stack`] wraps an interface behind one coarse lock and drives it from three threads: one
//! that polls the device and dispatches inbound frames, a fast timer (delayed acknowledgements)
//! and a slow timer (retransmission, arp retries, `TIME-WAIT` expiry). No processing ever happens
//! outside the lock, so inbound frames and timer sweeps are strictly serialized.
//!
//! Malformed input is never fatal. Every parse or validation failure yields an `Err` which drops
//! the offending packet and is reported through the `log` facade.
//!
//! [`Interface`]: stack/struct.Interface.html
//! [`Stack`]: stack/struct.Stack.html
//! [`Instant`]: time/struct.Instant.html
#![warn(missing_docs)]
#![warn(unreachable_pub)]

#[cfg(feature = "log")]
#[macro_use]
extern crate log;

#[macro_use] mod macros;
pub mod layer;
pub mod nic;
pub mod stack;
pub mod storage;
pub mod time;
pub mod wire;

pub use self::stack::{Config, Interface, Stack};
