//! The ethernet layer.
//!
//! This is tasked with decoding the framed ethernet data that the physical device deals with, and
//! putting upper layer data into an ethernet framing. The state and logic within the ethernet
//! endpoint is tiny compared to other layers: it knows our hardware address, filters frames not
//! meant for us and writes frames to the device.
mod endpoint;

pub use endpoint::{
    Endpoint,
    Inbound,
    Sender,
};
