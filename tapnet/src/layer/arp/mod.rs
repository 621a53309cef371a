//! Receiving and sending ARP messages.
//!
//! Restricted to resolving the next hop addresses of the ipv4 layer and answering requests for
//! our own address. Datagrams whose next hop is still unknown are owned by the cache until the
//! reply arrives or the request is given up.
mod cache;
mod endpoint;

pub use cache::{
    Cache,
    Entry,
    Learned,
    Retries,
    State,
};

pub use endpoint::{
    Endpoint,
    Resolution,
    RETRY_INTERVAL,
    RETRY_LIMIT,
};
