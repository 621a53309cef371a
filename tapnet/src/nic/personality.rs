/// A general description of a device.
///
/// The interaction with these happens purely via methods. This leaves the implementation open to
/// additions in the future.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Personality {
    mtu: usize,
}

impl Personality {
    /// The mtu of plain Ethernet.
    pub const ETHERNET_MTU: usize = 1500;

    /// A personality with no extras and the Ethernet mtu.
    pub fn baseline() -> Self {
        Personality {
            mtu: Self::ETHERNET_MTU,
        }
    }

    /// A personality with a specific mtu.
    pub fn with_mtu(mtu: usize) -> Self {
        Personality { mtu }
    }

    /// The largest ip datagram the device carries, excluding the Ethernet header.
    pub fn mtu(&self) -> usize {
        self.mtu
    }
}

impl Default for Personality {
    fn default() -> Self {
        Personality::baseline()
    }
}
