//! Encapsulates a network interface card.
//!
//! The stack talks to a device only in whole Ethernet frames: it writes a complete frame with
//! [`Device::transmit`] and polls for one with [`Device::receive`], which must not block. A
//! dispatcher that wants to sleep until the device becomes readable uses the descriptor from
//! [`Device::raw_fd`] where the device has one.
//!
//! [`Device::transmit`]: trait.Device.html#tymethod.transmit
//! [`Device::receive`]: trait.Device.html#tymethod.receive
//! [`Device::raw_fd`]: trait.Device.html#method.raw_fd
use core::fmt;
use std::io;

pub mod loopback;
mod personality;

#[cfg(target_os = "linux")]
#[path="sys/mod.rs"]
mod sys_internal;

pub use self::loopback::Loopback;
pub use self::personality::Personality;

#[cfg(target_os = "linux")]
pub use self::sys_internal::exports as sys;

/// An error reported by a device.
#[derive(Debug)]
pub enum Error {
    /// The operating system refused an operation on the device.
    Io(io::Error),

    /// A frame exceeds what the device can carry.
    TooLarge,

    /// The device has no room to queue another frame.
    Exhausted,
}

/// The result type of device operations.
pub type Result<T> = core::result::Result<T, Error>;

/// A layer 2 device.
pub trait Device {
    /// A description of the device.
    fn personality(&self) -> Personality;

    /// Write one complete Ethernet frame.
    ///
    /// Returns the number of bytes the device accepted.
    fn transmit(&mut self, frame: &[u8]) -> Result<usize>;

    /// Read one Ethernet frame into `buffer` if one is available.
    ///
    /// Returns `Ok(None)` instead of blocking when there is nothing to read.
    fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<usize>>;

    /// A descriptor that becomes readable when frames arrive.
    #[cfg(unix)]
    fn raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
        None
    }
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn personality(&self) -> Personality {
        (**self).personality()
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<usize> {
        (**self).transmit(frame)
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<usize>> {
        (**self).receive(buffer)
    }

    #[cfg(unix)]
    fn raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
        (**self).raw_fd()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "device i/o: {}", err),
            Error::TooLarge => write!(f, "frame exceeds the device mtu"),
            Error::Exhausted => write!(f, "device queue exhausted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
