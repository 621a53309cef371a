// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
use std::os::unix::io::{RawFd, AsRawFd};

use libc;
use super::{Errno, FdResult, IoLenResult, LibcResult, ifreq};

use crate::nic::{self, Device, Personality};

/// A static descriptor for interacting with a tap interface.
///
/// Contains the file descriptor and a pre-filled `ifreq` structure with the interface name that is
/// required for `ioctl` calls. This offers the raw methods for reading and writing but does not
/// encapsulate an actual `nic::Device`. Wrap it in a [`TapInterface`] for this.
///
/// [`TapInterface`]: struct.TapInterface.html
#[derive(Debug)]
pub struct TapInterfaceDesc {
    lower: libc::c_int,
    ifreq: ifreq
}

/// A tap interface usable as a network device.
///
/// Writes block until the kernel took the frame, reads never block. Use the raw descriptor with
/// [`sys_wait`] to sleep until a frame arrives.
///
/// [`sys_wait`]: fn.sys_wait.html
#[derive(Debug)]
pub struct TapInterface {
    inner: TapInterfaceDesc,
    personality: Personality,
}

impl AsRawFd for TapInterfaceDesc {
    fn as_raw_fd(&self) -> RawFd {
        self.lower
    }
}

impl AsRawFd for TapInterface {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

static TAP_PATH: &'static [u8] = b"/dev/net/tun\0";

impl TapInterfaceDesc {
    /// Try to open a descriptor for the named interface.
    ///
    /// Note that this does *not* yet set the interface for the file descriptor, it only creates
    /// the necessary structures involved in doing so. Call [`attach_interface`] afterwards.
    ///
    /// [`attach_interface`]: #method.attach_interface
    pub fn new(name: &str) -> Result<TapInterfaceDesc, Errno> {
        let lower = unsafe {
            libc::open(
                TAP_PATH.as_ptr() as *const libc::c_char,
                libc::O_RDWR | libc::O_NONBLOCK)
        };

        FdResult(lower).errno()?;

        Ok(TapInterfaceDesc {
            lower,
            ifreq: ifreq::new(name),
        })
    }

    /// Update the file descriptor to the named interface.
    ///
    /// See `ioctl` with `TUNSETIFF` for details on errors.
    pub fn attach_interface(&mut self) -> Result<(), Errno> {
        self.ifreq.attach_tap(self.lower)
    }

    /// Try to find the mtu of the tap.
    ///
    /// Works by opening an `AF_INET/PROTO_IP` socket and querying the mtu of the named interface
    /// through it.
    pub fn interface_mtu(&mut self) -> Result<usize, Errno> {
        let lower = unsafe {
            libc::socket(libc::AF_INET, libc::SOCK_DGRAM, libc::IPPROTO_IP)
        };

        FdResult(lower).errno()?;

        let mtu = self.ifreq.mtu(lower);

        unsafe { libc::close(lower); }

        mtu
    }

    /// Receive a single message on the tap into the buffer.
    pub fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, Errno> {
        let len = unsafe {
            libc::read(
                self.lower,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len())
        };
        IoLenResult(len).errno()?;
        Ok(len as usize)
    }

    /// Send a single message onto the tap from the buffer.
    pub fn send(&mut self, buffer: &[u8]) -> Result<usize, Errno> {
        let len = unsafe {
            libc::write(
                self.lower,
                buffer.as_ptr() as *const libc::c_void,
                buffer.len())
        };
        IoLenResult(len).errno()?;
        Ok(len as usize)
    }
}

impl TapInterface {
    /// Open a tap interface by name.
    ///
    /// The mtu is queried from the kernel, falling back to the Ethernet default when the
    /// interface does not report one.
    pub fn new(name: &str) -> Result<Self, Errno> {
        let inner = TapInterfaceDesc::new(name)?;
        Self::with_descriptor(inner)
    }

    /// Wrap an existing descriptor into a device.
    pub fn with_descriptor(mut inner: TapInterfaceDesc) -> Result<Self, Errno> {
        inner.attach_interface()?;
        let personality = match inner.interface_mtu() {
            Ok(mtu) => Personality::with_mtu(mtu),
            Err(err) => {
                net_debug!("tap: no mtu reported ({}), assuming ethernet", err);
                Personality::baseline()
            },
        };
        Ok(TapInterface {
            inner,
            personality,
        })
    }

    /// Override the mtu used for outgoing frames.
    pub fn set_mtu(&mut self, mtu: usize) {
        self.personality = Personality::with_mtu(mtu);
    }
}

impl Drop for TapInterfaceDesc {
    fn drop(&mut self) {
        unsafe { libc::close(self.lower); }
    }
}

impl Device for TapInterface {
    fn personality(&self) -> Personality {
        self.personality.clone()
    }

    fn transmit(&mut self, frame: &[u8]) -> nic::Result<usize> {
        Ok(self.inner.send(frame)?)
    }

    fn receive(&mut self, buffer: &mut [u8]) -> nic::Result<Option<usize>> {
        match self.inner.recv(buffer) {
            Ok(len) => Ok(Some(len)),
            Err(ref err) if err.0 == libc::EWOULDBLOCK => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.as_raw_fd())
    }
}
