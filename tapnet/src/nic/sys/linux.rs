// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
use super::{ifreq, Errno, LibcResult, IoctlResult};
use libc;

const SIOCGIFMTU: libc::Ioctl = 0x8921;
const TUNSETIFF: libc::Ioctl = 0x400454CA;

/// Flags of `TUNSETIFF`: an ethernet level device without packet information prefix.
const TAP_NO_PI: libc::c_int = 0x0002 | 0x1000;

/// The interface name followed by the union member an ioctl reads or writes.
#[repr(C)]
struct Request {
    interface: ifreq,
    value: libc::c_int,
}

impl ifreq {
    /// Bind `fd`, an open `/dev/net/tun`, to the named tap. Creates the tap if it does not exist.
    pub(crate) fn attach_tap(&self, fd: libc::c_int) -> Result<(), Errno> {
        self.ioctl(fd, TUNSETIFF, TAP_NO_PI).map(drop)
    }

    /// Query the mtu of the named interface through any socket `fd`.
    pub(crate) fn mtu(&self, fd: libc::c_int) -> Result<usize, Errno> {
        self.ioctl(fd, SIOCGIFMTU, 0).map(|mtu| mtu as usize)
    }

    fn ioctl(&self, fd: libc::c_int, op: libc::Ioctl, value: libc::c_int) -> Result<libc::c_int, Errno> {
        let mut request = Request { interface: *self, value };
        let res = unsafe { libc::ioctl(fd, op, &mut request as *mut Request) };
        IoctlResult(res).errno()?;
        Ok(request.value)
    }
}
