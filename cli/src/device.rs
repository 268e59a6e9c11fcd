//! Linux TUN/TAP device.
//!
//! Opens the clone device and binds an interface name with `TUNSETIFF`.
//! `IFF_NO_PI` keeps the packet-info header off the stream so one read or
//! write moves exactly one raw packet. Address/route setup is left to the
//! operator (`ip addr`, `ip link`).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};

use clap::ValueEnum;

use fskbridge_core::device::PacketDevice;

const TUNSETIFF: libc::c_ulong = 0x4004_54ca;
const IFF_TUN: libc::c_short = 0x0001;
const IFF_TAP: libc::c_short = 0x0002;
const IFF_NO_PI: libc::c_short = 0x1000;

/// TUN carries IP packets; TAP carries Ethernet frames for link-level work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TunMode {
    Tun,
    Tap,
}

pub struct TunDevice {
    file: File,
    name: String,
}

impl TunDevice {
    /// Create the virtual interface. Requires CAP_NET_ADMIN.
    pub fn create(name: &str, mode: TunMode) -> io::Result<Self> {
        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        if name.len() >= ifr.ifr_name.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("interface name {:?} is too long", name),
            ));
        }
        for (dst, src) in ifr.ifr_name.iter_mut().zip(name.bytes()) {
            *dst = src as libc::c_char;
        }
        ifr.ifr_ifru.ifru_flags = match mode {
            TunMode::Tun => IFF_TUN,
            TunMode::Tap => IFF_TAP,
        } | IFF_NO_PI;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/net/tun")?;
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), TUNSETIFF as _, &ifr) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            file,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PacketDevice for TunDevice {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.file).read(buf)
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.file).write(buf)
    }

    fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
