//! Network device seam.
//!
//! The virtual interface is consumed as a byte-oriented handle: one blocking
//! `recv` yields one packet's raw bytes, one `send` writes one packet.
//! Creation and ioctl plumbing live with whoever implements the trait (the
//! binary crate provides the Linux TUN/TAP version). The handle is passed
//! into the scheduler and the receive drain explicitly at construction; the
//! read and write sides are independent.

use std::io;
use std::os::unix::io::RawFd;

pub trait PacketDevice: Send + Sync {
    /// Blocking read of one packet. Returns the packet's byte length.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one packet.
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Raw descriptor for readiness polling of the read side.
    fn raw_fd(&self) -> RawFd;
}
