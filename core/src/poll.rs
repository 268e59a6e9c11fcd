//! Readiness multiplexing over `poll(2)`.
//!
//! The transmit scheduler blocks here with no timeout, watching the device's
//! read side and every transmit sink's write side at once. The wrapper keeps
//! the descriptor set reusable across iterations so the hot loop does not
//! allocate.

use std::io;
use std::os::unix::io::RawFd;

/// One reusable descriptor set.
pub struct PollFds {
    fds: Vec<libc::pollfd>,
}

impl PollFds {
    pub fn new() -> Self {
        Self { fds: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.fds.clear();
    }

    /// Watch `fd` for readability. Returns the slot index for result lookup.
    pub fn push_read(&mut self, fd: RawFd) -> usize {
        self.push(fd, libc::POLLIN)
    }

    /// Watch `fd` for writability. Returns the slot index for result lookup.
    pub fn push_write(&mut self, fd: RawFd) -> usize {
        self.push(fd, libc::POLLOUT)
    }

    fn push(&mut self, fd: RawFd, events: libc::c_short) -> usize {
        self.fds.push(libc::pollfd {
            fd,
            events,
            revents: 0,
        });
        self.fds.len() - 1
    }

    /// Block until at least one watched descriptor is ready. No timeout;
    /// interrupted waits are retried.
    pub fn wait(&mut self) -> io::Result<()> {
        loop {
            let rc = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, -1) };
            if rc >= 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Whether the slot's descriptor came back readable (or failed, which a
    /// subsequent read surfaces properly).
    pub fn readable(&self, slot: usize) -> bool {
        self.fds[slot].revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0
    }

    /// Whether the slot's descriptor came back writable (or failed, which a
    /// subsequent write surfaces properly).
    pub fn writable(&self, slot: usize) -> bool {
        self.fds[slot].revents & (libc::POLLOUT | libc::POLLERR | libc::POLLHUP) != 0
    }
}

impl Default for PollFds {
    fn default() -> Self {
        Self::new()
    }
}
