//! Transmit channels and the scheduler that multiplexes them.
//!
//! All transmit channels are driven by one blocking loop: it waits on the
//! device's read side (only while no packet is waiting for a free channel)
//! and on every sink's write side at once. Each writable sink gets exactly
//! one modem quantum of bits modulated and written per wakeup, with the bit
//! queue topped up by alternating idle filler so the modulator never
//! starves. A single-slot backlog provides the backpressure: while it is
//! occupied the device is not read, and the backlog gets the first chance at
//! a freed channel on every iteration.

use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::sync::Arc;

use log::{debug, warn};

use crate::device::PacketDevice;
use crate::error::Result;
use crate::frame::FrameEncoder;
use crate::modem::{Iq, Modem, SampleFormat};
use crate::poll::PollFds;
use crate::{FRAME_MAX_BITS, MTU, UW_BITS};

/// Outcome of offering a packet to the transmit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assign {
    Queued,
    Rejected(AssignReject),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignReject {
    /// Every channel still has real data queued; retry once one drains.
    AllChannelsBusy,
    /// The packet cannot be framed at all; dropping it is the only option.
    Oversize,
}

/// One transmit endpoint: modem, sink, and a flat bit queue.
///
/// The queue is allocated once and always full: real frame bits occupy the
/// front `queued` positions, idle filler the rest. Draining shifts the queue
/// left by one quantum and refills the tail with filler.
pub struct TxChannel<W: Write> {
    sink: W,
    fd: RawFd,
    modem: Box<dyn Modem + Send>,
    format: SampleFormat,
    bits: Vec<u8>,
    /// Real (non-filler) bits still queued.
    queued: usize,
    scratch_iq: Vec<Iq>,
    scratch_bytes: Vec<u8>,
    active: bool,
    label: String,
}

impl<W: Write> TxChannel<W> {
    pub fn new(
        sink: W,
        fd: RawFd,
        modem: Box<dyn Modem + Send>,
        format: SampleFormat,
        label: impl Into<String>,
    ) -> Self {
        let capacity = 2 * (FRAME_MAX_BITS + modem.bits_per_call());
        Self {
            sink,
            fd,
            format,
            bits: (0..capacity).map(|i| (i % 2) as u8).collect(),
            queued: 0,
            scratch_iq: vec![Iq::default(); modem.samples_per_call()],
            scratch_bytes: Vec::new(),
            active: true,
            label: label.into(),
            modem,
        }
    }

    /// A channel is free once only idle filler (at most one trailing unique
    /// word) remains queued.
    pub fn is_free(&self) -> bool {
        self.active && self.queued <= UW_BITS
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Real data bits still queued.
    pub fn queued_bits(&self) -> usize {
        self.queued
    }

    /// Frame a packet and queue its bits, overwriting filler. The caller
    /// must have checked [`Self::is_free`].
    ///
    /// When the previous frame's postamble has not fully drained, its unique
    /// word doubles as this frame's preamble and the leading unique word is
    /// elided.
    pub fn enqueue(&mut self, packet: &[u8]) -> Result<()> {
        let uw_pending = self.queued > 0;
        let frame = FrameEncoder::encode(packet, uw_pending)?;
        self.bits[self.queued..self.queued + frame.len()].copy_from_slice(&frame);
        self.queued += frame.len();
        Ok(())
    }

    /// Drain one modem quantum: modulate the queue head, write the samples,
    /// refill the tail with idle filler.
    pub fn service(&mut self) -> io::Result<()> {
        let n = self.modem.bits_per_call();
        self.modem.modulate(&self.bits[..n], &mut self.scratch_iq);
        self.format
            .write_samples(&self.scratch_iq, &mut self.scratch_bytes, &mut self.sink)?;

        self.bits.copy_within(n.., 0);
        let tail = self.bits.len() - n;
        for i in 0..n {
            self.bits[tail + i] = (i % 2) as u8;
        }
        self.queued = self.queued.saturating_sub(n);
        Ok(())
    }

    /// The sink, for inspection by tools and tests.
    pub fn sink(&self) -> &W {
        &self.sink
    }

    fn deactivate(&mut self) {
        self.active = false;
    }
}

/// The transmit-side control loop.
pub struct TxScheduler<W: Write> {
    device: Arc<dyn PacketDevice>,
    channels: Vec<TxChannel<W>>,
    /// Single-slot backlog; while occupied the device is not read.
    pending: Option<Vec<u8>>,
    read_buf: Vec<u8>,
}

impl<W: Write> TxScheduler<W> {
    pub fn new(device: Arc<dyn PacketDevice>, channels: Vec<TxChannel<W>>) -> Self {
        Self {
            device,
            channels,
            pending: None,
            read_buf: vec![0u8; MTU],
        }
    }

    /// Offer a packet to the first free channel.
    pub fn try_assign(&mut self, packet: &[u8]) -> Assign {
        for ch in self.channels.iter_mut().filter(|ch| ch.is_free()) {
            match ch.enqueue(packet) {
                Ok(()) => {
                    debug!(
                        "{}: queued {} byte packet ({} bits outstanding)",
                        ch.label,
                        packet.len(),
                        ch.queued
                    );
                    return Assign::Queued;
                }
                Err(e) => {
                    warn!("{}: cannot frame {} byte packet: {}", ch.label, packet.len(), e);
                    return Assign::Rejected(AssignReject::Oversize);
                }
            }
        }
        Assign::Rejected(AssignReject::AllChannelsBusy)
    }

    /// Run the loop until the device fails or every channel has died.
    pub fn run(&mut self) -> Result<()> {
        let mut fds = PollFds::new();
        loop {
            fds.clear();
            let device_slot = if self.pending.is_none() {
                Some(fds.push_read(self.device.raw_fd()))
            } else {
                None
            };

            let mut channel_slots = Vec::new();
            for (idx, ch) in self.channels.iter().enumerate() {
                if ch.is_active() {
                    channel_slots.push((idx, fds.push_write(ch.fd)));
                }
            }
            if channel_slots.is_empty() {
                warn!("all transmit channels gone, scheduler stopping");
                return Ok(());
            }

            fds.wait()?;

            if let Some(slot) = device_slot {
                if fds.readable(slot) {
                    assert!(
                        self.pending.is_none(),
                        "logic error: device readable while a backlog packet is pending"
                    );
                    let n = self.device.recv(&mut self.read_buf)?;
                    debug!("{} byte packet from device", n);
                    let packet = self.read_buf[..n].to_vec();
                    match self.try_assign(&packet) {
                        Assign::Queued => {}
                        Assign::Rejected(AssignReject::AllChannelsBusy) => {
                            self.pending = Some(packet);
                        }
                        Assign::Rejected(AssignReject::Oversize) => {}
                    }
                    // Re-enter the wait so the freshly queued bits are
                    // drained under the same readiness discipline.
                    continue;
                }
            }

            // The backlog gets first chance at a freed channel.
            if let Some(packet) = self.pending.take() {
                match self.try_assign(&packet) {
                    Assign::Queued => {}
                    Assign::Rejected(AssignReject::AllChannelsBusy) => {
                        self.pending = Some(packet);
                    }
                    Assign::Rejected(AssignReject::Oversize) => {}
                }
            }

            for (idx, slot) in channel_slots {
                if fds.writable(slot) {
                    if let Err(e) = self.channels[idx].service() {
                        let ch = &mut self.channels[idx];
                        warn!("{}: sink write failed: {}, dropping channel", ch.label, e);
                        ch.deactivate();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::frame_bits;
    use crate::modem::LoopbackModem;
    use crate::sync::uw_pattern;

    struct NullDevice;

    impl PacketDevice for NullDevice {
        fn recv(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "test device"))
        }
        fn send(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn raw_fd(&self) -> RawFd {
            -1
        }
    }

    fn channel(bits_per_call: usize) -> TxChannel<Vec<u8>> {
        TxChannel::new(
            Vec::new(),
            -1,
            Box::new(LoopbackModem::new(bits_per_call)),
            SampleFormat::F32,
            "tx-test",
        )
    }

    fn scheduler(channels: Vec<TxChannel<Vec<u8>>>) -> TxScheduler<Vec<u8>> {
        TxScheduler::new(Arc::new(NullDevice), channels)
    }

    #[test]
    fn fresh_channel_is_free_and_queues_a_full_frame() {
        let mut ch = channel(64);
        assert!(ch.is_free());
        ch.enqueue(&[0xAB; 10]).unwrap();
        assert_eq!(ch.queued_bits(), frame_bits(10));
        assert!(!ch.is_free());
        // The frame starts with the unique word; filler follows the frame.
        assert_eq!(&ch.bits[..UW_BITS], &uw_pattern()[..]);
    }

    #[test]
    fn service_drains_one_quantum_and_refills_filler() {
        let mut ch = channel(64);
        ch.enqueue(&[0x11; 4]).unwrap();
        let before = ch.queued_bits();
        ch.service().unwrap();
        assert_eq!(ch.queued_bits(), before - 64);
        // One quantum of f32 I/Q samples hit the sink.
        assert_eq!(ch.sink.len(), 64 * 8);
        // The tail was refilled with alternating filler.
        let tail = &ch.bits[ch.bits.len() - 4..];
        assert_eq!(tail, &[0, 1, 0, 1]);
    }

    #[test]
    fn pending_postamble_elides_the_next_preamble() {
        let mut ch = channel(64);
        ch.enqueue(&[0x22; 3]).unwrap();
        // Drain until only the trailing unique word remains queued.
        while !ch.is_free() {
            ch.service().unwrap();
        }
        assert!(ch.queued_bits() > 0, "trailing UW should still be queued");

        let queued_before = ch.queued_bits();
        ch.enqueue(&[0x33; 3]).unwrap();
        assert_eq!(
            ch.queued_bits(),
            queued_before + frame_bits(3) - UW_BITS,
            "second frame must reuse the queued unique word as its preamble"
        );
    }

    #[test]
    fn no_double_assignment_while_real_data_is_queued() {
        let mut sched = scheduler(vec![channel(64)]);
        assert_eq!(sched.try_assign(&[0x44; 100]), Assign::Queued);
        assert_eq!(
            sched.try_assign(&[0x55; 100]),
            Assign::Rejected(AssignReject::AllChannelsBusy)
        );
    }

    #[test]
    fn two_ready_channels_both_drain_under_steady_load() {
        let mut sched = scheduler(vec![channel(64), channel(64)]);
        let mut assigned = 0usize;
        let mut rejected = 0usize;

        // Steady packet stream against both channels, servicing every
        // channel each round the way a writable poll result would.
        for round in 0..2000 {
            let packet = vec![(round % 256) as u8; 200];
            match sched.try_assign(&packet) {
                Assign::Queued => assigned += 1,
                Assign::Rejected(AssignReject::AllChannelsBusy) => rejected += 1,
                Assign::Rejected(other) => panic!("unexpected rejection: {:?}", other),
            }
            for ch in &mut sched.channels {
                ch.service().unwrap();
            }
        }

        assert!(assigned > 100, "both channels should keep accepting work");
        assert!(rejected > 0, "backpressure should kick in under load");
        // With the stream stopped, both channels drain to free.
        for _ in 0..200 {
            for ch in &mut sched.channels {
                ch.service().unwrap();
            }
        }
        for ch in &sched.channels {
            assert!(ch.is_free());
            assert!(ch.queued_bits() <= UW_BITS);
        }

        // Work was spread across both sinks, not pinned to one.
        assert!(sched.channels[0].sink.len() > 0);
        assert!(sched.channels[1].sink.len() > 0);
        let ratio = sched.channels[0].sink.len() as f64 / sched.channels[1].sink.len() as f64;
        assert!(ratio > 0.99 && ratio < 1.01, "service must stay balanced");
    }

    #[test]
    fn oversize_packet_is_rejected_not_queued() {
        let mut sched = scheduler(vec![channel(64)]);
        let oversize = vec![0u8; MTU + 1];
        assert_eq!(
            sched.try_assign(&oversize),
            Assign::Rejected(AssignReject::Oversize)
        );
        assert!(sched.channels[0].is_free());
        assert_eq!(sched.channels[0].queued_bits(), 0);
    }
}
