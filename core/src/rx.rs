//! Receive channel worker.
//!
//! One worker per receive stream, each owning its modem, sliding window, and
//! source handle outright. The loop is a fixed cycle: FILL the window with
//! one demodulator call's worth of soft decisions, SEARCH the freshly
//! exposed region for the unique word, VALIDATE the candidate through the
//! length footer, EXTRACT and hand off the packet on success, then SHIFT (the
//! next fill's push discards the oldest chunk). The worker ends when the
//! source does; siblings are unaffected.
//!
//! Completed packets go into a bounded queue whose single drain consumer
//! writes to the device, so concurrent workers never race on the device's
//! write side.

use std::io::{self, Read};
use std::sync::mpsc::SyncSender;

use log::{debug, trace, warn};

use crate::error::{BridgeError, Result};
use crate::frame::{DecodeOutcome, FrameDecoder, RejectReason};
use crate::modem::{Iq, Modem};
use crate::sync::correlate_soft;
use crate::window::BitWindow;
use crate::{FRAME_MAX_BITS, UW_BITS};

pub struct RxWorker<R> {
    source: R,
    modem: Box<dyn Modem + Send>,
    window: BitWindow,
    packets: SyncSender<Vec<u8>>,
    label: String,
    byte_buf: Vec<u8>,
    iq_buf: Vec<Iq>,
    soft_buf: Vec<f32>,
}

impl<R: Read> RxWorker<R> {
    /// Build a worker around an exclusively owned source and modem.
    ///
    /// The window retains one maximum frame's bits of history so a frame can
    /// straddle any number of demodulator calls.
    pub fn new(
        source: R,
        modem: Box<dyn Modem + Send>,
        packets: SyncSender<Vec<u8>>,
        label: impl Into<String>,
    ) -> Result<Self> {
        let chunk = modem.bits_per_call();
        if chunk == 0 || chunk > FRAME_MAX_BITS {
            return Err(BridgeError::InvalidConfig(format!(
                "modem produces {} bits per call, outside 1..={}",
                chunk, FRAME_MAX_BITS
            )));
        }
        if 2 * chunk < UW_BITS {
            return Err(BridgeError::InvalidConfig(format!(
                "modem produces {} bits per call; the {}-bit unique word \
                 cannot fit the search region",
                chunk, UW_BITS
            )));
        }

        let nin = modem.samples_needed();
        Ok(Self {
            source,
            window: BitWindow::new(FRAME_MAX_BITS, chunk),
            packets,
            label: label.into(),
            byte_buf: vec![0u8; nin * 8],
            iq_buf: vec![Iq::default(); nin],
            soft_buf: vec![0.0f32; chunk],
            modem,
        })
    }

    /// Run until the source ends or the drain side goes away.
    pub fn run(mut self) {
        loop {
            // FILL
            let nin = self.modem.samples_needed();
            if !self.fill(nin) {
                break;
            }
            let chunk = self.modem.bits_per_call();
            self.modem
                .demodulate(&self.iq_buf[..nin], &mut self.soft_buf[..chunk]);
            self.window.push(&self.soft_buf[..chunk]);

            // SEARCH the region spanning the new chunk plus one chunk of
            // history, so a unique word crossing the call boundary is seen
            // whole. The region slides with the window, so the discarded
            // prefix is never revisited.
            let search_start = self.window.history() - chunk;
            let candidate = match correlate_soft(&self.window.soft()[search_start..]) {
                Some(m) => m,
                None => continue,
            };
            let uw_pos = search_start + candidate.offset;

            // VALIDATE + EXTRACT
            match FrameDecoder::decode(self.window.hard(), self.window.soft(), uw_pos) {
                DecodeOutcome::Accepted(packet) => {
                    debug!(
                        "{}: packet of {} bytes, EbNo={:.2} dB",
                        self.label,
                        packet.len(),
                        self.modem.ebno_db()
                    );
                    if self.packets.send(packet).is_err() {
                        warn!("{}: packet drain is gone, stopping", self.label);
                        break;
                    }
                    // Consume the frame so its unique word cannot fire again
                    // on the next iteration.
                    self.window.clear_prefix(uw_pos);
                }
                DecodeOutcome::Rejected(RejectReason::IdleFiller) => {
                    // Expected over idle filler, routinely at stream start.
                    trace!("{}: zero-length candidate over filler", self.label);
                }
                DecodeOutcome::Rejected(reason) => {
                    trace!(
                        "{}: false alarm at offset {}: {:?}, EbNo={:.2} dB",
                        self.label,
                        uw_pos,
                        reason,
                        self.modem.ebno_db()
                    );
                }
            }
            // SHIFT happens as the next push discards the oldest chunk.
        }
        debug!("{}: source ended, worker exiting", self.label);
    }

    /// Read exactly one call's samples (32-bit float interleaved I/Q).
    /// Returns false on end of stream or a source error.
    fn fill(&mut self, nin: usize) -> bool {
        let need = nin * 8;
        if self.byte_buf.len() < need {
            self.byte_buf.resize(need, 0);
            self.iq_buf.resize(nin, Iq::default());
        }
        match self.source.read_exact(&mut self.byte_buf[..need]) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return false,
            Err(e) => {
                warn!("{}: source read failed: {}", self.label, e);
                return false;
            }
        }
        for (i, sample) in self.iq_buf[..nin].iter_mut().enumerate() {
            let b = &self.byte_buf[i * 8..i * 8 + 8];
            sample.re = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            sample.im = f32::from_le_bytes([b[4], b[5], b[6], b[7]]);
        }
        true
    }
}
