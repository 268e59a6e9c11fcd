//! Packet bridge between a virtual network interface and half-duplex FSK
//! radio channels.
//!
//! Outbound packets are framed between 48-bit unique words, scrambled for DC
//! balance, and closed with a doubly Golay-protected length footer before
//! modulation; inbound soft-decision streams are scanned for the unique word
//! and validated through maximum-likelihood length recovery with an
//! agreement check. One worker per receive channel and a single readiness
//! driven scheduler across all transmit channels; best effort, one shot per
//! burst.

pub mod device;
pub mod error;
pub mod frame;
pub mod fsk;
pub mod golay;
pub mod length;
pub mod modem;
pub mod poll;
pub mod rx;
pub mod sync;
pub mod tx;
pub mod window;

pub use device::PacketDevice;
pub use error::{BridgeError, Result};
pub use frame::{DecodeOutcome, FrameDecoder, FrameEncoder, RejectReason};
pub use fsk::{FskModem, FskParams};
pub use modem::{Iq, LoopbackModem, Modem, SampleFormat};
pub use rx::RxWorker;
pub use tx::{Assign, AssignReject, TxChannel, TxScheduler};
pub use window::BitWindow;

/// Maximum payload bytes per packet/frame.
pub const MTU: usize = 1600;

/// ASCII tag the unique word is derived from. The tag anti-correlates with
/// the alternating idle filler at both bit alignments, so a correlation peak
/// over pure filler always decodes to the benign zero-length footer.
pub const UW_TAG: [u8; 6] = *b"jn8bz2";

/// Unique-word length in bits; the same word opens and closes every frame.
pub const UW_BITS: usize = UW_TAG.len() * 8;

/// Length footer: two bit-interleaved Golay(23,12) codewords.
pub const FOOTER_BITS: usize = 46;

/// Payload line-coding mask; XOR is its own inverse.
pub const SCRAMBLE_MASK: u8 = 0x55;

/// Mask applied to the length before encoding the second footer codeword.
pub const LENGTH_FLIP_MASK: u16 = 0x0FFF;

/// Bits in a maximum-size frame, unique words included.
pub const FRAME_MAX_BITS: usize = UW_BITS + MTU * 8 + FOOTER_BITS + UW_BITS;

/// Channel count limit per direction.
pub const MAX_CHANNELS: usize = 16;
