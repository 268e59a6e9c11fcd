//! End-to-end receive-path tests: framed packets rendered to sample streams
//! and recovered through the worker's sliding-window pipeline.

use std::io::Cursor;
use std::sync::mpsc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use fskbridge_core::frame::FrameEncoder;
use fskbridge_core::fsk::{FskModem, FskParams};
use fskbridge_core::modem::{LoopbackModem, Modem, SampleFormat};
use fskbridge_core::rx::RxWorker;
use fskbridge_core::tx::TxChannel;
use fskbridge_core::MTU;

/// Render bits as the f32 I/Q stream a loopback-modulated source carries,
/// with optional additive noise on the in-phase component.
fn loopback_stream(bits: &[u8], noise_sigma: f32, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0f32, noise_sigma.max(1e-9)).unwrap();
    let mut out = Vec::with_capacity(bits.len() * 8);
    for &b in bits {
        let mut re: f32 = if b == 1 { -1.0 } else { 1.0 };
        if noise_sigma > 0.0 {
            re += noise.sample(&mut rng);
        }
        out.extend_from_slice(&re.to_le_bytes());
        out.extend_from_slice(&0.0f32.to_le_bytes());
    }
    out
}

fn idle(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 2) as u8).collect()
}

/// Run a stream through a fresh receive worker and collect every packet.
fn receive_all(source: Vec<u8>, modem: Box<dyn Modem + Send>) -> Vec<Vec<u8>> {
    let (tx, rx) = mpsc::sync_channel(16);
    let worker = RxWorker::new(Cursor::new(source), modem, tx, "rx-test").unwrap();
    worker.run();
    rx.iter().collect()
}

#[test]
fn concrete_three_byte_scenario() {
    let payload = vec![0x01u8, 0x02, 0x03];
    let mut bits = idle(200);
    bits.extend(FrameEncoder::encode(&payload, false).unwrap());
    bits.extend(idle(200));

    let packets = receive_all(
        loopback_stream(&bits, 0.0, 0),
        Box::new(LoopbackModem::new(64)),
    );
    assert_eq!(packets, vec![payload]);
}

#[test]
fn roundtrip_various_payload_sizes() {
    for &len in &[1usize, 2, 17, 255, 512] {
        let payload: Vec<u8> = (0..len).map(|i| (i * 37 + len) as u8).collect();
        let mut bits = idle(128);
        bits.extend(FrameEncoder::encode(&payload, false).unwrap());
        bits.extend(idle(128));

        let packets = receive_all(
            loopback_stream(&bits, 0.0, 0),
            Box::new(LoopbackModem::new(64)),
        );
        assert_eq!(packets, vec![payload], "roundtrip failed for len={}", len);
    }
}

#[test]
fn roundtrip_max_size_payload() {
    let payload: Vec<u8> = (0..MTU).map(|i| (i % 251) as u8).collect();
    let mut bits = idle(128);
    bits.extend(FrameEncoder::encode(&payload, false).unwrap());
    bits.extend(idle(128));

    let packets = receive_all(
        loopback_stream(&bits, 0.0, 0),
        Box::new(LoopbackModem::new(64)),
    );
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0], payload);
}

#[test]
fn roundtrip_survives_moderate_noise() {
    let payload = vec![0xDEu8, 0xAD, 0xBE, 0xEF, 0x42];
    let mut bits = idle(200);
    bits.extend(FrameEncoder::encode(&payload, false).unwrap());
    bits.extend(idle(200));

    let packets = receive_all(
        loopback_stream(&bits, 0.2, 99),
        Box::new(LoopbackModem::new(64)),
    );
    assert_eq!(packets, vec![payload]);
}

#[test]
fn idle_only_stream_yields_no_packets() {
    // Pure filler decodes to zero-length candidates, which are expected and
    // never surfaced as packets.
    let packets = receive_all(
        loopback_stream(&idle(4096), 0.0, 0),
        Box::new(LoopbackModem::new(64)),
    );
    assert!(packets.is_empty());
}

fn fsk_params() -> FskParams {
    FskParams {
        sample_rate: 9600,
        symbol_rate: 1200,
        oversample: 8,
        tone_hz: 1200.0,
        symbols_per_call: 64,
    }
}

/// Drive a transmit channel until its queue holds only filler, capturing the
/// sink stream, then a few more quanta so the trailing unique word and some
/// filler make it out too.
fn transmit(payloads: &[&[u8]]) -> Vec<u8> {
    let modem = FskModem::new(fsk_params()).unwrap();
    let mut ch = TxChannel::new(Vec::new(), -1, Box::new(modem), SampleFormat::F32, "tx-test");

    // Lead-in filler so the receiver sees a settled stream first.
    for _ in 0..4 {
        ch.service().unwrap();
    }
    for payload in payloads {
        assert!(ch.is_free(), "channel must be free before each assignment");
        ch.enqueue(payload).unwrap();
        while !ch.is_free() {
            ch.service().unwrap();
        }
    }
    for _ in 0..8 {
        ch.service().unwrap();
    }
    ch.sink().clone()
}

#[test]
fn fsk_transmit_chain_roundtrips_through_receiver() {
    let payload = vec![0x01u8, 0x02, 0x03];
    let stream = transmit(&[&payload]);

    let packets = receive_all(stream, Box::new(FskModem::new(fsk_params()).unwrap()));
    assert_eq!(packets, vec![payload]);
}

#[test]
fn back_to_back_frames_share_a_unique_word() {
    let first = vec![0x10u8; 40];
    let second = vec![0x20u8; 24];
    let stream = transmit(&[&first, &second]);

    let packets = receive_all(stream, Box::new(FskModem::new(fsk_params()).unwrap()));
    assert_eq!(packets, vec![first, second]);
}
