mod device;

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;

use clap::Parser;
use log::{info, warn};

use device::{TunDevice, TunMode};
use fskbridge_core::fsk::{FskModem, FskParams, DEFAULT_SYMBOLS_PER_CALL};
use fskbridge_core::modem::SampleFormat;
use fskbridge_core::rx::RxWorker;
use fskbridge_core::tx::{TxChannel, TxScheduler};
use fskbridge_core::{PacketDevice, MAX_CHANNELS};

/// Decoded packets waiting for the single device writer.
const PACKET_QUEUE_DEPTH: usize = 32;

#[derive(Parser)]
#[command(name = "fskbridge")]
#[command(about = "Bridge a TUN/TAP interface onto half-duplex FSK radio channels")]
struct Cli {
    /// Virtual device type
    #[arg(value_enum)]
    mode: TunMode,

    /// Interface name to create
    #[arg(long, default_value = "tun77")]
    dev: String,

    /// Receive channel: source path, sample rate, symbol rate, samples per
    /// symbol, optional space-tone Hz (defaults to the symbol rate)
    #[arg(long = "rx", value_name = "PATH:FS:RS:P[:F1]", value_parser = parse_rx_spec)]
    rx: Vec<RxSpec>,

    /// Transmit channel: sink path, sample rate, symbol rate, space-tone Hz,
    /// samples per symbol, sample format (1 = s16le I/Q, 2 = f32 I/Q)
    #[arg(long = "tx", value_name = "PATH:FS:RS:F1:P:FMT", value_parser = parse_tx_spec)]
    tx: Vec<TxSpec>,
}

#[derive(Debug, Clone)]
struct RxSpec {
    path: PathBuf,
    params: FskParams,
}

#[derive(Debug, Clone)]
struct TxSpec {
    path: PathBuf,
    params: FskParams,
    format: SampleFormat,
}

fn split_fields<'a>(spec: &'a str, arity: &str, min: usize, max: usize) -> Result<Vec<&'a str>, String> {
    let fields: Vec<&str> = spec.split(':').collect();
    if fields.len() < min || fields.len() > max {
        return Err(format!("expected {}, got {:?}", arity, spec));
    }
    Ok(fields)
}

fn parse_number<T: std::str::FromStr>(field: &str, what: &str) -> Result<T, String> {
    field
        .parse()
        .map_err(|_| format!("bad {} {:?}", what, field))
}

fn parse_rx_spec(spec: &str) -> Result<RxSpec, String> {
    let fields = split_fields(spec, "PATH:FS:RS:P[:F1]", 4, 5)?;
    let symbol_rate: u32 = parse_number(fields[2], "symbol rate")?;
    let tone_hz = match fields.get(4) {
        Some(&f) => parse_number(f, "tone frequency")?,
        None => symbol_rate as f32,
    };
    let params = FskParams {
        sample_rate: parse_number(fields[1], "sample rate")?,
        symbol_rate,
        oversample: parse_number(fields[3], "oversample")?,
        tone_hz,
        symbols_per_call: DEFAULT_SYMBOLS_PER_CALL,
    };
    params.validate().map_err(|e| e.to_string())?;
    Ok(RxSpec {
        path: PathBuf::from(fields[0]),
        params,
    })
}

fn parse_tx_spec(spec: &str) -> Result<TxSpec, String> {
    let fields = split_fields(spec, "PATH:FS:RS:F1:P:FMT", 6, 6)?;
    let params = FskParams {
        sample_rate: parse_number(fields[1], "sample rate")?,
        symbol_rate: parse_number(fields[2], "symbol rate")?,
        oversample: parse_number(fields[4], "oversample")?,
        tone_hz: parse_number(fields[3], "tone frequency")?,
        symbols_per_call: DEFAULT_SYMBOLS_PER_CALL,
    };
    params.validate().map_err(|e| e.to_string())?;
    let selector: u32 = parse_number(fields[5], "sample format selector")?;
    let format = SampleFormat::from_selector(selector).map_err(|e| e.to_string())?;
    Ok(TxSpec {
        path: PathBuf::from(fields[0]),
        params,
        format,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.rx.len() > MAX_CHANNELS {
        return Err(format!("too many rx channels ({} max)", MAX_CHANNELS).into());
    }
    if cli.tx.len() > MAX_CHANNELS {
        return Err(format!("too many tx channels ({} max)", MAX_CHANNELS).into());
    }

    let device = Arc::new(TunDevice::create(&cli.dev, cli.mode)?);
    info!("created device {}", device.name());

    // Single serialization point for the device's write side: every receive
    // worker sends here, one drain thread writes.
    let (packet_tx, packet_rx) = mpsc::sync_channel::<Vec<u8>>(PACKET_QUEUE_DEPTH);
    let drain_device = Arc::clone(&device);
    let drain = thread::spawn(move || {
        for packet in packet_rx {
            if let Err(e) = drain_device.send(&packet) {
                warn!("device write failed: {}", e);
            }
        }
    });

    let mut workers = Vec::new();
    for (index, spec) in cli.rx.iter().cloned().enumerate() {
        let packets = packet_tx.clone();
        let label = format!("rx{}", index);
        workers.push(thread::Builder::new().name(label.clone()).spawn(move || {
            // A source that cannot be opened kills this worker only.
            let source = match File::open(&spec.path) {
                Ok(f) => f,
                Err(e) => {
                    warn!("{}: cannot open {}: {}", label, spec.path.display(), e);
                    return;
                }
            };
            let modem = match FskModem::new(spec.params) {
                Ok(m) => m,
                Err(e) => {
                    warn!("{}: {}", label, e);
                    return;
                }
            };
            match RxWorker::new(source, Box::new(modem), packets, label.clone()) {
                Ok(worker) => worker.run(),
                Err(e) => warn!("{}: {}", label, e),
            }
        })?);
    }
    // The drain must stop once every worker is done.
    drop(packet_tx);

    let mut channels = Vec::new();
    for (index, spec) in cli.tx.iter().cloned().enumerate() {
        let sink = OpenOptions::new()
            .write(true)
            .create(true)
            .append(true)
            .open(&spec.path)?;
        let fd = sink.as_raw_fd();
        let modem = FskModem::new(spec.params)?;
        channels.push(TxChannel::new(
            sink,
            fd,
            Box::new(modem),
            spec.format,
            format!("tx{}", index),
        ));
    }

    if !channels.is_empty() {
        let mut scheduler = TxScheduler::new(
            Arc::clone(&device) as Arc<dyn PacketDevice>,
            channels,
        );
        scheduler.run()?;
    }

    for worker in workers {
        let _ = worker.join();
    }
    let _ = drain.join();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_spec_parses_with_default_tone() {
        let spec = parse_rx_spec("/tmp/rx.iq:9600:1200:8").unwrap();
        assert_eq!(spec.params.sample_rate, 9600);
        assert_eq!(spec.params.symbol_rate, 1200);
        assert_eq!(spec.params.oversample, 8);
        assert_eq!(spec.params.tone_hz, 1200.0);
    }

    #[test]
    fn tx_spec_parses_format_selector() {
        let spec = parse_tx_spec("/tmp/tx.iq:9600:1200:1200:8:2").unwrap();
        assert_eq!(spec.format, SampleFormat::F32);
        assert_eq!(spec.params.tone_hz, 1200.0);
    }

    #[test]
    fn bad_format_selector_is_fatal_at_parse_time() {
        assert!(parse_tx_spec("/tmp/tx.iq:9600:1200:1200:8:3").is_err());
    }

    #[test]
    fn inconsistent_rates_are_rejected() {
        assert!(parse_rx_spec("/tmp/rx.iq:9600:1200:7").is_err());
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(parse_rx_spec("/tmp/rx.iq:9600").is_err());
        assert!(parse_tx_spec("/tmp/tx.iq:9600:1200:1200:8").is_err());
    }
}
