//! modes-rx - software-defined Mode S squitter receiver
//!
//! Receives Mode S downlink messages at 1090 MHz with an RTL-SDR dongle,
//! demodulates and CRC-checks them (with single and optional double bit
//! error correction), and prints one line per decoded message with a
//! sample-accurate timestamp, the ICAO aircraft address and the message hex.
//!
//! Modes:
//! - no arguments: live decode from hardware
//! - `-w FILE`: capture raw IQ samples to FILE without decoding
//! - `FILE`: offline decode of a previously captured raw file

mod config;
mod modes;
mod sdr;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::Config;
use sdr::source::{FileSource, HardwareSource};
use sdr::{run_worker, BlockSlot, Pipeline, SampleSource};

#[derive(Parser)]
#[command(
    name = "modes-rx",
    about = "Software-defined Mode S squitter receiver for RTL-SDR"
)]
struct Cli {
    /// Decode a previously captured raw IQ file instead of live hardware
    file: Option<PathBuf>,

    /// Capture raw IQ samples to a file without decoding
    #[arg(short, long, value_name = "FILE", conflicts_with = "file")]
    write: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    // Decoded messages own stdout; all diagnostics go to stderr.
    FmtSubscriber::builder()
        .with_max_level(if config.debug {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = cli.write {
        let source = HardwareSource::open(config.device_index)?;
        info!("capturing raw samples to {}", path.display());
        return source.dump_to(&path);
    }

    let source = match &cli.file {
        Some(path) => {
            info!("decoding raw samples from {}", path.display());
            SampleSource::File(FileSource::open(path)?)
        }
        None => SampleSource::Hardware(HardwareSource::open(config.device_index)?),
    };

    let slot = Arc::new(BlockSlot::new());
    let (message_tx, message_rx) = crossbeam_channel::bounded(64);

    let pipeline = Pipeline::new(&config);
    let worker = {
        let slot = Arc::clone(&slot);
        thread::Builder::new()
            .name("demod".into())
            .spawn(move || run_worker(slot, pipeline, message_tx))
            .context("failed to spawn the processing worker")?
    };

    let producer = {
        let slot = Arc::clone(&slot);
        thread::Builder::new()
            .name("source".into())
            .spawn(move || source.run(slot))
            .context("failed to spawn the sample producer")?
    };

    // Runs until the worker observes shutdown and drops its sender.
    for message in message_rx {
        println!("{message}");
    }

    worker.join().expect("worker thread panicked");
    producer.join().expect("producer thread panicked")?;
    if slot.has_faulted() {
        bail!("sample source broke the block-size contract");
    }
    Ok(())
}
