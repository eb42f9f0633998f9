//! Sample producers.
//!
//! Both producers fulfill the same contract: fill one IQ block in the shared
//! slot and signal the worker, which never learns which variant is active.
//! The hardware variant is driven by the RTL-SDR asynchronous read loop; the
//! file variant replays a raw capture and signals end-of-stream on a short
//! read. A third mode captures raw bytes to a dump file without decoding.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info};

use super::slot::BlockSlot;
use super::{BLOCK_SAMPLES, MODE_S_FREQ, MODE_S_RATE};

/// Driver-side buffer count for the asynchronous read loop.
const READ_BUFFERS: u32 = 4;

/// The active sample producer. The worker is oblivious to the variant.
pub enum SampleSource {
    Hardware(HardwareSource),
    File(FileSource),
}

impl SampleSource {
    /// Produce blocks into the slot until end-of-stream, shutdown or a
    /// fatal source error. The slot is always shut down before returning.
    pub fn run(self, slot: Arc<BlockSlot>) -> Result<()> {
        match self {
            SampleSource::Hardware(source) => source.run(slot),
            SampleSource::File(source) => source.run(slot),
        }
    }
}

/// Live RTL-SDR dongle tuned to the Mode S downlink.
pub struct HardwareSource {
    ctl: rtlsdr_mt::Controller,
    reader: rtlsdr_mt::Reader,
}

impl HardwareSource {
    /// Open and configure the device. Failures here are setup errors: they
    /// are reported and the process exits nonzero.
    pub fn open(device_index: u32) -> Result<Self> {
        let (mut ctl, reader) = rtlsdr_mt::open(device_index)
            .map_err(|_| anyhow!("no usable RTL-SDR device at index {device_index}"))?;

        ctl.enable_agc()
            .map_err(|_| anyhow!("failed to enable AGC on device {device_index}"))?;
        ctl.set_center_freq(MODE_S_FREQ)
            .map_err(|_| anyhow!("failed to tune device {device_index} to {MODE_S_FREQ} Hz"))?;
        ctl.set_sample_rate(MODE_S_RATE)
            .map_err(|_| anyhow!("failed to set sample rate {MODE_S_RATE} sps"))?;

        info!(
            "device {device_index}: centre frequency {} Hz, sample rate {} sps",
            ctl.center_freq(),
            MODE_S_RATE
        );

        Ok(Self { ctl, reader })
    }

    fn run(self, slot: Arc<BlockSlot>) -> Result<()> {
        let Self {
            mut ctl,
            mut reader,
        } = self;

        let mut canceled = false;
        let result = reader.read_async(READ_BUFFERS, (BLOCK_SAMPLES * 2) as u32, |bytes| {
            if slot.is_exiting() {
                canceled = true;
                ctl.cancel_async_read();
            } else if bytes.len() != BLOCK_SAMPLES * 2 {
                // Broken contract with the driver; every downstream buffer
                // size assumes exact blocks.
                error!(
                    "sample callback delivered {} bytes, expected {}",
                    bytes.len(),
                    BLOCK_SAMPLES * 2
                );
                slot.fail();
                canceled = true;
                ctl.cancel_async_read();
            } else {
                slot.produce(bytes);
            }
        });

        slot.shutdown();
        if result.is_err() && !canceled {
            return Err(anyhow!("hardware read loop terminated abnormally"));
        }
        Ok(())
    }

    /// Capture raw IQ bytes to `path` without decoding, until the read loop
    /// is interrupted.
    pub fn dump_to(self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("could not open {} for writing", path.display()))?;
        let mut out = BufWriter::new(file);

        let Self {
            mut ctl,
            mut reader,
        } = self;

        let mut write_error: Option<std::io::Error> = None;
        let read_result = reader.read_async(READ_BUFFERS, (BLOCK_SAMPLES * 2) as u32, |bytes| {
            if let Err(e) = out.write_all(bytes) {
                write_error = Some(e);
                ctl.cancel_async_read();
            }
        });

        if let Some(e) = write_error {
            return Err(anyhow::Error::new(e).context(format!("writing {}", path.display())));
        }
        read_result.map_err(|_| anyhow!("hardware read loop terminated abnormally"))?;
        out.flush()
            .with_context(|| format!("flushing {}", path.display()))?;
        Ok(())
    }
}

/// Offline replay of a previously captured raw IQ file.
pub struct FileSource {
    reader: File,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let reader =
            File::open(path).with_context(|| format!("could not open {}", path.display()))?;
        Ok(Self { reader })
    }

    fn run(mut self, slot: Arc<BlockSlot>) -> Result<()> {
        let mut buf = vec![0u8; BLOCK_SAMPLES * 2];
        let result = loop {
            match read_block(&mut self.reader, &mut buf) {
                Ok(true) => {
                    // Replay is paced by the worker; waiting here is normal
                    // and must not be reported as an overflow.
                    slot.produce_paced(&buf);
                    if slot.is_exiting() {
                        break Ok(());
                    }
                }
                Ok(false) => {
                    info!("end of dump file");
                    break Ok(());
                }
                Err(e) => break Err(anyhow::Error::new(e).context("reading dump file")),
            }
        };
        slot.shutdown();
        result
    }
}

/// Fill `buf` completely from the reader. Returns false on end-of-stream; a
/// trailing partial block also ends the stream and is dropped.
fn read_block(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn read_block_reports_short_final_read() {
        let data = vec![7u8; 10];
        let mut reader = &data[..];
        let mut buf = vec![0u8; 4];
        assert!(read_block(&mut reader, &mut buf).unwrap());
        assert_eq!(buf, [7; 4]);
        assert!(read_block(&mut reader, &mut buf).unwrap());
        // Two bytes remain: a partial block, dropped as end-of-stream.
        assert!(!read_block(&mut reader, &mut buf).unwrap());
    }

    #[test]
    fn file_source_replays_whole_blocks_then_shuts_down() {
        let path = std::env::temp_dir().join(format!("modes-rx-test-{}.iq", std::process::id()));
        {
            let mut f = File::create(&path).unwrap();
            // Two full blocks and a trailing partial one.
            f.write_all(&vec![128u8; BLOCK_SAMPLES * 2]).unwrap();
            f.write_all(&vec![130u8; BLOCK_SAMPLES * 2]).unwrap();
            f.write_all(&[1, 2, 3]).unwrap();
        }

        let slot = Arc::new(BlockSlot::new());
        let producer = {
            let source = FileSource::open(&path).unwrap();
            let slot = Arc::clone(&slot);
            thread::spawn(move || source.run(slot))
        };

        let first = slot.wait_fresh().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.re[0], 0.0);
        drop(first);

        let second = slot.wait_fresh().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.re[0], 2.0);
        drop(second);

        // The partial tail signals end-of-stream.
        assert!(slot.wait_fresh().is_none());
        producer.join().unwrap().unwrap();
        std::fs::remove_file(&path).unwrap();
    }
}
