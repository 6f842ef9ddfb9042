//! TensorBoard event files
//!
//! Summaries are written as `Event` protobufs framed as TFRecords, so
//! `tensorboard --logdir <logdir>` can read them directly.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use prost::Message;
use time::OffsetDateTime;

use crate::error::{Error, Result};

const FILE_VERSION: &str = "brain.Event:2";

/// CRC-32C (Castagnoli) polynomial, reflected
const CRC32C_POLY: u32 = 0x82f6_3b78;
const CRC_MASK_DELTA: u32 = 0xa282_ead8;

/// Numbers the event files opened by this process
static FILE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, PartialEq, prost::Message)]
pub struct Event {
    #[prost(double, tag = "1")]
    pub wall_time: f64,
    #[prost(int64, tag = "2")]
    pub step: i64,
    #[prost(string, optional, tag = "3")]
    pub file_version: Option<String>,
    #[prost(message, optional, tag = "5")]
    pub summary: Option<Summary>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Summary {
    #[prost(message, repeated, tag = "1")]
    pub value: Vec<SummaryValue>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SummaryValue {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(float, optional, tag = "2")]
    pub simple_value: Option<f32>,
}

/// Appends scalar summaries to an event file inside a log directory.
///
/// Every writer opens a new file named
/// `events.out.tfevents.<unix secs>.<host>.<pid>.<sequence>`, so writers
/// created within the same second never share or truncate a file.
pub struct SummaryWriter {
    path: PathBuf,
    file: BufWriter<File>,
}

impl SummaryWriter {
    pub fn create(logdir: impl AsRef<Path>) -> Result<Self> {
        let logdir = logdir.as_ref();
        fs::create_dir_all(logdir)
            .map_err(|e| Error::io(format!("create log directory {}", logdir.display()), e))?;

        let now = OffsetDateTime::now_utc();
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let path = logdir.join(format!(
            "events.out.tfevents.{}.{}.{}.{}",
            now.unix_timestamp(),
            host,
            std::process::id(),
            FILE_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| Error::io(format!("create event file {}", path.display()), e))?;

        let mut writer = Self {
            path,
            file: BufWriter::new(file),
        };
        writer.write_event(&Event {
            wall_time: wall_time(),
            step: 0,
            file_version: Some(FILE_VERSION.to_string()),
            summary: None,
        })?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log several scalars under one event
    pub fn add_scalars(&mut self, scalars: &[(&str, f32)], step: usize) -> Result<()> {
        let value = scalars
            .iter()
            .map(|&(tag, value)| SummaryValue {
                tag: tag.to_string(),
                simple_value: Some(value),
            })
            .collect();
        self.write_event(&Event {
            wall_time: wall_time(),
            step: step as i64,
            file_version: None,
            summary: Some(Summary { value }),
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| Error::io(format!("flush event file {}", self.path.display()), e))
    }

    fn write_event(&mut self, event: &Event) -> Result<()> {
        write_record(&mut self.file, &event.encode_to_vec())
            .map_err(|e| Error::io(format!("write event file {}", self.path.display()), e))
    }
}

/// Write one TFRecord: length, masked CRC of the length, payload, masked CRC
/// of the payload. All integers little endian.
pub fn write_record<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let length = (data.len() as u64).to_le_bytes();
    writer.write_all(&length)?;
    writer.write_all(&masked_crc32c(&length).to_le_bytes())?;
    writer.write_all(data)?;
    writer.write_all(&masked_crc32c(data).to_le_bytes())?;
    Ok(())
}

fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32C_POLY
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

fn masked_crc32c(data: &[u8]) -> u32 {
    let crc = crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(CRC_MASK_DELTA)
}

fn wall_time() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}
