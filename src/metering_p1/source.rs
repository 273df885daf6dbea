use std::time::Duration;
use crc16::{State, ARC};
use log::debug;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Timeout while waiting for a telegram")]
    Timeout,
    #[error("Telegram source closed")]
    EndOfStream,
    #[error("Checksum mismatch, telegram says {expected:04X} but data gives {computed:04X}")]
    ChecksumMismatch { expected: u16, computed: u16 },
    #[error("Invalid checksum {0:?}")]
    InvalidChecksum(String),
    #[error("Reading telegram failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One telegram as read from the meter, from the `/` header to the `!` end line
#[derive(Debug, Clone, PartialEq)]
pub struct Telegram {
    pub lines: Vec<String>,
    pub checksum: Option<u16>,
}

/// Reads telegrams line by line from any buffered async byte stream, e.g. a
/// serial device or stdin.
pub struct TelegramReader<R> {
    reader: R,
    verify_crc: bool,
}

impl<R: AsyncBufRead + Unpin> TelegramReader<R> {
    pub fn new(reader: R, verify_crc: bool) -> Self {
        Self { reader, verify_crc }
    }

    pub async fn read_with_timeout(&mut self, limit: Duration) -> Result<Telegram, AcquisitionError> {
        match tokio::time::timeout(limit, self.read_telegram()).await {
            Ok(result) => result,
            Err(_) => Err(AcquisitionError::Timeout),
        }
    }

    pub async fn read_telegram(&mut self) -> Result<Telegram, AcquisitionError> {
        let mut buf = Vec::new();
        let mut lines: Vec<String> = Vec::new();
        let mut crc = State::<ARC>::new();
        let mut started = false;

        loop {
            buf.clear();
            if self.reader.read_until(b'\n', &mut buf).await? == 0 {
                return Err(AcquisitionError::EndOfStream);
            }

            if buf.first() == Some(&b'/') {
                if started {
                    debug!("New telegram started before the end of the last one, {} lines dropped", lines.len());
                }
                started = true;
                lines.clear();
                crc = State::<ARC>::new();
            } else if !started {
                debug!("Skipping {} bytes outside of a telegram", buf.len());
                continue;
            }

            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches(['\r', '\n']);

            if let Some(rest) = line.strip_prefix('!') {
                /* the checksum covers everything up to and including the '!' */
                crc.update(b"!");
                let checksum = parse_checksum(rest.trim())?;
                lines.push(line.to_string());

                if let (Some(expected), true) = (checksum, self.verify_crc) {
                    let computed = crc.get();
                    if computed != expected {
                        return Err(AcquisitionError::ChecksumMismatch { expected, computed });
                    }
                }
                return Ok(Telegram { lines, checksum });
            }

            crc.update(&buf);
            lines.push(line.to_string());
        }
    }
}

fn parse_checksum(text: &str) -> Result<Option<u16>, AcquisitionError> {
    /* DSMR 2 and 3 telegrams end without a checksum */
    if text.is_empty() {
        return Ok(None);
    }
    u16::from_str_radix(text, 16)
        .map(Some)
        .map_err(|_| AcquisitionError::InvalidChecksum(text.to_string()))
}
