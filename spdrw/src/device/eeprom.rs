//! The EEPROM I/O orchestrator.
//!
//! Reads are chunked to the backend's transfer limit and retried with
//! exponential backoff; writes go byte by byte with update semantics (skip
//! equal bytes, verify every write by reading it back). Checksum bytes are
//! written exactly like any other byte: the orchestrator never recomputes a
//! CRC on its own, that is an explicit `fix_crc` on the decoded image.

use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::device::EepromLink;
use crate::{Result, SpdError};

/// Retries per failing chunk or verify, on top of the first attempt.
const RETRIES: usize = 3;
/// Backoff base; attempts wait 1x, 2x, 4x this.
const BACKOFF_BASE_MS: u64 = 5;

/// Progress notification, emitted after every chunk or byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Read { done: usize, total: usize },
    Write { done: usize, total: usize },
}

/// What to do about a byte that would not write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    /// Give up and surface the error.
    Abort,
    /// Lift reversible protection, then retry the same offset once.
    ClearRswpAndRetry,
    /// Leave the byte as it is and continue.
    Ignore,
}

/// Outcome of an image write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteSummary {
    /// Bytes that differed and were written.
    pub written: usize,
    /// Bytes already holding the intended value.
    pub skipped: usize,
    /// Bytes abandoned under [`WriteFailure::Ignore`].
    pub ignored: usize,
}

/// Read `dest.len()` bytes starting at `offset`, chunked and retried.
/// Chunks that were read before a permanent failure stay in `dest`.
pub fn read_into<L: EepromLink>(
    link: &mut L,
    addr: u8,
    offset: u16,
    dest: &mut [u8],
    mut progress: impl FnMut(Progress),
) -> Result<()> {
    let chunk_max = link.max_transfer().clamp(1, 32);
    let total = dest.len();
    let mut done = 0;
    while done < total {
        let at = offset as usize + done;
        let len = chunk_max.min(total - done);
        read_chunk(link, addr, at as u16, &mut dest[done..done + len])?;
        done += len;
        progress(Progress::Read { done, total });
    }
    Ok(())
}

/// Convenience wrapper allocating the destination.
pub fn read_range<L: EepromLink>(
    link: &mut L,
    addr: u8,
    offset: u16,
    len: usize,
    progress: impl FnMut(Progress),
) -> Result<Vec<u8>> {
    let mut dest = vec![0u8; len];
    read_into(link, addr, offset, &mut dest, progress)?;
    Ok(dest)
}

fn read_chunk<L: EepromLink>(link: &mut L, addr: u8, offset: u16, buf: &mut [u8]) -> Result<()> {
    let mut attempt = 0;
    loop {
        match link.read(addr, offset, buf) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < RETRIES => {
                attempt += 1;
                let delay = BACKOFF_BASE_MS << (attempt - 1);
                warn!(
                    "read of {} bytes at {:#06x} failed ({}), retry {} in {} ms",
                    buf.len(),
                    offset,
                    err,
                    attempt,
                    delay
                );
                thread::sleep(Duration::from_millis(delay));
            }
            Err(err) => return Err(err),
        }
    }
}

/// Write one byte only if it differs, verifying by read-back. `Ok(true)`
/// means the byte was written, `Ok(false)` that it already matched.
pub fn update_byte<L: EepromLink>(
    link: &mut L,
    addr: u8,
    offset: u16,
    value: u8,
) -> Result<bool> {
    let mut current = [0u8; 1];
    link.read(addr, offset, &mut current)?;
    if current[0] == value {
        return Ok(false);
    }
    write_verified(link, addr, offset, value)?;
    Ok(true)
}

fn write_verified<L: EepromLink>(link: &mut L, addr: u8, offset: u16, value: u8) -> Result<()> {
    for attempt in 0..=RETRIES {
        link.write_byte(addr, offset, value)?;
        let mut back = [0u8; 1];
        link.read(addr, offset, &mut back)?;
        if back[0] == value {
            return Ok(());
        }
        warn!(
            "verify mismatch at {:#06x}: wrote {:#04x}, read {:#04x} (attempt {})",
            offset, value, back[0], attempt
        );
    }
    Err(SpdError::VerifyFailed)
}

/// Write a whole image with update-byte semantics. `on_failure` decides,
/// per offset, how to handle a byte that will not take after all verify
/// retries.
pub fn write_image<L: EepromLink>(
    link: &mut L,
    addr: u8,
    image: &[u8],
    mut on_failure: impl FnMut(u16, SpdError) -> WriteFailure,
    mut progress: impl FnMut(Progress),
) -> Result<WriteSummary> {
    let mut summary = WriteSummary::default();
    let total = image.len();
    let mut i = 0;
    let mut cleared_here = false;
    while i < total {
        let offset = i as u16;
        let outcome = update_byte(link, addr, offset, image[i]);
        match outcome {
            Ok(true) => summary.written += 1,
            Ok(false) => summary.skipped += 1,
            Err(err @ (SpdError::VerifyFailed | SpdError::Nack)) => {
                match on_failure(offset, err) {
                    WriteFailure::Abort => return Err(err),
                    WriteFailure::ClearRswpAndRetry if !cleared_here => {
                        debug!("lifting write protection and retrying {:#06x}", offset);
                        link.clear_protection()?;
                        cleared_here = true;
                        continue;
                    }
                    // A second clear for the same offset cannot help.
                    WriteFailure::ClearRswpAndRetry => return Err(err),
                    WriteFailure::Ignore => summary.ignored += 1,
                }
            }
            Err(err) => return Err(err),
        }
        cleared_here = false;
        i += 1;
        progress(Progress::Write { done: i, total });
    }
    Ok(summary)
}

/// Write every byte unconditionally (no pre-read compare), still verified.
pub fn write_image_forced<L: EepromLink>(
    link: &mut L,
    addr: u8,
    image: &[u8],
    mut progress: impl FnMut(Progress),
) -> Result<WriteSummary> {
    let total = image.len();
    for (i, &value) in image.iter().enumerate() {
        write_verified(link, addr, i as u16, value)?;
        progress(Progress::Write { done: i + 1, total });
    }
    Ok(WriteSummary {
        written: total,
        ..WriteSummary::default()
    })
}
