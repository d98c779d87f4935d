// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Signal traces
//!
//! A trace is a sequence of [`HardwareSignals`], one per tick.  Hand-written
//! traces are JSON (an array of records) or TOML (`[[tick]]` tables).
//! Captures from a logic analyser or simulator use a packed binary format
//! of fixed 16-byte little-endian records, which can be streamed without
//! knowing the length up front:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0x0 | 4 | pc |
//! | 0x4 | 4 | data address |
//! | 0x8 | 4 | DMA address |
//! | 0xc | 1 | flags: bit 0 read, bit 1 write, bit 2 DMA |
//! | 0xd | 3 | reserved |

use crate::{Error, HardwareSignals};
use packed_struct::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use strum_macros::Display;

pub const RECORD_SIZE: usize = 16;

const FLAG_READ: u8 = 1 << 0;
const FLAG_WRITE: u8 = 1 << 1;
const FLAG_DMA: u8 = 1 << 2;
const FLAG_MASK: u8 = FLAG_READ | FLAG_WRITE | FLAG_DMA;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[strum(serialize_all = "lowercase")]
pub enum TraceFormat {
    Json,
    Toml,
    Bin,
}

impl TraceFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<TraceFormat> {
        match path.extension()?.to_str()? {
            "json" => Some(TraceFormat::Json),
            "toml" => Some(TraceFormat::Toml),
            "bin" | "trace" => Some(TraceFormat::Bin),
            _ => None,
        }
    }

    /// An explicit format wins; otherwise the extension decides
    pub fn resolve(path: &Path, format: Option<TraceFormat>) -> Result<TraceFormat, Error> {
        format
            .or_else(|| TraceFormat::from_path(path))
            .ok_or_else(|| Error::UnknownTraceFormat(path.to_path_buf()))
    }
}

#[derive(PackedStruct, Clone, Debug, Default, PartialEq, Eq)]
#[packed_struct(size_bytes = "16", bit_numbering = "msb0", endian = "lsb")]
pub struct TraceRecord {
    pub pc: u32,
    pub data_addr: u32,
    pub dma_addr: u32,
    pub flags: u8,
    reserved: [u8; 3],
}

impl From<&HardwareSignals> for TraceRecord {
    fn from(s: &HardwareSignals) -> TraceRecord {
        let mut flags = 0;
        if s.read_en {
            flags |= FLAG_READ;
        }
        if s.write_en {
            flags |= FLAG_WRITE;
        }
        if s.dma_en {
            flags |= FLAG_DMA;
        }
        TraceRecord {
            pc: s.pc,
            data_addr: s.data_addr,
            dma_addr: s.dma_addr,
            flags,
            reserved: [0; 3],
        }
    }
}

impl TraceRecord {
    fn signals(&self, index: u64) -> Result<HardwareSignals, Error> {
        if self.flags & !FLAG_MASK != 0 {
            return Err(Error::ReservedFlags {
                index,
                flags: self.flags,
            });
        }
        Ok(HardwareSignals {
            pc: self.pc,
            data_addr: self.data_addr,
            read_en: self.flags & FLAG_READ != 0,
            write_en: self.flags & FLAG_WRITE != 0,
            dma_addr: self.dma_addr,
            dma_en: self.flags & FLAG_DMA != 0,
        })
    }
}

/// Streams signals out of a binary capture, one record at a time
pub struct BinaryTraceReader<R> {
    inner: R,
    index: u64,
    done: bool,
}

impl<R: Read> BinaryTraceReader<R> {
    pub fn new(inner: R) -> BinaryTraceReader<R> {
        BinaryTraceReader {
            inner,
            index: 0,
            done: false,
        }
    }

    // Fills as much of `buf` as the reader will give us
    fn fill(&mut self, buf: &mut [u8; RECORD_SIZE]) -> Result<usize, Error> {
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for BinaryTraceReader<R> {
    type Item = Result<HardwareSignals, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = [0u8; RECORD_SIZE];
        let result = match self.fill(&mut buf) {
            Ok(0) => {
                self.done = true;
                return None;
            }
            Ok(RECORD_SIZE) => TraceRecord::unpack(&buf)
                .map_err(Error::from)
                .and_then(|r| r.signals(self.index)),
            Ok(len) => Err(Error::TruncatedRecord {
                index: self.index,
                len,
            }),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.done = true;
        }
        self.index += 1;
        Some(result)
    }
}

pub fn write_binary<W: Write>(mut out: W, trace: &[HardwareSignals]) -> Result<(), Error> {
    for s in trace {
        out.write_all(&TraceRecord::from(s).pack()?)?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TomlTrace {
    #[serde(default)]
    tick: Vec<HardwareSignals>,
}

pub fn parse_json(text: &str) -> Result<Vec<HardwareSignals>, Error> {
    Ok(serde_json::from_str(text)?)
}

pub fn parse_toml(text: &str) -> Result<Vec<HardwareSignals>, Error> {
    let trace: TomlTrace = toml::from_str(text)?;
    Ok(trace.tick)
}

/// Load a whole trace file.  With no explicit format the extension decides.
pub fn read_trace(path: &Path, format: Option<TraceFormat>) -> Result<Vec<HardwareSignals>, Error> {
    let format = TraceFormat::resolve(path, format)?;
    log::debug!("reading {format} trace from {}", path.display());
    match format {
        TraceFormat::Json => parse_json(&std::fs::read_to_string(path)?),
        TraceFormat::Toml => parse_toml(&std::fs::read_to_string(path)?),
        TraceFormat::Bin => {
            let file = std::io::BufReader::new(std::fs::File::open(path)?);
            BinaryTraceReader::new(file).collect()
        }
    }
}
