//! Chunk header encoding/decoding.
//!
//! Der Header ist ein fester 68-Byte-Block (raw big-endian):
//! - Magic `FLR\0` (4 Bytes)
//! - Major/Minor Version (je 2 Bytes)
//! - Chunk-Größe, letzter Checkpoint, Metadata (je 8 Bytes, chunk-relativ)
//! - Start-Nanos, Dauer-Nanos, Start-Ticks, Ticks/Sekunde (je 8 Bytes)
//! - Feature-Flags (4 Bytes)
//!
//! # Beispiel
//!
//! ```
//! use tracefilter::header::{ChunkHeader, HEADER_SIZE};
//!
//! let header = ChunkHeader::new(0).with_layout(200, 0, 150);
//! let bytes = header.encode();
//! assert_eq!(bytes.len() as u64, HEADER_SIZE);
//! assert_eq!(&bytes[..4], b"FLR\0");
//! ```

use std::io::{Read, Seek};

use crate::channel::PositionalInput;
use crate::{Error, Result};

/// Magic bytes at the start of every chunk.
pub const MAGIC: [u8; 4] = *b"FLR\0";

/// Size of the fixed header region in bytes.
pub const HEADER_SIZE: u64 = 68;

/// Offset of the chunk size field inside the header.
pub const CHUNK_SIZE_OFFSET: u64 = 8;

/// Offset of the last-checkpoint field inside the header.
pub const CONSTANT_POOL_OFFSET: u64 = 16;

/// Offset of the metadata field inside the header.
pub const METADATA_OFFSET: u64 = 24;

/// Major version written by [`ChunkHeader::new`].
pub const MAJOR_VERSION: u16 = 2;

/// Minor version written by [`ChunkHeader::new`].
pub const MINOR_VERSION: u16 = 1;

/// Decoded chunk header plus the absolute position it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    absolute_chunk_start: u64,
    major: u16,
    minor: u16,
    chunk_size: u64,
    constant_pool_position: u64,
    metadata_position: u64,
    start_nanos: i64,
    duration_nanos: i64,
    start_ticks: i64,
    ticks_per_second: i64,
    features: u32,
}

impl ChunkHeader {
    /// Header for a chunk starting at `absolute_chunk_start`, current version,
    /// all sizes and offsets zero.
    pub fn new(absolute_chunk_start: u64) -> Self {
        Self {
            absolute_chunk_start,
            major: MAJOR_VERSION,
            minor: MINOR_VERSION,
            chunk_size: 0,
            constant_pool_position: 0,
            metadata_position: 0,
            start_nanos: 0,
            duration_nanos: 0,
            start_ticks: 0,
            ticks_per_second: 1_000_000_000,
            features: 0,
        }
    }

    // --- Builder ---

    /// Sets chunk size, last checkpoint and metadata offsets (chunk-relative).
    pub fn with_layout(mut self, chunk_size: u64, constant_pool_position: u64, metadata_position: u64) -> Self {
        self.chunk_size = chunk_size;
        self.constant_pool_position = constant_pool_position;
        self.metadata_position = metadata_position;
        self
    }

    /// Sets start time and duration in nanoseconds.
    pub fn with_time(mut self, start_nanos: i64, duration_nanos: i64) -> Self {
        self.start_nanos = start_nanos;
        self.duration_nanos = duration_nanos;
        self
    }

    /// Sets the tick clock.
    pub fn with_ticks(mut self, start_ticks: i64, ticks_per_second: i64) -> Self {
        self.start_ticks = start_ticks;
        self.ticks_per_second = ticks_per_second;
        self
    }

    // --- Getter ---

    /// Absolute file position of the chunk's first byte.
    pub fn absolute_chunk_start(&self) -> u64 {
        self.absolute_chunk_start
    }

    /// Absolute file position just past the chunk.
    pub fn absolute_chunk_end(&self) -> u64 {
        self.absolute_chunk_start + self.chunk_size
    }

    /// Absolute position of the first record after the header.
    pub fn absolute_body_start(&self) -> u64 {
        self.absolute_chunk_start + HEADER_SIZE
    }

    /// `(major, minor)` version.
    pub fn version(&self) -> (u16, u16) {
        (self.major, self.minor)
    }

    /// Chunk size in bytes, header included.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Chunk-relative offset of the last checkpoint (0 = none).
    pub fn constant_pool_position(&self) -> u64 {
        self.constant_pool_position
    }

    /// Absolute position of the last checkpoint, if the chunk has one.
    pub fn absolute_constant_pool_position(&self) -> Option<u64> {
        (self.constant_pool_position != 0).then(|| self.absolute_chunk_start + self.constant_pool_position)
    }

    /// Chunk-relative offset of the metadata record.
    pub fn metadata_position(&self) -> u64 {
        self.metadata_position
    }

    /// Absolute position of the metadata record.
    pub fn absolute_metadata_position(&self) -> u64 {
        self.absolute_chunk_start + self.metadata_position
    }

    /// Chunk start time in nanoseconds since epoch.
    pub fn start_nanos(&self) -> i64 {
        self.start_nanos
    }

    /// Chunk duration in nanoseconds.
    pub fn duration_nanos(&self) -> i64 {
        self.duration_nanos
    }

    /// Tick counter value at chunk start.
    pub fn start_ticks(&self) -> i64 {
        self.start_ticks
    }

    /// Tick frequency.
    pub fn ticks_per_second(&self) -> i64 {
        self.ticks_per_second
    }

    /// Raw feature flags.
    pub fn features(&self) -> u32 {
        self.features
    }

    /// Reads and validates a header at the input's current position.
    ///
    /// The input is left just past the header.
    pub fn read<R: Read + Seek>(input: &mut PositionalInput<R>) -> Result<Self> {
        let start = input.position();
        if input.remaining() < HEADER_SIZE {
            return Err(Error::malformed_header(format!(
                "only {} bytes left at {start}, header needs {HEADER_SIZE}",
                input.remaining()
            )));
        }

        let mut magic = [0u8; 4];
        input.read_bytes(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let major = input.read_raw_u16()?;
        let minor = input.read_raw_u16()?;
        if !(1..=MAJOR_VERSION).contains(&major) {
            return Err(Error::UnsupportedVersion { major, minor });
        }

        let chunk_size = read_offset(input, "chunk size")?;
        let constant_pool_position = read_offset(input, "constant pool offset")?;
        let metadata_position = read_offset(input, "metadata offset")?;
        let header = Self {
            absolute_chunk_start: start,
            major,
            minor,
            chunk_size,
            constant_pool_position,
            metadata_position,
            start_nanos: input.read_raw_i64()?,
            duration_nanos: input.read_raw_i64()?,
            start_ticks: input.read_raw_i64()?,
            ticks_per_second: input.read_raw_i64()?,
            features: input.read_raw_u32()?,
        };
        header.validate(input.len())?;
        Ok(header)
    }

    /// Checks sizes and offsets against each other and the source length.
    fn validate(&self, source_len: u64) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::UnfinishedChunk {
                position: self.absolute_chunk_start,
            });
        }
        if self.chunk_size < HEADER_SIZE {
            return Err(Error::malformed_header(format!(
                "chunk size {} smaller than header",
                self.chunk_size
            )));
        }
        let end = self
            .absolute_chunk_start
            .checked_add(self.chunk_size)
            .ok_or_else(|| Error::malformed_header("chunk size overflows"))?;
        if end > source_len {
            return Err(Error::malformed_header(format!(
                "chunk ends at {end} but source has {source_len} bytes"
            )));
        }
        if self.metadata_position < HEADER_SIZE || self.metadata_position >= self.chunk_size {
            return Err(Error::malformed_header(format!(
                "metadata offset {} outside chunk body",
                self.metadata_position
            )));
        }
        if self.constant_pool_position != 0
            && (self.constant_pool_position < HEADER_SIZE || self.constant_pool_position >= self.chunk_size)
        {
            return Err(Error::malformed_header(format!(
                "constant pool offset {} outside chunk body",
                self.constant_pool_position
            )));
        }
        Ok(())
    }

    /// Encodes the header into its fixed 68-byte form.
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut out = [0u8; HEADER_SIZE as usize];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..6].copy_from_slice(&self.major.to_be_bytes());
        out[6..8].copy_from_slice(&self.minor.to_be_bytes());
        out[8..16].copy_from_slice(&(self.chunk_size as i64).to_be_bytes());
        out[16..24].copy_from_slice(&(self.constant_pool_position as i64).to_be_bytes());
        out[24..32].copy_from_slice(&(self.metadata_position as i64).to_be_bytes());
        out[32..40].copy_from_slice(&self.start_nanos.to_be_bytes());
        out[40..48].copy_from_slice(&self.duration_nanos.to_be_bytes());
        out[48..56].copy_from_slice(&self.start_ticks.to_be_bytes());
        out[56..64].copy_from_slice(&self.ticks_per_second.to_be_bytes());
        out[64..68].copy_from_slice(&self.features.to_be_bytes());
        out
    }
}

fn read_offset<R: Read + Seek>(input: &mut PositionalInput<R>, what: &'static str) -> Result<u64> {
    let raw = input.read_raw_i64()?;
    u64::try_from(raw).map_err(|_| Error::malformed_header(format!("negative {what} {raw}")))
}
