//! File-level driver: filters a whole recording chunk by chunk.
//!
//! Each chunk takes two passes over its events. The first offers every
//! event to the predicate and marks the pool entries of the accepted ones.
//! The second copies the accepted events, which flushes the checkpoints
//! in front of them. Because marking is complete before the first
//! checkpoint is swept, an entry survives no matter whether the event using
//! it sits before or after its checkpoint.

use std::io::{self, Read, Seek, Write};
use std::path::Path;

use log::{debug, info};

use crate::event::EventPredicate;
use crate::parser::ChunkParser;
use crate::writer::{ChunkWriter, FilterStats};
use crate::{Error, Result};

/// Filters `source` into `destination`, keeping events accepted by `predicate`.
///
/// On error the destination is removed; it is either a complete recording
/// or absent.
pub fn filter_recording(source: &Path, destination: &Path, predicate: EventPredicate) -> Result<FilterStats> {
    ensure_distinct(source, destination)?;
    let mut parser = ChunkParser::open(source)?;
    let mut writer = ChunkWriter::create(source, destination, predicate)?;
    // Fehler → writer wird gedroppt und löscht die Zieldatei
    let stats = filter_chunks(&mut parser, &mut writer)?;
    writer.close()?;
    info!(
        "{}: kept {} of {} events in {} chunks, purged {} pool entries ({} bytes)",
        destination.display(),
        stats.events_written,
        stats.events_read,
        stats.chunks,
        stats.entries_purged,
        stats.bytes_purged
    );
    Ok(stats)
}

/// Runs every chunk of `parser` through `writer`.
///
/// The writer is left open; the caller closes (or drops) it.
pub fn filter_chunks<P, R, W>(parser: &mut ChunkParser<P>, writer: &mut ChunkWriter<R, W>) -> Result<FilterStats>
where
    P: Read + Seek,
    R: Read + Seek,
    W: Write + Seek,
{
    let mut events_read = 0u64;
    while let Some(header) = parser.next_header()? {
        let catalog = parser.read_metadata(&header)?;
        writer.begin_chunk(&header)?;
        let checkpoints = parser.read_constant_pools(&header, &catalog, &mut *writer)?;

        // Pass 1: accept + touch
        let mut accepted = Vec::new();
        for event in parser.events(&header, &catalog) {
            let event = event?;
            events_read += 1;
            if writer.accept(&event) {
                writer.touch_all(&event.fields);
                accepted.push((event.start_position, event.end_position));
            }
        }
        debug!(
            "chunk at {}: {} checkpoints, {} accepted events, {} of {} pool entries touched",
            header.absolute_chunk_start(),
            checkpoints,
            accepted.len(),
            writer.registry().touched_count(),
            writer.registry().len()
        );

        // Pass 2: copy
        for (start, end) in accepted {
            writer.write_event(start, end)?;
        }
        writer.end_chunk(&header)?;
    }
    let mut stats = writer.stats().clone();
    stats.events_read = events_read;
    Ok(stats)
}

/// Source and destination must not be the same file: creating the
/// destination would truncate the source.
fn ensure_distinct(source: &Path, destination: &Path) -> Result<()> {
    let same = match (source.canonicalize(), destination.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same {
        return Err(Error::from(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("source and destination are the same file: {}", source.display()),
        )));
    }
    Ok(())
}
