//! Read-only overview of a recording: chunks, event counts, checkpoints.
//!
//! Used by the `summary` subcommand and by tests that want to look at a
//! filtered recording without decoding it by hand.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use serde_json::{json, Value as Json};

use crate::checkpoint::CheckpointRecord;
use crate::parser::{ChunkParser, PoolSink};
use crate::pool::PoolEntry;
use crate::{FastIndexMap, Result};

/// Keys one checkpoint defines for one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSummary {
    pub type_id: u64,
    pub name: Option<String>,
    pub keys: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSummary {
    /// Chunk-relative position.
    pub position: u64,
    pub size: u64,
    pub delta: i64,
    pub flush: bool,
    pub pools: Vec<PoolSummary>,
}

impl CheckpointSummary {
    /// Keys of `type_id` across all its pools in this checkpoint.
    pub fn keys_of(&self, type_id: u64) -> Vec<i64> {
        self.pools
            .iter()
            .filter(|p| p.type_id == type_id)
            .flat_map(|p| p.keys.iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    /// Absolute position of the chunk in the file.
    pub start: u64,
    pub size: u64,
    pub version: (u16, u16),
    pub start_nanos: i64,
    pub duration_nanos: i64,
    /// Types described by the metadata.
    pub type_count: usize,
    pub event_count: u64,
    /// Event counts per type name, in order of first appearance.
    pub events_by_type: Vec<(String, u64)>,
    pub checkpoints: Vec<CheckpointSummary>,
}

impl ChunkSummary {
    /// Count of events named `type_name`.
    pub fn events_of(&self, type_name: &str) -> u64 {
        self.events_by_type
            .iter()
            .find(|(name, _)| name == type_name)
            .map_or(0, |(_, n)| *n)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingSummary {
    pub chunks: Vec<ChunkSummary>,
}

impl RecordingSummary {
    /// Events over all chunks.
    pub fn event_count(&self) -> u64 {
        self.chunks.iter().map(|c| c.event_count).sum()
    }

    pub fn to_json(&self) -> Json {
        let chunks: Vec<Json> = self
            .chunks
            .iter()
            .map(|c| {
                let events: serde_json::Map<String, Json> =
                    c.events_by_type.iter().map(|(name, n)| (name.clone(), json!(n))).collect();
                let checkpoints: Vec<Json> = c
                    .checkpoints
                    .iter()
                    .map(|cp| {
                        let pools: Vec<Json> = cp
                            .pools
                            .iter()
                            .map(|p| json!({ "typeId": p.type_id, "name": p.name, "keys": p.keys }))
                            .collect();
                        json!({
                            "position": cp.position,
                            "size": cp.size,
                            "delta": cp.delta,
                            "flush": cp.flush,
                            "pools": pools,
                        })
                    })
                    .collect();
                json!({
                    "start": c.start,
                    "size": c.size,
                    "version": format!("{}.{}", c.version.0, c.version.1),
                    "startNanos": c.start_nanos,
                    "durationNanos": c.duration_nanos,
                    "types": c.type_count,
                    "eventCount": c.event_count,
                    "events": events,
                    "checkpoints": checkpoints,
                })
            })
            .collect();
        json!({ "chunks": chunks, "eventCount": self.event_count() })
    }
}

impl fmt::Display for RecordingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.chunks.iter().enumerate() {
            writeln!(
                f,
                "chunk {i} at {} ({} bytes, v{}.{}): {} events, {} checkpoints",
                c.start,
                c.size,
                c.version.0,
                c.version.1,
                c.event_count,
                c.checkpoints.len()
            )?;
            for (name, n) in &c.events_by_type {
                writeln!(f, "  {n:>8}  {name}")?;
            }
            for cp in &c.checkpoints {
                let entries: usize = cp.pools.iter().map(|p| p.keys.len()).sum();
                writeln!(
                    f,
                    "  checkpoint @{} size {} delta {}: {} pools, {} entries",
                    cp.position,
                    cp.size,
                    cp.delta,
                    cp.pools.len(),
                    entries
                )?;
            }
        }
        Ok(())
    }
}

/// Sammelt Checkpoints eines Chunks für die Zusammenfassung.
struct Collector {
    chunk_start: u64,
    checkpoints: Vec<CheckpointSummary>,
}

impl PoolSink for Collector {
    fn checkpoint(&mut self, record: &CheckpointRecord) -> Result<()> {
        self.checkpoints.push(CheckpointSummary {
            position: record.position - self.chunk_start,
            size: record.size,
            delta: record.delta,
            flush: record.flush,
            pools: Vec::new(),
        });
        Ok(())
    }

    fn pool(&mut self, type_id: u64, name: Option<&str>) -> Result<()> {
        if let Some(cp) = self.checkpoints.last_mut() {
            cp.pools.push(PoolSummary {
                type_id,
                name: name.map(str::to_owned),
                keys: Vec::new(),
            });
        }
        Ok(())
    }

    fn entry(&mut self, entry: PoolEntry) -> Result<()> {
        if let Some(pool) = self.checkpoints.last_mut().and_then(|cp| cp.pools.last_mut()) {
            pool.keys.push(entry.key());
        }
        Ok(())
    }
}

/// Summarises the recording at `path`.
pub fn summarize(path: &Path) -> Result<RecordingSummary> {
    summarize_reader(File::open(path)?)
}

/// Summarises a recording from any seekable reader.
pub fn summarize_reader<R: Read + Seek>(reader: R) -> Result<RecordingSummary> {
    let mut parser = ChunkParser::from_reader(reader)?;
    let mut summary = RecordingSummary::default();
    while let Some(header) = parser.next_header()? {
        let catalog = parser.read_metadata(&header)?;
        let mut collector = Collector {
            chunk_start: header.absolute_chunk_start(),
            checkpoints: Vec::new(),
        };
        parser.read_constant_pools(&header, &catalog, &mut collector)?;

        let mut counts: FastIndexMap<String, u64> = FastIndexMap::default();
        let mut event_count = 0;
        for event in parser.events(&header, &catalog) {
            let event = event?;
            let name = match event.type_name() {
                Some(name) => name.to_owned(),
                None => format!("type {}", event.type_id),
            };
            *counts.entry(name).or_default() += 1;
            event_count += 1;
        }

        summary.chunks.push(ChunkSummary {
            start: header.absolute_chunk_start(),
            size: header.chunk_size(),
            version: header.version(),
            start_nanos: header.start_nanos(),
            duration_nanos: header.duration_nanos(),
            type_count: catalog.len(),
            event_count,
            events_by_type: counts.into_iter().collect(),
            checkpoints: collector.checkpoints,
        });
    }
    Ok(summary)
}
