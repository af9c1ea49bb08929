//! Chunk parser: headers, metadata, constant pools and events.
//!
//! The parser only reads. Constant pools are handed to a [`PoolSink`]
//! (the chunk writer or the summary), events come out of
//! [`ChunkParser::events`] in input order.
//!
//! Checkpoints are found by walking the delta chain backwards from the
//! header's last-checkpoint offset; the positions are collected first and
//! then parsed front to back, so sinks always see them in input order.
//!
//! # Beispiel
//!
//! ```
//! use std::io::Cursor;
//! use tracefilter::builder::{ChunkBuilder, RecordingBuilder};
//! use tracefilter::metadata::TypeCatalog;
//! use tracefilter::parser::ChunkParser;
//!
//! let mut chunk = ChunkBuilder::new(TypeCatalog::new());
//! chunk.raw_event(300, &[1, 2]);
//! let bytes = RecordingBuilder::new().chunk(chunk).build();
//!
//! let mut parser = ChunkParser::from_reader(Cursor::new(bytes))?;
//! let header = parser.next_header()?.expect("one chunk");
//! let catalog = parser.read_metadata(&header)?;
//! let types: Vec<u64> = parser
//!     .events(&header, &catalog)
//!     .map(|e| e.map(|e| e.type_id))
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(types, vec![300]);
//! assert!(parser.next_header()?.is_none());
//! # Ok::<(), tracefilter::Error>(())
//! ```

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use log::trace;

use crate::channel::PositionalInput;
use crate::checkpoint::CheckpointRecord;
use crate::event::RecordedEvent;
use crate::header::ChunkHeader;
use crate::metadata::{TypeCatalog, CHECKPOINT_TYPE_ID, METADATA_TYPE_ID};
use crate::pool::PoolEntry;
use crate::{Error, Result};

/// Receiver of the constant pools of one chunk.
///
/// Calls arrive in input order: `checkpoint`, then for each of its pools
/// `pool` followed by one `entry` per definition.
pub trait PoolSink {
    fn checkpoint(&mut self, record: &CheckpointRecord) -> Result<()>;
    fn pool(&mut self, type_id: u64, name: Option<&str>) -> Result<()>;
    fn entry(&mut self, entry: PoolEntry) -> Result<()>;
}

/// Sequential reader over the chunks of one recording.
pub struct ChunkParser<R = File> {
    input: PositionalInput<R>,
    next_chunk: u64,
}

impl ChunkParser<File> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(PositionalInput::open(path)?))
    }
}

impl<R: Read + Seek> ChunkParser<R> {
    pub fn new(input: PositionalInput<R>) -> Self {
        Self { input, next_chunk: 0 }
    }

    pub fn from_reader(reader: R) -> Result<Self> {
        Ok(Self::new(PositionalInput::new(reader)?))
    }

    /// Length of the whole recording.
    pub fn source_len(&self) -> u64 {
        self.input.len()
    }

    /// Header of the next chunk, `None` at end of input.
    pub fn next_header(&mut self) -> Result<Option<ChunkHeader>> {
        if self.next_chunk >= self.input.len() {
            return Ok(None);
        }
        self.input.seek(self.next_chunk)?;
        let header = ChunkHeader::read(&mut self.input)?;
        self.next_chunk = header.absolute_chunk_end();
        trace!(
            "chunk header at {}: size {}, last checkpoint {}, metadata {}",
            header.absolute_chunk_start(),
            header.chunk_size(),
            header.constant_pool_position(),
            header.metadata_position()
        );
        Ok(Some(header))
    }

    /// Decodes the chunk's metadata record.
    pub fn read_metadata(&mut self, header: &ChunkHeader) -> Result<TypeCatalog> {
        TypeCatalog::read(
            &mut self.input,
            header.absolute_metadata_position(),
            header.absolute_chunk_end(),
        )
    }

    /// Reads the fixed fields of the checkpoint record at `position`.
    ///
    /// The input is left at the first pool.
    pub fn read_checkpoint_record(&mut self, position: u64, header: &ChunkHeader) -> Result<CheckpointRecord> {
        self.input.seek(position)?;
        let size = self.input.read_u64()?;
        if size == 0 || position.saturating_add(size) > header.absolute_chunk_end() {
            return Err(Error::corrupt(position, format!("checkpoint size {size} does not fit chunk")));
        }
        let type_id = self.input.read_u64()?;
        if type_id != CHECKPOINT_TYPE_ID {
            return Err(Error::UnexpectedRecordType {
                position,
                expected: CHECKPOINT_TYPE_ID,
                found: type_id,
            });
        }
        Ok(CheckpointRecord {
            position,
            size,
            start_time: self.input.read_i64()?,
            duration: self.input.read_i64()?,
            delta: self.input.read_i64()?,
            flush: self.input.read_byte()? != 0,
            pool_count: self.input.read_u32()?,
        })
    }

    /// Absolute positions of all checkpoints on the delta chain, in input order.
    pub fn checkpoint_positions(&mut self, header: &ChunkHeader) -> Result<Vec<u64>> {
        let mut positions = Vec::new();
        let Some(mut position) = header.absolute_constant_pool_position() else {
            return Ok(positions);
        };
        let body_start = header.absolute_body_start();
        loop {
            let record = self.read_checkpoint_record(position, header)?;
            if let Some(&later) = positions.last() {
                if record.end_position() > later {
                    return Err(Error::corrupt(position, format!("checkpoint overlaps checkpoint at {later}")));
                }
            }
            positions.push(position);
            if record.delta == 0 {
                break;
            }
            // Delta zeigt immer rückwärts und bleibt im Chunk-Body
            let previous = i128::from(position) + i128::from(record.delta);
            if record.delta > 0 || previous < i128::from(body_start) {
                return Err(Error::corrupt(
                    position,
                    format!("checkpoint delta {} leaves chunk body", record.delta),
                ));
            }
            position = previous as u64;
        }
        positions.reverse();
        Ok(positions)
    }

    /// Feeds every checkpoint of the chunk into `sink`; returns how many there were.
    pub fn read_constant_pools(
        &mut self,
        header: &ChunkHeader,
        catalog: &TypeCatalog,
        sink: &mut impl PoolSink,
    ) -> Result<usize> {
        let positions = self.checkpoint_positions(header)?;
        for &position in &positions {
            let record = self.read_checkpoint_record(position, header)?;
            sink.checkpoint(&record)?;
            self.read_pools(&record, catalog, &mut *sink)?;
        }
        Ok(positions.len())
    }

    fn read_pools(&mut self, record: &CheckpointRecord, catalog: &TypeCatalog, sink: &mut impl PoolSink) -> Result<()> {
        let record_end = record.end_position();
        for _ in 0..record.pool_count {
            let at = self.input.position();
            let type_id = self.input.read_u64()?;
            let count = self.input.read_u32()?;
            if count > 0 && catalog.get(type_id).is_none() {
                return Err(Error::UnknownPoolType(type_id));
            }
            // Jeder Eintrag braucht mindestens ein Byte (den Key)
            if u64::from(count) > record_end.saturating_sub(self.input.position()) {
                return Err(Error::corrupt(at, format!("{count} entries exceed checkpoint size")));
            }
            sink.pool(type_id, catalog.name_of(type_id))?;
            for _ in 0..count {
                let start = self.input.position();
                let key = self.input.read_i64()?;
                let values = catalog.read_fields(type_id, &mut self.input)?.unwrap_or_default();
                let end = self.input.position();
                if end > record_end {
                    return Err(Error::CheckpointSizeMismatch {
                        position: record.position,
                        declared: record.size,
                        actual: end - record.position,
                    });
                }
                sink.entry(PoolEntry::new(key, start, end, values))?;
            }
        }
        let actual = self.input.position() - record.position;
        if actual != record.size {
            return Err(Error::CheckpointSizeMismatch {
                position: record.position,
                declared: record.size,
                actual,
            });
        }
        Ok(())
    }

    /// Events of the chunk in input order; metadata and checkpoint records
    /// are skipped. The iterator stops after the first error.
    pub fn events<'p, 'c>(&'p mut self, header: &ChunkHeader, catalog: &'c TypeCatalog) -> Events<'p, 'c, R> {
        Events {
            input: &mut self.input,
            catalog,
            position: header.absolute_body_start(),
            end: header.absolute_chunk_end(),
        }
    }
}

/// Iterator over the events of one chunk.
pub struct Events<'p, 'c, R> {
    input: &'p mut PositionalInput<R>,
    catalog: &'c TypeCatalog,
    position: u64,
    end: u64,
}

impl<'c, R: Read + Seek> Events<'_, 'c, R> {
    fn read_record(&mut self) -> Result<Option<RecordedEvent<'c>>> {
        let start = self.position;
        self.input.seek(start)?;
        let size = self.input.read_u64()?;
        if size == 0 {
            return Err(Error::corrupt(start, "record size 0"));
        }
        let end = start
            .checked_add(size)
            .filter(|&end| end <= self.end)
            .ok_or_else(|| Error::corrupt(start, format!("record of {size} bytes crosses chunk end")))?;
        let type_id = self.input.read_u64()?;
        self.position = end;
        if type_id == METADATA_TYPE_ID || type_id == CHECKPOINT_TYPE_ID {
            return Ok(None);
        }

        let catalog: &'c TypeCatalog = self.catalog;
        let descriptor = catalog.get(type_id);
        let fields = match descriptor {
            Some(_) => catalog.read_fields(type_id, self.input)?.unwrap_or_default(),
            None => Vec::new(),
        };
        if self.input.position() > end {
            return Err(Error::corrupt(start, format!("fields of type {type_id} overrun record")));
        }
        Ok(Some(RecordedEvent {
            type_id,
            descriptor,
            start_position: start,
            end_position: end,
            fields,
        }))
    }
}

impl<'c, R: Read + Seek> Iterator for Events<'_, 'c, R> {
    type Item = Result<RecordedEvent<'c>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.position < self.end {
            match self.read_record() {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => {}
                Err(e) => {
                    self.position = self.end;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ChunkBuilder, RecordingBuilder};
    use crate::header::HEADER_SIZE;
    use crate::metadata::{FieldKind, TypeDescriptor};
    use crate::value::{Reference, Value};
    use crate::varint;
    use std::io::Cursor;

    /// Sammelt alle Sink-Aufrufe als Text.
    #[derive(Default)]
    struct Trace(Vec<String>);

    impl PoolSink for Trace {
        fn checkpoint(&mut self, record: &CheckpointRecord) -> Result<()> {
            self.0.push(format!("cp@{} delta={}", record.position, record.delta));
            Ok(())
        }
        fn pool(&mut self, type_id: u64, name: Option<&str>) -> Result<()> {
            self.0.push(format!("pool {type_id} {}", name.unwrap_or("?")));
            Ok(())
        }
        fn entry(&mut self, entry: PoolEntry) -> Result<()> {
            self.0.push(format!("entry {} refs={}", entry.key(), entry.references().len()));
            Ok(())
        }
    }

    fn catalog() -> TypeCatalog {
        TypeCatalog::new()
            .with(TypeDescriptor::new(20, "demo.Thread").with_field("name", FieldKind::String))
            .with(
                TypeDescriptor::new(21, "demo.Frame")
                    .with_field("line", FieldKind::Int)
                    .with_field("thread", FieldKind::Reference(20)),
            )
            .with(TypeDescriptor::new(100, "demo.Tick").with_field("frame", FieldKind::Reference(21)))
    }

    fn parser_of(bytes: Vec<u8>) -> ChunkParser<Cursor<Vec<u8>>> {
        ChunkParser::from_reader(Cursor::new(bytes)).unwrap()
    }

    fn two_checkpoints() -> (Vec<u8>, u64, u64) {
        let mut chunk = ChunkBuilder::new(catalog());
        let first = chunk.position();
        chunk
            .checkpoint(&[(20, vec![(1, vec![Value::Text("main".into())])])])
            .unwrap();
        chunk.event(100, &[Value::Ref(Reference::new(21, 5))]).unwrap();
        let second = chunk.position();
        chunk
            .checkpoint(&[(21, vec![(5, vec![Value::Long(12), Value::Ref(Reference::new(20, 1))])])])
            .unwrap();
        chunk.raw_event(300, &[9, 9, 9]);
        (chunk.finish(), first, second)
    }

    #[test]
    fn chain_walk_yields_input_order() {
        let (bytes, first, second) = two_checkpoints();
        let mut parser = parser_of(bytes);
        let header = parser.next_header().unwrap().unwrap();
        assert_eq!(parser.checkpoint_positions(&header).unwrap(), vec![first, second]);

        let catalog = parser.read_metadata(&header).unwrap();
        let mut sink = Trace::default();
        assert_eq!(parser.read_constant_pools(&header, &catalog, &mut sink).unwrap(), 2);
        assert_eq!(
            sink.0,
            vec![
                format!("cp@{first} delta=0"),
                "pool 20 demo.Thread".to_string(),
                "entry 1 refs=0".to_string(),
                format!("cp@{second} delta={}", first as i64 - second as i64),
                "pool 21 demo.Frame".to_string(),
                "entry 5 refs=1".to_string(),
            ]
        );
    }

    #[test]
    fn events_skip_checkpoints_and_metadata() {
        let (bytes, _, _) = two_checkpoints();
        let mut parser = parser_of(bytes);
        let header = parser.next_header().unwrap().unwrap();
        let catalog = parser.read_metadata(&header).unwrap();
        let events: Vec<_> = parser.events(&header, &catalog).collect::<Result<_>>().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].type_name(), Some("demo.Tick"));
        assert_eq!(events[0].fields, vec![Value::Ref(Reference::new(21, 5))]);
        assert_eq!(events[1].type_id, 300);
        assert!(events[1].descriptor.is_none());
        assert!(events[1].fields.is_empty());
        assert!(events[0].end_position <= events[1].start_position);
    }

    #[test]
    fn chunk_without_checkpoints() {
        let mut chunk = ChunkBuilder::new(catalog());
        chunk.raw_event(300, &[]);
        let mut parser = parser_of(chunk.finish());
        let header = parser.next_header().unwrap().unwrap();
        let catalog = parser.read_metadata(&header).unwrap();
        assert!(parser.checkpoint_positions(&header).unwrap().is_empty());
        let mut sink = Trace::default();
        assert_eq!(parser.read_constant_pools(&header, &catalog, &mut sink).unwrap(), 0);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn iterates_multiple_chunks() {
        let bytes = RecordingBuilder::new()
            .chunk(ChunkBuilder::new(catalog()))
            .chunk(ChunkBuilder::new(catalog()))
            .build();
        let mut parser = parser_of(bytes);
        let first = parser.next_header().unwrap().unwrap();
        let second = parser.next_header().unwrap().unwrap();
        assert_eq!(second.absolute_chunk_start(), first.absolute_chunk_end());
        assert!(parser.next_header().unwrap().is_none());
    }

    #[test]
    fn size_mismatch_fails_fast() {
        let (mut bytes, first, _) = two_checkpoints();
        // padded Size des ersten Checkpoints um eins erhöhen
        let at = first as usize;
        let (size, _) = varint::decode_slice(&bytes[at..]).unwrap();
        bytes[at..at + 4].copy_from_slice(&varint::encode_padded(size + 1).unwrap());
        let mut parser = parser_of(bytes);
        let header = parser.next_header().unwrap().unwrap();
        let catalog = parser.read_metadata(&header).unwrap();
        let err = parser
            .read_constant_pools(&header, &catalog, &mut Trace::default())
            .unwrap_err();
        assert_eq!(
            err,
            Error::CheckpointSizeMismatch { position: first, declared: size + 1, actual: size }
        );
    }

    #[test]
    fn forward_delta_is_corrupt() {
        let mut chunk = ChunkBuilder::new(catalog());
        chunk.checkpoint(&[]).unwrap();
        let mut bytes = chunk.finish();
        // Layout: size(4) type start duration delta → delta-Byte an Offset 4+3
        let delta_at = HEADER_SIZE as usize + 7;
        assert_eq!(bytes[delta_at], 0);
        bytes[delta_at] = 5;
        let mut parser = parser_of(bytes);
        let header = parser.next_header().unwrap().unwrap();
        let err = parser.checkpoint_positions(&header).unwrap_err();
        assert!(err.to_string().contains("delta 5"), "{err}");
    }

    #[test]
    fn undescribed_pool_type_is_an_error() {
        let mut chunk = ChunkBuilder::new(catalog());
        chunk.checkpoint(&[(20, vec![(1, vec![Value::Null])])]).unwrap();
        let bytes = chunk.finish();
        let mut parser = parser_of(bytes);
        let header = parser.next_header().unwrap().unwrap();
        let empty = TypeCatalog::new();
        let err = parser.read_constant_pools(&header, &empty, &mut Trace::default()).unwrap_err();
        assert_eq!(err, Error::UnknownPoolType(20));
    }

    #[test]
    fn zero_sized_record_stops_iteration() {
        let mut chunk = ChunkBuilder::new(catalog());
        chunk.raw_event(300, &[1]);
        let mut bytes = chunk.finish();
        bytes[HEADER_SIZE as usize] = 0;
        let mut parser = parser_of(bytes);
        let header = parser.next_header().unwrap().unwrap();
        let catalog = parser.read_metadata(&header).unwrap();
        let mut events = parser.events(&header, &catalog);
        let err = events.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("record size 0"), "{err}");
        assert!(events.next().is_none());
    }

    #[test]
    fn oversized_record_is_corrupt() {
        let mut chunk = ChunkBuilder::new(TypeCatalog::new());
        chunk.raw_event(300, &[1]);
        let mut bytes = chunk.finish();
        bytes[HEADER_SIZE as usize] = 0x7F;
        let mut parser = parser_of(bytes);
        let header = parser.next_header().unwrap().unwrap();
        let catalog = parser.read_metadata(&header).unwrap();
        let err = parser.events(&header, &catalog).next().unwrap().unwrap_err();
        assert!(err.to_string().contains("crosses chunk end"), "{err}");
    }
}
