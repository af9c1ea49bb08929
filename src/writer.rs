//! Chunk writer: copies retained events and sweeps constant pools.
//!
//! Per chunk the caller drives the writer like this:
//!
//! 1. [`ChunkWriter::begin_chunk`] copies the fixed header and starts with
//!    an empty [`PoolRegistry`] and [`CheckpointQueue`].
//! 2. Checkpoints of the input chunk are registered
//!    ([`new_checkpoint_event`](ChunkWriter::new_checkpoint_event),
//!    [`begin_checkpoint_pool`](ChunkWriter::begin_checkpoint_pool),
//!    [`add_pool_entry`](ChunkWriter::add_pool_entry)), usually through the
//!    [`PoolSink`] impl fed by the chunk parser.
//! 3. Events are tested with [`accept`](ChunkWriter::accept) and their
//!    values marked with [`touch`](ChunkWriter::touch) (mark phase).
//! 4. [`write_event`](ChunkWriter::write_event) copies an event, after
//!    rewriting every checkpoint queued in front of it (sweep phase).
//! 5. [`end_chunk`](ChunkWriter::end_chunk) flushes the remaining
//!    checkpoints, copies the metadata record and back-patches the header.
//!
//! Size fields are reserved in padded form and patched once the real
//! value is known, so nothing is buffered beyond the channel's write buffer.
//!
//! Ein Writer, der ohne abgeschlossenen Chunk gedroppt wird (Fehlerpfad),
//! löscht seine Zieldatei: eine erzeugte Datei ist entweder vollständig
//! oder gar nicht vorhanden.

use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::channel::{copy_range, PositionalInput, PositionalOutput};
use crate::checkpoint::{CheckpointEvent, CheckpointHandle, CheckpointQueue, CheckpointRecord};
use crate::event::{EventPredicate, RecordedEvent};
use crate::header::{ChunkHeader, CHUNK_SIZE_OFFSET, CONSTANT_POOL_OFFSET, HEADER_SIZE, METADATA_OFFSET};
use crate::parser::PoolSink;
use crate::pool::{ConstantPool, EntryId, PoolEntry, PoolRegistry, TouchOutcome};
use crate::value::Value;
use crate::{Error, FastHashMap, Result};

/// Counters over everything a writer has done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Chunks completed with `end_chunk`.
    pub chunks: u64,
    /// Events offered to the predicate (filled in by the driver).
    pub events_read: u64,
    pub events_written: u64,
    pub checkpoints_written: u64,
    /// Pool entries copied by the sweep.
    pub entries_written: u64,
    /// Pool entries dropped by the sweep.
    pub entries_purged: u64,
    /// Input bytes of dropped pool entries.
    pub bytes_purged: u64,
    /// References whose type had no pool in its chunk.
    pub unresolved_references: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    /// No chunk started yet.
    Idle,
    /// `begin_chunk` ran, `end_chunk` not yet.
    Open,
    /// Last chunk finished.
    Complete,
}

/// Verworfene Einträge eines Typs im laufenden Chunk.
#[derive(Debug, Default, Clone, Copy)]
struct Waste {
    entries: u64,
    bytes: u64,
}

/// Filters one input recording into one output recording, chunk by chunk.
pub struct ChunkWriter<R: Read + Seek = File, W: Write + Seek = File> {
    input: PositionalInput<R>,
    output: PositionalOutput<W>,
    /// Zieldatei, die bei Abbruch gelöscht wird (nur bei `create`).
    destination: Option<PathBuf>,
    predicate: EventPredicate,
    state: WriterState,
    committed: bool,
    /// Output position of the current chunk's header.
    chunk_start: u64,
    /// Output position of the last checkpoint written in the current chunk.
    last_checkpoint: Option<u64>,
    registry: PoolRegistry,
    queue: CheckpointQueue,
    /// Checkpoint the [`PoolSink`] calls currently fill.
    sink_checkpoint: Option<CheckpointHandle>,
    waste: FastHashMap<u64, Waste>,
    stats: FilterStats,
}

impl ChunkWriter {
    /// Opens `source` for reading and creates (or truncates) `destination`.
    pub fn create(source: &Path, destination: &Path, predicate: EventPredicate) -> Result<Self> {
        let input = PositionalInput::open(source)?;
        let output = PositionalOutput::create(destination)?;
        let mut writer = Self::new(input, output, predicate);
        writer.destination = Some(destination.to_path_buf());
        Ok(writer)
    }
}

impl<R: Read + Seek, W: Write + Seek> ChunkWriter<R, W> {
    /// Writer over already opened channels. Nothing is deleted on abort;
    /// the caller owns the output.
    pub fn new(input: PositionalInput<R>, output: PositionalOutput<W>, predicate: EventPredicate) -> Self {
        Self {
            input,
            output,
            destination: None,
            predicate,
            state: WriterState::Idle,
            committed: false,
            chunk_start: 0,
            last_checkpoint: None,
            registry: PoolRegistry::new(),
            queue: CheckpointQueue::new(),
            sink_checkpoint: None,
            waste: FastHashMap::default(),
            stats: FilterStats::default(),
        }
    }

    /// Starts a new output chunk for the input chunk described by `header`.
    pub fn begin_chunk(&mut self, header: &ChunkHeader) -> Result<()> {
        if self.state == WriterState::Open {
            return Err(Error::chunk_state(format!(
                "begin_chunk while chunk at {} is still open",
                self.chunk_start
            )));
        }
        self.chunk_start = self.output.position();
        let from = header.absolute_chunk_start();
        copy_range(&mut self.input, &mut self.output, from, from + HEADER_SIZE)?;
        self.reset_chunk_state();
        self.state = WriterState::Open;
        debug!(
            "chunk at input {from} ({} bytes) -> output {}",
            header.chunk_size(),
            self.chunk_start
        );
        Ok(())
    }

    /// Runs the retention predicate. Has no effect on writer state.
    pub fn accept(&self, event: &RecordedEvent<'_>) -> bool {
        (self.predicate)(event)
    }

    /// Marks every pool entry reachable from `value`.
    pub fn touch(&mut self, value: &Value) -> TouchOutcome {
        let outcome = self.registry.touch(value);
        self.stats.unresolved_references += outcome.unresolved as u64;
        outcome
    }

    /// [`touch`](Self::touch) for every field of an event.
    pub fn touch_all(&mut self, values: &[Value]) -> TouchOutcome {
        let outcome = self.registry.touch_all(values);
        self.stats.unresolved_references += outcome.unresolved as u64;
        outcome
    }

    /// Queues the input checkpoint at absolute `start_position`.
    pub fn new_checkpoint_event(&mut self, start_position: u64) -> Result<CheckpointHandle> {
        self.ensure_open("new_checkpoint_event")?;
        self.queue.push(CheckpointEvent::new(start_position))
    }

    /// Opens the pool section for `type_id` on a queued checkpoint.
    pub fn begin_checkpoint_pool(&mut self, handle: CheckpointHandle, type_id: u64, name: Option<&str>) -> Result<()> {
        let checkpoint = self.queue.get_mut(handle)?;
        checkpoint.add_pool(type_id);
        let pool = self.registry.pool_mut(type_id);
        if let Some(name) = name {
            pool.set_name(name);
        }
        Ok(())
    }

    /// Registers `entry` in the pool section opened last on `handle`.
    pub fn add_pool_entry(&mut self, handle: CheckpointHandle, entry: PoolEntry) -> Result<EntryId> {
        let checkpoint = self.queue.get_mut(handle)?;
        let type_id = checkpoint.current_type().ok_or(Error::NoOpenPool {
            checkpoint: handle.position(),
        })?;
        let id = self.registry.insert(type_id, entry);
        checkpoint.add_entry(id)?;
        Ok(id)
    }

    /// Pool for `type_id` in the current chunk, created on first use.
    pub fn get_pool(&mut self, type_id: u64) -> &mut ConstantPool {
        self.registry.pool_mut(type_id)
    }

    /// Copies the input event `[start, end)` to the output.
    ///
    /// Every queued checkpoint that starts before `start` is rewritten
    /// first, in input order.
    pub fn write_event(&mut self, start: u64, end: u64) -> Result<()> {
        if end < start {
            return Err(Error::MalformedRange { start, end });
        }
        self.ensure_open("write_event")?;
        while let Some(checkpoint) = self.queue.pop_before(start) {
            self.write_checkpoint(checkpoint)?;
        }
        copy_range(&mut self.input, &mut self.output, start, end)?;
        self.stats.events_written += 1;
        Ok(())
    }

    /// Finishes the chunk described by `header`.
    pub fn end_chunk(&mut self, header: &ChunkHeader) -> Result<()> {
        self.ensure_open("end_chunk")?;
        while let Some(checkpoint) = self.queue.pop_first() {
            self.write_checkpoint(checkpoint)?;
        }
        let metadata_position = self.output.position();
        self.copy_metadata(header)?;
        self.update_header(metadata_position)?;
        self.log_waste();
        self.reset_chunk_state();
        self.state = WriterState::Complete;
        self.stats.chunks += 1;
        Ok(())
    }

    /// Flushes and releases the output.
    ///
    /// With a chunk still open the output is incomplete: it is deleted (if
    /// the writer created it) and an error is returned.
    pub fn close(mut self) -> Result<()> {
        if self.state == WriterState::Open {
            self.discard();
            return Err(Error::chunk_state(format!(
                "closed with unfinished chunk at {}, output discarded",
                self.chunk_start
            )));
        }
        self.output.close()?;
        self.committed = true;
        Ok(())
    }

    /// Like [`close`](Self::close) but hands back the inner writer.
    pub fn finish(mut self) -> Result<W> {
        if self.state == WriterState::Open {
            self.discard();
            return Err(Error::chunk_state(format!(
                "finished with unfinished chunk at {}",
                self.chunk_start
            )));
        }
        let inner = self.output.take_inner()?;
        self.committed = true;
        Ok(inner)
    }

    /// Registry of the current chunk.
    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// Number of checkpoints still waiting to be written.
    pub fn pending_checkpoints(&self) -> usize {
        self.queue.len()
    }

    /// Current output position.
    pub fn output_position(&self) -> u64 {
        self.output.position()
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        if self.state == WriterState::Open {
            Ok(())
        } else {
            Err(Error::chunk_state(format!("{op} without an open chunk")))
        }
    }

    /// Registry und Queue werden neu aufgebaut, nicht geleert.
    fn reset_chunk_state(&mut self) {
        self.registry = PoolRegistry::new();
        self.queue = CheckpointQueue::new();
        self.sink_checkpoint = None;
        self.last_checkpoint = None;
        self.waste = FastHashMap::default();
    }

    /// Rewrites one input checkpoint keeping only touched entries.
    ///
    /// Die Größe wird immer in der 4-Byte-Padded-Form reserviert und
    /// nachgetragen. Daraus folgen zwei Grenzen:
    ///
    /// - Ein umgeschriebener Checkpoint ab 2^28 Bytes scheitert mit
    ///   [`Error::PaddedValueTooLarge`].
    /// - Bei vollständiger Retention ist der Checkpoint nur dann
    ///   byte-identisch, wenn die Eingabe ihre Größe ebenfalls gepaddet
    ///   kodiert; eine kompakt kodierte Größe wird hier breiter.
    fn write_checkpoint(&mut self, checkpoint: CheckpointEvent) -> Result<()> {
        let position = checkpoint.start_position();
        self.input.seek(position)?;
        let _declared_size = self.input.read_u64()?;
        let fixed_start = self.input.position();
        let _type_id = self.input.read_u64()?;
        let _start_time = self.input.read_i64()?;
        let _duration = self.input.read_i64()?;
        let fixed_end = self.input.position();
        let _input_delta = self.input.read_i64()?;
        let flush = self.input.read_byte()?;

        let out_start = self.output.position();
        self.output.write_padded_u32(0)?;
        copy_range(&mut self.input, &mut self.output, fixed_start, fixed_end)?;
        let delta = match self.last_checkpoint {
            Some(previous) => previous as i64 - out_start as i64,
            None => 0,
        };
        self.output.write_i64(delta)?;
        self.output.write_byte(flush)?;

        let touched_pools = checkpoint.touched_pools(&self.registry).count();
        self.output.write_u64(touched_pools as u64)?;
        for pool in checkpoint.pools() {
            let touched = pool.touched_count(&self.registry);
            if touched > 0 {
                self.output.write_u64(pool.type_id())?;
                self.output.write_u64(touched as u64)?;
            }
            for &id in pool.entries() {
                let entry = self.registry.entry(id);
                if entry.is_touched() {
                    copy_range(&mut self.input, &mut self.output, entry.start_position(), entry.end_position())?;
                    self.stats.entries_written += 1;
                } else {
                    trace!(
                        "purging {}[{}] ({} bytes)",
                        pool_label(&self.registry, pool.type_id()),
                        entry.key(),
                        entry.len()
                    );
                    let waste = self.waste.entry(pool.type_id()).or_default();
                    waste.entries += 1;
                    waste.bytes += entry.len();
                }
            }
        }

        let size = self.output.position() - out_start;
        self.output.patch_padded_u32(out_start, size)?;
        trace!(
            "checkpoint input {position} -> output {out_start}: {size} bytes, {touched_pools} pools, delta {delta}"
        );
        self.last_checkpoint = Some(out_start);
        self.stats.checkpoints_written += 1;
        Ok(())
    }

    fn copy_metadata(&mut self, header: &ChunkHeader) -> Result<()> {
        let position = header.absolute_metadata_position();
        self.input.seek(position)?;
        let size = self.input.read_u64()?;
        let end = position
            .checked_add(size)
            .filter(|&end| size > 0 && end <= header.absolute_chunk_end())
            .ok_or_else(|| Error::corrupt(position, format!("metadata size {size} does not fit chunk")))?;
        copy_range(&mut self.input, &mut self.output, position, end)
    }

    /// Patches size, last-checkpoint and metadata offsets, all chunk-relative.
    fn update_header(&mut self, metadata_position: u64) -> Result<()> {
        let start = self.chunk_start;
        let chunk_size = self.output.position() - start;
        let constant_pool = self.last_checkpoint.map_or(0, |p| p - start);
        self.output.patch_raw_i64(start + CHUNK_SIZE_OFFSET, chunk_size as i64)?;
        self.output.patch_raw_i64(start + CONSTANT_POOL_OFFSET, constant_pool as i64)?;
        self.output.patch_raw_i64(start + METADATA_OFFSET, (metadata_position - start) as i64)?;
        debug!("chunk at output {start} finished: {chunk_size} bytes");
        Ok(())
    }

    fn log_waste(&mut self) {
        let mut waste: Vec<_> = self.waste.iter().map(|(&type_id, &w)| (type_id, w)).collect();
        waste.sort_by(|a, b| b.1.bytes.cmp(&a.1.bytes).then(a.0.cmp(&b.0)));
        for (type_id, w) in &waste {
            debug!(
                "purged {} entries ({} bytes) of {}",
                w.entries,
                w.bytes,
                pool_label(&self.registry, *type_id)
            );
            self.stats.entries_purged += w.entries;
            self.stats.bytes_purged += w.bytes;
        }
    }

    /// Schließt den Output und löscht die Zieldatei, falls bekannt.
    fn discard(&mut self) {
        let _ = self.output.close();
        if let Some(path) = self.destination.take() {
            match fs::remove_file(&path) {
                Ok(()) => debug!("removed incomplete output {}", path.display()),
                Err(e) => warn!("could not remove incomplete output {}: {e}", path.display()),
            }
        }
        self.committed = true;
    }
}

fn pool_label(registry: &PoolRegistry, type_id: u64) -> String {
    registry
        .pool(type_id)
        .map_or_else(|| format!("type {type_id}"), ConstantPool::label)
}

impl<R: Read + Seek, W: Write + Seek> PoolSink for ChunkWriter<R, W> {
    fn checkpoint(&mut self, record: &CheckpointRecord) -> Result<()> {
        self.sink_checkpoint = Some(self.new_checkpoint_event(record.position)?);
        Ok(())
    }

    fn pool(&mut self, type_id: u64, name: Option<&str>) -> Result<()> {
        let handle = self
            .sink_checkpoint
            .ok_or_else(|| Error::chunk_state("constant pool outside of a checkpoint"))?;
        self.begin_checkpoint_pool(handle, type_id, name)
    }

    fn entry(&mut self, entry: PoolEntry) -> Result<()> {
        let handle = self
            .sink_checkpoint
            .ok_or_else(|| Error::chunk_state("pool entry outside of a checkpoint"))?;
        self.add_pool_entry(handle, entry).map(|_| ())
    }
}

impl<R: Read + Seek, W: Write + Seek> Drop for ChunkWriter<R, W> {
    fn drop(&mut self) {
        if !self.committed {
            if self.state == WriterState::Open {
                debug!("writer dropped with open chunk at {}", self.chunk_start);
            }
            self.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ChunkBuilder;
    use crate::metadata::{FieldKind, TypeCatalog, TypeDescriptor};
    use crate::value::Reference;
    use crate::varint;
    use std::io::Cursor;

    type MemWriter = ChunkWriter<Cursor<Vec<u8>>, Cursor<Vec<u8>>>;

    fn catalog() -> TypeCatalog {
        TypeCatalog::new()
            .with(TypeDescriptor::new(20, "T1").with_field("value", FieldKind::String))
            .with(TypeDescriptor::new(100, "demo.Event").with_field("t1", FieldKind::Reference(20)))
    }

    struct Layout {
        bytes: Vec<u8>,
        checkpoint: u64,
        event: (u64, u64),
    }

    /// Ein Checkpoint mit T1 = {1: "a", 2: "b"}, danach ein Event auf T1[1].
    fn scenario() -> Layout {
        let mut chunk = ChunkBuilder::new(catalog());
        let checkpoint = chunk.position();
        chunk
            .checkpoint(&[(
                20,
                vec![(1, vec![Value::Text("a".into())]), (2, vec![Value::Text("b".into())])],
            )])
            .unwrap();
        let event_start = chunk.position();
        chunk.event(100, &[Value::Ref(Reference::new(20, 1))]).unwrap();
        let event_end = chunk.position();
        Layout {
            bytes: chunk.finish(),
            checkpoint,
            event: (event_start, event_end),
        }
    }

    fn writer_over(bytes: Vec<u8>, accept: bool) -> MemWriter {
        let input = PositionalInput::new(Cursor::new(bytes)).unwrap();
        let output = PositionalOutput::new(Cursor::new(Vec::new()));
        ChunkWriter::new(input, output, Box::new(move |_| accept))
    }

    fn header_of(bytes: &[u8]) -> ChunkHeader {
        let mut input = PositionalInput::new(Cursor::new(bytes.to_vec())).unwrap();
        ChunkHeader::read(&mut input).unwrap()
    }

    /// Registriert den Checkpoint von `scenario` von Hand (ohne Parser).
    fn register(writer: &mut MemWriter, layout: &Layout) -> [EntryId; 2] {
        // je Eintrag: Key (1 Byte) + UTF-8-String "a" (3 Bytes)
        let handle = writer.new_checkpoint_event(layout.checkpoint).unwrap();
        writer.begin_checkpoint_pool(handle, 20, Some("T1")).unwrap();
        let pools_at = entries_start(&layout.bytes, layout.checkpoint);
        let a = writer.add_pool_entry(handle, PoolEntry::new(1, pools_at, pools_at + 4, vec![])).unwrap();
        let b = writer
            .add_pool_entry(handle, PoolEntry::new(2, pools_at + 4, pools_at + 8, vec![]))
            .unwrap();
        [a, b]
    }

    /// Position of the first entry in the (single-pool) checkpoint at `at`.
    fn entries_start(bytes: &[u8], at: u64) -> u64 {
        let mut pos = at as usize;
        // size, type, start, duration, delta
        for _ in 0..5 {
            let (_, n) = varint::decode_slice(&bytes[pos..]).unwrap();
            pos += n;
        }
        pos += 1; // flush
        // pool count, pool type, entry count
        for _ in 0..3 {
            let (_, n) = varint::decode_slice(&bytes[pos..]).unwrap();
            pos += n;
        }
        pos as u64
    }

    fn varints(bytes: &[u8], mut pos: usize, n: usize) -> (Vec<u64>, usize) {
        let mut out = Vec::new();
        for _ in 0..n {
            let (v, used) = varint::decode_slice(&bytes[pos..]).unwrap();
            out.push(v);
            pos += used;
        }
        (out, pos)
    }

    #[test]
    fn accepted_event_keeps_only_touched_key() {
        let layout = scenario();
        let header = header_of(&layout.bytes);
        let mut writer = writer_over(layout.bytes.clone(), true);
        writer.begin_chunk(&header).unwrap();
        let [a, b] = register(&mut writer, &layout);
        writer.touch(&Value::Ref(Reference::new(20, 1)));
        assert!(writer.registry().entry(a).is_touched());
        assert!(!writer.registry().entry(b).is_touched());
        writer.write_event(layout.event.0, layout.event.1).unwrap();
        writer.end_chunk(&header).unwrap();
        let stats = writer.stats().clone();
        let out = writer.finish().unwrap().into_inner();

        let cp = HEADER_SIZE as usize;
        let (fields, pos) = varints(&out, cp, 5);
        assert_eq!(fields[1], 1, "record type");
        assert_eq!(fields[4], 0, "first checkpoint delta");
        assert_eq!(out[pos], 0, "flush byte");
        let (pools, pos) = varints(&out, pos + 1, 3);
        assert_eq!(pools, vec![1, 20, 1]);
        let (key, _) = varints(&out, pos, 1);
        assert_eq!(key, vec![1]);
        assert_eq!(fields[0] as usize, pos + 4 - cp, "size covers the kept entry");

        assert_eq!(stats.entries_written, 1);
        assert_eq!(stats.entries_purged, 1);
        assert_eq!(stats.bytes_purged, 4);
        assert_eq!(stats.events_written, 1);
        assert_eq!(stats.checkpoints_written, 1);
        assert_eq!(stats.chunks, 1);

        let out_header = header_of(&out);
        assert_eq!(out_header.chunk_size(), out.len() as u64);
        assert_eq!(out_header.constant_pool_position(), HEADER_SIZE);
    }

    #[test]
    fn rejected_event_leaves_empty_checkpoint() {
        let layout = scenario();
        let header = header_of(&layout.bytes);
        let mut writer = writer_over(layout.bytes.clone(), false);
        writer.begin_chunk(&header).unwrap();
        register(&mut writer, &layout);
        writer.end_chunk(&header).unwrap();
        let out = writer.finish().unwrap().into_inner();

        let (fields, pos) = varints(&out, HEADER_SIZE as usize, 5);
        assert_eq!(fields[1], 1);
        let (count, end) = varints(&out, pos + 1, 1);
        assert_eq!(count, vec![0]);
        assert_eq!(fields[0] as usize, end - HEADER_SIZE as usize);
        // Metadata folgt direkt auf den Checkpoint
        assert_eq!(header_of(&out).metadata_position(), end as u64);
    }

    #[test]
    fn write_event_rejects_reversed_range() {
        let layout = scenario();
        let header = header_of(&layout.bytes);
        let mut writer = writer_over(layout.bytes, true);
        writer.begin_chunk(&header).unwrap();
        assert_eq!(writer.write_event(90, 80).unwrap_err(), Error::MalformedRange { start: 90, end: 80 });
    }

    #[test]
    fn state_guard() {
        let layout = scenario();
        let header = header_of(&layout.bytes);
        let mut writer = writer_over(layout.bytes, true);
        assert!(matches!(writer.write_event(0, 0), Err(Error::ChunkState(_))));
        assert!(matches!(writer.end_chunk(&header), Err(Error::ChunkState(_))));
        assert!(matches!(writer.new_checkpoint_event(68), Err(Error::ChunkState(_))));
        writer.begin_chunk(&header).unwrap();
        assert!(matches!(writer.begin_chunk(&header), Err(Error::ChunkState(_))));
        assert!(matches!(writer.finish(), Err(Error::ChunkState(_))));
    }

    #[test]
    fn checkpoints_flush_before_later_events_only() {
        let layout = scenario();
        let header = header_of(&layout.bytes);
        let mut writer = writer_over(layout.bytes.clone(), true);
        writer.begin_chunk(&header).unwrap();
        register(&mut writer, &layout);
        // leerer Span genau an der Checkpoint-Position zieht ihn nicht vor
        writer.write_event(layout.checkpoint, layout.checkpoint).unwrap();
        assert_eq!(writer.pending_checkpoints(), 1);
        writer.write_event(layout.event.0, layout.event.1).unwrap();
        assert_eq!(writer.pending_checkpoints(), 0);
    }

    #[test]
    fn registry_is_fresh_per_chunk() {
        let layout = scenario();
        let header = header_of(&layout.bytes);
        let mut writer = writer_over(layout.bytes.clone(), true);
        writer.begin_chunk(&header).unwrap();
        register(&mut writer, &layout);
        writer.touch(&Value::Ref(Reference::new(20, 1)));
        writer.write_event(layout.event.0, layout.event.1).unwrap();
        writer.end_chunk(&header).unwrap();
        assert!(writer.registry().is_empty());
        assert!(writer.get_pool(20).is_empty());
    }

    #[test]
    fn missing_pool_counts_as_unresolved() {
        let layout = scenario();
        let header = header_of(&layout.bytes);
        let mut writer = writer_over(layout.bytes, true);
        writer.begin_chunk(&header).unwrap();
        let outcome = writer.touch(&Value::Ref(Reference::new(77, 1)));
        assert_eq!(outcome.unresolved, 1);
        assert_eq!(writer.stats().unresolved_references, 1);
    }

    #[test]
    fn dropping_open_chunk_deletes_created_output() {
        let dir = std::env::temp_dir().join(format!("tracefilter-writer-drop-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let source = dir.join("in.rec");
        let dest = dir.join("out.rec");
        let layout = scenario();
        fs::write(&source, &layout.bytes).unwrap();
        let header = header_of(&layout.bytes);

        let mut writer = ChunkWriter::create(&source, &dest, Box::new(|_| true)).unwrap();
        writer.begin_chunk(&header).unwrap();
        assert!(dest.exists());
        drop(writer);
        assert!(!dest.exists());

        let mut writer = ChunkWriter::create(&source, &dest, Box::new(|_| true)).unwrap();
        writer.begin_chunk(&header).unwrap();
        assert!(matches!(writer.close(), Err(Error::ChunkState(_))));
        assert!(!dest.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_event_copy_leaves_no_output() {
        let dir = std::env::temp_dir().join(format!("tracefilter-writer-eof-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let source = dir.join("in.rec");
        let dest = dir.join("out.rec");
        let layout = scenario();
        fs::write(&source, &layout.bytes).unwrap();
        let header = header_of(&layout.bytes);
        let len = layout.bytes.len() as u64;

        let mut writer = ChunkWriter::create(&source, &dest, Box::new(|_| true)).unwrap();
        writer.begin_chunk(&header).unwrap();
        writer.write_event(layout.event.0, layout.event.1).unwrap();
        // Spanne reicht über das Dateiende: Lesefehler mitten im Kopieren
        let err = writer.write_event(len - 2, len + 50).unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::UnexpectedEof));
        assert!(matches!(writer.close(), Err(Error::ChunkState(_))));
        assert!(!dest.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
