//! Synthesises well-formed recordings.
//!
//! Used by tests, fuzz targets and anyone who needs a small recording with
//! a known layout. Checkpoints get padded size fields and correct deltas,
//! metadata goes last, the header is filled in by [`ChunkBuilder::finish`].
//!
//! # Beispiel
//!
//! ```
//! use tracefilter::builder::{ChunkBuilder, RecordingBuilder};
//! use tracefilter::metadata::{FieldKind, TypeCatalog, TypeDescriptor};
//! use tracefilter::value::{Reference, Value};
//!
//! let catalog = TypeCatalog::new()
//!     .with(TypeDescriptor::new(20, "demo.Thread").with_field("name", FieldKind::String))
//!     .with(TypeDescriptor::new(100, "demo.Tick").with_field("thread", FieldKind::Reference(20)));
//!
//! let mut chunk = ChunkBuilder::new(catalog);
//! chunk.checkpoint(&[(20, vec![(1, vec![Value::Text("main".into())])])])?;
//! chunk.event(100, &[Value::Ref(Reference::new(20, 1))])?;
//! let bytes = RecordingBuilder::new().chunk(chunk).build();
//! assert_eq!(&bytes[..4], b"FLR\0");
//! # Ok::<(), tracefilter::Error>(())
//! ```

use std::path::Path;

use crate::header::{ChunkHeader, HEADER_SIZE};
use crate::metadata::{self, FieldDescriptor, FieldKind, TypeCatalog, CHECKPOINT_TYPE_ID};
use crate::value::Value;
use crate::varint;
use crate::{Error, Result};

/// Prefixes `payload` with its compressed record size (the size counts itself).
pub fn frame_record(payload: &[u8]) -> Vec<u8> {
    let body = payload.len() as u64;
    // Größe zählt sich selbst mit: kleinste Breite suchen, die passt
    let mut width = 1u64;
    while varint::encoded_len(body + width) as u64 != width {
        width += 1;
    }
    let mut out = Vec::with_capacity((body + width) as usize);
    varint::push(&mut out, body + width);
    out.extend_from_slice(payload);
    out
}

/// Entries of one pool inside a checkpoint: `(type id, [(key, fields)])`.
pub type PoolSpec = (u64, Vec<(i64, Vec<Value>)>);

/// Builds one chunk.
#[derive(Debug, Clone)]
pub struct ChunkBuilder {
    catalog: TypeCatalog,
    body: Vec<u8>,
    /// Chunk-relative position of the last checkpoint.
    last_checkpoint: Option<u64>,
    start_nanos: i64,
    duration_nanos: i64,
}

impl ChunkBuilder {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            catalog,
            body: Vec::new(),
            last_checkpoint: None,
            start_nanos: 0,
            duration_nanos: 0,
        }
    }

    /// Sets the header's start time and duration.
    pub fn with_time(mut self, start_nanos: i64, duration_nanos: i64) -> Self {
        self.start_nanos = start_nanos;
        self.duration_nanos = duration_nanos;
        self
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Chunk-relative position the next record will start at.
    pub fn position(&self) -> u64 {
        HEADER_SIZE + self.body.len() as u64
    }

    /// Appends an event of a described type, fields in metadata order.
    pub fn event(&mut self, type_id: u64, fields: &[Value]) -> Result<&mut Self> {
        let mut payload = Vec::new();
        varint::push(&mut payload, type_id);
        self.encode_fields(type_id, fields, &mut payload)?;
        self.body.extend(frame_record(&payload));
        Ok(self)
    }

    /// Appends an event with an opaque payload (no metadata needed).
    pub fn raw_event(&mut self, type_id: u64, payload: &[u8]) -> &mut Self {
        let mut record = Vec::with_capacity(payload.len() + varint::MAX_LEN);
        varint::push(&mut record, type_id);
        record.extend_from_slice(payload);
        self.body.extend(frame_record(&record));
        self
    }

    /// Appends a checkpoint with the given pools; start time and duration 0.
    pub fn checkpoint(&mut self, pools: &[PoolSpec]) -> Result<&mut Self> {
        self.checkpoint_at(0, 0, pools)
    }

    /// Appends a checkpoint with explicit start time and duration.
    pub fn checkpoint_at(&mut self, start_time: i64, duration: i64, pools: &[PoolSpec]) -> Result<&mut Self> {
        let position = self.position();
        let delta = self.last_checkpoint.map_or(0, |prev| prev as i64 - position as i64);

        let mut payload = Vec::new();
        varint::push(&mut payload, CHECKPOINT_TYPE_ID);
        varint::push(&mut payload, start_time as u64);
        varint::push(&mut payload, duration as u64);
        varint::push(&mut payload, delta as u64);
        payload.push(0); // flush
        varint::push(&mut payload, pools.len() as u64);
        for (type_id, entries) in pools {
            varint::push(&mut payload, *type_id);
            varint::push(&mut payload, entries.len() as u64);
            for (key, fields) in entries {
                varint::push(&mut payload, *key as u64);
                self.encode_fields(*type_id, fields, &mut payload)?;
            }
        }
        let size = varint::PADDED_LEN as u64 + payload.len() as u64;
        self.body.extend_from_slice(&varint::encode_padded(size)?);
        self.body.extend(payload);
        self.last_checkpoint = Some(position);
        Ok(self)
    }

    /// Finishes the chunk: header, body, then the metadata record.
    pub fn finish(self) -> Vec<u8> {
        let metadata_position = self.position();
        let metadata = self.catalog.encode_record(self.start_nanos, self.duration_nanos);
        let chunk_size = metadata_position + metadata.len() as u64;
        let header = ChunkHeader::new(0)
            .with_layout(chunk_size, self.last_checkpoint.unwrap_or(0), metadata_position)
            .with_time(self.start_nanos, self.duration_nanos);

        let mut out = Vec::with_capacity(chunk_size as usize);
        out.extend_from_slice(&header.encode());
        out.extend(self.body);
        out.extend(metadata);
        out
    }

    fn encode_fields(&self, type_id: u64, values: &[Value], out: &mut Vec<u8>) -> Result<()> {
        let descriptor = self.catalog.get(type_id).ok_or(Error::UnknownPoolType(type_id))?;
        if descriptor.fields().len() != values.len() {
            return Err(Error::FieldMismatch {
                type_id,
                field: format!("{} values for {} fields", values.len(), descriptor.fields().len()),
            });
        }
        for (field, value) in descriptor.fields().iter().zip(values) {
            encode_field(type_id, field, value, out)?;
        }
        Ok(())
    }
}

fn encode_field(type_id: u64, field: &FieldDescriptor, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    if !field.array {
        return encode_scalar(type_id, field, value, out);
    }
    let Value::Array(items) = value else {
        return Err(mismatch(type_id, field));
    };
    varint::push(out, items.len() as u64);
    for item in items {
        encode_scalar(type_id, field, item, out)?;
    }
    Ok(())
}

fn encode_scalar(type_id: u64, field: &FieldDescriptor, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match (field.kind, value) {
        (FieldKind::Boolean, Value::Boolean(b)) => out.push(u8::from(*b)),
        (FieldKind::Byte, Value::Long(v)) => out.push(*v as i8 as u8),
        (FieldKind::Short | FieldKind::Char | FieldKind::Int | FieldKind::Long, Value::Long(v)) => {
            varint::push(out, *v as u64)
        }
        (FieldKind::Float, Value::Double(v)) => out.extend_from_slice(&(*v as f32).to_be_bytes()),
        (FieldKind::Double, Value::Double(v)) => out.extend_from_slice(&v.to_be_bytes()),
        (FieldKind::String, Value::Text(s)) => metadata::push_string(out, s),
        (FieldKind::String, Value::Null) => metadata::push_null_string(out),
        (FieldKind::String, Value::Ref(r)) => metadata::push_pooled_string(out, r.key),
        (FieldKind::Reference(target), Value::Ref(r)) if r.type_id == target => varint::push(out, r.key as u64),
        _ => return Err(mismatch(type_id, field)),
    }
    Ok(())
}

fn mismatch(type_id: u64, field: &FieldDescriptor) -> Error {
    Error::FieldMismatch {
        type_id,
        field: field.name.clone(),
    }
}

/// Concatenates chunks into one recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingBuilder {
    bytes: Vec<u8>,
    chunks: usize,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a finished chunk.
    pub fn chunk(mut self, chunk: ChunkBuilder) -> Self {
        self.bytes.extend(chunk.finish());
        self.chunks += 1;
        self
    }

    /// Number of chunks appended so far.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    /// Writes the recording to `path`.
    pub fn write_to(self, path: &Path) -> Result<()> {
        std::fs::write(path, self.bytes)?;
        Ok(())
    }
}
