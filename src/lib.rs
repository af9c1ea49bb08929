//! tracefilter – chunk filter for chunked binary event recordings
//!
//! A recording is a sequence of self-contained chunks. Each chunk carries
//! events, checkpoint records with constant pools and a metadata record
//! describing the types. Filtering keeps the events a predicate accepts
//! plus exactly the pool entries those events reach, directly or through
//! other entries, and rewrites sizes, offsets and checkpoint deltas so the
//! output is a valid recording again.
//!
//! # Beispiel
//!
//! ```
//! use std::io::Cursor;
//! use tracefilter::builder::{ChunkBuilder, RecordingBuilder};
//! use tracefilter::channel::{PositionalInput, PositionalOutput};
//! use tracefilter::metadata::{FieldKind, TypeCatalog, TypeDescriptor};
//! use tracefilter::value::{Reference, Value};
//! use tracefilter::{filter_chunks, ChunkParser, ChunkWriter};
//!
//! let catalog = TypeCatalog::new()
//!     .with(TypeDescriptor::new(20, "demo.Thread").with_field("name", FieldKind::String))
//!     .with(TypeDescriptor::new(100, "demo.Tick").with_field("thread", FieldKind::Reference(20)));
//! let mut chunk = ChunkBuilder::new(catalog);
//! chunk.checkpoint(&[(20, vec![
//!     (1, vec![Value::Text("main".into())]),
//!     (2, vec![Value::Text("idle".into())]),
//! ])]).unwrap();
//! chunk.event(100, &[Value::Ref(Reference::new(20, 1))]).unwrap();
//! let bytes = RecordingBuilder::new().chunk(chunk).build();
//!
//! let mut parser = ChunkParser::from_reader(Cursor::new(bytes.clone())).unwrap();
//! let input = PositionalInput::new(Cursor::new(bytes)).unwrap();
//! let output = PositionalOutput::new(Cursor::new(Vec::new()));
//! let mut writer = ChunkWriter::new(input, output, Box::new(|_| true));
//!
//! let stats = filter_chunks(&mut parser, &mut writer).unwrap();
//! assert_eq!(stats.events_written, 1);
//! assert_eq!(stats.entries_written, 1); // "idle" wird verworfen
//! assert_eq!(stats.entries_purged, 1);
//! ```

pub mod builder;
pub mod channel;
pub mod checkpoint;
pub mod error;
pub mod event;
pub mod filter;
pub mod header;
pub mod metadata;
pub mod options;
pub mod parser;
pub mod pool;
pub mod summary;
pub mod value;
pub mod varint;
pub mod writer;

pub use error::{Error, Result};

/// HashMap mit ahash (schnell, nicht DoS-resistent; nur interne Tabellen).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Filter
pub use filter::{filter_chunks, filter_recording};
pub use options::EventSelector;
pub use writer::{ChunkWriter, FilterStats};

// Public API: Lesen
pub use event::{EventPredicate, RecordedEvent};
pub use header::ChunkHeader;
pub use parser::{ChunkParser, PoolSink};
pub use summary::{summarize, RecordingSummary};

// Public API: Pools
pub use pool::{EntryId, PoolEntry, PoolRegistry, TouchOutcome};
pub use value::{Reference, Value};
