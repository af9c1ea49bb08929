//! Checkpoint events and the per-chunk checkpoint queue.
//!
//! A checkpoint record snapshots a set of constant pools. While a chunk is
//! scanned every checkpoint becomes a [`CheckpointEvent`] that lists, per
//! pool, the registry ids of the entries it defines. The queue hands them
//! back in input order so the writer can emit each one right before the
//! first event that follows it.

use std::collections::BTreeMap;

use crate::pool::{EntryId, PoolRegistry};
use crate::{Error, Result};

/// Fixed fields of a checkpoint record as read from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointRecord {
    /// Absolute Eingabeposition des Size-Felds.
    pub position: u64,
    /// Deklarierte Record-Größe.
    pub size: u64,
    pub start_time: i64,
    pub duration: i64,
    /// Abstand zum vorigen Checkpoint (negativ), 0 beim ersten.
    pub delta: i64,
    pub flush: bool,
    /// Anzahl der deklarierten Pools.
    pub pool_count: u32,
}

impl CheckpointRecord {
    /// Absolute Eingabeposition direkt hinter dem Record.
    pub fn end_position(&self) -> u64 {
        self.position + self.size
    }
}

/// Entries one checkpoint defines for a single constant type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPool {
    type_id: u64,
    entries: Vec<EntryId>,
}

impl CheckpointPool {
    fn new(type_id: u64) -> Self {
        Self {
            type_id,
            entries: Vec::new(),
        }
    }

    pub fn type_id(&self) -> u64 {
        self.type_id
    }

    /// Eintrags-IDs in Eingabereihenfolge.
    pub fn entries(&self) -> &[EntryId] {
        &self.entries
    }

    /// Anzahl der aktuell markierten Einträge in `registry`.
    pub fn touched_count(&self, registry: &PoolRegistry) -> usize {
        self.entries.iter().filter(|&&id| registry.entry(id).is_touched()).count()
    }

    /// `true`, wenn mindestens ein Eintrag den Sweep überlebt.
    pub fn is_touched(&self, registry: &PoolRegistry) -> bool {
        self.entries.iter().any(|&id| registry.entry(id).is_touched())
    }
}

/// One checkpoint record of the input chunk, pending rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEvent {
    start_position: u64,
    pools: Vec<CheckpointPool>,
}

impl CheckpointEvent {
    pub fn new(start_position: u64) -> Self {
        Self {
            start_position,
            pools: Vec::new(),
        }
    }

    /// Absolute Eingabeposition des Checkpoint-Records.
    pub fn start_position(&self) -> u64 {
        self.start_position
    }

    /// Pools in der Reihenfolge des Eingabe-Records.
    pub fn pools(&self) -> &[CheckpointPool] {
        &self.pools
    }

    /// Öffnet einen neuen Pool-Abschnitt; folgende Einträge gehören dazu.
    pub fn add_pool(&mut self, type_id: u64) {
        self.pools.push(CheckpointPool::new(type_id));
    }

    /// Hängt `id` an den zuletzt geöffneten Pool an.
    pub fn add_entry(&mut self, id: EntryId) -> Result<()> {
        let pool = self.pools.last_mut().ok_or(Error::NoOpenPool {
            checkpoint: self.start_position,
        })?;
        pool.entries.push(id);
        Ok(())
    }

    /// Typ-ID des zuletzt geöffneten Pools.
    pub fn current_type(&self) -> Option<u64> {
        self.pools.last().map(CheckpointPool::type_id)
    }

    /// Pools mit mindestens einem markierten Eintrag.
    pub fn touched_pools<'a>(&'a self, registry: &'a PoolRegistry) -> impl Iterator<Item = &'a CheckpointPool> + 'a {
        self.pools.iter().filter(move |p| p.is_touched(registry))
    }
}

/// Handle of a queued checkpoint: its input position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckpointHandle(u64);

impl CheckpointHandle {
    pub fn position(self) -> u64 {
        self.0
    }
}

/// Checkpoints of the current chunk ordered by input position.
#[derive(Debug, Default)]
pub struct CheckpointQueue {
    pending: BTreeMap<u64, CheckpointEvent>,
}

impl CheckpointQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reiht `event` ein. Zwei Checkpoints können sich keine Eingabeposition teilen.
    pub fn push(&mut self, event: CheckpointEvent) -> Result<CheckpointHandle> {
        let position = event.start_position;
        if self.pending.contains_key(&position) {
            return Err(Error::chunk_state(format!("checkpoint at {position} queued twice")));
        }
        self.pending.insert(position, event);
        Ok(CheckpointHandle(position))
    }

    /// Eingereihter Checkpoint hinter `handle`.
    pub fn get_mut(&mut self, handle: CheckpointHandle) -> Result<&mut CheckpointEvent> {
        self.pending.get_mut(&handle.0).ok_or(Error::UnknownCheckpoint(handle.0))
    }

    /// Entnimmt den frühesten Checkpoint, der echt vor `before` beginnt.
    pub fn pop_before(&mut self, before: u64) -> Option<CheckpointEvent> {
        let (&first, _) = self.pending.first_key_value()?;
        if first < before {
            self.pending.pop_first().map(|(_, event)| event)
        } else {
            None
        }
    }

    /// Entnimmt den frühesten Checkpoint unabhängig von der Position.
    pub fn pop_first(&mut self) -> Option<CheckpointEvent> {
        self.pending.pop_first().map(|(_, event)| event)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
