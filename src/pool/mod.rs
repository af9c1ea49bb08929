//! Constant pool registry (per chunk).
//!
//! One [`ConstantPool`] per constant type, each mapping integer keys to
//! [`PoolEntry`] definitions. Entries live in a single arena owned by the
//! [`PoolRegistry`] and are addressed by [`EntryId`]; checkpoint pools keep
//! the same ids, so a touch through the registry is visible when the
//! checkpoint is rewritten.
//!
//! Lifecycle: one registry per chunk. The chunk writer replaces it wholesale
//! at chunk boundaries, so touched flags never leak into the next chunk.

mod mark;

pub use mark::TouchOutcome;

use log::debug;

use crate::value::{self, Value};
use crate::{FastHashMap, FastIndexMap};

/// Index eines Eintrags in der Registry-Arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One constant value: its byte span in the input plus mark state.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    key: i64,
    /// Input span `[start, end)` covering key and value.
    start: u64,
    end: u64,
    /// Monoton: einmal `true`, bleibt `true` bis zum Chunk-Ende.
    touched: bool,
    /// Nur referenz-tragende Werte (Ref oder Array mit Refs).
    references: Vec<Value>,
}

impl PoolEntry {
    /// Creates an untouched entry. Scalar values in `values` are dropped;
    /// only reference-bearing ones are kept as outgoing edges.
    pub fn new(key: i64, start: u64, end: u64, values: Vec<Value>) -> Self {
        Self {
            key,
            start,
            end,
            touched: false,
            references: value::retain_references(values),
        }
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    /// Eingabeposition des ersten Bytes (der Key).
    pub fn start_position(&self) -> u64 {
        self.start
    }

    /// Eingabeposition direkt hinter dem Wert.
    pub fn end_position(&self) -> u64 {
        self.end
    }

    /// Kodierte Größe in Bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Ausgehende Referenzen dieses Eintrags.
    pub fn references(&self) -> &[Value] {
        &self.references
    }
}

/// All definitions of one constant type within the current chunk.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    type_id: u64,
    name: Option<String>,
    /// Ein Key kann in mehreren Checkpoints definiert sein.
    keys: FastHashMap<i64, Vec<EntryId>>,
    entry_count: usize,
}

impl ConstantPool {
    fn new(type_id: u64) -> Self {
        Self {
            type_id,
            name: None,
            keys: FastHashMap::default(),
            entry_count: 0,
        }
    }

    pub fn type_id(&self) -> u64 {
        self.type_id
    }

    /// Type name, when the producer of the entries knew it.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Setzt den Typnamen, falls noch keiner bekannt ist.
    pub fn set_name(&mut self, name: &str) {
        if self.name.is_none() {
            self.name = Some(name.to_owned());
        }
    }

    /// Number of definitions (a redefined key counts once per definition).
    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Every definition of `key`, in registration order.
    pub fn definitions(&self, key: i64) -> &[EntryId] {
        self.keys.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bezeichnung für Log-Ausgaben.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("type {}", self.type_id),
        }
    }
}

/// Registry of all constant pools of the chunk being processed.
#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    entries: Vec<PoolEntry>,
    pools: FastIndexMap<u64, ConstantPool>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool for `type_id`, created on first use.
    pub fn pool_mut(&mut self, type_id: u64) -> &mut ConstantPool {
        self.pools.entry(type_id).or_insert_with(|| ConstantPool::new(type_id))
    }

    /// Pool for `type_id`, if one was created.
    pub fn pool(&self, type_id: u64) -> Option<&ConstantPool> {
        self.pools.get(&type_id)
    }

    /// All pools in creation order.
    pub fn pools(&self) -> impl Iterator<Item = &ConstantPool> {
        self.pools.values()
    }

    /// Registers `entry` under `type_id` and returns its id.
    pub fn insert(&mut self, type_id: u64, entry: PoolEntry) -> EntryId {
        let id = EntryId(self.entries.len() as u32);
        let key = entry.key;
        self.entries.push(entry);
        let pool = self.pool_mut(type_id);
        let definitions = pool.keys.entry(key).or_default();
        definitions.push(id);
        let count = definitions.len();
        pool.entry_count += 1;
        if count > 1 {
            debug!("{}[{key}] redefined ({count} definitions in chunk)", pool.label());
        }
        id
    }

    /// Entry by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    pub fn entry(&self, id: EntryId) -> &PoolEntry {
        &self.entries[id.index()]
    }

    /// Resolves `key` in the pool of `type_id` to its definitions.
    pub fn lookup(&self, type_id: u64, key: i64) -> impl Iterator<Item = &PoolEntry> {
        self.pools
            .get(&type_id)
            .map(|p| p.definitions(key))
            .unwrap_or(&[])
            .iter()
            .map(move |&id| &self.entries[id.index()])
    }

    /// Gesamtzahl registrierter Einträge.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Anzahl aktuell markierter Einträge.
    pub fn touched_count(&self) -> usize {
        self.entries.iter().filter(|e| e.touched).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Reference;

    #[test]
    fn pools_are_created_lazily() {
        let mut registry = PoolRegistry::new();
        assert!(registry.pool(7).is_none());
        registry.pool_mut(7).set_name("demo.Thread");
        assert_eq!(registry.pool(7).unwrap().name(), Some("demo.Thread"));
        assert!(registry.pool(7).unwrap().is_empty());
    }

    #[test]
    fn insert_and_lookup() {
        let mut registry = PoolRegistry::new();
        let a = registry.insert(5, PoolEntry::new(1, 100, 110, vec![Value::Long(3)]));
        let b = registry.insert(5, PoolEntry::new(2, 110, 125, vec![Value::Ref(Reference::new(6, 9))]));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.entry(a).len(), 10);
        // Skalare fallen weg, nur Referenzen bleiben
        assert!(registry.entry(a).references().is_empty());
        assert_eq!(registry.entry(b).references(), &[Value::Ref(Reference::new(6, 9))]);
        let found: Vec<_> = registry.lookup(5, 2).map(PoolEntry::start_position).collect();
        assert_eq!(found, vec![110]);
        assert_eq!(registry.lookup(5, 99).count(), 0);
        assert_eq!(registry.lookup(8, 1).count(), 0);
    }

    #[test]
    fn redefined_key_keeps_every_definition() {
        let mut registry = PoolRegistry::new();
        registry.insert(5, PoolEntry::new(1, 100, 110, vec![]));
        registry.insert(5, PoolEntry::new(1, 300, 310, vec![]));
        let pool = registry.pool(5).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.definitions(1).len(), 2);
    }

    #[test]
    fn pool_label_falls_back_to_type_id() {
        let mut registry = PoolRegistry::new();
        assert_eq!(registry.pool_mut(33).label(), "type 33");
        registry.pool_mut(33).set_name("demo.Class");
        registry.pool_mut(33).set_name("ignored");
        assert_eq!(registry.pool_mut(33).label(), "demo.Class");
    }
}
