//! Mark phase: touching every entry reachable from a retained value.
//!
//! Der `touched`-Flag ist gleichzeitig die Besucht-Markierung. Ein schon
//! markierter Eintrag wird nicht erneut expandiert, daher terminiert der
//! Lauf auch bei Zyklen im Referenzgraphen. Die Traversierung nutzt einen
//! expliziten Stack statt Rekursion, tiefe Ketten sprengen also nicht den
//! Call-Stack.

use log::{debug, trace};

use super::PoolRegistry;
use crate::value::{Reference, Value};

/// What a single touch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TouchOutcome {
    /// Entries that went from untouched to touched.
    pub newly_touched: usize,
    /// References whose type has no pool in this chunk.
    pub unresolved: usize,
}

impl TouchOutcome {
    fn merge(&mut self, other: TouchOutcome) {
        self.newly_touched += other.newly_touched;
        self.unresolved += other.unresolved;
    }
}

impl PoolRegistry {
    /// Marks everything reachable from `value`.
    ///
    /// Scalars are ignored, references are resolved and their closure is
    /// marked, arrays are walked element by element. Calling this again with
    /// the same value changes nothing.
    pub fn touch(&mut self, value: &Value) -> TouchOutcome {
        let mut work = Vec::new();
        value.for_each_reference(&mut |r| work.push(r));
        self.mark(work)
    }

    /// [`touch`](Self::touch) over every value of a field list.
    pub fn touch_all(&mut self, values: &[Value]) -> TouchOutcome {
        let mut outcome = TouchOutcome::default();
        for value in values {
            outcome.merge(self.touch(value));
        }
        outcome
    }

    /// Marks the closure of a single reference.
    pub fn touch_reference(&mut self, reference: Reference) -> TouchOutcome {
        self.mark(vec![reference])
    }

    fn mark(&mut self, mut work: Vec<Reference>) -> TouchOutcome {
        let mut outcome = TouchOutcome::default();
        while let Some(reference) = work.pop() {
            let Some(pool) = self.pools.get(&reference.type_id) else {
                // Fehlende Pools sind erlaubt: Kante wird verworfen
                debug!("can't resolve {reference}: no constant pool for type {}", reference.type_id);
                outcome.unresolved += 1;
                continue;
            };
            let definitions = pool.definitions(reference.key);
            if definitions.is_empty() {
                trace!("{}[{}] not defined in chunk", pool.label(), reference.key);
                continue;
            }
            for &id in definitions {
                let entry = &mut self.entries[id.index()];
                if entry.touched {
                    continue;
                }
                entry.touched = true;
                outcome.newly_touched += 1;
                for edge in &entry.references {
                    edge.for_each_reference(&mut |r| work.push(r));
                }
            }
        }
        outcome
    }
}
