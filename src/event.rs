//! Decoded view of one event record, as handed to the retention predicate.

use crate::metadata::TypeDescriptor;
use crate::value::Value;

/// Caller-supplied retention predicate.
pub type EventPredicate = Box<dyn Fn(&RecordedEvent<'_>) -> bool>;

/// One event record of the input: its span plus the decoded fields.
///
/// `fields` follows the metadata field order. Events whose type the
/// metadata does not describe carry no fields and no descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent<'a> {
    pub type_id: u64,
    pub descriptor: Option<&'a TypeDescriptor>,
    /// Absolute input position of the record's size field.
    pub start_position: u64,
    /// Absolute input position just past the record.
    pub end_position: u64,
    pub fields: Vec<Value>,
}

impl RecordedEvent<'_> {
    /// Type name from the metadata, if described.
    pub fn type_name(&self) -> Option<&str> {
        self.descriptor.map(TypeDescriptor::name)
    }

    /// Value of the field called `name`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        let index = self.descriptor?.field_index(name)?;
        self.fields.get(index)
    }

    /// `startTime` field, when the type has one.
    pub fn start_time(&self) -> Option<i64> {
        self.field("startTime").and_then(Value::as_long)
    }

    /// Record size in bytes.
    pub fn len(&self) -> u64 {
        self.end_position - self.start_position
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
