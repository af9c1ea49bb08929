//! Decoded field values and constant-pool references.
//!
//! Der Filter interpretiert Werte nur so weit, dass er Referenzen finden
//! kann. Skalare werden trotzdem dekodiert, damit Prädikate auf
//! Feldinhalte zugreifen können.

use core::fmt;

/// A reference to a constant-pool entry: `(type id, key)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    /// Type id of the constant pool.
    pub type_id: u64,
    /// Key inside that pool.
    pub key: i64,
}

impl Reference {
    pub fn new(type_id: u64, key: i64) -> Self {
        Self { type_id, key }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_id, self.key)
    }
}

/// A decoded field value.
///
/// Container shape is explicit: a single [`Value::Ref`] or a
/// [`Value::Array`] of values, so references can be walked without
/// knowing the field's type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    /// Any integral kind (byte, short, char, int, long).
    Long(i64),
    /// Float or double.
    Double(f64),
    Text(String),
    Ref(Reference),
    Array(Vec<Value>),
}

impl Value {
    /// `true` if this value is a reference or an array holding one.
    pub fn has_references(&self) -> bool {
        match self {
            Self::Ref(_) => true,
            Self::Array(items) => items.iter().any(Value::has_references),
            _ => false,
        }
    }

    /// Calls `f` for every reference contained in this value, depth first.
    pub fn for_each_reference(&self, f: &mut impl FnMut(Reference)) {
        match self {
            Self::Ref(reference) => f(*reference),
            Self::Array(items) => {
                for item in items {
                    item.for_each_reference(f);
                }
            }
            _ => {}
        }
    }

    /// All references in this value, in field order.
    pub fn references(&self) -> Vec<Reference> {
        let mut out = Vec::new();
        self.for_each_reference(&mut |r| out.push(r));
        out
    }

    /// Integral content, if any.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Text content, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Reference content, if any.
    pub fn as_reference(&self) -> Option<Reference> {
        match self {
            Self::Ref(r) => Some(*r),
            _ => None,
        }
    }
}

/// Keeps only the reference-bearing values of a decoded field list.
///
/// Pool entries store just this reduced list as their outgoing edges.
pub fn retain_references(values: Vec<Value>) -> Vec<Value> {
    values.into_iter().filter(Value::has_references).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_have_no_references() {
        assert!(!Value::Long(3).has_references());
        assert!(!Value::Text("x".into()).has_references());
        assert!(!Value::Array(vec![Value::Long(1), Value::Null]).has_references());
    }

    #[test]
    fn nested_arrays_are_walked() {
        let value = Value::Array(vec![
            Value::Ref(Reference::new(5, 1)),
            Value::Long(9),
            Value::Array(vec![Value::Ref(Reference::new(6, 2)), Value::Ref(Reference::new(5, 3))]),
        ]);
        assert!(value.has_references());
        assert_eq!(
            value.references(),
            vec![Reference::new(5, 1), Reference::new(6, 2), Reference::new(5, 3)]
        );
    }

    #[test]
    fn retain_drops_scalars() {
        let kept = retain_references(vec![
            Value::Long(1),
            Value::Ref(Reference::new(2, 7)),
            Value::Text("t".into()),
            Value::Array(vec![]),
        ]);
        assert_eq!(kept, vec![Value::Ref(Reference::new(2, 7))]);
    }

    #[test]
    fn reference_display() {
        assert_eq!(Reference::new(21, -4).to_string(), "21[-4]");
    }
}
