//! Type catalog decoded from a chunk's metadata record.
//!
//! The catalog tells the parser how wide each event payload and each
//! constant-pool value is, and where the references sit. The metadata
//! record itself is copied to the output byte-for-byte; this module only
//! reads it.
//!
//! Record layout:
//! `[size][0][startTime][duration][metadataId][typeCount]{type}` with
//! `type = [id][name][fieldCount]{[name][kind:u8][array:u8][target id if kind = 10]}`.

use std::io::{Read, Seek};

use crate::builder::frame_record;
use crate::channel::PositionalInput;
use crate::value::{Reference, Value};
use crate::varint;
use crate::{Error, FastIndexMap, Result};

/// Record type id of the metadata record.
pub const METADATA_TYPE_ID: u64 = 0;

/// Record type id of checkpoint (constant pool) records.
pub const CHECKPOINT_TYPE_ID: u64 = 1;

/// Name of the type whose pool holds interned strings (string encoding 2).
pub const STRING_TYPE_NAME: &str = "java.lang.String";

// String-Encodings (erstes Byte jedes Strings)
/// Obergrenze für vorab reservierte Array-Elemente.
const MAX_ARRAY_PREALLOC: usize = 1024;

const STRING_NULL: u8 = 0;
const STRING_EMPTY: u8 = 1;
const STRING_POOL: u8 = 2;
const STRING_UTF8: u8 = 3;
const STRING_CHAR_ARRAY: u8 = 4;
const STRING_LATIN1: u8 = 5;

/// Wire kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    String,
    /// Constant-pool reference into the pool of the given type id.
    Reference(u64),
}

impl FieldKind {
    /// Wire code of this kind.
    pub fn code(self) -> u8 {
        match self {
            Self::Boolean => 1,
            Self::Byte => 2,
            Self::Short => 3,
            Self::Char => 4,
            Self::Int => 5,
            Self::Long => 6,
            Self::Float => 7,
            Self::Double => 8,
            Self::String => 9,
            Self::Reference(_) => 10,
        }
    }

    fn from_code(code: u8, target: impl FnOnce() -> Result<u64>, position: u64) -> Result<Self> {
        Ok(match code {
            1 => Self::Boolean,
            2 => Self::Byte,
            3 => Self::Short,
            4 => Self::Char,
            5 => Self::Int,
            6 => Self::Long,
            7 => Self::Float,
            8 => Self::Double,
            9 => Self::String,
            10 => Self::Reference(target()?),
            other => return Err(Error::corrupt(position, format!("unknown field kind {other}"))),
        })
    }
}

/// One field of a described type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Field holds a counted array of `kind`.
    pub array: bool,
}

/// A type described by the metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    id: u64,
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    /// Creates a type without fields.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a scalar field.
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor { name: name.into(), kind, array: false });
        self
    }

    /// Appends an array field.
    pub fn with_array_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor { name: name.into(), kind, array: true });
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Index of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// All types known in one chunk, in metadata order.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: FastIndexMap<u64, TypeDescriptor>,
    string_pool: Option<u64>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a type.
    pub fn add(&mut self, descriptor: TypeDescriptor) {
        if descriptor.name == STRING_TYPE_NAME {
            self.string_pool = Some(descriptor.id);
        }
        self.types.insert(descriptor.id, descriptor);
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, descriptor: TypeDescriptor) -> Self {
        self.add(descriptor);
        self
    }

    pub fn get(&self, type_id: u64) -> Option<&TypeDescriptor> {
        self.types.get(&type_id)
    }

    /// Name of `type_id`, if described.
    pub fn name_of(&self, type_id: u64) -> Option<&str> {
        self.get(type_id).map(TypeDescriptor::name)
    }

    /// Looks a type up by name (linear; catalogs are small).
    pub fn by_name(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.values().find(|t| t.name == name)
    }

    /// Type id of the interned-string pool, if the catalog has one.
    pub fn string_pool(&self) -> Option<u64> {
        self.string_pool
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Reads the metadata record at absolute `position`.
    ///
    /// `chunk_end` bounds the record; anything reaching past it is corrupt.
    pub fn read<R: Read + Seek>(input: &mut PositionalInput<R>, position: u64, chunk_end: u64) -> Result<Self> {
        input.seek(position)?;
        let size = input.read_u64()?;
        let record_end = position
            .checked_add(size)
            .filter(|&end| size > 0 && end <= chunk_end)
            .ok_or_else(|| Error::corrupt(position, format!("metadata size {size} does not fit chunk")))?;
        let type_id = input.read_u64()?;
        if type_id != METADATA_TYPE_ID {
            return Err(Error::UnexpectedRecordType {
                position,
                expected: METADATA_TYPE_ID,
                found: type_id,
            });
        }
        let _start_time = input.read_i64()?;
        let _duration = input.read_i64()?;
        let _metadata_id = input.read_i64()?;

        let type_count = input.read_u32()?;
        let mut catalog = Self::new();
        for _ in 0..type_count {
            let id = input.read_u64()?;
            let name = read_name(input)?;
            let field_count = input.read_u32()?;
            let mut descriptor = TypeDescriptor::new(id, name);
            for _ in 0..field_count {
                let field_name = read_name(input)?;
                let at = input.position();
                let code = input.read_byte()?;
                let array = input.read_byte()? != 0;
                let kind = FieldKind::from_code(code, || input.read_u64(), at)?;
                descriptor.fields.push(FieldDescriptor { name: field_name, kind, array });
            }
            if input.position() > record_end {
                return Err(Error::corrupt(position, "metadata types overrun record size"));
            }
            catalog.add(descriptor);
        }
        if input.position() > record_end {
            return Err(Error::corrupt(position, "metadata overruns record size"));
        }
        Ok(catalog)
    }

    /// Decodes the fields of one `type_id` value at the input's position.
    ///
    /// Returns `None` (and reads nothing) when the type is not described.
    pub fn read_fields<R: Read + Seek>(&self, type_id: u64, input: &mut PositionalInput<R>) -> Result<Option<Vec<Value>>> {
        let Some(descriptor) = self.types.get(&type_id) else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(descriptor.fields.len());
        for field in &descriptor.fields {
            values.push(self.read_field(field, input)?);
        }
        Ok(Some(values))
    }

    fn read_field<R: Read + Seek>(&self, field: &FieldDescriptor, input: &mut PositionalInput<R>) -> Result<Value> {
        if !field.array {
            return self.read_scalar(field.kind, input);
        }
        let at = input.position();
        let count = input.read_u32()?;
        // Jedes Element belegt mindestens ein Byte
        if u64::from(count) > input.remaining() {
            return Err(Error::corrupt(at, format!("array of {count} elements exceeds input")));
        }
        // Vorab nur begrenzt reservieren: `count` stammt aus der Eingabe
        let mut items = Vec::with_capacity((count as usize).min(MAX_ARRAY_PREALLOC));
        for _ in 0..count {
            items.push(self.read_scalar(field.kind, input)?);
        }
        Ok(Value::Array(items))
    }

    fn read_scalar<R: Read + Seek>(&self, kind: FieldKind, input: &mut PositionalInput<R>) -> Result<Value> {
        Ok(match kind {
            FieldKind::Boolean => Value::Boolean(input.read_byte()? != 0),
            FieldKind::Byte => Value::Long(i64::from(input.read_byte()? as i8)),
            FieldKind::Short | FieldKind::Char | FieldKind::Int | FieldKind::Long => Value::Long(input.read_i64()?),
            FieldKind::Float => {
                let mut buf = [0u8; 4];
                input.read_bytes(&mut buf)?;
                Value::Double(f64::from(f32::from_be_bytes(buf)))
            }
            FieldKind::Double => {
                let mut buf = [0u8; 8];
                input.read_bytes(&mut buf)?;
                Value::Double(f64::from_be_bytes(buf))
            }
            FieldKind::String => read_string(input, self.string_pool)?,
            FieldKind::Reference(type_id) => Value::Ref(Reference::new(type_id, input.read_i64()?)),
        })
    }

    /// Encodes the catalog as a complete metadata record.
    pub fn encode_record(&self, start_time: i64, duration: i64) -> Vec<u8> {
        let mut payload = Vec::new();
        varint::push(&mut payload, METADATA_TYPE_ID);
        varint::push(&mut payload, start_time as u64);
        varint::push(&mut payload, duration as u64);
        varint::push(&mut payload, 0); // metadata id
        varint::push(&mut payload, self.types.len() as u64);
        for descriptor in self.types.values() {
            varint::push(&mut payload, descriptor.id);
            push_string(&mut payload, &descriptor.name);
            varint::push(&mut payload, descriptor.fields.len() as u64);
            for field in &descriptor.fields {
                push_string(&mut payload, &field.name);
                payload.push(field.kind.code());
                payload.push(u8::from(field.array));
                if let FieldKind::Reference(target) = field.kind {
                    varint::push(&mut payload, target);
                }
            }
        }
        frame_record(&payload)
    }
}

/// Reads a string in any of the wire encodings.
fn read_string<R: Read + Seek>(input: &mut PositionalInput<R>, string_pool: Option<u64>) -> Result<Value> {
    let at = input.position();
    match input.read_byte()? {
        STRING_NULL => Ok(Value::Null),
        STRING_EMPTY => Ok(Value::Text(String::new())),
        STRING_POOL => {
            let key = input.read_i64()?;
            let type_id = string_pool
                .ok_or_else(|| Error::corrupt(at, format!("string pool reference without {STRING_TYPE_NAME} type")))?;
            Ok(Value::Ref(Reference::new(type_id, key)))
        }
        STRING_UTF8 => {
            let bytes = read_counted_bytes(input, at)?;
            String::from_utf8(bytes)
                .map(Value::Text)
                .map_err(|e| Error::corrupt(at, format!("invalid UTF-8 string: {e}")))
        }
        STRING_CHAR_ARRAY => {
            let len = read_length(input, at)?;
            let mut units = Vec::with_capacity(len);
            for _ in 0..len {
                let unit = input.read_u64()?;
                units.push(u16::try_from(unit).map_err(|_| Error::corrupt(at, format!("char {unit} out of range")))?);
            }
            Ok(Value::Text(String::from_utf16_lossy(&units)))
        }
        STRING_LATIN1 => {
            let bytes = read_counted_bytes(input, at)?;
            Ok(Value::Text(bytes.iter().map(|&b| char::from(b)).collect()))
        }
        other => Err(Error::corrupt(at, format!("unknown string encoding {other}"))),
    }
}

fn read_length<R: Read + Seek>(input: &mut PositionalInput<R>, at: u64) -> Result<usize> {
    let len = input.read_u32()?;
    if u64::from(len) > input.remaining() {
        return Err(Error::corrupt(at, format!("string length {len} exceeds input")));
    }
    Ok(len as usize)
}

fn read_counted_bytes<R: Read + Seek>(input: &mut PositionalInput<R>, at: u64) -> Result<Vec<u8>> {
    let len = read_length(input, at)?;
    let mut bytes = vec![0u8; len];
    input.read_bytes(&mut bytes)?;
    Ok(bytes)
}

/// Reads a metadata name (type or field); must be a plain string.
fn read_name<R: Read + Seek>(input: &mut PositionalInput<R>) -> Result<String> {
    let at = input.position();
    match read_string(input, None)? {
        Value::Text(name) => Ok(name),
        Value::Null => Ok(String::new()),
        _ => Err(Error::corrupt(at, "metadata name is not a string")),
    }
}

/// Appends `s` in UTF-8 string encoding (empty strings use the short form).
pub fn push_string(out: &mut Vec<u8>, s: &str) {
    if s.is_empty() {
        out.push(STRING_EMPTY);
        return;
    }
    out.push(STRING_UTF8);
    varint::push(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

/// Appends the null string.
pub fn push_null_string(out: &mut Vec<u8>) {
    out.push(STRING_NULL);
}

/// Appends a reference into the interned-string pool.
pub fn push_pooled_string(out: &mut Vec<u8>, key: i64) {
    out.push(STRING_POOL);
    varint::push(out, key as u64);
}
