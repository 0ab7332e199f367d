use std::collections::BTreeMap;
use std::fmt;

use crate::descriptor::Type;

/// Dynamic value of one protobuf field.
///
/// Repeated fields hold a `List`; every other variant is a singular value whose wire
/// encoding is fixed by the [`Type`] stored alongside it in [`FieldEntry`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    /// Enum number.
    Enum(i32),
    String(String),
    Bytes(Vec<u8>),
    Message(DynamicMessage),
    List(Vec<Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(v) | Value::Enum(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            Value::U32(v) => Some(*v as i64),
            Value::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U32(v) => Some(*v as u64),
            Value::U64(v) => Some(*v),
            Value::I32(v) => u64::try_from(*v).ok(),
            Value::I64(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            Value::String(v) => Some(v.as_bytes()),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Zero value of a scalar type; `None` for messages.
    pub fn default_for(ty: Type) -> Option<Value> {
        Some(match ty {
            Type::Double => Value::F64(0.0),
            Type::Float => Value::F32(0.0),
            Type::Int64 | Type::Sint64 | Type::Sfixed64 => Value::I64(0),
            Type::Uint64 | Type::Fixed64 => Value::U64(0),
            Type::Int32 | Type::Sint32 | Type::Sfixed32 => Value::I32(0),
            Type::Uint32 | Type::Fixed32 => Value::U32(0),
            Type::Bool => Value::Bool(false),
            Type::Enum => Value::Enum(0),
            Type::String => Value::String(String::new()),
            Type::Bytes => Value::Bytes(Vec::new()),
            Type::Message | Type::Group => return None,
        })
    }

    /// Short type description, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::I32(_) => "int32",
            Value::I64(_) => "int64",
            Value::U32(_) => "uint32",
            Value::U64(_) => "uint64",
            Value::F32(_) => "float",
            Value::F64(_) => "double",
            Value::Bool(_) => "bool",
            Value::Enum(_) => "enum",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Message(_) => "message",
            Value::List(_) => "list",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Message(a), Value::Message(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) | Value::Enum(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{:?}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Message(m) => write!(f, "{}", m),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// A present field of a [`DynamicMessage`] together with its wire type information.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldEntry {
    pub ty: Type,
    /// Repeated scalars only: encode as one length-delimited run.
    pub packed: bool,
    pub value: Value,
}

/// A message of a type known only at run time.
///
/// Fields are keyed by number, so known fields and extensions share one ordered map and
/// serialize in ascending number order. Bytes that no schema could interpret are kept
/// verbatim in `unknown` and written after the typed fields.
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DynamicMessage {
    type_name: String,
    fields: BTreeMap<u32, FieldEntry>,
    unknown: Vec<u8>,
}

impl DynamicMessage {
    /// Create an empty message of the given type (full name, no leading dot).
    pub fn new(type_name: impl Into<String>) -> Self {
        DynamicMessage {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
            unknown: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.unknown.is_empty()
    }

    pub fn get_by_number(&self, number: u32) -> Option<&Value> {
        self.fields.get(&number).map(|e| &e.value)
    }

    pub fn entry(&self, number: u32) -> Option<&FieldEntry> {
        self.fields.get(&number)
    }

    pub fn has(&self, number: u32) -> bool {
        self.fields.contains_key(&number)
    }

    /// Set a singular field, replacing any previous value.
    pub fn set(&mut self, number: u32, ty: Type, value: Value) {
        self.fields.insert(
            number,
            FieldEntry {
                ty,
                packed: false,
                value,
            },
        );
    }

    /// Append one element to a repeated field.
    pub fn push(&mut self, number: u32, ty: Type, packed: bool, value: Value) {
        let entry = self.fields.entry(number).or_insert_with(|| FieldEntry {
            ty,
            packed,
            value: Value::List(Vec::new()),
        });
        match &mut entry.value {
            Value::List(items) => items.push(value),
            other => {
                let prev = std::mem::replace(other, Value::List(Vec::new()));
                if let Value::List(items) = other {
                    items.push(prev);
                    items.push(value);
                }
            }
        }
    }

    /// The singular sub-message stored at `number`, created empty if absent.
    pub fn message_mut(&mut self, number: u32, ty: Type, type_name: &str) -> &mut DynamicMessage {
        let entry = self.fields.entry(number).or_insert_with(|| FieldEntry {
            ty,
            packed: false,
            value: Value::Message(DynamicMessage::new(type_name)),
        });
        if !matches!(entry.value, Value::Message(_)) {
            entry.value = Value::Message(DynamicMessage::new(type_name));
        }
        match &mut entry.value {
            Value::Message(m) => m,
            _ => unreachable!("entry was just set to a message"),
        }
    }

    pub fn remove(&mut self, number: u32) -> Option<FieldEntry> {
        self.fields.remove(&number)
    }

    pub fn fields(&self) -> impl Iterator<Item = (u32, &FieldEntry)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn field_numbers(&self) -> Vec<u32> {
        self.fields.keys().copied().collect()
    }

    pub fn unknown(&self) -> &[u8] {
        &self.unknown
    }

    pub fn append_unknown(&mut self, bytes: &[u8]) {
        self.unknown.extend_from_slice(bytes);
    }

    pub fn clear_unknown(&mut self) {
        self.unknown.clear();
    }
}

impl fmt::Display for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{ ", self.type_name)?;
        for (i, (number, entry)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", number, entry.value)?;
        }
        if !self.unknown.is_empty() {
            write!(f, " <{} unknown bytes>", self.unknown.len())?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_builds_list() {
        let mut m = DynamicMessage::new("t.M");
        m.push(3, Type::Int32, false, Value::I32(1));
        m.push(3, Type::Int32, false, Value::I32(2));
        assert_eq!(
            m.get_by_number(3),
            Some(&Value::List(vec![Value::I32(1), Value::I32(2)]))
        );
    }

    #[test]
    fn test_message_mut_reuses_existing() {
        let mut m = DynamicMessage::new("t.M");
        m.message_mut(5, Type::Message, "t.Sub")
            .set(1, Type::Bool, Value::Bool(true));
        m.message_mut(5, Type::Message, "t.Sub")
            .set(2, Type::String, "x".into());
        let sub = m.get_by_number(5).and_then(Value::as_message).unwrap();
        assert_eq!(sub.type_name(), "t.Sub");
        assert_eq!(sub.get_by_number(1), Some(&Value::Bool(true)));
        assert_eq!(sub.get_by_number(2), Some(&Value::from("x")));
    }

    #[test]
    fn test_nan_equality_is_bitwise() {
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
        assert_ne!(Value::F64(0.0), Value::F64(-0.0));
    }
}
