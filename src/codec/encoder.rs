use crate::descriptor::*;
use crate::error::EncodeError;
use crate::value::{DynamicMessage, FieldEntry, Value};

use super::wire::*;

/// Serialization to the protobuf wire format.
///
/// Fields are written in ascending field-number order, extensions interleaved by number and
/// unknown bytes last, which makes the output deterministic for a given value.
pub trait Encode {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError>;

    fn encode_to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.encode_to(&mut buf)?;
        Ok(buf)
    }
}

fn put_string(buf: &mut Vec<u8>, field: u32, value: &Option<String>) {
    if let Some(s) = value {
        put_bytes(buf, field, s.as_bytes());
    }
}

fn put_bytes(buf: &mut Vec<u8>, field: u32, value: &[u8]) {
    put_key(buf, field, WireType::LengthDelimited);
    put_varint(buf, value.len() as u64);
    buf.extend_from_slice(value);
}

fn put_int32(buf: &mut Vec<u8>, field: u32, value: Option<i32>) {
    if let Some(v) = value {
        put_key(buf, field, WireType::Varint);
        put_varint(buf, v as i64 as u64);
    }
}

fn put_bool(buf: &mut Vec<u8>, field: u32, value: Option<bool>) {
    if let Some(v) = value {
        put_key(buf, field, WireType::Varint);
        put_varint(buf, v as u64);
    }
}

fn put_nested<T: Encode>(buf: &mut Vec<u8>, field: u32, value: &T) -> Result<(), EncodeError> {
    let inner = value.encode_to_vec()?;
    put_bytes(buf, field, &inner);
    Ok(())
}

fn put_all<T: Encode>(buf: &mut Vec<u8>, field: u32, values: &[T]) -> Result<(), EncodeError> {
    for v in values {
        put_nested(buf, field, v)?;
    }
    Ok(())
}

fn put_options(buf: &mut Vec<u8>, field: u32, options: &Option<Options>) -> Result<(), EncodeError> {
    match options {
        Some(o) => put_nested(buf, field, o),
        None => Ok(()),
    }
}

impl Encode for FileDescriptorSet {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_all(buf, tags::FILE_SET_FILE, &self.file)
    }
}

impl Encode for FileDescriptorProto {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_string(buf, tags::FILE_NAME, &self.name);
        put_string(buf, tags::FILE_PACKAGE, &self.package);
        for dep in &self.dependency {
            put_bytes(buf, tags::FILE_DEPENDENCY, dep.as_bytes());
        }
        put_all(buf, tags::FILE_MESSAGE_TYPE, &self.message_type)?;
        put_all(buf, tags::FILE_ENUM_TYPE, &self.enum_type)?;
        put_all(buf, tags::FILE_SERVICE, &self.service)?;
        put_all(buf, tags::FILE_EXTENSION, &self.extension)?;
        put_options(buf, tags::FILE_OPTIONS, &self.options)?;
        for &i in &self.public_dependency {
            put_int32(buf, tags::FILE_PUBLIC_DEPENDENCY, Some(i));
        }
        for &i in &self.weak_dependency {
            put_int32(buf, tags::FILE_WEAK_DEPENDENCY, Some(i));
        }
        put_string(buf, tags::FILE_SYNTAX, &self.syntax);
        Ok(())
    }
}

impl Encode for DescriptorProto {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_string(buf, tags::MESSAGE_NAME, &self.name);
        put_all(buf, tags::MESSAGE_FIELD, &self.field)?;
        put_all(buf, tags::MESSAGE_NESTED_TYPE, &self.nested_type)?;
        put_all(buf, tags::MESSAGE_ENUM_TYPE, &self.enum_type)?;
        put_all(buf, tags::MESSAGE_EXTENSION_RANGE, &self.extension_range)?;
        put_all(buf, tags::MESSAGE_EXTENSION, &self.extension)?;
        put_options(buf, tags::MESSAGE_OPTIONS, &self.options)?;
        put_all(buf, tags::MESSAGE_ONEOF_DECL, &self.oneof_decl)?;
        put_all(buf, tags::MESSAGE_RESERVED_RANGE, &self.reserved_range)?;
        for name in &self.reserved_name {
            put_bytes(buf, tags::MESSAGE_RESERVED_NAME, name.as_bytes());
        }
        Ok(())
    }
}

impl Encode for ExtensionRange {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_int32(buf, tags::RANGE_START, self.start);
        put_int32(buf, tags::RANGE_END, self.end);
        put_options(buf, tags::RANGE_OPTIONS, &self.options)
    }
}

impl Encode for ReservedRange {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_int32(buf, tags::RANGE_START, self.start);
        put_int32(buf, tags::RANGE_END, self.end);
        Ok(())
    }
}

impl Encode for EnumReservedRange {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_int32(buf, tags::RANGE_START, self.start);
        put_int32(buf, tags::RANGE_END, self.end);
        Ok(())
    }
}

impl Encode for FieldDescriptorProto {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_string(buf, tags::FIELD_NAME, &self.name);
        put_string(buf, tags::FIELD_EXTENDEE, &self.extendee);
        put_int32(buf, tags::FIELD_NUMBER, self.number);
        put_int32(buf, tags::FIELD_LABEL, self.label.map(|l| l as i32));
        put_int32(buf, tags::FIELD_TYPE, self.r#type.map(|t| t as i32));
        put_string(buf, tags::FIELD_TYPE_NAME, &self.type_name);
        put_string(buf, tags::FIELD_DEFAULT_VALUE, &self.default_value);
        put_options(buf, tags::FIELD_OPTIONS, &self.options)?;
        put_int32(buf, tags::FIELD_ONEOF_INDEX, self.oneof_index);
        put_string(buf, tags::FIELD_JSON_NAME, &self.json_name);
        put_bool(buf, tags::FIELD_PROTO3_OPTIONAL, self.proto3_optional);
        Ok(())
    }
}

impl Encode for OneofDescriptorProto {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_string(buf, tags::ONEOF_NAME, &self.name);
        put_options(buf, tags::ONEOF_OPTIONS, &self.options)
    }
}

impl Encode for EnumDescriptorProto {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_string(buf, tags::ENUM_NAME, &self.name);
        put_all(buf, tags::ENUM_VALUE, &self.value)?;
        put_options(buf, tags::ENUM_OPTIONS, &self.options)?;
        put_all(buf, tags::ENUM_RESERVED_RANGE, &self.reserved_range)?;
        for name in &self.reserved_name {
            put_bytes(buf, tags::ENUM_RESERVED_NAME, name.as_bytes());
        }
        Ok(())
    }
}

impl Encode for EnumValueDescriptorProto {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_string(buf, tags::ENUM_VALUE_NAME, &self.name);
        put_int32(buf, tags::ENUM_VALUE_NUMBER, self.number);
        put_options(buf, tags::ENUM_VALUE_OPTIONS, &self.options)
    }
}

impl Encode for ServiceDescriptorProto {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_string(buf, tags::SERVICE_NAME, &self.name);
        put_all(buf, tags::SERVICE_METHOD, &self.method)?;
        put_options(buf, tags::SERVICE_OPTIONS, &self.options)
    }
}

impl Encode for MethodDescriptorProto {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_string(buf, tags::METHOD_NAME, &self.name);
        put_string(buf, tags::METHOD_INPUT_TYPE, &self.input_type);
        put_string(buf, tags::METHOD_OUTPUT_TYPE, &self.output_type);
        put_options(buf, tags::METHOD_OPTIONS, &self.options)?;
        put_bool(buf, tags::METHOD_CLIENT_STREAMING, self.client_streaming);
        put_bool(buf, tags::METHOD_SERVER_STREAMING, self.server_streaming);
        Ok(())
    }
}

impl Encode for NamePart {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_bytes(buf, tags::NAME_PART_NAME, self.name_part.as_bytes());
        put_bool(buf, tags::NAME_PART_IS_EXTENSION, Some(self.is_extension));
        Ok(())
    }
}

impl Encode for UninterpretedOption {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_all(buf, tags::UNINTERPRETED_NAME, &self.name)?;
        put_string(buf, tags::UNINTERPRETED_IDENTIFIER, &self.identifier_value);
        if let Some(v) = self.positive_int_value {
            put_key(buf, tags::UNINTERPRETED_POSITIVE_INT, WireType::Varint);
            put_varint(buf, v);
        }
        if let Some(v) = self.negative_int_value {
            put_key(buf, tags::UNINTERPRETED_NEGATIVE_INT, WireType::Varint);
            put_varint(buf, v as u64);
        }
        if let Some(v) = self.double_value {
            put_key(buf, tags::UNINTERPRETED_DOUBLE, WireType::Fixed64);
            put_u64_le(buf, v.to_bits());
        }
        if let Some(v) = &self.string_value {
            put_bytes(buf, tags::UNINTERPRETED_STRING, v);
        }
        put_string(buf, tags::UNINTERPRETED_AGGREGATE, &self.aggregate_value);
        Ok(())
    }
}

impl Encode for Options {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        let split = tags::UNINTERPRETED_OPTION;
        for (number, entry) in self.message.fields().filter(|(n, _)| *n < split) {
            encode_entry(number, entry, buf)?;
        }
        put_all(buf, split, &self.uninterpreted_option)?;
        for (number, entry) in self.message.fields().filter(|(n, _)| *n > split) {
            encode_entry(number, entry, buf)?;
        }
        buf.extend_from_slice(self.message.unknown());
        Ok(())
    }
}

impl Encode for DynamicMessage {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        for (number, entry) in self.fields() {
            encode_entry(number, entry, buf)?;
        }
        buf.extend_from_slice(self.unknown());
        Ok(())
    }
}

/// Encode one present field, repeated or singular.
pub fn encode_entry(number: u32, entry: &FieldEntry, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    match &entry.value {
        Value::List(items) if entry.packed && entry.ty.is_packable() => {
            if items.is_empty() {
                return Ok(());
            }
            let mut packed = Vec::new();
            for item in items {
                encode_scalar(number, entry.ty, item, &mut packed)?;
            }
            put_bytes(buf, number, &packed);
            Ok(())
        }
        Value::List(items) => {
            for item in items {
                encode_single(number, entry.ty, item, buf)?;
            }
            Ok(())
        }
        value => encode_single(number, entry.ty, value, buf),
    }
}

fn encode_single(number: u32, ty: Type, value: &Value, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    match (ty, value) {
        (Type::Group, Value::Message(m)) => {
            put_key(buf, number, WireType::StartGroup);
            m.encode_to(buf)?;
            put_key(buf, number, WireType::EndGroup);
            Ok(())
        }
        (Type::Message, Value::Message(m)) => put_nested(buf, number, m),
        (Type::Group, _) | (Type::Message, _) => Err(EncodeError::TypeMismatch {
            field: number,
            expected: ty.name(),
        }),
        _ => {
            put_key(buf, number, WireType::for_type(ty));
            encode_scalar(number, ty, value, buf)
        }
    }
}

/// Encode a scalar payload without its key.
fn encode_scalar(number: u32, ty: Type, value: &Value, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    match (ty, value) {
        (Type::Int32, Value::I32(v)) => put_varint(buf, *v as i64 as u64),
        (Type::Int64, Value::I64(v)) => put_varint(buf, *v as u64),
        (Type::Uint32, Value::U32(v)) => put_varint(buf, *v as u64),
        (Type::Uint64, Value::U64(v)) => put_varint(buf, *v),
        (Type::Sint32, Value::I32(v)) => put_varint(buf, zigzag_encode32(*v) as u64),
        (Type::Sint64, Value::I64(v)) => put_varint(buf, zigzag_encode64(*v)),
        (Type::Bool, Value::Bool(v)) => put_varint(buf, *v as u64),
        (Type::Enum, Value::Enum(v)) => put_varint(buf, *v as i64 as u64),
        (Type::Fixed32, Value::U32(v)) => put_u32_le(buf, *v),
        (Type::Sfixed32, Value::I32(v)) => put_u32_le(buf, *v as u32),
        (Type::Float, Value::F32(v)) => put_u32_le(buf, v.to_bits()),
        (Type::Fixed64, Value::U64(v)) => put_u64_le(buf, *v),
        (Type::Sfixed64, Value::I64(v)) => put_u64_le(buf, *v as u64),
        (Type::Double, Value::F64(v)) => put_u64_le(buf, v.to_bits()),
        (Type::String, Value::String(s)) => {
            put_varint(buf, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        (Type::Bytes, Value::Bytes(b)) => {
            put_varint(buf, b.len() as u64);
            buf.extend_from_slice(b);
        }
        _ => {
            return Err(EncodeError::TypeMismatch {
                field: number,
                expected: ty.name(),
            })
        }
    }
    Ok(())
}
