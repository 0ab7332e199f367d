use crate::descriptor::*;
use crate::error::DecodeError;
use crate::pool::TypeLookup;
use crate::registry::ExtensionRegistry;
use crate::value::{DynamicMessage, Value};

use super::wire::*;

/// What the decoder may consult to give meaning to field numbers.
#[derive(Clone, Copy)]
pub struct DecodeContext<'a> {
    pub types: &'a dyn TypeLookup,
    /// Extensions recognized as typed fields. Unrecognized extensions stay unknown bytes.
    pub extensions: Option<&'a ExtensionRegistry>,
}

impl<'a> DecodeContext<'a> {
    pub fn new(types: &'a dyn TypeLookup) -> Self {
        DecodeContext {
            types,
            extensions: None,
        }
    }

    pub fn with_extensions(mut self, extensions: &'a ExtensionRegistry) -> Self {
        self.extensions = Some(extensions);
        self
    }
}

/// Decode a binary `FileDescriptorProto`. Options are typed against the meta-schema;
/// custom options are kept as unknown bytes.
pub fn decode_file_descriptor(buf: &[u8]) -> Result<FileDescriptorProto, DecodeError> {
    let meta = crate::meta::meta_schema();
    decode_file(buf, &DecodeContext::new(meta.as_ref()))
}

/// Decode a binary `FileDescriptorSet`.
pub fn decode_file_descriptor_set(buf: &[u8]) -> Result<FileDescriptorSet, DecodeError> {
    let meta = crate::meta::meta_schema();
    let ctx = DecodeContext::new(meta.as_ref());
    let mut set = FileDescriptorSet::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::FILE_SET_FILE, WireType::LengthDelimited) => {
                set.file.push(decode_file(r.read_bytes()?, &ctx)?)
            }
            _ => r.skip(number, wt)?,
        }
    }
    Ok(set)
}

/// Decode a message of `type_name` (full name, no leading dot).
pub fn decode_message(
    type_name: &str,
    buf: &[u8],
    ctx: &DecodeContext<'_>,
) -> Result<DynamicMessage, DecodeError> {
    let message_type = ctx.types.find_message(type_name);
    let mut msg = DynamicMessage::new(type_name);
    let mut r = Reader::new(buf);

    while !r.is_empty() {
        let start = r.position();
        let (number, wt) = r.read_key()?;
        let field = message_type
            .and_then(|m| m.field_by_number(number as i32))
            .or_else(|| {
                ctx.extensions
                    .and_then(|reg| reg.find(type_name, number as i32))
                    .map(|ext| &ext.field)
            });
        let consumed = match field {
            Some(fd) => decode_field(&mut msg, fd, number, wt, &mut r, ctx)?,
            None => false,
        };
        if !consumed {
            r.skip(number, wt)?;
            msg.append_unknown(r.slice_from(start));
        }
    }

    Ok(msg)
}

/// Decode one occurrence of `fd`. Returns `false`, without consuming anything, when the wire
/// type does not fit the declared type.
fn decode_field(
    msg: &mut DynamicMessage,
    fd: &FieldDescriptorProto,
    number: u32,
    wt: WireType,
    r: &mut Reader<'_>,
    ctx: &DecodeContext<'_>,
) -> Result<bool, DecodeError> {
    let ty = match fd.r#type {
        Some(ty) => ty,
        None => return Ok(false),
    };
    let expected = WireType::for_type(ty);

    if wt == expected {
        let value = read_value(ty, fd, number, r, ctx)?;
        if fd.is_repeated() {
            msg.push(number, ty, false, value);
        } else {
            msg.set(number, ty, value);
        }
        Ok(true)
    } else if fd.is_repeated() && ty.is_packable() && wt == WireType::LengthDelimited {
        let bytes = r.read_bytes()?;
        let mut inner = Reader::new(bytes);
        while !inner.is_empty() {
            let value = read_value(ty, fd, number, &mut inner, ctx)?;
            msg.push(number, ty, true, value);
        }
        Ok(true)
    } else {
        Ok(false)
    }
}

fn read_value(
    ty: Type,
    fd: &FieldDescriptorProto,
    number: u32,
    r: &mut Reader<'_>,
    ctx: &DecodeContext<'_>,
) -> Result<Value, DecodeError> {
    Ok(match ty {
        Type::Int32 => Value::I32(r.read_varint()? as i32),
        Type::Int64 => Value::I64(r.read_varint()? as i64),
        Type::Uint32 => Value::U32(r.read_varint()? as u32),
        Type::Uint64 => Value::U64(r.read_varint()?),
        Type::Sint32 => Value::I32(zigzag_decode32(r.read_varint()? as u32)),
        Type::Sint64 => Value::I64(zigzag_decode64(r.read_varint()?)),
        Type::Bool => Value::Bool(r.read_varint()? != 0),
        Type::Enum => Value::Enum(r.read_varint()? as i32),
        Type::Fixed32 => Value::U32(r.read_fixed32()?),
        Type::Sfixed32 => Value::I32(r.read_fixed32()? as i32),
        Type::Float => Value::F32(f32::from_bits(r.read_fixed32()?)),
        Type::Fixed64 => Value::U64(r.read_fixed64()?),
        Type::Sfixed64 => Value::I64(r.read_fixed64()? as i64),
        Type::Double => Value::F64(f64::from_bits(r.read_fixed64()?)),
        Type::String => Value::String(r.read_string(number)?),
        Type::Bytes => Value::Bytes(r.read_bytes()?.to_vec()),
        Type::Message => {
            let bytes = r.read_bytes()?;
            Value::Message(decode_message(fd.type_name_unqualified(), bytes, ctx)?)
        }
        Type::Group => {
            let start = r.position();
            let end = group_end(r, number)?;
            let inner = &r.slice_from(start)[..end - start];
            Value::Message(decode_message(fd.type_name_unqualified(), inner, ctx)?)
        }
    })
}

/// Advance past the end-group key of `number`, returning the offset where that key began.
fn group_end(r: &mut Reader<'_>, number: u32) -> Result<usize, DecodeError> {
    loop {
        let before = r.position();
        let (f, wt) = r.read_key()?;
        if wt == WireType::EndGroup {
            if f == number {
                return Ok(before);
            }
            return Err(DecodeError::InvalidData(format!(
                "mismatched end group {} for group {}",
                f, number
            )));
        }
        r.skip(f, wt)?;
    }
}

fn int32(r: &mut Reader<'_>) -> Result<i32, DecodeError> {
    Ok(r.read_varint()? as i32)
}

fn boolean(r: &mut Reader<'_>) -> Result<bool, DecodeError> {
    Ok(r.read_varint()? != 0)
}

/// Decode a binary `FileDescriptorProto` with the given context.
pub fn decode_file(buf: &[u8], ctx: &DecodeContext<'_>) -> Result<FileDescriptorProto, DecodeError> {
    let mut file = FileDescriptorProto::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::FILE_NAME, WireType::LengthDelimited) => file.name = Some(r.read_string(number)?),
            (tags::FILE_PACKAGE, WireType::LengthDelimited) => {
                file.package = Some(r.read_string(number)?)
            }
            (tags::FILE_DEPENDENCY, WireType::LengthDelimited) => {
                file.dependency.push(r.read_string(number)?)
            }
            (tags::FILE_MESSAGE_TYPE, WireType::LengthDelimited) => {
                file.message_type.push(decode_descriptor(r.read_bytes()?, ctx)?)
            }
            (tags::FILE_ENUM_TYPE, WireType::LengthDelimited) => {
                file.enum_type.push(decode_enum(r.read_bytes()?, ctx)?)
            }
            (tags::FILE_SERVICE, WireType::LengthDelimited) => {
                file.service.push(decode_service(r.read_bytes()?, ctx)?)
            }
            (tags::FILE_EXTENSION, WireType::LengthDelimited) => {
                file.extension.push(decode_field_proto(r.read_bytes()?, ctx)?)
            }
            (tags::FILE_OPTIONS, WireType::LengthDelimited) => {
                file.options = Some(decode_options(OptionsKind::File, r.read_bytes()?, ctx)?)
            }
            (tags::FILE_PUBLIC_DEPENDENCY, WireType::Varint) => file.public_dependency.push(int32(&mut r)?),
            (tags::FILE_WEAK_DEPENDENCY, WireType::Varint) => file.weak_dependency.push(int32(&mut r)?),
            (tags::FILE_PUBLIC_DEPENDENCY, WireType::LengthDelimited) => {
                file.public_dependency.extend(packed_int32s(r.read_bytes()?)?)
            }
            (tags::FILE_WEAK_DEPENDENCY, WireType::LengthDelimited) => {
                file.weak_dependency.extend(packed_int32s(r.read_bytes()?)?)
            }
            (tags::FILE_SYNTAX, WireType::LengthDelimited) => file.syntax = Some(r.read_string(number)?),
            _ => r.skip(number, wt)?,
        }
    }
    Ok(file)
}

fn packed_int32s(buf: &[u8]) -> Result<Vec<i32>, DecodeError> {
    let mut r = Reader::new(buf);
    let mut out = Vec::new();
    while !r.is_empty() {
        out.push(int32(&mut r)?);
    }
    Ok(out)
}

fn decode_descriptor(buf: &[u8], ctx: &DecodeContext<'_>) -> Result<DescriptorProto, DecodeError> {
    let mut msg = DescriptorProto::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        if wt != WireType::LengthDelimited {
            r.skip(number, wt)?;
            continue;
        }
        match number {
            tags::MESSAGE_NAME => msg.name = Some(r.read_string(number)?),
            tags::MESSAGE_FIELD => msg.field.push(decode_field_proto(r.read_bytes()?, ctx)?),
            tags::MESSAGE_NESTED_TYPE => msg.nested_type.push(decode_descriptor(r.read_bytes()?, ctx)?),
            tags::MESSAGE_ENUM_TYPE => msg.enum_type.push(decode_enum(r.read_bytes()?, ctx)?),
            tags::MESSAGE_EXTENSION_RANGE => {
                msg.extension_range.push(decode_extension_range(r.read_bytes()?, ctx)?)
            }
            tags::MESSAGE_EXTENSION => msg.extension.push(decode_field_proto(r.read_bytes()?, ctx)?),
            tags::MESSAGE_OPTIONS => {
                msg.options = Some(decode_options(OptionsKind::Message, r.read_bytes()?, ctx)?)
            }
            tags::MESSAGE_ONEOF_DECL => msg.oneof_decl.push(decode_oneof(r.read_bytes()?, ctx)?),
            tags::MESSAGE_RESERVED_RANGE => {
                let (start, end) = decode_range(r.read_bytes()?)?;
                msg.reserved_range.push(ReservedRange { start, end });
            }
            tags::MESSAGE_RESERVED_NAME => msg.reserved_name.push(r.read_string(number)?),
            _ => r.skip(number, wt)?,
        }
    }
    Ok(msg)
}

fn decode_range(buf: &[u8]) -> Result<(Option<i32>, Option<i32>), DecodeError> {
    let mut start = None;
    let mut end = None;
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::RANGE_START, WireType::Varint) => start = Some(int32(&mut r)?),
            (tags::RANGE_END, WireType::Varint) => end = Some(int32(&mut r)?),
            _ => r.skip(number, wt)?,
        }
    }
    Ok((start, end))
}

fn decode_extension_range(buf: &[u8], ctx: &DecodeContext<'_>) -> Result<ExtensionRange, DecodeError> {
    let mut range = ExtensionRange::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::RANGE_START, WireType::Varint) => range.start = Some(int32(&mut r)?),
            (tags::RANGE_END, WireType::Varint) => range.end = Some(int32(&mut r)?),
            (tags::RANGE_OPTIONS, WireType::LengthDelimited) => {
                range.options = Some(decode_options(OptionsKind::ExtensionRange, r.read_bytes()?, ctx)?)
            }
            _ => r.skip(number, wt)?,
        }
    }
    Ok(range)
}

fn decode_field_proto(buf: &[u8], ctx: &DecodeContext<'_>) -> Result<FieldDescriptorProto, DecodeError> {
    let mut field = FieldDescriptorProto::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::FIELD_NAME, WireType::LengthDelimited) => field.name = Some(r.read_string(number)?),
            (tags::FIELD_EXTENDEE, WireType::LengthDelimited) => {
                field.extendee = Some(r.read_string(number)?)
            }
            (tags::FIELD_NUMBER, WireType::Varint) => field.number = Some(int32(&mut r)?),
            (tags::FIELD_LABEL, WireType::Varint) => {
                let v = int32(&mut r)?;
                field.label = Some(Label::from_i32(v).ok_or_else(|| {
                    DecodeError::InvalidData(format!("invalid field label {}", v))
                })?);
            }
            (tags::FIELD_TYPE, WireType::Varint) => {
                let v = int32(&mut r)?;
                field.r#type = Some(Type::from_i32(v).ok_or_else(|| {
                    DecodeError::InvalidData(format!("invalid field type {}", v))
                })?);
            }
            (tags::FIELD_TYPE_NAME, WireType::LengthDelimited) => {
                field.type_name = Some(r.read_string(number)?)
            }
            (tags::FIELD_DEFAULT_VALUE, WireType::LengthDelimited) => {
                field.default_value = Some(r.read_string(number)?)
            }
            (tags::FIELD_OPTIONS, WireType::LengthDelimited) => {
                field.options = Some(decode_options(OptionsKind::Field, r.read_bytes()?, ctx)?)
            }
            (tags::FIELD_ONEOF_INDEX, WireType::Varint) => field.oneof_index = Some(int32(&mut r)?),
            (tags::FIELD_JSON_NAME, WireType::LengthDelimited) => {
                field.json_name = Some(r.read_string(number)?)
            }
            (tags::FIELD_PROTO3_OPTIONAL, WireType::Varint) => {
                field.proto3_optional = Some(boolean(&mut r)?)
            }
            _ => r.skip(number, wt)?,
        }
    }
    Ok(field)
}

fn decode_oneof(buf: &[u8], ctx: &DecodeContext<'_>) -> Result<OneofDescriptorProto, DecodeError> {
    let mut oneof = OneofDescriptorProto::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::ONEOF_NAME, WireType::LengthDelimited) => oneof.name = Some(r.read_string(number)?),
            (tags::ONEOF_OPTIONS, WireType::LengthDelimited) => {
                oneof.options = Some(decode_options(OptionsKind::Oneof, r.read_bytes()?, ctx)?)
            }
            _ => r.skip(number, wt)?,
        }
    }
    Ok(oneof)
}

fn decode_enum(buf: &[u8], ctx: &DecodeContext<'_>) -> Result<EnumDescriptorProto, DecodeError> {
    let mut e = EnumDescriptorProto::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::ENUM_NAME, WireType::LengthDelimited) => e.name = Some(r.read_string(number)?),
            (tags::ENUM_VALUE, WireType::LengthDelimited) => {
                e.value.push(decode_enum_value(r.read_bytes()?, ctx)?)
            }
            (tags::ENUM_OPTIONS, WireType::LengthDelimited) => {
                e.options = Some(decode_options(OptionsKind::Enum, r.read_bytes()?, ctx)?)
            }
            (tags::ENUM_RESERVED_RANGE, WireType::LengthDelimited) => {
                let (start, end) = decode_range(r.read_bytes()?)?;
                e.reserved_range.push(EnumReservedRange { start, end });
            }
            (tags::ENUM_RESERVED_NAME, WireType::LengthDelimited) => {
                e.reserved_name.push(r.read_string(number)?)
            }
            _ => r.skip(number, wt)?,
        }
    }
    Ok(e)
}

fn decode_enum_value(buf: &[u8], ctx: &DecodeContext<'_>) -> Result<EnumValueDescriptorProto, DecodeError> {
    let mut v = EnumValueDescriptorProto::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::ENUM_VALUE_NAME, WireType::LengthDelimited) => v.name = Some(r.read_string(number)?),
            (tags::ENUM_VALUE_NUMBER, WireType::Varint) => v.number = Some(int32(&mut r)?),
            (tags::ENUM_VALUE_OPTIONS, WireType::LengthDelimited) => {
                v.options = Some(decode_options(OptionsKind::EnumValue, r.read_bytes()?, ctx)?)
            }
            _ => r.skip(number, wt)?,
        }
    }
    Ok(v)
}

fn decode_service(buf: &[u8], ctx: &DecodeContext<'_>) -> Result<ServiceDescriptorProto, DecodeError> {
    let mut s = ServiceDescriptorProto::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::SERVICE_NAME, WireType::LengthDelimited) => s.name = Some(r.read_string(number)?),
            (tags::SERVICE_METHOD, WireType::LengthDelimited) => {
                s.method.push(decode_method(r.read_bytes()?, ctx)?)
            }
            (tags::SERVICE_OPTIONS, WireType::LengthDelimited) => {
                s.options = Some(decode_options(OptionsKind::Service, r.read_bytes()?, ctx)?)
            }
            _ => r.skip(number, wt)?,
        }
    }
    Ok(s)
}

fn decode_method(buf: &[u8], ctx: &DecodeContext<'_>) -> Result<MethodDescriptorProto, DecodeError> {
    let mut m = MethodDescriptorProto::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::METHOD_NAME, WireType::LengthDelimited) => m.name = Some(r.read_string(number)?),
            (tags::METHOD_INPUT_TYPE, WireType::LengthDelimited) => {
                m.input_type = Some(r.read_string(number)?)
            }
            (tags::METHOD_OUTPUT_TYPE, WireType::LengthDelimited) => {
                m.output_type = Some(r.read_string(number)?)
            }
            (tags::METHOD_OPTIONS, WireType::LengthDelimited) => {
                m.options = Some(decode_options(OptionsKind::Method, r.read_bytes()?, ctx)?)
            }
            (tags::METHOD_CLIENT_STREAMING, WireType::Varint) => {
                m.client_streaming = Some(boolean(&mut r)?)
            }
            (tags::METHOD_SERVER_STREAMING, WireType::Varint) => {
                m.server_streaming = Some(boolean(&mut r)?)
            }
            _ => r.skip(number, wt)?,
        }
    }
    Ok(m)
}

/// Decode an options message: field 999 into typed uninterpreted options, everything else
/// against the `*Options` type and the context's extensions.
pub fn decode_options(
    kind: OptionsKind,
    buf: &[u8],
    ctx: &DecodeContext<'_>,
) -> Result<Options, DecodeError> {
    let mut uninterpreted_option = Vec::new();
    let mut rest = Vec::with_capacity(buf.len());
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let start = r.position();
        let (number, wt) = r.read_key()?;
        if number == tags::UNINTERPRETED_OPTION && wt == WireType::LengthDelimited {
            uninterpreted_option.push(decode_uninterpreted(r.read_bytes()?)?);
        } else {
            r.skip(number, wt)?;
            rest.extend_from_slice(r.slice_from(start));
        }
    }
    let message = decode_message(kind.type_name(), &rest, ctx)?;
    Ok(Options {
        kind,
        message,
        uninterpreted_option,
    })
}

fn decode_uninterpreted(buf: &[u8]) -> Result<UninterpretedOption, DecodeError> {
    let mut opt = UninterpretedOption::default();
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::UNINTERPRETED_NAME, WireType::LengthDelimited) => {
                opt.name.push(decode_name_part(r.read_bytes()?)?)
            }
            (tags::UNINTERPRETED_IDENTIFIER, WireType::LengthDelimited) => {
                opt.identifier_value = Some(r.read_string(number)?)
            }
            (tags::UNINTERPRETED_POSITIVE_INT, WireType::Varint) => {
                opt.positive_int_value = Some(r.read_varint()?)
            }
            (tags::UNINTERPRETED_NEGATIVE_INT, WireType::Varint) => {
                opt.negative_int_value = Some(r.read_varint()? as i64)
            }
            (tags::UNINTERPRETED_DOUBLE, WireType::Fixed64) => {
                opt.double_value = Some(f64::from_bits(r.read_fixed64()?))
            }
            (tags::UNINTERPRETED_STRING, WireType::LengthDelimited) => {
                opt.string_value = Some(r.read_bytes()?.to_vec())
            }
            (tags::UNINTERPRETED_AGGREGATE, WireType::LengthDelimited) => {
                opt.aggregate_value = Some(r.read_string(number)?)
            }
            _ => r.skip(number, wt)?,
        }
    }
    Ok(opt)
}

fn decode_name_part(buf: &[u8]) -> Result<NamePart, DecodeError> {
    let mut part = NamePart {
        name_part: String::new(),
        is_extension: false,
    };
    let mut r = Reader::new(buf);
    while !r.is_empty() {
        let (number, wt) = r.read_key()?;
        match (number, wt) {
            (tags::NAME_PART_NAME, WireType::LengthDelimited) => part.name_part = r.read_string(number)?,
            (tags::NAME_PART_IS_EXTENSION, WireType::Varint) => part.is_extension = boolean(&mut r)?,
            _ => r.skip(number, wt)?,
        }
    }
    Ok(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encode;

    #[test]
    fn test_decode_file_roundtrip() {
        let mut msg = DescriptorProto {
            name: Some("M".into()),
            ..Default::default()
        };
        msg.field.push(FieldDescriptorProto {
            name: Some("id".into()),
            number: Some(1),
            label: Some(Label::Optional),
            r#type: Some(Type::Int64),
            json_name: Some("id".into()),
            ..Default::default()
        });
        msg.reserved_range.push(ReservedRange { start: Some(5), end: Some(6) });
        let file = FileDescriptorProto {
            name: Some("m.proto".into()),
            package: Some("p".into()),
            dependency: vec!["a.proto".into()],
            public_dependency: vec![0],
            message_type: vec![msg],
            syntax: Some("proto3".into()),
            ..Default::default()
        };
        let bytes = file.encode_to_vec().unwrap();
        let decoded = decode_file_descriptor(&bytes).unwrap();
        assert_eq!(decoded, file);
    }

    #[test]
    fn test_known_option_decoded_typed() {
        // FieldOptions.deprecated = true
        let decoded = decode_options(
            OptionsKind::Field,
            &[0x18, 0x01],
            &DecodeContext::new(crate::meta::meta_schema().as_ref()),
        )
        .unwrap();
        assert_eq!(decoded.message.get_by_number(3), Some(&Value::Bool(true)));
        assert!(decoded.message.unknown().is_empty());
    }

    #[test]
    fn test_unknown_option_preserved() {
        let mut buf = Vec::new();
        put_key(&mut buf, 51234, WireType::Varint);
        put_varint(&mut buf, 7);
        let decoded = decode_options(
            OptionsKind::Message,
            &buf,
            &DecodeContext::new(crate::meta::meta_schema().as_ref()),
        )
        .unwrap();
        assert!(decoded.message.field_numbers().is_empty());
        assert_eq!(decoded.message.unknown(), buf.as_slice());
    }
}
