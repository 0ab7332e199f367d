//! Typed descriptor protos, mirroring `google/protobuf/descriptor.proto`.
//!
//! Every scalar is an `Option`: "not set" is part of the data model, and the serialized
//! form only carries fields that are present.

use crate::diagnostics::Span;
use crate::value::DynamicMessage;

/// Field numbers of the descriptor messages, used for structural paths and the codec.
pub mod tags {
    pub const FILE_NAME: u32 = 1;
    pub const FILE_PACKAGE: u32 = 2;
    pub const FILE_DEPENDENCY: u32 = 3;
    pub const FILE_MESSAGE_TYPE: u32 = 4;
    pub const FILE_ENUM_TYPE: u32 = 5;
    pub const FILE_SERVICE: u32 = 6;
    pub const FILE_EXTENSION: u32 = 7;
    pub const FILE_OPTIONS: u32 = 8;
    pub const FILE_SOURCE_CODE_INFO: u32 = 9;
    pub const FILE_PUBLIC_DEPENDENCY: u32 = 10;
    pub const FILE_WEAK_DEPENDENCY: u32 = 11;
    pub const FILE_SYNTAX: u32 = 12;

    pub const MESSAGE_NAME: u32 = 1;
    pub const MESSAGE_FIELD: u32 = 2;
    pub const MESSAGE_NESTED_TYPE: u32 = 3;
    pub const MESSAGE_ENUM_TYPE: u32 = 4;
    pub const MESSAGE_EXTENSION_RANGE: u32 = 5;
    pub const MESSAGE_EXTENSION: u32 = 6;
    pub const MESSAGE_OPTIONS: u32 = 7;
    pub const MESSAGE_ONEOF_DECL: u32 = 8;
    pub const MESSAGE_RESERVED_RANGE: u32 = 9;
    pub const MESSAGE_RESERVED_NAME: u32 = 10;

    pub const RANGE_START: u32 = 1;
    pub const RANGE_END: u32 = 2;
    pub const RANGE_OPTIONS: u32 = 3;

    pub const FIELD_NAME: u32 = 1;
    pub const FIELD_EXTENDEE: u32 = 2;
    pub const FIELD_NUMBER: u32 = 3;
    pub const FIELD_LABEL: u32 = 4;
    pub const FIELD_TYPE: u32 = 5;
    pub const FIELD_TYPE_NAME: u32 = 6;
    pub const FIELD_DEFAULT_VALUE: u32 = 7;
    pub const FIELD_OPTIONS: u32 = 8;
    pub const FIELD_ONEOF_INDEX: u32 = 9;
    pub const FIELD_JSON_NAME: u32 = 10;
    pub const FIELD_PROTO3_OPTIONAL: u32 = 17;

    pub const ONEOF_NAME: u32 = 1;
    pub const ONEOF_OPTIONS: u32 = 2;

    pub const ENUM_NAME: u32 = 1;
    pub const ENUM_VALUE: u32 = 2;
    pub const ENUM_OPTIONS: u32 = 3;
    pub const ENUM_RESERVED_RANGE: u32 = 4;
    pub const ENUM_RESERVED_NAME: u32 = 5;

    pub const ENUM_VALUE_NAME: u32 = 1;
    pub const ENUM_VALUE_NUMBER: u32 = 2;
    pub const ENUM_VALUE_OPTIONS: u32 = 3;

    pub const SERVICE_NAME: u32 = 1;
    pub const SERVICE_METHOD: u32 = 2;
    pub const SERVICE_OPTIONS: u32 = 3;

    pub const METHOD_NAME: u32 = 1;
    pub const METHOD_INPUT_TYPE: u32 = 2;
    pub const METHOD_OUTPUT_TYPE: u32 = 3;
    pub const METHOD_OPTIONS: u32 = 4;
    pub const METHOD_CLIENT_STREAMING: u32 = 5;
    pub const METHOD_SERVER_STREAMING: u32 = 6;

    pub const UNINTERPRETED_OPTION: u32 = 999;
    pub const UNINTERPRETED_NAME: u32 = 2;
    pub const UNINTERPRETED_IDENTIFIER: u32 = 3;
    pub const UNINTERPRETED_POSITIVE_INT: u32 = 4;
    pub const UNINTERPRETED_NEGATIVE_INT: u32 = 5;
    pub const UNINTERPRETED_DOUBLE: u32 = 6;
    pub const UNINTERPRETED_STRING: u32 = 7;
    pub const UNINTERPRETED_AGGREGATE: u32 = 8;
    pub const NAME_PART_NAME: u32 = 1;
    pub const NAME_PART_IS_EXTENSION: u32 = 2;

    pub const FILE_SET_FILE: u32 = 1;
}

/// Highest legal field number.
pub const MAX_FIELD_NUMBER: i32 = 536_870_911;
/// Field numbers reserved for the protobuf implementation itself.
pub const RESERVED_NUMBERS: std::ops::Range<i32> = 19_000..20_000;

/// The root package reserved for the meta-schema.
pub const RESERVED_PACKAGE: &str = "google.protobuf";
/// File name of the meta-schema.
pub const META_SCHEMA_FILE: &str = "google/protobuf/descriptor.proto";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Label {
    Optional = 1,
    Required = 2,
    Repeated = 3,
}

impl Label {
    pub fn from_i32(v: i32) -> Option<Label> {
        match v {
            1 => Some(Label::Optional),
            2 => Some(Label::Required),
            3 => Some(Label::Repeated),
            _ => None,
        }
    }

    pub fn from_keyword(s: &str) -> Option<Label> {
        match s {
            "optional" => Some(Label::Optional),
            "required" => Some(Label::Required),
            "repeated" => Some(Label::Repeated),
            _ => None,
        }
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    Double = 1,
    Float = 2,
    Int64 = 3,
    Uint64 = 4,
    Int32 = 5,
    Fixed64 = 6,
    Fixed32 = 7,
    Bool = 8,
    String = 9,
    Group = 10,
    Message = 11,
    Bytes = 12,
    Uint32 = 13,
    Enum = 14,
    Sfixed32 = 15,
    Sfixed64 = 16,
    Sint32 = 17,
    Sint64 = 18,
}

impl Type {
    pub fn from_i32(v: i32) -> Option<Type> {
        Some(match v {
            1 => Type::Double,
            2 => Type::Float,
            3 => Type::Int64,
            4 => Type::Uint64,
            5 => Type::Int32,
            6 => Type::Fixed64,
            7 => Type::Fixed32,
            8 => Type::Bool,
            9 => Type::String,
            10 => Type::Group,
            11 => Type::Message,
            12 => Type::Bytes,
            13 => Type::Uint32,
            14 => Type::Enum,
            15 => Type::Sfixed32,
            16 => Type::Sfixed64,
            17 => Type::Sint32,
            18 => Type::Sint64,
            _ => return None,
        })
    }

    /// Scalar type named by a schema keyword (`int32`, `string`, ...).
    pub fn from_keyword(s: &str) -> Option<Type> {
        Some(match s {
            "double" => Type::Double,
            "float" => Type::Float,
            "int64" => Type::Int64,
            "uint64" => Type::Uint64,
            "int32" => Type::Int32,
            "fixed64" => Type::Fixed64,
            "fixed32" => Type::Fixed32,
            "bool" => Type::Bool,
            "string" => Type::String,
            "bytes" => Type::Bytes,
            "uint32" => Type::Uint32,
            "sfixed32" => Type::Sfixed32,
            "sfixed64" => Type::Sfixed64,
            "sint32" => Type::Sint32,
            "sint64" => Type::Sint64,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Type::Double => "double",
            Type::Float => "float",
            Type::Int64 => "int64",
            Type::Uint64 => "uint64",
            Type::Int32 => "int32",
            Type::Fixed64 => "fixed64",
            Type::Fixed32 => "fixed32",
            Type::Bool => "bool",
            Type::String => "string",
            Type::Group => "group",
            Type::Message => "message",
            Type::Bytes => "bytes",
            Type::Uint32 => "uint32",
            Type::Enum => "enum",
            Type::Sfixed32 => "sfixed32",
            Type::Sfixed64 => "sfixed64",
            Type::Sint32 => "sint32",
            Type::Sint64 => "sint64",
        }
    }

    /// Whether repeated values of this type may use packed encoding.
    pub fn is_packable(&self) -> bool {
        !matches!(self, Type::String | Type::Bytes | Type::Message | Type::Group)
    }

    pub fn is_message(&self) -> bool {
        matches!(self, Type::Message | Type::Group)
    }
}

/// Which `*Options` message an options value is typed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptionsKind {
    File,
    Message,
    Field,
    Oneof,
    Enum,
    EnumValue,
    Service,
    Method,
    ExtensionRange,
}

impl OptionsKind {
    /// Full name of the meta-schema message, without the leading dot.
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionsKind::File => "google.protobuf.FileOptions",
            OptionsKind::Message => "google.protobuf.MessageOptions",
            OptionsKind::Field => "google.protobuf.FieldOptions",
            OptionsKind::Oneof => "google.protobuf.OneofOptions",
            OptionsKind::Enum => "google.protobuf.EnumOptions",
            OptionsKind::EnumValue => "google.protobuf.EnumValueOptions",
            OptionsKind::Service => "google.protobuf.ServiceOptions",
            OptionsKind::Method => "google.protobuf.MethodOptions",
            OptionsKind::ExtensionRange => "google.protobuf.ExtensionRangeOptions",
        }
    }
}

/// One segment of an option name: `foo` or `(foo.bar)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NamePart {
    pub name_part: String,
    pub is_extension: bool,
}

/// An option assignment whose name has not been interpreted yet.
///
/// This is the raw form produced while walking a parse tree; the option resolver consumes
/// it and leaves the options message with no uninterpreted entries.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UninterpretedOption {
    pub name: Vec<NamePart>,
    pub identifier_value: Option<String>,
    pub positive_int_value: Option<u64>,
    pub negative_int_value: Option<i64>,
    pub double_value: Option<f64>,
    pub string_value: Option<Vec<u8>>,
    pub aggregate_value: Option<String>,
    /// Where the assignment was written. Not serialized.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub span: Option<Span>,
}

/// Raw option assignment as captured by the semantic builder.
pub type RawOption = UninterpretedOption;

impl UninterpretedOption {
    /// `foo.(bar.baz).qux` style rendering of the name.
    pub fn name_text(&self) -> String {
        let mut out = String::new();
        for (i, part) in self.name.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            if part.is_extension {
                out.push('(');
                out.push_str(&part.name_part);
                out.push(')');
            } else {
                out.push_str(&part.name_part);
            }
        }
        out
    }
}

/// An options message: typed storage plus not-yet-interpreted assignments.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options {
    pub kind: OptionsKind,
    /// Known fields, typed extensions, and opaque unknown bytes.
    pub message: DynamicMessage,
    pub uninterpreted_option: Vec<UninterpretedOption>,
}

impl Options {
    pub fn new(kind: OptionsKind) -> Self {
        Options {
            kind,
            message: DynamicMessage::new(kind.type_name()),
            uninterpreted_option: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && self.uninterpreted_option.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileDescriptorSet {
    pub file: Vec<FileDescriptorProto>,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileDescriptorProto {
    pub name: Option<String>,
    pub package: Option<String>,
    pub dependency: Vec<String>,
    pub public_dependency: Vec<i32>,
    pub weak_dependency: Vec<i32>,
    pub message_type: Vec<DescriptorProto>,
    pub enum_type: Vec<EnumDescriptorProto>,
    pub service: Vec<ServiceDescriptorProto>,
    pub extension: Vec<FieldDescriptorProto>,
    pub options: Option<Options>,
    pub syntax: Option<String>,
}

impl FileDescriptorProto {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn package(&self) -> &str {
        self.package.as_deref().unwrap_or("")
    }

    pub fn is_proto3(&self) -> bool {
        self.syntax.as_deref() == Some("proto3")
    }

    /// Names of the dependencies marked `public`.
    pub fn public_dependency_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.public_dependency
            .iter()
            .filter_map(move |&i| self.dependency.get(i as usize).map(String::as_str))
    }

    /// Message addressed by a structural path such as `[4, 0, 3, 1]`.
    pub fn message_at_mut(&mut self, path: &[i32]) -> Option<&mut DescriptorProto> {
        let (first, mut rest) = split_pair(path)?;
        if first[0] as u32 != tags::FILE_MESSAGE_TYPE {
            return None;
        }
        let mut msg = self.message_type.get_mut(first[1] as usize)?;
        while !rest.is_empty() {
            let (pair, tail) = split_pair(rest)?;
            if pair[0] as u32 != tags::MESSAGE_NESTED_TYPE {
                return None;
            }
            msg = msg.nested_type.get_mut(pair[1] as usize)?;
            rest = tail;
        }
        Some(msg)
    }

    /// Field or extension addressed by a structural path such as `[4, 0, 2, 1]` or `[7, 2]`.
    pub fn field_at_mut(&mut self, path: &[i32]) -> Option<&mut FieldDescriptorProto> {
        if path.len() == 2 {
            if path[0] as u32 != tags::FILE_EXTENSION {
                return None;
            }
            return self.extension.get_mut(path[1] as usize);
        }
        if path.len() < 4 {
            return None;
        }
        let (parent, last) = path.split_at(path.len() - 2);
        let msg = self.message_at_mut(parent)?;
        match last[0] as u32 {
            tags::MESSAGE_FIELD => msg.field.get_mut(last[1] as usize),
            tags::MESSAGE_EXTENSION => msg.extension.get_mut(last[1] as usize),
            _ => None,
        }
    }

    /// Method addressed by `[6, service, 2, method]`.
    pub fn method_at_mut(&mut self, path: &[i32]) -> Option<&mut MethodDescriptorProto> {
        match path {
            [6, s, 2, m] => self
                .service
                .get_mut(*s as usize)?
                .method
                .get_mut(*m as usize),
            _ => None,
        }
    }
}

fn split_pair(path: &[i32]) -> Option<(&[i32; 2], &[i32])> {
    if path.len() < 2 {
        return None;
    }
    let (head, tail) = path.split_at(2);
    Some((head.try_into().ok()?, tail))
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DescriptorProto {
    pub name: Option<String>,
    pub field: Vec<FieldDescriptorProto>,
    pub extension: Vec<FieldDescriptorProto>,
    pub nested_type: Vec<DescriptorProto>,
    pub enum_type: Vec<EnumDescriptorProto>,
    pub extension_range: Vec<ExtensionRange>,
    pub oneof_decl: Vec<OneofDescriptorProto>,
    pub options: Option<Options>,
    pub reserved_range: Vec<ReservedRange>,
    pub reserved_name: Vec<String>,
}

impl DescriptorProto {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptorProto> {
        self.field.iter().find(|f| f.name() == name)
    }

    pub fn field_by_number(&self, number: i32) -> Option<&FieldDescriptorProto> {
        self.field.iter().find(|f| f.number == Some(number))
    }

    /// Group fields are looked up by their message type name in text format.
    pub fn field_by_group_name(&self, name: &str) -> Option<&FieldDescriptorProto> {
        self.field.iter().find(|f| {
            f.r#type == Some(Type::Group)
                && f.type_name
                    .as_deref()
                    .and_then(|t| t.rsplit('.').next())
                    == Some(name)
        })
    }

    pub fn is_map_entry(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|o| o.message.get_by_number(7))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Half-open extension range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtensionRange {
    pub start: Option<i32>,
    pub end: Option<i32>,
    pub options: Option<Options>,
}

/// Half-open reserved range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReservedRange {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDescriptorProto {
    pub name: Option<String>,
    pub extendee: Option<String>,
    pub number: Option<i32>,
    pub label: Option<Label>,
    pub r#type: Option<Type>,
    pub type_name: Option<String>,
    pub default_value: Option<String>,
    pub options: Option<Options>,
    pub oneof_index: Option<i32>,
    pub json_name: Option<String>,
    pub proto3_optional: Option<bool>,
}

impl FieldDescriptorProto {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn number(&self) -> i32 {
        self.number.unwrap_or(0)
    }

    pub fn is_repeated(&self) -> bool {
        self.label == Some(Label::Repeated)
    }

    /// `type_name` without the leading dot.
    pub fn type_name_unqualified(&self) -> &str {
        let t = self.type_name.as_deref().unwrap_or("");
        t.strip_prefix('.').unwrap_or(t)
    }

    pub fn extendee_unqualified(&self) -> &str {
        let t = self.extendee.as_deref().unwrap_or("");
        t.strip_prefix('.').unwrap_or(t)
    }

    /// Whether `[packed = true]` was set explicitly.
    pub fn packed_option(&self) -> Option<bool> {
        self.options
            .as_ref()
            .and_then(|o| o.message.get_by_number(2))
            .and_then(|v| v.as_bool())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OneofDescriptorProto {
    pub name: Option<String>,
    pub options: Option<Options>,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnumDescriptorProto {
    pub name: Option<String>,
    pub value: Vec<EnumValueDescriptorProto>,
    pub options: Option<Options>,
    pub reserved_range: Vec<EnumReservedRange>,
    pub reserved_name: Vec<String>,
}

impl EnumDescriptorProto {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn value_by_name(&self, name: &str) -> Option<&EnumValueDescriptorProto> {
        self.value.iter().find(|v| v.name.as_deref() == Some(name))
    }

    pub fn value_by_number(&self, number: i32) -> Option<&EnumValueDescriptorProto> {
        self.value.iter().find(|v| v.number == Some(number))
    }
}

/// Inclusive enum reserved range `[start, end]`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnumReservedRange {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnumValueDescriptorProto {
    pub name: Option<String>,
    pub number: Option<i32>,
    pub options: Option<Options>,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceDescriptorProto {
    pub name: Option<String>,
    pub method: Vec<MethodDescriptorProto>,
    pub options: Option<Options>,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodDescriptorProto {
    pub name: Option<String>,
    pub input_type: Option<String>,
    pub output_type: Option<String>,
    pub options: Option<Options>,
    pub client_streaming: Option<bool>,
    pub server_streaming: Option<bool>,
}

/// Join a scope and a simple name with a dot, handling the empty root scope.
pub fn join_name(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

impl FileDescriptorProto {
    pub fn message_at(&self, path: &[i32]) -> Option<&DescriptorProto> {
        let (first, mut rest) = split_pair(path)?;
        if first[0] as u32 != tags::FILE_MESSAGE_TYPE {
            return None;
        }
        let mut msg = self.message_type.get(first[1] as usize)?;
        while !rest.is_empty() {
            let (pair, tail) = split_pair(rest)?;
            if pair[0] as u32 != tags::MESSAGE_NESTED_TYPE {
                return None;
            }
            msg = msg.nested_type.get(pair[1] as usize)?;
            rest = tail;
        }
        Some(msg)
    }

    pub fn field_at(&self, path: &[i32]) -> Option<&FieldDescriptorProto> {
        if path.len() == 2 {
            if path[0] as u32 != tags::FILE_EXTENSION {
                return None;
            }
            return self.extension.get(path[1] as usize);
        }
        if path.len() < 4 {
            return None;
        }
        let (parent, last) = path.split_at(path.len() - 2);
        let msg = self.message_at(parent)?;
        match last[0] as u32 {
            tags::MESSAGE_FIELD => msg.field.get(last[1] as usize),
            tags::MESSAGE_EXTENSION => msg.extension.get(last[1] as usize),
            _ => None,
        }
    }

    /// Enum addressed by `[5, i]` or a message path followed by `[4, i]`.
    pub fn enum_at(&self, path: &[i32]) -> Option<&EnumDescriptorProto> {
        if path.len() == 2 {
            if path[0] as u32 != tags::FILE_ENUM_TYPE {
                return None;
            }
            return self.enum_type.get(path[1] as usize);
        }
        if path.len() < 4 {
            return None;
        }
        let (parent, last) = path.split_at(path.len() - 2);
        if last[0] as u32 != tags::MESSAGE_ENUM_TYPE {
            return None;
        }
        self.message_at(parent)?.enum_type.get(last[1] as usize)
    }

    /// Every field and extension in the file, each with the full name of the scope it was
    /// declared in.
    pub fn fields_mut(&mut self) -> Vec<(String, &mut FieldDescriptorProto)> {
        let package = self.package().to_string();
        let mut out: Vec<_> = self
            .extension
            .iter_mut()
            .map(|f| (package.clone(), f))
            .collect();
        for msg in &mut self.message_type {
            collect_fields(msg, &package, &mut out);
        }
        out
    }

    /// Every method, with the full name of its service.
    pub fn methods_mut(&mut self) -> Vec<(String, &mut MethodDescriptorProto)> {
        let package = self.package().to_string();
        let mut out = Vec::new();
        for service in &mut self.service {
            let scope = join_name(&package, service.name.as_deref().unwrap_or(""));
            for method in &mut service.method {
                out.push((scope.clone(), method));
            }
        }
        out
    }

    /// Every options message in the file, each with the full name of the scope the owning
    /// element was declared in (the package for file options).
    pub fn options_mut(&mut self) -> Vec<(String, &mut Options)> {
        let package = self.package().to_string();
        let FileDescriptorProto {
            message_type,
            enum_type,
            service,
            extension,
            options,
            ..
        } = self;
        let mut out = Vec::new();
        if let Some(o) = options.as_mut() {
            out.push((package.clone(), o));
        }
        for msg in message_type {
            collect_message_options(msg, &package, &mut out);
        }
        for en in enum_type {
            collect_enum_options(en, &package, &mut out);
        }
        for field in extension {
            if let Some(o) = field.options.as_mut() {
                out.push((package.clone(), o));
            }
        }
        for svc in service {
            let scope = join_name(&package, svc.name.as_deref().unwrap_or(""));
            if let Some(o) = svc.options.as_mut() {
                out.push((package.clone(), o));
            }
            for method in &mut svc.method {
                if let Some(o) = method.options.as_mut() {
                    out.push((scope.clone(), o));
                }
            }
        }
        out
    }
}

fn collect_fields<'p>(
    msg: &'p mut DescriptorProto,
    scope: &str,
    out: &mut Vec<(String, &'p mut FieldDescriptorProto)>,
) {
    let full = join_name(scope, msg.name.as_deref().unwrap_or(""));
    let DescriptorProto {
        field,
        extension,
        nested_type,
        ..
    } = msg;
    for f in field.iter_mut().chain(extension.iter_mut()) {
        out.push((full.clone(), f));
    }
    for nested in nested_type {
        collect_fields(nested, &full, out);
    }
}

fn collect_message_options<'p>(
    msg: &'p mut DescriptorProto,
    scope: &str,
    out: &mut Vec<(String, &'p mut Options)>,
) {
    let full = join_name(scope, msg.name.as_deref().unwrap_or(""));
    let DescriptorProto {
        field,
        extension,
        nested_type,
        enum_type,
        extension_range,
        oneof_decl,
        options,
        ..
    } = msg;
    if let Some(o) = options.as_mut() {
        out.push((scope.to_string(), o));
    }
    for f in field.iter_mut().chain(extension.iter_mut()) {
        if let Some(o) = f.options.as_mut() {
            out.push((full.clone(), o));
        }
    }
    for oneof in oneof_decl {
        if let Some(o) = oneof.options.as_mut() {
            out.push((full.clone(), o));
        }
    }
    for range in extension_range {
        if let Some(o) = range.options.as_mut() {
            out.push((full.clone(), o));
        }
    }
    for en in enum_type {
        collect_enum_options(en, &full, out);
    }
    for nested in nested_type {
        collect_message_options(nested, &full, out);
    }
}

fn collect_enum_options<'p>(
    en: &'p mut EnumDescriptorProto,
    scope: &str,
    out: &mut Vec<(String, &'p mut Options)>,
) {
    let EnumDescriptorProto { value, options, .. } = en;
    if let Some(o) = options.as_mut() {
        out.push((scope.to_string(), o));
    }
    for v in value {
        if let Some(o) = v.options.as_mut() {
            out.push((scope.to_string(), o));
        }
    }
}
