//! Parse tree for `.proto` schema files.
//!
//! The tree keeps declarations in source order and records where each one was written.
//! Names are kept exactly as written: a type reference with a leading `.` is fully
//! qualified, anything else still has to be resolved.

use crate::descriptor::{Label, NamePart};
use crate::diagnostics::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Syntax {
    #[default]
    Proto2,
    Proto3,
}

impl Syntax {
    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        }
    }
}

/// One parsed schema file.
#[derive(Debug, Clone, Default)]
pub struct ProtoFile {
    pub syntax: Syntax,
    /// Whether a `syntax = ...;` statement was present.
    pub explicit_syntax: bool,
    pub package: Option<Package>,
    pub imports: Vec<Import>,
    pub options: Vec<OptionDecl>,
    pub items: Vec<TopItem>,
}

#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Default,
    Public,
    Weak,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub path: String,
    pub kind: ImportKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TopItem {
    Message(Message),
    Enum(Enum),
    Service(Service),
    Extend(Extend),
}

/// Literal value of an option assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Identifier, including `true`, `false`, `inf` and `nan`.
    Ident(String),
    /// Integer literal; `text` is the literal as written, sign included.
    Int {
        negative: bool,
        magnitude: u64,
        text: String,
    },
    Float { value: f64, text: String },
    String(Vec<u8>),
    /// Raw text between the braces of a `{ ... }` value.
    Aggregate(String),
}

impl Constant {
    /// Source text of the literal, used for `default` values.
    pub fn source_text(&self) -> String {
        match self {
            Constant::Ident(s) => s.clone(),
            Constant::Int { text, .. } | Constant::Float { text, .. } => text.clone(),
            Constant::String(b) => String::from_utf8_lossy(b).into_owned(),
            Constant::Aggregate(s) => s.clone(),
        }
    }
}

/// `option foo.(bar).baz = value;` or one entry of a `[...]` list.
#[derive(Debug, Clone)]
pub struct OptionDecl {
    pub name: Vec<NamePart>,
    pub value: Constant,
    pub span: Span,
}

impl OptionDecl {
    /// The option's name when it is a single plain segment (`deprecated`, `default`).
    pub fn simple_name(&self) -> Option<&str> {
        match self.name.as_slice() {
            [part] if !part.is_extension => Some(&part.name_part),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub name: String,
    pub items: Vec<MessageItem>,
    pub span: Span,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub enum MessageItem {
    Field(Field),
    Group(Group),
    Map(MapField),
    Oneof(Oneof),
    Message(Message),
    Enum(Enum),
    Extend(Extend),
    Extensions(Extensions),
    Reserved(Reserved),
    Option(OptionDecl),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub label: Option<Label>,
    /// Scalar keyword or (possibly dotted, possibly `.`-prefixed) type name.
    pub type_name: String,
    pub name: String,
    pub number: i32,
    pub options: Vec<OptionDecl>,
    pub span: Span,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub label: Option<Label>,
    /// Capitalized name; the field itself is named by its lowercase form.
    pub name: String,
    pub number: i32,
    pub options: Vec<OptionDecl>,
    pub items: Vec<MessageItem>,
    pub span: Span,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MapField {
    pub key_type: String,
    pub value_type: String,
    pub name: String,
    pub number: i32,
    pub options: Vec<OptionDecl>,
    pub span: Span,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Oneof {
    pub name: String,
    pub items: Vec<OneofItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum OneofItem {
    Field(Field),
    Group(Group),
    Option(OptionDecl),
}

/// `extend Foo { ... }`
#[derive(Debug, Clone)]
pub struct Extend {
    pub extendee: String,
    pub items: Vec<ExtendItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExtendItem {
    Field(Field),
    Group(Group),
}

/// `extensions 100 to 199, 500 to max [opts];` Ranges are inclusive as written.
#[derive(Debug, Clone)]
pub struct Extensions {
    pub ranges: Vec<(i32, i32)>,
    pub options: Vec<OptionDecl>,
    pub span: Span,
}

/// `reserved 2, 15, 9 to 11;` or `reserved "foo", "bar";` Ranges are inclusive as written.
#[derive(Debug, Clone)]
pub struct Reserved {
    pub ranges: Vec<(i32, i32)>,
    pub names: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Enum {
    pub name: String,
    pub items: Vec<EnumItem>,
    pub span: Span,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub enum EnumItem {
    Value(EnumValue),
    Option(OptionDecl),
    Reserved(Reserved),
}

#[derive(Debug, Clone)]
pub struct EnumValue {
    pub name: String,
    pub number: i32,
    pub options: Vec<OptionDecl>,
    pub span: Span,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub items: Vec<ServiceItem>,
    pub span: Span,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ServiceItem {
    Rpc(Rpc),
    Option(OptionDecl),
}

#[derive(Debug, Clone)]
pub struct Rpc {
    pub name: String,
    pub input_type: String,
    pub client_streaming: bool,
    pub output_type: String,
    pub server_streaming: bool,
    pub options: Vec<OptionDecl>,
    pub span: Span,
    pub comment: Option<String>,
}
