//! Protosema: the semantic front end of a protobuf-style schema compiler.
//!
//! Schema text is parsed, walked into descriptor protos with local validation, resolved
//! across files in dependency order, and brought into canonical form: every type reference
//! fully qualified and every option interpreted against the `descriptor.proto` meta-schema.
//! Problems are reported through an [`ErrorListener`] so one build can surface all of them.
//!
//! # Quick Start
//!
//! ```rust
//! use protosema::{BuildOptions, Compiler, DiagnosticCollector};
//!
//! let mut compiler = Compiler::new(BuildOptions::default());
//! compiler.add_source("shapes.proto", r#"
//!     syntax = "proto3";
//!     package shapes;
//!
//!     message Point { int32 x = 1; int32 y = 2; }
//!     message Polygon { repeated Point points = 1; }
//! "#).unwrap();
//!
//! let mut diagnostics = DiagnosticCollector::new();
//! let files = compiler.build(&mut diagnostics).unwrap();
//! assert!(diagnostics.is_empty());
//!
//! let file = files.get("shapes.proto").unwrap();
//! let polygon = &file.proto().message_type[1];
//! assert_eq!(polygon.field[0].type_name.as_deref(), Some(".shapes.Point"));
//! ```

pub mod error;
pub mod config;
pub mod diagnostics;
pub mod descriptor;
pub mod value;
pub mod codec;
pub mod parser;
pub mod scope;
pub mod symbols;
pub mod ranges;
pub mod builder;
pub mod pool;
pub mod registry;
pub mod options;
pub mod text_format;
pub mod canonical;
pub mod meta;
pub mod compiler;

pub use builder::{build_file, SemanticOutput, UnresolvedReference};
pub use canonical::{canonicalize, is_canonical, Canonicalizer};
pub use compiler::{Compiler, FileSet};
pub use config::BuildOptions;
pub use descriptor::{FileDescriptorProto, FileDescriptorSet, Options, OptionsKind};
pub use diagnostics::{
    Diagnostic, DiagnosticCollector, ErrorListener, FanOutListener, FileListener, Span,
    TracingListener, ValidationCause,
};
pub use error::{BuildError, CompileError, DecodeError, EncodeError, ParseError, Result};
pub use meta::meta_schema;
pub use options::OptionResolver;
pub use pool::{FileDescriptor, Pool};
pub use registry::{build_full_registry, registry_for, ExtensionInfo, ExtensionRegistry};
pub use value::{DynamicMessage, Value};
