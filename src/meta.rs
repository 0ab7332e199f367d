//! The meta-schema: `google/protobuf/descriptor.proto`, built once per process.
//!
//! Options messages are typed against it, and every build that names it as a dependency
//! receives this same instance rather than a fresh copy.

use std::sync::{Arc, OnceLock};

use crate::builder::build_file;
use crate::canonical::Canonicalizer;
use crate::config::BuildOptions;
use crate::descriptor::META_SCHEMA_FILE;
use crate::diagnostics::DiagnosticCollector;
use crate::error::CompileError;
use crate::parser;
use crate::pool::FileDescriptor;

/// Source of the meta-schema. Proto2, without editions features.
pub const DESCRIPTOR_PROTO: &str = r#"
syntax = "proto2";

package google.protobuf;

option go_package = "google.golang.org/protobuf/types/descriptorpb";
option java_package = "com.google.protobuf";
option java_outer_classname = "DescriptorProtos";
option csharp_namespace = "Google.Protobuf.Reflection";
option objc_class_prefix = "GPB";
option cc_enable_arenas = true;
option optimize_for = SPEED;

// The protocol compiler can output a FileDescriptorSet containing the .proto
// files it parses.
message FileDescriptorSet {
  repeated FileDescriptorProto file = 1;
}

// Describes a complete .proto file.
message FileDescriptorProto {
  optional string name = 1;
  optional string package = 2;
  repeated string dependency = 3;
  repeated int32 public_dependency = 10;
  repeated int32 weak_dependency = 11;
  repeated DescriptorProto message_type = 4;
  repeated EnumDescriptorProto enum_type = 5;
  repeated ServiceDescriptorProto service = 6;
  repeated FieldDescriptorProto extension = 7;
  optional FileOptions options = 8;
  optional SourceCodeInfo source_code_info = 9;
  optional string syntax = 12;
}

// Describes a message type.
message DescriptorProto {
  optional string name = 1;

  repeated FieldDescriptorProto field = 2;
  repeated FieldDescriptorProto extension = 6;

  repeated DescriptorProto nested_type = 3;
  repeated EnumDescriptorProto enum_type = 4;

  message ExtensionRange {
    optional int32 start = 1;
    optional int32 end = 2;

    optional ExtensionRangeOptions options = 3;
  }
  repeated ExtensionRange extension_range = 5;

  repeated OneofDescriptorProto oneof_decl = 8;

  optional MessageOptions options = 7;

  message ReservedRange {
    optional int32 start = 1;
    optional int32 end = 2;
  }
  repeated ReservedRange reserved_range = 9;
  repeated string reserved_name = 10;
}

message ExtensionRangeOptions {
  repeated UninterpretedOption uninterpreted_option = 999;

  extensions 1000 to max;
}

// Describes a field within a message.
message FieldDescriptorProto {
  enum Type {
    TYPE_DOUBLE = 1;
    TYPE_FLOAT = 2;
    TYPE_INT64 = 3;
    TYPE_UINT64 = 4;
    TYPE_INT32 = 5;
    TYPE_FIXED64 = 6;
    TYPE_FIXED32 = 7;
    TYPE_BOOL = 8;
    TYPE_STRING = 9;
    TYPE_GROUP = 10;
    TYPE_MESSAGE = 11;
    TYPE_BYTES = 12;
    TYPE_UINT32 = 13;
    TYPE_ENUM = 14;
    TYPE_SFIXED32 = 15;
    TYPE_SFIXED64 = 16;
    TYPE_SINT32 = 17;
    TYPE_SINT64 = 18;
  }

  enum Label {
    LABEL_OPTIONAL = 1;
    LABEL_REQUIRED = 2;
    LABEL_REPEATED = 3;
  }

  optional string name = 1;
  optional int32 number = 3;
  optional Label label = 4;
  optional Type type = 5;
  optional string type_name = 6;
  optional string extendee = 2;
  optional string default_value = 7;
  optional int32 oneof_index = 9;
  optional string json_name = 10;
  optional FieldOptions options = 8;
  optional bool proto3_optional = 17;
}

// Describes a oneof.
message OneofDescriptorProto {
  optional string name = 1;
  optional OneofOptions options = 2;
}

// Describes an enum type.
message EnumDescriptorProto {
  optional string name = 1;

  repeated EnumValueDescriptorProto value = 2;

  optional EnumOptions options = 3;

  // Inclusive on both ends, unlike message reserved ranges.
  message EnumReservedRange {
    optional int32 start = 1;
    optional int32 end = 2;
  }
  repeated EnumReservedRange reserved_range = 4;
  repeated string reserved_name = 5;
}

// Describes a value within an enum.
message EnumValueDescriptorProto {
  optional string name = 1;
  optional int32 number = 2;

  optional EnumValueOptions options = 3;
}

// Describes a service.
message ServiceDescriptorProto {
  optional string name = 1;
  repeated MethodDescriptorProto method = 2;

  optional ServiceOptions options = 3;
}

// Describes a method of a service.
message MethodDescriptorProto {
  optional string name = 1;

  optional string input_type = 2;
  optional string output_type = 3;

  optional MethodOptions options = 4;

  optional bool client_streaming = 5 [default = false];
  optional bool server_streaming = 6 [default = false];
}

message FileOptions {
  optional string java_package = 1;
  optional string java_outer_classname = 8;
  optional bool java_multiple_files = 10 [default = false];
  optional bool java_generate_equals_and_hash = 20 [deprecated = true];
  optional bool java_string_check_utf8 = 27 [default = false];

  enum OptimizeMode {
    SPEED = 1;
    CODE_SIZE = 2;
    LITE_RUNTIME = 3;
  }
  optional OptimizeMode optimize_for = 9 [default = SPEED];

  optional string go_package = 11;

  optional bool cc_generic_services = 16 [default = false];
  optional bool java_generic_services = 17 [default = false];
  optional bool py_generic_services = 18 [default = false];
  reserved 42;

  optional bool deprecated = 23 [default = false];
  optional bool cc_enable_arenas = 31 [default = true];

  optional string objc_class_prefix = 36;
  optional string csharp_namespace = 37;
  optional string swift_prefix = 39;
  optional string php_class_prefix = 40;
  optional string php_namespace = 41;
  optional string php_metadata_namespace = 44;
  optional string ruby_package = 45;

  repeated UninterpretedOption uninterpreted_option = 999;

  extensions 1000 to max;

  reserved 38;
}

message MessageOptions {
  optional bool message_set_wire_format = 1 [default = false];
  optional bool no_standard_descriptor_accessor = 2 [default = false];
  optional bool deprecated = 3 [default = false];

  reserved 4, 5, 6;

  optional bool map_entry = 7;

  reserved 8, 9;

  optional bool deprecated_legacy_json_field_conflicts = 11 [deprecated = true];

  repeated UninterpretedOption uninterpreted_option = 999;

  extensions 1000 to max;
}

message FieldOptions {
  optional CType ctype = 1 [default = STRING];
  enum CType {
    STRING = 0;
    CORD = 1;
    STRING_PIECE = 2;
  }
  optional bool packed = 2;
  optional JSType jstype = 6 [default = JS_NORMAL];
  enum JSType {
    JS_NORMAL = 0;
    JS_STRING = 1;
    JS_NUMBER = 2;
  }
  optional bool lazy = 5 [default = false];
  optional bool unverified_lazy = 15 [default = false];
  optional bool deprecated = 3 [default = false];
  optional bool weak = 10 [default = false];
  optional bool debug_redact = 16 [default = false];

  enum OptionRetention {
    RETENTION_UNKNOWN = 0;
    RETENTION_RUNTIME = 1;
    RETENTION_SOURCE = 2;
  }
  optional OptionRetention retention = 17;

  enum OptionTargetType {
    TARGET_TYPE_UNKNOWN = 0;
    TARGET_TYPE_FILE = 1;
    TARGET_TYPE_EXTENSION_RANGE = 2;
    TARGET_TYPE_MESSAGE = 3;
    TARGET_TYPE_FIELD = 4;
    TARGET_TYPE_ONEOF = 5;
    TARGET_TYPE_ENUM = 6;
    TARGET_TYPE_ENUM_ENTRY = 7;
    TARGET_TYPE_SERVICE = 8;
    TARGET_TYPE_METHOD = 9;
  }
  repeated OptionTargetType targets = 19;

  repeated UninterpretedOption uninterpreted_option = 999;

  extensions 1000 to max;

  reserved 4, 18;
}

message OneofOptions {
  repeated UninterpretedOption uninterpreted_option = 999;

  extensions 1000 to max;
}

message EnumOptions {
  optional bool allow_alias = 2;
  optional bool deprecated = 3 [default = false];

  reserved 5;

  optional bool deprecated_legacy_json_field_conflicts = 6 [deprecated = true];

  repeated UninterpretedOption uninterpreted_option = 999;

  extensions 1000 to max;
}

message EnumValueOptions {
  optional bool deprecated = 1 [default = false];
  optional bool debug_redact = 3 [default = false];

  repeated UninterpretedOption uninterpreted_option = 999;

  extensions 1000 to max;
}

message ServiceOptions {
  optional bool deprecated = 33 [default = false];

  repeated UninterpretedOption uninterpreted_option = 999;

  extensions 1000 to max;
}

message MethodOptions {
  optional bool deprecated = 33 [default = false];

  enum IdempotencyLevel {
    IDEMPOTENCY_UNKNOWN = 0;
    NO_SIDE_EFFECTS = 1;
    IDEMPOTENT = 2;
  }
  optional IdempotencyLevel idempotency_level = 34 [default = IDEMPOTENCY_UNKNOWN];

  repeated UninterpretedOption uninterpreted_option = 999;

  extensions 1000 to max;
}

// An option whose name has not been resolved yet.
message UninterpretedOption {
  message NamePart {
    required string name_part = 1;
    required bool is_extension = 2;
  }
  repeated NamePart name = 2;

  optional string identifier_value = 3;
  optional uint64 positive_int_value = 4;
  optional int64 negative_int_value = 5;
  optional double double_value = 6;
  optional bytes string_value = 7;
  optional string aggregate_value = 8;
}

// Locations of declarations in the source file.
message SourceCodeInfo {
  repeated Location location = 1;
  message Location {
    repeated int32 path = 1 [packed = true];
    repeated int32 span = 2 [packed = true];
    optional string leading_comments = 3;
    optional string trailing_comments = 4;
    repeated string leading_detached_comments = 6;
  }
}

// Relates generated code back to the source that produced it.
message GeneratedCodeInfo {
  repeated Annotation annotation = 1;
  message Annotation {
    repeated int32 path = 1 [packed = true];
    optional string source_file = 2;
    optional int32 begin = 3;
    optional int32 end = 4;
    enum Semantic {
      NONE = 0;
      SET = 1;
      ALIAS = 2;
    }
    optional Semantic semantic = 5;
  }
}
"#;

/// The process-wide meta-schema descriptor.
///
/// Built on first use from [`DESCRIPTOR_PROTO`]; every later call returns the same `Arc`.
pub fn meta_schema() -> &'static Arc<FileDescriptor> {
    static META: OnceLock<Arc<FileDescriptor>> = OnceLock::new();
    META.get_or_init(|| {
        let file = build_meta().expect("embedded descriptor.proto must build cleanly");
        Arc::new(file)
    })
}

fn build_meta() -> Result<FileDescriptor, CompileError> {
    let tree = parser::parse(DESCRIPTOR_PROTO)?;
    let mut diagnostics = DiagnosticCollector::new();
    let output = build_file(META_SCHEMA_FILE, &tree, &mut diagnostics, None).map_err(|source| {
        CompileError::Build {
            file: META_SCHEMA_FILE.to_string(),
            source,
        }
    })?;
    if let Some(reference) = output.unresolved.first() {
        return Err(CompileError::Text(format!(
            "meta-schema references undefined {} \"{}\"",
            reference.describe(),
            reference.name
        )));
    }
    let options = BuildOptions::default();
    let proto = Canonicalizer::standalone(&[], &options)
        .canonicalize(output.file, &mut diagnostics)
        .map_err(|source| CompileError::Build {
            file: META_SCHEMA_FILE.to_string(),
            source,
        })?;
    if let Some(first) = diagnostics.validation.first().or(diagnostics.syntax.first()) {
        return Err(CompileError::Text(first.to_string()));
    }
    tracing::debug!(file = META_SCHEMA_FILE, messages = proto.message_type.len(), "built meta-schema");
    Ok(FileDescriptor::new(proto, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::is_canonical;
    use crate::descriptor::*;
    use crate::pool::TypeLookup;
    use crate::value::Value;

    #[test]
    fn test_meta_schema_is_a_singleton() {
        assert!(Arc::ptr_eq(meta_schema(), meta_schema()));
        assert_eq!(meta_schema().name(), META_SCHEMA_FILE);
        assert_eq!(meta_schema().package(), RESERVED_PACKAGE);
    }

    #[test]
    fn test_meta_schema_is_canonical() {
        let meta = meta_schema();
        assert!(is_canonical(meta.proto(), &BuildOptions::default()));
        for kind in [
            OptionsKind::File,
            OptionsKind::Message,
            OptionsKind::Field,
            OptionsKind::Oneof,
            OptionsKind::Enum,
            OptionsKind::EnumValue,
            OptionsKind::Service,
            OptionsKind::Method,
            OptionsKind::ExtensionRange,
        ] {
            assert!(meta.find_message(kind.type_name()).is_some(), "{}", kind.type_name());
        }
    }

    #[test]
    fn test_meta_schema_options_interpreted() {
        let meta = meta_schema();
        let options = meta.proto().options.as_ref().unwrap();
        assert!(options.uninterpreted_option.is_empty());
        assert_eq!(options.message.get_by_number(1), Some(&Value::String("com.google.protobuf".into())));
        assert_eq!(options.message.get_by_number(9), Some(&Value::Enum(1)));

        let location = meta.find_message("google.protobuf.SourceCodeInfo.Location").unwrap();
        assert_eq!(location.field_by_name("path").unwrap().packed_option(), Some(true));
    }
}
