use std::sync::Arc;

use pretty_assertions::assert_eq;
use protosema::descriptor::*;
use protosema::pool::FileDescriptor;
use protosema::{build_file, canonicalize, is_canonical, parser, BuildOptions, Compiler, DiagnosticCollector};

fn library() -> Arc<FileDescriptor> {
    let mut compiler = Compiler::new(BuildOptions::default());
    compiler
        .add_source(
            "lib.proto",
            r#"
            syntax = "proto2";
            package lib;
            import "google/protobuf/descriptor.proto";
            message Item { optional string id = 1; }
            extend google.protobuf.FieldOptions { optional string label = 51000; }
            "#,
        )
        .unwrap();
    let mut diagnostics = DiagnosticCollector::new();
    let set = compiler.build(&mut diagnostics).unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.validation);
    set.get("lib.proto").unwrap().clone()
}

fn local_build(name: &str, src: &str) -> FileDescriptorProto {
    let tree = parser::parse(src).unwrap();
    let mut diagnostics = DiagnosticCollector::new();
    let output = build_file(name, &tree, &mut diagnostics, None).unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.validation);
    output.file
}

const APP: &str = r#"
syntax = "proto2";
package lib.app;
import "lib.proto";
message Order {
  repeated Item items = 1 [(label) = "line items"];
  optional double total = 2 [default = 1e3];
  optional int32 count = 3 [default = 0x10];
  optional float ratio = 4 [default = 0.1];
  optional sint64 delta = 5 [default = -010];
}
"#;

#[test]
fn test_canonicalize_qualifies_and_interprets() {
    let deps = vec![library()];
    let options = BuildOptions::default();
    let raw = local_build("app.proto", APP);
    assert!(!is_canonical(&raw, &options));

    let mut diagnostics = DiagnosticCollector::new();
    let canonical = canonicalize(raw, &deps, &options, &mut diagnostics).unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.validation);
    assert!(is_canonical(&canonical, &options));

    let items = &canonical.message_type[0].field[0];
    assert_eq!(items.type_name.as_deref(), Some(".lib.Item"));
    assert_eq!(items.r#type, Some(Type::Message));
    let label = items.options.as_ref().unwrap().message.get_by_number(51000);
    assert_eq!(label.and_then(|v| v.as_str()), Some("line items"));
}

#[test]
fn test_canonicalize_is_idempotent() {
    let deps = vec![library()];
    let options = BuildOptions::default();
    let mut diagnostics = DiagnosticCollector::new();
    let once = canonicalize(local_build("app.proto", APP), &deps, &options, &mut diagnostics).unwrap();
    let twice = canonicalize(once.clone(), &deps, &options, &mut diagnostics).unwrap();
    assert!(diagnostics.is_empty());
    assert_eq!(once, twice);
}

#[test]
fn test_protoc_compatible_canonicalize_is_idempotent() {
    let deps = vec![library()];
    let options = BuildOptions::default().protoc_compatible(true);
    let src = r#"
        syntax = "proto2";
        package lib.app;
        import "lib.proto";
        message Signed {
          optional float zero = 1 [default = -0.0];
          optional double tiny = 2 [default = -0];
          optional double octal = 3 [default = 010];
          optional int32 negative_zero = 4 [default = -0];
        }
    "#;
    let mut diagnostics = DiagnosticCollector::new();
    let once = canonicalize(local_build("signed.proto", src), &deps, &options, &mut diagnostics).unwrap();
    let twice = canonicalize(once.clone(), &deps, &options, &mut diagnostics).unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.validation);
    assert_eq!(once, twice);

    let defaults: Vec<_> = once.message_type[0]
        .field
        .iter()
        .filter_map(|f| f.default_value.clone())
        .collect();
    assert_eq!(defaults, vec!["-0", "-0", "8", "0"]);
}

#[test]
fn test_defaults_kept_as_written() {
    let deps = vec![library()];
    let mut diagnostics = DiagnosticCollector::new();
    let canonical = canonicalize(
        local_build("app.proto", APP),
        &deps,
        &BuildOptions::default(),
        &mut diagnostics,
    )
    .unwrap();
    let defaults: Vec<_> = canonical.message_type[0]
        .field
        .iter()
        .map(|f| f.default_value.clone())
        .collect();
    assert_eq!(
        defaults,
        vec![
            None,
            Some("1e3".to_string()),
            Some("0x10".to_string()),
            Some("0.1".to_string()),
            Some("-010".to_string()),
        ]
    );
}

#[test]
fn test_protoc_compatible_defaults() {
    let deps = vec![library()];
    let mut diagnostics = DiagnosticCollector::new();
    let canonical = canonicalize(
        local_build("app.proto", APP),
        &deps,
        &BuildOptions::default().protoc_compatible(true),
        &mut diagnostics,
    )
    .unwrap();
    let defaults: Vec<_> = canonical.message_type[0]
        .field
        .iter()
        .filter_map(|f| f.default_value.clone())
        .collect();
    assert_eq!(defaults, vec!["1000", "16", "0.1", "-8"]);
}

#[test]
fn test_compiled_files_are_canonical() {
    let lib = library();
    assert!(is_canonical(lib.proto(), &BuildOptions::default()));
    assert!(is_canonical(protosema::meta_schema().proto(), &BuildOptions::default()));
}
