use pretty_assertions::assert_eq;
use protosema::descriptor::*;
use protosema::{BuildOptions, Compiler, DiagnosticCollector, FileSet, ValidationCause};

fn compile(options: BuildOptions, files: &[(&str, &str)]) -> (FileSet, DiagnosticCollector) {
    let mut compiler = Compiler::new(options);
    for (name, text) in files {
        compiler.add_source(*name, *text).unwrap();
    }
    let mut diagnostics = DiagnosticCollector::new();
    let set = compiler.build(&mut diagnostics).expect("no structural errors");
    (set, diagnostics)
}

fn field_type<'a>(set: &'a FileSet, file: &str, message: usize, field: usize) -> Option<&'a str> {
    set.get(file).unwrap().proto().message_type[message].field[field]
        .type_name
        .as_deref()
}

#[test]
fn test_forward_reference_in_same_file() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[(
            "a.proto",
            r#"
            syntax = "proto3";
            package a;
            message First { Later later = 1; Kind kind = 2; }
            message Later {}
            enum Kind { KIND_UNSET = 0; }
            "#,
        )],
    );
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.validation);
    assert_eq!(field_type(&set, "a.proto", 0, 0), Some(".a.Later"));
    let first = &set.get("a.proto").unwrap().proto().message_type[0];
    assert_eq!(first.field[1].r#type, Some(Type::Enum));
    assert_eq!(first.field[0].r#type, Some(Type::Message));
}

#[test]
fn test_direct_dependency_resolves() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[
            ("base.proto", "syntax = \"proto3\"; package base; message Id { string v = 1; }"),
            (
                "user.proto",
                "syntax = \"proto3\"; package app.user; import \"base.proto\"; message User { base.Id id = 1; }",
            ),
        ],
    );
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.validation);
    assert_eq!(field_type(&set, "user.proto", 0, 0), Some(".base.Id"));
}

#[test]
fn test_private_dependency_of_dependency_is_invisible() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[
            ("deep.proto", "syntax = \"proto3\"; message Deep {}"),
            ("mid.proto", "syntax = \"proto3\"; import \"deep.proto\"; message Mid { Deep d = 1; }"),
            ("top.proto", "syntax = \"proto3\"; import \"mid.proto\"; message Top { Deep d = 1; }"),
        ],
    );
    assert_eq!(diagnostics.count(ValidationCause::UnresolvedTypeName), 1);
    assert_eq!(diagnostics.validation[0].file.as_deref(), Some("top.proto"));
    assert!(set.contains("mid.proto"));
    assert!(!set.contains("top.proto"));
}

#[test]
fn test_public_dependency_propagates() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[
            ("deep.proto", "syntax = \"proto3\"; message Deep {}"),
            ("mid.proto", "syntax = \"proto3\"; import public \"deep.proto\";"),
            ("top.proto", "syntax = \"proto3\"; import \"mid.proto\"; message Top { Deep d = 1; }"),
        ],
    );
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.validation);
    assert_eq!(field_type(&set, "top.proto", 0, 0), Some(".Deep"));
}

#[test]
fn test_inner_scope_wins_over_outer() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[(
            "s.proto",
            r#"
            syntax = "proto3";
            package p;
            message Thing {}
            message Box {
              message Thing {}
              Thing inner = 1;
              .p.Thing outer = 2;
            }
            "#,
        )],
    );
    assert!(diagnostics.is_empty());
    assert_eq!(field_type(&set, "s.proto", 1, 0), Some(".p.Box.Thing"));
    assert_eq!(field_type(&set, "s.proto", 1, 1), Some(".p.Thing"));
}

#[test]
fn test_method_types_and_extendees_resolve_across_files() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[
            (
                "msgs.proto",
                "syntax = \"proto2\"; package m; message Req { extensions 100 to 199; } message Resp {}",
            ),
            (
                "svc.proto",
                r#"
                syntax = "proto2";
                package m.svc;
                import "msgs.proto";
                extend Req { optional string tag = 100; }
                service Api { rpc Call (Req) returns (stream Resp); }
                "#,
            ),
        ],
    );
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.validation);
    let svc = set.get("svc.proto").unwrap().proto();
    assert_eq!(svc.extension[0].extendee.as_deref(), Some(".m.Req"));
    let method = &svc.service[0].method[0];
    assert_eq!(method.input_type.as_deref(), Some(".m.Req"));
    assert_eq!(method.output_type.as_deref(), Some(".m.Resp"));
    assert_eq!(method.server_streaming, Some(true));
}

#[test]
fn test_qualified_name_strictness() {
    let files = [("q.proto", "syntax = \"proto3\"; message M { .nowhere.Gone g = 1; }")];

    let (strict, diagnostics) = compile(BuildOptions::default(), &files);
    assert_eq!(diagnostics.count(ValidationCause::UnresolvedTypeName), 1);
    assert!(strict.is_empty());

    let (lenient, diagnostics) = compile(BuildOptions::default().strict_qualified_names(false), &files);
    assert!(diagnostics.is_empty());
    assert_eq!(field_type(&lenient, "q.proto", 0, 0), Some(".nowhere.Gone"));
}

#[test]
fn test_duplicate_symbol_across_files() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[
            ("one.proto", "syntax = \"proto3\"; package x; message Dup {}"),
            ("two.proto", "syntax = \"proto3\"; package x; import \"one.proto\"; message Dup {}"),
        ],
    );
    assert_eq!(diagnostics.count(ValidationCause::DuplicateName), 1);
    assert!(set.contains("one.proto"));
    assert!(!set.contains("two.proto"));
}

#[test]
fn test_duplicate_extension_number_across_files() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[
            ("base.proto", "syntax = \"proto2\"; message Base { extensions 10 to 20; }"),
            ("e1.proto", "syntax = \"proto2\"; import \"base.proto\"; extend Base { optional int32 a = 10; }"),
            (
                "e2.proto",
                "syntax = \"proto2\"; import \"base.proto\"; import \"e1.proto\"; extend Base { optional int32 b = 10; }",
            ),
        ],
    );
    assert_eq!(diagnostics.count(ValidationCause::DuplicateExtensionNumber), 1);
    assert_eq!(set.names().collect::<Vec<_>>(), vec!["base.proto", "e1.proto"]);
}

#[test]
fn test_extensions_reexported_publicly_are_registered() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[
            (
                "opts.proto",
                r#"
                syntax = "proto2";
                package opts;
                import "google/protobuf/descriptor.proto";
                extend google.protobuf.FieldOptions { optional int32 width = 50100; }
                "#,
            ),
            ("hub.proto", "syntax = \"proto2\"; package hub; import public \"opts.proto\";"),
            (
                "app.proto",
                "syntax = \"proto2\"; package app; import \"hub.proto\"; message U { optional int32 x = 1 [(opts.width) = 7]; }",
            ),
            (
                "clash.proto",
                r#"
                syntax = "proto2";
                package clash;
                import "google/protobuf/descriptor.proto";
                import "hub.proto";
                extend google.protobuf.FieldOptions { optional int32 wide = 50100; }
                "#,
            ),
        ],
    );
    assert_eq!(diagnostics.causes(), vec![ValidationCause::DuplicateExtensionNumber]);
    assert!(diagnostics.validation[0].message.contains("opts.width"));
    assert!(!set.contains("clash.proto"));

    let field = &set.get("app.proto").unwrap().proto().message_type[0].field[0];
    let width = field.options.as_ref().unwrap().message.get_by_number(50100);
    assert_eq!(width, Some(&protosema::Value::I32(7)));
}
