use pretty_assertions::assert_eq;
use protosema::codec::Encode;
use protosema::descriptor::*;
use protosema::{
    BuildOptions, CompileError, Compiler, DiagnosticCollector, FanOutListener, FileSet, TracingListener,
    ValidationCause,
};

fn compile(options: BuildOptions, files: &[(&str, &str)]) -> (FileSet, DiagnosticCollector) {
    let mut compiler = Compiler::new(options);
    for (name, text) in files {
        compiler.add_source(*name, *text).unwrap();
    }
    let mut diagnostics = DiagnosticCollector::new();
    let set = compiler.build(&mut diagnostics).expect("no structural errors");
    (set, diagnostics)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const CYCLE: &[(&str, &str)] = &[
    ("a.proto", "syntax = \"proto3\"; import \"b.proto\"; message A {}"),
    ("b.proto", "syntax = \"proto3\"; import \"a.proto\"; message B {}"),
    ("c.proto", "syntax = \"proto3\"; message C {}"),
];

#[test]
fn test_circular_dependency_reported_once() {
    let (set, diagnostics) = compile(BuildOptions::default(), CYCLE);
    assert_eq!(diagnostics.count(ValidationCause::CircularDependency), 1);
    assert_eq!(diagnostics.validation.len(), 1);
    assert_eq!(set.names().collect::<Vec<_>>(), vec!["c.proto"]);
}

#[test]
fn test_circular_dependency_reported_from_both_sides() {
    let (set, diagnostics) = compile(BuildOptions::default().show_circular_twice(true), CYCLE);
    assert_eq!(diagnostics.count(ValidationCause::CircularDependency), 2);
    let files: Vec<_> = diagnostics.validation.iter().map(|d| d.file.clone().unwrap()).collect();
    assert_eq!(files, vec!["a.proto".to_string(), "b.proto".to_string()]);
    assert!(!set.contains("a.proto"));
    assert!(!set.contains("b.proto"));
}

#[test]
fn test_missing_dependency() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[("a.proto", "syntax = \"proto3\"; import \"nowhere.proto\"; message A {}")],
    );
    assert_eq!(diagnostics.count(ValidationCause::MissingDependency), 1);
    assert_eq!(diagnostics.validation[0].file.as_deref(), Some("a.proto"));
    assert!(set.is_empty());
}

#[test]
fn test_unbuilt_dependency_only_reported_on_request() {
    let files: &[(&str, &str)] = &[
        ("bad.proto", "syntax = \"proto3\"; message Bad { Missing m = 1; }"),
        ("user.proto", "syntax = \"proto3\"; import \"bad.proto\"; message User {}"),
    ];

    let (set, diagnostics) = compile(BuildOptions::default(), files);
    assert_eq!(diagnostics.causes(), vec![ValidationCause::UnresolvedTypeName]);
    assert!(set.is_empty());

    let (set, diagnostics) = compile(BuildOptions::default().show_existing_non_circular(true), files);
    assert_eq!(
        diagnostics.causes(),
        vec![ValidationCause::UnresolvedTypeName, ValidationCause::UnbuiltDependency]
    );
    assert_eq!(diagnostics.validation[1].file.as_deref(), Some("user.proto"));
    assert!(set.is_empty());
}

#[test]
fn test_finalized_dependency_is_not_reported_as_unbuilt() {
    let (set, diagnostics) = compile(
        BuildOptions::default().show_existing_non_circular(true),
        &[
            ("ok.proto", "syntax = \"proto3\"; message Ok {}"),
            ("c.proto", "syntax = \"proto3\"; import \"ok.proto\"; import \"gone.proto\"; message C {}"),
        ],
    );
    assert_eq!(diagnostics.causes(), vec![ValidationCause::MissingDependency]);
    assert!(diagnostics.validation[0].message.contains("gone.proto"));
    assert_eq!(set.names().collect::<Vec<_>>(), vec!["ok.proto"]);
}

#[test]
fn test_syntax_error_leaves_other_files_alone() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[
            ("broken.proto", "syntax = \"proto3\"; message {"),
            ("fine.proto", "syntax = \"proto3\"; message Fine {}"),
        ],
    );
    assert_eq!(diagnostics.syntax.len(), 1);
    assert_eq!(diagnostics.syntax[0].file.as_deref(), Some("broken.proto"));
    assert_eq!(set.names().collect::<Vec<_>>(), vec!["fine.proto"]);
}

#[test]
fn test_reserved_namespace_empties_the_build() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[
            ("ok.proto", "syntax = \"proto3\"; message Ok {}"),
            ("sneaky.proto", "syntax = \"proto3\"; package google.protobuf; message Any {}"),
        ],
    );
    assert_eq!(diagnostics.count(ValidationCause::ReservedSpaceViolation), 1);
    assert_eq!(diagnostics.validation[0].file.as_deref(), Some("sneaky.proto"));
    assert!(set.is_empty());
}

#[test]
fn test_descriptor_proto_input_is_the_meta_schema() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[("google/protobuf/descriptor.proto", "this text is never parsed")],
    );
    assert!(diagnostics.is_empty());
    let file = set.get("google/protobuf/descriptor.proto").unwrap();
    assert!(std::sync::Arc::ptr_eq(file, protosema::meta_schema()));
}

#[test]
fn test_duplicate_input_name() {
    let mut compiler = Compiler::new(BuildOptions::default());
    compiler.add_source("x.proto", "syntax = \"proto3\";").unwrap();
    let err = compiler.add_source("x.proto", "syntax = \"proto3\";").unwrap_err();
    assert!(matches!(err, CompileError::DuplicateFile(name) if name == "x.proto"));
    assert_eq!(compiler.len(), 1);
}

#[test]
fn test_descriptor_bytes_input() {
    let (first, _) = compile(
        BuildOptions::default(),
        &[("lib.proto", "syntax = \"proto3\"; package lib; message Item { string id = 1; }")],
    );
    let bytes = first.get("lib.proto").unwrap().proto().encode_to_vec().unwrap();

    let mut compiler = Compiler::new(BuildOptions::default());
    compiler.add_descriptor_bytes(&bytes).unwrap();
    compiler
        .add_source(
            "app.proto",
            "syntax = \"proto3\"; import \"lib.proto\"; message Order { repeated lib.Item items = 1; }",
        )
        .unwrap();
    let mut diagnostics = DiagnosticCollector::new();
    let set = compiler.build(&mut diagnostics).unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.validation);
    let order = &set.get("app.proto").unwrap().proto().message_type[0];
    assert_eq!(order.field[0].type_name.as_deref(), Some(".lib.Item"));
    assert_eq!(order.field[0].label, Some(Label::Repeated));
}

#[test]
fn test_descriptor_text_input() {
    let mut compiler = Compiler::new(BuildOptions::default());
    compiler
        .add_descriptor_text(
            r#"
            name: "t.proto"
            package: "t"
            message_type {
              name: "T"
              field { name: "x" number: 1 label: LABEL_OPTIONAL type: TYPE_INT32 }
            }
            syntax: "proto3"
            "#,
        )
        .unwrap();
    let mut diagnostics = DiagnosticCollector::new();
    let set = compiler.build(&mut diagnostics).unwrap();
    assert!(diagnostics.is_empty());
    let file = set.get("t.proto").unwrap().proto();
    assert_eq!(file.package.as_deref(), Some("t"));
    assert_eq!(file.message_type[0].field[0].r#type, Some(Type::Int32));
}

#[test]
fn test_descriptor_text_with_unknown_field_is_rejected() {
    let mut compiler = Compiler::new(BuildOptions::default());
    let err = compiler.add_descriptor_text("name: \"t.proto\" colour: 3").unwrap_err();
    assert!(matches!(err, CompileError::Text(_)));
    assert!(compiler.is_empty());
}

#[test]
fn test_fan_out_reaches_every_listener() {
    init_tracing();
    let mut compiler = Compiler::new(BuildOptions::default());
    compiler
        .add_source("a.proto", "syntax = \"proto3\"; message A { Nope n = 1; }")
        .unwrap();

    let mut first = DiagnosticCollector::new();
    let mut second = DiagnosticCollector::new();
    {
        let mut fan_out = FanOutListener::new()
            .with(&mut first)
            .with(&mut second)
            .with(TracingListener);
        compiler.build(&mut fan_out).unwrap();
    }
    assert_eq!(first.validation.len(), 1);
    assert_eq!(first.validation, second.validation);
}

#[test]
fn test_finalized_files_share_dependencies() {
    let (set, diagnostics) = compile(
        BuildOptions::default(),
        &[
            ("base.proto", "syntax = \"proto3\"; message Base {}"),
            ("left.proto", "syntax = \"proto3\"; import \"base.proto\"; message L { Base b = 1; }"),
            ("right.proto", "syntax = \"proto3\"; import \"base.proto\"; message R { Base b = 1; }"),
        ],
    );
    assert!(diagnostics.is_empty());
    let base = set.get("base.proto").unwrap();
    for name in ["left.proto", "right.proto"] {
        let deps = set.get(name).unwrap().dependencies();
        assert!(std::sync::Arc::ptr_eq(&deps[0], base));
    }

    let descriptor_set = set.to_descriptor_set();
    let names: Vec<_> = descriptor_set.file.iter().map(|f| f.name().to_string()).collect();
    assert_eq!(names, vec!["base.proto", "left.proto", "right.proto"]);
}
