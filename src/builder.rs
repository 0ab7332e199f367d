//! The semantic builder: one walk over a parse tree producing a descriptor proto.
//!
//! Local problems (duplicate names or numbers, bad extension ranges, fields in extension or
//! reserved ranges, repeated option names) are reported through the listener and the
//! offending element is left out; the walk continues. Type names are collected as
//! [`UnresolvedReference`]s and resolved once the whole symbol tree is known. Whatever cannot
//! be resolved locally is handed back for cross-file resolution.

use std::collections::{HashMap, HashSet};

use crate::descriptor::*;
use crate::diagnostics::{Diagnostic, ErrorListener, LocationSink, Span, ValidationCause};
use crate::error::BuildError;
use crate::parser::ast;
use crate::ranges::{ExtensionRangeSet, RangeViolation};
use crate::scope::{Builder, ScopeStack};
use crate::symbols::{NodeId, SymbolKind, SymbolTable};
use crate::text_format::c_escape;
use crate::value::Value;

/// What a reference names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    FieldType,
    Extendee,
    MethodInput,
    MethodOutput,
}

impl ReferenceKind {
    pub fn accepts(&self, kind: SymbolKind) -> bool {
        match self {
            ReferenceKind::FieldType => kind.is_type(),
            _ => kind == SymbolKind::Message,
        }
    }
}

/// A type name written in the schema that still has to be turned into a full name.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedReference {
    /// The name as written, possibly with a leading `.`.
    pub name: String,
    /// Full name of the scope the name was written in.
    pub scope: String,
    /// The same scope as a node of the file's symbol table.
    pub scope_node: NodeId,
    /// Structural path of the field or method carrying the name.
    pub path: Vec<i32>,
    pub kind: ReferenceKind,
    pub span: Option<Span>,
}

impl UnresolvedReference {
    /// Write the resolved name into the element at `path`. Returns `false` if the path does
    /// not address an element of the right kind.
    pub fn apply(&self, file: &mut FileDescriptorProto, full_name: &str, kind: SymbolKind) -> bool {
        let qualified = format!(".{}", full_name);
        match self.kind {
            ReferenceKind::FieldType => match file.field_at_mut(&self.path) {
                Some(field) => {
                    field.type_name = Some(qualified);
                    if field.r#type != Some(Type::Group) {
                        field.r#type = Some(if kind == SymbolKind::Enum {
                            Type::Enum
                        } else {
                            Type::Message
                        });
                    }
                    true
                }
                None => false,
            },
            ReferenceKind::Extendee => match file.field_at_mut(&self.path) {
                Some(field) => {
                    field.extendee = Some(qualified);
                    true
                }
                None => false,
            },
            ReferenceKind::MethodInput | ReferenceKind::MethodOutput => {
                match file.method_at_mut(&self.path) {
                    Some(method) if self.kind == ReferenceKind::MethodInput => {
                        method.input_type = Some(qualified);
                        true
                    }
                    Some(method) => {
                        method.output_type = Some(qualified);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    pub fn describe(&self) -> &'static str {
        match self.kind {
            ReferenceKind::FieldType => "type",
            ReferenceKind::Extendee => "extendee",
            ReferenceKind::MethodInput => "input type",
            ReferenceKind::MethodOutput => "output type",
        }
    }
}

/// Result of walking one file.
#[derive(Debug, Clone)]
pub struct SemanticOutput {
    pub file: FileDescriptorProto,
    /// References the file's own symbols could not satisfy.
    pub unresolved: Vec<UnresolvedReference>,
}

/// Walk `tree` and build the descriptor proto for the file called `name`.
pub fn build_file<'a>(
    name: &str,
    tree: &ast::ProtoFile,
    listener: &'a mut dyn ErrorListener,
    locations: Option<&'a mut dyn LocationSink>,
) -> Result<SemanticOutput, BuildError> {
    let package = tree.package.as_ref().map(|p| p.name.clone());
    let mut file = FileDescriptorProto {
        name: Some(name.to_string()),
        package: package.clone(),
        ..Default::default()
    };
    if tree.syntax == ast::Syntax::Proto3 {
        file.syntax = Some(tree.syntax.as_str().to_string());
    }
    for (i, import) in tree.imports.iter().enumerate() {
        file.dependency.push(import.path.clone());
        match import.kind {
            ast::ImportKind::Public => file.public_dependency.push(i as i32),
            ast::ImportKind::Weak => file.weak_dependency.push(i as i32),
            ast::ImportKind::Default => {}
        }
    }

    let symbols = SymbolTable::new(package.as_deref().unwrap_or(""));
    let mut builder = SemanticBuilder {
        file_name: name.to_string(),
        syntax: tree.syntax,
        scope: symbols.package(),
        symbols,
        scopes: ScopeStack::new(file),
        listener,
        locations,
        taken: HashMap::new(),
        unresolved: Vec::new(),
    };
    builder.walk_file(tree)?;
    builder.finish()
}

/// Per-message bookkeeping for the checks that need the complete message.
struct MessageState {
    numbers: HashSet<i32>,
    ranges: ExtensionRangeSet,
    reserved_ranges: Vec<(i32, i32)>,
    reserved_names: HashSet<String>,
    fields: Vec<(String, i32, Span)>,
    option_names: HashSet<String>,
}

impl MessageState {
    fn new() -> Self {
        MessageState {
            numbers: HashSet::new(),
            ranges: ExtensionRangeSet::new(),
            reserved_ranges: Vec::new(),
            reserved_names: HashSet::new(),
            fields: Vec::new(),
            option_names: HashSet::new(),
        }
    }
}

#[derive(Clone, Copy)]
enum FieldContext<'t> {
    Message,
    Oneof,
    Extend(&'t str),
}

struct SemanticBuilder<'a> {
    file_name: String,
    syntax: ast::Syntax,
    symbols: SymbolTable,
    /// Symbol scope of the construct being walked.
    scope: NodeId,
    scopes: ScopeStack,
    listener: &'a mut dyn ErrorListener,
    locations: Option<&'a mut dyn LocationSink>,
    /// Non-type names (fields, oneofs, enum values, extensions) declared per scope.
    taken: HashMap<NodeId, HashSet<String>>,
    unresolved: Vec<UnresolvedReference>,
}

impl<'a> SemanticBuilder<'a> {
    fn report(&mut self, cause: ValidationCause, span: Option<Span>, message: String) {
        self.listener.validation_error(
            Diagnostic::validation(cause, message)
                .at(span)
                .in_file(self.file_name.clone()),
        );
    }

    fn record_location(&mut self, path: &[i32], span: Span, comment: Option<&str>) {
        if let Some(sink) = self.locations.as_deref_mut() {
            sink.span(path, span);
            if let Some(text) = comment {
                sink.comment(path, text);
            }
        }
    }

    /// Open `builder` and report its location. Returns the structural path.
    fn open(&mut self, builder: Builder, span: Span, comment: Option<&str>) -> Result<Vec<i32>, BuildError> {
        let path = self.scopes.open(builder)?.to_vec();
        self.record_location(&path, span, comment);
        Ok(path)
    }

    fn scope_name(&self, node: NodeId) -> String {
        let name = self.symbols.full_name(node);
        if name.is_empty() {
            self.file_name.clone()
        } else {
            name
        }
    }

    /// Declare a message, enum or service. Reports and returns `None` on a name clash.
    fn declare_type(&mut self, name: &str, kind: SymbolKind, span: Span) -> Option<NodeId> {
        let parent = self.scope;
        let clash = self.taken.get(&parent).map_or(false, |names| names.contains(name));
        if !clash {
            if let Ok(node) = self.symbols.add(parent, name, kind) {
                return Some(node);
            }
        }
        let scope = self.scope_name(parent);
        self.report(
            ValidationCause::DuplicateName,
            Some(span),
            format!("\"{}\" is already defined in \"{}\"", name, scope),
        );
        None
    }

    /// Claim a non-type name in `scope`. Reports and returns `false` on a clash.
    fn take_name(&mut self, scope: NodeId, name: &str, span: Span) -> bool {
        let clash_with_type = self.symbols.child(scope, name).is_some();
        if !clash_with_type && self.taken.entry(scope).or_default().insert(name.to_string()) {
            return true;
        }
        let scope_name = self.scope_name(scope);
        self.report(
            ValidationCause::DuplicateName,
            Some(span),
            format!("\"{}\" is already defined in \"{}\"", name, scope_name),
        );
        false
    }

    fn message_mut(&mut self) -> Result<&mut DescriptorProto, BuildError> {
        match self.scopes.current_mut() {
            Some(Builder::Message(m)) => Ok(m),
            _ => Err(BuildError::InvalidScope {
                operation: "message body",
                scope: "non-message",
            }),
        }
    }

    fn register(&mut self, name: &str, kind: ReferenceKind, path: Vec<i32>, span: Span) {
        self.unresolved.push(UnresolvedReference {
            name: name.to_string(),
            scope: self.symbols.full_name(self.scope),
            scope_node: self.scope,
            path,
            kind,
            span: Some(span),
        });
    }

    fn walk_file(&mut self, tree: &ast::ProtoFile) -> Result<(), BuildError> {
        if let Some(package) = &tree.package {
            self.record_location(&[tags::FILE_PACKAGE as i32], package.span, None);
        }
        for (i, import) in tree.imports.iter().enumerate() {
            self.record_location(&[tags::FILE_DEPENDENCY as i32, i as i32], import.span, None);
        }

        let mut seen = HashSet::new();
        for option in &tree.options {
            self.add_option(option, &mut seen)?;
        }
        for item in &tree.items {
            match item {
                ast::TopItem::Message(m) => self.walk_message(m)?,
                ast::TopItem::Enum(e) => self.walk_enum(e)?,
                ast::TopItem::Service(s) => self.walk_service(s)?,
                ast::TopItem::Extend(x) => self.walk_extend(x)?,
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<SemanticOutput, BuildError> {
        let SemanticBuilder {
            scopes,
            mut symbols,
            unresolved,
            ..
        } = self;
        let mut file = scopes.finish()?;

        let mut leftovers = Vec::new();
        for reference in unresolved {
            match symbols.resolve(&reference.name, reference.scope_node) {
                Some(found) if reference.kind.accepts(found.kind) => {
                    if !reference.apply(&mut file, &found.full_name, found.kind) {
                        leftovers.push(reference);
                    }
                }
                _ => leftovers.push(reference),
            }
        }
        tracing::trace!(
            file = file.name(),
            unresolved = leftovers.len(),
            "local resolution done"
        );
        Ok(SemanticOutput {
            file,
            unresolved: leftovers,
        })
    }

    /// Record one option assignment on the innermost element, unless its simple name was
    /// already used in this option list.
    fn add_option(&mut self, option: &ast::OptionDecl, seen: &mut HashSet<String>) -> Result<(), BuildError> {
        if let Some(name) = option.simple_name() {
            if !seen.insert(name.to_string()) {
                self.report(
                    ValidationCause::DuplicateOptionName,
                    Some(option.span),
                    format!("option \"{}\" was already set", name),
                );
                return Ok(());
            }
        }
        let raw = raw_option(option)?;
        self.open(Builder::Option(raw), option.span, None)?;
        self.scopes.close()
    }

    fn walk_message(&mut self, m: &ast::Message) -> Result<(), BuildError> {
        let node = match self.declare_type(&m.name, SymbolKind::Message, m.span) {
            Some(node) => node,
            None => return Ok(()),
        };
        self.walk_message_body(node, &m.name, &m.items, m.span, m.comment.as_deref())
    }

    fn walk_message_body(
        &mut self,
        node: NodeId,
        name: &str,
        items: &[ast::MessageItem],
        span: Span,
        comment: Option<&str>,
    ) -> Result<(), BuildError> {
        let message = DescriptorProto {
            name: Some(name.to_string()),
            ..Default::default()
        };
        self.open(Builder::Message(message), span, comment)?;
        let parent = self.scope;
        self.scope = node;

        let mut state = MessageState::new();
        for item in items {
            match item {
                ast::MessageItem::Field(f) => self.walk_field(f, FieldContext::Message, Some(&mut state))?,
                ast::MessageItem::Group(g) => self.walk_group(g, FieldContext::Message, Some(&mut state))?,
                ast::MessageItem::Map(map) => self.walk_map(map, &mut state)?,
                ast::MessageItem::Oneof(o) => self.walk_oneof(o, &mut state)?,
                ast::MessageItem::Message(nested) => self.walk_message(nested)?,
                ast::MessageItem::Enum(e) => self.walk_enum(e)?,
                ast::MessageItem::Extend(x) => self.walk_extend(x)?,
                ast::MessageItem::Extensions(x) => self.walk_extensions(x, &mut state)?,
                ast::MessageItem::Reserved(r) => {
                    let message = self.message_mut()?;
                    for &(start, end) in &r.ranges {
                        message.reserved_range.push(ReservedRange {
                            start: Some(start),
                            end: Some(end.saturating_add(1)),
                        });
                        state.reserved_ranges.push((start, end.saturating_add(1)));
                    }
                    for name in &r.names {
                        message.reserved_name.push(name.clone());
                        state.reserved_names.insert(name.clone());
                    }
                }
                ast::MessageItem::Option(o) => {
                    let mut seen = std::mem::take(&mut state.option_names);
                    let added = self.add_option(o, &mut seen);
                    state.option_names = seen;
                    added?;
                }
            }
        }

        self.exit_message(state)?;
        self.scope = parent;
        self.scopes.close()
    }

    /// Checks that need the whole message, then synthetic oneofs for proto3 `optional`.
    fn exit_message(&mut self, state: MessageState) -> Result<(), BuildError> {
        for (name, number, span) in &state.fields {
            if let Some((start, end)) = state.ranges.range_of(*number) {
                self.report(
                    ValidationCause::FieldInExtensionRange,
                    Some(*span),
                    format!(
                        "field \"{}\" uses number {} which is inside extension range {} to {}",
                        name,
                        number,
                        start,
                        end - 1
                    ),
                );
            }
            if state
                .reserved_ranges
                .iter()
                .any(|&(start, end)| *number >= start && *number < end)
            {
                self.report(
                    ValidationCause::ReservedNumber,
                    Some(*span),
                    format!("field \"{}\" uses reserved number {}", name, number),
                );
            }
            if state.reserved_names.contains(name) {
                self.report(
                    ValidationCause::ReservedName,
                    Some(*span),
                    format!("field name \"{}\" is reserved", name),
                );
            }
        }

        let message = self.message_mut()?;
        let mut taken: HashSet<String> = message
            .field
            .iter()
            .map(|f| f.name().to_string())
            .chain(message.nested_type.iter().map(|m| m.name().to_string()))
            .chain(message.oneof_decl.iter().filter_map(|o| o.name.clone()))
            .collect();
        for i in 0..message.field.len() {
            if message.field[i].proto3_optional != Some(true) {
                continue;
            }
            let mut name = format!("_{}", message.field[i].name());
            while taken.contains(&name) {
                name.insert(0, 'X');
            }
            taken.insert(name.clone());
            message.oneof_decl.push(OneofDescriptorProto {
                name: Some(name),
                options: None,
            });
            message.field[i].oneof_index = Some(message.oneof_decl.len() as i32 - 1);
        }
        Ok(())
    }

    /// Shared checks for anything that occupies a field number in a message.
    /// Returns `false` when the element must be left out; a rejected element claims neither
    /// its name nor its number.
    fn claim_field(
        &mut self,
        name: &str,
        number: i32,
        span: Span,
        ctx: FieldContext<'_>,
        state: Option<&mut MessageState>,
    ) -> bool {
        let state = match ctx {
            FieldContext::Message | FieldContext::Oneof => state,
            FieldContext::Extend(_) => None,
        };
        if state.as_deref().map_or(false, |state| state.numbers.contains(&number)) {
            let scope = self.scope_name(self.scope);
            self.report(
                ValidationCause::DuplicateNumber,
                Some(span),
                format!(
                    "field number {} has already been used in \"{}\" by another field",
                    number, scope
                ),
            );
            return false;
        }
        if !self.take_name(self.scope, name, span) {
            return false;
        }
        if RESERVED_NUMBERS.contains(&number) {
            self.report(
                ValidationCause::ReservedNumber,
                Some(span),
                format!(
                    "field numbers {} through {} are reserved for the protocol buffer library implementation",
                    RESERVED_NUMBERS.start,
                    RESERVED_NUMBERS.end - 1
                ),
            );
        }
        if let Some(state) = state {
            state.numbers.insert(number);
            state.fields.push((name.to_string(), number, span));
        }
        true
    }

    /// Give back what `claim_field` took for an element dropped afterwards.
    fn release_field(&mut self, name: &str, number: i32, state: Option<&mut MessageState>) {
        if let Some(names) = self.taken.get_mut(&self.scope) {
            names.remove(name);
        }
        if let Some(state) = state {
            if let Some(pos) = state.fields.iter().rposition(|(n, num, _)| n == name && *num == number) {
                state.fields.remove(pos);
                state.numbers.remove(&number);
            }
        }
    }

    fn walk_field(
        &mut self,
        f: &ast::Field,
        ctx: FieldContext<'_>,
        state: Option<&mut MessageState>,
    ) -> Result<(), BuildError> {
        if !self.claim_field(&f.name, f.number, f.span, ctx, state) {
            return Ok(());
        }

        let scalar = Type::from_keyword(&f.type_name);
        let proto3_optional = self.syntax == ast::Syntax::Proto3
            && f.label == Some(Label::Optional)
            && !matches!(ctx, FieldContext::Extend(_));
        let mut field = FieldDescriptorProto {
            name: Some(f.name.clone()),
            number: Some(f.number),
            label: Some(f.label.unwrap_or(Label::Optional)),
            r#type: scalar,
            type_name: if scalar.is_none() {
                Some(f.type_name.clone())
            } else {
                None
            },
            proto3_optional: proto3_optional.then_some(true),
            ..Default::default()
        };
        if !matches!(ctx, FieldContext::Extend(_)) {
            field.json_name = Some(to_json_name(&f.name));
        }

        let mut seen = HashSet::new();
        let options = self.apply_pseudo_options(&mut field, &f.options, &mut seen)?;

        let path = self.open(Builder::Field(field), f.span, f.comment.as_deref())?;
        if scalar.is_none() {
            self.register(&f.type_name, ReferenceKind::FieldType, path.clone(), f.span);
        }
        if let FieldContext::Extend(extendee) = ctx {
            self.register(extendee, ReferenceKind::Extendee, path, f.span);
        }
        for option in options {
            self.add_option(option, &mut seen)?;
        }
        self.scopes.close()
    }

    /// Handle `default` and `json_name`, which are stored in the field itself. Returns the
    /// remaining options.
    fn apply_pseudo_options<'o>(
        &mut self,
        field: &mut FieldDescriptorProto,
        options: &'o [ast::OptionDecl],
        seen: &mut HashSet<String>,
    ) -> Result<Vec<&'o ast::OptionDecl>, BuildError> {
        let mut rest = Vec::new();
        for option in options {
            let pseudo = match option.simple_name() {
                Some(name @ ("default" | "json_name")) => name,
                _ => {
                    rest.push(option);
                    continue;
                }
            };
            if !seen.insert(pseudo.to_string()) {
                self.report(
                    ValidationCause::DuplicateOptionName,
                    Some(option.span),
                    format!("option \"{}\" was already set", pseudo),
                );
                continue;
            }
            if pseudo == "json_name" {
                match &option.value {
                    ast::Constant::String(bytes) => {
                        field.json_name = Some(String::from_utf8_lossy(bytes).into_owned())
                    }
                    _ => {
                        return Err(BuildError::OptionValue {
                            option: "json_name".into(),
                            message: "expected a string".into(),
                        })
                    }
                }
            } else {
                field.default_value = Some(default_text(&option.value, field.r#type));
            }
        }
        Ok(rest)
    }

    fn walk_group(
        &mut self,
        g: &ast::Group,
        ctx: FieldContext<'_>,
        mut state: Option<&mut MessageState>,
    ) -> Result<(), BuildError> {
        let field_name = g.name.to_lowercase();
        if !self.claim_field(&field_name, g.number, g.span, ctx, state.as_deref_mut()) {
            return Ok(());
        }
        let node = match self.declare_type(&g.name, SymbolKind::Message, g.span) {
            Some(node) => node,
            None => {
                self.release_field(&field_name, g.number, state);
                return Ok(());
            }
        };

        let mut field = FieldDescriptorProto {
            name: Some(field_name.clone()),
            number: Some(g.number),
            label: Some(g.label.unwrap_or(Label::Optional)),
            r#type: Some(Type::Group),
            type_name: Some(format!(".{}", self.symbols.full_name(node))),
            ..Default::default()
        };
        if !matches!(ctx, FieldContext::Extend(_)) {
            field.json_name = Some(to_json_name(&field_name));
        }
        let mut seen = HashSet::new();
        let options = self.apply_pseudo_options(&mut field, &g.options, &mut seen)?;
        let path = self.open(Builder::Field(field), g.span, g.comment.as_deref())?;
        if let FieldContext::Extend(extendee) = ctx {
            self.register(extendee, ReferenceKind::Extendee, path, g.span);
        }
        for option in options {
            self.add_option(option, &mut seen)?;
        }
        self.scopes.close()?;

        self.walk_message_body(node, &g.name, &g.items, g.span, None)
    }

    fn walk_map(&mut self, map: &ast::MapField, state: &mut MessageState) -> Result<(), BuildError> {
        if !self.claim_field(&map.name, map.number, map.span, FieldContext::Message, Some(&mut *state)) {
            return Ok(());
        }
        let entry_name = map_entry_name(&map.name);
        let entry_node = match self.declare_type(&entry_name, SymbolKind::Message, map.span) {
            Some(node) => node,
            None => {
                self.release_field(&map.name, map.number, Some(state));
                return Ok(());
            }
        };

        let value_scalar = Type::from_keyword(&map.value_type);
        let mut entry_options = Options::new(OptionsKind::Message);
        entry_options.message.set(7, Type::Bool, Value::Bool(true));
        let entry = DescriptorProto {
            name: Some(entry_name),
            field: vec![
                FieldDescriptorProto {
                    name: Some("key".into()),
                    number: Some(1),
                    label: Some(Label::Optional),
                    r#type: Type::from_keyword(&map.key_type),
                    json_name: Some("key".into()),
                    ..Default::default()
                },
                FieldDescriptorProto {
                    name: Some("value".into()),
                    number: Some(2),
                    label: Some(Label::Optional),
                    r#type: value_scalar,
                    type_name: value_scalar.is_none().then(|| map.value_type.clone()),
                    json_name: Some("value".into()),
                    ..Default::default()
                },
            ],
            options: Some(entry_options),
            ..Default::default()
        };
        let entry_path = self.open(Builder::Message(entry), map.span, None)?;
        self.scopes.close()?;
        if value_scalar.is_none() {
            let mut value_path = entry_path;
            value_path.extend([tags::MESSAGE_FIELD as i32, 1]);
            self.register(&map.value_type, ReferenceKind::FieldType, value_path, map.span);
        }

        let mut field = FieldDescriptorProto {
            name: Some(map.name.clone()),
            number: Some(map.number),
            label: Some(Label::Repeated),
            r#type: Some(Type::Message),
            type_name: Some(format!(".{}", self.symbols.full_name(entry_node))),
            json_name: Some(to_json_name(&map.name)),
            ..Default::default()
        };
        let mut seen = HashSet::new();
        let options = self.apply_pseudo_options(&mut field, &map.options, &mut seen)?;
        self.open(Builder::Field(field), map.span, map.comment.as_deref())?;
        for option in options {
            self.add_option(option, &mut seen)?;
        }
        self.scopes.close()
    }

    fn walk_oneof(&mut self, o: &ast::Oneof, state: &mut MessageState) -> Result<(), BuildError> {
        if !self.take_name(self.scope, &o.name, o.span) {
            return Ok(());
        }
        self.scopes.open_oneof(OneofDescriptorProto {
            name: Some(o.name.clone()),
            options: None,
        })?;
        let path = self.scopes.path().to_vec();
        self.record_location(&path, o.span, None);

        let mut seen = HashSet::new();
        for item in &o.items {
            match item {
                ast::OneofItem::Field(f) => self.walk_field(f, FieldContext::Oneof, Some(state))?,
                ast::OneofItem::Group(g) => self.walk_group(g, FieldContext::Oneof, Some(state))?,
                ast::OneofItem::Option(option) => self.add_option(option, &mut seen)?,
            }
        }
        self.scopes.close()
    }

    fn walk_extend(&mut self, x: &ast::Extend) -> Result<(), BuildError> {
        let path = self.scopes.open_extend(x.extendee.clone())?.to_vec();
        self.record_location(&path, x.span, None);
        for item in &x.items {
            match item {
                ast::ExtendItem::Field(f) => self.walk_field(f, FieldContext::Extend(&x.extendee), None)?,
                ast::ExtendItem::Group(g) => self.walk_group(g, FieldContext::Extend(&x.extendee), None)?,
            }
        }
        self.scopes.close()
    }

    fn walk_extensions(&mut self, x: &ast::Extensions, state: &mut MessageState) -> Result<(), BuildError> {
        for &(start, last) in &x.ranges {
            let end = last.saturating_add(1);
            match state.ranges.try_add(start, end) {
                Ok(()) => {
                    let range = ExtensionRange {
                        start: Some(start),
                        end: Some(end),
                        options: None,
                    };
                    self.open(Builder::ExtensionRange(range), x.span, None)?;
                    let mut seen = HashSet::new();
                    for option in &x.options {
                        self.add_option(option, &mut seen)?;
                    }
                    self.scopes.close()?;
                }
                Err(RangeViolation::Invalid(reason)) => {
                    self.report(ValidationCause::InvalidExtensionRange, Some(x.span), reason)
                }
                Err(RangeViolation::Overlap {
                    start: other_start,
                    end: other_end,
                }) => self.report(
                    ValidationCause::OverlappingExtensionRange,
                    Some(x.span),
                    format!(
                        "extension range {} to {} overlaps with already-defined range {} to {}",
                        start,
                        last,
                        other_start,
                        other_end - 1
                    ),
                ),
            }
        }
        Ok(())
    }

    fn walk_enum(&mut self, e: &ast::Enum) -> Result<(), BuildError> {
        // enum values are siblings of the enum, not children
        let value_scope = self.scope;
        if self.declare_type(&e.name, SymbolKind::Enum, e.span).is_none() {
            return Ok(());
        }
        let en = EnumDescriptorProto {
            name: Some(e.name.clone()),
            ..Default::default()
        };
        self.open(Builder::Enum(en), e.span, e.comment.as_deref())?;

        let mut seen = HashSet::new();
        let mut values = Vec::new();
        let mut reserved_ranges = Vec::new();
        let mut reserved_names = HashSet::new();
        for item in &e.items {
            match item {
                ast::EnumItem::Value(v) => {
                    if !self.take_name(value_scope, &v.name, v.span) {
                        continue;
                    }
                    let value = EnumValueDescriptorProto {
                        name: Some(v.name.clone()),
                        number: Some(v.number),
                        options: None,
                    };
                    self.open(Builder::EnumValue(value), v.span, v.comment.as_deref())?;
                    let mut value_seen = HashSet::new();
                    for option in &v.options {
                        self.add_option(option, &mut value_seen)?;
                    }
                    self.scopes.close()?;
                    values.push((v.name.clone(), v.number, v.span));
                }
                ast::EnumItem::Option(option) => self.add_option(option, &mut seen)?,
                ast::EnumItem::Reserved(r) => {
                    let en = match self.scopes.current_mut() {
                        Some(Builder::Enum(en)) => en,
                        _ => {
                            return Err(BuildError::InvalidScope {
                                operation: "reserved",
                                scope: "non-enum",
                            })
                        }
                    };
                    for &(start, end) in &r.ranges {
                        en.reserved_range.push(EnumReservedRange {
                            start: Some(start),
                            end: Some(end),
                        });
                        reserved_ranges.push((start, end));
                    }
                    for name in &r.names {
                        en.reserved_name.push(name.clone());
                        reserved_names.insert(name.clone());
                    }
                }
            }
        }

        for (name, number, span) in values {
            if reserved_ranges
                .iter()
                .any(|&(start, end)| number >= start && number <= end)
            {
                self.report(
                    ValidationCause::ReservedNumber,
                    Some(span),
                    format!("enum value \"{}\" uses reserved number {}", name, number),
                );
            }
            if reserved_names.contains(&name) {
                self.report(
                    ValidationCause::ReservedName,
                    Some(span),
                    format!("enum value name \"{}\" is reserved", name),
                );
            }
        }
        self.scopes.close()
    }

    fn walk_service(&mut self, s: &ast::Service) -> Result<(), BuildError> {
        let node = match self.declare_type(&s.name, SymbolKind::Service, s.span) {
            Some(node) => node,
            None => return Ok(()),
        };
        let service = ServiceDescriptorProto {
            name: Some(s.name.clone()),
            ..Default::default()
        };
        self.open(Builder::Service(service), s.span, s.comment.as_deref())?;
        let parent = self.scope;
        self.scope = node;

        let mut seen = HashSet::new();
        for item in &s.items {
            match item {
                ast::ServiceItem::Option(option) => self.add_option(option, &mut seen)?,
                ast::ServiceItem::Rpc(rpc) => {
                    if !self.take_name(node, &rpc.name, rpc.span) {
                        continue;
                    }
                    let method = MethodDescriptorProto {
                        name: Some(rpc.name.clone()),
                        input_type: Some(rpc.input_type.clone()),
                        output_type: Some(rpc.output_type.clone()),
                        options: None,
                        client_streaming: rpc.client_streaming.then_some(true),
                        server_streaming: rpc.server_streaming.then_some(true),
                    };
                    let path = self.open(Builder::Method(method), rpc.span, rpc.comment.as_deref())?;
                    self.register(&rpc.input_type, ReferenceKind::MethodInput, path.clone(), rpc.span);
                    self.register(&rpc.output_type, ReferenceKind::MethodOutput, path, rpc.span);
                    let mut method_seen = HashSet::new();
                    for option in &rpc.options {
                        self.add_option(option, &mut method_seen)?;
                    }
                    self.scopes.close()?;
                }
            }
        }

        self.scope = parent;
        self.scopes.close()
    }
}

/// Convert an option assignment into its uninterpreted form.
fn raw_option(option: &ast::OptionDecl) -> Result<UninterpretedOption, BuildError> {
    let mut raw = UninterpretedOption {
        name: option.name.clone(),
        span: Some(option.span),
        ..Default::default()
    };
    match &option.value {
        ast::Constant::Ident(word) => raw.identifier_value = Some(word.clone()),
        ast::Constant::Int {
            negative: false,
            magnitude,
            ..
        } => raw.positive_int_value = Some(*magnitude),
        ast::Constant::Int {
            negative: true,
            magnitude,
            text,
        } => {
            if *magnitude > i64::MAX as u64 + 1 {
                return Err(BuildError::OptionValue {
                    option: raw.name_text(),
                    message: format!("integer out of range: {}", text),
                });
            }
            raw.negative_int_value = Some((*magnitude as i64).wrapping_neg());
        }
        ast::Constant::Float { value, .. } => raw.double_value = Some(*value),
        ast::Constant::String(bytes) => raw.string_value = Some(bytes.clone()),
        ast::Constant::Aggregate(text) => raw.aggregate_value = Some(text.clone()),
    }
    Ok(raw)
}

/// Text stored in `default_value`: strings unescaped, bytes C-escaped, everything else as
/// written.
fn default_text(value: &ast::Constant, ty: Option<Type>) -> String {
    match (value, ty) {
        (ast::Constant::String(bytes), Some(Type::Bytes)) => c_escape(bytes),
        (ast::Constant::String(bytes), _) => String::from_utf8_lossy(bytes).into_owned(),
        (other, _) => other.source_text(),
    }
}

/// lowerCamelCase name used in JSON: underscores dropped, the letter after each capitalized.
pub fn to_json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut capitalize_next = false;
    for c in name.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `foo_bar` → `FooBarEntry`
pub fn map_entry_name(field_name: &str) -> String {
    let mut out = String::with_capacity(field_name.len() + 5);
    let mut capitalize_next = true;
    for c in field_name.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out.push_str("Entry");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticCollector, RecordedLocations};
    use crate::parser::parse;

    fn build(text: &str) -> (SemanticOutput, DiagnosticCollector) {
        let tree = parse(text).unwrap();
        let mut diagnostics = DiagnosticCollector::new();
        let output = build_file("test.proto", &tree, &mut diagnostics, None).unwrap();
        (output, diagnostics)
    }

    #[test]
    fn test_forward_reference_resolves_locally() {
        let (out, diags) = build(
            r#"
            syntax = "proto3";
            package demo;
            message A { B b = 1; Kind kind = 2; }
            message B {}
            enum Kind { KIND_UNSPECIFIED = 0; }
            "#,
        );
        assert!(diags.is_empty());
        assert!(out.unresolved.is_empty());
        let a = &out.file.message_type[0];
        assert_eq!(a.field[0].type_name.as_deref(), Some(".demo.B"));
        assert_eq!(a.field[0].r#type, Some(Type::Message));
        assert_eq!(a.field[1].type_name.as_deref(), Some(".demo.Kind"));
        assert_eq!(a.field[1].r#type, Some(Type::Enum));
        assert_eq!(a.field[0].label, Some(Label::Optional));
    }

    #[test]
    fn test_unknown_type_left_for_cross_file() {
        let (out, _) = build("syntax = \"proto3\"; message A { other.Thing t = 1; }");
        assert_eq!(out.unresolved.len(), 1);
        let r = &out.unresolved[0];
        assert_eq!(r.name, "other.Thing");
        assert_eq!(r.scope, "A");
        assert_eq!(r.path, vec![4, 0, 2, 0]);
        assert_eq!(r.kind, ReferenceKind::FieldType);
    }

    #[test]
    fn test_duplicate_field_number_keeps_first() {
        let (out, diags) = build("syntax = \"proto3\"; message M { int32 a = 5; int32 b = 5; }");
        assert_eq!(diags.count(ValidationCause::DuplicateNumber), 1);
        let m = &out.file.message_type[0];
        assert_eq!(m.field.len(), 1);
        assert_eq!(m.field[0].name(), "a");
    }

    #[test]
    fn test_duplicate_names_reported() {
        let (out, diags) = build(
            "syntax = \"proto3\"; message M { int32 a = 1; string a = 2; } message M {} enum E { X = 0; } enum F { X = 0; }",
        );
        assert_eq!(diags.count(ValidationCause::DuplicateName), 3);
        assert_eq!(out.file.message_type.len(), 1);
        assert_eq!(out.file.message_type[0].field.len(), 1);
        assert!(out.file.enum_type[1].value.is_empty());
    }

    #[test]
    fn test_overlapping_extension_ranges() {
        let (out, diags) = build("message M { extensions 10 to 19; extensions 15 to 24; }");
        assert_eq!(diags.count(ValidationCause::OverlappingExtensionRange), 1);
        assert_eq!(diags.validation.len(), 1);
        let ranges = &out.file.message_type[0].extension_range;
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].start, ranges[0].end), (Some(10), Some(20)));
    }

    #[test]
    fn test_invalid_extension_range() {
        let (out, diags) = build("message M { extensions 19000 to 19500; extensions 30 to 20; }");
        assert_eq!(diags.count(ValidationCause::InvalidExtensionRange), 2);
        assert!(out.file.message_type[0].extension_range.is_empty());
    }

    #[test]
    fn test_field_in_extension_range() {
        let (_, diags) = build("message M { optional int32 a = 150; extensions 100 to 199; }");
        assert_eq!(diags.count(ValidationCause::FieldInExtensionRange), 1);
    }

    #[test]
    fn test_reserved_checks() {
        let (out, diags) = build(
            "syntax = \"proto3\"; message M { reserved 2, 9 to 11; reserved \"old\"; int32 old = 1; int32 x = 10; }",
        );
        assert_eq!(diags.count(ValidationCause::ReservedName), 1);
        assert_eq!(diags.count(ValidationCause::ReservedNumber), 1);
        let m = &out.file.message_type[0];
        assert_eq!(m.reserved_range[1].start, Some(9));
        assert_eq!(m.reserved_range[1].end, Some(12));
    }

    #[test]
    fn test_duplicate_option_name() {
        let (out, diags) = build(
            "syntax = \"proto3\"; message M { int32 a = 1 [deprecated = true, deprecated = false]; }",
        );
        assert_eq!(diags.count(ValidationCause::DuplicateOptionName), 1);
        let opts = out.file.message_type[0].field[0].options.as_ref().unwrap();
        assert_eq!(opts.uninterpreted_option.len(), 1);
    }

    #[test]
    fn test_map_field_synthesizes_entry() {
        let (out, diags) = build("syntax = \"proto3\"; package p; message M { map<string, M> by_name = 1; }");
        assert!(diags.is_empty());
        let m = &out.file.message_type[0];
        let entry = &m.nested_type[0];
        assert_eq!(entry.name(), "ByNameEntry");
        assert!(entry.is_map_entry());
        assert_eq!(entry.field[1].type_name.as_deref(), Some(".p.M"));
        assert_eq!(m.field[0].label, Some(Label::Repeated));
        assert_eq!(m.field[0].type_name.as_deref(), Some(".p.M.ByNameEntry"));
        assert_eq!(m.field[0].json_name.as_deref(), Some("byName"));
    }

    #[test]
    fn test_group_and_pseudo_options() {
        let (out, _) = build(
            r#"message M {
                optional group Result = 1 { optional string url = 2 [default = "a\tb"]; }
                optional bytes data = 3 [default = "\001x", json_name = "payload"];
            }"#,
        );
        let m = &out.file.message_type[0];
        assert_eq!(m.field[0].name(), "result");
        assert_eq!(m.field[0].r#type, Some(Type::Group));
        assert_eq!(m.field[0].type_name.as_deref(), Some(".M.Result"));
        assert_eq!(m.nested_type[0].field[0].default_value.as_deref(), Some("a\tb"));
        assert_eq!(m.field[1].default_value.as_deref(), Some("\\001x"));
        assert_eq!(m.field[1].json_name.as_deref(), Some("payload"));
        assert!(m.field[1].options.is_none());
    }

    #[test]
    fn test_proto3_optional_synthetic_oneof_after_real_ones() {
        let (out, _) = build(
            "syntax = \"proto3\"; message M { optional int32 a = 1; oneof real { string b = 2; } }",
        );
        let m = &out.file.message_type[0];
        let names: Vec<_> = m.oneof_decl.iter().map(|o| o.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["real", "_a"]);
        assert_eq!(m.field[0].oneof_index, Some(1));
        assert_eq!(m.field[0].proto3_optional, Some(true));
        assert_eq!(m.field[1].oneof_index, Some(0));
    }

    #[test]
    fn test_extend_and_service_references() {
        let (out, _) = build(
            r#"
            syntax = "proto3";
            package p;
            import "google/protobuf/descriptor.proto";
            extend google.protobuf.FieldOptions { string tag = 50000; }
            message Req {}
            service S { rpc Call (Req) returns (stream Req); }
            "#,
        );
        assert_eq!(out.file.extension[0].extendee.as_deref(), Some("google.protobuf.FieldOptions"));
        assert_eq!(out.unresolved.len(), 1);
        assert_eq!(out.unresolved[0].kind, ReferenceKind::Extendee);
        let method = &out.file.service[0].method[0];
        assert_eq!(method.input_type.as_deref(), Some(".p.Req"));
        assert_eq!(method.server_streaming, Some(true));
        assert_eq!(method.client_streaming, None);
    }

    #[test]
    fn test_locations_reported() {
        let tree = parse("syntax = \"proto3\";\n// The thing.\nmessage M {\n  int32 a = 1;\n}\n").unwrap();
        let mut diagnostics = DiagnosticCollector::new();
        let mut locations = RecordedLocations::default();
        build_file("t.proto", &tree, &mut diagnostics, Some(&mut locations)).unwrap();
        assert_eq!(locations.span_of(&[4, 0]), Some(Span::new(3, 1)));
        assert_eq!(locations.span_of(&[4, 0, 2, 0]), Some(Span::new(4, 3)));
        assert_eq!(locations.comments[0], (vec![4, 0], "The thing.\n".to_string()));
    }

    #[test]
    fn test_json_and_entry_names() {
        assert_eq!(to_json_name("foo_bar_baz"), "fooBarBaz");
        assert_eq!(to_json_name("already"), "already");
        assert_eq!(map_entry_name("my_map"), "MyMapEntry");
    }
}
