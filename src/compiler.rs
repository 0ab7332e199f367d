//! Multi-file compilation.
//!
//! A [`Compiler`] accepts any number of schema inputs, builds each one's descriptor, and
//! finalizes them in dependency order: a file is finalized only once every file it imports
//! has been. Files that can never be finalized (missing or circular imports, or imports of
//! files that failed) are reported and left out of the resulting [`FileSet`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::builder::{build_file, UnresolvedReference};
use crate::canonical::Canonicalizer;
use crate::codec::{decode_file_descriptor, Encode};
use crate::config::BuildOptions;
use crate::descriptor::*;
use crate::diagnostics::{Diagnostic, ErrorListener, FileListener, ValidationCause};
use crate::error::{CompileError, EncodeError, Result};
use crate::meta::meta_schema;
use crate::parser::{self, ast};
use crate::pool::{visible_files, Definition, FileDescriptor, Pool, SymbolIndex};
use crate::registry::registry_for;
use crate::symbols::SymbolKind;
use crate::text_format;

#[derive(Debug, Clone)]
enum Input {
    Source(String),
    Tree(Box<ast::ProtoFile>),
    Proto(Box<FileDescriptorProto>),
}

/// A file that has been built but not yet finalized.
struct Pending {
    proto: FileDescriptorProto,
    unresolved: Vec<UnresolvedReference>,
}

/// Finalized descriptors in the order they were finalized.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: IndexMap<String, Arc<FileDescriptor>>,
}

impl FileSet {
    pub fn get(&self, name: &str) -> Option<&Arc<FileDescriptor>> {
        self.files.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<FileDescriptor>)> {
        self.files.iter().map(|(name, file)| (name.as_str(), file))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// The canonical descriptor protos, in order.
    pub fn to_protos(&self) -> Vec<FileDescriptorProto> {
        self.files.values().map(|f| f.proto().clone()).collect()
    }

    pub fn to_descriptor_set(&self) -> FileDescriptorSet {
        FileDescriptorSet {
            file: self.to_protos(),
        }
    }

    pub fn to_descriptor_set_bytes(&self) -> std::result::Result<Vec<u8>, EncodeError> {
        self.to_descriptor_set().encode_to_vec()
    }
}

/// Counts what passes through so a file's finalization can tell whether it hit errors.
struct Tally<'l> {
    inner: &'l mut dyn ErrorListener,
    errors: usize,
}

impl<'l> Tally<'l> {
    fn new(inner: &'l mut dyn ErrorListener) -> Self {
        Tally { inner, errors: 0 }
    }
}

impl ErrorListener for Tally<'_> {
    fn syntax_error(&mut self, diagnostic: Diagnostic) {
        self.errors += 1;
        self.inner.syntax_error(diagnostic);
    }

    fn validation_error(&mut self, diagnostic: Diagnostic) {
        self.errors += 1;
        self.inner.validation_error(diagnostic);
    }
}

/// Collects schema inputs and compiles them together.
///
/// ```
/// use protosema::{BuildOptions, Compiler, DiagnosticCollector};
///
/// let mut compiler = Compiler::new(BuildOptions::default());
/// compiler.add_source("a.proto", "syntax = \"proto3\"; package a; message A { int32 x = 1; }").unwrap();
/// compiler.add_source("b.proto", "syntax = \"proto3\"; import \"a.proto\"; message B { a.A a = 1; }").unwrap();
///
/// let mut diagnostics = DiagnosticCollector::new();
/// let files = compiler.build(&mut diagnostics).unwrap();
/// assert!(diagnostics.is_empty());
/// assert_eq!(files.names().collect::<Vec<_>>(), ["a.proto", "b.proto"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: BuildOptions,
    inputs: IndexMap<String, Input>,
}

impl Compiler {
    pub fn new(options: BuildOptions) -> Self {
        Compiler {
            options,
            inputs: IndexMap::new(),
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    fn accept(&mut self, name: String, input: Input) -> Result<()> {
        if self.inputs.contains_key(&name) {
            return Err(CompileError::DuplicateFile(name));
        }
        tracing::debug!(file = %name, "accepted input");
        self.inputs.insert(name, input);
        Ok(())
    }

    /// Schema source text.
    pub fn add_source(&mut self, name: impl Into<String>, text: impl Into<String>) -> Result<()> {
        self.accept(name.into(), Input::Source(text.into()))
    }

    /// An already parsed schema.
    pub fn add_tree(&mut self, name: impl Into<String>, tree: ast::ProtoFile) -> Result<()> {
        self.accept(name.into(), Input::Tree(Box::new(tree)))
    }

    /// A descriptor proto built elsewhere. Its name is the input name.
    pub fn add_proto(&mut self, proto: FileDescriptorProto) -> Result<()> {
        self.accept(proto.name().to_string(), Input::Proto(Box::new(proto)))
    }

    /// A binary `FileDescriptorProto`.
    pub fn add_descriptor_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let proto = decode_file_descriptor(bytes)?;
        self.add_proto(proto)
    }

    /// A `FileDescriptorProto` in text format.
    pub fn add_descriptor_text(&mut self, text: &str) -> Result<()> {
        let meta = meta_schema();
        let message = text_format::parse_message(text, "google.protobuf.FileDescriptorProto", meta.as_ref())
            .map_err(|e| CompileError::Text(e.to_string()))?;
        let bytes = message.encode_to_vec()?;
        self.add_descriptor_bytes(&bytes)
    }

    /// Build every input. Problems are reported through `listener`; the returned set holds
    /// the files that could be finalized. Only structural failures are `Err`.
    pub fn build(&self, listener: &mut dyn ErrorListener) -> Result<FileSet> {
        let meta = meta_schema();
        let mut finalized: IndexMap<String, Arc<FileDescriptor>> = IndexMap::new();
        let mut pending: IndexMap<String, Pending> = IndexMap::new();

        for (name, input) in &self.inputs {
            if name == META_SCHEMA_FILE {
                finalized.insert(name.clone(), meta.clone());
                continue;
            }
            if let Some(built) = self.build_input(name, input, listener)? {
                pending.insert(name.clone(), built);
            }
        }
        tracing::debug!(parsed = pending.len(), inputs = self.inputs.len(), "parsed inputs");

        let mut violation = false;
        for (name, file) in &pending {
            let package = file.proto.package();
            if package == RESERVED_PACKAGE || package.starts_with("google.protobuf.") {
                violation = true;
                listener.validation_error(
                    Diagnostic::validation(
                        ValidationCause::ReservedSpaceViolation,
                        format!("package \"{}\" is reserved for the meta-schema", package),
                    )
                    .in_file(name.as_str()),
                );
            }
        }
        if violation {
            return Ok(FileSet::default());
        }

        let mut pass = 0;
        loop {
            pass += 1;
            let ready: Vec<String> = pending
                .iter()
                .filter(|(_, p)| {
                    p.proto
                        .dependency
                        .iter()
                        .all(|d| d == META_SCHEMA_FILE || finalized.contains_key(d))
                })
                .map(|(name, _)| name.clone())
                .collect();
            if ready.is_empty() {
                break;
            }
            tracing::debug!(pass, ready = ready.len(), "build pass");
            for name in ready {
                let Some(file) = pending.shift_remove(&name) else {
                    continue;
                };
                let dependencies = file
                    .proto
                    .dependency
                    .iter()
                    .filter_map(|d| {
                        if d == META_SCHEMA_FILE {
                            Some(meta.clone())
                        } else {
                            finalized.get(d).cloned()
                        }
                    })
                    .collect();
                match self.finalize(&name, file, dependencies, listener)? {
                    Some(done) => {
                        tracing::debug!(file = %name, "finalized");
                        finalized.insert(name, done);
                    }
                    None => tracing::debug!(file = %name, "not finalized"),
                }
            }
        }

        if !pending.is_empty() {
            self.report_stuck(&pending, &finalized, listener);
        }
        Ok(FileSet { files: finalized })
    }

    fn build_input(
        &self,
        name: &str,
        input: &Input,
        listener: &mut dyn ErrorListener,
    ) -> Result<Option<Pending>> {
        let parsed;
        let tree = match input {
            Input::Proto(proto) => {
                return Ok(Some(Pending {
                    proto: proto.as_ref().clone(),
                    unresolved: Vec::new(),
                }))
            }
            Input::Tree(tree) => tree.as_ref(),
            Input::Source(text) => match parser::parse(text) {
                Ok(tree) => {
                    parsed = tree;
                    &parsed
                }
                Err(crate::error::ParseError::Syntax {
                    line,
                    column,
                    message,
                }) => {
                    FileListener::new(name, listener).syntax_error(Diagnostic::syntax(line, column, message));
                    return Ok(None);
                }
            },
        };
        let output = build_file(name, tree, listener, None).map_err(|source| CompileError::Build {
            file: name.to_string(),
            source,
        })?;
        Ok(Some(Pending {
            proto: output.file,
            unresolved: output.unresolved,
        }))
    }

    /// Cross-file resolution, duplicate checks and canonicalization. `None` when any of them
    /// reported a problem.
    fn finalize(
        &self,
        name: &str,
        file: Pending,
        dependencies: Vec<Arc<FileDescriptor>>,
        listener: &mut dyn ErrorListener,
    ) -> Result<Option<Arc<FileDescriptor>>> {
        let mut tally = Tally::new(listener);
        let Pending {
            mut proto,
            unresolved,
        } = file;

        self.resolve_references(&mut proto, &unresolved, &dependencies, &mut tally);
        if tally.errors > 0 {
            return Ok(None);
        }

        let proto = Canonicalizer::new(&dependencies, &self.options)
            .canonicalize(proto, &mut tally)
            .map_err(|source| CompileError::Build {
                file: name.to_string(),
                source,
            })?;
        check_duplicate_symbols(&proto, &dependencies, &mut tally);
        check_extension_numbers(&proto, &dependencies, &mut tally);
        if tally.errors > 0 {
            return Ok(None);
        }
        Ok(Some(Arc::new(FileDescriptor::new(proto, dependencies))))
    }

    fn resolve_references(
        &self,
        proto: &mut FileDescriptorProto,
        unresolved: &[UnresolvedReference],
        dependencies: &[Arc<FileDescriptor>],
        listener: &mut dyn ErrorListener,
    ) {
        if unresolved.is_empty() {
            return;
        }
        let snapshot = proto.clone();
        let index = SymbolIndex::build(&snapshot);
        let pool = Pool::new(&snapshot, &index, dependencies).with_fallback(meta_schema().as_ref());

        for reference in unresolved {
            let accept = |d: &Definition| d.symbol_kind().map_or(false, |k| reference.kind.accepts(k));
            match pool.resolve_with(&reference.name, &reference.scope, accept) {
                Some((full, _, definition)) => {
                    let kind = definition.symbol_kind().unwrap_or(SymbolKind::Message);
                    reference.apply(proto, &full, kind);
                }
                None if reference.name.starts_with('.') && !self.options.strict_qualified_names => {
                    reference.apply(proto, &reference.name[1..], SymbolKind::Message);
                }
                None => listener.validation_error(
                    Diagnostic::validation(
                        ValidationCause::UnresolvedTypeName,
                        format!(
                            "{} \"{}\" is not defined (referenced from \"{}\")",
                            reference.describe(),
                            reference.name,
                            reference.scope
                        ),
                    )
                    .at(reference.span)
                    .in_file(snapshot.name()),
                ),
            }
        }
    }

    fn report_stuck(
        &self,
        stuck: &IndexMap<String, Pending>,
        finalized: &IndexMap<String, Arc<FileDescriptor>>,
        listener: &mut dyn ErrorListener,
    ) {
        let edges: HashMap<&str, Vec<&str>> = stuck
            .iter()
            .map(|(name, p)| (name.as_str(), p.proto.dependency.iter().map(String::as_str).collect()))
            .collect();
        let reaches = |from: &str, to: &str| -> bool {
            let mut seen = HashSet::new();
            let mut stack = vec![from];
            while let Some(node) = stack.pop() {
                if node == to {
                    return true;
                }
                if seen.insert(node) {
                    if let Some(next) = edges.get(node) {
                        stack.extend(next.iter().copied());
                    }
                }
            }
            false
        };

        let mut reported_cycles: HashSet<(String, String)> = HashSet::new();
        for (name, file) in stuck {
            for dep in &file.proto.dependency {
                if finalized.contains_key(dep) {
                    continue;
                }
                if dep == META_SCHEMA_FILE || (!stuck.contains_key(dep) && !self.inputs.contains_key(dep)) {
                    if dep != META_SCHEMA_FILE {
                        listener.validation_error(
                            Diagnostic::validation(
                                ValidationCause::MissingDependency,
                                format!("import \"{}\" was not found", dep),
                            )
                            .in_file(name.as_str()),
                        );
                    }
                    continue;
                }
                if stuck.contains_key(dep) && reaches(dep, name) {
                    let key = if name <= dep {
                        (name.clone(), dep.clone())
                    } else {
                        (dep.clone(), name.clone())
                    };
                    if self.options.show_circular_twice || reported_cycles.insert(key) {
                        listener.validation_error(
                            Diagnostic::validation(
                                ValidationCause::CircularDependency,
                                format!("file \"{}\" has a circular dependency on \"{}\"", name, dep),
                            )
                            .in_file(name.as_str()),
                        );
                    }
                } else if self.options.show_existing_non_circular {
                    listener.validation_error(
                        Diagnostic::validation(
                            ValidationCause::UnbuiltDependency,
                            format!("import \"{}\" exists but could not be built", dep),
                        )
                        .in_file(name.as_str()),
                    );
                }
            }
        }
        tracing::debug!(stuck = stuck.len(), "build stuck");
    }
}

/// A symbol of `proto` that a visible file already defines.
fn check_duplicate_symbols(
    proto: &FileDescriptorProto,
    dependencies: &[Arc<FileDescriptor>],
    listener: &mut dyn ErrorListener,
) {
    let visible = visible_files(dependencies);
    let index = SymbolIndex::build(proto);
    for (symbol, definition) in index.iter() {
        if *definition == Definition::Package {
            continue;
        }
        let clash = visible
            .iter()
            .find(|f| f.lookup(symbol).map_or(false, |d| *d != Definition::Package));
        if let Some(other) = clash {
            listener.validation_error(
                Diagnostic::validation(
                    ValidationCause::DuplicateName,
                    format!("\"{}\" is already defined in file \"{}\"", symbol, other.name()),
                )
                .in_file(proto.name()),
            );
        }
    }
}

/// An extension of `proto` whose (extendee, number) is taken by a reachable extension.
fn check_extension_numbers(
    proto: &FileDescriptorProto,
    dependencies: &[Arc<FileDescriptor>],
    listener: &mut dyn ErrorListener,
) {
    let (_, collisions) = registry_for(proto, dependencies);
    for (rejected, existing) in collisions {
        listener.validation_error(
            Diagnostic::validation(
                ValidationCause::DuplicateExtensionNumber,
                format!(
                    "extension number {} of \"{}\" is used by both \"{}\" and \"{}\" (in \"{}\")",
                    rejected.number, rejected.extendee, rejected.full_name, existing.full_name, existing.file
                ),
            )
            .in_file(proto.name()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCollector;

    #[test]
    fn test_duplicate_input_rejected() {
        let mut compiler = Compiler::new(BuildOptions::default());
        compiler.add_source("a.proto", "syntax = \"proto3\";").unwrap();
        let err = compiler.add_source("a.proto", "").unwrap_err();
        assert_eq!(err, CompileError::DuplicateFile("a.proto".into()));
    }

    #[test]
    fn test_order_follows_dependencies() {
        let mut compiler = Compiler::new(BuildOptions::default());
        compiler
            .add_source("b.proto", "syntax = \"proto3\"; import \"a.proto\"; message B { A a = 1; }")
            .unwrap();
        compiler.add_source("a.proto", "syntax = \"proto3\"; message A {}").unwrap();
        let mut diagnostics = DiagnosticCollector::new();
        let files = compiler.build(&mut diagnostics).unwrap();
        assert!(diagnostics.is_empty(), "{:?}", diagnostics.validation);
        assert_eq!(files.names().collect::<Vec<_>>(), ["a.proto", "b.proto"]);
        let b = files.get("b.proto").unwrap();
        assert_eq!(b.proto().message_type[0].field[0].type_name.as_deref(), Some(".A"));
        assert!(Arc::ptr_eq(&b.dependencies()[0], files.get("a.proto").unwrap()));
    }

    #[test]
    fn test_syntax_error_drops_file() {
        let mut compiler = Compiler::new(BuildOptions::default());
        compiler.add_source("bad.proto", "message {").unwrap();
        compiler.add_source("user.proto", "import \"bad.proto\";").unwrap();
        let mut diagnostics = DiagnosticCollector::new();
        let files = compiler.build(&mut diagnostics).unwrap();
        assert!(files.is_empty());
        assert_eq!(diagnostics.syntax.len(), 1);
        assert_eq!(diagnostics.syntax[0].file.as_deref(), Some("bad.proto"));
        assert!(diagnostics.validation.is_empty());
    }

    #[test]
    fn test_meta_schema_input_is_substituted() {
        let mut compiler = Compiler::new(BuildOptions::default());
        compiler.add_source(META_SCHEMA_FILE, "this is not parsed").unwrap();
        let mut diagnostics = DiagnosticCollector::new();
        let files = compiler.build(&mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
        assert!(Arc::ptr_eq(files.get(META_SCHEMA_FILE).unwrap(), meta_schema()));
    }
}
