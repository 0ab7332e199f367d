//! Finalized files and the cross-file view used to resolve names against them.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use crate::descriptor::*;
use crate::registry::{self, ExtensionRegistry};
use crate::symbols::SymbolKind;

/// Type information the decoder and the option machinery consult. Names are full names
/// without the leading dot.
pub trait TypeLookup {
    fn find_message(&self, full_name: &str) -> Option<&DescriptorProto>;

    fn find_enum(&self, full_name: &str) -> Option<&EnumDescriptorProto>;

    fn find_extension(&self, _full_name: &str) -> Option<&FieldDescriptorProto> {
        None
    }
}

/// What a full name denotes inside one file. Paths are structural paths into the file's
/// descriptor proto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    Package,
    Message(Vec<i32>),
    Enum(Vec<i32>),
    Service(Vec<i32>),
    Extension(Vec<i32>),
}

impl Definition {
    /// The symbol kind for type-like definitions. Extensions have none.
    pub fn symbol_kind(&self) -> Option<SymbolKind> {
        match self {
            Definition::Package => Some(SymbolKind::Package),
            Definition::Message(_) => Some(SymbolKind::Message),
            Definition::Enum(_) => Some(SymbolKind::Enum),
            Definition::Service(_) => Some(SymbolKind::Service),
            Definition::Extension(_) => None,
        }
    }
}

/// Full name → definition for every symbol one file declares.
#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    entries: IndexMap<String, Definition>,
}

impl SymbolIndex {
    pub fn build(file: &FileDescriptorProto) -> Self {
        let mut index = SymbolIndex::default();
        let package = file.package();
        let mut prefix = String::new();
        for segment in package.split('.').filter(|s| !s.is_empty()) {
            prefix = join_name(&prefix, segment);
            index.entries.insert(prefix.clone(), Definition::Package);
        }

        for (i, msg) in file.message_type.iter().enumerate() {
            index.add_message(msg, package, vec![tags::FILE_MESSAGE_TYPE as i32, i as i32]);
        }
        for (i, en) in file.enum_type.iter().enumerate() {
            index.insert(
                join_name(package, en.name()),
                Definition::Enum(vec![tags::FILE_ENUM_TYPE as i32, i as i32]),
            );
        }
        for (i, svc) in file.service.iter().enumerate() {
            index.insert(
                join_name(package, svc.name.as_deref().unwrap_or("")),
                Definition::Service(vec![tags::FILE_SERVICE as i32, i as i32]),
            );
        }
        for (i, ext) in file.extension.iter().enumerate() {
            index.insert(
                join_name(package, ext.name()),
                Definition::Extension(vec![tags::FILE_EXTENSION as i32, i as i32]),
            );
        }
        index
    }

    fn add_message(&mut self, msg: &DescriptorProto, scope: &str, path: Vec<i32>) {
        let full = join_name(scope, msg.name());
        for (i, nested) in msg.nested_type.iter().enumerate() {
            let mut child = path.clone();
            child.extend([tags::MESSAGE_NESTED_TYPE as i32, i as i32]);
            self.add_message(nested, &full, child);
        }
        for (i, en) in msg.enum_type.iter().enumerate() {
            let mut child = path.clone();
            child.extend([tags::MESSAGE_ENUM_TYPE as i32, i as i32]);
            self.insert(join_name(&full, en.name()), Definition::Enum(child));
        }
        for (i, ext) in msg.extension.iter().enumerate() {
            let mut child = path.clone();
            child.extend([tags::MESSAGE_EXTENSION as i32, i as i32]);
            self.insert(join_name(&full, ext.name()), Definition::Extension(child));
        }
        self.insert(full, Definition::Message(path));
    }

    /// First definition of a name wins.
    fn insert(&mut self, name: String, definition: Definition) {
        self.entries.entry(name).or_insert(definition);
    }

    pub fn get(&self, full_name: &str) -> Option<&Definition> {
        self.entries.get(full_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Definition)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Look up a definition in a file's proto.
fn find_in<'p>(
    proto: &'p FileDescriptorProto,
    index: &SymbolIndex,
    full_name: &str,
) -> Option<(&'p FileDescriptorProto, Definition)> {
    index.get(full_name).map(|d| (proto, d.clone()))
}

/// A finalized, canonical file together with the files it depends on.
///
/// Immutable once built and shared through `Arc` by every file that imports it.
pub struct FileDescriptor {
    proto: FileDescriptorProto,
    index: SymbolIndex,
    dependencies: Vec<Arc<FileDescriptor>>,
    registry: OnceLock<Arc<ExtensionRegistry>>,
}

impl fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("name", &self.name())
            .field("package", &self.package())
            .field(
                "dependencies",
                &self.dependencies.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FileDescriptor {
    pub fn new(proto: FileDescriptorProto, dependencies: Vec<Arc<FileDescriptor>>) -> Self {
        let index = SymbolIndex::build(&proto);
        FileDescriptor {
            proto,
            index,
            dependencies,
            registry: OnceLock::new(),
        }
    }

    pub fn proto(&self) -> &FileDescriptorProto {
        &self.proto
    }

    pub fn name(&self) -> &str {
        self.proto.name()
    }

    pub fn package(&self) -> &str {
        self.proto.package()
    }

    pub fn dependencies(&self) -> &[Arc<FileDescriptor>] {
        &self.dependencies
    }

    pub fn dependency(&self, name: &str) -> Option<&Arc<FileDescriptor>> {
        self.dependencies.iter().find(|d| d.name() == name)
    }

    /// Dependencies imported with `import public`.
    pub fn public_dependencies(&self) -> impl Iterator<Item = &Arc<FileDescriptor>> + '_ {
        self.proto
            .public_dependency_names()
            .filter_map(move |name| self.dependency(name))
    }

    pub fn index(&self) -> &SymbolIndex {
        &self.index
    }

    pub fn lookup(&self, full_name: &str) -> Option<&Definition> {
        self.index.get(full_name)
    }

    /// Extensions of this file and of every file reachable through direct imports and,
    /// transitively, public imports. Computed on first use.
    pub fn full_registry(&self) -> Arc<ExtensionRegistry> {
        self.registry
            .get_or_init(|| Arc::new(registry::build_full_registry(self)))
            .clone()
    }
}

impl TypeLookup for FileDescriptor {
    fn find_message(&self, full_name: &str) -> Option<&DescriptorProto> {
        match self.index.get(full_name)? {
            Definition::Message(path) => self.proto.message_at(path),
            _ => None,
        }
    }

    fn find_enum(&self, full_name: &str) -> Option<&EnumDescriptorProto> {
        match self.index.get(full_name)? {
            Definition::Enum(path) => self.proto.enum_at(path),
            _ => None,
        }
    }

    fn find_extension(&self, full_name: &str) -> Option<&FieldDescriptorProto> {
        match self.index.get(full_name)? {
            Definition::Extension(path) => self.proto.field_at(path),
            _ => None,
        }
    }
}

/// Files whose symbols are visible to an importer of `direct`: the direct dependencies and,
/// transitively, their public dependencies. Deduplicated, in discovery order.
pub fn visible_files(direct: &[Arc<FileDescriptor>]) -> Vec<&FileDescriptor> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut stack: Vec<&FileDescriptor> = direct.iter().rev().map(|d| d.as_ref()).collect();
    while let Some(file) = stack.pop() {
        if !seen.insert(file.name().to_string()) {
            continue;
        }
        out.push(file);
        let public: Vec<_> = file.public_dependencies().map(|d| d.as_ref()).collect();
        stack.extend(public.into_iter().rev());
    }
    out
}

/// The names one file can see: itself, its visible dependencies, and optionally a fallback
/// file (the meta-schema) consulted last.
pub struct Pool<'a> {
    local: Option<(&'a FileDescriptorProto, &'a SymbolIndex)>,
    files: Vec<&'a FileDescriptor>,
    fallback: Option<&'a FileDescriptor>,
}

impl<'a> Pool<'a> {
    /// View for a file still being finalized.
    pub fn new(
        local: &'a FileDescriptorProto,
        index: &'a SymbolIndex,
        dependencies: &'a [Arc<FileDescriptor>],
    ) -> Self {
        Pool {
            local: Some((local, index)),
            files: visible_files(dependencies),
            fallback: None,
        }
    }

    /// View from inside an already finalized file.
    pub fn for_file(file: &'a FileDescriptor) -> Self {
        Pool {
            local: Some((&file.proto, &file.index)),
            files: visible_files(&file.dependencies),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: &'a FileDescriptor) -> Self {
        if !self.files.iter().any(|f| f.name() == fallback.name()) {
            self.fallback = Some(fallback);
        }
        self
    }

    /// Visible dependency files, not including the local file or the fallback.
    pub fn local(&self) -> Option<&'a FileDescriptorProto> {
        self.local.map(|(proto, _)| proto)
    }

    /// Find a full name (no leading dot) in the local file, then each visible file, then the
    /// fallback.
    pub fn lookup(&self, full_name: &str) -> Option<(&'a FileDescriptorProto, Definition)> {
        if let Some((proto, index)) = self.local {
            if let Some(found) = find_in(proto, index, full_name) {
                return Some(found);
            }
        }
        self.files
            .iter()
            .chain(self.fallback.iter())
            .find_map(|&f| find_in(&f.proto, &f.index, full_name))
    }

    /// Resolve `name` as written in `scope` (a full name without leading dot).
    ///
    /// A leading dot means the name is already fully qualified. Otherwise the name is tried
    /// inside `scope`, then inside each enclosing scope out to the root; the first candidate
    /// that exists wins. `accept` filters candidates, so that for example a package does not
    /// shadow a message of the same name further out.
    pub fn resolve_with(
        &self,
        name: &str,
        scope: &str,
        accept: impl Fn(&Definition) -> bool,
    ) -> Option<(String, &'a FileDescriptorProto, Definition)> {
        if let Some(absolute) = name.strip_prefix('.') {
            return self
                .lookup(absolute)
                .filter(|(_, d)| accept(d))
                .map(|(p, d)| (absolute.to_string(), p, d));
        }
        let mut current = Some(scope);
        while let Some(s) = current {
            let candidate = join_name(s, name);
            if let Some((proto, definition)) = self.lookup(&candidate) {
                if accept(&definition) {
                    tracing::trace!(symbol = name, scope, resolved = %candidate, "resolved across files");
                    return Some((candidate, proto, definition));
                }
            }
            current = match s.rfind('.') {
                Some(dot) => Some(&s[..dot]),
                None if !s.is_empty() => Some(""),
                None => None,
            };
        }
        tracing::trace!(symbol = name, scope, "not found across files");
        None
    }

    /// Resolve a type-like name. Returns the full name and symbol kind.
    pub fn resolve(&self, name: &str, scope: &str) -> Option<(String, SymbolKind)> {
        self.resolve_with(name, scope, |d| {
            d.symbol_kind().map_or(false, |k| k != SymbolKind::Package)
        })
        .and_then(|(full, _, d)| d.symbol_kind().map(|k| (full, k)))
    }

    /// Resolve an extension name, innermost scope first. Returns its full name and declaration.
    pub fn resolve_extension(&self, name: &str, scope: &str) -> Option<(String, &'a FieldDescriptorProto)> {
        let (full, proto, definition) =
            self.resolve_with(name, scope, |d| matches!(d, Definition::Extension(_)))?;
        match definition {
            Definition::Extension(path) => proto.field_at(&path).map(|f| (full, f)),
            _ => None,
        }
    }

    /// Name of the visible file (not the local one) that defines `full_name`.
    pub fn defining_file(&self, full_name: &str) -> Option<&'a str> {
        self.files
            .iter()
            .copied()
            .find(|f| f.index.get(full_name).is_some())
            .map(|f| f.name())
    }
}

impl TypeLookup for Pool<'_> {
    fn find_message(&self, full_name: &str) -> Option<&DescriptorProto> {
        match self.lookup(full_name)? {
            (proto, Definition::Message(path)) => proto.message_at(&path),
            _ => None,
        }
    }

    fn find_enum(&self, full_name: &str) -> Option<&EnumDescriptorProto> {
        match self.lookup(full_name)? {
            (proto, Definition::Enum(path)) => proto.enum_at(&path),
            _ => None,
        }
    }

    fn find_extension(&self, full_name: &str) -> Option<&FieldDescriptorProto> {
        match self.lookup(full_name)? {
            (proto, Definition::Extension(path)) => proto.field_at(&path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, package: &str, messages: &[&str], deps: &[&str], public: &[i32]) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.into()),
            package: Some(package.into()),
            dependency: deps.iter().map(|d| d.to_string()).collect(),
            public_dependency: public.to_vec(),
            message_type: messages
                .iter()
                .map(|m| DescriptorProto {
                    name: Some(m.to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_index_covers_nested_symbols() {
        let mut proto = file("a.proto", "x.y", &["M"], &[], &[]);
        proto.message_type[0].nested_type.push(DescriptorProto {
            name: Some("N".into()),
            ..Default::default()
        });
        proto.message_type[0].enum_type.push(EnumDescriptorProto {
            name: Some("E".into()),
            ..Default::default()
        });
        let index = SymbolIndex::build(&proto);
        assert_eq!(index.get("x"), Some(&Definition::Package));
        assert_eq!(index.get("x.y.M.N"), Some(&Definition::Message(vec![4, 0, 3, 0])));
        assert_eq!(index.get("x.y.M.E"), Some(&Definition::Enum(vec![4, 0, 4, 0])));
    }

    #[test]
    fn test_public_imports_propagate() {
        let c = Arc::new(FileDescriptor::new(file("c.proto", "c", &["C"], &[], &[]), vec![]));
        let private = Arc::new(FileDescriptor::new(file("p.proto", "p", &["P"], &[], &[]), vec![]));
        let b = Arc::new(FileDescriptor::new(
            file("b.proto", "b", &["B"], &["c.proto", "p.proto"], &[0]),
            vec![c.clone(), private.clone()],
        ));
        let names: Vec<_> = visible_files(&[b.clone()]).iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["b.proto", "c.proto"]);

        let local = file("a.proto", "a", &[], &["b.proto"], &[]);
        let index = SymbolIndex::build(&local);
        let deps = vec![b];
        let pool = Pool::new(&local, &index, &deps);
        assert_eq!(pool.resolve("c.C", "a"), Some(("c.C".to_string(), SymbolKind::Message)));
        assert_eq!(pool.resolve(".b.B", "a"), Some(("b.B".to_string(), SymbolKind::Message)));
        assert!(pool.resolve("p.P", "a").is_none());
        assert_eq!(pool.defining_file("c.C"), Some("c.proto"));
    }

    #[test]
    fn test_package_does_not_shadow_type() {
        let dep = Arc::new(FileDescriptor::new(file("d.proto", "", &["foo"], &[], &[]), vec![]));
        let local = file("a.proto", "a.foo", &[], &["d.proto"], &[]);
        let index = SymbolIndex::build(&local);
        let deps = vec![dep];
        let pool = Pool::new(&local, &index, &deps);
        // `a.foo` is a package, so the search moves on to the root
        assert_eq!(pool.resolve("foo", "a"), Some(("foo".to_string(), SymbolKind::Message)));
    }
}
