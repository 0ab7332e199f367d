//! Extension registries: which extension fields are known for which extendee.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::descriptor::*;
use crate::pool::{visible_files, FileDescriptor};
use crate::value::{DynamicMessage, Value};

/// One registered extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionInfo {
    /// Full name without the leading dot.
    pub full_name: String,
    /// Full name of the extended message, without the leading dot.
    pub extendee: String,
    pub number: i32,
    pub field: FieldDescriptorProto,
    /// Name of the file that declares it.
    pub file: String,
    /// Value reported for the extension when it is absent. Message-typed extensions default
    /// to an empty instance of their type.
    pub default: Option<Value>,
}

impl ExtensionInfo {
    pub fn new(full_name: String, field: FieldDescriptorProto, file: &str) -> Self {
        let default = match field.r#type {
            Some(ty) if ty.is_message() => Some(Value::Message(DynamicMessage::new(
                field.type_name_unqualified(),
            ))),
            Some(ty) => Value::default_for(ty),
            None => None,
        };
        ExtensionInfo {
            full_name,
            extendee: field.extendee_unqualified().to_string(),
            number: field.number(),
            field,
            file: file.to_string(),
            default,
        }
    }
}

/// Extensions keyed by (extendee, number) and by full name.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    by_number: HashMap<(String, i32), ExtensionInfo>,
    by_name: IndexMap<String, (String, i32)>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// Register `info`. On a number collision the registry is left unchanged and the
    /// extension already holding that number is returned.
    pub fn insert(&mut self, info: ExtensionInfo) -> Result<(), &ExtensionInfo> {
        let key = (info.extendee.clone(), info.number);
        if self.by_number.contains_key(&key) {
            return Err(&self.by_number[&key]);
        }
        self.by_name.insert(info.full_name.clone(), key.clone());
        self.by_number.insert(key, info);
        Ok(())
    }

    pub fn find(&self, extendee: &str, number: i32) -> Option<&ExtensionInfo> {
        self.by_number.get(&(extendee.to_string(), number))
    }

    pub fn find_by_name(&self, full_name: &str) -> Option<&ExtensionInfo> {
        self.by_name
            .get(full_name)
            .and_then(|key| self.by_number.get(key))
    }

    /// All extensions of `extendee`, in registration order.
    pub fn extensions_of<'r>(&'r self, extendee: &'r str) -> impl Iterator<Item = &'r ExtensionInfo> + 'r {
        self.iter().filter(move |info| info.extendee == extendee)
    }

    /// All extensions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ExtensionInfo> {
        self.by_name
            .values()
            .filter_map(move |key| self.by_number.get(key))
    }

    /// Register every extension `file` declares. Returns the collisions as
    /// (rejected, already registered) pairs.
    pub fn add_file(&mut self, file: &FileDescriptorProto) -> Vec<(ExtensionInfo, ExtensionInfo)> {
        let mut collisions = Vec::new();
        for info in file_extensions(file) {
            if let Err(existing) = self.insert(info.clone()) {
                collisions.push((info, existing.clone()));
            }
        }
        collisions
    }
}

/// Every extension declared in `file`, at top level or nested in messages.
pub fn file_extensions(file: &FileDescriptorProto) -> Vec<ExtensionInfo> {
    let mut out = Vec::new();
    let package = file.package();
    for field in &file.extension {
        out.push(ExtensionInfo::new(join_name(package, field.name()), field.clone(), file.name()));
    }
    for msg in &file.message_type {
        collect_nested(msg, package, file.name(), &mut out);
    }
    out
}

fn collect_nested(msg: &DescriptorProto, scope: &str, file: &str, out: &mut Vec<ExtensionInfo>) {
    let full = join_name(scope, msg.name());
    for field in &msg.extension {
        out.push(ExtensionInfo::new(join_name(&full, field.name()), field.clone(), file));
    }
    for nested in &msg.nested_type {
        collect_nested(nested, &full, file, out);
    }
}

/// Registry of every extension declared in `file` or in a file reachable from it: its direct
/// dependencies and, transitively, their public dependencies. Plain imports of a dependency
/// are not followed.
pub fn build_full_registry(file: &FileDescriptor) -> ExtensionRegistry {
    let (registry, _) = registry_for(file.proto(), file.dependencies());
    tracing::debug!(file = file.name(), extensions = registry.len(), "built extension registry");
    registry
}

/// Registry seen by `proto` when finalized against `dependencies`, assembled from each
/// dependency's cached full registry and then `proto`'s own extensions. Only extensions of
/// files `proto` can see are taken. The collisions returned are those of `proto`'s own
/// extensions against the dependencies or each other.
pub fn registry_for(
    proto: &FileDescriptorProto,
    dependencies: &[Arc<FileDescriptor>],
) -> (ExtensionRegistry, Vec<(ExtensionInfo, ExtensionInfo)>) {
    let files = visible_files(dependencies);
    let visible: HashSet<&str> = files.iter().map(|f| f.name()).collect();

    let mut registry = ExtensionRegistry::new();
    for dep in dependencies {
        let cached = dep.full_registry();
        for info in cached.iter().filter(|info| visible.contains(info.file.as_str())) {
            if registry.find_by_name(&info.full_name).is_none() {
                // First registration wins between dependencies.
                let _ = registry.insert(info.clone());
            }
        }
    }
    let collisions = registry.add_file(proto);
    (registry, collisions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(name: &str, extendee: &str, number: i32, ty: Type) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.into()),
            extendee: Some(format!(".{}", extendee)),
            number: Some(number),
            label: Some(Label::Optional),
            r#type: Some(ty),
            type_name: ty.is_message().then(|| ".pkg.Payload".to_string()),
            ..Default::default()
        }
    }

    fn file_with(name: &str, deps: &[&str], public: &[i32], exts: Vec<FieldDescriptorProto>) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.into()),
            package: Some("pkg".into()),
            dependency: deps.iter().map(|d| d.to_string()).collect(),
            public_dependency: public.to_vec(),
            extension: exts,
            ..Default::default()
        }
    }

    #[test]
    fn test_message_extension_defaults_to_empty_instance() {
        let info = ExtensionInfo::new("pkg.meta".into(), ext("meta", "google.protobuf.FieldOptions", 50001, Type::Message), "a.proto");
        assert_eq!(info.extendee, "google.protobuf.FieldOptions");
        assert_eq!(info.default, Some(Value::Message(DynamicMessage::new("pkg.Payload"))));
        let scalar = ExtensionInfo::new("pkg.n".into(), ext("n", "X", 1, Type::Int32), "a.proto");
        assert_eq!(scalar.default, Some(Value::I32(0)));
    }

    #[test]
    fn test_collision_reported_and_first_kept() {
        let mut registry = ExtensionRegistry::new();
        let first = file_with("a.proto", &[], &[], vec![ext("a", "pkg.M", 100, Type::Int32)]);
        let second = file_with("b.proto", &[], &[], vec![ext("b", "pkg.M", 100, Type::String)]);
        assert!(registry.add_file(&first).is_empty());
        let collisions = registry.add_file(&second);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].1.full_name, "pkg.a");
        assert_eq!(registry.find("pkg.M", 100).unwrap().file, "a.proto");
        assert!(registry.find_by_name("pkg.b").is_none());
    }

    #[test]
    fn test_full_registry_follows_public_edges_only() {
        let leaf_public = Arc::new(FileDescriptor::new(
            file_with("pub.proto", &[], &[], vec![ext("p", "pkg.M", 1, Type::Int32)]),
            vec![],
        ));
        let leaf_private = Arc::new(FileDescriptor::new(
            file_with("priv.proto", &[], &[], vec![ext("q", "pkg.M", 2, Type::Int32)]),
            vec![],
        ));
        let middle = Arc::new(FileDescriptor::new(
            file_with("mid.proto", &["pub.proto", "priv.proto"], &[0], vec![ext("m", "pkg.M", 3, Type::Int32)]),
            vec![leaf_public, leaf_private],
        ));
        let top = FileDescriptor::new(file_with("top.proto", &["mid.proto"], &[], vec![]), vec![middle]);

        let registry = top.full_registry();
        let mut names: Vec<_> = registry.iter().map(|e| e.full_name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["pkg.m", "pkg.p"]);
        assert!(Arc::ptr_eq(&registry, &top.full_registry()));
        assert_eq!(registry.extensions_of("pkg.M").count(), 2);
    }

    #[test]
    fn test_registry_for_reuses_dependency_caches() {
        let leaf = Arc::new(FileDescriptor::new(
            file_with("leaf.proto", &[], &[], vec![ext("leaf", "pkg.M", 10, Type::Int32)]),
            vec![],
        ));
        let hidden = Arc::new(FileDescriptor::new(
            file_with("hidden.proto", &[], &[], vec![ext("hidden", "pkg.M", 11, Type::Int32)]),
            vec![],
        ));
        let reexport = Arc::new(FileDescriptor::new(
            file_with("reexport.proto", &["leaf.proto", "hidden.proto"], &[0], vec![]),
            vec![leaf, hidden],
        ));
        let cached = reexport.full_registry();

        let proto = file_with(
            "new.proto",
            &["reexport.proto"],
            &[],
            vec![ext("clash", "pkg.M", 10, Type::Int32), ext("fresh", "pkg.M", 11, Type::Int32)],
        );
        let (registry, collisions) = registry_for(&proto, &[reexport.clone()]);

        assert!(Arc::ptr_eq(&cached, &reexport.full_registry()));
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].0.full_name, "pkg.clash");
        assert_eq!(collisions[0].1.file, "leaf.proto");
        assert_eq!(registry.find("pkg.M", 11).unwrap().full_name, "pkg.fresh");
        assert!(registry.find_by_name("pkg.hidden").is_none());
    }
}
