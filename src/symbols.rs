//! Name-visibility tree for one file.
//!
//! Nodes mirror package/message/enum/service nesting. The root is the unnamed global scope;
//! the file's package contributes one node per segment.

use std::collections::HashMap;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Package,
    Message,
    Enum,
    Service,
}

impl SymbolKind {
    /// Containers may hold further symbols; enums and services are leaves.
    pub fn is_container(&self) -> bool {
        matches!(self, SymbolKind::Package | SymbolKind::Message)
    }

    /// Whether a field may be typed by a symbol of this kind.
    pub fn is_type(&self) -> bool {
        matches!(self, SymbolKind::Message | SymbolKind::Enum)
    }
}

#[derive(Debug, Clone)]
struct SymbolNode {
    name: String,
    kind: SymbolKind,
    parent: Option<NodeId>,
    children: HashMap<String, NodeId>,
}

/// A successful lookup: the symbol's full name (no leading dot) and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub node: NodeId,
    pub full_name: String,
    pub kind: SymbolKind,
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    nodes: Vec<SymbolNode>,
    package: NodeId,
    cache_scope: Option<NodeId>,
    cache: HashMap<String, Option<NodeId>>,
}

impl SymbolTable {
    pub fn new(package: &str) -> Self {
        let mut table = SymbolTable {
            nodes: vec![SymbolNode {
                name: String::new(),
                kind: SymbolKind::Package,
                parent: None,
                children: HashMap::new(),
            }],
            package: 0,
            cache_scope: None,
            cache: HashMap::new(),
        };
        let mut current = 0;
        for segment in package.split('.').filter(|s| !s.is_empty()) {
            current = match table.add(current, segment, SymbolKind::Package) {
                Ok(id) | Err(id) => id,
            };
        }
        table.package = current;
        table
    }

    pub fn root(&self) -> NodeId {
        0
    }

    /// Node of the innermost package segment (the root for files without a package).
    pub fn package(&self) -> NodeId {
        self.package
    }

    pub fn kind(&self, node: NodeId) -> SymbolKind {
        self.nodes[node].kind
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    /// Add a child symbol. Fails with the existing node when `parent` already has a child of
    /// that name.
    pub fn add(&mut self, parent: NodeId, name: &str, kind: SymbolKind) -> Result<NodeId, NodeId> {
        if let Some(&existing) = self.nodes[parent].children.get(name) {
            return Err(existing);
        }
        let id = self.nodes.len();
        self.nodes.push(SymbolNode {
            name: name.to_string(),
            kind,
            parent: Some(parent),
            children: HashMap::new(),
        });
        self.nodes[parent].children.insert(name.to_string(), id);
        self.invalidate_cache();
        Ok(id)
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent].children.get(name).copied()
    }

    /// Dotted full name of `node`, without a leading dot.
    pub fn full_name(&self, node: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let n = &self.nodes[id];
            if n.parent.is_some() {
                segments.push(n.name.as_str());
            }
            current = n.parent;
        }
        segments.reverse();
        segments.join(".")
    }

    fn walk(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut current = from;
        for segment in name.split('.') {
            if !self.nodes[current].kind.is_container() {
                return None;
            }
            current = self.child(current, segment)?;
        }
        Some(current)
    }

    fn invalidate_cache(&mut self) {
        if self.cache_scope.take().is_some() {
            tracing::trace!("symbol cache invalidated");
        }
        self.cache.clear();
    }

    /// Resolve `name` as written inside scope `from`.
    ///
    /// A name with a leading `.` is looked up from the root only. Anything else is walked
    /// from `from` and then from each enclosing scope in turn; the first scope at which the
    /// whole dotted name can be walked wins.
    pub fn resolve(&mut self, name: &str, from: NodeId) -> Option<Resolved> {
        if let Some(absolute) = name.strip_prefix('.') {
            return self.walk(self.root(), absolute).map(|node| self.resolved(node));
        }

        if self.cache_scope != Some(from) {
            self.invalidate_cache();
            self.cache_scope = Some(from);
        }
        if let Some(&cached) = self.cache.get(name) {
            return cached.map(|node| self.resolved(node));
        }

        let mut scope = Some(from);
        let mut found = None;
        while let Some(id) = scope {
            if let Some(node) = self.walk(id, name) {
                found = Some(node);
                break;
            }
            scope = self.nodes[id].parent;
        }

        match found {
            Some(node) => tracing::trace!(symbol = name, resolved = %self.full_name(node), "resolved locally"),
            None => tracing::trace!(symbol = name, scope = %self.full_name(from), "not found locally"),
        }
        self.cache.insert(name.to_string(), found);
        found.map(|node| self.resolved(node))
    }

    fn resolved(&self, node: NodeId) -> Resolved {
        Resolved {
            node,
            full_name: self.full_name(node),
            kind: self.nodes[node].kind,
        }
    }
}
