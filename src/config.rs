use std::sync::Arc;

use crate::registry::ExtensionRegistry;

/// Options recognized by the compiler. Passed explicitly into [`crate::Compiler::new`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct BuildOptions {
    /// Reformat default-value text the way protoc renders it. Best effort.
    pub protoc_compatible: bool,
    /// Move custom options into typed extension storage. When `false` they are kept as
    /// unknown bytes on the options message.
    pub custom_options_as_extensions: bool,
    /// Extension registry to use instead of the one built per file.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub registry: Option<Arc<ExtensionRegistry>>,
    /// Report a dependency cycle from every participant instead of once.
    pub show_circular_twice: bool,
    /// Also report stuck edges pointing at inputs that exist but were not built.
    pub show_existing_non_circular: bool,
    /// Fully-qualified type names must name an existing type.
    pub strict_qualified_names: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            protoc_compatible: false,
            custom_options_as_extensions: true,
            registry: None,
            show_circular_twice: false,
            show_existing_non_circular: false,
            strict_qualified_names: true,
        }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protoc_compatible(mut self, value: bool) -> Self {
        self.protoc_compatible = value;
        self
    }

    pub fn custom_options_as_extensions(mut self, value: bool) -> Self {
        self.custom_options_as_extensions = value;
        self
    }

    pub fn registry(mut self, registry: Arc<ExtensionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn show_circular_twice(mut self, value: bool) -> Self {
        self.show_circular_twice = value;
        self
    }

    pub fn show_existing_non_circular(mut self, value: bool) -> Self {
        self.show_existing_non_circular = value;
        self
    }

    pub fn strict_qualified_names(mut self, value: bool) -> Self {
        self.strict_qualified_names = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = BuildOptions::default();
        assert!(!opts.protoc_compatible);
        assert!(opts.custom_options_as_extensions);
        assert!(opts.registry.is_none());
        assert!(!opts.show_circular_twice);
        assert!(opts.strict_qualified_names);
    }

    #[test]
    fn test_setters_chain() {
        let opts = BuildOptions::new()
            .protoc_compatible(true)
            .custom_options_as_extensions(false)
            .show_circular_twice(true);
        assert!(opts.protoc_compatible);
        assert!(!opts.custom_options_as_extensions);
        assert!(opts.show_circular_twice);
    }
}
