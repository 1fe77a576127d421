//! Host symbols referenced by rewritten code
//!
//! Rewritten units call into a small host runtime (the construct-by-name
//! factory and the registry hooks) and are recognized by a marker interface.
//! Their names live here so a host with a different runtime layout can
//! override them.

use serde::{Deserialize, Serialize};

/// Names of host-side types and members used by the rewriters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSymbols {
    /// Owner of the construct-by-name factory
    pub factory_owner: String,
    /// Factory method name
    pub factory_name: String,
    /// Factory descriptor: `(String, Class[], Object[]) -> Object`
    pub factory_desc: String,

    /// Owner of the registry hooks
    pub registry_owner: String,
    /// Lookup hook name
    pub registry_get: String,
    /// Lookup hook descriptor: `(ClassLoader, String) -> Class`
    pub registry_get_desc: String,
    /// Store hook name
    pub registry_put: String,
    /// Store hook descriptor: `(ClassLoader, String, Class) -> void`
    pub registry_put_desc: String,

    /// Override-capability marker interface
    pub marker: String,
    /// Marker method name
    pub marker_method: String,
    /// Marker method descriptor
    pub marker_method_desc: String,

    /// Root object type; its allocations are never rewritten
    pub root_object: String,
    /// Root loader type owning the protected define method
    pub root_loader: String,
    /// Define method on the root loader
    pub define_method: String,
    /// Define method descriptor
    pub define_desc: String,

    /// Supertypes that make a unit loader-like
    pub base_loaders: Vec<String>,
    /// Resolution method name
    pub resolution_method: String,
    /// Resolution method descriptor
    pub resolution_desc: String,
}

impl Default for HostSymbols {
    fn default() -> Self {
        Self {
            factory_owner: "hotswap/runtime/Factory".into(),
            factory_name: "construct".into(),
            factory_desc: "(Ljava/lang/String;[Ljava/lang/Class;[Ljava/lang/Object;)Ljava/lang/Object;"
                .into(),
            registry_owner: "hotswap/runtime/Registry".into(),
            registry_get: "get".into(),
            registry_get_desc: "(Ljava/lang/ClassLoader;Ljava/lang/String;)Ljava/lang/Class;".into(),
            registry_put: "put".into(),
            registry_put_desc: "(Ljava/lang/ClassLoader;Ljava/lang/String;Ljava/lang/Class;)V".into(),
            marker: "hotswap/runtime/OverrideCapable".into(),
            marker_method: "defineUnit".into(),
            marker_method_desc: "(Ljava/lang/String;[BII)Ljava/lang/Class;".into(),
            root_object: "java/lang/Object".into(),
            root_loader: "java/lang/ClassLoader".into(),
            define_method: "defineClass".into(),
            define_desc: "(Ljava/lang/String;[BII)Ljava/lang/Class;".into(),
            base_loaders: vec![
                "java/lang/ClassLoader".into(),
                "java/net/URLClassLoader".into(),
                "java/security/SecureClassLoader".into(),
            ],
            resolution_method: "loadClass".into(),
            resolution_desc: "(Ljava/lang/String;Z)Ljava/lang/Class;".into(),
        }
    }
}

impl HostSymbols {
    /// Default symbols
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the factory owner and method name
    #[inline]
    #[must_use]
    pub fn with_factory(mut self, owner: impl Into<String>, name: impl Into<String>) -> Self {
        self.factory_owner = owner.into();
        self.factory_name = name.into();
        self
    }

    /// Set the registry hook owner
    #[inline]
    #[must_use]
    pub fn with_registry_owner(mut self, owner: impl Into<String>) -> Self {
        self.registry_owner = owner.into();
        self
    }

    /// Set the marker interface
    #[inline]
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Add a loader base type
    #[must_use]
    pub fn with_base_loader(mut self, name: impl Into<String>) -> Self {
        self.base_loaders.push(name.into());
        self
    }

    /// True if `name` is one of the loader base types
    #[inline]
    #[must_use]
    pub fn is_base_loader(&self, name: &str) -> bool {
        self.base_loaders.iter().any(|b| b == name)
    }

    /// True for the resolution method signature
    #[inline]
    #[must_use]
    pub fn is_resolution_method(&self, name: &str, desc: &str) -> bool {
        name == self.resolution_method && desc == self.resolution_desc
    }

    /// True for the marker method signature
    #[inline]
    #[must_use]
    pub fn is_marker_method(&self, name: &str, desc: &str) -> bool {
        name == self.marker_method && desc == self.marker_method_desc
    }
}
