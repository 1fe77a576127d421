//! Runtime abstraction
//!
//! The engine never touches a managed runtime directly. It resolves names
//! through a [`Loader`], asks the [`Runtime`] for in-place redefinition and
//! defines new generations through a loader's [`OverrideCapable`] side.

use crate::error::{RedefineError, RuntimeError};
use hotswap_registry::LoaderId;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Runtime-wide identity of a defined type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u64);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Handle to a type defined in the runtime
///
/// Identity is stable across in-place redefinition: the handle stays the
/// same while its content and redefinition count change.
pub struct LoadedType {
    id: TypeId,
    internal_name: String,
    loader: LoaderId,
    content: RwLock<Arc<[u8]>>,
    redefinitions: AtomicU32,
}

impl LoadedType {
    /// Create a handle for freshly defined content
    #[must_use]
    pub fn new(id: TypeId, internal_name: impl Into<String>, loader: LoaderId, content: Vec<u8>) -> Self {
        Self {
            id,
            internal_name: internal_name.into(),
            loader,
            content: RwLock::new(content.into()),
            redefinitions: AtomicU32::new(0),
        }
    }

    /// Type identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Name embedded in the defined content
    #[inline]
    #[must_use]
    pub fn internal_name(&self) -> &str {
        &self.internal_name
    }

    /// Defining loader
    #[inline]
    #[must_use]
    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    /// Current content
    #[must_use]
    pub fn content(&self) -> Arc<[u8]> {
        Arc::clone(&self.content.read())
    }

    /// Number of successful in-place redefinitions
    #[inline]
    #[must_use]
    pub fn redefinitions(&self) -> u32 {
        self.redefinitions.load(Ordering::Acquire)
    }

    /// Replace the content after an accepted redefinition
    pub fn redefine_content(&self, content: Vec<u8>) {
        *self.content.write() = content.into();
        self.redefinitions.fetch_add(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for LoadedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedType")
            .field("id", &self.id)
            .field("internal_name", &self.internal_name)
            .field("loader", &self.loader)
            .field("redefinitions", &self.redefinitions())
            .finish_non_exhaustive()
    }
}

/// Ability to define new generations directly
pub trait OverrideCapable: Send + Sync {
    /// Define `bytes` under `name` (internal form)
    ///
    /// # Errors
    /// Returns error if the content is malformed, names another type, or the
    /// name is already defined
    fn define_unit(&self, name: &str, bytes: &[u8]) -> Result<Arc<LoadedType>, RuntimeError>;
}

/// Resolves names to defined types
pub trait Loader: Send + Sync {
    /// Loader identity
    fn id(&self) -> LoaderId;

    /// Resolve an internal name
    ///
    /// # Errors
    /// Returns [`RuntimeError::NotFound`] if nothing answers to the name
    fn resolve(&self, name: &str) -> Result<Arc<LoadedType>, RuntimeError>;

    /// Override capability, if the loader carries the marker
    fn as_override_capable(&self) -> Option<&dyn OverrideCapable>;
}

/// Managed runtime as seen by the engine
pub trait Runtime: Send + Sync {
    /// Loader used to resolve logical names
    fn primary_loader(&self) -> Arc<dyn Loader>;

    /// Look up a loader that is still alive
    fn loader(&self, id: LoaderId) -> Option<Arc<dyn Loader>>;

    /// Replace a type's content in place
    ///
    /// # Errors
    /// Returns [`RedefineError::Unsupported`] when the runtime refuses the
    /// change
    fn redefine(&self, target: &Arc<LoadedType>, bytes: &[u8]) -> Result<(), RedefineError>;
}
