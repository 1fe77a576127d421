//! In-memory runtime
//!
//! Stands in for a managed runtime in tests and the CLI. Loaders keep
//! defined units by internal name; hooked loaders consult and fill the
//! generation registry around their own lookup the way a rewritten
//! resolution method does. In-place redefinition is accepted only when the
//! unit's shape is unchanged.
//!
//! The primary loader delegates lookups it cannot answer itself to the
//! child loaders, so types defined by a child are still resolvable by
//! logical name.

use crate::error::{ConstructError, RedefineError, RuntimeError};
use crate::factory::{constructor_descriptor, Instance, ObjectFactory, Value};
use crate::runtime::{LoadedType, Loader, OverrideCapable, Runtime, TypeId};
use crate::transformer::UnitTransformer;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hotswap_bytecode::{decode, peek_name, to_internal_name, JavaType, UnitNode};
use hotswap_registry::{GenerationRegistry, LoaderId, Scope};
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

type Children = Arc<DashMap<LoaderId, Arc<SandboxLoader>>>;

/// Loader of the in-memory runtime
pub struct SandboxLoader {
    id: LoaderId,
    name: String,
    hooked: bool,
    types: DashMap<String, Arc<LoadedType>>,
    registry: Arc<GenerationRegistry<LoadedType>>,
    transformer: Option<Arc<UnitTransformer>>,
    type_ids: Arc<AtomicU64>,
    children: Option<Children>,
    lookups: AtomicUsize,
}

impl fmt::Debug for SandboxLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxLoader")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("hooked", &self.hooked)
            .field("types", &self.types.len())
            .finish_non_exhaustive()
    }
}

impl SandboxLoader {
    /// Loader name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if resolution goes through the registry hook
    #[inline]
    #[must_use]
    pub fn is_hooked(&self) -> bool {
        self.hooked
    }

    /// Number of times the loader's own lookup ran
    #[inline]
    #[must_use]
    pub fn underlying_lookups(&self) -> usize {
        self.lookups.load(Ordering::Acquire)
    }

    /// Type defined by this loader under `name`, bypassing resolution
    #[must_use]
    pub fn defined(&self, name: &str) -> Option<Arc<LoadedType>> {
        self.types.get(name).map(|t| Arc::clone(t.value()))
    }

    /// Initial load of a unit, passing it through the load-time transformer
    ///
    /// # Errors
    /// Returns error if the content is malformed or the name is taken
    pub fn load_unit(&self, bytes: &[u8]) -> Result<Arc<LoadedType>, RuntimeError> {
        let name = peek_name(bytes)?;
        let content = self.transform(&name, bytes).into_owned();
        self.define(&name, content)
    }

    fn transform<'a>(&self, name: &str, bytes: &'a [u8]) -> Cow<'a, [u8]> {
        match &self.transformer {
            Some(t) => t.transform(self, name, bytes),
            None => Cow::Borrowed(bytes),
        }
    }

    fn define(&self, name: &str, content: Vec<u8>) -> Result<Arc<LoadedType>, RuntimeError> {
        let found = peek_name(&content)?;
        if found != name {
            return Err(RuntimeError::NameMismatch {
                expected: name.to_string(),
                found,
            });
        }
        match self.types.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RuntimeError::DuplicateDefinition {
                loader: self.id,
                name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                let id = TypeId(self.type_ids.fetch_add(1, Ordering::Relaxed));
                let ty = Arc::new(LoadedType::new(id, name, self.id, content));
                slot.insert(Arc::clone(&ty));
                tracing::debug!("{} defined {} as {}", self.id, name, id);
                Ok(ty)
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<LoadedType>> {
        self.lookups.fetch_add(1, Ordering::AcqRel);
        self.defined(name)
    }

    fn delegate(&self, name: &str) -> Option<Arc<LoadedType>> {
        let children = self.children.as_ref()?;
        let mut ids: Vec<LoaderId> = children.iter().map(|c| *c.key()).collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| children.get(&id).map(|c| Arc::clone(c.value())))
            .find_map(|child| child.resolve(name).ok())
    }
}

impl Loader for SandboxLoader {
    fn id(&self) -> LoaderId {
        self.id
    }

    fn resolve(&self, name: &str) -> Result<Arc<LoadedType>, RuntimeError> {
        if self.hooked {
            let hit = self
                .registry
                .get(name)
                .or_else(|| self.registry.get_scoped(Scope::Loader(self.id), name));
            if let Some(hit) = hit {
                return Ok(hit);
            }
        }

        if let Some(found) = self.lookup(name) {
            if self.hooked {
                if let Err(e) =
                    self.registry
                        .put_scoped(Scope::Loader(self.id), name, found.internal_name(), &found)
                {
                    tracing::debug!("not caching {}: {}", name, e);
                }
            }
            return Ok(found);
        }

        self.delegate(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
    }

    fn as_override_capable(&self) -> Option<&dyn OverrideCapable> {
        if self.hooked {
            Some(self)
        } else {
            None
        }
    }
}

impl OverrideCapable for SandboxLoader {
    fn define_unit(&self, name: &str, bytes: &[u8]) -> Result<Arc<LoadedType>, RuntimeError> {
        self.define(name, bytes.to_vec())
    }
}

/// Why two units cannot be swapped in place, if they cannot
#[must_use]
pub fn shape_difference(old: &UnitNode, new: &UnitNode) -> Option<String> {
    if old.name != new.name {
        return Some(format!("name {} became {}", old.name, new.name));
    }
    if old.super_name != new.super_name {
        return Some(format!(
            "supertype {:?} became {:?}",
            old.super_name, new.super_name
        ));
    }
    if old.interfaces != new.interfaces {
        return Some("interfaces changed".into());
    }

    let fields = |u: &UnitNode| {
        let mut v: Vec<(String, String, u16)> = u
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.desc.clone(), f.access))
            .collect();
        v.sort();
        v
    };
    if fields(old) != fields(new) {
        return Some("fields changed".into());
    }

    let methods = |u: &UnitNode| {
        let mut v: Vec<(String, String, u16)> = u
            .methods
            .iter()
            .map(|m| (m.name.clone(), m.desc.clone(), m.access))
            .collect();
        v.sort();
        v
    };
    if methods(old) != methods(new) {
        return Some("method signatures changed".into());
    }
    None
}

/// In-memory runtime
pub struct SandboxRuntime {
    registry: Arc<GenerationRegistry<LoadedType>>,
    primary: Arc<SandboxLoader>,
    children: Children,
    transformer: Option<Arc<UnitTransformer>>,
    next_loader: AtomicU64,
    type_ids: Arc<AtomicU64>,
}

impl fmt::Debug for SandboxRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxRuntime")
            .field("primary", &self.primary)
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

impl SandboxRuntime {
    /// Runtime with a hooked primary loader and no load-time transformer
    #[must_use]
    pub fn new(registry: Arc<GenerationRegistry<LoadedType>>) -> Self {
        Self::build(registry, None)
    }

    /// Runtime whose hooked loaders rewrite units at load time
    #[must_use]
    pub fn with_transformer(registry: Arc<GenerationRegistry<LoadedType>>, transformer: UnitTransformer) -> Self {
        Self::build(registry, Some(Arc::new(transformer)))
    }

    fn build(registry: Arc<GenerationRegistry<LoadedType>>, transformer: Option<Arc<UnitTransformer>>) -> Self {
        let type_ids = Arc::new(AtomicU64::new(1));
        let children: Children = Arc::new(DashMap::new());
        let primary = Arc::new(SandboxLoader {
            id: LoaderId(0),
            name: "primary".into(),
            hooked: true,
            types: DashMap::new(),
            registry: Arc::clone(&registry),
            transformer: transformer.clone(),
            type_ids: Arc::clone(&type_ids),
            children: Some(Arc::clone(&children)),
            lookups: AtomicUsize::new(0),
        });
        Self {
            registry,
            primary,
            children,
            transformer,
            next_loader: AtomicU64::new(1),
            type_ids,
        }
    }

    /// Shared registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<GenerationRegistry<LoadedType>> {
        &self.registry
    }

    /// Primary loader
    #[inline]
    #[must_use]
    pub fn primary(&self) -> &Arc<SandboxLoader> {
        &self.primary
    }

    /// Create a child loader
    ///
    /// Hooked loaders consult the registry and expose override capability.
    pub fn add_loader(&self, name: impl Into<String>, hooked: bool) -> Arc<SandboxLoader> {
        let id = LoaderId(self.next_loader.fetch_add(1, Ordering::Relaxed));
        let loader = Arc::new(SandboxLoader {
            id,
            name: name.into(),
            hooked,
            types: DashMap::new(),
            registry: Arc::clone(&self.registry),
            transformer: self.transformer.clone(),
            type_ids: Arc::clone(&self.type_ids),
            children: None,
            lookups: AtomicUsize::new(0),
        });
        self.children.insert(id, Arc::clone(&loader));
        tracing::debug!("added {} ({})", id, loader.name);
        loader
    }

    /// Child loader by id
    #[must_use]
    pub fn sandbox_loader(&self, id: LoaderId) -> Option<Arc<SandboxLoader>> {
        if id == self.primary.id {
            return Some(Arc::clone(&self.primary));
        }
        self.children.get(&id).map(|l| Arc::clone(l.value()))
    }

    /// Drop a child loader and evict its registry scope
    ///
    /// Returns false for the primary loader or an unknown id.
    pub fn drop_loader(&self, id: LoaderId) -> bool {
        if self.children.remove(&id).is_none() {
            return false;
        }
        let evicted = self.registry.evict_loader(id);
        tracing::info!("dropped {} ({} registry entries evicted)", id, evicted);
        true
    }
}

impl Runtime for SandboxRuntime {
    fn primary_loader(&self) -> Arc<dyn Loader> {
        Arc::clone(&self.primary) as Arc<dyn Loader>
    }

    fn loader(&self, id: LoaderId) -> Option<Arc<dyn Loader>> {
        self.sandbox_loader(id).map(|l| l as Arc<dyn Loader>)
    }

    fn redefine(&self, target: &Arc<LoadedType>, bytes: &[u8]) -> Result<(), RedefineError> {
        let loader = self
            .sandbox_loader(target.loader())
            .ok_or_else(|| RedefineError::unsupported(format!("{} is gone", target.loader())))?;
        let content = loader.transform(target.internal_name(), bytes).into_owned();

        let old = decode(&target.content())?;
        let new = decode(&content)?;
        if let Some(reason) = shape_difference(&old, &new) {
            return Err(RedefineError::Unsupported(reason));
        }
        target.redefine_content(content);
        Ok(())
    }
}

/// Factory resolving names through the sandbox's primary loader
#[derive(Debug, Clone)]
pub struct SandboxFactory {
    runtime: Arc<SandboxRuntime>,
}

impl SandboxFactory {
    /// Factory over `runtime`
    #[inline]
    #[must_use]
    pub fn new(runtime: Arc<SandboxRuntime>) -> Self {
        Self { runtime }
    }
}

impl ObjectFactory for SandboxFactory {
    fn construct(&self, name: &str, types: &[JavaType], values: Vec<Value>) -> Result<Instance, ConstructError> {
        let internal = to_internal_name(name);
        let ty = self
            .runtime
            .primary
            .resolve(&internal)
            .map_err(|_| ConstructError::NotFound(name.to_string()))?;
        let unit = decode(&ty.content()).map_err(|e| ConstructError::failed(&internal, e.to_string()))?;

        let desc = constructor_descriptor(types);
        if unit.method("<init>", &desc).is_none() {
            return Err(ConstructError::NoSuchConstructor {
                name: ty.internal_name().to_string(),
                desc,
            });
        }
        if values.len() != types.len() {
            return Err(ConstructError::failed(
                &internal,
                format!("{} values for {} parameters", values.len(), types.len()),
            ));
        }
        if let Some((i, param)) = types
            .iter()
            .zip(&values)
            .enumerate()
            .find_map(|(i, (t, v))| (!v.fits(t)).then_some((i, t)))
        {
            return Err(ConstructError::failed(&internal, format!("argument {i} is not a {param}")));
        }

        tracing::trace!("constructing {} via {}", ty.internal_name(), desc);
        Ok(Instance {
            ty,
            ctor_desc: desc,
            args: values,
        })
    }
}
