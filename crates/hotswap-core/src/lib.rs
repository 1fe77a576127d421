//! Hotswap Engine
//!
//! Swaps modified units into a running process. Each submission is first
//! offered to the runtime as an in-place redefinition; when the runtime
//! refuses, the unit is installed as a renamed generation and future
//! resolution and construction are redirected to it.
//!
//! # Overview
//!
//! - **HotSwapEngine**: the redefinition/override protocol
//! - **Runtime / Loader / OverrideCapable**: what the engine needs from a runtime
//! - **UnitTransformer**: load-time rewriting for hot-swap aware loaders
//! - **ObjectFactory**: construct-by-name target of rewritten construction sites
//! - **DirectoryWatcher**: feeds changed unit files to the engine
//! - **SandboxRuntime**: in-memory runtime for tests and the CLI
//!
//! # Example
//!
//! ```rust
//! use hotswap_bytecode::{encode, FieldNode, UnitNode};
//! use hotswap_core::{HotSwapEngine, SandboxRuntime, SwapOutcome};
//! use hotswap_registry::GenerationRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(GenerationRegistry::new());
//! let runtime = Arc::new(SandboxRuntime::new(Arc::clone(&registry)));
//! let original = UnitNode::new("demo/Widget", Some("java/lang/Object".into()));
//! runtime.primary().load_unit(&encode(&original).unwrap()).unwrap();
//!
//! let mut changed = original.clone();
//! changed.fields.push(FieldNode::new(0, "count", "I"));
//!
//! let engine = HotSwapEngine::new(runtime, registry);
//! let outcome = engine.submit(&encode(&changed).unwrap()).unwrap();
//! assert!(matches!(outcome, SwapOutcome::Overridden { generation: 0, .. }));
//! assert_eq!(outcome.internal_name(), "demo/Widget$HCR$0");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod factory;
pub mod protocol;
pub mod runtime;
pub mod sandbox;
pub mod transformer;
pub mod watcher;

// Re-exports
pub use config::HotSwapConfig;
pub use error::{
    ConfigError, ConstructError, RedefineError, RuntimeError, SwapError, SwapErrorKind, WatchError,
};
pub use factory::{constructor_descriptor, Instance, ObjectFactory, Value};
pub use protocol::{
    allowed_transitions, validate_transition, EngineStats, HotSwapEngine, SwapOutcome, SwapSession,
    SwapState,
};
pub use runtime::{LoadedType, Loader, OverrideCapable, Runtime, TypeId};
pub use sandbox::{shape_difference, SandboxFactory, SandboxLoader, SandboxRuntime};
pub use transformer::UnitTransformer;
pub use watcher::{unit_files, DirectoryWatcher, UnitSink, WatchHandle};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the engine
    pub use crate::{
        DirectoryWatcher, HotSwapConfig, HotSwapEngine, Loader, Runtime, SandboxRuntime,
        SwapError, SwapOutcome, UnitTransformer,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
