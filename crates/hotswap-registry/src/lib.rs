//! Hotswap Generation Registry
//!
//! Maps a type's logical name to the generation resolution should return.
//! Entries are scoped globally or to a single loader and hold their
//! implementation weakly.
//!
//! # Example
//!
//! ```rust
//! use hotswap_registry::{GenerationRegistry, Scope};
//! use std::sync::Arc;
//!
//! let registry = GenerationRegistry::new();
//! let gen0 = Arc::new("demo/Widget$HCR$0");
//! registry
//!     .activate(Scope::Global, "demo/Widget", "demo/Widget$HCR$0", 0, &gen0)
//!     .unwrap();
//!
//! assert_eq!(registry.get("demo/Widget").as_deref(), Some(&"demo/Widget$HCR$0"));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod registry;
pub mod scope;

// Re-exports
pub use registry::{GenerationRegistry, RegistryError};
pub use scope::{GenerationRecord, LoaderId, Scope};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for the generation registry
    pub use crate::{GenerationRecord, GenerationRegistry, LoaderId, RegistryError, Scope};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
