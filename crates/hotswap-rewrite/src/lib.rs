//! Hotswap Unit Rewriting
//!
//! Bytecode transformations that let a running process swap in new
//! generations of a type.
//!
//! # Overview
//!
//! - **RenameRemapper / remap_unit**: move a unit to a new internal identity
//! - **ConstructionSiteRewriter**: route object construction through a
//!   construct-by-name factory
//! - **SupertypeRewriter**: retarget super-constructor calls of renamed
//!   generations
//! - **ResolutionHookRewriter**: consult the generation registry from a
//!   loader's resolution method
//! - **UnitRewriter**: picks one strategy per method and applies it
//!
//! # Example
//!
//! ```rust
//! use hotswap_bytecode::{opcodes::*, Insn, MethodNode, UnitNode};
//! use hotswap_rewrite::UnitRewriter;
//!
//! let mut unit = UnitNode::new("demo/Main", Some("java/lang/Object".into()));
//! unit.methods.push(
//!     MethodNode::new(ACC_PUBLIC | ACC_STATIC, "make", "()Ldemo/Widget;").with_code(
//!         vec![
//!             Insn::type_insn(NEW, "demo/Widget"),
//!             Insn::simple(DUP),
//!             Insn::method(INVOKESPECIAL, "demo/Widget", "<init>", "()V"),
//!             Insn::simple(ARETURN),
//!         ],
//!         2,
//!         0,
//!     ),
//! );
//!
//! let report = UnitRewriter::default().rewrite(&mut unit).unwrap();
//! assert_eq!(report.construction_sites, 1);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod construct;
pub mod error;
pub mod hook;
pub mod remap;
pub mod strategy;
pub mod supertype;
pub mod symbols;
pub mod visitor;

// Re-exports
pub use construct::{ConstructionSiteRewriter, STACK_HEADROOM};
pub use error::RewriteError;
pub use hook::ResolutionHookRewriter;
pub use remap::{remap_unit, rename_unit, RenameRemapper, Remapper};
pub use strategy::{rewrite_method, MethodRewriter, MethodStats, Strategy};
pub use supertype::SupertypeRewriter;
pub use symbols::HostSymbols;
pub use visitor::{RewriteReport, UnitPlan, UnitRewriter, DEFAULT_SUFFIX};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for unit rewriting
    pub use crate::{
        remap_unit, rename_unit, HostSymbols, RenameRemapper, Remapper, RewriteError,
        RewriteReport, UnitRewriter,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
