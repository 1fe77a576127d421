//! Hotswap Bytecode Model
//!
//! Structured compiled units and the instruction stream rewriters operate on.
//!
//! # Overview
//!
//! - **UnitNode / MethodNode**: a unit's declarations and method bodies
//! - **Insn / Label**: flat instruction lists with symbolic branch targets
//! - **JavaType / MethodDescriptor**: descriptor parsing and formatting
//! - **stack_effect**: slots popped and pushed per instruction
//! - **encode / decode**: magic-tagged binary form of a unit
//!
//! # Example
//!
//! ```rust
//! use hotswap_bytecode::{decode, encode, opcodes::*, Insn, MethodNode, UnitNode};
//!
//! let mut unit = UnitNode::new("demo/Point", Some("java/lang/Object".into()));
//! unit.methods.push(
//!     MethodNode::new(ACC_PUBLIC, "<init>", "()V").with_code(
//!         vec![
//!             Insn::var(ALOAD, 0),
//!             Insn::method(INVOKESPECIAL, "java/lang/Object", "<init>", "()V"),
//!             Insn::simple(RETURN),
//!         ],
//!         1,
//!         1,
//!     ),
//! );
//!
//! let bytes = encode(&unit).unwrap();
//! assert_eq!(decode(&bytes).unwrap().name, "demo/Point");
//! ```

#![warn(missing_docs)]

pub mod codec;
pub mod descriptor;
pub mod disasm;
pub mod insn;
pub mod opcodes;
pub mod stack;
pub mod unit;

// Re-exports
pub use codec::{decode, encode, peek_name, CodecError, FORMAT_VERSION, MAGIC};
pub use descriptor::{
    DescriptorError, JavaType, MethodDescriptor, Primitive, ReturnType, MAX_ARRAY_DIMENSIONS,
};
pub use disasm::{disassemble, format_insn};
pub use insn::{Constant, Insn, InsnList, InsnSink, Label, TryCatchBlock};
pub use stack::{peak_depth, stack_effect, StackEffect};
pub use unit::{to_binary_name, to_internal_name, FieldNode, MethodNode, UnitNode};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for unit manipulation
    pub use crate::{
        decode, encode, Constant, Insn, InsnSink, JavaType, Label, MethodDescriptor, MethodNode,
        Primitive, UnitNode,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
