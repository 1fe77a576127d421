//! Testing utilities for the hotswap workspace
//!
//! Shared unit fixtures and a symbolic stack machine for executing
//! rewritten method bodies.

#![allow(missing_docs)]

pub mod fixtures;
pub mod machine;

pub use fixtures::*;
pub use machine::{Call, Heap, HeapObject, Host, MachineError, NoHost, RecordingHost, StackMachine, Value};
