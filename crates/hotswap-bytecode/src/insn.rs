//! Instruction model
//!
//! A method body is a flat list of [`Insn`]s. Branch targets are symbolic
//! [`Label`]s placed in the list as pseudo-instructions, so rewriters can
//! insert and remove code without recomputing offsets.

use crate::opcodes;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Symbolic position inside a method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(pub u32);

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Loadable constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Class literal: internal name, or array descriptor
    Class(String),
}

impl Constant {
    /// Slots pushed when loaded
    #[inline]
    #[must_use]
    pub fn slots(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Float(v) => write!(f, "{v}F"),
            Constant::Double(v) => write!(f, "{v}D"),
            Constant::String(s) => write!(f, "{s:?}"),
            Constant::Class(c) => write!(f, "{c}.class"),
        }
    }
}

/// One instruction or pseudo-instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Insn {
    /// Zero-operand instruction (`dup`, `iadd`, `areturn`, ...)
    Simple { opcode: u8 },
    /// `bipush`, `sipush`, `newarray`
    Int { opcode: u8, operand: i32 },
    /// Local variable load/store/`ret`
    Var { opcode: u8, var: u16 },
    /// `new`, `anewarray`, `checkcast`, `instanceof`
    Type { opcode: u8, ty: String },
    /// Field access
    Field {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
    },
    /// Method invocation
    Method {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
        interface: bool,
    },
    /// Conditional or unconditional branch
    Jump { opcode: u8, target: Label },
    /// Label placement
    Label(Label),
    /// Source line marker, attached to the label preceding it
    LineNumber { line: u32, start: Label },
    /// `ldc`
    Ldc(Constant),
    /// `iinc`
    Iinc { var: u16, incr: i16 },
    /// `tableswitch` / `lookupswitch`
    Switch {
        opcode: u8,
        default: Label,
        cases: Vec<(i32, Label)>,
    },
    /// `multianewarray`
    MultiANewArray { desc: String, dims: u8 },
}

impl Insn {
    /// Zero-operand instruction
    #[inline]
    #[must_use]
    pub const fn simple(opcode: u8) -> Self {
        Insn::Simple { opcode }
    }

    /// Local variable instruction
    #[inline]
    #[must_use]
    pub const fn var(opcode: u8, var: u16) -> Self {
        Insn::Var { opcode, var }
    }

    /// Type instruction
    #[inline]
    #[must_use]
    pub fn type_insn(opcode: u8, ty: impl Into<String>) -> Self {
        Insn::Type {
            opcode,
            ty: ty.into(),
        }
    }

    /// Field instruction
    #[must_use]
    pub fn field(
        opcode: u8,
        owner: impl Into<String>,
        name: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        Insn::Field {
            opcode,
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }

    /// Non-interface method instruction
    #[must_use]
    pub fn method(
        opcode: u8,
        owner: impl Into<String>,
        name: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        Insn::Method {
            opcode,
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
            interface: false,
        }
    }

    /// Branch
    #[inline]
    #[must_use]
    pub const fn jump(opcode: u8, target: Label) -> Self {
        Insn::Jump { opcode, target }
    }

    /// `ldc` of a string
    #[must_use]
    pub fn ldc_string(s: impl Into<String>) -> Self {
        Insn::Ldc(Constant::String(s.into()))
    }

    /// Smallest instruction pushing an int constant
    #[must_use]
    pub fn push_int(value: i32) -> Self {
        match value {
            -1..=5 => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let op = (i32::from(opcodes::ICONST_0) + value) as u8;
                Insn::simple(op)
            }
            v if i8::try_from(v).is_ok() => Insn::Int {
                opcode: opcodes::BIPUSH,
                operand: v,
            },
            v if i16::try_from(v).is_ok() => Insn::Int {
                opcode: opcodes::SIPUSH,
                operand: v,
            },
            v => Insn::Ldc(Constant::Int(v)),
        }
    }

    /// Opcode, or `None` for pseudo-instructions
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Insn::Simple { opcode }
            | Insn::Int { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Type { opcode, .. }
            | Insn::Field { opcode, .. }
            | Insn::Method { opcode, .. }
            | Insn::Jump { opcode, .. }
            | Insn::Switch { opcode, .. } => Some(*opcode),
            Insn::Ldc(_) => Some(opcodes::LDC),
            Insn::Iinc { .. } => Some(opcodes::IINC),
            Insn::MultiANewArray { .. } => Some(opcodes::MULTIANEWARRAY),
            Insn::Label(_) | Insn::LineNumber { .. } => None,
        }
    }

    /// True for `Label` and `LineNumber`
    #[inline]
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        self.opcode().is_none()
    }

    /// True if this is `new` of any type
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Insn::Type { opcode, .. } if *opcode == opcodes::NEW)
    }

    /// True if this is `invokespecial <init>`
    #[inline]
    #[must_use]
    pub fn is_init_call(&self) -> bool {
        matches!(
            self,
            Insn::Method { opcode, name, .. }
                if *opcode == opcodes::INVOKESPECIAL && name == "<init>"
        )
    }

    /// Labels this instruction may transfer control to
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::Switch { default, cases, .. } => std::iter::once(*default)
                .chain(cases.iter().map(|(_, l)| *l))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Exception handler range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryCatchBlock {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    /// Caught type; `None` catches everything
    pub catch_type: Option<String>,
}

/// Destination for emitted instructions
///
/// All rewriters write through this interface so they can be chained or
/// collected into a plain list.
pub trait InsnSink {
    /// Append one instruction
    fn emit(&mut self, insn: Insn);

    /// Allocate a label unique within the method being written
    fn new_label(&mut self) -> Label;
}

/// Sink collecting into a vector with its own label counter
#[derive(Debug, Default, Clone)]
pub struct InsnList {
    /// Instructions written so far
    pub insns: Vec<Insn>,
    next_label: u32,
}

impl InsnList {
    /// Sink whose fresh labels start after `next_label`
    #[must_use]
    pub fn starting_at(next_label: u32) -> Self {
        Self {
            insns: Vec::new(),
            next_label,
        }
    }

    /// Next label the sink would allocate
    #[inline]
    #[must_use]
    pub fn next_label(&self) -> u32 {
        self.next_label
    }

    /// Consume into the instruction vector
    #[must_use]
    pub fn into_insns(self) -> Vec<Insn> {
        self.insns
    }
}

impl InsnSink for InsnList {
    fn emit(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    #[test]
    fn push_int_picks_shortest_form() {
        assert_eq!(Insn::push_int(-1), Insn::simple(ICONST_M1));
        assert_eq!(Insn::push_int(0), Insn::simple(ICONST_0));
        assert_eq!(Insn::push_int(5), Insn::simple(ICONST_5));
        assert_eq!(
            Insn::push_int(6),
            Insn::Int {
                opcode: BIPUSH,
                operand: 6
            }
        );
        assert_eq!(
            Insn::push_int(300),
            Insn::Int {
                opcode: SIPUSH,
                operand: 300
            }
        );
        assert_eq!(Insn::push_int(70_000), Insn::Ldc(Constant::Int(70_000)));
    }

    #[test]
    fn classification() {
        assert!(Insn::type_insn(NEW, "a/B").is_new());
        assert!(!Insn::type_insn(CHECKCAST, "a/B").is_new());
        assert!(Insn::method(INVOKESPECIAL, "a/B", "<init>", "()V").is_init_call());
        assert!(!Insn::method(INVOKEVIRTUAL, "a/B", "<init>", "()V").is_init_call());
        assert!(Insn::Label(Label(0)).is_pseudo());
        assert_eq!(Insn::Iinc { var: 1, incr: 1 }.opcode(), Some(IINC));
    }

    #[test]
    fn switch_targets() {
        let insn = Insn::Switch {
            opcode: LOOKUPSWITCH,
            default: Label(9),
            cases: vec![(1, Label(2)), (5, Label(3))],
        };
        assert_eq!(insn.branch_targets(), vec![Label(9), Label(2), Label(3)]);
    }

    #[test]
    fn list_sink_allocates_fresh_labels() {
        let mut list = InsnList::starting_at(4);
        let a = list.new_label();
        let b = list.new_label();
        assert_eq!((a, b), (Label(4), Label(5)));
        list.emit(Insn::Label(a));
        assert_eq!(list.next_label(), 6);
        assert_eq!(list.into_insns(), vec![Insn::Label(Label(4))]);
    }
}
