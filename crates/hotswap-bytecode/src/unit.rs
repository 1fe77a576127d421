//! Structured compiled unit

use crate::descriptor::{DescriptorError, MethodDescriptor};
use crate::insn::{Insn, Label, TryCatchBlock};
use crate::opcodes::{ACC_INTERFACE, ACC_STATIC};
use serde::{Deserialize, Serialize};

/// Field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNode {
    pub access: u16,
    pub name: String,
    pub desc: String,
}

impl FieldNode {
    /// Create a field declaration
    #[must_use]
    pub fn new(access: u16, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            desc: desc.into(),
        }
    }
}

/// Method declaration with optional body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodNode {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub exceptions: Vec<String>,
    /// Empty for abstract and native methods
    pub insns: Vec<Insn>,
    pub try_catch_blocks: Vec<TryCatchBlock>,
    pub max_stack: u16,
    pub max_locals: u16,
    next_label: u32,
}

impl MethodNode {
    /// Method without code
    #[must_use]
    pub fn new(access: u16, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            desc: desc.into(),
            exceptions: Vec::new(),
            insns: Vec::new(),
            try_catch_blocks: Vec::new(),
            max_stack: 0,
            max_locals: 0,
            next_label: 0,
        }
    }

    /// Replace the body, keeping label allocation ahead of every label it uses
    #[must_use]
    pub fn with_code(mut self, insns: Vec<Insn>, max_stack: u16, max_locals: u16) -> Self {
        self.set_insns(insns);
        self.max_stack = max_stack;
        self.max_locals = max_locals;
        self
    }

    /// Add a try/catch range
    #[must_use]
    pub fn with_try_catch(mut self, block: TryCatchBlock) -> Self {
        self.bump_label_floor(block.start);
        self.bump_label_floor(block.end);
        self.bump_label_floor(block.handler);
        self.try_catch_blocks.push(block);
        self
    }

    /// Replace the instruction list
    pub fn set_insns(&mut self, insns: Vec<Insn>) {
        for insn in &insns {
            match insn {
                Insn::Label(l) | Insn::LineNumber { start: l, .. } => self.bump_label_floor(*l),
                other => {
                    for l in other.branch_targets() {
                        self.bump_label_floor(l);
                    }
                }
            }
        }
        self.insns = insns;
    }

    /// Allocate a label unique within this method
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// First label number not yet in use
    #[inline]
    #[must_use]
    pub fn next_label(&self) -> u32 {
        self.next_label
    }

    /// Ensure future labels start at or after `next`
    pub fn reserve_labels(&mut self, next: u32) {
        self.next_label = self.next_label.max(next);
    }

    fn bump_label_floor(&mut self, label: Label) {
        self.next_label = self.next_label.max(label.0 + 1);
    }

    /// True if the method carries a body
    #[inline]
    #[must_use]
    pub fn has_code(&self) -> bool {
        !self.insns.is_empty()
    }

    /// True for static methods
    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    /// Parsed descriptor
    ///
    /// # Errors
    /// Returns error if the stored descriptor is malformed
    pub fn descriptor(&self) -> Result<MethodDescriptor, DescriptorError> {
        MethodDescriptor::parse(&self.desc)
    }
}

/// Compiled unit in structured form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitNode {
    /// Class-file major version of the producing front-end
    pub version: u16,
    pub access: u16,
    /// Internal identity (`a/b/C`)
    pub name: String,
    /// Declared supertype; `None` only for the root object type
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,
    pub source_file: Option<String>,
}

impl UnitNode {
    /// Empty unit with the given name and supertype
    #[must_use]
    pub fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            version: 52,
            access: crate::opcodes::ACC_PUBLIC | crate::opcodes::ACC_SUPER,
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
        }
    }

    /// Binary (dotted) form of the unit's name
    #[must_use]
    pub fn binary_name(&self) -> String {
        to_binary_name(&self.name)
    }

    /// True for interfaces
    #[inline]
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access & ACC_INTERFACE != 0
    }

    /// Look up a method by name and descriptor
    #[must_use]
    pub fn method(&self, name: &str, desc: &str) -> Option<&MethodNode> {
        self.methods.iter().find(|m| m.name == name && m.desc == desc)
    }

    /// Look up a field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// `a/b/C` to `a.b.C`
#[inline]
#[must_use]
pub fn to_binary_name(internal: &str) -> String {
    internal.replace('/', ".")
}

/// `a.b.C` to `a/b/C`
#[inline]
#[must_use]
pub fn to_internal_name(binary: &str) -> String {
    binary.replace('.', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    #[test]
    fn labels_allocated_past_existing_ones() {
        let mut m = MethodNode::new(ACC_PUBLIC, "run", "()V").with_code(
            vec![
                Insn::Label(Label(3)),
                Insn::jump(GOTO, Label(7)),
                Insn::Label(Label(7)),
                Insn::simple(RETURN),
            ],
            0,
            1,
        );
        assert_eq!(m.new_label(), Label(8));
        assert_eq!(m.new_label(), Label(9));
    }

    #[test]
    fn try_catch_reserves_labels() {
        let mut m = MethodNode::new(ACC_PUBLIC, "run", "()V").with_try_catch(TryCatchBlock {
            start: Label(0),
            end: Label(1),
            handler: Label(12),
            catch_type: None,
        });
        assert_eq!(m.new_label(), Label(13));
    }

    #[test]
    fn names() {
        let unit = UnitNode::new("a/b/C", Some("java/lang/Object".into()));
        assert_eq!(unit.binary_name(), "a.b.C");
        assert_eq!(to_internal_name("x.y.Z"), "x/y/Z");
        assert!(!unit.is_interface());
    }

    #[test]
    fn lookup() {
        let mut unit = UnitNode::new("a/C", Some("java/lang/Object".into()));
        unit.fields.push(FieldNode::new(ACC_PRIVATE, "count", "I"));
        unit.methods.push(MethodNode::new(ACC_PUBLIC, "<init>", "()V"));
        assert!(unit.method("<init>", "()V").is_some());
        assert!(unit.method("<init>", "(I)V").is_none());
        assert_eq!(unit.field("count").map(|f| f.desc.as_str()), Some("I"));
        assert!(!unit.methods[0].has_code());
    }
}
