//! Identity remapping
//!
//! Rewrites every reference to one internal identity so a unit can be
//! defined under a different name. String constants are left alone.

use hotswap_bytecode::{Constant, Insn, UnitNode};
use std::borrow::Cow;

/// Mapping of internal type names
pub trait Remapper {
    /// Map one internal name (`a/b/C`)
    fn map_type<'a>(&self, internal: &'a str) -> Cow<'a, str>;

    /// Map a type operand, which is either an internal name or an array descriptor
    fn map_type_operand<'a>(&self, operand: &'a str) -> Cow<'a, str> {
        if operand.starts_with('[') {
            Cow::Owned(self.map_desc(operand))
        } else {
            self.map_type(operand)
        }
    }

    /// Map every object type inside a field or method descriptor
    fn map_desc(&self, desc: &str) -> String {
        let mut out = String::with_capacity(desc.len());
        let mut rest = desc;
        while let Some(pos) = rest.find('L') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            match after.find(';') {
                Some(end) => {
                    out.push('L');
                    out.push_str(&self.map_type(&after[..end]));
                    out.push(';');
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[pos..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Maps exactly one name to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRemapper {
    from: String,
    to: String,
}

impl RenameRemapper {
    /// Create remapper from `from` to `to`
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Source name
    #[inline]
    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Target name
    #[inline]
    #[must_use]
    pub fn to(&self) -> &str {
        &self.to
    }
}

impl Remapper for RenameRemapper {
    fn map_type<'a>(&self, internal: &'a str) -> Cow<'a, str> {
        if internal == self.from {
            Cow::Owned(self.to.clone())
        } else {
            Cow::Borrowed(internal)
        }
    }
}

fn remap_insn(insn: &mut Insn, r: &dyn Remapper) {
    match insn {
        Insn::Type { ty, .. } => *ty = r.map_type_operand(ty).into_owned(),
        Insn::Field { owner, desc, .. } => {
            *owner = r.map_type(owner).into_owned();
            *desc = r.map_desc(desc);
        }
        Insn::Method { owner, desc, .. } => {
            *owner = r.map_type_operand(owner).into_owned();
            *desc = r.map_desc(desc);
        }
        Insn::Ldc(Constant::Class(name)) => *name = r.map_type_operand(name).into_owned(),
        Insn::MultiANewArray { desc, .. } => *desc = r.map_desc(desc),
        _ => {}
    }
}

/// Apply a remapper to a whole unit in place
pub fn remap_unit(unit: &mut UnitNode, r: &dyn Remapper) {
    unit.name = r.map_type(&unit.name).into_owned();
    if let Some(sup) = unit.super_name.as_mut() {
        *sup = r.map_type(sup).into_owned();
    }
    for iface in &mut unit.interfaces {
        *iface = r.map_type(iface).into_owned();
    }
    for field in &mut unit.fields {
        field.desc = r.map_desc(&field.desc);
    }
    for method in &mut unit.methods {
        method.desc = r.map_desc(&method.desc);
        for exc in &mut method.exceptions {
            *exc = r.map_type(exc).into_owned();
        }
        for insn in &mut method.insns {
            remap_insn(insn, r);
        }
        for tcb in &mut method.try_catch_blocks {
            if let Some(ty) = tcb.catch_type.as_mut() {
                *ty = r.map_type(ty).into_owned();
            }
        }
    }
}

/// Rename a unit, rewriting all self-references
pub fn rename_unit(unit: &mut UnitNode, new_name: &str) {
    let remapper = RenameRemapper::new(unit.name.clone(), new_name);
    remap_unit(unit, &remapper);
}
