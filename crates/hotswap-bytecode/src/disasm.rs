//! Text rendering of units for diagnostics

use crate::insn::Insn;
use crate::opcodes::{self, mnemonic};
use crate::unit::{MethodNode, UnitNode};
use std::fmt::Write;

fn access_words(access: u16) -> String {
    const FLAGS: [(u16, &str); 8] = [
        (opcodes::ACC_PUBLIC, "public"),
        (opcodes::ACC_PRIVATE, "private"),
        (opcodes::ACC_PROTECTED, "protected"),
        (opcodes::ACC_STATIC, "static"),
        (opcodes::ACC_FINAL, "final"),
        (opcodes::ACC_NATIVE, "native"),
        (opcodes::ACC_ABSTRACT, "abstract"),
        (opcodes::ACC_SYNTHETIC, "synthetic"),
    ];
    FLAGS
        .iter()
        .filter(|(bit, _)| access & bit != 0)
        .map(|(_, word)| *word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn op(opcode: u8) -> String {
    mnemonic(opcode).map_or_else(|| format!("op{opcode}"), str::to_string)
}

/// Render one instruction
#[must_use]
pub fn format_insn(insn: &Insn) -> String {
    match insn {
        Insn::Simple { opcode } => op(*opcode),
        Insn::Int { opcode, operand } => format!("{} {operand}", op(*opcode)),
        Insn::Var { opcode, var } => format!("{} {var}", op(*opcode)),
        Insn::Type { opcode, ty } => format!("{} {ty}", op(*opcode)),
        Insn::Field {
            opcode,
            owner,
            name,
            desc,
        } => format!("{} {owner}.{name} : {desc}", op(*opcode)),
        Insn::Method {
            opcode,
            owner,
            name,
            desc,
            ..
        } => format!("{} {owner}.{name}{desc}", op(*opcode)),
        Insn::Jump { opcode, target } => format!("{} {target}", op(*opcode)),
        Insn::Label(l) => format!("{l}:"),
        Insn::LineNumber { line, start } => format!("line {line} @{start}"),
        Insn::Ldc(c) => format!("ldc {c}"),
        Insn::Iinc { var, incr } => format!("iinc {var} {incr}"),
        Insn::Switch {
            opcode,
            default,
            cases,
        } => {
            let arms: Vec<String> = cases.iter().map(|(k, l)| format!("{k}: {l}")).collect();
            format!("{} {{ {}, default: {default} }}", op(*opcode), arms.join(", "))
        }
        Insn::MultiANewArray { desc, dims } => format!("multianewarray {desc} {dims}"),
    }
}

fn write_method(out: &mut String, method: &MethodNode) {
    let access = access_words(method.access);
    let _ = write!(out, "  method ");
    if !access.is_empty() {
        let _ = write!(out, "{access} ");
    }
    let _ = write!(out, "{}{}", method.name, method.desc);
    if method.has_code() {
        let _ = writeln!(
            out,
            "  [stack={} locals={}]",
            method.max_stack, method.max_locals
        );
    } else {
        let _ = writeln!(out);
        return;
    }

    for insn in &method.insns {
        let indent = if matches!(insn, Insn::Label(_)) { "   " } else { "      " };
        let _ = writeln!(out, "{indent}{}", format_insn(insn));
    }
    for tcb in &method.try_catch_blocks {
        let _ = writeln!(
            out,
            "    try {}..{} -> {} catch {}",
            tcb.start,
            tcb.end,
            tcb.handler,
            tcb.catch_type.as_deref().unwrap_or("*")
        );
    }
}

/// Render a whole unit
#[must_use]
pub fn disassemble(unit: &UnitNode) -> String {
    let mut out = String::new();
    let kind = if unit.is_interface() { "interface" } else { "class" };
    let access = access_words(unit.access);
    if !access.is_empty() {
        let _ = write!(out, "{access} ");
    }
    let _ = write!(out, "{kind} {}", unit.name);
    if let Some(sup) = &unit.super_name {
        let _ = write!(out, " extends {sup}");
    }
    if !unit.interfaces.is_empty() {
        let _ = write!(out, " implements {}", unit.interfaces.join(", "));
    }
    let _ = writeln!(out);
    if let Some(src) = &unit.source_file {
        let _ = writeln!(out, "  source {src}");
    }

    for field in &unit.fields {
        let access = access_words(field.access);
        let _ = writeln!(out, "  field {access} {} {}", field.name, field.desc);
    }
    for method in &unit.methods {
        write_method(&mut out, method);
    }
    out
}
