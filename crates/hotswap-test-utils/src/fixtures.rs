//! Unit and method fixtures

use hotswap_bytecode::opcodes::*;
use hotswap_bytecode::{Insn, JavaType, Label, MethodNode, UnitNode};

pub const OBJECT: &str = "java/lang/Object";
pub const URL_LOADER: &str = "java/net/URLClassLoader";
pub const LOAD_CLASS: &str = "loadClass";
pub const LOAD_CLASS_DESC: &str = "(Ljava/lang/String;Z)Ljava/lang/Class;";

/// Plain unit extending the root object type with a no-arg constructor
pub fn simple_unit(name: &str) -> UnitNode {
    let mut unit = UnitNode::new(name, Some(OBJECT.to_string()));
    unit.methods.push(default_init(OBJECT));
    unit
}

/// `<init>()V` calling the given supertype's no-arg constructor
pub fn default_init(super_name: &str) -> MethodNode {
    MethodNode::new(ACC_PUBLIC, "<init>", "()V").with_code(
        vec![
            Insn::var(ALOAD, 0),
            Insn::method(INVOKESPECIAL, super_name, "<init>", "()V"),
            Insn::simple(RETURN),
        ],
        1,
        1,
    )
}

/// Public static method with the given body
pub fn static_method(name: &str, desc: &str, insns: Vec<Insn>, max_stack: u16, max_locals: u16) -> MethodNode {
    MethodNode::new(ACC_PUBLIC | ACC_STATIC, name, desc).with_code(insns, max_stack, max_locals)
}

/// Public instance method with the given body
pub fn instance_method(name: &str, desc: &str, insns: Vec<Insn>, max_stack: u16, max_locals: u16) -> MethodNode {
    MethodNode::new(ACC_PUBLIC, name, desc).with_code(insns, max_stack, max_locals)
}

/// Instruction loading a local of the given type
pub fn load(ty: &JavaType, var: u16) -> Insn {
    Insn::var(ty.load_opcode(), var)
}

/// `new T; [dup]; <args>; invokespecial T.<init>(desc)`
pub fn construction(ty: &str, ctor_desc: &str, arg_loads: Vec<Insn>, dup: bool) -> Vec<Insn> {
    let mut out = vec![Insn::type_insn(NEW, ty)];
    if dup {
        out.push(Insn::simple(DUP));
    }
    out.extend(arg_loads);
    out.push(Insn::method(INVOKESPECIAL, ty, "<init>", ctor_desc));
    out
}

/// Static factory-style method: builds one `ty` from its parameters and returns it
///
/// Parameters are loaded in order from locals starting at 0.
pub fn make_method(name: &str, ty: &str, params: &[JavaType]) -> MethodNode {
    let mut ctor_desc = String::from("(");
    let mut loads = Vec::new();
    let mut slot = 0;
    for p in params {
        ctor_desc.push_str(&p.to_string());
        loads.push(load(p, slot));
        slot += p.slots();
    }
    ctor_desc.push_str(")V");

    let mut insns = construction(ty, &ctor_desc, loads, true);
    insns.push(Insn::simple(ARETURN));
    let method_desc = format!("{}L{ty};", &ctor_desc[..ctor_desc.len() - 1]);
    static_method(name, &method_desc, insns, slot + 2, slot)
}

/// Unit extending a loader base with a `loadClass` that delegates upward
pub fn loader_unit(name: &str, super_name: &str) -> UnitNode {
    let mut unit = UnitNode::new(name, Some(super_name.to_string()));
    unit.methods.push(default_init(super_name));
    unit.methods.push(instance_method(
        LOAD_CLASS,
        LOAD_CLASS_DESC,
        vec![
            Insn::var(ALOAD, 0),
            Insn::var(ALOAD, 1),
            Insn::var(ILOAD, 2),
            Insn::method(INVOKESPECIAL, super_name, LOAD_CLASS, LOAD_CLASS_DESC),
            Insn::simple(ARETURN),
        ],
        3,
        3,
    ));
    unit
}

/// `loadClass` body with two return paths: a cached lookup and a delegation
pub fn branching_load_class(super_name: &str) -> MethodNode {
    let miss = Label(0);
    instance_method(
        LOAD_CLASS,
        LOAD_CLASS_DESC,
        vec![
            Insn::var(ALOAD, 0),
            Insn::var(ALOAD, 1),
            Insn::method(
                INVOKEVIRTUAL,
                "java/lang/ClassLoader",
                "findLoadedClass",
                "(Ljava/lang/String;)Ljava/lang/Class;",
            ),
            Insn::simple(DUP),
            Insn::jump(IFNULL, miss),
            Insn::simple(ARETURN),
            Insn::Label(miss),
            Insn::simple(POP),
            Insn::var(ALOAD, 0),
            Insn::var(ALOAD, 1),
            Insn::var(ILOAD, 2),
            Insn::method(INVOKESPECIAL, super_name, LOAD_CLASS, LOAD_CLASS_DESC),
            Insn::simple(ARETURN),
        ],
        3,
        3,
    )
}

/// Count `new` instructions of a type
pub fn count_new(method: &MethodNode, ty: &str) -> usize {
    method
        .insns
        .iter()
        .filter(|i| matches!(i, Insn::Type { opcode, ty: t } if *opcode == NEW && t == ty))
        .count()
}

/// Count invocations of `owner.name`
pub fn count_calls(method: &MethodNode, owner: &str, name: &str) -> usize {
    method
        .insns
        .iter()
        .filter(|i| matches!(i, Insn::Method { owner: o, name: n, .. } if o == owner && n == name))
        .count()
}
