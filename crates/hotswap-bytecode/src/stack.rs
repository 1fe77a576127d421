//! Operand stack effects
//!
//! Counts are in slots: `long` and `double` values take two.

use crate::descriptor::{JavaType, MethodDescriptor};
use crate::insn::Insn;
use crate::opcodes::*;

/// Slots consumed and produced by one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: u16,
    pub pushes: u16,
}

impl StackEffect {
    #[inline]
    const fn new(pops: u16, pushes: u16) -> Self {
        Self { pops, pushes }
    }

    /// Net change in depth
    #[inline]
    #[must_use]
    pub fn delta(self) -> i32 {
        i32::from(self.pushes) - i32::from(self.pops)
    }
}

/// Stack effect of an instruction
///
/// Pseudo-instructions have no effect. Returns `None` for unknown opcodes
/// and for field/method instructions with malformed descriptors.
#[must_use]
pub fn stack_effect(insn: &Insn) -> Option<StackEffect> {
    let e = StackEffect::new;
    match insn {
        Insn::Label(_) | Insn::LineNumber { .. } => Some(e(0, 0)),
        Insn::Ldc(c) => Some(e(0, c.slots())),
        Insn::Iinc { .. } => Some(e(0, 0)),
        Insn::MultiANewArray { dims, .. } => Some(e(u16::from(*dims), 1)),
        Insn::Switch { .. } => Some(e(1, 0)),
        Insn::Jump { opcode, .. } => jump_effect(*opcode),
        Insn::Int { opcode, .. } => match *opcode {
            BIPUSH | SIPUSH => Some(e(0, 1)),
            NEWARRAY => Some(e(1, 1)),
            _ => None,
        },
        Insn::Var { opcode, .. } => match *opcode {
            ILOAD | FLOAD | ALOAD => Some(e(0, 1)),
            LLOAD | DLOAD => Some(e(0, 2)),
            ISTORE | FSTORE | ASTORE => Some(e(1, 0)),
            LSTORE | DSTORE => Some(e(2, 0)),
            RET => Some(e(0, 0)),
            _ => None,
        },
        Insn::Type { opcode, .. } => match *opcode {
            NEW => Some(e(0, 1)),
            ANEWARRAY | CHECKCAST | INSTANCEOF => Some(e(1, 1)),
            _ => None,
        },
        Insn::Field { opcode, desc, .. } => {
            let size = JavaType::parse(desc).ok()?.slots();
            match *opcode {
                GETSTATIC => Some(e(0, size)),
                PUTSTATIC => Some(e(size, 0)),
                GETFIELD => Some(e(1, size)),
                PUTFIELD => Some(e(1 + size, 0)),
                _ => None,
            }
        }
        Insn::Method { opcode, desc, .. } => {
            let md = MethodDescriptor::parse(desc).ok()?;
            let receiver = u16::from(!matches!(*opcode, INVOKESTATIC | INVOKEDYNAMIC));
            match *opcode {
                INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE | INVOKEDYNAMIC => {
                    Some(e(md.arg_slots() + receiver, md.ret.slots()))
                }
                _ => None,
            }
        }
        Insn::Simple { opcode } => simple_effect(*opcode),
    }
}

fn jump_effect(opcode: u8) -> Option<StackEffect> {
    let e = StackEffect::new;
    match opcode {
        IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE | IFNULL | IFNONNULL => Some(e(1, 0)),
        IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT | IF_ICMPGE | IF_ICMPGT | IF_ICMPLE | IF_ACMPEQ
        | IF_ACMPNE => Some(e(2, 0)),
        GOTO => Some(e(0, 0)),
        JSR => Some(e(0, 1)),
        _ => None,
    }
}

fn simple_effect(opcode: u8) -> Option<StackEffect> {
    let e = StackEffect::new;
    let effect = match opcode {
        NOP | RETURN => e(0, 0),
        ACONST_NULL | ICONST_M1 | ICONST_0 | ICONST_1 | ICONST_2 | ICONST_3 | ICONST_4
        | ICONST_5 | FCONST_0 | FCONST_1 | FCONST_2 => e(0, 1),
        LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => e(0, 2),

        IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD => e(2, 1),
        LALOAD | DALOAD => e(2, 2),
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => e(3, 0),
        LASTORE | DASTORE => e(4, 0),

        POP => e(1, 0),
        POP2 => e(2, 0),
        DUP => e(1, 2),
        DUP_X1 => e(2, 3),
        DUP_X2 => e(3, 4),
        DUP2 => e(2, 4),
        DUP2_X1 => e(3, 5),
        DUP2_X2 => e(4, 6),
        SWAP => e(2, 2),

        IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR | FADD
        | FSUB | FMUL | FDIV | FREM => e(2, 1),
        LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR | DADD | DSUB | DMUL | DDIV
        | DREM => e(4, 2),
        LSHL | LSHR | LUSHR => e(3, 2),
        INEG | FNEG => e(1, 1),
        LNEG | DNEG => e(2, 2),

        I2L | I2D | F2L | F2D => e(1, 2),
        I2F | F2I | I2B | I2C | I2S => e(1, 1),
        L2I | L2F | D2I | D2F => e(2, 1),
        L2D | D2L => e(2, 2),

        LCMP | DCMPL | DCMPG => e(4, 1),
        FCMPL | FCMPG => e(2, 1),

        IRETURN | FRETURN | ARETURN | ATHROW | MONITORENTER | MONITOREXIT => e(1, 0),
        LRETURN | DRETURN => e(2, 0),
        ARRAYLENGTH => e(1, 1),
        _ => return None,
    };
    Some(effect)
}

/// Walk a straight-line sequence and return the peak depth reached above
/// `start`, or `None` if some instruction has no known effect or the
/// sequence underflows
#[must_use]
pub fn peak_depth(insns: &[Insn], start: u16) -> Option<u16> {
    let mut depth = i32::from(start);
    let mut peak = depth;
    for insn in insns {
        let effect = stack_effect(insn)?;
        depth -= i32::from(effect.pops);
        if depth < 0 {
            return None;
        }
        depth += i32::from(effect.pushes);
        peak = peak.max(depth);
    }
    u16::try_from(peak).ok()
}
