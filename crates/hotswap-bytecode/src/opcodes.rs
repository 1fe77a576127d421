//! Opcode constants
//!
//! Numeric values follow the JVM instruction set so units produced by
//! front-ends that already speak it can be converted without a lookup table.

macro_rules! opcodes {
    ($($name:ident = $value:literal => $mnemonic:literal),* $(,)?) => {
        $(
            #[allow(missing_docs)]
            pub const $name: u8 = $value;
        )*

        /// Mnemonic for an opcode, lowercase as printed by the disassembler
        #[must_use]
        pub fn mnemonic(opcode: u8) -> Option<&'static str> {
            match opcode {
                $($value => Some($mnemonic),)*
                _ => None,
            }
        }
    };
}

opcodes! {
    NOP = 0 => "nop",
    ACONST_NULL = 1 => "aconst_null",
    ICONST_M1 = 2 => "iconst_m1",
    ICONST_0 = 3 => "iconst_0",
    ICONST_1 = 4 => "iconst_1",
    ICONST_2 = 5 => "iconst_2",
    ICONST_3 = 6 => "iconst_3",
    ICONST_4 = 7 => "iconst_4",
    ICONST_5 = 8 => "iconst_5",
    LCONST_0 = 9 => "lconst_0",
    LCONST_1 = 10 => "lconst_1",
    FCONST_0 = 11 => "fconst_0",
    FCONST_1 = 12 => "fconst_1",
    FCONST_2 = 13 => "fconst_2",
    DCONST_0 = 14 => "dconst_0",
    DCONST_1 = 15 => "dconst_1",
    BIPUSH = 16 => "bipush",
    SIPUSH = 17 => "sipush",
    LDC = 18 => "ldc",
    ILOAD = 21 => "iload",
    LLOAD = 22 => "lload",
    FLOAD = 23 => "fload",
    DLOAD = 24 => "dload",
    ALOAD = 25 => "aload",
    IALOAD = 46 => "iaload",
    LALOAD = 47 => "laload",
    FALOAD = 48 => "faload",
    DALOAD = 49 => "daload",
    AALOAD = 50 => "aaload",
    BALOAD = 51 => "baload",
    CALOAD = 52 => "caload",
    SALOAD = 53 => "saload",
    ISTORE = 54 => "istore",
    LSTORE = 55 => "lstore",
    FSTORE = 56 => "fstore",
    DSTORE = 57 => "dstore",
    ASTORE = 58 => "astore",
    IASTORE = 79 => "iastore",
    LASTORE = 80 => "lastore",
    FASTORE = 81 => "fastore",
    DASTORE = 82 => "dastore",
    AASTORE = 83 => "aastore",
    BASTORE = 84 => "bastore",
    CASTORE = 85 => "castore",
    SASTORE = 86 => "sastore",
    POP = 87 => "pop",
    POP2 = 88 => "pop2",
    DUP = 89 => "dup",
    DUP_X1 = 90 => "dup_x1",
    DUP_X2 = 91 => "dup_x2",
    DUP2 = 92 => "dup2",
    DUP2_X1 = 93 => "dup2_x1",
    DUP2_X2 = 94 => "dup2_x2",
    SWAP = 95 => "swap",
    IADD = 96 => "iadd",
    LADD = 97 => "ladd",
    FADD = 98 => "fadd",
    DADD = 99 => "dadd",
    ISUB = 100 => "isub",
    LSUB = 101 => "lsub",
    FSUB = 102 => "fsub",
    DSUB = 103 => "dsub",
    IMUL = 104 => "imul",
    LMUL = 105 => "lmul",
    FMUL = 106 => "fmul",
    DMUL = 107 => "dmul",
    IDIV = 108 => "idiv",
    LDIV = 109 => "ldiv",
    FDIV = 110 => "fdiv",
    DDIV = 111 => "ddiv",
    IREM = 112 => "irem",
    LREM = 113 => "lrem",
    FREM = 114 => "frem",
    DREM = 115 => "drem",
    INEG = 116 => "ineg",
    LNEG = 117 => "lneg",
    FNEG = 118 => "fneg",
    DNEG = 119 => "dneg",
    ISHL = 120 => "ishl",
    LSHL = 121 => "lshl",
    ISHR = 122 => "ishr",
    LSHR = 123 => "lshr",
    IUSHR = 124 => "iushr",
    LUSHR = 125 => "lushr",
    IAND = 126 => "iand",
    LAND = 127 => "land",
    IOR = 128 => "ior",
    LOR = 129 => "lor",
    IXOR = 130 => "ixor",
    LXOR = 131 => "lxor",
    IINC = 132 => "iinc",
    I2L = 133 => "i2l",
    I2F = 134 => "i2f",
    I2D = 135 => "i2d",
    L2I = 136 => "l2i",
    L2F = 137 => "l2f",
    L2D = 138 => "l2d",
    F2I = 139 => "f2i",
    F2L = 140 => "f2l",
    F2D = 141 => "f2d",
    D2I = 142 => "d2i",
    D2L = 143 => "d2l",
    D2F = 144 => "d2f",
    I2B = 145 => "i2b",
    I2C = 146 => "i2c",
    I2S = 147 => "i2s",
    LCMP = 148 => "lcmp",
    FCMPL = 149 => "fcmpl",
    FCMPG = 150 => "fcmpg",
    DCMPL = 151 => "dcmpl",
    DCMPG = 152 => "dcmpg",
    IFEQ = 153 => "ifeq",
    IFNE = 154 => "ifne",
    IFLT = 155 => "iflt",
    IFGE = 156 => "ifge",
    IFGT = 157 => "ifgt",
    IFLE = 158 => "ifle",
    IF_ICMPEQ = 159 => "if_icmpeq",
    IF_ICMPNE = 160 => "if_icmpne",
    IF_ICMPLT = 161 => "if_icmplt",
    IF_ICMPGE = 162 => "if_icmpge",
    IF_ICMPGT = 163 => "if_icmpgt",
    IF_ICMPLE = 164 => "if_icmple",
    IF_ACMPEQ = 165 => "if_acmpeq",
    IF_ACMPNE = 166 => "if_acmpne",
    GOTO = 167 => "goto",
    JSR = 168 => "jsr",
    RET = 169 => "ret",
    TABLESWITCH = 170 => "tableswitch",
    LOOKUPSWITCH = 171 => "lookupswitch",
    IRETURN = 172 => "ireturn",
    LRETURN = 173 => "lreturn",
    FRETURN = 174 => "freturn",
    DRETURN = 175 => "dreturn",
    ARETURN = 176 => "areturn",
    RETURN = 177 => "return",
    GETSTATIC = 178 => "getstatic",
    PUTSTATIC = 179 => "putstatic",
    GETFIELD = 180 => "getfield",
    PUTFIELD = 181 => "putfield",
    INVOKEVIRTUAL = 182 => "invokevirtual",
    INVOKESPECIAL = 183 => "invokespecial",
    INVOKESTATIC = 184 => "invokestatic",
    INVOKEINTERFACE = 185 => "invokeinterface",
    INVOKEDYNAMIC = 186 => "invokedynamic",
    NEW = 187 => "new",
    NEWARRAY = 188 => "newarray",
    ANEWARRAY = 189 => "anewarray",
    ARRAYLENGTH = 190 => "arraylength",
    ATHROW = 191 => "athrow",
    CHECKCAST = 192 => "checkcast",
    INSTANCEOF = 193 => "instanceof",
    MONITORENTER = 194 => "monitorenter",
    MONITOREXIT = 195 => "monitorexit",
    MULTIANEWARRAY = 197 => "multianewarray",
    IFNULL = 198 => "ifnull",
    IFNONNULL = 199 => "ifnonnull",
}

/// Access flag: public
pub const ACC_PUBLIC: u16 = 0x0001;
/// Access flag: private
pub const ACC_PRIVATE: u16 = 0x0002;
/// Access flag: protected
pub const ACC_PROTECTED: u16 = 0x0004;
/// Access flag: static
pub const ACC_STATIC: u16 = 0x0008;
/// Access flag: final
pub const ACC_FINAL: u16 = 0x0010;
/// Access flag: super (set on every modern class)
pub const ACC_SUPER: u16 = 0x0020;
/// Access flag: native
pub const ACC_NATIVE: u16 = 0x0100;
/// Access flag: interface
pub const ACC_INTERFACE: u16 = 0x0200;
/// Access flag: abstract
pub const ACC_ABSTRACT: u16 = 0x0400;
/// Access flag: synthetic
pub const ACC_SYNTHETIC: u16 = 0x1000;

/// True for instructions after which control never falls through
#[inline]
#[must_use]
pub fn is_terminal(opcode: u8) -> bool {
    matches!(
        opcode,
        GOTO | TABLESWITCH
            | LOOKUPSWITCH
            | IRETURN
            | LRETURN
            | FRETURN
            | DRETURN
            | ARETURN
            | RETURN
            | ATHROW
            | RET
    )
}
