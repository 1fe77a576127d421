//! Symbolic stack machine
//!
//! Executes a single method body over symbolic values so tests can observe
//! what rewritten code actually does: which factory calls it makes, with
//! which argument arrays, and what it returns. Allocation and constructor
//! calls, boxing through the standard wrappers and `Wrapper.TYPE` reads are
//! built in; every other invocation goes to a [`Host`].

use hotswap_bytecode::opcodes::*;
use hotswap_bytecode::{Constant, Insn, JavaType, Label, MethodDescriptor, MethodNode, Primitive};
use std::collections::HashMap;

const STEP_LIMIT: usize = 100_000;

/// Symbolic value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    /// Class object: a class literal or a primitive `TYPE`
    Type(JavaType),
    /// Heap reference
    Ref(usize),
}

impl Value {
    /// True for values taking two slots
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }
}

/// Heap cell
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    /// Allocated by `new`, constructor not yet run
    Uninit { class: String },
    /// Constructed object
    Instance {
        class: String,
        ctor_desc: String,
        ctor_args: Vec<Value>,
        fields: HashMap<String, Value>,
    },
    /// Reference array
    Array { elem: String, items: Vec<Value> },
    /// Boxed primitive produced by `valueOf`
    Boxed(Primitive, Value),
}

/// Object heap shared between the machine and its host
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    /// Allocate a cell and return a reference to it
    pub fn alloc(&mut self, object: HeapObject) -> Value {
        self.objects.push(object);
        Value::Ref(self.objects.len() - 1)
    }

    /// Allocate a constructed instance with no recorded constructor
    pub fn alloc_instance(&mut self, class: impl Into<String>) -> Value {
        self.alloc(HeapObject::Instance {
            class: class.into(),
            ctor_desc: String::new(),
            ctor_args: Vec::new(),
            fields: HashMap::new(),
        })
    }

    /// Look up the cell behind a reference
    #[must_use]
    pub fn get(&self, value: &Value) -> Option<&HeapObject> {
        match value {
            Value::Ref(i) => self.objects.get(*i),
            _ => None,
        }
    }

    fn get_mut(&mut self, value: &Value) -> Result<&mut HeapObject, MachineError> {
        match value {
            Value::Ref(i) => self
                .objects
                .get_mut(*i)
                .ok_or_else(|| MachineError::BadOperand(format!("dangling {value:?}"))),
            Value::Null => Err(MachineError::NullPointer),
            other => Err(MachineError::BadOperand(format!("not a reference: {other:?}"))),
        }
    }

    /// Items of an array reference
    #[must_use]
    pub fn array_items(&self, value: &Value) -> Option<&[Value]> {
        match self.get(value)? {
            HeapObject::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Class name of an instance or uninitialized allocation
    #[must_use]
    pub fn class_of(&self, value: &Value) -> Option<&str> {
        match self.get(value)? {
            HeapObject::Uninit { class } | HeapObject::Instance { class, .. } => Some(class),
            HeapObject::Array { .. } | HeapObject::Boxed(..) => None,
        }
    }

    /// Unboxed payload of a boxed primitive
    #[must_use]
    pub fn unboxed(&self, value: &Value) -> Option<(Primitive, &Value)> {
        match self.get(value)? {
            HeapObject::Boxed(p, v) => Some((*p, v)),
            _ => None,
        }
    }

    /// Number of cells
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing was allocated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// One invocation delegated to the host
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub opcode: u8,
    pub owner: String,
    pub name: String,
    pub desc: String,
    /// Receiver first for instance calls
    pub args: Vec<Value>,
}

/// Execution errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MachineError {
    #[error("stack underflow at instruction {0}")]
    Underflow(usize),
    #[error("unsupported instruction: {0}")]
    Unsupported(String),
    #[error("bad operand: {0}")]
    BadOperand(String),
    #[error("null pointer")]
    NullPointer,
    #[error("unknown label {0}")]
    UnknownLabel(Label),
    #[error("exception thrown")]
    Thrown,
    #[error("step limit exceeded")]
    StepLimit,
    #[error("host rejected call {0}")]
    Host(String),
}

/// Receiver of invocations the machine does not model itself
pub trait Host {
    /// Execute a call and return its result (`None` for void)
    ///
    /// # Errors
    /// Returns error if the host cannot serve the call
    fn invoke(&mut self, heap: &mut Heap, call: &Call) -> Result<Option<Value>, MachineError>;
}

/// Host recording every call and answering through a closure
pub struct RecordingHost<F> {
    pub calls: Vec<Call>,
    respond: F,
}

impl<F> RecordingHost<F>
where
    F: FnMut(&mut Heap, &Call) -> Result<Option<Value>, MachineError>,
{
    pub fn new(respond: F) -> Self {
        Self {
            calls: Vec::new(),
            respond,
        }
    }

    /// Recorded calls to `owner.name`
    pub fn calls_to<'a>(&'a self, owner: &'a str, name: &'a str) -> impl Iterator<Item = &'a Call> {
        self.calls
            .iter()
            .filter(move |c| c.owner == owner && c.name == name)
    }
}

impl<F> Host for RecordingHost<F>
where
    F: FnMut(&mut Heap, &Call) -> Result<Option<Value>, MachineError>,
{
    fn invoke(&mut self, heap: &mut Heap, call: &Call) -> Result<Option<Value>, MachineError> {
        self.calls.push(call.clone());
        (self.respond)(heap, call)
    }
}

/// Host that rejects every call
pub struct NoHost;

impl Host for NoHost {
    fn invoke(&mut self, _heap: &mut Heap, call: &Call) -> Result<Option<Value>, MachineError> {
        Err(MachineError::Host(format!("{}.{}{}", call.owner, call.name, call.desc)))
    }
}

/// Interpreter state
#[derive(Debug, Default)]
pub struct StackMachine {
    pub heap: Heap,
    stack: Vec<Value>,
    locals: HashMap<u16, Value>,
    supertypes: HashMap<String, String>,
    /// Current source line, from line markers passed
    pub line: Option<u32>,
}

impl StackMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `sub` as a direct subtype of `sup` for casts
    #[must_use]
    pub fn with_supertype(mut self, sub: impl Into<String>, sup: impl Into<String>) -> Self {
        self.supertypes.insert(sub.into(), sup.into());
        self
    }

    fn is_assignable(&self, class: &str, target: &str) -> bool {
        if target == "java/lang/Object" {
            return true;
        }
        let mut current = Some(class);
        while let Some(c) = current {
            if c == target {
                return true;
            }
            current = self.supertypes.get(c).map(String::as_str);
        }
        false
    }

    /// Run a method body to completion and return its result
    ///
    /// `args` include the receiver for instance methods.
    ///
    /// # Errors
    /// Returns error if execution hits an unsupported instruction, a type
    /// mismatch, a host failure or `athrow`
    pub fn run(
        &mut self,
        host: &mut dyn Host,
        method: &MethodNode,
        args: Vec<Value>,
    ) -> Result<Option<Value>, MachineError> {
        self.stack.clear();
        self.locals.clear();
        let mut slot = 0u16;
        for arg in args {
            let width = if arg.is_wide() { 2 } else { 1 };
            self.locals.insert(slot, arg);
            slot += width;
        }

        let labels: HashMap<Label, usize> = method
            .insns
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| match insn {
                Insn::Label(l) => Some((*l, i)),
                _ => None,
            })
            .collect();

        let mut pc = 0usize;
        for _ in 0..STEP_LIMIT {
            let Some(insn) = method.insns.get(pc) else {
                return Err(MachineError::BadOperand("fell off end of method".into()));
            };
            match self.step(host, insn, pc)? {
                Flow::Next => pc += 1,
                Flow::Jump(l) => pc = *labels.get(&l).ok_or(MachineError::UnknownLabel(l))?,
                Flow::Return(v) => return Ok(v),
            }
        }
        Err(MachineError::StepLimit)
    }

    fn pop(&mut self, pc: usize) -> Result<Value, MachineError> {
        self.stack.pop().ok_or(MachineError::Underflow(pc))
    }

    fn pop_int(&mut self, pc: usize) -> Result<i32, MachineError> {
        match self.pop(pc)? {
            Value::Int(v) => Ok(v),
            other => Err(MachineError::BadOperand(format!("expected int, got {other:?}"))),
        }
    }

    fn pop_n(&mut self, n: usize, pc: usize) -> Result<Vec<Value>, MachineError> {
        if self.stack.len() < n {
            return Err(MachineError::Underflow(pc));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    #[allow(clippy::too_many_lines)]
    fn step(&mut self, host: &mut dyn Host, insn: &Insn, pc: usize) -> Result<Flow, MachineError> {
        match insn {
            Insn::Label(_) => {}
            Insn::LineNumber { line, .. } => self.line = Some(*line),
            Insn::Ldc(c) => {
                let v = match c {
                    Constant::Int(v) => Value::Int(*v),
                    Constant::Long(v) => Value::Long(*v),
                    Constant::Float(v) => Value::Float(*v),
                    Constant::Double(v) => Value::Double(*v),
                    Constant::String(s) => Value::Str(s.clone()),
                    Constant::Class(name) => Value::Type(class_literal(name)),
                };
                self.stack.push(v);
            }
            Insn::Int { opcode, operand } => match *opcode {
                BIPUSH | SIPUSH => self.stack.push(Value::Int(*operand)),
                other => return Err(unsupported(other)),
            },
            Insn::Var { opcode, var } => match *opcode {
                ILOAD | LLOAD | FLOAD | DLOAD | ALOAD => {
                    let v = self
                        .locals
                        .get(var)
                        .cloned()
                        .ok_or_else(|| MachineError::BadOperand(format!("unset local {var}")))?;
                    self.stack.push(v);
                }
                ISTORE | LSTORE | FSTORE | DSTORE | ASTORE => {
                    let v = self.pop(pc)?;
                    self.locals.insert(*var, v);
                }
                other => return Err(unsupported(other)),
            },
            Insn::Iinc { var, incr } => match self.locals.get_mut(var) {
                Some(Value::Int(v)) => *v += i32::from(*incr),
                _ => return Err(MachineError::BadOperand(format!("iinc on local {var}"))),
            },
            Insn::Type { opcode, ty } => match *opcode {
                NEW => {
                    let r = self.heap.alloc(HeapObject::Uninit { class: ty.clone() });
                    self.stack.push(r);
                }
                ANEWARRAY => {
                    let n = usize::try_from(self.pop_int(pc)?)
                        .map_err(|_| MachineError::BadOperand("negative array size".into()))?;
                    let r = self.heap.alloc(HeapObject::Array {
                        elem: ty.clone(),
                        items: vec![Value::Null; n],
                    });
                    self.stack.push(r);
                }
                CHECKCAST => {
                    let v = self.pop(pc)?;
                    if let Some(class) = self.heap.class_of(&v) {
                        if !self.is_assignable(class, ty) {
                            return Err(MachineError::BadOperand(format!(
                                "cannot cast {class} to {ty}"
                            )));
                        }
                    }
                    self.stack.push(v);
                }
                other => return Err(unsupported(other)),
            },
            Insn::Field {
                opcode,
                owner,
                name,
                desc,
            } => self.field(host, *opcode, owner, name, desc, pc)?,
            Insn::Method {
                opcode,
                owner,
                name,
                desc,
                ..
            } => self.invoke(host, *opcode, owner, name, desc, pc)?,
            Insn::Jump { opcode, target } => {
                let taken = match *opcode {
                    GOTO => true,
                    IFNULL => self.pop(pc)? == Value::Null,
                    IFNONNULL => self.pop(pc)? != Value::Null,
                    IFEQ => self.pop_int(pc)? == 0,
                    IFNE => self.pop_int(pc)? != 0,
                    IF_ICMPEQ | IF_ICMPNE => {
                        let b = self.pop_int(pc)?;
                        let a = self.pop_int(pc)?;
                        (a == b) == (*opcode == IF_ICMPEQ)
                    }
                    IF_ACMPEQ | IF_ACMPNE => {
                        let b = self.pop(pc)?;
                        let a = self.pop(pc)?;
                        (a == b) == (*opcode == IF_ACMPEQ)
                    }
                    other => return Err(unsupported(other)),
                };
                if taken {
                    return Ok(Flow::Jump(*target));
                }
            }
            Insn::Simple { opcode } => return self.simple(*opcode, pc),
            other => return Err(MachineError::Unsupported(format!("{other:?}"))),
        }
        Ok(Flow::Next)
    }

    fn simple(&mut self, opcode: u8, pc: usize) -> Result<Flow, MachineError> {
        match opcode {
            NOP => {}
            ACONST_NULL => self.stack.push(Value::Null),
            ICONST_M1..=ICONST_5 => self.stack.push(Value::Int(i32::from(opcode) - i32::from(ICONST_0))),
            LCONST_0 | LCONST_1 => self.stack.push(Value::Long(i64::from(opcode - LCONST_0))),
            FCONST_0..=FCONST_2 => self.stack.push(Value::Float(f32::from(opcode - FCONST_0))),
            DCONST_0 | DCONST_1 => self.stack.push(Value::Double(f64::from(opcode - DCONST_0))),
            POP => {
                self.pop(pc)?;
            }
            POP2 => {
                if !self.pop(pc)?.is_wide() {
                    self.pop(pc)?;
                }
            }
            DUP => {
                let v = self.stack.last().cloned().ok_or(MachineError::Underflow(pc))?;
                self.stack.push(v);
            }
            DUP_X1 => {
                let a = self.pop(pc)?;
                let b = self.pop(pc)?;
                self.stack.extend([a.clone(), b, a]);
            }
            SWAP => {
                let a = self.pop(pc)?;
                let b = self.pop(pc)?;
                self.stack.extend([a, b]);
            }
            IADD | ISUB | IMUL => {
                let b = self.pop_int(pc)?;
                let a = self.pop_int(pc)?;
                self.stack.push(Value::Int(match opcode {
                    IADD => a.wrapping_add(b),
                    ISUB => a.wrapping_sub(b),
                    _ => a.wrapping_mul(b),
                }));
            }
            AASTORE => {
                let value = self.pop(pc)?;
                let index = self.pop_int(pc)?;
                let array = self.pop(pc)?;
                match self.heap.get_mut(&array)? {
                    HeapObject::Array { items, .. } => {
                        let slot = usize::try_from(index)
                            .ok()
                            .and_then(|i| items.get_mut(i))
                            .ok_or_else(|| MachineError::BadOperand(format!("index {index}")))?;
                        *slot = value;
                    }
                    other => {
                        return Err(MachineError::BadOperand(format!("aastore into {other:?}")))
                    }
                }
            }
            AALOAD => {
                let index = self.pop_int(pc)?;
                let array = self.pop(pc)?;
                let item = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.heap.array_items(&array)?.get(i).cloned())
                    .ok_or_else(|| MachineError::BadOperand(format!("index {index}")))?;
                self.stack.push(item);
            }
            ARRAYLENGTH => {
                let array = self.pop(pc)?;
                let len = self
                    .heap
                    .array_items(&array)
                    .ok_or_else(|| MachineError::BadOperand("arraylength".into()))?
                    .len();
                self.stack.push(Value::Int(i32::try_from(len).unwrap_or(i32::MAX)));
            }
            IRETURN | LRETURN | FRETURN | DRETURN | ARETURN => {
                return Ok(Flow::Return(Some(self.pop(pc)?)))
            }
            RETURN => return Ok(Flow::Return(None)),
            ATHROW => return Err(MachineError::Thrown),
            other => return Err(unsupported(other)),
        }
        Ok(Flow::Next)
    }

    fn field(
        &mut self,
        host: &mut dyn Host,
        opcode: u8,
        owner: &str,
        name: &str,
        desc: &str,
        pc: usize,
    ) -> Result<(), MachineError> {
        match opcode {
            GETSTATIC if name == "TYPE" && desc == "Ljava/lang/Class;" => {
                let p = Primitive::from_wrapper(owner)
                    .ok_or_else(|| MachineError::BadOperand(format!("{owner}.TYPE")))?;
                self.stack.push(Value::Type(JavaType::Primitive(p)));
            }
            GETFIELD => {
                let obj = self.pop(pc)?;
                let value = match self.heap.get_mut(&obj)? {
                    HeapObject::Instance { fields, .. } => {
                        fields.get(name).cloned().unwrap_or(Value::Null)
                    }
                    other => return Err(MachineError::BadOperand(format!("getfield on {other:?}"))),
                };
                self.stack.push(value);
            }
            PUTFIELD => {
                let value = self.pop(pc)?;
                let obj = self.pop(pc)?;
                match self.heap.get_mut(&obj)? {
                    HeapObject::Instance { fields, .. } => {
                        fields.insert(name.to_string(), value);
                    }
                    other => return Err(MachineError::BadOperand(format!("putfield on {other:?}"))),
                }
            }
            _ => {
                let args = if opcode == PUTSTATIC {
                    vec![self.pop(pc)?]
                } else {
                    Vec::new()
                };
                let call = Call {
                    opcode,
                    owner: owner.to_string(),
                    name: name.to_string(),
                    desc: desc.to_string(),
                    args,
                };
                if let Some(v) = host.invoke(&mut self.heap, &call)? {
                    self.stack.push(v);
                }
            }
        }
        Ok(())
    }

    fn invoke(
        &mut self,
        host: &mut dyn Host,
        opcode: u8,
        owner: &str,
        name: &str,
        desc: &str,
        pc: usize,
    ) -> Result<(), MachineError> {
        let md = MethodDescriptor::parse(desc)
            .map_err(|e| MachineError::BadOperand(e.to_string()))?;
        let receiver = usize::from(!matches!(opcode, INVOKESTATIC | INVOKEDYNAMIC));
        let args = self.pop_n(md.params.len() + receiver, pc)?;

        if opcode == INVOKESPECIAL && name == "<init>" {
            let target = &args[0];
            if let Ok(HeapObject::Uninit { class }) = self.heap.get_mut(target) {
                let class = class.clone();
                *self.heap.get_mut(target)? = HeapObject::Instance {
                    class,
                    ctor_desc: desc.to_string(),
                    ctor_args: args[1..].to_vec(),
                    fields: HashMap::new(),
                };
                return Ok(());
            }
        }

        if let Some(p) = Primitive::from_wrapper(owner) {
            if opcode == INVOKESTATIC && name == "valueOf" && desc == p.box_descriptor() {
                let boxed = self.heap.alloc(HeapObject::Boxed(p, args[0].clone()));
                self.stack.push(boxed);
                return Ok(());
            }
            if opcode == INVOKEVIRTUAL && name == p.unbox_method() {
                let (_, v) = self
                    .heap
                    .unboxed(&args[0])
                    .ok_or_else(|| MachineError::BadOperand(format!("{name} on non-box")))?;
                let v = v.clone();
                self.stack.push(v);
                return Ok(());
            }
        }

        let call = Call {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            args,
        };
        let result = host.invoke(&mut self.heap, &call)?;
        match (result, md.ret.slots()) {
            (Some(v), n) if n > 0 => self.stack.push(v),
            (None, 0) => {}
            (Some(_), _) => {
                return Err(MachineError::Host(format!("{owner}.{name} is void but returned a value")))
            }
            (None, _) => {
                return Err(MachineError::Host(format!("{owner}.{name} returned nothing")))
            }
        }
        Ok(())
    }
}

enum Flow {
    Next,
    Jump(Label),
    Return(Option<Value>),
}

fn unsupported(opcode: u8) -> MachineError {
    MachineError::Unsupported(mnemonic(opcode).unwrap_or("?").to_string())
}

fn class_literal(name: &str) -> JavaType {
    if name.starts_with('[') {
        JavaType::parse(name).unwrap_or_else(|_| JavaType::object(name))
    } else {
        JavaType::object(name)
    }
}
