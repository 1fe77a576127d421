//! Construction-site rewriting
//!
//! Replaces `new T; [dup]; <args>; invokespecial T.<init>(..)V` with a call
//! to the host's construct-by-name factory:
//!
//! ```text
//! <args>                       ; evaluated exactly as before
//! xstore n .. xstore 1         ; spill into fresh locals
//! ldc "a.b.T"
//! <Class[] of parameter types>
//! <Object[] of boxed arguments>
//! invokestatic Factory.construct(String, Class[], Object[]) Object
//! checkcast a/b/T
//! [pop]                        ; only when the allocation was not duplicated
//! ```
//!
//! Emission is suspended from the `new` until its constructor call so the
//! allocation can be dropped. The rewriter tracks operand stack depth through
//! the window; a window is abandoned (its instructions emitted unchanged) as
//! soon as anything consumes the allocated reference, the depth becomes
//! unknown, or the constructor call does not line up.

use crate::error::RewriteError;
use crate::strategy::{MethodRewriter, MethodStats};
use crate::symbols::HostSymbols;
use hotswap_bytecode::opcodes::{
    is_terminal, AASTORE, ANEWARRAY, CHECKCAST, DUP, GETSTATIC, INVOKESTATIC, JSR, POP, RET,
};
use hotswap_bytecode::{
    stack_effect, to_binary_name, Constant, Insn, InsnSink, Label, MethodDescriptor, MethodNode,
};
use std::collections::{HashMap, HashSet};

/// Extra operand stack needed by the widest factory sequence
pub const STACK_HEADROOM: u16 = 7;

const CLASS: &str = "java/lang/Class";
const OBJECT_ARRAY_ELEM: &str = "java/lang/Object";

#[derive(Debug)]
struct OpenAllocation {
    ty: String,
    base: i32,
    refs: i32,
    new_idx: usize,
    dup_idx: Option<usize>,
    line: Option<u32>,
}

impl OpenAllocation {
    #[inline]
    fn region_top(&self) -> i32 {
        self.base + self.refs
    }
}

/// Rewrites construction sites of one method
#[derive(Debug)]
pub struct ConstructionSiteRewriter {
    factory_owner: String,
    factory_name: String,
    factory_desc: String,
    root_object: String,
    location: String,
    spill_base: u16,
    handlers: HashSet<Label>,

    depth: Option<i32>,
    label_depth: HashMap<Label, i32>,
    line: Option<u32>,
    open: Vec<OpenAllocation>,
    buffer: Vec<Option<Insn>>,
    awaiting_dup: bool,

    rewritten: usize,
    spill_slots: u16,
}

impl ConstructionSiteRewriter {
    /// Rewriter for `method` of unit `owner`
    #[must_use]
    pub fn new(symbols: &HostSymbols, owner: &str, method: &MethodNode) -> Self {
        Self {
            factory_owner: symbols.factory_owner.clone(),
            factory_name: symbols.factory_name.clone(),
            factory_desc: symbols.factory_desc.clone(),
            root_object: symbols.root_object.clone(),
            location: format!("{owner}.{}{}", method.name, method.desc),
            spill_base: method.max_locals,
            handlers: method.try_catch_blocks.iter().map(|t| t.handler).collect(),
            depth: Some(0),
            label_depth: HashMap::new(),
            line: None,
            open: Vec::new(),
            buffer: Vec::new(),
            awaiting_dup: false,
            rewritten: 0,
            spill_slots: 0,
        }
    }

    fn push(&mut self, insn: Insn, out: &mut dyn InsnSink) {
        if self.open.is_empty() {
            out.emit(insn);
        } else {
            self.buffer.push(Some(insn));
        }
    }

    fn flush(&mut self, out: &mut dyn InsnSink) {
        for insn in self.buffer.drain(..).flatten() {
            out.emit(insn);
        }
    }

    /// Abandon every open allocation whose reference region reaches `low`
    fn abandon_from(&mut self, low: i32, reason: &str, out: &mut dyn InsnSink) {
        while let Some(top) = self.open.last() {
            if low >= top.region_top() {
                break;
            }
            tracing::debug!(
                "leaving construction of {} unchanged in {}: {}",
                top.ty,
                self.location,
                reason
            );
            self.open.pop();
            self.awaiting_dup = false;
        }
        if self.open.is_empty() {
            self.flush(out);
        }
    }

    fn abandon_all(&mut self, reason: &str, out: &mut dyn InsnSink) {
        self.abandon_from(i32::MIN, reason, out);
    }

    fn enter_label(&mut self, label: Label, out: &mut dyn InsnSink) {
        if self.handlers.contains(&label) {
            self.abandon_all("exception handler entry", out);
            self.depth = Some(1);
            return;
        }
        match (self.depth, self.label_depth.get(&label).copied()) {
            (None, Some(recorded)) => self.depth = Some(recorded),
            (None, None) => {
                self.abandon_all("branch target of unknown depth", out);
                self.depth = Some(0);
            }
            (Some(current), Some(recorded)) if current != recorded => {
                self.abandon_all("inconsistent depth at branch target", out);
            }
            _ => {}
        }
    }

    /// Handle `invokespecial <init>`; returns false if it is not the
    /// constructor call of the innermost open allocation
    fn try_complete(
        &mut self,
        insn: &Insn,
        depth: i32,
        out: &mut dyn InsnSink,
    ) -> Result<bool, RewriteError> {
        let Insn::Method { owner, desc, .. } = insn else {
            return Ok(false);
        };
        let Some(top) = self.open.last() else {
            return Ok(false);
        };
        if top.ty != *owner {
            return Ok(false);
        }
        let md = MethodDescriptor::parse(desc)
            .map_err(|e| RewriteError::descriptor(self.location.clone(), e))?;
        let arg_slots = i32::from(md.arg_slots());
        if depth != top.region_top() + arg_slots {
            return Ok(false);
        }

        let Some(alloc) = self.open.pop() else {
            return Ok(false);
        };
        self.buffer[alloc.new_idx] = None;
        if let Some(i) = alloc.dup_idx {
            self.buffer[i] = None;
        }
        let sequence = self.factory_sequence(&alloc, &md, out);
        self.buffer.extend(sequence.into_iter().map(Some));

        self.depth = Some(depth - arg_slots - 1);
        self.rewritten += 1;
        self.spill_slots = self.spill_slots.max(md.arg_slots());
        tracing::debug!("rewrote construction of {} in {}", alloc.ty, self.location);

        if self.open.is_empty() {
            self.flush(out);
        }
        Ok(true)
    }

    fn factory_sequence(
        &self,
        alloc: &OpenAllocation,
        md: &MethodDescriptor,
        out: &mut dyn InsnSink,
    ) -> Vec<Insn> {
        let mut seq = Vec::new();
        if let Some(line) = alloc.line {
            let start = out.new_label();
            seq.push(Insn::Label(start));
            seq.push(Insn::LineNumber { line, start });
        }

        let mut locals = Vec::with_capacity(md.params.len());
        let mut next = self.spill_base;
        for p in &md.params {
            locals.push(next);
            next += p.slots();
        }
        for (p, local) in md.params.iter().zip(&locals).rev() {
            seq.push(Insn::var(p.store_opcode(), *local));
        }

        let count = i32::try_from(md.params.len()).unwrap_or(i32::MAX);
        seq.push(Insn::ldc_string(to_binary_name(&alloc.ty)));

        seq.push(Insn::push_int(count));
        seq.push(Insn::type_insn(ANEWARRAY, CLASS));
        for (i, p) in (0..).zip(&md.params) {
            seq.push(Insn::simple(DUP));
            seq.push(Insn::push_int(i));
            match p.as_primitive() {
                Some(prim) => seq.push(Insn::field(
                    GETSTATIC,
                    prim.wrapper(),
                    "TYPE",
                    "Ljava/lang/Class;",
                )),
                None => seq.push(Insn::Ldc(Constant::Class(p.class_constant_name()))),
            }
            seq.push(Insn::simple(AASTORE));
        }

        seq.push(Insn::push_int(count));
        seq.push(Insn::type_insn(ANEWARRAY, OBJECT_ARRAY_ELEM));
        for ((i, p), local) in (0..).zip(&md.params).zip(&locals) {
            seq.push(Insn::simple(DUP));
            seq.push(Insn::push_int(i));
            seq.push(Insn::var(p.load_opcode(), *local));
            if let Some(prim) = p.as_primitive() {
                seq.push(Insn::method(
                    INVOKESTATIC,
                    prim.wrapper(),
                    "valueOf",
                    prim.box_descriptor(),
                ));
            }
            seq.push(Insn::simple(AASTORE));
        }

        seq.push(Insn::method(
            INVOKESTATIC,
            self.factory_owner.clone(),
            self.factory_name.clone(),
            self.factory_desc.clone(),
        ));
        seq.push(Insn::type_insn(CHECKCAST, alloc.ty.clone()));
        if alloc.dup_idx.is_none() {
            seq.push(Insn::simple(POP));
        }
        seq
    }
}

impl MethodRewriter for ConstructionSiteRewriter {
    fn process(&mut self, insn: Insn, out: &mut dyn InsnSink) -> Result<(), RewriteError> {
        match &insn {
            Insn::Label(label) => {
                self.enter_label(*label, out);
                self.push(insn, out);
                return Ok(());
            }
            Insn::LineNumber { line, .. } => {
                self.line = Some(*line);
                self.push(insn, out);
                return Ok(());
            }
            _ => {}
        }

        let awaiting_dup = std::mem::take(&mut self.awaiting_dup);
        if awaiting_dup && insn == Insn::simple(DUP) {
            let idx = self.buffer.len();
            if let Some(top) = self.open.last_mut() {
                top.dup_idx = Some(idx);
                top.refs = 2;
            }
            self.depth = self.depth.map(|d| d + 1);
            self.buffer.push(Some(insn));
            return Ok(());
        }

        let Some(depth) = self.depth else {
            self.abandon_all("unknown stack depth", out);
            self.push(insn, out);
            return Ok(());
        };

        if let Insn::Type { ty, .. } = &insn {
            if insn.is_new() && *ty != self.root_object {
                self.open.push(OpenAllocation {
                    ty: ty.clone(),
                    base: depth,
                    refs: 1,
                    new_idx: self.buffer.len(),
                    dup_idx: None,
                    line: self.line,
                });
                self.buffer.push(Some(insn));
                self.depth = Some(depth + 1);
                self.awaiting_dup = true;
                return Ok(());
            }
        }

        if insn.is_init_call() && self.try_complete(&insn, depth, out)? {
            return Ok(());
        }

        let opcode = insn.opcode();
        let effect = match stack_effect(&insn) {
            Some(effect) if !matches!(opcode, Some(JSR | RET)) => effect,
            _ => {
                tracing::warn!(
                    "untracked stack effect of {:?} in {}; construction sites up to the next branch target are left unchanged",
                    insn,
                    self.location
                );
                self.abandon_all("instruction with untracked stack effect", out);
                self.depth = None;
                self.push(insn, out);
                return Ok(());
            }
        };

        let low = depth - i32::from(effect.pops);
        if low < 0 {
            self.abandon_all("stack underflow", out);
            self.depth = None;
            self.push(insn, out);
            return Ok(());
        }
        self.abandon_from(low, "allocated reference used before construction", out);

        for target in insn.branch_targets() {
            self.label_depth.entry(target).or_insert(low);
        }
        self.depth = if opcode.is_some_and(is_terminal) {
            None
        } else {
            Some(low + i32::from(effect.pushes))
        };
        self.push(insn, out);
        Ok(())
    }

    fn finish(&mut self, out: &mut dyn InsnSink) -> Result<MethodStats, RewriteError> {
        self.abandon_all("constructor call never reached", out);
        Ok(MethodStats {
            rewritten: self.rewritten,
            extra_locals: self.spill_slots,
            extra_stack: if self.rewritten > 0 { STACK_HEADROOM } else { 0 },
        })
    }
}
