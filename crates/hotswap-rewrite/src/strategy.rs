//! Per-method rewriting strategies
//!
//! Each strategy consumes a method body one instruction at a time through
//! [`MethodRewriter`]. [`Strategy`] is the closed set the orchestrator
//! chooses from.

use crate::construct::ConstructionSiteRewriter;
use crate::error::RewriteError;
use crate::hook::ResolutionHookRewriter;
use crate::supertype::SupertypeRewriter;
use hotswap_bytecode::{Insn, InsnList, InsnSink, MethodNode};

/// What a strategy did to one method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodStats {
    /// Sites, calls or returns rewritten
    pub rewritten: usize,
    /// Locals to add to `max_locals`
    pub extra_locals: u16,
    /// Slots to add to `max_stack`
    pub extra_stack: u16,
}

/// Streaming rewriter of one method body
pub trait MethodRewriter {
    /// Called before the first instruction
    ///
    /// # Errors
    /// Returns error if the strategy cannot start on this method
    fn begin(&mut self, _out: &mut dyn InsnSink) -> Result<(), RewriteError> {
        Ok(())
    }

    /// Consume one instruction, writing zero or more to `out`
    ///
    /// # Errors
    /// Returns error if the instruction references a malformed descriptor
    fn process(&mut self, insn: Insn, out: &mut dyn InsnSink) -> Result<(), RewriteError>;

    /// Flush anything held back and report
    ///
    /// # Errors
    /// Returns error if held-back state cannot be flushed
    fn finish(&mut self, out: &mut dyn InsnSink) -> Result<MethodStats, RewriteError>;
}

/// Strategy selected for a method
#[derive(Debug)]
pub enum Strategy {
    /// Replace construction sites with factory calls
    Construction(ConstructionSiteRewriter),
    /// Retarget super-constructor calls of a renamed generation
    Supertype(SupertypeRewriter),
    /// Inject registry lookups into a resolution method
    ResolutionHook(ResolutionHookRewriter),
    /// Leave the method alone
    PassThrough,
}

impl Strategy {
    /// Short name for logging
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Construction(_) => "construction",
            Strategy::Supertype(_) => "supertype",
            Strategy::ResolutionHook(_) => "resolution-hook",
            Strategy::PassThrough => "pass-through",
        }
    }
}

impl MethodRewriter for Strategy {
    fn begin(&mut self, out: &mut dyn InsnSink) -> Result<(), RewriteError> {
        match self {
            Strategy::Construction(r) => r.begin(out),
            Strategy::Supertype(r) => r.begin(out),
            Strategy::ResolutionHook(r) => r.begin(out),
            Strategy::PassThrough => Ok(()),
        }
    }

    fn process(&mut self, insn: Insn, out: &mut dyn InsnSink) -> Result<(), RewriteError> {
        match self {
            Strategy::Construction(r) => r.process(insn, out),
            Strategy::Supertype(r) => r.process(insn, out),
            Strategy::ResolutionHook(r) => r.process(insn, out),
            Strategy::PassThrough => {
                out.emit(insn);
                Ok(())
            }
        }
    }

    fn finish(&mut self, out: &mut dyn InsnSink) -> Result<MethodStats, RewriteError> {
        match self {
            Strategy::Construction(r) => r.finish(out),
            Strategy::Supertype(r) => r.finish(out),
            Strategy::ResolutionHook(r) => r.finish(out),
            Strategy::PassThrough => Ok(MethodStats::default()),
        }
    }
}

/// Run a rewriter over a method body, replacing it in place
///
/// Methods without code are left untouched.
///
/// # Errors
/// Propagates the rewriter's error; the method is unchanged in that case
pub fn rewrite_method(
    method: &mut MethodNode,
    rewriter: &mut dyn MethodRewriter,
) -> Result<MethodStats, RewriteError> {
    if !method.has_code() {
        return Ok(MethodStats::default());
    }

    let mut out = InsnList::starting_at(method.next_label());
    rewriter.begin(&mut out)?;
    for insn in method.insns.iter().cloned() {
        rewriter.process(insn, &mut out)?;
    }
    let stats = rewriter.finish(&mut out)?;

    let next = out.next_label();
    method.set_insns(out.into_insns());
    method.reserve_labels(next);
    method.max_locals = method.max_locals.saturating_add(stats.extra_locals);
    method.max_stack = method.max_stack.saturating_add(stats.extra_stack);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_bytecode::opcodes::*;

    #[test]
    fn pass_through_leaves_body() {
        let body = vec![Insn::var(ALOAD, 0), Insn::simple(ARETURN)];
        let mut m = MethodNode::new(ACC_PUBLIC, "self", "()Ljava/lang/Object;").with_code(body.clone(), 1, 1);
        let stats = rewrite_method(&mut m, &mut Strategy::PassThrough).unwrap();
        assert_eq!(stats, MethodStats::default());
        assert_eq!(m.insns, body);
        assert_eq!((m.max_stack, m.max_locals), (1, 1));
    }

    #[test]
    fn abstract_method_untouched() {
        let mut m = MethodNode::new(ACC_PUBLIC | ACC_ABSTRACT, "run", "()V");
        let stats = rewrite_method(&mut m, &mut Strategy::PassThrough).unwrap();
        assert_eq!(stats.rewritten, 0);
        assert!(m.insns.is_empty());
    }
}
