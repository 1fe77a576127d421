//! Resolution-hook rewriting
//!
//! Wraps a loader's resolution method so the registry is consulted first and
//! every non-null result is recorded:
//!
//! ```text
//!     aload_0; aload_1; invokestatic Registry.get; dup; ifnull L; areturn
//! L:  pop
//!     ... original body, each areturn becomes:
//!     dup; ifnull S; dup; aload_0; swap; aload_1; swap; invokestatic Registry.put
//! S:  areturn
//! ```

use crate::error::RewriteError;
use crate::strategy::{MethodRewriter, MethodStats};
use crate::symbols::HostSymbols;
use hotswap_bytecode::opcodes::{ALOAD, ARETURN, DUP, IFNULL, INVOKESTATIC, POP, SWAP};
use hotswap_bytecode::{Insn, InsnSink};

/// Peak extra stack of the return epilogue above the returned value
pub const HOOK_STACK: u16 = 3;

/// Rewrites the resolution method of a loader-like unit
#[derive(Debug)]
pub struct ResolutionHookRewriter {
    owner: String,
    get: String,
    get_desc: String,
    put: String,
    put_desc: String,
    returns: usize,
}

impl ResolutionHookRewriter {
    /// Rewriter using the registry hooks named in `symbols`
    #[must_use]
    pub fn new(symbols: &HostSymbols) -> Self {
        Self {
            owner: symbols.registry_owner.clone(),
            get: symbols.registry_get.clone(),
            get_desc: symbols.registry_get_desc.clone(),
            put: symbols.registry_put.clone(),
            put_desc: symbols.registry_put_desc.clone(),
            returns: 0,
        }
    }
}

impl MethodRewriter for ResolutionHookRewriter {
    fn begin(&mut self, out: &mut dyn InsnSink) -> Result<(), RewriteError> {
        let miss = out.new_label();
        out.emit(Insn::var(ALOAD, 0));
        out.emit(Insn::var(ALOAD, 1));
        out.emit(Insn::method(
            INVOKESTATIC,
            self.owner.clone(),
            self.get.clone(),
            self.get_desc.clone(),
        ));
        out.emit(Insn::simple(DUP));
        out.emit(Insn::jump(IFNULL, miss));
        out.emit(Insn::simple(ARETURN));
        out.emit(Insn::Label(miss));
        out.emit(Insn::simple(POP));
        Ok(())
    }

    fn process(&mut self, insn: Insn, out: &mut dyn InsnSink) -> Result<(), RewriteError> {
        if insn == Insn::simple(ARETURN) {
            let skip = out.new_label();
            out.emit(Insn::simple(DUP));
            out.emit(Insn::jump(IFNULL, skip));
            out.emit(Insn::simple(DUP));
            out.emit(Insn::var(ALOAD, 0));
            out.emit(Insn::simple(SWAP));
            out.emit(Insn::var(ALOAD, 1));
            out.emit(Insn::simple(SWAP));
            out.emit(Insn::method(
                INVOKESTATIC,
                self.owner.clone(),
                self.put.clone(),
                self.put_desc.clone(),
            ));
            out.emit(Insn::Label(skip));
            self.returns += 1;
        }
        out.emit(insn);
        Ok(())
    }

    fn finish(&mut self, _out: &mut dyn InsnSink) -> Result<MethodStats, RewriteError> {
        Ok(MethodStats {
            rewritten: self.returns,
            extra_locals: 0,
            extra_stack: HOOK_STACK,
        })
    }
}
