//! Supertype-identity rewriting for renamed generations
//!
//! A fallback generation is defined as a subtype of its logical type. Its
//! constructors still call the constructor they were compiled against, so
//! every super-constructor call is replaced by popping the original
//! arguments and invoking the corrected supertype's no-argument constructor.

use crate::error::RewriteError;
use crate::strategy::{MethodRewriter, MethodStats};
use hotswap_bytecode::opcodes::{INVOKESPECIAL, POP, POP2};
use hotswap_bytecode::{Insn, InsnSink, MethodDescriptor};

/// Rewrites `<init>` of a renamed generation
#[derive(Debug)]
pub struct SupertypeRewriter {
    unit_name: String,
    corrected_super: String,
    pending_news: usize,
    retargeted: usize,
}

impl SupertypeRewriter {
    /// Rewriter for constructors of `unit_name`, retargeting to `corrected_super`
    #[must_use]
    pub fn new(unit_name: impl Into<String>, corrected_super: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            corrected_super: corrected_super.into(),
            pending_news: 0,
            retargeted: 0,
        }
    }
}

impl MethodRewriter for SupertypeRewriter {
    fn process(&mut self, insn: Insn, out: &mut dyn InsnSink) -> Result<(), RewriteError> {
        if insn.is_new() {
            self.pending_news += 1;
            out.emit(insn);
            return Ok(());
        }

        if let Insn::Method { owner, desc, .. } = &insn {
            if insn.is_init_call() {
                if self.pending_news > 0 {
                    self.pending_news -= 1;
                } else if *owner != self.unit_name {
                    let md = MethodDescriptor::parse(desc).map_err(|e| {
                        RewriteError::descriptor(format!("{}.<init>", self.unit_name), e)
                    })?;
                    for p in md.params.iter().rev() {
                        out.emit(Insn::simple(if p.slots() == 2 { POP2 } else { POP }));
                    }
                    out.emit(Insn::method(
                        INVOKESPECIAL,
                        self.corrected_super.clone(),
                        "<init>",
                        "()V",
                    ));
                    tracing::debug!(
                        "retargeted super call {}.<init>{} to {}",
                        owner,
                        desc,
                        self.corrected_super
                    );
                    self.retargeted += 1;
                    return Ok(());
                }
            }
        }

        out.emit(insn);
        Ok(())
    }

    fn finish(&mut self, _out: &mut dyn InsnSink) -> Result<MethodStats, RewriteError> {
        Ok(MethodStats {
            rewritten: self.retargeted,
            ..MethodStats::default()
        })
    }
}
