//! Load-time transformer
//!
//! Units defined by hot-swap aware loaders are rewritten as they are first
//! loaded, so their construction sites already go through the factory when
//! a later generation is installed.

use crate::runtime::Loader;
use hotswap_rewrite::UnitRewriter;
use std::borrow::Cow;

/// Applies the unit rewriter at load time
#[derive(Debug, Clone, Default)]
pub struct UnitTransformer {
    rewriter: UnitRewriter,
}

impl UnitTransformer {
    /// Transformer using `rewriter`
    #[inline]
    #[must_use]
    pub fn new(rewriter: UnitRewriter) -> Self {
        Self { rewriter }
    }

    /// Underlying rewriter
    #[inline]
    #[must_use]
    pub fn rewriter(&self) -> &UnitRewriter {
        &self.rewriter
    }

    /// Rewrite `bytes` if `loader` is override-capable
    ///
    /// Failures leave the content untouched.
    pub fn transform<'a>(&self, loader: &dyn Loader, name: &str, bytes: &'a [u8]) -> Cow<'a, [u8]> {
        if loader.as_override_capable().is_none() {
            return Cow::Borrowed(bytes);
        }
        tracing::debug!("transforming {} for {}", name, loader.id());
        match self.rewriter.rewrite_bytes(bytes) {
            Ok((rewritten, report)) => {
                if report.changed() {
                    Cow::Owned(rewritten)
                } else {
                    Cow::Borrowed(bytes)
                }
            }
            Err(e) => {
                tracing::warn!("leaving {} unchanged: {}", name, e);
                Cow::Borrowed(bytes)
            }
        }
    }
}
