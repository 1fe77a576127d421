//! Rewrite errors

use hotswap_bytecode::{CodecError, DescriptorError};

/// Errors raised while rewriting a unit
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    /// Unit content could not be decoded or encoded
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A descriptor the rewrite depends on is malformed
    #[error("bad descriptor in {location}: {source}")]
    Descriptor {
        /// `Owner.method` where the descriptor was found
        location: String,
        /// Parse failure
        #[source]
        source: DescriptorError,
    },

    /// Unit is structurally unusable
    #[error("invalid unit {unit}: {reason}")]
    InvalidUnit {
        /// Unit name
        unit: String,
        /// What is wrong
        reason: String,
    },
}

impl RewriteError {
    /// Create descriptor error
    #[must_use]
    pub fn descriptor(location: impl Into<String>, source: DescriptorError) -> Self {
        Self::Descriptor {
            location: location.into(),
            source,
        }
    }

    /// Create invalid unit error
    #[must_use]
    pub fn invalid_unit(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUnit {
            unit: unit.into(),
            reason: reason.into(),
        }
    }
}
