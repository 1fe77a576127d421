//! Error types for the hotswap engine
//!
//! Swap failures fall into four kinds:
//! - input (content is not a decodable unit)
//! - resolution (the logical name is unknown to the runtime)
//! - define (the runtime refused the new generation)
//! - rewrite (the new generation could not be produced)
//!
//! A rejected in-place swap is not an error; it triggers the fallback path.

use crate::protocol::SwapState;
use hotswap_bytecode::CodecError;
use hotswap_registry::LoaderId;
use hotswap_rewrite::RewriteError;
use std::path::PathBuf;

/// Runtime-side failures: resolution and definition
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// No type with this name is visible
    #[error("type not found: {0}")]
    NotFound(String),

    /// A type with this name is already defined by the loader
    #[error("{loader} already defines {name}")]
    DuplicateDefinition {
        /// Defining loader
        loader: LoaderId,
        /// Internal name
        name: String,
    },

    /// Content names a different type than requested
    #[error("content defines {found}, expected {expected}")]
    NameMismatch {
        /// Requested name
        expected: String,
        /// Name inside the content
        found: String,
    },

    /// Loader is no longer part of the runtime
    #[error("{0} is gone")]
    LoaderGone(LoaderId),

    /// Loader cannot define new generations
    #[error("{0} does not expose override capability")]
    NotOverrideCapable(LoaderId),

    /// Content could not be decoded
    #[error("malformed content: {0}")]
    Malformed(#[from] CodecError),
}

/// In-place redefinition failures
#[derive(Debug, thiserror::Error)]
pub enum RedefineError {
    /// Runtime refuses the swap, usually because the shape changed
    #[error("redefinition unsupported: {0}")]
    Unsupported(String),

    /// Content could not be decoded
    #[error("malformed content: {0}")]
    Malformed(#[from] CodecError),
}

impl RedefineError {
    /// Create unsupported error
    #[inline]
    #[must_use]
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported(reason.into())
    }
}

/// Construct-by-name failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructError {
    /// Name does not resolve
    #[error("no type named {0}")]
    NotFound(String),

    /// Type has no constructor with the requested parameters
    #[error("{name} has no constructor {desc}")]
    NoSuchConstructor {
        /// Internal name
        name: String,
        /// Requested constructor descriptor
        desc: String,
    },

    /// Constructor exists but could not run with the given values
    #[error("construction of {name} failed: {reason}")]
    ConstructionFailed {
        /// Internal name
        name: String,
        /// What went wrong
        reason: String,
    },
}

impl ConstructError {
    /// Create construction failed error
    #[must_use]
    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConstructionFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Coarse classification of swap failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapErrorKind {
    /// Content unusable
    Input,
    /// Logical name unknown
    Resolution,
    /// New generation refused by the runtime
    Define,
    /// New generation could not be produced
    Rewrite,
    /// Protocol bug
    Internal,
}

/// Failure of one swap submission
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    /// Content is not a decodable unit
    #[error("invalid unit content: {0}")]
    Input(#[from] CodecError),

    /// Logical name could not be resolved through the primary loader
    #[error("cannot resolve {name}: {source}")]
    Resolution {
        /// Logical name
        name: String,
        /// Runtime failure
        #[source]
        source: RuntimeError,
    },

    /// Defining loader refused the new generation
    #[error("cannot define {name}: {source}")]
    Define {
        /// Internal identity of the new generation
        name: String,
        /// Runtime failure
        #[source]
        source: RuntimeError,
    },

    /// New generation could not be rewritten
    #[error("cannot rewrite {name}: {source}")]
    Rewrite {
        /// Internal identity of the new generation
        name: String,
        /// Rewrite failure
        #[source]
        source: RewriteError,
    },

    /// Protocol attempted an illegal state change
    #[error("illegal swap transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: SwapState,
        /// Requested state
        to: SwapState,
    },
}

impl SwapError {
    /// Create resolution error
    #[must_use]
    pub fn resolution(name: impl Into<String>, source: RuntimeError) -> Self {
        Self::Resolution {
            name: name.into(),
            source,
        }
    }

    /// Create define error
    #[must_use]
    pub fn define(name: impl Into<String>, source: RuntimeError) -> Self {
        Self::Define {
            name: name.into(),
            source,
        }
    }

    /// Create rewrite error
    #[must_use]
    pub fn rewrite(name: impl Into<String>, source: RewriteError) -> Self {
        Self::Rewrite {
            name: name.into(),
            source,
        }
    }

    /// Failure class
    #[inline]
    #[must_use]
    pub fn kind(&self) -> SwapErrorKind {
        match self {
            Self::Input(_) => SwapErrorKind::Input,
            Self::Resolution { .. } => SwapErrorKind::Resolution,
            Self::Define { .. } => SwapErrorKind::Define,
            Self::Rewrite { .. } => SwapErrorKind::Rewrite,
            Self::IllegalTransition { .. } => SwapErrorKind::Internal,
        }
    }
}

/// Configuration failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// TOML could not be parsed
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong
        reason: String,
    },
}

/// Watcher start-up failures
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Watched path is missing or not a directory
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Monitor thread could not be spawned
    #[error("cannot start watcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}
