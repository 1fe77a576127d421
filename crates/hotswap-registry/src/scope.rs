//! Registry scopes and records

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identity of a loader within one runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoaderId(pub u64);

impl Display for LoaderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "loader#{}", self.0)
    }
}

/// Visibility of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// Seen by resolution through any loader
    Global,
    /// Seen only by resolution through one loader
    Loader(LoaderId),
}

impl Scope {
    /// Loader this scope is bound to, if any
    #[inline]
    #[must_use]
    pub fn loader(self) -> Option<LoaderId> {
        match self {
            Scope::Global => None,
            Scope::Loader(id) => Some(id),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Loader(id) => write!(f, "{id}"),
        }
    }
}

/// One generation of a logical type as seen by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Scope the record lives in
    pub scope: Scope,
    /// Stable user-visible name
    pub logical_name: String,
    /// Name embedded in the defined unit
    pub internal_name: String,
    /// Fallback generation number; `None` for entries cached by resolution
    pub generation: Option<u64>,
    /// True while this record is the one resolution returns
    pub active: bool,
}

impl Display for GenerationRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} -> {}", self.scope, self.logical_name, self.internal_name)?;
        if let Some(g) = self.generation {
            write!(f, " (gen {g})")?;
        }
        if !self.active {
            f.write_str(" inactive")?;
        }
        Ok(())
    }
}
