//! Redefinition and override protocol
//!
//! A submitted unit first tries an in-place swap. When the runtime refuses,
//! the unit is renamed to a fresh generation, rewritten, defined through the
//! current implementation's loader and registered as the active generation
//! of its logical name.
//!
//! ```text
//! Resolve -> AttemptLiveSwap -> Done
//!                 |
//!                 v
//!             Fallback -> Done
//! ```

use crate::config::HotSwapConfig;
use crate::error::{RuntimeError, SwapError};
use crate::runtime::{LoadedType, Runtime};
use dashmap::DashMap;
use hotswap_bytecode::{decode, encode, CodecError, UnitNode};
use hotswap_registry::{GenerationRecord, GenerationRegistry, Scope};
use hotswap_rewrite::{remap_unit, RenameRemapper, RewriteReport, UnitRewriter};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Protocol states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapState {
    /// Looking up the current implementation
    Resolve,
    /// Asking the runtime for an in-place swap
    AttemptLiveSwap,
    /// Installing a renamed generation
    Fallback,
    /// Finished
    Done,
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: SwapState) -> &'static [SwapState] {
    use SwapState::{AttemptLiveSwap, Done, Fallback, Resolve};
    match from {
        Resolve => &[AttemptLiveSwap],
        AttemptLiveSwap => &[Done, Fallback],
        Fallback => &[Done],
        Done => &[],
    }
}

/// Validate a state change
///
/// # Errors
/// Returns [`SwapError::IllegalTransition`] if `to` is not reachable from `from`
pub fn validate_transition(from: SwapState, to: SwapState) -> Result<(), SwapError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SwapError::IllegalTransition { from, to })
    }
}

/// State of one submission
#[derive(Debug, Clone)]
pub struct SwapSession {
    logical_name: String,
    history: Vec<SwapState>,
}

impl SwapSession {
    /// New session in [`SwapState::Resolve`]
    #[must_use]
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            history: vec![SwapState::Resolve],
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> SwapState {
        self.history.last().copied().unwrap_or(SwapState::Resolve)
    }

    /// States visited so far
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[SwapState] {
        &self.history
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns error if the transition is not allowed
    pub fn advance(&mut self, to: SwapState) -> Result<(), SwapError> {
        validate_transition(self.state(), to)?;
        tracing::debug!("{}: {:?} -> {:?}", self.logical_name, self.state(), to);
        self.history.push(to);
        Ok(())
    }
}

/// Result of a successful submission
#[derive(Debug, Clone)]
pub enum SwapOutcome {
    /// Swapped in place; the registry was not touched
    Redefined {
        /// Logical name
        logical_name: String,
        /// Identity of the redefined implementation
        internal_name: String,
        /// States visited
        history: Vec<SwapState>,
    },
    /// Installed as a new generation
    Overridden {
        /// Logical name
        logical_name: String,
        /// Identity of the new generation
        internal_name: String,
        /// Generation number
        generation: u64,
        /// False if the registry refused the activation
        registered: bool,
        /// Record the new generation replaced
        superseded: Option<GenerationRecord>,
        /// Rewrite summary of the new generation
        report: RewriteReport,
        /// States visited
        history: Vec<SwapState>,
    },
}

impl SwapOutcome {
    /// Logical name the outcome applies to
    #[must_use]
    pub fn logical_name(&self) -> &str {
        match self {
            Self::Redefined { logical_name, .. } | Self::Overridden { logical_name, .. } => logical_name,
        }
    }

    /// Identity now answering to the logical name
    #[must_use]
    pub fn internal_name(&self) -> &str {
        match self {
            Self::Redefined { internal_name, .. } | Self::Overridden { internal_name, .. } => internal_name,
        }
    }

    /// States visited
    #[must_use]
    pub fn history(&self) -> &[SwapState] {
        match self {
            Self::Redefined { history, .. } | Self::Overridden { history, .. } => history,
        }
    }
}

impl fmt::Display for SwapOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redefined { logical_name, internal_name, .. } => {
                write!(f, "{logical_name}: redefined in place as {internal_name}")
            }
            Self::Overridden {
                logical_name,
                internal_name,
                generation,
                registered,
                ..
            } => {
                write!(f, "{logical_name}: overridden by {internal_name} (gen {generation})")?;
                if !registered {
                    f.write_str(", not registered")?;
                }
                Ok(())
            }
        }
    }
}

/// Counters over the engine's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Submissions received
    pub submitted: u64,
    /// In-place swaps
    pub redefined: u64,
    /// Fallback generations installed
    pub overridden: u64,
    /// Submissions that failed
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    redefined: AtomicU64,
    overridden: AtomicU64,
    failed: AtomicU64,
}

/// Drives submitted units through the protocol
pub struct HotSwapEngine {
    runtime: Arc<dyn Runtime>,
    registry: Arc<GenerationRegistry<LoadedType>>,
    rewriter: UnitRewriter,
    next_generation: AtomicU64,
    name_locks: DashMap<String, Arc<Mutex<()>>>,
    counters: Counters,
}

impl fmt::Debug for HotSwapEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotSwapEngine")
            .field("suffix", &self.rewriter.suffix())
            .field("next_generation", &self.next_generation.load(Ordering::Relaxed))
            .field("registry_entries", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl HotSwapEngine {
    /// Engine over `runtime`, activating generations in `registry`
    #[must_use]
    pub fn new(runtime: Arc<dyn Runtime>, registry: Arc<GenerationRegistry<LoadedType>>) -> Self {
        Self {
            runtime,
            registry,
            rewriter: UnitRewriter::default(),
            next_generation: AtomicU64::new(0),
            name_locks: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Use a different generation suffix
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let symbols = self.rewriter.symbols().clone();
        self.rewriter = UnitRewriter::new(suffix).with_symbols(symbols);
        self
    }

    /// Use a custom rewriter
    #[must_use]
    pub fn with_rewriter(mut self, rewriter: UnitRewriter) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Apply configuration
    #[must_use]
    pub fn with_config(self, config: &HotSwapConfig) -> Self {
        self.with_suffix(config.suffix.clone())
    }

    /// Shared registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<GenerationRegistry<LoadedType>> {
        &self.registry
    }

    /// Generation suffix
    #[inline]
    #[must_use]
    pub fn suffix(&self) -> &str {
        self.rewriter.suffix()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            redefined: self.counters.redefined.load(Ordering::Relaxed),
            overridden: self.counters.overridden.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Submit new content for a loaded type
    ///
    /// Submissions for the same logical name run one at a time.
    ///
    /// # Errors
    /// Returns error if the content is unusable, the name does not resolve,
    /// or the fallback generation cannot be produced or defined. No registry
    /// entry is changed in those cases.
    pub fn submit(&self, bytes: &[u8]) -> Result<SwapOutcome, SwapError> {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let result = self.submit_inner(bytes);
        match &result {
            Ok(SwapOutcome::Redefined { .. }) => {
                self.counters.redefined.fetch_add(1, Ordering::Relaxed);
            }
            Ok(SwapOutcome::Overridden { .. }) => {
                self.counters.overridden.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("swap failed: {}", e);
            }
        }
        result
    }

    fn submit_inner(&self, bytes: &[u8]) -> Result<SwapOutcome, SwapError> {
        if bytes.is_empty() {
            return Err(SwapError::Input(CodecError::Empty));
        }
        let unit = decode(bytes)?;
        let logical = unit.name.clone();

        let lock = Arc::clone(self.name_locks.entry(logical.clone()).or_default().value());
        let result = {
            let _guard = lock.lock();
            self.swap_locked(unit, bytes)
        };
        drop(lock);
        // the map holds the only other reference once no submission waits on it
        self.name_locks.remove_if(&logical, |_, l| Arc::strong_count(l) == 1);
        result
    }

    fn swap_locked(&self, unit: UnitNode, bytes: &[u8]) -> Result<SwapOutcome, SwapError> {
        let logical = unit.name.clone();
        let mut session = SwapSession::new(&logical);
        let primary = self.runtime.primary_loader();
        let current = primary
            .resolve(&logical)
            .map_err(|e| SwapError::resolution(&logical, e))?;
        tracing::debug!("{} resolves to {}", logical, current.internal_name());

        session.advance(SwapState::AttemptLiveSwap)?;
        let live_bytes = if current.internal_name() == logical {
            bytes.to_vec()
        } else {
            let mut remapped = unit.clone();
            remap_unit(&mut remapped, &RenameRemapper::new(&logical, current.internal_name()));
            encode(&remapped).map_err(|e| SwapError::rewrite(&logical, e.into()))?
        };
        match self.runtime.redefine(&current, &live_bytes) {
            Ok(()) => {
                session.advance(SwapState::Done)?;
                tracing::info!("redefined {} in place", current.internal_name());
                return Ok(SwapOutcome::Redefined {
                    logical_name: logical,
                    internal_name: current.internal_name().to_string(),
                    history: session.history().to_vec(),
                });
            }
            Err(e) => tracing::debug!("live swap of {} rejected: {}", logical, e),
        }

        session.advance(SwapState::Fallback)?;
        self.fallback(unit, &current, session)
    }

    fn fallback(
        &self,
        mut unit: UnitNode,
        current: &Arc<LoadedType>,
        mut session: SwapSession,
    ) -> Result<SwapOutcome, SwapError> {
        let logical = unit.name.clone();
        let generation = self.next_generation.fetch_add(1, Ordering::AcqRel);
        let new_name = format!("{logical}{}{generation}", self.rewriter.suffix());

        remap_unit(&mut unit, &RenameRemapper::new(&logical, &new_name));
        let report = self
            .rewriter
            .rewrite(&mut unit)
            .map_err(|e| SwapError::rewrite(&new_name, e))?;
        let new_bytes = encode(&unit).map_err(|e| SwapError::rewrite(&new_name, e.into()))?;

        let loader_id = current.loader();
        let loader = self
            .runtime
            .loader(loader_id)
            .ok_or_else(|| SwapError::define(&new_name, RuntimeError::LoaderGone(loader_id)))?;
        let capable = loader
            .as_override_capable()
            .ok_or_else(|| SwapError::define(&new_name, RuntimeError::NotOverrideCapable(loader_id)))?;
        let defined = capable
            .define_unit(&new_name, &new_bytes)
            .map_err(|e| SwapError::define(&new_name, e))?;

        let scope = if loader_id == self.runtime.primary_loader().id() {
            Scope::Global
        } else {
            Scope::Loader(loader_id)
        };
        let (registered, superseded) =
            match self.registry.activate(scope, &logical, &new_name, generation, &defined) {
                Ok(old) => (true, old),
                Err(e) => {
                    tracing::warn!("{} defined but not registered: {}", new_name, e);
                    (false, None)
                }
            };

        session.advance(SwapState::Done)?;
        tracing::info!("{} overridden by {} in {}", logical, new_name, scope);
        Ok(SwapOutcome::Overridden {
            logical_name: logical,
            internal_name: new_name,
            generation,
            registered,
            superseded,
            report,
            history: session.history().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SwapState::{AttemptLiveSwap, Done, Fallback, Resolve};

    #[test]
    fn transition_table() {
        assert!(validate_transition(Resolve, AttemptLiveSwap).is_ok());
        assert!(validate_transition(AttemptLiveSwap, Done).is_ok());
        assert!(validate_transition(AttemptLiveSwap, Fallback).is_ok());
        assert!(validate_transition(Fallback, Done).is_ok());

        assert!(validate_transition(Resolve, Fallback).is_err());
        assert!(validate_transition(Resolve, Done).is_err());
        assert!(validate_transition(Fallback, AttemptLiveSwap).is_err());
        assert!(allowed_transitions(Done).is_empty());
    }

    #[test]
    fn session_records_history() {
        let mut s = SwapSession::new("demo/A");
        s.advance(AttemptLiveSwap).unwrap();
        s.advance(Fallback).unwrap();
        assert!(matches!(
            s.advance(AttemptLiveSwap),
            Err(SwapError::IllegalTransition { from: Fallback, to: AttemptLiveSwap })
        ));
        s.advance(Done).unwrap();
        assert_eq!(s.history(), &[Resolve, AttemptLiveSwap, Fallback, Done]);
        assert_eq!(s.state(), Done);
    }

    #[test]
    fn name_locks_released_after_submit() {
        let registry = Arc::new(GenerationRegistry::new());
        let runtime = Arc::new(crate::sandbox::SandboxRuntime::new(Arc::clone(&registry)));
        let unit = UnitNode::new("demo/A", Some("java/lang/Object".into()));
        runtime.primary().load_unit(&encode(&unit).unwrap()).unwrap();
        let engine = HotSwapEngine::new(runtime, registry);

        engine.submit(&encode(&unit).unwrap()).unwrap();
        let missing = UnitNode::new("demo/Missing", Some("java/lang/Object".into()));
        assert!(engine.submit(&encode(&missing).unwrap()).is_err());
        assert!(engine.name_locks.is_empty());
    }
}
