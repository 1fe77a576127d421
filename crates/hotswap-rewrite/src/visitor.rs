//! Unit visitor orchestration
//!
//! Decides, per unit and then per method, which rewriting strategy applies,
//! runs it, and finishes loader-like units off with the override-capability
//! marker.

use crate::construct::ConstructionSiteRewriter;
use crate::error::RewriteError;
use crate::hook::ResolutionHookRewriter;
use crate::strategy::{rewrite_method, Strategy};
use crate::supertype::SupertypeRewriter;
use crate::symbols::HostSymbols;
use hotswap_bytecode::opcodes::{ACC_PUBLIC, ALOAD, ARETURN, ILOAD, INVOKEVIRTUAL};
use hotswap_bytecode::{decode, encode, Insn, MethodNode, UnitNode};
use std::fmt::{self, Display, Formatter};

/// Default separator between a logical name and a generation number
pub const DEFAULT_SUFFIX: &str = "$HCR$";

/// Unit-level facts that drive method dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPlan {
    /// Corrected supertype when the unit is a renamed generation
    pub corrected_super: Option<String>,
    /// Unit extends a base loader and lacks the marker
    pub loader_like: bool,
}

impl UnitPlan {
    /// True for renamed generations
    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.corrected_super.is_some()
    }
}

/// Summary of one unit rewrite
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// Unit name after rewriting
    pub unit: String,
    /// Methods with code that were visited
    pub methods_visited: usize,
    /// Construction sites replaced by factory calls
    pub construction_sites: usize,
    /// Super-constructor calls retargeted
    pub super_calls_retargeted: usize,
    /// Resolution methods hooked
    pub hooks_installed: usize,
    /// Marker interface and define method added
    pub marker_synthesized: bool,
}

impl RewriteReport {
    /// True if the unit was changed at all
    #[must_use]
    pub fn changed(&self) -> bool {
        self.construction_sites > 0
            || self.super_calls_retargeted > 0
            || self.hooks_installed > 0
            || self.marker_synthesized
    }
}

impl Display for RewriteReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} methods, {} construction sites, {} super calls, {} hooks{}",
            self.unit,
            self.methods_visited,
            self.construction_sites,
            self.super_calls_retargeted,
            self.hooks_installed,
            if self.marker_synthesized { ", marker added" } else { "" }
        )
    }
}

/// Rewrites whole units
#[derive(Debug, Clone)]
pub struct UnitRewriter {
    symbols: HostSymbols,
    suffix: String,
}

impl Default for UnitRewriter {
    fn default() -> Self {
        Self::new(DEFAULT_SUFFIX)
    }
}

impl UnitRewriter {
    /// Rewriter with default host symbols
    #[must_use]
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            symbols: HostSymbols::default(),
            suffix: suffix.into(),
        }
    }

    /// Replace host symbols
    #[inline]
    #[must_use]
    pub fn with_symbols(mut self, symbols: HostSymbols) -> Self {
        self.symbols = symbols;
        self
    }

    /// Host symbols in use
    #[inline]
    #[must_use]
    pub fn symbols(&self) -> &HostSymbols {
        &self.symbols
    }

    /// Generation suffix in use
    #[inline]
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Derive the unit-level flags
    #[must_use]
    pub fn plan(&self, unit: &UnitNode) -> UnitPlan {
        let corrected_super = if self.suffix.is_empty() {
            None
        } else {
            unit.name
                .find(&self.suffix)
                .map(|pos| unit.name[..pos].to_string())
        };

        let marker_present = unit.interfaces.iter().any(|i| *i == self.symbols.marker)
            || unit
                .methods
                .iter()
                .any(|m| self.symbols.is_marker_method(&m.name, &m.desc));
        let loader_like = unit
            .super_name
            .as_deref()
            .is_some_and(|s| self.symbols.is_base_loader(s))
            && !marker_present;

        UnitPlan {
            corrected_super,
            loader_like,
        }
    }

    fn strategy_for(&self, plan: &UnitPlan, unit_name: &str, method: &MethodNode) -> Strategy {
        if let Some(sup) = &plan.corrected_super {
            if method.name == "<init>" {
                return Strategy::Supertype(SupertypeRewriter::new(unit_name, sup.clone()));
            }
        }
        if plan.loader_like {
            if self.symbols.is_resolution_method(&method.name, &method.desc) && !method.is_static() {
                return Strategy::ResolutionHook(ResolutionHookRewriter::new(&self.symbols));
            }
            return Strategy::PassThrough;
        }
        Strategy::Construction(ConstructionSiteRewriter::new(&self.symbols, unit_name, method))
    }

    /// Rewrite a unit in place
    ///
    /// # Errors
    /// Returns error if a method references a malformed descriptor; the unit
    /// may be partially rewritten in that case and should be discarded
    pub fn rewrite(&self, unit: &mut UnitNode) -> Result<RewriteReport, RewriteError> {
        if unit.name.is_empty() {
            return Err(RewriteError::invalid_unit("<unnamed>", "unit has no name"));
        }

        let plan = self.plan(unit);
        let mut report = RewriteReport {
            unit: unit.name.clone(),
            ..RewriteReport::default()
        };

        if let Some(sup) = &plan.corrected_super {
            if sup.is_empty() {
                return Err(RewriteError::invalid_unit(&unit.name, "name starts with the generation suffix"));
            }
            unit.super_name = Some(sup.clone());
        }

        let unit_name = unit.name.clone();
        for method in &mut unit.methods {
            if !method.has_code() {
                continue;
            }
            let mut strategy = self.strategy_for(&plan, &unit_name, method);
            let stats = rewrite_method(method, &mut strategy)?;
            report.methods_visited += 1;
            match strategy {
                Strategy::Construction(_) => report.construction_sites += stats.rewritten,
                Strategy::Supertype(_) => report.super_calls_retargeted += stats.rewritten,
                Strategy::ResolutionHook(_) => report.hooks_installed += 1,
                Strategy::PassThrough => {}
            }
            tracing::debug!(
                "{}.{}{}: {} strategy, {} rewritten",
                unit_name,
                method.name,
                method.desc,
                strategy.name(),
                stats.rewritten
            );
        }

        if plan.loader_like {
            self.add_marker(unit);
            report.marker_synthesized = true;
        }

        tracing::info!("rewrote {}", report);
        Ok(report)
    }

    /// Decode, rewrite and re-encode a unit
    ///
    /// # Errors
    /// Returns error if decoding, rewriting or encoding fails
    pub fn rewrite_bytes(&self, bytes: &[u8]) -> Result<(Vec<u8>, RewriteReport), RewriteError> {
        let mut unit = decode(bytes)?;
        let report = self.rewrite(&mut unit)?;
        Ok((encode(&unit)?, report))
    }

    fn add_marker(&self, unit: &mut UnitNode) {
        let s = &self.symbols;
        unit.interfaces.push(s.marker.clone());
        unit.methods.push(
            MethodNode::new(ACC_PUBLIC, s.marker_method.clone(), s.marker_method_desc.clone())
                .with_code(
                    vec![
                        Insn::var(ALOAD, 0),
                        Insn::var(ALOAD, 1),
                        Insn::var(ALOAD, 2),
                        Insn::var(ILOAD, 3),
                        Insn::var(ILOAD, 4),
                        Insn::method(
                            INVOKEVIRTUAL,
                            s.root_loader.clone(),
                            s.define_method.clone(),
                            s.define_desc.clone(),
                        ),
                        Insn::simple(ARETURN),
                    ],
                    5,
                    5,
                ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_bytecode::opcodes::*;
    use hotswap_test_utils::{
        count_calls, default_init, loader_unit, make_method, simple_unit, OBJECT, URL_LOADER,
    };

    #[test]
    fn plan_for_plain_unit() {
        let plan = UnitRewriter::default().plan(&simple_unit("demo/A"));
        assert_eq!(
            plan,
            UnitPlan {
                corrected_super: None,
                loader_like: false
            }
        );
    }

    #[test]
    fn plan_for_generation() {
        let unit = simple_unit("demo/Outer$Inner$HCR$3");
        let plan = UnitRewriter::default().plan(&unit);
        assert_eq!(plan.corrected_super.as_deref(), Some("demo/Outer$Inner"));
    }

    #[test]
    fn plan_for_loaders() {
        let rw = UnitRewriter::default();
        assert!(rw.plan(&loader_unit("demo/L", URL_LOADER)).loader_like);
        assert!(!rw.plan(&loader_unit("demo/L", "demo/OtherBase")).loader_like);

        let mut marked = loader_unit("demo/L", URL_LOADER);
        marked.interfaces.push(HostSymbols::default().marker);
        assert!(!rw.plan(&marked).loader_like);

        let mut with_method = loader_unit("demo/L", URL_LOADER);
        with_method.methods.push(MethodNode::new(
            ACC_PUBLIC,
            "defineUnit",
            "(Ljava/lang/String;[BII)Ljava/lang/Class;",
        ));
        assert!(!rw.plan(&with_method).loader_like);
    }

    #[test]
    fn generation_rewrites_super_and_constructor() {
        let mut unit = UnitNode::new("demo/A$HCR$0", Some("demo/Base".into()));
        unit.methods.push(default_init("demo/Base"));
        unit.methods.push(make_method("make", "demo/B", &[]));

        let report = UnitRewriter::default().rewrite(&mut unit).unwrap();
        assert_eq!(unit.super_name.as_deref(), Some("demo/A"));
        assert_eq!(report.super_calls_retargeted, 1);
        assert_eq!(report.construction_sites, 1);
        assert_eq!(
            unit.methods[0].insns[1],
            Insn::method(INVOKESPECIAL, "demo/A", "<init>", "()V")
        );
    }

    #[test]
    fn ordinary_constructor_sites_rewritten() {
        let mut unit = simple_unit("demo/Holder");
        let init = &mut unit.methods[0];
        let mut body = init.insns.clone();
        body.insert(2, Insn::var(ALOAD, 0));
        body.insert(3, Insn::type_insn(NEW, "demo/Part"));
        body.insert(4, Insn::simple(DUP));
        body.insert(5, Insn::method(INVOKESPECIAL, "demo/Part", "<init>", "()V"));
        body.insert(6, Insn::field(PUTFIELD, "demo/Holder", "part", "Ldemo/Part;"));
        init.set_insns(body);
        init.max_stack = 3;

        let report = UnitRewriter::default().rewrite(&mut unit).unwrap();
        assert_eq!(report.construction_sites, 1);
        // super call is not a construction site
        assert_eq!(
            unit.methods[0].insns[1],
            Insn::method(INVOKESPECIAL, OBJECT, "<init>", "()V")
        );
    }

    #[test]
    fn loader_gets_hook_and_marker() {
        let mut unit = loader_unit("demo/PluginLoader", URL_LOADER);
        let report = UnitRewriter::default().rewrite(&mut unit).unwrap();

        assert_eq!(report.hooks_installed, 1);
        assert!(report.marker_synthesized);
        assert!(unit.interfaces.contains(&"hotswap/runtime/OverrideCapable".to_string()));
        let define = unit
            .method("defineUnit", "(Ljava/lang/String;[BII)Ljava/lang/Class;")
            .unwrap();
        assert_eq!(count_calls(define, "java/lang/ClassLoader", "defineClass"), 1);
        let load = unit
            .method("loadClass", "(Ljava/lang/String;Z)Ljava/lang/Class;")
            .unwrap();
        assert_eq!(count_calls(load, "hotswap/runtime/Registry", "get"), 1);
        assert_eq!(count_calls(load, "hotswap/runtime/Registry", "put"), 1);

        // second pass sees the marker and leaves the unit alone
        let again = UnitRewriter::default().rewrite(&mut unit).unwrap();
        assert!(!again.marker_synthesized);
        assert_eq!(again.hooks_installed, 0);
    }

    #[test]
    fn loader_other_methods_pass_through() {
        let mut unit = loader_unit("demo/PluginLoader", URL_LOADER);
        unit.methods.push(make_method("helper", "demo/B", &[]));
        let before = unit.methods[2].insns.clone();
        let report = UnitRewriter::default().rewrite(&mut unit).unwrap();
        assert_eq!(report.construction_sites, 0);
        assert_eq!(unit.methods[2].insns, before);
    }

    #[test]
    fn report_display() {
        let report = RewriteReport {
            unit: "demo/A".into(),
            methods_visited: 2,
            construction_sites: 3,
            ..RewriteReport::default()
        };
        assert!(report.changed());
        assert_eq!(
            report.to_string(),
            "demo/A: 2 methods, 3 construction sites, 0 super calls, 0 hooks"
        );
    }

    #[test]
    fn rewrite_bytes_rejects_garbage() {
        assert!(matches!(
            UnitRewriter::default().rewrite_bytes(b"nope"),
            Err(RewriteError::Codec(_))
        ));
    }
}
