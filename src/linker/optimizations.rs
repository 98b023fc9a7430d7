//! Code optimization switches with global and per-assembly scope.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::{Error, Result};

bitflags! {
    /// Optimizations the linker may apply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CodeOptimizations: u32 {
        /// Static constructors of types that are only touched through marked members are kept
        /// only when a static field is accessed (`beforefieldinit`).
        const BEFORE_FIELD_INIT = 1 << 0;
        /// Overrides of virtual methods on never-instantiated types are removed.
        const OVERRIDE_REMOVAL = 1 << 1;
        /// Instance methods that are marked but can never run are converted to throws.
        const UNREACHABLE_BODIES = 1 << 2;
        /// `.locals init` is cleared.
        const CLEAR_INIT_LOCALS = 1 << 3;
        /// Interface implementations are dropped when the interface is otherwise unused.
        const UNUSED_INTERFACES = 1 << 4;
        /// Branches guarded by constant conditions are folded.
        const IP_CONSTANT_PROPAGATION = 1 << 5;
        /// Types and methods without marked overrides are sealed.
        const SEALER = 1 << 6;
    }
}

impl CodeOptimizations {
    /// The optimizations that are on unless disabled.
    pub const DEFAULT: CodeOptimizations = CodeOptimizations::BEFORE_FIELD_INIT
        .union(CodeOptimizations::OVERRIDE_REMOVAL)
        .union(CodeOptimizations::UNREACHABLE_BODIES)
        .union(CodeOptimizations::UNUSED_INTERFACES)
        .union(CodeOptimizations::IP_CONSTANT_PROPAGATION);

    /// Parses the command-line name of an optimization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown name.
    pub fn from_option_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "beforefieldinit" => Ok(CodeOptimizations::BEFORE_FIELD_INIT),
            "overrideremoval" => Ok(CodeOptimizations::OVERRIDE_REMOVAL),
            "unreachablebodies" => Ok(CodeOptimizations::UNREACHABLE_BODIES),
            "clearinitlocals" => Ok(CodeOptimizations::CLEAR_INIT_LOCALS),
            "unusedinterfaces" => Ok(CodeOptimizations::UNUSED_INTERFACES),
            "ipconstprop" => Ok(CodeOptimizations::IP_CONSTANT_PROPAGATION),
            "sealer" => Ok(CodeOptimizations::SEALER),
            _ => Err(Error::Configuration(format!(
                "Invalid optimization value '{name}'"
            ))),
        }
    }
}

impl Default for CodeOptimizations {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Global optimization flags plus per-assembly enable and disable masks.
///
/// An assembly-scoped setting always wins over the global value.
#[derive(Debug, Clone, Default)]
pub struct OptimizationSet {
    global: CodeOptimizations,
    enabled: FxHashMap<String, CodeOptimizations>,
    disabled: FxHashMap<String, CodeOptimizations>,
}

impl OptimizationSet {
    /// Creates the default set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables `opt` globally (`assembly = None`) or for one assembly.
    pub fn enable(&mut self, opt: CodeOptimizations, assembly: Option<&str>) {
        match assembly {
            None => self.global.insert(opt),
            Some(name) => {
                self.enabled.entry(name.to_string()).or_insert_with(CodeOptimizations::empty).insert(opt);
                if let Some(mask) = self.disabled.get_mut(name) {
                    mask.remove(opt);
                }
            }
        }
    }

    /// Disables `opt` globally (`assembly = None`) or for one assembly.
    pub fn disable(&mut self, opt: CodeOptimizations, assembly: Option<&str>) {
        match assembly {
            None => self.global.remove(opt),
            Some(name) => {
                self.disabled.entry(name.to_string()).or_insert_with(CodeOptimizations::empty).insert(opt);
                if let Some(mask) = self.enabled.get_mut(name) {
                    mask.remove(opt);
                }
            }
        }
    }

    /// Returns true if every flag of `opt` is enabled for `assembly`.
    #[must_use]
    pub fn is_enabled(&self, opt: CodeOptimizations, assembly: &str) -> bool {
        let mut effective = self.global;
        if let Some(mask) = self.enabled.get(assembly) {
            effective |= *mask;
        }
        if let Some(mask) = self.disabled.get(assembly) {
            effective &= !*mask;
        }
        effective.contains(opt)
    }

    /// Returns the global flags.
    #[must_use]
    pub fn global(&self) -> CodeOptimizations {
        self.global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let set = OptimizationSet::new();
        assert!(set.is_enabled(CodeOptimizations::OVERRIDE_REMOVAL, "A"));
        assert!(set.is_enabled(CodeOptimizations::UNUSED_INTERFACES, "A"));
        assert!(!set.is_enabled(CodeOptimizations::SEALER, "A"));
        assert!(!set.is_enabled(CodeOptimizations::CLEAR_INIT_LOCALS, "A"));
    }

    #[test]
    fn assembly_scope_wins() {
        let mut set = OptimizationSet::new();
        set.disable(CodeOptimizations::OVERRIDE_REMOVAL, Some("A"));
        set.enable(CodeOptimizations::SEALER, Some("B"));
        set.disable(CodeOptimizations::SEALER, None);
        set.enable(CodeOptimizations::OVERRIDE_REMOVAL, None);

        assert!(!set.is_enabled(CodeOptimizations::OVERRIDE_REMOVAL, "A"));
        assert!(set.is_enabled(CodeOptimizations::OVERRIDE_REMOVAL, "B"));
        assert!(set.is_enabled(CodeOptimizations::SEALER, "B"));
        assert!(!set.is_enabled(CodeOptimizations::SEALER, "A"));
    }

    #[test]
    fn names() {
        assert_eq!(
            CodeOptimizations::from_option_name("IPConstProp").unwrap(),
            CodeOptimizations::IP_CONSTANT_PROPAGATION
        );
        assert!(matches!(
            CodeOptimizations::from_option_name("inline"),
            Err(Error::Configuration(_))
        ));
    }
}
