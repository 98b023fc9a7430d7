//! Per-assembly actions and root descriptions.

use rustc_hash::FxHashMap;
use strum::{Display, EnumString, IntoStaticStr};

use crate::graph::SymbolId;

/// What the linker does with an assembly.
///
/// Parsed case-insensitively from the lowercase names used on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AssemblyAction {
    /// Ignore the assembly: it is neither processed nor written, and contributes no edges.
    Skip,
    /// Keep the assembly unchanged and copy it to the output.
    Copy,
    /// Like [`AssemblyAction::Copy`], but only if something in it is used.
    CopyUsed,
    /// Remove everything that is not reachable.
    #[default]
    Link,
    /// Keep everything but tag unused methods with `BypassNGenAttribute`.
    #[strum(serialize = "addbypassngen")]
    AddBypassNGen,
    /// Like [`AssemblyAction::AddBypassNGen`], but only if something in it is used.
    #[strum(serialize = "addbypassngenused")]
    AddBypassNGenUsed,
    /// Keep everything and write the module back out (it may have been edited).
    Save,
}

impl AssemblyAction {
    /// Returns true if every symbol of such an assembly is kept unconditionally.
    #[must_use]
    pub fn keeps_everything(self) -> bool {
        matches!(self, AssemblyAction::Copy | AssemblyAction::Save)
    }

    /// Returns true if the whole assembly is kept once anything in it is reached.
    #[must_use]
    pub fn keeps_everything_when_used(self) -> bool {
        self == AssemblyAction::CopyUsed
    }

    /// Returns true for the actions that need [`crate::linker::steps::AddBypassNGenStep`].
    #[must_use]
    pub fn needs_bypass_ngen(self) -> bool {
        matches!(
            self,
            AssemblyAction::AddBypassNGen | AssemblyAction::AddBypassNGenUsed
        )
    }
}

/// Which part of an assembly's API surface becomes a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum RootVisibility {
    /// Every type and member (`-a`).
    #[default]
    Any,
    /// Only what is visible from outside the assembly (`-r`).
    PublicAndFamily,
}

impl RootVisibility {
    /// Returns true if a symbol with `visibility` passes this filter.
    #[must_use]
    pub fn admits(self, visibility: crate::graph::Visibility) -> bool {
        match self {
            RootVisibility::Any => true,
            RootVisibility::PublicAndFamily => visibility.is_public_or_family(),
        }
    }
}

/// How much of a type's content a type root keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TypePreserve {
    /// Only the type itself.
    Nothing,
    /// Every field and method (and through them properties and events).
    #[default]
    All,
    /// Fields only.
    Fields,
    /// Methods only.
    Methods,
}

/// A symbol that seeds marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Root {
    /// The rooted symbol.
    pub symbol: SymbolId,
    /// Member filter applied when the root is a type.
    pub visibility: RootVisibility,
    /// Member selection applied when the root is a type.
    pub preserve: TypePreserve,
}

impl Root {
    /// Roots a single symbol; a type root keeps all of its members.
    #[must_use]
    pub fn new(symbol: SymbolId) -> Self {
        Root {
            symbol,
            visibility: RootVisibility::Any,
            preserve: TypePreserve::All,
        }
    }

    /// Roots a symbol with the given member filter and preservation mode.
    #[must_use]
    pub fn with(symbol: SymbolId, visibility: RootVisibility, preserve: TypePreserve) -> Self {
        Root {
            symbol,
            visibility,
            preserve,
        }
    }
}

/// Assembly names treated as core libraries for [`ActionTable::core_action`].
pub const CORE_LIBRARIES: [&str; 3] = ["System.Private.CoreLib", "mscorlib", "netstandard"];

/// Returns true for framework assemblies governed by the core action.
#[must_use]
pub fn is_core_library(assembly: &str) -> bool {
    CORE_LIBRARIES.contains(&assembly)
        || assembly == "System"
        || assembly.starts_with("System.")
        || assembly.starts_with("Microsoft.")
}

/// The per-assembly action table.
///
/// Explicit overrides (`-p`) always win, then the core action for framework assemblies, then
/// the user action. Setting an override twice keeps the last value.
#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    /// Action for framework assemblies without an override (`-c`).
    pub core_action: AssemblyAction,
    /// Action for all other assemblies without an override (`-u`).
    pub user_action: AssemblyAction,
    overrides: FxHashMap<String, AssemblyAction>,
    effective: FxHashMap<String, AssemblyAction>,
}

impl ActionTable {
    /// Creates a table with both default actions set to [`AssemblyAction::Link`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an explicit override; later calls for the same assembly win.
    pub fn set_override(&mut self, assembly: &str, action: AssemblyAction) {
        self.overrides.insert(assembly.to_string(), action);
        if self.effective.contains_key(assembly) {
            self.effective.insert(assembly.to_string(), action);
        }
    }

    /// Returns the explicit override for `assembly`, if any.
    #[must_use]
    pub fn explicit(&self, assembly: &str) -> Option<AssemblyAction> {
        self.overrides.get(assembly).copied()
    }

    /// Returns the default action that applies to `assembly` when it is loaded.
    #[must_use]
    pub fn default_for(&self, assembly: &str) -> AssemblyAction {
        if let Some(action) = self.explicit(assembly) {
            action
        } else if is_core_library(assembly) {
            self.core_action
        } else {
            self.user_action
        }
    }

    /// Fixes the action of a freshly loaded assembly and returns it.
    pub fn assign(&mut self, assembly: &str) -> AssemblyAction {
        let action = self.default_for(assembly);
        self.effective.insert(assembly.to_string(), action);
        action
    }

    /// Returns the action in force for `assembly`.
    #[must_use]
    pub fn get(&self, assembly: &str) -> AssemblyAction {
        self.effective
            .get(assembly)
            .copied()
            .unwrap_or_else(|| self.default_for(assembly))
    }

    /// Changes the action in force for `assembly`.
    pub fn set(&mut self, assembly: &str, action: AssemblyAction) {
        self.effective.insert(assembly.to_string(), action);
    }

    /// Returns true if any configured action requires the BypassNGen step.
    #[must_use]
    pub fn needs_bypass_ngen(&self) -> bool {
        self.core_action.needs_bypass_ngen()
            || self.user_action.needs_bypass_ngen()
            || self.overrides.values().any(|a| a.needs_bypass_ngen())
    }
}
