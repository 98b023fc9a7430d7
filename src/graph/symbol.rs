//! Symbol definitions stored in the [`crate::graph::SymbolGraph`] arena.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uguid::Guid;

use crate::graph::{
    attribute::{CustomAttribute, SecurityDeclaration},
    body::{MethodBody, MethodDebugInformation},
    SymbolRef,
};

/// A stable identifier of a symbol inside one [`crate::graph::SymbolGraph`].
///
/// Ids are dense arena indices assigned in load order and never reused, so per-symbol side
/// tables (mark state, annotations) can be plain vectors indexed by [`SymbolId::index`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub(crate) u32);

impl SymbolId {
    /// Returns the raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum SymbolKind {
    /// The main module of an assembly.
    Module,
    /// A type definition (possibly nested).
    Type,
    /// A field definition.
    Field,
    /// A method definition.
    Method,
    /// A property definition.
    Property,
    /// An event definition.
    Event,
}

impl SymbolKind {
    /// Returns true for fields, methods, properties and events.
    #[must_use]
    pub fn is_member(self) -> bool {
        matches!(
            self,
            SymbolKind::Field | SymbolKind::Method | SymbolKind::Property | SymbolKind::Event
        )
    }
}

/// Accessibility of a type or member.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible everywhere.
    Public,
    /// `protected`
    Family,
    /// `protected internal`
    FamilyOrAssembly,
    /// `private protected`
    FamilyAndAssembly,
    /// `internal`
    Assembly,
    /// `private`
    #[default]
    Private,
}

impl Visibility {
    /// Returns true if code outside the assembly can see the symbol (public or reachable
    /// through inheritance).
    #[must_use]
    pub fn is_public_or_family(self) -> bool {
        matches!(
            self,
            Visibility::Public | Visibility::Family | Visibility::FamilyOrAssembly
        )
    }
}

bitflags! {
    /// Definition flags relevant to linking.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SymbolFlags: u32 {
        /// Static member.
        const STATIC = 1 << 0;
        /// Virtual method.
        const VIRTUAL = 1 << 1;
        /// Abstract type or method.
        const ABSTRACT = 1 << 2;
        /// Sealed type.
        const SEALED = 1 << 3;
        /// Interface type.
        const INTERFACE = 1 << 4;
        /// Virtual method that starts a new slot instead of overriding.
        const NEW_SLOT = 1 << 5;
        /// Final (sealed) virtual method.
        const FINAL = 1 << 6;
        /// Method implemented by the runtime.
        const RUNTIME = 1 << 7;
        /// Type whose static constructor may run lazily.
        const BEFORE_FIELD_INIT = 1 << 8;
        /// Special name (accessors, constructors).
        const SPECIAL_NAME = 1 << 9;
        /// Value type.
        const VALUE_TYPE = 1 << 10;
    }
}

impl SymbolFlags {
    /// Names used in module documents, in bit order.
    pub const NAMES: [(&'static str, SymbolFlags); 11] = [
        ("static", SymbolFlags::STATIC),
        ("virtual", SymbolFlags::VIRTUAL),
        ("abstract", SymbolFlags::ABSTRACT),
        ("sealed", SymbolFlags::SEALED),
        ("interface", SymbolFlags::INTERFACE),
        ("newslot", SymbolFlags::NEW_SLOT),
        ("final", SymbolFlags::FINAL),
        ("runtime", SymbolFlags::RUNTIME),
        ("beforefieldinit", SymbolFlags::BEFORE_FIELD_INIT),
        ("specialname", SymbolFlags::SPECIAL_NAME),
        ("valuetype", SymbolFlags::VALUE_TYPE),
    ];

    /// Looks up a flag by its document name.
    #[must_use]
    pub fn from_document_name(name: &str) -> Option<SymbolFlags> {
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| *f)
    }

    /// Returns the document names of all set flags.
    #[must_use]
    pub fn to_names(self) -> Vec<String> {
        Self::NAMES
            .iter()
            .filter(|(_, f)| self.contains(*f))
            .map(|(n, _)| (*n).to_string())
            .collect()
    }
}

/// Whether a module is a library or has an entry point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// A class library.
    #[default]
    Library,
    /// A console or windows executable.
    Executable,
}

/// A manifest resource embedded in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// The resource name.
    pub name: String,
    /// The resource content (descriptors are text).
    pub content: String,
}

/// Module-level information.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInfo {
    /// The assembly name; unique within a graph.
    pub assembly: String,
    /// Library or executable.
    pub kind: ModuleKind,
    /// Entry point method of an executable.
    pub entry_point: Option<SymbolRef>,
    /// Names of referenced assemblies.
    pub references: Vec<String>,
    /// Embedded resources.
    pub resources: Vec<Resource>,
    /// Module version id.
    pub mvid: Guid,
    /// File the module was loaded from, if any.
    pub source_path: Option<std::path::PathBuf>,
}

/// Type-level information.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeInfo {
    /// Base type, `None` for `System.Object` and interfaces.
    pub base_type: Option<SymbolRef>,
    /// Implemented interfaces.
    pub interfaces: Vec<SymbolRef>,
}

/// Field-level information.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldInfo {
    /// Field type.
    pub field_type: Option<SymbolRef>,
    /// Constant or substituted initial value.
    pub constant: Option<String>,
}

/// Method-level information.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodInfo {
    /// Return type, `None` for `void`.
    pub return_type: Option<SymbolRef>,
    /// Parameter types.
    pub parameters: Vec<SymbolRef>,
    /// Methods explicitly overridden (`.override` / `MethodImpl`).
    pub overrides: Vec<SymbolRef>,
    /// The body, `None` for abstract, extern and runtime methods.
    pub body: Option<MethodBody>,
    /// Property or event this method is an accessor of.
    pub accessor_of: Option<SymbolId>,
    /// Debug information.
    pub debug: Option<MethodDebugInformation>,
}

/// Property or event information.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccessorOwnerInfo {
    /// Property type or event handler type.
    pub value_type: Option<SymbolRef>,
    /// Accessor methods (getter/setter or add/remove/raise) in the declaring type.
    pub accessors: Vec<SymbolId>,
}

/// Kind-specific symbol data.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolDetail {
    /// See [`ModuleInfo`].
    Module(ModuleInfo),
    /// See [`TypeInfo`].
    Type(TypeInfo),
    /// See [`FieldInfo`].
    Field(FieldInfo),
    /// See [`MethodInfo`].
    Method(MethodInfo),
    /// See [`AccessorOwnerInfo`].
    Property(AccessorOwnerInfo),
    /// See [`AccessorOwnerInfo`].
    Event(AccessorOwnerInfo),
}

/// A module, type or member definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    /// Identity inside the graph.
    pub id: SymbolId,
    /// Simple name.
    pub name: String,
    /// Full name, unique within the assembly.
    pub full_name: String,
    /// Declaring module or type; `None` for modules.
    pub parent: Option<SymbolId>,
    /// The module this symbol belongs to (itself for modules).
    pub module: SymbolId,
    /// Nested types and members, in declaration order.
    pub children: Vec<SymbolId>,
    /// Accessibility.
    pub visibility: Visibility,
    /// Definition flags.
    pub flags: SymbolFlags,
    /// Raw custom attributes.
    pub attributes: Vec<CustomAttribute>,
    /// Declarative security.
    pub security: Vec<SecurityDeclaration>,
    /// Kind-specific data.
    pub detail: SymbolDetail,
    pub(crate) removed: bool,
}

impl Symbol {
    /// Returns the symbol kind.
    #[must_use]
    pub fn kind(&self) -> SymbolKind {
        match self.detail {
            SymbolDetail::Module(_) => SymbolKind::Module,
            SymbolDetail::Type(_) => SymbolKind::Type,
            SymbolDetail::Field(_) => SymbolKind::Field,
            SymbolDetail::Method(_) => SymbolKind::Method,
            SymbolDetail::Property(_) => SymbolKind::Property,
            SymbolDetail::Event(_) => SymbolKind::Event,
        }
    }

    /// Returns true once the symbol has been swept.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Returns true if `flag` is set.
    #[must_use]
    pub fn has_flag(&self, flag: SymbolFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Module data, if this is a module.
    #[must_use]
    pub fn as_module(&self) -> Option<&ModuleInfo> {
        match &self.detail {
            SymbolDetail::Module(info) => Some(info),
            _ => None,
        }
    }

    /// Mutable module data.
    pub fn as_module_mut(&mut self) -> Option<&mut ModuleInfo> {
        match &mut self.detail {
            SymbolDetail::Module(info) => Some(info),
            _ => None,
        }
    }

    /// Type data, if this is a type.
    #[must_use]
    pub fn as_type(&self) -> Option<&TypeInfo> {
        match &self.detail {
            SymbolDetail::Type(info) => Some(info),
            _ => None,
        }
    }

    /// Mutable type data.
    pub fn as_type_mut(&mut self) -> Option<&mut TypeInfo> {
        match &mut self.detail {
            SymbolDetail::Type(info) => Some(info),
            _ => None,
        }
    }

    /// Field data, if this is a field.
    #[must_use]
    pub fn as_field(&self) -> Option<&FieldInfo> {
        match &self.detail {
            SymbolDetail::Field(info) => Some(info),
            _ => None,
        }
    }

    /// Mutable field data.
    pub fn as_field_mut(&mut self) -> Option<&mut FieldInfo> {
        match &mut self.detail {
            SymbolDetail::Field(info) => Some(info),
            _ => None,
        }
    }

    /// Method data, if this is a method.
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodInfo> {
        match &self.detail {
            SymbolDetail::Method(info) => Some(info),
            _ => None,
        }
    }

    /// Mutable method data.
    pub fn as_method_mut(&mut self) -> Option<&mut MethodInfo> {
        match &mut self.detail {
            SymbolDetail::Method(info) => Some(info),
            _ => None,
        }
    }

    /// Property or event data.
    #[must_use]
    pub fn as_accessor_owner(&self) -> Option<&AccessorOwnerInfo> {
        match &self.detail {
            SymbolDetail::Property(info) | SymbolDetail::Event(info) => Some(info),
            _ => None,
        }
    }

    /// Mutable property or event data.
    pub fn as_accessor_owner_mut(&mut self) -> Option<&mut AccessorOwnerInfo> {
        match &mut self.detail {
            SymbolDetail::Property(info) | SymbolDetail::Event(info) => Some(info),
            _ => None,
        }
    }

    /// Returns true for instance and static constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.kind() == SymbolKind::Method && (self.name == ".ctor" || self.name == ".cctor")
    }

    /// Returns true for instance constructors.
    #[must_use]
    pub fn is_instance_constructor(&self) -> bool {
        self.kind() == SymbolKind::Method && self.name == ".ctor" && !self.has_flag(SymbolFlags::STATIC)
    }

    /// Returns true for virtual methods.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.kind() == SymbolKind::Method && self.has_flag(SymbolFlags::VIRTUAL)
    }

    /// Returns a display signature for methods (`Ret Name(P1,P2)`) and the name otherwise.
    #[must_use]
    pub fn signature(&self) -> String {
        let Some(method) = self.as_method() else {
            return self.name.clone();
        };

        let simple = |r: &SymbolRef| r.name.clone();
        let ret = method
            .return_type
            .as_ref()
            .map_or_else(|| "System.Void".to_string(), simple);
        let params: Vec<String> = method.parameters.iter().map(simple).collect();
        format!("{} {}({})", ret, self.name, params.join(","))
    }
}
