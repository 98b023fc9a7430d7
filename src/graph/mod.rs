//! The symbol graph the linker operates on.
//!
//! A [`SymbolGraph`] is an arena of modules, types and members. Every symbol receives a dense
//! [`SymbolId`] when it is added and keeps it for the whole run: removal only flags a symbol,
//! it never moves or frees it, so side tables indexed by id (the mark table, annotations)
//! stay valid after Sweep.
//!
//! # Architecture
//!
//! - [`symbol`] - The [`Symbol`] record and its kind-specific details
//! - [`reference`] - [`SymbolRef`], the name-based cross-assembly reference
//! - [`attribute`] - Raw custom attributes and security declarations
//! - [`body`] - Method bodies reduced to the symbols they reference
//! - [`document`] - The JSON module document format, loader and writer
//!
//! # Naming
//!
//! Types are indexed by their full name (`Ns.Type`, nested `Ns.Outer/Inner`), members by
//! `Ns.Type::Name`. Names are unique per assembly; adding a second symbol with the same full
//! name fails with [`crate::Error::DuplicateSymbol`]. Overloaded methods are therefore expected
//! to carry distinct names in the document (for example `Run(System.Int32)`).
//!
//! # Usage
//!
//! ```rust,ignore
//! use dotlink::graph::{SymbolGraph, ModuleKind, Visibility, SymbolFlags, TypeInfo};
//!
//! let mut graph = SymbolGraph::new();
//! let module = graph.add_module("App", ModuleKind::Executable)?;
//! let program = graph.add_type(module, "Program", Visibility::Public, SymbolFlags::empty(), TypeInfo::default())?;
//! assert_eq!(graph.symbol(program).full_name, "Program");
//! ```

pub mod attribute;
pub mod body;
pub mod document;
pub mod reference;
pub mod symbol;

pub use attribute::{AttributeArgument, CustomAttribute, SecurityDeclaration};
pub use body::{
    BodyKind, BodyReference, BodyReferenceKind, BranchGuard, MethodBody, MethodDebugInformation,
    SequencePoint,
};
pub use document::{JsonModuleLoader, ModuleDocument, ModuleLoader};
pub use reference::{SymbolRef, MEMBER_SEPARATOR, NESTED_SEPARATOR};
pub use symbol::{
    AccessorOwnerInfo, FieldInfo, MethodInfo, ModuleInfo, ModuleKind, Resource, Symbol,
    SymbolDetail, SymbolFlags, SymbolId, SymbolKind, TypeInfo, Visibility,
};

use rustc_hash::FxHashMap;
use uguid::Guid;

use crate::{Error, Result};

/// Arena of all loaded modules, types and members.
#[derive(Debug, Default, Clone)]
pub struct SymbolGraph {
    symbols: Vec<Symbol>,
    index: FxHashMap<SymbolRef, SymbolId>,
    modules: FxHashMap<String, SymbolId>,
    module_order: Vec<SymbolId>,
}

impl SymbolGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of symbols, removed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns true if no symbol was added yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Adds the main module of assembly `assembly`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSymbol`] if the assembly is already present.
    pub fn add_module(&mut self, assembly: &str, kind: ModuleKind) -> Result<SymbolId> {
        if self.modules.contains_key(assembly) {
            return Err(Error::DuplicateSymbol(SymbolRef::new(assembly, assembly)));
        }

        let id = self.next_id();
        self.symbols.push(Symbol {
            id,
            name: assembly.to_string(),
            full_name: assembly.to_string(),
            parent: None,
            module: id,
            children: Vec::new(),
            visibility: Visibility::Public,
            flags: SymbolFlags::empty(),
            attributes: Vec::new(),
            security: Vec::new(),
            detail: SymbolDetail::Module(ModuleInfo {
                assembly: assembly.to_string(),
                kind,
                entry_point: None,
                references: Vec::new(),
                resources: Vec::new(),
                mvid: Guid::ZERO,
                source_path: None,
            }),
            removed: false,
        });
        self.modules.insert(assembly.to_string(), id);
        self.module_order.push(id);
        Ok(id)
    }

    /// Adds a type to a module (top-level) or to a type (nested).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSymbol`] if the full name is taken, or
    /// [`Error::Malformed`] if `parent` is neither a module nor a type.
    pub fn add_type(
        &mut self,
        parent: SymbolId,
        name: &str,
        visibility: Visibility,
        flags: SymbolFlags,
        info: TypeInfo,
    ) -> Result<SymbolId> {
        let parent_symbol = self.symbol(parent);
        let full_name = match parent_symbol.kind() {
            SymbolKind::Module => name.to_string(),
            SymbolKind::Type => format!("{}{}{}", parent_symbol.full_name, NESTED_SEPARATOR, name),
            kind => {
                return Err(malformed_error!(
                    "A type cannot be declared inside a {} ('{}')",
                    kind,
                    parent_symbol.full_name
                ))
            }
        };

        self.insert(parent, name, full_name, visibility, flags, SymbolDetail::Type(info))
    }

    /// Adds a field to a type.
    ///
    /// # Errors
    ///
    /// See [`SymbolGraph::add_type`].
    pub fn add_field(
        &mut self,
        declaring_type: SymbolId,
        name: &str,
        visibility: Visibility,
        flags: SymbolFlags,
        info: FieldInfo,
    ) -> Result<SymbolId> {
        let full_name = self.member_name(declaring_type, name)?;
        self.insert(
            declaring_type,
            name,
            full_name,
            visibility,
            flags,
            SymbolDetail::Field(info),
        )
    }

    /// Adds a method to a type.
    ///
    /// # Errors
    ///
    /// See [`SymbolGraph::add_type`].
    pub fn add_method(
        &mut self,
        declaring_type: SymbolId,
        name: &str,
        visibility: Visibility,
        flags: SymbolFlags,
        info: MethodInfo,
    ) -> Result<SymbolId> {
        let full_name = self.member_name(declaring_type, name)?;
        self.insert(
            declaring_type,
            name,
            full_name,
            visibility,
            flags,
            SymbolDetail::Method(info),
        )
    }

    /// Adds a property to a type; its accessors are linked back to it.
    ///
    /// # Errors
    ///
    /// See [`SymbolGraph::add_type`].
    pub fn add_property(
        &mut self,
        declaring_type: SymbolId,
        name: &str,
        visibility: Visibility,
        info: AccessorOwnerInfo,
    ) -> Result<SymbolId> {
        let full_name = self.member_name(declaring_type, name)?;
        let accessors = info.accessors.clone();
        let id = self.insert(
            declaring_type,
            name,
            full_name,
            visibility,
            SymbolFlags::empty(),
            SymbolDetail::Property(info),
        )?;
        self.link_accessors(id, &accessors);
        Ok(id)
    }

    /// Adds an event to a type; its accessors are linked back to it.
    ///
    /// # Errors
    ///
    /// See [`SymbolGraph::add_type`].
    pub fn add_event(
        &mut self,
        declaring_type: SymbolId,
        name: &str,
        visibility: Visibility,
        info: AccessorOwnerInfo,
    ) -> Result<SymbolId> {
        let full_name = self.member_name(declaring_type, name)?;
        let accessors = info.accessors.clone();
        let id = self.insert(
            declaring_type,
            name,
            full_name,
            visibility,
            SymbolFlags::empty(),
            SymbolDetail::Event(info),
        )?;
        self.link_accessors(id, &accessors);
        Ok(id)
    }

    /// Returns the symbol with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    /// Returns the symbol with the given id, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    /// Returns the symbol with the given id, if it exists.
    #[must_use]
    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.index())
    }

    /// Iterates over all symbols in id order, removed ones included.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Resolves a reference to a definition.
    #[must_use]
    pub fn find(&self, reference: &SymbolRef) -> Option<SymbolId> {
        self.index.get(reference).copied()
    }

    /// Returns the module of the named assembly.
    #[must_use]
    pub fn module(&self, assembly: &str) -> Option<SymbolId> {
        self.modules.get(assembly).copied()
    }

    /// Returns all modules in load order.
    #[must_use]
    pub fn modules(&self) -> &[SymbolId] {
        &self.module_order
    }

    /// Returns the module information of `module`.
    ///
    /// # Panics
    ///
    /// Panics if `module` is not a module.
    #[must_use]
    pub fn module_info(&self, module: SymbolId) -> &ModuleInfo {
        match &self.symbol(module).detail {
            SymbolDetail::Module(info) => info,
            _ => panic!("{module} is not a module"),
        }
    }

    /// Returns the name of the assembly `id` belongs to.
    #[must_use]
    pub fn assembly_of(&self, id: SymbolId) -> &str {
        &self.module_info(self.symbol(id).module).assembly
    }

    /// Returns a reference naming `id`.
    #[must_use]
    pub fn reference_to(&self, id: SymbolId) -> SymbolRef {
        SymbolRef::new(self.assembly_of(id), self.symbol(id).full_name.clone())
    }

    /// Returns the direct children of `id` in declaration order.
    #[must_use]
    pub fn children(&self, id: SymbolId) -> &[SymbolId] {
        &self.symbol(id).children
    }

    /// Returns all transitive children of `id` in pre-order, excluding `id` itself.
    #[must_use]
    pub fn descendants(&self, id: SymbolId) -> Vec<SymbolId> {
        let mut result = Vec::new();
        let mut stack: Vec<SymbolId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            result.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        result
    }

    /// Returns all types of a module, nested types included, in pre-order.
    #[must_use]
    pub fn types_of(&self, module: SymbolId) -> Vec<SymbolId> {
        self.descendants(module)
            .into_iter()
            .filter(|id| self.symbol(*id).kind() == SymbolKind::Type)
            .collect()
    }

    /// Returns the members (not nested types) declared directly in `declaring_type`.
    pub fn members_of(&self, declaring_type: SymbolId) -> impl Iterator<Item = SymbolId> + '_ {
        self.children(declaring_type)
            .iter()
            .copied()
            .filter(|id| self.symbol(*id).kind().is_member())
    }

    /// Returns the type declaring a member or nested type.
    #[must_use]
    pub fn declaring_type(&self, id: SymbolId) -> Option<SymbolId> {
        self.symbol(id)
            .parent
            .filter(|parent| self.symbol(*parent).kind() == SymbolKind::Type)
    }

    /// Finds a member of `declaring_type` by simple name.
    #[must_use]
    pub fn find_member(&self, declaring_type: SymbolId, name: &str) -> Option<SymbolId> {
        self.members_of(declaring_type)
            .find(|id| self.symbol(*id).name == name)
    }

    /// Resolves the base type of `ty` when it is defined in the graph.
    #[must_use]
    pub fn base_type(&self, ty: SymbolId) -> Option<SymbolId> {
        self.symbol(ty)
            .as_type()
            .and_then(|info| info.base_type.as_ref())
            .and_then(|base| self.find(base))
    }

    /// Flags `id` and all its descendants as removed.
    ///
    /// Removed symbols keep their ids and stay resolvable through [`SymbolGraph::find`];
    /// writers skip them.
    pub fn remove(&mut self, id: SymbolId) {
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let symbol = self.symbol_mut(next);
            symbol.removed = true;
            pending.extend(symbol.children.iter().copied());
        }
    }

    /// Replaces the body of a method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if `method` is not a method.
    pub fn set_body(&mut self, method: SymbolId, body: Option<MethodBody>) -> Result<()> {
        let symbol = self.symbol_mut(method);
        let full_name = symbol.full_name.clone();
        match symbol.as_method_mut() {
            Some(info) => {
                info.body = body;
                Ok(())
            }
            None => Err(malformed_error!("'{}' is not a method", full_name)),
        }
    }

    /// Sets the module version id of `module`.
    pub fn set_mvid(&mut self, module: SymbolId, mvid: Guid) {
        if let Some(info) = self.symbol_mut(module).as_module_mut() {
            info.mvid = mvid;
        }
    }

    fn next_id(&self) -> SymbolId {
        SymbolId(u32::try_from(self.symbols.len()).unwrap_or(u32::MAX))
    }

    fn member_name(&self, declaring_type: SymbolId, name: &str) -> Result<String> {
        let ty = self.symbol(declaring_type);
        if ty.kind() != SymbolKind::Type {
            return Err(malformed_error!(
                "Member '{}' must be declared in a type, not in {} '{}'",
                name,
                ty.kind(),
                ty.full_name
            ));
        }
        Ok(format!("{}{}{}", ty.full_name, MEMBER_SEPARATOR, name))
    }

    fn insert(
        &mut self,
        parent: SymbolId,
        name: &str,
        full_name: String,
        visibility: Visibility,
        flags: SymbolFlags,
        detail: SymbolDetail,
    ) -> Result<SymbolId> {
        let module = self.symbol(parent).module;
        let key = SymbolRef::new(self.module_info(module).assembly.clone(), full_name.clone());
        if self.index.contains_key(&key) {
            return Err(Error::DuplicateSymbol(key));
        }

        let id = self.next_id();
        self.symbols.push(Symbol {
            id,
            name: name.to_string(),
            full_name,
            parent: Some(parent),
            module,
            children: Vec::new(),
            visibility,
            flags,
            attributes: Vec::new(),
            security: Vec::new(),
            detail,
            removed: false,
        });
        self.symbol_mut(parent).children.push(id);
        self.index.insert(key, id);
        Ok(id)
    }

    fn link_accessors(&mut self, owner: SymbolId, accessors: &[SymbolId]) {
        for accessor in accessors {
            if let Some(info) = self.symbol_mut(*accessor).as_method_mut() {
                info.accessor_of = Some(owner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (SymbolGraph, SymbolId, SymbolId, SymbolId) {
        let mut graph = SymbolGraph::new();
        let module = graph.add_module("App", ModuleKind::Library).unwrap();
        let outer = graph
            .add_type(
                module,
                "Ns.Outer",
                Visibility::Public,
                SymbolFlags::empty(),
                TypeInfo::default(),
            )
            .unwrap();
        let inner = graph
            .add_type(
                outer,
                "Inner",
                Visibility::Private,
                SymbolFlags::empty(),
                TypeInfo::default(),
            )
            .unwrap();
        (graph, module, outer, inner)
    }

    #[test]
    fn full_names_and_lookup() {
        let (mut graph, module, outer, inner) = sample();
        let method = graph
            .add_method(
                inner,
                "Run",
                Visibility::Public,
                SymbolFlags::empty(),
                MethodInfo::default(),
            )
            .unwrap();

        assert_eq!(graph.symbol(inner).full_name, "Ns.Outer/Inner");
        assert_eq!(graph.symbol(method).full_name, "Ns.Outer/Inner::Run");
        assert_eq!(
            graph.find(&SymbolRef::new("App", "Ns.Outer/Inner::Run")),
            Some(method)
        );
        assert_eq!(graph.declaring_type(method), Some(inner));
        assert_eq!(graph.declaring_type(outer), None);
        assert_eq!(graph.assembly_of(method), "App");
        assert_eq!(graph.descendants(module), vec![outer, inner, method]);
    }

    #[test]
    fn duplicate_names_rejected() {
        let (mut graph, module, _, _) = sample();
        let result = graph.add_type(
            module,
            "Ns.Outer",
            Visibility::Public,
            SymbolFlags::empty(),
            TypeInfo::default(),
        );
        assert!(matches!(result, Err(Error::DuplicateSymbol(_))));
        assert!(graph.add_module("App", ModuleKind::Library).is_err());
    }

    #[test]
    fn members_need_a_type() {
        let (mut graph, module, _, _) = sample();
        let result = graph.add_field(
            module,
            "x",
            Visibility::Public,
            SymbolFlags::empty(),
            FieldInfo::default(),
        );
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn remove_flags_descendants() {
        let (mut graph, _, outer, inner) = sample();
        graph.remove(outer);
        assert!(graph.symbol(outer).is_removed());
        assert!(graph.symbol(inner).is_removed());
        assert_eq!(graph.find(&SymbolRef::new("App", "Ns.Outer")), Some(outer));
    }

    #[test]
    fn accessors_link_to_owner() {
        let (mut graph, _, outer, _) = sample();
        let getter = graph
            .add_method(
                outer,
                "get_Value",
                Visibility::Public,
                SymbolFlags::SPECIAL_NAME,
                MethodInfo::default(),
            )
            .unwrap();
        let property = graph
            .add_property(
                outer,
                "Value",
                Visibility::Public,
                AccessorOwnerInfo {
                    value_type: None,
                    accessors: vec![getter],
                },
            )
            .unwrap();
        assert_eq!(
            graph.symbol(getter).as_method().unwrap().accessor_of,
            Some(property)
        );
    }
}
