//! Per-symbol side tables owned by the link context.
//!
//! Symbols never report their own linker state. Mark state, instantiation, override maps and
//! substitution decisions all live here, indexed by [`SymbolId`].

use rustc_hash::FxHashMap;

use crate::{
    graph::SymbolId,
    linker::actions::TypePreserve,
    utils::BitSet,
};

/// Reachability state of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MarkState {
    /// Not reached.
    #[default]
    Unvisited,
    /// Reached and waiting in the worklist.
    Queued,
    /// Reached and all outgoing edges followed.
    Processed,
}

/// Tri-state mark table indexed by symbol id.
#[derive(Debug, Clone, Default)]
pub struct MarkTable {
    states: Vec<MarkState>,
}

impl MarkTable {
    /// Returns the state of `id`; ids beyond the table are unvisited.
    #[must_use]
    pub fn state(&self, id: SymbolId) -> MarkState {
        self.states.get(id.index()).copied().unwrap_or_default()
    }

    /// Sets the state of `id`, growing the table as needed.
    pub fn set(&mut self, id: SymbolId, state: MarkState) {
        let index = id.index();
        if index >= self.states.len() {
            self.states.resize(index + 1, MarkState::Unvisited);
        }
        self.states[index] = state;
    }

    /// Returns true once `id` has been reached.
    #[must_use]
    pub fn is_marked(&self, id: SymbolId) -> bool {
        self.state(id) != MarkState::Unvisited
    }

    /// Returns true if `id` has been fully processed.
    #[must_use]
    pub fn is_processed(&self, id: SymbolId) -> bool {
        self.state(id) == MarkState::Processed
    }

    /// Returns the ids of all processed symbols in id order.
    #[must_use]
    pub fn processed(&self) -> Vec<SymbolId> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == MarkState::Processed)
            .filter_map(|(index, _)| u32::try_from(index).ok().map(SymbolId))
            .collect()
    }
}

/// A base method / override pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverrideInformation {
    /// The overridden (base or interface) method.
    pub base: SymbolId,
    /// The overriding method.
    pub override_method: SymbolId,
    /// The type whose interface implementation produced the pair, when the override is
    /// inherited from a base type.
    pub implementor: Option<SymbolId>,
}

/// A body rewrite requested by a substitution or feature removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodAction {
    /// Replace the body with one that returns the given constant (or the default value).
    ConvertToStub(Option<String>),
    /// Replace the body with one that throws.
    ConvertToThrow,
}

/// All per-symbol linker state.
#[derive(Debug, Default)]
pub struct Annotations {
    /// The mark table.
    pub marks: MarkTable,
    instantiated: BitSet,
    preserve: FxHashMap<SymbolId, TypePreserve>,
    overrides: FxHashMap<SymbolId, Vec<OverrideInformation>>,
    base_methods: FxHashMap<SymbolId, Vec<SymbolId>>,
    method_actions: FxHashMap<SymbolId, MethodAction>,
    field_values: FxHashMap<SymbolId, String>,
    field_init: BitSet,
    unreachable_bodies: Vec<SymbolId>,
    resources_to_remove: FxHashMap<SymbolId, Vec<String>>,
}

impl Annotations {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once `id` has been reached by marking.
    #[must_use]
    pub fn is_marked(&self, id: SymbolId) -> bool {
        self.marks.is_marked(id)
    }

    /// Records that an instance of `ty` can exist.
    ///
    /// Returns true if this is new information.
    pub fn mark_instantiated(&mut self, ty: SymbolId) -> bool {
        self.instantiated.insert(ty.index())
    }

    /// Returns true if an instance of `ty` can exist.
    #[must_use]
    pub fn is_instantiated(&self, ty: SymbolId) -> bool {
        self.instantiated.contains(ty.index())
    }

    /// Sets how much of `ty` a descriptor asked to keep; `All` wins over partial modes.
    pub fn set_preserve(&mut self, ty: SymbolId, preserve: TypePreserve) {
        let merged = match (self.preserve.get(&ty).copied(), preserve) {
            (Some(TypePreserve::All), _) | (_, TypePreserve::All) => TypePreserve::All,
            (Some(TypePreserve::Fields), TypePreserve::Methods)
            | (Some(TypePreserve::Methods), TypePreserve::Fields) => TypePreserve::All,
            (Some(existing), TypePreserve::Nothing) => existing,
            (_, other) => other,
        };
        self.preserve.insert(ty, merged);
    }

    /// Returns the preservation mode requested for `ty`.
    #[must_use]
    pub fn preserve(&self, ty: SymbolId) -> Option<TypePreserve> {
        self.preserve.get(&ty).copied()
    }

    /// Records that `override_method` overrides `base`.
    pub fn add_override(&mut self, info: OverrideInformation) {
        let list = self.overrides.entry(info.base).or_default();
        if !list.iter().any(|o| o.override_method == info.override_method) {
            list.push(info);
        }
        let bases = self.base_methods.entry(info.override_method).or_default();
        if !bases.contains(&info.base) {
            bases.push(info.base);
        }
    }

    /// Returns the known overrides of `method`.
    #[must_use]
    pub fn overrides(&self, method: SymbolId) -> &[OverrideInformation] {
        self.overrides.get(&method).map_or(&[], Vec::as_slice)
    }

    /// Returns the methods `method` overrides.
    #[must_use]
    pub fn base_methods(&self, method: SymbolId) -> &[SymbolId] {
        self.base_methods.get(&method).map_or(&[], Vec::as_slice)
    }

    /// Requests a body rewrite for `method`; the latest request wins.
    pub fn set_method_action(&mut self, method: SymbolId, action: MethodAction) {
        self.method_actions.insert(method, action);
    }

    /// Returns the body rewrite requested for `method`.
    #[must_use]
    pub fn method_action(&self, method: SymbolId) -> Option<&MethodAction> {
        self.method_actions.get(&method)
    }

    /// Returns all requested body rewrites, ordered by method id.
    #[must_use]
    pub fn method_actions(&self) -> Vec<(SymbolId, MethodAction)> {
        let mut actions: Vec<_> = self
            .method_actions
            .iter()
            .map(|(id, action)| (*id, action.clone()))
            .collect();
        actions.sort_by_key(|(id, _)| *id);
        actions
    }

    /// Substitutes the value of a field; `initialize` also sets it from the static constructor.
    pub fn set_field_value(&mut self, field: SymbolId, value: String, initialize: bool) {
        self.field_values.insert(field, value);
        if initialize {
            self.field_init.insert(field.index());
        }
    }

    /// Returns the substituted value of `field`.
    #[must_use]
    pub fn field_value(&self, field: SymbolId) -> Option<&str> {
        self.field_values.get(&field).map(String::as_str)
    }

    /// Returns true if `field` must be initialized to its substituted value.
    #[must_use]
    pub fn has_field_init(&self, field: SymbolId) -> bool {
        self.field_init.contains(field.index())
    }

    /// Records a marked method whose body can never run.
    pub fn add_unreachable_body(&mut self, method: SymbolId) {
        if !self.unreachable_bodies.contains(&method) {
            self.unreachable_bodies.push(method);
        }
    }

    /// Returns the marked methods whose bodies can never run.
    #[must_use]
    pub fn unreachable_bodies(&self) -> &[SymbolId] {
        &self.unreachable_bodies
    }

    /// Schedules an embedded resource of `module` for removal.
    pub fn add_resource_to_remove(&mut self, module: SymbolId, name: &str) {
        let names = self.resources_to_remove.entry(module).or_default();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    /// Returns the resources of `module` scheduled for removal.
    #[must_use]
    pub fn resources_to_remove(&self, module: SymbolId) -> &[String] {
        self.resources_to_remove.get(&module).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_table_grows() {
        let mut table = MarkTable::default();
        assert_eq!(table.state(SymbolId(40)), MarkState::Unvisited);
        table.set(SymbolId(40), MarkState::Queued);
        assert!(table.is_marked(SymbolId(40)));
        assert!(!table.is_processed(SymbolId(40)));
        table.set(SymbolId(40), MarkState::Processed);
        table.set(SymbolId(2), MarkState::Processed);
        assert_eq!(table.processed(), vec![SymbolId(2), SymbolId(40)]);
    }

    #[test]
    fn preserve_modes_merge() {
        let mut annotations = Annotations::new();
        let ty = SymbolId(1);
        annotations.set_preserve(ty, TypePreserve::Fields);
        annotations.set_preserve(ty, TypePreserve::Nothing);
        assert_eq!(annotations.preserve(ty), Some(TypePreserve::Fields));
        annotations.set_preserve(ty, TypePreserve::Methods);
        assert_eq!(annotations.preserve(ty), Some(TypePreserve::All));
    }

    #[test]
    fn override_maps_are_symmetric() {
        let mut annotations = Annotations::new();
        let info = OverrideInformation {
            base: SymbolId(1),
            override_method: SymbolId(2),
            implementor: None,
        };
        annotations.add_override(info);
        annotations.add_override(info);
        assert_eq!(annotations.overrides(SymbolId(1)).len(), 1);
        assert_eq!(annotations.base_methods(SymbolId(2)), &[SymbolId(1)]);
        assert!(annotations.overrides(SymbolId(2)).is_empty());
    }
}
