//! Reachability marking.
//!
//! [`MarkStep`] computes the closure of everything reachable from the roots with a FIFO
//! worklist over the arena-indexed mark table. A symbol moves `Unvisited -> Queued` when an
//! edge first reaches it and `Queued -> Processed` once all of its outgoing edges have been
//! followed. Cycles terminate through the state check, and the FIFO order keeps diagnostics
//! stable between runs.
//!
//! # Seeds
//!
//! - Every root registered on the context, with its member filter
//! - Every symbol of a `Copy` or `Save` assembly
//! - Every symbol carrying the `Preserve` attribute
//!
//! # Edges
//!
//! Structural edges follow the declaring type and module, base types, interfaces (unless the
//! `UnusedInterfaces` optimization is on for the assembly), field, property and signature
//! types, custom attribute types and their constructors, overridden base methods, accessor
//! owners, body references, static constructors and `DynamicDependency` targets.
//!
//! Policy edges add the whole assembly for `CopyUsed` once it is reached, and the overrides of
//! a marked virtual method in a marked type when the type is instantiated or `OverrideRemoval`
//! is off for its assembly. Nothing in a `Skip` assembly is ever marked.
//!
//! With `UnreachableBodies` on, bodies of instance methods whose type was never instantiated
//! are held back. They are revisited whenever the worklist drains; the ones still unreachable
//! at the fixpoint are recorded for `CodeRewriterStep`.

use std::collections::VecDeque;

use log::debug;
use rustc_hash::FxHashSet;

use crate::{
    graph::{BodyKind, BodyReference, BodyReferenceKind, SymbolFlags, SymbolId, SymbolKind, SymbolRef},
    linker::{
        actions::{AssemblyAction, Root, RootVisibility, TypePreserve},
        annotations::MarkState,
        attributes::{LinkerAttribute, LinkerAttributeKind, LinkerAttributesInformation},
        context::Resolution,
        descriptor::member_signature,
        diagnostics::{codes, MessageOrigin},
        optimizations::CodeOptimizations,
        tracer::DependencyReason,
        LinkContext, Step,
    },
    Result,
};

/// Marks everything reachable from the roots.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkStep;

impl Step for MarkStep {
    fn name(&self) -> &'static str {
        "MarkStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        ctx.set_marking_complete(false);
        let mut marker = Marker::new(ctx);
        marker.seed()?;
        marker.run()?;
        marker.finish();
        Ok(())
    }
}

struct Marker<'a> {
    ctx: &'a mut LinkContext,
    queue: VecDeque<SymbolId>,
    deferred_bodies: Vec<SymbolId>,
    whole_modules: FxHashSet<SymbolId>,
    reported: FxHashSet<SymbolRef>,
}

impl<'a> Marker<'a> {
    fn new(ctx: &'a mut LinkContext) -> Self {
        Marker {
            ctx,
            queue: VecDeque::new(),
            deferred_bodies: Vec::new(),
            whole_modules: FxHashSet::default(),
            reported: FxHashSet::default(),
        }
    }

    fn seed(&mut self) -> Result<()> {
        let roots: Vec<Root> = self.ctx.roots().to_vec();
        for root in roots {
            self.mark_root(root);
        }

        let modules = self.ctx.graph.modules().to_vec();
        for module in &modules {
            if self.ctx.action_of(*module).keeps_everything() {
                self.mark_module_contents(*module);
            }
        }

        for module in modules {
            if self.ctx.action_of(module) == AssemblyAction::Skip {
                continue;
            }
            let symbols: Vec<SymbolId> = std::iter::once(module)
                .chain(self.ctx.graph.descendants(module))
                .filter(|id| self.has_attributes(*id))
                .collect();
            for id in symbols {
                let info = self.ctx.attributes_of(id);
                let Some(LinkerAttribute::Preserve { all_members }) =
                    info.get(LinkerAttributeKind::Preserve).first()
                else {
                    continue;
                };
                self.mark(id, None, DependencyReason::PreserveAttribute);
                if *all_members && self.ctx.graph.symbol(id).kind() == SymbolKind::Type {
                    self.mark_type_members(id, TypePreserve::All, RootVisibility::Any);
                }
            }
        }
        Ok(())
    }

    fn has_attributes(&self, id: SymbolId) -> bool {
        !self.ctx.graph.symbol(id).attributes.is_empty()
            || !self.ctx.attributes.supplementary(id).is_empty()
    }

    fn mark_root(&mut self, root: Root) {
        self.mark(root.symbol, None, DependencyReason::Root);
        if self.ctx.graph.symbol(root.symbol).kind() == SymbolKind::Type {
            self.mark_type_members(root.symbol, root.preserve, root.visibility);
        }
    }

    fn mark_module_contents(&mut self, module: SymbolId) {
        let symbols: Vec<SymbolId> = std::iter::once(module)
            .chain(self.ctx.graph.descendants(module))
            .collect();
        for id in symbols {
            self.mark(id, None, DependencyReason::AssemblyAction);
            if self.ctx.graph.symbol(id).kind() == SymbolKind::Type {
                self.instantiate(id);
            }
        }
    }

    /// Moves `target` to the worklist if it is new and not in a `Skip` assembly.
    fn mark(&mut self, target: SymbolId, source: Option<SymbolId>, reason: DependencyReason) {
        let symbol = self.ctx.graph.symbol(target);
        if symbol.is_removed() {
            return;
        }
        let module = symbol.module;
        let action = self.ctx.action_of(target);
        if action == AssemblyAction::Skip
            || self.ctx.annotations.marks.state(target) != MarkState::Unvisited
        {
            return;
        }

        self.ctx.annotations.marks.set(target, MarkState::Queued);
        self.ctx.tracer.record(source, target, reason);
        self.queue.push_back(target);

        if action.keeps_everything_when_used() && self.whole_modules.insert(module) {
            debug!(
                "Keeping all of '{}' because it is used",
                self.ctx.graph.assembly_of(module)
            );
            self.mark_module_contents(module);
        }
    }

    fn mark_type_members(&mut self, ty: SymbolId, preserve: TypePreserve, visibility: RootVisibility) {
        if matches!(preserve, TypePreserve::All | TypePreserve::Methods) {
            self.instantiate(ty);
        }

        let children = self.ctx.graph.children(ty).to_vec();
        for child in children {
            let symbol = self.ctx.graph.symbol(child);
            let kind = symbol.kind();
            if !visibility.admits(symbol.visibility) {
                continue;
            }
            let keep = match kind {
                SymbolKind::Field => matches!(preserve, TypePreserve::All | TypePreserve::Fields),
                SymbolKind::Method | SymbolKind::Property | SymbolKind::Event => {
                    matches!(preserve, TypePreserve::All | TypePreserve::Methods)
                }
                SymbolKind::Type => preserve == TypePreserve::All,
                SymbolKind::Module => false,
            };
            if !keep {
                continue;
            }

            self.mark(child, Some(ty), DependencyReason::TypePreserve);
            if kind == SymbolKind::Type {
                self.mark_type_members(child, TypePreserve::All, visibility);
            }
        }
    }

    fn run(&mut self) -> Result<()> {
        loop {
            while let Some(id) = self.queue.pop_front() {
                if self.ctx.annotations.marks.is_processed(id) {
                    continue;
                }
                self.process(id)?;
                self.ctx.annotations.marks.set(id, MarkState::Processed);
            }

            if !self.process_deferred_bodies()? {
                return Ok(());
            }
        }
    }

    fn finish(self) {
        for method in &self.deferred_bodies {
            self.ctx.annotations.add_unreachable_body(*method);
        }
        debug!(
            "Marking reached a fixpoint with {} symbols, {} unreachable bodies",
            self.ctx.annotations.marks.processed().len(),
            self.deferred_bodies.len()
        );
        self.ctx.set_marking_complete(true);
    }

    /// Processes held-back bodies whose type became instantiated; returns true if any were.
    fn process_deferred_bodies(&mut self) -> Result<bool> {
        let (ready, waiting): (Vec<SymbolId>, Vec<SymbolId>) =
            std::mem::take(&mut self.deferred_bodies)
                .into_iter()
                .partition(|method| {
                    self.ctx
                        .graph
                        .declaring_type(*method)
                        .is_some_and(|ty| self.ctx.annotations.is_instantiated(ty))
                });
        self.deferred_bodies = waiting;

        for method in &ready {
            self.process_body(*method)?;
        }
        Ok(!ready.is_empty())
    }

    fn process(&mut self, id: SymbolId) -> Result<()> {
        let symbol = self.ctx.graph.symbol(id);
        let kind = symbol.kind();
        if let Some(parent) = symbol.parent {
            self.mark(parent, Some(id), DependencyReason::DeclaringType);
        }

        self.mark_custom_attributes(id)?;
        self.mark_dynamic_dependencies(id)?;

        match kind {
            SymbolKind::Module => Ok(()),
            SymbolKind::Type => self.process_type(id),
            SymbolKind::Field => self.process_field(id),
            SymbolKind::Method => self.process_method(id),
            SymbolKind::Property | SymbolKind::Event => {
                let value_type = self
                    .ctx
                    .graph
                    .symbol(id)
                    .as_accessor_owner()
                    .and_then(|info| info.value_type.clone());
                if let Some(value_type) = value_type {
                    self.mark_reference(&value_type, id, DependencyReason::MemberType, None)?;
                }
                Ok(())
            }
        }
    }

    /// Resolves `reference` and marks the definition; unresolved references are reported once.
    fn mark_reference(
        &mut self,
        reference: &SymbolRef,
        source: SymbolId,
        reason: DependencyReason,
        il_offset: Option<u32>,
    ) -> Result<Option<SymbolId>> {
        match self.ctx.resolve(reference)? {
            Resolution::Found(target) => {
                self.mark(target, Some(source), reason);
                Ok(Some(target))
            }
            Resolution::Skipped => Ok(None),
            unresolved => {
                let key = if unresolved == Resolution::MissingAssembly {
                    SymbolRef::new(reference.assembly.clone(), String::new())
                } else {
                    reference.clone()
                };
                if self.reported.insert(key) {
                    let origin = MessageOrigin::from_member(source, il_offset);
                    self.ctx.report_unresolved(reference, unresolved, &origin)?;
                }
                Ok(None)
            }
        }
    }

    fn mark_custom_attributes(&mut self, id: SymbolId) -> Result<()> {
        if self.ctx.options.used_attributes_only {
            return Ok(());
        }

        let types: Vec<SymbolRef> = self
            .ctx
            .graph
            .symbol(id)
            .attributes
            .iter()
            .chain(self.ctx.attributes.supplementary(id))
            .map(|attribute| attribute.attribute_type.clone())
            .collect();

        for attribute_type in types {
            match self.ctx.resolve(&attribute_type)? {
                Resolution::Found(ty) => {
                    if self
                        .ctx
                        .attributes_of(ty)
                        .has(LinkerAttributeKind::Removable)
                    {
                        continue;
                    }
                    self.mark(ty, Some(id), DependencyReason::CustomAttribute);
                    if let Some(ctor) = self.ctx.graph.find_member(ty, ".ctor") {
                        self.mark(ctor, Some(id), DependencyReason::CustomAttribute);
                    }
                }
                Resolution::Skipped => {}
                unresolved => {
                    if self.reported.insert(attribute_type.clone()) {
                        let origin = MessageOrigin::from_member(id, None);
                        self.ctx
                            .report_unresolved(&attribute_type, unresolved, &origin)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn mark_dynamic_dependencies(&mut self, id: SymbolId) -> Result<()> {
        let info = self.ctx.attributes_of(id);
        for dependency in info.get(LinkerAttributeKind::DynamicDependency) {
            let LinkerAttribute::DynamicDependency {
                member,
                type_name,
                assembly,
            } = dependency
            else {
                continue;
            };

            let origin = MessageOrigin::from_member(id, None);
            let assembly = assembly
                .clone()
                .unwrap_or_else(|| self.ctx.graph.assembly_of(id).to_string());
            let ty = match type_name {
                Some(name) => match self.ctx.resolve(&SymbolRef::new(assembly.clone(), name.clone()))? {
                    Resolution::Found(ty) if self.ctx.graph.symbol(ty).kind() == SymbolKind::Type => ty,
                    Resolution::Skipped => continue,
                    _ => {
                        self.ctx.warn(
                            codes::DYNAMIC_DEPENDENCY_NOT_FOUND,
                            format!("Unresolved type '{name}' in 'DynamicDependencyAttribute'"),
                            &origin,
                        );
                        continue;
                    }
                },
                None if self.ctx.graph.symbol(id).kind() == SymbolKind::Type => id,
                None => match self.ctx.graph.declaring_type(id) {
                    Some(ty) => ty,
                    None => continue,
                },
            };

            self.mark(ty, Some(id), DependencyReason::DynamicDependency);
            match member.as_deref() {
                None | Some("*") => {
                    self.mark_type_members(ty, TypePreserve::All, RootVisibility::Any);
                }
                Some(member) => {
                    let targets: Vec<SymbolId> = self
                        .ctx
                        .graph
                        .members_of(ty)
                        .filter(|candidate| self.dependency_matches(*candidate, member))
                        .collect();
                    if targets.is_empty() {
                        self.ctx.warn(
                            codes::DYNAMIC_DEPENDENCY_NOT_FOUND,
                            format!(
                                "No members were resolved for '{member}' on type '{}'",
                                self.ctx.graph.symbol(ty).full_name
                            ),
                            &origin,
                        );
                    }
                    for target in targets {
                        self.mark(target, Some(id), DependencyReason::DynamicDependency);
                    }
                }
            }
        }
        Ok(())
    }

    /// A dependency names a member by simple name, `Name(P1,P2)` or full signature.
    fn dependency_matches(&self, candidate: SymbolId, member: &str) -> bool {
        let symbol = self.ctx.graph.symbol(candidate);
        if symbol.name == member {
            return true;
        }
        let signature = member_signature(&self.ctx.graph, candidate);
        let without_return = signature
            .split_once(' ')
            .map_or(signature.as_str(), |(_, rest)| rest);
        let member: String = member.chars().filter(|c| !c.is_whitespace()).collect();
        signature.replace(' ', "") == member || without_return.replace(' ', "") == member
    }

    fn process_type(&mut self, ty: SymbolId) -> Result<()> {
        let symbol = self.ctx.graph.symbol(ty);
        let info = symbol.as_type().cloned().unwrap_or_default();
        let before_field_init = symbol.has_flag(SymbolFlags::BEFORE_FIELD_INIT);
        if symbol.has_flag(SymbolFlags::VALUE_TYPE) {
            self.instantiate(ty);
        }

        if let Some(base) = &info.base_type {
            self.mark_reference(base, ty, DependencyReason::BaseType, None)?;
        }
        if !self
            .ctx
            .is_optimization_enabled(CodeOptimizations::UNUSED_INTERFACES, ty)
        {
            for interface in &info.interfaces {
                self.mark_reference(interface, ty, DependencyReason::Interface, None)?;
            }
        }

        if let Some(cctor) = self.ctx.graph.find_member(ty, ".cctor") {
            let deferred = before_field_init
                && self
                    .ctx
                    .is_optimization_enabled(CodeOptimizations::BEFORE_FIELD_INIT, ty);
            if !deferred {
                self.mark(cctor, Some(ty), DependencyReason::StaticConstructor);
            }
        }

        if let Some(preserve) = self.ctx.annotations.preserve(ty) {
            self.mark_type_members(ty, preserve, RootVisibility::Any);
        }

        for method in self.virtual_methods(ty) {
            self.check_override(method);
        }
        Ok(())
    }

    fn virtual_methods(&self, ty: SymbolId) -> Vec<SymbolId> {
        self.ctx
            .graph
            .members_of(ty)
            .filter(|id| self.ctx.graph.symbol(*id).is_virtual())
            .collect()
    }

    fn process_field(&mut self, field: SymbolId) -> Result<()> {
        let symbol = self.ctx.graph.symbol(field);
        let field_type = symbol.as_field().and_then(|info| info.field_type.clone());
        let is_static = symbol.has_flag(SymbolFlags::STATIC);

        if let Some(field_type) = field_type {
            self.mark_reference(&field_type, field, DependencyReason::MemberType, None)?;
        }
        if is_static {
            if let Some(cctor) = self
                .ctx
                .graph
                .declaring_type(field)
                .and_then(|ty| self.ctx.graph.find_member(ty, ".cctor"))
            {
                self.mark(cctor, Some(field), DependencyReason::StaticConstructor);
            }
        }
        Ok(())
    }

    fn process_method(&mut self, method: SymbolId) -> Result<()> {
        let symbol = self.ctx.graph.symbol(method);
        let is_instance_constructor = symbol.is_instance_constructor();
        let is_virtual = symbol.is_virtual();
        let Some(info) = symbol.as_method() else {
            return Ok(());
        };
        let mut signature: Vec<SymbolRef> = info.return_type.iter().cloned().collect();
        signature.extend(info.parameters.iter().cloned());
        let explicit_overrides = info.overrides.clone();
        let accessor_of = info.accessor_of;
        let has_il_body = info
            .body
            .as_ref()
            .is_some_and(|body| body.kind == BodyKind::Il);

        for ty in &signature {
            self.mark_reference(ty, method, DependencyReason::Signature, None)?;
        }
        for base in &explicit_overrides {
            self.mark_reference(base, method, DependencyReason::BaseMethod, None)?;
        }
        for base in self.ctx.annotations.base_methods(method).to_vec() {
            self.mark(base, Some(method), DependencyReason::BaseMethod);
        }
        if let Some(owner) = accessor_of {
            self.mark(owner, Some(method), DependencyReason::AccessorOwner);
        }

        if is_instance_constructor {
            if let Some(ty) = self.ctx.graph.declaring_type(method) {
                self.instantiate(ty);
            }
        }
        if is_virtual {
            let overrides: Vec<SymbolId> = self
                .ctx
                .annotations
                .overrides(method)
                .iter()
                .map(|o| o.override_method)
                .collect();
            for override_method in overrides {
                self.check_override(override_method);
            }
        }

        if !has_il_body || self.ctx.annotations.method_action(method).is_some() {
            return Ok(());
        }
        if self.defers_body(method) {
            self.deferred_bodies.push(method);
            return Ok(());
        }
        self.process_body(method)
    }

    fn defers_body(&self, method: SymbolId) -> bool {
        let symbol = self.ctx.graph.symbol(method);
        if symbol.has_flag(SymbolFlags::STATIC) || symbol.is_constructor() {
            return false;
        }
        if self.ctx.action_of(method) != AssemblyAction::Link
            || !self
                .ctx
                .is_optimization_enabled(CodeOptimizations::UNREACHABLE_BODIES, method)
        {
            return false;
        }
        self.ctx
            .graph
            .declaring_type(method)
            .is_some_and(|ty| !self.ctx.annotations.is_instantiated(ty))
    }

    /// Records that instances of `ty` (and so of its base types) can exist.
    fn instantiate(&mut self, ty: SymbolId) {
        let mut current = Some(ty);
        while let Some(next) = current {
            if !self.ctx.annotations.mark_instantiated(next) {
                return;
            }
            if next != ty {
                self.mark(next, Some(ty), DependencyReason::BaseType);
            }
            for method in self.virtual_methods(next) {
                self.check_override(method);
            }
            current = self.ctx.graph.base_type(next);
        }
    }

    /// Marks `method` if one of its base methods is marked and its type can be instantiated,
    /// or override removal is off for its assembly.
    fn check_override(&mut self, method: SymbolId) {
        let Some(ty) = self.ctx.graph.declaring_type(method) else {
            return;
        };
        if !self.ctx.annotations.is_marked(ty) || self.ctx.annotations.is_marked(method) {
            return;
        }
        let reachable = self.ctx.annotations.is_instantiated(ty)
            || !self
                .ctx
                .is_optimization_enabled(CodeOptimizations::OVERRIDE_REMOVAL, ty);
        if !reachable {
            return;
        }

        let base = self
            .ctx
            .annotations
            .base_methods(method)
            .iter()
            .copied()
            .find(|base| self.ctx.annotations.is_marked(*base));
        if let Some(base) = base {
            self.mark(method, Some(base), DependencyReason::Override);
        }
    }

    fn process_body(&mut self, method: SymbolId) -> Result<()> {
        let references: Vec<BodyReference> = self
            .ctx
            .graph
            .symbol(method)
            .as_method()
            .and_then(|info| info.body.as_ref())
            .map(|body| body.references.clone())
            .unwrap_or_default();
        if references.is_empty() {
            return Ok(());
        }

        let caller = self.ctx.attributes_of(method);
        for reference in references {
            let Some(target) = self.mark_reference(
                &reference.target,
                method,
                DependencyReason::BodyReference,
                Some(reference.il_offset),
            )?
            else {
                continue;
            };

            let target_symbol = self.ctx.graph.symbol(target);
            let is_method = target_symbol.kind() == SymbolKind::Method;
            if reference.kind == BodyReferenceKind::NewObject && target_symbol.is_instance_constructor()
            {
                if let Some(ty) = self.ctx.graph.declaring_type(target) {
                    self.instantiate(ty);
                }
            }
            if is_method {
                self.check_requires_unreferenced_code(method, &caller, target, reference.il_offset);
            }
        }
        Ok(())
    }

    fn check_requires_unreferenced_code(
        &self,
        caller: SymbolId,
        caller_info: &LinkerAttributesInformation,
        target: SymbolId,
        il_offset: u32,
    ) {
        let info = self.ctx.attributes_of(target);
        let Some(LinkerAttribute::RequiresUnreferencedCode { message, url }) =
            info.get(LinkerAttributeKind::RequiresUnreferencedCode).first()
        else {
            return;
        };

        if caller_info.has(LinkerAttributeKind::RequiresUnreferencedCode)
            || caller_info.suppresses(codes::REQUIRES_UNREFERENCED_CODE)
        {
            return;
        }
        if let Some(ty) = self.ctx.graph.declaring_type(caller) {
            if self
                .ctx
                .attributes_of(ty)
                .suppresses(codes::REQUIRES_UNREFERENCED_CODE)
            {
                return;
            }
        }

        let mut text = format!(
            "Using member '{}' which has 'RequiresUnreferencedCodeAttribute' can break functionality when trimming application code. {}",
            self.ctx.graph.symbol(target).full_name,
            message
        );
        if let Some(url) = url {
            text.push(' ');
            text.push_str(url);
        }
        self.ctx.warn(
            codes::REQUIRES_UNREFERENCED_CODE,
            text,
            &MessageOrigin::from_member(caller, Some(il_offset)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{AttributeArgument, CustomAttribute},
        linker::attributes::{REQUIRES_UNREFERENCED_CODE, UNCONDITIONAL_SUPPRESS_MESSAGE},
        test::TestLink,
    };

    #[test]
    fn call_chain_and_unreferenced_type() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let a = link.ty(app, "TypeA");
        let foo = link.static_method(a, "MethodFoo");
        let b = link.ty(app, "TypeB");
        let bar = link.static_method(b, "MethodBar");
        let c = link.ty(app, "TypeC");
        link.calls(foo, bar);
        link.root(a);

        link.mark().unwrap();
        for id in [app, a, foo, b, bar] {
            assert!(link.marked(id), "{} not marked", link.name(id));
        }
        assert!(!link.marked(c));
        assert!(link.ctx.is_marking_complete());
    }

    #[test]
    fn cycles_terminate() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let x = link.ty(app, "TypeX");
        let y = link.ty(app, "TypeY");
        let method_a = link.static_method(x, "MethodA");
        let method_b = link.static_method(y, "MethodB");
        link.calls(method_a, method_b);
        link.calls(method_b, method_a);
        link.root_member(method_a);
        link.root_member(method_b);

        link.mark().unwrap();
        let processed = link.ctx.annotations.marks.processed();
        assert_eq!(processed.iter().filter(|id| **id == method_a).count(), 1);
        assert_eq!(processed.iter().filter(|id| **id == method_b).count(), 1);
    }

    #[test]
    fn skip_assemblies_contribute_nothing() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let utils = link.module("Utils", AssemblyAction::Skip);
        let main_type = link.ty(app, "Program");
        let main = link.static_method(main_type, "Main");
        let z = link.ty(utils, "TypeZ");
        let z_run = link.static_method(z, "Run");
        link.calls(main, z_run);
        link.root_member(main);

        link.mark().unwrap();
        assert!(link.marked(main));
        assert!(!link.marked(z));
        assert!(!link.marked(z_run));
        assert!(link.ctx.diagnostics.count() == 0);
    }

    fn override_graph(link: &mut TestLink) -> (SymbolId, SymbolId) {
        let app = link.module("App", AssemblyAction::Link);
        let base = link.ty(app, "Base");
        let base_ctor = link.method(base, ".ctor");
        let base_run = link.virtual_method(base, "Run");
        let derived = link.derived_ty(app, "Derived", base);
        let derived_run = link.virtual_method(derived, "Run");
        link.override_of(derived_run, base_run);

        let program = link.ty(app, "Program");
        let main = link.static_method(program, "Main");
        link.new_object(main, base_ctor);
        link.calls(main, base_run);
        link.type_token(main, derived);
        link.root_member(main);
        (derived, derived_run)
    }

    #[test]
    fn overrides_of_uninstantiated_types_are_removed() {
        let mut link = TestLink::new();
        let (derived, derived_run) = override_graph(&mut link);
        link.mark().unwrap();
        assert!(link.marked(derived));
        assert!(!link.marked(derived_run));
    }

    #[test]
    fn disabled_override_removal_keeps_overrides() {
        let mut link = TestLink::new();
        link.ctx
            .optimizations
            .disable(CodeOptimizations::OVERRIDE_REMOVAL, None);
        let (_, derived_run) = override_graph(&mut link);
        link.mark().unwrap();
        assert!(link.marked(derived_run));
    }

    #[test]
    fn instantiation_marks_overrides() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let base = link.ty(app, "Base");
        let base_run = link.virtual_method(base, "Run");
        let derived = link.derived_ty(app, "Derived", base);
        let derived_ctor = link.method(derived, ".ctor");
        let derived_run = link.virtual_method(derived, "Run");
        link.override_of(derived_run, base_run);
        let program = link.ty(app, "Program");
        let main = link.static_method(program, "Main");
        link.calls(main, base_run);
        link.new_object(main, derived_ctor);
        link.root_member(main);

        link.mark().unwrap();
        assert!(link.ctx.annotations.is_instantiated(derived));
        assert!(link.ctx.annotations.is_instantiated(base));
        assert!(link.marked(derived_run));
    }

    /// Builds `Root::Run` <- `Base::Run` with `Derived : Base` in `module` and a `Main`
    /// calling `Root::Run`.
    fn base_chain(link: &mut TestLink, app: SymbolId, module: SymbolId) -> [SymbolId; 4] {
        let root = link.ty(app, "Root");
        let root_run = link.virtual_method(root, "Run");
        let base = link.derived_ty(app, "Base", root);
        let base_run = link.virtual_method(base, "Run");
        link.override_of(base_run, root_run);
        let derived = link.derived_ty(module, "Derived", base);

        let program = link.ty(app, "Program");
        let main = link.static_method(program, "Main");
        link.calls(main, root_run);
        link.root_member(main);
        [base, base_run, derived, main]
    }

    #[test]
    fn preserved_type_instantiates_its_bases() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let [base, base_run, derived, _] = base_chain(&mut link, app, app);
        link.root(derived);

        link.mark().unwrap();
        assert!(link.ctx.annotations.is_instantiated(derived));
        assert!(link.ctx.annotations.is_instantiated(base));
        assert!(link.marked(base));
        assert!(link.marked(base_run));
    }

    #[test]
    fn whole_assembly_instantiates_bases_elsewhere() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let lib = link.module("Lib", AssemblyAction::CopyUsed);
        let [base, base_run, derived, main] = base_chain(&mut link, app, lib);
        let entry = link.ty(lib, "Entry");
        let go = link.static_method(entry, "Go");
        link.calls(main, go);

        link.mark().unwrap();
        assert!(link.ctx.annotations.is_instantiated(derived));
        assert!(link.ctx.annotations.is_instantiated(base));
        assert!(link.marked(base_run));
    }

    #[test]
    fn unreachable_bodies_are_recorded() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let helper = link.ty(app, "Helper");
        let work = link.method(helper, "Work");
        let used_only_by_work = link.static_method(helper, "Detail");
        link.calls(work, used_only_by_work);
        let program = link.ty(app, "Program");
        let main = link.static_method(program, "Main");
        link.calls(main, work);
        link.root_member(main);

        link.mark().unwrap();
        assert!(link.marked(work));
        assert!(!link.marked(used_only_by_work));
        assert_eq!(link.ctx.annotations.unreachable_bodies(), &[work]);
    }

    #[test]
    fn deferred_bodies_resume_after_instantiation() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let helper = link.ty(app, "Helper");
        let ctor = link.method(helper, ".ctor");
        let work = link.method(helper, "Work");
        let detail = link.static_method(helper, "Detail");
        link.calls(work, detail);
        let factory = link.ty(app, "Factory");
        let create = link.static_method(factory, "Create");
        link.new_object(create, ctor);
        let program = link.ty(app, "Program");
        let main = link.static_method(program, "Main");
        link.calls(main, work);
        link.calls(main, create);
        link.root_member(main);

        link.mark().unwrap();
        assert!(link.marked(detail));
        assert!(link.ctx.annotations.unreachable_bodies().is_empty());
    }

    #[test]
    fn copy_used_keeps_whole_assembly_once_reached() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let lib = link.module("Lib", AssemblyAction::CopyUsed);
        let unused = link.module("Unused", AssemblyAction::CopyUsed);
        let used = link.ty(lib, "Used");
        let used_run = link.static_method(used, "Run");
        let other = link.ty(lib, "Other");
        let unused_type = link.ty(unused, "Nothing");
        let program = link.ty(app, "Program");
        let main = link.static_method(program, "Main");
        link.calls(main, used_run);
        link.root_member(main);

        link.mark().unwrap();
        assert!(link.marked(other));
        assert!(!link.marked(unused_type));
    }

    #[test]
    fn copy_and_preserve_seeds() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let copied = link.module("Copied", AssemblyAction::Copy);
        let kept = link.ty(copied, "Kept");
        let preserved = link.ty(app, "Preserved");
        let field = link.field(preserved, "value");
        link.ctx.graph.symbol_mut(preserved).attributes.push(
            CustomAttribute::new(SymbolRef::new("App", "App.PreserveAttribute"))
                .with_named("AllMembers", AttributeArgument::Bool(true)),
        );

        link.mark().unwrap();
        assert!(link.marked(kept));
        assert!(link.marked(preserved));
        assert!(link.marked(field));
        // The attribute type itself is not defined anywhere.
        assert_eq!(link.ctx.diagnostics.with_code(codes::UNRESOLVED_TYPE).len(), 1);
    }

    #[test]
    fn unresolved_edges_warn_or_fail() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let program = link.ty(app, "Program");
        let main = link.static_method(program, "Main");
        link.calls_ref(main, SymbolRef::new("Missing", "Missing.Type::Run"));
        link.calls_ref(main, SymbolRef::new("Missing", "Missing.Type::Stop"));
        link.calls_ref(main, SymbolRef::new("App", "Program::Gone"));
        link.root_member(main);

        link.mark().unwrap();
        assert_eq!(link.ctx.diagnostics.with_code(codes::UNRESOLVED_ASSEMBLY).len(), 1);
        assert_eq!(link.ctx.diagnostics.with_code(codes::UNRESOLVED_MEMBER).len(), 1);

        let mut strict = TestLink::new();
        let app = strict.module("App", AssemblyAction::Link);
        let program = strict.ty(app, "Program");
        let main = strict.static_method(program, "Main");
        strict.calls_ref(main, SymbolRef::new("App", "Program::Gone"));
        strict.root_member(main);
        strict.ctx.options.unresolved.edges_fatal = true;
        assert!(matches!(strict.mark(), Err(crate::Error::Unresolved(_))));
    }

    #[test]
    fn requires_unreferenced_code_warnings() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let lib = link.ty(app, "Lib");
        let dangerous = link.static_method(lib, "Reflect");
        link.ctx.graph.symbol_mut(dangerous).attributes.push(
            CustomAttribute::new(SymbolRef::new("App", REQUIRES_UNREFERENCED_CODE))
                .with_argument(AttributeArgument::String("Uses reflection.".into())),
        );
        let program = link.ty(app, "Program");
        let main = link.static_method(program, "Main");
        let quiet = link.static_method(program, "Quiet");
        link.ctx.graph.symbol_mut(quiet).attributes.push(
            CustomAttribute::new(SymbolRef::new("App", UNCONDITIONAL_SUPPRESS_MESSAGE))
                .with_argument(AttributeArgument::String("Trimming".into()))
                .with_argument(AttributeArgument::String("IL2026".into())),
        );
        link.calls(main, dangerous);
        link.calls(main, quiet);
        link.calls(quiet, dangerous);
        link.root_member(main);

        link.mark().unwrap();
        let warnings = link.ctx.diagnostics.with_code(codes::REQUIRES_UNREFERENCED_CODE);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].text.contains("Lib::Reflect"));
        assert!(warnings[0].text.ends_with("Uses reflection."));
    }

    #[test]
    fn dynamic_dependencies_mark_named_members() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let target = link.ty(app, "Ns.Target");
        let wanted = link.static_method(target, "Wanted");
        let other = link.static_method(target, "Other");
        let program = link.ty(app, "Program");
        let main = link.static_method(program, "Main");
        link.ctx.graph.symbol_mut(main).attributes.push(
            CustomAttribute::new(SymbolRef::new(
                "App",
                crate::linker::attributes::DYNAMIC_DEPENDENCY,
            ))
            .with_argument(AttributeArgument::String("Wanted()".into()))
            .with_argument(AttributeArgument::String("Ns.Target".into())),
        );
        link.root_member(main);

        link.mark().unwrap();
        assert!(link.marked(target));
        assert!(link.marked(wanted));
        assert!(!link.marked(other));
    }

    #[test]
    fn marking_twice_is_idempotent() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let a = link.ty(app, "A");
        let run = link.static_method(a, "Run");
        let b = link.ty(app, "B");
        let go = link.static_method(b, "Go");
        link.calls(run, go);
        link.root(a);

        link.mark().unwrap();
        let first = link.ctx.annotations.marks.processed();
        link.mark().unwrap();
        assert_eq!(link.ctx.annotations.marks.processed(), first);
    }

    #[test]
    fn root_visibility_filters_members() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let api = link.ty(app, "Api");
        let public = link.static_method(api, "Open");
        let private = link.static_method(api, "Secret");
        link.ctx.graph.symbol_mut(private).visibility = crate::graph::Visibility::Private;
        link.ctx.add_root(Root::with(
            api,
            RootVisibility::PublicAndFamily,
            TypePreserve::All,
        ));

        link.mark().unwrap();
        assert!(link.marked(public));
        assert!(!link.marked(private));
    }
}
