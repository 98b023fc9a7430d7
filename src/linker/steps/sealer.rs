use log::debug;
use rustc_hash::FxHashSet;

use crate::{
    graph::{SymbolFlags, SymbolId, SymbolKind},
    linker::{actions::AssemblyAction, optimizations::CodeOptimizations, LinkContext, Step},
    Result,
};

/// Seals types nothing derives from and devirtualizes methods nothing overrides.
///
/// Runs after sweeping, so "nothing" means nothing that survived. Interfaces are left alone.
/// A virtual method without kept overrides becomes `final`; in a sealed type it also loses
/// `virtual` unless it overrides a kept base method.
#[derive(Debug, Default)]
pub struct SealerStep {
    base_types: Option<FxHashSet<SymbolId>>,
}

impl SealerStep {
    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_subclassed(&mut self, ctx: &LinkContext, ty: SymbolId) -> bool {
        self.base_types
            .get_or_insert_with(|| collect_base_types(ctx))
            .contains(&ty)
    }

    fn process_type(&mut self, ctx: &mut LinkContext, ty: SymbolId) -> (usize, usize) {
        let flags = ctx.graph.symbol(ty).flags;
        if flags.contains(SymbolFlags::INTERFACE) {
            return (0, 0);
        }

        let mut sealed_types = 0;
        if !flags.intersects(SymbolFlags::ABSTRACT | SymbolFlags::SEALED)
            && !self.is_subclassed(ctx, ty)
        {
            ctx.graph.symbol_mut(ty).flags.insert(SymbolFlags::SEALED);
            sealed_types += 1;
        }
        let type_sealed = ctx.graph.symbol(ty).has_flag(SymbolFlags::SEALED);

        let mut sealed_methods = 0;
        for method in ctx.graph.children(ty).to_vec() {
            let symbol = ctx.graph.symbol(method);
            if symbol.kind() != SymbolKind::Method
                || symbol.is_removed()
                || !symbol.has_flag(SymbolFlags::VIRTUAL)
                || symbol
                    .flags
                    .intersects(SymbolFlags::FINAL | SymbolFlags::ABSTRACT | SymbolFlags::RUNTIME)
                || !ctx.annotations.is_marked(method)
            {
                continue;
            }

            let overridden = ctx
                .annotations
                .overrides(method)
                .iter()
                .any(|o| ctx.annotations.is_marked(o.override_method));
            if overridden {
                continue;
            }

            let devirtualize = type_sealed
                && !ctx
                    .annotations
                    .base_methods(method)
                    .iter()
                    .any(|base| ctx.annotations.is_marked(*base));
            let flags = &mut ctx.graph.symbol_mut(method).flags;
            flags.insert(SymbolFlags::FINAL);
            if devirtualize {
                flags.remove(SymbolFlags::VIRTUAL | SymbolFlags::FINAL | SymbolFlags::NEW_SLOT);
            }
            sealed_methods += 1;
        }
        (sealed_types, sealed_methods)
    }
}

impl Step for SealerStep {
    fn name(&self) -> &'static str {
        "SealerStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        for module in ctx.graph.modules().to_vec() {
            if ctx.graph.symbol(module).is_removed()
                || ctx.action_of(module) != AssemblyAction::Link
                || !ctx.is_optimization_enabled(CodeOptimizations::SEALER, module)
            {
                continue;
            }

            let (mut types, mut methods) = (0, 0);
            for ty in ctx.graph.types_of(module) {
                if ctx.graph.symbol(ty).is_removed() {
                    continue;
                }
                let (t, m) = self.process_type(ctx, ty);
                types += t;
                methods += m;
            }
            debug!(
                "Sealed {types} types and {methods} methods of '{}'",
                ctx.graph.assembly_of(module)
            );
        }
        self.base_types = None;
        Ok(())
    }
}

/// Every type some kept type derives from directly.
fn collect_base_types(ctx: &LinkContext) -> FxHashSet<SymbolId> {
    let mut bases = FxHashSet::default();
    for module in ctx.graph.modules() {
        if ctx.graph.symbol(*module).is_removed() {
            continue;
        }
        for ty in ctx.graph.types_of(*module) {
            if ctx.graph.symbol(ty).is_removed() {
                continue;
            }
            if let Some(base) = ctx.graph.base_type(ty) {
                bases.insert(base);
            }
        }
    }
    bases
}
