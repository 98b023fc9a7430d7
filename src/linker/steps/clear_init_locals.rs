use log::debug;

use crate::{
    graph::SymbolKind,
    linker::{actions::AssemblyAction, optimizations::CodeOptimizations, LinkContext, Step},
    Result,
};

/// Drops the zero-initialization flag from the method bodies of `Link` assemblies.
///
/// Only runs for assemblies with [`CodeOptimizations::CLEAR_INIT_LOCALS`] enabled, which is
/// off by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearInitLocalsStep;

impl Step for ClearInitLocalsStep {
    fn name(&self) -> &'static str {
        "ClearInitLocalsStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        for module in ctx.graph.modules().to_vec() {
            if ctx.graph.symbol(module).is_removed()
                || ctx.action_of(module) != AssemblyAction::Link
                || !ctx.is_optimization_enabled(CodeOptimizations::CLEAR_INIT_LOCALS, module)
            {
                continue;
            }

            let mut cleared = 0usize;
            for id in ctx.graph.descendants(module) {
                let symbol = ctx.graph.symbol_mut(id);
                if symbol.kind() != SymbolKind::Method || symbol.is_removed() {
                    continue;
                }
                if let Some(body) = symbol.as_method_mut().and_then(|m| m.body.as_mut()) {
                    if body.init_locals {
                        body.init_locals = false;
                        cleared += 1;
                    }
                }
            }
            debug!(
                "Cleared init locals on {cleared} bodies of '{}'",
                ctx.graph.assembly_of(module)
            );
        }
        Ok(())
    }
}
