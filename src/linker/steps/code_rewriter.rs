//! Applies the body rewrites decided before and during marking.

use log::debug;

use crate::{
    graph::{MethodBody, MethodInfo, SymbolFlags, SymbolId, SymbolRef, Visibility},
    linker::{
        actions::AssemblyAction,
        annotations::{MarkState, MethodAction},
        LinkContext, Step,
    },
    Result,
};

/// Rewrites method bodies and field initializers of kept symbols.
///
/// - substituted methods get a stub returning their value, or a throwing body
/// - methods whose bodies marking found unreachable get a throwing body
/// - fields substituted with `initialize="true"` get their value as constant, and their type a
///   static constructor storing it
///
/// Only assemblies that are written back (`Link` and `Save`) are touched.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeRewriterStep;

impl Step for CodeRewriterStep {
    fn name(&self) -> &'static str {
        "CodeRewriterStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        let mut rewritten = 0usize;
        for (method, action) in ctx.annotations.method_actions() {
            if !is_rewritable(ctx, method) {
                continue;
            }
            let Some(body) = ctx
                .graph
                .symbol_mut(method)
                .as_method_mut()
                .and_then(|info| info.body.as_mut())
            else {
                continue;
            };
            match action {
                MethodAction::ConvertToStub(value) => body.stub(value),
                MethodAction::ConvertToThrow => body.throw(),
            }
            rewritten += 1;
        }

        for method in ctx.annotations.unreachable_bodies().to_vec() {
            if !is_rewritable(ctx, method) {
                continue;
            }
            if let Some(body) = ctx
                .graph
                .symbol_mut(method)
                .as_method_mut()
                .and_then(|info| info.body.as_mut())
            {
                body.throw();
                rewritten += 1;
            }
        }

        let initialized: Vec<SymbolId> = ctx
            .graph
            .iter()
            .map(|symbol| symbol.id)
            .filter(|id| ctx.annotations.has_field_init(*id) && is_rewritable(ctx, *id))
            .collect();
        for field in initialized {
            initialize_field(ctx, field)?;
        }

        debug!("Rewrote {rewritten} method bodies");
        Ok(())
    }
}

fn is_rewritable(ctx: &LinkContext, id: SymbolId) -> bool {
    !ctx.graph.symbol(id).is_removed()
        && matches!(
            ctx.action_of(id),
            AssemblyAction::Link | AssemblyAction::Save
        )
}

fn initialize_field(ctx: &mut LinkContext, field: SymbolId) -> Result<()> {
    let Some(value) = ctx.annotations.field_value(field).map(str::to_string) else {
        return Ok(());
    };
    let Some(ty) = ctx.graph.declaring_type(field) else {
        return Ok(());
    };
    if let Some(info) = ctx.graph.symbol_mut(field).as_field_mut() {
        info.constant = Some(value);
    }

    let cctor = static_constructor(ctx, ty)?;
    let target = ctx.graph.reference_to(field);
    if let Some(body) = ctx
        .graph
        .symbol_mut(cctor)
        .as_method_mut()
        .and_then(|info| info.body.as_mut())
    {
        if !body.references.iter().any(|r| r.target == target) {
            body.field(target);
        }
    }
    Ok(())
}

/// Returns the live static constructor of `ty`, restoring or adding one when needed.
fn static_constructor(ctx: &mut LinkContext, ty: SymbolId) -> Result<SymbolId> {
    let reference = SymbolRef::new(
        ctx.graph.assembly_of(ty),
        format!("{}::.cctor", ctx.graph.symbol(ty).full_name),
    );

    let cctor = match ctx.graph.find(&reference) {
        Some(existing) if !ctx.graph.symbol(existing).is_removed() => return Ok(existing),
        Some(removed) => {
            let symbol = ctx.graph.symbol_mut(removed);
            symbol.removed = false;
            if let Some(info) = symbol.as_method_mut() {
                info.body = Some(MethodBody::new());
            }
            removed
        }
        None => ctx.graph.add_method(
            ty,
            ".cctor",
            Visibility::Private,
            SymbolFlags::STATIC | SymbolFlags::SPECIAL_NAME,
            MethodInfo {
                body: Some(MethodBody::new()),
                ..MethodInfo::default()
            },
        )?,
    };

    ctx.annotations.marks.set(cctor, MarkState::Processed);
    ctx.graph.symbol_mut(ty).flags.remove(SymbolFlags::BEFORE_FIELD_INIT);
    debug!("Static constructor of '{}' initializes substituted fields", reference.name);
    Ok(cctor)
}
