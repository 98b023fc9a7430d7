use log::debug;

use crate::{
    graph::{BodyKind, BranchGuard, SymbolId, SymbolKind},
    linker::{
        actions::AssemblyAction, annotations::MethodAction, optimizations::CodeOptimizations,
        LinkContext, Step,
    },
    Result,
};

/// Folds branches whose condition became a known constant.
///
/// A body reference guarded by a condition (a boolean method or field) is dropped when the
/// condition is substituted with the value that skips it. The condition is constant when its
/// method is stubbed with a value or its field has a substituted or literal constant. Runs
/// before marking, so the code behind a disabled feature switch is never reached.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveUnreachableBlocksStep;

impl Step for RemoveUnreachableBlocksStep {
    fn name(&self) -> &'static str {
        "RemoveUnreachableBlocksStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        let mut folded = 0usize;
        for module in ctx.graph.modules().to_vec() {
            if ctx.action_of(module) != AssemblyAction::Link
                || !ctx.is_optimization_enabled(CodeOptimizations::IP_CONSTANT_PROPAGATION, module)
            {
                continue;
            }

            for method in ctx.graph.descendants(module) {
                let Some(body) = ctx
                    .graph
                    .symbol(method)
                    .as_method()
                    .and_then(|m| m.body.as_ref())
                else {
                    continue;
                };
                if body.references.iter().all(|r| r.guard.is_none()) {
                    continue;
                }

                let mut body = body.clone();
                let before = body.references.len();
                body.references.retain(|reference| {
                    reference
                        .guard
                        .as_ref()
                        .map_or(true, |guard| is_reachable(ctx, guard))
                });
                if body.references.len() != before {
                    folded += before - body.references.len();
                    ctx.graph.set_body(method, Some(body))?;
                }
            }
        }
        debug!("Removed {folded} references behind constant conditions");
        Ok(())
    }
}

fn is_reachable(ctx: &LinkContext, guard: &BranchGuard) -> bool {
    ctx.graph
        .find(&guard.condition)
        .and_then(|condition| constant_value(ctx, condition))
        .map_or(true, |value| value == guard.taken_when)
}

/// The boolean value `condition` always produces, if known.
fn constant_value(ctx: &LinkContext, condition: SymbolId) -> Option<bool> {
    let symbol = ctx.graph.symbol(condition);
    let text = match symbol.kind() {
        SymbolKind::Method => match ctx.annotations.method_action(condition) {
            Some(MethodAction::ConvertToStub(value)) => value.clone(),
            Some(MethodAction::ConvertToThrow) => None,
            None => match symbol.as_method().and_then(|m| m.body.as_ref()).map(|b| &b.kind) {
                Some(BodyKind::Stub(value)) => value.clone(),
                _ => None,
            },
        },
        SymbolKind::Field => ctx
            .annotations
            .field_value(condition)
            .map(str::to_string)
            .or_else(|| symbol.as_field().and_then(|f| f.constant.clone())),
        _ => None,
    }?;
    parse_bool(&text)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{BodyReference, BodyReferenceKind, SymbolRef},
        test::TestLink,
    };

    #[test]
    fn folds_disabled_feature_branches() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let features = link.ty(app, "App.Features");
        let supported = link.static_method(features, "get_IsSupported");
        let program = link.ty(app, "App.Program");
        let main = link.static_method(program, "Main");
        let heavy = link.static_method(program, "Heavy");
        let light = link.static_method(program, "Light");

        let condition = link.reference(supported);
        let body = link
            .ctx
            .graph
            .symbol_mut(main)
            .as_method_mut()
            .unwrap()
            .body
            .as_mut()
            .unwrap();
        body.push(
            BodyReference::new(BodyReferenceKind::Call, SymbolRef::new("App", "App.Program::Heavy"))
                .guarded_by(condition.clone(), true),
        );
        body.push(
            BodyReference::new(BodyReferenceKind::Call, SymbolRef::new("App", "App.Program::Light"))
                .guarded_by(condition, false),
        );
        link.ctx.annotations.set_method_action(
            supported,
            MethodAction::ConvertToStub(Some("false".into())),
        );

        link.run(&mut RemoveUnreachableBlocksStep).unwrap();
        link.root_member(main);
        link.mark().unwrap();
        assert!(!link.marked(heavy));
        assert!(link.marked(light));
    }

    #[test]
    fn unknown_conditions_keep_both_branches() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let program = link.ty(app, "App.Program");
        let flag = link.static_field(program, "Enabled");
        let main = link.static_method(program, "Main");
        link.static_method(program, "Heavy");

        let condition = link.reference(flag);
        link.ctx
            .graph
            .symbol_mut(main)
            .as_method_mut()
            .unwrap()
            .body
            .as_mut()
            .unwrap()
            .push(
                BodyReference::new(BodyReferenceKind::Call, SymbolRef::new("App", "App.Program::Heavy"))
                    .guarded_by(condition, true),
            );

        link.run(&mut RemoveUnreachableBlocksStep).unwrap();
        assert_eq!(body_len(&link, main), 1);

        link.ctx.annotations.set_field_value(flag, "0".into(), false);
        link.ctx
            .optimizations
            .disable(CodeOptimizations::IP_CONSTANT_PROPAGATION, Some("App"));
        link.run(&mut RemoveUnreachableBlocksStep).unwrap();
        assert_eq!(body_len(&link, main), 1);

        link.ctx
            .optimizations
            .enable(CodeOptimizations::IP_CONSTANT_PROPAGATION, Some("App"));
        link.run(&mut RemoveUnreachableBlocksStep).unwrap();
        assert_eq!(body_len(&link, main), 0);
    }

    fn body_len(link: &TestLink, method: SymbolId) -> usize {
        link.ctx.graph.symbol(method).as_method().unwrap().body.as_ref().unwrap().references.len()
    }
}
