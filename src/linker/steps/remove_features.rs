use log::debug;

use crate::{
    graph::{SymbolId, SymbolKind},
    linker::{
        actions::AssemblyAction,
        annotations::MethodAction,
        attributes::{LinkerAttribute, LinkerAttributeKind},
        LinkContext, Step,
    },
    Result,
};

/// Turns the code of excluded features into throwing stubs.
///
/// A method tagged `RemovableFeature("Name")` with `Name` in the excluded feature list keeps its
/// signature but loses its body, and with it every dependency the body had. Tagging a type
/// applies to all of its methods, tagging a property or event applies to its accessors.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveFeaturesStep;

impl Step for RemoveFeaturesStep {
    fn name(&self) -> &'static str {
        "RemoveFeaturesStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        if ctx.options.excluded_features.is_empty() {
            return Ok(());
        }

        let mut methods: Vec<SymbolId> = Vec::new();
        for module in ctx.graph.modules() {
            if ctx.action_of(*module) != AssemblyAction::Link {
                continue;
            }
            for id in ctx.graph.descendants(*module) {
                let Some(feature) = excluded_feature(ctx, id) else {
                    continue;
                };
                debug!(
                    "Removing '{}' of excluded feature '{feature}'",
                    ctx.graph.symbol(id).full_name
                );
                collect_methods(ctx, id, &mut methods);
            }
        }

        for method in methods {
            ctx.annotations
                .set_method_action(method, MethodAction::ConvertToThrow);
        }
        Ok(())
    }
}

fn excluded_feature(ctx: &LinkContext, id: SymbolId) -> Option<String> {
    ctx.attributes_of(id)
        .get(LinkerAttributeKind::RemovableFeature)
        .iter()
        .find_map(|attribute| match attribute {
            LinkerAttribute::RemovableFeature { name }
                if ctx.options.excluded_features.iter().any(|f| f == name) =>
            {
                Some(name.clone())
            }
            _ => None,
        })
}

fn collect_methods(ctx: &LinkContext, id: SymbolId, methods: &mut Vec<SymbolId>) {
    let symbol = ctx.graph.symbol(id);
    match symbol.kind() {
        SymbolKind::Method => {
            if symbol.as_method().is_some_and(|m| m.body.is_some()) && !methods.contains(&id) {
                methods.push(id);
            }
        }
        SymbolKind::Type => {
            for member in ctx.graph.descendants(id) {
                if ctx.graph.symbol(member).kind() == SymbolKind::Method {
                    collect_methods(ctx, member, methods);
                }
            }
        }
        SymbolKind::Property | SymbolKind::Event => {
            for accessor in symbol
                .as_accessor_owner()
                .map(|owner| owner.accessors.as_slice())
                .unwrap_or_default()
            {
                collect_methods(ctx, *accessor, methods);
            }
        }
        SymbolKind::Module | SymbolKind::Field => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{AttributeArgument, CustomAttribute, SymbolRef},
        test::TestLink,
    };

    fn tag(link: &mut TestLink, id: SymbolId, feature: &str) {
        link.ctx.graph.symbol_mut(id).attributes.push(
            CustomAttribute::new(SymbolRef::new("App", "App.RemovableFeatureAttribute"))
                .with_argument(AttributeArgument::String(feature.into())),
        );
    }

    #[test]
    fn excluded_features_become_throws() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let com = link.ty(app, "App.ComInterop");
        let activate = link.static_method(com, "Activate");
        let program = link.ty(app, "App.Program");
        let trace = link.static_method(program, "Trace");
        let run = link.static_method(program, "Run");
        let helper = link.static_method(program, "Helper");
        link.calls(trace, helper);
        tag(&mut link, com, "COM");
        tag(&mut link, trace, "Tracing");
        tag(&mut link, run, "Kept");

        link.ctx.options.excluded_features = vec!["COM".into(), "Tracing".into()];
        link.run(&mut RemoveFeaturesStep).unwrap();

        let annotations = &link.ctx.annotations;
        assert_eq!(annotations.method_action(activate), Some(&MethodAction::ConvertToThrow));
        assert_eq!(annotations.method_action(trace), Some(&MethodAction::ConvertToThrow));
        assert_eq!(annotations.method_action(run), None);

        link.root_member(trace);
        link.mark().unwrap();
        assert!(!link.marked(helper));
    }
}
