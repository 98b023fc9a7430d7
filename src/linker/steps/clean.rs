use log::debug;

use crate::{
    graph::{SymbolId, SymbolKind},
    linker::{actions::AssemblyAction, LinkContext, Step},
    Result,
};

/// Removes the leftovers sweeping produced in `Link` assemblies.
///
/// A property or event cannot be written without accessors, so one whose accessors were all
/// swept is dropped even when it was marked itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanStep;

impl Step for CleanStep {
    fn name(&self) -> &'static str {
        "CleanStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        for module in ctx.graph.modules().to_vec() {
            if ctx.graph.symbol(module).is_removed() || ctx.action_of(module) != AssemblyAction::Link {
                continue;
            }

            let orphans: Vec<SymbolId> = ctx
                .graph
                .descendants(module)
                .into_iter()
                .filter(|id| is_orphan(ctx, *id))
                .collect();
            for id in &orphans {
                debug!("Removing '{}' without accessors", ctx.graph.symbol(*id).full_name);
                ctx.graph.remove(*id);
            }
        }
        Ok(())
    }
}

fn is_orphan(ctx: &LinkContext, id: SymbolId) -> bool {
    let symbol = ctx.graph.symbol(id);
    if symbol.is_removed() {
        return false;
    }
    match symbol.kind() {
        SymbolKind::Property | SymbolKind::Event => symbol.as_accessor_owner().is_some_and(|owner| {
            owner
                .accessors
                .iter()
                .all(|accessor| ctx.graph.symbol(*accessor).is_removed())
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{AccessorOwnerInfo, Visibility},
        linker::steps::SweepStep,
        test::TestLink,
    };

    #[test]
    fn drops_properties_without_accessors() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let ty = link.ty(app, "App.Options");
        let getter = link.method(ty, "get_Name");
        let setter = link.method(ty, "set_Name");
        let other = link.method(ty, "get_Size");
        let name = link
            .ctx
            .graph
            .add_property(
                ty,
                "Name",
                Visibility::Public,
                AccessorOwnerInfo {
                    value_type: None,
                    accessors: vec![getter, setter],
                },
            )
            .unwrap();
        let size = link
            .ctx
            .graph
            .add_property(
                ty,
                "Size",
                Visibility::Public,
                AccessorOwnerInfo {
                    value_type: None,
                    accessors: vec![other],
                },
            )
            .unwrap();
        link.root_member(other);
        link.root_member(name);

        link.mark().unwrap();
        link.run(&mut SweepStep).unwrap();
        link.run(&mut CleanStep).unwrap();

        assert!(link.removed(name));
        assert!(!link.removed(size));
        assert!(!link.removed(other));
    }
}
