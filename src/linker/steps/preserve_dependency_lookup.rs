use log::debug;

use crate::{
    graph::{AttributeArgument, SymbolId},
    linker::{actions::AssemblyAction, attributes::DEPENDENCY_ATTRIBUTES, LinkContext, Step},
    Result,
};

/// Loads the assemblies named by dependency attributes so marking can resolve them.
///
/// Such assemblies are often not referenced by anything else. Names that cannot be found are
/// left alone here; marking reports the dependency once it tries to follow it.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreserveDependencyLookupStep;

impl Step for PreserveDependencyLookupStep {
    fn name(&self) -> &'static str {
        "PreserveDependencyLookupStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        let mut wanted: Vec<String> = Vec::new();
        for module in ctx.graph.modules() {
            if ctx.action_of(*module) == AssemblyAction::Skip {
                continue;
            }
            let symbols = std::iter::once(*module).chain(ctx.graph.descendants(*module));
            for id in symbols {
                for assembly in dependency_assemblies(ctx, id) {
                    if ctx.graph.module(&assembly).is_none() && !wanted.contains(&assembly) {
                        wanted.push(assembly);
                    }
                }
            }
        }

        for assembly in wanted {
            if ctx.resolve_assembly(&assembly)?.is_some() {
                debug!("Loaded '{assembly}' for a dynamic dependency");
            }
        }
        Ok(())
    }
}

/// The assembly is the third positional argument in both dependency attribute shapes.
fn dependency_assemblies(ctx: &LinkContext, id: SymbolId) -> Vec<String> {
    ctx.graph
        .symbol(id)
        .attributes
        .iter()
        .chain(ctx.attributes.supplementary(id))
        .filter(|attribute| DEPENDENCY_ATTRIBUTES.iter().any(|name| attribute.is_type(name)))
        .filter_map(|attribute| match attribute.constructor_arguments.get(2) {
            Some(AttributeArgument::String(assembly)) => Some(assembly.clone()),
            _ => None,
        })
        .collect()
}
