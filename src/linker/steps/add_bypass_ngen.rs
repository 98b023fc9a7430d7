use log::{debug, warn};

use crate::{
    graph::{
        CustomAttribute, MethodBody, MethodInfo, SymbolFlags, SymbolId, SymbolKind, SymbolRef,
        TypeInfo, Visibility,
    },
    linker::{
        actions::{AssemblyAction, CORE_LIBRARIES},
        annotations::MarkState,
        LinkContext, Step,
    },
    Result,
};

/// Full name of the attribute that tells ahead-of-time compilers to skip a method.
pub const BYPASS_NGEN_ATTRIBUTE: &str = "System.Runtime.BypassNGenAttribute";

/// Tags the unmarked methods of `AddBypassNGen` assemblies with `BypassNGenAttribute`.
///
/// The attribute type lives in the core library. When the core library does not define it, a
/// sealed internal type with a default constructor is added there, and a core library that
/// was going to be copied is saved instead so the new type reaches the output.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddBypassNGenStep;

impl Step for AddBypassNGenStep {
    fn name(&self) -> &'static str {
        "AddBypassNGenStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        let targets: Vec<SymbolId> = ctx
            .graph
            .modules()
            .iter()
            .copied()
            .filter(|m| {
                !ctx.graph.symbol(*m).is_removed()
                    && ctx.action_of(*m) == AssemblyAction::AddBypassNGen
            })
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let attribute_type = match core_library(ctx) {
            Some(core) => {
                ensure_attribute_type(ctx, core)?;
                SymbolRef::new(ctx.graph.assembly_of(core), BYPASS_NGEN_ATTRIBUTE)
            }
            None => {
                warn!("No core library loaded; '{BYPASS_NGEN_ATTRIBUTE}' is referenced but not defined");
                SymbolRef::new(CORE_LIBRARIES[0], BYPASS_NGEN_ATTRIBUTE)
            }
        };

        for module in targets {
            let mut tagged = 0usize;
            for id in ctx.graph.descendants(module) {
                let symbol = ctx.graph.symbol(id);
                if symbol.kind() != SymbolKind::Method
                    || symbol.is_removed()
                    || ctx.annotations.is_marked(id)
                    || symbol.attributes.iter().any(|a| a.attribute_type == attribute_type)
                {
                    continue;
                }
                ctx.graph
                    .symbol_mut(id)
                    .attributes
                    .push(CustomAttribute::new(attribute_type.clone()));
                tagged += 1;
            }
            debug!(
                "Tagged {tagged} unused methods of '{}' with BypassNGen",
                ctx.graph.assembly_of(module)
            );
        }
        Ok(())
    }
}

fn core_library(ctx: &LinkContext) -> Option<SymbolId> {
    CORE_LIBRARIES
        .iter()
        .filter_map(|name| ctx.graph.module(name))
        .find(|module| !ctx.graph.symbol(*module).is_removed())
}

fn ensure_attribute_type(ctx: &mut LinkContext, core: SymbolId) -> Result<()> {
    let assembly = ctx.graph.assembly_of(core).to_string();
    if ctx
        .graph
        .find(&SymbolRef::new(assembly.clone(), BYPASS_NGEN_ATTRIBUTE))
        .is_some()
    {
        return Ok(());
    }

    let base = SymbolRef::new(assembly.clone(), "System.Attribute");
    let ty = ctx.graph.add_type(
        core,
        BYPASS_NGEN_ATTRIBUTE,
        Visibility::Assembly,
        SymbolFlags::SEALED,
        TypeInfo {
            base_type: Some(base),
            interfaces: Vec::new(),
        },
    )?;
    let mut body = MethodBody::new();
    body.call(SymbolRef::new(assembly.clone(), "System.Attribute::.ctor"));
    let ctor = ctx.graph.add_method(
        ty,
        ".ctor",
        Visibility::Public,
        SymbolFlags::SPECIAL_NAME,
        MethodInfo {
            body: Some(body),
            ..MethodInfo::default()
        },
    )?;
    ctx.annotations.marks.set(ty, MarkState::Processed);
    ctx.annotations.marks.set(ctor, MarkState::Processed);
    ctx.annotations.mark_instantiated(ty);

    if ctx.actions.get(&assembly) == AssemblyAction::Copy {
        ctx.actions.set(&assembly, AssemblyAction::Save);
    }
    debug!("Added '{BYPASS_NGEN_ATTRIBUTE}' to '{assembly}'");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{linker::steps::SweepStep, test::TestLink};

    #[test]
    fn tags_unused_methods_and_synthesizes_attribute() {
        let mut link = TestLink::new();
        let core = link.module("System.Private.CoreLib", AssemblyAction::Copy);
        link.ty(core, "System.Attribute");
        let app = link.module("App", AssemblyAction::AddBypassNGenUsed);
        let program = link.ty(app, "App.Program");
        let main = link.static_method(program, "Main");
        let unused = link.static_method(program, "Unused");
        link.root_member(main);

        link.mark().unwrap();
        link.run(&mut SweepStep).unwrap();
        assert_eq!(link.ctx.actions.get("App"), AssemblyAction::AddBypassNGen);
        link.run(&mut AddBypassNGenStep).unwrap();

        let tag = SymbolRef::new("System.Private.CoreLib", BYPASS_NGEN_ATTRIBUTE);
        assert!(link.ctx.graph.find(&tag).is_some());
        assert!(link.ctx.graph.find(&SymbolRef::new(
            "System.Private.CoreLib",
            "System.Runtime.BypassNGenAttribute::.ctor"
        ))
        .is_some());
        assert_eq!(
            link.ctx.actions.get("System.Private.CoreLib"),
            AssemblyAction::Save
        );

        let tagged = |id| {
            link.ctx
                .graph
                .symbol(id)
                .attributes
                .iter()
                .any(|a: &CustomAttribute| a.attribute_type == tag)
        };
        assert!(tagged(unused));
        assert!(!tagged(main));
    }

    #[test]
    fn unused_assemblies_are_dropped_first() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let program = link.ty(app, "App.Program");
        let main = link.static_method(program, "Main");
        let extra = link.module("Extra", AssemblyAction::AddBypassNGenUsed);
        let thing = link.ty(extra, "Extra.Thing");
        link.static_method(thing, "Run");
        link.root_member(main);

        link.mark().unwrap();
        link.run(&mut SweepStep).unwrap();
        link.run(&mut AddBypassNGenStep).unwrap();
        assert!(link.removed(extra));
        assert!(link.ctx.graph.module("System.Private.CoreLib").is_none());
    }
}
