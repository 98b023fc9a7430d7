//! Removal of everything marking did not reach.

use log::debug;

use crate::{
    graph::{CustomAttribute, SymbolDetail, SymbolId, SymbolRef},
    linker::{
        actions::AssemblyAction,
        attributes::{LinkerAttributeKind, DEPENDENCY_ATTRIBUTES},
        descriptor::is_linker_resource,
        LinkContext, Step,
    },
    Result,
};

/// Removes unmarked symbols according to each assembly's action.
///
/// `Link` assemblies lose their unmarked types and members (or vanish entirely when nothing in
/// them was marked), interface implementations and custom attributes that point at removed
/// types, dependency-tracking attributes and embedded linker descriptors. `CopyUsed` and
/// `AddBypassNGenUsed` assemblies are removed when unreached and otherwise become `Copy` and
/// `AddBypassNGen`. Every other action leaves the assembly untouched.
///
/// # Panics
///
/// Panics if marking has not reached a fixpoint; running Sweep before Mark is a pipeline bug.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStep;

impl Step for SweepStep {
    fn name(&self) -> &'static str {
        "SweepStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        assert!(
            ctx.is_marking_complete(),
            "SweepStep requires a completed MarkStep"
        );

        let modules = ctx.graph.modules().to_vec();
        let mut removed = 0usize;
        for module in &modules {
            let assembly = ctx.graph.assembly_of(*module).to_string();
            let marked = ctx.annotations.is_marked(*module);
            match ctx.action_of(*module) {
                AssemblyAction::Link if !marked => {
                    debug!("Removing unused assembly '{assembly}'");
                    ctx.graph.remove(*module);
                }
                AssemblyAction::Link => {
                    removed += sweep_members(ctx, *module);
                }
                AssemblyAction::CopyUsed | AssemblyAction::AddBypassNGenUsed if !marked => {
                    debug!("Removing unused assembly '{assembly}'");
                    ctx.graph.remove(*module);
                }
                AssemblyAction::CopyUsed => ctx.actions.set(&assembly, AssemblyAction::Copy),
                AssemblyAction::AddBypassNGenUsed => {
                    ctx.actions.set(&assembly, AssemblyAction::AddBypassNGen);
                }
                AssemblyAction::Skip
                | AssemblyAction::Copy
                | AssemblyAction::Save
                | AssemblyAction::AddBypassNGen => {}
            }
        }

        for module in modules {
            if ctx.graph.symbol(module).is_removed() || ctx.action_of(module) != AssemblyAction::Link {
                continue;
            }
            clean_references(ctx, module);
            sweep_resources(ctx, module);
        }

        debug!("Swept {removed} unreachable symbols");
        Ok(())
    }
}

/// Removes the unmarked descendants of a kept module; returns how many were removed.
fn sweep_members(ctx: &mut LinkContext, module: SymbolId) -> usize {
    let mut removed = 0;
    for id in ctx.graph.descendants(module) {
        if ctx.graph.symbol(id).is_removed() || ctx.annotations.is_marked(id) {
            continue;
        }
        ctx.graph.remove(id);
        removed += 1;
    }
    removed
}

/// Returns true if `reference` names a symbol that sweeping removed.
fn is_removed(ctx: &LinkContext, reference: &SymbolRef) -> bool {
    ctx.graph
        .find(reference)
        .is_some_and(|id| ctx.graph.symbol(id).is_removed())
}

fn keeps_attribute(ctx: &LinkContext, attribute: &CustomAttribute) -> bool {
    if !ctx.options.keep_dependency_attributes
        && DEPENDENCY_ATTRIBUTES
            .iter()
            .any(|name| attribute.is_type(name))
    {
        return false;
    }
    match ctx.graph.find(&attribute.attribute_type) {
        Some(ty) => {
            !ctx.graph.symbol(ty).is_removed()
                && !ctx.attributes_of(ty).has(LinkerAttributeKind::Removable)
        }
        None => true,
    }
}

/// Drops links from kept symbols to removed ones.
fn clean_references(ctx: &mut LinkContext, module: SymbolId) {
    let kept: Vec<SymbolId> = std::iter::once(module)
        .chain(ctx.graph.descendants(module))
        .filter(|id| !ctx.graph.symbol(*id).is_removed())
        .collect();

    for id in kept {
        let attributes: Vec<CustomAttribute> = ctx
            .graph
            .symbol(id)
            .attributes
            .iter()
            .filter(|attribute| keeps_attribute(ctx, attribute))
            .cloned()
            .collect();

        let detail = match &ctx.graph.symbol(id).detail {
            SymbolDetail::Type(info) => {
                let mut info = info.clone();
                info.interfaces.retain(|interface| !is_removed(ctx, interface));
                Some(SymbolDetail::Type(info))
            }
            SymbolDetail::Method(info) => {
                let mut info = info.clone();
                info.overrides.retain(|base| !is_removed(ctx, base));
                Some(SymbolDetail::Method(info))
            }
            SymbolDetail::Property(info) => {
                let mut info = info.clone();
                info.accessors.retain(|accessor| !ctx.graph.symbol(*accessor).is_removed());
                Some(SymbolDetail::Property(info))
            }
            SymbolDetail::Event(info) => {
                let mut info = info.clone();
                info.accessors.retain(|accessor| !ctx.graph.symbol(*accessor).is_removed());
                Some(SymbolDetail::Event(info))
            }
            SymbolDetail::Module(info) => {
                let mut info = info.clone();
                info.references.retain(|assembly| {
                    ctx.graph
                        .module(assembly)
                        .map_or(true, |referenced| !ctx.graph.symbol(referenced).is_removed())
                });
                Some(SymbolDetail::Module(info))
            }
            SymbolDetail::Field(_) => None,
        };

        let symbol = ctx.graph.symbol_mut(id);
        symbol.attributes = attributes;
        if let Some(detail) = detail {
            symbol.detail = detail;
        }
    }
}

fn sweep_resources(ctx: &mut LinkContext, module: SymbolId) {
    let strip = ctx.options.strip_resources;
    let scheduled = ctx.annotations.resources_to_remove(module).to_vec();
    if let Some(info) = ctx.graph.symbol_mut(module).as_module_mut() {
        info.resources.retain(|resource| {
            !(strip && is_linker_resource(&resource.name)) && !scheduled.contains(&resource.name)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{AttributeArgument, Resource, TypeInfo},
        linker::attributes::DYNAMIC_DEPENDENCY,
        test::TestLink,
    };

    #[test]
    fn removes_unmarked_members() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let a = link.ty(app, "TypeA");
        let foo = link.static_method(a, "MethodFoo");
        let b = link.ty(app, "TypeB");
        let bar = link.static_method(b, "MethodBar");
        let c = link.ty(app, "TypeC");
        let c_field = link.field(c, "value");
        link.calls(foo, bar);
        link.root(a);

        link.mark().unwrap();
        link.run(&mut SweepStep).unwrap();
        assert!(!link.removed(foo));
        assert!(!link.removed(bar));
        assert!(link.removed(c));
        assert!(link.removed(c_field));
    }

    #[test]
    fn actions_decide_assembly_fate() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let unused = link.module("Unused", AssemblyAction::Link);
        let lib = link.module("Lib", AssemblyAction::CopyUsed);
        let unused_lib = link.module("UnusedLib", AssemblyAction::CopyUsed);
        let skipped = link.module("Skipped", AssemblyAction::Skip);
        let program = link.ty(app, "Program");
        let main = link.static_method(program, "Main");
        let helper = link.ty(lib, "Helper");
        let run = link.static_method(helper, "Run");
        let idle = link.static_method(helper, "Idle");
        link.ty(unused, "Nothing");
        let z = link.ty(skipped, "Z");
        link.calls(main, run);
        link.root_member(main);
        link.ctx
            .graph
            .symbol_mut(app)
            .as_module_mut()
            .unwrap()
            .references = vec!["Lib".into(), "Unused".into(), "UnusedLib".into(), "System.Runtime".into()];

        link.mark().unwrap();
        link.run(&mut SweepStep).unwrap();

        assert!(link.removed(unused));
        assert!(link.removed(unused_lib));
        assert!(!link.removed(idle));
        assert!(!link.removed(z));
        assert_eq!(link.ctx.actions.get("Lib"), AssemblyAction::Copy);
        assert_eq!(
            link.ctx.graph.module_info(app).references,
            vec!["Lib".to_string(), "System.Runtime".to_string()]
        );
    }

    #[test]
    #[should_panic(expected = "requires a completed MarkStep")]
    fn sweep_before_mark_panics() {
        let mut link = TestLink::new();
        link.module("App", AssemblyAction::Link);
        let _ = link.run(&mut SweepStep);
    }

    #[test]
    fn unused_interfaces_and_attributes_are_dropped() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let unused_interface = link.ty(app, "IUnused");
        let attribute_type = link.ty(app, "DocAttribute");
        let info = TypeInfo {
            base_type: None,
            interfaces: vec![
                link.reference(unused_interface),
                SymbolRef::new("System.Runtime", "System.IDisposable"),
            ],
        };
        let api = link.ty_with(app, "Api", crate::graph::SymbolFlags::empty(), info);
        link.ctx.graph.symbol_mut(api).attributes = vec![
            CustomAttribute::new(link.reference(attribute_type)),
            CustomAttribute::new(SymbolRef::new("System.Runtime", DYNAMIC_DEPENDENCY))
                .with_argument(AttributeArgument::String("Run".into())),
        ];
        link.root(api);
        link.ctx.options.used_attributes_only = true;

        link.mark().unwrap();
        link.run(&mut SweepStep).unwrap();

        assert!(link.removed(unused_interface));
        assert!(link.removed(attribute_type));
        let symbol = link.ctx.graph.symbol(api);
        assert!(symbol.attributes.is_empty());
        assert_eq!(
            symbol.as_type().unwrap().interfaces,
            vec![SymbolRef::new("System.Runtime", "System.IDisposable")]
        );
    }

    #[test]
    fn linker_resources_are_stripped() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let program = link.ty(app, "Program");
        link.root(program);
        link.ctx
            .graph
            .symbol_mut(app)
            .as_module_mut()
            .unwrap()
            .resources = vec![
            Resource {
                name: "ILLink.Descriptors.xml".into(),
                content: "<linker/>".into(),
            },
            Resource {
                name: "Strings.resources".into(),
                content: String::new(),
            },
            Resource {
                name: "Obsolete.txt".into(),
                content: String::new(),
            },
        ];
        link.ctx.annotations.add_resource_to_remove(app, "Obsolete.txt");

        link.mark().unwrap();
        link.run(&mut SweepStep).unwrap();
        let names: Vec<&str> = link
            .ctx
            .graph
            .module_info(app)
            .resources
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["Strings.resources"]);
    }
}
