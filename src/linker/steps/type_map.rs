//! Override maps between base methods and their overrides.

use log::debug;

use crate::{
    graph::{SymbolFlags, SymbolGraph, SymbolId, SymbolKind, SymbolRef},
    linker::{annotations::OverrideInformation, LinkContext, Step},
    Result,
};

/// Records every base method / override pair of the loaded types.
///
/// A virtual method overrides the first virtual method with the same name and signature found
/// along its base chain, plus the methods it names explicitly. Interface methods map to the
/// implementing type's matching method, or to an inherited one from its base hierarchy; the
/// latter pairs remember the implementing type.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeMapStep;

impl Step for TypeMapStep {
    fn name(&self) -> &'static str {
        "TypeMapStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        let mut pairs = Vec::new();
        for module in ctx.graph.modules() {
            for id in ctx.graph.descendants(*module) {
                if ctx.graph.symbol(id).kind() == SymbolKind::Type {
                    map_type(&ctx.graph, id, &mut pairs);
                }
            }
        }

        debug!("Mapped {} overrides", pairs.len());
        for pair in pairs {
            ctx.annotations.add_override(pair);
        }
        Ok(())
    }
}

fn map_type(graph: &SymbolGraph, ty: SymbolId, pairs: &mut Vec<OverrideInformation>) {
    for method in graph.members_of(ty) {
        let symbol = graph.symbol(method);
        if !symbol.is_virtual() {
            continue;
        }

        if let Some(base) = base_method_in_hierarchy(graph, ty, method) {
            pairs.push(OverrideInformation {
                base,
                override_method: method,
                implementor: None,
            });
        }

        let explicit = symbol.as_method().map_or(&[][..], |info| info.overrides.as_slice());
        for reference in explicit {
            if let Some(base) = graph.find(reference) {
                pairs.push(OverrideInformation {
                    base,
                    override_method: method,
                    implementor: None,
                });
            }
        }
    }

    map_interface_methods(graph, ty, pairs);
}

fn map_interface_methods(graph: &SymbolGraph, ty: SymbolId, pairs: &mut Vec<OverrideInformation>) {
    let interfaces: Vec<SymbolRef> = graph
        .symbol(ty)
        .as_type()
        .map(|info| info.interfaces.clone())
        .unwrap_or_default();

    for interface in interfaces.iter().filter_map(|reference| graph.find(reference)) {
        for interface_method in graph.members_of(interface) {
            let symbol = graph.symbol(interface_method);
            if !symbol.is_virtual() || symbol.has_flag(SymbolFlags::FINAL) {
                continue;
            }

            if let Some(implementation) = match_method(graph, ty, interface_method) {
                pairs.push(OverrideInformation {
                    base: interface_method,
                    override_method: implementation,
                    implementor: None,
                });
            } else if let Some(inherited) = base_method_in_hierarchy(graph, ty, interface_method) {
                pairs.push(OverrideInformation {
                    base: interface_method,
                    override_method: inherited,
                    implementor: Some(ty),
                });
            }
        }
    }
}

fn base_method_in_hierarchy(graph: &SymbolGraph, ty: SymbolId, method: SymbolId) -> Option<SymbolId> {
    let mut base = graph.base_type(ty);
    while let Some(current) = base {
        if let Some(found) = match_method(graph, current, method) {
            return Some(found);
        }
        base = graph.base_type(current);
    }
    None
}

/// Finds a virtual method of `ty` with the name and signature of `method`.
fn match_method(graph: &SymbolGraph, ty: SymbolId, method: SymbolId) -> Option<SymbolId> {
    let wanted = graph.symbol(method);
    let wanted_info = wanted.as_method()?;
    graph.members_of(ty).find(|candidate| {
        let symbol = graph.symbol(*candidate);
        let Some(info) = symbol.as_method() else {
            return false;
        };
        symbol.is_virtual()
            && *candidate != method
            && symbol.name == wanted.name
            && type_name(info.return_type.as_ref()) == type_name(wanted_info.return_type.as_ref())
            && info.parameters.len() == wanted_info.parameters.len()
            && info
                .parameters
                .iter()
                .zip(&wanted_info.parameters)
                .all(|(a, b)| a.name == b.name)
    })
}

/// Types match by full name; the assembly part of a reference may be a forwarder.
fn type_name(reference: Option<&SymbolRef>) -> &str {
    reference.map_or("System.Void", |r| r.name.as_str())
}
