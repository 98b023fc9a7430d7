use log::debug;

use crate::{
    graph::{CustomAttribute, SymbolId},
    linker::{actions::AssemblyAction, LinkContext, Step},
    Result,
};

const PERMISSIONS_NAMESPACE: &str = "System.Security.Permissions.";
const SECURITY_ATTRIBUTES: [&str; 4] = [
    "System.Security.SuppressUnmanagedCodeSecurityAttribute",
    "System.Security.SecurityCriticalAttribute",
    "System.Security.SecuritySafeCriticalAttribute",
    "System.Security.UnverifiableCodeAttribute",
];

fn is_security_attribute(attribute: &CustomAttribute) -> bool {
    let name = attribute.attribute_type.name.as_str();
    name.starts_with(PERMISSIONS_NAMESPACE) || SECURITY_ATTRIBUTES.contains(&name)
}

/// Drops declarative security and security attributes from `Link` assemblies.
///
/// Runs before marking so the permission attribute types are not kept alive by the
/// attributes that are about to disappear.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveSecurityStep;

impl Step for RemoveSecurityStep {
    fn name(&self) -> &'static str {
        "RemoveSecurityStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        for module in ctx.graph.modules().to_vec() {
            if ctx.action_of(module) != AssemblyAction::Link {
                continue;
            }
            let symbols: Vec<SymbolId> = std::iter::once(module)
                .chain(ctx.graph.descendants(module))
                .collect();

            let mut stripped = 0usize;
            for id in symbols {
                let symbol = ctx.graph.symbol_mut(id);
                let before = symbol.security.len() + symbol.attributes.len();
                symbol.security.clear();
                symbol.attributes.retain(|a| !is_security_attribute(a));
                stripped += before - symbol.attributes.len();
            }
            if stripped > 0 {
                debug!(
                    "Stripped {stripped} security entries from '{}'",
                    ctx.graph.assembly_of(module)
                );
            }
        }
        Ok(())
    }
}
