//! Custom attributes supplied from XML.
//!
//! ```xml
//! <linker>
//!   <assembly fullname="*">
//!     <type fullname="System.Diagnostics.CodeAnalysis.DynamicDependencyAttribute"
//!           internal="RemoveAttributeInstances" />
//!   </assembly>
//!   <assembly fullname="App">
//!     <type fullname="App.Reflection">
//!       <attribute fullname="System.Diagnostics.CodeAnalysis.RequiresUnreferencedCodeAttribute">
//!         <argument>Uses reflection</argument>
//!         <property name="Url">https://example.org/trim</property>
//!       </attribute>
//!       <method name="Load">
//!         <attribute fullname="App.PreserveAttribute" assembly="App" />
//!       </method>
//!     </type>
//!   </assembly>
//! </linker>
//! ```

use log::debug;

use crate::{
    graph::{AttributeArgument, CustomAttribute, SymbolId, SymbolKind, SymbolRef},
    linker::{
        descriptor::{self, DescriptorSource},
        diagnostics::codes,
        LinkContext, Step,
    },
    utils::XmlElement,
    Result,
};

const REMOVE_ATTRIBUTE_INSTANCES: &str = "RemoveAttributeInstances";

/// Attaches supplementary attributes to symbols before marking looks at them.
#[derive(Debug, Clone)]
pub struct LinkAttributesStep {
    source: DescriptorSource,
}

impl LinkAttributesStep {
    /// Creates the step for an attribute definition document.
    #[must_use]
    pub fn new(source: DescriptorSource) -> Self {
        LinkAttributesStep { source }
    }
}

impl Step for LinkAttributesStep {
    fn name(&self) -> &'static str {
        "LinkAttributesStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        debug!("Processing attribute definitions {}", self.source.name);
        let root = self.source.parse()?;
        let source = &self.source;

        for (element, module) in descriptor::assemblies(ctx, source, &root)? {
            apply_attributes(ctx, source, element, module);
            for child in element.children_named("type") {
                if descriptor::should_process(ctx, source, child) {
                    process_type(ctx, source, child, module, None);
                }
            }
        }
        Ok(())
    }
}

fn process_type(
    ctx: &mut LinkContext,
    source: &DescriptorSource,
    element: &XmlElement,
    module: SymbolId,
    parent: Option<SymbolId>,
) {
    let name_attribute = if parent.is_some() { "name" } else { "fullname" };
    let Some(pattern) = element.non_empty_attr(name_attribute) else {
        ctx.warn(
            codes::XML_INVALID,
            format!("Type element without '{name_attribute}'"),
            &source.origin(element),
        );
        return;
    };
    let types = descriptor::find_types(&ctx.graph, module, parent, pattern);
    if types.is_empty() {
        ctx.warn(
            codes::XML_TYPE_NOT_FOUND,
            format!(
                "Could not resolve type '{pattern}' in assembly '{}'",
                ctx.graph.module_info(module).assembly
            ),
            &source.origin(element),
        );
        return;
    }

    for ty in types {
        match element.non_empty_attr("internal") {
            Some(REMOVE_ATTRIBUTE_INSTANCES) => ctx.attributes.mark_removable(ty),
            Some(other) => ctx.warn(
                codes::XML_INVALID,
                format!("Unrecognized internal attribute '{other}'"),
                &source.origin(element),
            ),
            None => {}
        }
        apply_attributes(ctx, source, element, ty);

        for child in &element.children {
            if !descriptor::should_process(ctx, source, child) {
                continue;
            }
            if child.name == "type" {
                process_type(ctx, source, child, module, Some(ty));
                continue;
            }
            let Some(kind) = descriptor::member_kind(&child.name) else {
                continue;
            };
            process_member(ctx, source, child, ty, kind);
        }
    }
}

fn process_member(
    ctx: &mut LinkContext,
    source: &DescriptorSource,
    element: &XmlElement,
    ty: SymbolId,
    kind: SymbolKind,
) {
    let members = descriptor::find_members(&ctx.graph, ty, kind, element);
    if members.is_empty() {
        ctx.warn(
            codes::XML_MEMBER_NOT_FOUND,
            format!(
                "Could not find {} '{}' on type '{}'",
                element.name,
                element
                    .non_empty_attr("signature")
                    .or_else(|| element.non_empty_attr("name"))
                    .unwrap_or_default(),
                ctx.graph.symbol(ty).full_name
            ),
            &source.origin(element),
        );
    }
    for member in members {
        apply_attributes(ctx, source, element, member);
    }
}

fn apply_attributes(
    ctx: &mut LinkContext,
    source: &DescriptorSource,
    element: &XmlElement,
    target: SymbolId,
) {
    for child in element.children_named("attribute") {
        if !descriptor::should_process(ctx, source, child) {
            continue;
        }
        match parse_attribute(ctx, child, target) {
            Some(attribute) => {
                debug!(
                    "Adding {} to {}",
                    attribute.attribute_type,
                    ctx.graph.symbol(target).full_name
                );
                ctx.attributes.add_supplementary(target, attribute);
            }
            None => ctx.warn(
                codes::XML_INVALID,
                "Attribute element without 'fullname'",
                &source.origin(child),
            ),
        }
    }
}

fn parse_attribute(ctx: &LinkContext, element: &XmlElement, target: SymbolId) -> Option<CustomAttribute> {
    let fullname = element.non_empty_attr("fullname")?;
    let assembly = element
        .non_empty_attr("assembly")
        .map(descriptor::assembly_name)
        .map(str::to_string)
        .unwrap_or_else(|| defining_assembly(ctx, fullname, target));

    let mut attribute = CustomAttribute::new(SymbolRef::new(assembly, fullname));
    for argument in element.children_named("argument") {
        attribute = attribute.with_argument(parse_argument(argument));
    }
    for property in element.children_named("property") {
        if let Some(name) = property.non_empty_attr("name") {
            attribute = attribute.with_named(name, parse_argument(property));
        }
    }
    Some(attribute)
}

/// The first loaded assembly defining `full_name`, else the assembly of the target.
fn defining_assembly(ctx: &LinkContext, full_name: &str, target: SymbolId) -> String {
    ctx.graph
        .modules()
        .iter()
        .map(|module| ctx.graph.module_info(*module).assembly.as_str())
        .find(|assembly| {
            ctx.graph
                .find(&SymbolRef::new(*assembly, full_name))
                .is_some()
        })
        .unwrap_or_else(|| ctx.graph.assembly_of(target))
        .to_string()
}

fn parse_argument(element: &XmlElement) -> AttributeArgument {
    let text = element.text.trim();
    match element.non_empty_attr("type") {
        Some("System.Boolean") => text
            .to_ascii_lowercase()
            .parse()
            .map_or_else(|_| AttributeArgument::String(text.to_string()), AttributeArgument::Bool),
        Some(
            "System.Int32" | "System.Int64" | "System.Int16" | "System.SByte" | "System.Byte"
            | "System.UInt16" | "System.UInt32",
        ) => text
            .parse()
            .map_or_else(|_| AttributeArgument::String(text.to_string()), AttributeArgument::Int),
        _ if element.attr("null").is_some_and(|v| v.eq_ignore_ascii_case("true")) => {
            AttributeArgument::Null
        }
        _ => AttributeArgument::String(text.to_string()),
    }
}
