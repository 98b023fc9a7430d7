//! Roots taken from an XML descriptor.
//!
//! ```xml
//! <linker>
//!   <assembly fullname="Utils">
//!     <type fullname="Utils.Serializer" preserve="fields" />
//!     <type fullname="Utils.Plugins.*" />
//!     <type fullname="Utils.Cache" required="false" preserve="all" />
//!     <type fullname="Utils.Api">
//!       <method name="Start" />
//!       <method signature="System.Void Stop(System.Int32)" />
//!       <property name="Name" />
//!       <type name="Options" />
//!     </type>
//!     <namespace fullname="Utils.Models" />
//!   </assembly>
//!   <assembly fullname="Everything" preserve="all" />
//! </linker>
//! ```
//!
//! A type element without member children keeps the whole type unless `preserve` says
//! otherwise; with member children only the listed members are kept. `required="false"` keeps
//! the type's members only if marking reaches the type through other edges.

use log::debug;

use crate::{
    graph::{SymbolId, SymbolKind},
    linker::{
        actions::{Root, RootVisibility, TypePreserve},
        descriptor::{self, DescriptorSource},
        diagnostics::codes,
        LinkContext, Step,
    },
    utils::XmlElement,
    Result,
};

/// Registers the roots listed in a descriptor.
#[derive(Debug, Clone)]
pub struct ResolveFromXmlStep {
    source: DescriptorSource,
}

impl ResolveFromXmlStep {
    /// Creates the step for a parsed-on-demand descriptor.
    #[must_use]
    pub fn new(source: DescriptorSource) -> Self {
        ResolveFromXmlStep { source }
    }
}

impl Step for ResolveFromXmlStep {
    fn name(&self) -> &'static str {
        "ResolveFromXmlStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        debug!("Processing descriptor {}", self.source.name);
        let root = self.source.parse()?;
        let source = &self.source;

        for (element, module) in descriptor::assemblies(ctx, source, &root)? {
            let preserve_all = element.attr("preserve") == Some("all")
                || element.children.is_empty();
            if preserve_all {
                for ty in ctx.graph.children(module).to_vec() {
                    ctx.add_root(Root::new(ty));
                }
                continue;
            }

            for child in &element.children {
                if !descriptor::should_process(ctx, source, child) {
                    continue;
                }
                match child.name.as_str() {
                    "type" => process_type(ctx, source, child, module, None),
                    "namespace" => process_namespace(ctx, source, child, module),
                    other => ctx.warn(
                        codes::XML_INVALID,
                        format!("Unexpected element '{other}' in assembly"),
                        &source.origin(child),
                    ),
                }
            }
        }
        Ok(())
    }
}

fn parse_preserve(value: &str) -> Option<TypePreserve> {
    match value {
        "all" => Some(TypePreserve::All),
        "fields" => Some(TypePreserve::Fields),
        "methods" => Some(TypePreserve::Methods),
        "nothing" => Some(TypePreserve::Nothing),
        _ => None,
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
    let Some(pattern) = element
        .non_empty_attr(name_attribute)
        .or_else(|| element.non_empty_attr("fullname"))
    else {
        ctx.warn(
            codes::XML_INVALID,
            "Type element without a name",
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

    let has_members = element
        .children
        .iter()
        .any(|child| descriptor::member_kind(&child.name).is_some());
    let preserve = match element.non_empty_attr("preserve") {
        Some(value) => parse_preserve(value).unwrap_or_else(|| {
            ctx.warn(
                codes::XML_INVALID,
                format!("Invalid preserve value '{value}'"),
                &source.origin(element),
            );
            TypePreserve::All
        }),
        None if has_members => TypePreserve::Nothing,
        None => TypePreserve::All,
    };
    let required = element
        .non_empty_attr("required")
        .map_or(true, |value| !value.eq_ignore_ascii_case("false"));

    for ty in types {
        if required {
            ctx.add_root(Root::with(ty, RootVisibility::Any, preserve));
        } else {
            ctx.annotations.set_preserve(ty, preserve);
            continue;
        }

        for child in &element.children {
            if !descriptor::should_process(ctx, source, child) {
                continue;
            }
            if child.name == "type" {
                process_type(ctx, source, child, module, Some(ty));
            } else if let Some(kind) = descriptor::member_kind(&child.name) {
                process_member(ctx, source, child, ty, kind);
            }
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
        let what = element
            .non_empty_attr("signature")
            .or_else(|| element.non_empty_attr("name"))
            .unwrap_or_default();
        ctx.warn(
            codes::XML_MEMBER_NOT_FOUND,
            format!(
                "Could not find {} '{what}' on type '{}'",
                element.name,
                ctx.graph.symbol(ty).full_name
            ),
            &source.origin(element),
        );
        return;
    }

    for member in members {
        ctx.add_root(Root::new(member));
        let accessors = ctx
            .graph
            .symbol(member)
            .as_accessor_owner()
            .map(|owner| owner.accessors.clone())
            .unwrap_or_default();
        for accessor in accessors {
            ctx.add_root(Root::new(accessor));
        }
    }
}

fn process_namespace(
    ctx: &mut LinkContext,
    source: &DescriptorSource,
    element: &XmlElement,
    module: SymbolId,
) {
    let Some(namespace) = element.non_empty_attr("fullname") else {
        ctx.warn(
            codes::XML_INVALID,
            "Namespace element without 'fullname'",
            &source.origin(element),
        );
        return;
    };

    let prefix = format!("{namespace}.");
    let types: Vec<SymbolId> = ctx
        .graph
        .children(module)
        .iter()
        .copied()
        .filter(|ty| {
            ctx.graph.symbol(*ty).full_name.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('.'))
        })
        .collect();
    if types.is_empty() {
        ctx.warn(
            codes::XML_TYPE_NOT_FOUND,
            format!("Namespace '{namespace}' has no types"),
            &source.origin(element),
        );
    }
    for ty in types {
        ctx.add_root(Root::new(ty));
    }
}
