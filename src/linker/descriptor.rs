//! Shared handling of linker XML files.
//!
//! Root descriptors, substitutions and attribute definitions share one layout:
//!
//! ```xml
//! <linker>
//!   <assembly fullname="App" feature="Diagnostics" featurevalue="false">
//!     <type fullname="App.Program">
//!       <method name="Main" />
//!       <field signature="System.Int32 count" />
//!     </type>
//!   </assembly>
//! </linker>
//! ```
//!
//! Any element may carry a `feature`/`featurevalue` condition (optionally with
//! `featuredefault="true"` to apply when the feature is unset). Type names may contain `*`
//! wildcards, and `fullname="*"` on an assembly element selects every loaded assembly.

use std::{fs, path::Path};

use crate::{
    graph::{Resource, SymbolGraph, SymbolId, SymbolKind, SymbolRef},
    linker::{
        diagnostics::{codes, MessageOrigin},
        LinkContext,
    },
    utils::XmlElement,
    Result,
};

/// Resource name of embedded root descriptors.
pub const EMBEDDED_DESCRIPTORS: &str = "ILLink.Descriptors.xml";
/// Resource name of embedded substitutions.
pub const EMBEDDED_SUBSTITUTIONS: &str = "ILLink.Substitutions.xml";
/// Resource name of embedded attribute definitions.
pub const EMBEDDED_LINK_ATTRIBUTES: &str = "ILLink.LinkAttributes.xml";

/// Returns true for resources that only carry linker instructions.
#[must_use]
pub fn is_linker_resource(name: &str) -> bool {
    [
        EMBEDDED_DESCRIPTORS,
        EMBEDDED_SUBSTITUTIONS,
        EMBEDDED_LINK_ATTRIBUTES,
    ]
    .contains(&name)
}

/// An XML document plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSource {
    /// File path or `resource in assembly`, used in diagnostics.
    pub name: String,
    /// The document text.
    pub text: String,
    /// The assembly embedding the document; embedded documents only apply to it.
    pub owner: Option<String>,
}

impl DescriptorSource {
    /// Reads a descriptor file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(DescriptorSource {
            name: path.display().to_string(),
            text: fs::read_to_string(path)?,
            owner: None,
        })
    }

    /// Wraps a descriptor embedded in `assembly`.
    #[must_use]
    pub fn embedded(assembly: &str, resource: &Resource) -> Self {
        DescriptorSource {
            name: format!("{} in {}", resource.name, assembly),
            text: resource.content.clone(),
            owner: Some(assembly.to_string()),
        }
    }

    /// Wraps in-memory text.
    #[must_use]
    pub fn from_text(name: &str, text: &str) -> Self {
        DescriptorSource {
            name: name.to_string(),
            text: text.to_string(),
            owner: None,
        }
    }

    /// Parses the document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Xml`] for a malformed document.
    pub fn parse(&self) -> Result<XmlElement> {
        XmlElement::parse(&self.text, &self.name)
    }

    /// Returns the diagnostic origin of `element`.
    #[must_use]
    pub fn origin(&self, element: &XmlElement) -> MessageOrigin {
        MessageOrigin::from_file(self.name.clone(), element.line, 0)
    }
}

/// Returns true if the `feature` condition of `element` holds.
pub fn should_process(ctx: &LinkContext, source: &DescriptorSource, element: &XmlElement) -> bool {
    let Some(feature) = element.non_empty_attr("feature") else {
        return true;
    };
    let Some(value) = element
        .non_empty_attr("featurevalue")
        .and_then(|v| v.to_ascii_lowercase().parse::<bool>().ok())
    else {
        ctx.warn(
            codes::XML_INVALID,
            format!("Feature '{feature}' needs a boolean 'featurevalue'"),
            &source.origin(element),
        );
        return false;
    };

    match ctx.feature(feature) {
        Some(setting) => setting == value,
        None => element
            .attr("featuredefault")
            .is_some_and(|d| d.eq_ignore_ascii_case("true")),
    }
}

/// Matches `text` against a pattern where `*` stands for any run of characters.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let Some((head, rest)) = pattern.split_once('*') else {
        return pattern == text;
    };
    let Some(mut remaining) = text.strip_prefix(head) else {
        return false;
    };

    let mut parts: Vec<&str> = rest.split('*').collect();
    let tail = parts.pop().unwrap_or_default();
    for part in parts {
        match remaining.find(part) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= tail.len() && remaining.ends_with(tail)
}

/// Resolves the `<assembly>` children of `root` that apply.
///
/// Missing assemblies are reported as missing roots.
///
/// # Errors
///
/// Returns [`crate::Error::Unresolved`] when missing roots are fatal.
pub fn assemblies<'a>(
    ctx: &mut LinkContext,
    source: &DescriptorSource,
    root: &'a XmlElement,
) -> Result<Vec<(&'a XmlElement, SymbolId)>> {
    let mut result = Vec::new();
    if !should_process(ctx, source, root) {
        return Ok(result);
    }

    for element in root.children_named("assembly") {
        if !should_process(ctx, source, element) {
            continue;
        }
        let Some(fullname) = element.non_empty_attr("fullname") else {
            ctx.warn(
                codes::XML_INVALID,
                "Assembly element without 'fullname'",
                &source.origin(element),
            );
            continue;
        };

        if fullname == "*" {
            let modules: Vec<SymbolId> = match &source.owner {
                Some(owner) => ctx.graph.module(owner).into_iter().collect(),
                None => ctx.graph.modules().to_vec(),
            };
            result.extend(modules.into_iter().map(|module| (element, module)));
            continue;
        }

        let name = assembly_name(fullname);
        if source.owner.as_deref().is_some_and(|owner| owner != name) {
            log::debug!(
                "Ignoring assembly '{name}' in {}; embedded descriptors only apply to their assembly",
                source.name
            );
            continue;
        }
        match ctx.resolve_assembly(name)? {
            Some(module) => result.push((element, module)),
            None => ctx.report_missing_root(
                codes::ROOT_ASSEMBLY_NOT_FOUND,
                name,
                source.origin(element).render(&ctx.graph),
            )?,
        }
    }
    Ok(result)
}

/// Returns the simple assembly name of a display name (`App, Version=1.0.0.0`).
#[must_use]
pub fn assembly_name(fullname: &str) -> &str {
    fullname.split(',').next().unwrap_or(fullname).trim()
}

/// Finds the types of `module` matching `pattern`; `parent` scopes the lookup to nested types.
#[must_use]
pub fn find_types(
    graph: &SymbolGraph,
    module: SymbolId,
    parent: Option<SymbolId>,
    pattern: &str,
) -> Vec<SymbolId> {
    let full_pattern = match parent {
        Some(outer) => format!("{}/{}", graph.symbol(outer).full_name, pattern),
        None => pattern.to_string(),
    };

    if full_pattern.contains('*') {
        return graph
            .types_of(module)
            .into_iter()
            .filter(|ty| {
                let symbol = graph.symbol(*ty);
                (parent.is_none() || symbol.parent == parent)
                    && glob_match(&full_pattern, &symbol.full_name)
            })
            .collect();
    }

    let assembly = &graph.module_info(module).assembly;
    graph
        .find(&SymbolRef::new(assembly.clone(), full_pattern))
        .filter(|id| graph.symbol(*id).kind() == SymbolKind::Type)
        .into_iter()
        .collect()
}

/// Returns the descriptor signature of a member: `Ret Name(P1,P2)` for methods and
/// `Type Name` for fields, properties and events.
#[must_use]
pub fn member_signature(graph: &SymbolGraph, member: SymbolId) -> String {
    let symbol = graph.symbol(member);
    let value_type = match symbol.kind() {
        SymbolKind::Method => return symbol.signature(),
        SymbolKind::Field => symbol.as_field().and_then(|f| f.field_type.as_ref()),
        SymbolKind::Property | SymbolKind::Event => symbol
            .as_accessor_owner()
            .and_then(|o| o.value_type.as_ref()),
        SymbolKind::Module | SymbolKind::Type => return symbol.name.clone(),
    };
    match value_type {
        Some(ty) => format!("{} {}", ty.name, symbol.name),
        None => symbol.name.clone(),
    }
}

fn normalize(signature: &str) -> String {
    signature.split_whitespace().collect::<Vec<_>>().join(" ").replace(", ", ",")
}

/// Finds the members of kind `kind` declared in `ty` that `element` selects by `name` or
/// `signature`.
#[must_use]
pub fn find_members(
    graph: &SymbolGraph,
    ty: SymbolId,
    kind: SymbolKind,
    element: &XmlElement,
) -> Vec<SymbolId> {
    let name = element.non_empty_attr("name");
    let signature = element.non_empty_attr("signature").map(normalize);

    graph
        .members_of(ty)
        .filter(|member| graph.symbol(*member).kind() == kind)
        .filter(|member| {
            let symbol = graph.symbol(*member);
            name.is_some_and(|n| n == "*" || glob_match(n, &symbol.name))
                || signature
                    .as_deref()
                    .is_some_and(|s| normalize(&member_signature(graph, *member)) == s)
        })
        .collect()
}

/// Maps a member element name to the symbol kind it selects.
#[must_use]
pub fn member_kind(element_name: &str) -> Option<SymbolKind> {
    match element_name {
        "method" => Some(SymbolKind::Method),
        "field" => Some(SymbolKind::Field),
        "property" => Some(SymbolKind::Property),
        "event" => Some(SymbolKind::Event),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        FieldInfo, MethodInfo, ModuleKind, SymbolFlags, TypeInfo, Visibility,
    };

    #[test]
    fn glob_patterns() {
        assert!(glob_match("*", "Ns.A"));
        assert!(glob_match("Ns.*", "Ns.A"));
        assert!(glob_match("Ns.*.Impl", "Ns.Core.Impl"));
        assert!(glob_match("*Attribute", "Ns.PreserveAttribute"));
        assert!(!glob_match("Ns.*", "Other.A"));
        assert!(!glob_match("Ns.A*B", "Ns.AB.C"));
        assert!(glob_match("Ns.A", "Ns.A"));
        assert!(!glob_match("a*a", "a"));
    }

    #[test]
    fn assembly_display_names() {
        assert_eq!(assembly_name("App, Version=1.0.0.0, Culture=neutral"), "App");
        assert_eq!(assembly_name("App"), "App");
    }

    #[test]
    fn type_and_member_lookup() {
        let mut graph = SymbolGraph::new();
        let module = graph.add_module("App", ModuleKind::Library).unwrap();
        let a = graph
            .add_type(module, "Ns.A", Visibility::Public, SymbolFlags::empty(), TypeInfo::default())
            .unwrap();
        let inner = graph
            .add_type(a, "Inner", Visibility::Public, SymbolFlags::empty(), TypeInfo::default())
            .unwrap();
        graph
            .add_type(module, "Other.B", Visibility::Public, SymbolFlags::empty(), TypeInfo::default())
            .unwrap();
        let run = graph
            .add_method(
                a,
                "Run",
                Visibility::Public,
                SymbolFlags::empty(),
                MethodInfo {
                    parameters: vec![SymbolRef::new("System.Private.CoreLib", "System.Int32")],
                    ..MethodInfo::default()
                },
            )
            .unwrap();
        let count = graph
            .add_field(
                a,
                "count",
                Visibility::Private,
                SymbolFlags::empty(),
                FieldInfo {
                    field_type: Some(SymbolRef::new("System.Private.CoreLib", "System.Int32")),
                    constant: None,
                },
            )
            .unwrap();

        assert_eq!(find_types(&graph, module, None, "Ns.A"), vec![a]);
        assert_eq!(find_types(&graph, module, None, "Ns.*"), vec![a, inner]);
        assert_eq!(find_types(&graph, module, Some(a), "Inner"), vec![inner]);
        assert!(find_types(&graph, module, None, "Ns.Missing").is_empty());

        let by_signature =
            XmlElement::parse(r#"<method signature="System.Void Run(System.Int32)"/>"#, "t").unwrap();
        assert_eq!(
            find_members(&graph, a, SymbolKind::Method, &by_signature),
            vec![run]
        );
        let field = XmlElement::parse(r#"<field signature="System.Int32 count"/>"#, "t").unwrap();
        assert_eq!(find_members(&graph, a, SymbolKind::Field, &field), vec![count]);
        let wildcard = XmlElement::parse(r#"<field name="*"/>"#, "t").unwrap();
        assert_eq!(find_members(&graph, a, SymbolKind::Field, &wildcard), vec![count]);
    }

    #[test]
    fn feature_conditions() {
        let mut ctx = LinkContext::new();
        let source = DescriptorSource::from_text("test.xml", "");
        let element = |text: &str| XmlElement::parse(text, "test.xml").unwrap();

        assert!(should_process(&ctx, &source, &element("<type/>")));
        let conditional = element(r#"<type feature="Tracing" featurevalue="true"/>"#);
        assert!(!should_process(&ctx, &source, &conditional));
        assert!(should_process(
            &ctx,
            &source,
            &element(r#"<type feature="Tracing" featurevalue="true" featuredefault="true"/>"#)
        ));
        ctx.set_feature("Tracing", true);
        assert!(should_process(&ctx, &source, &conditional));
        ctx.set_feature("Tracing", false);
        assert!(!should_process(&ctx, &source, &conditional));

        assert!(!should_process(
            &ctx,
            &source,
            &element(r#"<type feature="Tracing" featurevalue="maybe"/>"#)
        ));
        assert_eq!(ctx.diagnostics.with_code(codes::XML_INVALID).len(), 1);
    }
}
