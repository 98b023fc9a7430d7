//! Body and field substitutions.
//!
//! ```xml
//! <linker>
//!   <assembly fullname="App">
//!     <type fullname="App.Features">
//!       <method signature="System.Boolean get_IsSupported()" body="stub" value="false" />
//!       <method name="Trace" body="remove" />
//!       <field name="Level" value="3" initialize="true" />
//!     </type>
//!     <resource name="Strings.resources" action="remove" />
//!   </assembly>
//! </linker>
//! ```

use log::debug;

use crate::{
    graph::{SymbolFlags, SymbolId, SymbolKind},
    linker::{
        annotations::MethodAction,
        descriptor::{self, DescriptorSource},
        diagnostics::codes,
        LinkContext, Step,
    },
    utils::XmlElement,
    Result,
};

/// Records the body rewrites, field values and resource removals of a substitution file.
///
/// Nothing is rewritten here: marking skips the body edges of substituted methods, and
/// `CodeRewriterStep` and `SweepStep` apply the recorded decisions afterwards.
#[derive(Debug, Clone)]
pub struct BodySubstituterStep {
    source: DescriptorSource,
}

impl BodySubstituterStep {
    /// Creates the step for a substitution document.
    #[must_use]
    pub fn new(source: DescriptorSource) -> Self {
        BodySubstituterStep { source }
    }
}

impl Step for BodySubstituterStep {
    fn name(&self) -> &'static str {
        "BodySubstituterStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        debug!("Processing substitutions {}", self.source.name);
        let root = self.source.parse()?;
        let source = &self.source;

        for (element, module) in descriptor::assemblies(ctx, source, &root)? {
            for child in &element.children {
                if !descriptor::should_process(ctx, source, child) {
                    continue;
                }
                match child.name.as_str() {
                    "type" => process_type(ctx, source, child, module, None),
                    "resource" => process_resource(ctx, source, child, module),
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

fn not_found(ctx: &LinkContext, source: &DescriptorSource, element: &XmlElement, what: &str) {
    ctx.warn(
        codes::SUBSTITUTION_TARGET_NOT_FOUND,
        format!("Could not find {} '{what}' to substitute", element.name),
        &source.origin(element),
    );
}

fn process_type(
    ctx: &mut LinkContext,
    source: &DescriptorSource,
    element: &XmlElement,
    module: SymbolId,
    parent: Option<SymbolId>,
) {
    let Some(pattern) = element
        .non_empty_attr("fullname")
        .or_else(|| element.non_empty_attr("name"))
    else {
        return;
    };
    let types = descriptor::find_types(&ctx.graph, module, parent, pattern);
    if types.is_empty() {
        not_found(ctx, source, element, pattern);
        return;
    }

    for ty in types {
        for child in &element.children {
            if !descriptor::should_process(ctx, source, child) {
                continue;
            }
            match child.name.as_str() {
                "method" => process_method(ctx, source, child, ty),
                "field" => process_field(ctx, source, child, ty),
                "type" => process_type(ctx, source, child, module, Some(ty)),
                _ => {}
            }
        }
    }
}

fn selector(element: &XmlElement) -> &str {
    element
        .non_empty_attr("signature")
        .or_else(|| element.non_empty_attr("name"))
        .unwrap_or_default()
}

fn process_method(ctx: &mut LinkContext, source: &DescriptorSource, element: &XmlElement, ty: SymbolId) {
    let action = match element.non_empty_attr("body") {
        Some("stub") => MethodAction::ConvertToStub(element.attr("value").map(str::to_string)),
        Some("remove") => MethodAction::ConvertToThrow,
        other => {
            ctx.warn(
                codes::XML_INVALID,
                format!("Invalid body action '{}'", other.unwrap_or_default()),
                &source.origin(element),
            );
            return;
        }
    };

    let methods = descriptor::find_members(&ctx.graph, ty, SymbolKind::Method, element);
    if methods.is_empty() {
        not_found(ctx, source, element, selector(element));
    }
    for method in methods {
        ctx.annotations.set_method_action(method, action.clone());
    }
}

fn process_field(ctx: &mut LinkContext, source: &DescriptorSource, element: &XmlElement, ty: SymbolId) {
    let Some(value) = element.attr("value") else {
        ctx.warn(
            codes::XML_INVALID,
            "Field substitution without 'value'",
            &source.origin(element),
        );
        return;
    };
    let initialize = element
        .attr("initialize")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let fields = descriptor::find_members(&ctx.graph, ty, SymbolKind::Field, element);
    if fields.is_empty() {
        not_found(ctx, source, element, selector(element));
    }
    for field in fields {
        if !ctx.graph.symbol(field).has_flag(SymbolFlags::STATIC) {
            ctx.warn(
                codes::XML_INVALID,
                format!(
                    "Substituted field '{}' must be static",
                    ctx.graph.symbol(field).full_name
                ),
                &source.origin(element),
            );
            continue;
        }
        ctx.annotations
            .set_field_value(field, value.to_string(), initialize);
    }
}

fn process_resource(ctx: &mut LinkContext, source: &DescriptorSource, element: &XmlElement, module: SymbolId) {
    let Some(name) = element.non_empty_attr("name") else {
        return;
    };
    if element.attr("action") != Some("remove") {
        ctx.warn(
            codes::XML_INVALID,
            format!("Invalid action for resource '{name}'"),
            &source.origin(element),
        );
        return;
    }

    let exists = ctx
        .graph
        .module_info(module)
        .resources
        .iter()
        .any(|resource| resource.name == name);
    if exists {
        ctx.annotations.add_resource_to_remove(module, name);
    } else {
        not_found(ctx, source, element, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{linker::AssemblyAction, test::TestLink};

    fn run(link: &mut TestLink, xml: &str) {
        link.run(&mut BodySubstituterStep::new(DescriptorSource::from_text("subs.xml", xml)))
            .unwrap();
    }

    #[test]
    fn records_method_and_field_substitutions() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let features = link.ty(app, "App.Features");
        let supported = link.static_method(features, "get_IsSupported");
        let trace = link.static_method(features, "Trace");
        let level = link.static_field(features, "Level");
        let instance = link.field(features, "count");

        run(
            &mut link,
            r#"<linker><assembly fullname="App"><type fullname="App.Features">
                 <method signature="System.Void get_IsSupported()" body="stub" value="false"/>
                 <method name="Trace" body="remove"/>
                 <method name="Gone" body="remove"/>
                 <field name="Level" value="3" initialize="true"/>
                 <field name="count" value="1"/>
               </type></assembly></linker>"#,
        );

        let annotations = &link.ctx.annotations;
        assert_eq!(
            annotations.method_action(supported),
            Some(&MethodAction::ConvertToStub(Some("false".into())))
        );
        assert_eq!(annotations.method_action(trace), Some(&MethodAction::ConvertToThrow));
        assert_eq!(annotations.field_value(level), Some("3"));
        assert!(annotations.has_field_init(level));
        assert_eq!(annotations.field_value(instance), None);
        assert_eq!(
            link.ctx
                .diagnostics
                .with_code(codes::SUBSTITUTION_TARGET_NOT_FOUND)
                .len(),
            1
        );
    }

    #[test]
    fn substituted_methods_contribute_no_edges() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let features = link.ty(app, "App.Features");
        let check = link.static_method(features, "Check");
        let heavy = link.static_method(features, "Heavy");
        link.calls(check, heavy);
        link.root_member(check);

        run(
            &mut link,
            r#"<linker><assembly fullname="App"><type fullname="App.Features">
                 <method name="Check" body="stub"/>
               </type></assembly></linker>"#,
        );
        link.mark().unwrap();
        assert!(link.marked(check));
        assert!(!link.marked(heavy));
    }

    #[test]
    fn resources_and_features() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let features = link.ty(app, "App.Features");
        let trace = link.static_method(features, "Trace");
        link.ctx
            .graph
            .symbol_mut(app)
            .as_module_mut()
            .unwrap()
            .resources
            .push(crate::graph::Resource {
                name: "Strings.resources".into(),
                content: String::new(),
            });
        link.ctx.set_feature("Tracing", true);

        run(
            &mut link,
            r#"<linker><assembly fullname="App">
                 <type fullname="App.Features" feature="Tracing" featurevalue="false">
                   <method name="Trace" body="remove"/>
                 </type>
                 <resource name="Strings.resources" action="remove"/>
               </assembly></linker>"#,
        );
        assert_eq!(link.ctx.annotations.method_action(trace), None);
        assert_eq!(link.ctx.annotations.resources_to_remove(app), &["Strings.resources".to_string()]);
    }
}
