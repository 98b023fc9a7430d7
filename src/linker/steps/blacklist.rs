use log::debug;

use crate::{
    graph::Resource,
    linker::{
        actions::AssemblyAction,
        descriptor::{
            DescriptorSource, EMBEDDED_DESCRIPTORS, EMBEDDED_LINK_ATTRIBUTES,
            EMBEDDED_SUBSTITUTIONS,
        },
        steps::{BodySubstituterStep, LinkAttributesStep, ResolveFromXmlStep},
        LinkContext, PipelineEdit, Step,
    },
    Result,
};

/// Schedules the linker documents embedded in the loaded assemblies.
///
/// Every assembly that is not skipped may embed root descriptors, substitutions and attribute
/// definitions. Each one becomes its own step, inserted right after this one in module order,
/// so they all run before marking.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlacklistStep;

impl Step for BlacklistStep {
    fn name(&self) -> &'static str {
        "BlacklistStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        let mut steps: Vec<Box<dyn Step>> = Vec::new();
        for module in ctx.graph.modules() {
            if ctx.action_of(*module) == AssemblyAction::Skip {
                continue;
            }
            let info = ctx.graph.module_info(*module);
            for resource in &info.resources {
                let source = DescriptorSource::embedded(&info.assembly, resource);
                let step: Box<dyn Step> = match resource.name.as_str() {
                    EMBEDDED_DESCRIPTORS => Box::new(ResolveFromXmlStep::new(source)),
                    EMBEDDED_SUBSTITUTIONS => Box::new(BodySubstituterStep::new(source)),
                    EMBEDDED_LINK_ATTRIBUTES => Box::new(LinkAttributesStep::new(source)),
                    _ => continue,
                };
                debug!("Scheduling {} for {}", step.name(), source_name(resource, &info.assembly));
                steps.push(step);
            }
        }

        // Each insertion lands right after this step, so queue them back to front.
        for step in steps.into_iter().rev() {
            ctx.queue_pipeline_edit(PipelineEdit::AddAfter(self.name().to_string(), step));
        }
        Ok(())
    }
}

fn source_name(resource: &Resource, assembly: &str) -> String {
    format!("'{}' in '{assembly}'", resource.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::SymbolId,
        linker::{steps::MarkStep, Pipeline},
        test::TestLink,
    };

    fn embed(link: &mut TestLink, module: SymbolId, name: &str, content: &str) {
        link.ctx
            .graph
            .symbol_mut(module)
            .as_module_mut()
            .unwrap()
            .resources
            .push(Resource {
                name: name.into(),
                content: content.into(),
            });
    }

    #[test]
    fn embedded_documents_run_after_blacklist() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let skipped = link.module("Skipped", AssemblyAction::Skip);
        let kept = link.ty(app, "App.Kept");
        embed(
            &mut link,
            app,
            EMBEDDED_DESCRIPTORS,
            r#"<linker><assembly fullname="App"><type fullname="App.Kept"/></assembly></linker>"#,
        );
        embed(&mut link, app, EMBEDDED_SUBSTITUTIONS, "<linker/>");
        embed(&mut link, skipped, EMBEDDED_DESCRIPTORS, "<linker/>");

        let mut pipeline = Pipeline::new();
        pipeline.append_step(Box::new(BlacklistStep)).unwrap();
        pipeline.append_step(Box::new(MarkStep)).unwrap();
        pipeline.process(&mut link.ctx).unwrap();

        assert_eq!(
            pipeline.step_names(),
            vec!["BlacklistStep", "ResolveFromXmlStep", "BodySubstituterStep", "MarkStep"]
        );
        assert!(link.marked(kept));
    }

    #[test]
    fn descriptors_only_apply_to_their_assembly() {
        let mut link = TestLink::new();
        let app = link.module("App", AssemblyAction::Link);
        let other = link.module("Other", AssemblyAction::Link);
        let foreign = link.ty(other, "Other.Type");
        embed(
            &mut link,
            app,
            EMBEDDED_DESCRIPTORS,
            r#"<linker><assembly fullname="Other"><type fullname="Other.Type"/></assembly></linker>"#,
        );

        let mut pipeline = Pipeline::new();
        pipeline.append_step(Box::new(BlacklistStep)).unwrap();
        pipeline.append_step(Box::new(MarkStep)).unwrap();
        pipeline.process(&mut link.ctx).unwrap();
        assert!(!link.marked(foreign));
    }
}
