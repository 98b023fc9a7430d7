use std::collections::VecDeque;

use log::debug;
use rustc_hash::FxHashSet;

use crate::{
    graph::{SymbolId, SymbolRef},
    linker::{context::Resolution, diagnostics::MessageOrigin, LinkContext, Step},
    Result,
};

/// Loads every assembly transitively referenced by the loaded ones.
///
/// A reference that cannot be found is an unresolved edge: a warning by default, an error
/// when unresolved references are fatal.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadReferencesStep;

impl Step for LoadReferencesStep {
    fn name(&self) -> &'static str {
        "LoadReferencesStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        let mut pending: VecDeque<SymbolId> = ctx.graph.modules().iter().copied().collect();
        let mut seen: FxHashSet<SymbolId> = pending.iter().copied().collect();
        let mut missing: FxHashSet<String> = FxHashSet::default();

        while let Some(module) = pending.pop_front() {
            let references = ctx.graph.module_info(module).references.clone();
            for assembly in references {
                match ctx.resolve_assembly(&assembly)? {
                    Some(referenced) => {
                        if seen.insert(referenced) {
                            debug!(
                                "Loaded '{assembly}' referenced by '{}'",
                                ctx.graph.assembly_of(module)
                            );
                            pending.push_back(referenced);
                        }
                    }
                    None if missing.insert(assembly.clone()) => {
                        ctx.report_unresolved(
                            &SymbolRef::new(assembly, String::new()),
                            Resolution::MissingAssembly,
                            &MessageOrigin::from_member(module, None),
                        )?;
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::linker::{diagnostics::codes, AssemblyAction};

    #[test]
    fn loads_transitively() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("App.json"),
            r#"{ "assembly": "App", "references": ["Utils", "Missing"] }"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("Utils.json"),
            r#"{ "assembly": "Utils", "references": ["Core"] }"#,
        )
        .unwrap();
        fs::write(dir.path().join("Core.json"), r#"{ "assembly": "Core" }"#).unwrap();

        let mut ctx = LinkContext::new();
        ctx.actions.user_action = AssemblyAction::CopyUsed;
        ctx.resolver.add_search_directory(dir.path());
        ctx.load_assembly_file(&dir.path().join("App.json")).unwrap();

        LoadReferencesStep.process(&mut ctx).unwrap();
        assert!(ctx.graph.module("Utils").is_some());
        assert!(ctx.graph.module("Core").is_some());
        assert_eq!(ctx.actions.get("Core"), AssemblyAction::CopyUsed);
        assert_eq!(ctx.diagnostics.with_code(codes::UNRESOLVED_ASSEMBLY).len(), 1);

        ctx.options.unresolved.edges_fatal = true;
        fs::write(dir.path().join("Extra.json"), r#"{ "assembly": "Extra", "references": ["Gone"] }"#)
            .unwrap();
        ctx.load_assembly_file(&dir.path().join("Extra.json")).unwrap();
        assert!(LoadReferencesStep.process(&mut ctx).is_err());
    }
}
