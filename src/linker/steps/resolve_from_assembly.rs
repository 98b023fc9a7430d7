//! Roots taken from an input assembly.

use std::path::PathBuf;

use log::debug;

use crate::{
    graph::{ModuleKind, SymbolKind},
    linker::{
        actions::{AssemblyAction, Root, RootVisibility, TypePreserve},
        diagnostics::codes,
        LinkContext, Step,
    },
    Result,
};

/// Loads an input assembly and roots it.
///
/// An executable roots its entry point and is linked. A library roots every type admitted by
/// the visibility filter, together with its admitted members; it is copied as a whole for
/// [`RootVisibility::Any`] and linked for [`RootVisibility::PublicAndFamily`]. An explicit
/// per-assembly action always wins over these defaults.
#[derive(Debug, Clone)]
pub struct ResolveFromAssemblyStep {
    file: PathBuf,
    visibility: RootVisibility,
}

impl ResolveFromAssemblyStep {
    /// Creates the step for `file`.
    pub fn new(file: impl Into<PathBuf>, visibility: RootVisibility) -> Self {
        ResolveFromAssemblyStep {
            file: file.into(),
            visibility,
        }
    }
}

impl Step for ResolveFromAssemblyStep {
    fn name(&self) -> &'static str {
        "ResolveFromAssemblyStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        if !self.file.is_file() {
            let what = self.file.display().to_string();
            return ctx.report_missing_root(codes::ROOT_ASSEMBLY_NOT_FOUND, &what, None);
        }

        let module = ctx.load_assembly_file(&self.file)?;
        let info = ctx.graph.module_info(module);
        let assembly = info.assembly.clone();
        let kind = info.kind;
        let entry_point = info.entry_point.clone();
        let explicit = ctx.actions.explicit(&assembly);

        match kind {
            ModuleKind::Executable => {
                ctx.actions
                    .set(&assembly, explicit.unwrap_or(AssemblyAction::Link));
                let Some(entry_point) = entry_point else {
                    return ctx.report_missing_root(
                        codes::ROOT_NOT_FOUND,
                        &format!("entry point of '{assembly}'"),
                        None,
                    );
                };
                match ctx.graph.find(&entry_point) {
                    Some(method) if ctx.graph.symbol(method).kind() == SymbolKind::Method => {
                        debug!("Rooting entry point {entry_point}");
                        ctx.add_root(Root::new(method));
                    }
                    _ => {
                        return ctx.report_missing_root(
                            codes::ROOT_NOT_FOUND,
                            &entry_point.to_string(),
                            None,
                        )
                    }
                }
            }
            ModuleKind::Library => {
                let default = match self.visibility {
                    RootVisibility::Any => AssemblyAction::Copy,
                    RootVisibility::PublicAndFamily => AssemblyAction::Link,
                };
                ctx.actions.set(&assembly, explicit.unwrap_or(default));

                let types: Vec<_> = ctx
                    .graph
                    .children(module)
                    .iter()
                    .copied()
                    .filter(|ty| self.visibility.admits(ctx.graph.symbol(*ty).visibility))
                    .collect();
                debug!("Rooting {} types of library '{assembly}'", types.len());
                for ty in types {
                    ctx.add_root(Root::with(ty, self.visibility, TypePreserve::All));
                }
            }
        }
        Ok(())
    }
}
