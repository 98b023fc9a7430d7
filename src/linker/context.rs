//! The shared state of one linking run.
//!
//! Every step receives `&mut LinkContext`. It owns the symbol graph, the per-assembly action
//! table, optimization flags, features, the diagnostic sink, the roots and every per-symbol
//! side table (mark state included). Nothing here is thread-safe; steps run one after another.

use std::{path::Path, path::PathBuf, rc::Rc};

use log::debug;
use rustc_hash::FxHashMap;

use crate::{
    graph::{SymbolGraph, SymbolId, SymbolKind, SymbolRef},
    linker::{
        actions::{ActionTable, AssemblyAction, Root},
        annotations::Annotations,
        attributes::{AttributeCache, LinkerAttributesInformation},
        diagnostics::{codes, Diagnostics, LinkerMessage, MessageOrigin},
        optimizations::{CodeOptimizations, OptimizationSet},
        pipeline::PipelineEdit,
        resolver::AssemblyResolver,
        tracer::Tracer,
    },
    Error, Result,
};

/// Whether unresolved references abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnresolvedPolicy {
    /// Unresolved roots (root assemblies, descriptor entries) are fatal.
    pub roots_fatal: bool,
    /// Unresolved dependency edges found while marking are fatal.
    pub edges_fatal: bool,
}

impl Default for UnresolvedPolicy {
    fn default() -> Self {
        UnresolvedPolicy {
            roots_fatal: true,
            edges_fatal: false,
        }
    }
}

impl UnresolvedPolicy {
    /// The policy selected by `--skip-unresolved`.
    #[must_use]
    pub fn skip(skip_unresolved: bool) -> Self {
        UnresolvedPolicy {
            roots_fatal: !skip_unresolved,
            edges_fatal: !skip_unresolved,
        }
    }
}

/// Run options consulted by individual steps.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Directory `OutputStep` writes to.
    pub output_directory: PathBuf,
    /// Derive module ids from content instead of regenerating them.
    pub deterministic: bool,
    /// Keep `DynamicDependency`/`PreserveDependency` attributes in the output.
    pub keep_dependency_attributes: bool,
    /// Keep custom attributes only when their type is otherwise used.
    pub used_attributes_only: bool,
    /// Remove embedded linker descriptors from linked modules.
    pub strip_resources: bool,
    /// Feature names whose `RemovableFeature` members are removed.
    pub excluded_features: Vec<String>,
    /// Unresolved reference handling.
    pub unresolved: UnresolvedPolicy,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions {
            output_directory: PathBuf::from("output"),
            deterministic: false,
            keep_dependency_attributes: false,
            used_attributes_only: false,
            strip_resources: true,
            excluded_features: Vec::new(),
            unresolved: UnresolvedPolicy::default(),
        }
    }
}

/// Outcome of resolving a [`SymbolRef`] during linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The definition.
    Found(SymbolId),
    /// The definition lives in a `Skip` assembly and must not be followed.
    Skipped,
    /// The assembly could not be found.
    MissingAssembly,
    /// The assembly exists but the type does not.
    MissingType,
    /// The type exists but the member does not.
    MissingMember,
}

impl Resolution {
    /// Returns the diagnostic code for an unresolved result.
    #[must_use]
    pub fn code(self) -> Option<u32> {
        match self {
            Resolution::MissingAssembly => Some(codes::UNRESOLVED_ASSEMBLY),
            Resolution::MissingType => Some(codes::UNRESOLVED_TYPE),
            Resolution::MissingMember => Some(codes::UNRESOLVED_MEMBER),
            Resolution::Found(_) | Resolution::Skipped => None,
        }
    }
}

/// Process-wide state for one linking run.
#[derive(Debug, Default)]
pub struct LinkContext {
    /// All loaded modules.
    pub graph: SymbolGraph,
    /// Assembly lookup.
    pub resolver: AssemblyResolver,
    /// Per-assembly actions.
    pub actions: ActionTable,
    /// Code optimizations.
    pub optimizations: OptimizationSet,
    /// Diagnostic sink.
    pub diagnostics: Diagnostics,
    /// Per-symbol linker state.
    pub annotations: Annotations,
    /// Linker attribute cache.
    pub attributes: AttributeCache,
    /// Dependency recorder.
    pub tracer: Tracer,
    /// Run options.
    pub options: LinkOptions,
    features: FxHashMap<String, bool>,
    custom_data: FxHashMap<String, String>,
    roots: Vec<Root>,
    pending_edits: Vec<PipelineEdit>,
    marking_complete: bool,
}

impl LinkContext {
    /// Creates a context with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a feature switch.
    pub fn set_feature(&mut self, name: &str, enabled: bool) {
        self.features.insert(name.to_string(), enabled);
    }

    /// Returns the value of a feature switch, `None` when it was never set.
    #[must_use]
    pub fn feature(&self, name: &str) -> Option<bool> {
        self.features.get(name).copied()
    }

    /// Sets a custom key/value pair.
    pub fn set_custom_data(&mut self, key: &str, value: &str) {
        self.custom_data.insert(key.to_string(), value.to_string());
    }

    /// Returns a custom value.
    #[must_use]
    pub fn custom_data(&self, key: &str) -> Option<&str> {
        self.custom_data.get(key).map(String::as_str)
    }

    /// Adds a root for the next marking pass.
    pub fn add_root(&mut self, root: Root) {
        self.roots.push(root);
    }

    /// Returns the roots in the order they were added.
    #[must_use]
    pub fn roots(&self) -> &[Root] {
        &self.roots
    }

    /// Queues a pipeline change; it is applied when the running step returns.
    pub fn queue_pipeline_edit(&mut self, edit: PipelineEdit) {
        self.pending_edits.push(edit);
    }

    pub(crate) fn take_pipeline_edits(&mut self) -> Vec<PipelineEdit> {
        std::mem::take(&mut self.pending_edits)
    }

    /// Returns true once a mark pass reached its fixpoint.
    #[must_use]
    pub fn is_marking_complete(&self) -> bool {
        self.marking_complete
    }

    pub(crate) fn set_marking_complete(&mut self, complete: bool) {
        self.marking_complete = complete;
    }

    /// Returns the action in force for the assembly `id` belongs to.
    #[must_use]
    pub fn action_of(&self, id: SymbolId) -> AssemblyAction {
        self.actions.get(self.graph.assembly_of(id))
    }

    /// Returns true if `opt` is enabled for the assembly `id` belongs to.
    #[must_use]
    pub fn is_optimization_enabled(&self, opt: CodeOptimizations, id: SymbolId) -> bool {
        self.optimizations.is_enabled(opt, self.graph.assembly_of(id))
    }

    /// Returns the linker attributes of `id`, building them on first use.
    pub fn attributes_of(&self, id: SymbolId) -> Rc<LinkerAttributesInformation> {
        self.attributes.get(&self.graph, &self.diagnostics, id)
    }

    /// Loads a module file and fixes its action.
    ///
    /// # Errors
    ///
    /// Returns the loader's error.
    pub fn load_assembly_file(&mut self, path: &Path) -> Result<SymbolId> {
        let (module, loaded) = self.resolver.load_file(path, &mut self.graph)?;
        if loaded {
            self.on_loaded(module);
        }
        Ok(module)
    }

    /// Returns the module of `assembly`, loading it through the resolver on first use.
    ///
    /// # Errors
    ///
    /// Returns the loader's error if a file was found but is invalid.
    pub fn resolve_assembly(&mut self, assembly: &str) -> Result<Option<SymbolId>> {
        match self.resolver.resolve(assembly, &mut self.graph)? {
            Some((module, loaded)) => {
                if loaded {
                    self.on_loaded(module);
                }
                Ok(Some(module))
            }
            None => Ok(None),
        }
    }

    fn on_loaded(&mut self, module: SymbolId) {
        let assembly = self.graph.module_info(module).assembly.clone();
        let action = self.actions.assign(&assembly);
        debug!("Loaded assembly '{assembly}' with action {action}");
    }

    /// Resolves a reference to a definition, loading its assembly if needed.
    ///
    /// # Errors
    ///
    /// Returns the loader's error if the assembly file is invalid.
    pub fn resolve(&mut self, reference: &SymbolRef) -> Result<Resolution> {
        let Some(module) = self.resolve_assembly(&reference.assembly)? else {
            return Ok(Resolution::MissingAssembly);
        };
        if self.action_of(module) == AssemblyAction::Skip {
            return Ok(Resolution::Skipped);
        }
        if let Some(id) = self.graph.find(reference) {
            return Ok(Resolution::Found(id));
        }
        if reference.member_name().is_some() {
            let declaring = SymbolRef::new(reference.assembly.clone(), reference.type_name());
            if self
                .graph
                .find(&declaring)
                .is_some_and(|id| self.graph.symbol(id).kind() == SymbolKind::Type)
            {
                return Ok(Resolution::MissingMember);
            }
        }
        Ok(Resolution::MissingType)
    }

    /// Reports a reference found while marking that could not be resolved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unresolved`] when unresolved edges are fatal.
    pub fn report_unresolved(
        &self,
        reference: &SymbolRef,
        resolution: Resolution,
        origin: &MessageOrigin,
    ) -> Result<()> {
        let Some(code) = resolution.code() else {
            return Ok(());
        };
        if self.options.unresolved.edges_fatal {
            return Err(Error::Unresolved(reference.to_string()));
        }

        let text = match resolution {
            Resolution::MissingAssembly => {
                format!("Could not resolve assembly '{}'", reference.assembly)
            }
            Resolution::MissingType => format!(
                "Could not resolve type '{}' in assembly '{}'",
                reference.type_name(),
                reference.assembly
            ),
            _ => format!("Could not resolve member '{reference}'"),
        };
        self.diagnostics.report(
            LinkerMessage::warning(code, text).with_origin(origin.render(&self.graph)),
        );
        Ok(())
    }

    /// Reports a root (root assembly or descriptor entry) that could not be found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unresolved`] when unresolved roots are fatal.
    pub fn report_missing_root(&self, code: u32, what: &str, origin: Option<String>) -> Result<()> {
        if self.options.unresolved.roots_fatal {
            return Err(Error::Unresolved(what.to_string()));
        }
        self.diagnostics.report(
            LinkerMessage::warning(code, format!("Could not find '{what}'")).with_origin(origin),
        );
        Ok(())
    }

    /// Reports a warning at `origin`.
    pub fn warn(&self, code: u32, text: impl Into<String>, origin: &MessageOrigin) {
        self.diagnostics
            .report(LinkerMessage::warning(code, text).with_origin(origin.render(&self.graph)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ModuleKind, SymbolFlags, TypeInfo, Visibility};

    #[test]
    fn features_and_custom_data() {
        let mut ctx = LinkContext::new();
        assert_eq!(ctx.feature("System.Globalization.Invariant"), None);
        ctx.set_feature("System.Globalization.Invariant", true);
        ctx.set_custom_data("TargetFramework", "net8.0");
        assert_eq!(ctx.feature("System.Globalization.Invariant"), Some(true));
        assert_eq!(ctx.custom_data("TargetFramework"), Some("net8.0"));
        assert_eq!(ctx.options.output_directory, PathBuf::from("output"));
    }

    #[test]
    fn resolution_outcomes() {
        let mut ctx = LinkContext::new();
        let app = ctx.graph.add_module("App", ModuleKind::Library).unwrap();
        ctx.graph
            .add_type(app, "Ns.A", Visibility::Public, SymbolFlags::empty(), TypeInfo::default())
            .unwrap();
        let utils = ctx.graph.add_module("Utils", ModuleKind::Library).unwrap();
        ctx.actions.set("App", AssemblyAction::Link);
        ctx.actions.set("Utils", AssemblyAction::Skip);

        assert!(matches!(
            ctx.resolve(&SymbolRef::new("App", "Ns.A")).unwrap(),
            Resolution::Found(_)
        ));
        assert_eq!(
            ctx.resolve(&SymbolRef::new("App", "Ns.A::Missing")).unwrap(),
            Resolution::MissingMember
        );
        assert_eq!(
            ctx.resolve(&SymbolRef::new("App", "Ns.B::Run")).unwrap(),
            Resolution::MissingType
        );
        assert_eq!(
            ctx.resolve(&SymbolRef::new("Nowhere", "Ns.B")).unwrap(),
            Resolution::MissingAssembly
        );
        assert_eq!(
            ctx.resolve(&SymbolRef::new("Utils", "Ns.Z")).unwrap(),
            Resolution::Skipped
        );
        assert_eq!(ctx.action_of(utils), AssemblyAction::Skip);
    }

    #[test]
    fn unresolved_policy() {
        let mut ctx = LinkContext::new();
        let reference = SymbolRef::new("Nowhere", "Ns.B");
        ctx.report_unresolved(&reference, Resolution::MissingAssembly, &MessageOrigin::default())
            .unwrap();
        assert_eq!(ctx.diagnostics.with_code(codes::UNRESOLVED_ASSEMBLY).len(), 1);
        assert!(ctx
            .report_missing_root(codes::ROOT_ASSEMBLY_NOT_FOUND, "App.json", None)
            .is_err());

        ctx.options.unresolved = UnresolvedPolicy::skip(false);
        assert!(matches!(
            ctx.report_unresolved(&reference, Resolution::MissingAssembly, &MessageOrigin::default()),
            Err(Error::Unresolved(_))
        ));

        ctx.options.unresolved = UnresolvedPolicy::skip(true);
        ctx.report_missing_root(codes::ROOT_ASSEMBLY_NOT_FOUND, "App.json", None)
            .unwrap();
    }
}
