//! Records why each symbol was marked and dumps the edges as XML.
//!
//! Tracing is off unless `--dump-dependencies` is given. The dump goes to
//! `linker-dependencies.xml.gz` in the output directory unless another file is configured; a
//! `.gz` suffix selects gzip compression.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, Event},
    Writer,
};
use strum::IntoStaticStr;

use crate::{
    graph::{SymbolGraph, SymbolId},
    Error, Result,
};

/// Default dump file name.
pub const DEFAULT_DEPENDENCIES_FILE: &str = "linker-dependencies.xml.gz";

/// Why a symbol was marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DependencyReason {
    /// Supplied as a root.
    Root,
    /// Kept by the assembly action.
    AssemblyAction,
    /// Carries the `Preserve` attribute.
    PreserveAttribute,
    /// Kept by a type's preserve mode.
    TypePreserve,
    /// Module or type containing a marked symbol.
    DeclaringType,
    /// Base type of a marked type.
    BaseType,
    /// Interface implemented by a marked type.
    Interface,
    /// Type of a field, property or event.
    MemberType,
    /// Return or parameter type of a method.
    Signature,
    /// Type or constructor of an applied custom attribute.
    CustomAttribute,
    /// Method overridden by a marked method.
    BaseMethod,
    /// Override of a marked virtual method.
    Override,
    /// Property or event owning a marked accessor.
    AccessorOwner,
    /// Referenced from a method body.
    BodyReference,
    /// Static constructor of a used type.
    StaticConstructor,
    /// Target of a `DynamicDependency`.
    DynamicDependency,
}

/// A recorded dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    /// The symbol the dependency comes from; `None` for roots.
    pub source: Option<SymbolId>,
    /// The marked symbol.
    pub target: SymbolId,
    /// Why the edge exists.
    pub reason: DependencyReason,
}

/// The dependency recorder.
#[derive(Debug, Default)]
pub struct Tracer {
    enabled: bool,
    file: Option<PathBuf>,
    edges: Vec<DependencyEdge>,
}

impl Tracer {
    /// Starts recording.
    pub fn start(&mut self) {
        self.enabled = true;
    }

    /// Returns true while recording.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Overrides the dump file.
    pub fn set_file(&mut self, file: impl Into<PathBuf>) {
        self.file = Some(file.into());
    }

    /// Records an edge when tracing is on.
    pub fn record(&mut self, source: Option<SymbolId>, target: SymbolId, reason: DependencyReason) {
        if self.enabled {
            self.edges.push(DependencyEdge {
                source,
                target,
                reason,
            });
        }
    }

    /// Returns the recorded edges in marking order.
    #[must_use]
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Writes the dump when tracing is on and returns the file written.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn finish(&self, graph: &SymbolGraph, output_directory: &Path) -> Result<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }

        let path = match &self.file {
            Some(file) if file.is_absolute() => file.clone(),
            Some(file) => output_directory.join(file),
            None => output_directory.join(DEFAULT_DEPENDENCIES_FILE),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let xml = self.to_xml(graph)?;
        let file = fs::File::create(&path)?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&xml)?;
            encoder.finish()?;
        } else {
            let mut file = file;
            file.write_all(&xml)?;
        }
        Ok(Some(path))
    }

    /// Serializes the recorded edges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Xml`] if the writer fails.
    pub fn to_xml(&self, graph: &SymbolGraph) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(write_error)?;
        writer
            .write_event(Event::Start(
                BytesStart::new("dependencies").with_attributes([("version", "1.1")]),
            ))
            .map_err(write_error)?;

        for edge in &self.edges {
            let target = graph.reference_to(edge.target).to_string();
            let reason: &'static str = edge.reason.into();
            let element = match edge.source {
                Some(source) => {
                    let source = graph.reference_to(source).to_string();
                    BytesStart::new("edge").with_attributes([
                        ("source", source.as_str()),
                        ("target", target.as_str()),
                        ("reason", reason),
                    ])
                }
                None => BytesStart::new("root")
                    .with_attributes([("target", target.as_str()), ("reason", reason)]),
            };
            writer.write_event(Event::Empty(element)).map_err(write_error)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("dependencies")))
            .map_err(write_error)?;
        Ok(writer.into_inner())
    }
}

fn write_error(error: impl std::fmt::Display) -> Error {
    Error::xml("dependencies", error)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;
    use crate::graph::{ModuleKind, SymbolFlags, TypeInfo, Visibility};

    fn graph() -> (SymbolGraph, SymbolId, SymbolId) {
        let mut graph = SymbolGraph::new();
        let module = graph.add_module("App", ModuleKind::Library).unwrap();
        let ty = graph
            .add_type(module, "Ns.A", Visibility::Public, SymbolFlags::empty(), TypeInfo::default())
            .unwrap();
        (graph, module, ty)
    }

    #[test]
    fn disabled_tracer_records_nothing() {
        let (graph, module, ty) = graph();
        let mut tracer = Tracer::default();
        tracer.record(Some(ty), module, DependencyReason::DeclaringType);
        assert!(tracer.edges().is_empty());
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(tracer.finish(&graph, dir.path()).unwrap(), None);
    }

    #[test]
    fn dump_is_gzipped_xml() {
        let (graph, module, ty) = graph();
        let mut tracer = Tracer::default();
        tracer.start();
        tracer.record(None, ty, DependencyReason::Root);
        tracer.record(Some(ty), module, DependencyReason::DeclaringType);

        let dir = tempfile::tempdir().unwrap();
        let path = tracer.finish(&graph, dir.path()).unwrap().unwrap();
        assert!(path.ends_with(DEFAULT_DEPENDENCIES_FILE));

        let mut text = String::new();
        GzDecoder::new(fs::File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.contains(r#"<root target="[App]Ns.A" reason="root"/>"#));
        assert!(text.contains(
            r#"<edge source="[App]Ns.A" target="[App]App" reason="declaring_type"/>"#
        ));
    }

    #[test]
    fn plain_dump_file() {
        let (graph, _, ty) = graph();
        let mut tracer = Tracer::default();
        tracer.start();
        tracer.set_file("deps.xml");
        tracer.record(None, ty, DependencyReason::Root);

        let dir = tempfile::tempdir().unwrap();
        let path = tracer.finish(&graph, dir.path()).unwrap().unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.starts_with("<?xml"));
        assert!(text.contains("<dependencies version=\"1.1\">"));
    }
}
