//! Writing the linked modules.
//!
//! [`OutputStep`] decides per assembly what reaches the output, and hands the bytes to an
//! [`OutputSink`]. The standard sink is a directory; [`MemorySink`] keeps the files in memory
//! for embedders and tests.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use log::{debug, info};
use sha1::{Digest, Sha1};

use crate::{
    graph::{ModuleDocument, SymbolId},
    linker::{actions::AssemblyAction, LinkContext, Step},
    Result,
};

use super::regenerate_guid::guid_from_digest;

/// Destination for output files.
pub trait OutputSink {
    /// Stores `data` under `file_name`, replacing an earlier file of that name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn write(&mut self, file_name: &str, data: &[u8]) -> Result<()>;
}

/// Writes files into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    /// Creates a sink writing into `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        DirectorySink {
            directory: directory.into(),
        }
    }

    /// The target directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl OutputSink for DirectorySink {
    fn write(&mut self, file_name: &str, data: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.directory)?;
        fs::write(self.directory.join(file_name), data)?;
        Ok(())
    }
}

/// Collects files in memory.
///
/// Clones share the same storage, so a clone kept by the caller sees what the step wrote.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: Rc<RefCell<BTreeMap<String, Vec<u8>>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the content written under `file_name`.
    #[must_use]
    pub fn get(&self, file_name: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(file_name).cloned()
    }

    /// Returns the written file names in sorted order.
    #[must_use]
    pub fn file_names(&self) -> Vec<String> {
        self.files.borrow().keys().cloned().collect()
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, file_name: &str, data: &[u8]) -> Result<()> {
        self.files
            .borrow_mut()
            .insert(file_name.to_string(), data.to_vec());
        Ok(())
    }
}

/// Writes every assembly that survived linking.
///
/// - `Link`, `Save` and `AddBypassNGen` assemblies are serialized from the graph
/// - `Copy` assemblies are copied byte for byte from the file they were loaded from
/// - `Skip` assemblies and assemblies swept as unused are not written
///
/// With [`LinkOptions::deterministic`](crate::linker::LinkOptions::deterministic) the MVID of
/// a serialized module is the SHA-1 of its content, so identical inputs give identical output.
#[derive(Default)]
pub struct OutputStep {
    sink: Option<Box<dyn OutputSink>>,
}

impl OutputStep {
    /// Creates a step writing to `sink`.
    pub fn new(sink: impl OutputSink + 'static) -> Self {
        OutputStep {
            sink: Some(Box::new(sink)),
        }
    }

    /// Creates a step writing to the context's output directory.
    #[must_use]
    pub fn to_output_directory() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for OutputStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStep")
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

impl Step for OutputStep {
    fn name(&self) -> &'static str {
        "OutputStep"
    }

    fn process(&mut self, ctx: &mut LinkContext) -> Result<()> {
        let sink = self.sink.get_or_insert_with(|| {
            Box::new(DirectorySink::new(ctx.options.output_directory.clone()))
        });

        let mut written = 0usize;
        for module in ctx.graph.modules().to_vec() {
            if ctx.graph.symbol(module).is_removed() {
                continue;
            }
            let assembly = ctx.graph.assembly_of(module).to_string();
            match ctx.action_of(module) {
                AssemblyAction::Skip => continue,
                AssemblyAction::Copy | AssemblyAction::CopyUsed => {
                    copy_module(ctx, module, sink.as_mut())?;
                }
                AssemblyAction::Link
                | AssemblyAction::Save
                | AssemblyAction::AddBypassNGen
                | AssemblyAction::AddBypassNGenUsed => {
                    let data = serialize_module(ctx, module)?;
                    sink.write(&format!("{assembly}.json"), data.as_bytes())?;
                }
            }
            debug!("Wrote '{assembly}'");
            written += 1;
        }
        info!("Wrote {written} assemblies");
        Ok(())
    }
}

fn copy_module(ctx: &LinkContext, module: SymbolId, sink: &mut dyn OutputSink) -> Result<()> {
    let info = ctx.graph.module_info(module);
    match &info.source_path {
        Some(path) => {
            let data = fs::read(path)?;
            let file_name = path.file_name().map_or_else(
                || format!("{}.json", info.assembly),
                |name| name.to_string_lossy().into_owned(),
            );
            sink.write(&file_name, &data)
        }
        None => {
            let data = ModuleDocument::from_graph(&ctx.graph, module).to_json()?;
            sink.write(&format!("{}.json", info.assembly), data.as_bytes())
        }
    }
}

fn serialize_module(ctx: &mut LinkContext, module: SymbolId) -> Result<String> {
    let mut document = ModuleDocument::from_graph(&ctx.graph, module);
    if !ctx.options.deterministic {
        return document.to_json();
    }

    document.mvid = None;
    let mvid = guid_from_digest(&Sha1::digest(document.to_json()?.as_bytes()));
    ctx.graph.set_mvid(module, mvid);
    document.mvid = Some(mvid.to_string());
    document.to_json()
}
