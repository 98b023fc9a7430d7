//! Assembly lookup across search directories and explicit reference files.

use std::path::{Path, PathBuf};

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    graph::{JsonModuleLoader, ModuleLoader, SymbolGraph, SymbolId},
    Error, Result,
};

/// Finds module files by assembly name and loads them into the graph.
///
/// Explicit reference files (`--reference`) win over search directories (`-d`), which are
/// probed in the order they were added. Each registered [`ModuleLoader`] contributes the file
/// extensions it understands; the first loader claiming a file's extension loads it.
pub struct AssemblyResolver {
    search_directories: Vec<PathBuf>,
    references: FxHashMap<String, PathBuf>,
    loaders: Vec<Box<dyn ModuleLoader>>,
    failed: FxHashSet<String>,
}

impl std::fmt::Debug for AssemblyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblyResolver")
            .field("search_directories", &self.search_directories)
            .field("references", &self.references)
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

impl Default for AssemblyResolver {
    fn default() -> Self {
        AssemblyResolver {
            search_directories: Vec::new(),
            references: FxHashMap::default(),
            loaders: vec![Box::new(JsonModuleLoader)],
            failed: FxHashSet::default(),
        }
    }
}

impl AssemblyResolver {
    /// Creates a resolver that understands JSON module documents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory to probe; duplicates are ignored.
    pub fn add_search_directory(&mut self, directory: impl Into<PathBuf>) {
        let directory = directory.into();
        if !self.search_directories.contains(&directory) {
            self.search_directories.push(directory);
        }
    }

    /// Returns the search directories in probe order.
    #[must_use]
    pub fn search_directories(&self) -> &[PathBuf] {
        &self.search_directories
    }

    /// Registers an explicit reference file, keyed by its file stem.
    pub fn add_reference(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            self.references.insert(stem.to_string(), path);
        }
    }

    /// Registers an additional module loader; it takes precedence over earlier ones.
    pub fn add_loader(&mut self, loader: Box<dyn ModuleLoader>) {
        self.loaders.insert(0, loader);
    }

    /// Returns the file that would be loaded for `assembly`.
    #[must_use]
    pub fn probe(&self, assembly: &str) -> Option<PathBuf> {
        if let Some(path) = self.references.get(assembly) {
            return Some(path.clone());
        }
        self.search_directories.iter().find_map(|directory| {
            self.loaders
                .iter()
                .find_map(|loader| loader.probe(directory, assembly))
        })
    }

    fn loader_for(&self, path: &Path) -> Option<&dyn ModuleLoader> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        self.loaders
            .iter()
            .find(|loader| {
                loader
                    .extensions()
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(extension))
            })
            .map(AsRef::as_ref)
    }

    /// Loads the module stored at `path`.
    ///
    /// Returns the new module and true, or an already loaded module of the same file stem and
    /// false.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no loader understands the file, or the loader's
    /// error.
    pub fn load_file(&self, path: &Path, graph: &mut SymbolGraph) -> Result<(SymbolId, bool)> {
        if let Some(existing) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|stem| graph.module(stem))
        {
            return Ok((existing, false));
        }

        let loader = self.loader_for(path).ok_or_else(|| {
            Error::Configuration(format!(
                "No module loader understands '{}'",
                path.display()
            ))
        })?;
        debug!("Loading module {}", path.display());
        let module = loader.load(path, graph)?;
        Ok((module, true))
    }

    /// Returns the module of `assembly`, loading it on first use.
    ///
    /// Returns `Ok(None)` when no file can be found; the failure is remembered so later
    /// lookups of the same name are cheap.
    ///
    /// # Errors
    ///
    /// Returns the loader's error if a file was found but could not be loaded.
    pub fn resolve(
        &mut self,
        assembly: &str,
        graph: &mut SymbolGraph,
    ) -> Result<Option<(SymbolId, bool)>> {
        if let Some(module) = graph.module(assembly) {
            return Ok(Some((module, false)));
        }
        if self.failed.contains(assembly) {
            return Ok(None);
        }

        match self.probe(assembly) {
            Some(path) => {
                let (module, loaded) = self.load_file(&path, graph)?;
                let name = &graph.module_info(module).assembly;
                if name != assembly {
                    return Err(malformed_error!(
                        "'{}' defines assembly '{}' instead of '{}'",
                        path.display(),
                        name,
                        assembly
                    ));
                }
                Ok(Some((module, loaded)))
            }
            None => {
                debug!("Could not find assembly '{assembly}'");
                self.failed.insert(assembly.to_string());
                Ok(None)
            }
        }
    }
}
