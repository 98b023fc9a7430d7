//! Turning a link configuration into a context and a pipeline, and running it.
//!
//! [`DriverOptions`] is the typed form of the command line. [`Driver`] applies it to a fresh
//! [`LinkContext`], builds the standard pipeline and adjusts it the way the options ask:
//!
//! ```text
//! ResolveFromAssemblyStep*   (-a, -r)
//! ResolveFromXmlStep*        (-x)
//! LoadReferencesStep
//! BlacklistStep              (unless --ignore-descriptors)
//! LinkAttributesStep*        (--attribute-defs)
//! PreserveDependencyLookupStep
//! TypeMapStep
//! BodySubstituterStep*       (--substitutions)
//! RemoveSecurityStep         (--strip-security)
//! RemoveFeaturesStep         (--exclude-feature)
//! RemoveUnreachableBlocksStep
//! MarkStep
//! SweepStep
//! AddBypassNGenStep          (when an action needs it)
//! CodeRewriterStep
//! CleanStep
//! RegenerateGuidStep         (unless --deterministic or --new-mvid false)
//! ClearInitLocalsStep
//! SealerStep
//! OutputStep
//! ```
//!
//! Custom steps (`--custom-step`) are created through a [`StepRegistry`] and placed last.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::info;
use rustc_hash::FxHashMap;

use crate::{
    linker::{
        steps::{
            AddBypassNGenStep, BlacklistStep, BodySubstituterStep, CleanStep, ClearInitLocalsStep,
            CodeRewriterStep, LinkAttributesStep, LoadReferencesStep, MarkStep, OutputStep,
            PreserveDependencyLookupStep, RegenerateGuidStep, RemoveFeaturesStep,
            RemoveSecurityStep, RemoveUnreachableBlocksStep, ResolveFromAssemblyStep,
            ResolveFromXmlStep, SealerStep, SweepStep, TypeMapStep,
        },
        AssemblyAction, CodeOptimizations, DescriptorSource, LinkContext, Pipeline,
        RootVisibility, Step, UnresolvedPolicy,
    },
    Error, Result,
};

/// Response files may include other response files up to this depth.
const MAX_RESPONSE_FILE_DEPTH: usize = 8;

/// Options whose value is a file path that may itself start with `@`.
const FILE_LIST_OPTIONS: [&str; 3] = ["-a", "-r", "-x"];

/// Creates a step instance.
pub type StepFactory = Box<dyn Fn() -> Box<dyn Step>>;

/// Step constructors addressable by name, grouped by provider.
///
/// Built-in steps live in the unnamed provider. Embedders register their own steps under a
/// provider name, which `--custom-step TYPE,PROVIDER` selects.
#[derive(Default)]
pub struct StepRegistry {
    providers: FxHashMap<String, FxHashMap<String, StepFactory>>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .providers
            .iter()
            .flat_map(|(provider, steps)| {
                steps.keys().map(move |name| {
                    if provider.is_empty() {
                        name.clone()
                    } else {
                        format!("{name},{provider}")
                    }
                })
            })
            .collect();
        names.sort();
        f.debug_struct("StepRegistry").field("steps", &names).finish()
    }
}

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in step that needs no arguments.
    #[must_use]
    pub fn with_builtin_steps() -> Self {
        let mut registry = Self::new();
        registry.register(None, "LoadReferencesStep", || Box::new(LoadReferencesStep));
        registry.register(None, "BlacklistStep", || Box::new(BlacklistStep));
        registry.register(None, "PreserveDependencyLookupStep", || {
            Box::new(PreserveDependencyLookupStep)
        });
        registry.register(None, "TypeMapStep", || Box::new(TypeMapStep));
        registry.register(None, "RemoveSecurityStep", || Box::new(RemoveSecurityStep));
        registry.register(None, "RemoveFeaturesStep", || Box::new(RemoveFeaturesStep));
        registry.register(None, "RemoveUnreachableBlocksStep", || {
            Box::new(RemoveUnreachableBlocksStep)
        });
        registry.register(None, "MarkStep", || Box::new(MarkStep));
        registry.register(None, "SweepStep", || Box::new(SweepStep));
        registry.register(None, "AddBypassNGenStep", || Box::new(AddBypassNGenStep));
        registry.register(None, "CodeRewriterStep", || Box::new(CodeRewriterStep));
        registry.register(None, "CleanStep", || Box::new(CleanStep));
        registry.register(None, "RegenerateGuidStep", || Box::new(RegenerateGuidStep));
        registry.register(None, "ClearInitLocalsStep", || Box::new(ClearInitLocalsStep));
        registry.register(None, "SealerStep", || Box::new(SealerStep::new()));
        registry.register(None, "OutputStep", || {
            Box::new(OutputStep::to_output_directory())
        });
        registry
    }

    /// Registers `factory` as `name` in `provider` (`None` for the unnamed provider).
    ///
    /// A later registration of the same name replaces the earlier one.
    pub fn register<F>(&mut self, provider: Option<&str>, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Step> + 'static,
    {
        self.providers
            .entry(provider.unwrap_or_default().to_string())
            .or_default()
            .insert(name.to_string(), Box::new(factory));
    }

    /// Returns true if `name` can be created from `provider`.
    #[must_use]
    pub fn contains(&self, provider: Option<&str>, name: &str) -> bool {
        self.providers
            .get(provider.unwrap_or_default())
            .is_some_and(|steps| steps.contains_key(name))
    }

    /// Creates a new instance of step `name` from `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the provider or the step is unknown.
    pub fn create(&self, provider: Option<&str>, name: &str) -> Result<Box<dyn Step>> {
        let steps = self.providers.get(provider.unwrap_or_default()).ok_or_else(|| {
            Error::Configuration(format!(
                "Step provider '{}' is not registered",
                provider.unwrap_or_default()
            ))
        })?;
        let factory = steps.get(name).ok_or_else(|| match provider {
            Some(provider) => Error::Configuration(format!(
                "Step '{name}' could not be found in provider '{provider}'"
            )),
            None => Error::Configuration(format!("Step '{name}' could not be found")),
        })?;
        Ok(factory())
    }
}

/// Where a custom step goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomStepPosition {
    /// At the end of the pipeline.
    Append,
    /// Right before the named step.
    Before(String),
    /// Right after the named step.
    After(String),
}

/// A parsed `--custom-step` value: `TYPE[,PROVIDER]` or `(+|-)STEP:TYPE[,PROVIDER]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomStep {
    /// Placement in the pipeline.
    pub position: CustomStepPosition,
    /// Registered step name.
    pub step: String,
    /// Provider the step is registered in.
    pub provider: Option<String>,
}

impl FromStr for CustomStep {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || Error::Configuration(format!("Invalid custom step '{value}'"));

        let (config, provider) = match value.split_once(',') {
            Some((config, provider)) if !provider.trim().is_empty() => {
                (config, Some(provider.trim().to_string()))
            }
            Some(_) => return Err(invalid()),
            None => (value, None),
        };

        let (position, step) = match config.split_once(':') {
            None => (CustomStepPosition::Append, config),
            Some((anchor, step)) => {
                if step.contains(':') {
                    return Err(invalid());
                }
                let position = match (anchor.strip_prefix('+'), anchor.strip_prefix('-')) {
                    (Some(after), _) if !after.is_empty() => {
                        CustomStepPosition::After(after.to_string())
                    }
                    (_, Some(before)) if !before.is_empty() => {
                        CustomStepPosition::Before(before.to_string())
                    }
                    _ => {
                        return Err(Error::Configuration(format!(
                            "Expected '+' or '-' to control the insertion of '{value}'"
                        )))
                    }
                };
                (position, step)
            }
        };

        let step = step.trim();
        if step.is_empty() {
            return Err(invalid());
        }
        Ok(CustomStep {
            position,
            step: step.to_string(),
            provider,
        })
    }
}

/// Everything a link run can be configured with.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Input assemblies with the visibility their API is rooted with (`-a`, `-r`), in
    /// command-line order.
    pub assemblies: Vec<(PathBuf, RootVisibility)>,
    /// XML descriptors (`-x`).
    pub descriptors: Vec<PathBuf>,
    /// Directories searched for referenced assemblies (`-d`).
    pub search_directories: Vec<PathBuf>,
    /// Reference-only assembly files (`--reference`).
    pub references: Vec<PathBuf>,
    /// Output directory (`-o`).
    pub output_directory: PathBuf,
    /// Action for framework assemblies (`-c`).
    pub core_action: AssemblyAction,
    /// Action for other assemblies (`-u`).
    pub user_action: AssemblyAction,
    /// Per-assembly actions, later entries win (`-p`).
    pub assembly_actions: Vec<(AssemblyAction, String)>,
    /// Optimization switches in command-line order: flag, assembly scope, enabled.
    pub optimizations: Vec<(CodeOptimizations, Option<String>, bool)>,
    /// Feature switches (`--feature`).
    pub features: Vec<(String, bool)>,
    /// Free-form key/value data for custom steps (`--custom-data`).
    pub custom_data: Vec<(String, String)>,
    /// Custom steps (`--custom-step`).
    pub custom_steps: Vec<CustomStep>,
    /// Substitution files (`--substitutions`).
    pub substitutions: Vec<PathBuf>,
    /// Attribute definition files (`--attribute-defs`).
    pub attribute_definitions: Vec<PathBuf>,
    /// Features whose `RemovableFeature` code is removed (`--exclude-feature`).
    pub excluded_features: Vec<String>,
    /// `--skip-unresolved`; unset keeps the default policy.
    pub skip_unresolved: Option<bool>,
    /// Do not process embedded descriptors (`--ignore-descriptors`).
    pub ignore_descriptors: bool,
    /// Remove security declarations (`--strip-security`).
    pub strip_security: bool,
    /// Remove embedded linker descriptors (`--strip-resources`).
    pub strip_resources: bool,
    /// Keep dependency attributes (`--keep-dep-attributes`).
    pub keep_dependency_attributes: bool,
    /// Keep only attributes whose type is used (`--used-attrs-only`).
    pub used_attributes_only: bool,
    /// `--deterministic`; unset means off.
    pub deterministic: Option<bool>,
    /// `--new-mvid`; unset means on.
    pub new_mvid: Option<bool>,
    /// Record dependencies (`--dump-dependencies`).
    pub dump_dependencies: bool,
    /// Dependency dump location (`--dependencies-file`).
    pub dependencies_file: Option<PathBuf>,
    /// Promote every warning to an error (`--warnaserror` without codes).
    pub warn_as_error: bool,
    /// Warning codes promoted to errors (`--warnaserror CODES`).
    pub warn_as_error_codes: Vec<u32>,
    /// Suppressed warning codes (`--nowarn`).
    pub no_warn: Vec<u32>,
    /// Keep verbose diagnostics (`--verbose`).
    pub verbose: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            assemblies: Vec::new(),
            descriptors: Vec::new(),
            search_directories: Vec::new(),
            references: Vec::new(),
            output_directory: PathBuf::from("output"),
            core_action: AssemblyAction::Link,
            user_action: AssemblyAction::Link,
            assembly_actions: Vec::new(),
            optimizations: Vec::new(),
            features: Vec::new(),
            custom_data: Vec::new(),
            custom_steps: Vec::new(),
            substitutions: Vec::new(),
            attribute_definitions: Vec::new(),
            excluded_features: Vec::new(),
            skip_unresolved: None,
            ignore_descriptors: false,
            strip_security: true,
            strip_resources: true,
            keep_dependency_attributes: false,
            used_attributes_only: false,
            deterministic: None,
            new_mvid: None,
            dump_dependencies: false,
            dependencies_file: None,
            warn_as_error: false,
            warn_as_error_codes: Vec::new(),
            no_warn: Vec::new(),
            verbose: false,
        }
    }
}

/// Runs a link from [`DriverOptions`].
#[derive(Debug)]
pub struct Driver {
    options: DriverOptions,
    registry: StepRegistry,
}

impl Driver {
    /// Creates a driver that knows the built-in steps.
    #[must_use]
    pub fn new(options: DriverOptions) -> Self {
        Self::with_registry(options, StepRegistry::with_builtin_steps())
    }

    /// Creates a driver resolving custom steps through `registry`.
    #[must_use]
    pub fn with_registry(options: DriverOptions, registry: StepRegistry) -> Self {
        Driver { options, registry }
    }

    /// The configured options.
    #[must_use]
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// The registry used for custom steps, for registering more of them.
    pub fn registry_mut(&mut self) -> &mut StepRegistry {
        &mut self.registry
    }

    /// Checks the options for contradictions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when there is nothing to link or when both
    /// `--new-mvid` and `--deterministic` were given.
    pub fn validate(&self) -> Result<()> {
        if self.options.assemblies.is_empty() && self.options.descriptors.is_empty() {
            return Err(Error::Configuration("No input files were specified".to_string()));
        }
        if self.options.new_mvid.is_some() && self.options.deterministic.is_some() {
            return Err(Error::Configuration(
                "Options '--new-mvid' and '--deterministic' cannot be used at the same time"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Creates a context configured by the options.
    #[must_use]
    pub fn create_context(&self) -> LinkContext {
        let options = &self.options;
        let mut ctx = LinkContext::new();

        ctx.actions.core_action = options.core_action;
        ctx.actions.user_action = options.user_action;
        for (action, assembly) in &options.assembly_actions {
            ctx.actions.set_override(assembly, *action);
        }

        for directory in &options.search_directories {
            ctx.resolver.add_search_directory(directory.clone());
        }
        for reference in &options.references {
            ctx.resolver.add_reference(reference.clone());
        }

        for (opt, assembly, enabled) in &options.optimizations {
            if *enabled {
                ctx.optimizations.enable(*opt, assembly.as_deref());
            } else {
                ctx.optimizations.disable(*opt, assembly.as_deref());
            }
        }
        for (name, enabled) in &options.features {
            ctx.set_feature(name, *enabled);
        }
        for (key, value) in &options.custom_data {
            ctx.set_custom_data(key, value);
        }

        ctx.options.output_directory.clone_from(&options.output_directory);
        ctx.options.deterministic = options.deterministic.unwrap_or(false);
        ctx.options.keep_dependency_attributes = options.keep_dependency_attributes;
        ctx.options.used_attributes_only = options.used_attributes_only;
        ctx.options.strip_resources = options.strip_resources;
        ctx.options.excluded_features.clone_from(&options.excluded_features);
        ctx.options.unresolved = options
            .skip_unresolved
            .map(UnresolvedPolicy::skip)
            .unwrap_or_default();

        ctx.diagnostics.set_warn_as_error(options.warn_as_error);
        ctx.diagnostics
            .add_warn_as_error_codes(options.warn_as_error_codes.iter().copied());
        ctx.diagnostics.add_no_warn(options.no_warn.iter().copied());
        ctx.diagnostics.set_verbose(options.verbose);

        if options.dump_dependencies {
            ctx.tracer.start();
            if let Some(file) = &options.dependencies_file {
                ctx.tracer.set_file(file.clone());
            }
        }
        ctx
    }

    /// Builds the pipeline for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for invalid options, unreadable list or descriptor
    /// files and unknown custom steps, and [`Error::StepNotFound`] when a custom step is
    /// anchored to a step that is not in the pipeline.
    pub fn create_pipeline(&self, ctx: &LinkContext) -> Result<Pipeline> {
        self.validate()?;
        let options = &self.options;
        let mut pipeline = standard_pipeline()?;

        // Root inputs run first: assemblies, then descriptors, each in command-line order
        for (file, visibility) in &options.assemblies {
            for path in expand_file_list(file)? {
                pipeline.add_step_before(
                    "LoadReferencesStep",
                    Box::new(ResolveFromAssemblyStep::new(path, *visibility)),
                )?;
            }
        }
        for file in &options.descriptors {
            for path in expand_file_list(file)? {
                let source = DescriptorSource::from_file(&path)?;
                pipeline.add_step_before(
                    "LoadReferencesStep",
                    Box::new(ResolveFromXmlStep::new(source)),
                )?;
            }
        }

        for file in &options.attribute_definitions {
            let source = DescriptorSource::from_file(file)?;
            pipeline.add_step_before(
                "PreserveDependencyLookupStep",
                Box::new(LinkAttributesStep::new(source)),
            )?;
        }
        for file in &options.substitutions {
            let source = DescriptorSource::from_file(file)?;
            pipeline.add_step_before("MarkStep", Box::new(BodySubstituterStep::new(source)))?;
        }

        if options.ignore_descriptors {
            pipeline.remove_step("BlacklistStep")?;
        }
        if options.deterministic == Some(true) || options.new_mvid == Some(false) {
            pipeline.remove_step("RegenerateGuidStep")?;
        }
        if ctx.actions.needs_bypass_ngen() {
            pipeline.add_step_after("SweepStep", Box::new(AddBypassNGenStep))?;
        }
        if options.strip_security {
            pipeline.add_step_before("MarkStep", Box::new(RemoveSecurityStep))?;
        }
        if !options.excluded_features.is_empty() {
            pipeline.add_step_before("MarkStep", Box::new(RemoveFeaturesStep))?;
        }
        pipeline.add_step_before("MarkStep", Box::new(RemoveUnreachableBlocksStep))?;
        pipeline.add_step_before("OutputStep", Box::new(ClearInitLocalsStep))?;
        pipeline.add_step_before("OutputStep", Box::new(SealerStep::new()))?;

        for custom in &options.custom_steps {
            let step = self.registry.create(custom.provider.as_deref(), &custom.step)?;
            match &custom.position {
                CustomStepPosition::Append => pipeline.append_step(step)?,
                CustomStepPosition::Before(target) => pipeline.add_step_before(target, step)?,
                CustomStepPosition::After(target) => pipeline.add_step_after(target, step)?,
            }
        }
        Ok(pipeline)
    }

    /// Creates a context, links into it and returns it.
    ///
    /// # Errors
    ///
    /// See [`Driver::link`].
    pub fn run(&self) -> Result<LinkContext> {
        let mut ctx = self.create_context();
        self.link(&mut ctx)?;
        Ok(ctx)
    }

    /// Builds the pipeline for `ctx`, runs it and writes the dependency dump.
    ///
    /// # Errors
    ///
    /// Returns configuration errors before anything runs, the first fatal step error, or
    /// [`Error::Error`] when the run reported errors (warnings promoted by `--warnaserror`
    /// included).
    pub fn link(&self, ctx: &mut LinkContext) -> Result<()> {
        let mut pipeline = self.create_pipeline(ctx)?;
        info!("Running {} steps", pipeline.len());
        pipeline.process(ctx)?;

        if let Some(path) = ctx.tracer.finish(&ctx.graph, &ctx.options.output_directory)? {
            info!("Dependencies written to '{}'", path.display());
        }

        let errors = ctx.diagnostics.iter().filter(|m| m.is_error()).count();
        if errors > 0 {
            return Err(Error::Error(format!("Linking failed with {errors} error(s)")));
        }
        Ok(())
    }
}

fn standard_pipeline() -> Result<Pipeline> {
    let mut pipeline = Pipeline::new();
    pipeline.append_step(Box::new(LoadReferencesStep))?;
    pipeline.append_step(Box::new(BlacklistStep))?;
    pipeline.append_step(Box::new(PreserveDependencyLookupStep))?;
    pipeline.append_step(Box::new(TypeMapStep))?;
    pipeline.append_step(Box::new(MarkStep))?;
    pipeline.append_step(Box::new(SweepStep))?;
    pipeline.append_step(Box::new(CodeRewriterStep))?;
    pipeline.append_step(Box::new(CleanStep))?;
    pipeline.append_step(Box::new(RegenerateGuidStep))?;
    pipeline.append_step(Box::new(OutputStep::to_output_directory()))?;
    Ok(pipeline)
}

/// Expands `@list` into the paths listed in the file `list`, one per line.
///
/// Other paths are returned unchanged. Blank lines and lines starting with `#` are skipped.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the list file cannot be read.
pub fn expand_file_list(path: &Path) -> Result<Vec<PathBuf>> {
    let text = path.to_string_lossy();
    let Some(list) = text.strip_prefix('@') else {
        return Ok(vec![path.to_path_buf()]);
    };

    let content = fs::read_to_string(list)
        .map_err(|error| Error::Configuration(format!("Cannot read file list '{list}': {error}")))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

/// Replaces every `@file` argument with the arguments stored in that response file.
///
/// Arguments in a response file are separated by whitespace; double quotes group an argument
/// containing spaces. Response files may reference further response files. The value of a
/// file option (`-a`, `-r`, `-x`) is a file list, not a response file, and is kept as is.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if a response file cannot be read or response files nest
/// too deeply.
pub fn expand_response_files<I, S>(args: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut expanded = Vec::new();
    expand_into(args.into_iter().map(Into::into), &mut expanded, 0)?;
    Ok(expanded)
}

fn expand_into(
    args: impl Iterator<Item = String>,
    expanded: &mut Vec<String>,
    depth: usize,
) -> Result<()> {
    for arg in args {
        let takes_file = expanded
            .last()
            .is_some_and(|previous| FILE_LIST_OPTIONS.contains(&previous.as_str()));
        match arg.strip_prefix('@') {
            Some(file) if !takes_file && !file.is_empty() => {
                if depth >= MAX_RESPONSE_FILE_DEPTH {
                    return Err(Error::Configuration(format!(
                        "Response file '{file}' is nested too deeply"
                    )));
                }
                let content = fs::read_to_string(file).map_err(|error| {
                    Error::Configuration(format!("Cannot read response file '{file}': {error}"))
                })?;
                expand_into(split_response_text(&content).into_iter(), expanded, depth + 1)?;
            }
            _ => expanded.push(arg),
        }
    }
    Ok(())
}

fn split_response_text(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        args.push(current);
    }
    args
}
