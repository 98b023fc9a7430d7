//! The linking engine: context, pipeline, steps and their supporting tables.
//!
//! A run builds a [`LinkContext`], fills a [`Pipeline`] with [`Step`]s and calls
//! [`Pipeline::process`]. Root steps load assemblies and register roots, [`steps::MarkStep`]
//! computes everything reachable from them, [`steps::SweepStep`] removes the rest according
//! to each assembly's [`AssemblyAction`], and [`steps::OutputStep`] writes the result.
//!
//! # Architecture
//!
//! - [`context`] - [`LinkContext`], the state shared by all steps
//! - [`pipeline`] - [`Pipeline`], [`Step`] and [`PipelineEdit`]
//! - [`steps`] - The built-in steps
//! - [`actions`] - Per-assembly actions and roots
//! - [`optimizations`] - Global and per-assembly optimization flags
//! - [`annotations`] - Mark table and other per-symbol side tables
//! - [`attributes`] - Linker-recognized custom attributes, parsed once per symbol
//! - [`diagnostics`] - Messages, origins and the warning policy
//! - [`descriptor`] - Shared handling of linker XML files
//! - [`resolver`] - Assembly lookup by name
//! - [`tracer`] - Dependency recording for `--dump-dependencies`
//!
//! # Usage
//!
//! ```rust,ignore
//! use dotlink::linker::{steps, LinkContext, Pipeline, RootVisibility};
//!
//! let mut ctx = LinkContext::new();
//! ctx.resolver.add_search_directory("refs");
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.append_step(Box::new(steps::ResolveFromAssemblyStep::new("App.json", RootVisibility::Any)))?;
//! pipeline.append_step(Box::new(steps::LoadReferencesStep))?;
//! pipeline.append_step(Box::new(steps::TypeMapStep))?;
//! pipeline.append_step(Box::new(steps::MarkStep))?;
//! pipeline.append_step(Box::new(steps::SweepStep))?;
//! pipeline.append_step(Box::new(steps::OutputStep::to_output_directory()))?;
//! pipeline.process(&mut ctx)?;
//! ```

pub mod actions;
pub mod annotations;
pub mod attributes;
pub mod context;
pub mod descriptor;
pub mod diagnostics;
pub mod optimizations;
pub mod pipeline;
pub mod resolver;
pub mod steps;
pub mod tracer;

pub use actions::{
    is_core_library, ActionTable, AssemblyAction, Root, RootVisibility, TypePreserve,
    CORE_LIBRARIES,
};
pub use annotations::{Annotations, MarkState, MarkTable, MethodAction, OverrideInformation};
pub use attributes::{
    AttributeCache, LinkerAttribute, LinkerAttributeKind, LinkerAttributesInformation,
};
pub use context::{LinkContext, LinkOptions, Resolution, UnresolvedPolicy};
pub use descriptor::DescriptorSource;
pub use diagnostics::{codes, Diagnostics, LinkerMessage, MessageCategory, MessageOrigin};
pub use optimizations::{CodeOptimizations, OptimizationSet};
pub use pipeline::{Pipeline, PipelineEdit, Step};
pub use resolver::AssemblyResolver;
pub use tracer::{DependencyEdge, DependencyReason, Tracer};
