// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'graph/document.rs' uses mmap to map a module file into memory

//! # dotlink
//!
//! [![Crates.io](https://img.shields.io/crates/v/dotlink.svg)](https://crates.io/crates/dotlink)
//! [![Documentation](https://docs.rs/dotlink/badge.svg)](https://docs.rs/dotlink)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/dotlink/blob/main/LICENSE-APACHE)
//!
//! A mark-and-sweep linker for .NET module graphs. `dotlink` loads a set of assemblies,
//! computes everything reachable from a root set and removes the rest, assembly by assembly,
//! according to a configurable per-assembly action.
//!
//! ## Features
//!
//! - **🌱 Roots from everywhere** - Input assemblies, XML descriptors, embedded descriptors and
//!   dependency attributes
//! - **🔁 Worklist marking** - Deterministic fixpoint over structural and policy edges, with
//!   override, interface and static constructor rules
//! - **✂️ Per-assembly actions** - Link, copy, save, skip or tag unused code for AOT bypass
//! - **🧩 Editable pipeline** - Named steps that can be inserted, removed and extended at run time
//! - **⚙️ Substitutions and features** - Stub out feature switches and fold the branches they guard
//! - **📋 Diagnostics** - Warning codes with source locations, suppression and warn-as-error
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotlink::prelude::*;
//!
//! let options = DriverOptions {
//!     assemblies: vec![("App.json".into(), RootVisibility::Any)],
//!     search_directories: vec!["refs".into()],
//!     output_directory: "linked".into(),
//!     ..DriverOptions::default()
//! };
//! let ctx = Driver::new(options).run()?;
//! println!("{} messages", ctx.diagnostics.count());
//! # Ok::<(), dotlink::Error>(())
//! ```
//!
//! ### Building a pipeline by hand
//!
//! ```rust,no_run
//! use dotlink::linker::{steps, LinkContext, Pipeline, RootVisibility};
//!
//! let mut ctx = LinkContext::new();
//! let mut pipeline = Pipeline::new();
//! pipeline.append_step(Box::new(steps::ResolveFromAssemblyStep::new("App.json", RootVisibility::Any)))?;
//! pipeline.append_step(Box::new(steps::LoadReferencesStep))?;
//! pipeline.append_step(Box::new(steps::TypeMapStep))?;
//! pipeline.append_step(Box::new(steps::MarkStep))?;
//! pipeline.append_step(Box::new(steps::SweepStep))?;
//! pipeline.append_step(Box::new(steps::OutputStep::new(steps::MemorySink::new())))?;
//! pipeline.process(&mut ctx)?;
//! # Ok::<(), dotlink::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`graph`] - The symbol graph: modules, types, members, bodies and the module file format
//! - [`linker`] - Context, pipeline, steps and their side tables
//! - [`driver`] - Options to pipeline, response files, custom step registry
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Development and Testing
//!
//! ```bash
//! cargo test
//! cargo bench --bench mark
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use dotlink::prelude::*;
///
/// let mut ctx = LinkContext::new();
/// ctx.actions.set_override("Utils", AssemblyAction::Copy);
/// ```
pub mod prelude;

/// The symbol graph the linker operates on.
///
/// One [`graph::SymbolGraph`] holds every loaded module as an arena of [`graph::Symbol`]s.
/// Symbols refer to each other across assemblies through textual [`graph::SymbolRef`]s,
/// resolved on demand, so a graph can hold assemblies whose references are not (yet) loaded.
///
/// Modules are read and written as JSON [`graph::ModuleDocument`]s.
pub mod graph;

/// The linking engine.
///
/// See [`linker::LinkContext`], [`linker::Pipeline`] and [`linker::steps`].
pub mod linker;

/// Command-line level configuration.
pub mod driver;

/// Small shared building blocks
pub mod utils;

/// `dotlink` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotlink` Error type
///
/// Configuration problems, malformed input, resolution failures in strict mode and failing
/// steps. See [`Error`] for the variants.
pub use error::Error;

pub use driver::{Driver, DriverOptions, StepRegistry};
pub use graph::{SymbolGraph, SymbolId, SymbolRef};
pub use linker::{LinkContext, Pipeline, Step};
