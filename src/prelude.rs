//! # dotlink Prelude
//!
//! The types most linker embedders and custom steps need, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotlink operations
pub use crate::Error;

/// The result type used throughout dotlink
pub use crate::Result;

// ================================================================================================
// Driver
// ================================================================================================

/// Option-driven link runs and custom step registration
pub use crate::driver::{CustomStep, Driver, DriverOptions, StepRegistry};

// ================================================================================================
// Symbol Graph
// ================================================================================================

/// Graph, symbols and references
pub use crate::graph::{
    ModuleDocument, ModuleKind, Symbol, SymbolFlags, SymbolGraph, SymbolId, SymbolKind,
    SymbolRef, Visibility,
};

/// Method bodies
pub use crate::graph::{BodyReference, BodyReferenceKind, MethodBody};

// ================================================================================================
// Linker
// ================================================================================================

/// Context, pipeline and the step contract
pub use crate::linker::{LinkContext, LinkOptions, Pipeline, PipelineEdit, Step};

/// Actions, roots and optimizations
pub use crate::linker::{
    AssemblyAction, CodeOptimizations, Root, RootVisibility, TypePreserve,
};

/// Diagnostics
pub use crate::linker::{LinkerMessage, MessageCategory, MessageOrigin};

/// The built-in steps
pub use crate::linker::steps;
