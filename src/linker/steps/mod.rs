//! The built-in pipeline steps.
//!
//! Steps fall into four groups, listed in the order the standard pipeline runs them:
//!
//! - Root and input steps: [`ResolveFromAssemblyStep`], [`ResolveFromXmlStep`],
//!   [`LoadReferencesStep`], [`BlacklistStep`], [`PreserveDependencyLookupStep`],
//!   [`TypeMapStep`], [`LinkAttributesStep`]
//! - Pre-mark rewrites: [`BodySubstituterStep`], [`RemoveSecurityStep`],
//!   [`RemoveFeaturesStep`], [`RemoveUnreachableBlocksStep`]
//! - [`MarkStep`] and [`SweepStep`]
//! - Post-sweep rewrites and output: [`AddBypassNGenStep`], [`CodeRewriterStep`],
//!   [`CleanStep`], [`RegenerateGuidStep`], [`ClearInitLocalsStep`], [`SealerStep`],
//!   [`OutputStep`]
//!
//! Every step is named after its type; the driver and custom step configurations refer to
//! steps by that name.

mod add_bypass_ngen;
mod blacklist;
mod body_substituter;
mod clean;
mod clear_init_locals;
mod code_rewriter;
mod link_attributes;
mod load_references;
mod mark;
mod output;
mod preserve_dependency_lookup;
mod regenerate_guid;
mod remove_features;
mod remove_security;
mod remove_unreachable_blocks;
mod resolve_from_assembly;
mod resolve_from_xml;
mod sealer;
mod sweep;
mod type_map;

pub use add_bypass_ngen::{AddBypassNGenStep, BYPASS_NGEN_ATTRIBUTE};
pub use blacklist::BlacklistStep;
pub use body_substituter::BodySubstituterStep;
pub use clean::CleanStep;
pub use clear_init_locals::ClearInitLocalsStep;
pub use code_rewriter::CodeRewriterStep;
pub use link_attributes::LinkAttributesStep;
pub use load_references::LoadReferencesStep;
pub use mark::MarkStep;
pub use output::{DirectorySink, MemorySink, OutputSink, OutputStep};
pub use preserve_dependency_lookup::PreserveDependencyLookupStep;
pub use regenerate_guid::RegenerateGuidStep;
pub use remove_features::RemoveFeaturesStep;
pub use remove_security::RemoveSecurityStep;
pub use remove_unreachable_blocks::RemoveUnreachableBlocksStep;
pub use resolve_from_assembly::ResolveFromAssemblyStep;
pub use resolve_from_xml::ResolveFromXmlStep;
pub use sealer::SealerStep;
pub use sweep::SweepStep;
pub use type_map::TypeMapStep;
