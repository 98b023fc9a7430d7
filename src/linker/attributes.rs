//! Linker-meaningful custom attributes, parsed once per symbol.
//!
//! Only a closed set of attributes changes what the linker does. [`LinkerAttributesInformation`]
//! scans a symbol's raw attributes (plus supplementary definitions loaded from attribute XML)
//! the first time it is queried, keeps the recognized ones as [`LinkerAttribute`] values grouped
//! by [`LinkerAttributeKind`] and ignores everything else. A recognized attribute with missing
//! or ill-typed arguments produces a warning and is treated as absent.

use std::{cell::RefCell, rc::Rc};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    graph::{AttributeArgument, CustomAttribute, SymbolGraph, SymbolId, SymbolKind},
    linker::diagnostics::{codes, Diagnostics, LinkerMessage, MessageOrigin},
};

/// Full name of `RequiresUnreferencedCodeAttribute`.
pub const REQUIRES_UNREFERENCED_CODE: &str =
    "System.Diagnostics.CodeAnalysis.RequiresUnreferencedCodeAttribute";
/// Full name of `DynamicDependencyAttribute`.
pub const DYNAMIC_DEPENDENCY: &str = "System.Diagnostics.CodeAnalysis.DynamicDependencyAttribute";
/// Full name of the legacy `PreserveDependencyAttribute`.
pub const PRESERVE_DEPENDENCY: &str = "System.Runtime.CompilerServices.PreserveDependencyAttribute";
/// Full name of `UnconditionalSuppressMessageAttribute`.
pub const UNCONDITIONAL_SUPPRESS_MESSAGE: &str =
    "System.Diagnostics.CodeAnalysis.UnconditionalSuppressMessageAttribute";
/// Simple name of the `Preserve` attribute, recognized in any namespace.
pub const PRESERVE: &str = "PreserveAttribute";
/// Simple name of the `RemovableFeature` attribute, recognized in any namespace.
pub const REMOVABLE_FEATURE: &str = "RemovableFeatureAttribute";

/// Attributes used only for manual dependency tracking; dropped by Sweep unless kept.
pub const DEPENDENCY_ATTRIBUTES: [&str; 2] = [DYNAMIC_DEPENDENCY, PRESERVE_DEPENDENCY];

fn simple_name(full_name: &str) -> &str {
    full_name
        .rsplit(['.', '/'])
        .next()
        .unwrap_or(full_name)
}

/// A recognized linker attribute with its parsed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkerAttribute {
    /// Calling the method is not trim-safe.
    RequiresUnreferencedCode {
        /// Explanation shown in the warning.
        message: String,
        /// Optional link to documentation.
        url: Option<String>,
    },
    /// The symbol needs another member that is not referenced statically.
    DynamicDependency {
        /// Member name or signature (`*` or `None` for all members).
        member: Option<String>,
        /// Full name of the type declaring the member; the attributed symbol's type when absent.
        type_name: Option<String>,
        /// Assembly declaring the type; the attributed symbol's assembly when absent.
        assembly: Option<String>,
    },
    /// Suppresses a warning inside the attributed symbol.
    UnconditionalSuppressMessage {
        /// Warning category.
        category: String,
        /// Check id, e.g. `IL2026` or `IL2026:Reason`.
        check_id: String,
    },
    /// The symbol is always kept.
    Preserve {
        /// Keep all members of an attributed type as well.
        all_members: bool,
    },
    /// The symbol belongs to a feature that can be excluded.
    RemovableFeature {
        /// Feature name.
        name: String,
    },
    /// Instances of this attribute type are removed by Sweep.
    Removable,
}

/// The kind of a [`LinkerAttribute`], used as its lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkerAttributeKind {
    /// [`LinkerAttribute::RequiresUnreferencedCode`]
    RequiresUnreferencedCode,
    /// [`LinkerAttribute::DynamicDependency`]
    DynamicDependency,
    /// [`LinkerAttribute::UnconditionalSuppressMessage`]
    UnconditionalSuppressMessage,
    /// [`LinkerAttribute::Preserve`]
    Preserve,
    /// [`LinkerAttribute::RemovableFeature`]
    RemovableFeature,
    /// [`LinkerAttribute::Removable`]
    Removable,
}

impl From<&LinkerAttribute> for LinkerAttributeKind {
    fn from(attribute: &LinkerAttribute) -> Self {
        match attribute {
            LinkerAttribute::RequiresUnreferencedCode { .. } => {
                LinkerAttributeKind::RequiresUnreferencedCode
            }
            LinkerAttribute::DynamicDependency { .. } => LinkerAttributeKind::DynamicDependency,
            LinkerAttribute::UnconditionalSuppressMessage { .. } => {
                LinkerAttributeKind::UnconditionalSuppressMessage
            }
            LinkerAttribute::Preserve { .. } => LinkerAttributeKind::Preserve,
            LinkerAttribute::RemovableFeature { .. } => LinkerAttributeKind::RemovableFeature,
            LinkerAttribute::Removable => LinkerAttributeKind::Removable,
        }
    }
}

impl LinkerAttribute {
    /// Returns the numeric code an `UnconditionalSuppressMessage` suppresses.
    #[must_use]
    pub fn suppressed_code(&self) -> Option<u32> {
        let LinkerAttribute::UnconditionalSuppressMessage { check_id, .. } = self else {
            return None;
        };
        let id = check_id.split(':').next().unwrap_or_default().trim();
        let digits = id
            .strip_prefix("IL")
            .or_else(|| id.strip_prefix("il"))
            .unwrap_or(id);
        digits.parse().ok()
    }
}

/// The recognized linker attributes of one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkerAttributesInformation {
    attributes: FxHashMap<LinkerAttributeKind, Vec<LinkerAttribute>>,
}

impl LinkerAttributesInformation {
    /// Classifies `raw` attributes of `symbol`, reporting malformed ones to `diagnostics`.
    pub fn build(
        graph: &SymbolGraph,
        diagnostics: &Diagnostics,
        symbol: SymbolId,
        raw: &[&CustomAttribute],
        removable: bool,
    ) -> Self {
        let mut info = LinkerAttributesInformation::default();
        for attribute in raw {
            if let Some(value) = classify(graph, diagnostics, symbol, attribute) {
                info.add(value);
            }
        }
        if removable {
            info.add(LinkerAttribute::Removable);
        }
        info
    }

    fn add(&mut self, attribute: LinkerAttribute) {
        self.attributes
            .entry(LinkerAttributeKind::from(&attribute))
            .or_default()
            .push(attribute);
    }

    /// Returns true if at least one attribute of `kind` is present.
    #[must_use]
    pub fn has(&self, kind: LinkerAttributeKind) -> bool {
        self.attributes.contains_key(&kind)
    }

    /// Returns the attributes of `kind`.
    #[must_use]
    pub fn get(&self, kind: LinkerAttributeKind) -> &[LinkerAttribute] {
        self.attributes.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Returns true if nothing was recognized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns true if an `UnconditionalSuppressMessage` suppresses `code`.
    #[must_use]
    pub fn suppresses(&self, code: u32) -> bool {
        self.get(LinkerAttributeKind::UnconditionalSuppressMessage)
            .iter()
            .any(|a| a.suppressed_code() == Some(code))
    }
}

fn warn(diagnostics: &Diagnostics, graph: &SymbolGraph, symbol: SymbolId, code: u32, text: String) {
    let origin = MessageOrigin::from_member(symbol, None).render(graph);
    diagnostics.report(LinkerMessage::warning(code, text).with_origin(origin));
}

fn string_arg(attribute: &CustomAttribute, index: usize) -> Option<String> {
    attribute
        .constructor_arguments
        .get(index)
        .and_then(AttributeArgument::as_str)
        .map(str::to_string)
}

fn classify(
    graph: &SymbolGraph,
    diagnostics: &Diagnostics,
    symbol: SymbolId,
    attribute: &CustomAttribute,
) -> Option<LinkerAttribute> {
    let type_name = attribute.attribute_type.name.as_str();
    let target = graph.symbol(symbol);

    match type_name {
        REQUIRES_UNREFERENCED_CODE => {
            if target.kind() != SymbolKind::Method {
                return None;
            }
            let Some(message) = string_arg(attribute, 0) else {
                warn(
                    diagnostics,
                    graph,
                    symbol,
                    codes::REQUIRES_UNREFERENCED_CODE_MISSING_MESSAGE,
                    format!(
                        "Attribute '{}' on '{}' doesn't have a required constructor argument.",
                        REQUIRES_UNREFERENCED_CODE,
                        graph.reference_to(symbol)
                    ),
                );
                return None;
            };
            let url = attribute
                .named("Url")
                .and_then(AttributeArgument::as_str)
                .map(str::to_string);
            Some(LinkerAttribute::RequiresUnreferencedCode { message, url })
        }
        DYNAMIC_DEPENDENCY | PRESERVE_DEPENDENCY => {
            let args = &attribute.constructor_arguments;
            let parsed = match args.as_slice() {
                [AttributeArgument::String(member)] => Some((Some(member.clone()), None, None)),
                [AttributeArgument::String(member), AttributeArgument::String(ty)] => {
                    Some((Some(member.clone()), Some(ty.clone()), None))
                }
                [AttributeArgument::Int(_), AttributeArgument::String(ty)] => {
                    Some((None, Some(ty.clone()), None))
                }
                [AttributeArgument::String(member), AttributeArgument::String(ty), AttributeArgument::String(asm)] => {
                    Some((Some(member.clone()), Some(ty.clone()), Some(asm.clone())))
                }
                [AttributeArgument::Int(_), AttributeArgument::String(ty), AttributeArgument::String(asm)] => {
                    Some((None, Some(ty.clone()), Some(asm.clone())))
                }
                _ => None,
            };

            match parsed {
                Some((member, target_type, assembly)) => Some(LinkerAttribute::DynamicDependency {
                    member,
                    type_name: target_type,
                    assembly,
                }),
                None => {
                    warn(
                        diagnostics,
                        graph,
                        symbol,
                        codes::ATTRIBUTE_INVALID_TARGET,
                        format!(
                            "Invalid arguments for '{}' on '{}'",
                            simple_name(type_name),
                            graph.reference_to(symbol)
                        ),
                    );
                    None
                }
            }
        }
        UNCONDITIONAL_SUPPRESS_MESSAGE => {
            match (string_arg(attribute, 0), string_arg(attribute, 1)) {
                (Some(category), Some(check_id)) => {
                    Some(LinkerAttribute::UnconditionalSuppressMessage { category, check_id })
                }
                _ => {
                    warn(
                        diagnostics,
                        graph,
                        symbol,
                        codes::ATTRIBUTE_INVALID_TARGET,
                        format!(
                            "Attribute '{}' on '{}' needs a category and a check id.",
                            simple_name(type_name),
                            graph.reference_to(symbol)
                        ),
                    );
                    None
                }
            }
        }
        _ if simple_name(type_name) == PRESERVE => {
            let all_members = attribute
                .named("AllMembers")
                .and_then(AttributeArgument::as_bool)
                .unwrap_or(false);
            Some(LinkerAttribute::Preserve { all_members })
        }
        _ if simple_name(type_name) == REMOVABLE_FEATURE => match string_arg(attribute, 0) {
            Some(name) => Some(LinkerAttribute::RemovableFeature { name }),
            None => {
                warn(
                    diagnostics,
                    graph,
                    symbol,
                    codes::ATTRIBUTE_INVALID_TARGET,
                    format!(
                        "Attribute '{}' on '{}' doesn't have a feature name.",
                        type_name,
                        graph.reference_to(symbol)
                    ),
                );
                None
            }
        },
        _ => None,
    }
}

/// Lazily filled cache of [`LinkerAttributesInformation`] plus supplementary attributes.
///
/// The cache is filled through a shared reference so lookups can happen while other parts of
/// the context are borrowed.
#[derive(Debug, Default)]
pub struct AttributeCache {
    infos: RefCell<FxHashMap<SymbolId, Rc<LinkerAttributesInformation>>>,
    supplementary: FxHashMap<SymbolId, Vec<CustomAttribute>>,
    removable: FxHashSet<SymbolId>,
}

impl AttributeCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute to `symbol` as if it were declared on it.
    ///
    /// Must happen before the symbol is first queried; later additions invalidate the entry.
    pub fn add_supplementary(&mut self, symbol: SymbolId, attribute: CustomAttribute) {
        self.supplementary.entry(symbol).or_default().push(attribute);
        self.infos.get_mut().remove(&symbol);
    }

    /// Declares that instances of attribute type `attribute_type` are removed by Sweep.
    pub fn mark_removable(&mut self, attribute_type: SymbolId) {
        self.removable.insert(attribute_type);
        self.infos.get_mut().remove(&attribute_type);
    }

    /// Returns the supplementary attributes of `symbol`.
    #[must_use]
    pub fn supplementary(&self, symbol: SymbolId) -> &[CustomAttribute] {
        self.supplementary.get(&symbol).map_or(&[], Vec::as_slice)
    }

    /// Returns the information of `symbol`, building it on first use.
    pub fn get(
        &self,
        graph: &SymbolGraph,
        diagnostics: &Diagnostics,
        symbol: SymbolId,
    ) -> Rc<LinkerAttributesInformation> {
        if let Some(info) = self.infos.borrow().get(&symbol) {
            return Rc::clone(info);
        }

        let raw: Vec<&CustomAttribute> = graph
            .symbol(symbol)
            .attributes
            .iter()
            .chain(self.supplementary(symbol))
            .collect();
        let info = Rc::new(LinkerAttributesInformation::build(
            graph,
            diagnostics,
            symbol,
            &raw,
            self.removable.contains(&symbol),
        ));
        self.infos.borrow_mut().insert(symbol, Rc::clone(&info));
        info
    }

    /// Returns the number of symbols with cached information.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.infos.borrow().len()
    }
}
