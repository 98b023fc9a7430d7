//! The JSON module document format.
//!
//! One document describes one assembly: its module, types, members, custom attributes,
//! resources and method bodies (as reference lists). References between symbols use the
//! textual [`SymbolRef`] form; the `[Assembly]` prefix may be omitted for symbols of the
//! document's own assembly.
//!
//! ```json
//! {
//!   "assembly": "App",
//!   "kind": "executable",
//!   "entry_point": "Program::Main",
//!   "references": ["Utils"],
//!   "types": [{
//!     "name": "Program",
//!     "visibility": "public",
//!     "base": "[System.Private.CoreLib]System.Object",
//!     "methods": [{
//!       "name": "Main",
//!       "flags": ["static"],
//!       "body": { "references": [{ "kind": "call", "target": "[Utils]Utils.Helper::Run", "offset": 6 }] }
//!     }]
//!   }]
//! }
//! ```
//!
//! Documents are read through a [`ModuleLoader`]; [`JsonModuleLoader`] maps the file into
//! memory and parses it with `serde_json`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use uguid::Guid;

use crate::{
    graph::{
        AccessorOwnerInfo, AttributeArgument, BodyKind, BodyReference, BodyReferenceKind,
        BranchGuard, CustomAttribute, FieldInfo, MethodBody, MethodDebugInformation, MethodInfo,
        ModuleKind, Resource, SecurityDeclaration, SequencePoint, SymbolFlags, SymbolGraph,
        SymbolId, SymbolKind, SymbolRef, TypeInfo, Visibility,
    },
    Error, Result,
};

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// A whole assembly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDocument {
    /// Assembly name.
    pub assembly: String,
    /// Library or executable.
    #[serde(default)]
    pub kind: ModuleKind,
    /// Entry point method (`Type::Method`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    /// Referenced assembly names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    /// Module version id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mvid: Option<String>,
    /// Embedded resources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceDocument>,
    /// Assembly-level custom attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeDocument>,
    /// Assembly-level security declarations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityDeclaration>,
    /// Top-level types.
    #[serde(default)]
    pub types: Vec<TypeDocument>,
}

/// An embedded resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    /// Resource name.
    pub name: String,
    /// Resource text.
    pub content: String,
}

/// A custom attribute instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDocument {
    /// Attribute type reference.
    #[serde(rename = "type")]
    pub attribute_type: String,
    /// Positional arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<AttributeArgument>,
    /// Named arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub named: Vec<NamedArgumentDocument>,
}

/// A named attribute argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedArgumentDocument {
    /// Field or property name.
    pub name: String,
    /// Value.
    pub value: AttributeArgument,
}

/// A type definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDocument {
    /// Simple name for nested types, namespace-qualified name otherwise.
    pub name: String,
    /// Accessibility, `private` when absent.
    #[serde(default)]
    pub visibility: Visibility,
    /// Flag names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// Base type reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Interface references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    /// Custom attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeDocument>,
    /// Security declarations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityDeclaration>,
    /// Fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDocument>,
    /// Methods.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodDocument>,
    /// Properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<AccessorOwnerDocument>,
    /// Events.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<AccessorOwnerDocument>,
    /// Nested types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_types: Vec<TypeDocument>,
}

/// A field definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDocument {
    /// Field name.
    pub name: String,
    /// Accessibility.
    #[serde(default)]
    pub visibility: Visibility,
    /// Flag names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// Field type reference.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    /// Constant value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<String>,
    /// Custom attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeDocument>,
}

/// A method definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodDocument {
    /// Method name.
    pub name: String,
    /// Accessibility.
    #[serde(default)]
    pub visibility: Visibility,
    /// Flag names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// Return type, `void` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    /// Parameter types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    /// Explicitly overridden methods.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<String>,
    /// Custom attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeDocument>,
    /// Security declarations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityDeclaration>,
    /// The body; absent for abstract and extern methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyDocument>,
    /// Sequence points.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequence_points: Vec<SequencePointDocument>,
}

/// A method body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyDocument {
    /// `il`, `stub` or `throw`.
    #[serde(default = "BodyDocument::default_kind")]
    pub kind: String,
    /// Constant returned by a stub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// `.locals init`.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub init_locals: bool,
    /// Referenced symbols.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceDocument>,
}

impl BodyDocument {
    fn default_kind() -> String {
        "il".to_string()
    }
}

/// A symbol referenced from a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDocument {
    /// `call`, `newobject`, `field` or `type`.
    pub kind: String,
    /// The referenced symbol.
    pub target: String,
    /// IL offset.
    #[serde(default)]
    pub offset: u32,
    /// Constant guard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardDocument>,
}

/// A constant branch condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardDocument {
    /// Method or field providing the condition.
    pub condition: String,
    /// Value for which the reference executes.
    #[serde(default = "default_true")]
    pub when: bool,
}

/// A sequence point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencePointDocument {
    /// IL offset.
    pub offset: u32,
    /// Source document.
    pub document: String,
    /// Start line.
    pub line: u32,
    /// Start column.
    #[serde(default)]
    pub column: u32,
}

/// A property or event definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessorOwnerDocument {
    /// Name.
    pub name: String,
    /// Accessibility.
    #[serde(default)]
    pub visibility: Visibility,
    /// Property or handler type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    /// Names of accessor methods in the declaring type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accessors: Vec<String>,
    /// Custom attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeDocument>,
}

impl ModuleDocument {
    /// Parses a document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on invalid JSON or a shape mismatch.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parses a document from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on invalid JSON or a shape mismatch.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Serializes the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Adds the document's module and all its symbols to `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSymbol`] when the assembly or a full name already exists and
    /// [`Error::Malformed`] for invalid references, flags or kinds.
    pub fn load_into(&self, graph: &mut SymbolGraph, source: Option<&Path>) -> Result<SymbolId> {
        let assembly = self.assembly.as_str();
        if assembly.is_empty() {
            return Err(malformed_error!("Module document without an assembly name"));
        }

        let module = graph.add_module(assembly, self.kind)?;
        {
            let symbol = graph.symbol_mut(module);
            symbol.attributes = convert_attributes(&self.attributes, assembly)?;
            symbol.security.clone_from(&self.security);
        }

        let entry_point = self
            .entry_point
            .as_deref()
            .map(|text| SymbolRef::parse(text, assembly))
            .transpose()?;
        let mvid = match &self.mvid {
            Some(text) => Guid::try_parse(text)
                .map_err(|_| malformed_error!("Invalid mvid '{}' in {}", text, assembly))?,
            None => Guid::ZERO,
        };

        if let Some(info) = graph.symbol_mut(module).as_module_mut() {
            info.entry_point = entry_point;
            info.references.clone_from(&self.references);
            info.resources = self
                .resources
                .iter()
                .map(|r| Resource {
                    name: r.name.clone(),
                    content: r.content.clone(),
                })
                .collect();
            info.mvid = mvid;
            info.source_path = source.map(Path::to_path_buf);
        }

        for ty in &self.types {
            load_type(graph, module, ty, assembly)?;
        }

        Ok(module)
    }

    /// Builds the document of `module` from the graph, skipping removed symbols.
    #[must_use]
    pub fn from_graph(graph: &SymbolGraph, module: SymbolId) -> Self {
        let info = graph.module_info(module);
        let assembly = info.assembly.as_str();
        let symbol = graph.symbol(module);

        ModuleDocument {
            assembly: assembly.to_string(),
            kind: info.kind,
            entry_point: info.entry_point.as_ref().map(|r| r.relative_to(assembly)),
            references: info.references.clone(),
            mvid: (info.mvid != Guid::ZERO).then(|| info.mvid.to_string()),
            resources: info
                .resources
                .iter()
                .map(|r| ResourceDocument {
                    name: r.name.clone(),
                    content: r.content.clone(),
                })
                .collect(),
            attributes: attribute_documents(&symbol.attributes, assembly),
            security: symbol.security.clone(),
            types: graph
                .children(module)
                .iter()
                .filter(|id| !graph.symbol(**id).is_removed())
                .map(|id| type_document(graph, *id, assembly))
                .collect(),
        }
    }
}

fn parse_ref(text: &str, assembly: &str) -> Result<SymbolRef> {
    SymbolRef::parse(text, assembly)
}

fn parse_opt_ref(text: Option<&String>, assembly: &str) -> Result<Option<SymbolRef>> {
    text.map(|t| parse_ref(t, assembly)).transpose()
}

fn parse_refs(texts: &[String], assembly: &str) -> Result<Vec<SymbolRef>> {
    texts.iter().map(|t| parse_ref(t, assembly)).collect()
}

fn parse_flags(names: &[String]) -> Result<SymbolFlags> {
    let mut flags = SymbolFlags::empty();
    for name in names {
        match SymbolFlags::from_document_name(name) {
            Some(flag) => flags |= flag,
            None => return Err(malformed_error!("Unknown flag '{}'", name)),
        }
    }
    Ok(flags)
}

fn convert_attributes(
    attributes: &[AttributeDocument],
    assembly: &str,
) -> Result<Vec<CustomAttribute>> {
    attributes
        .iter()
        .map(|doc| {
            Ok(CustomAttribute {
                attribute_type: parse_ref(&doc.attribute_type, assembly)?,
                constructor_arguments: doc.args.clone(),
                named_arguments: doc
                    .named
                    .iter()
                    .map(|n| (n.name.clone(), n.value.clone()))
                    .collect(),
            })
        })
        .collect()
}

fn convert_body(doc: &BodyDocument, assembly: &str) -> Result<MethodBody> {
    let kind = match doc.kind.to_ascii_lowercase().as_str() {
        "il" => BodyKind::Il,
        "stub" => BodyKind::Stub(doc.value.clone()),
        "throw" => BodyKind::Throw,
        other => return Err(malformed_error!("Unknown body kind '{}'", other)),
    };

    let mut references = Vec::with_capacity(doc.references.len());
    for reference in &doc.references {
        let kind: BodyReferenceKind = reference
            .kind
            .parse()
            .map_err(|_| malformed_error!("Unknown reference kind '{}'", reference.kind))?;
        let guard = match &reference.guard {
            Some(guard) => Some(BranchGuard {
                condition: parse_ref(&guard.condition, assembly)?,
                taken_when: guard.when,
            }),
            None => None,
        };
        references.push(BodyReference {
            kind,
            target: parse_ref(&reference.target, assembly)?,
            il_offset: reference.offset,
            guard,
        });
    }

    Ok(MethodBody {
        kind,
        references,
        init_locals: doc.init_locals,
    })
}

fn load_type(
    graph: &mut SymbolGraph,
    parent: SymbolId,
    doc: &TypeDocument,
    assembly: &str,
) -> Result<SymbolId> {
    let info = TypeInfo {
        base_type: parse_opt_ref(doc.base.as_ref(), assembly)?,
        interfaces: parse_refs(&doc.interfaces, assembly)?,
    };
    let ty = graph.add_type(parent, &doc.name, doc.visibility, parse_flags(&doc.flags)?, info)?;
    {
        let symbol = graph.symbol_mut(ty);
        symbol.attributes = convert_attributes(&doc.attributes, assembly)?;
        symbol.security.clone_from(&doc.security);
    }

    for field in &doc.fields {
        let info = FieldInfo {
            field_type: parse_opt_ref(field.field_type.as_ref(), assembly)?,
            constant: field.constant.clone(),
        };
        let id = graph.add_field(ty, &field.name, field.visibility, parse_flags(&field.flags)?, info)?;
        graph.symbol_mut(id).attributes = convert_attributes(&field.attributes, assembly)?;
    }

    for method in &doc.methods {
        let debug = (!method.sequence_points.is_empty()).then(|| MethodDebugInformation {
            sequence_points: method
                .sequence_points
                .iter()
                .map(|sp| SequencePoint {
                    il_offset: sp.offset,
                    document: sp.document.clone(),
                    start_line: sp.line,
                    start_column: sp.column,
                })
                .collect(),
        });
        let info = MethodInfo {
            return_type: parse_opt_ref(method.return_type.as_ref(), assembly)?,
            parameters: parse_refs(&method.parameters, assembly)?,
            overrides: parse_refs(&method.overrides, assembly)?,
            body: method
                .body
                .as_ref()
                .map(|b| convert_body(b, assembly))
                .transpose()?,
            accessor_of: None,
            debug,
        };
        let id = graph.add_method(
            ty,
            &method.name,
            method.visibility,
            parse_flags(&method.flags)?,
            info,
        )?;
        let symbol = graph.symbol_mut(id);
        symbol.attributes = convert_attributes(&method.attributes, assembly)?;
        symbol.security.clone_from(&method.security);
    }

    for (owners, kind) in [
        (&doc.properties, SymbolKind::Property),
        (&doc.events, SymbolKind::Event),
    ] {
        for owner in owners {
            let mut accessors = Vec::with_capacity(owner.accessors.len());
            for name in &owner.accessors {
                match graph.find_member(ty, name) {
                    Some(id) if graph.symbol(id).kind() == SymbolKind::Method => accessors.push(id),
                    _ => {
                        return Err(malformed_error!(
                            "Accessor '{}' of '{}' is not a method of '{}'",
                            name,
                            owner.name,
                            doc.name
                        ))
                    }
                }
            }
            let info = AccessorOwnerInfo {
                value_type: parse_opt_ref(owner.value_type.as_ref(), assembly)?,
                accessors,
            };
            let id = if kind == SymbolKind::Property {
                graph.add_property(ty, &owner.name, owner.visibility, info)?
            } else {
                graph.add_event(ty, &owner.name, owner.visibility, info)?
            };
            graph.symbol_mut(id).attributes = convert_attributes(&owner.attributes, assembly)?;
        }
    }

    for nested in &doc.nested_types {
        load_type(graph, ty, nested, assembly)?;
    }

    Ok(ty)
}

fn attribute_documents(attributes: &[CustomAttribute], assembly: &str) -> Vec<AttributeDocument> {
    attributes
        .iter()
        .map(|attr| AttributeDocument {
            attribute_type: attr.attribute_type.relative_to(assembly),
            args: attr.constructor_arguments.clone(),
            named: attr
                .named_arguments
                .iter()
                .map(|(name, value)| NamedArgumentDocument {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        })
        .collect()
}

fn body_document(body: &MethodBody, assembly: &str) -> BodyDocument {
    let (kind, value) = match &body.kind {
        BodyKind::Il => ("il", None),
        BodyKind::Stub(value) => ("stub", value.clone()),
        BodyKind::Throw => ("throw", None),
    };

    BodyDocument {
        kind: kind.to_string(),
        value,
        init_locals: body.init_locals,
        references: body
            .references
            .iter()
            .map(|r| ReferenceDocument {
                kind: r.kind.to_string(),
                target: r.target.relative_to(assembly),
                offset: r.il_offset,
                guard: r.guard.as_ref().map(|g| GuardDocument {
                    condition: g.condition.relative_to(assembly),
                    when: g.taken_when,
                }),
            })
            .collect(),
    }
}

fn type_document(graph: &SymbolGraph, ty: SymbolId, assembly: &str) -> TypeDocument {
    let symbol = graph.symbol(ty);
    let rel = |r: &SymbolRef| r.relative_to(assembly);
    let info = symbol.as_type();

    let mut doc = TypeDocument {
        name: symbol.name.clone(),
        visibility: symbol.visibility,
        flags: symbol.flags.to_names(),
        base: info.and_then(|i| i.base_type.as_ref()).map(rel),
        interfaces: info
            .map(|i| i.interfaces.iter().map(rel).collect())
            .unwrap_or_default(),
        attributes: attribute_documents(&symbol.attributes, assembly),
        security: symbol.security.clone(),
        ..TypeDocument::default()
    };

    for child in graph.children(ty) {
        let member = graph.symbol(*child);
        if member.is_removed() {
            continue;
        }

        match member.kind() {
            SymbolKind::Type => doc.nested_types.push(type_document(graph, *child, assembly)),
            SymbolKind::Field => {
                let info = member.as_field();
                doc.fields.push(FieldDocument {
                    name: member.name.clone(),
                    visibility: member.visibility,
                    flags: member.flags.to_names(),
                    field_type: info.and_then(|i| i.field_type.as_ref()).map(rel),
                    constant: info.and_then(|i| i.constant.clone()),
                    attributes: attribute_documents(&member.attributes, assembly),
                });
            }
            SymbolKind::Method => {
                let Some(info) = member.as_method() else {
                    continue;
                };
                doc.methods.push(MethodDocument {
                    name: member.name.clone(),
                    visibility: member.visibility,
                    flags: member.flags.to_names(),
                    return_type: info.return_type.as_ref().map(rel),
                    parameters: info.parameters.iter().map(rel).collect(),
                    overrides: info.overrides.iter().map(rel).collect(),
                    attributes: attribute_documents(&member.attributes, assembly),
                    security: member.security.clone(),
                    body: info.body.as_ref().map(|b| body_document(b, assembly)),
                    sequence_points: info
                        .debug
                        .as_ref()
                        .map(|d| {
                            d.sequence_points
                                .iter()
                                .map(|sp| SequencePointDocument {
                                    offset: sp.il_offset,
                                    document: sp.document.clone(),
                                    line: sp.start_line,
                                    column: sp.start_column,
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                });
            }
            SymbolKind::Property | SymbolKind::Event => {
                let Some(info) = member.as_accessor_owner() else {
                    continue;
                };
                let owner = AccessorOwnerDocument {
                    name: member.name.clone(),
                    visibility: member.visibility,
                    value_type: info.value_type.as_ref().map(rel),
                    accessors: info
                        .accessors
                        .iter()
                        .filter(|id| !graph.symbol(**id).is_removed())
                        .map(|id| graph.symbol(*id).name.clone())
                        .collect(),
                    attributes: attribute_documents(&member.attributes, assembly),
                };
                if member.kind() == SymbolKind::Property {
                    doc.properties.push(owner);
                } else {
                    doc.events.push(owner);
                }
            }
            SymbolKind::Module => {}
        }
    }

    doc
}

/// Loads module files into a [`SymbolGraph`].
///
/// The resolver probes search directories for `<assembly>.<extension>` using
/// [`ModuleLoader::extensions`] and hands matching files to [`ModuleLoader::load`].
pub trait ModuleLoader {
    /// File extensions this loader understands, without the leading dot.
    fn extensions(&self) -> &[&'static str];

    /// Loads the module stored at `path` into `graph`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid module.
    fn load(&self, path: &Path, graph: &mut SymbolGraph) -> Result<SymbolId>;

    /// Returns the candidate path for `assembly` inside `directory`, if the file exists.
    fn probe(&self, directory: &Path, assembly: &str) -> Option<PathBuf> {
        self.extensions()
            .iter()
            .map(|ext| directory.join(format!("{assembly}.{ext}")))
            .find(|candidate| candidate.is_file())
    }
}

/// Loader for JSON module documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModuleLoader;

impl ModuleLoader for JsonModuleLoader {
    fn extensions(&self) -> &[&'static str] {
        &["json"]
    }

    fn load(&self, path: &Path, graph: &mut SymbolGraph) -> Result<SymbolId> {
        let file = fs::File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(malformed_error!("Module file '{}' is empty", path.display()));
        }

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error::Error(error.to_string())),
        };

        let document = ModuleDocument::from_slice(&mmap)?;
        document.load_into(graph, Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = r#"{
        "assembly": "App",
        "kind": "executable",
        "entry_point": "Program::Main",
        "references": ["Utils"],
        "types": [{
            "name": "Program",
            "visibility": "public",
            "flags": ["beforefieldinit"],
            "methods": [
                { "name": "Main", "flags": ["static"],
                  "body": { "references": [
                      { "kind": "call", "target": "[Utils]Utils.Helper::Run", "offset": 6 },
                      { "kind": "call", "target": "Program::Debug", "offset": 12,
                        "guard": { "condition": "Program::get_IsDebug", "when": true } }
                  ] },
                  "sequence_points": [{ "offset": 0, "document": "Program.cs", "line": 3 }] },
                { "name": "get_IsDebug", "flags": ["static", "specialname"], "return_type": "[System.Private.CoreLib]System.Boolean",
                  "body": {} },
                { "name": "Debug", "body": { "init_locals": false } }
            ],
            "properties": [{ "name": "IsDebug", "accessors": ["get_IsDebug"] }],
            "nested_types": [{ "name": "Cache" }]
        }]
    }"#;

    #[test]
    fn load_document() {
        let mut graph = SymbolGraph::new();
        let doc = ModuleDocument::from_json(APP).unwrap();
        let module = doc.load_into(&mut graph, None).unwrap();

        let info = graph.module_info(module);
        assert_eq!(info.kind, ModuleKind::Executable);
        assert_eq!(
            info.entry_point,
            Some(SymbolRef::new("App", "Program::Main"))
        );

        let main = graph
            .find(&SymbolRef::new("App", "Program::Main"))
            .unwrap();
        let body = graph.symbol(main).as_method().unwrap().body.as_ref().unwrap();
        assert_eq!(body.references.len(), 2);
        assert_eq!(body.references[0].target.assembly, "Utils");
        assert!(body.init_locals);
        assert!(body.references[1].guard.is_some());

        let debug = graph
            .find(&SymbolRef::new("App", "Program::Debug"))
            .unwrap();
        assert!(!graph.symbol(debug).as_method().unwrap().body.as_ref().unwrap().init_locals);

        assert!(graph.find(&SymbolRef::new("App", "Program/Cache")).is_some());
        let getter = graph
            .find(&SymbolRef::new("App", "Program::get_IsDebug"))
            .unwrap();
        assert!(graph.symbol(getter).as_method().unwrap().accessor_of.is_some());
    }

    #[test]
    fn removed_symbols_are_not_written() {
        let mut graph = SymbolGraph::new();
        let module = ModuleDocument::from_json(APP)
            .unwrap()
            .load_into(&mut graph, None)
            .unwrap();
        let debug = graph
            .find(&SymbolRef::new("App", "Program::Debug"))
            .unwrap();
        graph.remove(debug);

        let written = ModuleDocument::from_graph(&graph, module);
        let names: Vec<_> = written.types[0].methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Main", "get_IsDebug"]);
        assert_eq!(written.entry_point.as_deref(), Some("Program::Main"));
        assert_eq!(
            written.types[0].methods[0].body.as_ref().unwrap().references[0].target,
            "[Utils]Utils.Helper::Run"
        );
    }

    #[test]
    fn unknown_accessor_is_malformed() {
        let text = r#"{ "assembly": "A", "types": [{ "name": "T",
            "properties": [{ "name": "P", "accessors": ["get_P"] }] }] }"#;
        let mut graph = SymbolGraph::new();
        let result = ModuleDocument::from_json(text)
            .unwrap()
            .load_into(&mut graph, None);
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn unknown_flag_is_malformed() {
        let text = r#"{ "assembly": "A", "types": [{ "name": "T", "flags": ["shiny"] }] }"#;
        let mut graph = SymbolGraph::new();
        let result = ModuleDocument::from_json(text)
            .unwrap()
            .load_into(&mut graph, None);
        assert!(result.is_err());
    }
}
