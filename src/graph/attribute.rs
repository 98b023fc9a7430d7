//! Raw custom attribute and security declaration data attached to symbols.
//!
//! The graph stores attributes exactly as they were loaded: the attribute type as a
//! [`SymbolRef`], the positional constructor arguments and the named (field/property)
//! arguments. Interpreting the attributes the linker cares about happens once per symbol in
//! [`crate::linker::LinkerAttributesInformation`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::SymbolRef;

/// A decoded custom attribute argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeArgument {
    /// A boolean constant.
    Bool(bool),
    /// An integral constant (enums are stored as their underlying value).
    Int(i64),
    /// A string constant.
    String(String),
    /// A `null` string or type argument.
    Null,
}

impl AttributeArgument {
    /// Returns the value when the argument is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeArgument::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value when the argument is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeArgument::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeArgument::Bool(b) => write!(f, "{b}"),
            AttributeArgument::Int(i) => write!(f, "{i}"),
            AttributeArgument::String(s) => write!(f, "\"{s}\""),
            AttributeArgument::Null => write!(f, "null"),
        }
    }
}

/// A custom attribute instance applied to a symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttribute {
    /// The attribute type.
    pub attribute_type: SymbolRef,
    /// Positional constructor arguments.
    pub constructor_arguments: Vec<AttributeArgument>,
    /// Named field and property arguments, in declaration order.
    pub named_arguments: Vec<(String, AttributeArgument)>,
}

impl CustomAttribute {
    /// Creates an attribute without arguments.
    pub fn new(attribute_type: SymbolRef) -> Self {
        CustomAttribute {
            attribute_type,
            constructor_arguments: Vec::new(),
            named_arguments: Vec::new(),
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn with_argument(mut self, argument: AttributeArgument) -> Self {
        self.constructor_arguments.push(argument);
        self
    }

    /// Appends a named argument.
    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, argument: AttributeArgument) -> Self {
        self.named_arguments.push((name.into(), argument));
        self
    }

    /// Looks up a named argument.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&AttributeArgument> {
        self.named_arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Returns true if the attribute type has the given full name, in any assembly.
    #[must_use]
    pub fn is_type(&self, full_name: &str) -> bool {
        self.attribute_type.name == full_name
    }
}

/// A declarative security (CAS) permission set attached to a module, type or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityDeclaration {
    /// The security action (`Demand`, `LinkDemand`, `Assert`, ...).
    pub action: String,
    /// The serialized permission set.
    pub permission_set: String,
}
