//! Name-based references between symbols.
//!
//! Symbols inside one module refer to each other through [`crate::graph::SymbolId`]s, but
//! everything that may cross an assembly boundary (base types, call targets, attribute types,
//! ...) is stored as a [`SymbolRef`] and resolved on demand through the link context. This
//! mirrors how metadata references work: a `TypeRef` or `MemberRef` names its target and is
//! bound to a definition only when the defining assembly has been loaded.
//!
//! # Textual Form
//!
//! ```text
//! [Assembly]Namespace.Type                 type
//! [Assembly]Namespace.Outer/Inner          nested type
//! [Assembly]Namespace.Type::Member         field, method, property or event
//! Namespace.Type::Member                   same assembly as the referencing document
//! ```

use std::fmt;

use crate::Result;

/// Separator between a type name and a member name.
pub const MEMBER_SEPARATOR: &str = "::";

/// Separator between an enclosing type and a nested type.
pub const NESTED_SEPARATOR: char = '/';

/// A reference to a symbol by assembly name and full name.
///
/// Equality and hashing are structural, so a `SymbolRef` can be used as a cache key for
/// resolution results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolRef {
    /// Name of the assembly that defines the target.
    pub assembly: String,
    /// Full name of the target (`Ns.Type`, `Ns.Outer/Inner` or `Ns.Type::Member`).
    pub name: String,
}

impl SymbolRef {
    /// Creates a new reference.
    ///
    /// # Arguments
    ///
    /// * `assembly` - Name of the defining assembly
    /// * `name` - Full name of the target symbol
    pub fn new(assembly: impl Into<String>, name: impl Into<String>) -> Self {
        SymbolRef {
            assembly: assembly.into(),
            name: name.into(),
        }
    }

    /// Parses the textual form, falling back to `default_assembly` when no `[Assembly]` prefix
    /// is present.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for an unterminated assembly prefix or an empty name.
    pub fn parse(text: &str, default_assembly: &str) -> Result<Self> {
        let text = text.trim();
        let (assembly, name) = if let Some(rest) = text.strip_prefix('[') {
            let Some(end) = rest.find(']') else {
                return Err(malformed_error!("Unterminated assembly name in '{}'", text));
            };
            (&rest[..end], &rest[end + 1..])
        } else {
            (default_assembly, text)
        };

        if name.is_empty() || assembly.is_empty() {
            return Err(malformed_error!("Invalid symbol reference '{}'", text));
        }

        Ok(SymbolRef::new(assembly, name))
    }

    /// Returns the type part of the name, dropping any `::Member` suffix.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self.name.find(MEMBER_SEPARATOR) {
            Some(pos) => &self.name[..pos],
            None => &self.name,
        }
    }

    /// Returns the member part of the name, if this references a member.
    #[must_use]
    pub fn member_name(&self) -> Option<&str> {
        self.name
            .find(MEMBER_SEPARATOR)
            .map(|pos| &self.name[pos + MEMBER_SEPARATOR.len()..])
    }

    /// Returns a reference to the declaring type when this references a member.
    #[must_use]
    pub fn declaring_type(&self) -> Option<SymbolRef> {
        self.member_name()
            .map(|_| SymbolRef::new(self.assembly.clone(), self.type_name()))
    }

    /// Formats the reference relative to `assembly`, omitting the prefix when it matches.
    #[must_use]
    pub fn relative_to(&self, assembly: &str) -> String {
        if self.assembly == assembly {
            self.name.clone()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.assembly, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_and_without_assembly() {
        let r = SymbolRef::parse("[Utils]Utils.Helper::Run", "App").unwrap();
        assert_eq!(r.assembly, "Utils");
        assert_eq!(r.name, "Utils.Helper::Run");
        assert_eq!(r.type_name(), "Utils.Helper");
        assert_eq!(r.member_name(), Some("Run"));

        let r = SymbolRef::parse("Program", "App").unwrap();
        assert_eq!(r, SymbolRef::new("App", "Program"));
        assert_eq!(r.member_name(), None);
        assert!(r.declaring_type().is_none());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(SymbolRef::parse("[Utils", "App").is_err());
        assert!(SymbolRef::parse("[Utils]", "App").is_err());
        assert!(SymbolRef::parse("   ", "App").is_err());
    }

    #[test]
    fn relative_formatting() {
        let r = SymbolRef::new("App", "A::B");
        assert_eq!(r.relative_to("App"), "A::B");
        assert_eq!(r.relative_to("Other"), "[App]A::B");
    }
}
