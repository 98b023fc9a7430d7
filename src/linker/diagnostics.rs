//! Diagnostic messages produced while linking.
//!
//! Every message carries a [`MessageCategory`], an optional `ILxxxx` code and an optional
//! [`MessageOrigin`]. The origin of a message raised inside a method body is the method plus
//! the IL offset of the offending instruction; it is mapped to a source location through the
//! method's sequence points when the message is reported.
//!
//! # Key Components
//!
//! - [`Diagnostics`] - Append-only sink with warning suppression and promotion
//! - [`LinkerMessage`] - A single reported message
//! - [`MessageOrigin`] - Where a message comes from
//! - [`codes`] - The message codes emitted by the linker
//!
//! # Usage
//!
//! ```rust,ignore
//! use dotlink::linker::{Diagnostics, LinkerMessage, MessageCategory};
//!
//! let mut diagnostics = Diagnostics::new();
//! diagnostics.set_warn_as_error(true);
//! diagnostics.report(LinkerMessage::warning(2007, "Could not resolve assembly 'Foo'"));
//!
//! assert!(diagnostics.has_errors());
//! for message in diagnostics.iter() {
//!     eprintln!("{message}");
//! }
//! ```
//!
//! # Integration
//!
//! Every reported message is mirrored to the `log` facade, so a binary that installs a logger
//! sees warnings and errors as they happen. The collected messages decide the exit status of
//! the driver.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::graph::{SymbolGraph, SymbolId};

/// Message codes emitted by the linker.
pub mod codes {
    /// A descriptor names a type that does not exist.
    pub const XML_TYPE_NOT_FOUND: u32 = 2001;
    /// A descriptor names a member that does not exist.
    pub const XML_MEMBER_NOT_FOUND: u32 = 2002;
    /// A substitution file names a method or field that does not exist.
    pub const SUBSTITUTION_TARGET_NOT_FOUND: u32 = 2003;
    /// A referenced assembly could not be found.
    pub const UNRESOLVED_ASSEMBLY: u32 = 2007;
    /// A referenced type could not be found.
    pub const UNRESOLVED_TYPE: u32 = 2008;
    /// A referenced member could not be found.
    pub const UNRESOLVED_MEMBER: u32 = 2009;
    /// A dependency attribute names a target that does not exist.
    pub const DYNAMIC_DEPENDENCY_NOT_FOUND: u32 = 2036;
    /// Code calls a method that requires unreferenced code.
    pub const REQUIRES_UNREFERENCED_CODE: u32 = 2026;
    /// `RequiresUnreferencedCode` lacks its message argument.
    pub const REQUIRES_UNREFERENCED_CODE_MISSING_MESSAGE: u32 = 2028;
    /// A linker attribute is applied where it has no meaning.
    pub const ATTRIBUTE_INVALID_TARGET: u32 = 2029;
    /// An attribute definition file or descriptor could not be processed.
    pub const XML_INVALID: u32 = 2030;
    /// A root assembly could not be found.
    pub const ROOT_ASSEMBLY_NOT_FOUND: u32 = 1032;
    /// A root symbol could not be found.
    pub const ROOT_NOT_FOUND: u32 = 1033;
}

/// Severity of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    /// A fatal problem; the run fails.
    Error,
    /// A recoverable problem.
    Warning,
    /// Progress information.
    Info,
    /// Verbose tracing, kept only in verbose mode.
    Diagnostic,
    /// A warning promoted by `--warnaserror`; the run fails.
    WarningAsError,
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageCategory::Error | MessageCategory::WarningAsError => write!(f, "error"),
            MessageCategory::Warning => write!(f, "warning"),
            MessageCategory::Info => write!(f, "info"),
            MessageCategory::Diagnostic => write!(f, "diagnostic"),
        }
    }
}

/// Where a message originates: a source position or a symbol, optionally at an IL offset.
///
/// Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MessageOrigin {
    /// Source or descriptor file.
    pub file: Option<String>,
    /// The symbol the message is about.
    pub member: Option<SymbolId>,
    /// 1-based line, 0 when unknown.
    pub line: u32,
    /// 1-based column, 0 when unknown.
    pub column: u32,
    /// IL offset inside `member` when it is a method.
    pub il_offset: Option<u32>,
}

impl MessageOrigin {
    /// An origin inside a file.
    #[must_use]
    pub fn from_file(file: impl Into<String>, line: u32, column: u32) -> Self {
        MessageOrigin {
            file: Some(file.into()),
            line,
            column,
            ..MessageOrigin::default()
        }
    }

    /// An origin at a symbol, optionally at an IL offset in its body.
    #[must_use]
    pub fn from_member(member: SymbolId, il_offset: Option<u32>) -> Self {
        MessageOrigin {
            member: Some(member),
            il_offset,
            ..MessageOrigin::default()
        }
    }

    /// Formats the source location, consulting the sequence points of a method origin.
    ///
    /// The nearest sequence point at or before the IL offset (0 when absent) supplies file,
    /// line and column. Returns `None` when no file is known.
    #[must_use]
    pub fn location(&self, graph: &SymbolGraph) -> Option<String> {
        let mut file = self.file.clone();
        let mut line = self.line;
        let mut column = self.column;

        let point = self
            .member
            .and_then(|id| graph.get(id))
            .and_then(|symbol| symbol.as_method())
            .and_then(|method| method.debug.as_ref())
            .and_then(|debug| debug.find_by_il_offset(self.il_offset.unwrap_or(0)));
        if let Some(point) = point {
            file = Some(point.document.clone());
            line = point.start_line;
            column = point.start_column;
        }

        let mut text = file?;
        if line != 0 {
            text.push_str(&format!("({line}"));
            if column != 0 {
                text.push_str(&format!(",{column}"));
            }
            text.push(')');
        }
        Some(text)
    }

    /// Formats the origin for a message prefix: the source location, else the member name.
    #[must_use]
    pub fn render(&self, graph: &SymbolGraph) -> Option<String> {
        self.location(graph).or_else(|| {
            self.member
                .and_then(|id| graph.get(id))
                .map(|symbol| graph.reference_to(symbol.id).to_string())
        })
    }
}

/// A reported message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkerMessage {
    /// Severity.
    pub category: MessageCategory,
    /// `IL` code, if any.
    pub code: Option<u32>,
    /// Message text.
    pub text: String,
    /// Rendered origin.
    pub origin: Option<String>,
}

impl LinkerMessage {
    /// Creates a message without origin.
    #[must_use]
    pub fn new(category: MessageCategory, code: Option<u32>, text: impl Into<String>) -> Self {
        LinkerMessage {
            category,
            code,
            text: text.into(),
            origin: None,
        }
    }

    /// Creates a warning.
    #[must_use]
    pub fn warning(code: u32, text: impl Into<String>) -> Self {
        Self::new(MessageCategory::Warning, Some(code), text)
    }

    /// Creates an error.
    #[must_use]
    pub fn error(code: u32, text: impl Into<String>) -> Self {
        Self::new(MessageCategory::Error, Some(code), text)
    }

    /// Attaches a rendered origin.
    #[must_use]
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    /// Returns true for errors and promoted warnings.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(
            self.category,
            MessageCategory::Error | MessageCategory::WarningAsError
        )
    }
}

impl fmt::Display for LinkerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin.as_deref().unwrap_or("ILLink"), self.category)?;
        if let Some(code) = self.code {
            write!(f, " IL{code:04}")?;
        }
        write!(f, ": {}", self.text)
    }
}

/// Collected messages plus the warning policy.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: boxcar::Vec<LinkerMessage>,
    warn_as_error: bool,
    warn_as_error_codes: FxHashSet<u32>,
    no_warn: FxHashSet<u32>,
    verbose: bool,
}

impl Diagnostics {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Promotes every warning to an error.
    pub fn set_warn_as_error(&mut self, enabled: bool) {
        self.warn_as_error = enabled;
    }

    /// Promotes the given warning codes to errors.
    pub fn add_warn_as_error_codes(&mut self, codes: impl IntoIterator<Item = u32>) {
        self.warn_as_error_codes.extend(codes);
    }

    /// Suppresses the given warning codes.
    pub fn add_no_warn(&mut self, codes: impl IntoIterator<Item = u32>) {
        self.no_warn.extend(codes);
    }

    /// Keeps [`MessageCategory::Diagnostic`] messages.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Returns true if verbose messages are kept.
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Applies the warning policy to `message`, stores it and mirrors it to the log.
    ///
    /// Returns false if the message was dropped.
    pub fn report(&self, mut message: LinkerMessage) -> bool {
        match message.category {
            MessageCategory::Warning => {
                if message.code.is_some_and(|code| self.no_warn.contains(&code)) {
                    return false;
                }
                if self.warn_as_error
                    || message
                        .code
                        .is_some_and(|code| self.warn_as_error_codes.contains(&code))
                {
                    message.category = MessageCategory::WarningAsError;
                }
            }
            MessageCategory::Diagnostic if !self.verbose => return false,
            _ => {}
        }

        match message.category {
            MessageCategory::Error | MessageCategory::WarningAsError => log::error!("{message}"),
            MessageCategory::Warning => log::warn!("{message}"),
            MessageCategory::Info => log::info!("{message}"),
            MessageCategory::Diagnostic => log::debug!("{message}"),
        }

        self.entries.push(message);
        true
    }

    /// Iterates over the stored messages in report order.
    pub fn iter(&self) -> impl Iterator<Item = &LinkerMessage> {
        self.entries.iter().map(|(_, message)| message)
    }

    /// Returns the number of stored messages.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Returns true if any error or promoted warning was stored.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.iter().any(LinkerMessage::is_error)
    }

    /// Returns the stored messages with the given code.
    #[must_use]
    pub fn with_code(&self, code: u32) -> Vec<&LinkerMessage> {
        self.iter().filter(|m| m.code == Some(code)).collect()
    }
}
