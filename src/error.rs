use thiserror::Error;

use crate::graph::SymbolRef;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the error taxonomy of a linking run. Configuration problems are
/// detected before any step executes and abort the run without producing output. Resolution
/// problems are normally downgraded to diagnostics by the caller and only surface here when
/// strict resolution is requested. Everything a step returns is wrapped by the pipeline into
/// [`Error::StepFailed`] so the failing subsystem is known when the error reaches the driver.
///
/// # Error Categories
///
/// ## Configuration Errors
/// - [`Error::Configuration`] - Bad option shape, unknown value or contradictory flags
/// - [`Error::StepNotFound`] - A pipeline insertion referenced a step that does not exist
/// - [`Error::DuplicateStep`] - A step name is already taken in the pipeline
/// - [`Error::PipelineLocked`] - A running step tried to edit the already-executed region
///
/// ## Input Errors
/// - [`Error::Malformed`] - Corrupted or invalid module document or descriptor
/// - [`Error::DuplicateSymbol`] - Two symbols share a full name inside one assembly
/// - [`Error::Xml`] - Descriptor could not be parsed
/// - [`Error::Json`] - Module document could not be parsed or written
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// ## Run-time Errors
/// - [`Error::Unresolved`] - A reference or assembly could not be resolved in strict mode
/// - [`Error::StepFailed`] - A step failed; carries the step name
/// - [`Error::Error`] - Miscellaneous fatal failure
///
/// # Examples
///
/// ```rust,ignore
/// use dotlink::{Error, linker::{steps::SealerStep, Pipeline}};
///
/// let mut pipeline = Pipeline::new();
/// match pipeline.add_step_before("MarkStep", Box::new(SealerStep::new())) {
///     Err(Error::StepNotFound(name)) => eprintln!("no step named {name}"),
///     Err(e) => eprintln!("Other error: {}", e),
///     Ok(()) => {}
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The linker was configured with invalid or contradictory options.
    ///
    /// Raised while parsing the command line or applying driver options, before any
    /// pipeline step runs. No partial state is produced.
    #[error("Configuration error - {0}")]
    Configuration(String),

    /// A pipeline step referenced by name could not be found.
    ///
    /// Returned by [`crate::linker::Pipeline::add_step_before`] and
    /// [`crate::linker::Pipeline::add_step_after`] when the anchor step is absent.
    #[error("Pipeline step '{0}' could not be found")]
    StepNotFound(String),

    /// A step with the same name already exists in the pipeline.
    #[error("Pipeline step '{0}' already exists")]
    DuplicateStep(String),

    /// A running step attempted to edit the part of the pipeline that already executed.
    ///
    /// Steps may only insert after the step that is currently running; everything at or
    /// before the cursor is frozen for the rest of the pass.
    #[error("Pipeline edit rejected - {0}")]
    PipelineLocked(String),

    /// The input is damaged and could not be parsed.
    ///
    /// This error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Two symbols with the same full name were added to one assembly.
    #[error("Duplicate symbol - {0}")]
    DuplicateSymbol(SymbolRef),

    /// A reference could not be resolved and unresolved references are fatal.
    #[error("Could not resolve '{0}'")]
    Unresolved(String),

    /// An XML descriptor, substitution or attribute definition file could not be read.
    #[error("XML error in {source_name} - {message}")]
    Xml {
        /// The descriptor the error was found in
        source_name: String,
        /// The message reported by the XML reader
        message: String,
    },

    /// A module document could not be (de)serialized.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A pipeline step failed.
    ///
    /// The pipeline wraps every error escaping a step with the step name so the
    /// failing subsystem can be reported.
    #[error("Step '{step}' failed - {source}")]
    StepFailed {
        /// Name of the failing step
        step: String,
        /// The underlying failure
        source: Box<Error>,
    },

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Builds an [`Error::Xml`] from any displayable reader error.
    pub(crate) fn xml(source_name: &str, message: impl std::fmt::Display) -> Self {
        Error::Xml {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }
}
