use thiserror::Error;

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
/// This enum covers all possible error conditions that can occur while decoding SPIR-V
/// binaries, building analyses over a module, and restructuring or reducing it. Each
/// variant provides specific context about the failure mode to enable appropriate
/// error handling.
///
/// Expected outcomes are never errors: a folding rule that cannot fold returns `None`,
/// a reduction chunk that fails validation or the interestingness test is silently
/// discarded, and a reduction session that runs out of opportunities terminates
/// cleanly. Only malformed input and broken caller preconditions surface here.
///
/// # Error Categories
///
/// ## Binary Decoding Errors
/// - [`Error::Malformed`] - Corrupted or invalid module structure
/// - [`Error::OutOfBounds`] - Instruction claims more words than remain
/// - [`Error::Empty`] - Empty input provided
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// ## Structural Errors
/// - [`Error::InvariantViolation`] - A documented caller precondition was broken
/// - [`Error::GraphError`] - Control flow graph construction error
/// - [`Error::IdOverflow`] - The module's id bound cannot grow any further
///
/// # Examples
///
/// ```rust
/// use spvshrink::{spirv::binary, Error};
///
/// match binary::parse(&[]) {
///     Ok(module) => println!("decoded {} functions", module.functions().len()),
///     Err(Error::Empty) => eprintln!("no words to decode"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("malformed module: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Binary decoding errors
    /// The module words are damaged and could not be decoded.
    ///
    /// This error indicates that the word stream does not conform to the SPIR-V
    /// binary layout, such as a bad magic number, an instruction with a zero word
    /// count, or a section ordering violation. The error includes the source
    /// location where the malformation was detected for debugging purposes.
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

    /// An out of bound access was attempted while decoding the word stream.
    ///
    /// This error occurs when an instruction's declared word count extends past
    /// the end of the module. It's a safety check to prevent reads beyond the
    /// provided buffer during decoding.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    ///
    /// This error occurs when an empty file or word buffer is provided where
    /// an actual SPIR-V module was expected.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A documented caller precondition was violated.
    ///
    /// This error is raised for structural misuse of the transformation APIs,
    /// such as cloning a loop from a block list that is not dominance ordered,
    /// or rewriting a loop whose header is missing from the function. It is
    /// distinct from "could not reduce/fold further", which is an expected
    /// outcome and never an error.
    #[error("Invariant violation - {0}")]
    InvariantViolation(String),

    /// Control flow graph error.
    ///
    /// Errors related to building the control flow graph of a function, such
    /// as a branch targeting a label that does not belong to the function, or
    /// a function without any basic blocks.
    #[error("{0}")]
    GraphError(String),

    /// The module's id bound can no longer be advanced.
    ///
    /// Fresh result ids are allocated from the module header's bound. SPIR-V
    /// ids are 32-bit and the bound must stay strictly greater than every id
    /// in use, so allocation fails once the bound reaches the maximum value.
    #[error("The module id bound is exhausted")]
    IdOverflow,
}
