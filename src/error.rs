use thiserror::Error;

use crate::metadata::token::{Token, TypeKey};

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

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Image Errors
/// - [`Error::Malformed`] - Corrupted or invalid image structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a buffer
/// - [`Error::NotSupported`] - Unsupported format version or feature
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::SymbolMismatch`] - Debug symbols belong to a different image
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// ## Type Tree and Resolution Errors
/// - [`Error::NotInTree`] - A query target was never indexed
/// - [`Error::NotConcrete`] - A generic base still carries open parameters
/// - [`Error::TypeMismatch`] - An already concrete generic slot does not match
/// - [`Error::NoUnification`] - No candidate parent reference unifies
/// - [`Error::DuplicateTypeRegistration`] - Two definitions share one identity key
/// - [`Error::TypeNotFound`] - A type name could not be resolved
///
/// ## Weaving Errors
/// - [`Error::NoParameterlessConstructor`] - A descendant cannot be constructed
/// - [`Error::MissingAccessor`] - A member lacks a required accessor
/// - [`Error::NameCollision`] - A synthesized name clashes with an existing one
/// - [`Error::StackImbalance`] - A rewritten method body fails stack analysis
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::{Error, image::ImageReader};
///
/// let image = std::fs::read("Game.dwm")?;
/// match ImageReader::read(&image, None) {
///     Ok(module) => println!("Loaded {} types", module.types().len()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed image: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The image is damaged and could not be parsed.
    ///
    /// Includes the source location where the problem was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the image.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// This image format version or construct is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The debug symbol stream does not belong to the image it was supplied with.
    #[error("Debug symbols do not match the image - expected {expected}, found {found}")]
    SymbolMismatch {
        /// Image id stored in the image header
        expected: uguid::Guid,
        /// Image id stored in the symbol stream
        found: uguid::Guid,
    },

    /// A type name could not be resolved against any loaded module.
    #[error("Failed to find type - {0}")]
    TypeNotFound(String),

    /// A token does not reference a row of the expected table.
    #[error("Invalid token for this context - {0}")]
    InvalidToken(Token),

    /// A descendant query targeted a type that was never indexed.
    #[error("Type is not part of the type tree - {0}")]
    NotInTree(String),

    /// A generic base passed to resolution still carries open parameters.
    #[error("Generic base is not concrete - {0}")]
    NotConcrete(String),

    /// A concrete slot of the partial parent reference differs from the concrete base.
    #[error("Generic argument mismatch - expected {expected}, found {found}")]
    TypeMismatch {
        /// The argument required by the concrete base
        expected: String,
        /// The argument found in the descendant's parent reference
        found: String,
    },

    /// None of the descendant's parent references unify with the concrete base.
    #[error("No parent reference unifies with {0}")]
    NoUnification(String),

    /// Two distinct metadata entries resolved to the same identity key.
    #[error("Duplicate type registration - {0}")]
    DuplicateTypeRegistration(TypeKey),

    /// A descendant has no accessible parameterless instance constructor.
    #[error("No accessible parameterless constructor - {0}")]
    NoParameterlessConstructor(String),

    /// A member lacks an accessor required for instrumentation.
    #[error("Member {member} has no {accessor}")]
    MissingAccessor {
        /// The member that is being processed
        member: String,
        /// The missing accessor (`getter` or `setter`)
        accessor: &'static str,
    },

    /// A synthesized name clashes with an existing definition.
    #[error("Name collision - {0}")]
    NameCollision(String),

    /// A marker interface cannot be implemented from the module generating the classes.
    #[error("Marker interface is not accessible from other modules - {0}")]
    InaccessibleMarker(String),

    /// A method body does not keep a consistent evaluation stack.
    #[error("Stack imbalance at IL_{offset:04x} - expected depth {expected}, found {found}")]
    StackImbalance {
        /// Byte offset, or instruction index for un-encoded streams
        offset: usize,
        /// The depth recorded on a previous path
        expected: usize,
        /// The depth found on the current path
        found: usize,
    },

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
