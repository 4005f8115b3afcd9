use std::{fmt, sync::Arc};

use thiserror::Error;

macro_rules! resolution_error {
    // Single string version
    ($name:expr, $msg:expr) => {
        crate::Error::TypeResolution {
            name: $name.to_string(),
            reason: $msg.to_string(),
        }
    };

    // Format string with arguments version
    ($name:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::TypeResolution {
            name: $name.to_string(),
            reason: format!($fmt, $($arg)*),
        }
    };
}

macro_rules! conversion_error {
    ($expected:expr, $found:expr) => {
        crate::Error::Conversion {
            expected: $expected.to_string(),
            found: $found.to_string(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Bridge Errors
/// These are raised while a script touches host items. Inside a script they all look the same,
/// a failed external call; the host caller of `execute`/`evaluate` receives them wrapped in
/// [`Error::ExternalCall`] with the original error preserved.
/// - [`Error::TypeResolution`] - Name, generic arity or assembly lookup failure
/// - [`Error::AccessDenied`] - Member visibility policy violation
/// - [`Error::MemberNotFound`] - The host item has no member with the requested name
/// - [`Error::Conversion`] - Shape or type mismatch while marshaling
/// - [`Error::OverloadResolution`] - No (or no unique) signature accepts the arguments
/// - [`Error::HostInvocation`] - A host member implementation reported a failure
/// - [`Error::IndexOutOfBounds`] - Array access outside the array bounds
///
/// ## Binding Errors
/// - [`Error::InvalidBinding`] - A scalar value was bound as a named host item
///
/// ## Execution Errors
/// - [`Error::ExecutionCancelled`] - Interrupt or cooperative cancellation
/// - [`Error::LimitExceeded`] - A configured script limit tripped
/// - [`Error::ScriptFault`] - Unhandled error raised by script code
/// - [`Error::Parse`] - Script text failed to compile
/// - [`Error::ExternalCall`] - A bridge error that propagated out of a script
///
/// ## Engine Errors
/// - [`Error::EngineBusy`] - Script state requested while held by the running script
/// - [`Error::Disposed`] - The engine has been disposed
/// - [`Error::InvalidConfiguration`] - Rejected [`crate::EngineConfig`]
///
/// # Examples
///
/// ```rust,no_run
/// use hostbridge::{Error, ScriptEngine};
///
/// # fn run(engine: &ScriptEngine) {
/// match engine.execute("obj.PrivateMethod()") {
///     Ok(()) => println!("called"),
///     Err(Error::ExternalCall(inner)) => match inner.as_ref() {
///         Error::AccessDenied { member, .. } => eprintln!("{} is not visible", member),
///         other => eprintln!("host call failed: {}", other),
///     },
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A host type could not be resolved.
    ///
    /// Raised for unknown names, unknown assembly hints, wrong generic arity, closing an
    /// already-closed generic, and for construction or static access against an open
    /// generic definition.
    #[error("Type resolution failed for '{name}': {reason}")]
    TypeResolution {
        /// The requested type name
        name: String,
        /// Why the resolution failed
        reason: String,
    },

    /// The access policy rejected a member access.
    #[error("Access to member '{member}' of '{type_name}' denied")]
    AccessDenied {
        /// Full name of the type declaring the member
        type_name: String,
        /// The member that was accessed
        member: String,
    },

    /// The host item has no member with this name.
    #[error("Member '{member}' not found on '{type_name}'")]
    MemberNotFound {
        /// Display name of the host item's type
        type_name: String,
        /// The requested member name
        member: String,
    },

    /// A value could not be converted to the requested shape.
    #[error("Cannot convert {found} to {expected}")]
    Conversion {
        /// The requested host shape
        expected: String,
        /// Description of the value that was supplied
        found: String,
    },

    /// Overload resolution found no applicable, or more than one equally specific, signature.
    #[error("Overload resolution for '{member}({arguments})' failed: {reason}")]
    OverloadResolution {
        /// The invoked member
        member: String,
        /// Comma separated argument descriptions
        arguments: String,
        /// Why no signature was selected
        reason: String,
    },

    /// A value that is not reference-like was bound as a named host item.
    #[error("Cannot bind '{name}' as a host item: {reason}")]
    InvalidBinding {
        /// The binding name
        name: String,
        /// Why the binding was rejected
        reason: String,
    },

    /// A host member implementation failed.
    #[error("Host member '{member}' failed: {message}")]
    HostInvocation {
        /// The member that was invoked
        member: String,
        /// The failure reported by the implementation
        message: String,
    },

    /// Array access outside of the array bounds.
    #[error("Index {index} is out of bounds (length {length})")]
    IndexOutOfBounds {
        /// The offending index
        index: usize,
        /// The length of the addressed dimension
        length: usize,
    },

    /// A bridge error raised while a script was calling into the host.
    ///
    /// The script only observed a generic call failure; the original error is preserved
    /// here for the host.
    #[error("External call failed: {0}")]
    ExternalCall(Arc<Error>),

    /// The script run was interrupted or cooperatively cancelled.
    #[error("Script execution was cancelled")]
    ExecutionCancelled,

    /// A configured script limit tripped.
    #[error("Script limit exceeded: {0}")]
    LimitExceeded(LimitKind),

    /// The script raised an error it did not handle.
    #[error("Script error in '{document}' (line {line}): {message}")]
    ScriptFault {
        /// The document the script was running under
        document: String,
        /// 1-based line of the failure, 0 if unknown
        line: usize,
        /// The script error message
        message: String,
    },

    /// The script text failed to compile.
    #[error("Syntax error in '{document}' (line {line}): {message}")]
    Parse {
        /// The document the text was submitted under
        document: String,
        /// 1-based line of the failure, 0 if unknown
        line: usize,
        /// The parser message
        message: String,
    },

    /// Script state was requested while locked by the running script.
    #[error("Engine is busy: {0}")]
    EngineBusy(String),

    /// The engine has been disposed.
    #[error("Engine has been disposed")]
    Disposed,

    /// The engine configuration was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl Error {
    /// Returns `true` for [`Error::ExecutionCancelled`].
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::ExecutionCancelled)
    }

    /// Returns the innermost error, looking through [`Error::ExternalCall`] wrappers.
    #[must_use]
    pub fn root(&self) -> &Error {
        match self {
            Error::ExternalCall(inner) => inner.root(),
            other => other,
        }
    }
}

/// The script limit that terminated a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitKind {
    /// Maximum operation count was reached.
    Operations(u64),
    /// Maximum call depth was reached.
    CallDepth(usize),
    /// A string, array or map grew beyond its configured size.
    DataSize(String),
    /// The run exceeded its timeout, in milliseconds.
    Timeout(u64),
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Operations(max) => write!(f, "more than {} operations", max),
            LimitKind::CallDepth(max) => write!(f, "call depth above {}", max),
            LimitKind::DataSize(what) => write!(f, "{} too large", what),
            LimitKind::Timeout(ms) => write!(f, "timeout after {}ms", ms),
        }
    }
}
