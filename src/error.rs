/*!
The wire-stable error taxonomy returned by this crate.

There's no exception control flow anywhere in the core: every fallible
operation returns a `Result<_, Error>` and callers are expected to map
`Error` onto whatever wire protocol they're serving.
*/

use std::fmt;

/// Errors returned by path parsing, matching, validation, and mutation.
///
/// Values are grouped by family in the order they appear in spec §7, but the
/// enum itself carries no explicit discriminants: nothing in this crate
/// serializes the discriminant value directly, so renumbering is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The requested path does not exist in the document.
    PathEnoent,
    /// An existing document entry has the wrong type for the path.
    PathMismatch,
    /// The path does not parse.
    PathEinval,
    /// The path is too long or too deep to traverse.
    PathE2big,
    /// The document reference exists but isn't JSON (or isn't well-formed up
    /// to the point the matcher needed to read).
    DocNotjson,
    /// The document is too deeply nested to parse.
    DocEtoodeep,
    /// An add-variant command collided with an existing element.
    DocEexists,
    /// The number addressed by a `COUNTER` command couldn't be parsed as an
    /// `i64`.
    NumE2big,
    /// Combining the existing number with the delta would over/underflow.
    DeltaOverflow,
    /// The delta is zero, not a whole number, or out of `i64` range.
    DeltaEinval,
    /// The supplied value isn't valid JSON in the context it would be
    /// inserted into.
    ValueCantinsert,
    /// A command that requires a value wasn't given one.
    ValueEmpty,
    /// Inserting the supplied value would push the document past the depth
    /// limit.
    ValueEtoodeep,
    /// The command code isn't supported.
    GlobalEnosupport,
}

impl Error {
    /// A short, stable description suitable for logging or wire mapping.
    pub fn description(&self) -> &'static str {
        match self {
            Error::PathEnoent => "requested path does not exist in document",
            Error::PathMismatch => {
                "the path specified treats an existing document entry as the wrong type"
            }
            Error::PathEinval => "path syntax error",
            Error::PathE2big => "the path is too big",
            Error::DocNotjson => "the document is not JSON",
            Error::DocEtoodeep => "the document is too deep to parse",
            Error::DocEexists => "the requested path already exists",
            Error::NumE2big => "the number specified by the path is too big",
            Error::DeltaOverflow => {
                "combining the existing number with the delta would over/underflow"
            }
            Error::DeltaEinval => "delta is either not a number, 0, or not within range of i64",
            Error::ValueCantinsert => {
                "the new value cannot be inserted in the context of the path, as it would invalidate the JSON"
            }
            Error::ValueEmpty => "expected non-empty value for command",
            Error::ValueEtoodeep => "adding this value would make the document too deep",
            Error::GlobalEnosupport => "operation not implemented",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
