//! Errors reported at the API boundary.

use thiserror::Error;

use crate::words::Letter;

/// The error type for the validating operations of the library.
///
/// Every variant carries a formatted message naming the offending value
/// and, where applicable, the allowable set. Internal recursion uses the
/// `*_no_checks` entry points and never constructs these.
#[derive(Debug, Error)]
pub enum Error {
    /// A letter used in a rule, generating pair or query word does not
    /// belong to the alphabet.
    #[error("invalid letter {letter}, expected one of {alphabet:?}")]
    InvalidLetter {
        letter: Letter,
        alphabet: Vec<Letter>,
    },

    /// The alphabet contains duplicates or exceeds the maximum size.
    #[error("invalid alphabet: {0}")]
    InvalidAlphabet(String),

    /// The inverse map is not an involution, or contradicts the identity.
    #[error("invalid inverses: {0}")]
    InvalidInverses(String),

    /// A rule has an unpaired side, or an empty side when the empty word
    /// is not permitted.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Two generators have different degrees.
    #[error("incompatible degrees: found {found}, expected {expected}")]
    IncompatibleDegree { expected: usize, found: usize },

    /// Attempt to mutate structural invariants after a run has begun.
    #[error("cannot {0} after the algorithm has started")]
    AlreadyStarted(&'static str),

    /// An index past the currently enumerated size.
    #[error("index {index} out of range, expected value in [0, {bound})")]
    OutOfRange { index: usize, bound: usize },

    /// The operation is not implemented for this combination of inputs.
    #[error("not yet implemented: {0}")]
    NotYetImplemented(&'static str),

    /// A query against an inverse presentation whose inverses have not
    /// been defined.
    #[error("no inverses have been defined")]
    NoInverses,
}

/// A specialized result type for the fallible operations of the library.
pub type Result<T> = std::result::Result<T, Error>;
