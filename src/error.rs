use std::error::Error as StdError;
use std::result::Result as StdResult;

/// A specialized `Result` type for this crate.
pub type Result<T> = StdResult<T, Error>;

// Convenience type alias for usage within the crate.
pub(crate) type BoxDynError = Box<dyn StdError + 'static + Send + Sync>;

/// Represents all the ways an operation can fail within this layer.
///
/// The split mirrors the classic DB-API taxonomy: interface misuse,
/// programming mistakes in the submitted command, operational failures
/// reported by the native client, and client-side conversion failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The cursor or its connection has already been closed.
    #[error("{0}")]
    Interface(&'static str),

    /// The submitted command itself is invalid (empty query, incomplete
    /// placeholder, fetching from a statement that returned no rows, ...).
    #[error("{0}")]
    Programming(String),

    /// Error reported by the native client library.
    #[error("{message}")]
    Operational {
        /// Error text extracted from the native connection or result.
        message: String,
    },

    /// The command template and its parameters do not agree.
    #[error("{0}")]
    InvalidFormat(String),

    /// No adapter is registered for the value's type and the value does
    /// not adapt itself.
    #[error("can't adapt type `{type_name}`")]
    Adaptation {
        /// Name of the offending Rust type.
        type_name: &'static str,
    },

    /// Error occurred while decoding a value.
    #[error("error occurred while decoding: {0}")]
    Decode(#[source] BoxDynError),

    /// Error occurred while decoding a value in a specific column.
    #[error("error occurred while decoding column {index}: {source}")]
    ColumnDecode {
        /// Zero-based column index.
        index: usize,

        #[source]
        source: BoxDynError,
    },

    /// The requested operation is not supported by this driver.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl Error {
    pub(crate) fn decode(err: impl Into<BoxDynError>) -> Self {
        Error::Decode(err.into())
    }

    pub(crate) fn decode_msg(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into().into())
    }
}
