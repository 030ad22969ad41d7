//! Abstraction over a libpq-style native client library.
//!
//! The cursor layer never talks to a socket itself. It drives an
//! implementation of [`PqConnection`] and inspects the opaque result
//! handles it returns. Result handles are owned values: the native
//! resources they wrap are released exactly once, when the handle is
//! dropped, so replacing a cursor's held result cannot double-free.

/// Outcome of a non-blocking flush of the native write buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The write buffer was fully flushed; wait for the server to respond.
    Done,

    /// Data remains queued; the caller must wait for write readiness.
    Pending,

    /// The flush failed at the native level.
    Failed,
}

/// Execution status of a native result handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    /// A command that returns no rows (DDL, DML) completed successfully.
    CommandOk,

    /// A row-returning command completed successfully.
    TuplesOk,

    /// The submitted query string was empty.
    EmptyQuery,

    /// A fatal error occurred; details are in the result's error fields.
    FatalError,

    /// Any other native status (bad response, copy states, ...).
    Other,
}

/// Introspection over one opaque native result handle.
///
/// Cell coordinates are `(row, column)`, both zero-based. Implementations
/// release the underlying native resource in their `Drop`.
pub trait PqResult {
    /// Execution status of this result.
    fn status(&self) -> ResultStatus;

    /// Command-completion tag, e.g. `INSERT 0 1`.
    fn command_status(&self) -> Option<String>;

    /// Affected-row count as reported by the server, as text.
    ///
    /// Empty or absent when the command does not report one.
    fn command_tuples(&self) -> Option<String>;

    /// OID of an inserted row, or 0 when not applicable.
    fn oid_value(&self) -> u32;

    /// Number of rows in the result set.
    fn ntuples(&self) -> usize;

    /// Number of columns in the result set.
    fn nfields(&self) -> usize;

    /// Name of the given field.
    fn field_name(&self, field: usize) -> String;

    /// Wire type OID of the given field.
    fn field_type(&self, field: usize) -> u32;

    /// Byte size of the given field, or -1 for variable-width types.
    fn field_size(&self, field: usize) -> i32;

    /// Type modifier word of the given field (-1 when unset).
    fn field_mod(&self, field: usize) -> i32;

    /// Whether the given cell is SQL NULL.
    fn is_null(&self, row: usize, field: usize) -> bool;

    /// Raw bytes of the given cell, at their reported length.
    ///
    /// Never called for NULL cells; NULL detection happens first.
    fn value(&self, row: usize, field: usize) -> &[u8];

    /// Error message attached to this result.
    fn error_message(&self) -> String;
}

/// A native connection handle, libpq style.
///
/// Synchronous execution runs the full round-trip in [`exec`]; asynchronous
/// execution splits it into [`send_query`] / [`flush`] and a later
/// [`get_result`] once the connection polls ready.
///
/// [`exec`]: Self::exec
/// [`send_query`]: Self::send_query
/// [`flush`]: Self::flush
/// [`get_result`]: Self::get_result
pub trait PqConnection {
    /// The result handle type produced by this connection.
    type Result: PqResult;

    /// Run a command to completion, returning its result handle.
    ///
    /// `None` signals a native-level failure; the error text is then
    /// available from [`error_message`](Self::error_message).
    fn exec(&mut self, query: &[u8]) -> Option<Self::Result>;

    /// Submit a command without waiting for its result.
    ///
    /// Returns `false` on native-level failure.
    fn send_query(&mut self, query: &[u8]) -> bool;

    /// Attempt to flush queued output without blocking.
    fn flush(&mut self) -> FlushOutcome;

    /// Collect the result of a previously sent command, once ready.
    fn get_result(&mut self) -> Option<Self::Result>;

    /// Server version number, e.g. `90600` for 9.6, `140005` for 14.5.
    fn server_version(&self) -> u32;

    /// Escape a byte string for use inside a bytea literal, honoring the
    /// connection's escaping configuration.
    fn escape_bytea(&self, data: &[u8]) -> Vec<u8>;

    /// Escape a string for use inside a quoted literal, honoring the
    /// connection's escaping configuration. Quotes are not included.
    fn escape_string(&self, data: &[u8]) -> Vec<u8>;

    /// Produce a complete quoted literal (quotes included) in a single
    /// call. `None` when the server does not support it (pre-9.0).
    fn escape_literal(&self, data: &[u8]) -> Option<Vec<u8>>;

    /// Error text from the native connection's error state.
    fn error_message(&self) -> String;
}

/// Context-free bytea escaping, usable without a connection.
///
/// Produces the hex form: `\x` followed by two hex digits per byte. When
/// `standard_strings` is false the backslash must itself be doubled so it
/// survives backslash-escape processing inside the literal.
pub fn escape_bytea(data: &[u8], standard_strings: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2 + 4);

    if standard_strings {
        out.extend_from_slice(b"\\x");
    } else {
        out.extend_from_slice(b"\\\\x");
    }

    out.extend_from_slice(hex::encode(data).as_bytes());
    out
}

/// Context-free string escaping, usable without a connection.
///
/// Doubles single quotes; when `standard_strings` is false, backslashes
/// are doubled as well. Quotes are not included in the output.
pub fn escape_string(data: &[u8], standard_strings: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 2);

    for &b in data {
        match b {
            b'\'' => out.extend_from_slice(b"''"),
            b'\\' if !standard_strings => out.extend_from_slice(b"\\\\"),
            _ => out.push(b),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{escape_bytea, escape_string};

    #[test]
    fn escapes_bytea_as_hex() {
        assert_eq!(escape_bytea(b"AB", true), b"\\x4142");
        assert_eq!(escape_bytea(b"AB", false), b"\\\\x4142");
        assert_eq!(escape_bytea(b"", true), b"\\x");
    }

    #[test]
    fn doubles_quotes_in_strings() {
        assert_eq!(escape_string(b"it's", true), b"it''s");
        assert_eq!(escape_string(b"a\\b", true), b"a\\b");
        assert_eq!(escape_string(b"a\\b", false), b"a\\\\b");
    }
}
