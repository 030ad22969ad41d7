use std::cell::{Cell, RefCell};

use tracing::debug;

use crate::adapt::{Escaping, QuoteContext};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::pq::{PqConnection, PqResult, ResultStatus};
use crate::typecast::{self, Typecast, Typecasts};
use crate::type_id::PgTypeId;

/// Readiness the connection is waiting on while an asynchronous command
/// is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStatus {
    /// No asynchronous command pending.
    Ready,

    /// The command was flushed; wait for read readiness.
    Read,

    /// The write buffer is still partially queued; wait for write
    /// readiness.
    Write,
}

/// A connection wrapping one native connection handle.
///
/// Cursors borrow the connection; its mutable state lives behind
/// interior mutability so several cursors can coexist. This layer is
/// strictly single-threaded per connection; no internal locking is
/// performed.
pub struct Connection<C: PqConnection> {
    pub(crate) pq: RefCell<C>,
    equote: bool,
    encoding: String,
    asynchronous: bool,
    typecasts: RefCell<Typecasts>,
    async_status: Cell<AsyncStatus>,
    async_cursor: Cell<Option<u64>>,
    closed: Cell<bool>,
    autocommit: Cell<bool>,
    in_transaction: Cell<bool>,
    next_cursor_id: Cell<u64>,
}

impl<C: PqConnection> Connection<C> {
    /// Wrap a native connection with default settings: synchronous
    /// execution, standard string escaping, UTF8 client encoding.
    pub fn new(pq: C) -> Self {
        Self {
            pq: RefCell::new(pq),
            equote: false,
            encoding: "UTF8".to_owned(),
            asynchronous: false,
            typecasts: RefCell::new(Typecasts::new()),
            async_status: Cell::new(AsyncStatus::Ready),
            async_cursor: Cell::new(None),
            closed: Cell::new(false),
            autocommit: Cell::new(false),
            in_transaction: Cell::new(false),
            next_cursor_id: Cell::new(0),
        }
    }

    /// Require `E'...'` extended-escape string literals.
    #[must_use]
    pub fn with_equote(mut self, equote: bool) -> Self {
        self.equote = equote;
        self
    }

    /// Set the client encoding name reported to typecasts.
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Dispatch commands asynchronously (send/flush/poll) instead of
    /// blocking for the round-trip.
    #[must_use]
    pub fn with_asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    /// Whether extended-escape literals are required.
    #[must_use]
    pub fn equote(&self) -> bool {
        self.equote
    }

    /// The client encoding name.
    #[must_use]
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Whether commands are dispatched asynchronously.
    #[must_use]
    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    /// Whether the connection has been closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.closed.get()
    }

    /// Mark the connection closed. Further cursor operations fail.
    pub fn close(&self) {
        self.closed.set(true);
    }

    /// Whether statements run outside explicit transactions.
    #[must_use]
    pub fn autocommit(&self) -> bool {
        self.autocommit.get()
    }

    /// Toggle autocommit. When off (the default), the first statement
    /// executed opens a transaction.
    pub fn set_autocommit(&self, autocommit: bool) {
        self.autocommit.set(autocommit);
    }

    /// Readiness the connection is currently waiting on.
    #[must_use]
    pub fn async_status(&self) -> AsyncStatus {
        self.async_status.get()
    }

    pub(crate) fn set_async_status(&self, status: AsyncStatus) {
        self.async_status.set(status);
    }

    /// Token of the cursor whose asynchronous command is in flight.
    ///
    /// The connection only holds this non-owning token; the cursor's
    /// lifetime is not extended by being pending.
    #[must_use]
    pub fn pending_cursor(&self) -> Option<u64> {
        self.async_cursor.get()
    }

    pub(crate) fn set_pending_cursor(&self, token: Option<u64>) {
        self.async_cursor.set(token);
    }

    /// Create an unnamed cursor.
    pub fn cursor(&self) -> Cursor<'_, C> {
        Cursor::new(self, None)
    }

    /// Create a named (server-side) cursor.
    ///
    /// Double quotes in the name are escaped by doubling, since the
    /// name is spliced into `DECLARE` / `FETCH` / `CLOSE` commands
    /// inside a quoted identifier.
    pub fn named_cursor(&self, name: &str) -> Cursor<'_, C> {
        Cursor::new(self, Some(name.replace('"', "\"\"")))
    }

    /// Register a connection-level typecast override.
    pub fn register_typecast(&self, cast: Typecast) {
        self.typecasts.borrow_mut().register(cast);
    }

    pub(crate) fn resolve_cast(&self, id: PgTypeId, cursor_overrides: &Typecasts) -> Typecast {
        typecast::resolve(id, cursor_overrides, &self.typecasts.borrow())
    }

    /// The escaping context used to adapt parameters bound through this
    /// connection.
    pub fn quote_context(&self) -> QuoteContext<'_> {
        let server_version = self.pq.borrow().server_version();
        QuoteContext::new(self.equote, server_version, self)
    }

    /// Open a transaction if one is needed and not already open.
    pub(crate) fn begin_transaction(&self) -> Result<()> {
        if self.autocommit.get() || self.in_transaction.get() {
            return Ok(());
        }

        debug!("begin transaction");

        match self.pq.borrow_mut().exec(b"BEGIN") {
            Some(result) if result.status() == ResultStatus::CommandOk => {
                self.in_transaction.set(true);
                Ok(())
            }
            Some(result) => Err(Error::Operational { message: result.error_message() }),
            None => Err(self.operational_error()),
        }
    }

    pub(crate) fn operational_error(&self) -> Error {
        Error::Operational { message: self.pq.borrow().error_message() }
    }

    pub(crate) fn next_cursor_id(&self) -> u64 {
        let id = self.next_cursor_id.get();
        self.next_cursor_id.set(id + 1);
        id
    }
}

impl<C: PqConnection> Escaping for Connection<C> {
    fn escape_bytea(&self, data: &[u8]) -> Vec<u8> {
        self.pq.borrow().escape_bytea(data)
    }

    fn escape_string(&self, data: &[u8]) -> Vec<u8> {
        self.pq.borrow().escape_string(data)
    }

    fn escape_literal(&self, data: &[u8]) -> Option<Vec<u8>> {
        let pq = self.pq.borrow();

        if pq.server_version() < 90000 {
            return None;
        }

        pq.escape_literal(data)
    }
}
