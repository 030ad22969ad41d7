//! The cursor state machine: command execution, result-handle lifecycle,
//! row construction, and batched iteration.
//!
//! A cursor borrows its connection and owns at most one native result
//! handle at a time. Executing a command drops the previous handle;
//! dropping the cursor drops the handle with it. Named cursors never hold
//! the whole result set; they round-trip `FETCH FORWARD` commands and
//! only window `itersize` rows at a time.

use std::rc::Rc;

use smallvec::SmallVec;
use tracing::debug;

use crate::column::Column;
use crate::compose::{compose, Params};
use crate::connection::{AsyncStatus, Connection};
use crate::error::{Error, Result};
use crate::pq::{FlushOutcome, PqConnection, PqResult, ResultStatus};
use crate::row::{Row, RowFactory};
use crate::type_id::PgTypeId;
use crate::typecast::{CastContext, Typecast, Typecasts};
use crate::value::Value;

const DEFAULT_ARRAYSIZE: usize = 1;
const DEFAULT_ITERSIZE: usize = 2000;

/// How many rows a server-side `FETCH` should pull.
#[derive(Debug, Clone, Copy)]
enum Forward {
    Count(usize),
    All,
}

/// A cursor over one connection.
pub struct Cursor<'c, C: PqConnection> {
    conn: &'c Connection<C>,
    id: u64,
    name: Option<String>,
    withhold: bool,

    arraysize: usize,
    itersize: usize,
    row_factory: Option<RowFactory>,
    typecasts: Typecasts,

    result: Option<C::Result>,
    description: Option<Rc<[Column]>>,
    casts: SmallVec<[Typecast; 8]>,

    query: Vec<u8>,
    statusmessage: Option<String>,
    rowcount: i64,
    rownumber: Option<usize>,
    lastrowid: Option<u32>,

    // Absolute read offset into the current result handle. Unlike the
    // reported row number this never resets mid-result, so iteration
    // cannot revisit rows.
    pos: usize,
    no_tuples: bool,
    // A named cursor's server-side portal exists only after its DECLARE
    // succeeded; CLOSE must not be sent otherwise.
    declared: bool,
    closed: bool,
}

impl<'c, C: PqConnection> Cursor<'c, C> {
    pub(crate) fn new(conn: &'c Connection<C>, name: Option<String>) -> Self {
        Self {
            conn,
            id: conn.next_cursor_id(),
            name,
            withhold: false,
            arraysize: DEFAULT_ARRAYSIZE,
            itersize: DEFAULT_ITERSIZE,
            row_factory: None,
            typecasts: Typecasts::new(),
            result: None,
            description: None,
            casts: SmallVec::new(),
            query: Vec::new(),
            statusmessage: None,
            rowcount: -1,
            rownumber: None,
            lastrowid: None,
            pos: 0,
            no_tuples: false,
            declared: false,
            closed: false,
        }
    }

    /// The cursor's server-side name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Rows returned by `fetch_many` when no size is given.
    #[must_use]
    pub fn arraysize(&self) -> usize {
        self.arraysize
    }

    pub fn set_arraysize(&mut self, arraysize: usize) {
        self.arraysize = arraysize.max(1);
    }

    /// Rows pulled per batch during iteration.
    #[must_use]
    pub fn itersize(&self) -> usize {
        self.itersize
    }

    pub fn set_itersize(&mut self, itersize: usize) {
        self.itersize = itersize.max(1);
    }

    /// Whether the server-side cursor survives transaction commit.
    #[must_use]
    pub fn withhold(&self) -> bool {
        self.withhold
    }

    /// Declare the cursor `WITH HOLD`. Only valid on named cursors.
    pub fn set_withhold(&mut self, withhold: bool) -> Result<()> {
        if self.name.is_none() {
            return Err(Error::Programming(
                "trying to set .withhold on unnamed cursor".to_owned(),
            ));
        }

        self.withhold = withhold;
        Ok(())
    }

    /// Install a hook invoked to build each row from its decoded values.
    pub fn set_row_factory(&mut self, factory: RowFactory) {
        self.row_factory = Some(factory);
    }

    /// Register a cursor-level typecast override. Shadows connection and
    /// global registrations for the same OID.
    pub fn register_typecast(&mut self, cast: Typecast) {
        self.typecasts.register(cast);
    }

    /// Rows affected or returned by the last command, `-1` when unknown.
    #[must_use]
    pub fn rowcount(&self) -> i64 {
        self.rowcount
    }

    /// Zero-based index of the next row to be fetched, reset per batch
    /// during iteration. `None` before any result is available.
    #[must_use]
    pub fn rownumber(&self) -> Option<usize> {
        self.rownumber
    }

    /// OID of the last inserted row, when the server reported one.
    #[must_use]
    pub fn lastrowid(&self) -> Option<u32> {
        self.lastrowid
    }

    /// The last command sent, after parameter binding.
    #[must_use]
    pub fn query(&self) -> &[u8] {
        &self.query
    }

    /// The command tag of the last command, e.g. `INSERT 0 1`.
    #[must_use]
    pub fn statusmessage(&self) -> Option<&str> {
        self.statusmessage.as_deref()
    }

    /// Column descriptors of the current result set, `None` for commands
    /// that return no rows.
    #[must_use]
    pub fn description(&self) -> Option<&[Column]> {
        self.description.as_deref()
    }

    /// Whether `close` has been called on this cursor.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Bind `params` into `query` and return the command that `execute`
    /// would send, without sending it.
    pub fn mogrify(&self, query: &str, params: &Params<'_>) -> Result<Vec<u8>> {
        compose(query, params, &self.conn.quote_context())
    }

    /// Execute a command, binding `params` into the template first.
    ///
    /// On a named cursor the command is wrapped in `DECLARE ... CURSOR
    /// FOR` and rows are left on the server. In asynchronous mode the
    /// command is dispatched and [`Cursor::complete_async`] must be
    /// polled before fetching.
    pub fn execute(&mut self, query: &str, params: &Params<'_>) -> Result<()> {
        self.check_closed()?;

        self.description = None;
        self.no_tuples = false;
        self.declared = false;
        self.result = None;

        let mut command = compose(query, params, &self.conn.quote_context())?;

        if let Some(name) = &self.name {
            let mut declared = Vec::with_capacity(command.len() + name.len() + 40);
            declared.extend_from_slice(b"DECLARE \"");
            declared.extend_from_slice(name.as_bytes());
            declared.extend_from_slice(if self.withhold {
                b"\" CURSOR WITH HOLD FOR "
            } else {
                b"\" CURSOR WITHOUT HOLD FOR "
            });
            declared.extend_from_slice(&command);
            command = declared;
        }

        debug!(query = %String::from_utf8_lossy(&command), "execute");

        self.conn.begin_transaction()?;
        self.query = command;

        if self.conn.is_asynchronous() {
            return self.dispatch_async();
        }

        let result = self.conn.pq.borrow_mut().exec(&self.query);
        self.pq_fetch(result)?;
        self.declared = self.name.is_some();
        Ok(())
    }

    /// Execute the same template once per parameter set, accumulating
    /// the affected row count.
    pub fn execute_many(&mut self, query: &str, param_sets: &[Params<'_>]) -> Result<()> {
        if self.name.is_some() {
            return Err(Error::Programming(
                "can't call .execute_many() on named cursors".to_owned(),
            ));
        }

        if self.conn.is_asynchronous() {
            return Err(Error::Programming(
                "execute_many cannot be used in asynchronous mode".to_owned(),
            ));
        }

        let mut total = 0i64;
        let mut unknown = false;

        for params in param_sets {
            self.execute(query, params)?;

            if self.rowcount < 0 {
                unknown = true;
            } else {
                total += self.rowcount;
            }
        }

        self.rowcount = if unknown { -1 } else { total };
        Ok(())
    }

    /// Drive a pending asynchronous command forward.
    ///
    /// Returns the readiness still being waited on: `Write` while the
    /// outbound buffer drains, `Ready` once the result has been consumed
    /// and the cursor holds it.
    pub fn complete_async(&mut self) -> Result<AsyncStatus> {
        self.check_closed()?;

        if self.conn.pending_cursor() != Some(self.id) {
            return Err(Error::Programming(
                "no asynchronous command was issued by this cursor".to_owned(),
            ));
        }

        if self.conn.async_status() == AsyncStatus::Write {
            let outcome = self.conn.pq.borrow_mut().flush();

            match outcome {
                FlushOutcome::Done => self.conn.set_async_status(AsyncStatus::Read),
                FlushOutcome::Pending => return Ok(AsyncStatus::Write),
                FlushOutcome::Failed => {
                    self.conn.set_pending_cursor(None);
                    self.conn.set_async_status(AsyncStatus::Ready);
                    return Err(self.conn.operational_error());
                }
            }
        }

        let result = self.conn.pq.borrow_mut().get_result();
        self.conn.set_pending_cursor(None);
        self.conn.set_async_status(AsyncStatus::Ready);

        self.pq_fetch(result)?;
        self.declared = self.name.is_some();
        Ok(AsyncStatus::Ready)
    }

    /// Fetch the next row, or `None` when the result set is exhausted.
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        self.check_fetch()?;

        if self.name.is_some() {
            self.fetch_from_server(Forward::Count(1))?;
        }

        if self.remaining() == 0 {
            return Ok(None);
        }

        self.read_row().map(Some)
    }

    /// Fetch up to `size` rows (`arraysize` when `None`, everything
    /// remaining when negative).
    pub fn fetch_many(&mut self, size: Option<isize>) -> Result<Vec<Row>> {
        self.check_fetch()?;

        let size = size.unwrap_or_else(|| self.arraysize as isize);

        if self.name.is_some() {
            let forward = usize::try_from(size).map_or(Forward::All, Forward::Count);
            self.fetch_from_server(forward)?;
        }

        let take = usize::try_from(size).map_or_else(|_| self.remaining(), |n| n.min(self.remaining()));
        self.read_rows(take)
    }

    /// Fetch every remaining row.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        self.check_fetch()?;

        if self.name.is_some() {
            self.fetch_from_server(Forward::All)?;
        }

        self.read_rows(self.remaining())
    }

    /// Iterate over the remaining rows in batches of `itersize`.
    ///
    /// The reported row number restarts at zero for each batch; the read
    /// position does not, so a result whose length is an exact multiple
    /// of `itersize` terminates instead of starting over.
    pub fn iter(&mut self) -> Iter<'_, 'c, C> {
        Iter { cursor: self, remaining_in_batch: 0, done: false }
    }

    /// Run the typecast registered for `oid` over raw column bytes.
    pub fn cast(&self, oid: u32, raw: &[u8]) -> Result<Value> {
        let cast = self.conn.resolve_cast(PgTypeId(oid), &self.typecasts);
        cast.apply(raw, &CastContext { encoding: self.conn.encoding() })
    }

    /// Multiple result sets are not produced by this client.
    pub fn next_set(&mut self) -> Result<()> {
        Err(Error::Unsupported("cursor.next_set()"))
    }

    /// Accepted for DB-API compatibility; has no effect.
    pub fn set_input_sizes(&mut self, _sizes: &[Option<usize>]) {}

    /// Accepted for DB-API compatibility; has no effect.
    pub fn set_output_size(&mut self, _size: usize, _column: Option<usize>) {}

    /// Close the cursor. A named cursor that was executed has its
    /// server-side portal closed first. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed || self.conn.closed() {
            self.closed = true;
            self.result = None;
            return Ok(());
        }

        if let Some(name) = &self.name {
            if self.declared {
                let mut command = Vec::with_capacity(name.len() + 8);
                command.extend_from_slice(b"CLOSE \"");
                command.extend_from_slice(name.as_bytes());
                command.push(b'"');

                let result = self
                    .conn
                    .pq
                    .borrow_mut()
                    .exec(&command)
                    .ok_or_else(|| self.conn.operational_error())?;

                if result.status() != ResultStatus::CommandOk {
                    return Err(Error::Operational { message: result.error_message() });
                }
            }
        }

        self.closed = true;
        self.result = None;
        Ok(())
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Interface("cursor already closed"));
        }

        if self.conn.closed() {
            return Err(Error::Interface("connection already closed"));
        }

        Ok(())
    }

    fn check_fetch(&self) -> Result<()> {
        self.check_closed()?;

        if self.conn.pending_cursor() == Some(self.id) {
            return Err(Error::Programming(
                "asynchronous command still pending; call complete_async first".to_owned(),
            ));
        }

        let executed = if self.name.is_some() { self.declared } else { self.result.is_some() };

        if !executed || (self.no_tuples && self.name.is_none()) {
            return Err(Error::Programming("no results to fetch".to_owned()));
        }

        Ok(())
    }

    fn dispatch_async(&mut self) -> Result<()> {
        if self.conn.pending_cursor().is_some() {
            return Err(Error::Programming(
                "an asynchronous command is already in progress".to_owned(),
            ));
        }

        let mut pq = self.conn.pq.borrow_mut();

        if !pq.send_query(&self.query) {
            return Err(Error::Operational { message: pq.error_message() });
        }

        let status = match pq.flush() {
            FlushOutcome::Done => AsyncStatus::Read,
            FlushOutcome::Pending => AsyncStatus::Write,
            FlushOutcome::Failed => {
                return Err(Error::Operational { message: pq.error_message() });
            }
        };

        drop(pq);

        self.conn.set_async_status(status);
        self.conn.set_pending_cursor(Some(self.id));
        Ok(())
    }

    /// Consume a result handle fresh off the wire and take the cursor to
    /// the state it implies.
    fn pq_fetch(&mut self, result: Option<C::Result>) -> Result<()> {
        let result = result.ok_or_else(|| self.conn.operational_error())?;

        match result.status() {
            ResultStatus::CommandOk => {
                self.statusmessage = result.command_status();
                self.rowcount = result
                    .command_tuples()
                    .and_then(|tuples| atoi::atoi::<i64>(tuples.as_bytes()))
                    .unwrap_or(-1);
                self.lastrowid = match result.oid_value() {
                    0 => None,
                    oid => Some(oid),
                };
                self.description = None;
                self.casts.clear();
                self.rownumber = None;
                self.pos = 0;
                self.no_tuples = true;
                // Command results carry no rows; the handle is released
                // here rather than kept until the next execute.
                Ok(())
            }

            ResultStatus::TuplesOk => {
                self.statusmessage = result.command_status();
                self.rowcount = self.rowcount_of(&result);
                self.lastrowid = None;

                let nfields = result.nfields();
                let mut columns = Vec::with_capacity(nfields);
                self.casts.clear();

                for field in 0..nfields {
                    let column = Column::from_result(&result, field);
                    self.casts.push(self.conn.resolve_cast(column.type_id, &self.typecasts));
                    columns.push(column);
                }

                self.description = Some(columns.into());
                self.rownumber = Some(0);
                self.pos = 0;
                self.no_tuples = false;
                self.result = Some(result);
                Ok(())
            }

            ResultStatus::EmptyQuery => {
                Err(Error::Programming("can't execute an empty query".to_owned()))
            }

            _ => Err(Error::Operational { message: result.error_message() }),
        }
    }

    fn rowcount_of(&self, result: &C::Result) -> i64 {
        i64::try_from(result.ntuples()).unwrap_or(-1)
    }

    /// Replace the current window of a named cursor with the next
    /// `FETCH FORWARD` round trip.
    fn fetch_from_server(&mut self, forward: Forward) -> Result<()> {
        let name = match &self.name {
            Some(name) => name,
            None => return Ok(()),
        };

        let mut command = Vec::with_capacity(name.len() + 32);
        command.extend_from_slice(b"FETCH FORWARD ");

        match forward {
            Forward::All => command.extend_from_slice(b"ALL"),
            Forward::Count(count) => {
                let mut buf = itoa::Buffer::new();
                command.extend_from_slice(buf.format(count).as_bytes());
            }
        }

        command.extend_from_slice(b" FROM \"");
        command.extend_from_slice(name.as_bytes());
        command.push(b'"');

        debug!(query = %String::from_utf8_lossy(&command), "fetch");

        self.result = None;
        let result = self.conn.pq.borrow_mut().exec(&command);
        self.pq_fetch(result)
    }

    fn remaining(&self) -> usize {
        self.result
            .as_ref()
            .map_or(0, |result| result.ntuples().saturating_sub(self.pos))
    }

    fn read_row(&mut self) -> Result<Row> {
        let row = {
            let result = self
                .result
                .as_ref()
                .ok_or(Error::Interface("cursor has no result"))?;
            self.build_row(result, self.pos)?
        };

        self.pos += 1;
        self.rownumber = Some(self.rownumber.unwrap_or(0) + 1);
        Ok(row)
    }

    fn read_rows(&mut self, count: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(count);

        for _ in 0..count {
            rows.push(self.read_row()?);
        }

        Ok(rows)
    }

    fn build_row(&self, result: &C::Result, row: usize) -> Result<Row> {
        let columns = self
            .description
            .clone()
            .ok_or(Error::Interface("cursor has no result description"))?;

        let ctx = CastContext { encoding: self.conn.encoding() };
        let mut values = Vec::with_capacity(self.casts.len());

        for (field, cast) in self.casts.iter().enumerate() {
            // NULL is detected here; casts never see it.
            if result.is_null(row, field) {
                values.push(Value::Null);
                continue;
            }

            let value = cast
                .apply(result.value(row, field), &ctx)
                .map_err(|err| Error::ColumnDecode { index: field, source: err.into() })?;

            values.push(value);
        }

        Ok(match self.row_factory {
            Some(factory) => factory(&columns, values),
            None => Row::new(columns, values),
        })
    }

    /// Begin the next iteration batch; returns how many rows it holds.
    fn start_batch(&mut self) -> Result<usize> {
        self.check_fetch()?;

        if self.name.is_some() {
            self.fetch_from_server(Forward::Count(self.itersize))?;
            return Ok(self.remaining());
        }

        let available = self.remaining().min(self.itersize);
        if available > 0 {
            self.rownumber = Some(0);
        }

        Ok(available)
    }
}

/// Batched row iterator returned by [`Cursor::iter`].
pub struct Iter<'a, 'c, C: PqConnection> {
    cursor: &'a mut Cursor<'c, C>,
    remaining_in_batch: usize,
    done: bool,
}

impl<C: PqConnection> Iterator for Iter<'_, '_, C> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.remaining_in_batch == 0 {
            match self.cursor.start_batch() {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => self.remaining_in_batch = n,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }

        self.remaining_in_batch -= 1;
        Some(self.cursor.read_row())
    }
}
