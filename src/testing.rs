//! Scripted stand-ins for the native client library.
//!
//! [`MockPq`] plays back a queue of prepared [`MockResult`]s in order and
//! records every command it receives. `BEGIN` is answered automatically
//! so scripts only need to cover the commands under test.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::pq::{self, FlushOutcome, PqConnection, PqResult, ResultStatus};

/// One column of a scripted result.
#[derive(Debug, Clone)]
pub struct MockField {
    pub name: String,
    pub type_oid: u32,
    pub size: i32,
    pub modifier: i32,
}

impl MockField {
    #[must_use]
    pub fn new(name: &str, type_oid: u32) -> Self {
        Self { name: name.to_owned(), type_oid, size: -1, modifier: -1 }
    }

    #[must_use]
    pub fn with_size(mut self, size: i32) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_modifier(mut self, modifier: i32) -> Self {
        self.modifier = modifier;
        self
    }
}

/// A prepared result handle.
#[derive(Debug, Clone)]
pub struct MockResult {
    status: ResultStatus,
    command_status: Option<String>,
    command_tuples: Option<String>,
    oid_value: u32,
    fields: Vec<MockField>,
    rows: Vec<Vec<Option<Vec<u8>>>>,
    error: String,
}

impl MockResult {
    /// A successful command returning no rows, e.g. `CREATE TABLE`.
    #[must_use]
    pub fn command_ok(tag: &str) -> Self {
        Self {
            status: ResultStatus::CommandOk,
            command_status: Some(tag.to_owned()),
            command_tuples: None,
            oid_value: 0,
            fields: Vec::new(),
            rows: Vec::new(),
            error: String::new(),
        }
    }

    /// Attach an affected-row count to a command result.
    #[must_use]
    pub fn with_command_tuples(mut self, tuples: &str) -> Self {
        self.command_tuples = Some(tuples.to_owned());
        self
    }

    /// Attach an inserted-row OID to a command result.
    #[must_use]
    pub fn with_oid_value(mut self, oid: u32) -> Self {
        self.oid_value = oid;
        self
    }

    /// A successful query returning rows. `None` cells are SQL NULL.
    #[must_use]
    pub fn tuples(fields: Vec<MockField>, rows: Vec<Vec<Option<Vec<u8>>>>) -> Self {
        Self {
            status: ResultStatus::TuplesOk,
            command_status: Some("SELECT".to_owned()),
            command_tuples: None,
            oid_value: 0,
            fields,
            rows,
            error: String::new(),
        }
    }

    /// The result of an empty query string.
    #[must_use]
    pub fn empty_query() -> Self {
        Self {
            status: ResultStatus::EmptyQuery,
            command_status: None,
            command_tuples: None,
            oid_value: 0,
            fields: Vec::new(),
            rows: Vec::new(),
            error: String::new(),
        }
    }

    /// A failed command.
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self {
            status: ResultStatus::FatalError,
            command_status: None,
            command_tuples: None,
            oid_value: 0,
            fields: Vec::new(),
            rows: Vec::new(),
            error: message.to_owned(),
        }
    }
}

impl PqResult for MockResult {
    fn status(&self) -> ResultStatus {
        self.status
    }

    fn command_status(&self) -> Option<String> {
        self.command_status.clone()
    }

    fn command_tuples(&self) -> Option<String> {
        self.command_tuples.clone()
    }

    fn oid_value(&self) -> u32 {
        self.oid_value
    }

    fn ntuples(&self) -> usize {
        self.rows.len()
    }

    fn nfields(&self) -> usize {
        self.fields.len()
    }

    fn field_name(&self, field: usize) -> String {
        self.fields[field].name.clone()
    }

    fn field_type(&self, field: usize) -> u32 {
        self.fields[field].type_oid
    }

    fn field_size(&self, field: usize) -> i32 {
        self.fields[field].size
    }

    fn field_mod(&self, field: usize) -> i32 {
        self.fields[field].modifier
    }

    fn is_null(&self, row: usize, field: usize) -> bool {
        self.rows[row][field].is_none()
    }

    fn value(&self, row: usize, field: usize) -> &[u8] {
        self.rows[row][field].as_deref().unwrap_or(b"")
    }

    fn error_message(&self) -> String {
        self.error.clone()
    }
}

/// Shared record of every command a [`MockPq`] received, in order.
///
/// Clone a handle out of the mock before handing it to a connection;
/// the connection consumes the mock by value.
#[derive(Debug, Clone, Default)]
pub struct TrafficLog(Rc<RefCell<Vec<String>>>);

impl TrafficLog {
    /// The commands received so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    fn record(&self, command: &[u8]) {
        self.0.borrow_mut().push(String::from_utf8_lossy(command).into_owned());
    }
}

/// A scripted native connection.
pub struct MockPq {
    results: VecDeque<MockResult>,
    flush_outcomes: VecDeque<FlushOutcome>,
    log: TrafficLog,
    server_version: u32,
    standard_strings: bool,
    fail_send: bool,
    error: String,
}

impl Default for MockPq {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPq {
    #[must_use]
    pub fn new() -> Self {
        Self {
            results: VecDeque::new(),
            flush_outcomes: VecDeque::new(),
            log: TrafficLog::default(),
            server_version: 90600,
            standard_strings: true,
            fail_send: false,
            error: "mock connection error".to_owned(),
        }
    }

    /// Queue the results to play back, in order.
    #[must_use]
    pub fn with_results(mut self, results: impl IntoIterator<Item = MockResult>) -> Self {
        self.results.extend(results);
        self
    }

    #[must_use]
    pub fn with_server_version(mut self, server_version: u32) -> Self {
        self.server_version = server_version;
        self
    }

    #[must_use]
    pub fn with_standard_strings(mut self, standard_strings: bool) -> Self {
        self.standard_strings = standard_strings;
        self
    }

    /// Queue flush outcomes; `Done` is reported once the queue drains.
    #[must_use]
    pub fn with_flush_outcomes(mut self, outcomes: impl IntoIterator<Item = FlushOutcome>) -> Self {
        self.flush_outcomes.extend(outcomes);
        self
    }

    /// Make `send_query` report failure.
    #[must_use]
    pub fn with_fail_send(mut self, fail_send: bool) -> Self {
        self.fail_send = fail_send;
        self
    }

    /// A handle onto the command record.
    #[must_use]
    pub fn log(&self) -> TrafficLog {
        self.log.clone()
    }
}

impl PqConnection for MockPq {
    type Result = MockResult;

    fn exec(&mut self, query: &[u8]) -> Option<Self::Result> {
        self.log.record(query);

        // Transactions are opened implicitly by the layer under test;
        // answer them without consuming the script.
        if query == b"BEGIN" {
            return Some(MockResult::command_ok("BEGIN"));
        }

        self.results.pop_front()
    }

    fn send_query(&mut self, query: &[u8]) -> bool {
        if self.fail_send {
            return false;
        }

        self.log.record(query);
        true
    }

    fn flush(&mut self) -> FlushOutcome {
        self.flush_outcomes.pop_front().unwrap_or(FlushOutcome::Done)
    }

    fn get_result(&mut self) -> Option<Self::Result> {
        self.results.pop_front()
    }

    fn server_version(&self) -> u32 {
        self.server_version
    }

    fn escape_bytea(&self, data: &[u8]) -> Vec<u8> {
        pq::escape_bytea(data, self.standard_strings)
    }

    fn escape_string(&self, data: &[u8]) -> Vec<u8> {
        pq::escape_string(data, self.standard_strings)
    }

    fn escape_literal(&self, data: &[u8]) -> Option<Vec<u8>> {
        // Matches the single-call literal escape of the native library:
        // quotes and backslashes doubled, `E` prefix when a backslash is
        // present.
        let mut body = Vec::with_capacity(data.len() + 2);
        let mut has_backslash = false;

        for &b in data {
            match b {
                b'\'' => body.extend_from_slice(b"''"),
                b'\\' => {
                    has_backslash = true;
                    body.extend_from_slice(b"\\\\");
                }
                _ => body.push(b),
            }
        }

        let mut out = Vec::with_capacity(body.len() + 3);
        if has_backslash {
            out.push(b'E');
        }
        out.push(b'\'');
        out.extend_from_slice(&body);
        out.push(b'\'');

        Some(out)
    }

    fn error_message(&self) -> String {
        self.error.clone()
    }
}
