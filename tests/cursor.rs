use std::collections::HashMap;

use pgadapt::connection::Connection;
use pgadapt::error::Error;
use pgadapt::pq::FlushOutcome;
use pgadapt::testing::{MockField, MockPq, MockResult, TrafficLog};
use pgadapt::type_id::PgTypeId;
use pgadapt::typecast::{CastContext, Typecast};
use pgadapt::value::Value;
use pgadapt::{AsyncStatus, Params};

fn int_field(name: &str) -> MockField {
    MockField::new(name, PgTypeId::INT4.oid())
}

fn int_rows(values: &[i64]) -> Vec<Vec<Option<Vec<u8>>>> {
    values.iter().map(|v| vec![Some(v.to_string().into_bytes())]).collect()
}

fn connect(results: Vec<MockResult>) -> (Connection<MockPq>, TrafficLog) {
    let pq = MockPq::new().with_results(results);
    let log = pq.log();
    (Connection::new(pq), log)
}

#[test]
fn select_opens_transaction_and_yields_typed_rows() {
    let result = MockResult::tuples(vec![int_field("id")], int_rows(&[5, 6]));
    let (conn, log) = connect(vec![result]);

    let mut cursor = conn.cursor();
    cursor.execute("select id from t", &Params::None).unwrap();

    assert_eq!(log.commands(), vec!["BEGIN", "select id from t"]);
    assert_eq!(cursor.rowcount(), 2);
    assert_eq!(cursor.rownumber(), Some(0));

    let description = cursor.description().unwrap();
    assert_eq!(description.len(), 1);
    assert_eq!(description[0].name, "id");
    assert_eq!(description[0].type_id, PgTypeId::INT4);

    let row = cursor.fetch_one().unwrap().unwrap();
    assert_eq!(row.get(0), Some(&Value::Int(5)));
    assert_eq!(cursor.rownumber(), Some(1));

    let row = cursor.fetch_one().unwrap().unwrap();
    assert_eq!(row.get_by_name("id"), Some(&Value::Int(6)));

    assert!(cursor.fetch_one().unwrap().is_none());
}

#[test]
fn autocommit_skips_the_implicit_begin() {
    let result = MockResult::tuples(vec![int_field("id")], int_rows(&[1]));
    let (conn, log) = connect(vec![result]);
    conn.set_autocommit(true);

    conn.cursor().execute("select 1", &Params::None).unwrap();

    assert_eq!(log.commands(), vec!["select 1"]);
}

#[test]
fn command_results_carry_tag_count_and_oid() {
    let result = MockResult::command_ok("INSERT 0 1").with_command_tuples("1").with_oid_value(42);
    let (conn, _log) = connect(vec![result]);

    let mut cursor = conn.cursor();
    cursor.execute("insert into t values (%s)", &Params::Positional(&[Value::Int(1)])).unwrap();

    assert_eq!(cursor.statusmessage(), Some("INSERT 0 1"));
    assert_eq!(cursor.rowcount(), 1);
    assert_eq!(cursor.lastrowid(), Some(42));
    assert!(cursor.description().is_none());
    assert_eq!(cursor.query(), b"insert into t values (1)");

    let err = cursor.fetch_all().unwrap_err();
    assert!(matches!(err, Error::Programming(message) if message == "no results to fetch"));
}

#[test]
fn fetching_before_any_execute_fails() {
    let (conn, _log) = connect(vec![]);
    let mut cursor = conn.cursor();

    let err = cursor.fetch_one().unwrap_err();
    assert!(matches!(err, Error::Programming(message) if message == "no results to fetch"));
}

#[test]
fn empty_query_is_a_programming_error() {
    let (conn, _log) = connect(vec![MockResult::empty_query()]);

    let err = conn.cursor().execute("", &Params::None).unwrap_err();
    assert!(matches!(err, Error::Programming(_)));
}

#[test]
fn failed_commands_surface_the_server_message() {
    let (conn, _log) = connect(vec![MockResult::error("relation \"t\" does not exist")]);

    let err = conn.cursor().execute("select * from t", &Params::None).unwrap_err();
    assert!(matches!(err, Error::Operational { message } if message.contains("does not exist")));
}

#[test]
fn fetch_many_clamps_and_respects_arraysize() {
    let result = MockResult::tuples(vec![int_field("n")], int_rows(&[1, 2, 3, 4, 5]));
    let (conn, _log) = connect(vec![result]);

    let mut cursor = conn.cursor();
    cursor.execute("select n from t", &Params::None).unwrap();

    // arraysize defaults to one row
    assert_eq!(cursor.fetch_many(None).unwrap().len(), 1);

    cursor.set_arraysize(3);
    assert_eq!(cursor.fetch_many(None).unwrap().len(), 3);

    // only one row remains; ask for more
    assert_eq!(cursor.fetch_many(Some(10)).unwrap().len(), 1);
    assert!(cursor.fetch_many(Some(10)).unwrap().is_empty());
}

#[test]
fn negative_fetch_many_size_means_everything() {
    let result = MockResult::tuples(vec![int_field("n")], int_rows(&[1, 2, 3]));
    let (conn, _log) = connect(vec![result]);

    let mut cursor = conn.cursor();
    cursor.execute("select n from t", &Params::None).unwrap();

    assert_eq!(cursor.fetch_many(Some(-1)).unwrap().len(), 3);
}

#[test]
fn fetch_all_drains_the_remaining_rows() {
    let result = MockResult::tuples(vec![int_field("n")], int_rows(&[1, 2, 3]));
    let (conn, _log) = connect(vec![result]);

    let mut cursor = conn.cursor();
    cursor.execute("select n from t", &Params::None).unwrap();

    cursor.fetch_one().unwrap().unwrap();
    let rest = cursor.fetch_all().unwrap();
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[1].get(0), Some(&Value::Int(3)));
}

#[test]
fn iteration_terminates_when_rows_are_a_multiple_of_itersize() {
    let result = MockResult::tuples(vec![int_field("n")], int_rows(&[1, 2, 3, 4]));
    let (conn, _log) = connect(vec![result]);

    let mut cursor = conn.cursor();
    cursor.execute("select n from t", &Params::None).unwrap();
    cursor.set_itersize(2);

    let rows: Vec<_> = cursor.iter().map(|row| row.unwrap()).collect();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3].get(0), Some(&Value::Int(4)));

    // the reported row number restarts per batch
    assert_eq!(cursor.rownumber(), Some(2));
}

#[test]
fn named_cursor_declares_fetches_and_closes() {
    let fields = vec![int_field("n")];
    let (conn, log) = connect(vec![
        MockResult::command_ok("DECLARE CURSOR"),
        MockResult::tuples(fields.clone(), int_rows(&[1, 2])),
        MockResult::command_ok("CLOSE CURSOR"),
    ]);

    let mut cursor = conn.named_cursor("report");
    cursor.execute("select n from t", &Params::None).unwrap();

    let rows = cursor.fetch_all().unwrap();
    assert_eq!(rows.len(), 2);

    cursor.close().unwrap();

    assert_eq!(
        log.commands(),
        vec![
            "BEGIN",
            "DECLARE \"report\" CURSOR WITHOUT HOLD FOR select n from t",
            "FETCH FORWARD ALL FROM \"report\"",
            "CLOSE \"report\"",
        ]
    );
}

#[test]
fn named_cursor_iterates_in_itersize_windows() {
    let fields = vec![int_field("n")];
    let (conn, log) = connect(vec![
        MockResult::command_ok("DECLARE CURSOR"),
        MockResult::tuples(fields.clone(), int_rows(&[1, 2])),
        MockResult::tuples(fields.clone(), int_rows(&[3, 4])),
        MockResult::tuples(fields.clone(), vec![]),
    ]);

    let mut cursor = conn.named_cursor("report");
    cursor.set_itersize(2);
    cursor.execute("select n from t", &Params::None).unwrap();

    let rows: Vec<_> = cursor.iter().map(|row| row.unwrap()).collect();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[2].get(0), Some(&Value::Int(3)));

    let commands = log.commands();
    assert_eq!(commands.iter().filter(|c| c.starts_with("FETCH FORWARD 2")).count(), 3);
}

#[test]
fn named_cursor_name_quotes_are_doubled() {
    let (conn, log) = connect(vec![MockResult::command_ok("DECLARE CURSOR")]);

    let mut cursor = conn.named_cursor("odd\"name");
    cursor.execute("select 1", &Params::None).unwrap();

    assert!(log.commands()[1].starts_with("DECLARE \"odd\"\"name\""));
}

#[test]
fn withhold_is_rejected_on_unnamed_cursors() {
    let (conn, log) = connect(vec![MockResult::command_ok("DECLARE CURSOR")]);

    let mut cursor = conn.cursor();
    assert!(matches!(cursor.set_withhold(true), Err(Error::Programming(_))));

    let mut cursor = conn.named_cursor("held");
    cursor.set_withhold(true).unwrap();
    cursor.execute("select 1", &Params::None).unwrap();

    assert!(log.commands()[1].contains("CURSOR WITH HOLD FOR"));
}

#[test]
fn execute_many_accumulates_the_rowcount() {
    let (conn, _log) = connect(vec![
        MockResult::command_ok("INSERT 0 1").with_command_tuples("1"),
        MockResult::command_ok("INSERT 0 1").with_command_tuples("1"),
        MockResult::command_ok("INSERT 0 2").with_command_tuples("2"),
    ]);

    let sets = [
        [Value::Int(1)],
        [Value::Int(2)],
        [Value::Int(3)],
    ];
    let params: Vec<Params<'_>> = sets.iter().map(|set| Params::Positional(set)).collect();

    let mut cursor = conn.cursor();
    cursor.execute_many("insert into t values (%s)", &params).unwrap();

    assert_eq!(cursor.rowcount(), 4);
}

#[test]
fn execute_many_is_refused_on_named_cursors() {
    let (conn, _log) = connect(vec![]);

    let err = conn.named_cursor("c").execute_many("select 1", &[]).unwrap_err();
    assert!(matches!(err, Error::Programming(_)));
}

#[test]
fn asynchronous_execute_dispatches_and_completes_later() {
    let result = MockResult::tuples(vec![int_field("n")], int_rows(&[9]));
    let pq = MockPq::new()
        .with_results(vec![result])
        .with_flush_outcomes(vec![FlushOutcome::Pending]);
    let log = pq.log();

    let conn = Connection::new(pq).with_asynchronous(true);
    conn.set_autocommit(true);

    let mut cursor = conn.cursor();
    cursor.execute("select n from t", &Params::None).unwrap();

    assert_eq!(conn.async_status(), AsyncStatus::Write);
    assert!(conn.pending_cursor().is_some());

    // rows are not available until the command completes
    assert!(matches!(cursor.fetch_all(), Err(Error::Programming(_))));

    // first poll drains the write buffer, second consumes the result
    assert_eq!(cursor.complete_async().unwrap(), AsyncStatus::Write);
    assert_eq!(cursor.complete_async().unwrap(), AsyncStatus::Ready);
    assert_eq!(conn.async_status(), AsyncStatus::Ready);
    assert!(conn.pending_cursor().is_none());

    let rows = cursor.fetch_all().unwrap();
    assert_eq!(rows[0].get(0), Some(&Value::Int(9)));
    assert_eq!(log.commands(), vec!["select n from t"]);
}

#[test]
fn only_one_asynchronous_command_at_a_time() {
    let pq = MockPq::new();
    let conn = Connection::new(pq).with_asynchronous(true);
    conn.set_autocommit(true);

    let mut first = conn.cursor();
    first.execute("select 1", &Params::None).unwrap();

    let mut second = conn.cursor();
    let err = second.execute("select 2", &Params::None).unwrap_err();
    assert!(matches!(err, Error::Programming(_)));

    // completion belongs to the dispatching cursor
    let err = second.complete_async().unwrap_err();
    assert!(matches!(err, Error::Programming(_)));
}

#[test]
fn cursor_typecast_overrides_shadow_the_connection() {
    fn shout(raw: &[u8], _ctx: &CastContext<'_>) -> pgadapt::Result<Value> {
        Ok(Value::Text(String::from_utf8_lossy(raw).to_uppercase()))
    }

    let field = MockField::new("s", PgTypeId::TEXT.oid());
    let rows = vec![vec![Some(b"hi".to_vec())]];
    let (conn, _log) = connect(vec![
        MockResult::tuples(vec![field.clone()], rows.clone()),
        MockResult::tuples(vec![field], rows),
    ]);
    conn.set_autocommit(true);

    let mut plain = conn.cursor();
    plain.execute("select s", &Params::None).unwrap();
    assert_eq!(plain.fetch_one().unwrap().unwrap().get(0), Some(&Value::Text("hi".into())));

    let mut loud = conn.cursor();
    loud.register_typecast(Typecast::new(PgTypeId::TEXT, "shout", shout));
    loud.execute("select s", &Params::None).unwrap();
    assert_eq!(loud.fetch_one().unwrap().unwrap().get(0), Some(&Value::Text("HI".into())));
}

#[test]
fn null_cells_bypass_the_typecast() {
    let result = MockResult::tuples(vec![int_field("n")], vec![vec![None]]);
    let (conn, _log) = connect(vec![result]);

    let mut cursor = conn.cursor();
    cursor.execute("select n from t", &Params::None).unwrap();

    assert_eq!(cursor.fetch_one().unwrap().unwrap().get(0), Some(&Value::Null));
}

#[test]
fn numeric_columns_report_precision_and_scale() {
    let field = MockField::new("amount", PgTypeId::NUMERIC.oid())
        .with_modifier(((10 << 16) | 2) + 4)
        .with_size(-1);
    let result = MockResult::tuples(vec![field], vec![vec![Some(b"10.50".to_vec())]]);
    let (conn, _log) = connect(vec![result]);

    let mut cursor = conn.cursor();
    cursor.execute("select amount from t", &Params::None).unwrap();

    let column = &cursor.description().unwrap()[0];
    assert_eq!(column.precision, Some(10));
    assert_eq!(column.scale, Some(2));
}

#[test]
fn mogrify_binds_without_sending() {
    let (conn, log) = connect(vec![]);

    let mut map = HashMap::new();
    map.insert("id".to_owned(), Value::Int(-3));

    let cursor = conn.cursor();
    let bound = cursor.mogrify("select * from t where id = %(id)s", &Params::Named(&map)).unwrap();

    assert_eq!(bound, b"select * from t where id =  -3");
    assert!(log.commands().is_empty());
}

#[test]
fn string_parameters_use_the_connection_escape() {
    let result = MockResult::command_ok("INSERT 0 1");
    let (conn, log) = connect(vec![result]);
    conn.set_autocommit(true);

    let params = [Value::Text("a\\b".to_owned())];
    conn.cursor().execute("insert into t values (%s)", &Params::Positional(&params)).unwrap();

    // server version is modern, so the single-call literal escape applies
    assert_eq!(log.commands(), vec!["insert into t values (E'a\\\\b')"]);
}

#[test]
fn equote_connections_prefix_bytea_literals() {
    let pq = MockPq::new().with_results(vec![MockResult::command_ok("INSERT 0 1")]);
    let log = pq.log();
    let conn = Connection::new(pq).with_equote(true);
    conn.set_autocommit(true);

    let params = [Value::Bytes(b"AB".to_vec())];
    conn.cursor().execute("insert into t values (%s)", &Params::Positional(&params)).unwrap();

    assert_eq!(log.commands(), vec!["insert into t values (E'\\x4142'::bytea)"]);
}

#[test]
fn old_servers_fall_back_to_escaped_string_literals() {
    let pq = MockPq::new()
        .with_results(vec![MockResult::command_ok("INSERT 0 1")])
        .with_server_version(80400)
        .with_standard_strings(false);
    let log = pq.log();
    let conn = Connection::new(pq).with_equote(true);
    conn.set_autocommit(true);

    let params = [Value::Text("a\\b".to_owned())];
    conn.cursor().execute("insert into t values (%s)", &Params::Positional(&params)).unwrap();

    // no single-call literal escape before 9.0; escape-then-quote with
    // the extended-escape prefix applies
    assert_eq!(log.commands(), vec!["insert into t values (E'a\\\\b')"]);
}

#[test]
fn failed_declare_does_not_close_a_missing_portal() {
    let (conn, log) = connect(vec![MockResult::error("syntax error")]);
    conn.set_autocommit(true);

    let mut cursor = conn.named_cursor("report");
    assert!(matches!(
        cursor.execute("select oops", &Params::None),
        Err(Error::Operational { .. })
    ));

    let err = cursor.fetch_all().unwrap_err();
    assert!(matches!(err, Error::Programming(message) if message == "no results to fetch"));

    cursor.close().unwrap();
    assert_eq!(log.commands(), vec!["DECLARE \"report\" CURSOR WITHOUT HOLD FOR select oops"]);
}

#[test]
fn cast_runs_the_registered_typecast_directly() {
    let (conn, _log) = connect(vec![]);
    let cursor = conn.cursor();

    assert_eq!(cursor.cast(PgTypeId::INT4.oid(), b"12").unwrap(), Value::Int(12));
    assert_eq!(cursor.cast(99_999, b"raw").unwrap(), Value::Text("raw".into()));
}

#[test]
fn closed_handles_refuse_further_work() {
    let result = MockResult::tuples(vec![int_field("n")], int_rows(&[1]));
    let (conn, _log) = connect(vec![result]);

    let mut cursor = conn.cursor();
    cursor.execute("select n from t", &Params::None).unwrap();

    cursor.close().unwrap();
    cursor.close().unwrap();
    assert!(matches!(cursor.fetch_one(), Err(Error::Interface(_))));

    let mut cursor = conn.cursor();
    conn.close();
    assert!(matches!(
        cursor.execute("select 1", &Params::None),
        Err(Error::Interface(_))
    ));
}

#[test]
fn next_set_is_unsupported() {
    let (conn, _log) = connect(vec![]);
    assert!(matches!(conn.cursor().next_set(), Err(Error::Unsupported(_))));
}
