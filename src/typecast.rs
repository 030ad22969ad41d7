//! Typecasting of raw wire-format column bytes into host values.
//!
//! Casts are dispatched by the column's type OID through a layered
//! registry: per-cursor overrides shadow per-connection overrides, which
//! shadow the global built-in table; anything still unresolved falls back
//! to the text cast for the `unknown` pseudo-type. A cast is never invoked
//! for SQL NULL; NULL detection happens at the row builder.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{LazyLock, RwLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::type_id::PgTypeId;
use crate::value::{PgInterval, PgNumeric, Value};

/// Context made available to cast functions.
#[derive(Debug, Clone, Copy)]
pub struct CastContext<'a> {
    /// Client encoding name the connection reports, e.g. `UTF8`.
    pub encoding: &'a str,
}

impl Default for CastContext<'_> {
    fn default() -> Self {
        Self { encoding: "UTF8" }
    }
}

/// Parses raw column bytes into a host value.
pub type CastFn = fn(&[u8], &CastContext<'_>) -> Result<Value>;

/// One entry of the typecast registry.
#[derive(Debug, Clone, Copy)]
pub struct Typecast {
    /// The wire type this cast handles.
    pub id: PgTypeId,

    /// Human-readable name of the wire type.
    pub name: &'static str,

    /// The cast function itself.
    pub cast: CastFn,
}

impl Typecast {
    /// A new registry entry.
    #[must_use]
    pub const fn new(id: PgTypeId, name: &'static str, cast: CastFn) -> Self {
        Self { id, name, cast }
    }

    /// Run the cast over raw column bytes.
    pub fn apply(&self, raw: &[u8], ctx: &CastContext<'_>) -> Result<Value> {
        (self.cast)(raw, ctx)
    }
}

/// The hardcoded last-resort cast: `unknown` decoded as text.
pub const UNKNOWN_CAST: Typecast = Typecast::new(PgTypeId::UNKNOWN, "unknown", cast_text);

/// An override table mapping type OIDs to casts.
///
/// Append-only for the lifetime of its owner (cursor or connection).
#[derive(Debug, Default, Clone)]
pub struct Typecasts {
    entries: HashMap<u32, Typecast>,
}

impl Typecasts {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cast, replacing any previous entry for its OID.
    pub fn register(&mut self, cast: Typecast) {
        self.entries.insert(cast.id.oid(), cast);
    }

    /// Look up the cast for a type OID.
    #[must_use]
    pub fn get(&self, id: PgTypeId) -> Option<Typecast> {
        self.entries.get(&id.oid()).copied()
    }
}

static GLOBAL: LazyLock<RwLock<Typecasts>> = LazyLock::new(|| RwLock::new(builtin_table()));

/// Register a cast in the global table, visible to every connection.
pub fn register_global(cast: Typecast) {
    GLOBAL.write().unwrap_or_else(std::sync::PoisonError::into_inner).register(cast);
}

/// Resolve the cast for a type OID against the layered registry.
pub(crate) fn resolve(
    id: PgTypeId,
    cursor_overrides: &Typecasts,
    connection_overrides: &Typecasts,
) -> Typecast {
    cursor_overrides
        .get(id)
        .or_else(|| connection_overrides.get(id))
        .or_else(|| GLOBAL.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(id))
        .unwrap_or(UNKNOWN_CAST)
}

fn builtin_table() -> Typecasts {
    let mut table = Typecasts::new();

    for cast in [
        Typecast::new(PgTypeId::BOOL, "bool", cast_bool),
        Typecast::new(PgTypeId::INT2, "int2", cast_int),
        Typecast::new(PgTypeId::INT4, "int4", cast_int),
        Typecast::new(PgTypeId::INT8, "int8", cast_int),
        Typecast::new(PgTypeId::FLOAT4, "float4", cast_float),
        Typecast::new(PgTypeId::FLOAT8, "float8", cast_float),
        Typecast::new(PgTypeId::NUMERIC, "numeric", cast_numeric),
        Typecast::new(PgTypeId::TEXT, "text", cast_text),
        Typecast::new(PgTypeId::VARCHAR, "varchar", cast_text),
        Typecast::new(PgTypeId::BPCHAR, "bpchar", cast_text),
        Typecast::new(PgTypeId::UNKNOWN, "unknown", cast_text),
        Typecast::new(PgTypeId::BYTEA, "bytea", cast_bytea),
        Typecast::new(PgTypeId::DATE, "date", cast_date),
        Typecast::new(PgTypeId::TIME, "time", cast_time),
        Typecast::new(PgTypeId::TIMESTAMP, "timestamp", cast_timestamp),
        Typecast::new(PgTypeId::TIMESTAMPTZ, "timestamptz", cast_timestamptz),
        Typecast::new(PgTypeId::INTERVAL, "interval", cast_interval),
        Typecast::new(PgTypeId::BOOL_ARRAY, "_bool", cast_bool_array),
        Typecast::new(PgTypeId::INT2_ARRAY, "_int2", cast_int_array),
        Typecast::new(PgTypeId::INT4_ARRAY, "_int4", cast_int_array),
        Typecast::new(PgTypeId::INT8_ARRAY, "_int8", cast_int_array),
        Typecast::new(PgTypeId::FLOAT4_ARRAY, "_float4", cast_float_array),
        Typecast::new(PgTypeId::FLOAT8_ARRAY, "_float8", cast_float_array),
        Typecast::new(PgTypeId::TEXT_ARRAY, "_text", cast_text_array),
        Typecast::new(PgTypeId::NUMERIC_ARRAY, "_numeric", cast_numeric_array),
    ] {
        table.register(cast);
    }

    table
}

fn text_of<'a>(raw: &'a [u8], what: &'static str) -> Result<&'a str> {
    std::str::from_utf8(raw)
        .map_err(|_| Error::decode_msg(format!("{what} value is not valid UTF-8")))
}

fn cast_bool(raw: &[u8], _ctx: &CastContext<'_>) -> Result<Value> {
    match raw {
        b"t" => Ok(Value::Bool(true)),
        b"f" => Ok(Value::Bool(false)),
        _ => Err(Error::decode_msg(format!(
            "unexpected value {:?} for boolean",
            String::from_utf8_lossy(raw)
        ))),
    }
}

fn cast_int(raw: &[u8], _ctx: &CastContext<'_>) -> Result<Value> {
    atoi::atoi::<i64>(raw)
        .map(Value::Int)
        .ok_or_else(|| Error::decode_msg(format!("invalid integer: {:?}", String::from_utf8_lossy(raw))))
}

fn cast_float(raw: &[u8], _ctx: &CastContext<'_>) -> Result<Value> {
    let text = text_of(raw, "float")?;

    // `f64::from_str` accepts the `NaN` / `Infinity` spellings the
    // server uses for the non-finite values.
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| Error::decode_msg(format!("invalid float: {text:?}")))
}

fn cast_numeric(raw: &[u8], _ctx: &CastContext<'_>) -> Result<Value> {
    let text = text_of(raw, "numeric")?;

    if text == "NaN" {
        return Ok(Value::Numeric(PgNumeric::NotANumber));
    }

    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map(|decimal| Value::Numeric(PgNumeric::Number(decimal)))
        .map_err(|_| Error::decode_msg(format!("invalid numeric: {text:?}")))
}

fn cast_text(raw: &[u8], ctx: &CastContext<'_>) -> Result<Value> {
    let normalized = ctx.encoding.replace('-', "");
    if !normalized.eq_ignore_ascii_case("utf8") {
        return Err(Error::decode_msg(format!("unsupported client encoding: {}", ctx.encoding)));
    }

    Ok(Value::Text(text_of(raw, "text")?.to_owned()))
}

fn cast_bytea(raw: &[u8], _ctx: &CastContext<'_>) -> Result<Value> {
    if let Some(hexed) = raw.strip_prefix(b"\\x") {
        let text = text_of(hexed, "bytea")?;
        return hex::decode(text)
            .map(Value::Bytes)
            .map_err(|err| Error::decode(format!("invalid bytea hex encoding: {err}")));
    }

    // Legacy escape format: `\\` for a backslash, `\nnn` octal for
    // non-printable bytes, everything else verbatim.
    let mut out = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().copied().peekable();

    while let Some(b) = iter.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }

        if iter.peek() == Some(&b'\\') {
            iter.next();
            out.push(b'\\');
            continue;
        }

        let mut octal = 0u32;
        for _ in 0..3 {
            match iter.next() {
                Some(digit @ b'0'..=b'7') => octal = octal * 8 + u32::from(digit - b'0'),
                _ => return Err(Error::decode_msg("invalid bytea escape sequence")),
            }
        }

        out.push(u8::try_from(octal).map_err(|_| Error::decode_msg("invalid bytea escape sequence"))?);
    }

    Ok(Value::Bytes(out))
}

fn reject_infinite(text: &str, what: &'static str) -> Result<()> {
    if text.eq_ignore_ascii_case("infinity") || text.eq_ignore_ascii_case("-infinity") {
        return Err(Error::decode_msg(format!("{what} value {text:?} is out of range")));
    }

    Ok(())
}

fn cast_date(raw: &[u8], _ctx: &CastContext<'_>) -> Result<Value> {
    let text = text_of(raw, "date")?;
    reject_infinite(text, "date")?;

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(Value::Date)
        .map_err(|_| Error::decode_msg(format!("invalid date: {text:?}")))
}

fn cast_time(raw: &[u8], _ctx: &CastContext<'_>) -> Result<Value> {
    let text = text_of(raw, "time")?;

    NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .map(Value::Time)
        .map_err(|_| Error::decode_msg(format!("invalid time: {text:?}")))
}

fn cast_timestamp(raw: &[u8], _ctx: &CastContext<'_>) -> Result<Value> {
    let text = text_of(raw, "timestamp")?;
    reject_infinite(text, "timestamp")?;

    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map(Value::Timestamp)
        .map_err(|_| Error::decode_msg(format!("invalid timestamp: {text:?}")))
}

fn cast_timestamptz(raw: &[u8], _ctx: &CastContext<'_>) -> Result<Value> {
    let text = text_of(raw, "timestamptz")?;
    reject_infinite(text, "timestamptz")?;

    DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
        .map(Value::TimestampTz)
        .map_err(|_| Error::decode_msg(format!("invalid timestamptz: {text:?}")))
}

fn cast_interval(raw: &[u8], _ctx: &CastContext<'_>) -> Result<Value> {
    let text = text_of(raw, "interval")?;
    let invalid = || Error::decode_msg(format!("invalid interval: {text:?}"));

    let mut days = 0i64;
    let mut seconds = 0i64;
    let mut microseconds = 0i64;

    let mut tokens = text.split_whitespace();
    while let Some(token) = tokens.next() {
        if token.contains(':') {
            // hh:mm:ss[.ffffff], possibly sign-prefixed.
            let (sign, time) = match token.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, token),
            };

            let mut parts = time.splitn(3, ':');
            let hours: i64 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
            let minutes: i64 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;

            let rest = parts.next().ok_or_else(invalid)?;
            let (secs, frac) = match rest.split_once('.') {
                Some((secs, frac)) => (secs, Some(frac)),
                None => (rest, None),
            };

            let secs: i64 = secs.parse().map_err(|_| invalid())?;
            seconds += sign * (hours * 3600 + minutes * 60 + secs);

            if let Some(frac) = frac {
                if frac.len() > 6 || frac.is_empty() {
                    return Err(invalid());
                }
                let padded = format!("{frac:0<6}");
                let micros: i64 = padded.parse().map_err(|_| invalid())?;
                microseconds += sign * micros;
            }
        } else {
            let quantity: i64 = token.parse().map_err(|_| invalid())?;
            let unit = tokens.next().ok_or_else(invalid)?;

            // Month-based units have no exact day width; the customary
            // 30-day month / 365-day year is applied.
            match unit.trim_end_matches('s') {
                "year" => days += quantity * 365,
                "mon" | "month" => days += quantity * 30,
                "day" => days += quantity,
                _ => return Err(invalid()),
            }
        }
    }

    Ok(Value::Interval(PgInterval { days, seconds, microseconds }))
}

fn parse_array(raw: &[u8], elem: CastFn, ctx: &CastContext<'_>) -> Result<Value> {
    let mut pos = 0;
    let value = parse_array_at(raw, &mut pos, elem, ctx)?;

    if pos != raw.len() {
        return Err(Error::decode_msg("trailing characters after array literal"));
    }

    Ok(value)
}

fn parse_array_at(raw: &[u8], pos: &mut usize, elem: CastFn, ctx: &CastContext<'_>) -> Result<Value> {
    let malformed = || Error::decode_msg("malformed array literal");

    if raw.get(*pos) != Some(&b'{') {
        return Err(malformed());
    }
    *pos += 1;

    let mut items = Vec::new();

    loop {
        match raw.get(*pos) {
            Some(b'}') => {
                *pos += 1;
                return Ok(Value::Array(items));
            }

            Some(b'{') => {
                items.push(parse_array_at(raw, pos, elem, ctx)?);
            }

            Some(b'"') => {
                *pos += 1;
                let mut buf = Vec::new();

                loop {
                    match raw.get(*pos) {
                        Some(b'"') => {
                            *pos += 1;
                            break;
                        }
                        Some(b'\\') => {
                            let escaped = raw.get(*pos + 1).ok_or_else(malformed)?;
                            buf.push(*escaped);
                            *pos += 2;
                        }
                        Some(&b) => {
                            buf.push(b);
                            *pos += 1;
                        }
                        None => return Err(malformed()),
                    }
                }

                items.push(elem(&buf, ctx)?);
            }

            Some(_) => {
                let start = *pos;
                while !matches!(raw.get(*pos), None | Some(b',' | b'}')) {
                    *pos += 1;
                }

                let token = &raw[start..*pos];
                if token == b"NULL" {
                    items.push(Value::Null);
                } else {
                    items.push(elem(token, ctx)?);
                }
            }

            None => return Err(malformed()),
        }

        if raw.get(*pos) == Some(&b',') {
            *pos += 1;
        }
    }
}

fn cast_bool_array(raw: &[u8], ctx: &CastContext<'_>) -> Result<Value> {
    parse_array(raw, cast_bool, ctx)
}

fn cast_int_array(raw: &[u8], ctx: &CastContext<'_>) -> Result<Value> {
    parse_array(raw, cast_int, ctx)
}

fn cast_float_array(raw: &[u8], ctx: &CastContext<'_>) -> Result<Value> {
    parse_array(raw, cast_float, ctx)
}

fn cast_text_array(raw: &[u8], ctx: &CastContext<'_>) -> Result<Value> {
    parse_array(raw, cast_text, ctx)
}

fn cast_numeric_array(raw: &[u8], ctx: &CastContext<'_>) -> Result<Value> {
    parse_array(raw, cast_numeric, ctx)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};
    use rust_decimal::Decimal;

    use super::{resolve, CastContext, Typecast, Typecasts, UNKNOWN_CAST};
    use crate::type_id::PgTypeId;
    use crate::value::{PgInterval, PgNumeric, Value};

    fn run(id: PgTypeId, raw: &[u8]) -> Value {
        let none = Typecasts::new();
        resolve(id, &none, &none).apply(raw, &CastContext::default()).unwrap()
    }

    #[test]
    fn casts_scalars() {
        assert_eq!(run(PgTypeId::BOOL, b"t"), Value::Bool(true));
        assert_eq!(run(PgTypeId::INT4, b"-17"), Value::Int(-17));
        assert_eq!(run(PgTypeId::FLOAT8, b"2.5"), Value::Float(2.5));
        assert_eq!(run(PgTypeId::TEXT, b"hello"), Value::Text("hello".into()));
    }

    #[test]
    fn casts_non_finite_floats() {
        assert!(matches!(run(PgTypeId::FLOAT8, b"NaN"), Value::Float(f) if f.is_nan()));
        assert_eq!(run(PgTypeId::FLOAT8, b"Infinity"), Value::Float(f64::INFINITY));
        assert_eq!(run(PgTypeId::FLOAT8, b"-Infinity"), Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn casts_numeric_and_nan() {
        assert_eq!(
            run(PgTypeId::NUMERIC, b"10.50"),
            Value::Numeric(PgNumeric::Number(Decimal::from_str("10.50").unwrap()))
        );
        assert_eq!(run(PgTypeId::NUMERIC, b"NaN"), Value::Numeric(PgNumeric::NotANumber));
    }

    #[test]
    fn casts_bytea_hex_and_escape_forms() {
        assert_eq!(run(PgTypeId::BYTEA, b"\\x4142"), Value::Bytes(b"AB".to_vec()));
        assert_eq!(run(PgTypeId::BYTEA, b"A\\134B"), Value::Bytes(b"A\\B".to_vec()));
        assert_eq!(run(PgTypeId::BYTEA, b"A\\\\B"), Value::Bytes(b"A\\B".to_vec()));
    }

    #[test]
    fn casts_dates_and_times() {
        assert_eq!(
            run(PgTypeId::DATE, b"2021-03-14"),
            Value::Date(NaiveDate::from_ymd_opt(2021, 3, 14).unwrap())
        );
        assert_eq!(
            run(PgTypeId::TIME, b"13:14:15.25"),
            Value::Time(NaiveTime::from_hms_micro_opt(13, 14, 15, 250_000).unwrap())
        );
        assert_eq!(
            run(PgTypeId::TIMESTAMP, b"2021-03-14 13:14:15"),
            Value::Timestamp(
                NaiveDate::from_ymd_opt(2021, 3, 14).unwrap().and_hms_opt(13, 14, 15).unwrap()
            )
        );
        assert_eq!(
            run(PgTypeId::TIMESTAMPTZ, b"2021-03-14 13:14:15+05:30"),
            Value::TimestampTz(
                FixedOffset::east_opt(5 * 3600 + 1800)
                    .unwrap()
                    .with_ymd_and_hms(2021, 3, 14, 13, 14, 15)
                    .unwrap()
            )
        );
    }

    #[test]
    fn casts_intervals() {
        assert_eq!(
            run(PgTypeId::INTERVAL, b"3 days 04:05:06.5"),
            Value::Interval(PgInterval::new(3, 4 * 3600 + 5 * 60 + 6, 500_000))
        );
        assert_eq!(
            run(PgTypeId::INTERVAL, b"1 year 2 mons"),
            Value::Interval(PgInterval::new(425, 0, 0))
        );
        assert_eq!(
            run(PgTypeId::INTERVAL, b"-00:00:01"),
            Value::Interval(PgInterval::new(0, -1, 0))
        );
    }

    #[test]
    fn casts_arrays() {
        assert_eq!(
            run(PgTypeId::INT4_ARRAY, b"{1,NULL,3}"),
            Value::Array(vec![Value::Int(1), Value::Null, Value::Int(3)])
        );
        assert_eq!(run(PgTypeId::TEXT_ARRAY, b"{}"), Value::Array(vec![]));
        assert_eq!(
            run(PgTypeId::TEXT_ARRAY, br#"{"a b","say \"hi\""}"#),
            Value::Array(vec![Value::Text("a b".into()), Value::Text("say \"hi\"".into())])
        );
        assert_eq!(
            run(PgTypeId::INT4_ARRAY, b"{{1,2},{3,4}}"),
            Value::Array(vec![
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
                Value::Array(vec![Value::Int(3), Value::Int(4)]),
            ])
        );
    }

    #[test]
    fn unknown_oids_fall_back_to_text() {
        assert_eq!(run(PgTypeId(99_999), b"whatever"), Value::Text("whatever".into()));
    }

    #[test]
    fn overrides_shadow_in_order() {
        fn upper(raw: &[u8], ctx: &CastContext<'_>) -> crate::error::Result<Value> {
            match super::cast_text(raw, ctx)? {
                Value::Text(text) => Ok(Value::Text(text.to_uppercase())),
                other => Ok(other),
            }
        }

        fn lower(raw: &[u8], ctx: &CastContext<'_>) -> crate::error::Result<Value> {
            match super::cast_text(raw, ctx)? {
                Value::Text(text) => Ok(Value::Text(text.to_lowercase())),
                other => Ok(other),
            }
        }

        let mut cursor = Typecasts::new();
        let mut connection = Typecasts::new();
        let ctx = CastContext::default();

        connection.register(Typecast::new(PgTypeId::TEXT, "lower", lower));
        let cast = resolve(PgTypeId::TEXT, &cursor, &connection);
        assert_eq!(cast.apply(b"MiXeD", &ctx).unwrap(), Value::Text("mixed".into()));

        cursor.register(Typecast::new(PgTypeId::TEXT, "upper", upper));
        let cast = resolve(PgTypeId::TEXT, &cursor, &connection);
        assert_eq!(cast.apply(b"MiXeD", &ctx).unwrap(), Value::Text("MIXED".into()));
    }

    #[test]
    fn fallback_cast_is_text() {
        assert_eq!(UNKNOWN_CAST.id, PgTypeId::UNKNOWN);
        assert_eq!(
            UNKNOWN_CAST.apply(b"x", &CastContext::default()).unwrap(),
            Value::Text("x".into())
        );
    }
}
