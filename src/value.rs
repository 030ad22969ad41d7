use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// An exact numeric as Postgres models it.
///
/// Postgres `NUMERIC` admits a `NaN` value that [`Decimal`] cannot
/// represent, so the two cases are kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgNumeric {
    /// The `NaN` numeric value.
    NotANumber,

    /// A finite numeric value.
    Number(Decimal),
}

/// A span of time, decomposed the way Postgres interval literals are
/// written: whole days plus seconds plus sub-second microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PgInterval {
    /// Whole days. May be negative.
    pub days: i64,

    /// Whole seconds within the day.
    pub seconds: i64,

    /// Microseconds within the second, `0..=999_999`.
    pub microseconds: i64,
}

impl PgInterval {
    /// An interval of whole days, seconds, and microseconds.
    #[must_use]
    pub const fn new(days: i64, seconds: i64, microseconds: i64) -> Self {
        Self { days, seconds, microseconds }
    }
}

/// A dynamically typed host value.
///
/// This is the common currency of the layer: command parameters are
/// adapted from it and decoded columns are produced as it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,

    /// A boolean.
    Bool(bool),

    /// An integer.
    Int(i64),

    /// A floating point number.
    Float(f64),

    /// An exact numeric.
    Numeric(PgNumeric),

    /// A byte string.
    Bytes(Vec<u8>),

    /// A text string.
    Text(String),

    /// A calendar date.
    Date(NaiveDate),

    /// A time of day.
    Time(NaiveTime),

    /// A date and time without timezone.
    Timestamp(NaiveDateTime),

    /// A date and time with timezone.
    TimestampTz(DateTime<FixedOffset>),

    /// A span of time.
    Interval(PgInterval),

    /// An array of values.
    Array(Vec<Value>),
}

impl Value {
    /// Whether this value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Numeric(PgNumeric::Number(value))
    }
}

impl From<PgNumeric> for Value {
    fn from(value: PgNumeric) -> Self {
        Value::Numeric(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Value::Time(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Value::TimestampTz(value)
    }
}

impl From<PgInterval> for Value {
    fn from(value: PgInterval) -> Self {
        Value::Interval(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}
