//! Adaptation of host values into SQL literal text.
//!
//! Every parameter bound into a command goes through an [`Adapter`]: a
//! single-use object wrapping one value, optionally prepared against a
//! connection's escaping context, then rendered to literal bytes. The
//! built-in value families each have their own adapter module; arbitrary
//! user types participate through the process-wide [registry](register)
//! or by implementing [`SqlValue::conform`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::pq;
use crate::value::{PgInterval, PgNumeric, Value};

mod array;
mod bool;
mod bytes;
mod datetime;
mod float;
mod int;
mod numeric;
mod str;

pub use self::array::List;
pub use self::bool::Boolean;
pub use self::bytes::Binary;
pub use self::datetime::Temporal;
pub use self::float::Float;
pub use self::int::Integer;
pub use self::numeric::Numeric;
pub use self::str::QuotedString;

/// Escaping services provided by a live connection.
///
/// The cursor layer's `Connection` implements this by delegating to its
/// native handle; adapters fall back to the context-free forms in
/// [`crate::pq`] when no connection is bound.
pub trait Escaping {
    /// Connection-aware bytea escaping. Quotes are not included.
    fn escape_bytea(&self, data: &[u8]) -> Vec<u8>;

    /// Connection-aware string escaping. Quotes are not included.
    fn escape_string(&self, data: &[u8]) -> Vec<u8>;

    /// Single-call literal escaping, quotes included; `None` when the
    /// server predates it.
    fn escape_literal(&self, data: &[u8]) -> Option<Vec<u8>>;
}

/// Escaping context bound into an adapter by [`Adapter::prepare`].
#[derive(Clone, Copy)]
pub struct QuoteContext<'a> {
    equote: bool,
    server_version: u32,
    escape: Option<&'a dyn Escaping>,
}

impl<'a> QuoteContext<'a> {
    /// A context carrying a connection's escaping configuration.
    pub fn new(equote: bool, server_version: u32, escape: &'a dyn Escaping) -> Self {
        Self { equote, server_version, escape: Some(escape) }
    }

    /// A context with no connection bound; escaping uses the
    /// context-free fallbacks.
    #[must_use]
    pub fn detached() -> QuoteContext<'static> {
        QuoteContext { equote: false, server_version: 0, escape: None }
    }

    /// Whether the connection requires `E'...'` extended-escape literals.
    #[must_use]
    pub fn equote(&self) -> bool {
        self.equote
    }

    pub(crate) fn escape_bytea(&self, data: &[u8]) -> Vec<u8> {
        match self.escape {
            Some(escape) => escape.escape_bytea(data),
            None => pq::escape_bytea(data, false),
        }
    }

    pub(crate) fn escape_string(&self, data: &[u8]) -> Vec<u8> {
        match self.escape {
            Some(escape) => escape.escape_string(data),
            None => pq::escape_string(data, false),
        }
    }

    pub(crate) fn escape_literal(&self, data: &[u8]) -> Option<Vec<u8>> {
        if self.server_version < 90000 {
            return None;
        }

        self.escape.and_then(|escape| escape.escape_literal(data))
    }
}

impl Default for QuoteContext<'static> {
    fn default() -> Self {
        Self::detached()
    }
}

/// Renders one wrapped host value as a SQL literal.
///
/// Adapters are constructed per value, used once, and discarded.
pub trait Adapter {
    /// Bind a connection's escaping context. Idempotent; the default
    /// implementation ignores the context entirely.
    fn prepare(&mut self, ctx: &QuoteContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Render the wrapped value as SQL literal bytes.
    fn quoted(&self) -> Result<Vec<u8>>;
}

impl core::fmt::Debug for dyn Adapter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Adapter")
    }
}

/// Renders a value's textual form verbatim, with no escaping.
///
/// Only for trusted literal injection; the caller is responsible for the
/// content being safe.
pub struct AsIs {
    text: String,
}

impl AsIs {
    /// Wrap the given textual form.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Adapter for AsIs {
    fn quoted(&self) -> Result<Vec<u8>> {
        Ok(self.text.clone().into_bytes())
    }
}

/// An adaptation protocol tag.
///
/// There is a single built-in protocol; the tag exists so user
/// registrations can introduce additional ones without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Adaptation to a quoted SQL literal.
    SqlQuote,
}

/// A value that can be bound as a command parameter.
///
/// Implemented for the built-in value families and for [`Value`]. User
/// types implement it to participate in adaptation, either through the
/// registry or by overriding [`conform`](Self::conform), the
/// self-adaptation hook consulted when no registration matches.
pub trait SqlValue: Any {
    /// Produce an adapter for this value directly, bypassing the
    /// registry. The default declines.
    fn conform(&self, proto: Protocol) -> Option<Box<dyn Adapter>> {
        let _ = proto;
        None
    }
}

/// Constructs an adapter from a value of the registered type.
///
/// Returns `None` if the value is not actually of that type.
pub type AdapterFactory = fn(&dyn Any) -> Option<Box<dyn Adapter>>;

struct AdapterRegistry {
    entries: HashMap<(TypeId, Protocol), AdapterFactory>,
}

macro_rules! builtin_factory {
    ($ty:ty, $make:expr) => {{
        fn factory(value: &dyn Any) -> Option<Box<dyn Adapter>> {
            let value = value.downcast_ref::<$ty>()?;
            #[allow(clippy::redundant_closure_call)]
            Some(($make)(value))
        }
        factory as AdapterFactory
    }};
}

impl AdapterRegistry {
    fn builtin() -> Self {
        let mut registry = Self { entries: HashMap::new() };

        registry.insert::<Value>(builtin_factory!(Value, |v: &Value| adapt_value(v)));
        registry.insert::<bool>(builtin_factory!(bool, |v: &bool| {
            Box::new(Boolean::new(*v)) as Box<dyn Adapter>
        }));
        registry.insert::<i16>(builtin_factory!(i16, |v: &i16| {
            Box::new(Integer::new(i64::from(*v))) as Box<dyn Adapter>
        }));
        registry.insert::<i32>(builtin_factory!(i32, |v: &i32| {
            Box::new(Integer::new(i64::from(*v))) as Box<dyn Adapter>
        }));
        registry.insert::<i64>(builtin_factory!(i64, |v: &i64| {
            Box::new(Integer::new(*v)) as Box<dyn Adapter>
        }));
        registry.insert::<f32>(builtin_factory!(f32, |v: &f32| {
            Box::new(Float::new(f64::from(*v))) as Box<dyn Adapter>
        }));
        registry.insert::<f64>(builtin_factory!(f64, |v: &f64| {
            Box::new(Float::new(*v)) as Box<dyn Adapter>
        }));
        registry.insert::<Decimal>(builtin_factory!(Decimal, |v: &Decimal| {
            Box::new(Numeric::new(PgNumeric::Number(*v))) as Box<dyn Adapter>
        }));
        registry.insert::<PgNumeric>(builtin_factory!(PgNumeric, |v: &PgNumeric| {
            Box::new(Numeric::new(*v)) as Box<dyn Adapter>
        }));
        registry.insert::<String>(builtin_factory!(String, |v: &String| {
            Box::new(QuotedString::new(v.clone())) as Box<dyn Adapter>
        }));
        registry.insert::<Vec<u8>>(builtin_factory!(Vec<u8>, |v: &Vec<u8>| {
            Box::new(Binary::new(Some(v.clone()))) as Box<dyn Adapter>
        }));
        registry.insert::<NaiveDate>(builtin_factory!(NaiveDate, |v: &NaiveDate| {
            Box::new(Temporal::date(*v)) as Box<dyn Adapter>
        }));
        registry.insert::<NaiveTime>(builtin_factory!(NaiveTime, |v: &NaiveTime| {
            Box::new(Temporal::time(*v)) as Box<dyn Adapter>
        }));
        registry.insert::<NaiveDateTime>(builtin_factory!(NaiveDateTime, |v: &NaiveDateTime| {
            Box::new(Temporal::timestamp(*v)) as Box<dyn Adapter>
        }));
        registry.insert::<DateTime<FixedOffset>>(builtin_factory!(
            DateTime<FixedOffset>,
            |v: &DateTime<FixedOffset>| Box::new(Temporal::timestamp_tz(*v)) as Box<dyn Adapter>
        ));
        registry.insert::<PgInterval>(builtin_factory!(PgInterval, |v: &PgInterval| {
            Box::new(Temporal::interval(*v)) as Box<dyn Adapter>
        }));
        registry.insert::<Vec<Value>>(builtin_factory!(Vec<Value>, |v: &Vec<Value>| {
            Box::new(List::new(v.clone())) as Box<dyn Adapter>
        }));

        registry
    }

    fn insert<T: 'static>(&mut self, factory: AdapterFactory) {
        self.entries.insert((TypeId::of::<T>(), Protocol::SqlQuote), factory);
    }

    fn register<T: 'static>(&mut self, proto: Protocol, factory: AdapterFactory) {
        self.entries.insert((TypeId::of::<T>(), proto), factory);
    }

    fn lookup(&self, type_id: TypeId, proto: Protocol) -> Option<AdapterFactory> {
        self.entries.get(&(type_id, proto)).copied()
    }
}

static ADAPTERS: LazyLock<RwLock<AdapterRegistry>> =
    LazyLock::new(|| RwLock::new(AdapterRegistry::builtin()));

/// Register an adapter factory for `T` under the given protocol,
/// replacing any previous registration for the pair.
pub fn register<T: 'static>(proto: Protocol, factory: AdapterFactory) {
    ADAPTERS
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .register::<T>(proto, factory);
}

/// Return the adapter for the given value.
///
/// Lookup consults the registry for the value's exact type first, then
/// the value's own [`SqlValue::conform`] hook, and fails with
/// [`Error::Adaptation`] when neither applies.
pub fn adapt<T: SqlValue>(value: &T) -> Result<Box<dyn Adapter>> {
    adapt_as(value, Protocol::SqlQuote)
}

/// [`adapt`], under an explicit protocol tag.
pub fn adapt_as<T: SqlValue>(value: &T, proto: Protocol) -> Result<Box<dyn Adapter>> {
    let factory = ADAPTERS
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .lookup(TypeId::of::<T>(), proto);

    if let Some(factory) = factory {
        if let Some(adapter) = factory(value) {
            return Ok(adapter);
        }
    }

    if let Some(adapter) = value.conform(proto) {
        return Ok(adapter);
    }

    Err(Error::Adaptation { type_name: std::any::type_name::<T>() })
}

/// Built-in dispatch from a [`Value`] to its adapter.
pub(crate) fn adapt_value(value: &Value) -> Box<dyn Adapter> {
    match value {
        Value::Null => Box::new(AsIs::new("NULL")),
        Value::Bool(v) => Box::new(Boolean::new(*v)),
        Value::Int(v) => Box::new(Integer::new(*v)),
        Value::Float(v) => Box::new(Float::new(*v)),
        Value::Numeric(v) => Box::new(Numeric::new(*v)),
        Value::Bytes(v) => Box::new(Binary::new(Some(v.clone()))),
        Value::Text(v) => Box::new(QuotedString::new(v.clone())),
        Value::Date(v) => Box::new(Temporal::date(*v)),
        Value::Time(v) => Box::new(Temporal::time(*v)),
        Value::Timestamp(v) => Box::new(Temporal::timestamp(*v)),
        Value::TimestampTz(v) => Box::new(Temporal::timestamp_tz(*v)),
        Value::Interval(v) => Box::new(Temporal::interval(*v)),
        Value::Array(v) => Box::new(List::new(v.clone())),
    }
}

/// Adapt, prepare, and render a value in one step.
///
/// NULL never reaches an adapter; it renders directly.
pub fn quote_value(value: &Value, ctx: &QuoteContext<'_>) -> Result<Vec<u8>> {
    if value.is_null() {
        return Ok(b"NULL".to_vec());
    }

    let mut adapter = adapt_value(value);
    adapter.prepare(ctx)?;
    adapter.quoted()
}

impl SqlValue for Value {}
impl SqlValue for bool {}
impl SqlValue for i16 {}
impl SqlValue for i32 {}
impl SqlValue for i64 {}
impl SqlValue for f32 {}
impl SqlValue for f64 {}
impl SqlValue for Decimal {}
impl SqlValue for PgNumeric {}
impl SqlValue for String {}
impl SqlValue for Vec<u8> {}
impl SqlValue for NaiveDate {}
impl SqlValue for NaiveTime {}
impl SqlValue for NaiveDateTime {}
impl SqlValue for DateTime<FixedOffset> {}
impl SqlValue for PgInterval {}
impl SqlValue for Vec<Value> {}
