//! A client-side adaptation layer over the native PostgreSQL client
//! library: parameter quoting, `%s` / `%(name)s` command composition,
//! OID-driven typecasting of result values, and a DB-API style cursor
//! state machine.
//!
//! Commands are composed entirely on the client. Values bound through
//! [`compose::Params`] are adapted into SQL literals, spliced into the
//! template, and the finished command is sent as plain text; result
//! values come back in text format and are cast by OID through a layered
//! typecast registry.

#![forbid(unsafe_code)]

pub mod adapt;
pub mod column;
pub mod compose;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod pq;
pub mod row;
pub mod testing;
pub mod type_id;
pub mod typecast;
pub mod value;

#[doc(inline)]
pub use self::{
    adapt::{adapt, adapt_as, quote_value, register, Adapter, QuoteContext},
    column::Column,
    compose::{compose, Params},
    connection::{AsyncStatus, Connection},
    cursor::Cursor,
    error::{Error, Result},
    row::{Row, RowFactory},
    type_id::PgTypeId,
    typecast::{register_global, CastContext, Typecast},
    value::{PgInterval, PgNumeric, Value},
};
