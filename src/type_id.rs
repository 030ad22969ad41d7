/// A unique identifier for a Postgres data type, as it appears on the wire.
///
/// Result-set fields carry one of these; the typecast registry is keyed
/// by them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PgTypeId(pub u32);

// Data Types
// https://www.postgresql.org/docs/current/datatype.html

impl PgTypeId {
    /// The SQL standard `boolean` type.
    pub const BOOL: Self = Self(16);

    /// Variable-length binary data.
    pub const BYTEA: Self = Self(17);

    /// An 8-byte integer.
    pub const INT8: Self = Self(20);

    /// A 2-byte integer.
    pub const INT2: Self = Self(21);

    /// A 4-byte integer.
    pub const INT4: Self = Self(23);

    /// Variable-length character data with no declared limit.
    pub const TEXT: Self = Self(25);

    /// A 4-byte floating point number.
    pub const FLOAT4: Self = Self(700);

    /// An 8-byte floating point number.
    pub const FLOAT8: Self = Self(701);

    /// The pseudo-type given to literals whose type cannot be inferred.
    pub const UNKNOWN: Self = Self(705);

    /// Fixed-length, blank-padded character data.
    pub const BPCHAR: Self = Self(1042);

    /// Variable-length character data with a declared limit.
    pub const VARCHAR: Self = Self(1043);

    /// A calendar date.
    pub const DATE: Self = Self(1082);

    /// A time of day, without timezone.
    pub const TIME: Self = Self(1083);

    /// A date and time, without timezone.
    pub const TIMESTAMP: Self = Self(1114);

    /// A date and time, with timezone.
    pub const TIMESTAMPTZ: Self = Self(1184);

    /// A span of time.
    pub const INTERVAL: Self = Self(1186);

    /// An exact numeric with selectable precision.
    pub const NUMERIC: Self = Self(1700);

    // Array types

    /// An array of `boolean`.
    pub const BOOL_ARRAY: Self = Self(1000);

    /// An array of `int2`.
    pub const INT2_ARRAY: Self = Self(1005);

    /// An array of `int4`.
    pub const INT4_ARRAY: Self = Self(1007);

    /// An array of `text`.
    pub const TEXT_ARRAY: Self = Self(1009);

    /// An array of `int8`.
    pub const INT8_ARRAY: Self = Self(1016);

    /// An array of `float4`.
    pub const FLOAT4_ARRAY: Self = Self(1021);

    /// An array of `float8`.
    pub const FLOAT8_ARRAY: Self = Self(1022);

    /// An array of `numeric`.
    pub const NUMERIC_ARRAY: Self = Self(1231);
}

impl PgTypeId {
    /// The raw OID.
    #[must_use]
    pub const fn oid(self) -> u32 {
        self.0
    }
}

impl From<u32> for PgTypeId {
    fn from(oid: u32) -> Self {
        Self(oid)
    }
}
