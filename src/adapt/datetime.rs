use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::adapt::Adapter;
use crate::error::{Error, Result};
use crate::value::PgInterval;

/// Adapts the date/time value family to ISO-8601 literals with an
/// explicit type cast suffix.
pub enum Temporal {
    /// A calendar date, cast to `::date`.
    Date(NaiveDate),

    /// A time of day, cast to `::time`.
    Time(NaiveTime),

    /// A date and time without timezone, cast to `::timestamp`.
    Timestamp(NaiveDateTime),

    /// A date and time with timezone, cast to `::timestamptz`.
    TimestampTz(DateTime<FixedOffset>),

    /// A span of time, rendered as a days/seconds/microseconds literal
    /// cast to `::interval`.
    Interval(PgInterval),
}

impl Temporal {
    /// Wrap a date for adaptation.
    #[must_use]
    pub fn date(value: NaiveDate) -> Self {
        Self::Date(value)
    }

    /// Wrap a time for adaptation.
    #[must_use]
    pub fn time(value: NaiveTime) -> Self {
        Self::Time(value)
    }

    /// Wrap a timestamp for adaptation.
    #[must_use]
    pub fn timestamp(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }

    /// Wrap a timezone-aware timestamp for adaptation.
    #[must_use]
    pub fn timestamp_tz(value: DateTime<FixedOffset>) -> Self {
        Self::TimestampTz(value)
    }

    /// Wrap an interval for adaptation.
    #[must_use]
    pub fn interval(value: PgInterval) -> Self {
        Self::Interval(value)
    }
}

impl Adapter for Temporal {
    fn quoted(&self) -> Result<Vec<u8>> {
        let rendered = match self {
            Temporal::Date(date) => {
                format!("'{}'::date", date.format("%Y-%m-%d"))
            }

            Temporal::Time(time) => {
                format!("'{}{}'::time", time.format("%H:%M:%S"), fraction(time.nanosecond()))
            }

            Temporal::Timestamp(ts) => {
                format!("'{}{}'::timestamp", ts.format("%Y-%m-%dT%H:%M:%S"), fraction(ts.nanosecond()))
            }

            Temporal::TimestampTz(ts) => {
                format!(
                    "'{}{}{}'::timestamptz",
                    ts.format("%Y-%m-%dT%H:%M:%S"),
                    fraction(ts.nanosecond()),
                    ts.format("%:z")
                )
            }

            Temporal::Interval(interval) => {
                // No literal form exists for a negative sub-second
                // component on its own.
                if interval.microseconds < 0 {
                    return Err(Error::InvalidFormat(
                        "interval has a negative microsecond component".into(),
                    ));
                }

                format!(
                    "'{} days {}.{:06} seconds'::interval",
                    interval.days, interval.seconds, interval.microseconds
                )
            }
        };

        Ok(rendered.into_bytes())
    }
}

// Sub-second components are always six digits; chrono's `%.f` would use
// the shortest form instead.
fn fraction(nanoseconds: u32) -> String {
    let microseconds = nanoseconds / 1_000;

    if microseconds == 0 {
        String::new()
    } else {
        format!(".{microseconds:06}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};

    use super::Temporal;
    use crate::adapt::Adapter;
    use crate::error::Error;
    use crate::value::PgInterval;

    #[test]
    fn date_is_cast() {
        let date = NaiveDate::from_ymd_opt(2021, 3, 14).unwrap();
        assert_eq!(Temporal::date(date).quoted().unwrap(), b"'2021-03-14'::date");
    }

    #[test]
    fn fractional_seconds_are_always_six_digits() {
        let time = NaiveTime::from_hms_micro_opt(13, 14, 15, 160_000).unwrap();
        assert_eq!(Temporal::time(time).quoted().unwrap(), b"'13:14:15.160000'::time");

        let ts = NaiveDate::from_ymd_opt(2021, 3, 14)
            .unwrap()
            .and_hms_micro_opt(1, 2, 3, 42)
            .unwrap();
        assert_eq!(
            Temporal::timestamp(ts).quoted().unwrap(),
            b"'2021-03-14T01:02:03.000042'::timestamp"
        );
    }

    #[test]
    fn whole_seconds_omit_the_fraction() {
        let time = NaiveTime::from_hms_opt(13, 14, 15).unwrap();
        assert_eq!(Temporal::time(time).quoted().unwrap(), b"'13:14:15'::time");
    }

    #[test]
    fn naive_timestamp_is_not_timestamptz() {
        let ts = NaiveDate::from_ymd_opt(2021, 3, 14).unwrap().and_hms_opt(1, 2, 3).unwrap();
        assert_eq!(Temporal::timestamp(ts).quoted().unwrap(), b"'2021-03-14T01:02:03'::timestamp");
    }

    #[test]
    fn aware_timestamp_carries_its_offset() {
        let offset = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let ts = offset.with_ymd_and_hms(2021, 3, 14, 1, 2, 3).unwrap();
        assert_eq!(
            Temporal::timestamp_tz(ts).quoted().unwrap(),
            b"'2021-03-14T01:02:03+05:30'::timestamptz"
        );
    }

    #[test]
    fn interval_microseconds_are_zero_padded() {
        let interval = PgInterval::new(42, 45296, 1_000);
        assert_eq!(
            Temporal::interval(interval).quoted().unwrap(),
            b"'42 days 45296.001000 seconds'::interval"
        );
    }

    #[test]
    fn negative_interval_microseconds_are_refused() {
        let interval = PgInterval::new(0, 0, -1);
        let err = Temporal::interval(interval).quoted().unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }
}
