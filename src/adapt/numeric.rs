use crate::adapt::int::space_negative;
use crate::adapt::Adapter;
use crate::error::Result;
use crate::value::PgNumeric;

/// Adapts an exact numeric to decimal text.
///
/// `NaN` has no plain literal form and renders as `'NaN'::numeric`.
pub struct Numeric {
    value: PgNumeric,
}

impl Numeric {
    /// Wrap a numeric for adaptation.
    #[must_use]
    pub fn new(value: PgNumeric) -> Self {
        Self { value }
    }
}

impl Adapter for Numeric {
    fn quoted(&self) -> Result<Vec<u8>> {
        match self.value {
            PgNumeric::NotANumber => Ok(b"'NaN'::numeric".to_vec()),
            PgNumeric::Number(decimal) => Ok(space_negative(&decimal.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::Numeric;
    use crate::adapt::Adapter;
    use crate::value::PgNumeric;

    #[test]
    fn renders_decimal_text() {
        let value = PgNumeric::Number(Decimal::new(1050, 2));
        assert_eq!(Numeric::new(value).quoted().unwrap(), b"10.50");
    }

    #[test]
    fn negative_values_get_a_leading_space() {
        let value = PgNumeric::Number(Decimal::new(-1050, 2));
        assert_eq!(Numeric::new(value).quoted().unwrap(), b" -10.50");
    }

    #[test]
    fn nan_renders_as_casted_literal() {
        assert_eq!(Numeric::new(PgNumeric::NotANumber).quoted().unwrap(), b"'NaN'::numeric");
    }
}
