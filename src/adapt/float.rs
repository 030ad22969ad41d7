use crate::adapt::int::space_negative;
use crate::adapt::Adapter;
use crate::error::Result;

/// Adapts a floating point number to decimal text.
///
/// The non-finite values have no plain-text literal form and are rendered
/// as casted string literals instead. Finite negatives follow the same
/// leading-space convention as integers.
pub struct Float {
    value: f64,
}

impl Float {
    /// Wrap a float for adaptation.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Adapter for Float {
    fn quoted(&self) -> Result<Vec<u8>> {
        let n = self.value;

        if n.is_nan() {
            return Ok(b"'NaN'::float".to_vec());
        }

        if n.is_infinite() {
            return Ok(if n > 0.0 {
                b"'Infinity'::float".to_vec()
            } else {
                b"'-Infinity'::float".to_vec()
            });
        }

        Ok(space_negative(&n.to_string()))
    }
}
