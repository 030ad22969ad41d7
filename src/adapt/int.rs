use crate::adapt::Adapter;
use crate::error::Result;

/// Adapts an integer to decimal text.
///
/// Negative values are prepended with a single space so the minus sign
/// cannot fuse with an operator already present in the command text
/// (e.g. `10-%s` with -1 must become `10- -1`, not `10--1`).
pub struct Integer {
    value: i64,
}

impl Integer {
    /// Wrap an integer for adaptation.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self { value }
    }
}

impl Adapter for Integer {
    fn quoted(&self) -> Result<Vec<u8>> {
        let mut buf = itoa::Buffer::new();
        Ok(space_negative(buf.format(self.value)))
    }
}

/// Prepend a single space when the rendered number is negative.
pub(crate) fn space_negative(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 1);

    if text.starts_with('-') {
        out.push(b' ');
    }

    out.extend_from_slice(text.as_bytes());
    out
}
