use crate::adapt::Adapter;
use crate::error::Result;

/// Adapts a boolean to the `true` / `false` keywords.
pub struct Boolean {
    value: bool,
}

impl Boolean {
    /// Wrap a boolean for adaptation.
    #[must_use]
    pub fn new(value: bool) -> Self {
        Self { value }
    }
}

impl Adapter for Boolean {
    fn quoted(&self) -> Result<Vec<u8>> {
        Ok(if self.value { b"true".to_vec() } else { b"false".to_vec() })
    }
}
