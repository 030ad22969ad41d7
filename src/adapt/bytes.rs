use crate::adapt::{Adapter, QuoteContext};
use crate::error::Result;
use crate::pq;

/// Adapts a byte string to a `'...'::bytea` literal.
///
/// When prepared against a connection the native escaping routine is
/// used and the `E'...'` extended-escape prefix is applied if the
/// connection requires it; otherwise the context-free hex form applies.
/// A missing value (`None`) renders as `NULL`.
pub struct Binary {
    data: Option<Vec<u8>>,
    escaped: Option<Vec<u8>>,
    equote: bool,
}

impl Binary {
    /// Wrap a byte string (or its absence) for adaptation.
    #[must_use]
    pub fn new(data: Option<Vec<u8>>) -> Self {
        Self { data, escaped: None, equote: false }
    }
}

impl Adapter for Binary {
    fn prepare(&mut self, ctx: &QuoteContext<'_>) -> Result<()> {
        self.equote = ctx.equote();

        if let Some(data) = &self.data {
            self.escaped = Some(ctx.escape_bytea(data));
        }

        Ok(())
    }

    fn quoted(&self) -> Result<Vec<u8>> {
        let Some(data) = &self.data else {
            return Ok(b"NULL".to_vec());
        };

        let escaped = match &self.escaped {
            Some(escaped) => escaped.clone(),
            None => pq::escape_bytea(data, false),
        };

        let mut out = Vec::with_capacity(escaped.len() + 12);

        if self.equote {
            out.push(b'E');
        }

        out.push(b'\'');
        out.extend_from_slice(&escaped);
        out.extend_from_slice(b"'::bytea");

        Ok(out)
    }
}
