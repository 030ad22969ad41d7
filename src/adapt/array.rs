use crate::adapt::{quote_value, Adapter, QuoteContext};
use crate::error::Result;
use crate::value::Value;

/// Adapts a sequence of values to an `ARRAY[...]` constructor.
///
/// Each element is adapted through its own family's adapter; NULL
/// elements render as `NULL`. The empty sequence has no `ARRAY[]` form
/// without an element type, so it renders as the untyped `'{}'` literal.
pub struct List {
    values: Vec<Value>,
    rendered: Option<Vec<Vec<u8>>>,
}

impl List {
    /// Wrap a sequence for adaptation.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, rendered: None }
    }

    fn render(&self, ctx: &QuoteContext<'_>) -> Result<Vec<Vec<u8>>> {
        self.values.iter().map(|value| quote_value(value, ctx)).collect()
    }
}

impl Adapter for List {
    fn prepare(&mut self, ctx: &QuoteContext<'_>) -> Result<()> {
        self.rendered = Some(self.render(ctx)?);
        Ok(())
    }

    fn quoted(&self) -> Result<Vec<u8>> {
        if self.values.is_empty() {
            return Ok(b"'{}'".to_vec());
        }

        let rendered = match &self.rendered {
            Some(rendered) => rendered.clone(),
            None => self.render(&QuoteContext::detached())?,
        };

        let mut out = Vec::with_capacity(16 + rendered.iter().map(Vec::len).sum::<usize>());
        out.extend_from_slice(b"ARRAY[");

        for (i, element) in rendered.iter().enumerate() {
            if i > 0 {
                out.extend_from_slice(b", ");
            }
            out.extend_from_slice(element);
        }

        out.push(b']');
        Ok(out)
    }
}
