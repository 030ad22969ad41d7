use crate::adapt::{Adapter, QuoteContext};
use crate::error::Result;
use crate::pq;

/// Adapts a text string to a quoted literal.
///
/// When prepared against a connection whose server supports it, the
/// single-call literal-escaping routine produces the entire literal
/// (quotes included). Older servers and unbound adapters fall back to
/// escape-then-quote, with the `E'...'` prefix applied when the
/// connection requires extended escapes.
pub struct QuotedString {
    text: String,
    literal: Option<Vec<u8>>,
    escaped: Option<Vec<u8>>,
    equote: bool,
}

impl QuotedString {
    /// Wrap a string for adaptation.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), literal: None, escaped: None, equote: false }
    }
}

impl Adapter for QuotedString {
    fn prepare(&mut self, ctx: &QuoteContext<'_>) -> Result<()> {
        self.equote = ctx.equote();

        if let Some(literal) = ctx.escape_literal(self.text.as_bytes()) {
            self.literal = Some(literal);
        } else {
            self.escaped = Some(ctx.escape_string(self.text.as_bytes()));
        }

        Ok(())
    }

    fn quoted(&self) -> Result<Vec<u8>> {
        if let Some(literal) = &self.literal {
            return Ok(literal.clone());
        }

        let escaped = match &self.escaped {
            Some(escaped) => escaped.clone(),
            None => pq::escape_string(self.text.as_bytes(), false),
        };

        let mut out = Vec::with_capacity(escaped.len() + 3);

        if self.equote {
            out.push(b'E');
        }

        out.push(b'\'');
        out.extend_from_slice(&escaped);
        out.push(b'\'');

        Ok(out)
    }
}
