//! Command composition: splicing adapted parameters into a `%s` /
//! `%(name)s` command template.
//!
//! The template is scanned left to right in a single pass that also
//! performs substitution, so `%%` collapses to a literal `%` exactly
//! once whether or not parameters are present near it. The first
//! placeholder encountered fixes the template's style; named and
//! positional placeholders can never be mixed.

use std::collections::HashMap;

use memchr::memchr;

use crate::adapt::{quote_value, QuoteContext};
use crate::error::{Error, Result};
use crate::value::Value;

/// Parameters supplied alongside a command template.
#[derive(Debug, Clone, Copy)]
pub enum Params<'a> {
    /// No parameters; the template is sent verbatim, `%` and all.
    None,

    /// Positional parameters, consumed by `%s` placeholders in order.
    Positional(&'a [Value]),

    /// Named parameters, consumed by `%(name)s` placeholders by key.
    Named(&'a HashMap<String, Value>),
}

impl Params<'_> {
    /// Whether no parameters were supplied.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Params::None)
    }
}

#[derive(PartialEq, Clone, Copy)]
enum Style {
    Named,
    Positional,
}

/// Compose a command template and its parameters into the final command
/// bytes, adapting each parameter under the given escaping context.
pub fn compose(template: &str, params: &Params<'_>, ctx: &QuoteContext<'_>) -> Result<Vec<u8>> {
    // No binding required; the template goes through untouched. This also
    // means `%%` is left alone when no parameters are supplied.
    if params.is_none() || !template.contains('%') {
        return Ok(template.as_bytes().to_vec());
    }

    let bytes = template.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + 32);

    let mut style = None;
    let mut positional_used = 0;
    let mut named_cache: HashMap<&str, Vec<u8>> = HashMap::new();

    let mut idx = 0;
    while idx < bytes.len() {
        let Some(offset) = memchr(b'%', &bytes[idx..]) else {
            out.extend_from_slice(&bytes[idx..]);
            break;
        };

        out.extend_from_slice(&bytes[idx..idx + offset]);
        idx += offset;

        match bytes.get(idx + 1).copied() {
            // Escaped literal percent.
            Some(b'%') => {
                out.push(b'%');
                idx += 2;
            }

            // Named placeholder.
            Some(b'(') => {
                if style == Some(Style::Positional) {
                    return Err(mixed_styles());
                }
                style = Some(Style::Named);

                let rest = &bytes[idx + 2..];
                let close = match (memchr(b')', rest), memchr(b'%', rest)) {
                    (Some(close), Some(pct)) if close < pct => close,
                    (Some(close), None) => close,
                    _ => {
                        return Err(Error::Programming(
                            "incomplete placeholder: '%(' without ')'".into(),
                        ));
                    }
                };

                // The key sits between two ASCII delimiters of a valid
                // UTF-8 template, so it is itself valid UTF-8.
                let key = std::str::from_utf8(&rest[..close])
                    .map_err(|_| Error::InvalidFormat("placeholder name is not UTF-8".into()))?;

                check_format_char(bytes.get(idx + 2 + close + 1).copied(), idx)?;

                let Params::Named(map) = params else {
                    return Err(Error::InvalidFormat(
                        "named placeholders require named parameters".into(),
                    ));
                };

                let rendered = match named_cache.get(key) {
                    Some(rendered) => rendered.clone(),
                    None => {
                        let value = map.get(key).ok_or_else(|| {
                            Error::Programming(format!("no value supplied for placeholder '{key}'"))
                        })?;
                        let rendered = quote_value(value, ctx)?;
                        named_cache.insert(key, rendered.clone());
                        rendered
                    }
                };

                out.extend_from_slice(&rendered);
                idx += 2 + close + 2;
            }

            // Positional placeholder, or junk after the percent.
            Some(c) => {
                check_format_char(Some(c), idx)?;

                if style == Some(Style::Named) {
                    return Err(mixed_styles());
                }
                style = Some(Style::Positional);

                let Params::Positional(list) = params else {
                    return Err(Error::InvalidFormat(
                        "positional placeholders require a sequence of parameters".into(),
                    ));
                };

                let value = list.get(positional_used).ok_or_else(count_mismatch)?;
                out.extend_from_slice(&quote_value(value, ctx)?);

                positional_used += 1;
                idx += 2;
            }

            None => {
                return Err(Error::InvalidFormat(format!(
                    "unsupported format character at end of template (index {idx})"
                )));
            }
        }
    }

    if style == Some(Style::Positional) {
        let Params::Positional(list) = params else { unreachable!() };

        if positional_used != list.len() {
            return Err(count_mismatch());
        }
    }

    log::trace!("composed command of {} bytes from {}-byte template", out.len(), bytes.len());

    Ok(out)
}

fn check_format_char(c: Option<u8>, idx: usize) -> Result<()> {
    match c {
        Some(b's') => Ok(()),
        Some(c) => Err(Error::InvalidFormat(format!(
            "unsupported format character '{}' (0x{:x}) at index {}",
            c as char, c, idx
        ))),
        None => Err(Error::InvalidFormat(format!(
            "unsupported format character at end of template (index {idx})"
        ))),
    }
}

fn mixed_styles() -> Error {
    Error::InvalidFormat("argument formats can't be mixed".into())
}

fn count_mismatch() -> Error {
    Error::InvalidFormat("not all arguments converted during string formatting".into())
}
