//! N3 terms as they appear in attribute maps.
//!
//! Objects are carried as N3 text: `<http://…>` URIs, `prefix:local` names,
//! quoted literals (optionally `@lang` or `^^datatype`) and bare numbers or
//! booleans. [`canonical`] rewrites any of these into the single form that is
//! hashed, stored and compared, so that `cfsn:air_temperature` and
//! `<http://def.cfconventions.org/standard_name/air_temperature>` are the same
//! object.

use crate::error::CoreError;
use crate::namespace::Namespaces;

/// Wraps a full URI in angle brackets.
pub fn uri(value: &str) -> String {
    format!("<{}>", value)
}

/// Quotes and escapes a plain literal.
pub fn literal(value: &str) -> String {
    format!("\"{}\"", escape(value))
}

/// Quotes a literal with an explicit datatype URI.
pub fn typed_literal(value: &str, datatype: &str) -> String {
    format!("\"{}\"^^<{}>", escape(value), datatype)
}

/// Returns the URI inside `<…>`, or `None` for any other term.
pub fn as_uri(term: &str) -> Option<&str> {
    term.strip_prefix('<').and_then(|t| t.strip_suffix('>'))
}

/// Returns the unescaped lexical form of a quoted literal.
pub fn literal_lexical(term: &str) -> Option<String> {
    let (lexical, _) = split_literal(term)?;
    Some(unescape(lexical))
}

/// Rewrites `term` into canonical N3.
///
/// Prefixed names and prefixed datatypes are expanded through `ns`;
/// everything else is validated and returned unchanged.
pub fn canonical(term: &str, ns: &Namespaces) -> Result<String, CoreError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(malformed(term, "empty term"));
    }
    if term.starts_with('<') {
        return match as_uri(term) {
            Some(inner) if !inner.contains(['<', '>', ' ']) => Ok(term.to_string()),
            _ => Err(malformed(term, "unterminated or invalid URI")),
        };
    }
    if term.starts_with('"') {
        let (lexical, suffix) =
            split_literal(term).ok_or_else(|| malformed(term, "unterminated literal"))?;
        return if suffix.is_empty() || suffix.starts_with('@') {
            Ok(term.to_string())
        } else if let Some(datatype) = suffix.strip_prefix("^^") {
            let datatype = if datatype.starts_with('<') {
                canonical(datatype, ns)?
            } else {
                uri(&ns.expand(datatype)?)
            };
            Ok(format!("\"{}\"^^{}", lexical, datatype))
        } else {
            Err(malformed(term, "unexpected text after literal"))
        };
    }
    if term == "true" || term == "false" || is_number(term) {
        return Ok(term.to_string());
    }
    if term.contains(':') {
        return Ok(uri(&ns.expand(term)?));
    }
    Err(malformed(term, "expected a URI, prefixed name or literal"))
}

/// Splits a quoted literal into its raw (still escaped) lexical part and the
/// trailing suffix (`""`, `@lang` or `^^datatype`).
fn split_literal(term: &str) -> Option<(&str, &str)> {
    let body = term.strip_prefix('"')?;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some((&body[..i], &body[i + 1..])),
            _ => escaped = false,
        }
    }
    None
}

fn is_number(term: &str) -> bool {
    term.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+')
        && term.parse::<f64>().is_ok()
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn malformed(term: &str, reason: &str) -> CoreError {
    CoreError::MalformedTerm {
        term: term.to_string(),
        reason: reason.to_string(),
    }
}
