//! Signature masking: reduce a message to a stable template for clustering.
//!
//! Variable substrings (numbers, hex/UUID tokens, quoted strings, IP-shaped
//! tokens) are replaced with fixed placeholders so two events differing only
//! in literals share a signature. Masking is idempotent: no placeholder
//! contains a digit, a quote, or a hex run long enough to re-match.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::types::Signature;

static RE_UUID: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
  )
  .unwrap()
});

static RE_IP: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap());

static RE_HEX_PREFIXED: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\b0[xX][0-9a-fA-F]+\b").unwrap());

// Bare hex runs need at least one digit so plain words never match.
static RE_HEX_BARE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\b[0-9a-fA-F]{8,}\b").unwrap());

static RE_NUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

static RE_DQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""[^"]*""#).unwrap());

static RE_SQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"'[^']*'").unwrap());

/// Compute the masked template of a message.
///
/// A message with no variable tokens resolves to itself, so the literal text
/// is the signature.
pub fn mask(message: &str) -> Signature {
  let s = message.trim();
  let s = RE_UUID.replace_all(s, "<UUID>");
  let s = RE_IP.replace_all(&s, "<IP>");
  let s = RE_HEX_PREFIXED.replace_all(&s, "<HEX>");
  let s = RE_HEX_BARE.replace_all(&s, |caps: &Captures| {
    let token = &caps[0];
    if token.bytes().any(|b| b.is_ascii_digit()) {
      "<HEX>".to_string()
    } else {
      token.to_string()
    }
  });
  let s = RE_NUM.replace_all(&s, "<NUM>");
  let s = RE_DQUOTE.replace_all(&s, "<STR>");
  let s = RE_SQUOTE.replace_all(&s, "<STR>");
  Signature(s.into_owned())
}
