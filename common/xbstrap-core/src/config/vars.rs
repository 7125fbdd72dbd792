//! `@VAR@` / `@KIND:NAME@` substitution.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;

static VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9_:]+)@").unwrap());

/// Replaces every `@NAME@` or `@KIND:NAME@` occurrence in `text` using
/// `resolve`. Identity on strings with no `@...@` sequence; raises
/// [`ConfigError::UnknownVariable`] when `resolve` returns `None`.
pub fn replace_at_vars(
 text: &str,
 mut resolve: impl FnMut(&str) -> Option<String>,
) -> Result<String, ConfigError> {
 let mut out = String::with_capacity(text.len());
 let mut last = 0;
 for caps in VAR_RE.captures_iter(text) {
 let whole = caps.get(0).unwrap();
 out.push_str(&text[last..whole.start()]);
 let var = &caps[1];
 match resolve(var) {
 Some(value) => out.push_str(&value),
 None => return Err(ConfigError::UnknownVariable(var.to_owned())),
 }
 last = whole.end();
 }
 out.push_str(&text[last..]);
 Ok(out)
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn identity_without_variables() {
 let out = replace_at_vars("plain text", |_| None).unwrap();
 assert_eq!(out, "plain text");
 }

 #[test]
 fn substitutes_known_variables() {
 let out = replace_at_vars("@PREFIX@/bin:@OPTION:foo@", |name| match name {
 "PREFIX" => Some("/usr".to_owned()),
 "OPTION:foo" => Some("bar".to_owned()),
 _ => None,
 })
 .unwrap();
 assert_eq!(out, "/usr/bin:bar");
 }

 #[test]
 fn unknown_variable_raises() {
 let err = replace_at_vars("@NOPE@", |_| None).unwrap_err();
 assert!(matches!(err, ConfigError::UnknownVariable(v) if v == "NOPE"));
 }
}
