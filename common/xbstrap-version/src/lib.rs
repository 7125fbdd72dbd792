//! Version parsing and ordering for xbps-style package versions.
//!
//! A version string is a dot/underscore/hyphen separated sequence of numeric
//! and textual components, optionally followed by a `_<revision>` suffix.
//! Textual components are either one of the recognized modifier words
//! (`alpha`, `beta`, `pre`, `rc`, `pl`) or a single bare letter; each maps to
//! an integer weight so that pre-release modifiers sort before the
//! unmodified version and patch levels sort at the same level as a plain
//! continuation, per the ordering table below.
//!
//! ```text
//! alpha -> -3 beta -> -2 pre/rc -> -1 pl -> 0 '.'/'_'/'-' -> 0
//! single letter 'a'..'z' -> (0, 1..26) -- two components, not one
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;

mod parser;

/// One decomposed piece of a version string.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Component {
 /// A run of ASCII digits, compared as an arbitrary-precision number.
 Num(String),
 /// A modifier word, separator, or (half of) a bare letter, compared as
 /// a signed weight. A letter expands to two of these, `Weight(0)`
 /// followed by `Weight(idx + 1)`, per the `(0, idx + 1)` pair in the
 /// ordering table.
 Weight(i64),
}

impl Component {
 fn cmp_cross(num: &str, weight: i64) -> Ordering {
 let normalized = num.trim_start_matches('0');
 if weight == 0 && (normalized.is_empty() || normalized == "0") {
 return Ordering::Equal;
 }
 if weight <= 0 {
 return Ordering::Greater;
 }
 // No modifier word in the table carries a positive weight, but stay
 // total: fall back to comparing the weight against the numeric value.
 let n: i128 = normalized.parse::<i128>().unwrap_or(i128::MAX);
 n.cmp(&(weight as i128))
 }
}

impl Ord for Component {
 fn cmp(&self, other: &Self) -> Ordering {
 match (self, other) {
 (Component::Num(a), Component::Num(b)) => compare_generic_number_strings(a, b),
 (Component::Weight(a), Component::Weight(b)) => a.cmp(b),
 (Component::Num(a), Component::Weight(b)) => Component::cmp_cross(a, *b),
 (Component::Weight(a), Component::Num(b)) => Component::cmp_cross(b, *a).reverse(),
 }
 }
}

impl PartialOrd for Component {
 fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
 Some(self.cmp(other))
 }
}

/// A parsed xbps-style package version, e.g. `1.2.3_beta4_1`.
#[derive(Clone, Debug, Eq)]
pub struct Version {
 text: String,
 components: Vec<Component>,
 revision: Option<String>,
}

impl Version {
 /// Parses `text` into a [`Version`].
 pub fn parse(text: &str) -> Result<Self> {
 let (components, revision) = parser::parse_version(text)
 .map_err(|e| anyhow::anyhow!("invalid version {text:?}: {e}"))?;
 Ok(Self {
 text: text.to_owned(),
 components,
 revision,
 })
 }

 /// Returns the revision suffix, if any (the digits after the trailing
 /// `_<n>`).
 pub fn revision(&self) -> Option<&str> {
 self.revision.as_deref()
 }

 /// Returns the original text this version was parsed from.
 pub fn as_str(&self) -> &str {
 &self.text
 }
}

impl FromStr for Version {
 type Err = anyhow::Error;

 fn from_str(s: &str) -> Result<Self> {
 Version::parse(s)
 }
}

impl fmt::Display for Version {
 fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 write!(f, "{}", self.text)
 }
}

impl PartialEq for Version {
 fn eq(&self, other: &Self) -> bool {
 self.cmp(other) == Ordering::Equal
 }
}

impl PartialOrd for Version {
 fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
 Some(self.cmp(other))
 }
}

impl Ord for Version {
 fn cmp(&self, other: &Self) -> Ordering {
 let n = self.components.len().max(other.components.len());
 for i in 0..n {
 let a = self.components.get(i).cloned().unwrap_or(Component::Weight(0));
 let b = other.components.get(i).cloned().unwrap_or(Component::Weight(0));
 let c = a.cmp(&b);
 if c != Ordering::Equal {
 return c;
 }
 }
 let rev_a = self.revision.as_deref().unwrap_or("0");
 let rev_b = other.revision.as_deref().unwrap_or("0");
 compare_generic_number_strings(rev_a, rev_b)
 }
}

/// Compares two digit strings of arbitrary length as numbers.
fn compare_generic_number_strings(a: &str, b: &str) -> Ordering {
 let a = a.trim_start_matches('0');
 let b = b.trim_start_matches('0');
 if a.len() != b.len() {
 return a.len().cmp(&b.len());
 }
 a.cmp(b)
}

/// Parses `pkgver` strings of the form `<name>-<version>_<revision>` used in
/// repodata, returning the bare package name and its [`Version`].
pub fn split_pkgver(pkgver: &str) -> Result<(&str, Version)> {
 let idx = pkgver
 .rfind('-')
 .ok_or_else(|| anyhow::anyhow!("pkgver {pkgver:?} has no version separator"))?;
 let (name, rest) = pkgver.split_at(idx);
 let version = Version::parse(&rest[1..])?;
 Ok((name, version))
}

/// Returns `true` if `remote` should be considered an update over `local`.
pub fn is_update(local: &Version, remote: &Version) -> bool {
 remote > local
}

/// Compares two raw version strings, for callers that only need the result.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
 if a == b {
 // Fast accept of byte-identical strings without parsing; still valid
 // since `Version::parse(x).cmp(Version::parse(x))` is always `Equal`.
 return Ok(Ordering::Equal);
 }
 Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

#[cfg(test)]
mod tests {
 use super::*;
 use proptest::prelude::*;

 #[test]
 fn parses_plain_versions() {
 for case in ["0", "1", "1.2.3", "1.2.3.4.5", "10000000000000000000"] {
 let v = Version::parse(case).unwrap();
 assert_eq!(v.as_str(), case);
 }
 }

 #[test]
 fn parses_modifiers_and_revision() {
 let v = Version::parse("1.2.3_beta4_7").unwrap();
 assert_eq!(v.revision, Some("7"));
 }

 #[test]
 fn orders_modifiers_before_release() {
 let alpha = Version::parse("1.0_alpha1").unwrap();
 let beta = Version::parse("1.0_beta1").unwrap();
 let pre = Version::parse("1.0_pre1").unwrap();
 let release = Version::parse("1.0").unwrap();
 assert!(alpha < beta);
 assert!(beta < pre);
 assert!(pre < release);
 }

 #[test]
 fn orders_numeric_components() {
 assert!(Version::parse("1.2").unwrap() < Version::parse("1.10").unwrap());
 assert!(Version::parse("1.9").unwrap() < Version::parse("1.10").unwrap());
 assert!(Version::parse("2").unwrap() > Version::parse("1.999").unwrap());
 }

 #[test]
 fn orders_revision() {
 assert!(Version::parse("1.0_1").unwrap() < Version::parse("1.0_2").unwrap());
 assert_eq!(
 Version::parse("1.0").unwrap().cmp(&Version::parse("1.0_0").unwrap()),
 Ordering::Equal
 );
 }

 #[test]
 fn splits_pkgver() {
 let (name, version) = split_pkgver("libfoo-1.2.3_1").unwrap();
 assert_eq!(name, "libfoo");
 assert_eq!(version.revision, Some("1"));
 }

 proptest! {
 #[test]
 fn proptest_parse_no_crash(s in "\\PC*") {
 let _ = Version::parse(&s);
 }

 #[test]
 fn proptest_reflexive_compare(
 major in 0u32..1000,
 minor in 0u32..1000,
 patch in 0u32..1000,
 rev in 0u32..1000,
 ) {
 let text = format!("{major}.{minor}.{patch}_{rev}");
 let v = Version::parse(&text).unwrap();
 prop_assert_eq!(v.cmp(&v), Ordering::Equal);
 }
 }
}
