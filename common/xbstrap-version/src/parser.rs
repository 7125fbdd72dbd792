use super::Component;

use nom::{
 branch::alt,
 bytes::complete::tag,
 character::complete::{char, digit1, one_of},
 combinator::{eof, map, opt},
 multi::many0,
 sequence::{preceded, terminated},
 IResult,
};

const MODIFIERS: &[(&str, i64)] = &[
 ("alpha", -3),
 ("beta", -2),
 ("pre", -1),
 ("rc", -1),
 ("pl", 0),
];

fn parse_num(input: &str) -> IResult<&str, Vec<Component>> {
 map(digit1, |s: &str| vec![Component::Num(s.to_owned())])(input)
}

fn parse_modifier(input: &str) -> IResult<&str, Vec<Component>> {
 for (word, weight) in MODIFIERS {
 if let Ok((rest, _)) = tag::<_, _, nom::error::Error<&str>>(*word)(input) {
 return Ok((rest, vec![Component::Weight(*weight)]));
 }
 }
 Err(nom::Err::Error(nom::error::Error::new(
 input,
 nom::error::ErrorKind::Tag,
 )))
}

/// A bare letter expands to the `(0, idx + 1)` pair from the ordering table:
/// a zero-weight separator component followed by the letter's own weight, so
/// that it lines up position-for-position against a numeric component one
/// level deeper (e.g. `1.0a` against `1.0.1`) instead of colliding with the
/// separator weight at its own position.
fn parse_letter(input: &str) -> IResult<&str, Vec<Component>> {
 map(one_of("abcdefghijklmnopqrstuvwxyz"), |c: char| {
 vec![Component::Weight(0), Component::Weight((c as i64) - ('a' as i64) + 1)]
 })(input)
}

fn parse_sep(input: &str) -> IResult<&str, Vec<Component>> {
 map(one_of("._"), |_| vec![Component::Weight(0)])(input)
}

fn parse_component(input: &str) -> IResult<&str, Vec<Component>> {
 alt((parse_num, parse_modifier, parse_letter, parse_sep))(input)
}

fn parse_revision(input: &str) -> IResult<&str, Option<String>> {
 opt(preceded(char('_'), terminated(digit1, eof)))(input)
 .map(|(rest, rev)| (rest, rev.map(|s: &str| s.to_owned())))
}

/// Splits off a trailing `_<digits>` revision before tokenizing the rest of
/// the string into [`Component`]s. The revision grammar is anchored to the
/// end of the string so that an ordinary `_pre`/`_alpha` modifier embedded
/// earlier in the version is never mistaken for a revision.
pub(super) fn parse_version(input: &str) -> Result<(Vec<Component>, Option<String>), String> {
 if input.is_empty() {
 return Err("empty version string".to_owned());
 }

 let (body, revision) = match input.rfind('_') {
 Some(idx) if digit1::<_, nom::error::Error<&str>>(&input[idx + 1..]).is_ok() => {
 match parse_revision(&input[idx..]) {
 Ok((_, rev)) => (&input[..idx], rev),
 Err(_) => (input, None),
 }
 }
 _ => (input, None),
 };

 let (rest, chunks) = many0(parse_component)(body).map_err(|e| e.to_string())?;
 let (rest, _) = eof(rest).map_err(|e: nom::Err<nom::error::Error<&str>>| e.to_string())?;
 let _ = rest;
 let components: Vec<Component> = chunks.into_iter().flatten().collect();
 if components.is_empty() {
 return Err(format!("no version components in {input:?}"));
 }
 Ok((components, revision))
}
