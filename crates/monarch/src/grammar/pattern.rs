//! Rule patterns: attribute expansion, anchoring and per-state compilation.
//!
//! Rules only ever match at the current scan position, so every pattern is
//! compiled as `^(?:body)` and run against the rest of the line. Patterns that
//! mention `$Sn` depend on the state name and are compiled lazily per state.

use std::borrow::Cow;

use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use smol_str::SmolStr;

use crate::error::CompileErrorKind;
use crate::grammar::Settings;
use crate::substitute::{is_word_char, state_components};

/// Chained `@name` references are expanded at most this many times.
const MAX_EXPANSION_ROUNDS: usize = 5;

/// Stand-in for an escaped `@@` while references are expanded.
const ESCAPED_AT: char = '\u{1}';

/// A rule pattern in executable form.
#[derive(Debug)]
pub(crate) struct Pattern {
    /// The body after attribute expansion, neither anchored nor state-substituted.
    source: String,
    compiled: Compiled,
}

#[derive(Debug)]
enum Compiled {
    Fixed {
        anchored: Regex,
        search: Option<Regex>,
    },
    PerState(Mutex<Option<(SmolStr, Regex)>>),
}

impl Pattern {
    /// Compiles a rule body (already stripped of a leading `^`).
    ///
    /// `needs_search` also prepares an unanchored variant, used to find where
    /// an embedded language ends on a line.
    pub(crate) fn compile(
        settings: &Settings,
        body: &str,
        needs_search: bool,
    ) -> Result<Self, CompileErrorKind> {
        let source = expand_attributes(settings, body)?;
        let compiled = if has_state_reference(&source) {
            Compiled::PerState(Mutex::new(None))
        } else {
            let anchored = build_regex(settings, &anchor(&source)).map_err(|source_err| {
                CompileErrorKind::InvalidRegex {
                    pattern: anchor(&source),
                    source: source_err,
                }
            })?;
            let search = if needs_search {
                Some(build_regex(settings, &source).map_err(|source_err| {
                    CompileErrorKind::InvalidRegex {
                        pattern: source.clone(),
                        source: source_err,
                    }
                })?)
            } else {
                None
            };
            Compiled::Fixed { anchored, search }
        };
        Ok(Self { source, compiled })
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    /// The pattern anchored at the scan position, as seen from `state`.
    pub(crate) fn anchored(
        &self,
        settings: &Settings,
        state: &str,
    ) -> Result<Cow<'_, Regex>, regex::Error> {
        match &self.compiled {
            Compiled::Fixed { anchored, .. } => Ok(Cow::Borrowed(anchored)),
            Compiled::PerState(memo) => {
                let mut memo = memo.lock();
                if let Some((last_state, regex)) = memo.as_ref() {
                    if last_state == state {
                        return Ok(Cow::Owned(regex.clone()));
                    }
                }
                let body = substitute_state(settings, &self.source, state);
                let regex = build_regex(settings, &anchor(&body))?;
                *memo = Some((SmolStr::new(state), regex.clone()));
                Ok(Cow::Owned(regex))
            }
        }
    }

    /// The unanchored pattern, for searching anywhere in a line.
    pub(crate) fn search(
        &self,
        settings: &Settings,
        state: &str,
    ) -> Result<Cow<'_, Regex>, regex::Error> {
        match &self.compiled {
            Compiled::Fixed {
                search: Some(search),
                ..
            } => Ok(Cow::Borrowed(search)),
            Compiled::Fixed { search: None, .. } => {
                build_regex(settings, &self.source).map(Cow::Owned)
            }
            Compiled::PerState(_) => {
                let body = substitute_state(settings, &self.source, state);
                build_regex(settings, &body).map(Cow::Owned)
            }
        }
    }
}

fn anchor(body: &str) -> String {
    format!("^(?:{body})")
}

/// Builds a regex with the grammar's case sensitivity.
pub(crate) fn build_regex(settings: &Settings, pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(settings.ignore_case)
        .build()
}

/// Splices string attributes into `pattern` wherever `@name` appears.
///
/// Each reference becomes a non-capturing group. Expansion repeats so that
/// attributes may refer to other attributes, up to a small fixed depth. `@@`
/// stands for a literal `@`.
pub(crate) fn expand_attributes(
    settings: &Settings,
    pattern: &str,
) -> Result<String, CompileErrorKind> {
    let mut current = pattern.replace("@@", &ESCAPED_AT.to_string());
    for _ in 0..MAX_EXPANSION_ROUNDS {
        let Some(expanded) = expand_once(settings, &current)? else {
            break;
        };
        current = expanded;
    }
    Ok(current.replace(ESCAPED_AT, "@"))
}

/// Runs one expansion round; `None` when there was nothing to expand.
fn expand_once(settings: &Settings, pattern: &str) -> Result<Option<String>, CompileErrorKind> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    let mut expanded = false;

    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        let name_len = after
            .char_indices()
            .find(|&(_, c)| !is_word_char(c))
            .map_or(after.len(), |(idx, _)| idx);
        if name_len == 0 {
            out.push('@');
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        let value = match settings.attributes.get(name) {
            None => {
                return Err(CompileErrorKind::UndefinedAttribute {
                    attribute: name.to_string(),
                    pattern: pattern.to_string(),
                })
            }
            Some(value) => value.as_str().ok_or_else(|| CompileErrorKind::AttributeNotString {
                attribute: name.to_string(),
                pattern: pattern.to_string(),
            })?,
        };
        if !value.is_empty() {
            out.push_str("(?:");
            out.push_str(&value.replace("@@", &ESCAPED_AT.to_string()));
            out.push(')');
        }
        expanded = true;
        rest = &after[name_len..];
    }
    out.push_str(rest);
    Ok(expanded.then_some(out))
}

/// Returns `true` if `source` contains a `$sN`/`$SN` reference.
pub(crate) fn has_state_reference(source: &str) -> bool {
    source.match_indices('$').any(|(idx, _)| {
        let mut chars = source[idx + 1..].chars();
        matches!(chars.next(), Some('s' | 'S')) && chars.next().is_some_and(|c| c.is_ascii_digit())
    })
}

/// Replaces `$sN`/`$SN` with the regex-escaped Nth component of `state`.
fn substitute_state(settings: &Settings, source: &str, state: &str) -> String {
    let parts = state_components(state);
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];
        let digits = after
            .strip_prefix(['s', 'S'])
            .map(|tail| tail.chars().take(2).take_while(char::is_ascii_digit).count())
            .unwrap_or(0);
        if digits == 0 {
            out.push('$');
            rest = after;
            continue;
        }
        let index: usize = after[1..=digits].parse().unwrap_or(usize::MAX);
        if let Some(part) = parts.get(index) {
            out.push_str(&regex::escape(&settings.fix_case(part)));
        }
        rest = &after[1 + digits..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(attributes: serde_json::Value) -> Settings {
        Settings {
            language_id: "toy".into(),
            ignore_case: false,
            unicode: false,
            attributes: attributes.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_expand_chained_attributes() {
        let settings = settings(json!({
            "digit": "[0-9]",
            "digits": "@digit+",
        }));
        let expanded = expand_attributes(&settings, "@digits\\.@digits").unwrap();
        assert_eq!(expanded, "(?:(?:[0-9])+)\\.(?:(?:[0-9])+)");
    }

    #[test]
    fn test_escaped_at_survives_expansion() {
        let settings = settings(json!({ "name": "\\w+" }));
        assert_eq!(
            expand_attributes(&settings, "@@@name").unwrap(),
            "@(?:\\w+)"
        );
    }

    #[test]
    fn test_undefined_and_ill_typed_attributes() {
        let settings = settings(json!({ "keywords": ["if"] }));
        assert!(matches!(
            expand_attributes(&settings, "@missing"),
            Err(CompileErrorKind::UndefinedAttribute { attribute, .. }) if attribute == "missing"
        ));
        assert!(matches!(
            expand_attributes(&settings, "@keywords"),
            Err(CompileErrorKind::AttributeNotString { attribute, .. }) if attribute == "keywords"
        ));
    }

    #[test]
    fn test_fixed_pattern_is_anchored() {
        let settings = settings(json!({}));
        let pattern = Pattern::compile(&settings, "b+", true).unwrap();
        let anchored = pattern.anchored(&settings, "root").unwrap();
        assert!(anchored.is_match("bbc"));
        assert!(!anchored.is_match("abb"));
        let search = pattern.search(&settings, "root").unwrap();
        assert_eq!(search.find("abb").map(|m| m.start()), Some(1));
    }

    #[test]
    fn test_state_reference_compiles_per_state() {
        let settings = settings(json!({}));
        let pattern = Pattern::compile(&settings, "$S2", false).unwrap();
        assert!(has_state_reference(pattern.source()));

        let quoted_a = pattern.anchored(&settings, "quoted.a").unwrap().into_owned();
        assert!(quoted_a.is_match("a"));
        assert!(!quoted_a.is_match("b"));

        let quoted_dot = pattern.anchored(&settings, "quoted.+").unwrap().into_owned();
        assert!(quoted_dot.is_match("+"));
        assert!(!quoted_dot.is_match("a"));
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let settings = settings(json!({}));
        assert!(matches!(
            Pattern::compile(&settings, "(unclosed", false),
            Err(CompileErrorKind::InvalidRegex { .. })
        ));
    }
}
