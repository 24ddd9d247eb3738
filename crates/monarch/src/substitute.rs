//! `$`-template substitution and token-name helpers.
//!
//! Token names, next-state names, embedded language names, log messages and
//! some guards may contain templates that are filled in from the current
//! match:
//!
//! | template | replaced by |
//! |----------|-------------|
//! | `$$`     | a literal `$` |
//! | `$#`     | the matched text |
//! | `$n`     | capture group `n` (`$0` is the whole rule match) |
//! | `$sn`, `$Sn` | component `n` of the state name, `$S0` being the whole name |
//! | `$@name` | the string attribute `name` of the grammar |

use crate::grammar::Settings;

/// Everything a template or guard may consult about the current match.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// The text being classified. Inside a group action this is the group's text.
    pub matched: &'a str,

    /// The rule's captures, `captures[0]` being the whole rule match.
    pub captures: &'a [&'a str],

    /// The state on top of the stack when the rule matched.
    pub state: &'a str,

    /// Whether the match ends at the end of the line.
    pub end_of_line: bool,
}

/// Returns `true` for characters that may appear in an attribute name.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a state name into `[whole, first, second, ...]`.
///
/// Index zero is the full name so that `$S1` is the first dotted component.
#[must_use]
pub fn state_components(state: &str) -> Vec<&str> {
    std::iter::once(state).chain(state.split('.')).collect()
}

/// Replaces characters that cannot appear in a classification with `-`.
#[must_use]
pub fn sanitize(token: &str) -> String {
    token.replace(['&', '<', '>', '\'', '"', '_'], "-")
}

/// Fills the `$` templates of `template` from `ctx`.
///
/// Unknown or out-of-range references expand to nothing. Text taken from the
/// match is case-folded for case-insensitive grammars.
pub(crate) fn substitute_matches(
    settings: &Settings,
    template: &str,
    ctx: &MatchContext<'_>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut state_parts: Option<Vec<&str>> = None;
    let mut rest = template;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];
        let mut chars = after.chars();
        let first = chars.next();
        let second = chars.next();

        rest = match first {
            Some('$') => {
                out.push('$');
                &after[1..]
            }
            Some('#') => {
                out.push_str(&settings.fix_case(ctx.matched));
                &after[1..]
            }
            Some(c) if c.is_ascii_digit() => {
                let (index, len) = leading_index(after);
                if let Some(capture) = ctx.captures.get(index) {
                    out.push_str(&settings.fix_case(capture));
                }
                &after[len..]
            }
            Some('s' | 'S') if second.is_some_and(|c| c.is_ascii_digit()) => {
                let (index, len) = leading_index(&after[1..]);
                let parts = state_parts.get_or_insert_with(|| state_components(ctx.state));
                if let Some(part) = parts.get(index) {
                    out.push_str(&settings.fix_case(part));
                }
                &after[1 + len..]
            }
            Some('@') => {
                let name_len = after[1..]
                    .char_indices()
                    .find(|&(_, c)| !is_word_char(c))
                    .map_or(after.len() - 1, |(idx, _)| idx);
                if name_len == 0 {
                    out.push('$');
                    after
                } else {
                    if let Some(value) = settings.string_attribute(&after[1..=name_len]) {
                        out.push_str(value);
                    }
                    &after[1 + name_len..]
                }
            }
            _ => {
                out.push('$');
                after
            }
        };
    }
    out.push_str(rest);
    out
}

/// Parses one or two leading ASCII digits, returning the value and its length.
fn leading_index(text: &str) -> (usize, usize) {
    let len = text
        .bytes()
        .take(2)
        .take_while(u8::is_ascii_digit)
        .count();
    (text[..len].parse().unwrap_or(usize::MAX), len)
}
