//! Conditional dispatch (`cases`) compiled into guard tests.
//!
//! A `cases` action maps guard keys to actions. Each key is parsed exactly
//! once, at grammar compile time, into a [`Guard`]; at run time the guards
//! are tested in declaration order and the first one that holds picks the
//! action. When none holds, the grammar's default token is used.
//!
//! Supported keys:
//!
//! - `@default`, `@` or the empty string: always holds;
//! - `@eos`: holds when the match reaches the end of the line;
//! - `word` or `a|b|c`: equality with a word, or membership in a word set;
//! - `@name` / `!@name`: membership in the word-list attribute `name`;
//! - `~regex` / `!~regex`: the scrutinee matches `regex` entirely;
//! - `==text` / `!=text`: exact comparison.
//!
//! Any key may start with `$n`, `$Sn` or `$#` to test a capture group, a
//! state-name component or the matched text instead of the matched text.

use regex::Regex;
use rustc_hash::FxHashSet;

use crate::error::{CompileErrorKind, TokenizeErrorKind};
use crate::grammar::pattern::{build_regex, expand_attributes};
use crate::grammar::{Action, Settings};
use crate::substitute::{state_components, substitute_matches, MatchContext};

/// A compiled `cases` action.
#[derive(Debug)]
pub struct Cases {
    branches: Vec<Branch>,
    default: Box<Action>,
}

#[derive(Debug)]
struct Branch {
    /// The key as written, kept for diagnostics.
    name: String,
    guard: Guard,
    action: Action,
}

/// A compiled case key.
#[derive(Debug)]
pub(crate) enum Guard {
    Always,
    EndOfLine,
    Test { scrutinee: Scrutinee, test: Test },
}

/// Which piece of the match a guard looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scrutinee {
    Matched,
    Capture(usize),
    StateComponent(usize),
}

#[derive(Debug)]
pub(crate) enum Test {
    Words { words: FxHashSet<String>, negate: bool },
    Regex { regex: Regex, negate: bool },
    DynamicRegex { template: String, negate: bool },
    Equals { text: String, negate: bool },
    DynamicEquals { template: String, negate: bool },
}

impl Cases {
    pub(crate) fn new(default_token: &str) -> Self {
        Self {
            branches: Vec::new(),
            default: Box::new(Action::Token(crate::grammar::TokenAction::plain(default_token))),
        }
    }

    /// Compiles `key` and appends it with its action.
    pub(crate) fn push(
        &mut self,
        settings: &Settings,
        rule: &str,
        key: &str,
        action: Action,
    ) -> Result<(), CompileErrorKind> {
        let guard = Guard::compile(settings, rule, key)?;
        self.branches.push(Branch {
            name: key.to_string(),
            guard,
            action,
        });
        Ok(())
    }

    /// The keys of all branches, in test order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(|branch| branch.name.as_str())
    }

    /// Picks the action of the first branch whose guard holds.
    pub(crate) fn select(
        &self,
        settings: &Settings,
        ctx: &MatchContext<'_>,
    ) -> Result<&Action, TokenizeErrorKind> {
        for branch in &self.branches {
            if branch.guard.holds(settings, ctx)? {
                return Ok(&branch.action);
            }
        }
        Ok(&self.default)
    }
}

impl Guard {
    pub(crate) fn compile(
        settings: &Settings,
        rule: &str,
        key: &str,
    ) -> Result<Self, CompileErrorKind> {
        match key {
            "@default" | "@" | "" => return Ok(Self::Always),
            "@eos" => return Ok(Self::EndOfLine),
            _ => {}
        }

        let (scrutinee, operation) = split_scrutinee(key);
        let (op, pattern) = split_operator(operation);
        let negate = op.starts_with('!');

        let test = match op {
            "~" | "!~" if pattern.chars().all(is_word_or_bar) => Test::Words {
                words: pattern
                    .split('|')
                    .map(|word| settings.fix_case(word).into_owned())
                    .collect(),
                negate,
            },
            "@" | "!@" => {
                let words = settings.attributes.get(pattern).ok_or_else(|| {
                    CompileErrorKind::UndefinedGuardTarget {
                        target: pattern.to_string(),
                        rule: rule.to_string(),
                    }
                })?;
                let words = words
                    .as_array()
                    .and_then(|items| {
                        items
                            .iter()
                            .map(|item| item.as_str().map(|word| settings.fix_case(word).into_owned()))
                            .collect::<Option<FxHashSet<_>>>()
                    })
                    .ok_or_else(|| CompileErrorKind::GuardTargetNotWords {
                        target: pattern.to_string(),
                        rule: rule.to_string(),
                    })?;
                Test::Words { words, negate }
            }
            "~" | "!~" if pattern.contains('$') => Test::DynamicRegex {
                template: pattern.to_string(),
                negate,
            },
            "~" | "!~" => {
                let full = whole_match_pattern(&expand_attributes(settings, pattern)?);
                let regex = build_regex(settings, &full).map_err(|source| {
                    CompileErrorKind::InvalidRegex {
                        pattern: full.clone(),
                        source,
                    }
                })?;
                Test::Regex { regex, negate }
            }
            _ if pattern.contains('$') => Test::DynamicEquals {
                template: settings.fix_case(pattern).into_owned(),
                negate,
            },
            _ => Test::Equals {
                text: settings.fix_case(pattern).into_owned(),
                negate,
            },
        };
        Ok(Self::Test { scrutinee, test })
    }

    pub(crate) fn holds(
        &self,
        settings: &Settings,
        ctx: &MatchContext<'_>,
    ) -> Result<bool, TokenizeErrorKind> {
        match self {
            Self::Always => Ok(true),
            Self::EndOfLine => Ok(ctx.end_of_line),
            Self::Test { scrutinee, test } => {
                let subject = scrutinee.select(ctx).unwrap_or("");
                test.holds(settings, subject, ctx)
            }
        }
    }
}

impl Scrutinee {
    fn select<'a>(self, ctx: &MatchContext<'a>) -> Option<&'a str> {
        match self {
            Self::Matched => Some(ctx.matched),
            Self::Capture(index) => ctx.captures.get(index).copied(),
            Self::StateComponent(index) => state_components(ctx.state).get(index).copied(),
        }
    }
}

impl Test {
    fn holds(
        &self,
        settings: &Settings,
        subject: &str,
        ctx: &MatchContext<'_>,
    ) -> Result<bool, TokenizeErrorKind> {
        let (found, negate) = match self {
            Self::Words { words, negate } => (words.contains(&*settings.fix_case(subject)), *negate),
            Self::Regex { regex, negate } => (regex.is_match(subject), *negate),
            Self::DynamicRegex { template, negate } => {
                let body = substitute_matches(settings, template, ctx);
                let full = expand_attributes(settings, &body)
                    .map(|expanded| whole_match_pattern(&expanded))
                    .map_err(|err| TokenizeErrorKind::InvalidRegex {
                        pattern: body.clone(),
                        message: err.to_string(),
                    })?;
                let regex = build_regex(settings, &full).map_err(|err| {
                    TokenizeErrorKind::InvalidRegex {
                        pattern: full.clone(),
                        message: err.to_string(),
                    }
                })?;
                (regex.is_match(subject), *negate)
            }
            Self::Equals { text, negate } => (*settings.fix_case(subject) == **text, *negate),
            Self::DynamicEquals { template, negate } => {
                let text = substitute_matches(settings, template, ctx);
                (*settings.fix_case(subject) == *text, *negate)
            }
        };
        Ok(found != negate)
    }
}

fn is_word_or_bar(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '|'
}

fn whole_match_pattern(body: &str) -> String {
    format!("^(?:{body})$")
}

/// Splits an optional `$n`, `$Sn` or `$#` prefix off a case key.
fn split_scrutinee(key: &str) -> (Scrutinee, &str) {
    let Some(after) = key.strip_prefix('$') else {
        return (Scrutinee::Matched, key);
    };
    if let Some(rest) = after.strip_prefix('#') {
        return (Scrutinee::Matched, rest);
    }

    let (is_state, digits_from) = match after.as_bytes().first() {
        Some(b's' | b'S') => (true, 1),
        _ => (false, 0),
    };
    let digits = after[digits_from..]
        .bytes()
        .take(2)
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return (Scrutinee::Matched, key);
    }

    let end = digits_from + digits;
    let index = after[digits_from..end].parse().unwrap_or(usize::MAX);
    let scrutinee = if is_state {
        Scrutinee::StateComponent(index)
    } else {
        Scrutinee::Capture(index)
    };
    (scrutinee, &after[end..])
}

/// Splits the operator off the remainder of a case key.
///
/// An empty remainder means "not empty" and a bare word means equality; the
/// default operator is a regex match.
fn split_operator(operation: &str) -> (&'static str, &str) {
    if operation.is_empty() {
        return ("!=", "");
    }
    if operation.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return ("==", operation);
    }
    for op in ["!@", "!~", "==", "!=", "@", "~"] {
        if let Some(pattern) = operation.strip_prefix(op) {
            return (op, pattern);
        }
    }
    ("~", operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn settings(ignore_case: bool) -> Settings {
        Settings {
            language_id: "toy".into(),
            ignore_case,
            unicode: false,
            attributes: json!({
                "keywords": ["if", "else"],
                "digit": "[0-9]",
                "mixed": ["ok", 1],
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        }
    }

    fn holds(key: &str, matched: &str, captures: &[&str], state: &str, eol: bool) -> bool {
        let settings = settings(false);
        let guard = Guard::compile(&settings, "rule", key).unwrap();
        let ctx = MatchContext {
            matched,
            captures,
            state,
            end_of_line: eol,
        };
        guard.holds(&settings, &ctx).unwrap()
    }

    #[rstest]
    #[case("@default", "x", true)]
    #[case("", "x", true)]
    #[case("@keywords", "if", true)]
    #[case("@keywords", "iff", false)]
    #[case("!@keywords", "iff", true)]
    #[case("if|while", "while", true)]
    #[case("if|while", "for", false)]
    #[case("print", "print", true)]
    #[case("print", "printer", false)]
    #[case("~[a-z]+", "abc", true)]
    #[case("~[a-z]+", "abc1", false)]
    #[case("!~[a-z]+", "abc1", true)]
    #[case("~@digit+", "123", true)]
    #[case("==a.b", "a.b", true)]
    #[case("!=a.b", "a.b", false)]
    #[case("$#==x", "x", true)]
    fn test_guard_on_matched_text(#[case] key: &str, #[case] matched: &str, #[case] expected: bool) {
        assert_eq!(holds(key, matched, &[matched], "root", false), expected);
    }

    #[test]
    fn test_guard_scrutinee_prefixes() {
        let captures = ["foo(", "foo"];
        assert!(holds("$1==foo", "foo(", &captures, "root", false));
        assert!(!holds("$1==bar", "foo(", &captures, "root", false));
        // An absent capture tests as the empty string.
        assert!(holds("$5==", "foo(", &captures, "root", false));
        assert!(!holds("$5", "foo(", &captures, "root", false));
        assert!(holds("$1", "foo(", &captures, "root", false));

        assert!(holds("$S2==double", "x", &["x"], "string.double", false));
        assert!(holds("$S0==string.double", "x", &["x"], "string.double", false));
    }

    #[test]
    fn test_guard_end_of_line() {
        assert!(holds("@eos", "x", &["x"], "root", true));
        assert!(!holds("@eos", "x", &["x"], "root", false));
    }

    #[test]
    fn test_dynamic_guards_substitute_per_match() {
        // The closing delimiter must equal the opening one recorded in the state.
        let captures = ["'"];
        assert!(holds("$#==$S2", "'", &captures, "string.'", false));
        assert!(!holds("$#==$S2", "'", &captures, "string.\"", false));
        assert!(holds("~$S2+", "''", &["''"], "string.'", false));
        assert!(holds("!~$S2+", "ab", &["ab"], "string.'", false));
    }

    #[test]
    fn test_case_insensitive_words() {
        let settings = settings(true);
        let guard = Guard::compile(&settings, "rule", "@keywords").unwrap();
        let ctx = MatchContext {
            matched: "IF",
            captures: &["IF"],
            state: "root",
            end_of_line: false,
        };
        assert!(guard.holds(&settings, &ctx).unwrap());
    }

    #[test]
    fn test_guard_compile_errors() {
        let settings = settings(false);
        assert!(matches!(
            Guard::compile(&settings, "rule", "@missing"),
            Err(CompileErrorKind::UndefinedGuardTarget { target, .. }) if target == "missing"
        ));
        assert!(matches!(
            Guard::compile(&settings, "rule", "@mixed"),
            Err(CompileErrorKind::GuardTargetNotWords { target, .. }) if target == "mixed"
        ));
        assert!(matches!(
            Guard::compile(&settings, "rule", "~(unclosed"),
            Err(CompileErrorKind::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_cases_fall_back_to_default_token() {
        let settings = settings(false);
        let mut cases = Cases::new("source");
        cases
            .push(
                &settings,
                "rule",
                "@keywords",
                Action::Token(crate::grammar::TokenAction::plain("keyword")),
            )
            .unwrap();
        assert_eq!(cases.keys().collect::<Vec<_>>(), ["@keywords"]);

        let ctx = MatchContext {
            matched: "x",
            captures: &["x"],
            state: "root",
            end_of_line: false,
        };
        match cases.select(&settings, &ctx).unwrap() {
            Action::Token(action) => assert_eq!(action.token, "source"),
            other => panic!("unexpected action {other:?}"),
        }
    }
}
