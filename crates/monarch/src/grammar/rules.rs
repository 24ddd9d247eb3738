//! Core types for compiled rules and their actions.
//!
//! Descriptions spell actions in several shapes: a bare token string, an
//! object with a `token`, a `cases` object, or an array of any of these. All
//! of them are folded into the [`Action`] sum type once, at compile time, so
//! the tokenizer never has to probe shapes while scanning.

use crate::grammar::pattern::Pattern;
use crate::grammar::BracketKind;
use crate::guard::Cases;

/// A pattern plus the action taken when it matches.
#[derive(Debug)]
pub struct Rule {
    /// Human-readable name used in error messages (`state: pattern`).
    pub(crate) name: String,

    /// The compiled pattern, anchored at the scan position.
    pub(crate) pattern: Pattern,

    /// What happens when the pattern matches.
    pub(crate) action: Action,

    /// Whether the rule may only match at column zero.
    pub(crate) match_only_at_line_start: bool,
}

impl Rule {
    /// The rule's name, as used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rule's action.
    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// The pattern source after `@attribute` expansion, without anchoring.
    #[must_use]
    pub fn source(&self) -> &str {
        self.pattern.source()
    }

    /// Returns `true` if the rule only applies at the start of a line.
    #[must_use]
    pub fn matches_only_at_line_start(&self) -> bool {
        self.match_only_at_line_start
    }

    /// Returns `true` if this rule leaves an embedded language.
    #[must_use]
    pub fn leaves_embedded(&self) -> bool {
        matches!(
            &self.action,
            Action::Token(TokenAction {
                embedded: Some(EmbeddedTransition::Pop),
                ..
            })
        )
    }
}

/// The effect of a matched rule.
#[derive(Debug)]
pub enum Action {
    /// Emit one classification, possibly with state transitions attached.
    Token(TokenAction),

    /// Emit one classification per capture group, in order.
    Group(Vec<Action>),

    /// Pick an action by testing the match against guards.
    Cases(Cases),
}

/// A single-token action together with its transition directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenAction {
    /// The classification or template (`@brackets`, `@rematch`, `$1`, ...).
    pub token: String,

    /// Whether `token` contains `$` templates to substitute per match.
    pub substitute: bool,

    /// Explicit bracket side for the emitted token.
    pub bracket: Option<BracketKind>,

    /// Stack transition applied after the match.
    pub next: Option<NextState>,

    /// Replace the top of the stack instead of pushing.
    pub switch_to: Option<String>,

    /// Rewind the scan position by this many characters.
    pub go_back: Option<usize>,

    /// Enter or leave an embedded language.
    pub embedded: Option<EmbeddedTransition>,

    /// Message template written to the log when the action fires.
    pub log: Option<String>,
}

impl TokenAction {
    /// A bare token action with no directives and no substitution.
    #[must_use]
    pub fn plain(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }
}

/// A stack transition requested by an action's `next` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextState {
    /// `@push`: push the current state again.
    Push,

    /// `@pop`: drop the top state.
    Pop,

    /// `@popall`: drop everything down to the root state.
    PopAll,

    /// Push the named state; the name may contain `$` templates.
    Goto(String),
}

/// A change of embedded language requested by `nextEmbedded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedTransition {
    /// Start tokenizing the named language (templates allowed).
    Enter(String),

    /// `@pop`: return to the host language.
    Pop,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_json;

    #[test]
    fn test_plain_action_has_no_directives() {
        let action = TokenAction::plain("keyword");
        assert_eq!(action.token, "keyword");
        assert!(!action.substitute);
        assert_eq!(action.next, None);
        assert_eq!(action.embedded, None);
    }

    #[test]
    fn test_rule_accessors() {
        let grammar = compile_json(
            "toy",
            r#"{
                "tokenizer": {
                    "root": [
                        ["^#\\w+", "directive"],
                        ["</script>", { "token": "tag", "nextEmbedded": "@pop" }]
                    ]
                }
            }"#,
        )
        .unwrap();

        let rules = grammar.rules("root").unwrap();
        assert!(rules[0].matches_only_at_line_start());
        assert_eq!(rules[0].source(), "#\\w+");
        assert_eq!(rules[0].name(), "tokenizer.root: ^#\\w+");
        assert!(!rules[0].leaves_embedded());
        assert!(rules[1].leaves_embedded());
        assert!(matches!(rules[1].action(), Action::Token(_)));
    }
}
