//! The compiled, immutable grammar model.
//!
//! A [`Grammar`] is what [`compile`](crate::compile::compile) produces from a
//! JSON description: an ordered map from state name to an ordered list of
//! [`Rule`]s, a bracket table and the global flags that steer tokenization.
//! Rule order inside a state is dispatch priority; the first rule whose
//! pattern matches at the scan position wins.

use std::borrow::Cow;

use facet::Facet;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use smol_str::SmolStr;

pub(crate) mod pattern;
pub mod rules;

pub use rules::{Action, EmbeddedTransition, NextState, Rule, TokenAction};

/// Which side of a bracket pair a token stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum BracketKind {
    /// An opening bracket such as `{`.
    Open,

    /// A closing bracket such as `}`.
    Close,
}

/// One entry of a grammar's bracket table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bracket {
    /// Classification emitted for either side, token postfix included.
    pub token: String,

    /// Text of the opening bracket, case-folded for case-insensitive grammars.
    pub open: String,

    /// Text of the closing bracket, case-folded for case-insensitive grammars.
    pub close: String,
}

/// Grammar-wide values consulted both while compiling and while tokenizing.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) language_id: String,
    pub(crate) ignore_case: bool,
    pub(crate) unicode: bool,
    /// Every top-level attribute of the description, used for `@name` lookups.
    pub(crate) attributes: Map<String, Value>,
}

impl Settings {
    /// Lower-cases `text` when the grammar is case-insensitive.
    pub(crate) fn fix_case<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.ignore_case {
            Cow::Owned(text.to_lowercase())
        } else {
            Cow::Borrowed(text)
        }
    }

    /// Returns the named attribute if it is a string.
    pub(crate) fn string_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

/// A compiled grammar, ready to drive a [`Tokenizer`](crate::Tokenizer).
#[derive(Debug)]
pub struct Grammar {
    pub(crate) settings: Settings,
    pub(crate) start: SmolStr,
    pub(crate) include_line_feed: bool,
    pub(crate) default_token: String,
    pub(crate) token_postfix: String,
    pub(crate) uses_embedded: bool,
    pub(crate) brackets: Vec<Bracket>,
    pub(crate) states: IndexMap<SmolStr, Vec<Rule>>,
    /// The action taken when no rule matches: emit the default token.
    pub(crate) default_action: Action,
}

impl Grammar {
    /// The language this grammar was compiled for.
    #[must_use]
    pub fn language_id(&self) -> &str {
        &self.settings.language_id
    }

    /// The state every line of a fresh document starts in.
    #[must_use]
    pub fn start_state(&self) -> &str {
        &self.start
    }

    /// Whether patterns and word lists match case-insensitively.
    #[must_use]
    pub fn ignore_case(&self) -> bool {
        self.settings.ignore_case
    }

    /// Whether the description asked for Unicode-aware patterns.
    ///
    /// Patterns are always compiled Unicode-aware; the flag is kept so hosts
    /// can inspect the description's intent.
    #[must_use]
    pub fn unicode(&self) -> bool {
        self.settings.unicode
    }

    /// Whether a `\n` is appended to lines that had one before tokenizing.
    #[must_use]
    pub fn includes_line_feed(&self) -> bool {
        self.include_line_feed
    }

    /// The classification used when no rule matches.
    #[must_use]
    pub fn default_token(&self) -> &str {
        &self.default_token
    }

    /// The suffix appended to every non-empty classification.
    #[must_use]
    pub fn token_postfix(&self) -> &str {
        &self.token_postfix
    }

    /// Whether any action enters an embedded language.
    #[must_use]
    pub fn uses_embedded(&self) -> bool {
        self.uses_embedded
    }

    /// The bracket table, in declaration order.
    #[must_use]
    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    /// The names of all declared states, in declaration order.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(SmolStr::as_str)
    }

    /// Returns a top-level attribute of the original description.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.settings.attributes.get(name)
    }

    /// Returns the rules declared for exactly `state`.
    #[must_use]
    pub fn rules(&self, state: &str) -> Option<&[Rule]> {
        self.states.get(state).map(Vec::as_slice)
    }

    /// Returns the rules for `state`, falling back to its dotted parents.
    ///
    /// A state named `string.double` that is not declared itself uses the
    /// rules of `string`, which lets one rule set serve a family of states
    /// that differ only in the data carried by their name.
    #[must_use]
    pub fn find_rules(&self, state: &str) -> Option<&[Rule]> {
        let mut current = state;
        loop {
            if current.is_empty() {
                return None;
            }
            if let Some(rules) = self.rules(current) {
                return Some(rules);
            }
            current = current.rfind('.').map_or("", |idx| &current[..idx]);
        }
    }

    /// Whether `state` resolves to a declared state, directly or by prefix.
    #[must_use]
    pub fn state_exists(&self, state: &str) -> bool {
        self.find_rules(state).is_some()
    }

    /// Looks `text` up in the bracket table.
    #[must_use]
    pub fn find_bracket(&self, text: &str) -> Option<(&str, BracketKind)> {
        if text.is_empty() {
            return None;
        }
        let text = self.settings.fix_case(text);
        self.brackets.iter().find_map(|bracket| {
            if bracket.open == text {
                Some((bracket.token.as_str(), BracketKind::Open))
            } else if bracket.close == text {
                Some((bracket.token.as_str(), BracketKind::Close))
            } else {
                None
            }
        })
    }
}
