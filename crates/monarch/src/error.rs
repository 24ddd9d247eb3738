//! Error types for grammar compilation and line tokenization.
//!
//! Both error types carry the id of the language they were raised for and
//! render as `"<language>: <message>"`, so a host juggling many grammars can
//! tell at a glance which one is broken.

use thiserror::Error;

/// A structural problem found while compiling a grammar description.
#[derive(Debug, Error)]
#[error("{language_id}: {kind}")]
pub struct CompileError {
    /// The language the description was compiled for.
    pub language_id: String,

    /// What was wrong with the description.
    pub kind: CompileErrorKind,
}

impl CompileError {
    /// Creates a new [`CompileError`] for `language_id`.
    pub fn new(language_id: impl Into<String>, kind: CompileErrorKind) -> Self {
        Self {
            language_id: language_id.into(),
            kind,
        }
    }
}

/// The individual ways a grammar description can fail to compile.
#[derive(Debug, Error)]
pub enum CompileErrorKind {
    /// The description text was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The description was not a JSON object.
    #[error("expecting a language definition object")]
    NotAnObject,

    /// The `tokenizer` attribute is missing or not an object.
    #[error("a language definition must define the 'tokenizer' attribute as an object")]
    MissingTokenizer,

    /// The `tokenizer` object declares no states.
    #[error("the 'tokenizer' attribute must declare at least one state")]
    EmptyTokenizer,

    /// The `start` attribute names a state that does not exist.
    #[error("the start state '{0}' is not defined")]
    UndefinedStart(String),

    /// A state's rules are not given as an array.
    #[error("the rules of a state must be an array, at: {state}")]
    RulesNotArray {
        /// The offending state.
        state: String,
    },

    /// An `include` attribute is not a string.
    #[error("an 'include' attribute must be a string at: {state}")]
    IncludeNotString {
        /// The state containing the include.
        state: String,
    },

    /// An `include` names a state that does not exist.
    #[error("include target '{target}' is not defined at: {state}")]
    UndefinedInclude {
        /// The missing state.
        target: String,
        /// The state containing the include.
        state: String,
    },

    /// A chain of includes leads back to a state already being expanded.
    #[error("include target '{target}' includes itself at: {state}")]
    IncludeCycle {
        /// The state that was reached twice.
        target: String,
        /// The include path at the point of the cycle.
        state: String,
    },

    /// A rule is neither an array nor an object with `regex` or `include`.
    #[error("a rule must either be an array, or an object with a 'regex' or 'include' field at: {state}")]
    InvalidRule {
        /// The state containing the rule.
        state: String,
    },

    /// A rule's pattern is not a string.
    #[error("rules must start with a match string: {state}")]
    PatternNotString {
        /// The state containing the rule.
        state: String,
    },

    /// The positional `[regex, action, next]` form was used with an action
    /// that cannot carry a next state.
    #[error("a next state as the last element of a rule can only be given if the action is either an object or a string, at: {state}")]
    PositionalNextState {
        /// The state containing the rule.
        state: String,
    },

    /// A pattern references an `@attribute` that the description lacks.
    #[error("language definition does not contain attribute '{attribute}', used at: {pattern}")]
    UndefinedAttribute {
        /// The missing attribute.
        attribute: String,
        /// The pattern being expanded.
        pattern: String,
    },

    /// A pattern references an `@attribute` that is not a string.
    #[error("attribute reference '{attribute}' must be a string, used at: {pattern}")]
    AttributeNotString {
        /// The ill-typed attribute.
        attribute: String,
        /// The pattern being expanded.
        pattern: String,
    },

    /// A pattern failed to compile as a regular expression.
    #[error("invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        /// The fully expanded pattern.
        pattern: String,
        /// The regex engine's complaint.
        source: regex::Error,
    },

    /// An action has none of the recognised shapes.
    #[error("an action must be a string, an object with a 'token' or 'cases' attribute, or an array of actions; in rule: {rule}")]
    InvalidAction {
        /// The rule owning the action.
        rule: String,
    },

    /// A `token` attribute is not a string.
    #[error("a 'token' attribute must be of type string, in rule: {rule}")]
    TokenNotString {
        /// The rule owning the action.
        rule: String,
    },

    /// A `bracket` attribute is neither `@open` nor `@close`.
    #[error("a 'bracket' attribute must be either '@open' or '@close', in rule: {rule}")]
    InvalidBracketAttribute {
        /// The rule owning the action.
        rule: String,
    },

    /// A `next` attribute is not a string.
    #[error("the next state must be a string value in rule: {rule}")]
    NextNotString {
        /// The rule owning the action.
        rule: String,
    },

    /// A `next` or `switchTo` target does not name a declared state.
    #[error("the next state '{state}' is not defined in rule: {rule}")]
    UndefinedState {
        /// The target as written in the description.
        state: String,
        /// The rule owning the action.
        rule: String,
    },

    /// A `cases` attribute is not an object.
    #[error("a 'cases' attribute must be an object, in rule: {rule}")]
    CasesNotObject {
        /// The rule owning the action.
        rule: String,
    },

    /// An `@name` guard refers to an attribute that does not exist.
    #[error("the @ match target '{target}' is not defined, in rule: {rule}")]
    UndefinedGuardTarget {
        /// The missing attribute.
        target: String,
        /// The rule owning the guard.
        rule: String,
    },

    /// An `@name` guard refers to an attribute that is not a word list.
    #[error("the @ match target '{target}' must be an array of strings, in rule: {rule}")]
    GuardTargetNotWords {
        /// The ill-typed attribute.
        target: String,
        /// The rule owning the guard.
        rule: String,
    },

    /// The `brackets` attribute is not an array.
    #[error("the 'brackets' attribute must be defined as an array")]
    BracketsNotArray,

    /// A bracket pair uses the same text to open and close.
    #[error("open and close brackets in a 'brackets' attribute must be different: {open}")]
    IdenticalBrackets {
        /// The shared text.
        open: String,
    },

    /// A bracket entry is not an `{open, close, token}` object or triple.
    #[error("every element in the 'brackets' array must be a '{{open,close,token}}' object or array")]
    InvalidBracket,
}

/// A grammar invariant violated while tokenizing a line.
///
/// These point at a buggy grammar rather than bad input. Hosts usually log
/// them and stop highlighting the offending language.
#[derive(Debug, Error)]
#[error("{language_id}: {kind}")]
pub struct TokenizeError {
    /// The language whose grammar misbehaved.
    pub language_id: String,

    /// What went wrong.
    pub kind: TokenizeErrorKind,
}

impl TokenizeError {
    /// Creates a new [`TokenizeError`] for `language_id`.
    pub fn new(language_id: impl Into<String>, kind: TokenizeErrorKind) -> Self {
        Self {
            language_id: language_id.into(),
            kind,
        }
    }
}

/// The individual ways tokenizing a line can fail.
#[derive(Debug, Error)]
pub enum TokenizeErrorKind {
    /// The state on top of the stack has no rules, even after prefix fallback.
    #[error("tokenizer state is not defined: {0}")]
    UndefinedState(String),

    /// A dynamically computed `next` state does not exist.
    #[error("trying to set a next state '{state}' that is undefined in rule: {rule}")]
    UndefinedNextState {
        /// The computed state name.
        state: String,
        /// The rule that requested it.
        rule: String,
    },

    /// A dynamically computed `switchTo` state does not exist.
    #[error("trying to switch to a state '{state}' that is undefined in rule: {rule}")]
    UndefinedSwitchState {
        /// The computed state name.
        state: String,
        /// The rule that requested it.
        rule: String,
    },

    /// A push would exceed the configured maximum stack depth.
    #[error("maximum tokenizer stack size reached: [{states},...]")]
    StackOverflow {
        /// The topmost states, comma separated.
        states: String,
    },

    /// A pop was requested with only the root state left.
    #[error("trying to pop an empty stack in rule: {rule}")]
    StackUnderflow {
        /// The rule that requested the pop.
        rule: String,
    },

    /// A rule matched nothing and changed nothing.
    #[error("no progress in tokenizer in rule: {rule}")]
    NoProgress {
        /// The rule that matched the empty string.
        rule: String,
    },

    /// `@brackets` was requested for text that is not in the bracket table.
    #[error("@brackets token returned but no bracket defined as: {text}")]
    MissingBracket {
        /// The matched text.
        text: String,
    },

    /// A group action was produced while another one was still being replayed.
    #[error("groups cannot be nested: {rule}")]
    NestedGroups {
        /// The rule owning the inner group.
        rule: String,
    },

    /// The number of capture groups differs from the number of group actions.
    #[error("matched number of groups does not match the number of actions in rule: {rule}")]
    GroupCountMismatch {
        /// The rule owning the group.
        rule: String,
    },

    /// The capture groups do not cover the whole match.
    #[error("with groups, all characters should be matched in consecutive groups in rule: {rule}")]
    GroupGap {
        /// The rule owning the group.
        rule: String,
    },

    /// An embedded language is active but the current state has no way out.
    #[error("no rule containing nextEmbedded: \"@pop\" in tokenizer embedded state: {state}")]
    NoEmbeddedPopRule {
        /// The current state.
        state: String,
    },

    /// `nextEmbedded: "@pop"` fired outside an embedded language.
    #[error("cannot pop embedded language if not inside one")]
    NotInEmbedded,

    /// An embedded language was entered from within another one.
    #[error("cannot enter embedded language from within an embedded language")]
    NestedEmbedded,

    /// A pattern built from match data failed to compile.
    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidRegex {
        /// The pattern after substitution.
        pattern: String,
        /// Why it was rejected.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_language() {
        let err = CompileError::new(
            "toy",
            CompileErrorKind::UndefinedState {
                state: "noSuchState".into(),
                rule: "tokenizer.main: x".into(),
            },
        );
        assert_eq!(
            err.to_string(),
            "toy: the next state 'noSuchState' is not defined in rule: tokenizer.main: x"
        );

        let err = TokenizeError::new("toy", TokenizeErrorKind::NotInEmbedded);
        assert_eq!(
            err.to_string(),
            "toy: cannot pop embedded language if not inside one"
        );
    }

    #[test]
    fn test_bracket_message_escapes_braces() {
        let err = CompileErrorKind::InvalidBracket;
        assert!(err.to_string().contains("'{open,close,token}'"));
    }
}
