//! The line tokenizer.
//!
//! [`Tokenizer::tokenize`] consumes one line given the [`LexicalState`] the
//! previous line ended in, and returns the line's tokens together with the
//! state the next line starts in. At every position the rules of the state on
//! top of the stack are tried in order; the first one that matches decides
//! the token and any stack or embedding transition. When nothing matches, one
//! character is classified with the grammar's default token.
//!
//! While an embedded language is active, the line is first searched for the
//! earliest point where one of the current state's `nextEmbedded: "@pop"`
//! rules matches. Everything before that point is handed to the embedded
//! language's tokenizer, found through a [`GrammarResolver`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::info;

use crate::compile::compile_json;
use crate::error::{CompileError, TokenizeError, TokenizeErrorKind};
use crate::grammar::{Action, EmbeddedTransition, Grammar, NextState, TokenAction};
use crate::registry::GrammarResolver;
use crate::state::{EmbeddedContext, LexicalState, StateCache, StateStack};
use crate::substitute::{sanitize, substitute_matches, MatchContext};

mod collector;

pub use collector::{
    ClassicTokensCollector, EncodedToken, MetadataTokensCollector, Token, TokenEncoder,
    TokensCollector,
};

/// Rule name reported for errors raised by the default-token fallback.
const FALLBACK_RULE: &str = "(default)";

/// Runtime limits of a [`Tokenizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenizerOptions {
    /// A push onto a stack this deep fails with a stack overflow.
    pub max_stack_depth: usize,

    /// Lines longer than this many bytes are not tokenized.
    pub max_line_length: usize,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            max_stack_depth: 100,
            max_line_length: 20_000,
        }
    }
}

/// The tokens of one line and the state the next line starts in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeResult<T = Token> {
    /// Tokens in line order, adjacent equal tokens merged.
    pub tokens: Vec<T>,

    /// The lexical state at the end of the line.
    pub end_state: LexicalState,
}

/// Drives one compiled [`Grammar`] over lines of text.
pub struct Tokenizer {
    grammar: Grammar,
    options: TokenizerOptions,
    cache: Mutex<StateCache>,
    resolver: Option<Weak<dyn GrammarResolver>>,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("language_id", &self.language_id())
            .field("options", &self.options)
            .field("has_resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

/// A rule match, or a group member being replayed.
struct Match<'g, 't> {
    rule: &'g str,
    captures: Vec<&'t str>,
    matched: &'t str,
    action: &'g Action,
}

/// Group members still to be emitted for the last group match.
struct GroupReplay<'g, 't> {
    rule: &'g str,
    captures: Vec<&'t str>,
    members: VecDeque<(&'g Action, &'t str)>,
}

/// An action with its `cases` resolved.
enum Resolved<'g> {
    Token(&'g TokenAction),
    Group(&'g [Action]),
}

impl Tokenizer {
    /// Wraps a compiled grammar with default options and no resolver.
    #[must_use]
    pub fn new(grammar: Grammar) -> Self {
        Self {
            grammar,
            options: TokenizerOptions::default(),
            cache: Mutex::new(StateCache::new()),
            resolver: None,
        }
    }

    /// Compiles a JSON grammar description and wraps the result.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] if the description does not compile.
    pub fn from_json(language_id: &str, json: &str) -> Result<Self, CompileError> {
        compile_json(language_id, json).map(Self::new)
    }

    /// Replaces the runtime limits.
    #[must_use]
    pub fn with_options(mut self, options: TokenizerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets where embedded languages are looked up.
    ///
    /// The resolver is held weakly so that a registry may own its tokenizers.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Weak<dyn GrammarResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The compiled grammar.
    #[must_use]
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// The language this tokenizer classifies.
    #[must_use]
    pub fn language_id(&self) -> &str {
        self.grammar.language_id()
    }

    /// The runtime limits in effect.
    #[must_use]
    pub fn options(&self) -> TokenizerOptions {
        self.options
    }

    /// The state the first line of a document starts in.
    #[must_use]
    pub fn initial_state(&self) -> LexicalState {
        let mut cache = self.cache.lock();
        let root = cache.root(self.grammar.start_state());
        cache.line_state(root, None)
    }

    /// Tokenizes one line.
    ///
    /// `has_eol` tells whether the line was terminated by a newline; grammars
    /// with `includeLF` then see a trailing `\n`.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenizeError`] when the grammar breaks a tokenizer
    /// invariant on this line.
    pub fn tokenize(
        &self,
        line: &str,
        has_eol: bool,
        state: &LexicalState,
    ) -> Result<TokenizeResult, TokenizeError> {
        let mut collector = ClassicTokensCollector::new();
        let end_state = self.tokenize_into(line, has_eol, state, 0, &mut collector)?;
        Ok(TokenizeResult {
            tokens: collector.into_tokens(),
            end_state,
        })
    }

    /// Tokenizes one line into packed tokens produced by `encoder`.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenizeError`] when the grammar breaks a tokenizer
    /// invariant on this line.
    pub fn tokenize_encoded(
        &self,
        line: &str,
        has_eol: bool,
        state: &LexicalState,
        encoder: &dyn TokenEncoder,
    ) -> Result<TokenizeResult<EncodedToken>, TokenizeError> {
        let mut collector = MetadataTokensCollector::new(encoder);
        let end_state = self.tokenize_into(line, has_eol, state, 0, &mut collector)?;
        Ok(TokenizeResult {
            tokens: collector.into_tokens(),
            end_state,
        })
    }

    /// Tokenizes one line into `collector`, shifting every offset by `offset_delta`.
    ///
    /// Lines longer than [`TokenizerOptions::max_line_length`] produce a
    /// single unclassified token and leave the state unchanged.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenizeError`] when the grammar breaks a tokenizer
    /// invariant on this line.
    pub fn tokenize_into(
        &self,
        line: &str,
        has_eol: bool,
        state: &LexicalState,
        offset_delta: usize,
        collector: &mut dyn TokensCollector,
    ) -> Result<LexicalState, TokenizeError> {
        if line.len() > self.options.max_line_length {
            collector.enter_language(self.language_id());
            collector.emit(offset_delta, "", None);
            return Ok(state.clone());
        }
        self.tokenize_line(line, has_eol, state, offset_delta, collector)
    }

    fn fail(&self, kind: TokenizeErrorKind) -> TokenizeError {
        TokenizeError::new(self.language_id(), kind)
    }

    fn resolver(&self) -> Option<Arc<dyn GrammarResolver>> {
        self.resolver.as_ref().and_then(Weak::upgrade)
    }

    fn tokenize_line(
        &self,
        line: &str,
        has_eol: bool,
        state: &LexicalState,
        offset_delta: usize,
        collector: &mut dyn TokensCollector,
    ) -> Result<LexicalState, TokenizeError> {
        let Some(context) = state.embedded() else {
            return self.tokenize_host(line, has_eol, state, offset_delta, collector);
        };

        match self.find_leaving_offset(line, state.stack())? {
            None => {
                let end = self.tokenize_embedded(line, has_eol, context, offset_delta, collector)?;
                let context = EmbeddedContext {
                    language_id: context.language_id.clone(),
                    state: end,
                };
                Ok(self.cache.lock().line_state(state.stack().clone(), Some(context)))
            }
            Some(offset) => {
                if offset > 0 {
                    self.tokenize_embedded(&line[..offset], false, context, offset_delta, collector)?;
                }
                self.tokenize_host(
                    &line[offset..],
                    has_eol,
                    state,
                    offset_delta + offset,
                    collector,
                )
            }
        }
    }

    /// Finds the earliest offset where a rule leaving the embedded language matches.
    fn find_leaving_offset(
        &self,
        line: &str,
        stack: &StateStack,
    ) -> Result<Option<usize>, TokenizeError> {
        let state = stack.state();
        let rules = self
            .grammar
            .find_rules(state)
            .ok_or_else(|| self.fail(TokenizeErrorKind::UndefinedState(state.to_string())))?;

        let mut has_pop_rule = false;
        let mut earliest: Option<usize> = None;
        for rule in rules.iter().filter(|rule| rule.leaves_embedded()) {
            has_pop_rule = true;
            let regex = rule
                .pattern
                .search(&self.grammar.settings, state)
                .map_err(|err| {
                    self.fail(TokenizeErrorKind::InvalidRegex {
                        pattern: rule.source().to_string(),
                        message: err.to_string(),
                    })
                })?;
            let Some(found) = regex.find(line) else {
                continue;
            };
            if found.start() != 0 && rule.matches_only_at_line_start() {
                continue;
            }
            earliest = Some(earliest.map_or(found.start(), |best| best.min(found.start())));
        }

        if !has_pop_rule {
            return Err(self.fail(TokenizeErrorKind::NoEmbeddedPopRule {
                state: state.to_string(),
            }));
        }
        Ok(earliest)
    }

    /// Hands `line` to the embedded language, returning its end state.
    fn tokenize_embedded(
        &self,
        line: &str,
        has_eol: bool,
        context: &EmbeddedContext,
        offset_delta: usize,
        collector: &mut dyn TokensCollector,
    ) -> Result<Option<LexicalState>, TokenizeError> {
        if let Some(state) = &context.state {
            if let Some(tokenizer) = self
                .resolver()
                .and_then(|resolver| resolver.tokenizer(&context.language_id))
            {
                return tokenizer
                    .tokenize_into(line, has_eol, state, offset_delta, collector)
                    .map(Some);
            }
        }
        collector.enter_language(&context.language_id);
        collector.emit(offset_delta, "", None);
        Ok(context.state.clone())
    }

    /// Switches to the embedded language `name` at `pos` and tokenizes the rest of the line.
    #[allow(clippy::too_many_arguments)]
    fn enter_embedded(
        &self,
        name: &str,
        line: &str,
        has_eol: bool,
        pos: usize,
        stack: StateStack,
        offset_delta: usize,
        collector: &mut dyn TokensCollector,
    ) -> Result<LexicalState, TokenizeError> {
        let resolver = self.resolver();
        let language_id = resolver
            .as_ref()
            .and_then(|resolver| resolver.resolve_language_id(name))
            .unwrap_or_else(|| SmolStr::new(name));
        let state = resolver
            .as_ref()
            .and_then(|resolver| resolver.tokenizer(&language_id))
            .map(|tokenizer| tokenizer.initial_state());

        let line_state = self.cache.lock().line_state(
            stack,
            Some(EmbeddedContext { language_id, state }),
        );
        if pos < line.len() {
            self.tokenize_line(&line[pos..], has_eol, &line_state, offset_delta + pos, collector)
        } else {
            Ok(line_state)
        }
    }

    /// Tries the rules of `state` at `pos`, falling back to the default token.
    fn match_rules<'t>(
        &self,
        text: &'t str,
        pos: usize,
        state: &str,
    ) -> Result<Match<'_, 't>, TokenizeError> {
        let rules = self
            .grammar
            .find_rules(state)
            .ok_or_else(|| self.fail(TokenizeErrorKind::UndefinedState(state.to_string())))?;
        let rest = &text[pos..];

        for rule in rules {
            if pos != 0 && rule.matches_only_at_line_start() {
                continue;
            }
            let regex = rule
                .pattern
                .anchored(&self.grammar.settings, state)
                .map_err(|err| {
                    self.fail(TokenizeErrorKind::InvalidRegex {
                        pattern: rule.source().to_string(),
                        message: err.to_string(),
                    })
                })?;
            if let Some(found) = regex.captures(rest) {
                let captures: Vec<&'t str> = found
                    .iter()
                    .map(|group| group.map_or("", |group| group.as_str()))
                    .collect();
                return Ok(Match {
                    rule: rule.name(),
                    matched: captures[0],
                    captures,
                    action: rule.action(),
                });
            }
        }

        let matched = rest.chars().next().map_or("", |c| &rest[..c.len_utf8()]);
        Ok(Match {
            rule: FALLBACK_RULE,
            captures: vec![matched],
            matched,
            action: &self.grammar.default_action,
        })
    }

    fn resolve<'g>(
        &'g self,
        mut action: &'g Action,
        ctx: &MatchContext<'_>,
    ) -> Result<Resolved<'g>, TokenizeError> {
        loop {
            match action {
                Action::Token(token) => return Ok(Resolved::Token(token)),
                Action::Group(members) => return Ok(Resolved::Group(members)),
                Action::Cases(cases) => {
                    action = cases
                        .select(&self.grammar.settings, ctx)
                        .map_err(|kind| self.fail(kind))?;
                }
            }
        }
    }

    /// Substitutes a `next`/`switchTo` target and checks that it exists.
    fn target_state(
        &self,
        template: &str,
        ctx: &MatchContext<'_>,
        undefined: impl FnOnce(String) -> TokenizeErrorKind,
    ) -> Result<String, TokenizeError> {
        let target = substitute_matches(&self.grammar.settings, template, ctx);
        let target = target.strip_prefix('@').unwrap_or(&target);
        if self.grammar.state_exists(target) {
            Ok(target.to_string())
        } else {
            Err(self.fail(undefined(target.to_string())))
        }
    }

    fn check_depth(&self, stack: &StateStack) -> Result<(), TokenizeError> {
        if stack.depth() < self.options.max_stack_depth {
            return Ok(());
        }
        let states: Vec<&str> = stack.states().take(2).collect();
        Err(self.fail(TokenizeErrorKind::StackOverflow {
            states: states.join(","),
        }))
    }

    #[allow(clippy::too_many_lines)]
    fn tokenize_host(
        &self,
        line: &str,
        has_eol: bool,
        state: &LexicalState,
        offset_delta: usize,
        collector: &mut dyn TokensCollector,
    ) -> Result<LexicalState, TokenizeError> {
        collector.enter_language(self.language_id());

        let grammar = &self.grammar;
        let settings = &grammar.settings;
        let with_line_feed;
        let text = if has_eol && grammar.include_line_feed {
            with_line_feed = format!("{line}\n");
            with_line_feed.as_str()
        } else {
            line
        };
        let text_len = text.len();

        let mut stack = state.stack().clone();
        let mut embedded = state.embedded().cloned();
        let mut pos = 0;
        let mut replay: Option<GroupReplay<'_, '_>> = None;
        let mut empty_group: Option<(usize, StateStack)> = None;
        let mut force_evaluation = true;

        while force_evaluation || pos < text_len {
            let pos0 = pos;
            let depth0 = stack.depth();
            let pending0 = replay.as_ref().map_or(0, |group| group.members.len());
            let top = stack.clone();
            let current = top.state();

            let replaying = replay.is_some();
            let step = match replay.as_mut() {
                Some(group) => {
                    let Some((action, matched)) = group.members.pop_front() else {
                        replay = None;
                        continue;
                    };
                    let step = Match {
                        rule: group.rule,
                        captures: group.captures.clone(),
                        matched,
                        action,
                    };
                    if group.members.is_empty() {
                        replay = None;
                    }
                    step
                }
                None => {
                    force_evaluation = false;
                    self.match_rules(text, pos, current)?
                }
            };
            let Match {
                rule,
                captures,
                matched,
                action,
            } = step;

            pos += matched.len();
            let ctx = MatchContext {
                matched,
                captures: &captures,
                state: current,
                end_of_line: pos == text_len,
            };

            let action = match self.resolve(action, &ctx)? {
                Resolved::Token(action) => action,
                Resolved::Group(members) => {
                    if replaying {
                        return Err(self.fail(TokenizeErrorKind::NestedGroups {
                            rule: rule.to_string(),
                        }));
                    }
                    if captures.len() != members.len() + 1 {
                        return Err(self.fail(TokenizeErrorKind::GroupCountMismatch {
                            rule: rule.to_string(),
                        }));
                    }
                    if captures[1..].iter().map(|group| group.len()).sum::<usize>() != matched.len()
                    {
                        return Err(self.fail(TokenizeErrorKind::GroupGap {
                            rule: rule.to_string(),
                        }));
                    }
                    if matched.is_empty() {
                        if matches!(&empty_group, Some((at, seen)) if *at == pos0 && *seen == stack)
                        {
                            return Err(self.fail(TokenizeErrorKind::NoProgress {
                                rule: rule.to_string(),
                            }));
                        }
                        empty_group = Some((pos0, stack.clone()));
                    }
                    replay = Some(GroupReplay {
                        rule,
                        members: members.iter().zip(captures[1..].iter().copied()).collect(),
                        captures,
                    });
                    pos = pos0;
                    continue;
                }
            };

            let token = if action.substitute {
                substitute_matches(settings, &action.token, &ctx)
            } else {
                action.token.clone()
            };

            let mut entering = None;
            match &action.embedded {
                Some(EmbeddedTransition::Pop) => {
                    if embedded.take().is_none() {
                        return Err(self.fail(TokenizeErrorKind::NotInEmbedded));
                    }
                }
                Some(EmbeddedTransition::Enter(name)) => {
                    if embedded.is_some() {
                        return Err(self.fail(TokenizeErrorKind::NestedEmbedded));
                    }
                    entering = Some(substitute_matches(settings, name, &ctx));
                }
                None => {}
            }

            if let Some(count) = action.go_back {
                pos = rewind(text, pos, count);
            }

            if let Some(target) = &action.switch_to {
                let target = self.target_state(target, &ctx, |state| {
                    TokenizeErrorKind::UndefinedSwitchState {
                        state,
                        rule: rule.to_string(),
                    }
                })?;
                stack = self.cache.lock().switch_to(&stack, &target);
            } else if let Some(next) = &action.next {
                stack = match next {
                    NextState::Push => {
                        self.check_depth(&stack)?;
                        self.cache.lock().push(&stack, stack.state())
                    }
                    NextState::Pop => stack.pop().ok_or_else(|| {
                        self.fail(TokenizeErrorKind::StackUnderflow {
                            rule: rule.to_string(),
                        })
                    })?,
                    NextState::PopAll => stack.pop_to_root(),
                    NextState::Goto(target) => {
                        let target = self.target_state(target, &ctx, |state| {
                            TokenizeErrorKind::UndefinedNextState {
                                state,
                                rule: rule.to_string(),
                            }
                        })?;
                        self.check_depth(&stack)?;
                        self.cache.lock().push(&stack, &target)
                    }
                };
            }

            if let Some(log) = &action.log {
                let message = substitute_matches(settings, log, &ctx);
                info!(language = self.language_id(), "{message}");
            }

            let matched = if token == "@rematch" {
                pos = pos.saturating_sub(matched.len());
                ""
            } else {
                matched
            };

            if matched.is_empty() {
                let pending = replay.as_ref().map_or(0, |group| group.members.len());
                let progressed = text_len == 0
                    || depth0 != stack.depth()
                    || current != stack.state()
                    || pending != pending0;
                if entering.is_none() {
                    if progressed {
                        continue;
                    }
                    return Err(self.fail(TokenizeErrorKind::NoProgress {
                        rule: rule.to_string(),
                    }));
                }
            } else {
                let (classification, bracket) = if let Some(suffix) = token.strip_prefix("@brackets") {
                    let (bracket_token, kind) = grammar.find_bracket(matched).ok_or_else(|| {
                        self.fail(TokenizeErrorKind::MissingBracket {
                            text: matched.to_string(),
                        })
                    })?;
                    (sanitize(&format!("{bracket_token}{suffix}")), Some(kind))
                } else if token.is_empty() {
                    (String::new(), action.bracket)
                } else {
                    (
                        sanitize(&format!("{token}{}", grammar.token_postfix)),
                        action.bracket,
                    )
                };
                if pos0 < line.len() {
                    collector.emit(pos0 + offset_delta, &classification, bracket);
                }
            }

            if let Some(name) = entering {
                return self.enter_embedded(&name, line, has_eol, pos, stack, offset_delta, collector);
            }
        }

        Ok(self.cache.lock().line_state(stack, embedded))
    }
}

/// Moves `pos` back by `count` characters, stopping at the start of `text`.
fn rewind(text: &str, pos: usize, count: usize) -> usize {
    if count == 0 {
        return pos;
    }
    text[..pos]
        .char_indices()
        .rev()
        .nth(count - 1)
        .map_or(0, |(idx, _)| idx)
}
