//! Compilation of JSON grammar descriptions into [`Grammar`]s.
//!
//! The description is walked once. Includes are flattened, patterns are
//! expanded and compiled, every action shape is folded into an [`Action`] and
//! static next-state targets are checked against the declared states.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::error::{CompileError, CompileErrorKind};
use crate::grammar::pattern::Pattern;
use crate::grammar::{
    Action, Bracket, BracketKind, EmbeddedTransition, Grammar, NextState, Rule, Settings,
    TokenAction,
};
use crate::guard::Cases;

/// Bracket pairs used when a description declares none.
const DEFAULT_BRACKETS: [(&str, &str, &str); 4] = [
    ("{", "}", "delimiter.curly"),
    ("[", "]", "delimiter.square"),
    ("(", ")", "delimiter.parenthesis"),
    ("<", ">", "delimiter.angle"),
];

/// Object attributes that make an action without `token` a token action.
const DIRECTIVES: [&str; 6] = ["next", "switchTo", "goBack", "nextEmbedded", "log", "bracket"];

/// Knobs for [`compile_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Log structural problems as warnings and skip the offending rule,
    /// include or bracket instead of failing.
    pub no_throw: bool,
}

/// Compiles a parsed grammar description.
///
/// # Errors
///
/// Returns a [`CompileError`] describing the first structural problem found.
pub fn compile(language_id: &str, description: &Value) -> Result<Grammar, CompileError> {
    compile_with(language_id, description, CompileOptions::default())
}

/// Parses and compiles a grammar description given as JSON text.
///
/// # Errors
///
/// Returns a [`CompileError`] if the text is not JSON or the description is
/// malformed.
pub fn compile_json(language_id: &str, json: &str) -> Result<Grammar, CompileError> {
    let description: Value =
        serde_json::from_str(json).map_err(|err| CompileError::new(language_id, err.into()))?;
    compile(language_id, &description)
}

/// Compiles a parsed grammar description with explicit options.
///
/// # Errors
///
/// Returns a [`CompileError`] describing the first structural problem found.
/// With [`CompileOptions::no_throw`] only problems that leave nothing to
/// tokenize with are reported.
pub fn compile_with(
    language_id: &str,
    description: &Value,
    options: CompileOptions,
) -> Result<Grammar, CompileError> {
    let fail = |kind| CompileError::new(language_id, kind);

    let attributes = description.as_object().ok_or_else(|| fail(CompileErrorKind::NotAnObject))?;
    let tokenizer = attributes
        .get("tokenizer")
        .and_then(Value::as_object)
        .ok_or_else(|| fail(CompileErrorKind::MissingTokenizer))?;
    let first_state = tokenizer
        .keys()
        .next()
        .ok_or_else(|| fail(CompileErrorKind::EmptyTokenizer))?;

    let settings = Settings {
        language_id: language_id.to_string(),
        ignore_case: flag(attributes, "ignoreCase"),
        unicode: flag(attributes, "unicode"),
        attributes: attributes.clone(),
    };
    let default_token = string_or(attributes, "defaultToken", "source");
    let token_postfix = attributes
        .get("tokenPostfix")
        .and_then(Value::as_str)
        .map_or_else(|| format!(".{language_id}"), str::to_string);

    let start = match attributes.get("start").and_then(Value::as_str) {
        Some(start) if !tokenizer.contains_key(start) => {
            return Err(fail(CompileErrorKind::UndefinedStart(start.to_string())));
        }
        Some(start) => start,
        None => first_state.as_str(),
    };

    let mut compiler = Compiler {
        settings,
        tokenizer,
        options,
        default_token,
        uses_embedded: false,
    };

    let mut states = IndexMap::with_capacity(tokenizer.len());
    for (state, rules) in tokenizer {
        let mut compiled = Vec::new();
        let mut path = vec![state.as_str()];
        compiler.add_rules(&format!("tokenizer.{state}"), rules, &mut compiled, &mut path)?;
        states.insert(SmolStr::new(state), compiled);
    }
    let brackets = compiler.compile_brackets(&token_postfix)?;

    debug!(
        language = language_id,
        states = states.len(),
        brackets = brackets.len(),
        uses_embedded = compiler.uses_embedded,
        "compiled grammar"
    );

    let Compiler {
        settings,
        default_token,
        uses_embedded,
        ..
    } = compiler;
    Ok(Grammar {
        settings,
        start: SmolStr::new(start),
        include_line_feed: flag(attributes, "includeLF") || flag(attributes, "includeLineFeed"),
        default_action: Action::Token(TokenAction::plain(default_token.clone())),
        default_token,
        token_postfix,
        uses_embedded,
        brackets,
        states,
    })
}

fn flag(attributes: &Map<String, Value>, name: &str) -> bool {
    attributes.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn string_or(attributes: &Map<String, Value>, name: &str, default: &str) -> String {
    attributes
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

struct Compiler<'d> {
    settings: Settings,
    tokenizer: &'d Map<String, Value>,
    options: CompileOptions,
    default_token: String,
    uses_embedded: bool,
}

impl<'d> Compiler<'d> {
    fn error(&self, kind: CompileErrorKind) -> CompileError {
        CompileError::new(&self.settings.language_id, kind)
    }

    /// Swallows `err` in no-throw mode, after logging it.
    fn tolerate(&self, err: CompileError) -> Result<(), CompileError> {
        if self.options.no_throw {
            warn!(language = %err.language_id, error = %err.kind, "ignoring grammar error");
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Whether `state` names a declared state, directly or through a dotted parent.
    fn state_declared(&self, state: &str) -> bool {
        let mut current = state;
        while !current.is_empty() {
            if self.tokenizer.contains_key(current) {
                return true;
            }
            current = current.rfind('.').map_or("", |idx| &current[..idx]);
        }
        false
    }

    /// Compiles `rules` into `out`, splicing in the rules of included states.
    ///
    /// `path` holds the states whose rules are currently being expanded.
    fn add_rules(
        &mut self,
        name: &str,
        rules: &'d Value,
        out: &mut Vec<Rule>,
        path: &mut Vec<&'d str>,
    ) -> Result<(), CompileError> {
        let Some(rules) = rules.as_array() else {
            return self.tolerate(self.error(CompileErrorKind::RulesNotArray {
                state: name.to_string(),
            }));
        };

        for raw in rules {
            if let Some(include) = raw.as_object().and_then(|object| object.get("include")) {
                if let Err(err) = self.add_include(name, include, out, path) {
                    self.tolerate(err)?;
                }
                continue;
            }
            match self.compile_rule(name, raw) {
                Ok(rule) => out.push(rule),
                Err(err) => self.tolerate(err)?,
            }
        }
        Ok(())
    }

    fn add_include(
        &mut self,
        name: &str,
        include: &'d Value,
        out: &mut Vec<Rule>,
        path: &mut Vec<&'d str>,
    ) -> Result<(), CompileError> {
        let Some(target) = include.as_str() else {
            return Err(self.error(CompileErrorKind::IncludeNotString {
                state: name.to_string(),
            }));
        };
        let target = target.strip_prefix('@').unwrap_or(target);
        let Some((target, rules)) = self.tokenizer.get_key_value(target) else {
            return Err(self.error(CompileErrorKind::UndefinedInclude {
                target: target.to_string(),
                state: name.to_string(),
            }));
        };
        if path.contains(&target.as_str()) {
            return Err(self.error(CompileErrorKind::IncludeCycle {
                target: target.clone(),
                state: name.to_string(),
            }));
        }

        path.push(target);
        let result = self.add_rules(&format!("{name}.{target}"), rules, out, path);
        path.pop();
        result
    }

    fn compile_rule(&mut self, state: &str, raw: &Value) -> Result<Rule, CompileError> {
        let mut name = state.to_string();
        let mut only_at_line_start = false;

        let (pattern, action) = match raw {
            Value::Array(items) if (1..=3).contains(&items.len()) => {
                let pattern = items[0].as_str().ok_or_else(|| {
                    self.error(CompileErrorKind::PatternNotString {
                        state: state.to_string(),
                    })
                })?;
                let action = match (items.get(1), items.get(2)) {
                    (action, None) => action.cloned(),
                    (Some(Value::String(token)), Some(next)) => {
                        Some(serde_json::json!({ "token": token, "next": next }))
                    }
                    (Some(Value::Object(object)), Some(next)) => {
                        let mut object = object.clone();
                        object.insert("next".to_string(), next.clone());
                        Some(Value::Object(object))
                    }
                    _ => {
                        return Err(self.error(CompileErrorKind::PositionalNextState {
                            state: state.to_string(),
                        }))
                    }
                };
                (pattern, action)
            }
            Value::Object(object) => {
                let pattern = match object.get("regex") {
                    Some(Value::String(pattern)) => pattern.as_str(),
                    Some(_) => {
                        return Err(self.error(CompileErrorKind::PatternNotString {
                            state: state.to_string(),
                        }))
                    }
                    None => {
                        return Err(self.error(CompileErrorKind::InvalidRule {
                            state: state.to_string(),
                        }))
                    }
                };
                if let Some(rule_name) = object.get("name").and_then(Value::as_str) {
                    name = rule_name.to_string();
                }
                only_at_line_start = object
                    .get("matchOnlyAtLineStart")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                (pattern, object.get("action").cloned())
            }
            _ => {
                return Err(self.error(CompileErrorKind::InvalidRule {
                    state: state.to_string(),
                }))
            }
        };

        let name = format!("{name}: {pattern}");
        let action = self.compile_action(&name, action.as_ref())?;

        let body = match pattern.strip_prefix('^') {
            Some(body) => {
                only_at_line_start = true;
                body
            }
            None => pattern,
        };
        let leaves_embedded = matches!(
            &action,
            Action::Token(TokenAction {
                embedded: Some(EmbeddedTransition::Pop),
                ..
            })
        );
        let pattern = Pattern::compile(&self.settings, body, leaves_embedded)
            .map_err(|kind| self.error(kind))?;

        Ok(Rule {
            name,
            pattern,
            action,
            match_only_at_line_start: only_at_line_start,
        })
    }

    fn compile_action(&mut self, rule: &str, raw: Option<&Value>) -> Result<Action, CompileError> {
        match raw {
            None | Some(Value::Null) => Ok(Action::Token(TokenAction::plain(""))),
            Some(Value::String(token)) => Ok(Action::Token(TokenAction {
                substitute: token.contains('$'),
                ..TokenAction::plain(token.as_str())
            })),
            Some(Value::Array(items)) if items.is_empty() => Err(self.invalid_action(rule)),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| self.compile_action(rule, Some(item)))
                .collect::<Result<Vec<_>, _>>()
                .map(Action::Group),
            Some(Value::Object(object)) => {
                if let Some(token) = object.get("token") {
                    let token = token.as_str().ok_or_else(|| {
                        self.error(CompileErrorKind::TokenNotString {
                            rule: rule.to_string(),
                        })
                    })?;
                    self.compile_token_action(rule, token, object).map(Action::Token)
                } else if let Some(cases) = object.get("cases") {
                    self.compile_cases(rule, cases).map(Action::Cases)
                } else if DIRECTIVES.iter().any(|key| object.contains_key(*key)) {
                    self.compile_token_action(rule, "", object).map(Action::Token)
                } else {
                    Err(self.invalid_action(rule))
                }
            }
            Some(_) => Err(self.invalid_action(rule)),
        }
    }

    fn invalid_action(&self, rule: &str) -> CompileError {
        self.error(CompileErrorKind::InvalidAction {
            rule: rule.to_string(),
        })
    }

    fn compile_token_action(
        &mut self,
        rule: &str,
        token: &str,
        object: &Map<String, Value>,
    ) -> Result<TokenAction, CompileError> {
        let mut action = TokenAction {
            substitute: token.contains('$'),
            ..TokenAction::plain(token)
        };

        action.bracket = match object.get("bracket") {
            None => None,
            Some(Value::String(bracket)) if bracket == "@open" => Some(BracketKind::Open),
            Some(Value::String(bracket)) if bracket == "@close" => Some(BracketKind::Close),
            Some(_) => {
                return Err(self.error(CompileErrorKind::InvalidBracketAttribute {
                    rule: rule.to_string(),
                }))
            }
        };

        action.next = match object.get("next") {
            None | Some(Value::Null) => None,
            Some(Value::String(next)) if next.is_empty() => None,
            Some(Value::String(next)) => Some(self.compile_next(rule, next)?),
            Some(_) => {
                return Err(self.error(CompileErrorKind::NextNotString {
                    rule: rule.to_string(),
                }))
            }
        };

        if let Some(switch_to) = object.get("switchTo").and_then(Value::as_str) {
            self.check_static_state(rule, switch_to)?;
            action.switch_to = Some(switch_to.to_string());
        }

        action.go_back = object
            .get("goBack")
            .and_then(Value::as_u64)
            .and_then(|count| usize::try_from(count).ok());
        action.log = object.get("log").and_then(Value::as_str).map(str::to_string);

        if let Some(embedded) = object.get("nextEmbedded").and_then(Value::as_str) {
            action.embedded = Some(if embedded == "@pop" {
                EmbeddedTransition::Pop
            } else {
                EmbeddedTransition::Enter(embedded.to_string())
            });
            self.uses_embedded = true;
        }

        Ok(action)
    }

    fn compile_next(&self, rule: &str, next: &str) -> Result<NextState, CompileError> {
        Ok(match next {
            "@push" => NextState::Push,
            "@pop" => NextState::Pop,
            "@popall" => NextState::PopAll,
            _ => {
                self.check_static_state(rule, next)?;
                NextState::Goto(next.strip_prefix('@').unwrap_or(next).to_string())
            }
        })
    }

    /// Checks a transition target that does not depend on the match.
    fn check_static_state(&self, rule: &str, target: &str) -> Result<(), CompileError> {
        let state = target.strip_prefix('@').unwrap_or(target);
        if state.contains('$') || self.state_declared(state) {
            return Ok(());
        }
        self.tolerate(self.error(CompileErrorKind::UndefinedState {
            state: target.to_string(),
            rule: rule.to_string(),
        }))
    }

    fn compile_cases(&mut self, rule: &str, cases: &Value) -> Result<Cases, CompileError> {
        let Some(cases) = cases.as_object() else {
            return Err(self.error(CompileErrorKind::CasesNotObject {
                rule: rule.to_string(),
            }));
        };

        let mut compiled = Cases::new(&self.default_token);
        for (key, value) in cases {
            let action = self.compile_action(rule, Some(value))?;
            compiled
                .push(&self.settings, rule, key, action)
                .map_err(|kind| self.error(kind))?;
        }
        Ok(compiled)
    }

    fn compile_brackets(&self, token_postfix: &str) -> Result<Vec<Bracket>, CompileError> {
        let settings = &self.settings;
        let make = |open: &str, close: &str, token: &str| Bracket {
            token: format!("{token}{token_postfix}"),
            open: settings.fix_case(open).into_owned(),
            close: settings.fix_case(close).into_owned(),
        };

        let entries = match settings.attributes.get("brackets") {
            None | Some(Value::Null) => {
                return Ok(DEFAULT_BRACKETS
                    .iter()
                    .map(|&(open, close, token)| make(open, close, token))
                    .collect());
            }
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                self.tolerate(self.error(CompileErrorKind::BracketsNotArray))?;
                return Ok(Vec::new());
            }
        };

        let mut brackets = Vec::with_capacity(entries.len());
        for entry in entries {
            let (open, close, token) = match entry {
                Value::Array(triple) if triple.len() == 3 => {
                    (triple[0].as_str(), triple[1].as_str(), triple[2].as_str())
                }
                Value::Object(object) => {
                    let field = |key: &str| object.get(key).and_then(Value::as_str);
                    (field("open"), field("close"), field("token"))
                }
                _ => {
                    self.tolerate(self.error(CompileErrorKind::InvalidBracket))?;
                    continue;
                }
            };

            match (open, close, token) {
                (Some(open), Some(close), _) if open == close => {
                    self.tolerate(self.error(CompileErrorKind::IdenticalBrackets {
                        open: open.to_string(),
                    }))?;
                }
                (Some(open), Some(close), Some(token)) => brackets.push(make(open, close, token)),
                _ => self.tolerate(self.error(CompileErrorKind::InvalidBracket))?,
            }
        }
        Ok(brackets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile_err(description: &Value) -> CompileErrorKind {
        compile("toy", description).unwrap_err().kind
    }

    #[test]
    fn test_defaults() {
        let grammar = compile("toy", &json!({ "tokenizer": { "main": [["x", "ex"]] } })).unwrap();
        assert_eq!(grammar.start_state(), "main");
        assert_eq!(grammar.default_token(), "source");
        assert_eq!(grammar.token_postfix(), ".toy");
        assert!(!grammar.ignore_case());
        assert!(!grammar.includes_line_feed());
        assert!(!grammar.uses_embedded());

        let brackets: Vec<_> = grammar.brackets().iter().map(|b| b.token.as_str()).collect();
        assert_eq!(
            brackets,
            [
                "delimiter.curly.toy",
                "delimiter.square.toy",
                "delimiter.parenthesis.toy",
                "delimiter.angle.toy"
            ]
        );
    }

    #[test]
    fn test_explicit_settings() {
        let grammar = compile(
            "toy",
            &json!({
                "start": "second",
                "defaultToken": "invalid",
                "tokenPostfix": ".t",
                "includeLF": true,
                "brackets": [{ "open": "(", "close": ")", "token": "paren" }],
                "tokenizer": { "first": [], "second": [] }
            }),
        )
        .unwrap();
        assert_eq!(grammar.start_state(), "second");
        assert_eq!(grammar.default_token(), "invalid");
        assert_eq!(grammar.token_postfix(), ".t");
        assert!(grammar.includes_line_feed());
        assert_eq!(grammar.brackets()[0].token, "paren.t");
    }

    #[test]
    fn test_undefined_next_state_is_reported() {
        let err = compile(
            "toy",
            &json!({ "tokenizer": { "main": [["x", { "next": "noSuchState" }]] } }),
        )
        .unwrap_err();
        assert!(matches!(
            &err.kind,
            CompileErrorKind::UndefinedState { state, .. } if state == "noSuchState"
        ));
        assert!(err.to_string().contains("noSuchState"));
    }

    #[test]
    fn test_dynamic_next_state_is_checked_later() {
        let grammar = compile(
            "toy",
            &json!({ "tokenizer": { "main": [["(\\w)", { "token": "t", "next": "@quoted.$1" }]] } }),
        );
        assert!(grammar.is_ok());
    }

    #[test]
    fn test_next_state_resolves_through_parent() {
        let grammar = compile(
            "toy",
            &json!({ "tokenizer": {
                "main": [["\"", "string", "@string.double"]],
                "string": [["\"", "string", "@pop"]]
            } }),
        )
        .unwrap();
        match grammar.rules("main").unwrap()[0].action() {
            Action::Token(action) => {
                assert_eq!(action.next, Some(NextState::Goto("string.double".into())));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_switch_to_is_checked() {
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [["x", { "token": "t", "switchTo": "@gone" }]] } })),
            CompileErrorKind::UndefinedState { state, .. } if state == "@gone"
        ));
    }

    #[test]
    fn test_include_flattening_and_names() {
        let grammar = compile(
            "toy",
            &json!({ "tokenizer": {
                "main": [{ "include": "@whitespace" }, ["\\w+", "word"]],
                "whitespace": [["\\s+", "white"], { "include": "comment" }],
                "comment": [["#.*", "comment"]]
            } }),
        )
        .unwrap();
        let names: Vec<_> = grammar.rules("main").unwrap().iter().map(Rule::name).collect();
        assert_eq!(
            names,
            [
                "tokenizer.main.whitespace: \\s+",
                "tokenizer.main.whitespace.comment: #.*",
                "tokenizer.main: \\w+"
            ]
        );
    }

    #[test]
    fn test_include_errors() {
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [{ "include": "missing" }] } })),
            CompileErrorKind::UndefinedInclude { target, .. } if target == "missing"
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [{ "include": 3 }] } })),
            CompileErrorKind::IncludeNotString { .. }
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": {
                "main": [{ "include": "other" }],
                "other": [{ "include": "@main" }]
            } })),
            CompileErrorKind::IncludeCycle { target, .. } if target == "main"
        ));
    }

    #[test]
    fn test_shape_errors() {
        assert!(matches!(compile_err(&json!([])), CompileErrorKind::NotAnObject));
        assert!(matches!(compile_err(&json!({})), CompileErrorKind::MissingTokenizer));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": {} })),
            CompileErrorKind::EmptyTokenizer
        ));
        assert!(matches!(
            compile_err(&json!({ "start": "nope", "tokenizer": { "main": [] } })),
            CompileErrorKind::UndefinedStart(start) if start == "nope"
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": "x" } })),
            CompileErrorKind::RulesNotArray { .. }
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [{ "action": "x" }] } })),
            CompileErrorKind::InvalidRule { .. }
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [[1, "x"]] } })),
            CompileErrorKind::PatternNotString { .. }
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [["x", ["a"], "@pop"]] } })),
            CompileErrorKind::PositionalNextState { .. }
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [["x", 42]] } })),
            CompileErrorKind::InvalidAction { .. }
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [["x", { "token": 1 }]] } })),
            CompileErrorKind::TokenNotString { .. }
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [["x", { "token": "t", "bracket": "@middle" }]] } })),
            CompileErrorKind::InvalidBracketAttribute { .. }
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [["x", { "token": "t", "next": 1 }]] } })),
            CompileErrorKind::NextNotString { .. }
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [["x", { "cases": [] }]] } })),
            CompileErrorKind::CasesNotObject { .. }
        ));
        assert!(matches!(
            compile_err(&json!({ "tokenizer": { "main": [["@nothing", "x"]] } })),
            CompileErrorKind::UndefinedAttribute { .. }
        ));
    }

    #[test]
    fn test_bracket_errors() {
        assert!(matches!(
            compile_err(&json!({ "brackets": [["|", "|", "pipe"]], "tokenizer": { "main": [] } })),
            CompileErrorKind::IdenticalBrackets { open } if open == "|"
        ));
        assert!(matches!(
            compile_err(&json!({ "brackets": [["(", ")"]], "tokenizer": { "main": [] } })),
            CompileErrorKind::InvalidBracket
        ));
        assert!(matches!(
            compile_err(&json!({ "brackets": "()", "tokenizer": { "main": [] } })),
            CompileErrorKind::BracketsNotArray
        ));
    }

    #[test]
    fn test_no_throw_skips_offending_items() {
        let description = json!({
            "brackets": [["|", "|", "pipe"], ["(", ")", "paren"]],
            "tokenizer": { "main": [
                { "include": "missing" },
                ["(unclosed", "bad"],
                ["x", { "token": "ex", "next": "@nowhere" }],
                ["y", "why"]
            ] }
        });
        assert!(compile("toy", &description).is_err());

        let grammar = compile_with("toy", &description, CompileOptions { no_throw: true }).unwrap();
        let names: Vec<_> = grammar.rules("main").unwrap().iter().map(Rule::name).collect();
        assert_eq!(names, ["tokenizer.main: x", "tokenizer.main: y"]);
        assert_eq!(grammar.brackets().len(), 1);
    }

    #[test]
    fn test_action_shapes() {
        let grammar = compile(
            "toy",
            &json!({
                "keywords": ["if"],
                "tokenizer": { "main": [
                    ["a", { "token": "tag", "nextEmbedded": "$0", "goBack": 1, "log": "saw $0" }],
                    ["(b)(c)", ["first", "second"]],
                    ["\\w+", { "cases": { "@keywords": "keyword", "@default": "identifier" } }],
                    { "regex": "d", "action": { "token": "dee", "bracket": "@open" }, "name": "dee-rule", "matchOnlyAtLineStart": true },
                    ["e"]
                ] }
            }),
        )
        .unwrap();
        assert!(grammar.uses_embedded());

        let rules = grammar.rules("main").unwrap();
        match rules[0].action() {
            Action::Token(action) => {
                assert_eq!(action.embedded, Some(EmbeddedTransition::Enter("$0".into())));
                assert_eq!(action.go_back, Some(1));
                assert_eq!(action.log.as_deref(), Some("saw $0"));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(matches!(rules[1].action(), Action::Group(items) if items.len() == 2));
        match rules[2].action() {
            Action::Cases(cases) => assert_eq!(cases.keys().collect::<Vec<_>>(), ["@keywords", "@default"]),
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(rules[3].name(), "dee-rule: d");
        assert!(rules[3].matches_only_at_line_start());
        match rules[3].action() {
            Action::Token(action) => assert_eq!(action.bracket, Some(BracketKind::Open)),
            other => panic!("unexpected action {other:?}"),
        }
        match rules[4].action() {
            Action::Token(action) => assert_eq!(action.token, ""),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_invalid_json_text() {
        let err = compile_json("toy", "{ not json").unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::Json(_)));
        assert!(err.to_string().starts_with("toy: invalid JSON"));
    }
}
