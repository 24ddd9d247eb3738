//! A declarative lexical-grammar compiler and incremental line tokenizer.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::multiple_crate_versions)]

/// Compilation of JSON grammar descriptions into executable grammars.
///
/// Compilation is where every structural problem in a description is caught:
/// undefined states and attributes, malformed actions, bad bracket tables.
/// A grammar that compiles can be handed to a [`Tokenizer`] as is.
pub mod compile;

/// Error types raised by compilation and tokenization.
pub mod error;

/// The compiled grammar model: states, rules, actions and brackets.
///
/// Everything in here is immutable once built. The tokenizer only ever reads
/// from it.
pub mod grammar;

/// Conditional dispatch (`cases`) compiled into guard tests.
pub mod guard;

/// Lookup of embedded languages by name.
pub mod registry;

/// State stacks, lexical line states and their interning cache.
pub mod state;

/// `$`-template substitution and token-name helpers.
pub mod substitute;

/// The line tokenizer and its token collectors.
pub mod tokenizer;

pub use compile::{compile, compile_json, compile_with, CompileOptions};
pub use error::{CompileError, CompileErrorKind, TokenizeError, TokenizeErrorKind};
pub use grammar::{Bracket, BracketKind, Grammar};
pub use registry::{GrammarRegistry, GrammarResolver};
pub use state::{EmbeddedContext, LexicalState, StateCache, StateStack};
pub use tokenizer::{
    ClassicTokensCollector, EncodedToken, MetadataTokensCollector, Token, TokenEncoder,
    TokenizeResult, Tokenizer, TokenizerOptions, TokensCollector,
};
