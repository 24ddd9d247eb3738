//! Command-line front end: tokenizes a file with a JSON grammar description.
//!
//! ```text
//! monarch <grammar.json> <input> [--language <id>] [--json]
//! ```
//!
//! Lines are tokenized in order, each starting in the state the previous one
//! ended in. Tokens are printed one per line as `line:offset<TAB>classification`,
//! or as a JSON array with `--json`.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use facet::Facet;
use monarch::{CompileError, Token, TokenizeError, Tokenizer};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments.
#[derive(Facet)]
struct Args {
    /// Path to the JSON grammar description.
    #[facet(positional)]
    grammar: String,

    /// Path to the file to tokenize.
    #[facet(positional)]
    input: String,

    /// Language id; defaults to the grammar file's stem.
    #[facet(named, short = 'l', default)]
    language: Option<String>,

    /// Print tokens as JSON.
    #[facet(named, short = 'j', default)]
    json: bool,
}

/// The tokens of one input line.
#[derive(Facet)]
struct LineTokens {
    /// One-based line number.
    line: usize,

    /// The line's tokens.
    tokens: Vec<Token>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("line {line}: {source}")]
    Tokenize { line: usize, source: TokenizeError },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .init();

    let args: Args = match facet_args::from_std_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn read(path: &str) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_string(),
        source,
    })
}

fn run(args: &Args) -> Result<(), CliError> {
    let language_id = args.language.clone().unwrap_or_else(|| {
        Path::new(&args.grammar)
            .file_stem()
            .map_or_else(|| "text".to_string(), |stem| stem.to_string_lossy().into_owned())
    });
    let tokenizer = Tokenizer::from_json(&language_id, &read(&args.grammar)?)?;
    let input = read(&args.input)?;

    let mut state = tokenizer.initial_state();
    let mut lines = Vec::new();
    for (index, raw) in input.split_inclusive('\n').enumerate() {
        let has_eol = raw.ends_with('\n');
        let text = raw.trim_end_matches('\n').trim_end_matches('\r');
        let result = tokenizer
            .tokenize(text, has_eol, &state)
            .map_err(|source| CliError::Tokenize {
                line: index + 1,
                source,
            })?;
        state = result.end_state;
        lines.push(LineTokens {
            line: index + 1,
            tokens: result.tokens,
        });
    }

    if args.json {
        println!("{}", facet_json::to_string(&lines));
        return Ok(());
    }
    for line in &lines {
        for token in &line.tokens {
            match token.bracket {
                Some(bracket) => println!(
                    "{}:{}\t{}\t{bracket:?}",
                    line.line, token.offset, token.classification
                ),
                None => println!("{}:{}\t{}", line.line, token.offset, token.classification),
            }
        }
    }
    Ok(())
}
