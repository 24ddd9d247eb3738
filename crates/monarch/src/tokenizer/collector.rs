//! Token sinks fed by the tokenizer.
//!
//! A collector receives `(offset, classification, bracket)` triples in line
//! order, tagged with the language that produced them. Consecutive tokens that
//! would look the same are merged into one run.

use facet::Facet;
use smol_str::SmolStr;

use crate::grammar::BracketKind;

/// Receives the tokens of one line.
pub trait TokensCollector {
    /// Tags subsequent tokens with `language_id`.
    fn enter_language(&mut self, language_id: &str);

    /// Records a token starting at byte `offset`.
    fn emit(&mut self, offset: usize, classification: &str, bracket: Option<BracketKind>);
}

/// A classified span start.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Token {
    /// Byte offset of the token within the line, including any offset delta.
    pub offset: usize,

    /// Sanitised classification, token postfix included; empty for plain text.
    pub classification: String,

    /// The language whose grammar produced the token.
    pub language: String,

    /// Which side of a bracket pair the token is, if any.
    pub bracket: Option<BracketKind>,
}

/// Collects [`Token`]s with their classifications spelled out.
#[derive(Debug, Default)]
pub struct ClassicTokensCollector {
    tokens: Vec<Token>,
    language: SmolStr,
}

impl ClassicTokensCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The tokens collected so far.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Consumes the collector, returning its tokens.
    #[must_use]
    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }
}

impl TokensCollector for ClassicTokensCollector {
    fn enter_language(&mut self, language_id: &str) {
        if self.language != language_id {
            self.language = SmolStr::new(language_id);
        }
    }

    fn emit(&mut self, offset: usize, classification: &str, bracket: Option<BracketKind>) {
        if let Some(last) = self.tokens.last() {
            if last.classification == classification
                && last.language == self.language.as_str()
                && last.bracket == bracket
            {
                return;
            }
        }
        self.tokens.push(Token {
            offset,
            classification: classification.to_string(),
            language: self.language.to_string(),
            bracket,
        });
    }
}

/// Maps a classification to the packed integer a renderer consumes.
///
/// The bit layout belongs to the host; the tokenizer only forwards what it
/// knows about each token.
pub trait TokenEncoder {
    /// Encodes one token.
    fn encode(&self, language_id: &str, classification: &str, bracket: Option<BracketKind>) -> u32;
}

impl<F> TokenEncoder for F
where
    F: Fn(&str, &str, Option<BracketKind>) -> u32,
{
    fn encode(&self, language_id: &str, classification: &str, bracket: Option<BracketKind>) -> u32 {
        self(language_id, classification, bracket)
    }
}

/// A token in packed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
pub struct EncodedToken {
    /// Byte offset of the token within the line.
    pub offset: usize,

    /// The encoder's output for this token.
    pub metadata: u32,
}

/// Collects [`EncodedToken`]s through a host-supplied [`TokenEncoder`].
pub struct MetadataTokensCollector<'e> {
    encoder: &'e dyn TokenEncoder,
    language: SmolStr,
    tokens: Vec<EncodedToken>,
    last: Option<u32>,
}

impl<'e> MetadataTokensCollector<'e> {
    /// Creates an empty collector encoding through `encoder`.
    #[must_use]
    pub fn new(encoder: &'e dyn TokenEncoder) -> Self {
        Self {
            encoder,
            language: SmolStr::default(),
            tokens: Vec::new(),
            last: None,
        }
    }

    /// Consumes the collector, returning its tokens.
    #[must_use]
    pub fn into_tokens(self) -> Vec<EncodedToken> {
        self.tokens
    }
}

impl TokensCollector for MetadataTokensCollector<'_> {
    fn enter_language(&mut self, language_id: &str) {
        if self.language != language_id {
            self.language = SmolStr::new(language_id);
            self.last = None;
        }
    }

    fn emit(&mut self, offset: usize, classification: &str, bracket: Option<BracketKind>) {
        let metadata = self.encoder.encode(&self.language, classification, bracket);
        if self.last == Some(metadata) {
            return;
        }
        self.last = Some(metadata);
        self.tokens.push(EncodedToken { offset, metadata });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_collector_coalesces_runs() {
        let mut collector = ClassicTokensCollector::new();
        collector.enter_language("toy");
        collector.emit(0, "text.toy", None);
        collector.emit(1, "text.toy", None);
        collector.emit(2, "delimiter.toy", Some(BracketKind::Open));
        collector.emit(3, "delimiter.toy", Some(BracketKind::Close));
        collector.enter_language("js");
        collector.emit(4, "delimiter.toy", Some(BracketKind::Close));

        let offsets: Vec<_> = collector.tokens().iter().map(|t| t.offset).collect();
        assert_eq!(offsets, [0, 2, 3, 4]);
        assert_eq!(collector.into_tokens()[3].language, "js");
    }

    #[test]
    fn test_metadata_collector_encodes_and_coalesces() {
        let encoder = |language: &str, classification: &str, _: Option<BracketKind>| -> u32 {
            (u32::from(language == "js") << 8) | u32::try_from(classification.len()).unwrap_or(0)
        };
        let mut collector = MetadataTokensCollector::new(&encoder);
        collector.enter_language("toy");
        collector.emit(0, "abc", None);
        collector.emit(2, "xyz", None);
        collector.emit(4, "longer", None);
        collector.enter_language("js");
        collector.emit(6, "longer", None);

        assert_eq!(
            collector.into_tokens(),
            [
                EncodedToken { offset: 0, metadata: 3 },
                EncodedToken { offset: 4, metadata: 6 },
                EncodedToken { offset: 6, metadata: 262 },
            ]
        );
    }
}
