//! Lookup of embedded languages by name.
//!
//! A grammar enters another language by name (`nextEmbedded: "js"`). The
//! [`Tokenizer`] asks its [`GrammarResolver`] to turn that name into a
//! language id and to hand over the tokenizer for it. [`GrammarRegistry`] is a
//! thread-safe resolver that owns the tokenizers registered with it.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::tokenizer::Tokenizer;

/// Resolves embedded language names to tokenizers.
pub trait GrammarResolver: Send + Sync {
    /// Maps a language name, alias or mime type to a language id.
    ///
    /// Returns `None` when the name is unknown; the name is then used as the id.
    fn resolve_language_id(&self, name: &str) -> Option<SmolStr>;

    /// Returns the tokenizer for `language_id`, if one is known.
    fn tokenizer(&self, language_id: &str) -> Option<Arc<Tokenizer>>;
}

/// A set of tokenizers that can embed one another.
#[derive(Debug, Default)]
pub struct GrammarRegistry {
    tokenizers: RwLock<FxHashMap<SmolStr, Arc<Tokenizer>>>,
    aliases: RwLock<FxHashMap<SmolStr, SmolStr>>,
}

impl GrammarRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds `tokenizer`, replacing any tokenizer for the same language.
    ///
    /// The tokenizer is wired to resolve its embedded languages through this
    /// registry.
    pub fn register(self: &Arc<Self>, tokenizer: Tokenizer) -> Arc<Tokenizer> {
        let resolver: Arc<dyn GrammarResolver> = Arc::clone(self) as Arc<dyn GrammarResolver>;
        let tokenizer = Arc::new(tokenizer.with_resolver(Arc::downgrade(&resolver)));
        let language_id = SmolStr::new(tokenizer.language_id());
        debug!(language = %language_id, "registered grammar");
        self.tokenizers
            .write()
            .insert(language_id, Arc::clone(&tokenizer));
        tokenizer
    }

    /// Makes `alias` (a display name or mime type) resolve to `language_id`.
    ///
    /// Aliases are matched case-insensitively.
    pub fn register_alias(&self, alias: &str, language_id: &str) {
        self.aliases
            .write()
            .insert(SmolStr::new(alias.to_lowercase()), SmolStr::new(language_id));
    }

    /// Removes the tokenizer for `language_id`.
    pub fn unregister(&self, language_id: &str) -> Option<Arc<Tokenizer>> {
        self.tokenizers.write().remove(language_id)
    }

    /// Looks a tokenizer up by language id or alias.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Tokenizer>> {
        let language_id = self.resolve_language_id(name)?;
        self.tokenizer(&language_id)
    }

    /// The ids of all registered languages, sorted.
    #[must_use]
    pub fn language_ids(&self) -> Vec<SmolStr> {
        let mut ids: Vec<SmolStr> = self.tokenizers.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl GrammarResolver for GrammarRegistry {
    fn resolve_language_id(&self, name: &str) -> Option<SmolStr> {
        if self.tokenizers.read().contains_key(name) {
            return Some(SmolStr::new(name));
        }
        self.aliases.read().get(name.to_lowercase().as_str()).cloned()
    }

    fn tokenizer(&self, language_id: &str) -> Option<Arc<Tokenizer>> {
        self.tokenizers.read().get(language_id).cloned()
    }
}
