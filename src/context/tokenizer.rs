//! Tokenizer adapter
//!
//! Wraps the external token-counting capability behind the [`Tokenizer`]
//! trait. The tiktoken implementation loads every vocabulary up front, so
//! after construction it is read-only and safe to share across threads.

use std::collections::HashMap;
use std::sync::Arc;

use tiktoken_rs::{cl100k_base, get_bpe_from_model, p50k_base, r50k_base, CoreBPE};
use tracing::debug;

use crate::error::{EngineError, Result};

/// Token id as produced by the underlying vocabulary
pub type TokenId = usize;

/// Token counting and exact encoding for a model family
pub trait Tokenizer: Send + Sync {
    /// Number of tokens `text` occupies for `model`
    fn count(&self, text: &str, model: &str) -> Result<usize>;

    /// Encode into token ids; `decode(encode(x)) == x`
    fn encode(&self, text: &str, model: &str) -> Result<Vec<TokenId>>;

    /// Decode token ids back into text
    fn decode(&self, tokens: &[TokenId], model: &str) -> Result<String>;

    /// Count tokens for multiple texts
    fn count_batch(&self, texts: &[&str], model: &str) -> Result<Vec<usize>> {
        texts.iter().map(|t| self.count(t, model)).collect()
    }
}

/// Named BPE vocabularies that can be bound to arbitrary model ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Cl100kBase,
    P50kBase,
    R50kBase,
}

impl Encoding {
    fn load(self) -> Result<CoreBPE> {
        let bpe = match self {
            Encoding::Cl100kBase => cl100k_base(),
            Encoding::P50kBase => p50k_base(),
            Encoding::R50kBase => r50k_base(),
        };
        bpe.map_err(|e| EngineError::Tokenizer(format!("failed to load {:?}: {}", self, e)))
    }
}

/// Tiktoken-based tokenizer with one vocabulary per registered model
pub struct TiktokenTokenizer {
    vocabularies: HashMap<String, Arc<CoreBPE>>,
}

impl TiktokenTokenizer {
    /// Load vocabularies for models tiktoken knows by name
    pub fn for_models<I, S>(models: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabularies = HashMap::new();
        for model in models {
            let model = model.as_ref();
            let bpe = get_bpe_from_model(model)
                .map_err(|_| EngineError::UnsupportedModel(model.to_string()))?;
            vocabularies.insert(model.to_string(), Arc::new(bpe));
        }
        debug!("Loaded tiktoken vocabularies for {} models", vocabularies.len());
        Ok(Self { vocabularies })
    }

    /// Bind a model id tiktoken does not know to an explicit encoding
    pub fn with_encoding(mut self, model: impl Into<String>, encoding: Encoding) -> Result<Self> {
        let bpe = encoding.load()?;
        self.vocabularies.insert(model.into(), Arc::new(bpe));
        Ok(self)
    }

    pub fn supports(&self, model: &str) -> bool {
        self.vocabularies.contains_key(model)
    }

    fn bpe(&self, model: &str) -> Result<&CoreBPE> {
        self.vocabularies
            .get(model)
            .map(|bpe| bpe.as_ref())
            .ok_or_else(|| EngineError::UnsupportedModel(model.to_string()))
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count(&self, text: &str, model: &str) -> Result<usize> {
        Ok(self.bpe(model)?.encode_with_special_tokens(text).len())
    }

    fn encode(&self, text: &str, model: &str) -> Result<Vec<TokenId>> {
        Ok(self.bpe(model)?.encode_with_special_tokens(text))
    }

    fn decode(&self, tokens: &[TokenId], model: &str) -> Result<String> {
        self.bpe(model)?
            .decode(tokens.to_vec())
            .map_err(|e| EngineError::Tokenizer(e.to_string()))
    }
}

/// Word-based token estimator (~1.3 tokens per word by default).
///
/// Model-agnostic and count-only: it has no vocabulary to encode against.
pub struct WordBasedTokenizer {
    tokens_per_word: f64,
}

impl WordBasedTokenizer {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }
}

impl Default for WordBasedTokenizer {
    fn default() -> Self {
        Self::new(1.3)
    }
}

impl Tokenizer for WordBasedTokenizer {
    fn count(&self, text: &str, _model: &str) -> Result<usize> {
        let word_count = text.split_whitespace().count();
        Ok((word_count as f64 * self.tokens_per_word).ceil() as usize)
    }

    fn encode(&self, _text: &str, _model: &str) -> Result<Vec<TokenId>> {
        Err(EngineError::Tokenizer(
            "word-based estimator does not support encoding".to_string(),
        ))
    }

    fn decode(&self, _tokens: &[TokenId], _model: &str) -> Result<String> {
        Err(EngineError::Tokenizer(
            "word-based estimator does not support decoding".to_string(),
        ))
    }
}
