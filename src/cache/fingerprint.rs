//! Request normalisation and content-addressed fingerprints

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::context::Turn;

/// SHA-256 of a normalised request, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters that change what a model returns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<usize>,
    /// Any other output-affecting parameter, keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl RequestParams {
    /// Stable textual form; map ordering is fixed by `BTreeMap`
    fn canonical(&self) -> String {
        let temperature = match self.temperature {
            Some(t) => format!("{:.4}", t),
            None => "none".to_string(),
        };
        let max_output = match self.max_output_tokens {
            Some(n) => n.to_string(),
            None => "none".to_string(),
        };
        let extra: Vec<String> = self.extra.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("temperature={};max_output={};{}", temperature, max_output, extra.join(";"))
    }
}

/// Collapse whitespace runs and trim, leaving case and punctuation alone
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalised semantic content of a request, used for exact and
/// near-duplicate matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestKey {
    pub model: String,
    pub content: String,
    pub params: RequestParams,
}

impl RequestKey {
    pub fn new(model: impl Into<String>, text: &str, params: RequestParams) -> Self {
        Self {
            model: model.into(),
            content: normalize_text(text),
            params,
        }
    }

    /// Key for a turn sequence; each turn renders as `role: content`
    pub fn from_turns(model: impl Into<String>, turns: &[Turn], params: RequestParams) -> Self {
        let content = turns
            .iter()
            .map(|t| format!("{}: {}", t.role().as_str(), normalize_text(t.content())))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            model: model.into(),
            content,
            params,
        }
    }

    /// Whether two keys may share a cached response (same model and parameters)
    pub fn is_compatible(&self, other: &RequestKey) -> bool {
        self.model == other.model && self.params.canonical() == other.params.canonical()
    }

    /// Deterministic hash over model, parameters and normalised content
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(b"v1");
        hasher.update([0u8]);
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.params.canonical().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.content.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }
}
