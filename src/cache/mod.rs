//! Content-addressed response cache
//!
//! Requests are normalised into a [`RequestKey`] and hashed into a
//! [`Fingerprint`]. Exact hits come from the fingerprint alone; the
//! near-duplicate path compares normalised content and is only a fallback.

pub mod fingerprint;
pub mod store;

pub use fingerprint::{normalize_text, Fingerprint, RequestKey, RequestParams};
pub use store::{CacheEntry, CacheStats, NearMatch, ResponseCache};
