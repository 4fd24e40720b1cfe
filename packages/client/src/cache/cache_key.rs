//! Request fingerprints shared by the cache and the deduplicator
//!
//! A fingerprint is the method, the normalized URL (query pairs sorted,
//! fragment dropped) and a SHA-256 of the body when there is one:
//!
//! ```text
//! GET https://api.example.com/items?a=1&b=2
//! POST https://api.example.com/items #9f86d081884c7d65
//! ```

use std::fmt;

use http::Method;
use ring::digest;

use crate::error::Error;
use crate::http::{RequestConfig, url};

/// Hex characters of the body digest kept in the fingerprint
const BODY_HASH_LEN: usize = 16;

/// Request-equivalence key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    /// Normalized absolute URL
    pub url: String,
    pub body_hash: Option<String>,
}

impl CacheKey {
    /// Derive the key for `config`.
    ///
    /// Two configs whose URLs differ only in query-pair order or fragment
    /// produce the same key.
    pub fn from_config(config: &RequestConfig) -> Result<Self, Error> {
        let resolved = config.resolved_url()?;
        Ok(Self {
            method: config.method.clone(),
            url: url::normalized(&resolved),
            body_hash: config
                .body
                .as_ref()
                .filter(|body| !body.is_empty())
                .map(|body| Self::hash_body(body)),
        })
    }

    fn hash_body(body: &[u8]) -> String {
        let digest = digest::digest(&digest::SHA256, body);
        let mut encoded = hex::encode(digest.as_ref());
        encoded.truncate(BODY_HASH_LEN);
        encoded
    }

    /// String form used as the store/map key
    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if let Some(hash) = &self.body_hash {
            write!(f, " #{hash}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_order_and_fragment_do_not_matter() {
        let a = CacheKey::from_config(&RequestConfig::get("http://h.test/x?b=2&a=1#top"))
            .expect("absolute");
        let b = CacheKey::from_config(&RequestConfig::get("http://h.test/x").param("a", 1).param("b", 2))
            .expect("absolute");
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), "GET http://h.test/x?a=1&b=2");
    }

    #[test]
    fn method_and_body_are_part_of_the_key() {
        let get = CacheKey::from_config(&RequestConfig::get("http://h.test/x")).expect("absolute");
        let post = CacheKey::from_config(&RequestConfig::post("http://h.test/x")).expect("absolute");
        assert_ne!(get, post);

        let one = CacheKey::from_config(&RequestConfig::post("http://h.test/x").body("1"))
            .expect("absolute");
        let two = CacheKey::from_config(&RequestConfig::post("http://h.test/x").body("2"))
            .expect("absolute");
        assert_ne!(one, two);
        assert_eq!(one.body_hash.as_ref().map(String::len), Some(BODY_HASH_LEN));
    }

    #[test]
    fn relative_url_without_base_fails() {
        let err = CacheKey::from_config(&RequestConfig::get("/relative")).expect_err("no base");
        assert!(err.is_builder());
    }
}
