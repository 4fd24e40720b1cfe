//! URL resolution against a base URL

use std::collections::BTreeMap;

use url::Url;

use crate::error::{self, Error};

/// Join `base` and `path` the way HTTP client base URLs are expected to work:
/// a path relative to `https://api.example.com/v1` stays under `/v1`.
pub fn combine(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Returns true if `url` carries its own scheme.
pub fn is_absolute(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| !u.cannot_be_a_base())
}

/// Resolve `url` (optionally against `base`) and append `params` to the query.
pub fn resolve(
    base: Option<&str>,
    url: &str,
    params: &BTreeMap<String, String>,
) -> Result<Url, Error> {
    let joined = match base {
        Some(base) if !is_absolute(url) => combine(base, url),
        _ => url.to_string(),
    };

    let mut resolved = Url::parse(&joined).map_err(|e| {
        error::builder(format!("cannot resolve '{joined}' to an absolute URL: {e}"))
    })?;

    if !params.is_empty() {
        let mut pairs = resolved.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }

    Ok(resolved)
}

/// Canonical form used for fingerprints: query pairs sorted, fragment dropped.
pub fn normalized(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
        return url.to_string();
    }

    pairs.sort();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_stays_under_base() {
        let url = resolve(Some("https://api.example.com/v1/"), "/users", &BTreeMap::new())
            .expect("resolvable");
        assert_eq!(url.as_str(), "https://api.example.com/v1/users");
    }

    #[test]
    fn absolute_url_ignores_base() {
        let url = resolve(Some("https://api.example.com"), "http://other.test/x", &BTreeMap::new())
            .expect("resolvable");
        assert_eq!(url.host_str(), Some("other.test"));
    }

    #[test]
    fn relative_without_base_is_builder_error() {
        let err = resolve(None, "/users", &BTreeMap::new()).expect_err("no base");
        assert!(err.is_builder());
    }

    #[test]
    fn normalization_sorts_query() {
        let a = Url::parse("http://h/p?b=2&a=1#frag").expect("valid");
        let b = Url::parse("http://h/p?a=1&b=2").expect("valid");
        assert_eq!(normalized(&a), normalized(&b));
    }
}
