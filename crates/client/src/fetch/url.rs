//! URL resolution against the worker origin.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse the worker origin, keeping only scheme, host and port.
pub fn parse_origin(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_path("/");
    parsed.set_query(None);
    parsed.set_fragment(None);
    Ok(parsed)
}

/// Resolve a request URL against the origin.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Resolve relative paths against `origin`
/// 3. Reject non-http(s) schemes
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn resolve(origin: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut resolved = origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    match resolved.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    resolved.set_fragment(None);
    Ok(resolved)
}

pub fn is_same_origin(origin: &Url, url: &Url) -> bool {
    origin.origin() == url.origin()
}

/// Cache key for a resolved URL.
///
/// Same-origin URLs are keyed by path and query (`/crisis-resources.json`),
/// anything else by its absolute form.
pub fn cache_key(origin: &Url, url: &Url) -> String {
    if !is_same_origin(origin, url) {
        return url.to_string();
    }
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        parse_origin("https://astral.example").unwrap()
    }

    #[test]
    fn test_parse_origin_strips_path() {
        let origin = parse_origin("https://Astral.Example/app/?x=1#top").unwrap();
        assert_eq!(origin.as_str(), "https://astral.example/");
    }

    #[test]
    fn test_parse_origin_rejects_scheme() {
        assert!(matches!(parse_origin("ftp://astral.example"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(parse_origin("  "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_resolve_relative() {
        let url = resolve(&origin(), "/emergency-contacts.json").unwrap();
        assert_eq!(url.as_str(), "https://astral.example/emergency-contacts.json");
    }

    #[test]
    fn test_resolve_removes_fragment_keeps_query() {
        let url = resolve(&origin(), "/chat?room=2&b=1#latest").unwrap();
        assert_eq!(url.query(), Some("room=2&b=1"));
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_resolve_absolute_cross_origin() {
        let url = resolve(&origin(), "https://cdn.example/font.woff2").unwrap();
        assert!(!is_same_origin(&origin(), &url));
        assert_eq!(cache_key(&origin(), &url), "https://cdn.example/font.woff2");
    }

    #[test]
    fn test_resolve_rejects_data_urls() {
        assert!(matches!(resolve(&origin(), "data:text/plain,hi"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_cache_key_same_origin() {
        let url = resolve(&origin(), "https://astral.example/api/resources?lang=en").unwrap();
        assert_eq!(cache_key(&origin(), &url), "/api/resources?lang=en");

        let url = resolve(&origin(), "/offline-crisis.html").unwrap();
        assert_eq!(cache_key(&origin(), &url), "/offline-crisis.html");
    }
}
