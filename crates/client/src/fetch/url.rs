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

/// Resolve a manifest entry or request target into an absolute URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Absolute inputs (containing `://`) are parsed as-is, anything else is
///    joined onto `origin`
/// 3. Only `http` and `https` are accepted
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn resolve(origin: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        origin.join(trimmed)
    }
    .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Whether two URLs share scheme, host and port.
pub fn is_same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://ict.example.com").unwrap()
    }

    #[test]
    fn test_resolve_relative_path() {
        let url = resolve(&origin(), "/offline.html").unwrap();
        assert_eq!(url.as_str(), "https://ict.example.com/offline.html");
    }

    #[test]
    fn test_resolve_root() {
        let url = resolve(&origin(), "/").unwrap();
        assert_eq!(url.as_str(), "https://ict.example.com/");
    }

    #[test]
    fn test_resolve_absolute_cross_origin() {
        let url = resolve(&origin(), "https://fonts.googleapis.com/css2?family=Inter").unwrap();
        assert_eq!(url.host_str(), Some("fonts.googleapis.com"));
        assert_eq!(url.query(), Some("family=Inter"));
    }

    #[test]
    fn test_resolve_lowercase_host() {
        let url = resolve(&origin(), "https://CDN.EXAMPLE.COM/app.js").unwrap();
        assert_eq!(url.host_str(), Some("cdn.example.com"));
    }

    #[test]
    fn test_resolve_remove_fragment() {
        let url = resolve(&origin(), "/services/rmm#pricing").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path(), "/services/rmm");
    }

    #[test]
    fn test_resolve_trim_whitespace() {
        let url = resolve(&origin(), "  /logo.png  ").unwrap();
        assert_eq!(url.as_str(), "https://ict.example.com/logo.png");
    }

    #[test]
    fn test_resolve_unsupported_scheme() {
        let result = resolve(&origin(), "file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve(&origin(), ""), Err(UrlError::Empty)));
        assert!(matches!(resolve(&origin(), "   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_same_origin() {
        let a = Url::parse("https://ict.example.com/a").unwrap();
        let b = Url::parse("https://ict.example.com:443/b?x=1").unwrap();
        let c = Url::parse("http://ict.example.com/a").unwrap();
        let d = Url::parse("https://fonts.googleapis.com/").unwrap();
        assert!(is_same_origin(&a, &b));
        assert!(!is_same_origin(&a, &c));
        assert!(!is_same_origin(&a, &d));
    }
}
