use crate::UrlError;
use url::Url;

/// Parses and normalizes an absolute HTTP(S) URL
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject schemes other than `http` and `https`
/// 3. Lowercase scheme and host (path, query and fragment keep their case)
/// 4. Strip the default port and clean up percent-encoding
/// 5. Remove dot segments from the path
///
/// Steps 3 to 5 are performed by the `url` crate's WHATWG parser.
///
/// # Examples
///
/// ```
/// use site_harvester::url::normalize_url;
///
/// let url = normalize_url("HTtp://ABC.com:80/a/../ABC").unwrap();
/// assert_eq!(url.as_str(), "http://abc.com/ABC");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(format!("{url_str}: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost(url_str.to_string()));
    }

    Ok(url)
}

/// Resolves a link found on `base` into a canonical absolute URL
///
/// # Resolution Rules
///
/// | `part` | Result |
/// |--------|--------|
/// | `http://…` / `https://…` (any case) | `part`, normalized |
/// | starts with `/` | `scheme://host` of `base` followed by `part` |
/// | anything else | `part` placed next to the last segment of `base` |
///
/// The third rule follows relative-reference semantics: resolving `ABC`
/// against `http://abc.com/a/b/x` yields `http://abc.com/a/b/ABC`, a sibling
/// of `x` rather than a child of it.
///
/// Resolution is idempotent for absolute input:
/// `resolve(b, resolve(b, x)) == resolve(b, x)`.
///
/// # Errors
///
/// Returns [`UrlError`] when `base` is not an absolute HTTP(S) URL or when
/// the joined result does not parse.
pub fn resolve(base: &str, part: &str) -> Result<Url, UrlError> {
    let part = part.trim();

    if is_absolute(part) {
        return normalize_url(part);
    }

    let base = normalize_url(base)?;

    if part.starts_with('/') && !part.starts_with("//") {
        let origin = base.origin().ascii_serialization();
        return normalize_url(&format!("{origin}{part}"));
    }

    let joined = base
        .join(part)
        .map_err(|e| UrlError::Parse(format!("{part} against {base}: {e}")))?;
    normalize_url(joined.as_str())
}

/// Returns true when `part` carries its own `http://` or `https://` scheme
fn is_absolute(part: &str) -> bool {
    let lower = part
        .get(..8)
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| part.to_ascii_lowercase());
    lower.starts_with("http://") || lower.starts_with("https://")
}
