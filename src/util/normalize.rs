use thiserror::Error;
use url::Url;

/// A URL that could not be normalized.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("empty URL")]
    Empty,
    #[error("unparseable URL '{url}': {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("URL has no host: {0}")]
    NoHost(String),
}

/// Canonicalizes a URL so that the same resource always maps to the same
/// string.
///
/// - missing scheme defaults to `http`
/// - scheme and host are lowercased, default ports dropped
/// - a leading `www.` is stripped when a domain remains (`www.com` is kept)
/// - the fragment is dropped
/// - `utm_*` tracking parameters (any case) are removed and the rest sorted by key
/// - a trailing `/` is removed from the path
///
/// The path is never case-folded: podcast hosts serve case-sensitive media
/// paths, so `/Ep1.mp3` and `/ep1.mp3` stay distinct.
///
/// ```
/// use feedcast::util::normalize_url;
///
/// assert_eq!(
///     normalize_url("HTTP://WWW.Example.com:80/Show/Ep1.mp3?utm_source=rss#t=10").unwrap(),
///     "http://example.com/Show/Ep1.mp3"
/// );
/// ```
pub fn normalize_url(raw: &str) -> Result<String, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let with_scheme = if trimmed.starts_with("//") {
        format!("http:{trimmed}")
    } else if !has_scheme(trimmed) {
        format!("http://{trimmed}")
    } else {
        trimmed.to_owned()
    };

    let mut url = Url::parse(&with_scheme).map_err(|source| NormalizeError::Parse {
        url: trimmed.to_owned(),
        source,
    })?;

    let host = url
        .host_str()
        .ok_or_else(|| NormalizeError::NoHost(trimmed.to_owned()))?
        .to_owned();
    if let Some(bare) = host.strip_prefix("www.") {
        // Only when a real domain remains: `www.com` stays as is
        if is_domain(bare) {
            // The url crate has already validated the host; a suffix of it is valid too
            url.set_host(Some(bare))
                .map_err(|source| NormalizeError::Parse {
                    url: trimmed.to_owned(),
                    source,
                })?;
        }
    }

    url.set_fragment(None);

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.to_ascii_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if params.is_empty() {
        url.set_query(None);
    } else {
        params.sort_by(|a, b| a.0.cmp(&b.0));
        url.query_pairs_mut().clear().extend_pairs(params);
    }

    let path = url.path().to_owned();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let mut normalized = String::from(url);
    // The url crate always serializes an empty path as "/"
    if url_has_root_path_only(&normalized) {
        normalized.pop();
    }
    Ok(normalized)
}

/// `scheme://` prefix per RFC 3986: a letter, then letters, digits, `+`, `-`, `.`
fn has_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// At least two non-empty labels, the last one not numeric.
fn is_domain(host: &str) -> bool {
    let labels: Vec<&str> = host.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| !label.is_empty())
        && labels
            .last()
            .is_some_and(|tld| !tld.chars().all(|c| c.is_ascii_digit()))
}

fn url_has_root_path_only(serialized: &str) -> bool {
    serialized
        .split_once("://")
        .map(|(_, rest)| rest.find('/') == Some(rest.len() - 1))
        .unwrap_or(false)
}
