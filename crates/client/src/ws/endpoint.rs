//! Socket URL derivation.

use url::Url;

use crate::error::ConnectionError;

/// Derive the socket URL from a server origin: `http` becomes `ws`, `https`
/// becomes `wss`, and `path` is appended to whatever path the origin has.
pub fn socket_url(base_url: &str, path: &str) -> Result<Url, ConnectionError> {
    let mut url = Url::parse(base_url.trim()).map_err(|source| ConnectionError::InvalidBaseUrl {
        url: base_url.to_string(),
        source,
    })?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(ConnectionError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ConnectionError::UnsupportedScheme(url.scheme().to_string()))?;

    let joined = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Append the bearer token as a query parameter.
pub fn with_token(url: &Url, param: &str, token: &str) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut().append_pair(param, token);
    url
}
