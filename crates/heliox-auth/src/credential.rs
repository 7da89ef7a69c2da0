use heliox_core::headers::API_KEY;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use secrecy::SecretString;

/// Where the gateway key was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ApiKeyHeader,
    Bearer,
}

/// Raw gateway key taken from a request
#[derive(Debug, Clone)]
pub struct Credential {
    pub secret: SecretString,
    pub source: CredentialSource,
}

impl Credential {
    /// Whether `Authorization` must be withheld from the upstream
    pub fn bearer_was_credential(&self) -> bool {
        self.source == CredentialSource::Bearer
    }
}

/// Read the key from `X-API-Key`, falling back to `Authorization: Bearer`
pub fn extract_credential(headers: &HeaderMap) -> Option<Credential> {
    if let Some(key) = headers
        .get(API_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return Some(Credential {
            secret: SecretString::from(key.to_string()),
            source: CredentialSource::ApiKeyHeader,
        });
    }

    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }

    Some(Credential {
        secret: SecretString::from(token.to_string()),
        source: CredentialSource::Bearer,
    })
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn api_key_header_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY, HeaderValue::from_static("hlx_header"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer hlx_bearer"));

        let credential = extract_credential(&headers).unwrap();

        assert_eq!(credential.secret.expose_secret(), "hlx_header");
        assert!(!credential.bearer_was_credential());
    }

    #[test]
    fn falls_back_to_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  hlx_token "));

        let credential = extract_credential(&headers).unwrap();

        assert_eq!(credential.secret.expose_secret(), "hlx_token");
        assert_eq!(credential.source, CredentialSource::Bearer);
    }

    #[test]
    fn other_schemes_and_blanks_are_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY, HeaderValue::from_static("  "));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));

        assert!(extract_credential(&headers).is_none());
        assert!(extract_credential(&HeaderMap::new()).is_none());
    }
}
