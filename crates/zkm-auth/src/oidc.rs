//! Identity provider redirect handling (implicit flow, `response_type=id_token`).

use url::Url;
use zkm_core::config::OidcConfig;

use crate::error::AuthError;
use crate::jwt::IdToken;

/// Build the provider authorization URL carrying the session nonce.
pub fn authorization_url(
    config: &OidcConfig,
    nonce: &str,
    state: Option<&str>,
) -> Result<Url, AuthError> {
    if config.client_id.is_empty() {
        return Err(AuthError::Config("oidc.client_id is not set".into()));
    }
    let mut url = Url::parse(&config.auth_url)
        .map_err(|e| AuthError::Config(format!("oidc.auth_url {:?}: {e}", config.auth_url)))?;

    let mut scope = String::from("openid");
    for extra in config.extra_scopes.iter().filter(|s| s.as_str() != "openid") {
        scope.push(' ');
        scope.push_str(extra);
    }

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("response_type", "id_token")
            .append_pair("scope", &scope)
            .append_pair("nonce", nonce);
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url)
}

/// Pull the `id_token` out of the URL the provider redirected back to.
///
/// Providers put it in the fragment for the implicit flow; some proxies
/// rewrite it into the query, so both are checked (fragment first).
pub fn token_from_redirect(redirect: &str) -> Result<IdToken, AuthError> {
    let url = Url::parse(redirect.trim())
        .map_err(|e| AuthError::InvalidToken(format!("redirect URL: {e}")))?;

    let from_fragment = url.fragment().and_then(|fragment| {
        url::form_urlencoded::parse(fragment.as_bytes())
            .find(|(k, _)| k == "id_token")
            .map(|(_, v)| v.into_owned())
    });
    let from_query = || {
        url.query_pairs()
            .find(|(k, _)| k == "id_token")
            .map(|(_, v)| v.into_owned())
    };

    match from_fragment.or_else(from_query) {
        Some(jwt) => IdToken::decode(&jwt),
        None => {
            let error = url
                .query_pairs()
                .chain(
                    url.fragment()
                        .map(|f| url::form_urlencoded::parse(f.as_bytes()))
                        .into_iter()
                        .flatten(),
                )
                .find(|(k, _)| k == "error")
                .map(|(_, v)| v.into_owned());
            match error {
                Some(error) => Err(AuthError::InvalidToken(format!(
                    "identity provider returned error: {error}"
                ))),
                None => Err(AuthError::MissingToken),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::encode_unsigned;
    use serde_json::json;

    fn config() -> OidcConfig {
        OidcConfig {
            client_id: "client-123".into(),
            extra_scopes: vec!["email".into(), "openid".into()],
            ..OidcConfig::default()
        }
    }

    #[test]
    fn test_authorization_url_params() {
        let url = authorization_url(&config(), "nonce-abc", Some("st")).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["response_type"], "id_token");
        assert_eq!(pairs["scope"], "openid email");
        assert_eq!(pairs["nonce"], "nonce-abc");
        assert_eq!(pairs["state"], "st");
        assert_eq!(pairs["redirect_uri"], OidcConfig::default().redirect_uri);
        assert!(url.as_str().starts_with("https://accounts.google.com/"));
    }

    #[test]
    fn test_authorization_url_requires_client_id() {
        let err = authorization_url(&OidcConfig::default(), "n", None).unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn test_token_from_fragment_and_query() {
        let jwt = encode_unsigned(&json!({"sub": "u1", "aud": "client-123", "nonce": "n1"}));

        let fragment = format!("http://localhost:5173/auth/callback#state=x&id_token={jwt}");
        assert_eq!(token_from_redirect(&fragment).unwrap().subject(), "u1");

        let query = format!("http://localhost:5173/auth/callback?id_token={jwt}");
        assert_eq!(token_from_redirect(&query).unwrap().nonce(), "n1");
    }

    #[test]
    fn test_redirect_without_token() {
        let err = token_from_redirect("http://localhost:5173/auth/callback#state=x").unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));

        let err =
            token_from_redirect("http://localhost:5173/auth/callback#error=access_denied")
                .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }
}
