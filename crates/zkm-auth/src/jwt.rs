//! OIDC identity token (JWT) claim decoding.
//!
//! Only the payload is read. Signature and issuer checks happen in the proof
//! service and on the ledger, both of which see the raw token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use std::fmt;

use crate::error::AuthError;

#[derive(Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    exp: Option<u64>,
}

/// A decoded identity token. Keeps the raw compact form for the proof service.
#[derive(Clone, PartialEq, Eq)]
pub struct IdToken {
    raw: String,
    issuer: Option<String>,
    subject: String,
    audience: String,
    nonce: String,
    expires_at: Option<u64>,
}

impl IdToken {
    /// Decode a compact JWT (`header.payload.signature`).
    ///
    /// `sub`, `aud` and `nonce` are required and must be non-empty. An array
    /// `aud` is accepted only with a single entry.
    pub fn decode(jwt: &str) -> Result<Self, AuthError> {
        let jwt = jwt.trim();
        let mut parts = jwt.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken(
                "expected three dot-separated segments".into(),
            ));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::InvalidToken(format!("payload is not base64url: {e}")))?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::InvalidToken(format!("payload is not a claims object: {e}")))?;

        let subject = required("sub", claims.sub)?;
        let nonce = required("nonce", claims.nonce)?;
        let audience = match claims.aud {
            Some(Audience::One(aud)) => required("aud", Some(aud))?,
            Some(Audience::Many(mut auds)) if auds.len() == 1 => required("aud", auds.pop())?,
            Some(Audience::Many(auds)) => {
                return Err(AuthError::InvalidToken(format!(
                    "expected a single audience, found {}",
                    auds.len()
                )))
            }
            None => return Err(AuthError::InvalidToken("missing claim: aud".into())),
        };

        Ok(Self {
            raw: jwt.to_string(),
            issuer: claims.iss,
            subject,
            audience,
            nonce,
            expires_at: claims.exp,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// True when the token carries an `exp` at or before `unix_secs`.
    pub fn is_expired_at(&self, unix_secs: u64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= unix_secs)
    }
}

fn required(claim: &str, value: Option<String>) -> Result<String, AuthError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuthError::InvalidToken(format!("missing claim: {claim}"))),
    }
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdToken")
            .field("raw", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("subject", &self.subject)
            .field("audience", &self.audience)
            .field("nonce", &self.nonce)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Build an unsigned compact JWT around `claims`, for fixtures and local
/// development against a mock prover.
pub fn encode_unsigned(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
