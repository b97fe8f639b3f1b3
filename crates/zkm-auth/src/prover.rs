//! Proof service client.
//!
//! The service receives the identity token plus the session's public inputs
//! and returns an opaque proof object. Proofs are never cached: each
//! authorization attempt requests its own.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use zkm_core::config::ProverConfig;
use zkm_core::Epoch;

use crate::binding::{self, KEY_CLAIM_NAME};
use crate::error::{AuthError, ProverError};
use crate::session::EphemeralSession;

/// Request body sent to the proof service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    pub jwt: String,
    /// Flagged ephemeral public key as a decimal integer
    pub extended_ephemeral_public_key: String,
    pub max_epoch: Epoch,
    /// Session randomness as a decimal integer
    pub jwt_randomness: String,
    /// User salt as a decimal integer
    pub salt: String,
    pub key_claim_name: String,
}

impl ProofRequest {
    /// Assemble the request for `session`. Requires an attached token.
    pub fn for_session(session: &EphemeralSession) -> Result<Self, AuthError> {
        let token = session.identity_token().ok_or(AuthError::MissingToken)?;
        Ok(Self {
            jwt: token.raw().to_string(),
            extended_ephemeral_public_key: zkm_crypto::bytes_to_decimal(
                &session.extended_public_key(),
            ),
            max_epoch: session.max_epoch(),
            jwt_randomness: session.randomness_decimal(),
            salt: session.salt().expose_secret().to_string(),
            key_claim_name: KEY_CLAIM_NAME.to_string(),
        })
    }
}

impl fmt::Debug for ProofRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofRequest")
            .field("jwt", &"[REDACTED]")
            .field(
                "extended_ephemeral_public_key",
                &self.extended_ephemeral_public_key,
            )
            .field("max_epoch", &self.max_epoch)
            .field("jwt_randomness", &"[REDACTED]")
            .field("salt", &"[REDACTED]")
            .field("key_claim_name", &self.key_claim_name)
            .finish()
    }
}

/// Proof returned by the service, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proof(pub serde_json::Value);

#[async_trait]
pub trait ProofService: Send + Sync {
    async fn prove(&self, request: &ProofRequest) -> Result<Proof, ProverError>;
}

/// Proof service reached over HTTP (POST JSON, JSON object response).
pub struct HttpProver {
    client: reqwest::Client,
    url: String,
}

impl HttpProver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProverError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProverError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &ProverConfig) -> Result<Self, ProverError> {
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_secs))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ProofService for HttpProver {
    async fn prove(&self, request: &ProofRequest) -> Result<Proof, ProverError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| ProverError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProverError::Transport(format!("reading response body: {e}")))?;

        if !status.is_success() {
            return Err(ProverError::Service {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) if value.is_object() => Ok(Proof(value)),
            _ => Err(ProverError::Malformed(body)),
        }
    }
}

/// Request a fresh proof for `session`.
///
/// The binding check runs before the service sees anything; a session whose
/// token does not match is never sent out.
pub async fn request_proof(
    prover: &dyn ProofService,
    session: &EphemeralSession,
) -> Result<Proof, AuthError> {
    let token = session.identity_token().ok_or(AuthError::MissingToken)?;
    binding::verify_binding(session, token)?;

    let request = ProofRequest::for_session(session)?;
    tracing::info!(max_epoch = request.max_epoch, "requesting proof");
    let proof = prover.prove(&request).await.map_err(|e| {
        tracing::warn!(error = %e, "proof request failed");
        e
    })?;
    tracing::debug!("proof received");
    Ok(proof)
}
