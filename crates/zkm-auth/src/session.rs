//! Ephemeral credential lifecycle.
//!
//! A session is an Ed25519 key pair, 128 bits of randomness and a max epoch,
//! committed to by the OIDC nonce:
//!
//! ```text
//! nonce = base64url(BLAKE3-derive_key("zkmart 2026 session nonce v1",
//!             0x00‖ed25519_pub ‖ max_epoch_be64 ‖ randomness_be128)[..20])
//! ```
//!
//! The three secrets are persisted together through a [`SecretStore`] so the
//! session survives the identity provider redirect. The per-user salt lives
//! next to them with its own lifecycle.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;
use zkm_core::config::SessionConfig;
use zkm_core::{Address, Epoch};
use zkm_secrets::{SecretStore, SessionSecrets, StoreError};

use crate::binding::{self, AddressSeed, KEY_CLAIM_NAME};
use crate::error::{AuthError, BindingError};
use crate::jwt::IdToken;

/// Signature scheme flag prefixed to the ephemeral public key.
pub const ED25519_FLAG: u8 = 0x00;

/// Length of the flagged public key committed to by the nonce.
pub const EXTENDED_PUBLIC_KEY_SIZE: usize = 33;

/// Session randomness and user salt width (128-bit).
pub const RANDOMNESS_SIZE: usize = 16;

const NONCE_CONTEXT: &str = "zkmart 2026 session nonce v1";
const NONCE_HASH_PREFIX: usize = 20;

/// Compute the OIDC nonce committing to a session's public parameters.
pub fn compute_nonce(
    extended_public_key: &[u8; EXTENDED_PUBLIC_KEY_SIZE],
    max_epoch: Epoch,
    randomness: &[u8; RANDOMNESS_SIZE],
) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(NONCE_CONTEXT);
    hasher.update(extended_public_key);
    hasher.update(&max_epoch.to_be_bytes());
    hasher.update(randomness);
    let hash = hasher.finalize();
    URL_SAFE_NO_PAD.encode(&hash.as_bytes()[..NONCE_HASH_PREFIX])
}

pub struct EphemeralSession {
    signing_key: SigningKey,
    randomness: Zeroizing<[u8; RANDOMNESS_SIZE]>,
    max_epoch: Epoch,
    salt: SecretString,
    identity_token: Option<IdToken>,
}

impl EphemeralSession {
    pub(crate) fn from_parts(
        signing_key: SigningKey,
        randomness: [u8; RANDOMNESS_SIZE],
        max_epoch: Epoch,
        salt: SecretString,
    ) -> Self {
        Self {
            signing_key,
            randomness: Zeroizing::new(randomness),
            max_epoch,
            salt,
            identity_token: None,
        }
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// `0x00 ‖ ed25519 public key`
    pub fn extended_public_key(&self) -> [u8; EXTENDED_PUBLIC_KEY_SIZE] {
        let mut out = [0u8; EXTENDED_PUBLIC_KEY_SIZE];
        out[0] = ED25519_FLAG;
        out[1..].copy_from_slice(self.public_key().as_bytes());
        out
    }

    pub fn max_epoch(&self) -> Epoch {
        self.max_epoch
    }

    pub fn randomness(&self) -> &[u8; RANDOMNESS_SIZE] {
        &self.randomness
    }

    pub fn randomness_decimal(&self) -> String {
        zkm_crypto::bytes_to_decimal(self.randomness.as_slice())
    }

    pub fn salt(&self) -> &SecretString {
        &self.salt
    }

    pub fn nonce(&self) -> String {
        compute_nonce(&self.extended_public_key(), self.max_epoch, &self.randomness)
    }

    pub fn identity_token(&self) -> Option<&IdToken> {
        self.identity_token.as_ref()
    }

    /// Address of the attached identity, `None` until a token is attached.
    pub fn derived_address(&self) -> Option<Address> {
        self.identity_token.as_ref().map(|token| {
            binding::derive_address(self.salt.expose_secret(), token.subject(), token.audience())
        })
    }

    pub fn address_seed(&self) -> Option<AddressSeed> {
        self.identity_token.as_ref().map(|token| {
            binding::derive_address_seed(
                self.salt.expose_secret(),
                KEY_CLAIM_NAME,
                token.subject(),
                token.audience(),
            )
        })
    }

    /// Bind the identity token returned by the provider to this session.
    pub fn attach_token(&mut self, token: IdToken) -> Result<(), BindingError> {
        binding::verify_binding(self, &token)?;
        self.identity_token = Some(token);
        Ok(())
    }

    pub fn is_expired(&self, current_epoch: Epoch) -> bool {
        current_epoch > self.max_epoch
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl fmt::Debug for EphemeralSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralSession")
            .field("public_key", &hex::encode(self.public_key().as_bytes()))
            .field("signing_key", &"[REDACTED]")
            .field("randomness", &"[REDACTED]")
            .field("max_epoch", &self.max_epoch)
            .field("salt", &"[REDACTED]")
            .field("identity_token", &self.identity_token)
            .finish()
    }
}

/// Creates, restores and destroys the single ephemeral session.
pub struct CredentialManager {
    store: Arc<dyn SecretStore>,
    validity_window: u64,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn SecretStore>, validity_window: u64) -> Self {
        Self {
            store,
            validity_window,
        }
    }

    pub fn from_config(store: Arc<dyn SecretStore>, config: &SessionConfig) -> Self {
        Self::new(store, config.validity_window_epochs)
    }

    /// Start a new session valid through `current_epoch + validity_window`.
    ///
    /// Replaces any stored session. The salt is created on first use and
    /// reused afterwards.
    pub fn create_session(&self, current_epoch: Epoch) -> Result<EphemeralSession, AuthError> {
        let max_epoch = current_epoch.checked_add(self.validity_window).ok_or_else(|| {
            AuthError::Config(format!(
                "validity window {} overflows epoch {current_epoch}",
                self.validity_window
            ))
        })?;

        let salt = self.load_or_create_salt()?;
        let signing_key = SigningKey::generate(&mut OsRng);
        let mut randomness = [0u8; RANDOMNESS_SIZE];
        OsRng.fill_bytes(&mut randomness);

        let seed = Zeroizing::new(signing_key.to_bytes());
        let secrets = SessionSecrets {
            ephemeral_key: SecretString::from(STANDARD.encode(seed.as_slice())),
            randomness: SecretString::from(zkm_crypto::bytes_to_decimal(&randomness)),
            max_epoch,
        };
        self.store.save_session(&secrets)?;

        let session = EphemeralSession::from_parts(signing_key, randomness, max_epoch, salt);
        tracing::info!(current_epoch, max_epoch, "created ephemeral session");
        Ok(session)
    }

    /// Reconstruct the stored session. Any missing or corrupt slot is fatal.
    pub fn load_session(&self) -> Result<EphemeralSession, AuthError> {
        let slots = self.store.load_session().map_err(|e| match e {
            StoreError::Corrupt(detail) => AuthError::SessionInvalid(detail),
            other => AuthError::Store(other),
        })?;
        if slots.is_empty() {
            return Err(AuthError::SessionInvalid("no session stored".into()));
        }
        let secrets = slots.complete().map_err(|missing| {
            let names: Vec<&str> = missing.iter().map(|slot| slot.name()).collect();
            AuthError::SessionInvalid(format!("missing slot(s): {}", names.join(", ")))
        })?;

        let seed = Zeroizing::new(
            STANDARD
                .decode(secrets.ephemeral_key.expose_secret())
                .map_err(|_| AuthError::SessionInvalid("ephemeral-key slot is not base64".into()))?,
        );
        let seed: Zeroizing<[u8; 32]> =
            Zeroizing::new(seed.as_slice().try_into().map_err(|_| {
                AuthError::SessionInvalid(format!(
                    "ephemeral-key slot has {} bytes, expected 32",
                    seed.len()
                ))
            })?);
        let signing_key = SigningKey::from_bytes(&seed);

        let randomness = Zeroizing::new(
            zkm_crypto::decimal_to_bytes(secrets.randomness.expose_secret(), RANDOMNESS_SIZE)
                .map_err(|e| AuthError::SessionInvalid(format!("randomness slot: {e}")))?,
        );
        let mut randomness_bytes = [0u8; RANDOMNESS_SIZE];
        randomness_bytes.copy_from_slice(&randomness);

        let salt = self
            .store
            .load_salt()?
            .ok_or_else(|| AuthError::SessionInvalid("user salt is missing".into()))?;

        tracing::debug!(max_epoch = secrets.max_epoch, "restored ephemeral session");
        Ok(EphemeralSession::from_parts(
            signing_key,
            randomness_bytes,
            secrets.max_epoch,
            salt,
        ))
    }

    /// Load the session and reject it once `current_epoch` is past its
    /// max epoch. An expired session is destroyed.
    pub fn load_active_session(&self, current_epoch: Epoch) -> Result<EphemeralSession, AuthError> {
        let session = self.load_session()?;
        if session.is_expired(current_epoch) {
            tracing::info!(
                current_epoch,
                max_epoch = session.max_epoch(),
                "ephemeral session expired"
            );
            self.destroy_session();
            return Err(AuthError::SessionExpired {
                max_epoch: session.max_epoch(),
                current_epoch,
            });
        }
        Ok(session)
    }

    /// Clear all session slots. Never fails; store errors are logged.
    pub fn destroy_session(&self) {
        match self.store.clear_session() {
            Ok(()) => tracing::info!("ephemeral session destroyed"),
            Err(e) => tracing::warn!(error = %e, "failed to clear ephemeral session"),
        }
    }

    /// Parse `jwt` and bind it to `session`.
    pub fn attach_token(&self, session: &mut EphemeralSession, jwt: &str) -> Result<(), AuthError> {
        let token = IdToken::decode(jwt)?;
        session.attach_token(token)?;
        if let Some(address) = session.derived_address() {
            tracing::info!(%address, "identity token attached");
        }
        Ok(())
    }

    pub fn load_or_create_salt(&self) -> Result<SecretString, AuthError> {
        if let Some(salt) = self.store.load_salt()? {
            return Ok(salt);
        }
        let mut bytes = Zeroizing::new([0u8; RANDOMNESS_SIZE]);
        OsRng.fill_bytes(bytes.as_mut_slice());
        let salt = SecretString::from(zkm_crypto::bytes_to_decimal(bytes.as_slice()));
        self.store.save_salt(&salt)?;
        tracing::info!("generated new user salt");
        Ok(salt)
    }

    /// Forget the user salt. The next session resolves to a new address.
    pub fn reset_salt(&self) -> Result<(), AuthError> {
        self.store.clear_salt()?;
        tracing::warn!("user salt cleared; the next login derives a new address");
        Ok(())
    }
}
