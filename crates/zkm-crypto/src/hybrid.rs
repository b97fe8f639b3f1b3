//! Hybrid public-key encryption for purchased content
//!
//! Payload format:
//! ```text
//! wrapped_key = [32 bytes: sender ephemeral X25519 public key]
//!               [24 bytes: key-wrap nonce]
//!               [48 bytes: content key sealed with the KEK (32 + 16-byte tag)]
//! ciphertext  = XChaCha20-Poly1305(content_key, nonce, AAD = ephemeral public key)
//! tag         = detached 16-byte Poly1305 tag for `ciphertext`
//! ```
//!
//! The ephemeral key pair is generated per call and dropped after the ECDH,
//! so only the holder of the recipient secret can rebuild the KEK.

use chacha20poly1305::{
    aead::{Aead, AeadInPlace, KeyInit, Payload},
    Tag, XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::Zeroize;

use crate::keys::{generate_content_key, hkdf_derive, ContentKey, ContentPublicKey, ContentSecretKey};
use crate::{KEY_SIZE, NONCE_SIZE, PUBLIC_KEY_SIZE, TAG_SIZE};

/// Size of the sealed content key inside `wrapped_key`
const SEALED_KEY_SIZE: usize = KEY_SIZE + TAG_SIZE;

/// Total size of `wrapped_key`: ephemeral public key || wrap nonce || sealed key
pub const WRAPPED_KEY_SIZE: usize = PUBLIC_KEY_SIZE + NONCE_SIZE + SEALED_KEY_SIZE;

const KEK_INFO: &[u8] = b"zkmart-content-kek-v1";

#[derive(Debug, Error)]
pub enum EncryptError {
    /// The recipient key is a low-order point; ECDH would produce a known secret.
    #[error("recipient public key is not usable for key agreement")]
    InvalidRecipientKey,

    #[error("encryption failed: {0}")]
    Cipher(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptError {
    /// Wrong key, or any byte of the payload was altered. No plaintext is returned.
    #[error("authentication failure: wrong key or tampered payload")]
    AuthenticationFailure,

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Output of [`encrypt`]. Stored and transmitted by the marketplace backend,
/// consumed once by [`decrypt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub wrapped_key: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
}

impl EncryptedPayload {
    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| anyhow::anyhow!("payload serialization: {e}"))
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(data).map_err(|e| anyhow::anyhow!("payload deserialization: {e}"))
    }

    /// Sender ephemeral public key embedded at the front of `wrapped_key`.
    fn ephemeral_public(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out.copy_from_slice(&self.wrapped_key[..PUBLIC_KEY_SIZE]);
        out
    }

    fn validate(&self) -> Result<(), DecryptError> {
        if self.wrapped_key.len() != WRAPPED_KEY_SIZE {
            return Err(DecryptError::Malformed(format!(
                "wrapped key is {} bytes (expected {WRAPPED_KEY_SIZE})",
                self.wrapped_key.len()
            )));
        }
        if self.nonce.len() != NONCE_SIZE {
            return Err(DecryptError::Malformed(format!(
                "nonce is {} bytes (expected {NONCE_SIZE})",
                self.nonce.len()
            )));
        }
        if self.tag.len() != TAG_SIZE {
            return Err(DecryptError::Malformed(format!(
                "tag is {} bytes (expected {TAG_SIZE})",
                self.tag.len()
            )));
        }
        Ok(())
    }
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s secret key can read it.
pub fn encrypt(
    plaintext: &[u8],
    recipient: &ContentPublicKey,
) -> Result<EncryptedPayload, EncryptError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient.to_x25519());
    if !shared.was_contributory() {
        return Err(EncryptError::InvalidRecipientKey);
    }

    let kek = derive_kek(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        &recipient.to_bytes(),
    )
    .map_err(|e| EncryptError::Cipher(e.to_string()))?;

    let content_key = generate_content_key();

    // Seal the content key under the KEK
    let mut wrap_nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut wrap_nonce);
    let kek_bytes: &[u8; KEY_SIZE] = &kek;
    let sealed = XChaCha20Poly1305::new(kek_bytes.into())
        .encrypt(
            XNonce::from_slice(&wrap_nonce),
            Payload {
                msg: content_key.as_bytes(),
                aad: ephemeral_public.as_bytes(),
            },
        )
        .map_err(|e| EncryptError::Cipher(format!("content key sealing failed: {e}")))?;

    // Encrypt the payload with a detached tag
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    let mut ciphertext = plaintext.to_vec();
    let tag = XChaCha20Poly1305::new(content_key.as_bytes().into())
        .encrypt_in_place_detached(
            XNonce::from_slice(&nonce),
            ephemeral_public.as_bytes(),
            &mut ciphertext,
        )
        .map_err(|e| EncryptError::Cipher(format!("payload encryption failed: {e}")))?;

    let mut wrapped_key = Vec::with_capacity(WRAPPED_KEY_SIZE);
    wrapped_key.extend_from_slice(ephemeral_public.as_bytes());
    wrapped_key.extend_from_slice(&wrap_nonce);
    wrapped_key.extend_from_slice(&sealed);

    tracing::debug!(bytes = plaintext.len(), "encrypted content payload");

    Ok(EncryptedPayload {
        ciphertext,
        wrapped_key,
        nonce: nonce.to_vec(),
        tag: tag.to_vec(),
    })
}

/// Decrypt a payload produced by [`encrypt`] with the recipient's secret key.
///
/// Fails closed: any authentication problem returns
/// [`DecryptError::AuthenticationFailure`] and no plaintext.
pub fn decrypt(
    payload: &EncryptedPayload,
    recipient: &ContentSecretKey,
) -> Result<Vec<u8>, DecryptError> {
    payload.validate()?;

    let ephemeral_bytes = payload.ephemeral_public();
    let ephemeral_public = X25519PublicKey::from(ephemeral_bytes);
    let shared = recipient.diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(DecryptError::AuthenticationFailure);
    }

    let recipient_public = recipient.public_key();
    let kek = derive_kek(shared.as_bytes(), &ephemeral_bytes, &recipient_public.to_bytes())
        .map_err(|_| DecryptError::AuthenticationFailure)?;

    let content_key = unseal_content_key(&kek, payload, &ephemeral_bytes)?;

    let mut buffer = payload.ciphertext.clone();
    XChaCha20Poly1305::new(content_key.as_bytes().into())
        .decrypt_in_place_detached(
            XNonce::from_slice(&payload.nonce),
            &ephemeral_bytes,
            &mut buffer,
            Tag::from_slice(&payload.tag),
        )
        .map_err(|_| DecryptError::AuthenticationFailure)?;

    Ok(buffer)
}

fn derive_kek(
    shared: &[u8; KEY_SIZE],
    ephemeral_public: &[u8; PUBLIC_KEY_SIZE],
    recipient_public: &[u8; PUBLIC_KEY_SIZE],
) -> anyhow::Result<zeroize::Zeroizing<[u8; KEY_SIZE]>> {
    let mut salt = [0u8; PUBLIC_KEY_SIZE * 2];
    salt[..PUBLIC_KEY_SIZE].copy_from_slice(ephemeral_public);
    salt[PUBLIC_KEY_SIZE..].copy_from_slice(recipient_public);
    hkdf_derive(shared, Some(&salt), KEK_INFO)
}

fn unseal_content_key(
    kek: &[u8; KEY_SIZE],
    payload: &EncryptedPayload,
    ephemeral_public: &[u8; PUBLIC_KEY_SIZE],
) -> Result<ContentKey, DecryptError> {
    let wrap_nonce = &payload.wrapped_key[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + NONCE_SIZE];
    let sealed = &payload.wrapped_key[PUBLIC_KEY_SIZE + NONCE_SIZE..];

    let mut key_bytes = XChaCha20Poly1305::new(kek.into())
        .decrypt(
            XNonce::from_slice(wrap_nonce),
            Payload {
                msg: sealed,
                aad: ephemeral_public,
            },
        )
        .map_err(|_| DecryptError::AuthenticationFailure)?;

    if key_bytes.len() != KEY_SIZE {
        key_bytes.zeroize();
        return Err(DecryptError::AuthenticationFailure);
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&key_bytes);
    key_bytes.zeroize();
    Ok(ContentKey::from_bytes(key))
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
