//! Content key types: symmetric content keys and the buyer's X25519 key pair

use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::{KEY_SIZE, PUBLIC_KEY_SIZE};

/// A random 256-bit symmetric key for one payload. Zeroized on drop.
#[derive(Clone)]
pub struct ContentKey {
    bytes: [u8; KEY_SIZE],
}

impl ContentKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit content encryption key.
pub fn generate_content_key() -> ContentKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    ContentKey::from_bytes(bytes)
}

/// HKDF-SHA256 key derivation with an optional salt and a domain-specific info string.
pub(crate) fn hkdf_derive(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
) -> anyhow::Result<Zeroizing<[u8; KEY_SIZE]>> {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(info, &mut okm[..])
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(okm)
}

/// Public half of a buyer's content key pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentPublicKey([u8; PUBLIC_KEY_SIZE]);

impl ContentPublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0
    }

    /// Parse from hex; accepts an optional `0x` prefix.
    pub fn from_hex(s: &str) -> anyhow::Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| anyhow::anyhow!("content public key hex decode: {e}"))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub(crate) fn to_x25519(self) -> X25519PublicKey {
        X25519PublicKey::from(self.0)
    }
}

impl std::fmt::Debug for ContentPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentPublicKey({})", self.to_hex())
    }
}

impl Serialize for ContentPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Private half of a buyer's content key pair.
///
/// Never serialized implicitly; use [`ContentSecretKey::to_hex`] when the
/// caller has a confidential place to put it.
#[derive(Clone)]
pub struct ContentSecretKey(StaticSecret);

impl ContentSecretKey {
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng))
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    pub fn from_hex(s: &str) -> anyhow::Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        hex::decode_to_slice(s, &mut bytes[..])
            .map_err(|_| anyhow::anyhow!("content secret key hex decode error"))?;
        Ok(Self::from_bytes(*bytes))
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0.to_bytes()))
    }

    pub fn public_key(&self) -> ContentPublicKey {
        ContentPublicKey(X25519PublicKey::from(&self.0).to_bytes())
    }

    pub(crate) fn diffie_hellman(&self, their_public: &X25519PublicKey) -> SharedSecret {
        self.0.diffie_hellman(their_public)
    }
}

impl std::fmt::Debug for ContentSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContentSecretKey").field(&"[REDACTED]").finish()
    }
}

/// A buyer's X25519 key pair for receiving purchased content.
#[derive(Debug, Clone)]
pub struct ContentKeyPair {
    pub secret: ContentSecretKey,
    pub public: ContentPublicKey,
}

impl ContentKeyPair {
    pub fn generate() -> Self {
        Self::from_secret(ContentSecretKey::generate())
    }

    pub fn from_secret(secret: ContentSecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_generation() {
        let k1 = generate_content_key();
        let k2 = generate_content_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_content_key_debug_is_redacted() {
        let key = ContentKey::from_bytes([0x41u8; KEY_SIZE]);
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("65"));
    }

    #[test]
    fn test_hkdf_derive_different_info() {
        let ikm = [9u8; KEY_SIZE];
        let a = hkdf_derive(&ikm, None, b"zkmart-a").unwrap();
        let b = hkdf_derive(&ikm, None, b"zkmart-b").unwrap();
        assert_ne!(*a, *b, "different domains must produce different keys");
    }

    #[test]
    fn test_hkdf_derive_salt_matters() {
        let ikm = [9u8; KEY_SIZE];
        let a = hkdf_derive(&ikm, Some(b"salt-1"), b"zkmart").unwrap();
        let b = hkdf_derive(&ikm, Some(b"salt-2"), b"zkmart").unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_secret_key_hex_roundtrip() {
        let pair = ContentKeyPair::generate();
        let hex_sk = pair.secret.to_hex();
        let restored = ContentSecretKey::from_hex(&hex_sk).unwrap();
        assert_eq!(restored.public_key(), pair.public);
    }

    #[test]
    fn test_public_key_hex_and_serde() {
        let pair = ContentKeyPair::generate();
        let parsed = ContentPublicKey::from_hex(&format!("0x{}", pair.public.to_hex())).unwrap();
        assert_eq!(parsed, pair.public);

        let json = serde_json::to_string(&pair.public).unwrap();
        let back: ContentPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair.public);
    }

    #[test]
    fn test_public_key_rejects_bad_hex() {
        assert!(ContentPublicKey::from_hex("abcd").is_err());
        assert!(ContentSecretKey::from_hex("not-hex").is_err());
    }

    #[test]
    fn test_secret_key_debug_is_redacted() {
        let sk = ContentSecretKey::from_bytes([3u8; KEY_SIZE]);
        assert_eq!(format!("{sk:?}"), "ContentSecretKey(\"[REDACTED]\")");
    }
}
