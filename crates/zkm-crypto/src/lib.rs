//! zkm-crypto: content protection for purchased marketplace items
//!
//! Hybrid scheme: X25519 key agreement + XChaCha20-Poly1305
//!
//! ```text
//! sender ephemeral X25519 ──ECDH── recipient public key
//!   └── HKDF-SHA256(shared, salt=eph_pub||recipient_pub, info="zkmart-content-kek-v1") → KEK
//!         └── KEK seals a random 256-bit content key        → wrapped_key
//!               └── content key encrypts the payload (detached tag, AAD=eph_pub)
//! ```
//!
//! Also hosts the decimal big-integer codec used by the proof service wire
//! format, since it is a pure byte transform with no session dependencies.

pub mod bigint;
pub mod hybrid;
pub mod keys;

pub use bigint::{bytes_to_decimal, decimal_to_bytes, CodecError};
pub use hybrid::{decrypt, encrypt, DecryptError, EncryptError, EncryptedPayload};
pub use keys::{generate_content_key, ContentKey, ContentKeyPair, ContentPublicKey, ContentSecretKey};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of an X25519 public key
pub const PUBLIC_KEY_SIZE: usize = 32;
