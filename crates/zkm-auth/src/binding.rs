//! Nonce and address binding.
//!
//! The account address is a pure function of (salt, subject, audience):
//!
//! ```text
//! address_seed = BLAKE3-derive_key("zkmart 2026 address seed v1",
//!                    len‖salt ‖ len‖"sub" ‖ len‖sub ‖ len‖aud)
//! address      = BLAKE3(0x05 ‖ address_seed)
//! ```
//!
//! Before any session material is sent anywhere, the identity token must
//! carry the session's nonce and resolve to the session's address.

use secrecy::ExposeSecret;
use std::fmt;
use zkm_core::types::ADDRESS_SIZE;
use zkm_core::Address;

use crate::error::BindingError;
use crate::jwt::IdToken;
use crate::session::EphemeralSession;

/// Signature scheme flag for ephemeral-key authorizations.
pub const ZK_AUTH_FLAG: u8 = 0x05;

/// Claim the address is keyed on.
pub const KEY_CLAIM_NAME: &str = "sub";

const ADDRESS_SEED_CONTEXT: &str = "zkmart 2026 address seed v1";

/// 32-byte commitment to (salt, claim, audience). Public; goes on chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressSeed([u8; 32]);

impl AddressSeed {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Decimal rendering, as the proof service and ledger expect it.
    pub fn to_decimal(&self) -> String {
        zkm_crypto::bytes_to_decimal(&self.0)
    }
}

impl fmt::Display for AddressSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl fmt::Debug for AddressSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddressSeed({})", hex::encode(self.0))
    }
}

pub fn derive_address_seed(
    salt: &str,
    key_claim_name: &str,
    key_claim_value: &str,
    audience: &str,
) -> AddressSeed {
    let mut hasher = blake3::Hasher::new_derive_key(ADDRESS_SEED_CONTEXT);
    for field in [salt, key_claim_name, key_claim_value, audience] {
        hasher.update(&(field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    AddressSeed(*hasher.finalize().as_bytes())
}

pub fn address_from_seed(seed: &AddressSeed) -> Address {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[ZK_AUTH_FLAG]);
    hasher.update(seed.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; ADDRESS_SIZE];
    bytes.copy_from_slice(&hash.as_bytes()[..ADDRESS_SIZE]);
    Address::from_bytes(bytes)
}

/// Deterministic account address for a user of a given client.
pub fn derive_address(salt: &str, subject: &str, audience: &str) -> Address {
    address_from_seed(&derive_address_seed(salt, KEY_CLAIM_NAME, subject, audience))
}

/// Check that `token` belongs to `session`.
///
/// Order matters: the nonce is compared first, then the address the token
/// resolves to is compared with the address the session is already bound to
/// (if it has an attached token). Failures are final; the caller discards
/// the session.
pub fn verify_binding(session: &EphemeralSession, token: &IdToken) -> Result<(), BindingError> {
    let expected_nonce = session.nonce();
    if token.nonce() != expected_nonce {
        tracing::warn!(max_epoch = session.max_epoch(), "identity token nonce mismatch");
        return Err(BindingError::NonceMismatch {
            expected: expected_nonce,
            found: token.nonce().to_string(),
        });
    }

    if let Some(expected) = session.derived_address() {
        let found = derive_address(
            session.salt().expose_secret(),
            token.subject(),
            token.audience(),
        );
        if found != expected {
            tracing::warn!(%expected, %found, "identity token address mismatch");
            return Err(BindingError::AddressMismatch { expected, found });
        }
    }
    Ok(())
}
