//! Operation bodies and signature assembly for the ephemeral-key path.
//!
//! ```text
//! intent message  = [0, 0, 0] ‖ operation bytes
//! user signature  = base64(0x00 ‖ ed25519_sig(BLAKE3(intent message)) ‖ ed25519_pub)
//! authorization   = base64(0x05 ‖ JSON{inputs: {proof, addressSeed}, maxEpoch, userSignature})
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zkm_core::{Address, Epoch, TxDigest};

use crate::binding::ZK_AUTH_FLAG;
use crate::error::AuthError;
use crate::prover::Proof;
use crate::session::{EphemeralSession, ED25519_FLAG};

/// Intent scope/version/app prefix for transaction data.
pub const INTENT_PREFIX: [u8; 3] = [0, 0, 0];

/// A marketplace action awaiting authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Transfer {
        sender: Address,
        recipient: Address,
        amount: u64,
    },
    Purchase {
        buyer: Address,
        listing_id: String,
        seller: Address,
        price: u64,
    },
}

impl Operation {
    /// The account whose authorization the operation needs.
    pub fn sender(&self) -> Address {
        match self {
            Operation::Transfer { sender, .. } => *sender,
            Operation::Purchase { buyer, .. } => *buyer,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Transfer { .. } => "transfer",
            Operation::Purchase { .. } => "purchase",
        }
    }

    /// Canonical byte encoding that gets signed and submitted.
    pub fn to_bytes(&self) -> Result<Vec<u8>, AuthError> {
        serde_json::to_vec(self).map_err(|e| AuthError::Signing(format!("encoding operation: {e}")))
    }
}

pub fn intent_message(tx_bytes: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(INTENT_PREFIX.len() + tx_bytes.len());
    message.extend_from_slice(&INTENT_PREFIX);
    message.extend_from_slice(tx_bytes);
    message
}

/// Digest the ephemeral key signs, also used as the local transaction id.
pub fn signing_digest(tx_bytes: &[u8]) -> [u8; 32] {
    *blake3::hash(&intent_message(tx_bytes)).as_bytes()
}

pub fn local_digest(tx_bytes: &[u8]) -> TxDigest {
    TxDigest(hex::encode(signing_digest(tx_bytes)))
}

/// `0x00 ‖ signature ‖ public key`, base64.
pub fn user_signature(session: &EphemeralSession, tx_bytes: &[u8]) -> String {
    let signature = session.sign(&signing_digest(tx_bytes));
    let mut out = Vec::with_capacity(1 + 64 + 32);
    out.push(ED25519_FLAG);
    out.extend_from_slice(&signature.to_bytes());
    out.extend_from_slice(session.public_key().as_bytes());
    STANDARD.encode(out)
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationInputs {
    proof: serde_json::Value,
    address_seed: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZkAuthorization {
    inputs: AuthorizationInputs,
    max_epoch: Epoch,
    user_signature: String,
}

/// Combine the proof, address seed, max epoch and a fresh ephemeral-key
/// signature over `tx_bytes` into one serialized authorization.
pub fn assemble_signature(
    proof: &Proof,
    session: &EphemeralSession,
    tx_bytes: &[u8],
) -> Result<String, AuthError> {
    let address_seed = session.address_seed().ok_or(AuthError::MissingToken)?;
    let authorization = ZkAuthorization {
        inputs: AuthorizationInputs {
            proof: proof.0.clone(),
            address_seed: address_seed.to_decimal(),
        },
        max_epoch: session.max_epoch(),
        user_signature: user_signature(session, tx_bytes),
    };

    let mut out = vec![ZK_AUTH_FLAG];
    serde_json::to_writer(&mut out, &authorization)
        .map_err(|e| AuthError::Signing(format!("encoding authorization: {e}")))?;
    Ok(STANDARD.encode(out))
}

/// A fully signed operation, ready for exactly one submission.
#[derive(Debug, Clone)]
pub struct AuthorizedOperation {
    operation: Operation,
    tx_bytes: Vec<u8>,
    signature: String,
}

impl AuthorizedOperation {
    pub(crate) fn new(operation: Operation, tx_bytes: Vec<u8>, signature: String) -> Self {
        Self {
            operation,
            tx_bytes,
            signature,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn tx_bytes(&self) -> &[u8] {
        &self.tx_bytes
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn digest(&self) -> TxDigest {
        local_digest(&self.tx_bytes)
    }
}
