use thiserror::Error;
use zkm_core::{Address, Epoch};
use zkm_secrets::StoreError;

/// The identity token is not bound to the session that requested it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("identity token nonce {found:?} does not match session nonce {expected:?}")]
    NonceMismatch { expected: String, found: String },

    #[error("identity token resolves to {found}, session is bound to {expected}")]
    AddressMismatch { expected: Address, found: Address },
}

/// Failure talking to the proof service. Service responses are kept verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProverError {
    #[error("proof service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },

    #[error("proof service unreachable: {0}")]
    Transport(String),

    #[error("proof service response is not a JSON object: {0}")]
    Malformed(String),
}

/// Raw transport failure from the ledger RPC.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct LedgerTransportError(pub String);

/// Error reported by an external signing agent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct WalletError(pub String);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session invalid: {0}")]
    SessionInvalid(String),

    #[error("session expired at epoch {max_epoch} (current epoch {current_epoch})")]
    SessionExpired { max_epoch: Epoch, current_epoch: Epoch },

    #[error("no identity token attached to the session")]
    MissingToken,

    #[error("invalid identity token: {0}")]
    InvalidToken(String),

    #[error("binding check failed: {0}")]
    Binding(#[from] BindingError),

    #[error("proof acquisition failed: {0}")]
    Prover(#[from] ProverError),

    #[error("operation sender {sender} is not the session address {address}")]
    SenderMismatch { sender: Address, address: Address },

    #[error("ledger rejected the transaction: {0}")]
    LedgerSubmission(String),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("an authorization attempt is already in flight")]
    AttemptInFlight,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("secret store: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// The user has to log in again: the stored session is unusable.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::SessionInvalid(_)
                | AuthError::SessionExpired { .. }
                | AuthError::MissingToken
                | AuthError::InvalidToken(_)
                | AuthError::Binding(_)
        )
    }

    /// Retrying the same user action later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Prover(ProverError::Transport(_)) => true,
            AuthError::Prover(ProverError::Service { status, .. }) => *status >= 500,
            AuthError::AttemptInFlight => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let binding = AuthError::from(BindingError::NonceMismatch {
            expected: "a".into(),
            found: "b".into(),
        });
        assert!(binding.requires_reauthentication());
        assert!(!binding.is_transient());

        let expired = AuthError::SessionExpired {
            max_epoch: 10,
            current_epoch: 11,
        };
        assert!(expired.requires_reauthentication());

        let unreachable = AuthError::from(ProverError::Transport("connection refused".into()));
        assert!(unreachable.is_transient());
        assert!(!unreachable.requires_reauthentication());

        let bad_request = AuthError::from(ProverError::Service {
            status: 400,
            body: "{\"error\":\"bad jwt\"}".into(),
        });
        assert!(!bad_request.is_transient());

        let ledger = AuthError::LedgerSubmission("insufficient funds".into());
        assert!(!ledger.is_transient());
        assert!(!ledger.requires_reauthentication());
    }

    #[test]
    fn test_service_body_kept_verbatim() {
        let err = ProverError::Service {
            status: 503,
            body: "upstream timeout".into(),
        };
        assert_eq!(err.to_string(), "proof service returned HTTP 503: upstream timeout");
    }
}
