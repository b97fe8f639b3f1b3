//! Transaction authorization and execution.
//!
//! One attempt at a time: [`Executor::begin`] takes the single-flight guard
//! synchronously and hands back an [`Attempt`]; running it walks
//!
//! ```text
//! Idle → Building → ProofPending  → Submitting → Completed | Failed   (ephemeral key)
//!                 → WalletPending ─────────────→ Completed | Failed   (external wallet)
//! ```
//!
//! State is published on a `tokio::sync::watch` channel. Dropping an attempt
//! before it finishes releases the guard and records `Failed("cancelled")`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;
use zkm_core::{Address, TxDigest};

use crate::error::{AuthError, WalletError};
use crate::ledger::{interpret_submission, LedgerClient, SubmissionOutcome, WalletSigner};
use crate::operation::{self, AuthorizedOperation, Operation};
use crate::prover::{self, ProofService};
use crate::session::EphemeralSession;

pub const CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationState {
    Idle,
    Building,
    ProofPending,
    WalletPending,
    Submitting,
    Completed { digest: TxDigest },
    Failed { cause: String },
}

impl AuthorizationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthorizationState::Completed { .. } | AuthorizationState::Failed { .. }
        )
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal() && *self != AuthorizationState::Idle
    }
}

/// Which credential authorizes an attempt. Exactly one per attempt.
#[derive(Clone)]
pub enum ActiveCredential {
    Ephemeral(Arc<EphemeralSession>),
    External(Arc<dyn WalletSigner>),
}

impl ActiveCredential {
    fn path(&self) -> &'static str {
        match self {
            ActiveCredential::Ephemeral(_) => "ephemeral",
            ActiveCredential::External(_) => "wallet",
        }
    }
}

/// Drives authorization attempts against injected prover and ledger.
#[derive(Clone)]
pub struct Executor {
    prover: Arc<dyn ProofService>,
    ledger: Arc<dyn LedgerClient>,
    in_flight: Arc<AtomicBool>,
    state: Arc<watch::Sender<AuthorizationState>>,
}

impl Executor {
    pub fn new(prover: Arc<dyn ProofService>, ledger: Arc<dyn LedgerClient>) -> Self {
        let (state, _) = watch::channel(AuthorizationState::Idle);
        Self {
            prover,
            ledger,
            in_flight: Arc::new(AtomicBool::new(false)),
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthorizationState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AuthorizationState {
        self.state.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Claim the single-flight slot for a new attempt.
    ///
    /// Fails immediately with [`AuthError::AttemptInFlight`] while another
    /// attempt holds it; nothing is sent anywhere in that case.
    pub fn begin(
        &self,
        credential: ActiveCredential,
        operation: Operation,
    ) -> Result<Attempt, AuthError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(kind = operation.kind(), "rejected concurrent authorization attempt");
            return Err(AuthError::AttemptInFlight);
        }

        let id = Uuid::new_v4();
        tracing::info!(attempt = %id, path = credential.path(), kind = operation.kind(), "authorization attempt started");
        Ok(Attempt {
            id,
            credential,
            operation,
            prover: self.prover.clone(),
            ledger: self.ledger.clone(),
            guard: InFlightGuard {
                in_flight: self.in_flight.clone(),
                state: self.state.clone(),
            },
        })
    }

    /// `begin` followed by `run`.
    pub async fn execute(
        &self,
        credential: ActiveCredential,
        operation: Operation,
    ) -> Result<TxDigest, AuthError> {
        self.begin(credential, operation)?.run().await
    }
}

/// Releases the single-flight slot when the attempt ends, however it ends.
struct InFlightGuard {
    in_flight: Arc<AtomicBool>,
    state: Arc<watch::Sender<AuthorizationState>>,
}

impl InFlightGuard {
    fn set(&self, state: AuthorizationState) {
        tracing::debug!(?state, "authorization state");
        self.state.send_replace(state);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.state.borrow().is_in_flight() {
            tracing::warn!("authorization attempt abandoned");
            self.state.send_replace(AuthorizationState::Failed {
                cause: CANCELLED.to_string(),
            });
        }
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// One authorization attempt holding the single-flight slot.
pub struct Attempt {
    id: Uuid,
    credential: ActiveCredential,
    operation: Operation,
    prover: Arc<dyn ProofService>,
    ledger: Arc<dyn LedgerClient>,
    guard: InFlightGuard,
}

impl Attempt {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run the attempt to a terminal state.
    pub async fn run(self) -> Result<TxDigest, AuthError> {
        self.guard.set(AuthorizationState::Building);
        let result = match &self.credential {
            ActiveCredential::Ephemeral(session) => self.run_ephemeral(session).await,
            ActiveCredential::External(wallet) => self.run_wallet(wallet.as_ref()).await,
        };

        match &result {
            Ok(digest) => {
                tracing::info!(attempt = %self.id, %digest, "authorization completed");
                self.guard.set(AuthorizationState::Completed {
                    digest: digest.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(attempt = %self.id, error = %e, "authorization failed");
                let cause = match e {
                    AuthError::LedgerSubmission(cause) => cause.clone(),
                    other => other.to_string(),
                };
                self.guard.set(AuthorizationState::Failed { cause });
            }
        }
        result
    }

    fn check_sender(&self, address: Address) -> Result<(), AuthError> {
        let sender = self.operation.sender();
        if sender != address {
            return Err(AuthError::SenderMismatch { sender, address });
        }
        Ok(())
    }

    async fn run_ephemeral(&self, session: &EphemeralSession) -> Result<TxDigest, AuthError> {
        let address = session.derived_address().ok_or(AuthError::MissingToken)?;
        self.check_sender(address)?;
        let tx_bytes = self.operation.to_bytes()?;

        self.guard.set(AuthorizationState::ProofPending);
        let proof = prover::request_proof(self.prover.as_ref(), session).await?;

        let signature = operation::assemble_signature(&proof, session, &tx_bytes)?;
        let authorized = AuthorizedOperation::new(self.operation.clone(), tx_bytes, signature);

        self.guard.set(AuthorizationState::Submitting);
        let response = self
            .ledger
            .execute(authorized.tx_bytes(), &[authorized.signature().to_string()])
            .await
            .map_err(|e| AuthError::LedgerSubmission(e.0))?;

        match interpret_submission(&response) {
            SubmissionOutcome::Success { digest } => Ok(digest.unwrap_or_else(|| authorized.digest())),
            SubmissionOutcome::Failure { error } => Err(AuthError::LedgerSubmission(error)),
        }
    }

    /// The wallet signs and submits itself, so its response decides the
    /// outcome. A failure status in that response is reported as a
    /// [`WalletError`], same as a rejected request.
    async fn run_wallet(&self, wallet: &dyn WalletSigner) -> Result<TxDigest, AuthError> {
        self.check_sender(wallet.address())?;
        let tx_bytes = self.operation.to_bytes()?;

        self.guard.set(AuthorizationState::WalletPending);
        let response = wallet.sign_and_execute(&self.operation, &tx_bytes).await?;

        match interpret_submission(&response) {
            SubmissionOutcome::Success { digest } => {
                Ok(digest.unwrap_or_else(|| operation::local_digest(&tx_bytes)))
            }
            SubmissionOutcome::Failure { error } => Err(AuthError::Wallet(WalletError(error))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classification() {
        assert!(!AuthorizationState::Idle.is_terminal());
        assert!(!AuthorizationState::Idle.is_in_flight());
        assert!(AuthorizationState::Submitting.is_in_flight());
        assert!(AuthorizationState::WalletPending.is_in_flight());
        assert!(AuthorizationState::Failed {
            cause: "x".into()
        }
        .is_terminal());
        assert!(AuthorizationState::Completed {
            digest: TxDigest::from("d")
        }
        .is_terminal());
    }
}
