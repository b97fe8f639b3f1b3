//! zkm-auth: ephemeral-key authorization for marketplace operations
//!
//! Flow for a user signing in through an identity provider:
//!
//! 1. [`CredentialManager::create_session`] makes an ephemeral key, randomness
//!    and max epoch, persists them, and yields the OIDC nonce.
//! 2. The browser goes to [`oidc::authorization_url`]; the provider returns an
//!    id_token carrying that nonce ([`oidc::token_from_redirect`]).
//! 3. [`CredentialManager::load_session`] + [`CredentialManager::attach_token`]
//!    restore the session after the redirect and bind the token to it.
//! 4. [`Executor`] requests a proof, signs the operation with the ephemeral
//!    key, and submits it, or hands the operation to an external wallet.

pub mod binding;
pub mod error;
pub mod executor;
pub mod jwt;
pub mod ledger;
pub mod oidc;
pub mod operation;
pub mod prover;
pub mod session;

pub use binding::{derive_address, derive_address_seed, verify_binding, AddressSeed};
pub use error::{AuthError, BindingError, LedgerTransportError, ProverError, WalletError};
pub use executor::{ActiveCredential, Attempt, AuthorizationState, Executor};
pub use jwt::IdToken;
pub use ledger::{interpret_submission, LedgerClient, SubmissionOutcome, WalletSigner};
pub use operation::{AuthorizedOperation, Operation};
pub use prover::{request_proof, HttpProver, Proof, ProofRequest, ProofService};
pub use session::{compute_nonce, CredentialManager, EphemeralSession};
