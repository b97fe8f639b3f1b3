//! Ledger and external wallet seams, plus submission result normalization.

use async_trait::async_trait;
use serde_json::Value;
use zkm_core::{Address, TxDigest};

use crate::error::{LedgerTransportError, WalletError};
use crate::operation::Operation;

/// Submits signed transactions to the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Execute `tx_bytes` with the given serialized signatures and return the
    /// node's raw response.
    async fn execute(
        &self,
        tx_bytes: &[u8],
        signatures: &[String],
    ) -> Result<Value, LedgerTransportError>;
}

/// An externally custodied signing agent (browser or hardware wallet).
///
/// The wallet signs and submits on its own; the response it returns is the
/// only record of the outcome.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn sign_and_execute(
        &self,
        operation: &Operation,
        tx_bytes: &[u8],
    ) -> Result<Value, WalletError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Success { digest: Option<TxDigest> },
    Failure { error: String },
}

/// Normalize the result shapes returned by nodes and wallets.
///
/// Checked in order: `effects.status.status`, a top-level `status`, a
/// JSON-RPC style `error`, then the bare presence of a digest.
pub fn interpret_submission(response: &Value) -> SubmissionOutcome {
    let digest = find_digest(response);

    let effects_status = response
        .get("effects")
        .and_then(|effects| effects.get("status"));
    if let Some(status) = effects_status.and_then(|s| s.get("status")).and_then(Value::as_str) {
        return classify(status, effects_status.and_then(|s| s.get("error")), digest);
    }

    if let Some(status) = response.get("status").and_then(Value::as_str) {
        return classify(status, response.get("error"), digest);
    }

    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        return SubmissionOutcome::Failure {
            error: error_message(error),
        };
    }

    if digest.is_some() {
        return SubmissionOutcome::Success { digest };
    }

    SubmissionOutcome::Failure {
        error: format!("unrecognized submission response: {response}"),
    }
}

fn classify(status: &str, error: Option<&Value>, digest: Option<TxDigest>) -> SubmissionOutcome {
    if status.eq_ignore_ascii_case("success") {
        SubmissionOutcome::Success { digest }
    } else {
        SubmissionOutcome::Failure {
            error: error
                .filter(|e| !e.is_null())
                .map(error_message)
                .unwrap_or_else(|| format!("transaction {status}")),
        }
    }
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

fn find_digest(response: &Value) -> Option<TxDigest> {
    response
        .get("digest")
        .or_else(|| response.get("effects").and_then(|e| e.get("transactionDigest")))
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .map(TxDigest::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effects_status_success() {
        let outcome = interpret_submission(&json!({
            "digest": "9xQz",
            "effects": {"status": {"status": "success"}}
        }));
        assert_eq!(
            outcome,
            SubmissionOutcome::Success {
                digest: Some(TxDigest::from("9xQz"))
            }
        );
    }

    #[test]
    fn test_effects_status_failure_uses_ledger_error() {
        let outcome = interpret_submission(&json!({
            "digest": "9xQz",
            "effects": {"status": {"status": "failure", "error": "insufficient funds"}}
        }));
        assert_eq!(
            outcome,
            SubmissionOutcome::Failure {
                error: "insufficient funds".into()
            }
        );
    }

    #[test]
    fn test_failure_without_error_text() {
        let outcome = interpret_submission(&json!({"effects": {"status": {"status": "failure"}}}));
        assert_eq!(
            outcome,
            SubmissionOutcome::Failure {
                error: "transaction failure".into()
            }
        );
    }

    #[test]
    fn test_top_level_status() {
        assert_eq!(
            interpret_submission(&json!({"status": "success", "digest": "d1"})),
            SubmissionOutcome::Success {
                digest: Some(TxDigest::from("d1"))
            }
        );
        assert_eq!(
            interpret_submission(&json!({"status": "failure", "error": "object locked"})),
            SubmissionOutcome::Failure {
                error: "object locked".into()
            }
        );
    }

    #[test]
    fn test_bare_digest_means_success() {
        // wallets often return effects as an opaque base64 blob
        let outcome = interpret_submission(&json!({"digest": "abc", "effects": "AQID"}));
        assert_eq!(
            outcome,
            SubmissionOutcome::Success {
                digest: Some(TxDigest::from("abc"))
            }
        );
    }

    #[test]
    fn test_rpc_error_object() {
        let outcome = interpret_submission(&json!({
            "error": {"code": -32002, "message": "Transaction validator signing failed"}
        }));
        assert_eq!(
            outcome,
            SubmissionOutcome::Failure {
                error: "Transaction validator signing failed".into()
            }
        );
    }

    #[test]
    fn test_unrecognized_shape() {
        match interpret_submission(&json!({"ok": true})) {
            SubmissionOutcome::Failure { error } => assert!(error.contains("unrecognized")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(matches!(
            interpret_submission(&json!({"digest": ""})),
            SubmissionOutcome::Failure { .. }
        ));
    }

    #[test]
    fn test_digest_from_effects() {
        let outcome = interpret_submission(&json!({
            "effects": {"status": {"status": "success"}, "transactionDigest": "fx"}
        }));
        assert_eq!(
            outcome,
            SubmissionOutcome::Success {
                digest: Some(TxDigest::from("fx"))
            }
        );
    }
}
