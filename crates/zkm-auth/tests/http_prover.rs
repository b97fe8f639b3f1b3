//! HttpProver against a local axum server standing in for the proof service.

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zkm_auth::jwt::encode_unsigned;
use zkm_auth::{request_proof, AuthError, CredentialManager, EphemeralSession, HttpProver, ProverError};
use zkm_secrets::MemoryStore;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1")
}

fn bound_session() -> EphemeralSession {
    let manager = CredentialManager::new(Arc::new(MemoryStore::new()), 2);
    let mut session = manager.create_session(20).unwrap();
    let jwt = encode_unsigned(&json!({"sub": "user-1", "aud": "client-1", "nonce": session.nonce()}));
    manager.attach_token(&mut session, &jwt).unwrap();
    session
}

fn prover(url: &str) -> HttpProver {
    HttpProver::new(url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn proof_is_passed_through_unmodified() {
    let received = Arc::new(Mutex::new(None::<Value>));
    let seen = received.clone();
    let app = Router::new().route(
        "/v1",
        post(move |Json(body): Json<Value>| {
            let seen = seen.clone();
            async move {
                *seen.lock().unwrap() = Some(body);
                Json(json!({
                    "proofPoints": {"a": ["1", "2", "1"], "b": [["3", "4"]], "c": ["5"]},
                    "issBase64Details": {"value": "wiaXNzIjoiaHR0cHM6Ly9", "indexMod4": 2},
                    "headerBase64": "eyJhbGciOiJSUzI1NiJ9"
                }))
            }
        }),
    );
    let url = serve(app).await;
    let session = bound_session();

    let proof = request_proof(&prover(&url), &session).await.unwrap();
    assert_eq!(proof.0["issBase64Details"]["indexMod4"], json!(2));
    assert_eq!(proof.0["proofPoints"]["b"][0][1], json!("4"));

    let body = received.lock().unwrap().take().unwrap();
    assert_eq!(body["maxEpoch"], json!(22));
    assert_eq!(body["keyClaimName"], json!("sub"));
    assert_eq!(body["jwtRandomness"], json!(session.randomness_decimal()));
    assert_eq!(body["jwt"], json!(session.identity_token().unwrap().raw()));
    assert!(body["extendedEphemeralPublicKey"]
        .as_str()
        .unwrap()
        .chars()
        .all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn service_error_carries_raw_body() {
    let app = Router::new().route(
        "/v1",
        post(|| async { (StatusCode::BAD_REQUEST, "{\"error\":\"Invalid nonce\"}") }),
    );
    let url = serve(app).await;

    let err = request_proof(&prover(&url), &bound_session())
        .await
        .unwrap_err();
    match err {
        AuthError::Prover(ProverError::Service { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "{\"error\":\"Invalid nonce\"}");
        }
        other => panic!("expected Service error, got: {other:?}"),
    }
}

#[tokio::test]
async fn non_object_response_is_malformed() {
    let app = Router::new()
        .route("/v1", post(|| async { "proof goes here" }))
        .route("/v1/array", post(|| async { Json(json!([1, 2, 3])) }));
    let url = serve(app).await;
    let session = bound_session();

    let err = request_proof(&prover(&url), &session).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Prover(ProverError::Malformed(ref body)) if body == "proof goes here"
    ));

    let err = request_proof(&prover(&format!("{url}/array")), &session)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Prover(ProverError::Malformed(_))));
}

#[tokio::test]
async fn slow_service_times_out() {
    let app = Router::new().route(
        "/v1",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({}))
        }),
    );
    let url = serve(app).await;
    let prover = HttpProver::new(url, Duration::from_millis(200)).unwrap();

    let err = request_proof(&prover, &bound_session()).await.unwrap_err();
    assert!(matches!(err, AuthError::Prover(ProverError::Transport(_))));
    assert!(err.is_transient());
}

#[tokio::test]
async fn unreachable_service_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = request_proof(&prover(&format!("http://{addr}/v1")), &bound_session())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Prover(ProverError::Transport(_))));
}
