mod common;

use axum::http::{Method, StatusCode};
use common::TestServer;
use serde_json::json;

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::new();
    let (status, body) = server.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let server = TestServer::new();

    let (status, body) = server.request(Method::GET, "/sessions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");

    let (status, _) = server.get("/me", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_login_and_me() {
    let server = TestServer::new();

    let (status, body) = server
        .request(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({ "name": "Ana", "email": "ana@neurocom.test", "password": "s3nha" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["tier"], "free");
    assert!(body["token"].as_str().is_some());

    let (status, body) = server
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ana@neurocom.test", "password": "s3nha" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = server.get("/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ana@neurocom.test");
    assert_eq!(body["user"]["messages_sent_this_month"], 0);
}

#[tokio::test]
async fn wrong_password_and_duplicate_email_are_refused() {
    let server = TestServer::new();
    let signup = json!({ "email": "bia@neurocom.test", "password": "certa" });

    let (status, _) = server
        .request(Method::POST, "/auth/signup", None, Some(signup.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = server
        .request(Method::POST, "/auth/signup", None, Some(signup))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    let (status, body) = server
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "bia@neurocom.test", "password": "errada" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["erro"], "Credenciais inválidas");
}

#[tokio::test]
async fn token_for_a_deleted_account_is_user_not_found() {
    let server = TestServer::new();
    let token = server
        .state
        .jwt
        .issue(uuid::Uuid::new_v4(), "fantasma@neurocom.test")
        .unwrap();

    let (status, body) = server.get("/me", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "user_not_found");

    let (status, _) = server.post("/schedule", &token, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
