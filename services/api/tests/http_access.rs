mod common;

use axum::http::{Method, StatusCode};
use common::TestServer;
use neurocom_core::domain::{Resource, Tier};
use serde_json::json;

fn booking_body() -> serde_json::Value {
    json!({
        "starts_at": "2026-11-03T14:00:00Z",
        "ends_at": "2026-11-03T15:00:00Z",
        "notes": "Quero falar sobre foco"
    })
}

#[tokio::test]
async fn free_user_cannot_book_a_consultation() {
    let server = TestServer::new();
    let (user, token) = server.user(Tier::Free);

    let (status, body) = server.post("/schedule", &token, booking_body()).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "insufficient_tier");
    assert_eq!(body["plano_atual"], "free");
    assert_eq!(body["planos_permitidos"], json!(["intermediate", "full"]));
    assert!(server.store.user(user.id).unwrap().consultations_booked_this_month == 0);
}

#[tokio::test]
async fn intermediate_user_at_the_message_limit_is_refused() {
    let server = TestServer::new();
    let (user, token) = server.user(Tier::Intermediate);
    server.store.set_usage(user.id, Resource::Messages, 5);

    let (status, body) = server
        .post("/messages", &token, json!({ "text": "Olá, especialista" }))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "quota_exceeded");
    assert_eq!(body["limite"], 5);
    assert_eq!(body["usados"], 5);
    assert_eq!(body["plano_atual"], "intermediate");
    assert_eq!(server.store.user(user.id).unwrap().messages_sent_this_month, 5);
}

#[tokio::test]
async fn sending_a_message_consumes_quota_after_success() {
    let server = TestServer::new();
    let (user, token) = server.user(Tier::Intermediate);
    server.store.set_usage(user.id, Resource::Messages, 4);

    let (status, body) = server
        .post("/messages", &token, json!({ "text": "Preciso de ajuda" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"]["text"], "Preciso de ajuda");
    assert_eq!(body["message"]["status"], "pending");

    let (status, listing) = server.get("/messages", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["messages"].as_array().unwrap().len(), 1);
    assert_eq!(listing["limite_mensal"], 5);
    assert_eq!(listing["enviadas_mes"], 5);
    assert_eq!(listing["pode_enviar"], false);

    // The sixth message of the month is refused.
    let (status, _) = server
        .post("/messages", &token, json!({ "text": "Mais uma" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn empty_expert_message_is_rejected_without_consuming_quota() {
    let server = TestServer::new();
    let (user, token) = server.user(Tier::Intermediate);

    let (status, body) = server.post("/messages", &token, json!({ "text": "   " })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
    assert_eq!(server.store.user(user.id).unwrap().messages_sent_this_month, 0);
}

#[tokio::test]
async fn full_user_books_lists_and_cancels_without_refund() {
    let server = TestServer::new();
    let (user, token) = server.user(Tier::Full);

    let (status, body) = server.post("/schedule", &token, booking_body()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["booking"]["status"], "booked");
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    let (status, listing) = server.get("/schedule", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["bookings"].as_array().unwrap().len(), 1);
    assert_eq!(listing["limite_mensal"], serde_json::Value::Null);
    assert_eq!(listing["agendadas_mes"], 1);
    assert_eq!(listing["pode_agendar"], true);

    let (status, body) = server
        .request(
            Method::DELETE,
            &format!("/schedule/{}", booking_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["booking"]["status"], "canceled");
    assert_eq!(
        server.store.user(user.id).unwrap().consultations_booked_this_month,
        1
    );
}

#[tokio::test]
async fn cancelling_someone_elses_booking_is_not_found() {
    let server = TestServer::new();
    let (_, owner_token) = server.user(Tier::Full);
    let (_, other_token) = server.user(Tier::Full);

    let (_, body) = server.post("/schedule", &owner_token, booking_body()).await;
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    let (status, _) = server
        .request(
            Method::DELETE,
            &format!("/schedule/{}", booking_id),
            Some(&other_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn booking_must_end_after_it_starts() {
    let server = TestServer::new();
    let (_, token) = server.user(Tier::Full);

    let (status, body) = server
        .post(
            "/schedule",
            &token,
            json!({
                "starts_at": "2026-11-03T15:00:00Z",
                "ends_at": "2026-11-03T14:00:00Z"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn video_access_follows_the_content_level() {
    let server = TestServer::new();
    server.store.add_video("respiracao-avancada", "Respiração avançada", Tier::Full);
    let (_, free_token) = server.user(Tier::Free);
    let (_, full_token) = server.user(Tier::Full);

    let (status, body) = server.get("/videos/respiracao-avancada", &free_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["planos_permitidos"], json!(["full"]));
    assert_eq!(body["requer_plano"], "full");

    let (status, body) = server.get("/videos/respiracao-avancada", &full_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["video"]["slug"], "respiracao-avancada");
    assert_eq!(body["progress"], serde_json::Value::Null);
}

#[tokio::test]
async fn unknown_video_is_not_found() {
    let server = TestServer::new();
    let (_, token) = server.user(Tier::Free);

    let (status, body) = server.get("/videos/nao-existe", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["erro"], "Vídeo não encontrado");
}
