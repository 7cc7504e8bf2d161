use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use serde_json::json;
use std::sync::Arc;

mod common;

use common::{FakeAi, TestApp, PASSWORD};
use nihongo_api::services::email_service::Notification;

#[tokio::test]
async fn test_admin_routes_reject_non_admins() {
    let mut app = TestApp::new();

    let (status, _) = app.get("/api/admin/users", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.user_token("kenji").await;
    let (status, _) = app.get("/api/admin/users", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/admin/cache/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_list_users_hides_password_hashes() {
    let mut app = TestApp::new();
    let admin = app.admin_token().await;
    app.user_token("kenji").await;

    let (status, users) = app.get("/api/admin/users", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users["total"], 2);
    for user in users["items"].as_array().unwrap() {
        assert!(user.get("password_hash").is_none());
        assert!(user["email"].is_string());
    }
}

#[tokio::test]
async fn test_delete_user_removes_account() {
    let mut app = TestApp::new();
    let admin = app.admin_token().await;
    let kenji = app.user_token("kenji").await;
    app.post(
        "/api/scores/update",
        json!({ "game_type": "quiz", "score": 5 }),
        Some(&kenji),
    )
    .await;

    let user = app
        .state
        .stores
        .users
        .find_by_email("kenji@example.com")
        .await
        .unwrap()
        .unwrap();

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/admin/users/{}", user.id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .post(
            "/api/auth/login",
            json!({ "email": "kenji@example.com", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let best = app.state.stores.scores.best(&user.id).await.unwrap();
    assert!(best.is_empty());

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/admin/users/{}", user.id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_cannot_delete_self() {
    let mut app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, me) = app.get("/api/auth/me", Some(&admin)).await;

    let (status, body) = app
        .request(
            Method::DELETE,
            &format!("/api/admin/users/{}", me["id"].as_str().unwrap()),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You cannot delete your own account");
}

#[tokio::test]
async fn test_admin_resends_verification_for_unverified_users() {
    let mut app = TestApp::new();
    let admin = app.admin_token().await;

    app.post(
        "/api/auth/register",
        json!({ "username": "yuki", "email": "yuki@example.com", "password": PASSWORD }),
        None,
    )
    .await;
    app.last_email();
    let yuki = app
        .state
        .stores
        .users
        .find_by_email("yuki@example.com")
        .await
        .unwrap()
        .unwrap();

    let (status, _) = app
        .post(
            &format!("/api/admin/users/{}/resend-verification", yuki.id),
            json!({}),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(matches!(
        app.last_email(),
        Some(Notification::VerificationLink { ref to, .. }) if to == "yuki@example.com"
    ));

    let (_, me) = app.get("/api/auth/me", Some(&admin)).await;
    let (status, body) = app
        .post(
            &format!(
                "/api/admin/users/{}/resend-verification",
                me["id"].as_str().unwrap()
            ),
            json!({}),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User is already verified");
}

#[tokio::test]
async fn test_hint_cache_management() {
    let ai = Arc::new(FakeAi::default());
    let mut app = TestApp::with_ai(ai.clone());
    let admin = app.admin_token().await;
    let vocab = app.seed("猫", "ねこ", "cat", "").await;

    app.post(
        "/api/quiz/hint",
        json!({ "vocabulary_id": vocab.id, "mode": "to_english" }),
        None,
    )
    .await;

    let (status, hints) = app.get("/api/admin/cache/hints", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hints["total"], 1);
    let id = hints["items"][0]["id"].as_str().unwrap().to_string();

    let (status, edited) = app
        .request(
            Method::PUT,
            &format!("/api/admin/cache/hints/{}", id),
            Some(json!({ "hint": "Think of a pet that purrs." })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["hint"], "Think of a pet that purrs.");

    // edited text is what players get, without a new provider call
    let (_, hint) = app
        .post(
            "/api/quiz/hint",
            json!({ "vocabulary_id": vocab.id, "mode": "to_english" }),
            None,
        )
        .await;
    assert_eq!(hint["hint"], "Think of a pet that purrs.");
    assert_eq!(ai.hint_calls(), 1);

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/admin/cache/hints/{}", id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/admin/cache/hints/{}", id),
            Some(json!({ "hint": "again" })),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Cached hint not found");
}

#[tokio::test]
async fn test_tts_cache_management() {
    let mut app = TestApp::with_ai(Arc::new(FakeAi::default()));
    let admin = app.admin_token().await;

    for text in ["ねこ", "いぬ"] {
        app.post("/api/quiz/tts", json!({ "text": text }), None).await;
    }

    let (_, stats) = app.get("/api/admin/cache/stats", Some(&admin)).await;
    assert_eq!(stats["tts_count"], 2);
    assert_eq!(stats["hint_count"], 0);

    let (status, entries) = app.get("/api/admin/cache/tts", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries["total"], 2);
    assert!(entries["items"][0].get("audio").is_none());
    let id = entries["items"][0]["id"].as_str().unwrap().to_string();
    let text = entries["items"][0]["text"].as_str().unwrap().to_string();

    let response = app
        .send(
            Request::builder()
                .uri(format!("/api/admin/cache/tts/{}/audio", id))
                .header(header::AUTHORIZATION, format!("Bearer {}", admin))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/mpeg"
    );
    let audio = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&audio[..], format!("ID3{}", text).as_bytes());

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/admin/cache/tts/{}", id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(Method::DELETE, "/api/admin/cache/tts", None, Some(&admin))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, stats) = app.get("/api/admin/cache/stats", Some(&admin)).await;
    assert_eq!(stats, json!({ "hint_count": 0, "tts_count": 0, "tts_total_bytes": 0 }));
}

#[tokio::test]
async fn test_invitation_lifecycle() {
    let mut app = TestApp::new();
    let admin = app.admin_token().await;

    let (status, invitation) = app
        .post(
            "/api/admin/invitations",
            json!({ "email": " Yuki@Example.com " }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invitation["email"], "yuki@example.com");
    assert_eq!(invitation["accepted"], false);
    assert_eq!(invitation["invited_by_username"], "sensei");
    assert!(invitation.get("token_hash").is_none());

    match app.last_email() {
        Some(Notification::Invitation { to, inviter, link }) => {
            assert_eq!(to, "yuki@example.com");
            assert_eq!(inviter, "sensei");
            assert!(link.starts_with(
                "http://localhost:3000/register?email=yuki%40example.com&invitation_token="
            ));
        }
        other => panic!("unexpected notification: {:?}", other),
    }

    let (status, body) = app
        .post(
            "/api/admin/invitations",
            json!({ "email": "yuki@example.com" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "An active invitation already exists for this email"
    );

    let (status, list) = app.get("/api/admin/invitations", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["id"], invitation["id"]);
}

#[tokio::test]
async fn test_invitation_token_registers_once_for_its_address() {
    let mut app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, invitation) = app
        .post(
            "/api/admin/invitations",
            json!({ "email": "yuki@example.com" }),
            Some(&admin),
        )
        .await;
    let token = app.invitation_token();

    let (status, body) = app
        .post(
            "/api/auth/register",
            json!({
                "username": "mallory",
                "email": "mallory@example.com",
                "password": PASSWORD,
                "invitation_token": token,
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email does not match invitation");

    let (status, _) = app
        .post(
            "/api/auth/register",
            json!({
                "username": "yuki",
                "email": "yuki@example.com",
                "password": PASSWORD,
                "invitation_token": token,
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, list) = app.get("/api/admin/invitations", Some(&admin)).await;
    assert_eq!(list["items"][0]["accepted"], true);
    assert!(list["items"][0]["accepted_at"].is_string());

    let (status, body) = app
        .post(
            "/api/auth/register",
            json!({
                "username": "yuki2",
                "email": "yuki2@example.com",
                "password": PASSWORD,
                "invitation_token": token,
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or expired invitation");

    let id = invitation["id"].as_str().unwrap();
    let (status, body) = app
        .post(
            &format!("/api/admin/invitations/{}/resend", id),
            json!({}),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "This invitation has already been accepted");

    let (status, body) = app
        .post(
            "/api/admin/invitations",
            json!({ "email": "yuki@example.com" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "This email address is already registered");
}

#[tokio::test]
async fn test_resent_invitation_replaces_the_old_link() {
    let mut app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, invitation) = app
        .post(
            "/api/admin/invitations",
            json!({ "email": "yuki@example.com" }),
            Some(&admin),
        )
        .await;
    let old_token = app.invitation_token();
    let id = invitation["id"].as_str().unwrap();

    let (status, renewed) = app
        .post(
            &format!("/api/admin/invitations/{}/resend", id),
            json!({}),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renewed["id"], invitation["id"]);
    let new_token = app.invitation_token();
    assert_ne!(new_token, old_token);

    let register = |token: String| {
        json!({
            "username": "yuki",
            "email": "yuki@example.com",
            "password": PASSWORD,
            "invitation_token": token,
        })
    };
    let (status, _) = app
        .post("/api/auth/register", register(old_token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .post("/api/auth/register", register(new_token), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_delete_invitation() {
    let mut app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, invitation) = app
        .post(
            "/api/admin/invitations",
            json!({ "email": "yuki@example.com" }),
            Some(&admin),
        )
        .await;
    let uri = format!(
        "/api/admin/invitations/{}",
        invitation["id"].as_str().unwrap()
    );

    let (status, _) = app.request(Method::DELETE, &uri, None, Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.request(Method::DELETE, &uri, None, Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Invitation not found");

    let (_, list) = app.get("/api/admin/invitations", Some(&admin)).await;
    assert_eq!(list["total"], 0);
}

#[tokio::test]
async fn test_invitations_are_admin_only() {
    let mut app = TestApp::new();
    let token = app.user_token("kenji").await;

    let (status, _) = app.get("/api/admin/invitations", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .post(
            "/api/admin/invitations",
            json!({ "email": "yuki@example.com" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.last_email().is_none());
}
