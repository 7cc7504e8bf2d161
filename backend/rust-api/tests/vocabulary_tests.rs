use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use serde_json::json;

mod common;

use common::TestApp;

#[tokio::test]
async fn test_list_paginates_and_searches() {
    let app = TestApp::new();
    for i in 0..25 {
        app.seed(&format!("語{}", i), "ご", &format!("word {}", i), "noun")
            .await;
    }
    app.seed("猫", "ねこ", "cat", "animals").await;

    let (status, page) = app.get("/api/vocabulary?page=2&page_size=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 26);
    assert_eq!(page["page"], 2);
    assert_eq!(page["page_size"], 10);
    assert_eq!(page["total_pages"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 10);

    let (_, found) = app.get("/api/vocabulary?search=CAT", None).await;
    assert_eq!(found["total"], 1);
    assert_eq!(found["items"][0]["expression"], "猫");

    let (_, tagged) = app.get("/api/vocabulary?tags=animals", None).await;
    assert_eq!(tagged["total"], 1);

    let (status, _) = app.get("/api/vocabulary?page_size=500", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get("/api/vocabulary?page=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tags_are_unique_and_sorted() {
    let app = TestApp::new();
    app.seed("猫", "ねこ", "cat", "noun animals").await;
    app.seed("犬", "いぬ", "dog", "animals noun  JLPT-N5").await;
    app.seed("水", "みず", "water", "").await;

    let response = app
        .send(
            Request::builder()
                .uri("/api/vocabulary/tags")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=300"
    );

    let (_, tags) = app.get("/api/vocabulary/tags", None).await;
    assert_eq!(tags, json!(["JLPT-N5", "animals", "noun"]));
}

#[tokio::test]
async fn test_random_vocabulary_count_bounds() {
    let app = TestApp::new();
    for i in 0..5 {
        app.seed(&format!("語{}", i), "ご", "word", "").await;
    }

    let (status, items) = app.get("/api/vocabulary/random?count=3", None).await;
    assert_eq!(status, StatusCode::OK);
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 3);
    let mut ids: Vec<_> = items.iter().map(|v| v["id"].as_str().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);

    let (_, all) = app.get("/api/vocabulary/random?count=50", None).await;
    assert_eq!(all.as_array().unwrap().len(), 5);

    let (status, _) = app.get("/api/vocabulary/random?count=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get("/api/vocabulary/random?count=51", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_vocabulary() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/vocabulary/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Vocabulary not found");
}

#[tokio::test]
async fn test_admin_crud_lifecycle() {
    let mut app = TestApp::new();
    let token = app.admin_token().await;

    let (status, created) = app
        .post(
            "/api/vocabulary",
            json!({ "expression": "食べる", "reading": "たべる", "meaning": "to eat", "tags": "verb" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = app.get(&format!("/api/vocabulary/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["reading"], "たべる");

    let (status, updated) = app
        .request(
            Method::PUT,
            &format!("/api/vocabulary/{}", id),
            Some(json!({ "meaning": "to eat, eat" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["meaning"], "to eat, eat");
    assert_eq!(updated["expression"], "食べる");
    assert_eq!(updated["tags"], "verb");

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/vocabulary/{}", id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&format!("/api/vocabulary/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/vocabulary/{}", id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_validates_fields() {
    let mut app = TestApp::new();
    let token = app.admin_token().await;

    let (status, _) = app
        .post(
            "/api/vocabulary",
            json!({ "expression": "", "reading": "たべる", "meaning": "to eat" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_writes_require_admin() {
    let mut app = TestApp::new();
    let vocab = app.seed("猫", "ねこ", "cat", "").await;
    let body = json!({ "expression": "犬", "reading": "いぬ", "meaning": "dog" });

    let (status, _) = app.post("/api/vocabulary", body.clone(), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.user_token("kenji").await;
    let (status, body) = app.post("/api/vocabulary", body, Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Admin access required");

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/vocabulary/{}", vocab.id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // reads stay public
    let (status, _) = app.get(&format!("/api/vocabulary/{}", vocab.id), None).await;
    assert_eq!(status, StatusCode::OK);
}
