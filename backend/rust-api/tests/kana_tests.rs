use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use std::collections::HashSet;

mod common;

use common::TestApp;

#[tokio::test]
async fn test_kana_table_lists_both_scripts() {
    let app = TestApp::new();

    let response = app
        .send(Request::get("/api/kana").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=86400"
    );

    let (_, body) = app.get("/api/kana", None).await;
    let hiragana = body["hiragana"].as_array().unwrap();
    let katakana = body["katakana"].as_array().unwrap();
    assert_eq!(hiragana.len(), katakana.len());
    assert_eq!(hiragana[0]["romaji"], "a");
    assert_eq!(hiragana[0]["kana"], "あ");
    assert_eq!(katakana[0]["kana"], "ア");
}

#[tokio::test]
async fn test_random_kana_defaults_to_twenty_hiragana() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/kana/random", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 20);

    let (_, table) = app.get("/api/kana", None).await;
    let hiragana: HashSet<&str> = table["hiragana"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["kana"].as_str().unwrap())
        .collect();
    let picked = body["kana"].as_array().unwrap();
    let romaji: HashSet<&str> = picked
        .iter()
        .map(|item| item["romaji"].as_str().unwrap())
        .collect();
    assert_eq!(romaji.len(), 20);
    assert!(picked
        .iter()
        .all(|item| hiragana.contains(item["kana"].as_str().unwrap())));
}

#[tokio::test]
async fn test_random_kana_count_and_script() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/kana/random?type=katakana&count=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 5);

    let (status, body) = app.get("/api/kana/random?type=mixed&count=109", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, table) = app.get("/api/kana", None).await;
    assert_eq!(body["count"], table["hiragana"].as_array().unwrap().len());
}

#[tokio::test]
async fn test_random_kana_rejects_bad_parameters() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/kana/random?count=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "count must be between 1 and 109");

    let (status, _) = app.get("/api/kana/random?count=110", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/api/kana/random?type=kanji", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
