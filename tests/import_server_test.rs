// ABOUTME: HTTP-level tests of the chunked import endpoint
// ABOUTME: Drives the router with in-memory sessions and an in-memory target table

use axum::body::{to_bytes, Body};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use axum::http::{Request, StatusCode};
use postgres_porter::import::{
    sha256_hex, ChunkProcessor, MemorySessionStore, MemoryTarget, TargetColumn,
};
use postgres_porter::server::{router, AppState};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn people() -> MemoryTarget {
    MemoryTarget::new().with_table(
        "public",
        "people",
        vec![
            TargetColumn::new("id", "integer", false),
            TargetColumn::new("name", "text", true),
        ],
    )
}

fn app(target: &MemoryTarget, tokens: Vec<String>) -> axum::Router {
    let processor = ChunkProcessor::new(
        Arc::new(MemorySessionStore::new(Duration::from_secs(60))),
        Arc::new(target.clone()),
        64 * 1024,
    );
    router(AppState::new(processor, tokens))
}

fn chunk_uri(session: &str, offset: u64, remainder_len: u64, eof: bool) -> String {
    format!(
        "/import?server=main&schema=public&subject=people&import_session_id={}\
         &format=auto&offset={}&remainder_len={}&eof={}",
        session, offset, remainder_len, eof
    )
}

async fn send(app: &axum::Router, uri: &str, body: &[u8]) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::from(body.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn remainder_bytes(json: &Value) -> Vec<u8> {
    STANDARD.decode(json["remainder"].as_str().unwrap()).unwrap()
}

fn ten_lines_and_a_partial() -> (Vec<u8>, &'static str) {
    let mut body = String::new();
    for i in 1..=10 {
        body.push_str(&format!("{},person {}\n", i, i));
    }
    let partial = "11,pers";
    body.push_str(partial);
    (body.into_bytes(), partial)
}

#[tokio::test]
async fn test_partial_trailing_line_becomes_remainder() {
    let target = people();
    let app = app(&target, Vec::new());
    let (body, partial) = ten_lines_and_a_partial();

    let (status, json) = send(&app, &chunk_uri("c", 0, 0, false), &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(remainder_bytes(&json), partial.as_bytes());
    assert_eq!(json["remainder_len"], partial.len() as u64);
    assert_eq!(json["offset"], body.len() as u64);
    assert_eq!(json["errors"], 0);
    assert_eq!(json["records"], 10);
    assert_eq!(json["state"], "STREAMING");
    assert_eq!(target.rows("public", "people").len(), 10);

    let offset = json["offset"].as_u64().unwrap();
    let (status, json) = send(
        &app,
        &chunk_uri("c", offset, partial.len() as u64, true),
        b"on 11\n",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "COMPLETE");
    assert_eq!(json["remainder_len"], 0);
    assert_eq!(
        target.rows("public", "people")[10],
        vec![Some("11".to_string()), Some("person 11".to_string())]
    );
}

#[tokio::test]
async fn test_remainder_keeps_split_character_bytes() {
    let target = people();
    let app = app(&target, Vec::new());

    let (status, json) = send(&app, &chunk_uri("u", 0, 0, false), b"1,ann\n2,caf\xc3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["remainder_len"], 6);
    assert_eq!(remainder_bytes(&json), b"2,caf\xc3");

    let offset = json["offset"].as_u64().unwrap();
    let (status, json) = send(&app, &chunk_uri("u", offset, 6, true), b"\xa9\n").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "COMPLETE");
    assert_eq!(
        target.rows("public", "people")[1],
        vec![Some("2".to_string()), Some("café".to_string())]
    );
}

#[tokio::test]
async fn test_unterminated_record_at_eof_truncates_session() {
    let target = people();
    let app = app(&target, Vec::new());

    let (_, first) = send(&app, &chunk_uri("d", 0, 0, false), b"1,ann\n2,\"bo").await;
    assert_eq!(first["errors"], 0);
    let offset = first["offset"].as_u64().unwrap();
    let remainder_len = first["remainder_len"].as_u64().unwrap();

    let (status, json) = send(
        &app,
        &chunk_uri("d", offset, remainder_len, true),
        b"b\n",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "TRUNCATED_ERROR");
    assert_eq!(json["errors"], 1);
    let entries = json["logEntries"].as_array().unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last["type"], "error");
    assert!(last["message"]
        .as_str()
        .unwrap()
        .contains("left unparsed at end of input"));
    assert!(last["time"].is_string());

    // Terminal sessions accept no further chunks
    let offset = json["offset"].as_u64().unwrap();
    let remainder_len = json["remainder_len"].as_u64().unwrap();
    let (status, _) = send(&app, &chunk_uri("d", offset, remainder_len, true), b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stall_reported_on_third_idle_chunk() {
    let target = people();
    let app = app(&target, Vec::new());

    let (_, first) = send(&app, &chunk_uri("e", 0, 0, false), b"1,ann\n2,b").await;
    let offset = first["offset"].as_u64().unwrap();
    let remainder_len = first["remainder_len"].as_u64().unwrap();
    let uri = chunk_uri("e", offset, remainder_len, false);

    for attempt in 1..=2 {
        let (status, json) = send(&app, &uri, b"").await;
        assert_eq!(status, StatusCode::OK, "attempt {}", attempt);
        assert_eq!(json["offset"], offset);
        assert_eq!(json["remainder_len"], remainder_len);
    }

    let (status, json) = send(&app, &uri, b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("no progress"));

    let progress = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/import/e")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(progress.status(), StatusCode::OK);
    let bytes = to_bytes(progress.into_body(), usize::MAX).await.unwrap();
    let progress: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(progress["state"], "STALLED_ERROR");
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_session_untouched() {
    let target = people();
    let app = app(&target, Vec::new());
    let body = b"1,ann\n";

    let uri = format!("{}&chunk_hash={}", chunk_uri("f", 0, 0, true), "00");
    let (status, json) = send(&app, &uri, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("checksum"));
    assert!(target.rows("public", "people").is_empty());

    let uri = format!("{}&chunk_hash={}", chunk_uri("f", 0, 0, true), sha256_hex(body));
    let (status, json) = send(&app, &uri, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["records"], 1);
}

#[tokio::test]
async fn test_missing_parameter_is_a_bad_request() {
    let app = app(&people(), Vec::new());
    let (status, json) = send(
        &app,
        "/import?subject=people&import_session_id=g&remainder_len=0",
        b"1,a\n",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("offset"));
}

#[tokio::test]
async fn test_bearer_token_required_when_configured() {
    let target = people();
    let app = app(&target, vec!["s3cret".to_string()]);

    let (status, json) = send(&app, &chunk_uri("h", 0, 0, true), b"1,a\n").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(chunk_uri("h", 0, 0, true))
                .header("Authorization", "Bearer s3cret")
                .body(Body::from("1,a\n"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(target.rows("public", "people").len(), 1);
}
