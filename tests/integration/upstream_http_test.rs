//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 上游 HTTP 客户端测试：请求形态、错误映射与令牌获取

use crate::common::{club_json, config_for, course_json, TEST_TOKEN};
use coursecache::upstream::{CatalogSource, HttpCatalogClient, HttpTokenProvider, TokenProvider};
use coursecache::SyncError;
use httpmock::Method::GET;
use httpmock::MockServer;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

fn token() -> SecretString {
    SecretString::new(TEST_TOKEN.into())
}

fn client(server: &MockServer) -> HttpCatalogClient {
    HttpCatalogClient::new(&config_for(server).upstream).unwrap()
}

#[tokio::test]
async fn test_list_entities_sends_raw_token_and_accept() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/clubs")
            .header("Authorization", TEST_TOKEN)
            .header("Accept", "application/json");
        then.status(200)
            .json_body(json!([club_json(1, "Aarhus GK"), club_json(2, "Odense GK")]));
    });

    let listing = client(&server).list_entities(&token()).await.unwrap();

    mock.assert();
    assert_eq!(listing.malformed, 0);
    let ids: Vec<_> = listing.entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(listing.entities[0].name, "Aarhus GK");
}

#[tokio::test]
async fn test_list_entities_counts_malformed_entries() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/clubs");
        then.status(200).json_body(json!([
            club_json(1, "Aarhus GK"),
            {"Name": "No identifier"},
            "not an object"
        ]));
    });

    let listing = client(&server).list_entities(&token()).await.unwrap();
    assert_eq!(listing.entities.len(), 1);
    assert_eq!(listing.malformed, 2);
}

#[tokio::test]
async fn test_list_entities_non_success_is_entity_list_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/clubs");
        then.status(500).body("upstream exploded");
    });

    match client(&server).list_entities(&token()).await {
        Err(SyncError::EntityList(reason)) => {
            assert!(reason.contains("HTTP 500"), "{}", reason);
            assert!(reason.contains("upstream exploded"), "{}", reason);
        }
        other => panic!("unexpected result: {:?}", other.map(|l| l.entities.len())),
    }
}

#[tokio::test]
async fn test_list_entities_rejects_non_array_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/clubs");
        then.status(200).json_body(json!({"error": "nope"}));
    });

    let err = client(&server).list_entities(&token()).await.unwrap_err();
    assert!(matches!(err, SyncError::EntityList(ref r) if r.contains("object")));
}

#[tokio::test]
async fn test_list_records_query_shape() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/clubs/417/courses")
            .query_param("active", "1")
            .query_param("sort", "ActivationDate:1")
            .query_param("sortTee", "TotalLength:1")
            .query_param("changedsince", "20250315T080000")
            .header("Authorization", TEST_TOKEN);
        then.status(200).json_body(json!([
            course_json("c1", "T1", "20250101T000000"),
            course_json("c2", "", "20250201T000000")
        ]));
    });

    let records = client(&server)
        .list_records("417", &token(), "20250315T080000")
        .await
        .unwrap();

    mock.assert();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].template_id, "T1");
    assert!(records[1].template_id.is_empty());
    assert_eq!(records[1].raw()["Holes"], json!([{"Number": 1, "Par": 4}]));
}

#[tokio::test]
async fn test_list_records_failure_names_the_entity() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/clubs/9/courses");
        then.status(404).body("unknown club");
    });

    let err = client(&server)
        .list_records("9", &token(), "20250101T000000")
        .await
        .unwrap_err();
    match err {
        SyncError::PerEntityFetch { entity_id, reason } => {
            assert_eq!(entity_id, "9");
            assert!(reason.contains("HTTP 404"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_base_url_trailing_slash_is_trimmed() {
    let server = MockServer::start();
    let mut config = config_for(&server).upstream;
    config.base_url = format!("{}/", server.base_url());
    let client = HttpCatalogClient::new(&config).unwrap();
    assert_eq!(client.clubs_url(), format!("{}/clubs", server.base_url()));
}

#[tokio::test]
async fn test_token_body_is_trimmed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/secret");
        then.status(200).body("  Basic abc123\n");
    });

    let provider = HttpTokenProvider::new(server.url("/secret"), Duration::from_secs(5)).unwrap();
    let token = provider.fetch_token().await.unwrap();
    assert_eq!(token.expose_secret(), "Basic abc123");
}

#[tokio::test]
async fn test_blank_token_is_rejected() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/secret");
        then.status(200).body(" \n ");
    });

    let provider = HttpTokenProvider::new(server.url("/secret"), Duration::from_secs(5)).unwrap();
    assert!(matches!(
        provider.fetch_token().await,
        Err(SyncError::TokenFetch(_))
    ));
}

#[tokio::test]
async fn test_token_http_error_is_token_fetch() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/secret");
        then.status(403);
    });

    let provider = HttpTokenProvider::new(server.url("/secret"), Duration::from_secs(5)).unwrap();
    assert!(matches!(
        provider.fetch_token().await,
        Err(SyncError::TokenFetch(_))
    ));
}
