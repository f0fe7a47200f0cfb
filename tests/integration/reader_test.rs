//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 缓存读取器测试：读取同步运行写入的文档

use crate::common::{club_json, config_for, course_json};
use chrono::{DateTime, Duration, Utc};
use coursecache::compact_time::parse_compact;
use coursecache::config::ReaderConfig;
use coursecache::store::{DocumentStore, MemoryStore};
use coursecache::{CacheReader, SyncEngine};
use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::json;
use std::sync::Arc;

#[path = "../common/mod.rs"]
mod common;

fn now() -> DateTime<Utc> {
    parse_compact("20250601T120000").unwrap()
}

async fn seeded_store() -> Arc<MemoryStore> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/clubs");
        then.status(200)
            .json_body(json!([club_json(1, "Aarhus GK"), club_json(2, "Odense GK")]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/clubs/1/courses");
        then.status(200).json_body(json!([
            course_json("current", "", "20250101T000000"),
            course_json("upcoming", "", "20250604T000000"),
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/clubs/2/courses");
        then.status(200)
            .json_body(json!([course_json("only", "T1", "20250301T000000")]));
    });

    let store = Arc::new(MemoryStore::new());
    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();
    engine.run(now()).await.unwrap();
    store
}

#[tokio::test]
async fn test_reader_lists_clubs_from_metadata() {
    let store = seeded_store().await;
    let reader = CacheReader::new(store, &ReaderConfig::default());

    let clubs = reader.list_clubs().await.unwrap();
    let names: Vec<_> = clubs.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Aarhus GK", "Odense GK"]);
}

#[tokio::test]
async fn test_club_courses_hides_future_activations() {
    let store = seeded_store().await;
    let reader = CacheReader::new(store, &ReaderConfig::default());

    let document = reader.club_document("1").await.unwrap().unwrap();
    assert_eq!(document.courses.len(), 2);

    let today = reader.club_courses("1", now()).await.unwrap().unwrap();
    let ids: Vec<_> = today.iter().filter_map(|c| c.id.as_deref()).collect();
    assert_eq!(ids, vec!["current"]);

    let later = reader
        .club_courses("1", now() + Duration::days(4))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(later.len(), 2);
}

#[tokio::test]
async fn test_unknown_club_is_none() {
    let store = seeded_store().await;
    let reader = CacheReader::new(store, &ReaderConfig::default());
    assert!(reader.club_courses("404", now()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalidate_picks_up_new_documents() {
    let store = seeded_store().await;
    let reader = CacheReader::new(store.clone(), &ReaderConfig::default());

    let before = reader.club_document("2").await.unwrap().unwrap();
    assert_eq!(before.courses.len(), 1);

    let mut replaced = (*before).clone();
    replaced.courses.clear();
    store.put_entity("2", &replaced).await.unwrap();

    // 内存缓存仍返回旧文档
    let cached = reader.club_document("2").await.unwrap().unwrap();
    assert_eq!(cached.courses.len(), 1);

    reader.invalidate();
    let fresh = reader.club_document("2").await.unwrap().unwrap();
    assert!(fresh.courses.is_empty());
}
