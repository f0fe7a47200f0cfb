//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 同步引擎端到端测试：模拟上游 API + 内存存储

use crate::common::{club_json, config_for, course_json, setup_logging, TEST_TOKEN};
use chrono::{DateTime, Duration, Utc};
use coursecache::compact_time::{format_compact, parse_compact};
use coursecache::model::{CachedEntity, Entity, RunMetadata, UpdateType};
use coursecache::store::{DocumentStore, MemoryStore};
use coursecache::sync::{force_full_reseed, SyncEngine};
use coursecache::SyncError;
use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::json;
use std::sync::Arc;

#[path = "../common/mod.rs"]
mod common;

fn now() -> DateTime<Utc> {
    parse_compact("20250601T120000").unwrap()
}

fn mock_clubs(server: &MockServer, ids: &[u64]) {
    let clubs: Vec<_> = ids
        .iter()
        .map(|id| club_json(*id, &format!("Club {}", id)))
        .collect();
    server.mock(|when, then| {
        when.method(GET)
            .path("/clubs")
            .header("Authorization", TEST_TOKEN);
        then.status(200).json_body(json!(clubs));
    });
}

fn seeded_metadata(last_seeded: DateTime<Utc>) -> RunMetadata {
    let listing = Entity::from_value(json!({"ID": "1", "Name": "Club 1"})).unwrap();
    RunMetadata {
        last_seeded: Some(last_seeded),
        last_updated: Some(last_seeded),
        last_update_type: Some(UpdateType::Full),
        club_count: 2,
        course_count: 5,
        clubs_updated_last_run: 2,
        courses_updated_last_run: 5,
        clubs: vec![listing.summary()],
        ..Default::default()
    }
}

/// 首次运行：无元数据，执行全量刷新
///
/// 球会 1 有同一模板的三个版本（乱序），球会 2 有一条无模板记录。
#[tokio::test]
async fn test_full_run_scenario() {
    setup_logging();
    let server = MockServer::start();
    mock_clubs(&server, &[1, 2]);
    server.mock(|when, then| {
        when.method(GET)
            .path("/clubs/1/courses")
            .query_param("active", "1")
            .query_param("sort", "ActivationDate:1")
            .query_param("sortTee", "TotalLength:1")
            .query_param("changedsince", "20250101T000000");
        then.status(200).json_body(json!([
            course_json("t2", "X", "20250301T000000"),
            course_json("t3", "X", "20250501T000000"),
            course_json("t1", "X", "20250101T000000"),
        ]));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/clubs/2/courses")
            .query_param("changedsince", "20250101T000000");
        then.status(200)
            .json_body(json!([course_json("b1", "", "20250201T000000")]));
    });

    let store = Arc::new(MemoryStore::new());
    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();
    let summary = engine.run(now()).await.unwrap();

    assert_eq!(summary.update_type, UpdateType::Full);
    assert_eq!(summary.club_count, 2);
    assert_eq!(summary.course_count, 2);
    assert_eq!(summary.skipped_clubs, 0);

    let metadata = store.get_metadata().await.unwrap().unwrap();
    assert_eq!(metadata.last_update_type, Some(UpdateType::Full));
    assert_eq!(metadata.club_count, 2);
    assert_eq!(metadata.course_count, 2);
    assert_eq!(metadata.clubs_updated_last_run, 2);
    assert_eq!(metadata.last_seeded, Some(now()));
    assert_eq!(metadata.version, 2);
    let ids: Vec<_> = metadata.clubs.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);

    let club_a = store.get_entity("1").await.unwrap().unwrap();
    let course_ids: Vec<_> = club_a.courses.iter().map(|c| c.id.as_deref()).collect();
    assert_eq!(course_ids, vec![Some("t3")]);
    assert_eq!(club_a.info["Name"], json!("Club 1"));
    assert!(!club_a.info.contains_key("courses"));

    let club_b = store.get_entity("2").await.unwrap().unwrap();
    assert_eq!(club_b.courses.len(), 1);
    assert_eq!(club_b.courses[0].id.as_deref(), Some("b1"));
}

/// 增量运行：所有球会均无变更
#[tokio::test]
async fn test_incremental_all_empty_scenario() {
    setup_logging();
    let server = MockServer::start();
    mock_clubs(&server, &[1, 2, 3]);
    let last_seeded = now() - Duration::days(2);
    let courses = server.mock(|when, then| {
        when.method(GET)
            .path_contains("/courses")
            .query_param("changedsince", format_compact(&last_seeded));
        then.status(200).json_body(json!([]));
    });

    let store = Arc::new(
        MemoryStore::new()
            .with_metadata(seeded_metadata(last_seeded))
            .await,
    );
    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();
    let summary = engine.run(now()).await.unwrap();

    courses.assert_hits(3);
    assert_eq!(summary.update_type, UpdateType::Incremental);
    assert_eq!(summary.club_count, 0);
    assert_eq!(summary.course_count, 0);
    assert_eq!(summary.unchanged_clubs, 3);
    assert_eq!(store.entity_count(), 0);

    let metadata = store.get_metadata().await.unwrap().unwrap();
    assert_eq!(metadata.last_update_type, Some(UpdateType::Incremental));
    assert_eq!(metadata.clubs_updated_last_run, 0);
    assert_eq!(metadata.courses_updated_last_run, 0);
    assert_eq!(metadata.last_seeded, Some(now()));
    assert_eq!(metadata.club_count, 2);
    assert_eq!(metadata.course_count, 5);
    assert_eq!(metadata.clubs.len(), 1);
}

/// 增量运行只替换有变更的球会文档
#[tokio::test]
async fn test_incremental_replaces_changed_clubs_only() {
    let server = MockServer::start();
    mock_clubs(&server, &[1, 2]);
    server.mock(|when, then| {
        when.method(GET).path("/clubs/1/courses");
        then.status(200).json_body(json!([
            course_json("old", "T1", "20250101T000000"),
            course_json("new", "T1", "20250501T000000"),
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/clubs/2/courses");
        then.status(200).json_body(json!([]));
    });

    let untouched = CachedEntity::split(
        &Entity::from_value(json!({"ID": "2", "Name": "Club 2"})).unwrap(),
        now() - Duration::days(10),
    );
    let store = Arc::new(
        MemoryStore::new()
            .with_metadata(seeded_metadata(now() - Duration::days(1)))
            .await,
    );
    store.insert_entity("2", untouched.clone());

    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();
    let summary = engine.run(now()).await.unwrap();

    assert_eq!(summary.update_type, UpdateType::Incremental);
    assert_eq!(summary.club_count, 1);
    assert_eq!(summary.course_count, 1);

    let replaced = store.get_entity("1").await.unwrap().unwrap();
    assert_eq!(replaced.courses.len(), 1);
    assert_eq!(replaced.courses[0].id.as_deref(), Some("new"));
    assert_eq!(replaced.updated_at, now());
    assert_eq!(store.get_entity("2").await.unwrap().unwrap(), untouched);
}

/// 超过30天未播种时强制全量刷新
#[tokio::test]
async fn test_stale_seed_forces_full_refresh() {
    let server = MockServer::start();
    mock_clubs(&server, &[1]);
    let floor = server.mock(|when, then| {
        when.method(GET)
            .path("/clubs/1/courses")
            .query_param("changedsince", "20250101T000000");
        then.status(200)
            .json_body(json!([course_json("c1", "", "20250101T000000")]));
    });

    let store = Arc::new(
        MemoryStore::new()
            .with_metadata(seeded_metadata(now() - Duration::days(31)))
            .await,
    );
    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();
    let summary = engine.run(now()).await.unwrap();

    floor.assert();
    assert_eq!(summary.update_type, UpdateType::Full);
    let metadata = store.get_metadata().await.unwrap().unwrap();
    assert_eq!(metadata.club_count, 1);
    assert_eq!(metadata.clubs_updated_last_run, 1);
}

/// 元数据读取失败按不存在处理
#[tokio::test]
async fn test_metadata_read_failure_degrades_to_full() {
    let server = MockServer::start();
    mock_clubs(&server, &[1]);
    server.mock(|when, then| {
        when.method(GET).path("/clubs/1/courses");
        then.status(200)
            .json_body(json!([course_json("c1", "", "20250101T000000")]));
    });

    let store = Arc::new(MemoryStore::new());
    store.fail_metadata_reads(true);
    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();
    let summary = engine.run(now()).await.unwrap();

    assert_eq!(summary.update_type, UpdateType::Full);
    assert_eq!(store.entity_ids(), vec!["1"]);
}

/// 超过存储上限的球会被跳过
#[tokio::test]
async fn test_oversized_club_is_skipped() {
    let server = MockServer::start();
    mock_clubs(&server, &[1, 2]);
    let mut huge = course_json("big", "", "20250101T000000");
    huge["Notes"] = json!("x".repeat(1_100_000));
    server.mock(|when, then| {
        when.method(GET).path("/clubs/1/courses");
        then.status(200).json_body(json!([huge]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/clubs/2/courses");
        then.status(200)
            .json_body(json!([course_json("c2", "", "20250101T000000")]));
    });

    let store = Arc::new(MemoryStore::new());
    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();
    let summary = engine.run(now()).await.unwrap();

    assert_eq!(summary.skipped_clubs, 1);
    assert_eq!(summary.error_count, 0);
    assert_eq!(summary.club_count, 1);
    assert_eq!(store.entity_ids(), vec!["2"]);
    let metadata = store.get_metadata().await.unwrap().unwrap();
    assert_eq!(metadata.club_count, 1);
    assert_eq!(metadata.course_count, 1);
}

/// 批量写入失败：已提交的批次保留，元数据不写入
#[tokio::test]
async fn test_batch_failure_aborts_finalize() {
    let server = MockServer::start();
    mock_clubs(&server, &[1, 2, 3]);
    server.mock(|when, then| {
        when.method(GET).path_contains("/courses");
        then.status(200)
            .json_body(json!([course_json("c", "", "20250101T000000")]));
    });

    let store = Arc::new(MemoryStore::new());
    store.fail_batches_from(2);
    let mut config = config_for(&server);
    config.sync.batch_size = 1;
    let engine = SyncEngine::from_config_with_store(&config, store.clone()).unwrap();

    let err = engine.run(now()).await.unwrap_err();
    assert!(matches!(err, SyncError::PersistenceBatch { batch: 2, .. }));
    assert_eq!(store.entity_ids(), vec!["1"]);
    assert!(store.get_metadata().await.unwrap().is_none());
}

/// 上游单个球会失败不影响其他球会
#[tokio::test]
async fn test_upstream_error_for_one_club_is_recovered() {
    let server = MockServer::start();
    mock_clubs(&server, &[1, 2]);
    server.mock(|when, then| {
        when.method(GET).path("/clubs/1/courses");
        then.status(503).body("maintenance");
    });
    server.mock(|when, then| {
        when.method(GET).path("/clubs/2/courses");
        then.status(200)
            .json_body(json!([course_json("c2", "", "20250101T000000")]));
    });

    let store = Arc::new(MemoryStore::new());
    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();
    let summary = engine.run(now()).await.unwrap();

    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.club_count, 1);
    assert_eq!(store.entity_ids(), vec!["2"]);
}

/// 增量写入失败被吸收并计数
#[tokio::test]
async fn test_incremental_write_failure_is_recovered() {
    let server = MockServer::start();
    mock_clubs(&server, &[1, 2]);
    server.mock(|when, then| {
        when.method(GET).path_contains("/courses");
        then.status(200)
            .json_body(json!([course_json("c", "", "20250101T000000")]));
    });

    let store = Arc::new(
        MemoryStore::new()
            .with_metadata(seeded_metadata(now() - Duration::days(1)))
            .await,
    );
    store.fail_entity_write("1");
    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();
    let summary = engine.run(now()).await.unwrap();

    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.club_count, 1);
    assert_eq!(store.entity_ids(), vec!["2"]);
    let metadata = store.get_metadata().await.unwrap().unwrap();
    assert_eq!(metadata.clubs_updated_last_run, 1);
}

/// 实体列表失败是致命错误
#[tokio::test]
async fn test_entity_list_failure_is_fatal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/clubs");
        then.status(401).body("unauthorized");
    });

    let store = Arc::new(MemoryStore::new());
    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();

    let err = engine.run(now()).await.unwrap_err();
    assert!(matches!(err, SyncError::EntityList(_)));
    assert!(store.get_metadata().await.unwrap().is_none());
}

/// 强制重新播种后的下一次运行为全量
#[tokio::test]
async fn test_force_reseed_then_full_run() {
    let server = MockServer::start();
    mock_clubs(&server, &[1]);
    let floor = server.mock(|when, then| {
        when.method(GET)
            .path("/clubs/1/courses")
            .query_param("changedsince", "20250101T000000");
        then.status(200)
            .json_body(json!([course_json("c1", "", "20250101T000000")]));
    });

    let store = Arc::new(
        MemoryStore::new()
            .with_metadata(seeded_metadata(now() - Duration::days(1)))
            .await,
    );
    let metadata = force_full_reseed(store.clone()).await.unwrap();
    assert!(metadata.last_seeded.is_none());
    assert_eq!(
        metadata.last_update_type,
        Some(UpdateType::PendingFullReseed)
    );

    let engine = SyncEngine::from_config_with_store(&config_for(&server), store.clone()).unwrap();
    let summary = engine.run(now()).await.unwrap();

    floor.assert();
    assert_eq!(summary.update_type, UpdateType::Full);
}

/// 没有元数据时无法强制重新播种
#[tokio::test]
async fn test_force_reseed_without_metadata_fails() {
    let store = Arc::new(MemoryStore::new());
    assert!(matches!(
        force_full_reseed(store).await,
        Err(SyncError::MetadataWrite(_))
    ));
}

/// 同一存储上的第二次运行拿不到租约
#[tokio::test]
async fn test_lease_blocks_concurrent_run() {
    let server = MockServer::start();
    let store = Arc::new(MemoryStore::new());
    assert!(store
        .try_acquire_lease("other-run", std::time::Duration::from_secs(600))
        .await
        .unwrap());

    let mut config = config_for(&server);
    config.sync.lease.enabled = true;
    let engine = SyncEngine::from_config_with_store(&config, store.clone()).unwrap();

    assert!(matches!(
        engine.run(now()).await,
        Err(SyncError::LeaseUnavailable)
    ));
}
