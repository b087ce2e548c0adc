// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end sync reconciliation tests against a fake Strava.

use axum::http::StatusCode;
use serde_json::Value;
use strava_sync::error::AppError;

mod common;
use common::{remote_activity, test_app, test_app_with, FakeStrava, INITIAL_CREDENTIALS};

async fn stored_ids(app: &common::TestApp) -> Vec<i64> {
    let mut ids: Vec<i64> = app
        .state
        .db
        .all_activities()
        .await
        .unwrap()
        .iter()
        .map(|a| a.id)
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_merge_adds_only_unseen_ids() {
    // Seed id 100 through a first sync
    let fake = FakeStrava {
        activities: vec![remote_activity(100, 1)],
        ..FakeStrava::default()
    };
    let app = test_app(fake).await;
    assert_eq!(app.state.sync_service.fetch_and_merge().await.unwrap().added, 1);

    app.fake.lock().unwrap().activities = vec![
        remote_activity(102, 3),
        remote_activity(101, 2),
        remote_activity(100, 1),
    ];
    let report = app.state.sync_service.fetch_and_merge().await.unwrap();

    assert_eq!(report.added, 2);
    assert_eq!(report.fetched, 3);
    assert_eq!(stored_ids(&app).await, vec![100, 101, 102]);
}

#[tokio::test]
async fn test_second_sync_is_idempotent() {
    let fake = FakeStrava {
        activities: (1..=5).map(|id| remote_activity(id, id as u32)).collect(),
        ..FakeStrava::default()
    };
    let app = test_app(fake).await;

    let first = app.state.sync_service.fetch_and_merge().await.unwrap();
    let second = app.state.sync_service.fetch_and_merge().await.unwrap();

    assert_eq!(first.added, 5);
    assert_eq!(second.added, 0);
    assert_eq!(second.fetched, 5);
    assert_eq!(app.state.db.count_activities().await.unwrap(), 5);
}

#[tokio::test]
async fn test_existing_records_are_not_updated() {
    let fake = FakeStrava {
        activities: vec![remote_activity(7, 7)],
        ..FakeStrava::default()
    };
    let app = test_app(fake).await;
    app.state.sync_service.fetch_and_merge().await.unwrap();

    let mut renamed = remote_activity(7, 7);
    renamed["name"] = Value::from("Renamed on Strava");
    app.fake.lock().unwrap().activities = vec![renamed];
    app.state.sync_service.fetch_and_merge().await.unwrap();

    let stored = app.state.db.get_activity(7).await.unwrap().unwrap();
    assert_eq!(stored.name, "Activity 7");
}

#[tokio::test]
async fn test_malformed_record_rolls_back_whole_batch() {
    let mut malformed = remote_activity(3, 3);
    malformed.as_object_mut().unwrap().remove("name");

    let fake = FakeStrava {
        activities: vec![
            remote_activity(1, 1),
            remote_activity(2, 2),
            malformed,
            remote_activity(4, 4),
        ],
        ..FakeStrava::default()
    };
    let app = test_app(fake).await;

    let err = app.state.sync_service.fetch_and_merge().await.unwrap_err();

    assert!(matches!(err, AppError::Sync(_)), "got {:?}", err);
    assert_eq!(app.state.db.count_activities().await.unwrap(), 0);
}

#[tokio::test]
async fn test_stored_record_with_bad_field_is_skipped() {
    let fake = FakeStrava {
        activities: vec![remote_activity(100, 1)],
        ..FakeStrava::default()
    };
    let app = test_app(fake).await;
    app.state.sync_service.fetch_and_merge().await.unwrap();

    // Strava now serves a broken copy of the stored id alongside a new one
    let mut stale = remote_activity(100, 1);
    stale.as_object_mut().unwrap().remove("name");
    app.fake.lock().unwrap().activities = vec![remote_activity(101, 2), stale];

    let report = app.state.sync_service.fetch_and_merge().await.unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(report.fetched, 2);
    assert_eq!(stored_ids(&app).await, vec![100, 101]);
}

#[tokio::test]
async fn test_store_fault_rolls_back_whole_batch() {
    let mut negative = remote_activity(3, 3);
    negative["moving_time"] = Value::from(-5);

    let fake = FakeStrava {
        activities: vec![remote_activity(1, 1), remote_activity(2, 2), negative],
        ..FakeStrava::default()
    };
    let app = test_app(fake).await;

    let err = app.state.sync_service.fetch_and_merge().await.unwrap_err();

    assert!(matches!(err, AppError::Sync(_)), "got {:?}", err);
    assert!(stored_ids(&app).await.is_empty());
}

#[tokio::test]
async fn test_token_failure_aborts_before_fetch() {
    let fake = FakeStrava {
        refresh_status: StatusCode::UNAUTHORIZED,
        activities: vec![remote_activity(1, 1)],
        ..FakeStrava::default()
    };
    let app = test_app(fake).await;

    let err = app.state.sync_service.fetch_and_merge().await.unwrap_err();

    assert!(matches!(err, AppError::TokenRefresh(_)), "got {:?}", err);
    assert!(app.fake.lock().unwrap().pages_requested.is_empty());
    assert_eq!(app.state.db.count_activities().await.unwrap(), 0);
    assert_eq!(app.credentials_file(), INITIAL_CREDENTIALS);
}

#[tokio::test]
async fn test_sync_uses_freshly_refreshed_token() {
    let fake = FakeStrava {
        activities: vec![remote_activity(1, 1)],
        ..FakeStrava::default()
    };
    let app = test_app(fake).await;

    app.state.sync_service.fetch_and_merge().await.unwrap();
    app.state.sync_service.fetch_and_merge().await.unwrap();

    assert_eq!(
        app.fake.lock().unwrap().bearer_tokens_seen,
        vec!["access-1", "access-2"]
    );
}

#[tokio::test]
async fn test_walks_pages_until_short_page() {
    let fake = FakeStrava {
        activities: (1..=5).map(|id| remote_activity(id, id as u32)).collect(),
        ..FakeStrava::default()
    };
    let app = test_app_with(fake, |config| config.sync_page_size = 2).await;

    let report = app.state.sync_service.fetch_and_merge().await.unwrap();

    assert_eq!(report.pages, 3);
    assert_eq!(report.added, 5);
    assert_eq!(app.fake.lock().unwrap().pages_requested, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_page_limit_bounds_fetch() {
    let fake = FakeStrava {
        activities: (1..=5).map(|id| remote_activity(id, id as u32)).collect(),
        ..FakeStrava::default()
    };
    let app = test_app_with(fake, |config| {
        config.sync_page_size = 2;
        config.sync_max_pages = 2;
    })
    .await;

    let report = app.state.sync_service.fetch_and_merge().await.unwrap();

    assert_eq!(report.pages, 2);
    assert_eq!(report.added, 4);
    assert_eq!(stored_ids(&app).await, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_failed_later_page_stores_nothing() {
    let fake = FakeStrava {
        activities: (1..=3).map(|id| remote_activity(id, id as u32)).collect(),
        fail_page: Some(2),
        ..FakeStrava::default()
    };
    let app = test_app_with(fake, |config| config.sync_page_size = 2).await;

    let err = app.state.sync_service.fetch_and_merge().await.unwrap_err();

    match err {
        AppError::Sync(msg) => assert!(msg.contains("500"), "{}", msg),
        other => panic!("expected Sync, got {:?}", other),
    }
    assert_eq!(app.state.db.count_activities().await.unwrap(), 0);
}

#[tokio::test]
async fn test_no_duplicate_ids_across_runs() {
    let app = test_app(FakeStrava::default()).await;

    let rounds: Vec<Vec<i64>> = vec![vec![1, 2], vec![2, 3, 3], vec![1, 4], vec![]];
    for ids in rounds {
        app.fake.lock().unwrap().activities =
            ids.iter().map(|&id| remote_activity(id, id as u32)).collect();
        app.state.sync_service.fetch_and_merge().await.unwrap();
    }

    assert_eq!(stored_ids(&app).await, vec![1, 2, 3, 4]);
    assert_eq!(app.state.db.count_activities().await.unwrap(), 4);
}
