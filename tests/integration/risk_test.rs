//! Integration tests for risk aggregation, operator feeds and detection.

mod helpers;

use axum::http::StatusCode;
use serde_json::json;

use sentinel_core::types::UserId;
use sentinel_realtime::message::OutboundMessage;
use sentinel_realtime::risk::RiskStatus;

use helpers::{TestApp, test_config};

#[tokio::test]
async fn test_killed_event_lands_in_snapshot_and_activity() {
    let app = TestApp::new();

    let response = app
        .request(
            "POST",
            "/api/risk/events",
            Some(json!({"user_id": "u1", "score": 85, "status": "KILLED"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let snapshot = app.request("GET", "/api/risk/snapshot", None).await;
    assert_eq!(snapshot.body["data"]["u1"]["status"], "KILLED");
    assert_eq!(snapshot.body["data"]["u1"]["score"], 85.0);

    let activity = app.request("GET", "/api/risk/activity", None).await;
    let newest = &activity.body["data"][0];
    assert_eq!(newest["user_id"], "u1");
    assert_eq!(newest["status"], "KILLED");
    assert_eq!(newest["app_name"], "Unknown App");
}

#[tokio::test]
async fn test_classification_boundaries() {
    let app = TestApp::new();
    for (score, class) in [(50, "ok"), (51, "warn"), (80, "warn"), (81, "kill_eligible")] {
        let response = app
            .request(
                "POST",
                "/api/risk/events",
                Some(json!({"user_id": "u9", "score": score, "status": "OK"})),
            )
            .await;
        assert_eq!(response.body["data"]["class"], class, "score {score}");
    }
}

#[tokio::test]
async fn test_activity_is_bounded_and_newest_first() {
    let mut config = test_config();
    config.risk.activity_log_capacity = 3;
    let app = TestApp::with_config(config);

    for score in 1..=5 {
        app.request(
            "POST",
            "/api/risk/events",
            Some(json!({"user_id": "u1", "score": score, "status": "OK"})),
        )
        .await;
    }

    let activity = app.request("GET", "/api/risk/activity", None).await;
    let scores: Vec<f64> = activity.body["data"]
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|e| e["score"].as_f64())
        .collect();
    assert_eq!(scores, vec![5.0, 4.0, 3.0]);
}

#[tokio::test]
async fn test_warn_score_challenges_open_sessions() {
    let app = TestApp::new();
    let mut hr = app.join("u1", "HR Portal").await;

    app.request(
        "POST",
        "/api/risk/events",
        Some(json!({"user_id": "u1", "score": 60, "status": "WARN", "reasons": ["New device"]})),
    )
    .await;

    match hr.recv().await {
        OutboundMessage::RequireReauth { user_id, reason, .. } => {
            assert_eq!(user_id.as_str(), "u1");
            assert!(reason.contains("New device"));
        }
        other => panic!("expected REQUIRE_REAUTH, got {other:?}"),
    }
}

#[tokio::test]
async fn test_killed_score_never_logs_out_automatically() {
    let app = TestApp::new();
    let mut hr = app.join("u1", "HR Portal").await;

    app.request(
        "POST",
        "/api/risk/events",
        Some(json!({"user_id": "u1", "score": 95, "status": "KILLED"})),
    )
    .await;

    assert!(matches!(hr.recv().await, OutboundMessage::RequireReauth { .. }));
    hr.assert_silent().await;
    assert_eq!(
        app.hub.sessions_of(&UserId::from("u1")).await.expect("sessions").len(),
        1
    );
}

#[tokio::test]
async fn test_operator_channel_receives_risk_updates() {
    let app = TestApp::new();
    let mut console = app.join("ops", "Admin Console").await;
    let mut hr = app.join("u2", "HR Portal").await;

    app.request(
        "POST",
        "/api/risk/events",
        Some(json!({"user_id": "u1", "app_name": "CRM System", "score": 20, "status": "OK"})),
    )
    .await;

    match console.recv().await {
        OutboundMessage::RiskUpdate {
            user_id,
            app_name,
            status,
            ..
        } => {
            assert_eq!(user_id.as_str(), "u1");
            assert_eq!(app_name, "CRM System");
            assert_eq!(status, RiskStatus::Ok);
        }
        other => panic!("expected RISK_UPDATE, got {other:?}"),
    }
    hr.assert_silent().await;
}

#[tokio::test]
async fn test_join_detector_flags_high_concurrency() {
    let mut config = test_config();
    config.risk.detector.enabled = true;
    config.risk.auto_challenge = false;
    let app = TestApp::with_config(config);

    let mut clients = Vec::new();
    for app_name in ["HR Portal", "CRM System", "Payroll", "Wiki"] {
        clients.push(app.join("u1", app_name).await);
    }

    let entry = app
        .hub
        .risk
        .snapshot_of(&UserId::from("u1"))
        .expect("detector should have reported");
    assert!(entry.score >= 50.0);
    assert_eq!(entry.last_app, "Wiki");

    let newest = app.hub.risk.activity().into_iter().next().expect("activity");
    assert!(newest.reasons.iter().any(|r| r.starts_with("High Concurrency: 4")));
    assert!(newest.reasons.iter().any(|r| r.starts_with("Rapid App Switching")));
}
