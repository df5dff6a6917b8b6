//! Integration tests for session registration and global logout.

mod helpers;

use axum::http::StatusCode;
use serde_json::json;

use sentinel_core::types::UserId;
use sentinel_realtime::message::{InboundMessage, OutboundMessage};

use helpers::TestApp;

#[tokio::test]
async fn test_global_logout_reaches_every_session() {
    let app = TestApp::new();
    let mut hr = app.join("u1", "HR Portal").await;
    let mut crm = app.join("u1", "CRM System").await;
    let mut other = app.join("u2", "HR Portal").await;

    let report = app
        .hub
        .force_logout(&UserId::from("u1"), "admin", "manual")
        .await
        .expect("logout");
    assert_eq!(report.total, 2);
    assert_eq!(report.delivered, 2);

    for client in [&mut hr, &mut crm] {
        match client.recv().await {
            OutboundMessage::LogoutAll {
                user_id,
                initiator,
                reason,
                ..
            } => {
                assert_eq!(user_id.as_str(), "u1");
                assert_eq!(initiator, "admin");
                assert_eq!(reason, "manual");
            }
            other => panic!("expected LOGOUT_ALL, got {other:?}"),
        }
    }
    other.assert_silent().await;

    let sessions = app.hub.sessions_of(&UserId::from("u1")).await.expect("sessions");
    assert!(sessions.is_empty());
    assert_eq!(
        app.hub.sessions_of(&UserId::from("u2")).await.expect("sessions").len(),
        1
    );
}

#[tokio::test]
async fn test_operator_logout_over_http() {
    let app = TestApp::new();
    let mut hr = app.join("u1", "HR Portal").await;

    let response = app
        .request(
            "POST",
            "/api/sessions/u1/logout",
            Some(json!({"initiator": "admin", "reason": "manual"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["delivered"], 1);
    assert!(matches!(hr.recv().await, OutboundMessage::LogoutAll { .. }));

    let response = app.request("GET", "/api/sessions/u1", None).await;
    assert_eq!(response.body["data"]["sessions"], json!([]));
}

#[tokio::test]
async fn test_repeated_join_keeps_one_session() {
    let app = TestApp::new();
    let mut client = app.join("u1", "HR Portal").await;

    client
        .send(InboundMessage::Join {
            user_id: UserId::from("u1"),
            app_name: "HR Portal".to_string(),
        })
        .await;
    match client.recv().await {
        OutboundMessage::Joined { session_count, .. } => assert_eq!(session_count, 1),
        other => panic!("expected JOINED, got {other:?}"),
    }

    let sessions = app.hub.sessions_of(&UserId::from("u1")).await.expect("sessions");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].connection_id, client.conn_id);
}

#[tokio::test]
async fn test_join_as_second_user_is_rejected() {
    let app = TestApp::new();
    let mut client = app.join("u1", "HR Portal").await;

    client
        .send(InboundMessage::Join {
            user_id: UserId::from("u2"),
            app_name: "HR Portal".to_string(),
        })
        .await;
    match client.recv().await {
        OutboundMessage::Error { code, .. } => assert_eq!(code, "CONFLICT"),
        other => panic!("expected ERROR, got {other:?}"),
    }
    assert!(app.hub.sessions_of(&UserId::from("u2")).await.expect("sessions").is_empty());
}

#[tokio::test]
async fn test_logout_request_for_another_user_is_ignored() {
    let app = TestApp::new();
    let mut victim = app.join("u1", "HR Portal").await;
    let attacker = app.join("u2", "CRM System").await;

    attacker
        .send(InboundMessage::ForceGlobalLogout {
            user_id: UserId::from("u1"),
            reason: "spoofed".to_string(),
            initiator: "CRM System".to_string(),
        })
        .await;

    victim.assert_silent().await;
    assert_eq!(
        app.hub.sessions_of(&UserId::from("u1")).await.expect("sessions").len(),
        1
    );
}

#[tokio::test]
async fn test_client_initiated_logout_with_defaults() {
    let app = TestApp::new();
    let hr = app.join("u1", "HR Portal").await;
    let mut crm = app.join("u1", "CRM System").await;

    hr.send_raw(r#"{"event":"force_global_logout","user_id":"u1"}"#).await;

    match crm.recv().await {
        OutboundMessage::LogoutAll {
            initiator, reason, ..
        } => {
            assert_eq!(initiator, "Unknown");
            assert_eq!(reason, "Manual Global Logout");
        }
        other => panic!("expected LOGOUT_ALL, got {other:?}"),
    }
}

#[tokio::test]
async fn test_heartbeat_without_session_is_refused() {
    let app = TestApp::new();
    let mut client = app.attach();

    client
        .send(InboundMessage::Heartbeat {
            user_id: UserId::from("u1"),
        })
        .await;
    match client.recv().await {
        OutboundMessage::Error { code, .. } => assert_eq!(code, "NOT_JOINED"),
        other => panic!("expected ERROR, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let app = TestApp::new();
    let mut client = app.join("u1", "HR Portal").await;

    client.send_raw("not json").await;
    client.send_raw(r#"{"event":"join","user_id":"  "}"#).await;
    client.send_raw(r#"{"event":"teleport","user_id":"u1"}"#).await;
    client.assert_silent().await;

    assert_eq!(app.hub.metrics.snapshot().protocol_errors, 3);
    assert_eq!(
        app.hub.sessions_of(&UserId::from("u1")).await.expect("sessions").len(),
        1
    );
}

#[tokio::test]
async fn test_leave_and_disconnect_end_sessions() {
    let app = TestApp::new();
    let hr = app.join("u1", "HR Portal").await;
    let crm = app.join("u1", "CRM System").await;

    hr.send(InboundMessage::Leave {
        user_id: UserId::from("u1"),
    })
    .await;
    let sessions = app.hub.sessions_of(&UserId::from("u1")).await.expect("sessions");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].app_name, "CRM System");

    crm.disconnect().await;
    assert!(app.hub.sessions_of(&UserId::from("u1")).await.expect("sessions").is_empty());

    let stats = app.hub.stats().await.expect("stats");
    assert_eq!(stats.users, 0);
}
