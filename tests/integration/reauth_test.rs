//! Integration tests for the reauthentication challenge flow.

mod helpers;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use sentinel_core::types::UserId;
use sentinel_realtime::message::{InboundMessage, OutboundMessage};
use sentinel_realtime::reauth::{
    ChallengeOutcome, ChallengeState, ESCALATION_INITIATOR, IssueOutcome,
};

use helpers::{PASSWORD, TestApp, TestClient, test_config};

async fn challenge(app: &TestApp, user: &str) -> serde_json::Value {
    let response = app
        .request(
            "POST",
            &format!("/api/reauth/{user}/challenge"),
            Some(json!({"reason": "Suspicious activity"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    response.body["data"].clone()
}

async fn expect_prompt(client: &mut TestClient) {
    match client.recv().await {
        OutboundMessage::RequireReauth {
            reason,
            expires_in_seconds,
            ..
        } => {
            assert_eq!(reason, "Suspicious activity");
            assert_eq!(expires_in_seconds, 120);
        }
        other => panic!("expected REQUIRE_REAUTH, got {other:?}"),
    }
}

fn verify(password: &str) -> InboundMessage {
    InboundMessage::VerifyPassword {
        user_id: UserId::from("u1"),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn test_second_issue_while_pending_is_a_no_op() {
    let app = TestApp::new();
    let mut hr = app.join("u1", "HR Portal").await;
    let mut crm = app.join("u1", "CRM System").await;

    let first = challenge(&app, "u1").await;
    assert_eq!(first["outcome"], "issued");
    expect_prompt(&mut hr).await;
    expect_prompt(&mut crm).await;

    let second = challenge(&app, "u1").await;
    assert_eq!(second["outcome"], "already_pending");
    assert_eq!(second["challenge"]["id"], first["challenge"]["id"]);
    hr.assert_silent().await;

    let state = app.request("GET", "/api/reauth/u1", None).await;
    assert_eq!(state.body["data"]["state"], "PENDING");
}

#[tokio::test]
async fn test_correct_password_verifies_every_session() {
    let app = TestApp::new();
    let mut hr = app.join("u1", "HR Portal").await;
    let mut crm = app.join("u1", "CRM System").await;

    challenge(&app, "u1").await;
    expect_prompt(&mut hr).await;
    expect_prompt(&mut crm).await;

    hr.send(verify(PASSWORD)).await;
    for client in [&mut hr, &mut crm] {
        assert!(matches!(client.recv().await, OutboundMessage::ReauthSuccess { .. }));
    }

    let view = app.hub.challenge_state(&UserId::from("u1")).await.expect("state");
    assert_eq!(view.state, ChallengeState::Verified);
    assert!(view.grace_until.is_some());

    let again = challenge(&app, "u1").await;
    assert_eq!(again["outcome"], "in_grace_period");
    hr.assert_silent().await;
}

#[tokio::test]
async fn test_wrong_password_notifies_requester_only() {
    let app = TestApp::new();
    let mut hr = app.join("u1", "HR Portal").await;
    let mut crm = app.join("u1", "CRM System").await;

    challenge(&app, "u1").await;
    expect_prompt(&mut hr).await;
    expect_prompt(&mut crm).await;

    hr.send(verify("wrong")).await;
    match hr.recv().await {
        OutboundMessage::ReauthFailed { outcome, .. } => {
            assert_eq!(outcome, ChallengeOutcome::Failed)
        }
        other => panic!("expected REAUTH_FAILED, got {other:?}"),
    }
    crm.assert_silent().await;

    let view = app.hub.challenge_state(&UserId::from("u1")).await.expect("state");
    assert_eq!(view.state, ChallengeState::None);
    assert_eq!(view.last_outcome, Some(ChallengeOutcome::Failed));
    assert_eq!(view.consecutive_failures, 1);
    assert_eq!(
        app.hub.sessions_of(&UserId::from("u1")).await.expect("sessions").len(),
        2
    );
}

#[tokio::test]
async fn test_verify_for_another_user_is_ignored() {
    let app = TestApp::new();
    let mut hr = app.join("u1", "HR Portal").await;
    let mut other = app.join("u2", "CRM System").await;

    challenge(&app, "u1").await;
    expect_prompt(&mut hr).await;

    other.send(verify(PASSWORD)).await;
    other.assert_silent().await;
    hr.assert_silent().await;

    let view = app.hub.challenge_state(&UserId::from("u1")).await.expect("state");
    assert_eq!(view.state, ChallengeState::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_challenge_expires() {
    let app = TestApp::new();
    let mut hr = app.join("u1", "HR Portal").await;

    challenge(&app, "u1").await;
    expect_prompt(&mut hr).await;

    match hr.recv_within(Duration::from_secs(600)).await {
        OutboundMessage::ReauthFailed { outcome, .. } => {
            assert_eq!(outcome, ChallengeOutcome::Expired)
        }
        other => panic!("expected REAUTH_FAILED, got {other:?}"),
    }

    let view = app.hub.challenge_state(&UserId::from("u1")).await.expect("state");
    assert_eq!(view.last_outcome, Some(ChallengeOutcome::Expired));
}

#[tokio::test]
async fn test_repeated_failures_escalate_to_global_logout() {
    let mut config = test_config();
    config.reauth.max_failures_before_logout = 2;
    let app = TestApp::with_config(config);
    let mut hr = app.join("u1", "HR Portal").await;
    let mut crm = app.join("u1", "CRM System").await;

    challenge(&app, "u1").await;
    expect_prompt(&mut hr).await;
    expect_prompt(&mut crm).await;

    hr.send(verify("wrong")).await;
    assert!(matches!(hr.recv().await, OutboundMessage::ReauthFailed { .. }));
    hr.send(verify("still wrong")).await;
    assert!(matches!(hr.recv().await, OutboundMessage::ReauthFailed { .. }));

    match crm.recv().await {
        OutboundMessage::LogoutAll { initiator, .. } => {
            assert_eq!(initiator, ESCALATION_INITIATOR)
        }
        other => panic!("expected LOGOUT_ALL, got {other:?}"),
    }
    assert!(app.hub.sessions_of(&UserId::from("u1")).await.expect("sessions").is_empty());

    let view = app.hub.challenge_state(&UserId::from("u1")).await.expect("state");
    assert_eq!(view.state, ChallengeState::None);
}

/// Issue a challenge to the sessions `u1` has now, but only after they have
/// all gone, the way a challenge races the last session's departure.
async fn issue_after_full_logout(app: &TestApp) {
    let u1 = UserId::from("u1");
    let old = app.join("u1", "HR Portal").await;
    let prompted = app
        .hub
        .sessions_of(&u1)
        .await
        .expect("sessions")
        .into_iter()
        .map(|s| s.connection_id)
        .collect();
    old.disconnect().await;

    let outcome = app
        .hub
        .reauth
        .issue(&u1, "Suspicious activity", prompted)
        .await
        .expect("issue");
    assert!(matches!(outcome, IssueOutcome::Issued(_)));
}

#[tokio::test(start_paused = true)]
async fn test_challenge_outliving_its_sessions_never_escalates() {
    let mut config = test_config();
    config.reauth.max_failures_before_logout = 1;
    let app = TestApp::with_config(config);

    issue_after_full_logout(&app).await;
    let mut fresh = app.join("u1", "CRM System").await;

    tokio::time::sleep(Duration::from_secs(121)).await;
    fresh.assert_silent().await;

    let u1 = UserId::from("u1");
    assert_eq!(app.hub.sessions_of(&u1).await.expect("sessions").len(), 1);
    let view = app.hub.challenge_state(&u1).await.expect("state");
    assert_eq!(view.state, ChallengeState::None);
    assert_eq!(view.consecutive_failures, 0);
    assert_eq!(view.last_outcome, None);
}

#[tokio::test]
async fn test_challenge_outliving_its_sessions_is_replaced() {
    let app = TestApp::new();

    issue_after_full_logout(&app).await;
    let mut fresh = app.join("u1", "CRM System").await;

    let data = challenge(&app, "u1").await;
    assert_eq!(data["outcome"], "issued");
    expect_prompt(&mut fresh).await;
    assert_eq!(
        data["challenge"]["prompted"][0],
        json!(fresh.conn_id.to_string())
    );
}

/// Join `u1`, challenge it and collect the prompt.
async fn pending_session(app: &TestApp) -> TestClient {
    let mut hr = app.join("u1", "HR Portal").await;
    assert_eq!(challenge(app, "u1").await["outcome"], "issued");
    assert!(matches!(hr.recv().await, OutboundMessage::RequireReauth { .. }));
    hr
}

async fn assert_cleared(app: &TestApp) {
    let view = app
        .hub
        .challenge_state(&UserId::from("u1"))
        .await
        .expect("state");
    assert_eq!(view.state, ChallengeState::None);
    assert_eq!(view.consecutive_failures, 0);
}

fn escalating_config() -> sentinel_core::config::AppConfig {
    let mut config = test_config();
    config.reauth.max_failures_before_logout = 1;
    config
}

#[tokio::test(start_paused = true)]
async fn test_last_leave_cancels_pending_expiry() {
    let app = TestApp::with_config(escalating_config());
    let mut hr = pending_session(&app).await;

    hr.send(InboundMessage::Leave {
        user_id: UserId::from("u1"),
    })
    .await;
    assert_cleared(&app).await;

    let mut fresh = app.join("u1", "CRM System").await;
    tokio::time::sleep(Duration::from_secs(121)).await;
    hr.assert_silent().await;
    fresh.assert_silent().await;
    assert_cleared(&app).await;
}

#[tokio::test(start_paused = true)]
async fn test_last_disconnect_cancels_pending_expiry() {
    let app = TestApp::with_config(escalating_config());
    let hr = pending_session(&app).await;

    hr.disconnect().await;
    assert_cleared(&app).await;

    let mut fresh = app.join("u1", "CRM System").await;
    tokio::time::sleep(Duration::from_secs(121)).await;
    fresh.assert_silent().await;
    assert_cleared(&app).await;
}

#[tokio::test(start_paused = true)]
async fn test_last_eviction_cancels_pending_expiry() {
    let mut config = escalating_config();
    config.reauth.challenge_timeout_seconds = 600;
    let app = TestApp::with_config(config);
    let u1 = UserId::from("u1");

    let mut hr = app.join("u1", "HR Portal").await;
    assert_eq!(challenge(&app, "u1").await["outcome"], "issued");
    assert!(matches!(hr.recv().await, OutboundMessage::RequireReauth { .. }));

    // No heartbeats: the sweep evicts the session well before the challenge expires.
    tokio::time::sleep(Duration::from_secs(400)).await;
    assert!(app.hub.sessions_of(&u1).await.expect("sessions").is_empty());
    assert_cleared(&app).await;

    let mut fresh = app.join("u1", "CRM System").await;
    tokio::time::sleep(Duration::from_secs(300)).await;
    fresh.assert_silent().await;
    assert_cleared(&app).await;
}
