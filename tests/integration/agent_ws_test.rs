//! End-to-end tests: session agents over a real WebSocket server.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use sentinel_agent::{
    AgentConfig, AgentEvent, ConnectionState, ExitReason, SessionAgent, WsTransport,
};
use sentinel_core::types::UserId;

use helpers::{PASSWORD, TestApp};

async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<AgentEvent>,
    want: impl Fn(&AgentEvent) -> bool,
) -> AgentEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for agent event")
            .expect("agent event stream closed");
        if want(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_raw_websocket_join_is_acknowledged() {
    let app = TestApp::new();
    let (addr, _stop) = app.spawn_server().await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");
    socket
        .send(Message::text(r#"{"event":"join","user_id":"u1","app_name":"HR Portal"}"#))
        .await
        .expect("send");

    let frame = tokio::time::timeout(Duration::from_secs(10), socket.next())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("frame");
    let Message::Text(text) = frame else {
        panic!("expected a text frame, got {frame:?}");
    };
    let ack: serde_json::Value = serde_json::from_str(text.as_str()).expect("json");
    assert_eq!(ack["event"], "JOINED");
    assert_eq!(ack["session_count"], 1);
}

#[tokio::test]
async fn test_agents_are_logged_out_everywhere() {
    let app = TestApp::new();
    let (addr, _stop) = app.spawn_server().await;
    let transport = Arc::new(WsTransport::new(format!("ws://{addr}/ws")));

    let (hr, mut hr_events, hr_task) =
        SessionAgent::spawn(AgentConfig::new("u1", "HR Portal"), transport.clone());
    let (_crm, mut crm_events, crm_task) =
        SessionAgent::spawn(AgentConfig::new("u1", "CRM System"), transport);

    wait_for(&mut hr_events, |e| matches!(e, AgentEvent::Joined { .. })).await;
    wait_for(&mut crm_events, |e| matches!(e, AgentEvent::Joined { .. })).await;
    assert_eq!(hr.status().state, ConnectionState::Joined);

    let report = app
        .hub
        .force_logout(&UserId::from("u1"), "admin", "manual")
        .await
        .expect("logout");
    assert_eq!(report.delivered, 2);

    let expected = ExitReason::GlobalLogout {
        initiator: "admin".to_string(),
        reason: "manual".to_string(),
    };
    assert_eq!(hr_task.await.expect("hr agent"), expected);
    assert_eq!(crm_task.await.expect("crm agent"), expected);
    assert!(!hr.logout());
    assert!(app.hub.sessions_of(&UserId::from("u1")).await.expect("sessions").is_empty());
}

#[tokio::test]
async fn test_agent_answers_challenge() {
    let app = TestApp::new();
    let (addr, _stop) = app.spawn_server().await;
    let transport = Arc::new(WsTransport::new(format!("ws://{addr}/ws")));

    let (agent, mut events, _task) =
        SessionAgent::spawn(AgentConfig::new("u1", "HR Portal"), transport);
    wait_for(&mut events, |e| matches!(e, AgentEvent::Joined { .. })).await;

    app.hub
        .issue_challenge(&UserId::from("u1"), "Suspicious activity")
        .await
        .expect("issue");
    wait_for(&mut events, |e| matches!(e, AgentEvent::ReauthRequired { .. })).await;
    assert!(agent.status().pending_challenge.is_some());

    agent.verify(PASSWORD).await.expect("verify");
    wait_for(&mut events, |e| matches!(e, AgentEvent::ReauthSucceeded)).await;
    assert!(agent.status().pending_challenge.is_none());
    assert_eq!(agent.status().state, ConnectionState::Joined);

    assert!(agent.logout());
}

#[tokio::test]
async fn test_local_logout_ends_the_session() {
    let app = TestApp::new();
    let (addr, _stop) = app.spawn_server().await;
    let transport = Arc::new(WsTransport::new(format!("ws://{addr}/ws")));

    let (agent, mut events, task) =
        SessionAgent::spawn(AgentConfig::new("u1", "HR Portal"), transport);
    wait_for(&mut events, |e| matches!(e, AgentEvent::Joined { .. })).await;

    assert!(agent.logout());
    assert_eq!(task.await.expect("agent"), ExitReason::LocalLogout);

    let user = UserId::from("u1");
    for _ in 0..50 {
        if app.hub.sessions_of(&user).await.expect("sessions").is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session was not removed after the socket closed");
}
