//! Integration tests for the console driven by scripted input.

mod common;

use std::sync::Arc;

use chatroom_console::app::{release_on_shutdown, App, Output, FAREWELL, LOST_ROOM_NOTICE};
use chatroom_console::net::{ChatClient, ClientError};
use chatroom_console::state::{ConnectivityMode, LOBBY};
use tokio::sync::oneshot;

use common::{within, MockServer, SharedBuf, FIRST_ROOM_ID};

/// Connect, then run the console over `script` until it exits.
async fn run_script(server: &MockServer, script: &'static [u8]) -> (Arc<ChatClient>, String) {
    let client = Arc::new(server.client());
    let buf = SharedBuf::default();
    let mut app = App::new(Arc::clone(&client), script, Output::new(buf.clone()));

    within(app.connect()).await.unwrap();
    within(app.run()).await.unwrap();
    (client, buf.text())
}

/// Test: A full console session from room creation to leaving.
#[tokio::test]
async fn test_console_session() {
    let server = MockServer::start().await;
    let script = b"help\nmkroom general\nalice\nsend\nhello there\nls\ncd ..\nquit\n";
    let (client, out) = run_script(&server, script).await;

    assert!(out.contains("Hello, t1"));
    assert!(out.contains(&format!("Created room {}", FIRST_ROOM_ID)));
    assert!(out.contains(&format!("Joined room {}", FIRST_ROOM_ID)));
    assert!(out.contains("Sent: hello there"));
    assert!(out.contains(&format!("Members of room {}", FIRST_ROOM_ID)));
    assert!(out.contains("  alice"));
    assert!(out.contains(&format!("Left room {}", FIRST_ROOM_ID)));
    assert!(out.trim_end().ends_with(FAREWELL));

    assert_eq!(client.current_room_id(), LOBBY);
    assert!(!client.is_connected());
}

/// Test: Bad commands and rejections are explained, not fatal.
#[tokio::test]
async fn test_console_reports_mistakes() {
    let server = MockServer::start().await;
    let script = b"dance\ncd 42\nmkroom\nset open\nrm 42\nexit\n";
    let (_client, out) = run_script(&server, script).await;

    assert!(out.contains("Unknown command \"dance\""));
    assert!(out.contains("There is no room 42"));
    assert!(out.contains("Usage: mkroom <name> [close]"));
    assert!(out.contains("You are not in a room"));
    assert!(out.contains("Could not dismiss room 42"));
    assert!(out.trim_end().ends_with(FAREWELL));
}

/// Test: Losing the connection offers a reconnect that resumes the room.
#[tokio::test]
async fn test_console_reconnects_after_hangup() {
    let server = MockServer::start().await;
    let script = b"mkroom general\nalice\nsend\nhangup\ny\nquit\n";
    let (client, out) = run_script(&server, script).await;

    assert!(out.contains("Request could not complete"));
    assert!(out.contains("Reconnect to the server? [y/n]"));
    assert!(out.contains(&format!("Back in room {}", FIRST_ROOM_ID)));
    assert!(!out.contains(LOST_ROOM_NOTICE));
    assert_eq!(client.connectivity().status().generation, 2);
}

/// Test: A reconnect the server no longer remembers tells the operator to rejoin.
#[tokio::test]
async fn test_console_reports_lost_room_on_reconnect() {
    let server = MockServer::start().await;
    // Only logins presenting a known token are affected, so the first login
    // still gets a fresh session
    server.state().forget_sessions = true;
    let script = b"mkroom general\nalice\nsend\nhangup\ny\nquit\n";
    let (client, out) = run_script(&server, script).await;

    let notice = out
        .find(LOST_ROOM_NOTICE)
        .unwrap_or_else(|| panic!("no lost-room notice in:\n{}", out));
    assert!(out[notice..].contains("lobby> "));
    assert!(!out.contains(&format!("Back in room {}", FIRST_ROOM_ID)));
    assert_eq!(client.current_room_id(), LOBBY);
    assert_eq!(server.state().logins, vec![String::new(), "t1".to_string()]);
}

/// Test: An interrupt releases the connection and prints the farewell.
#[tokio::test]
async fn test_shutdown_signal_releases_connection() {
    let server = MockServer::start().await;
    let client = Arc::new(server.client());
    within(client.connect()).await.unwrap().unwrap();

    let buf = SharedBuf::default();
    let (interrupt, signal) = oneshot::channel::<()>();
    let handler = tokio::spawn(release_on_shutdown(
        async {
            let _ = signal.await;
        },
        Arc::clone(&client),
        Output::new(buf.clone()),
    ));

    assert!(client.is_connected());
    interrupt.send(()).unwrap();
    within(handler).await.unwrap();

    let status = client.connectivity().status();
    assert_eq!(status.mode, ConnectivityMode::Offline);
    assert_eq!(status.generation, 1);
    assert!(buf.text().contains(FAREWELL));

    // Released, not just marked: further requests fail fast
    let err = within(client.list_rooms()).await.unwrap_err();
    assert!(matches!(err, ClientError::Offline));
}
