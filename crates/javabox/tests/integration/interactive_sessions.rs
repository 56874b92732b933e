use std::time::Duration;

use javabox::{ClientFrame, ServerFrame, SessionManager, SessionState};
use tokio::sync::mpsc;

use super::{fixture_source, leftover_entries, test_runner};

/// JVM startup plus compilation can be slow on loaded machines
const FRAME_TIMEOUT: Duration = Duration::from_secs(30);

async fn next_frame(rx: &mut mpsc::Receiver<ServerFrame>) -> ServerFrame {
    tokio::time::timeout(FRAME_TIMEOUT, rx.recv())
        .await
        .expect("Timed out waiting for a frame")
        .expect("Frame channel closed")
}

/// Collect output until it contains `needle`
async fn read_until(rx: &mut mpsc::Receiver<ServerFrame>, needle: &str) -> String {
    let mut text = String::new();
    while !text.contains(needle) {
        match next_frame(rx).await {
            ServerFrame::Output(chunk) => text.push_str(&chunk),
            other => panic!("Expected output containing {needle:?}, got {other:?} after {text:?}"),
        }
    }
    text
}

/// Collect output until the terminal frame
async fn read_to_end(rx: &mut mpsc::Receiver<ServerFrame>) -> (String, ServerFrame) {
    let mut text = String::new();
    loop {
        match next_frame(rx).await {
            ServerFrame::Output(chunk) => text.push_str(&chunk),
            terminal => return (text, terminal),
        }
    }
}

async fn wait_until_running(manager: &SessionManager, id: &str) {
    tokio::time::timeout(FRAME_TIMEOUT, async {
        while !manager.is_running(id) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Session never started running");
}

#[cfg(target_os = "linux")]
fn process_exists(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_exists(_pid: u32) -> bool {
    false
}

#[tokio::test]
async fn test_prompt_then_input() {
    let (runner, root) = test_runner();
    let (conn, mut rx) = runner.connect();

    conn.handle_text(&format!("RUN:{}", fixture_source("Prompt.java")))
        .await;
    read_until(&mut rx, "Enter a number: ").await;

    conn.handle_text("INPUT:42").await;
    let (text, terminal) = read_to_end(&mut rx).await;

    assert!(text.contains("You entered 42"), "{text:?}");
    assert_eq!(terminal, ServerFrame::Exit(0));

    // Exactly one terminal frame
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(runner.sessions().state(conn.id()), SessionState::Idle);
    assert_eq!(leftover_entries(root.path()), 0);

    conn.close().await;
}

#[tokio::test]
async fn test_input_lines_keep_order() {
    let (runner, _root) = test_runner();
    let (conn, mut rx) = runner.connect();

    conn.handle(ClientFrame::Run(fixture_source("Echo.java")))
        .await;
    wait_until_running(runner.sessions(), conn.id()).await;

    for line in ["a", "b", "c", "quit"] {
        conn.handle(ClientFrame::Input(line.to_string())).await;
    }
    let (text, terminal) = read_to_end(&mut rx).await;

    assert_eq!(text, "echo: a\necho: b\necho: c\n");
    assert_eq!(terminal, ServerFrame::Exit(0));
    conn.close().await;
}

#[tokio::test]
async fn test_stop_kills_program_and_removes_directory() {
    let (runner, root) = test_runner();
    let manager = runner.sessions().clone();
    let (tx, mut rx) = mpsc::channel(64);

    let handle = manager
        .start("stop-me", fixture_source("Echo.java"), tx)
        .expect("Failed to start session");
    wait_until_running(&manager, "stop-me").await;

    let pid = manager.pid("stop-me").expect("Running session has a pid");
    let work_dir = manager.work_dir("stop-me").expect("Running session has a working dir");
    assert!(work_dir.exists());
    assert!(process_exists(pid));

    manager.stop("stop-me").await;

    assert!(!work_dir.exists());
    assert!(!process_exists(pid));
    assert_eq!(manager.state("stop-me"), SessionState::Idle);
    assert_eq!(handle.await.unwrap(), SessionState::Aborted);

    // Stopping again is a no-op, and a stopped session sends no terminal frame
    manager.stop("stop-me").await;
    assert_eq!(rx.recv().await, None);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_stop_with_unread_output() {
    let (runner, root) = test_runner();
    let manager = runner.sessions().clone();
    // Never drained, so the program's output backs up behind it
    let (tx, _rx) = mpsc::channel(1);

    let handle = manager
        .start("flood", fixture_source("Spam.java"), tx)
        .expect("Failed to start session");
    wait_until_running(&manager, "flood").await;
    let pid = manager.pid("flood").expect("Running session has a pid");
    tokio::time::sleep(Duration::from_millis(500)).await;

    tokio::time::timeout(Duration::from_secs(5), manager.stop("flood"))
        .await
        .expect("stop blocked on a full client channel");

    assert!(!process_exists(pid));
    assert_eq!(handle.await.unwrap(), SessionState::Aborted);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_stop_during_compilation() {
    let (runner, root) = test_runner();
    let manager = runner.sessions().clone();
    let (tx, mut rx) = mpsc::channel(64);

    let handle = manager
        .start("early", fixture_source("Hello.java"), tx)
        .expect("Failed to start session");
    manager.stop("early").await;

    assert_eq!(handle.await.unwrap(), SessionState::Aborted);
    assert_eq!(rx.recv().await, None);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_closing_connection_stops_session() {
    let (runner, _root) = test_runner();
    let (conn, _rx) = runner.connect();
    let id = conn.id().to_string();

    conn.handle(ClientFrame::Run(fixture_source("Echo.java")))
        .await;
    wait_until_running(runner.sessions(), &id).await;
    let work_dir = runner.sessions().work_dir(&id).unwrap();

    conn.close().await;

    assert_eq!(runner.sessions().state(&id), SessionState::Idle);
    assert!(!work_dir.exists());
}

#[tokio::test]
async fn test_concurrent_sessions_are_isolated() {
    let (runner, _root) = test_runner();
    let (first, mut first_rx) = runner.connect();
    let (second, mut second_rx) = runner.connect();

    first.handle(ClientFrame::Run(fixture_source("Echo.java"))).await;
    second.handle(ClientFrame::Run(fixture_source("Echo.java"))).await;
    wait_until_running(runner.sessions(), first.id()).await;
    wait_until_running(runner.sessions(), second.id()).await;

    assert_ne!(
        runner.sessions().work_dir(first.id()),
        runner.sessions().work_dir(second.id())
    );

    first.handle(ClientFrame::Input("from first".into())).await;
    second.handle(ClientFrame::Input("from second".into())).await;

    assert_eq!(read_until(&mut first_rx, "\n").await, "echo: from first\n");
    assert_eq!(read_until(&mut second_rx, "\n").await, "echo: from second\n");

    first.close().await;
    assert!(runner.sessions().is_running(second.id()));

    second.handle(ClientFrame::Input("quit".into())).await;
    assert_eq!(next_frame(&mut second_rx).await, ServerFrame::Exit(0));
    second.close().await;
}

#[tokio::test]
async fn test_compile_failure_frame() {
    let (runner, root) = test_runner();
    let (conn, mut rx) = runner.connect();

    conn.handle(ClientFrame::Run(fixture_source("Broken.java")))
        .await;

    match next_frame(&mut rx).await {
        ServerFrame::Error(message) => {
            assert!(message.starts_with("Compilation Failed:\n"), "{message}");
            assert!(message.contains("Broken.java:3"), "{message}");
        }
        other => panic!("Expected compile error, got {other:?}"),
    }
    assert_eq!(leftover_entries(root.path()), 0);
    conn.close().await;
}

#[tokio::test]
async fn test_restart_after_finish() {
    let (runner, _root) = test_runner();
    let (conn, mut rx) = runner.connect();

    conn.handle(ClientFrame::Run(fixture_source("Hello.java"))).await;
    let (text, terminal) = read_to_end(&mut rx).await;
    assert_eq!(text, "hello\n");
    assert_eq!(terminal, ServerFrame::Exit(0));

    // The id is free again once the previous run finished
    conn.handle(ClientFrame::Run(fixture_source("Hello.java"))).await;
    let (text, terminal) = read_to_end(&mut rx).await;
    assert_eq!(text, "hello\n");
    assert_eq!(terminal, ServerFrame::Exit(0));
    conn.close().await;
}
