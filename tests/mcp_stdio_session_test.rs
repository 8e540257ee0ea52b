//! StdioSession tests against the `mcp_test_server` child process.

mod common;

use std::time::Instant;

use serde_json::json;

use mcp_relay::error::RelayError;
use mcp_relay::mcp::config::ServerConfig;
use mcp_relay::mcp::session::{SessionState, ToolSession};

use common::{session_for, test_server, TIMEOUT};

#[tokio::test]
async fn test_session_lifecycle_against_child_process() {
    let mut session = session_for(test_server("files", &[]));
    assert_eq!(session.state(), SessionState::Uninitialized);

    session.initialize().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.server_name(), "files");

    let names: Vec<String> = session
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["echo", "read_file", "fail"]);

    let output = session
        .invoke("echo", json!({ "message": "hello" }))
        .await
        .unwrap();
    assert!(!output.is_error);
    assert_eq!(output.content[0]["text"], "hello");

    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_read_file_returns_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "alpha").unwrap();

    let mut session = session_for(test_server("files", &[]));
    session.initialize().await.unwrap();

    let output = session
        .invoke("read_file", json!({ "path": path.to_str().unwrap() }))
        .await
        .unwrap();
    assert_eq!(output.content[0]["text"], "alpha");

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_paginated_listing_is_concatenated_in_order() {
    let mut session = session_for(test_server(
        "paged",
        &["--page-size", "1", "--tool", "extra_one", "--tool", "extra_two"],
    ));
    session.initialize().await.unwrap();

    let tools = session.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["echo", "read_file", "fail", "extra_one", "extra_two"]
    );
    assert_eq!(tools[3].title.as_deref(), Some("extra_one on paged"));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_is_error_result_is_returned_as_output() {
    let mut session = session_for(test_server("files", &[]));
    session.initialize().await.unwrap();

    let output = session
        .invoke("read_file", json!({ "path": "/definitely/not/here.txt" }))
        .await
        .unwrap();
    assert!(output.is_error);
    assert!(output.content[0]["text"]
        .as_str()
        .unwrap()
        .contains("cannot read"));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_rpc_error_becomes_tool_invocation_error() {
    let mut session = session_for(test_server("files", &[]));
    session.initialize().await.unwrap();

    let err = session.invoke("fail", json!({})).await.unwrap_err();
    match err.downcast_ref::<RelayError>() {
        Some(RelayError::ToolInvocation { tool, cause }) => {
            assert_eq!(tool, "fail");
            assert!(cause.contains("fail tool always fails"), "{}", cause);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // The session stays usable after a failed call.
    let output = session.invoke("echo", json!({ "message": "still here" })).await.unwrap();
    assert_eq!(output.content[0]["text"], "still here");

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_handshake_reports_stderr() {
    let mut session = session_for(test_server("broken", &["--fail-initialize"]));

    let err = session.initialize().await.unwrap_err();
    match err.downcast_ref::<RelayError>() {
        Some(RelayError::Connection { server, reason }) => {
            assert_eq!(server, "broken");
            assert!(reason.contains("refusing to initialize"), "{}", reason);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Closed);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_executable_is_connection_error() {
    let mut session = session_for(ServerConfig::new("ghost", "/nonexistent/mcp-server-binary"));

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RelayError>(),
        Some(RelayError::Connection { server, .. }) if server == "ghost"
    ));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_invoke_after_close_is_rejected() {
    let mut session = session_for(test_server("files", &[]));
    session.initialize().await.unwrap();
    session.close().await.unwrap();

    let err = session.invoke("echo", json!({ "message": "x" })).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RelayError>(),
        Some(RelayError::ToolInvocation { .. })
    ));
    assert!(session.list_tools().await.is_err());
}

#[tokio::test]
async fn test_calls_to_exited_server_fail_fast() {
    let mut session = session_for(test_server("dies", &["--exit-after-initialize"]));
    session.initialize().await.unwrap();

    for _ in 0..2 {
        let started = Instant::now();
        let err = session.invoke("echo", json!({ "message": "hello?" })).await.unwrap_err();
        assert!(
            started.elapsed() < TIMEOUT / 2,
            "call took {:?}",
            started.elapsed()
        );
        match err.downcast_ref::<RelayError>() {
            Some(RelayError::ToolInvocation { tool, cause }) => {
                assert_eq!(tool, "echo");
                assert!(cause.contains("server 'dies' has exited"), "{}", cause);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}
