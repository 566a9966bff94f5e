#![cfg(unix)]

use std::time::Duration;

use filepipe_client::{ChannelState, ClientConfig, ClientError, Command, FileClient, StderrMode};

fn sh_worker(script: &str) -> ClientConfig {
    ClientConfig {
        args: vec!["-c".into(), script.into()],
        stderr: StderrMode::Null,
        shutdown_timeout: Duration::from_secs(3),
        ..ClientConfig::new("/bin/sh")
    }
}

fn list(path: &str) -> Command {
    Command::List {
        path: path.to_string(),
    }
}

#[tokio::test]
async fn positional_worker_answers_every_caller() {
    let client = FileClient::spawn(&sh_worker(
        r#"while read line; do printf '%s\n' '{"error":"","files":[]}'; done"#,
    ))
    .expect("sh worker should start");
    assert!(client.id().is_some());

    let calls = (0..8).map(|n| {
        let client = &client;
        async move { client.list(format!("/dir/{n}")).await }
    });
    for result in futures_util::future::join_all(calls).await {
        assert!(result.expect("each call should resolve").is_ok());
    }

    assert_eq!(client.shutdown().await, ChannelState::Closed);
}

#[tokio::test]
async fn nonzero_exit_fails_all_pending() {
    let client = FileClient::spawn(&sh_worker("read a; read b; read c; exit 3"))
        .expect("sh worker should start");

    let calls = ["/a", "/b", "/c"].map(|path| client.request(list(path)));
    let results = futures_util::future::join_all(calls).await;

    for result in results {
        match result {
            Err(ClientError::ChannelFailed(reason)) => {
                assert!(reason.contains("exit status: 3"), "reason: {reason}")
            }
            other => panic!("expected ChannelFailed, got {other:?}"),
        }
    }
    assert!(matches!(client.state(), ChannelState::Failed(_)));

    let err = client.list("/late").await.unwrap_err();
    assert!(matches!(err, ClientError::ChannelFailed(_)));
}

#[tokio::test]
async fn clean_exit_closes_pending() {
    let client =
        FileClient::spawn(&sh_worker("read a; exit 0")).expect("sh worker should start");

    let err = client.list("/a").await.unwrap_err();
    assert!(matches!(err, ClientError::ChannelClosed), "got {err:?}");
    assert_eq!(client.state(), ChannelState::Closed);
}

#[tokio::test]
async fn exit_is_seen_while_a_descendant_holds_stdout() {
    // The background sleep inherits stdout, so no EOF arrives for 20s.
    let client = FileClient::spawn(&sh_worker("sleep 20 & read a; exit 3"))
        .expect("sh worker should start");

    let result = tokio::time::timeout(Duration::from_secs(5), client.list("/a"))
        .await
        .expect("pending call should resolve once the worker exits");
    match result {
        Err(ClientError::ChannelFailed(reason)) => {
            assert!(reason.contains("exit status: 3"), "reason: {reason}")
        }
        other => panic!("expected ChannelFailed, got {other:?}"),
    }
    assert!(matches!(client.state(), ChannelState::Failed(_)));
}

#[tokio::test]
async fn clean_exit_is_seen_while_a_descendant_holds_stdout() {
    let client = FileClient::spawn(&sh_worker("sleep 20 & read a; exit 0"))
        .expect("sh worker should start");

    let result = tokio::time::timeout(Duration::from_secs(5), client.list("/a"))
        .await
        .expect("pending call should resolve once the worker exits");
    assert!(
        matches!(result, Err(ClientError::ChannelClosed)),
        "got {result:?}"
    );
    assert_eq!(client.state(), ChannelState::Closed);
}

#[tokio::test]
async fn reply_written_just_before_exit_is_delivered() {
    let client = FileClient::spawn(&sh_worker(
        r#"read a; printf '%s\n' '{"error":"","files":[]}'; exit 0"#,
    ))
    .expect("sh worker should start");

    let response = client.list("/a").await.expect("reply should be delivered");
    assert!(response.is_ok());
    assert_eq!(client.shutdown().await, ChannelState::Closed);
}

#[tokio::test]
async fn echoed_request_is_malformed_response() {
    // `cat` sends the request line back; it has no `error` field.
    let client = FileClient::spawn(&sh_worker("exec cat")).expect("cat worker should start");

    let err = client.remove("/tmp/x").await.unwrap_err();
    assert!(matches!(err, ClientError::MalformedResponse(_)), "got {err:?}");
    assert!(client.state().is_open());

    assert_eq!(client.shutdown().await, ChannelState::Closed);
}

#[tokio::test]
async fn missing_program_is_spawn_error() {
    let config = ClientConfig::new("/nonexistent/filepipe-worker");
    let err = FileClient::spawn(&config)
        .err()
        .expect("spawn should fail");
    assert!(matches!(err, ClientError::Spawn { .. }));
    assert!(err.to_string().contains("/nonexistent/filepipe-worker"));
}

#[tokio::test]
async fn hung_worker_is_killed_on_shutdown() {
    let config = ClientConfig {
        shutdown_timeout: Duration::from_millis(200),
        ..sh_worker("exec sleep 30")
    };
    let client = FileClient::spawn(&config).expect("sleep worker should start");

    let started = std::time::Instant::now();
    let state = client.shutdown().await;
    assert!(matches!(state, ChannelState::Failed(_)), "state: {state}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn worker_runs_in_configured_directory() {
    let dir = std::env::temp_dir();
    let config = ClientConfig {
        current_dir: Some(dir.clone()),
        ..sh_worker(
            r#"read line; printf '{"error":"%s"}\n' "$(pwd -P)"; read rest"#,
        )
    };
    let client = FileClient::spawn(&config).expect("sh worker should start");

    let response = client.list("/").await.expect("worker should answer");
    let expected = dir.canonicalize().expect("temp dir should resolve");
    assert_eq!(response.error, expected.to_string_lossy());

    client.shutdown().await;
}
