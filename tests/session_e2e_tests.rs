// File: session_e2e_tests.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

mod common;

use rdesync::capabilities;
use rdesync::config::HarnessSettings;
use rdesync::param::HttpParam;
use rdesync::session::{exchange, SessionController, SessionState};
use rdesync::shm::{SharedParamBlock, ENV_SHM_ID};
use rdesync::transport::FileTransport;
use serial_test::serial;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

use common::{control_dir, forwarding_target, free_port, split_reply_server, CHECK_PAYLOAD};

const TIMEOUT: Duration = Duration::from_millis(500);

#[tokio::test]
async fn test_pipelined_responses_are_recorded_in_order() {
    let addr = split_reply_server(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec(),
        b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n".to_vec(),
    ])
    .await;

    let mut param = HttpParam::new();
    let report = exchange(addr, b"GET / HTTP/1.1\r\n\r\n", TIMEOUT, &HarnessSettings::new(), &mut param)
        .await
        .unwrap();
    assert_eq!(report.statuses, vec![200, 500]);
    assert_eq!(&param.status[..3], &[200, 500, 0]);
}

#[tokio::test]
async fn test_marker_split_across_reads_is_recovered() {
    let addr = split_reply_server(vec![
        b"HTTP/1.1 200 OK\r\nX-Desync-I".to_vec(),
        b"d: 42\r\nContent-Length: 0\r\n\r\n".to_vec(),
    ])
    .await;

    let mut param = HttpParam::new();
    let report = exchange(addr, b"GET / HTTP/1.1\r\n\r\n", TIMEOUT, &HarnessSettings::new(), &mut param)
        .await
        .unwrap();
    assert_eq!(report.orders, vec![42]);
    assert_eq!(param.order[0], 42);
}

#[tokio::test]
async fn test_status_digits_split_across_reads() {
    let addr = split_reply_server(vec![
        b"HTTP/1.1 4".to_vec(),
        b"0".to_vec(),
        b"4 Not Found\r\n\r\nHTTP/1.1 ".to_vec(),
        b"301 Moved\r\n\r\n".to_vec(),
    ])
    .await;

    let mut param = HttpParam::new();
    let report = exchange(addr, b"x", TIMEOUT, &HarnessSettings::new(), &mut param)
        .await
        .unwrap();
    assert_eq!(report.statuses, vec![404, 301]);
}

/// The only test in this binary that provisions the process-wide block.
#[tokio::test]
#[serial]
async fn test_request_mode_session_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target_port = listener.local_addr().unwrap().port();
    let stub_port = free_port();
    forwarding_target(listener, SocketAddr::from(([127, 0, 0, 1], stub_port))).await;

    let port = target_port.to_string();
    let dir = control_dir(&[
        ("mode", "request\n"),
        ("check_payload", CHECK_PAYLOAD),
        ("port", port.as_str()),
        ("timeout", "1 0"),
        ("start.sh", "exit 0\n"),
        (
            "payload",
            "GET /a HTTP/1.1\r\nHost: localhost\r\nX-Desync-Id: 42\r\n\r\n",
        ),
    ]);
    let results = dir.path().join("results.json");

    let mut settings = HarnessSettings::new();
    settings.set_control_dir(dir.path());
    settings.set_stub_port(stub_port);
    settings.set_shm_key(libc::IPC_PRIVATE);
    settings.set_retry_window(Duration::from_secs(10));
    settings.set_retry_interval(Duration::from_millis(50));
    settings.set_settle_delay(Duration::ZERO);

    let transport = FileTransport::new(dir.path().join("payload")).with_results(&results);
    let mut session = SessionController::new(settings, transport);

    session.configure().unwrap();
    assert_eq!(session.state(), SessionState::Configured);
    let shm_id = session.block().unwrap().id();
    assert_eq!(std::env::var(ENV_SHM_ID).unwrap(), shm_id.to_string());

    session.start_target().await.unwrap();
    assert_eq!(session.target().unwrap().port, target_port);
    session.wait_until_ready().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);

    let report = session.run_iteration().await.unwrap();
    assert_eq!(session.state(), SessionState::Done);
    assert_eq!(report.statuses, vec![200]);
    assert_eq!(report.orders, vec![42]);

    let block = session.block().unwrap().snapshot();
    assert_eq!(block.recorded_statuses(), vec![200]);
    assert_eq!(block.recorded_orders(), vec![42]);

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&results).unwrap()).unwrap();
    assert_eq!(saved["block"]["order"][0], 42);

    // The setup stays cached for the rest of the process.
    let caps = capabilities::configured().unwrap();
    assert_eq!(caps.shm_id, shm_id);

    session.shutdown().await.unwrap();
    SharedParamBlock::remove_id(shm_id).unwrap();
}
