// File: override_session_tests.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

mod common;

use rdesync::config::HarnessSettings;
use rdesync::session::SessionController;
use rdesync::shm::SharedParamBlock;
use rdesync::transport::FileTransport;
use serial_test::serial;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

use common::{control_dir, forwarding_target, free_port, CHECK_PAYLOAD};

/// In response mode the fuzz payload is what the upstream sends back, and
/// the target itself only ever sees the check payload.
#[tokio::test]
#[serial]
async fn test_response_mode_payload_becomes_upstream_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target_port = listener.local_addr().unwrap().port();
    let stub_port = free_port();
    forwarding_target(listener, SocketAddr::from(([127, 0, 0, 1], stub_port))).await;

    let port = target_port.to_string();
    let dir = control_dir(&[
        ("mode", "response"),
        ("check_payload", CHECK_PAYLOAD),
        ("port", port.as_str()),
        ("start.sh", "test \"$HDHUNTER_MODE\" = response\n"),
        (
            "payload",
            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\nHTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n",
        ),
    ]);

    let mut settings = HarnessSettings::new();
    settings.set_control_dir(dir.path());
    settings.set_stub_port(stub_port);
    settings.set_shm_key(libc::IPC_PRIVATE);
    settings.set_retry_window(Duration::from_secs(10));
    settings.set_retry_interval(Duration::from_millis(50));
    settings.set_settle_delay(Duration::ZERO);

    let mut session = SessionController::new(settings, FileTransport::new(dir.path().join("payload")));
    session.configure().unwrap();
    let shm_id = session.block().unwrap().id();

    session.start_target().await.unwrap();
    session.wait_until_ready().await.unwrap();
    let report = session.run_iteration().await.unwrap();
    assert_eq!(report.statuses, vec![200, 502]);
    assert!(report.orders.is_empty());

    // A later iteration starts from a clean block.
    let report = session.run_iteration().await.unwrap();
    assert_eq!(report.statuses, vec![200, 502]);
    assert_eq!(
        session.block().unwrap().snapshot().recorded_statuses(),
        vec![200, 502]
    );

    session.shutdown().await.unwrap();
    SharedParamBlock::remove_id(shm_id).unwrap();
}
