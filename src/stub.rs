// File: stub.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, info, trace};
use std::borrow::Cow;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{HarnessError, HarnessResult};
use crate::mode::Mode;
use crate::responses::{canned_response, marker_echo};
use crate::token::extract_marker;

pub const STUB_PORT: u16 = 59243;
const LISTEN_BACKLOG: u32 = 10;
const REQUEST_BUFFER_SIZE: usize = 65536;

/// Upstream stand-in the target forwards its backend traffic to.
pub struct StubResponder {
    listener: TcpListener,
    mode: Mode,
}

impl StubResponder {
    /// Binds the listening socket. Failing here means the harness
    /// environment is unusable, so callers treat the error as fatal.
    pub async fn bind(mode: Mode, addr: SocketAddr) -> HarnessResult<Self> {
        let bind_error = |source| HarnessError::StubBind {
            port: addr.port(),
            source,
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;

        info!(
            "Stub responder for {} mode listening on {}",
            mode,
            listener.local_addr()?
        );
        Ok(StubResponder { listener, mode })
    }

    pub fn local_addr(&self) -> HarnessResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Starts the accept loop on its own task.
    pub fn spawn(self) -> HarnessResult<StubHandle> {
        let addr = self.local_addr()?;
        let (override_tx, override_rx) = watch::channel(Vec::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(
            self.listener,
            self.mode,
            override_rx,
            shutdown_rx,
        ));
        Ok(StubHandle {
            addr,
            override_tx,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }
}

/// Owner of a running stub. Dropping it stops the accept loop.
pub struct StubHandle {
    addr: SocketAddr,
    override_tx: watch::Sender<Vec<u8>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<HarnessResult<()>>,
}

impl StubHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Replaces the payload served in non-request modes. An empty payload
    /// restores the canned response.
    pub fn set_override(&self, payload: Vec<u8>) {
        debug!("Stub override payload set to {} bytes", payload.len());
        self.override_tx.send_replace(payload);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops accepting and reports how the accept loop ended.
    pub async fn shutdown(mut self) -> HarnessResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join().await
    }

    /// Waits for the accept loop to end on its own, which only happens on an
    /// accept failure.
    pub async fn join(mut self) -> HarnessResult<()> {
        self.wait().await
    }

    /// Like [`StubHandle::join`] but leaves the handle usable, e.g. inside
    /// `select!`. Must not be awaited again once it has completed.
    pub async fn wait(&mut self) -> HarnessResult<()> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(HarnessError::StubAccept(std::io::Error::new(
                std::io::ErrorKind::Other,
                e,
            ))),
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    mode: Mode,
    override_rx: watch::Receiver<Vec<u8>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> HarnessResult<()> {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("Stub responder shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(HarnessError::StubAccept)?;
                trace!("Stub accepted connection from {}", peer);
                let payload = override_rx.borrow().clone();
                tokio::spawn(async move {
                    if let Err(e) = respond(stream, mode, &payload).await {
                        debug!("Stub connection from {} failed: {}", peer, e);
                    }
                });
            }
        }
    }
}

/// Reads one request and writes one reply.
async fn respond(mut stream: TcpStream, mode: Mode, override_payload: &[u8]) -> std::io::Result<()> {
    let mut buffer = vec![0u8; REQUEST_BUFFER_SIZE - 1];
    let n = stream.read(&mut buffer).await?;
    let reply = build_reply(mode, &buffer[..n], override_payload);
    stream.write_all(&reply).await?;
    stream.shutdown().await
}

/// Reply for `request` under `mode`, honoring a non-empty override.
pub fn build_reply<'a>(mode: Mode, request: &[u8], override_payload: &'a [u8]) -> Cow<'a, [u8]> {
    if mode.is_request() {
        return Cow::Owned(marker_echo(extract_marker(request)));
    }
    if !override_payload.is_empty() {
        return Cow::Borrowed(override_payload);
    }
    match canned_response(mode) {
        Some(canned) => Cow::Borrowed(canned),
        None => Cow::Owned(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Mode::Response)]
    #[case(Mode::Scgi)]
    #[case(Mode::FastCgi)]
    #[case(Mode::Uwsgi)]
    #[case(Mode::Ajp)]
    fn test_canned_reply_without_override(#[case] mode: Mode) {
        let reply = build_reply(mode, b"GET / HTTP/1.1\r\n\r\n", &[]);
        assert_eq!(reply.as_ref(), canned_response(mode).unwrap());
    }

    #[rstest]
    #[case(Mode::Response)]
    #[case(Mode::Ajp)]
    fn test_override_wins(#[case] mode: Mode) {
        let reply = build_reply(mode, b"", b"HTTP/1.1 302 Found\r\n\r\n");
        assert_eq!(reply.as_ref(), b"HTTP/1.1 302 Found\r\n\r\n");
    }

    #[test]
    fn test_request_mode_ignores_override_and_echoes_marker() {
        let reply = build_reply(
            Mode::Request,
            b"GET / HTTP/1.1\r\nX-Desync-Id: 7\r\n\r\n",
            b"ignored",
        );
        let text = String::from_utf8(reply.into_owned()).unwrap();
        assert!(text.contains("X-Desync-Id: 7"));

        let reply = build_reply(Mode::Request, b"GET / HTTP/1.1\r\n\r\n", &[]);
        assert!(!String::from_utf8_lossy(&reply).contains("X-Desync-Id"));
    }

    async fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_stub_serves_canned_then_override() {
        let stub = StubResponder::bind(Mode::Response, "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .spawn()
            .unwrap();
        let addr = stub.local_addr();

        let reply = exchange(addr, b"GET / HTTP/1.1\r\n\r\n").await;
        assert!(String::from_utf8_lossy(&reply).contains("200 OK"));

        stub.set_override(b"HTTP/1.1 500 Broken\r\n\r\n".to_vec());
        let reply = exchange(addr, b"GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(reply, b"HTTP/1.1 500 Broken\r\n\r\n");

        stub.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_connection_does_not_stop_stub() {
        let stub = StubResponder::bind(Mode::Scgi, "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .spawn()
            .unwrap();
        let addr = stub.local_addr();

        for _ in 0..4 {
            drop(TcpStream::connect(addr).await.unwrap());
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!stub.is_finished());

        let reply = exchange(addr, b"x").await;
        assert!(reply.starts_with(b"Status: 200 OK"));
        stub.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unspecified_bind_is_reachable_over_loopback() {
        let stub = StubResponder::bind(Mode::Response, "0.0.0.0:0".parse().unwrap())
            .await
            .unwrap()
            .spawn()
            .unwrap();
        let port = stub.local_addr().port();
        assert!(stub.local_addr().ip().is_unspecified());

        let reply = exchange(SocketAddr::from(([127, 0, 0, 1], port)), b"GET / HTTP/1.1\r\n\r\n").await;
        assert!(String::from_utf8_lossy(&reply).contains("200 OK"));
        stub.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let blocked = blocker.local_addr().unwrap();

        let err = StubResponder::bind(Mode::Scgi, blocked).await.err().unwrap();
        assert!(matches!(err, HarnessError::StubBind { port, .. } if port == blocked.port()));
    }
}
