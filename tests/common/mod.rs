// File: common/mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const CHECK_PAYLOAD: &str = "GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";

/// Accepts one connection, reads the request and answers with `chunks`,
/// one write per chunk with a pause in between.
pub async fn split_reply_server(chunks: Vec<Vec<u8>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.set_nodelay(true).unwrap();
        let mut request = [0u8; 4096];
        let _ = stream.read(&mut request).await;
        for chunk in chunks {
            stream.write_all(&chunk).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });
    addr
}

/// A minimal front end: every request is passed to `upstream` once and the
/// upstream's whole reply is sent back before closing.
pub async fn forwarding_target(listener: TcpListener, upstream: SocketAddr) {
    tokio::spawn(async move {
        loop {
            let Ok((mut client, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut request = vec![0u8; 65536];
                let n = match client.read(&mut request).await {
                    Ok(n) => n,
                    Err(_) => return,
                };
                let Ok(mut backend) = TcpStream::connect(upstream).await else {
                    let _ = client
                        .write_all(b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n")
                        .await;
                    return;
                };
                let _ = backend.write_all(&request[..n]).await;
                let mut reply = Vec::new();
                let _ = backend.read_to_end(&mut reply).await;
                let _ = client.write_all(&reply).await;
                let _ = client.shutdown().await;
            });
        }
    });
}

/// Binds and drops a listener to find a port that is currently free.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn control_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    reply
}
