// File: responses.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use once_cell::sync::Lazy;

use crate::mode::Mode;

const STATUS_CODE: u16 = 200;
const STATUS_MESSAGE: &str = "OK";
const BODY: &str = "<html><body>Pong</body></html>";
const HEADERS: [(&str, &str); 2] = [("Content-Type", "text/html"), ("Content-Length", "30")];

const FCGI_VERSION_1: u8 = 1;
const FCGI_END_REQUEST: u8 = 3;
const FCGI_STDOUT: u8 = 6;
const FCGI_REQUEST_ID: u16 = 1;

const AJP_SEND_BODY_CHUNK: u8 = 0x03;
const AJP_SEND_HEADERS: u8 = 0x04;
const AJP_END_RESPONSE: u8 = 0x05;

fn joined_headers() -> String {
    HEADERS
        .iter()
        .map(|(name, value)| format!("{}: {}\r\n", name, value))
        .collect()
}

fn http_style() -> Vec<u8> {
    format!(
        "HTTP/1.1 {} {}\r\n{}\r\n{}",
        STATUS_CODE,
        STATUS_MESSAGE,
        joined_headers(),
        BODY
    )
    .into_bytes()
}

fn cgi_style() -> Vec<u8> {
    format!(
        "Status: {} {}\r\n{}\r\n{}",
        STATUS_CODE,
        STATUS_MESSAGE,
        joined_headers(),
        BODY
    )
    .into_bytes()
}

fn fcgi_record(record_type: u8, content: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(8 + content.len());
    record.push(FCGI_VERSION_1);
    record.push(record_type);
    record.extend_from_slice(&FCGI_REQUEST_ID.to_be_bytes());
    record.extend_from_slice(&(content.len() as u16).to_be_bytes());
    record.push(0); // padding length
    record.push(0); // reserved
    record.extend_from_slice(content);
    record
}

fn fastcgi() -> Vec<u8> {
    let mut stream = fcgi_record(FCGI_STDOUT, &cgi_style());
    stream.extend(fcgi_record(FCGI_STDOUT, &[]));
    // app status (u32), protocol status, three reserved bytes
    stream.extend(fcgi_record(FCGI_END_REQUEST, &[0; 8]));
    stream
}

fn ajp_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    out.push(0);
}

fn ajp_packet(data: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(4 + data.len());
    packet.extend_from_slice(b"AB");
    packet.extend_from_slice(&(data.len() as u16).to_be_bytes());
    packet.extend_from_slice(data);
    packet
}

fn ajp() -> Vec<u8> {
    let mut headers = vec![AJP_SEND_HEADERS];
    headers.extend_from_slice(&STATUS_CODE.to_be_bytes());
    ajp_string(&mut headers, STATUS_MESSAGE);
    headers.extend_from_slice(&(HEADERS.len() as u16).to_be_bytes());
    for (name, value) in HEADERS {
        ajp_string(&mut headers, name);
        ajp_string(&mut headers, value);
    }

    let mut body = vec![AJP_SEND_BODY_CHUNK];
    body.extend_from_slice(&(BODY.len() as u16).to_be_bytes());
    body.extend_from_slice(BODY.as_bytes());
    body.push(0);

    let mut stream = ajp_packet(&headers);
    stream.extend(ajp_packet(&body));
    // reuse flag off
    stream.extend(ajp_packet(&[AJP_END_RESPONSE, 0]));
    stream
}

static HTTP_RESPONSE: Lazy<Vec<u8>> = Lazy::new(http_style);
static SCGI_RESPONSE: Lazy<Vec<u8>> = Lazy::new(cgi_style);
static FASTCGI_RESPONSE: Lazy<Vec<u8>> = Lazy::new(fastcgi);
static AJP_RESPONSE: Lazy<Vec<u8>> = Lazy::new(ajp);

/// Canned upstream reply for `mode`. Request mode has none: the stub builds
/// its answer from the incoming request instead.
pub fn canned_response(mode: Mode) -> Option<&'static [u8]> {
    match mode {
        Mode::Request => None,
        Mode::Response | Mode::Uwsgi => Some(HTTP_RESPONSE.as_slice()),
        Mode::Scgi => Some(SCGI_RESPONSE.as_slice()),
        Mode::FastCgi => Some(FASTCGI_RESPONSE.as_slice()),
        Mode::Ajp => Some(AJP_RESPONSE.as_slice()),
    }
}

/// Request-mode reply, echoing the marker when the request carried one.
pub fn marker_echo(marker: Option<i32>) -> Vec<u8> {
    match marker {
        Some(id) => format!(
            "HTTP/1.1 200 OK\nX-Desync-Id: {}\nContent-Type: text/html\nContent-Length: 0\n\n",
            id
        )
        .into_bytes(),
        None => b"HTTP/1.1 200 OK\nContent-Type: text/html\nContent-Length: 0\n\n".to_vec(),
    }
}
