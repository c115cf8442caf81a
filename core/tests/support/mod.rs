/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * In-process HTTP/1.1 server for the integration tests. Each accepted
 * connection is answered according to a route function that sees the parsed
 * request and the 1-based connection count.
 */

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Request as seen by the server.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub enum Action {
    /// Write these bytes and close.
    Reply(Vec<u8>),
    /// Close without answering.
    Hangup,
    /// Wait, then reply; a client disconnect during the wait is reported.
    Stall(Duration, Vec<u8>),
}

pub type Route = fn(&Captured, usize) -> Action;

pub struct TestServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    hangups: mpsc::UnboundedReceiver<(String, Duration)>,
}

impl TestServer {
    pub async fn start(route: Route) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let (tx, hangups) = mpsc::unbounded_channel();
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(serve(sock, route, n, tx.clone()));
            }
        });
        Self { addr, hits, hangups }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Connections accepted so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Path of the next stalled request whose client went away.
    pub async fn next_hangup(&mut self, within: Duration) -> Option<String> {
        self.next_hangup_timed(within).await.map(|(path, _)| path)
    }

    /// Like `next_hangup`, also giving how long the client waited after sending its request.
    pub async fn next_hangup_timed(&mut self, within: Duration) -> Option<(String, Duration)> {
        tokio::time::timeout(within, self.hangups.recv()).await.ok().flatten()
    }
}

/// Closed port: connecting to it is refused.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

pub fn reply(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\n", status);
    for (k, v) in headers {
        out.push_str(&format!("{}: {}\r\n", k, v));
    }
    out.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", body.len()));
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

pub fn ok(body: &str) -> Action {
    Action::Reply(reply("200 OK", &[("Content-Type", "text/plain")], body.as_bytes()))
}

async fn read_request(sock: &mut TcpStream) -> Option<Captured> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let head_end = loop {
        if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break i;
        }
        let n = sock.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let n = sock.read(&mut tmp).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&tmp[..n]);
    }
    Some(Captured {
        method,
        path,
        headers,
        body,
    })
}

async fn serve(
    mut sock: TcpStream,
    route: Route,
    n: usize,
    hangups: mpsc::UnboundedSender<(String, Duration)>,
) {
    let request = match read_request(&mut sock).await {
        Some(r) => r,
        None => return,
    };
    match route(&request, n) {
        Action::Reply(bytes) => {
            let _ = sock.write_all(&bytes).await;
            let _ = sock.shutdown().await;
        }
        Action::Hangup => drop(sock),
        Action::Stall(wait, bytes) => {
            let mut peek = [0u8; 64];
            let stalled = Instant::now();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let _ = sock.write_all(&bytes).await;
                    let _ = sock.shutdown().await;
                }
                r = sock.read(&mut peek) => {
                    if matches!(r, Ok(0) | Err(_)) {
                        let _ = hangups.send((request.path.clone(), stalled.elapsed()));
                    }
                }
            }
        }
    }
}
