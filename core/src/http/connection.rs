/*
 * connection.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Spool, an asynchronous HTTP client.
 *
 * Spool is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Spool is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Spool.  If not, see <http://www.gnu.org/licenses/>.
 */

//! One HTTP/1.x exchange over an `AsyncStream`: write the request, drive the parser until the response is complete.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use url::Url;

use crate::error::StreamError;
use crate::http::parser::{ParseState, ResponseEvents, ResponseParser};
use crate::net::{self, OpenError};
use crate::scheduler::TaskId;
use crate::stream::{AsyncStream, StreamCloser};

/// Raw result of one exchange: every header line received (status lines included) and the decoded body.
#[derive(Debug, Default)]
pub struct Exchange {
    pub lines: Vec<String>,
    pub status: u16,
    pub body: Bytes,
}

impl Exchange {
    /// Value of `name` in the final header block.
    pub fn header(&self, name: &str) -> Option<&str> {
        let block = self
            .lines
            .iter()
            .rposition(|l| l.starts_with("HTTP/"))
            .unwrap_or(0);
        self.lines[block..]
            .iter()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

/// Collects parser events for the current response block. Interim 1xx blocks are dropped.
#[derive(Default)]
struct Collector {
    lines: Vec<String>,
    block_start: usize,
    status: u16,
    block: Vec<(String, String)>,
    body: BytesMut,
    complete: bool,
}

impl ResponseEvents for Collector {
    fn status(&mut self, line: &str, code: u16) {
        if (100..200).contains(&self.status) {
            self.lines.truncate(self.block_start);
        }
        self.block_start = self.lines.len();
        self.lines.push(line.to_string());
        self.status = code;
        self.block.clear();
    }

    fn header(&mut self, name: &str, value: &str) {
        self.lines.push(format!("{}: {}", name, value));
        self.block.push((name.to_string(), value.to_string()));
    }

    fn body_chunk(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    fn complete(&mut self) {
        self.complete = true;
    }
}

impl Collector {
    fn framing(&self) -> (Option<u64>, bool) {
        let content_length = self
            .block
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<u64>().ok());
        let chunked = self.block.iter().any(|(k, v)| {
            k.eq_ignore_ascii_case("transfer-encoding") && v.to_ascii_lowercase().contains("chunked")
        });
        (content_length, chunked)
    }
}

/// An open connection to one origin.
pub struct Connection {
    stream: AsyncStream,
    chunk: i64,
}

impl Connection {
    /// Open a connection to the origin of `url`; `connect_budget` bounds DNS, TCP and TLS.
    pub async fn open(url: &Url, connect_budget: Duration) -> Result<Self, OpenError> {
        let handle = net::connect(url, connect_budget).await?;
        let stream = AsyncStream::new(handle).with_uri(url.as_str());
        Ok(Self {
            stream,
            chunk: crate::config::settings().fetch_chunk as i64,
        })
    }

    pub fn closer(&self) -> StreamCloser {
        self.stream.closer()
    }

    pub fn set_task_id(&mut self, task_id: Option<TaskId>) {
        self.stream.set_task_id(task_id);
    }

    /// Socket-level bound on each readiness wait.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.stream.set_timeout(Some(timeout));
    }

    /// Write `wire` and read one response. Header lines of interim 1xx blocks are discarded.
    pub async fn exchange(&mut self, wire: &[u8], expect_body: bool) -> Result<Exchange, StreamError> {
        self.stream.write(wire).await?;

        let mut parser = ResponseParser::new();
        let mut buf = BytesMut::with_capacity(8192);
        let mut events = Collector::default();
        loop {
            let data = self.stream.read(self.chunk).await?;
            if data.is_empty() {
                if parser.reads_until_close() {
                    events.complete = true;
                    break;
                }
                return Err(StreamError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection before a complete response",
                )));
            }
            buf.extend_from_slice(&data);
            loop {
                parser.receive(&mut buf, &mut events)?;
                if parser.state() != ParseState::HeadersComplete {
                    break;
                }
                if (100..200).contains(&events.status) {
                    parser.reset();
                    continue;
                }
                let (content_length, chunked) = events.framing();
                if !expect_body || matches!(events.status, 204 | 304) {
                    parser.set_body_mode(Some(0), false, &mut events);
                } else {
                    parser.set_body_mode(content_length, chunked, &mut events);
                }
            }
            if events.complete {
                break;
            }
        }
        Ok(Exchange {
            lines: events.lines,
            status: events.status,
            body: events.body.freeze(),
        })
    }

    pub fn close(&mut self) {
        self.stream.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(reply: &'static [u8]) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            sock.write_all(reply).await.unwrap();
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    #[tokio::test]
    async fn skips_interim_and_reads_body() {
        let url = serve_once(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
        let mut conn = Connection::open(&url, Duration::from_secs(2)).await.unwrap();
        let ex = conn.exchange(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n", true).await.unwrap();
        assert_eq!(ex.status, 200);
        assert_eq!(&ex.body[..], b"ok");
        assert_eq!(ex.lines, vec!["HTTP/1.1 200 OK", "Content-Length: 2"]);
        assert_eq!(ex.header("content-length"), Some("2"));
    }

    #[tokio::test]
    async fn eof_before_status() {
        let url = serve_once(b"").await;
        let mut conn = Connection::open(&url, Duration::from_secs(2)).await.unwrap();
        let err = conn.exchange(b"GET / HTTP/1.1\r\n\r\n", true).await.unwrap_err();
        assert!(err.is_unresponsive());
    }

    #[tokio::test]
    async fn head_has_no_body() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n").await;
        let mut conn = Connection::open(&url, Duration::from_secs(2)).await.unwrap();
        let ex = conn.exchange(b"HEAD / HTTP/1.1\r\n\r\n", false).await.unwrap();
        assert!(ex.body.is_empty());
    }
}
