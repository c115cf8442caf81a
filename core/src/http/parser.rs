/*
 * parser.rs
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

//! HTTP/1.x response push parser: status line, headers, body (Content-Length, chunked, or until close).

use bytes::Buf;
use bytes::BytesMut;
use std::io;

/// Callback for response events. The exchange implements this to collect header lines and body.
pub trait ResponseEvents {
    /// Raw status line without CRLF, and the parsed code (0 if unparseable).
    fn status(&mut self, line: &str, code: u16);
    fn header(&mut self, name: &str, value: &str);
    fn body_chunk(&mut self, data: &[u8]);
    fn complete(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Idle,
    StatusLine,
    Headers,
    /// Headers done; caller must call set_body_mode() (or reset() for an interim 1xx block).
    HeadersComplete,
    Body,
    ChunkSize,
    ChunkData,
    ChunkTrailer,
}

/// Push parser for an HTTP/1.x response. Feed bytes via `receive`; events fire as complete tokens are parsed.
pub struct ResponseParser {
    state: ParseState,
    /// Content-Length when known (-1 for chunked or read-until-close).
    content_length: i64,
    bytes_received: i64,
    chunk_remaining: i64,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::StatusLine,
            content_length: -1,
            bytes_received: 0,
            chunk_remaining: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ParseState::StatusLine;
        self.content_length = -1;
        self.bytes_received = 0;
        self.chunk_remaining = 0;
    }

    /// Body delimited by connection close: EOF completes the response.
    pub fn reads_until_close(&self) -> bool {
        self.state == ParseState::Body && self.content_length < 0
    }

    fn find_crlf(buf: &[u8]) -> Option<usize> {
        buf.windows(2).position(|w| w == b"\r\n")
    }

    fn line(buf: &mut BytesMut, end: usize, what: &str) -> io::Result<String> {
        let line = buf.split_to(end + 2);
        std::str::from_utf8(&line[..end])
            .map(str::to_string)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("invalid {} UTF-8", what)))
    }

    /// Consume and parse as much as possible from buf. Partial data remains in buf.
    pub fn receive<E: ResponseEvents>(&mut self, buf: &mut BytesMut, events: &mut E) -> io::Result<()> {
        while !buf.is_empty() {
            match self.state {
                ParseState::StatusLine => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    if line_end == 0 {
                        // stray CRLF between messages
                        buf.advance(2);
                        continue;
                    }
                    let line = Self::line(buf, line_end, "status line")?;
                    if !line.starts_with("HTTP/") {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("malformed status line: {:?}", line),
                        ));
                    }
                    let code = line
                        .split(' ')
                        .nth(1)
                        .and_then(|s| s.parse::<u16>().ok())
                        .unwrap_or(0);
                    events.status(&line, code);
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    if line_end == 0 {
                        buf.advance(2);
                        self.state = ParseState::HeadersComplete;
                        return Ok(());
                    }
                    let line = Self::line(buf, line_end, "header")?;
                    if let Some((name, value)) = line.split_once(':') {
                        events.header(name.trim(), value.trim());
                    }
                }
                ParseState::Body => {
                    if self.content_length >= 0 {
                        let remaining = (self.content_length - self.bytes_received) as usize;
                        let to_read = remaining.min(buf.len());
                        if to_read > 0 {
                            let chunk = buf.split_to(to_read);
                            events.body_chunk(&chunk);
                            self.bytes_received += to_read as i64;
                        }
                        if self.bytes_received >= self.content_length {
                            events.complete();
                            self.state = ParseState::Idle;
                        }
                    } else {
                        let chunk = buf.split_to(buf.len());
                        events.body_chunk(&chunk);
                        return Ok(());
                    }
                }
                ParseState::ChunkSize => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    let line = Self::line(buf, line_end, "chunk size")?;
                    let hex_part = line.split(';').next().unwrap_or("").trim();
                    self.chunk_remaining = i64::from_str_radix(hex_part, 16).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, format!("bad chunk size {:?}", hex_part))
                    })?;
                    self.state = if self.chunk_remaining == 0 {
                        ParseState::ChunkTrailer
                    } else {
                        ParseState::ChunkData
                    };
                }
                ParseState::ChunkData => {
                    let to_read = (self.chunk_remaining as usize).min(buf.len());
                    if to_read > 0 {
                        let chunk = buf.split_to(to_read);
                        events.body_chunk(&chunk);
                        self.chunk_remaining -= to_read as i64;
                    }
                    if self.chunk_remaining > 0 || buf.len() < 2 {
                        return Ok(());
                    }
                    buf.advance(2);
                    self.state = ParseState::ChunkSize;
                }
                ParseState::ChunkTrailer => {
                    let line_end = match Self::find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    // trailer fields are read and dropped
                    buf.advance(line_end + 2);
                    if line_end == 0 {
                        events.complete();
                        self.state = ParseState::Idle;
                    }
                }
                ParseState::HeadersComplete | ParseState::Idle => return Ok(()),
            }
        }
        Ok(())
    }

    /// Called after headers are received (state HeadersComplete).
    pub fn set_body_mode<E: ResponseEvents>(&mut self, content_length: Option<u64>, chunked: bool, events: &mut E) {
        if self.state != ParseState::HeadersComplete {
            return;
        }
        self.bytes_received = 0;
        if chunked {
            self.content_length = -1;
            self.state = ParseState::ChunkSize;
        } else if let Some(cl) = content_length {
            self.content_length = cl as i64;
            if cl == 0 {
                events.complete();
                self.state = ParseState::Idle;
            } else {
                self.state = ParseState::Body;
            }
        } else {
            self.content_length = -1;
            self.state = ParseState::Body;
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
        body: Vec<u8>,
        done: bool,
    }

    impl ResponseEvents for Recorder {
        fn status(&mut self, line: &str, _code: u16) {
            self.lines.push(line.to_string());
        }
        fn header(&mut self, name: &str, value: &str) {
            self.lines.push(format!("{}: {}", name, value));
        }
        fn body_chunk(&mut self, data: &[u8]) {
            self.body.extend_from_slice(data);
        }
        fn complete(&mut self) {
            self.done = true;
        }
    }

    #[test]
    fn content_length_body_split() {
        let mut p = ResponseParser::new();
        let mut r = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhe"[..]);
        p.receive(&mut buf, &mut r).unwrap();
        assert_eq!(p.state(), ParseState::HeadersComplete);
        p.set_body_mode(Some(5), false, &mut r);
        p.receive(&mut buf, &mut r).unwrap();
        buf.extend_from_slice(b"llo");
        p.receive(&mut buf, &mut r).unwrap();
        assert_eq!(p.state(), ParseState::Idle);
        assert_eq!(r.body, b"hello");
        assert_eq!(r.lines, vec!["HTTP/1.1 200 OK", "Content-Length: 5"]);
        assert!(r.done);
    }

    #[test]
    fn chunked_with_trailer() {
        let mut p = ResponseParser::new();
        let mut r = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n"[..]);
        p.receive(&mut buf, &mut r).unwrap();
        p.set_body_mode(None, true, &mut r);
        buf.extend_from_slice(b"4;ext=1\r\nWiki\r\n5\r\npedia\r\n0\r\nX-Sum: 1\r\n\r\n");
        p.receive(&mut buf, &mut r).unwrap();
        assert_eq!(r.body, b"Wikipedia");
        assert!(r.done);
        assert!(buf.is_empty());
    }

    #[test]
    fn until_close() {
        let mut p = ResponseParser::new();
        let mut r = Recorder::default();
        let mut buf = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\nstream"[..]);
        p.receive(&mut buf, &mut r).unwrap();
        p.set_body_mode(None, false, &mut r);
        p.receive(&mut buf, &mut r).unwrap();
        assert!(p.reads_until_close());
        assert_eq!(r.body, b"stream");
        assert!(!r.done);
    }

    #[test]
    fn garbage_status_line() {
        let mut p = ResponseParser::new();
        let mut r = Recorder::default();
        let mut buf = BytesMut::from(&b"SSH-2.0-OpenSSH\r\n"[..]);
        assert!(p.receive(&mut buf, &mut r).is_err());
    }
}
