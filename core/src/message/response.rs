/*
 * response.rs
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

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::codec::{self, Encoding};
use crate::error::{HyperError, StreamError};
use crate::message::Headers;
use crate::stream::AsyncStream;

/// Status, headers and an optional body stream.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub reason: Option<String>,
    pub version: String,
    pub headers: Headers,
    body: Option<AsyncStream>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: None,
            version: "1.1".to_string(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: AsyncStream) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&mut self) -> Option<&mut AsyncStream> {
        self.body.as_mut()
    }

    pub fn take_body(&mut self) -> Option<AsyncStream> {
        self.body.take()
    }

    /// Remaining body bytes; empty when the response has no body.
    pub async fn bytes(&mut self) -> Result<Bytes, StreamError> {
        match self.body.as_mut() {
            Some(body) if !body.is_detached() => body.get_contents().await,
            _ => Ok(Bytes::new()),
        }
    }

    pub async fn text(&mut self) -> Result<String, StreamError> {
        let data = self.bytes().await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Decode the body as JSON.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, HyperError> {
        let data = self.bytes().await?;
        serde_json::from_slice(&data).map_err(|e| HyperError::Body(e.to_string()))
    }

    /// Body decoded according to `Content-Encoding`, for bodies read without an inflate context.
    pub async fn decompressed(&mut self) -> Result<Bytes, StreamError> {
        let data = self.bytes().await?;
        match self.headers.get("Content-Encoding").and_then(Encoding::from_content_encoding) {
            Some(encoding) => codec::decode(encoding, &data)
                .map(Bytes::from)
                .map_err(StreamError::Codec),
            None => Ok(data),
        }
    }

    /// Status line, headers and body as received.
    pub async fn to_wire(&mut self) -> Result<Vec<u8>, StreamError> {
        let mut head = format!("HTTP/{} {}", self.version, self.status);
        if let Some(reason) = &self.reason {
            head.push(' ');
            head.push_str(reason);
        }
        head.push_str("\r\n");
        for line in self.headers.to_lines() {
            head.push_str(&line);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        let mut wire = head.into_bytes();
        if let Some(body) = self.body.as_mut() {
            wire.extend_from_slice(&body.to_bytes().await);
        }
        Ok(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn json_body() {
        let mut r = Response::new(200).with_body(AsyncStream::from_bytes(br#"{"ok":true}"#.to_vec()));
        let v: serde_json::Value = r.json().await.unwrap();
        assert_eq!(v["ok"], true);
    }

    #[tokio::test]
    async fn decompressed_gzip() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"zipped").unwrap();
        let headers: Headers = [("Content-Encoding", "gzip")].into_iter().collect();
        let mut r = Response::new(200)
            .with_headers(headers)
            .with_body(AsyncStream::from_bytes(enc.finish().unwrap()));
        assert_eq!(&r.decompressed().await.unwrap()[..], b"zipped");
    }

    #[tokio::test]
    async fn wire_without_body() {
        let mut r = Response::new(204).with_reason("No Content");
        let wire = r.to_wire().await.unwrap();
        assert_eq!(wire, b"HTTP/1.1 204 No Content\r\n\r\n");
        assert!(r.bytes().await.unwrap().is_empty());
    }
}
