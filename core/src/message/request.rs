/*
 * request.rs
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

//! HTTP request: method, target URL, version, headers, options and body.
//!
//! Built by `Hyper::request`; sending is done by `Hyper::send_request`.

use bytes::Bytes;
use url::{Position, Url};

use crate::error::HyperError;
use crate::message::{Headers, Options};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Other(&'static str),
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Other(s) => s,
        }
    }

    /// HEAD and OPTIONS responses are never read for a body.
    pub fn expects_body(&self) -> bool {
        !matches!(self, Method::Head | Method::Options)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// "1.0" or "1.1".
    pub version: String,
    pub headers: Headers,
    /// Per-request options; the sending instance's defaults apply when `None`.
    pub options: Option<Options>,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self, HyperError> {
        if url.trim().is_empty() {
            return Err(HyperError::InvalidUrl("empty url".to_string()));
        }
        let url = Url::parse(url).map_err(|e| HyperError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(HyperError::InvalidUrl(format!("unsupported url {}", url)));
        }
        Ok(Self {
            method,
            url,
            version: "1.1".to_string(),
            headers: Headers::new(),
            options: None,
            body: Bytes::new(),
        })
    }

    /// Add or replace a header.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    pub fn body(&mut self, data: impl Into<Bytes>) -> &mut Self {
        self.body = data.into();
        self
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Path and query as sent in the request line.
    pub fn target(&self) -> &str {
        target(&self.url)
    }

    /// Host header value: the port is included only when it is not the scheme default.
    pub fn host_header(&self) -> String {
        host_header(&self.url)
    }

    /// Request line, headers and body exactly as written to the connection.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/{}\r\n",
            self.method.as_str(),
            self.target(),
            self.version
        );
        if !self.headers.contains("Host") {
            head.push_str("Host: ");
            head.push_str(&self.host_header());
            head.push_str("\r\n");
        }
        for line in self.headers.to_lines() {
            head.push_str(&line);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        let mut wire = head.into_bytes();
        wire.extend_from_slice(&self.body);
        wire
    }
}

fn target(url: &Url) -> &str {
    let t = &url[Position::BeforePath..Position::AfterQuery];
    if t.is_empty() {
        "/"
    } else {
        t
    }
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}
