/*
 * hyper.rs
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

//! Request orchestrator: builds requests from instance defaults, sends them over a
//! fresh connection (following redirects), and retries with a growing socket timeout.
//!
//! A `Hyper` tracks its in-flight request and response stream so that the task
//! layer can close the stream when the task is cancelled or loses a race.

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::auth::Auth;
use crate::body::BodySpec;
use crate::codec::Encoding;
use crate::config::{self, Settings};
use crate::error::{Failure, HyperError, StreamError};
use crate::http::{filter_response_headers, parse_status_line, Connection};
use crate::message::{Headers, Method, OptionOverrides, Options, Request, Response};
use crate::net::OpenError;
use crate::scheduler::{current_task, TaskId};
use crate::stream::{AsyncStream, StreamCloser};

/// Per-call additions: credentials, headers and option overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestArgs {
    pub auth: Auth,
    pub headers: Headers,
    pub options: OptionOverrides,
}

impl RequestArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn follow_location(mut self, follow: bool) -> Self {
        self.options.follow_location = Some(follow);
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.options.max_redirects = Some(max);
        self
    }

    pub fn protocol_version(mut self, version: &str) -> Self {
        self.options.protocol_version = Some(version.to_string());
        self
    }

    pub fn user_agent(mut self, agent: &str) -> Self {
        self.options.user_agent = Some(agent.to_string());
        self
    }
}

/// What the instance is doing right now. Shared with the task layer through a `Weak`.
#[derive(Debug, Default)]
pub(crate) struct Inflight {
    request: RefCell<Option<Request>>,
    stream: RefCell<Option<StreamCloser>>,
    task_id: Cell<Option<TaskId>>,
}

impl Inflight {
    pub(crate) fn set_task_id(&self, id: TaskId) {
        if self.task_id.get().is_none() {
            self.task_id.set(Some(id));
        }
    }

    /// Forget the current request and stream without closing anything.
    pub(crate) fn release(&self) {
        self.request.borrow_mut().take();
        self.stream.borrow_mut().take();
    }

    /// Close the current stream, then forget it.
    pub(crate) fn abort(&self) {
        if let Some(stream) = self.stream.borrow_mut().take() {
            stream.close();
        }
        self.request.borrow_mut().take();
    }

    fn track(&self, closer: StreamCloser) {
        *self.stream.borrow_mut() = Some(closer);
    }
}

pub struct Hyper {
    headers: Headers,
    options: Options,
    settings: Settings,
    encoding: bool,
    retry_timeout: Duration,
    inflight: Rc<Inflight>,
}

impl Default for Hyper {
    fn default() -> Self {
        Self::new()
    }
}

impl Hyper {
    pub fn new() -> Self {
        Self::with_settings(config::settings().clone())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let mut headers = Headers::new();
        headers.set("Accept", "*/*");
        headers.set("Accept-Charset", "utf-8");
        headers.set("Connection", "close");
        Self {
            headers,
            options: Options::default(),
            retry_timeout: settings.retry_timeout,
            settings,
            encoding: false,
            inflight: Rc::new(Inflight::default()),
        }
    }

    /// Ask for compressed responses and inflate their bodies transparently.
    pub fn with_encoding(mut self) -> Self {
        self.encoding = true;
        self.headers.set("Accept-Encoding", "gzip, deflate");
        self
    }

    pub fn default_headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Socket timeout of the most recent attempt made by `select_send_request`.
    pub fn retry_timeout(&self) -> Duration {
        self.retry_timeout
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.inflight.task_id.get()
    }

    /// The request currently tracked by this instance.
    pub fn last_request(&self) -> Option<Request> {
        self.inflight.request.borrow().clone()
    }

    pub(crate) fn tracker(&self) -> Weak<Inflight> {
        Rc::downgrade(&self.inflight)
    }

    /// Build a request from the instance defaults plus per-call body, credentials, headers and options.
    ///
    /// Content-Type and Content-Length are derived from the body unless already given.
    pub fn request(
        &mut self,
        method: Method,
        url: &str,
        body: Option<BodySpec>,
        args: RequestArgs,
    ) -> Result<Request, HyperError> {
        let mut request = Request::new(method, url)?;
        let options = if args.options.is_empty() {
            None
        } else {
            Some(args.options.apply(&self.options))
        };
        let effective = options.as_ref().unwrap_or(&self.options);
        request.version = effective.protocol_version.clone();

        let mut headers = self.headers.clone();
        headers.set_default("User-Agent", effective.user_agent.clone());
        if let Some(value) = args.auth.header_value() {
            headers.set("Authorization", value);
        }
        headers.merge(&args.headers);
        if let Some(body) = body {
            let data = body.encode()?;
            headers.set_default("Content-Type", body.content_type());
            headers.set_default("Content-Length", data.len().to_string());
            request.body = data;
        }
        request.headers = headers;
        request.options = options;
        *self.inflight.request.borrow_mut() = Some(request.clone());
        Ok(request)
    }

    /// Send one request and return the response, following redirects when the options allow.
    pub async fn send_request(&mut self, request: Request) -> Result<Response, HyperError> {
        let mut request = request;
        let options = request.options.clone().unwrap_or_else(|| self.options.clone());
        if !request.body.is_empty() {
            request.headers.set("Content-Length", request.body.len().to_string());
        }
        if let Some(id) = current_task() {
            self.inflight.set_task_id(id);
        }
        let task_id = self.inflight.task_id.get();
        *self.inflight.request.borrow_mut() = Some(request.clone());
        let started = Instant::now();

        let mut hop = request.clone();
        let mut lines: Vec<String> = Vec::new();
        let mut redirects = 0;
        let exchange = loop {
            let mut conn = Connection::open(&hop.url, options.timeout)
                .await
                .map_err(|e| open_failure(&request, e))?;
            conn.set_timeout(self.retry_timeout);
            conn.set_task_id(task_id);
            self.inflight.track(conn.closer());
            tokio::task::yield_now().await;

            let result = conn.exchange(&hop.to_wire(), hop.method.expects_body()).await;
            conn.close();
            let exchange = result.map_err(|e| transport_failure(&request, e))?;
            lines.extend(exchange.lines.iter().cloned());

            if options.follow_location && exchange.is_redirect() && redirects < options.max_redirects {
                if let Some(next) = exchange.header("Location").and_then(|l| hop.url.join(l).ok()) {
                    redirects += 1;
                    debug!(task = ?task_id, status = exchange.status, location = %next, "following redirect");
                    if matches!(exchange.status, 301 | 302 | 303) && hop.method != Method::Head {
                        hop.method = Method::Get;
                        hop.body = Bytes::new();
                        hop.headers.remove("Content-Length");
                        hop.headers.remove("Content-Type");
                    }
                    if next.host_str() != hop.url.host_str() {
                        hop.headers.remove("Authorization");
                    }
                    hop.url = next;
                    continue;
                }
            }
            break exchange;
        };
        tokio::task::yield_now().await;

        let lines = if options.follow_location {
            filter_response_headers(lines)
        } else {
            lines
        };
        let (version, status, reason) = lines
            .first()
            .and_then(|l| parse_status_line(l))
            .ok_or_else(|| HyperError::Request {
                message: format!("{}: malformed status line", request.url),
                failure: Failure::Other,
                request: Box::new(request.clone()),
                source: None,
            })?;
        let mut response = Response::new(status)
            .with_version(version)
            .with_headers(Headers::from_lines(&lines[1..]));
        if let Some(reason) = reason {
            response = response.with_reason(reason);
        }

        if hop.method.expects_body() {
            let mut body = AsyncStream::from_bytes(Vec::from(exchange.body))
                .with_uri(hop.url.as_str())
                .with_task(task_id);
            if self.encoding {
                if let Some(encoding) = response
                    .header("Content-Encoding")
                    .and_then(Encoding::from_content_encoding)
                {
                    body.inflate(encoding)?;
                }
            }
            self.inflight.track(body.closer());
            response = response.with_body(body);
        }
        info!(
            task = ?task_id,
            method = %request.method,
            url = %hop.url,
            status,
            redirects,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response"
        );
        Ok(response)
    }

    /// Send with retries. The first attempt uses the short request timeout unless
    /// `with_timeout` is set; each retry multiplies `timeout` by the retry factor.
    pub async fn select_send_request(
        &mut self,
        request: Request,
        attempts: u32,
        timeout: Duration,
        with_timeout: bool,
    ) -> Result<Response, HyperError> {
        let mut remaining = attempts.max(1);
        let mut timeout = timeout;
        let mut attempt = 1u32;
        self.retry_timeout = if with_timeout {
            timeout
        } else {
            self.settings.request_timeout
        };
        loop {
            match self.send_request(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    remaining -= 1;
                    if remaining == 0 || !e.is_retryable(attempt == 1) {
                        warn!(task = ?self.task_id(), url = %request.url, attempt, error = %e, "request failed");
                        return Err(e);
                    }
                    timeout = timeout.mul_f64(self.settings.retry_multiply);
                    self.retry_timeout = timeout;
                    attempt += 1;
                    warn!(
                        task = ?self.task_id(),
                        url = %request.url,
                        attempt,
                        timeout_ms = timeout.as_millis() as u64,
                        error = %e,
                        "retrying"
                    );
                }
            }
        }
    }

    async fn dispatch(
        &mut self,
        method: Method,
        url: &str,
        body: Option<BodySpec>,
        args: RequestArgs,
    ) -> Result<Response, HyperError> {
        let request = self.request(method, url, body, args)?;
        let attempts = self.settings.retry_attempts;
        let timeout = self.settings.retry_timeout;
        self.select_send_request(request, attempts, timeout, false).await
    }

    pub async fn get(&mut self, url: &str, args: RequestArgs) -> Result<Response, HyperError> {
        self.dispatch(Method::Get, url, None, args).await
    }

    pub async fn post(&mut self, url: &str, body: BodySpec, args: RequestArgs) -> Result<Response, HyperError> {
        self.dispatch(Method::Post, url, Some(body), args).await
    }

    pub async fn put(&mut self, url: &str, body: BodySpec, args: RequestArgs) -> Result<Response, HyperError> {
        self.dispatch(Method::Put, url, Some(body), args).await
    }

    pub async fn patch(&mut self, url: &str, body: BodySpec, args: RequestArgs) -> Result<Response, HyperError> {
        self.dispatch(Method::Patch, url, Some(body), args).await
    }

    pub async fn delete(
        &mut self,
        url: &str,
        body: Option<BodySpec>,
        args: RequestArgs,
    ) -> Result<Response, HyperError> {
        self.dispatch(Method::Delete, url, body, args).await
    }

    pub async fn options(&mut self, url: &str, args: RequestArgs) -> Result<Response, HyperError> {
        self.dispatch(Method::Options, url, None, args).await
    }

    /// HEAD, falling back to GET when the server answers 405 or the HEAD fails.
    pub async fn head(&mut self, url: &str, args: RequestArgs) -> Result<Response, HyperError> {
        match self.dispatch(Method::Head, url, None, args.clone()).await {
            Ok(response) if response.status != 405 => Ok(response),
            Ok(_) => {
                debug!(url, "HEAD not allowed, retrying as GET");
                self.get(url, args).await
            }
            Err(e) => {
                debug!(url, error = %e, "HEAD failed, retrying as GET");
                self.get(url, args).await
            }
        }
    }

    /// Drop references to the current request and stream without closing them.
    pub fn flush(&mut self) {
        self.inflight.release();
    }

    /// Close the current stream and drop the references.
    pub fn close(&mut self) {
        self.inflight.abort();
    }
}

fn open_failure(request: &Request, error: OpenError) -> HyperError {
    match error {
        OpenError::Connect(e) => HyperError::Network {
            message: format!("failed to open stream to {}: {}", request.url, e),
            request: Box::new(request.clone()),
            source: Some(e),
        },
        OpenError::Handshake(e) => HyperError::Request {
            message: format!("failed to open stream to {}: {}", request.url, e),
            failure: Failure::Open,
            request: Box::new(request.clone()),
            source: Some(e),
        },
    }
}

fn transport_failure(request: &Request, error: StreamError) -> HyperError {
    let failure = if error.is_unresponsive() {
        Failure::NoResponse
    } else {
        Failure::Other
    };
    let message = match failure {
        Failure::NoResponse => format!("{} failed to respond: {}", request.url, error),
        _ => format!("{}: {}", request.url, error),
    };
    let source = match error {
        StreamError::Io(e) | StreamError::Codec(e) => e,
        StreamError::TimedOut(d) => io::Error::new(io::ErrorKind::TimedOut, format!("timed out after {:?}", d)),
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    };
    HyperError::Request {
        message,
        failure,
        request: Box::new(request.clone()),
        source: Some(source),
    }
}
