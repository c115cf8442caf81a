/*
 * error.rs
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

//! Error types for streams, requests and task orchestration.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::message::Request;
use crate::scheduler::TaskId;

/// Why a request failed after its connection was attempted. Drives the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The stream could not be opened (TLS handshake, unusable address).
    Open,
    /// The connection opened but the peer never produced a complete response.
    NoResponse,
    /// Malformed response, local misuse, or a stream closed by cancellation.
    Other,
}

/// Errors raised by [`crate::stream::AsyncStream`] and the codec behind it.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream is not readable")]
    NotReadable,
    #[error("stream is not writable")]
    NotWritable,
    #[error("stream is not seekable")]
    NotSeekable,
    #[error("stream is detached")]
    Detached,
    #[error("length parameter cannot be negative: {0}")]
    NegativeLength(i64),
    #[error("stream was closed")]
    Closed,
    #[error("stream timed out after {0:?}")]
    TimedOut(Duration),
    #[error("a compression context is already attached")]
    CodecInUse,
    #[error("compression context already finished; detach and re-wrap the handle")]
    CodecFinished,
    #[error("could not create stream pair ({code:?}): {message}")]
    Pair { code: Option<i32>, message: String },
    #[error("codec: {0}")]
    Codec(#[source] io::Error),
    #[error("stream I/O: {0}")]
    Io(#[from] io::Error),
}

impl StreamError {
    /// True for failures that mean the peer went away or never answered.
    pub fn is_unresponsive(&self) -> bool {
        match self {
            StreamError::TimedOut(_) => true,
            StreamError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Errors surfaced to users of `Hyper` and `HttpTasks`.
#[derive(Debug, Error)]
pub enum HyperError {
    /// DNS failure, refused connection or connect timeout.
    #[error("network error: {message}")]
    Network {
        message: String,
        request: Box<Request>,
        #[source]
        source: Option<io::Error>,
    },
    /// The request was sent (or the stream opened) but no usable response came back.
    #[error("request failed: {message}")]
    Request {
        message: String,
        failure: Failure,
        request: Box<Request>,
        #[source]
        source: Option<io::Error>,
    },
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("invalid HTTP task id: {0}")]
    TaskAccess(TaskId),
    #[error("only {submitted} HTTP tasks submitted, cannot race for {requested}")]
    RaceShortfall { submitted: usize, requested: usize },
    #[error("HTTP task {0} was cancelled before producing a response")]
    Cancelled(TaskId),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid request body: {0}")]
    Body(String),
}

impl HyperError {
    /// The request this error belongs to, for network and transport failures.
    pub fn request(&self) -> Option<&Request> {
        match self {
            HyperError::Network { request, .. } | HyperError::Request { request, .. } => {
                Some(request)
            }
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<Failure> {
        match self {
            HyperError::Network { .. } => Some(Failure::Open),
            HyperError::Request { failure, .. } => Some(*failure),
            _ => None,
        }
    }

    /// Whether `select_send_request` may try again. Open failures only count on the first attempt.
    pub fn is_retryable(&self, first_attempt: bool) -> bool {
        match self.failure() {
            Some(Failure::NoResponse) => true,
            Some(Failure::Open) => first_attempt,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Method;

    fn request() -> Box<Request> {
        Box::new(Request::new(Method::Get, "http://localhost/").unwrap())
    }

    #[test]
    fn retry_classification() {
        let open = HyperError::Network {
            message: "refused".into(),
            request: request(),
            source: None,
        };
        assert!(open.is_retryable(true));
        assert!(!open.is_retryable(false));

        let silent = HyperError::Request {
            message: "failed to respond".into(),
            failure: Failure::NoResponse,
            request: request(),
            source: None,
        };
        assert!(silent.is_retryable(false));
        assert!(silent.request().is_some());

        let misuse = HyperError::Stream(StreamError::NotReadable);
        assert!(!misuse.is_retryable(true));
        assert!(misuse.request().is_none());
    }

    #[test]
    fn unresponsive_kinds() {
        let eof = StreamError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(eof.is_unresponsive());
        assert!(StreamError::TimedOut(Duration::from_millis(5)).is_unresponsive());
        assert!(!StreamError::Closed.is_unresponsive());
    }
}
