/*
 * mod.rs
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

//! Cooperative byte stream over a platform handle.
//!
//! Every read and write suspends the calling task on handle readiness, so other
//! tasks on the same local scheduler make progress meanwhile. A stream can carry
//! one inflate or deflate context, applied transparently to reads or writes.
//! Closing through a [`StreamCloser`] is observed at the next suspension point.

mod handle;

pub use handle::{Handle, Mode};

use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::codec::{Codec, Direction, Encoding};
use crate::config;
use crate::error::StreamError;
use crate::scheduler::TaskId;

/// Compression context lifecycle. `Finished` is terminal until the handle is detached.
#[derive(Debug)]
enum CodecState {
    Absent,
    Active(Codec),
    Finished,
}

/// Shared close signal for one stream. Clones observe and trigger the same close.
#[derive(Debug, Clone, Default)]
pub struct StreamCloser(CancellationToken);

impl StreamCloser {
    pub fn close(&self) {
        self.0.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_cancelled()
    }
}

pub struct AsyncStream {
    handle: Option<Handle>,
    readable: bool,
    writable: bool,
    seekable: bool,
    at_eof: bool,
    size: Option<u64>,
    uri: Option<String>,
    task_id: Option<TaskId>,
    codec: CodecState,
    timeout: Option<Duration>,
    chunk_size: usize,
    chunk_window: Duration,
    closer: StreamCloser,
}

impl AsyncStream {
    pub fn new(handle: Handle) -> Self {
        let settings = config::settings();
        Self {
            readable: handle.is_readable(),
            writable: handle.is_writable(),
            seekable: handle.is_seekable(),
            handle: Some(handle),
            at_eof: false,
            size: None,
            uri: None,
            task_id: None,
            codec: CodecState::Absent,
            timeout: None,
            chunk_size: settings.fetch_chunk,
            chunk_window: settings.chunk_window,
            closer: StreamCloser::default(),
        }
    }

    /// Temporary in-memory stream positioned at the start of `data`.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Handle::memory(data.into()))
    }

    /// Empty temporary stream, ready for writing.
    pub fn memory() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// Open a file with an fopen-style mode string (`r`, `w+`, `a`, ...).
    pub async fn create_from_file(path: impl AsRef<Path>, mode: &str) -> Result<Self, StreamError> {
        let parsed = Mode::parse(mode).ok_or_else(|| {
            StreamError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file mode {:?}", mode),
            ))
        })?;
        let uri = path.as_ref().display().to_string();
        let handle = Handle::open(path, parsed).await?;
        Ok(Self::new(handle).with_uri(uri))
    }

    /// Two connected local socket handles.
    #[cfg(unix)]
    pub fn pair() -> Result<(Handle, Handle), StreamError> {
        let (a, b) = tokio::net::UnixStream::pair().map_err(|e| StreamError::Pair {
            code: e.raw_os_error(),
            message: e.to_string(),
        })?;
        Ok((Handle::Unix(a), Handle::Unix(b)))
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_task(mut self, task_id: Option<TaskId>) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn set_task_id(&mut self, task_id: Option<TaskId>) {
        self.task_id = task_id;
    }

    /// Bound every read-ready and write-ready wait. `None` waits indefinitely.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    pub fn closer(&self) -> StreamCloser {
        self.closer.clone()
    }

    pub fn is_readable(&self) -> bool {
        self.readable && !self.closer.is_closed()
    }

    pub fn is_writable(&self) -> bool {
        self.writable && !self.closer.is_closed()
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable && !self.closer.is_closed()
    }

    pub fn is_detached(&self) -> bool {
        self.handle.is_none()
    }

    /// Attach an inflate context applied to everything read from now on.
    pub fn inflate(&mut self, encoding: Encoding) -> Result<(), StreamError> {
        self.attach_codec(Codec::inflate(encoding))
    }

    /// Attach a deflate context applied to everything written from now on.
    pub fn deflate(&mut self, encoding: Encoding) -> Result<(), StreamError> {
        self.attach_codec(Codec::deflate(encoding))
    }

    fn attach_codec(&mut self, codec: Codec) -> Result<(), StreamError> {
        match self.codec {
            CodecState::Absent => {
                self.codec = CodecState::Active(codec);
                Ok(())
            }
            CodecState::Active(_) => Err(StreamError::CodecInUse),
            CodecState::Finished => Err(StreamError::CodecFinished),
        }
    }

    fn codec_direction(&self) -> Option<Direction> {
        match &self.codec {
            CodecState::Active(c) => Some(c.direction()),
            _ => None,
        }
    }

    /// Terminate an active context and return its trailing output.
    fn finish_codec(&mut self) -> Result<Vec<u8>, StreamError> {
        match std::mem::replace(&mut self.codec, CodecState::Finished) {
            CodecState::Active(codec) => codec.finish().map_err(StreamError::Codec),
            other => {
                self.codec = other;
                Ok(Vec::new())
            }
        }
    }

    /// Drop the handle if a closer fired since the last operation.
    fn observe_close(&mut self) {
        if self.closer.is_closed() && self.handle.is_some() {
            self.detach();
        }
    }

    async fn bounded<T>(
        closer: &StreamCloser,
        limit: Option<Duration>,
        op: impl Future<Output = io::Result<T>>,
    ) -> Result<T, StreamError> {
        let guarded = async {
            match limit {
                Some(d) => match tokio::time::timeout(d, op).await {
                    Ok(r) => r.map_err(StreamError::from),
                    Err(_) => Err(StreamError::TimedOut(d)),
                },
                None => op.await.map_err(StreamError::from),
            }
        };
        tokio::select! {
            biased;
            _ = closer.0.cancelled() => Err(StreamError::Closed),
            r = guarded => r,
        }
    }

    /// One read-ready wait and read from the handle, bypassing the codec.
    async fn pull_raw(&mut self, limit: Option<Duration>, length: usize) -> Result<Vec<u8>, StreamError> {
        let closer = self.closer.clone();
        let handle = self.handle.as_mut().ok_or(StreamError::Detached)?;
        let mut buf = vec![0u8; length];
        let result = Self::bounded(&closer, limit, handle.read_ready(&mut buf)).await;
        match result {
            Ok(n) => {
                if n == 0 {
                    self.at_eof = true;
                }
                buf.truncate(n);
                Ok(buf)
            }
            Err(StreamError::Closed) => {
                self.detach();
                Err(StreamError::Closed)
            }
            Err(e) => Err(e),
        }
    }

    /// Read through the inflate context when one is active. Empty means end of stream.
    async fn pull(&mut self, limit: Option<Duration>, length: usize) -> Result<Vec<u8>, StreamError> {
        loop {
            let raw = self.pull_raw(limit, length).await?;
            if self.codec_direction() != Some(Direction::Inflate) {
                return Ok(raw);
            }
            if raw.is_empty() {
                return self.finish_codec();
            }
            if let CodecState::Active(codec) = &mut self.codec {
                let out = codec.update(&raw).map_err(StreamError::Codec)?;
                if !out.is_empty() {
                    return Ok(out);
                }
            }
        }
    }

    async fn push_raw(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        let closer = self.closer.clone();
        let limit = self.timeout;
        let handle = self.handle.as_mut().ok_or(StreamError::Detached)?;
        let result = Self::bounded(&closer, limit, handle.write_ready(data)).await;
        if let Err(StreamError::Closed) = result {
            self.detach();
        }
        result
    }

    /// Read until EOF, a stalled chunk window, or an empty read.
    ///
    /// The first wait is bounded by the stream timeout; once data has arrived each
    /// further wait is bounded by the chunk window, and a window expiry returns what
    /// has accumulated. An active inflate context is finished before returning.
    pub async fn get_contents(&mut self) -> Result<Bytes, StreamError> {
        self.observe_close();
        if !self.readable || self.handle.is_none() {
            error!(uri = ?self.uri, task = ?self.task_id, "get_contents on a stream that is not readable");
            return Err(StreamError::NotReadable);
        }
        let started = Instant::now();
        let mut buffer = BytesMut::new();
        loop {
            let began = Instant::now();
            let limit = if buffer.is_empty() { self.timeout } else { Some(self.chunk_window) };
            let chunk = match self.pull(limit, self.chunk_size).await {
                Ok(chunk) => chunk,
                Err(StreamError::TimedOut(_)) if !buffer.is_empty() => break,
                Err(e) => return Err(e),
            };
            if chunk.is_empty() {
                break;
            }
            buffer.extend_from_slice(&chunk);
            if began.elapsed() >= self.chunk_window {
                break;
            }
        }
        if self.codec_direction() == Some(Direction::Inflate) {
            buffer.extend_from_slice(&self.finish_codec()?);
        }
        debug!(
            uri = ?self.uri,
            task = ?self.task_id,
            bytes = buffer.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "get_contents"
        );
        Ok(buffer.freeze())
    }

    /// Read through any inflate context until end of stream, with no chunk window.
    ///
    /// Meant for files and buffers, where a slow iteration does not mean the data has ended.
    pub async fn read_to_end(&mut self) -> Result<Bytes, StreamError> {
        self.observe_close();
        if !self.readable || self.handle.is_none() {
            error!(uri = ?self.uri, task = ?self.task_id, "read_to_end on a stream that is not readable");
            return Err(StreamError::NotReadable);
        }
        let mut buffer = BytesMut::new();
        loop {
            let chunk = self.pull(self.timeout, self.chunk_size).await?;
            if chunk.is_empty() {
                break;
            }
            buffer.extend_from_slice(&chunk);
        }
        debug!(uri = ?self.uri, task = ?self.task_id, bytes = buffer.len(), "read_to_end");
        Ok(buffer.freeze())
    }

    /// Read up to `length` bytes after one readiness wait. `read(0)` returns empty at once.
    ///
    /// At most one chunk is read per call, however large `length` is.
    pub async fn read(&mut self, length: i64) -> Result<Bytes, StreamError> {
        if length < 0 {
            error!(uri = ?self.uri, task = ?self.task_id, length, "negative read length");
            return Err(StreamError::NegativeLength(length));
        }
        if length == 0 {
            return Ok(Bytes::new());
        }
        self.observe_close();
        if !self.readable || self.handle.is_none() {
            error!(uri = ?self.uri, task = ?self.task_id, "read on a stream that is not readable");
            return Err(StreamError::NotReadable);
        }
        let started = Instant::now();
        let length = usize::try_from(length).unwrap_or(usize::MAX).min(self.chunk_size);
        let data = self.pull(self.timeout, length).await?;
        debug!(
            uri = ?self.uri,
            task = ?self.task_id,
            bytes = data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "read"
        );
        Ok(Bytes::from(data))
    }

    /// Write `data` after suspending on write-readiness; returns bytes written to the handle.
    ///
    /// With a deflate context the data is compressed and sync-flushed first. Writing
    /// an empty buffer, or a flush that yields nothing, finishes the context.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        self.observe_close();
        if !self.writable || self.handle.is_none() {
            error!(uri = ?self.uri, task = ?self.task_id, "write on a stream that is not writable");
            return Err(StreamError::NotWritable);
        }
        self.size = None;
        let started = Instant::now();
        let payload = if self.codec_direction() == Some(Direction::Deflate) {
            let flushed = match &mut self.codec {
                CodecState::Active(codec) if !data.is_empty() => {
                    codec.update(data).map_err(StreamError::Codec)?
                }
                _ => Vec::new(),
            };
            if flushed.is_empty() {
                self.finish_codec()?
            } else {
                flushed
            }
        } else {
            data.to_vec()
        };
        let written = if payload.is_empty() { 0 } else { self.push_raw(&payload).await? };
        debug!(
            uri = ?self.uri,
            task = ?self.task_id,
            bytes = written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "write"
        );
        Ok(written)
    }

    /// Size of a file or buffer handle, cached until the next write.
    pub async fn size(&mut self) -> Option<u64> {
        if self.size.is_none() {
            if let Some(h) = &self.handle {
                self.size = h.size().await;
            }
        }
        self.size
    }

    pub async fn seek(&mut self, offset: u64) -> Result<u64, StreamError> {
        self.seek_from(SeekFrom::Start(offset)).await
    }

    pub async fn rewind(&mut self) -> Result<(), StreamError> {
        self.seek(0).await.map(|_| ())
    }

    pub async fn tell(&mut self) -> Result<u64, StreamError> {
        self.seek_from(SeekFrom::Current(0)).await
    }

    async fn seek_from(&mut self, pos: SeekFrom) -> Result<u64, StreamError> {
        self.observe_close();
        if !self.seekable {
            return Err(StreamError::NotSeekable);
        }
        let handle = self.handle.as_mut().ok_or(StreamError::Detached)?;
        let at = handle.seek_to(pos).await?;
        self.at_eof = false;
        Ok(at)
    }

    /// True once a read has hit end of stream, or the stream has no handle.
    pub fn eof(&self) -> bool {
        match &self.handle {
            None => true,
            Some(h) => self.at_eof || h.at_end().unwrap_or(false),
        }
    }

    /// Whole contents from the start for seekable streams; empty on any failure.
    pub async fn to_bytes(&mut self) -> Bytes {
        if self.seekable && self.rewind().await.is_err() {
            return Bytes::new();
        }
        self.get_contents().await.unwrap_or_default()
    }

    /// Release the handle and reset the stream. A second call returns `None`.
    pub fn detach(&mut self) -> Option<Handle> {
        let handle = self.handle.take();
        self.size = None;
        self.uri = None;
        self.readable = false;
        self.writable = false;
        self.seekable = false;
        self.at_eof = false;
        self.task_id = None;
        self.codec = CodecState::Absent;
        handle
    }

    /// Detach and drop the handle, then signal every closer clone.
    pub fn close(&mut self) {
        drop(self.detach());
        self.closer.close();
    }

    /// Copy `source` into `destination` (or a new temporary stream) and rewind the result.
    ///
    /// Each chunk waits on source read-readiness, then on destination write-readiness.
    pub async fn copy_resource(
        source: &mut AsyncStream,
        destination: Option<AsyncStream>,
    ) -> Result<AsyncStream, StreamError> {
        let mut dest = destination.unwrap_or_else(AsyncStream::memory);
        if !source.is_readable() {
            return Err(StreamError::NotReadable);
        }
        if !dest.is_writable() {
            return Err(StreamError::NotWritable);
        }
        if source.seekable {
            source.rewind().await?;
        }
        let chunk = source.chunk_size;
        let mut copied = 0usize;
        loop {
            let data = source.pull_raw(source.timeout, chunk).await?;
            if data.is_empty() {
                break;
            }
            copied += dest.push_raw(&data).await?;
        }
        dest.size = None;
        if dest.seekable {
            dest.rewind().await?;
        }
        debug!(from = ?source.uri, bytes = copied, "copy_resource");
        Ok(dest)
    }
}

impl Drop for AsyncStream {
    fn drop(&mut self) {
        self.closer.close();
    }
}

impl std::fmt::Debug for AsyncStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncStream")
            .field("handle", &self.handle)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .field("seekable", &self.seekable)
            .field("uri", &self.uri)
            .field("task_id", &self.task_id)
            .field("codec", &self.codec)
            .finish()
    }
}

impl From<Handle> for AsyncStream {
    fn from(handle: Handle) -> Self {
        AsyncStream::new(handle)
    }
}
