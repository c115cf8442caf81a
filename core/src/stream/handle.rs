/*
 * handle.rs
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

//! Platform handles wrapped by `AsyncStream`: sockets, TLS, files and in-memory buffers.

use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_rustls::client::TlsStream;

/// fopen-style access mode: which directions a file handle allows and how it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub read: bool,
    pub write: bool,
    append: bool,
    create: bool,
    truncate: bool,
    create_new: bool,
}

impl Mode {
    /// Parse `r`, `r+`, `w`, `w+`, `a`, `a+`, `x`, `x+`, `c`, `c+`. `b` and `t` flags are ignored.
    pub fn parse(mode: &str) -> Option<Self> {
        let flags: String = mode.chars().filter(|c| !matches!(c, 'b' | 't' | 'e')).collect();
        let (base, plus) = match flags.as_str() {
            "r" | "w" | "a" | "x" | "c" => (flags.as_bytes()[0], false),
            "r+" | "w+" | "a+" | "x+" | "c+" => (flags.as_bytes()[0], true),
            _ => return None,
        };
        let mut m = Mode {
            read: base == b'r' || plus,
            write: base != b'r' || plus,
            append: false,
            create: false,
            truncate: false,
            create_new: false,
        };
        match base {
            b'w' => {
                m.create = true;
                m.truncate = true;
            }
            b'a' => {
                m.create = true;
                m.append = true;
            }
            b'x' => m.create_new = true,
            b'c' => m.create = true,
            _ => {}
        }
        Some(m)
    }

    /// Read and write, no creation: used for in-memory buffers.
    pub fn read_write() -> Self {
        Mode {
            read: true,
            write: true,
            append: false,
            create: false,
            truncate: false,
            create_new: false,
        }
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .create(self.create)
            .truncate(self.truncate)
            .create_new(self.create_new);
        options
    }
}

/// A handle an `AsyncStream` can own. Sockets are driven by readiness, the rest by AsyncRead/AsyncWrite.
pub enum Handle {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
    File(File, Mode),
    /// Temporary in-memory handle, readable, writable and seekable.
    Memory(Cursor<Vec<u8>>),
}

impl Handle {
    pub fn memory(data: Vec<u8>) -> Self {
        Handle::Memory(Cursor::new(data))
    }

    pub async fn open(path: impl AsRef<std::path::Path>, mode: Mode) -> io::Result<Self> {
        let file = mode.open_options().open(path).await?;
        Ok(Handle::File(file, mode))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Handle::Tcp(_) => "tcp",
            Handle::Tls(_) => "tls",
            #[cfg(unix)]
            Handle::Unix(_) => "unix",
            Handle::File(..) => "file",
            Handle::Memory(_) => "memory",
        }
    }

    pub fn is_readable(&self) -> bool {
        match self {
            Handle::File(_, mode) => mode.read,
            _ => true,
        }
    }

    pub fn is_writable(&self) -> bool {
        match self {
            Handle::File(_, mode) => mode.write,
            _ => true,
        }
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self, Handle::File(..) | Handle::Memory(_))
    }

    /// Suspend until the handle is read-ready, then read at most `buf.len()` bytes. 0 means EOF.
    pub async fn read_ready(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Handle::Tcp(s) => loop {
                s.readable().await?;
                match s.try_read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e),
                }
            },
            #[cfg(unix)]
            Handle::Unix(s) => loop {
                s.readable().await?;
                match s.try_read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e),
                }
            },
            _ => self.read(buf).await,
        }
    }

    /// Suspend on write-readiness until all of `data` is written. Returns the byte count.
    pub async fn write_ready(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Handle::Tcp(s) => {
                let mut written = 0;
                while written < data.len() {
                    s.writable().await?;
                    match s.try_write(&data[written..]) {
                        Ok(n) => written += n,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                        Err(e) => return Err(e),
                    }
                }
                Ok(written)
            }
            #[cfg(unix)]
            Handle::Unix(s) => {
                let mut written = 0;
                while written < data.len() {
                    s.writable().await?;
                    match s.try_write(&data[written..]) {
                        Ok(n) => written += n,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                        Err(e) => return Err(e),
                    }
                }
                Ok(written)
            }
            _ => {
                self.write_all(data).await?;
                self.flush().await?;
                Ok(data.len())
            }
        }
    }

    pub async fn seek_to(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Handle::File(f, _) => f.seek(pos).await,
            Handle::Memory(c) => std::io::Seek::seek(c, pos),
            _ => Err(io::Error::new(io::ErrorKind::Unsupported, "handle is not seekable")),
        }
    }

    /// Total size for files and buffers; sockets have none.
    pub async fn size(&self) -> Option<u64> {
        match self {
            Handle::File(f, _) => f.metadata().await.ok().map(|m| m.len()),
            Handle::Memory(c) => Some(c.get_ref().len() as u64),
            _ => None,
        }
    }

    /// True when a seekable handle is positioned at its end.
    pub fn at_end(&self) -> Option<bool> {
        match self {
            Handle::Memory(c) => Some(c.position() >= c.get_ref().len() as u64),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.kind())
    }
}

impl From<TcpStream> for Handle {
    fn from(s: TcpStream) -> Self {
        Handle::Tcp(s)
    }
}

impl From<TlsStream<TcpStream>> for Handle {
    fn from(s: TlsStream<TcpStream>) -> Self {
        Handle::Tls(Box::new(s))
    }
}

#[cfg(unix)]
impl From<UnixStream> for Handle {
    fn from(s: UnixStream) -> Self {
        Handle::Unix(s)
    }
}

impl AsyncRead for Handle {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            Handle::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Handle::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            #[cfg(unix)]
            Handle::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Handle::File(f, _) => Pin::new(f).poll_read(cx, buf),
            Handle::Memory(c) => Pin::new(c).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Handle {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            Handle::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Handle::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            #[cfg(unix)]
            Handle::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Handle::File(f, _) => Pin::new(f).poll_write(cx, buf),
            Handle::Memory(c) => Pin::new(c).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Handle::Tcp(s) => Pin::new(s).poll_flush(cx),
            Handle::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            #[cfg(unix)]
            Handle::Unix(s) => Pin::new(s).poll_flush(cx),
            Handle::File(f, _) => Pin::new(f).poll_flush(cx),
            Handle::Memory(c) => Pin::new(c).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Handle::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Handle::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            #[cfg(unix)]
            Handle::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Handle::File(f, _) => Pin::new(f).poll_shutdown(cx),
            Handle::Memory(c) => Pin::new(c).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flags() {
        let r = Mode::parse("r").unwrap();
        assert!(r.read && !r.write);
        let w = Mode::parse("wb").unwrap();
        assert!(!w.read && w.write);
        for m in ["r+", "w+", "a+", "x+", "c+"] {
            let mode = Mode::parse(m).unwrap();
            assert!(mode.read && mode.write, "{}", m);
        }
        for m in ["w", "a", "x", "c"] {
            assert!(!Mode::parse(m).unwrap().read, "{}", m);
        }
        assert!(Mode::parse("q").is_none());
    }

    #[tokio::test]
    async fn memory_handle_reads_and_seeks() {
        let mut h = Handle::memory(b"abcdef".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(h.read_ready(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(h.at_end(), Some(false));
        h.seek_to(SeekFrom::Start(1)).await.unwrap();
        assert_eq!(h.read_ready(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"bcde");
        assert_eq!(h.size().await, Some(6));
    }
}
