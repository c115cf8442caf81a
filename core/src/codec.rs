/*
 * codec.rs
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

//! Incremental compression context attached to an `AsyncStream`.
//!
//! Input arrives in arbitrary pieces across suspension points, so every update
//! ends with a sync flush and hands back whatever output the flush produced.
//! `finish` terminates the stream format (gzip trailer, final deflate block).

use std::io::{self, Write};

use flate2::write::{DeflateDecoder, DeflateEncoder, GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use flate2::Compression;

/// Wire format of the compressed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Raw deflate blocks, no header.
    Raw,
    /// zlib wrapper; what HTTP calls `deflate`.
    Deflate,
    Gzip,
}

impl Encoding {
    /// Map a `Content-Encoding` value. `identity`, `compress`, `br` and unknown tokens give `None`.
    pub fn from_content_encoding(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Encoding::Gzip),
            "deflate" => Some(Encoding::Deflate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inflate,
    Deflate,
}

/// One flate2 writer: input goes in through `Write`, output accumulates in the inner Vec.
trait Stage: Write {
    fn output(&mut self) -> &mut Vec<u8>;
    fn close(self: Box<Self>) -> io::Result<Vec<u8>>;
}

macro_rules! stage {
    ($($t:ident),*) => {
        $(
            impl Stage for $t<Vec<u8>> {
                fn output(&mut self) -> &mut Vec<u8> {
                    self.get_mut()
                }

                fn close(self: Box<Self>) -> io::Result<Vec<u8>> {
                    (*self).finish()
                }
            }
        )*
    };
}

stage!(DeflateDecoder, ZlibDecoder, GzDecoder, DeflateEncoder, ZlibEncoder, GzEncoder);

/// Active inflate or deflate context.
pub struct Codec {
    direction: Direction,
    encoding: Encoding,
    stage: Box<dyn Stage>,
}

impl Codec {
    pub fn inflate(encoding: Encoding) -> Self {
        let stage: Box<dyn Stage> = match encoding {
            Encoding::Raw => Box::new(DeflateDecoder::new(Vec::new())),
            Encoding::Deflate => Box::new(ZlibDecoder::new(Vec::new())),
            Encoding::Gzip => Box::new(GzDecoder::new(Vec::new())),
        };
        Self {
            direction: Direction::Inflate,
            encoding,
            stage,
        }
    }

    pub fn deflate(encoding: Encoding) -> Self {
        let level = Compression::default();
        let stage: Box<dyn Stage> = match encoding {
            Encoding::Raw => Box::new(DeflateEncoder::new(Vec::new(), level)),
            Encoding::Deflate => Box::new(ZlibEncoder::new(Vec::new(), level)),
            Encoding::Gzip => Box::new(GzEncoder::new(Vec::new(), level)),
        };
        Self {
            direction: Direction::Deflate,
            encoding,
            stage,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Feed `input` and sync-flush. Returns the output made available so far, possibly empty.
    pub fn update(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        if !input.is_empty() {
            self.stage.write_all(input)?;
        }
        self.stage.flush()?;
        Ok(std::mem::take(self.stage.output()))
    }

    /// Terminate the stream and return the trailing output. The context cannot be reused.
    pub fn finish(mut self) -> io::Result<Vec<u8>> {
        let pending = std::mem::take(self.stage.output());
        let mut tail = self.stage.close()?;
        if pending.is_empty() {
            Ok(tail)
        } else {
            let mut out = pending;
            out.append(&mut tail);
            Ok(out)
        }
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("direction", &self.direction)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// One-shot decode of a complete body.
pub fn decode(encoding: Encoding, data: &[u8]) -> io::Result<Vec<u8>> {
    let mut codec = Codec::inflate(encoding);
    let mut out = codec.update(data)?;
    out.extend(codec.finish()?);
    Ok(out)
}
