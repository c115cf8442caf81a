/*
 * body.rs
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

//! Request body construction: each variant knows its serialisation and default content type.

use std::path::Path;

use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

use crate::error::HyperError;
use crate::stream::AsyncStream;

pub const JSON: &str = "application/json";
pub const FORM: &str = "application/x-www-form-urlencoded";
pub const XML: &str = "application/xml";
pub const PLAIN: &str = "text/plain";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// RFC 1738 form encoding: everything but alphanumerics and `-._` is escaped.
const FORM_ENCODE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

#[derive(Debug, Clone, PartialEq)]
pub enum BodySpec {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Xml(String),
    Raw {
        data: Bytes,
        content_type: Option<String>,
    },
}

impl BodySpec {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HyperError> {
        serde_json::to_value(value)
            .map(BodySpec::Json)
            .map_err(|e| HyperError::Body(e.to_string()))
    }

    pub fn form<K: Into<String>, V: Into<String>>(fields: impl IntoIterator<Item = (K, V)>) -> Self {
        BodySpec::Form(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn raw(data: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        BodySpec::Raw {
            data: data.into(),
            content_type: content_type.map(str::to_string),
        }
    }

    /// Whole file as the body.
    pub async fn file(path: impl AsRef<Path>, content_type: Option<&str>) -> Result<Self, HyperError> {
        let mut stream = AsyncStream::create_from_file(path, "r").await?;
        let data = stream.read_to_end().await?;
        Ok(BodySpec::Raw {
            data,
            content_type: Some(content_type.unwrap_or(OCTET_STREAM).to_string()),
        })
    }

    /// Everything in `source`, from its start when it is seekable.
    pub async fn stream(source: &mut AsyncStream, content_type: Option<&str>) -> Result<Self, HyperError> {
        let mut copy = AsyncStream::copy_resource(source, None).await?;
        let data = copy.read_to_end().await?;
        Ok(BodySpec::Raw {
            data,
            content_type: Some(content_type.unwrap_or(OCTET_STREAM).to_string()),
        })
    }

    pub fn content_type(&self) -> &str {
        match self {
            BodySpec::Json(_) => JSON,
            BodySpec::Form(_) => FORM,
            BodySpec::Xml(_) => XML,
            BodySpec::Raw { content_type, .. } => content_type.as_deref().unwrap_or(PLAIN),
        }
    }

    /// Serialised payload.
    pub fn encode(&self) -> Result<Bytes, HyperError> {
        match self {
            BodySpec::Json(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| HyperError::Body(e.to_string())),
            BodySpec::Form(fields) => Ok(Bytes::from(encode_form(fields))),
            BodySpec::Xml(text) => Ok(Bytes::from(text.clone())),
            BodySpec::Raw { data, .. } => Ok(data.clone()),
        }
    }
}

fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, FORM_ENCODE).to_string().replace("%20", "+")
}

pub(crate) fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}
