/*
 * auth.rs
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

//! Authorization options, normalised into one header value.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Credentials offered for a request. When several are set, Basic wins over Bearer, Bearer over Digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auth {
    pub basic: Option<(String, Option<String>)>,
    pub bearer: Option<String>,
    /// Digest parameters, written as `key="value"` pairs. A `password` entry is never sent.
    pub digest: Option<Vec<(String, String)>>,
}

impl Auth {
    pub fn basic(username: impl Into<String>, password: Option<&str>) -> Self {
        Self {
            basic: Some((username.into(), password.map(str::to_string))),
            ..Self::default()
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.basic.is_none() && self.bearer.is_none() && self.digest.is_none()
    }

    /// Value for the `Authorization` header, if any credentials are set.
    pub fn header_value(&self) -> Option<String> {
        if let Some((user, password)) = &self.basic {
            let secret = match password {
                Some(p) => format!("{}:{}", user, p),
                None => user.clone(),
            };
            return Some(format!("Basic {}", STANDARD.encode(secret)));
        }
        if let Some(token) = &self.bearer {
            return Some(format!("Bearer {}", token));
        }
        self.digest.as_ref().map(|params| {
            let joined: Vec<String> = params
                .iter()
                .filter(|(k, _)| !k.eq_ignore_ascii_case("password"))
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect();
            format!("Digest {}", joined.join(", "))
        })
    }
}
