/*
 * config.rs
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

//! Process-wide client settings: retry policy, socket timeouts and read chunking.
//! Defaults come from the constants below; each can be overridden through a
//! `SPOOL_*` environment variable, read once on first use of [`settings`].

use std::sync::OnceLock;
use std::time::Duration;

/// Number of attempts made by `Hyper::select_send_request` before giving up.
pub const RETRY_ATTEMPTS: u32 = 10;

/// Base socket timeout for retried attempts; multiplied by [`RETRY_MULTIPLY`] after each failure.
pub const RETRY_TIMEOUT: Duration = Duration::from_secs(2);

/// Backoff factor applied to the retry timeout.
pub const RETRY_MULTIPLY: f64 = 1.5;

/// Short socket timeout for the first attempt, so a dead server fails fast.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Bytes pulled from a handle per read-ready wakeup.
pub const FETCH_CHUNK: usize = 4096;

/// Once this much time has been spent in one read iteration, `get_contents` returns what it has.
pub const CHUNK_WINDOW: Duration = Duration::from_millis(250);

/// Fixed user agent: client name, crate version and runtime.
pub const USER_AGENT: &str = concat!("Spool/", env!("CARGO_PKG_VERSION"), " (Rust; tokio)");

const ENV_RETRY_ATTEMPTS: &str = "SPOOL_RETRY_ATTEMPTS";
const ENV_RETRY_TIMEOUT_MS: &str = "SPOOL_RETRY_TIMEOUT_MS";
const ENV_RETRY_MULTIPLY: &str = "SPOOL_RETRY_MULTIPLY";
const ENV_REQUEST_TIMEOUT_MS: &str = "SPOOL_REQUEST_TIMEOUT_MS";
const ENV_FETCH_CHUNK: &str = "SPOOL_FETCH_CHUNK";
const ENV_CHUNK_WINDOW_MS: &str = "SPOOL_CHUNK_WINDOW_MS";

/// Tunables shared by every `Hyper` and `AsyncStream` created after they are read.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub retry_attempts: u32,
    pub retry_timeout: Duration,
    pub retry_multiply: f64,
    pub request_timeout: Duration,
    pub fetch_chunk: usize,
    pub chunk_window: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retry_attempts: RETRY_ATTEMPTS,
            retry_timeout: RETRY_TIMEOUT,
            retry_multiply: RETRY_MULTIPLY,
            request_timeout: REQUEST_TIMEOUT,
            fetch_chunk: FETCH_CHUNK,
            chunk_window: CHUNK_WINDOW,
        }
    }
}

impl Settings {
    /// Defaults, with any `SPOOL_*` environment overrides applied. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(n) = parse(&lookup, ENV_RETRY_ATTEMPTS) {
            settings.retry_attempts = n;
        }
        if let Some(ms) = parse(&lookup, ENV_RETRY_TIMEOUT_MS) {
            settings.retry_timeout = Duration::from_millis(ms);
        }
        if let Some(m) = parse::<f64>(&lookup, ENV_RETRY_MULTIPLY) {
            if m.is_finite() && m >= 1.0 {
                settings.retry_multiply = m;
            }
        }
        if let Some(ms) = parse(&lookup, ENV_REQUEST_TIMEOUT_MS) {
            settings.request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse::<usize>(&lookup, ENV_FETCH_CHUNK) {
            if n > 0 {
                settings.fetch_chunk = n;
            }
        }
        if let Some(ms) = parse(&lookup, ENV_CHUNK_WINDOW_MS) {
            settings.chunk_window = Duration::from_millis(ms);
        }
        settings
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Settings for this process, read from the environment on first call.
pub fn settings() -> &'static Settings {
    SETTINGS.get_or_init(Settings::from_env)
}
