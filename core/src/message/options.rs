/*
 * options.rs
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

//! Per-request transport options.

use std::time::Duration;

use crate::config::USER_AGENT;

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// "1.0" or "1.1".
    pub protocol_version: String,
    pub follow_location: bool,
    pub max_redirects: u32,
    /// Budget for opening the connection (DNS, TCP and TLS).
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            protocol_version: "1.1".to_string(),
            follow_location: true,
            max_redirects: 10,
            timeout: Duration::from_secs(30),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Per-call overrides; unset fields keep the instance defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionOverrides {
    pub protocol_version: Option<String>,
    pub follow_location: Option<bool>,
    pub max_redirects: Option<u32>,
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl OptionOverrides {
    pub fn is_empty(&self) -> bool {
        *self == OptionOverrides::default()
    }

    pub fn apply(&self, base: &Options) -> Options {
        Options {
            protocol_version: self
                .protocol_version
                .clone()
                .unwrap_or_else(|| base.protocol_version.clone()),
            follow_location: self.follow_location.unwrap_or(base.follow_location),
            max_redirects: self.max_redirects.unwrap_or(base.max_redirects),
            timeout: self.timeout.unwrap_or(base.timeout),
            user_agent: self.user_agent.clone().unwrap_or_else(|| base.user_agent.clone()),
        }
    }
}
