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

//! HTTP/1.x wire layer: response parser, connection exchange and header-block helpers.

pub mod connection;
pub mod parser;

pub use connection::{Connection, Exchange};
pub use parser::{ParseState, ResponseEvents, ResponseParser};

/// Keep only the last header block: everything from the final `HTTP/` status line on.
pub fn filter_response_headers(lines: Vec<String>) -> Vec<String> {
    match lines.iter().rposition(|l| l.starts_with("HTTP/")) {
        Some(start) => lines.into_iter().skip(start).collect(),
        None => lines,
    }
}

/// Split `HTTP/1.1 200 OK` into version, status and reason.
pub fn parse_status_line(line: &str) -> Option<(String, u16, Option<String>)> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next()?.strip_prefix("HTTP/")?.to_string();
    let status = parts.next()?.trim().parse::<u16>().ok()?;
    let reason = parts.next().map(str::trim).filter(|r| !r.is_empty()).map(str::to_string);
    Some((version, status, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_final_block() {
        let lines: Vec<String> = [
            "HTTP/1.1 302 Found",
            "Location: /next",
            "HTTP/1.1 301 Moved Permanently",
            "Location: /last",
            "HTTP/1.1 200 OK",
            "Content-Type: text/plain",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let last = filter_response_headers(lines);
        assert_eq!(last, vec!["HTTP/1.1 200 OK", "Content-Type: text/plain"]);
    }

    #[test]
    fn status_lines() {
        assert_eq!(
            parse_status_line("HTTP/1.1 404 Not Found"),
            Some(("1.1".to_string(), 404, Some("Not Found".to_string())))
        );
        assert_eq!(parse_status_line("HTTP/1.0 200"), Some(("1.0".to_string(), 200, None)));
        assert_eq!(parse_status_line("garbage"), None);
    }
}
