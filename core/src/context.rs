/*
 * context.rs
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

//! Named `Hyper` instances for call sites that share a client by tag.

use std::collections::HashMap;

use crate::error::HyperError;
use crate::hyper::{Hyper, RequestArgs};
use crate::message::Response;

/// Tag to instance map. `None` addresses the default instance.
#[derive(Default)]
pub struct HyperContext {
    default: Option<Hyper>,
    tagged: HashMap<String, Hyper>,
}

impl HyperContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The instance for `tag`, created on first use.
    pub fn instance(&mut self, tag: Option<&str>) -> &mut Hyper {
        match tag {
            None => self.default.get_or_insert_with(Hyper::new),
            Some(tag) => self.tagged.entry(tag.to_string()).or_default(),
        }
    }

    pub fn contains(&self, tag: Option<&str>) -> bool {
        match tag {
            None => self.default.is_some(),
            Some(tag) => self.tagged.contains_key(tag),
        }
    }

    /// Close the instance's stream and forget the instance.
    pub fn clear(&mut self, tag: Option<&str>) {
        let removed = match tag {
            None => self.default.take(),
            Some(tag) => self.tagged.remove(tag),
        };
        if let Some(mut hyper) = removed {
            hyper.close();
        }
    }

    /// Close and forget every instance.
    pub fn clear_all(&mut self) {
        self.clear(None);
        for (_, mut hyper) in self.tagged.drain() {
            hyper.close();
        }
    }

    pub async fn get(&mut self, tag: Option<&str>, url: &str, args: RequestArgs) -> Result<Response, HyperError> {
        self.instance(tag).get(url, args).await
    }

    pub async fn head(&mut self, tag: Option<&str>, url: &str, args: RequestArgs) -> Result<Response, HyperError> {
        self.instance(tag).head(url, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Method;

    #[test]
    fn tags_are_independent() {
        let mut ctx = HyperContext::new();
        ctx.instance(Some("api"))
            .request(Method::Get, "http://api.example/", None, RequestArgs::new())
            .unwrap();
        assert!(ctx.instance(Some("api")).last_request().is_some());
        assert!(ctx.instance(None).last_request().is_none());
        assert!(ctx.contains(Some("api")) && ctx.contains(None));
        ctx.clear(Some("api"));
        assert!(!ctx.contains(Some("api")));
        assert!(ctx.instance(Some("api")).last_request().is_none());
        ctx.clear_all();
        assert!(!ctx.contains(None));
    }
}
