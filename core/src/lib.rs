/*
 * lib.rs
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

//! Spool core: an HTTP/1.x client built for cooperative single-threaded concurrency.
//!
//! Requests run as tasks on a tokio `LocalSet`. [`Hyper`] builds and sends requests
//! with retry and backoff, [`HttpTasks`] spawns them and waits for all or races for
//! the first N, and [`AsyncStream`] carries every byte with optional
//! inflate/deflate applied in flight.

pub mod auth;
pub mod body;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod hyper;
pub mod message;
pub mod net;
pub mod scheduler;
pub mod stream;
pub mod tasks;

pub use auth::Auth;
pub use body::BodySpec;
pub use codec::Encoding;
pub use config::Settings;
pub use context::HyperContext;
pub use error::{Failure, HyperError, StreamError};
pub use hyper::{Hyper, RequestArgs};
pub use message::{Headers, Method, OptionOverrides, Options, Request, Response};
pub use scheduler::{CustomState, Scheduler, TaskId, TaskState};
pub use stream::{AsyncStream, Handle, StreamCloser};
pub use tasks::{HttpTasks, Outcome, WaitOptions};
