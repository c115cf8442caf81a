/*
 * http_integration.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration tests for Hyper against an in-process HTTP/1.1 server:
 * plain and chunked bodies, redirects, compressed responses, the HEAD
 * fallback, and retry with backoff.
 *
 * Run with:
 *   cargo test -p spool_core --test http_integration -- --nocapture
 */

mod support;

use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use tokio::task::LocalSet;

use spool_core::{Auth, BodySpec, Failure, Hyper, HyperError, Method, RequestArgs, Settings};
use support::{ok, refused_url, reply, Action, Captured, TestServer};

fn hyper() -> Hyper {
    Hyper::with_settings(Settings::default())
}

#[tokio::test]
async fn get_sends_default_headers() {
    fn route(req: &Captured, _n: usize) -> Action {
        let echo = json!({
            "method": req.method,
            "path": req.path,
            "user_agent": req.header("User-Agent"),
            "accept": req.header("Accept"),
            "connection": req.header("Connection"),
            "host": req.header("Host"),
        });
        Action::Reply(reply(
            "200 OK",
            &[("Content-Type", "application/json"), ("X-Served-By", "support")],
            echo.to_string().as_bytes(),
        ))
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut hyper = hyper();
            let mut response = hyper.get(&server.url("/items?page=2"), RequestArgs::new()).await.unwrap();
            assert_eq!(response.status, 200);
            assert!(response.is_success());
            assert_eq!(response.header("x-served-by"), Some("support"));
            let echo: Value = response.json().await.unwrap();
            assert_eq!(echo["method"], "GET");
            assert_eq!(echo["path"], "/items?page=2");
            assert_eq!(echo["accept"], "*/*");
            assert_eq!(echo["connection"], "close");
            assert_eq!(echo["host"], server.addr.to_string());
            assert!(echo["user_agent"].as_str().unwrap().starts_with("Spool/"));
        })
        .await;
}

#[tokio::test]
async fn post_json_body() {
    fn route(req: &Captured, _n: usize) -> Action {
        let body = format!(
            "{}|{}|{}",
            req.header("Content-Type").unwrap_or(""),
            req.header("Content-Length").unwrap_or(""),
            String::from_utf8_lossy(&req.body)
        );
        Action::Reply(reply("201 Created", &[], body.as_bytes()))
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut hyper = hyper();
            let body = BodySpec::json(&json!({"name": "spool"})).unwrap();
            let mut response = hyper.post(&server.url("/items"), body, RequestArgs::new()).await.unwrap();
            assert_eq!(response.status, 201);
            assert_eq!(response.reason.as_deref(), Some("Created"));
            assert_eq!(
                response.text().await.unwrap(),
                r#"application/json|16|{"name":"spool"}"#
            );
        })
        .await;
}

#[tokio::test]
async fn form_body_and_basic_auth() {
    fn route(req: &Captured, _n: usize) -> Action {
        let body = format!(
            "{}\n{}",
            req.header("Authorization").unwrap_or(""),
            String::from_utf8_lossy(&req.body)
        );
        Action::Reply(reply("200 OK", &[], body.as_bytes()))
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut hyper = hyper();
            let args = RequestArgs::new().auth(Auth::basic("ann", Some("pw")));
            let body = BodySpec::form([("q", "a b"), ("lang", "en&fr")]);
            let mut response = hyper.put(&server.url("/form"), body, args).await.unwrap();
            assert_eq!(
                response.text().await.unwrap(),
                "Basic YW5uOnB3\nq=a+b&lang=en%26fr"
            );
        })
        .await;
}

#[tokio::test]
async fn chunked_body_is_reassembled() {
    fn route(_req: &Captured, _n: usize) -> Action {
        Action::Reply(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"
                .to_vec(),
        )
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut response = hyper().get(&server.url("/"), RequestArgs::new()).await.unwrap();
            assert_eq!(response.text().await.unwrap(), "hello world");
        })
        .await;
}

#[tokio::test]
async fn redirect_followed_and_earlier_headers_dropped() {
    fn route(req: &Captured, _n: usize) -> Action {
        match req.path.as_str() {
            "/old" => Action::Reply(reply(
                "302 Found",
                &[("Location", "/new"), ("X-Hop", "1")],
                b"",
            )),
            _ => Action::Reply(reply("200 OK", &[("X-Final", "yes")], req.method.as_bytes())),
        }
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut hyper = hyper();
            let body = BodySpec::raw("payload", None);
            let mut response = hyper.post(&server.url("/old"), body, RequestArgs::new()).await.unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(response.header("X-Final"), Some("yes"));
            assert_eq!(response.header("X-Hop"), None);
            // 302 after POST continues as GET
            assert_eq!(response.text().await.unwrap(), "GET");
            assert_eq!(server.hits(), 2);
        })
        .await;
}

#[tokio::test]
async fn redirect_returned_when_not_following() {
    fn route(_req: &Captured, _n: usize) -> Action {
        Action::Reply(reply("301 Moved Permanently", &[("Location", "/elsewhere")], b""))
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let args = RequestArgs::new().follow_location(false);
            let response = hyper().get(&server.url("/"), args).await.unwrap();
            assert_eq!(response.status, 301);
            assert_eq!(response.header("Location"), Some("/elsewhere"));
            assert_eq!(server.hits(), 1);
        })
        .await;
}

#[tokio::test]
async fn interim_response_skipped_without_following() {
    fn route(_req: &Captured, _n: usize) -> Action {
        Action::Reply(
            b"HTTP/1.1 100 Continue\r\n\r\n\
              HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
                .to_vec(),
        )
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let args = RequestArgs::new().follow_location(false);
            let mut response = hyper().get(&server.url("/"), args).await.unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(response.reason.as_deref(), Some("OK"));
            assert_eq!(response.header("Content-Length"), Some("2"));
            assert_eq!(response.headers.len(), 2);
            assert_eq!(response.text().await.unwrap(), "ok");
        })
        .await;
}

#[tokio::test]
async fn gzip_body_inflated_with_encoding() {
    fn route(req: &Captured, _n: usize) -> Action {
        if !req.header("Accept-Encoding").unwrap_or("").contains("gzip") {
            return ok("identity");
        }
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&b"compressed hello ".repeat(64)).unwrap();
        let gz = enc.finish().unwrap();
        Action::Reply(reply("200 OK", &[("Content-Encoding", "gzip")], &gz))
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut hyper = hyper().with_encoding();
            let mut response = hyper.get(&server.url("/"), RequestArgs::new()).await.unwrap();
            assert_eq!(response.text().await.unwrap(), "compressed hello ".repeat(64));

            let mut plain = Hyper::with_settings(Settings::default())
                .get(&server.url("/"), RequestArgs::new())
                .await
                .unwrap();
            assert_eq!(plain.text().await.unwrap(), "identity");
        })
        .await;
}

#[tokio::test]
async fn head_falls_back_to_get_on_405() {
    fn route(req: &Captured, _n: usize) -> Action {
        match req.method.as_str() {
            "HEAD" => Action::Reply(reply("405 Method Not Allowed", &[], b"")),
            _ => ok("via get"),
        }
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut response = hyper().head(&server.url("/"), RequestArgs::new()).await.unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(response.text().await.unwrap(), "via get");
            assert_eq!(server.hits(), 2);
        })
        .await;
}

#[tokio::test]
async fn head_response_has_no_body() {
    fn route(_req: &Captured, _n: usize) -> Action {
        Action::Reply(b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\nConnection: close\r\n\r\n".to_vec())
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut response = hyper().head(&server.url("/"), RequestArgs::new()).await.unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(response.header("Content-Length"), Some("1234"));
            assert!(response.body().is_none());
        })
        .await;
}

#[tokio::test]
async fn retries_after_dropped_connections() {
    fn route(_req: &Captured, n: usize) -> Action {
        if n <= 2 {
            Action::Hangup
        } else {
            ok("third time")
        }
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut hyper = hyper();
            let request = hyper
                .request(Method::Get, &server.url("/"), None, RequestArgs::new())
                .unwrap();
            let base = Duration::from_millis(100);
            let mut response = hyper.select_send_request(request, 3, base, false).await.unwrap();
            assert_eq!(response.text().await.unwrap(), "third time");
            assert_eq!(server.hits(), 3);
            let m = hyper.settings().retry_multiply;
            assert_eq!(hyper.retry_timeout(), base.mul_f64(m).mul_f64(m));
        })
        .await;
}

#[tokio::test]
async fn each_retry_multiplies_the_socket_timeout() {
    fn route(_req: &Captured, _n: usize) -> Action {
        Action::Stall(Duration::from_secs(10), reply("200 OK", &[], b"late"))
    }
    let mut server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut hyper = hyper();
            let request = hyper
                .request(Method::Get, &server.url("/stall"), None, RequestArgs::new())
                .unwrap();
            let base = Duration::from_millis(200);
            let err = hyper
                .select_send_request(request, 3, base, true)
                .await
                .unwrap_err();
            assert_eq!(err.failure(), Some(Failure::NoResponse));

            // Each attempt times out on its own read; the server times how long it waited.
            let m = hyper.settings().retry_multiply;
            let expected = [base, base.mul_f64(m), base.mul_f64(m).mul_f64(m)];
            for (attempt, want) in expected.iter().enumerate() {
                let (path, waited) = server
                    .next_hangup_timed(Duration::from_secs(2))
                    .await
                    .unwrap_or_else(|| panic!("attempt {} was not seen", attempt + 1));
                assert_eq!(path, "/stall");
                assert!(
                    waited + Duration::from_millis(30) >= *want && waited < *want + Duration::from_millis(90),
                    "attempt {}: waited {:?}, timeout {:?}",
                    attempt + 1,
                    waited,
                    want
                );
            }
            assert_eq!(hyper.retry_timeout(), expected[2]);
            assert_eq!(server.hits(), 3);
        })
        .await;
}

#[tokio::test]
async fn exhausted_attempts_report_no_response() {
    fn route(_req: &Captured, _n: usize) -> Action {
        Action::Hangup
    }
    let server = TestServer::start(route).await;
    LocalSet::new()
        .run_until(async {
            let mut hyper = hyper();
            let request = hyper
                .request(Method::Get, &server.url("/"), None, RequestArgs::new())
                .unwrap();
            let err = hyper
                .select_send_request(request, 2, Duration::from_millis(50), true)
                .await
                .unwrap_err();
            assert_eq!(err.failure(), Some(Failure::NoResponse));
            assert!(matches!(err, HyperError::Request { .. }));
            assert_eq!(err.request().map(|r| r.url.path()), Some("/"));
            assert_eq!(server.hits(), 2);
        })
        .await;
}

#[tokio::test]
async fn refused_connection_is_network_error() {
    let url = refused_url().await;
    LocalSet::new()
        .run_until(async {
            let err = hyper().get(&url, RequestArgs::new()).await.unwrap_err();
            assert!(matches!(err, HyperError::Network { .. }), "{:?}", err);
            assert_eq!(err.failure(), Some(Failure::Open));
        })
        .await;
}
