/*
 * net.rs
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

//! Opening connections: plain TCP, or TCP followed by a rustls handshake.

use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::client::ClientConfig;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::RootCertStore;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::Url;

use crate::stream::Handle;

/// Where opening a connection failed. Address-level failures and handshake failures are retried differently.
#[derive(Debug)]
pub enum OpenError {
    /// DNS, refused or timed-out TCP connect.
    Connect(io::Error),
    /// TCP connected but the stream could not be made usable (invalid name, TLS handshake).
    Handshake(io::Error),
}

/// Build a root certificate store: platform native certs first, then webpki-roots as fallback.
fn build_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    if let Ok(certs) = rustls_native_certs::load_native_certs() {
        for cert in certs {
            let _ = root_store.add(cert);
        }
    }
    if root_store.is_empty() {
        root_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    root_store
}

/// TLS client config for HTTP/1.1 (ALPN http/1.1 only).
pub fn http_client_config() -> Arc<ClientConfig> {
    let mut config = ClientConfig::builder()
        .with_root_certificates(build_root_store())
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

static CONNECTOR: OnceLock<TlsConnector> = OnceLock::new();

fn connector() -> &'static TlsConnector {
    CONNECTOR.get_or_init(|| TlsConnector::from(http_client_config()))
}

/// Connect to the host of `url`, with TLS for https. The whole open is bounded by `budget`.
pub async fn connect(url: &Url, budget: Duration) -> Result<Handle, OpenError> {
    let host = url.host_str().ok_or_else(|| {
        OpenError::Handshake(io::Error::new(io::ErrorKind::InvalidInput, "url has no host"))
    })?;
    let port = url.port_or_known_default().unwrap_or(80);
    let secure = url.scheme() == "https";
    // IPv6 literals keep their brackets in host_str, which ToSocketAddrs rejects
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let tcp = timeout(budget, TcpStream::connect((bare, port)))
        .await
        .map_err(|_| OpenError::Connect(io::Error::new(io::ErrorKind::TimedOut, "TCP connect timed out")))?
        .map_err(OpenError::Connect)?;
    let _ = tcp.set_nodelay(true);
    if !secure {
        debug!(host, port, "connected");
        return Ok(Handle::Tcp(tcp));
    }
    let server_name = ServerName::try_from(bare.to_string())
        .map_err(|_| OpenError::Handshake(io::Error::new(io::ErrorKind::InvalidInput, "invalid host name")))?;
    let tls = timeout(budget, connector().connect(server_name, tcp))
        .await
        .map_err(|_| OpenError::Handshake(io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out")))?
        .map_err(OpenError::Handshake)?;
    debug!(host, port, "connected with TLS");
    Ok(Handle::Tls(Box::new(tls)))
}
