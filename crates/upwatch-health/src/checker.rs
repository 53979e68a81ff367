//! Probe strategies.
//!
//! Every strategy shares one contract: [`CheckStrategy::probe`] never fails.
//! Transport errors and timeouts are logged and folded into a result with
//! `http_code = 0`, so classification always runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HOST, USER_AGENT};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use upwatch_core::{CheckKind, RawProbeResult, SiteSpec};

use crate::error::ProbeError;
use crate::websocket::WebSocketCheck;

pub(crate) const USER_AGENT_VALUE: &str = concat!("upwatch/", env!("CARGO_PKG_VERSION"));

/// Connection attempts per TCP probe.
pub const TCP_ATTEMPTS: u32 = 5;

/// How long a websocket probe waits for an inbound message after sending.
pub const WEBSOCKET_MESSAGE_WAIT: Duration = Duration::from_secs(2);

/// One network probe against a site.
#[async_trait]
pub trait CheckStrategy: Send + Sync {
    async fn probe(&self, site: &SiteSpec) -> RawProbeResult;
}

// ── Connection plumbing ─────────────────────────────────────────────

pub(crate) trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// Plain or TLS stream, erased.
pub(crate) type BoxedIo = Box<dyn Io>;

/// Where an http(s)/ws(s) probe connects and what it asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Target {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    /// `host[:port]` for the Host header.
    pub authority: String,
    /// Origin-form request target.
    pub path: String,
}

impl Target {
    pub fn parse(url: &str) -> Result<Self, ProbeError> {
        let uri: http::Uri = url
            .parse()
            .map_err(|_| ProbeError::InvalidUrl(url.to_string()))?;
        let tls = match uri.scheme_str() {
            Some("https") | Some("wss") => true,
            Some("http") | Some("ws") => false,
            _ => return Err(ProbeError::InvalidUrl(url.to_string())),
        };
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProbeError::InvalidUrl(url.to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });
        let authority = uri
            .authority()
            .map(|a| a.as_str().rsplit('@').next().unwrap_or(a.as_str()).to_string())
            .unwrap_or_else(|| host.clone());
        let path = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string());
        Ok(Self {
            host,
            port,
            tls,
            authority,
            path,
        })
    }
}

/// Mozilla roots via webpki, ring provider.
pub fn default_tls_config() -> Result<Arc<rustls::ClientConfig>, ProbeError> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config =
        rustls::ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
            .with_safe_default_protocol_versions()
            .map_err(|e| ProbeError::Tls(e.to_string()))?
            .with_root_certificates(root_store)
            .with_no_client_auth();
    Ok(Arc::new(config))
}

pub(crate) async fn connect(target: &Target, tls: &TlsConnector) -> Result<BoxedIo, ProbeError> {
    let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
    if !target.tls {
        return Ok(Box::new(stream));
    }
    let server_name = rustls::pki_types::ServerName::try_from(target.host.clone())
        .map_err(|e| ProbeError::Tls(e.to_string()))?;
    let stream = tls.connect(server_name, stream).await?;
    Ok(Box::new(stream))
}

// ── HTTP ────────────────────────────────────────────────────────────

/// HTTP(S) request using the site's method, body, and headers.
#[derive(Clone)]
pub struct HttpCheck {
    tls: TlsConnector,
}

impl HttpCheck {
    pub fn new(tls: Arc<rustls::ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(tls),
        }
    }
}

#[async_trait]
impl CheckStrategy for HttpCheck {
    async fn probe(&self, site: &SiteSpec) -> RawProbeResult {
        let started = Instant::now();
        let result = tokio::time::timeout(site.timeout(), http_exchange(site, &self.tls)).await;
        let total_time = started.elapsed();

        match result {
            Ok(Ok((code, body))) => {
                debug!(slug = %site.slug, code, ms = total_time.as_millis() as u64, "http probe result");
                RawProbeResult {
                    http_code: code,
                    total_time,
                    body: Some(body),
                }
            }
            Ok(Err(e)) => {
                debug!(slug = %site.slug, error = %e, url = %site.url, "http probe failed");
                RawProbeResult {
                    total_time,
                    ..RawProbeResult::failed()
                }
            }
            Err(_) => {
                debug!(slug = %site.slug, url = %site.url, "http probe timed out");
                RawProbeResult {
                    total_time,
                    ..RawProbeResult::failed()
                }
            }
        }
    }
}

async fn http_exchange(site: &SiteSpec, tls: &TlsConnector) -> Result<(u16, String), ProbeError> {
    let target = Target::parse(&site.url)?;
    let io = connect(&target, tls).await?;

    let (mut sender, conn) =
        hyper::client::conn::http1::handshake(hyper_util::rt::TokioIo::new(io)).await?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut builder = http::Request::builder()
        .method(site.method.as_str())
        .uri(target.path.as_str())
        .header(HOST, target.authority.as_str())
        .header(USER_AGENT, USER_AGENT_VALUE);
    for (name, value) in &site.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let body = Full::new(Bytes::from(site.body.clone().unwrap_or_default()));
    let req = builder.body(body)?;

    let resp = sender.send_request(req).await?;
    let code = resp.status().as_u16();
    let bytes = resp.into_body().collect().await?.to_bytes();
    Ok((code, String::from_utf8_lossy(&bytes).into_owned()))
}

// ── TCP ─────────────────────────────────────────────────────────────

/// Repeated raw TCP connects; latency is the mean of the successes.
#[derive(Debug, Clone)]
pub struct TcpCheck {
    attempts: u32,
}

impl TcpCheck {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }
}

impl Default for TcpCheck {
    fn default() -> Self {
        Self::new(TCP_ATTEMPTS)
    }
}

#[async_trait]
impl CheckStrategy for TcpCheck {
    async fn probe(&self, site: &SiteSpec) -> RawProbeResult {
        let Some((host, port)) = tcp_target(site) else {
            warn!(slug = %site.slug, url = %site.url, "tcp check needs a host and port");
            return RawProbeResult::failed();
        };

        let mut latencies = Vec::with_capacity(self.attempts as usize);
        for attempt in 1..=self.attempts {
            let started = Instant::now();
            match tokio::time::timeout(site.timeout(), TcpStream::connect((host.as_str(), port)))
                .await
            {
                Ok(Ok(_stream)) => latencies.push(started.elapsed()),
                Ok(Err(e)) => debug!(slug = %site.slug, attempt, error = %e, "tcp connect failed"),
                Err(_) => debug!(slug = %site.slug, attempt, "tcp connect timed out"),
            }
        }

        if latencies.is_empty() {
            debug!(slug = %site.slug, %host, port, "all tcp attempts failed");
            return RawProbeResult::failed();
        }

        let mean = latencies.iter().sum::<Duration>() / latencies.len() as u32;
        debug!(
            slug = %site.slug,
            ok = latencies.len(),
            attempts = self.attempts,
            ms = mean.as_millis() as u64,
            "tcp probe result"
        );
        RawProbeResult {
            http_code: 200,
            total_time: mean,
            body: None,
        }
    }
}

/// Host from the site url (scheme and path ignored), port from the site
/// or, failing that, from the url.
fn tcp_target(site: &SiteSpec) -> Option<(String, u16)> {
    let rest = site
        .url
        .split_once("://")
        .map_or(site.url.as_str(), |(_, rest)| rest);
    let authority = rest.split('/').next()?.trim();

    let (host, url_port) = if let Some(inner) = authority.strip_prefix('[') {
        let (host, after) = inner.split_once(']')?;
        (host, after.strip_prefix(':').and_then(|p| p.parse().ok()))
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => (host, port.parse().ok()),
            _ => (authority, None),
        }
    };

    let port = site.port.or(url_port)?;
    (!host.is_empty()).then(|| (host.to_string(), port))
}

// ── Dispatch ────────────────────────────────────────────────────────

/// The three built-in strategies, chosen per site by [`CheckKind`].
#[derive(Clone)]
pub struct Checks {
    http: HttpCheck,
    tcp: TcpCheck,
    websocket: WebSocketCheck,
}

impl Checks {
    pub fn new() -> Result<Self, ProbeError> {
        Ok(Self::with_tls_config(default_tls_config()?))
    }

    pub fn with_tls_config(tls: Arc<rustls::ClientConfig>) -> Self {
        Self {
            http: HttpCheck::new(tls.clone()),
            tcp: TcpCheck::default(),
            websocket: WebSocketCheck::new(tls, WEBSOCKET_MESSAGE_WAIT),
        }
    }

    pub fn strategy_for(&self, kind: CheckKind) -> &dyn CheckStrategy {
        match kind {
            CheckKind::Http => &self.http,
            CheckKind::Tcp => &self.tcp,
            CheckKind::WebSocket => &self.websocket,
        }
    }
}

#[async_trait]
impl CheckStrategy for Checks {
    async fn probe(&self, site: &SiteSpec) -> RawProbeResult {
        self.strategy_for(site.check).probe(site).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn checks() -> Checks {
        Checks::new().unwrap()
    }

    /// Serve one canned HTTP response on an ephemeral port.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = sock.read(&mut buf).await;
            sock.write_all(response.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
        });
        format!("http://{addr}/status")
    }

    #[test]
    fn target_defaults_ports_and_path() {
        let t = Target::parse("https://example.com").unwrap();
        assert_eq!((t.host.as_str(), t.port, t.tls, t.path.as_str()), ("example.com", 443, true, "/"));

        let t = Target::parse("ws://localhost:9000/socket?x=1").unwrap();
        assert_eq!(t.port, 9000);
        assert!(!t.tls);
        assert_eq!(t.path, "/socket?x=1");
        assert_eq!(t.authority, "localhost:9000");
    }

    #[test]
    fn target_rejects_unknown_scheme() {
        assert!(Target::parse("ftp://example.com").is_err());
        assert!(Target::parse("not a url").is_err());
    }

    #[test]
    fn tcp_target_forms() {
        let mut site = SiteSpec::new("db", "db.internal");
        site.port = Some(5432);
        assert_eq!(tcp_target(&site), Some(("db.internal".into(), 5432)));

        let site = SiteSpec::new("db", "tcp://db.internal:6379");
        assert_eq!(tcp_target(&site), Some(("db.internal".into(), 6379)));

        let site = SiteSpec::new("v6", "[::1]:22");
        assert_eq!(tcp_target(&site), Some(("::1".into(), 22)));

        let site = SiteSpec::new("noport", "db.internal");
        assert_eq!(tcp_target(&site), None);
    }

    #[tokio::test]
    async fn http_probe_reads_status_and_body() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        )
        .await;
        let site = SiteSpec::new("local", &url);

        let raw = checks().probe(&site).await;
        assert_eq!(raw.http_code, 200);
        assert_eq!(raw.body.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn http_probe_reports_server_errors_verbatim() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let raw = checks().probe(&SiteSpec::new("local", &url)).await;
        assert_eq!(raw.http_code, 503);
    }

    #[tokio::test]
    async fn http_probe_to_closed_port_returns_sentinel() {
        let site = SiteSpec::new("closed", "http://127.0.0.1:1/healthz");
        let raw = checks().probe(&site).await;
        assert_eq!(raw.http_code, 0);
        assert!(raw.body.is_none());
    }

    #[tokio::test]
    async fn http_probe_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer.
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let mut site = SiteSpec::new("slow", &format!("http://{addr}/"));
        site.timeout_ms = 100;

        let raw = checks().probe(&site).await;
        assert_eq!(raw.http_code, 0);
    }

    #[tokio::test]
    async fn tcp_probe_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });
        let mut site = SiteSpec::new("tcp", "127.0.0.1");
        site.port = Some(addr.port());
        site.check = CheckKind::Tcp;

        let raw = checks().probe(&site).await;
        assert_eq!(raw.http_code, 200);
        assert!(raw.body.is_none());
    }

    #[tokio::test]
    async fn tcp_probe_all_attempts_fail() {
        let mut site = SiteSpec::new("tcp", "127.0.0.1");
        site.port = Some(1);
        site.check = CheckKind::Tcp;
        site.timeout_ms = 200;

        let raw = TcpCheck::new(2).probe(&site).await;
        assert_eq!(raw.http_code, 0);
    }
}
