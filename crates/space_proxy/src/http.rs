use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

use space_catalog::Catalog;
use space_shaping::{CancellationToken, RateLimiter, Shaper};

use crate::debug;
use crate::distance_cache::DistanceCache;
use crate::error::ProxyError;
use crate::flow::FlowContext;
use crate::http_parse::{
    build_forward_request_head, query_param, split_absolute_uri, split_host_port, split_path_query, RequestHead,
};

/// Forward-proxy + debug-surface HTTP frontend (spec §4.6). Raw
/// `tokio::net::TcpListener` plus a hand-rolled request-line/header
/// parser: pulling in a full HTTP stack here would be scope creep on a
/// hot path the spec explicitly keeps to "minimal HTTP header parsing".
pub struct HttpFrontend {
    pub catalog: Arc<Catalog>,
    pub distance_cache: Arc<DistanceCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub zone: String,
    pub bandwidth_baseline_bps: f64,
    pub listen_port: u16,
}

fn now_unix() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// Idle-connection ceiling for the HTTP frontend (spec §5).
const IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

impl HttpFrontend {
    pub async fn serve(self: Arc<Self>) -> io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.listen_port)).await?;
        tracing::info!(port = self.listen_port, "http frontend listening");
        loop {
            let (socket, peer) = listener.accept().await?;
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                let client_ip = peer.ip();
                match tokio::time::timeout(IDLE_TIMEOUT, this.handle_connection(socket, client_ip)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::warn!(client_ip = %client_ip, error = %err, "http connection ended with an i/o error");
                    }
                    Err(_) => {
                        tracing::warn!(client_ip = %client_ip, "http connection idle-timed out");
                    }
                }
            });
        }
    }

    async fn handle_connection(&self, socket: TcpStream, client_ip: IpAddr) -> io::Result<()> {
        let mut reader = BufReader::new(socket);
        let Some(request) = read_request_head(&mut reader).await? else {
            return Ok(());
        };

        if !self.rate_limiter.admit(client_ip) {
            tracing::warn!(client_ip = %client_ip, "rate limited");
            return write_proxy_error(reader.get_mut(), &ProxyError::RateLimited).await;
        }

        if request.method.eq_ignore_ascii_case("CONNECT") {
            self.handle_connect(reader, request, client_ip).await
        } else {
            self.handle_forward(reader, request, client_ip).await
        }
    }

    async fn handle_connect(&self, mut reader: BufReader<TcpStream>, request: RequestHead, client_ip: IpAddr) -> io::Result<()> {
        let (host_only, default_port) = split_host_port(&request.target, 443);

        let route = match space_router::parse_host(&host_only, &self.zone, &self.catalog) {
            Ok(route) => route,
            Err(err) => return write_proxy_error(reader.get_mut(), &err.into()).await,
        };
        let Some(target) = route.target else {
            return write_proxy_error(reader.get_mut(), &ProxyError::BadTarget).await;
        };
        let target_port = target.port.unwrap_or(default_port);

        let Some((delay, occluded, distance_km)) = self.distance_cache.chain_totals(&route.chain) else {
            return write_proxy_error(reader.get_mut(), &ProxyError::UnknownBody).await;
        };

        let bandwidth_bps = self.bandwidth_for_chain(&route.chain, distance_km);
        let flow = FlowContext {
            client_ip,
            chain: route.chain,
            target_host: target.host,
            target_port,
            delay,
            bandwidth_bps,
            created_at: Instant::now(),
        };

        if occluded {
            tracing::warn!(client_ip = %flow.client_ip, chain = %flow.chain_label(), target = %flow.target_label(), "occluded");
            return write_proxy_error(reader.get_mut(), &ProxyError::Occluded(flow.chain_label())).await;
        }

        let upstream = match TcpStream::connect((flow.target_host.as_str(), flow.target_port)).await {
            Ok(s) => s,
            Err(e) => return write_proxy_error(reader.get_mut(), &ProxyError::UpstreamUnreachable(e)).await,
        };

        reader.get_mut().write_all(b"HTTP/1.1 200 Connection established\r\n\r\n").await?;
        tracing::info!(
            client_ip = %flow.client_ip, chain = %flow.chain_label(), target = %flow.target_label(),
            delay_ms = flow.delay.as_millis(), "connect tunnel established"
        );

        self.pump(reader, upstream, flow).await
    }

    async fn handle_forward(&self, mut reader: BufReader<TcpStream>, request: RequestHead, client_ip: IpAddr) -> io::Result<()> {
        let (host_header, origin_path_and_query) = match split_absolute_uri(&request.target) {
            Some((host, path_and_query)) => (host.to_string(), path_and_query),
            None => (
                request.header("host").unwrap_or_default().to_string(),
                request.target.clone(),
            ),
        };
        let (path_only, query_only) = split_path_query(&origin_path_and_query);

        if let Some(endpoint) = path_only.strip_prefix("/_debug/") {
            return self.handle_debug(reader.get_mut(), endpoint, query_only).await;
        }

        let (host_only, _) = split_host_port(&host_header, self.listen_port);
        let route = match space_router::parse_host(&host_only, &self.zone, &self.catalog) {
            Ok(route) => route,
            Err(err) => return write_proxy_error(reader.get_mut(), &err.into()).await,
        };

        let mut target = route.target.clone();
        if let Some(dest) = query_param(query_only, "destination") {
            let (host, port) = split_host_port(dest, 80);
            target = Some(space_router::Target { host, port: Some(port) });
        }

        let Some(target) = target else {
            if path_only == "/" {
                if let Some(body) = route.chain.last().and_then(|name| self.catalog.lookup(name)) {
                    let html = debug::render_body_info_page(&self.catalog, &self.distance_cache, body, &self.zone);
                    return write_http_response(reader.get_mut(), 200, "OK", "text/html", &html).await;
                }
            }
            return write_proxy_error(reader.get_mut(), &ProxyError::BadTarget).await;
        };

        let Some((delay, occluded, distance_km)) = self.distance_cache.chain_totals(&route.chain) else {
            return write_proxy_error(reader.get_mut(), &ProxyError::UnknownBody).await;
        };
        let bandwidth_bps = self.bandwidth_for_chain(&route.chain, distance_km);
        let target_port = target.port.unwrap_or(80);
        let flow = FlowContext {
            client_ip,
            chain: route.chain,
            target_host: target.host,
            target_port,
            delay,
            bandwidth_bps,
            created_at: Instant::now(),
        };

        if occluded {
            tracing::warn!(client_ip = %flow.client_ip, chain = %flow.chain_label(), target = %flow.target_label(), "occluded");
            return write_proxy_error(reader.get_mut(), &ProxyError::Occluded(flow.chain_label())).await;
        }

        let upstream = match TcpStream::connect((flow.target_host.as_str(), flow.target_port)).await {
            Ok(s) => s,
            Err(e) => return write_proxy_error(reader.get_mut(), &ProxyError::UpstreamUnreachable(e)).await,
        };

        tracing::info!(
            client_ip = %flow.client_ip, chain = %flow.chain_label(), target = %flow.target_label(),
            delay_ms = flow.delay.as_millis(), "forward request admitted"
        );

        let header_bytes = build_forward_request_head(&request, &origin_path_and_query, &flow.target_host);
        let (client_read, client_write) = tokio::io::split(reader);
        let (upstream_read, upstream_write) = upstream.into_split();
        let to_upstream_src = PrefixedReader::new(header_bytes, client_read);

        let shaper = Shaper::new(flow.delay, flow.bandwidth_bps);
        let cancel = CancellationToken::new();

        let upload = tokio::spawn({
            let cancel = cancel.clone();
            async move { shaper.run_direction(to_upstream_src, upstream_write, cancel).await }
        });
        let download_result = shaper.run_direction(upstream_read, client_write, cancel.clone()).await;
        cancel.cancel();
        let _ = upload.await;
        download_result.map(|_| ()).map_err(io::Error::other)
    }

    async fn pump(&self, reader: BufReader<TcpStream>, upstream: TcpStream, flow: FlowContext) -> io::Result<()> {
        let (client_read, client_write) = tokio::io::split(reader);
        let (upstream_read, upstream_write) = upstream.into_split();

        let shaper = Shaper::new(flow.delay, flow.bandwidth_bps);
        let cancel = CancellationToken::new();

        let upload = tokio::spawn({
            let cancel = cancel.clone();
            async move { shaper.run_direction(client_read, upstream_write, cancel).await }
        });
        let download_result = shaper.run_direction(upstream_read, client_write, cancel.clone()).await;
        cancel.cancel();
        let _ = upload.await;
        download_result.map(|_| ()).map_err(io::Error::other)
    }

    async fn handle_debug(&self, socket: &mut TcpStream, endpoint: &str, query: &str) -> io::Result<()> {
        match endpoint {
            "help" => write_http_response(socket, 200, "OK", "text/plain", &debug::render_help(&self.zone)).await,
            "distances" => {
                let body = debug::render_distances(&self.catalog, &self.distance_cache, now_unix());
                write_http_response(socket, 200, "OK", "text/plain", &body).await
            }
            "bodies" if query.contains("format=json") => {
                let body = debug::render_bodies_json(&self.catalog).to_string();
                write_http_response(socket, 200, "OK", "application/json", &body).await
            }
            "bodies" => write_http_response(socket, 200, "OK", "text/plain", &debug::render_bodies_text(&self.catalog)).await,
            "domains" => write_http_response(socket, 200, "OK", "text/plain", &debug::render_domains(&self.catalog, &self.zone)).await,
            _ => write_http_response(socket, 404, "Not Found", "text/plain", "unknown debug endpoint\n").await,
        }
    }

    fn bandwidth_for_chain(&self, chain: &[String], distance_km: f64) -> f64 {
        chain
            .last()
            .and_then(|name| self.catalog.lookup(name))
            .map(|body| space_orbits::bandwidth_bps(body, self.bandwidth_baseline_bps, distance_km))
            .unwrap_or(self.bandwidth_baseline_bps)
    }
}

/// Prepends `prefix` to `inner`'s byte stream without copying the two into
/// one buffer. `AsyncRead` has no `std::io::Read::chain` equivalent, so the
/// forward-proxy path (rebuilt header bytes, then the client's raw body)
/// gets this small adapter instead.
struct PrefixedReader<R> {
    prefix: std::io::Cursor<Vec<u8>>,
    inner: R,
}

impl<R> PrefixedReader<R> {
    fn new(prefix: Vec<u8>, inner: R) -> Self {
        Self { prefix: std::io::Cursor::new(prefix), inner }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for PrefixedReader<R> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if (self.prefix.position() as usize) < self.prefix.get_ref().len() {
            let n = std::io::Read::read(&mut self.prefix, buf.initialize_unfilled())?;
            buf.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

async fn read_request_head<S: tokio::io::AsyncRead + Unpin>(reader: &mut BufReader<S>) -> io::Result<Option<RequestHead>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let line = line.trim_end();
    let mut parts = line.splitn(3, ' ');
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line).await? == 0 {
            break;
        }
        let trimmed = header_line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    Ok(Some(RequestHead { method, target, headers }))
}

async fn write_http_response<W: tokio::io::AsyncWrite + Unpin>(
    socket: &mut W,
    status: u16,
    reason: &str,
    content_type: &str,
    body: &str,
) -> io::Result<()> {
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    );
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(body.as_bytes()).await
}

async fn write_proxy_error<W: tokio::io::AsyncWrite + Unpin>(socket: &mut W, err: &ProxyError) -> io::Result<()> {
    let status = err.http_status();
    let reason = err.http_reason();
    let body = format!("{reason}: {err}\n");
    write_http_response(socket, status, reason, "text/plain", &body).await
}
