//! RFC 1928 SOCKS5 frontend (spec §4.7): no-auth greeting, CONNECT only.
//! BIND and UDP ASSOCIATE are rejected with `0x07` (command not
//! supported), matching the spec's "reject with 0x07" verbatim.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use space_catalog::Catalog;
use space_shaping::{CancellationToken, RateLimiter, Shaper};

use crate::distance_cache::DistanceCache;
use crate::error::ProxyError;
use crate::flow::FlowContext;

const VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NONE_ACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 0x01;
const CMD_BIND: u8 = 0x02;
const CMD_UDP_ASSOCIATE: u8 = 0x03;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;
const REPLY_SUCCESS: u8 = 0x00;
const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;

/// Idle-connection ceiling for the SOCKS5 frontend (spec §5).
const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub struct Socks5Frontend {
    pub catalog: Arc<Catalog>,
    pub distance_cache: Arc<DistanceCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub zone: String,
    pub bandwidth_baseline_bps: f64,
    pub listen_port: u16,
    /// Body chain used when the destination does not itself end in
    /// `zone` (spec: "fallback: listener default body").
    pub default_chain: Vec<String>,
}

impl Socks5Frontend {
    pub async fn serve(self: Arc<Self>) -> io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.listen_port)).await?;
        tracing::info!(port = self.listen_port, "socks5 frontend listening");
        loop {
            let (socket, peer) = listener.accept().await?;
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                let client_ip = peer.ip();
                match tokio::time::timeout(IDLE_TIMEOUT, this.handle_connection(socket, client_ip)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::warn!(client_ip = %client_ip, error = %err, "socks5 connection ended with an i/o error");
                    }
                    Err(_) => {
                        tracing::warn!(client_ip = %client_ip, "socks5 connection idle-timed out");
                    }
                }
            });
        }
    }

    async fn handle_connection(&self, mut socket: TcpStream, client_ip: IpAddr) -> io::Result<()> {
        if !self.greet(&mut socket).await? {
            return Ok(());
        }

        if !self.rate_limiter.admit(client_ip) {
            return self.reply(&mut socket, ProxyError::RateLimited.socks5_reply_code()).await;
        }

        let Some((cmd, host, port)) = self.read_request(&mut socket).await? else {
            return Ok(());
        };

        if cmd != CMD_CONNECT {
            let name = match cmd {
                CMD_BIND => "BIND",
                CMD_UDP_ASSOCIATE => "UDP ASSOCIATE",
                _ => "unknown",
            };
            tracing::debug!(client_ip = %client_ip, command = name, "rejecting unsupported socks5 command");
            return self.reply(&mut socket, REPLY_COMMAND_NOT_SUPPORTED).await;
        }

        // A destination ending in the zone names a body chain but is not
        // itself dialable; the real upstream target is `route.target`,
        // resolved from whatever preceded the chain in the hostname (spec
        // §4.7, "routed through §4.3"). A bare body-only destination with
        // nothing to forward is a bad target, same as the HTTP frontend.
        let (chain, connect_host) = if host.ends_with(&format!(".{}", self.zone)) || host == self.zone {
            match space_router::parse_host(&host, &self.zone, &self.catalog) {
                Ok(route) => {
                    let Some(target) = route.target else {
                        return self.reply(&mut socket, ProxyError::BadTarget.socks5_reply_code()).await;
                    };
                    (route.chain, target.host)
                }
                Err(err) => {
                    let proxy_err: ProxyError = err.into();
                    return self.reply(&mut socket, proxy_err.socks5_reply_code()).await;
                }
            }
        } else {
            (self.default_chain.clone(), host.clone())
        };

        let Some((delay, occluded, distance_km)) = self.distance_cache.chain_totals(&chain) else {
            return self.reply(&mut socket, ProxyError::UnknownBody.socks5_reply_code()).await;
        };

        let bandwidth_bps = chain
            .last()
            .and_then(|name| self.catalog.lookup(name))
            .map(|body| space_orbits::bandwidth_bps(body, self.bandwidth_baseline_bps, distance_km))
            .unwrap_or(self.bandwidth_baseline_bps);

        let flow = FlowContext {
            client_ip,
            chain,
            target_host: connect_host,
            target_port: port,
            delay,
            bandwidth_bps,
            created_at: Instant::now(),
        };

        if occluded {
            tracing::warn!(client_ip = %flow.client_ip, chain = %flow.chain_label(), target = %flow.target_label(), "occluded");
            return self.reply(&mut socket, ProxyError::Occluded(flow.chain_label()).socks5_reply_code()).await;
        }

        let upstream = match TcpStream::connect((flow.target_host.as_str(), flow.target_port)).await {
            Ok(s) => s,
            Err(_) => return self.reply(&mut socket, ProxyError::UpstreamUnreachable(io_other()).socks5_reply_code()).await,
        };

        self.reply(&mut socket, REPLY_SUCCESS).await?;
        tracing::info!(
            client_ip = %flow.client_ip, chain = %flow.chain_label(), target = %flow.target_label(),
            delay_ms = flow.delay.as_millis(), "socks5 connect admitted"
        );

        let (client_read, client_write) = tokio::io::split(socket);
        let (upstream_read, upstream_write) = upstream.into_split();

        let shaper = Shaper::new(flow.delay, flow.bandwidth_bps);
        let cancel = CancellationToken::new();
        let upload = tokio::spawn({
            let cancel = cancel.clone();
            async move { shaper.run_direction(client_read, upstream_write, cancel).await }
        });
        let download = shaper.run_direction(upstream_read, client_write, cancel.clone()).await;
        cancel.cancel();
        let _ = upload.await;
        download.map(|_| ()).map_err(io::Error::other)
    }

    /// Reads the greeting (`VER NMETHODS METHODS`) and replies. Returns
    /// `Ok(false)` if the client offered no acceptable method (connection
    /// should be closed without a further request).
    async fn greet(&self, socket: &mut TcpStream) -> io::Result<bool> {
        let mut head = [0u8; 2];
        socket.read_exact(&mut head).await?;
        if head[0] != VERSION {
            return Ok(false);
        }
        let mut methods = vec![0u8; head[1] as usize];
        socket.read_exact(&mut methods).await?;

        if methods.contains(&METHOD_NO_AUTH) {
            socket.write_all(&[VERSION, METHOD_NO_AUTH]).await?;
            Ok(true)
        } else {
            socket.write_all(&[VERSION, METHOD_NONE_ACCEPTABLE]).await?;
            Ok(false)
        }
    }

    /// Reads `VER CMD RSV ATYP DST.ADDR DST.PORT`. Returns the command and
    /// a resolved `(host, port)` pair.
    async fn read_request(&self, socket: &mut TcpStream) -> io::Result<Option<(u8, String, u16)>> {
        let mut head = [0u8; 4];
        if socket.read_exact(&mut head).await.is_err() {
            return Ok(None);
        }
        let [_ver, cmd, _rsv, atyp] = head;

        let host = match atyp {
            ATYP_IPV4 => {
                let mut addr = [0u8; 4];
                socket.read_exact(&mut addr).await?;
                std::net::Ipv4Addr::from(addr).to_string()
            }
            ATYP_IPV6 => {
                let mut addr = [0u8; 16];
                socket.read_exact(&mut addr).await?;
                std::net::Ipv6Addr::from(addr).to_string()
            }
            ATYP_DOMAIN => {
                let mut len = [0u8; 1];
                socket.read_exact(&mut len).await?;
                let mut name = vec![0u8; len[0] as usize];
                socket.read_exact(&mut name).await?;
                String::from_utf8_lossy(&name).to_ascii_lowercase()
            }
            _ => return Ok(None),
        };

        let mut port_bytes = [0u8; 2];
        socket.read_exact(&mut port_bytes).await?;
        let port = u16::from_be_bytes(port_bytes);

        Ok(Some((cmd, host, port)))
    }

    async fn reply(&self, socket: &mut TcpStream, code: u8) -> io::Result<()> {
        // BND.ADDR/BND.PORT are unused by this proxy (no bind-side
        // address to report); zero them per common SOCKS5 server practice.
        socket
            .write_all(&[VERSION, code, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
            .await
    }
}

fn io_other() -> io::Error {
    io::Error::other("upstream connect failed")
}
