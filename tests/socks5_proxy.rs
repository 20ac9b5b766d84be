//! End-to-end coverage of the SOCKS5 frontend: RFC 1928 handshake, CONNECT
//! through the shaper, and rejection of BIND/UDP ASSOCIATE.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use space_catalog::Catalog;
use space_proxy::{DistanceCache, Socks5Frontend};
use space_shaping::RateLimiter;

const ZONE: &str = "latency.space";

async fn pick_free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_listener(port: u16) {
    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("socks5 frontend on port {port} never came up");
}

async fn spawn_echo_server() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
    port
}

fn spawn_socks5_frontend(catalog: Catalog, port: u16, now_unix: f64, default_chain: Vec<String>) -> Arc<Socks5Frontend> {
    let catalog = Arc::new(catalog);
    let distance_cache = Arc::new(DistanceCache::new());
    distance_cache.refresh(&catalog, now_unix).unwrap();

    let frontend = Arc::new(Socks5Frontend {
        catalog,
        distance_cache,
        rate_limiter: Arc::new(RateLimiter::new(1000)),
        zone: ZONE.to_string(),
        bandwidth_baseline_bps: 10_000_000.0,
        listen_port: port,
        default_chain,
    });
    tokio::spawn({
        let frontend = Arc::clone(&frontend);
        async move {
            let _ = frontend.serve().await;
        }
    });
    frontend
}

fn domain_connect_request(domain: &str, port: u16) -> Vec<u8> {
    let mut req = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    req.extend_from_slice(domain.as_bytes());
    req.extend_from_slice(&port.to_be_bytes());
    req
}

#[tokio::test]
async fn connect_through_socks5_relays_bytes_after_a_clean_handshake() {
    let catalog = Catalog::load_dir("configs/bodies").unwrap();
    let echo_port = spawn_echo_server().await;
    let socks_port = pick_free_port().await;
    let _frontend = spawn_socks5_frontend(catalog, socks_port, 1_700_000_000.0, vec!["mars".to_string()]);
    wait_for_listener(socks_port).await;

    let mut socket = TcpStream::connect(("127.0.0.1", socks_port)).await.unwrap();

    // Greeting: offer no-auth only.
    socket.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut greeting_reply = [0u8; 2];
    socket.read_exact(&mut greeting_reply).await.unwrap();
    assert_eq!(greeting_reply, [0x05, 0x00]);

    socket
        .write_all(&domain_connect_request("127.0.0.1", echo_port))
        .await
        .unwrap();
    let mut reply = [0u8; 10];
    socket.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[1], 0x00, "expected success reply code");

    socket.write_all(b"hello").await.unwrap();
    let mut echoed = [0u8; 5];
    socket.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello");
}

#[tokio::test]
async fn zone_routed_destination_dials_the_forwarding_target_not_the_literal_domain() {
    // The SOCKS5 destination itself names a body chain
    // (`<target>.mars.latency.space`); the upstream dial must resolve to
    // the embedded target ("127.0.0.1"), not the literal wire domain,
    // which here isn't independently resolvable.
    let catalog = Catalog::load_dir("configs/bodies").unwrap();
    let echo_port = spawn_echo_server().await;
    let socks_port = pick_free_port().await;
    let _frontend = spawn_socks5_frontend(catalog, socks_port, 1_700_000_000.0, vec!["earth".to_string()]);
    wait_for_listener(socks_port).await;

    let mut socket = TcpStream::connect(("127.0.0.1", socks_port)).await.unwrap();
    socket.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut greeting_reply = [0u8; 2];
    socket.read_exact(&mut greeting_reply).await.unwrap();
    assert_eq!(greeting_reply, [0x05, 0x00]);

    socket
        .write_all(&domain_connect_request(&format!("127.0.0.1.mars.{ZONE}"), echo_port))
        .await
        .unwrap();
    let mut reply = [0u8; 10];
    socket.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[1], 0x00, "expected success reply code, got: {reply:?}");

    socket.write_all(b"relayed").await.unwrap();
    let mut echoed = [0u8; 7];
    socket.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"relayed");
}

#[tokio::test]
async fn zone_routed_destination_with_no_forwarding_target_is_refused_with_bad_target() {
    // `mars.latency.space` alone, with no label left to forward to, must
    // be refused rather than dialing the bare zone-routed hostname.
    let catalog = Catalog::load_dir("configs/bodies").unwrap();
    let socks_port = pick_free_port().await;
    let _frontend = spawn_socks5_frontend(catalog, socks_port, 1_700_000_000.0, vec!["earth".to_string()]);
    wait_for_listener(socks_port).await;

    let mut socket = TcpStream::connect(("127.0.0.1", socks_port)).await.unwrap();
    socket.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut greeting_reply = [0u8; 2];
    socket.read_exact(&mut greeting_reply).await.unwrap();

    socket.write_all(&domain_connect_request(&format!("mars.{ZONE}"), 443)).await.unwrap();
    let mut reply = [0u8; 10];
    socket.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x04, "expected bad-target reply code, got: {reply:?}");
}

#[tokio::test]
async fn bind_command_is_rejected_with_command_not_supported() {
    let catalog = Catalog::load_dir("configs/bodies").unwrap();
    let socks_port = pick_free_port().await;
    let _frontend = spawn_socks5_frontend(catalog, socks_port, 1_700_000_000.0, vec!["earth".to_string()]);
    wait_for_listener(socks_port).await;

    let mut socket = TcpStream::connect(("127.0.0.1", socks_port)).await.unwrap();
    socket.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut greeting_reply = [0u8; 2];
    socket.read_exact(&mut greeting_reply).await.unwrap();

    // BIND (0x02) to an arbitrary domain.
    let mut req = vec![0x05, 0x02, 0x00, 0x03, 7];
    req.extend_from_slice(b"x.y.com");
    req.extend_from_slice(&80u16.to_be_bytes());
    socket.write_all(&req).await.unwrap();

    let mut reply = [0u8; 10];
    socket.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x07, "expected command-not-supported reply code");
}

#[tokio::test]
async fn udp_associate_command_is_rejected_with_command_not_supported() {
    let catalog = Catalog::load_dir("configs/bodies").unwrap();
    let socks_port = pick_free_port().await;
    let _frontend = spawn_socks5_frontend(catalog, socks_port, 1_700_000_000.0, vec!["earth".to_string()]);
    wait_for_listener(socks_port).await;

    let mut socket = TcpStream::connect(("127.0.0.1", socks_port)).await.unwrap();
    socket.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut greeting_reply = [0u8; 2];
    socket.read_exact(&mut greeting_reply).await.unwrap();

    let mut req = vec![0x05, 0x03, 0x00, 0x03, 7];
    req.extend_from_slice(b"x.y.com");
    req.extend_from_slice(&80u16.to_be_bytes());
    socket.write_all(&req).await.unwrap();

    let mut reply = [0u8; 10];
    socket.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x07);
}

#[tokio::test]
async fn greeting_without_no_auth_method_is_refused() {
    let catalog = Catalog::load_dir("configs/bodies").unwrap();
    let socks_port = pick_free_port().await;
    let _frontend = spawn_socks5_frontend(catalog, socks_port, 1_700_000_000.0, vec!["earth".to_string()]);
    wait_for_listener(socks_port).await;

    let mut socket = TcpStream::connect(("127.0.0.1", socks_port)).await.unwrap();
    // Offer only username/password auth (0x02), which this proxy never accepts.
    socket.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
    let mut reply = [0u8; 2];
    socket.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0xFF]);
}
