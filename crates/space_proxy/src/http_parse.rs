//! Pure, allocation-light helpers for the minimal HTTP/1.1 parsing the
//! forward-proxy frontend needs. Deliberately does not attempt to be a
//! general-purpose HTTP parser: CONNECT and forward-proxy semantics only.

/// Hop-by-hop headers stripped before forwarding, per RFC 7230 §6.1, plus
/// `host` (the upstream request is re-addressed in origin-form).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Splits `target` at the path into `(path, query)`; `query` is `""` when
/// there is no `?`.
pub fn split_path_query(target: &str) -> (&str, &str) {
    match target.find('?') {
        Some(idx) => (&target[..idx], &target[idx + 1..]),
        None => (target, ""),
    }
}

/// Extracts `key`'s value from an `a=b&c=d`-style query string.
pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == key {
            Some(v)
        } else {
            None
        }
    })
}

/// If `target` is an absolute-URI (`http://host[:port]/path?query`),
/// returns `(host[:port], path_and_query)`. Returns `None` for
/// already-origin-form targets (`/path?query`), which is the common case
/// when a client sends `Host` instead of an absolute-URI.
pub fn split_absolute_uri(target: &str) -> Option<(&str, String)> {
    let rest = target.strip_prefix("http://")?;
    match rest.find('/') {
        Some(idx) => Some((&rest[..idx], rest[idx..].to_string())),
        None => Some((rest, "/".to_string())),
    }
}

/// Splits a `host[:port]` or bracketed-IPv6 `[addr]:port` string into its
/// parts, falling back to `default_port` when no port is present.
pub fn split_host_port(hostport: &str, default_port: u16) -> (String, u16) {
    if let Some(stripped) = hostport.strip_prefix('[') {
        if let Some(end) = stripped.find(']') {
            let host = stripped[..end].to_string();
            let port = stripped[end + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(default_port);
            return (host, port);
        }
    }
    match hostport.rsplit_once(':') {
        Some((h, p)) if !h.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => {
            (h.to_string(), p.parse().unwrap_or(default_port))
        }
        _ => (hostport.to_string(), default_port),
    }
}

/// Rebuilds a request's head (request line + filtered headers + `Via`) as
/// the exact bytes to send upstream, addressed in origin-form against
/// `target_host`.
pub fn build_forward_request_head(request: &RequestHead, origin_path_and_query: &str, target_host: &str) -> Vec<u8> {
    let mut out = format!("{} {} HTTP/1.1\r\n", request.method, origin_path_and_query);
    out.push_str(&format!("host: {target_host}\r\n"));
    for (name, value) in &request.headers {
        let lower = name.to_ascii_lowercase();
        if HOP_BY_HOP.contains(&lower.as_str()) {
            continue;
        }
        out.push_str(&format!("{lower}: {value}\r\n"));
    }
    out.push_str("via: 1.1 latency-space\r\n");
    out.push_str("\r\n");
    out.into_bytes()
}
