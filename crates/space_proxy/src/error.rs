use thiserror::Error;

/// Proxy-level error kinds, carrying the HTTP status / SOCKS5 reply code
/// mapping from spec §7 verbatim. Every variant is logged with client IP,
/// chain, and target by the call site before being translated to the
/// protocol-appropriate response; none escalate beyond their flow.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("host does not end in the configured zone")]
    UnknownZone,
    #[error("no label in the host matched a catalog body")]
    UnknownBody,
    #[error("target host failed DNS syntax validation")]
    BadTarget,
    #[error("the Sun occludes the line of sight to {0}")]
    Occluded(String),
    #[error("client exceeded its per-minute request allowance")]
    RateLimited,
    #[error("failed to reach upstream: {0}")]
    UpstreamUnreachable(#[from] std::io::Error),
}

impl ProxyError {
    /// HTTP status code for this error, per spec §7's table.
    pub fn http_status(&self) -> u16 {
        match self {
            ProxyError::UnknownZone => 421,
            ProxyError::UnknownBody => 404,
            ProxyError::BadTarget => 502,
            ProxyError::Occluded(_) => 503,
            ProxyError::RateLimited => 429,
            ProxyError::UpstreamUnreachable(_) => 502,
        }
    }

    /// User-visible HTTP reason text.
    pub fn http_reason(&self) -> &'static str {
        match self {
            ProxyError::UnknownZone => "Misdirected Request",
            ProxyError::UnknownBody => "Not Found",
            ProxyError::BadTarget => "Bad Gateway",
            ProxyError::Occluded(_) => "Signal occluded by Sun",
            ProxyError::RateLimited => "Too Many Requests",
            ProxyError::UpstreamUnreachable(_) => "Bad Gateway",
        }
    }

    /// SOCKS5 CONNECT reply code, per RFC 1928 §6 and spec §7's mapping.
    pub fn socks5_reply_code(&self) -> u8 {
        match self {
            ProxyError::UnknownZone => 0x08,
            ProxyError::UnknownBody => 0x08,
            ProxyError::BadTarget => 0x04,
            ProxyError::Occluded(_) => 0x03,
            ProxyError::RateLimited => 0x02,
            ProxyError::UpstreamUnreachable(_) => 0x04,
        }
    }
}

impl From<space_router::RouteError> for ProxyError {
    fn from(err: space_router::RouteError) -> Self {
        match err {
            space_router::RouteError::UnknownZone(_) => ProxyError::UnknownZone,
            space_router::RouteError::UnknownBody(_) => ProxyError::UnknownBody,
            space_router::RouteError::BadTarget(_) => ProxyError::BadTarget,
        }
    }
}
