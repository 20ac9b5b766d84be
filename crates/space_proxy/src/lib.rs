//! Dual-protocol proxy data plane: HTTP forward-proxy and SOCKS5
//! frontends, the debug/info-page surface, and the admin loop that keeps
//! the shared distance cache warm (spec §4.6-§4.9).

mod admin;
mod debug;
mod distance_cache;
mod error;
mod flow;
mod http;
mod http_parse;
mod socks5;

pub use admin::run as run_admin_loop;
pub use distance_cache::{CachedDistance, DistanceCache};
pub use error::ProxyError;
pub use flow::FlowContext;
pub use http::HttpFrontend;
pub use socks5::Socks5Frontend;
