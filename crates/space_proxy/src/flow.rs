use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Per-accepted-connection record threaded through routing, admission, and
/// shaping. Lifetime matches the TCP connection's.
#[derive(Debug, Clone)]
pub struct FlowContext {
    pub client_ip: IpAddr,
    /// Body chain this flow's latency/occlusion were derived from,
    /// innermost-to-outermost (§4.3).
    pub chain: Vec<String>,
    pub target_host: String,
    pub target_port: u16,
    /// Summed one-way delay across the chain.
    pub delay: Duration,
    /// Per-direction bandwidth ceiling in bits/sec.
    pub bandwidth_bps: f64,
    pub created_at: Instant,
}

impl FlowContext {
    pub fn chain_label(&self) -> String {
        self.chain.join(">")
    }

    pub fn target_label(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }
}
