//! Transport knobs for the HTTP prober along with validation so callers can
//! reason about deadlines and connection reuse before any request is sent.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 30;
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 6;
const DEFAULT_USER_AGENT: &str = concat!("headcheck/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProberOptions {
    /// Overall deadline for a single HEAD request, connection setup included.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub tcp_keepalive: Duration,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for ProberOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            tcp_keepalive: Duration::from_secs(DEFAULT_TCP_KEEPALIVE_SECS),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl ProberOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }
        if self.tcp_keepalive.is_zero() {
            bail!("tcp_keepalive must be greater than 0");
        }
        if self.user_agent.trim().is_empty() {
            bail!("user_agent cannot be empty");
        }
        Ok(())
    }
}
