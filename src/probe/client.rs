//! HTTP probing for URL checks. Houses the `Prober` trait consumed by workers,
//! the reqwest-backed `HttpProber`, and the `ProbeError` taxonomy rendered as
//! the sentinel status downstream.

use super::options::ProberOptions;
use super::outcome::StatusOutcome;
use crate::runtime::config::PipelineConfig;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::{redirect, Client, Url};
use std::fmt;
use std::time::Duration;

pub type ProbeFuture<'a> = BoxFuture<'a, Result<StatusOutcome, ProbeError>>;

/// A single best-effort status check against one URL.
///
/// Implementations are shared by every worker, so they must be stateless or
/// internally synchronised. Any response, including 4xx/5xx and unfollowed
/// redirects, is a successful outcome; only a missing response is an error.
pub trait Prober: Send + Sync + 'static {
    fn probe<'a>(&'a self, url: &'a str) -> ProbeFuture<'a>;
}

#[derive(Debug)]
pub enum ProbeError {
    EmptyUrl,
    InvalidUrl { url: String, reason: String },
    Connect(reqwest::Error),
    Timeout { after: Duration },
    Transport(reqwest::Error),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout { .. })
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::EmptyUrl => write!(f, "empty url"),
            ProbeError::InvalidUrl { url, reason } => write!(f, "invalid url {url:?}: {reason}"),
            ProbeError::Connect(err) => write!(f, "connection failed: {err}"),
            ProbeError::Timeout { after } => write!(f, "probe timed out after {after:?}"),
            ProbeError::Transport(err) => write!(f, "request failed: {err}"),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProbeError::Connect(err) | ProbeError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// HEAD prober backed by a pooled `reqwest::Client` that never follows redirects.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    options: ProberOptions,
}

impl Prober for HttpProber {
    fn probe<'a>(&'a self, url: &'a str) -> ProbeFuture<'a> {
        Box::pin(self.head(url))
    }
}

impl HttpProber {
    pub fn new() -> Result<Self> {
        Self::with_options(ProberOptions::default())
    }

    pub fn with_options(options: ProberOptions) -> Result<Self> {
        options.validate()?;

        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .tcp_keepalive(options.tcp_keepalive)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .user_agent(options.user_agent.clone())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, options })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Self::with_options(ProberOptions {
            request_timeout: config.probe_timeout(),
            ..ProberOptions::default()
        })
    }

    /// Issues one HEAD request and reports the status line of whatever came back.
    pub async fn head(&self, url: &str) -> Result<StatusOutcome, ProbeError> {
        let target = parse_target(url)?;
        let response = self
            .client
            .head(target)
            .send()
            .await
            .map_err(|err| classify_error(url, err, self.options.request_timeout))?;

        let status = StatusOutcome::new(response.status().as_u16());
        drop(response);

        tracing::trace!(
            url,
            status = status.code(),
            redirect = status.is_redirect(),
            "head request completed"
        );
        Ok(status)
    }
}

fn parse_target(url: &str) -> Result<Url, ProbeError> {
    if url.trim().is_empty() {
        return Err(ProbeError::EmptyUrl);
    }

    let parsed = Url::parse(url).map_err(|err| ProbeError::InvalidUrl {
        url: url.to_owned(),
        reason: err.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ProbeError::InvalidUrl {
            url: url.to_owned(),
            reason: format!("unsupported scheme {scheme}"),
        }),
    }
}

fn classify_error(url: &str, err: reqwest::Error, deadline: Duration) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout { after: deadline }
    } else if err.is_connect() {
        ProbeError::Connect(err)
    } else if err.is_builder() {
        ProbeError::InvalidUrl {
            url: url.to_owned(),
            reason: err.to_string(),
        }
    } else {
        ProbeError::Transport(err)
    }
}
