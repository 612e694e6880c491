use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{check, init_tracing},
    mock_http::{refused_url, MockHttpServer},
};
use anyhow::Result;
use headcheck::{HttpProber, OutputStyle, PipelineConfig, ProbeError, Prober, ProberOptions};
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn head_requests_report_raw_status_codes() -> Result<()> {
    init_tracing();
    let server = MockHttpServer::start().await?;
    let refused = refused_url().await?;

    let input = [
        server.url("/ok"),
        server.url("/missing"),
        server.url("/moved"),
        server.url("/unavailable"),
        refused.clone(),
        server.url("/stall"),
    ]
    .join("\n");

    let config = PipelineConfig::builder()
        .jobs(4)
        .probe_timeout(Duration::from_millis(500))
        .build()?;
    let checker_prober = Arc::new(HttpProber::from_config(&config)?);

    let (output, summary) = timeout(Duration::from_secs(10), check(config, checker_prober, &input))
        .await
        .expect("run should finish once the stalled probe times out")?;

    let expected = format!(
        "200\t{}\n404\t{}\n301\t{}\n503\t{}\n???\t{}\n???\t{}\n",
        server.url("/ok"),
        server.url("/missing"),
        server.url("/moved"),
        server.url("/unavailable"),
        refused,
        server.url("/stall"),
    );
    assert_eq!(output, expected);
    assert_eq!(summary.failed, 2);
    assert_eq!(server.non_head_requests(), 0, "only HEAD requests are sent");
    assert_eq!(server.requests(), 5, "redirects are never followed");

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn reason_style_renders_canonical_phrases() -> Result<()> {
    init_tracing();
    let server = MockHttpServer::start().await?;
    let config = PipelineConfig::builder()
        .jobs(2)
        .output_style(OutputStyle::Reason)
        .build()?;
    let prober = Arc::new(HttpProber::from_config(&config)?);

    let input = format!("{}\n{}\n", server.url("/ok"), server.url("/missing"));
    let (output, _) = check(config, prober, &input).await?;

    assert_eq!(
        output,
        format!(
            "200 OK\t{}\n404 Not Found\t{}\n",
            server.url("/ok"),
            server.url("/missing")
        )
    );
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn prober_classifies_transport_failures() -> Result<()> {
    init_tracing();
    let server = MockHttpServer::start().await?;
    let prober = HttpProber::with_options(ProberOptions {
        request_timeout: Duration::from_millis(200),
        ..ProberOptions::default()
    })?;

    let refused = refused_url().await?;
    let err = prober.probe(&refused).await.unwrap_err();
    assert!(matches!(err, ProbeError::Connect(_)), "got {err:?}");

    let err = prober.probe(&server.url("/stall")).await.unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");

    let status = prober.probe(&server.url("/moved")).await?;
    assert_eq!(status.code(), 301);
    assert!(status.is_redirect());

    server.shutdown().await;
    Ok(())
}
