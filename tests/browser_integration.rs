//! End-to-end capture tests against a real headless Chrome.
//!
//! Ignored by default: they need a Chrome/Chromium installation (or network
//! access for the first-run download). Run with `cargo test -- --ignored`.


use dash_sampler::{capture, ChromeDriver, ConnectionMode, SamplerConfig};
use std::time::Duration;
use test_server::TestServer;

/// Helper to create a headless driver for testing
async fn create_headless_driver() -> anyhow::Result<ChromeDriver> {
    ChromeDriver::new(ConnectionMode::Sandboxed {
        chrome_path: None,
        no_sandbox: true, // Required for CI environments
        headless: true,
    })
    .await
    .map_err(|e| anyhow::anyhow!("Failed to launch Chrome: {}", e))
}

#[tokio::test]
#[ignore = "requires a Chrome installation"]
async fn captures_samples_from_live_monitoring_page() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;

    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;

    let mut config = SamplerConfig::new("e2e", server.url(), 3);
    config.output_dir = dir.path().to_path_buf();
    config.interval = Duration::from_millis(200);

    let outcome = capture(&driver, &config).await;
    driver.close().await?;
    let path = outcome?;

    let contents = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3, "expected one line per sample: {:?}", lines);
    for line in lines {
        assert_eq!(
            line.split(' ').count(),
            5,
            "expected five fields per line: {:?}",
            line
        );
    }
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome installation"]
async fn page_without_framerate_element_leaves_no_file() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;

    let driver = create_headless_driver().await?;
    let dir = tempfile::tempdir()?;

    let mut config = SamplerConfig::new("e2e-broken", server.broken_url(), 2);
    config.output_dir = dir.path().to_path_buf();

    // The readiness wait polls its full timeout before failing, so this test
    // takes ~30s; it is ignored by default anyway.
    let outcome = capture(&driver, &config).await;
    driver.close().await?;

    let err = outcome.unwrap_err();
    assert!(
        err.to_string().contains("framerate"),
        "error should name the missing element: {}",
        err
    );
    assert!(!config.stats_path().exists());
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome installation"]
async fn unreachable_page_is_a_navigation_error() -> anyhow::Result<()> {
    let driver = create_headless_driver().await?;

    // Port 1 is essentially never listening
    let result = driver.navigate("http://127.0.0.1:1/").await;
    driver.close().await?;

    assert!(result.is_err());
    Ok(())
}
