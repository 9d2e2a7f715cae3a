//! av-pipeline-tracker -- log tracking for a multi-site A/V processing pipeline.
//!
//! Scans per-site pipeline logs, extracts runtime and failure status, and
//! writes them to the network's monitoring worksheet. A separate check alerts
//! by email when the Lochness sync agent has not reported in for too long.

pub mod config;
pub mod lochness;
pub mod logs;
pub mod notify;
pub mod sheets;
pub mod telemetry;
pub mod tracker;

use anyhow::Result;
use chrono::Local;

use config::TrackerConfig;

/// Run a full tracking pass for the configured network.
pub async fn track(cfg: &TrackerConfig) -> Result<tracker::TrackingSummary> {
    let network = cfg.network()?;
    tracing::info!(%network, "on network");

    let sheet = sheets::open_worksheet(&cfg.sheets, network).await?;
    let summary = tracker::run_tracking(cfg, sheet.as_ref(), network, Local::now()).await?;

    tracing::info!(
        sites = summary.sites,
        results = summary.results,
        errors = summary.errors,
        "done"
    );
    Ok(summary)
}

/// Check the Lochness heartbeat of `network` and alert if it is overdue.
pub async fn check_lochness(
    cfg: &TrackerConfig,
    network: &str,
    dry_run: bool,
) -> Result<lochness::HeartbeatReport> {
    let lochness_cfg = cfg.lochness()?;
    tracing::info!(%network, "on network");

    let sheet = sheets::open_worksheet(&cfg.sheets, network).await?;
    let mailer = notify::Mailer::new(&lochness_cfg.mail_binary);
    lochness::check(
        lochness_cfg,
        sheet.as_ref(),
        &mailer,
        network,
        Local::now().naive_local(),
        dry_run,
    )
    .await
}
