//! Heartbeat check for the Lochness sync agent.
//!
//! The network worksheet carries a "last seen" timestamp in the heartbeat
//! cell. If it is older than the configured threshold an alert email goes
//! out; otherwise nothing happens.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use tracing::info;

use crate::config::LochnessConfig;
use crate::notify::{Delivery, Email, Mailer};
use crate::sheets::{Worksheet, HEARTBEAT_CELL};
use crate::tracker::report::TIMESTAMP_FORMAT;

/// Whether the heartbeat is recent enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Staleness {
    WithinThreshold,
    Overdue,
}

/// `Overdue` once `now - last_run` reaches `threshold`.
pub fn evaluate(last_run: NaiveDateTime, now: NaiveDateTime, threshold: TimeDelta) -> Staleness {
    if now.signed_duration_since(last_run) < threshold {
        Staleness::WithinThreshold
    } else {
        Staleness::Overdue
    }
}

pub fn parse_heartbeat(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .with_context(|| format!("heartbeat {raw:?} is not in {TIMESTAMP_FORMAT} format"))
}

/// Subject and body of the overdue alert.
pub fn compose_alert(cfg: &LochnessConfig, network: &str, last_run: NaiveDateTime) -> Email {
    let body = format!(
        "Lochness at {network} was last seen at {last_run}.\n\n\
         This is an automated message, that checks if Lochness is running every {} hours.",
        cfg.email_threshold_hours
    );
    Email {
        subject: format!("{network} - Lochness Sync is overdue"),
        body,
        recipients: cfg.recipients(),
        sender: cfg.email_sender.clone(),
    }
}

/// Result of one check.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatReport {
    pub network: String,
    pub last_run: NaiveDateTime,
    pub threshold_hours: u32,
    pub staleness: Staleness,
    /// Whether an alert went out; `false` when healthy, dry run, or no mailer.
    pub alerted: bool,
}

/// Read the heartbeat, decide, and alert if overdue (unless `dry_run`).
pub async fn check(
    cfg: &LochnessConfig,
    sheet: &dyn Worksheet,
    mailer: &Mailer,
    network: &str,
    now: NaiveDateTime,
    dry_run: bool,
) -> Result<HeartbeatReport> {
    let raw = sheet
        .read_cell(HEARTBEAT_CELL)
        .await?
        .with_context(|| format!("heartbeat cell {} of {network} is empty", HEARTBEAT_CELL.a1()))?;
    let last_run = parse_heartbeat(&raw)?;
    info!(%network, %last_run, "last updated");

    let threshold = TimeDelta::hours(i64::from(cfg.email_threshold_hours));
    let staleness = evaluate(last_run, now, threshold);
    info!(?staleness, threshold_hours = cfg.email_threshold_hours, "heartbeat evaluated");

    let mut alerted = false;
    match staleness {
        Staleness::WithinThreshold => info!("within threshold, not sending email"),
        Staleness::Overdue if dry_run => info!("overdue; dry run, not sending email"),
        Staleness::Overdue => {
            let email = compose_alert(cfg, network, last_run);
            info!(recipients = ?email.recipients, "sending email");
            alerted = mailer.send(&email)? == Delivery::Sent;
        }
    }

    Ok(HeartbeatReport {
        network: network.to_string(),
        last_run,
        threshold_hours: cfg.email_threshold_hours,
        staleness,
        alerted,
    })
}
