//! End-to-end tracking runs against a local workbook.

use std::path::Path;

use av_pipeline_tracker::config::TrackerConfig;
use av_pipeline_tracker::lochness::{self, Staleness};
use av_pipeline_tracker::notify::Mailer;
use av_pipeline_tracker::sheets::local::{LocalWorkbook, LocalWorksheet};
use av_pipeline_tracker::sheets::{CellRef, Worksheet, HEARTBEAT_CELL};
use av_pipeline_tracker::tracker::{self, TaskCategory, TrackError};
use chrono::{Local, NaiveDate, TimeZone};

struct Fixture {
    _root: tempfile::TempDir,
    cfg: TrackerConfig,
    sheet: LocalWorksheet,
}

fn write_log(dir: &Path, name: &str, text: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), text).unwrap();
}

/// Two sites (LA, ME) plus a TOTAL directory, both task categories populated.
async fn fixture() -> Fixture {
    let root = tempfile::TempDir::new().unwrap();
    let offsite = root.path().join("logs/offsite");
    let journal = root.path().join("logs/daily_journal");

    for site in ["PronetLA", "PronetME"] {
        let dir = offsite.join(site);
        write_log(&dir, "audio_process_1700000000.txt", "Current time: 10:00:00\nCurrent time: 11:30:00\n");
        write_log(&dir, "audio_process_1700090000.txt", "Current time: 23:30:00\nCurrent time: 00:15:00\n");
        write_log(&dir, "transcript_process_1700090000.txt", "ERROR: whisper crashed\nExiting, please requeue\n");
        write_log(&dir, "video_process_1700090000.txt", "");

        let dir = journal.join(site);
        write_log(&dir, "audio_process_1700090000.txt", "fine\n");
        write_log(&dir, "transcript_process_1700090000.txt", "Exiting, please requeue\n");
    }
    std::fs::create_dir_all(offsite.join("TOTAL")).unwrap();
    std::fs::create_dir_all(journal.join("TOTAL")).unwrap();

    let toml_str = format!(
        r#"
[general]
network = "Pronet"

[log_source_dir]
pronet_offsite_logs = "{}"
pronet_daily_journal_logs = "{}"

[lochness]
email_sender = "tracker@example.org"
email_recipients = "ops@example.org"
email_threshold_hours = 6
mail_binary = "/nonexistent/bin/mail"

[sheets]
backend = "local"
local_path = "{}"
"#,
        offsite.display(),
        journal.display(),
        root.path().join("sheets.db").display()
    );
    let cfg: TrackerConfig = toml::from_str(&toml_str).unwrap();

    let sheet = LocalWorkbook::open(&cfg.sheets.local_path)
        .unwrap()
        .worksheet("Pronet");
    sheet.update_cell(CellRef::new(5, 1), "LA").await.unwrap();
    sheet.update_cell(CellRef::new(6, 1), "ME").await.unwrap();

    Fixture {
        _root: root,
        cfg,
        sheet,
    }
}

async fn cell(sheet: &LocalWorksheet, row: u32, col: u32) -> Option<String> {
    sheet.read_cell(CellRef::new(row, col)).await.unwrap()
}

#[tokio::test]
async fn test_full_run_fills_both_categories() {
    let fx = fixture().await;
    let now = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

    let summary = tracker::run_tracking(&fx.cfg, &fx.sheet, "Pronet", now)
        .await
        .unwrap();
    assert_eq!(summary.sites, 4);
    assert_eq!(summary.results, 10);
    // Per site: offsite transcript + video, journal transcript.
    assert_eq!(summary.errors, 6);

    for row in [5, 6] {
        // offsite: audio at 7, transcript at 10, video at 13
        assert_eq!(cell(&fx.sheet, row, 7).await.as_deref(), Some("No errors"));
        assert_eq!(cell(&fx.sheet, row, 9).await.as_deref(), Some("0:45:00"));
        assert_eq!(cell(&fx.sheet, row, 10).await.as_deref(), Some("Uncaught Exception"));
        assert_eq!(cell(&fx.sheet, row, 13).await.as_deref(), Some("Empty log file"));
        assert_eq!(cell(&fx.sheet, row, 15).await.as_deref(), Some("0:00:00"));

        // daily_journal: audio at 20, transcript at 23
        assert_eq!(cell(&fx.sheet, row, 20).await.as_deref(), Some("No errors"));
        assert_eq!(cell(&fx.sheet, row, 23).await.as_deref(), Some("Pipeline Rejected"));
    }

    let expected_last_run = chrono::DateTime::from_timestamp(1_700_090_000, 0)
        .unwrap()
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    assert_eq!(cell(&fx.sheet, 5, 8).await, Some(expected_last_run));

    assert_eq!(
        fx.sheet.read_note(CellRef::new(5, 10)).unwrap().as_deref(),
        Some("ERROR: whisper crashed")
    );
    assert_eq!(
        fx.sheet.read_cell(HEARTBEAT_CELL).await.unwrap().as_deref(),
        Some("2024-03-01 12:00:00")
    );
}

#[tokio::test]
async fn test_missing_subtask_log_aborts_run() {
    let fx = fixture().await;
    let site = fx.cfg.network_logs_path("Pronet", "offsite").unwrap().join("PronetME");
    std::fs::remove_file(site.join("video_process_1700090000.txt")).unwrap();

    let err = tracker::track_logs(&fx.cfg, &fx.sheet, "Pronet", TaskCategory::Offsite)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::NoLogs { ref subtask, .. } if subtask == "video_process"));

    // LA comes first and was written; the run stops before any completion stamp.
    assert_eq!(cell(&fx.sheet, 5, 7).await.as_deref(), Some("No errors"));
    assert_eq!(cell(&fx.sheet, 6, 7).await, None);
    assert_eq!(fx.sheet.read_cell(HEARTBEAT_CELL).await.unwrap(), None);
}

#[tokio::test]
async fn test_missing_log_dir_key_fails() {
    let fx = fixture().await;
    let err = tracker::track_logs(&fx.cfg, &fx.sheet, "Prescient", TaskCategory::Offsite)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("prescient_offsite_logs"));
}

#[tokio::test]
async fn test_lochness_after_tracking_run() {
    let fx = fixture().await;
    let finished = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    tracker::run_tracking(&fx.cfg, &fx.sheet, "Pronet", finished)
        .await
        .unwrap();

    let cfg = fx.cfg.lochness().unwrap();
    let mailer = Mailer::new(&cfg.mail_binary);
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    let healthy = lochness::check(cfg, &fx.sheet, &mailer, "Pronet", day.and_hms_opt(17, 59, 59).unwrap(), false)
        .await
        .unwrap();
    assert_eq!(healthy.staleness, Staleness::WithinThreshold);

    let overdue = lochness::check(cfg, &fx.sheet, &mailer, "Pronet", day.and_hms_opt(18, 0, 1).unwrap(), true)
        .await
        .unwrap();
    assert_eq!(overdue.staleness, Staleness::Overdue);
    assert!(!overdue.alerted);
}
