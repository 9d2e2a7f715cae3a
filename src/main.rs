use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use av_pipeline_tracker::config::{SheetsBackend, TrackerConfig};
use av_pipeline_tracker::lochness::Staleness;
use av_pipeline_tracker::sheets::local::LocalWorkbook;
use av_pipeline_tracker::sheets::{CellRef, Worksheet};
use av_pipeline_tracker::tracker::{self, TaskCategory};

#[derive(Parser)]
#[command(
    name = "av-tracker",
    about = "Log tracking and heartbeat alerting for the A/V processing pipeline",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $AV_TRACKER_CONFIG, then config.toml at the repo root)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track all task logs of the configured network and update the sheet
    TrackLogs,

    /// Alert if Lochness has not reported in within the threshold
    CheckLochness {
        /// The name of the network.
        #[arg(long)]
        network: String,

        /// Evaluate and report, but never send email
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse one site directory and print the results without touching the sheet
    Inspect {
        /// Site log directory, e.g. /data/pronet/logs/offsite/PronetLA
        #[arg(long)]
        site: PathBuf,

        /// Task category: offsite or daily_journal
        #[arg(long)]
        task: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Inspect or seed the local (SQLite) worksheet
    Sheet {
        /// Worksheet name, usually the network
        #[arg(long)]
        network: String,

        #[command(subcommand)]
        action: SheetAction,
    },
}

#[derive(Subcommand)]
enum SheetAction {
    /// List every stored cell
    List,

    /// Set one cell value
    Set {
        #[arg(long)]
        row: u32,

        #[arg(long)]
        col: u32,

        #[arg(long)]
        value: String,
    },
}

fn load_config(explicit: Option<&std::path::Path>) -> Result<(PathBuf, TrackerConfig)> {
    let path = TrackerConfig::locate(explicit)?;
    let cfg = TrackerConfig::load(&path)?;
    Ok((path, cfg))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::TrackLogs => {
            let (path, cfg) = load_config(cli.config.as_deref())?;
            av_pipeline_tracker::telemetry::init(&cfg.logging, cfg.logging.file_for("track_logs"))?;
            tracing::info!(path = %path.display(), "using config file");

            let summary = av_pipeline_tracker::track(&cfg).await?;
            println!(
                "Tracked {} site(s): {} result(s), {} with errors.",
                summary.sites, summary.results, summary.errors
            );
        }
        Commands::CheckLochness { network, dry_run } => {
            let (path, cfg) = load_config(cli.config.as_deref())?;
            av_pipeline_tracker::telemetry::init(
                &cfg.logging,
                cfg.logging.file_for("track_lochness"),
            )?;
            tracing::info!(path = %path.display(), "using config file");

            let report = av_pipeline_tracker::check_lochness(&cfg, &network, dry_run).await?;
            let verdict = match report.staleness {
                Staleness::WithinThreshold => "within threshold",
                Staleness::Overdue => "OVERDUE",
            };
            println!(
                "{}: Lochness last seen {} ({}, threshold {}h){}",
                report.network,
                report.last_run,
                verdict,
                report.threshold_hours,
                if report.alerted { ", alert sent" } else { "" }
            );
        }
        Commands::Inspect { site, task, json } => {
            av_pipeline_tracker::telemetry::init(&Default::default(), None)?;
            let task: TaskCategory = task.parse()?;
            let results = tracker::track_site(task, &site)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("{:<20} | {:<4} | {:<20} | {:<19} | Runtime", "Subtask", "Site", "Status", "Last run");
                println!("{:-<20}-|-{:-<4}-|-{:-<20}-|-{:-<19}-|-{:-<8}", "", "", "", "", "");
                for r in &results {
                    println!(
                        "{:<20} | {:<4} | {:<20} | {:<19} | {}",
                        r.subtask,
                        r.site_id,
                        r.status.label(),
                        r.last_run_text(),
                        r.runtime_text()
                    );
                }
            }
        }
        Commands::Sheet { network, action } => {
            let (_, cfg) = load_config(cli.config.as_deref())?;
            av_pipeline_tracker::telemetry::init(&cfg.logging, None)?;
            if cfg.sheets.backend != SheetsBackend::Local {
                anyhow::bail!("the sheet command only works with the local backend");
            }
            let sheet = LocalWorkbook::open(&cfg.sheets.local_path)
                .with_context(|| format!("failed to open {}", cfg.sheets.local_path.display()))?
                .worksheet(&network);

            match action {
                SheetAction::List => {
                    let cells = sheet.cells()?;
                    if cells.is_empty() {
                        println!("No cells in worksheet '{}'.", network);
                    } else {
                        println!("{:<6} | {:<6} | {:<30} | Note", "Row", "Col", "Value");
                        println!("{:-<6}-|-{:-<6}-|-{:-<30}-|-{:-<10}", "", "", "", "");
                        for c in cells {
                            let note = c.note.unwrap_or_default().replace('\n', " / ");
                            println!(
                                "{:<6} | {:<6} | {:<30} | {}",
                                c.row,
                                c.col,
                                c.value.unwrap_or_default(),
                                note
                            );
                        }
                    }
                }
                SheetAction::Set { row, col, value } => {
                    sheet.update_cell(CellRef::new(row, col), &value).await?;
                    println!("Set {} of '{}' to '{}'.", CellRef::new(row, col).a1(), network, value);
                }
            }
        }
    }

    Ok(())
}
