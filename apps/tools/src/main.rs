use anyhow::Result;
use clap::{Parser, Subcommand};
use console_core::ReportStore;
use serde::Serialize;
use shared::domain::{Report, ReportId};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/reports.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// File a report on behalf of a field team.
    CreateReport {
        title: String,
        author: String,
        #[arg(default_value = "")]
        content: String,
    },
    /// List reports, newest first.
    ListReports {
        #[arg(long)]
        json: bool,
    },
    /// Record a field check-in against a report.
    CheckIn { report_id: i64 },
    /// Permanently remove a report.
    DeleteReport { report_id: i64 },
    /// Fill an empty database with demo reports.
    SeedDemo,
}

#[derive(Serialize)]
struct JsonReportList<'a> {
    ok: bool,
    reports: &'a [Report],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateReport {
            title,
            author,
            content,
        } => {
            let id = storage.create_report(&title, &author, &content).await?;
            println!("created report_id={id}");
        }
        Command::ListReports { json } => {
            let reports = storage.list_reports().await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&JsonReportList {
                        ok: true,
                        reports: &reports,
                    })?
                );
            } else if reports.is_empty() {
                println!("no reports");
            } else {
                for report in &reports {
                    println!(
                        "{:>4}  {}  [{}] {} by {} ({} check-ins)",
                        report.id.0,
                        report.created_at.format("%Y-%m-%d"),
                        report.status,
                        report.title,
                        report.author,
                        report.check_ins
                    );
                }
            }
        }
        Command::CheckIn { report_id } => {
            let count = storage.record_check_in(ReportId(report_id)).await?;
            println!("report {report_id} now has {count} check-ins");
        }
        Command::DeleteReport { report_id } => {
            if storage.delete_report(ReportId(report_id)).await? {
                println!("deleted report_id={report_id}");
            } else {
                println!("report_id={report_id} not found");
            }
        }
        Command::SeedDemo => {
            let seeded = storage.seed_demo_reports().await?;
            if seeded == 0 {
                println!("database already has reports; nothing seeded");
            } else {
                println!("seeded {seeded} demo reports");
            }
        }
    }

    Ok(())
}
