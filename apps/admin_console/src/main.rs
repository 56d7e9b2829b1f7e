use std::{io::Write as _, sync::Arc};

use anyhow::Result;
use clap::Parser;
use console_core::{ConsoleIntent, ConsoleSnapshot, ReviewAction, ReviewConsole};
use storage::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

mod config;

use config::{load_settings, normalize_database_url};

const HELP: &str = "\
commands:
  refresh             reload the report list
  select <position>   select the n-th listed report
  edit                start editing the selected report
  text <content>      replace the draft text
  submit              submit the draft as a suggested edit
  cancel              discard the draft
  approve             mark the selected report approved
  revise              request a revision of the selected report
  reject              reject the selected report
  help                show this help
  quit                exit";

#[derive(Parser, Debug)]
struct Args {
    /// Overrides the database url from console.toml / environment.
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = load_settings();
    let raw_url = args.database_url.unwrap_or(settings.database_url);
    let database_url = normalize_database_url(&raw_url);

    let storage = Storage::new(&database_url).await?;
    info!(%database_url, "console: storage ready");

    let console = ReviewConsole::new(Arc::new(storage));
    if let Err(err) = console.refresh().await {
        println!("error: {err}");
    }

    run_repl(&console).await
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Intent(ConsoleIntent),
    Help,
    Quit,
}

async fn run_repl(console: &ReviewConsole) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    render(&console.snapshot().await);
    println!("{HELP}");
    prompt();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt();
            continue;
        }

        match parse_command(line, &console.snapshot().await) {
            Ok(Command::Quit) => break,
            Ok(Command::Help) => println!("{HELP}"),
            Ok(Command::Intent(intent)) => {
                if let Err(err) = console.apply(intent).await {
                    println!("error: {err}");
                }
                render(&console.snapshot().await);
            }
            Err(message) => println!("{message}"),
        }
        prompt();
    }

    Ok(())
}

fn parse_command(line: &str, snapshot: &ConsoleSnapshot) -> Result<Command, String> {
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "refresh" | "r" => Ok(Command::Intent(ConsoleIntent::Refresh)),
        "select" | "s" => {
            let position: usize = rest
                .parse()
                .map_err(|_| "usage: select <position>".to_string())?;
            let report = position
                .checked_sub(1)
                .and_then(|index| snapshot.reports.get(index))
                .ok_or_else(|| format!("no report at position {position}"))?;
            Ok(Command::Intent(ConsoleIntent::Select(report.id)))
        }
        "edit" | "e" => {
            if snapshot.is_editing() {
                Err("already editing; use text, submit, or cancel".to_string())
            } else {
                Ok(Command::Intent(ConsoleIntent::ToggleEdit))
            }
        }
        "cancel" => {
            if snapshot.is_editing() {
                Ok(Command::Intent(ConsoleIntent::ToggleEdit))
            } else {
                Err("no edit in progress".to_string())
            }
        }
        "text" | "t" => Ok(Command::Intent(ConsoleIntent::EditDraft(rest.to_string()))),
        "submit" => Ok(Command::Intent(ConsoleIntent::SubmitEdit)),
        "approve" | "revise" | "reject" => {
            let report = snapshot
                .selected_report()
                .ok_or_else(|| "no report selected".to_string())?;
            let action = match word {
                "approve" => ReviewAction::Approve,
                "revise" => ReviewAction::RequestRevision,
                _ => ReviewAction::Reject,
            };
            Ok(Command::Intent(ConsoleIntent::ChangeStatus {
                id: report.id,
                action,
            }))
        }
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}'; type 'help'")),
    }
}

fn render(snapshot: &ConsoleSnapshot) {
    println!();
    if snapshot.reports.is_empty() {
        println!("no reports");
    } else {
        println!("reports:");
        for (index, report) in snapshot.reports.iter().enumerate() {
            let marker = if snapshot.selected_id == Some(report.id) {
                '>'
            } else {
                ' '
            };
            println!(
                "{marker} {:>2}. [{}] {}",
                index + 1,
                report.status,
                report.title
            );
        }
    }

    println!();
    match snapshot.selected_report() {
        Some(report) => {
            println!("{}", report.title);
            println!(
                "by {}   {}   {} check-ins   status: {}",
                report.author,
                report.created_at.format("%Y-%m-%d"),
                report.check_ins,
                report.status
            );
            if snapshot.is_editing() {
                println!("content (editing):");
            } else {
                println!("content:");
            }
            for line in snapshot.display_content().unwrap_or("").lines() {
                println!("  {line}");
            }
        }
        None => println!("select a report to view details"),
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use shared::domain::{Report, ReportId, ReportStatus};

    use super::*;

    fn report(id: i64) -> Report {
        Report {
            id: ReportId(id),
            title: format!("Report {id}"),
            author: "author".to_string(),
            created_at: Utc
                .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
                .single()
                .expect("timestamp"),
            check_ins: 0,
            content: "content".to_string(),
            status: ReportStatus::Pending,
        }
    }

    fn snapshot(
        reports: Vec<Report>,
        selected: Option<ReportId>,
        draft: Option<String>,
    ) -> ConsoleSnapshot {
        ConsoleSnapshot {
            reports,
            selected_id: selected,
            draft,
        }
    }

    #[test]
    fn select_resolves_one_based_position() {
        let snapshot = snapshot(vec![report(7), report(3)], None, None);
        assert_eq!(
            parse_command("select 2", &snapshot),
            Ok(Command::Intent(ConsoleIntent::Select(ReportId(3))))
        );
    }

    #[test]
    fn select_rejects_out_of_range_positions() {
        let snapshot = snapshot(vec![report(7)], None, None);
        assert!(parse_command("select 0", &snapshot).is_err());
        assert!(parse_command("select 2", &snapshot).is_err());
        assert!(parse_command("select x", &snapshot).is_err());
    }

    #[test]
    fn review_commands_target_the_selected_report() {
        let snapshot = snapshot(vec![report(7)], Some(ReportId(7)), None);
        assert_eq!(
            parse_command("approve", &snapshot),
            Ok(Command::Intent(ConsoleIntent::ChangeStatus {
                id: ReportId(7),
                action: ReviewAction::Approve,
            }))
        );
        assert_eq!(
            parse_command("revise", &snapshot),
            Ok(Command::Intent(ConsoleIntent::ChangeStatus {
                id: ReportId(7),
                action: ReviewAction::RequestRevision,
            }))
        );
    }

    #[test]
    fn review_commands_require_a_selection() {
        let snapshot = snapshot(vec![report(7)], None, None);
        assert!(parse_command("approve", &snapshot).is_err());
        assert!(parse_command("reject", &snapshot).is_err());
    }

    #[test]
    fn edit_and_cancel_depend_on_edit_state() {
        let clean = snapshot(vec![report(7)], Some(ReportId(7)), None);
        assert_eq!(
            parse_command("edit", &clean),
            Ok(Command::Intent(ConsoleIntent::ToggleEdit))
        );
        assert!(parse_command("cancel", &clean).is_err());

        let editing = snapshot(
            vec![report(7)],
            Some(ReportId(7)),
            Some("draft".to_string()),
        );
        assert!(parse_command("edit", &editing).is_err());
        assert_eq!(
            parse_command("cancel", &editing),
            Ok(Command::Intent(ConsoleIntent::ToggleEdit))
        );
    }

    #[test]
    fn text_keeps_the_rest_of_the_line() {
        let editing = snapshot(
            vec![report(7)],
            Some(ReportId(7)),
            Some("draft".to_string()),
        );
        assert_eq!(
            parse_command("text two words here", &editing),
            Ok(Command::Intent(ConsoleIntent::EditDraft(
                "two words here".to_string()
            )))
        );
    }

    #[test]
    fn unknown_commands_are_reported() {
        let empty = snapshot(Vec::new(), None, None);
        assert!(parse_command("frobnicate", &empty).is_err());
        assert_eq!(parse_command("help", &empty), Ok(Command::Help));
        assert_eq!(parse_command("quit", &empty), Ok(Command::Quit));
    }
}
