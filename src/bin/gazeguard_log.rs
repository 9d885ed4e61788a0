//! gazeguard_log - read a gazeguard event log
//!
//! Prints the most recent events. With `--check`, every row is parsed against
//! the event vocabulary and timestamps must never go backwards; any problem
//! exits non-zero.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use gaze_guard::event_log::{read_entries, EventKind, DEFAULT_LOG_PATH};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "gazeguard_log", about = "Show and check a gazeguard event log")]
struct Args {
    /// Event log CSV
    #[arg(long, default_value = DEFAULT_LOG_PATH)]
    log: PathBuf,

    /// Number of recent events to print
    #[arg(long, default_value_t = 5)]
    tail: usize,

    /// Validate the whole log
    #[arg(long)]
    check: bool,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let ui = ui::Ui::new(
        args.ui,
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    let entries = {
        let _stage = ui.stage(&format!("Read {}", args.log.display()));
        read_entries(&args.log)?
    };

    if args.check {
        let _stage = ui.stage("Check ordering");
        if let Some(pair) = entries
            .windows(2)
            .find(|pair| pair[1].timestamp < pair[0].timestamp)
        {
            return Err(anyhow!(
                "timestamps go backwards: '{}' after '{}'",
                pair[1],
                pair[0]
            ));
        }
        let threats = entries
            .iter()
            .filter(|entry| entry.kind == EventKind::ThreatDetected)
            .count();
        println!(
            "gazeguard_log: {} ok ({} events, {} threats)",
            args.log.display(),
            entries.len(),
            threats
        );
    }

    let skip = entries.len().saturating_sub(args.tail);
    for entry in &entries[skip..] {
        let marker = if entry.kind.is_threat() { '!' } else { ' ' };
        println!("{} {}", marker, entry);
    }
    Ok(())
}
