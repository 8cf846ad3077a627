//! Line selection CLI commands.

use clap::Subcommand;
use transitlive::config::ConfigFile;
use transitlive::filter::{LineFilter, Selection};
use transitlive::line::LineId;

use super::common::load_filter;
use crate::error::CliError;

/// Lines subcommands.
#[derive(Debug, Subcommand)]
pub enum LinesAction {
    /// Show transit modes, their lines, and which are visible
    List,

    /// Show or hide one line
    Toggle {
        /// Line identifier (e.g., "14", "43X")
        line: String,
    },

    /// Show or hide every line of a transit mode
    Mode {
        /// Mode name from config.ini
        name: String,

        /// Hide the mode's lines instead of showing them
        #[arg(long)]
        off: bool,
    },

    /// Show all lines
    Reset,
}

/// Run a lines subcommand.
pub fn run(action: LinesAction) -> Result<(), CliError> {
    let config = ConfigFile::load().unwrap_or_default();
    let mut filter = load_filter(&config)?;
    apply(&mut filter, action)?;
    print!("{}", describe(&filter));
    Ok(())
}

fn apply(filter: &mut LineFilter, action: LinesAction) -> Result<(), CliError> {
    match action {
        LinesAction::List => {}
        LinesAction::Toggle { line } => {
            let line = LineId::parse(&line)
                .ok_or_else(|| CliError::Config("Line identifier is empty".to_string()))?;
            filter.toggle(&line);
        }
        LinesAction::Mode { name, off } => {
            if filter.set_mode(&name, !off).is_none() {
                return Err(CliError::Config(format!(
                    "Unknown transit mode '{}'. Define it as [mode.{}] in config.ini.",
                    name, name
                )));
            }
        }
        LinesAction::Reset => filter.show_all(),
    }
    Ok(())
}

fn describe(filter: &LineFilter) -> String {
    let mut out = String::new();
    match filter.selection() {
        Selection::ShowAll => out.push_str("Showing all lines\n"),
        Selection::ShowOnly(lines) => {
            let lines: Vec<&str> = lines.iter().map(LineId::as_str).collect();
            out.push_str(&format!("Showing only: {}\n", lines.join(", ")));
        }
    }

    for mode in filter.catalog().modes() {
        out.push_str(&format!("\n{} ({})\n", mode.name, mode.color));
        for line in &mode.lines {
            let mark = if filter.passes(line) { "x" } else { " " };
            out.push_str(&format!("  [{}] {}\n", mark, line));
        }
    }
    out
}
