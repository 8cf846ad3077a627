//! transitlive CLI - Command-line interface
//!
//! Runs the live map engine against an HTTP feed or the built-in demo feed,
//! and manages the persisted line selection and configuration file.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use transitlive::config::ConfigFile;
use transitlive::logging::{default_log_dir, init_logging};

use commands::config::ConfigAction;
use commands::lines::LinesAction;
use commands::watch::WatchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "transitlive", version, about = "Live transit vehicle positions")]
struct Cli {
    /// Mirror logs to stderr at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log directory (default: platform cache dir)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll a feed and animate vehicles until interrupted
    Watch(WatchArgs),

    /// Show or change which lines are visible
    Lines {
        #[command(subcommand)]
        action: LinesAction,
    },

    /// View or edit config.ini
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config { action } => commands::config::run(action),
        Commands::Lines { action } => commands::lines::run(action),
        Commands::Watch(args) => {
            let config = ConfigFile::load().unwrap_or_default();
            let log_dir = cli
                .log_dir
                .or_else(|| config.log_dir.clone())
                .unwrap_or_else(default_log_dir);
            let _guard = init_logging(&log_dir, cli.verbose)?;
            commands::watch::run(args, config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch_demo() {
        let cli = Cli::try_parse_from(["transitlive", "watch", "--demo", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Watch(ref args) if args.demo));
    }

    #[test]
    fn test_parse_lines_toggle() {
        let cli = Cli::try_parse_from(["transitlive", "lines", "toggle", "43 x"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Lines { action: LinesAction::Toggle { ref line } } if line == "43 x"
        ));
    }
}
