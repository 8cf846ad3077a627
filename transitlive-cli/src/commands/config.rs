//! `transitlive config` - inspect and edit `config.ini`.
//!
//! Keys are addressed as `section.key`, matching the INI layout. Transit
//! modes live in `[mode.<name>]` sections and are shown by `show` but edited
//! in the file itself.

use std::path::Path;

use clap::Subcommand;
use transitlive::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// What to do with the configuration file.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print one value, e.g. `map.poll_interval_ms`
    Get { key: String },

    /// Change one value and write the file (an empty value clears optional keys)
    Set { key: String, value: String },

    /// Print every key with its current value, then the transit modes
    #[command(alias = "list")]
    Show,

    /// Print where config.ini is read from
    Path,
}

/// Run a config action.
pub fn run(action: ConfigAction) -> Result<(), CliError> {
    match action {
        ConfigAction::Get { key } => {
            let key = lookup(&key)?;
            println!("{}", display_value(&key.get(&ConfigFile::load().unwrap_or_default())));
        }
        ConfigAction::Set { key, value } => {
            let key = lookup(&key)?;
            // A file that fails to parse is reported rather than replaced with defaults.
            let mut config = ConfigFile::load()?;
            key.set(&mut config, &value)?;
            config.save()?;
            println!("{} = {}", key, display_value(&key.get(&config)));
        }
        ConfigAction::Show => print!("{}", render(&ConfigFile::load()?)),
        ConfigAction::Path => println!("{}", describe_path(&config_file_path())),
    }
    Ok(())
}

fn lookup(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        let known: Vec<String> = ConfigKey::all().iter().map(ConfigKey::name).collect();
        CliError::Config(format!("No such key '{}'. Known keys: {}", key, known.join(", ")))
    })
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(unset)"
    } else {
        value
    }
}

fn describe_path(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not created yet, defaults in use)", path.display())
    }
}

/// INI-shaped listing of the effective configuration.
fn render(config: &ConfigFile) -> String {
    let mut out = String::new();
    let mut section = None;

    for key in ConfigKey::all() {
        if section != Some(key.section()) {
            if section.is_some() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", key.section()));
            section = Some(key.section());
        }
        out.push_str(&format!("{} = {}\n", key.key_name(), display_value(&key.get(config))));
    }

    for mode in &config.map.modes {
        let lines: Vec<&str> = mode.lines.iter().map(|l| l.as_str()).collect();
        out.push_str(&format!(
            "\n[mode.{}]\ncolor = {}\nlines = {}\n",
            mode.name,
            mode.color,
            lines.join(", ")
        ));
    }
    out
}
