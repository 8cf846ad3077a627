//! Common utilities shared across CLI commands.

use transitlive::config::ConfigFile;
use transitlive::filter::LineFilter;
use transitlive::line::LineCatalog;
use transitlive::store::FileStore;

use crate::error::CliError;

/// Selection store: `map.state_dir` from config, else the platform data dir.
pub fn open_store(config: &ConfigFile) -> Result<FileStore, CliError> {
    match &config.state_dir {
        Some(dir) => Ok(FileStore::new(dir)),
        None => Ok(FileStore::default_location()?),
    }
}

/// Line filter restored from the selection store.
pub fn load_filter(config: &ConfigFile) -> Result<LineFilter, CliError> {
    let catalog = LineCatalog::new(config.map.modes.clone());
    Ok(LineFilter::load(catalog, Box::new(open_store(config)?)))
}
