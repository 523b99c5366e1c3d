//! Toolkit configuration loading.
//!
//! The list of game dumps is shared with the mod manager through its
//! `TkConfig.json`, stored in `<local data dir>/tkmm2/`.

use crate::errors::CliError;
use camino::{Utf8Path, Utf8PathBuf};
use directories_next::BaseDirs;
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR_NAME: &str = "tkmm2";
pub const CONFIG_FILE_NAME: &str = "TkConfig.json";

/// The subset of the toolkit configuration used here. Unknown fields are
/// ignored.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct TkConfig {
    /// Extracted romfs folders, one per game version.
    #[serde(rename = "GameDumpFolderPaths", default)]
    pub game_dump_folder_paths: Vec<Utf8PathBuf>,
}

impl TkConfig {
    /// Load the configuration from `path`.
    pub fn load(path: &Utf8Path) -> Result<Self, CliError> {
        if !path.as_std_path().is_file() {
            return Err(CliError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = std::fs::read_to_string(path.as_std_path())?;
        serde_json::from_str(&contents).map_err(|source| CliError::ConfigParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check that every configured dump folder exists.
    pub fn validate_dump_folders(&self) -> Result<(), CliError> {
        match self
            .game_dump_folder_paths
            .iter()
            .find(|path| !path.as_std_path().is_dir())
        {
            Some(path) => Err(CliError::GameDumpNotFound { path: path.clone() }),
            None => Ok(()),
        }
    }
}

/// Returns `<local data dir>/tkmm2/TkConfig.json`.
pub fn default_config_path() -> Option<Utf8PathBuf> {
    let dirs = BaseDirs::new()?;
    let path = dirs
        .data_local_dir()
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME);
    Utf8PathBuf::from_path_buf(path).ok()
}
