use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(config::not_found),
        help("Create a TkConfig.json containing a \"GameDumpFolderPaths\" list, or pass one with --config")
    )]
    ConfigNotFound { path: Utf8PathBuf },

    #[error("Could not determine the local data directory")]
    #[diagnostic(
        code(config::no_data_dir),
        help("Pass the configuration file explicitly with --config")
    )]
    DataDirUnavailable,

    #[error("Configuration file error: {path}")]
    #[diagnostic(
        code(config::parse_error),
        help("Check TkConfig.json for syntax errors")
    )]
    ConfigParseError {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Not enough game dumps: found {found}, at least {required} are required")]
    #[diagnostic(
        code(config::not_enough_dumps),
        help("Add more extracted romfs folders to \"GameDumpFolderPaths\" in TkConfig.json")
    )]
    NotEnoughGameDumps { found: usize, required: usize },

    #[error("Game dump folder not found: {path}")]
    #[diagnostic(
        code(config::dump_not_found),
        help("Make sure every entry of \"GameDumpFolderPaths\" points to an extracted romfs folder")
    )]
    GameDumpNotFound { path: Utf8PathBuf },

    #[error("Lookup table generation failed")]
    #[diagnostic(code(generate::failed))]
    GenerationFailed {
        #[source]
        source: tk_lookup::Error,
    },

    #[error("IO operation failed")]
    #[diagnostic(code(io::operation_failed))]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl From<tk_lookup::Error> for CliError {
    fn from(source: tk_lookup::Error) -> Self {
        match source {
            tk_lookup::Error::NotEnoughVersionRoots { found, required } => {
                Self::NotEnoughGameDumps { found, required }
            }
            source => Self::GenerationFailed { source },
        }
    }
}
