use camino::Utf8PathBuf;
use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser};
use colored::Colorize;
use errors::CliError;
use miette::Result;
use tk_lookup::{generate_all, CancellationToken, OutputStore, MIN_VERSION_ROOTS};
use utils::config::{default_config_path, TkConfig};

mod errors;
mod utils;

/// Generate cross-version lookup tables from extracted romfs dumps.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The directory to write the lookup tables to
    #[arg(short, long, default_value = "output")]
    output: Utf8PathBuf,

    /// The path to TkConfig.json (defaults to the toolkit's local data directory)
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Write the pack file lookup without zstd compression
    #[arg(long)]
    no_compress: bool,
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

fn main() -> Result<()> {
    utils::logging::init_logging();

    let args = parse_args();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path().ok_or(CliError::DataDirUnavailable)?,
    };
    tracing::debug!("Loading config from '{}'", config_path);
    let config = TkConfig::load(&config_path)?;
    let roots = config.game_dump_folder_paths.clone();

    if roots.len() < MIN_VERSION_ROOTS {
        return Err(CliError::NotEnoughGameDumps {
            found: roots.len(),
            required: MIN_VERSION_ROOTS,
        }
        .into());
    }
    config.validate_dump_folders()?;
    for root in &roots {
        tracing::debug!("Using game dump '{}'", root);
    }

    println!(
        "{} {} {}",
        "🔎 Generating lookup tables from".bright_blue().bold(),
        roots.len().to_string().bright_cyan().bold(),
        "game dumps".bright_blue().bold()
    );

    let store = OutputStore::new(args.output).with_compression(!args.no_compress);
    tracing::info!("Writing lookup tables to '{}'", store.root());
    let reports =
        generate_all(&roots, &store, &CancellationToken::new()).map_err(CliError::from)?;

    println!(
        "{}",
        "✅ Lookup tables generated successfully!".bright_green().bold()
    );
    for report in reports {
        for output in report.outputs {
            println!(
                "{} {} {}",
                "📍".bright_green(),
                output.as_str().bright_white().bold(),
                format!("({}, {:.2?})", report.name, report.elapsed).dimmed()
            );
        }
    }

    Ok(())
}
