use clap::Parser;
use deepseek_chat_export::model::Format;
use deepseek_chat_export::utils::{ExportConfig, FilenameStyle};
use deepseek_chat_export::{importer, logging, sequential};
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Convert a DeepSeek or ChatGPT conversations.json export into Markdown files.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the exported conversations.json.
    /// Defaults to ./conversations.json if not set in config.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Directory to write markdown files to.
    /// Defaults to ./DeepSeek_Conversations (./ChatGPT_Conversations for ChatGPT).
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Which application produced the export.
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Log file to append to.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Where to write the summary report.
    #[arg(long, value_name = "PATH")]
    report_file: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/deepseek-chat-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// How conversation titles become file names.
    #[arg(long, value_enum, value_name = "STYLE")]
    filename_style: Option<FilenameStyle>,

    /// Start each file with YAML front matter.
    #[arg(long)]
    frontmatter: bool,

    /// Comma-separated tags to add to front matter (e.g. "deepseek,llm").
    #[arg(long, value_name = "TAGS", value_delimiter = ',')]
    tags: Option<Vec<String>>,

    /// Overwrite files left by a previous run instead of adding a numeric suffix.
    #[arg(short, long)]
    force: bool,

    /// Log every conversation to stderr as well as to the log file.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress standard output (progress bar and report).
    #[arg(short, long)]
    quiet: bool,

    /// Print the structure of the first conversation and exit.
    #[arg(long)]
    inspect: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    input: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    format: Option<Format>,
    log_file: Option<PathBuf>,
    report_file: Option<PathBuf>,
    filename_style: Option<FilenameStyle>,
    frontmatter: Option<bool>,
    tags: Option<Vec<String>>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("deepseek-chat-export/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. The format decides every other default
    let format = cli.format.or(file_cfg.format).unwrap_or_default();
    let defaults = ExportConfig::for_format(format);

    let log_file = cli
        .log_file
        .or(file_cfg.log_file)
        .unwrap_or_else(|| PathBuf::from(format.default_log_file()));

    // 3. Resolve the rest (CLI > Config > Default)
    let config = ExportConfig {
        input: cli.input.or(file_cfg.input).unwrap_or(defaults.input),
        output_dir: cli
            .output_dir
            .or(file_cfg.output_dir)
            .unwrap_or(defaults.output_dir),
        report_file: cli
            .report_file
            .or(file_cfg.report_file)
            .unwrap_or(defaults.report_file),
        format,
        filename_style: cli
            .filename_style
            .or(file_cfg.filename_style)
            .unwrap_or(defaults.filename_style),
        frontmatter: cli.frontmatter || file_cfg.frontmatter.unwrap_or(false),
        tags: cli.tags.or(file_cfg.tags),
        force: cli.force,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    if cli.inspect {
        let records = importer::load_export(&config.input)?;
        println!("{}", importer::inspect_first(&records)?);
        return Ok(());
    }

    // 4. Logging lives until the end of main so the file writer is flushed
    let _guard = logging::init(&log_file, config.verbose)?;
    info!("{} export tool starting", format.display_name());

    if !config.input.exists() {
        let err = eyre!(
            "Input file not found: {}\nPlace the conversations.json from your {} export next to this tool, or pass its path.",
            config.input.display(),
            format.display_name()
        );
        error!("{}", err);
        return Err(err);
    }

    // 5. Run the Business Logic
    sequential::execute(&config)?;

    if !config.quiet {
        eprintln!(
            "Done. See {} for the full report and {} for details.",
            config.report_file.display(),
            log_file.display()
        );
    }
    Ok(())
}
