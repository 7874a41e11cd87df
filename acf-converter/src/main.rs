use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use acf_converter::config::{find_theme_root, ConverterSettings};
use acf_converter::convert::{Converter, JsonToPhp, PhpToJson};
use acf_converter::diagnostics::Status;
use acf_converter::extractor::SourceExtractor;
use acf_converter::scanner::{write_json_files, ThemeScanner};
use acf_converter::validator::FieldGroupValidator;

/// Convert ACF field groups between PHP registration code and ACF JSON
#[derive(Debug, Parser)]
#[command(name = "acf-converter", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan a theme for field groups
    Scan {
        /// Theme directory (or any path inside it)
        theme: PathBuf,
        /// Write one <key>.json per field group instead of printing
        #[arg(long)]
        write: bool,
        /// Output directory for --write (default: the jsonOutputDir setting)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Convert the field groups of one PHP file to ACF JSON
    ToJson {
        file: PathBuf,
    },
    /// Render PHP registration code for one ACF JSON field group
    ToPhp {
        file: PathBuf,
    },
    /// Validate an ACF JSON field group, or diff it against another
    Validate {
        file: PathBuf,
        /// Original field group to compare against
        #[arg(long)]
        against: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    // Initialize logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns false when any result has status `error`
fn run(command: Command) -> Result<bool> {
    match command {
        Command::Scan { theme, write, out } => scan(&theme, write, out),
        Command::ToJson { file } => to_json(&file),
        Command::ToPhp { file } => to_php(&file),
        Command::Validate { file, against } => validate(&file, against.as_deref()),
    }
}

fn settings_for(path: &Path) -> Result<ConverterSettings> {
    let dir = if path.is_file() {
        path.parent().unwrap_or(path)
    } else {
        path
    };
    ConverterSettings::load_from(dir)
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

fn scan(theme: &Path, write: bool, out: Option<PathBuf>) -> Result<bool> {
    let root = find_theme_root(theme).unwrap_or_else(|| theme.to_path_buf());
    let settings = settings_for(&root)?;
    info!("Scanning theme at {:?}", root);

    let mut scanner = ThemeScanner::new(&root, &settings)?;
    let report = scanner.scan();
    scanner.save_cache()?;

    if write {
        let dir = out.unwrap_or_else(|| root.join(&settings.json_output_dir));
        let written = write_json_files(&report.groups, &dir)?;
        info!("Wrote {} file(s) to {:?}", written.len(), dir);
    } else {
        let converter = PhpToJson::new();
        let results: Vec<_> = report.groups.iter().map(|group| converter.convert(group)).collect();
        print_json(&serde_json::json!({
            "files_scanned": report.files_scanned,
            "files_from_cache": report.files_from_cache,
            "results": results,
            "errors": report.errors,
            "warnings": report.warnings,
        }))?;
    }

    Ok(!report.has_errors())
}

fn to_json(file: &Path) -> Result<bool> {
    let settings = settings_for(file)?;
    let outcome = SourceExtractor::new(&settings).parse_file(file);

    let converter = PhpToJson::new();
    let results: Vec<_> = outcome.groups.iter().map(|group| converter.convert(group)).collect();
    let ok = !outcome.diagnostics.has_errors() && results.iter().all(|r| !r.is_error());

    print_json(&serde_json::json!({
        "results": results,
        "errors": outcome.diagnostics.errors,
        "warnings": outcome.diagnostics.warnings,
    }))?;
    Ok(ok)
}

fn to_php(file: &Path) -> Result<bool> {
    let tree = read_json(file)?;
    let result = JsonToPhp::new().convert(&tree);

    match &result.data {
        Some(php) => {
            for warning in &result.warnings {
                eprintln!("warning: {}", warning);
            }
            print!("{}", php);
        }
        None => print_json(&result)?,
    }
    Ok(result.status != Status::Error)
}

fn validate(file: &Path, against: Option<&Path>) -> Result<bool> {
    let tree = read_json(file)?;
    let validator = FieldGroupValidator::new();

    let report = match against {
        Some(original) => validator.validate_conversion(&read_json(original)?, &tree),
        None => validator.validate_field_group(&tree),
    };

    print_json(&report)?;
    Ok(report.valid)
}
