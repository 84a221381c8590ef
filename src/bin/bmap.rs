//! bmap - Command-line interface for Behavior Mapper
//!
//! Commands:
//! - map: Run the full pipeline and write the cluster report
//! - corpus: Build and print the session sequence corpus
//! - validate: Load input and report record, session and activity counts
//! - config: Print the effective configuration as TOML

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use behavior_mapper::config::ClusterAlgorithm;
use behavior_mapper::encoder::write_csv;
use behavior_mapper::error::ErrorKind;
use behavior_mapper::{
    ActivityLoader, ActivityTable, BehaviorMapper, ColumnNames, InputFormat, MapperConfig,
    MapperError, MAPPER_VERSION,
};

/// bmap - Cluster channel activities by their session behavior
#[derive(Parser)]
#[command(name = "bmap")]
#[command(version = MAPPER_VERSION)]
#[command(about = "Map activity logs to behavioral clusters", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Input file path (use - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Input format
    #[arg(long, default_value = "csv")]
    input_format: CliInputFormat,

    /// CSV column holding the session ID
    #[arg(long, default_value = "ID")]
    id_col: String,

    /// CSV column holding the activity label
    #[arg(long, default_value = "activity")]
    activity_col: String,

    /// CSV column holding the occurrence timestamp
    #[arg(long, default_value = "timestamp")]
    timestamp_col: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the cluster report
    Map {
        #[command(flatten)]
        input: InputArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Override the clustering algorithm
        #[arg(long)]
        algorithm: Option<CliAlgorithm>,

        /// Drop activities containing this pattern (repeatable)
        #[arg(long = "drop")]
        drop_activities: Vec<String>,
    },

    /// Build and print the session sequence corpus (NDJSON)
    Corpus {
        #[command(flatten)]
        input: InputArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Load input and report record, session and activity counts
    Validate {
        #[command(flatten)]
        input: InputArgs,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Clone, ValueEnum)]
enum CliInputFormat {
    /// CSV with a header row
    Csv,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

impl From<CliInputFormat> for InputFormat {
    fn from(format: CliInputFormat) -> Self {
        match format {
            CliInputFormat::Csv => InputFormat::Csv,
            CliInputFormat::Ndjson => InputFormat::Ndjson,
            CliInputFormat::Json => InputFormat::Json,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON report
    Json,
    /// Pretty-printed JSON report
    JsonPretty,
    /// One CSV row per activity
    Csv,
}

#[derive(Clone, ValueEnum)]
enum CliAlgorithm {
    Dbscan,
    Optics,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), BmapCliError> {
    let config = match &cli.config {
        Some(path) => MapperConfig::load(path)?,
        None => MapperConfig::default(),
    };

    match cli.command {
        Commands::Map {
            input,
            output,
            output_format,
            algorithm,
            drop_activities,
        } => cmd_map(config, &input, &output, output_format, algorithm, drop_activities),
        Commands::Corpus { input, output } => cmd_corpus(config, &input, &output),
        Commands::Validate { input, json } => cmd_validate(&input, json),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn cmd_map(
    mut config: MapperConfig,
    input: &InputArgs,
    output: &Path,
    output_format: OutputFormat,
    algorithm: Option<CliAlgorithm>,
    drop_activities: Vec<String>,
) -> Result<(), BmapCliError> {
    if let Some(algorithm) = algorithm {
        config.clustering.algorithm = match algorithm {
            CliAlgorithm::Dbscan => ClusterAlgorithm::Dbscan,
            CliAlgorithm::Optics => ClusterAlgorithm::Optics,
        };
    }
    config.corpus.drop_activities.extend(drop_activities);

    let table = load_table(input)?;
    let mapper = BehaviorMapper::with_config(config)?;

    let output_data = match output_format {
        OutputFormat::Json => serde_json::to_string(&mapper.run_report(&table)?)? + "\n",
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&mapper.run_report(&table)?)? + "\n",
        OutputFormat::Csv => {
            let clustered = mapper.run(&table)?;
            let mut buffer = Vec::new();
            write_csv(&clustered, &mut buffer)?;
            String::from_utf8_lossy(&buffer).into_owned()
        }
    };

    write_output(output, &output_data)
}

fn cmd_corpus(config: MapperConfig, input: &InputArgs, output: &Path) -> Result<(), BmapCliError> {
    let table = load_table(input)?;
    let mapper = BehaviorMapper::with_config(config)?;
    let corpus = mapper.corpus(&table)?;

    let mut lines: Vec<String> = Vec::new();
    for sequence in &corpus.sequences {
        lines.push(serde_json::to_string(sequence)?);
    }
    let mut output_data = lines.join("\n");
    if !output_data.is_empty() {
        output_data.push('\n');
    }

    info!(
        sequences = corpus.len(),
        activities = corpus.activity_map.len(),
        volume_entries = corpus.activity_counts.len(),
        "corpus dictionaries"
    );
    write_output(output, &output_data)
}

fn cmd_validate(input: &InputArgs, json: bool) -> Result<(), BmapCliError> {
    let table = load_table(input)?;

    let report = ValidationReport {
        total_records: table.len(),
        sessions: table.session_count(),
        activities: table.distinct_activities().len(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records: {}", report.total_records);
        println!("Sessions:      {}", report.sessions);
        println!("Activities:    {}", report.activities);
    }

    Ok(())
}

// Helper functions

fn load_table(input: &InputArgs) -> Result<ActivityTable, BmapCliError> {
    let columns = ColumnNames {
        session_id: input.id_col.clone(),
        activity: input.activity_col.clone(),
        timestamp: input.timestamp_col.clone(),
    };
    let format = InputFormat::from(input.input_format.clone());

    let table = if input.input.to_string_lossy() == "-" {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        ActivityLoader::read(buffer.as_slice(), format, &columns)?
    } else {
        ActivityLoader::load(&input.input, format, &columns)?
    };

    if table.is_empty() {
        return Err(BmapCliError::NoRecords);
    }
    Ok(table)
}

fn write_output(output: &Path, data: &str) -> Result<(), BmapCliError> {
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum BmapCliError {
    Io(io::Error),
    Mapper(MapperError),
    Json(serde_json::Error),
    NoRecords,
}

impl From<io::Error> for BmapCliError {
    fn from(e: io::Error) -> Self {
        BmapCliError::Io(e)
    }
}

impl From<MapperError> for BmapCliError {
    fn from(e: MapperError) -> Self {
        BmapCliError::Mapper(e)
    }
}

impl From<serde_json::Error> for BmapCliError {
    fn from(e: serde_json::Error) -> Self {
        BmapCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<BmapCliError> for CliError {
    fn from(e: BmapCliError) -> Self {
        match e {
            BmapCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            BmapCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            BmapCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No activity records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            BmapCliError::Mapper(e) => {
                let (code, hint) = match e.kind() {
                    ErrorKind::Configuration => (
                        "CONFIGURATION_ERROR",
                        "Run 'bmap config' to see the effective settings",
                    ),
                    ErrorKind::DataIntegrity => (
                        "DATA_INTEGRITY_ERROR",
                        "Lower corpus.min_length or embedding.min_activity_count, or set [embedding] alignment = \"intersect\"",
                    ),
                    ErrorKind::EmptyResult => (
                        "EMPTY_RESULT",
                        "Check drop patterns and corpus.min_length",
                    ),
                    ErrorKind::Algorithm => (
                        "ALGORITHM_ERROR",
                        "Try a different seed, or check that activities have distinct embeddings",
                    ),
                    ErrorKind::Input => (
                        "PARSE_ERROR",
                        "Check input format and column names",
                    ),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    sessions: usize,
    activities: usize,
}
