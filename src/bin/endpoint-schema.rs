//! Endpoint Schema CLI
//!
//! Command-line interface for inferring, merging, recording and validating
//! endpoint response schemas.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use endpoint_schema::{
    infer_with, load_captures, load_json, load_json_auto, load_schema_node, merge_nodes,
    to_document, validate_node, Capture, FileStore, InferOptions, MemoryStore, Recorder,
    RecorderConfig, SchemaStore, ValidateError,
};

#[derive(Parser)]
#[command(name = "endpoint-schema")]
#[command(about = "Infer and merge JSON Schemas from captured API responses")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer a schema from a JSON response body
    Infer {
        /// Body source: file path or URL (http:// or https://)
        source: String,

        /// Stamp the output with the draft-04 `$schema` URI
        #[arg(long)]
        draft: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Keep numeric-looking strings typed as strings
        #[arg(long)]
        no_numeric_strings: bool,
    },

    /// Merge two or more schemas of the same endpoint, left to right
    Merge {
        /// Schema sources: file paths or URLs
        #[arg(required = true, num_args = 2..)]
        schemas: Vec<String>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Fold a JSON Lines capture feed into per-endpoint schemas
    Record {
        /// Capture feed, one capture object per line
        feed: PathBuf,

        /// JSON file accumulating records across runs (in memory if omitted)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Recorder config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Origin relative capture URLs are resolved against
        #[arg(long)]
        origin: Option<String>,

        /// Maximum number of endpoint records to keep
        #[arg(long)]
        max_records: Option<usize>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a payload against a schema
    Validate {
        /// Payload file to validate
        payload: PathBuf,

        /// Schema source: file path or URL
        #[arg(long)]
        schema: String,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Infer {
            source,
            draft,
            output,
            pretty,
            no_numeric_strings,
        } => run_infer(&source, draft, output, pretty, !no_numeric_strings),

        Commands::Merge {
            schemas,
            output,
            pretty,
        } => run_merge(&schemas, output, pretty),

        Commands::Record {
            feed,
            store,
            config,
            origin,
            max_records,
            pretty,
        } => run_record(RecordArgs {
            feed,
            store,
            config,
            origin,
            max_records,
            pretty,
        }),

        Commands::Validate {
            payload,
            schema,
            json,
        } => run_validate(&payload, &schema, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_infer(
    source: &str,
    draft: bool,
    output: Option<PathBuf>,
    pretty: bool,
    numeric_strings: bool,
) -> Result<(), u8> {
    let body = load_json_auto(source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let options = InferOptions::new().numeric_strings(numeric_strings);
    let schema = infer_with(&body, &options);

    if draft {
        let document = to_document(&schema).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        write_output(&document, output.as_deref(), pretty)
    } else {
        write_output(&schema, output.as_deref(), pretty)
    }
}

fn run_merge(sources: &[String], output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let mut merged = None;
    for source in sources {
        let schema = load_schema_node(source).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;
        merged = Some(match merged {
            Some(acc) => merge_nodes(&acc, &schema),
            None => schema,
        });
    }

    let Some(merged) = merged else {
        eprintln!("Error: no schemas to merge");
        return Err(2);
    };
    write_output(&merged, output.as_deref(), pretty)
}

struct RecordArgs {
    feed: PathBuf,
    store: Option<PathBuf>,
    config: Option<PathBuf>,
    origin: Option<String>,
    max_records: Option<usize>,
    pretty: bool,
}

fn run_record(args: RecordArgs) -> Result<(), u8> {
    let RecordArgs {
        feed,
        store,
        config,
        origin,
        max_records,
        pretty,
    } = args;

    // Flags override values from the config file
    let mut config = match &config {
        Some(path) => RecorderConfig::load(path).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?,
        None => RecorderConfig::default(),
    };
    if origin.is_some() {
        config.origin = origin;
    }
    if max_records.is_some() {
        config.max_records = max_records;
    }

    let captures = load_captures(&feed).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    match store {
        Some(path) => {
            let store = FileStore::open(&path).map_err(|e| {
                eprintln!("Error: {}", e);
                e.exit_code() as u8
            })?;
            record_into(store, &config, &captures, pretty)
        }
        None => record_into(MemoryStore::new(), &config, &captures, pretty),
    }
}

fn record_into<S: SchemaStore>(
    store: S,
    config: &RecorderConfig,
    captures: &[Capture],
    pretty: bool,
) -> Result<(), u8> {
    let recorder = Recorder::new(store, config).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let summary = recorder.observe_all(captures).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    eprintln!(
        "Recorded {} capture(s): {} new, {} merged ({} changed), {} skipped",
        captures.len(),
        summary.created,
        summary.merged,
        summary.changed,
        summary.skipped
    );

    let records = recorder.store().records().map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    write_output(&records, None, pretty)
}

fn run_validate(payload_path: &Path, schema_source: &str, json_output: bool) -> Result<(), u8> {
    let payload = load_json(payload_path).map_err(|e| {
        report_error(json_output, &format!("loading payload: {}", e));
        e.exit_code() as u8
    })?;

    let schema = load_schema_node(schema_source).map_err(|e| {
        report_error(json_output, &format!("loading schema: {}", e));
        e.exit_code() as u8
    })?;

    match validate_node(&schema, &payload) {
        Ok(()) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                let output = serde_json::json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(ValidateError::Load(e)) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

/// Serialize `value` to `output`, or stdout when no file is given.
fn write_output<T: Serialize + ?Sized>(
    value: &T,
    output: Option<&Path>,
    pretty: bool,
) -> Result<(), u8> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(path, &json).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
