//! Schema Select CLI
//!
//! Command-line interface for deriving select and refined schemas from
//! schema documents.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use schema_select::{
    build_select_schema, load_document, load_json, refine_schema_with, to_json_schema,
    RefineOptions, RefineShape, Schema, SchemaDocument,
};

#[derive(Parser)]
#[command(name = "schema-select")]
#[command(about = "Derive select and refined schemas from schema documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the select schema of a document as JSON Schema
    Select {
        /// Schema document file
        schema: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Refine a schema with a descriptor and print it as JSON Schema
    Refine {
        /// Schema document file
        schema: PathBuf,

        /// Refine descriptor file ({"field": true, "nested": {...}})
        #[arg(long)]
        shape: PathBuf,

        /// Keep the source objects' unknown-key policy instead of stripping
        #[arg(long)]
        preserve_unknown_keys: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Parse a payload against a schema, a refined schema, or its select schema
    Parse {
        /// Schema document file
        schema: PathBuf,

        /// Payload file to parse
        payload: PathBuf,

        /// Parse against the schema refined with this descriptor
        #[arg(long, conflicts_with = "select")]
        shape: Option<PathBuf>,

        /// Treat the payload as a selection and check it against the select schema
        #[arg(long)]
        select: bool,

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
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Select {
            schema,
            output,
            pretty,
        } => run_select(&schema, output, pretty),

        Commands::Refine {
            schema,
            shape,
            preserve_unknown_keys,
            output,
            pretty,
        } => {
            let options = RefineOptions::new().preserve_unknown_keys(preserve_unknown_keys);
            run_refine(&schema, &shape, &options, output, pretty)
        }

        Commands::Parse {
            schema,
            payload,
            shape,
            select,
            json,
        } => run_parse(&schema, &payload, shape.as_deref(), select, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_select(schema_path: &Path, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let document = open_document(schema_path, false)?;
    let select = build_select_schema(document.root());
    emit(&to_json_schema(select.schema()), output, pretty)
}

fn run_refine(
    schema_path: &Path,
    shape_path: &Path,
    options: &RefineOptions,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let document = open_document(schema_path, false)?;
    let shape = open_shape(shape_path, false)?;
    let refined = refine_schema_with(document.root(), &shape, options).map_err(|e| {
        report_error(false, &e.to_string());
        e.exit_code() as u8
    })?;
    emit(&to_json_schema(&refined), output, pretty)
}

fn run_parse(
    schema_path: &Path,
    payload_path: &Path,
    shape_path: Option<&Path>,
    select: bool,
    json_output: bool,
) -> Result<(), u8> {
    let document = open_document(schema_path, json_output)?;
    let payload = load_json(payload_path).map_err(|e| {
        report_error(json_output, &format!("loading payload: {}", e));
        e.exit_code() as u8
    })?;

    // The select schema borrows nodes from its envelope; keep both alive here.
    let select_schema;
    let target: Schema = match shape_path {
        Some(path) => {
            let shape = open_shape(path, json_output)?;
            refine_schema_with(document.root(), &shape, &RefineOptions::default()).map_err(
                |e| {
                    report_error(json_output, &e.to_string());
                    e.exit_code() as u8
                },
            )?
        }
        None if select => {
            select_schema = build_select_schema(document.root());
            select_schema.schema().clone()
        }
        None => document.root().clone(),
    };

    match target.parse(&payload) {
        Ok(parsed) => {
            if json_output {
                println!("{}", json!({ "valid": true, "data": parsed }));
            } else {
                println!("{}", parsed);
            }
            Ok(())
        }
        Err(e) => {
            if json_output {
                println!("{}", json!({ "valid": false, "issues": &e.issues }));
            } else {
                eprintln!("Parse failed:");
                for issue in &e.issues {
                    eprintln!("  {}", issue);
                }
            }
            Err(e.exit_code() as u8)
        }
    }
}

fn open_document(path: &Path, json_output: bool) -> Result<SchemaDocument, u8> {
    load_document(path).map_err(|e| {
        report_error(json_output, &format!("loading schema: {}", e));
        e.exit_code() as u8
    })
}

fn open_shape(path: &Path, json_output: bool) -> Result<RefineShape, u8> {
    let descriptor = load_json(path).map_err(|e| {
        report_error(json_output, &format!("loading shape: {}", e));
        e.exit_code() as u8
    })?;
    RefineShape::from_json(&descriptor).map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })
}

/// Write a JSON document to `output`, or stdout.
fn emit(value: &Value, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let rendered = if pretty {
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
            std::fs::write(&path, &rendered).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", rendered);
        }
    }

    Ok(())
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
