//! CLI tool to preview an import offline.
//!
//! Runs ingest, column mapping and staging on a local file and prints the
//! result as JSON. Nothing is uploaded or stored.
//!
//! Usage:
//!   cargo run --bin crm-import-preview -- roster.xlsx
//!   cargo run --bin crm-import-preview -- roster.xlsx --source drivers --sheet "Active"

use std::env;

use serde_json::json;
use uuid::Uuid;

use transport_crm_import::config::defaults;
use transport_crm_import::import::{FileIngestor, HeaderDetector, ImportSource, map_row, stage_rows};

/// Upload id used for preview records; staging output is otherwise deterministic.
const PREVIEW_UPLOAD_ID: Uuid = Uuid::nil();

struct Args {
    path: String,
    source: Option<ImportSource>,
    sheet: Option<String>,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || matches!(args[1].as_str(), "help" | "--help" | "-h") {
        print_usage();
        std::process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let args = parse_args(&args);

    let bytes = match std::fs::read(&args.path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading {}: {}", args.path, e);
            std::process::exit(1);
        }
    };

    let ingestor = FileIngestor::new(HeaderDetector::new(defaults::HEADER_SCAN_ROWS));
    let sheets = match ingestor.ingest(&args.path, &bytes) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error parsing {}: {}", args.path, e);
            std::process::exit(2);
        }
    };

    let Some(source) = args.source else {
        // Without a source, describe the sheets only.
        let summary: Vec<_> = sheets
            .iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "header_row_index": s.header_row_index,
                    "headers": s.headers,
                    "total_rows": s.total_rows,
                })
            })
            .collect();
        print_json(&json!({ "file": args.path, "sheets": summary }));
        return;
    };

    let sheet = match &args.sheet {
        Some(name) => sheets.iter().find(|s| &s.name == name),
        None => sheets.first(),
    };
    let Some(sheet) = sheet else {
        eprintln!(
            "Error: sheet not found. Available: {}",
            sheets.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
        );
        std::process::exit(1);
    };

    let bindings = sheet
        .rows
        .first()
        .map(|row| map_row(source.schema(), row).bindings)
        .unwrap_or_default();
    let records = stage_rows(source, PREVIEW_UPLOAD_ID, "preview", &sheet.rows);
    let error_rows = records.iter().filter(|r| !r.is_valid()).count();

    print_json(&json!({
        "file": args.path,
        "sheet": sheet.name,
        "source": source,
        "header_row_index": sheet.header_row_index,
        "column_mapping": bindings,
        "staged_rows": records.len(),
        "error_rows": error_rows,
        "records": records,
    }));
}

fn parse_args(args: &[String]) -> Args {
    let mut parsed = Args {
        path: args[1].clone(),
        source: None,
        sheet: None,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--source" | "-s" if i + 1 < args.len() => {
                parsed.source = match ImportSource::parse(&args[i + 1]) {
                    Some(source) => Some(source),
                    None => {
                        eprintln!("Error: unknown source '{}'", args[i + 1]);
                        print_usage();
                        std::process::exit(1);
                    }
                };
                i += 2;
            }
            "--sheet" if i + 1 < args.len() => {
                parsed.sheet = Some(args[i + 1].clone());
                i += 2;
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_usage();
                std::process::exit(1);
            }
        }
    }

    parsed
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error encoding output: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    let sources: Vec<&str> = ImportSource::ALL.iter().map(|s| s.as_str()).collect();
    println!("Preview a spreadsheet import without storing anything");
    println!();
    println!("Usage:");
    println!("  crm-import-preview <file> [--source <source>] [--sheet <name>]");
    println!();
    println!("Sources: {}", sources.join(", "));
    println!();
    println!("Without --source only the detected sheets and headers are printed.");
}
