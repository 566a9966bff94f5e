use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use filepipe::client::{CommandKind, EntryKind, FileEntry, Response};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    op: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<&'a [FileEntry]>,
}

impl<'a> ResponseOutput<'a> {
    fn new(kind: CommandKind, response: &'a Response) -> Self {
        Self {
            op: kind.as_str(),
            ok: response.is_ok(),
            error: (!response.is_ok()).then_some(response.error.as_str()),
            files: (kind == CommandKind::List && response.is_ok())
                .then_some(response.files.as_slice()),
        }
    }
}

/// Print a worker response. Worker errors go to stderr except in JSON mode,
/// where they are part of the document.
pub fn print_response(kind: CommandKind, response: &Response, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&ResponseOutput::new(kind, response))
                    .unwrap_or_else(|_| "{}".to_string())
            );
        }
        _ if !response.is_ok() => {
            eprintln!("error: {}", response.error);
        }
        OutputFormat::Table if kind == CommandKind::List => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "KIND", "SIZE", "MODE", "MODIFIED"]);
            for entry in &response.files {
                table.add_row(vec![
                    entry.name.clone(),
                    kind_name(entry.kind).to_string(),
                    entry.size.to_string(),
                    format!("{:o}", entry.mode & 0o7777),
                    entry.modified.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty if kind == CommandKind::List => {
            for entry in &response.files {
                println!("{}", pretty_line(entry));
            }
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{kind}: ok");
        }
    }
}

fn kind_name(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::File => "file",
        EntryKind::Directory => "directory",
        EntryKind::Symlink => "symlink",
        EntryKind::Other => "other",
    }
}

fn pretty_line(entry: &FileEntry) -> String {
    let marker = match entry.kind {
        EntryKind::File => '-',
        EntryKind::Directory => 'd',
        EntryKind::Symlink => 'l',
        EntryKind::Other => '?',
    };
    format!(
        "{marker} {:04o} {:>10} {}",
        entry.mode & 0o7777,
        entry.size,
        entry.name
    )
}
