use std::fmt::Display;
use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ContigsResult, FetchResult, ListResult, ProgressEvent, ProgressSink, ReportResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Table,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_report(result: &ReportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_contigs(result: &ContigsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}

/// Right-aligned `| a | b |` table.
pub fn render_table<H: Display, C: Display>(header: &[H], rows: &[Vec<C>]) -> String {
    let header = header.iter().map(ToString::to_string).collect::<Vec<_>>();
    let rows = rows
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut widths = header.iter().map(|cell| cell.chars().count()).collect::<Vec<_>>();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            let width = cell.chars().count();
            match widths.get_mut(i) {
                Some(current) => *current = (*current).max(width),
                None => widths.push(width),
            }
        }
    }

    let render_row = |cells: &[String]| {
        let body = widths
            .iter()
            .enumerate()
            .map(|(i, &width)| {
                let cell = cells.get(i).map(String::as_str).unwrap_or("");
                format!("{cell:>width$}")
            })
            .collect::<Vec<_>>()
            .join(" | ");
        format!("| {body} |")
    };

    let mut out = render_row(&header[..]);
    out.push('\n');
    for row in &rows {
        out.push_str(&render_row(&row[..]));
        out.push('\n');
    }
    out
}

pub fn print_fetch_table(result: &FetchResult) {
    let rows = result
        .items
        .iter()
        .map(|item| {
            vec![
                item.dataset_type.clone(),
                item.id.clone(),
                item.action.clone(),
                item.contigs.len().to_string(),
                item.appended.len().to_string(),
                item.path.clone(),
            ]
        })
        .collect::<Vec<_>>();
    print!(
        "{}",
        render_table(&["type", "id", "action", "contigs", "new", "path"], &rows)
    );
}

pub fn print_list_table(result: &ListResult) {
    let rows = result
        .datasets
        .iter()
        .map(|meta| {
            vec![
                meta.id.clone(),
                meta.species.clone(),
                meta.action.clone(),
                meta.contigs.to_string(),
                meta.downloaded_at.clone(),
            ]
        })
        .collect::<Vec<_>>();
    print!(
        "{}",
        render_table(&["id", "species", "action", "contigs", "updated"], &rows)
    );
}

pub fn print_report_table(result: &ReportResult) {
    let rows = result
        .rows
        .iter()
        .map(|row| {
            vec![
                row.sequence_name.clone(),
                row.sequence_role.clone(),
                row.genbank_accn.clone(),
                row.refseq_accn.clone(),
                row.sequence_length.clone(),
            ]
        })
        .collect::<Vec<_>>();
    print!(
        "{}",
        render_table(&["name", "role", "genbank", "refseq", "length"], &rows)
    );
}
