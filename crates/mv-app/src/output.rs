//! Terminal rendering of the visible records

use anyhow::Result;
use mv_core::{Record, RecordDetails, ResolutionState};
use mv_data::Pipeline;

const TITLE_WIDTH: usize = 48;
const ARTIST_WIDTH: usize = 28;

/// Print every visible record, one per line
pub fn print_rows(pipeline: &mut Pipeline, details: bool) -> Result<()> {
    for index in 0..pipeline.count() {
        let record = pipeline.record_at(index)?;
        println!("{}", format_row(&record));

        if details {
            if let Some(resolved) = record.resolved_details() {
                for line in resolved.tooltip(record.identifier).lines() {
                    println!("    {}", line);
                }
            }
        }
    }
    Ok(())
}

/// One line: identifier, title, artist, dates, and a marker for unsettled records
pub fn format_row(record: &Record) -> String {
    let marker = match record.state {
        ResolutionState::Resolved => "",
        ResolutionState::Failed => " [failed]",
        ResolutionState::Unresolved | ResolutionState::Pending => " [loading]",
    };
    let (artist, dates) = match record.resolved_details() {
        Some(details) => (details.artist.as_str(), format_dates(details)),
        None => ("", String::new()),
    };

    format!(
        "{:>9}  {:<title$}  {:<artist_w$}  {}{}",
        record.identifier.0,
        truncate(record.title(), TITLE_WIDTH),
        truncate(artist, ARTIST_WIDTH),
        dates,
        marker,
        title = TITLE_WIDTH,
        artist_w = ARTIST_WIDTH,
    )
    .trim_end()
    .to_string()
}

fn format_dates(details: &RecordDetails) -> String {
    match details.date_range() {
        (Some(begin), Some(end)) if begin == end => begin.to_string(),
        (Some(begin), Some(end)) => format!("{} to {}", begin, end),
        (Some(year), None) | (None, Some(year)) => year.to_string(),
        (None, None) => String::new(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(width.saturating_sub(3)).collect();
    shortened.push_str("...");
    shortened
}
