use std::io::{self, Write};

use client_core::{Failure, FailureKind, LifecycleState};
use shared::domain::{MatchItem, SearchOutcome};

pub const EMPTY_RESULTS_MESSAGE: &str = "No visual matches found.";
const EMPTY_RESULTS_HINT: &str = "Try uploading a clear image of a product or object.";
const UNTITLED: &str = "Untitled";

/// Writes a terminal state. Non-terminal states print nothing.
pub fn render_state(state: &LifecycleState, json: bool, out: &mut impl Write) -> io::Result<()> {
    match state {
        LifecycleState::Succeeded(outcome) if json => render_json(outcome, out),
        LifecycleState::Succeeded(outcome) => render_outcome(outcome, out),
        LifecycleState::Failed(failure) => render_failure(failure, out),
        _ => Ok(()),
    }
}

pub fn render_outcome(outcome: &SearchOutcome, out: &mut impl Write) -> io::Result<()> {
    if let Some(latency) = &outcome.latency {
        writeln!(out, "Search completed in {latency}")?;
    }
    for message in &outcome.status_messages {
        writeln!(out, "! {message}")?;
    }

    if outcome.is_empty() {
        writeln!(out, "{EMPTY_RESULTS_MESSAGE}")?;
        writeln!(out, "{EMPTY_RESULTS_HINT}")?;
        return Ok(());
    }

    writeln!(out, "Web visual matches ({} found)", outcome.matches.len())?;
    for (index, item) in outcome.matches.iter().enumerate() {
        render_match(index + 1, item, out)?;
    }
    Ok(())
}

fn render_match(position: usize, item: &MatchItem, out: &mut impl Write) -> io::Result<()> {
    let title = item.title.as_deref().unwrap_or(UNTITLED);
    match &item.price {
        Some(price) => writeln!(out, "{position:>3}. {title}  [{price}]")?,
        None => writeln!(out, "{position:>3}. {title}")?,
    }
    writeln!(out, "     image:  {}", item.image_ref)?;
    if let Some(link) = &item.source_link {
        writeln!(out, "     source: {link}")?;
    }
    Ok(())
}

pub fn render_failure(failure: &Failure, out: &mut impl Write) -> io::Result<()> {
    let label = match failure.kind() {
        FailureKind::InvalidFileType => "invalid file",
        FailureKind::NetworkFailure => "search failed",
        FailureKind::ValidationFailure => "rejected",
    };
    writeln!(out, "error ({label}): {}", failure.message())
}

/// The outcome exactly as decoded, for piping into other tools.
pub fn render_json(outcome: &SearchOutcome, out: &mut impl Write) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, outcome)?;
    writeln!(out)
}
