use crate::output::print_report;
use anyhow::{bail, Context};
use clap::ValueEnum;
use multibranch_cli::project;
use multibranch_core::event::EventHead;
use multibranch_core::progress::BufferedProgress;
use multibranch_core::{Cancellation, EventKind, HeadEvent, ScmEvent, SourceEvent, SourceMatch};
use std::path::Path;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EventKindArg {
    Created,
    Updated,
    Removed,
    /// Source-level metadata changed
    Source,
}

pub fn run(
    root: &Path,
    kind: EventKindArg,
    sources: &[String],
    heads: &[String],
    origin: &str,
    log: bool,
    json: bool,
) -> anyhow::Result<()> {
    let event = build_event(kind, sources, heads, origin)?;
    let (_, project) = project::open(root)?;
    let progress = BufferedProgress::new();
    let report = project
        .on_event(&event, &progress, &Cancellation::new())
        .context("event reconciliation failed")?;

    if log {
        for line in progress.lines() {
            eprintln!("{line}");
        }
    }
    print_report(&report, json)
}

fn build_event(
    kind: EventKindArg,
    sources: &[String],
    heads: &[String],
    origin: &str,
) -> anyhow::Result<ScmEvent> {
    let matched = if sources.is_empty() {
        SourceMatch::All
    } else {
        SourceMatch::ids(sources.iter().cloned())
    };
    let kind = match kind {
        EventKindArg::Source => {
            if !heads.is_empty() {
                bail!("source events do not take --head");
            }
            return Ok(ScmEvent::Source(SourceEvent::new(origin, matched)));
        }
        EventKindArg::Created => EventKind::Created,
        EventKindArg::Updated => EventKind::Updated,
        EventKindArg::Removed => EventKind::Removed,
    };
    if heads.is_empty() {
        bail!("at least one --head is required");
    }
    let mut event = HeadEvent::new(kind, origin, matched);
    for spec in heads {
        let parsed = EventHead::parse(spec)?;
        event = event.with_head(parsed.head, parsed.revision);
    }
    Ok(ScmEvent::Head(event))
}
