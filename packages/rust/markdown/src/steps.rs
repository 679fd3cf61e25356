//! Numbered-list extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::cleanup::normalize_line_endings;
use crate::{Extraction, Strategy};

/// One item of a numbered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// The number as written in the text. Not renumbered.
    pub ordinal: u32,
    pub title: String,
    pub explanation: String,
}

/// Extract an ordered list of numbered steps.
///
/// The primary pass splits on line-anchored `N.` markers followed by
/// whitespace and emits every item. If none are found, a line scan accepts
/// markers with no following space, but only keeps steps that gathered an
/// explanation.
#[instrument(skip(text), fields(len = text.len()))]
pub fn extract_steps(text: &str) -> Extraction<Vec<Step>> {
    let text = normalize_line_endings(text);

    let primary = primary_steps(&text);
    if !primary.is_empty() {
        debug!(steps = primary.len(), "steps extracted by marker pattern");
        return Extraction {
            items: primary,
            strategy: Strategy::Primary,
        };
    }

    let fallback = fallback_steps(&text);
    let strategy = if fallback.is_empty() {
        Strategy::Empty
    } else {
        Strategy::Fallback
    };
    debug!(steps = fallback.len(), %strategy, "steps extracted by line scan");

    Extraction {
        items: fallback,
        strategy,
    }
}

// ---------------------------------------------------------------------------
// Primary pass
// ---------------------------------------------------------------------------

fn primary_steps(text: &str) -> Vec<Step> {
    static MARKER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(\d{1,9})\.[ \t]+").expect("valid regex"));

    let markers: Vec<(u32, usize, usize)> = MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let ordinal = caps[1].parse().ok()?;
            Some((ordinal, whole.start(), whole.end()))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, (ordinal, _, block_start))| {
            let block_end = markers
                .get(i + 1)
                .map(|(_, next_start, _)| *next_start)
                .unwrap_or(text.len());
            step_from_block(*ordinal, &text[*block_start..block_end])
        })
        .collect()
}

fn step_from_block(ordinal: u32, block: &str) -> Step {
    let mut lines = block.lines().map(str::trim).filter(|l| !l.is_empty());
    let title = lines.next().unwrap_or_default().to_string();
    let explanation = lines.collect::<Vec<_>>().join(" ");

    Step {
        ordinal,
        title,
        explanation,
    }
}

// ---------------------------------------------------------------------------
// Fallback pass
// ---------------------------------------------------------------------------

/// Line scan for lists the primary pattern missed.
///
/// A step is only kept once it has a non-empty explanation, both when the
/// next marker closes it and when the text ends.
fn fallback_steps(text: &str) -> Vec<Step> {
    static LINE_MARKER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\d{1,9})\.(.*)$").expect("valid regex"));

    let mut steps = Vec::new();
    let mut open: Option<Step> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(caps) = LINE_MARKER_RE.captures(trimmed) {
            if let Ok(ordinal) = caps[1].parse::<u32>() {
                steps.extend(open.take().filter(|s| !s.explanation.is_empty()));
                open = Some(Step {
                    ordinal,
                    title: caps[2].trim().to_string(),
                    explanation: String::new(),
                });
                continue;
            }
        }

        if let Some(step) = open.as_mut() {
            if !step.explanation.is_empty() {
                step.explanation.push(' ');
            }
            step.explanation.push_str(trimmed);
        }
    }

    steps.extend(open.filter(|s| !s.explanation.is_empty()));
    steps
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
