//! Structured extraction from generated Markdown artifacts.
//!
//! Generated text is loosely formatted, so each extractor runs two tiers:
//! a pattern-based primary pass, and a line-scanning fallback used only when
//! the primary pass finds nothing. Neither tier fails: text with no
//! recognizable structure yields an empty result.
//!
//! - [`extract_sections`]: bold-header sections → ordered [`SectionMap`]
//! - [`extract_steps`]: numbered list → ordered [`Step`]s
//! - [`normalize_text`]: cleanup for artifacts returned as free text
//!
//! Extractors never log through global state; the [`Strategy`] that produced
//! a result is returned alongside it for the caller to report.

mod cleanup;
mod sections;
mod steps;

use serde::Serialize;

pub use cleanup::normalize_text;
pub use sections::{Section, SectionMap, extract_sections};
pub use steps::{Step, extract_steps};

/// Which extraction tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The pattern-based pass matched.
    Primary,
    /// The primary pass found nothing; the line scan did.
    Fallback,
    /// Neither pass found anything.
    Empty,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Empty => "empty",
        })
    }
}

/// An extraction result plus the tier that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction<T> {
    pub items: T,
    pub strategy: Strategy,
}

impl<T> Extraction<T> {
    /// Drop the strategy, keeping the extracted data.
    pub fn into_inner(self) -> T {
        self.items
    }
}
