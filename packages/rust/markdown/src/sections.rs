//! Section extraction: bold header lines → ordered name/body map.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use serde::ser::SerializeMap;
use tracing::{debug, instrument};

use crate::cleanup::{collapse_blank_lines, normalize_line_endings, normalize_section_body};
use crate::{Extraction, Strategy};

/// A named block of text from a header-delimited artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub name: String,
    pub body: String,
}

/// Sections keyed by name, in order of first appearance.
///
/// Names compare case-insensitively. Serializes as a JSON object of
/// `name → body`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMap {
    entries: IndexMap<String, Section>,
}

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a section body by name (whitespace- and case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&fold_name(&normalize_name(name)))
            .map(|s| s.body.as_str())
    }

    /// Sections in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.entries.values()
    }

    /// Section names in order of first appearance.
    pub fn names(&self) -> Vec<&str> {
        self.entries.values().map(|s| s.name.as_str()).collect()
    }

    /// Record one header occurrence.
    ///
    /// A repeated name keeps its original position; its content is replaced
    /// only by a later occurrence with a non-empty body.
    fn record(&mut self, name: String, body: String) {
        let key = fold_name(&name);
        match self.entries.get_mut(&key) {
            Some(existing) => {
                if !body.is_empty() {
                    *existing = Section { name, body };
                }
            }
            None => {
                self.entries.insert(key, Section { name, body });
            }
        }
    }
}

impl Serialize for SectionMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for section in self.entries.values() {
            map.serialize_entry(&section.name, &section.body)?;
        }
        map.end()
    }
}

impl IntoIterator for SectionMap {
    type Item = Section;
    type IntoIter = indexmap::map::IntoValues<String, Section>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

/// Extract bold-header sections from generated Markdown.
///
/// The primary pass treats a line holding only a bold span (optionally after
/// `#` markers, optionally with a trailing colon) as a header. If no such
/// line exists, a line scan treats any line beginning with `**` as a header.
#[instrument(skip(text), fields(len = text.len()))]
pub fn extract_sections(text: &str) -> Extraction<SectionMap> {
    let text = normalize_line_endings(text);

    let primary = primary_sections(&text);
    if !primary.is_empty() {
        debug!(sections = primary.len(), "sections extracted by header pattern");
        return Extraction {
            items: primary,
            strategy: Strategy::Primary,
        };
    }

    let fallback = fallback_sections(&text);
    if fallback.is_empty() {
        debug!("no section headers found");
        return Extraction {
            items: fallback,
            strategy: Strategy::Empty,
        };
    }

    debug!(sections = fallback.len(), "sections extracted by line scan");
    Extraction {
        items: fallback,
        strategy: Strategy::Fallback,
    }
}

// ---------------------------------------------------------------------------
// Primary pass
// ---------------------------------------------------------------------------

fn primary_sections(text: &str) -> SectionMap {
    static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^[ \t]*(?:#{1,6}[ \t]*)?\*\*([^*\n]+?)\*\*[ \t]*:?[ \t]*$")
            .expect("valid regex")
    });

    let headers: Vec<(String, usize, usize)> = HEADER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((normalize_name(&caps[1]), whole.start(), whole.end()))
        })
        .collect();

    let mut sections = SectionMap::new();

    for (i, (name, _, body_start)) in headers.iter().enumerate() {
        let body_end = headers
            .get(i + 1)
            .map(|(_, next_start, _)| *next_start)
            .unwrap_or(text.len());

        if name.is_empty() {
            continue;
        }

        let body = normalize_section_body(&text[*body_start..body_end]);
        sections.record(name.clone(), body);
    }

    sections
}

// ---------------------------------------------------------------------------
// Fallback pass
// ---------------------------------------------------------------------------

fn fallback_sections(text: &str) -> SectionMap {
    let mut sections = SectionMap::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with("**") {
            close_fallback_section(&mut sections, current.take());

            let (name, rest) = split_header_line(trimmed);
            if !name.is_empty() {
                let mut body = Vec::new();
                if !rest.is_empty() {
                    body.push(rest);
                }
                current = Some((name, body));
            }
        } else if !line.trim().is_empty() {
            if let Some((_, body)) = current.as_mut() {
                body.push(line.trim_end().to_string());
            }
        }
    }

    close_fallback_section(&mut sections, current);
    sections
}

fn close_fallback_section(sections: &mut SectionMap, section: Option<(String, Vec<String>)>) {
    let Some((name, lines)) = section else {
        return;
    };

    let body = collapse_blank_lines(&lines.join("\n")).trim().to_string();
    if !body.is_empty() {
        sections.record(name, body);
    }
}

/// Split `**Name** trailing text` into the header name and the trailing text.
fn split_header_line(line: &str) -> (String, String) {
    let inner = &line[2..];
    match inner.find("**") {
        Some(close) => {
            let rest = inner[close + 2..].trim();
            let rest = rest.strip_prefix(':').unwrap_or(rest).trim();
            (normalize_name(&inner[..close]), rest.to_string())
        }
        None => (normalize_name(line.trim_matches('*')), String::new()),
    }
}

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// Collapse internal whitespace and drop surrounding whitespace and colons.
fn normalize_name(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(':').trim_end().to_string()
}

fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const OUTLINE: &str = "\
# Project Description Outline

**Project Overview**

*   **Location:** Skeena region,
    northwest British Columbia
*   **Deposit:** Sediment-hosted stratiform cobalt

**Potential Environmental Effects**

*   **Water:** Acid rock drainage risk
*   **Wildlife:** Caribou habitat fragmentation
";

    #[test]
    fn primary_extracts_sections_in_order() {
        let result = extract_sections(OUTLINE);
        assert_eq!(result.strategy, Strategy::Primary);
        assert_eq!(
            result.items.names(),
            ["Project Overview", "Potential Environmental Effects"]
        );
        assert_eq!(
            result.items.get("Project Overview"),
            Some("* Location: Skeena region, northwest British Columbia\n* Deposit: Sediment-hosted stratiform cobalt")
        );
        assert_eq!(
            result.items.get("potential   environmental effects"),
            Some("* Water: Acid rock drainage risk\n* Wildlife: Caribou habitat fragmentation")
        );
    }

    #[test]
    fn labelled_bullets_are_not_headers() {
        let result = extract_sections("**Overview**\n* **Scale:** Large\n* **Type:** Open pit");
        assert_eq!(result.items.len(), 1);
        assert_eq!(
            result.items.get("Overview"),
            Some("* Scale: Large\n* Type: Open pit")
        );
    }

    #[test]
    fn header_styles_are_tolerated() {
        let text = "## **Alpha**\none\n**Beta:**\ntwo\n  **Gamma**:  \nthree";
        let result = extract_sections(text);
        assert_eq!(result.strategy, Strategy::Primary);
        assert_eq!(result.items.names(), ["Alpha", "Beta", "Gamma"]);
        assert_eq!(result.items.get("gamma"), Some("three"));
    }

    #[test]
    fn duplicate_name_keeps_later_body_at_first_position() {
        let text = "**Project Overview**\nfirst body\n**Effects**\nx\n**Project Overview**\n  second body  \n";
        let result = extract_sections(text);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items.names(), ["Project Overview", "Effects"]);
        assert_eq!(result.items.get("Project Overview"), Some("second body"));
    }

    #[test]
    fn empty_later_duplicate_does_not_erase_body() {
        let text = "**A**\nkept\n**A**\n";
        let result = extract_sections(text);
        assert_eq!(result.items.get("A"), Some("kept"));
    }

    #[test]
    fn no_headers_yields_empty_map() {
        let result = extract_sections("Just a paragraph.\n\n- and a bullet\n");
        assert_eq!(result.strategy, Strategy::Empty);
        assert!(result.items.is_empty());
    }

    #[test]
    fn empty_input_yields_empty_map() {
        let result = extract_sections("");
        assert_eq!(result.strategy, Strategy::Empty);
        assert!(result.items.is_empty());
    }

    #[test]
    fn fallback_used_when_headers_carry_trailing_text() {
        let text = "**Overview** of the project\nOpen pit mine\n\n\nNear the river\n**Effects** expected\n**Empty\n";
        let result = extract_sections(text);
        assert_eq!(result.strategy, Strategy::Fallback);
        assert_eq!(result.items.names(), ["Overview", "Effects"]);
        assert_eq!(
            result.items.get("Overview"),
            Some("of the project\nOpen pit mine\nNear the river")
        );
        assert_eq!(result.items.get("Effects"), Some("expected"));
        assert_eq!(result.items.get("Empty"), None);
    }

    #[test]
    fn fallback_handles_unclosed_bold() {
        let text = "**Overview\nline one\nline two";
        let result = extract_sections(text);
        assert_eq!(result.strategy, Strategy::Fallback);
        assert_eq!(result.items.get("Overview"), Some("line one\nline two"));
    }

    #[test]
    fn fallback_ignores_text_before_first_header() {
        let text = "preamble\n**Intro** x\nbody";
        let result = extract_sections(text);
        assert_eq!(result.items.names(), ["Intro"]);
        assert_eq!(result.items.get("Intro"), Some("x\nbody"));
    }

    #[test]
    fn closing_paragraph_stays_off_the_last_bullet() {
        let text = "**Project Overview**\n* Open pit mine\n* Mill on site\n\nThe project will require a provincial EA certificate.\n";
        let result = extract_sections(text);
        assert_eq!(
            result.items.get("Project Overview"),
            Some("* Open pit mine\n* Mill on site\nThe project will require a provincial EA certificate.")
        );
    }

    #[test]
    fn extraction_is_idempotent_on_reconstructed_text() {
        let first = extract_sections(OUTLINE).into_inner();
        let rebuilt: String = first
            .iter()
            .map(|s| format!("**{}**\n{}\n", s.name, s.body))
            .collect();
        let second = extract_sections(&rebuilt).into_inner();
        assert_eq!(first, second);
    }

    #[test]
    fn serializes_as_ordered_object() {
        let map = extract_sections("**B**\nb\n**A**\na").into_inner();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"B":"b","A":"a"}"#);
    }

    #[test]
    fn windows_line_endings_are_handled() {
        let result = extract_sections("**A**\r\n\r\none\r\n\r\n**B**\r\ntwo\r\n");
        assert_eq!(result.items.get("A"), Some("one"));
        assert_eq!(result.items.get("B"), Some("two"));
    }
}
