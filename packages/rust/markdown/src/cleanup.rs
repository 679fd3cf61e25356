//! Text cleanup passes for generated Markdown.
//!
//! Each pass is a function `&str -> String` applied in sequence.
//! [`normalize_text`] is used for artifacts returned as free text;
//! [`normalize_section_body`] for bodies produced by the section extractor.

use std::sync::LazyLock;

use regex::Regex;

/// Clean up an artifact that is returned verbatim as free text.
pub fn normalize_text(md: &str) -> String {
    let mut result = normalize_line_endings(md);

    result = normalize_bullet_padding(&result);
    result = collapse_blank_lines(&result);

    result.trim().to_string()
}

/// Clean up the body of an extracted section.
pub(crate) fn normalize_section_body(body: &str) -> String {
    let mut result = normalize_line_endings(body);

    result = flatten_labelled_bullets(&result);
    result = join_wrapped_items(&result);
    result = collapse_blank_lines(&result);

    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Line endings
// ---------------------------------------------------------------------------

pub(crate) fn normalize_line_endings(md: &str) -> String {
    md.replace("\r\n", "\n").replace('\r', "\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Bullet padding
// ---------------------------------------------------------------------------

/// Reduce `*   item` to `* item`.
fn normalize_bullet_padding(md: &str) -> String {
    static PADDED_BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^([ \t]*)([*+-])[ \t]{2,}").expect("valid regex")
    });

    PADDED_BULLET_RE.replace_all(md, "${1}${2} ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Labelled sub-bullets
// ---------------------------------------------------------------------------

/// Rewrite `* **Label:** text` and `- **Label**: text` as `* Label: text`.
fn flatten_labelled_bullets(md: &str) -> String {
    static LABELLED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^[ \t]*[*+-][ \t]+\*\*([^*\n]+?)(?::\*\*|\*\*[ \t]*:)")
            .expect("valid regex")
    });

    LABELLED_RE.replace_all(md, "* ${1}:").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Wrapped list items
// ---------------------------------------------------------------------------

/// Re-join wrapped list items so each item is one line.
///
/// A non-marker line directly after an item continues it. After a blank
/// line, only an indented line continues the item; anything else starts a
/// new paragraph. Lines before the first item are kept as they are.
/// Bullet markers are normalized to `* `; numbered markers are kept.
fn join_wrapped_items(md: &str) -> String {
    static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(?:([*+-])|(\d{1,9}\.))[ \t]+(.*)$").expect("valid regex")
    });

    let mut lines: Vec<String> = Vec::new();
    let mut in_item = false;
    let mut after_blank = false;

    for line in md.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            after_blank = true;
            continue;
        }
        let indented = line.starts_with([' ', '\t']);
        let blank_before = std::mem::take(&mut after_blank);

        if let Some(caps) = ITEM_RE.captures(trimmed) {
            let text = caps[3].trim();
            let item = match caps.get(2) {
                Some(number) => format!("{} {text}", number.as_str()),
                None => format!("* {text}"),
            };
            lines.push(item);
            in_item = true;
            continue;
        }

        if blank_before && !indented {
            in_item = false;
        }

        match lines.last_mut() {
            Some(last) if in_item => {
                last.push(' ');
                last.push_str(trimmed);
            }
            _ => lines.push(trimmed.to_string()),
        }
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 5: Blank lines
// ---------------------------------------------------------------------------

/// Collapse every run of blank lines into a single newline.
pub(crate) fn collapse_blank_lines(md: &str) -> String {
    static BLANK_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("valid regex"));

    BLANK_RUN_RE.replace_all(md, "\n").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_blank_lines_merges_runs() {
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\nb");
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\nb");
        assert_eq!(collapse_blank_lines("a\n  \n\t\nb"), "a\nb");
        assert_eq!(collapse_blank_lines("a\nb"), "a\nb");
    }

    #[test]
    fn bullet_padding_is_reduced() {
        assert_eq!(normalize_bullet_padding("*   one\n  -    two"), "* one\n  - two");
        assert_eq!(normalize_bullet_padding("* fine"), "* fine");
    }

    #[test]
    fn labelled_bullets_are_flattened() {
        let input = "* **Location:** Skeena\n  - **Scale**: Large\n* plain";
        assert_eq!(
            flatten_labelled_bullets(input),
            "* Location: Skeena\n* Scale: Large\n* plain"
        );
    }

    #[test]
    fn wrapped_bullets_are_joined() {
        let input = "*   Open pit with\n    haul roads\n*   Tailings\n\n  facility";
        assert_eq!(
            join_wrapped_items(input),
            "* Open pit with haul roads\n* Tailings facility"
        );
    }

    #[test]
    fn paragraph_after_list_is_not_joined() {
        let input = "* Open pit mine\n* Mill on site\n\nThe project will require a provincial EA certificate.\n";
        assert_eq!(
            join_wrapped_items(input),
            "* Open pit mine\n* Mill on site\nThe project will require a provincial EA certificate."
        );
    }

    #[test]
    fn text_before_first_item_is_kept() {
        let input = "Intro line\nsecond intro\n- item";
        assert_eq!(join_wrapped_items(input), "Intro line\nsecond intro\n* item");
    }

    #[test]
    fn numbered_items_keep_their_marker() {
        let input = "1. First\ncontinued\n2. Second";
        assert_eq!(join_wrapped_items(input), "1. First continued\n2. Second");
    }

    #[test]
    fn bold_line_is_not_a_bullet() {
        assert_eq!(join_wrapped_items("**Note** text\n* a"), "**Note** text\n* a");
    }

    #[test]
    fn normalize_text_matches_free_text_rules() {
        let input = "Summary\r\n\r\n*   Provincial review likely\n\n\n*   Federal threshold met\n";
        assert_eq!(
            normalize_text(input),
            "Summary\n* Provincial review likely\n* Federal threshold met"
        );
    }

    #[test]
    fn section_body_is_stable_when_rerun() {
        let input = "* **Location:** Skeena\n  region\n\n* **Scale:** Large";
        let once = normalize_section_body(input);
        assert_eq!(once, "* Location: Skeena region\n* Scale: Large");
        assert_eq!(normalize_section_body(&once), once);
    }
}
