//! Text cleanup for model output and carousel slide segmentation.
//!
//! `clean` is deterministic and idempotent. Slide order is paragraph order.

use regex::Regex;
use std::sync::LazyLock;

/// Short paragraphs are dropped only when they also look like a leftover marker
pub const MIN_SLIDE_CHARS: usize = 10;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("cleaner pattern must compile")
}

static HEADER: LazyLock<Regex> = LazyLock::new(|| re(r"^\s{0,3}#{1,6}(?:\s+|$)"));

static BOLD_STAR: LazyLock<Regex> = LazyLock::new(|| re(r"\*\*([^*\n]+?)\*\*"));

static BOLD_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| re(r"__([^_\n]+?)__"));

static ITALIC_STAR: LazyLock<Regex> =
    LazyLock::new(|| re(r"\*([^*\s](?:[^*\n]*?[^*\s])?)\*"));

static ITALIC_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(^|[\s(])_([^_\s](?:[^_\n]*?[^_\s])?)_($|[\s).,!?:;])")
});

static LABEL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    re(concat!(
        r"(?i)^\s*(?:title|description|summary|hashtags?|carousel[ _-]?notes?|",
        r"call[ _-]?to[ _-]?action|cta|visual[ _-]?elements?|tone|brand[ _-]?colou?rs?)\s*:"
    ))
});

static SECTION_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)^\s*(?:slide|part|section)\s*#?\d+(?:\s*(?:/|of)\s*\d+)?\s*[:.)\-–—]?\s*")
});

static LIST_NUMBER: LazyLock<Regex> = LazyLock::new(|| re(r"^\s*\d{1,2}[.)]\s+"));

static SEPARATOR: LazyLock<Regex> = LazyLock::new(|| re(r"^\s*(?:-{3,}|_{3,}|\*{3,})\s*$"));

// three or more blank lines
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| re(r"\n{4,}"));

static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| re(r"\n[ \t]*\n"));

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)^(?:slide|part|section|page|cover|intro|outro|cta)\s*\d*$")
});

/// Normalize generated text.
pub fn clean(text: &str) -> String {
    // Each pass only deletes characters (line endings are normalized once),
    // so iterating to a fixpoint terminates and makes the result idempotent.
    let mut current = clean_pass(text);
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_pass(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<String> = Vec::new();
    for raw in normalized.lines() {
        let line = raw.trim_end();
        if SEPARATOR.is_match(line) {
            lines.push(String::new());
            continue;
        }

        let line = HEADER.replace(line, "");
        let line = strip_emphasis(&line);
        if LABEL_LINE.is_match(&line) {
            continue;
        }

        let line = SECTION_NUMBER.replace(&line, "");
        let line = LIST_NUMBER.replace(&line, "");
        lines.push(line.trim_end().to_string());
    }

    let joined = lines.join("\n");
    BLANK_RUN.replace_all(&joined, "\n\n").trim().to_string()
}

fn strip_emphasis(line: &str) -> String {
    let line = BOLD_STAR.replace_all(line, "$1");
    let line = BOLD_UNDERSCORE.replace_all(&line, "$1");
    let line = ITALIC_STAR.replace_all(&line, "$1");
    ITALIC_UNDERSCORE
        .replace_all(&line, "${1}${2}${3}")
        .into_owned()
}

/// Split cleaned carousel text into slides, one per paragraph, in order.
pub fn segment_slides(cleaned: &str) -> Vec<String> {
    PARAGRAPH_BREAK
        .split(cleaned)
        .map(str::trim)
        .filter(|paragraph| !is_leftover_marker(paragraph))
        .map(str::to_string)
        .collect()
}

fn is_leftover_marker(paragraph: &str) -> bool {
    if !paragraph.chars().any(char::is_alphanumeric) {
        return true;
    }
    paragraph.chars().count() < MIN_SLIDE_CHARS
        && (paragraph.ends_with(':') || MARKER.is_match(paragraph))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slide_example_from_model_output() {
        let raw = "Slide 1: **Hello** world\n\n---\n\nSlide 2: Bye";
        let cleaned = clean(raw);
        assert_eq!(cleaned, "Hello world\n\nBye");
        assert_eq!(segment_slides(&cleaned), vec!["Hello world", "Bye"]);
    }

    #[test]
    fn strips_headers_and_emphasis_but_keeps_text() {
        let raw = "## The *real* cost of __meetings__\nMost teams lose **six hours** a week.";
        assert_eq!(
            clean(raw),
            "The real cost of meetings\nMost teams lose six hours a week."
        );
    }

    #[test]
    fn hashtags_are_not_headers() {
        assert_eq!(clean("#buildinpublic #rust"), "#buildinpublic #rust");
    }

    #[test]
    fn drops_structural_label_lines() {
        let raw = "Title: Five lessons\nHashtags: #a #b\nTone: upbeat\n\
                   Lesson one is patience.\nCall to action: follow for more\n\
                   Visual elements: bold type\nBrand colors: teal";
        assert_eq!(clean(raw), "Lesson one is patience.");
    }

    #[test]
    fn numbering_only_at_line_start() {
        let raw = "1. Ship small.\n2) Ship often.\nPart 3. Measure what you ship in 2 weeks.";
        assert_eq!(
            clean(raw),
            "Ship small.\nShip often.\nMeasure what you ship in 2 weeks."
        );
        assert_eq!(clean("We grew 3. Then 4."), "We grew 3. Then 4.");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean("\n\n  a\n\n\n\n\nb  \n\n"), "a\n\nb");
        assert_eq!(clean("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean("a\n \n\t\n  \nb"), "a\n\nb");
        // two blank lines are below the threshold
        assert_eq!(clean("a\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn clean_is_idempotent() {
        let samples = [
            "Slide 1: **Hello** world\n\n---\n\nSlide 2: Bye",
            "***bold italic*** and **nested *inner* text**",
            "**a* b*",
            "_one_ _two_ _three_",
            "1. 2. 3. deep list",
            "# \n## Heading\n\n\n\n___\n\n* bullet\n- dash",
            "Slide 2 of 5 — **Title: not a label**",
            "Summary: drop me\r\nkeep me\r\n\r\n\r\n\r\nand me",
            "snake_case_identifier stays",
            "",
            "   \n\t\n",
        ];
        for sample in samples {
            let once = clean(sample);
            assert_eq!(clean(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn clean_is_idempotent_on_hostile_input() {
        let cases = [
            "****a****",
            "**__*_x_*__**",
            "*_*_*_*",
            "_*_*_*_",
            "** ** **",
            "**",
            "*",
            "_",
            "__",
            "# # # #",
            "#\n##\n###",
            "---\r\n___\r\n***",
            "\r\n\r\n\r\n\r\n",
            "\r\r\r\ra\r\r\r\rb",
            "Slide 1: Slide 2: Slide 3: done",
            "1. 1. 1. 1. 1.",
            "Title:\nTitle: Title:",
            "Part 1.\r\n\r\n\r\n**Part 2.** body\n\n\n\n",
            "## **Slide 3:** _Hashtags:_ #a",
            "**Title:** kept?\r\n__Summary:__ dropped?",
            "  -  -  -  ",
            "a\n\n\n\n\n\n\n\n\nb\r\n\r\n\r\n\r\nc",
        ];
        for case in cases {
            let once = clean(case);
            assert!(!once.contains('\r'), "carriage return survived {case:?}");
            assert!(!once.contains("\n\n\n\n"), "blank run survived {case:?}");
            assert_eq!(clean(&once), once, "not idempotent for {case:?}");
        }
    }

    #[test]
    fn segmentation_preserves_paragraph_order() {
        let cleaned = clean("Third idea first.\n\nFirst idea second.\n\nSecond idea last.");
        assert_eq!(
            segment_slides(&cleaned),
            vec!["Third idea first.", "First idea second.", "Second idea last."]
        );
    }

    #[test]
    fn segmentation_drops_leftover_markers() {
        let slides = segment_slides("Cover\n\nA real slide body here.\n\nNotes:\n\n--\n\nShort one");
        assert_eq!(slides, vec!["A real slide body here.", "Short one"]);
    }

    #[test]
    fn multi_line_paragraph_stays_one_slide() {
        let slides = segment_slides("Line one of slide\nline two of slide\n\nNext slide text");
        assert_eq!(
            slides,
            vec!["Line one of slide\nline two of slide", "Next slide text"]
        );
    }
}
