//! Plain-text preparation for dialogue composition.

use regex::Regex;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*```.*$").expect("valid regex"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s.*$").expect("valid regex"));
static RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*([-*_]\s*){3,}$").expect("valid regex"));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("valid regex"));
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*+]|\d+[.)])\s+").expect("valid regex"));
static QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*>\s?").expect("valid regex"));
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*|__|~~|\*|`").expect("valid regex"));

const CJK_TERMINATORS: &[char] = &['。', '！', '？', '；', '…'];
const ASCII_TERMINATORS: &[char] = &['.', '!', '?', ';'];
const CLOSERS: &[char] = &['"', '\'', ')', '”', '’', '）', '」', '』'];

/// Removes markdown markup, keeping the readable text.
///
/// Headings, fences and horizontal rules are dropped entirely; links keep
/// their label; emphasis, list and quote markers are removed.
#[must_use]
pub fn strip_markdown(text: &str) -> String {
    let text = FENCE.replace_all(text, "");
    let text = HEADING.replace_all(&text, "");
    let text = RULE.replace_all(&text, "");
    let text = IMAGE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    let text = LIST_MARKER.replace_all(&text, "");
    let text = QUOTE.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "");

    text.lines()
        .map(str::trim)
        .filter(|line| !is_stage_direction(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Returns true for lines that only describe delivery, like `(laughs)`.
#[must_use]
pub fn is_stage_direction(line: &str) -> bool {
    line.trim_start().starts_with(['(', '[', '（', '【'])
}

/// Splits text into sentences.
///
/// CJK terminators always end a sentence. ASCII terminators end one only
/// when followed by whitespace or the end of the text, so `3.5` and `v1.2`
/// stay intact. Line breaks end a sentence too. Fragments without any
/// alphanumeric character are dropped.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            flush(&mut current, &mut sentences);
            continue;
        }
        current.push(c);

        let ends = if CJK_TERMINATORS.contains(&c) {
            true
        } else if ASCII_TERMINATORS.contains(&c) {
            chars
                .peek()
                .map_or(true, |next| next.is_whitespace() || CLOSERS.contains(next))
        } else {
            false
        };

        if ends {
            while let Some(&next) = chars.peek() {
                if CJK_TERMINATORS.contains(&next) || ASCII_TERMINATORS.contains(&next) || CLOSERS.contains(&next) {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            flush(&mut current, &mut sentences);
        }
    }
    flush(&mut current, &mut sentences);
    sentences
}

fn flush(current: &mut String, out: &mut Vec<String>) {
    let sentence = current.trim();
    if sentence.chars().any(char::is_alphanumeric) {
        out.push(sentence.to_string());
    }
    current.clear();
}

/// Joins sentences, adding a space only between non-CJK boundaries.
#[must_use]
pub fn join_sentences<S: AsRef<str>>(sentences: &[S]) -> String {
    let mut joined = String::new();
    for sentence in sentences {
        let sentence = sentence.as_ref();
        let needs_space = joined
            .chars()
            .last()
            .is_some_and(|last| !is_cjk(last) && !CJK_TERMINATORS.contains(&last));
        if needs_space {
            joined.push(' ');
        }
        joined.push_str(sentence);
    }
    joined
}

/// Returns true for Han, kana and hangul characters.
#[must_use]
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30ff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{4e00}'..='\u{9fff}'
        | '\u{ac00}'..='\u{d7af}'
        | '\u{f900}'..='\u{faff}')
}

/// Counts speech units: every CJK character plus every latin word.
#[must_use]
pub fn speech_units(text: &str) -> usize {
    let mut units = 0;
    let mut in_word = false;
    for c in text.chars() {
        if is_cjk(c) {
            units += 1;
            in_word = false;
        } else if c.is_alphanumeric() {
            if !in_word {
                units += 1;
                in_word = true;
            }
        } else if c != '\'' && c != '-' {
            in_word = false;
        }
    }
    units
}
