//! Chord and section extraction from settled chart markup.
//!
//! Two strategies, selected by what the page exposes:
//!
//! - [`AttributeExtractor`]: the site marks every chord with an attribute
//!   (`<span data-original-chord="Am">Am</span>`), so chord identity is read
//!   straight from the markup.
//! - [`TokenExtractor`]: plain text is scanned with a chord grammar. Explicit
//!   `[ch]..[/ch]` wiki markup is honoured when present.
//!
//! Both can additionally split the song into bracketed sections
//! (`[Verse]`, `[Chorus]`). An empty result is a valid outcome, not an error.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{SongRecord, Sections, BLANK_SECTION, UNNAMED_SECTION};
use crate::render::parse_selector;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Root, accidental, quality, extension, optional slash bass.
const CHORD_PATTERN: &str = r"[A-G](?:#|b)?(?:maj|min|dim|aug|sus|add|m|\+)?\d*(?:/[A-G](?:#|b)?)?";

pub static CHORD_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(CHORD_PATTERN).unwrap());

/// A whole word that is exactly one chord.
static CHORD_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^{}$", CHORD_PATTERN)).unwrap());

/// Repeat markers that may sit on a chord line: "x2", "(x4)"
static REPEAT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^x\d+$").unwrap());

/// `[Verse 1]` at the start of a line, with whatever follows it.
static SECTION_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[([^\[\]]*)\](.*)$").unwrap());

/// Explicit wiki chord markup: `[ch]Am[/ch]`
static WIKI_CHORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[ch\](.*?)\[/ch\]").unwrap());

/// Wiki tab wrappers carry no chords.
static WIKI_TAB: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[/?tab\]").unwrap());

// ============================================================================
// Strategy selection
// ============================================================================

#[derive(Debug, Error)]
pub enum ChordParseError {
    #[error("chord attribute '{0}' does not form a valid selector")]
    InvalidAttribute(String),
    #[error("malformed chart: {0}")]
    Malformed(String),
}

/// Anything that turns a settled fragment into a song record.
pub trait ChordExtractor {
    fn extract(&self, fragment: &str) -> Result<SongRecord, ChordParseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Attribute,
    Token,
}

impl Strategy {
    pub fn build(
        self,
        chord_attribute: &str,
        capture_sections: bool,
    ) -> Result<Box<dyn ChordExtractor>, ChordParseError> {
        Ok(match self {
            Strategy::Attribute => Box::new(AttributeExtractor::new(chord_attribute, capture_sections)?),
            Strategy::Token => Box::new(TokenExtractor::new(capture_sections)),
        })
    }
}

// ============================================================================
// Section bookkeeping
// ============================================================================

/// Collects chords into sections in document order.
///
/// Chords before the first header land in [`UNNAMED_SECTION`]. A label seen
/// again later gets a running number (`Chorus`, `Chorus (2)`) so the
/// sections concatenate back to the chord list in document order.
struct SectionBuilder {
    sections: Sections,
    current: String,
    seen: FxHashMap<String, usize>,
}

impl SectionBuilder {
    fn new() -> Self {
        let mut sections = Sections::new();
        sections.insert(UNNAMED_SECTION.to_string(), Vec::new());
        let mut seen = FxHashMap::default();
        seen.insert(UNNAMED_SECTION.to_string(), 1);
        Self {
            sections,
            current: UNNAMED_SECTION.to_string(),
            seen,
        }
    }

    fn start(&mut self, raw_label: &str) {
        let label = match raw_label.trim() {
            "" => BLANK_SECTION.to_string(),
            l => l.to_string(),
        };
        let n = self.seen.entry(label.clone()).or_insert(0);
        *n += 1;
        let key = if *n == 1 { label } else { format!("{} ({})", label, n) };
        self.sections.entry(key.clone()).or_default();
        self.current = key;
    }

    fn push(&mut self, chord: String) {
        self.sections.entry(self.current.clone()).or_default().push(chord);
    }

    fn finish(self) -> SongRecord {
        SongRecord::from_sections(self.sections)
    }
}

/// Header label and the rest of the line, if the line opens a section.
fn split_header(line: &str) -> Option<(&str, &str)> {
    let caps = SECTION_HEADER.captures(line.trim())?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

// ============================================================================
// Token-based scanning
// ============================================================================

fn is_chord_word(word: &str) -> bool {
    CHORD_WORD.is_match(word)
}

fn strip_word(word: &str) -> &str {
    word.trim_matches(|c: char| matches!(c, '|' | '(' | ')' | '[' | ']' | ',' | '.' | ':' | ';' | '*' | '~' | '-'))
}

/// Chords needed at the start of a line for trailing words to read as a
/// performance note ("C G Am F play softly") rather than lyrics.
const MIN_LEADING_RUN: usize = 2;

struct Word<'a> {
    text: &'a str,
    chord: bool,
    /// Inside parentheses: "(slowly)", "(let ring)"
    aside: bool,
}

fn classify_words(line: &str) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut in_parens = false;
    for raw in line.split_whitespace() {
        if raw.starts_with('(') {
            in_parens = true;
        }
        let aside = in_parens;
        if raw.ends_with(')') {
            in_parens = false;
        }
        let text = strip_word(raw);
        if text.is_empty() || REPEAT_MARKER.is_match(text) {
            continue;
        }
        words.push(Word {
            text,
            chord: is_chord_word(text),
            aside,
        });
    }
    words
}

/// Chords contributed by one text line, or nothing for a lyric line.
///
/// Chords must outnumber the other words, so lyrics that happen to contain
/// chord-shaped words ("Am I the one") yield nothing. Parenthesised asides
/// are not counted against the line. A line that opens with a run of at
/// least two chords keeps that run whatever text follows it.
pub fn line_chords(line: &str) -> Vec<String> {
    let words = classify_words(line);
    let chords = words.iter().filter(|w| w.chord).count();
    let others = words.iter().filter(|w| !w.chord && !w.aside).count();
    if chords > 0 && chords > others {
        return scan_line(line);
    }

    let lead = words.iter().take_while(|w| w.chord).count();
    if lead >= MIN_LEADING_RUN {
        words[..lead].iter().map(|w| w.text.to_string()).collect()
    } else {
        Vec::new()
    }
}

pub fn is_chord_line(line: &str) -> bool {
    !line_chords(line).is_empty()
}

/// Chord tokens in one line, in order of discovery.
///
/// A match is rejected when the next character is a lowercase letter
/// ("Am" in "Among") or when it continues a preceding word.
pub fn scan_line(line: &str) -> Vec<String> {
    CHORD_TOKEN
        .find_iter(line)
        .filter(|m| {
            let next_lower = line[m.end()..].chars().next().is_some_and(|c| c.is_lowercase());
            let joins_word = line[..m.start()].chars().next_back().is_some_and(|c| c.is_alphanumeric());
            !next_lower && !joins_word
        })
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Chord tokens of a whole text in order of discovery, duplicates kept.
pub fn tokenize_chords(text: &str) -> Vec<String> {
    TokenExtractor::new(false).extract_text(text).chord_list
}

/// Chords from explicit `[ch]..[/ch]` markup, in order.
fn wiki_chords(line: &str) -> Vec<String> {
    WIKI_CHORD
        .captures_iter(line)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

pub struct TokenExtractor {
    sections: bool,
}

impl TokenExtractor {
    pub fn new(sections: bool) -> Self {
        Self { sections }
    }

    fn chords_in(line: &str, explicit: bool) -> Vec<String> {
        if explicit {
            wiki_chords(line)
        } else {
            line_chords(line)
        }
    }

    /// Scan plain text (already stripped of markup).
    pub fn extract_text(&self, text: &str) -> SongRecord {
        let text = WIKI_TAB.replace_all(text, "");
        let explicit = WIKI_CHORD.is_match(&text);
        let mut builder = SectionBuilder::new();

        for line in text.lines() {
            let body = match split_header(line) {
                // `[ch]` opens chord markup, not a section
                Some((label, rest)) if label != "ch" => {
                    if self.sections {
                        builder.start(label);
                    }
                    rest
                }
                _ => line,
            };
            for chord in Self::chords_in(body, explicit) {
                builder.push(chord);
            }
        }

        let record = builder.finish();
        if self.sections {
            record
        } else {
            SongRecord::from_chords(record.chord_list)
        }
    }
}

impl ChordExtractor for TokenExtractor {
    fn extract(&self, fragment: &str) -> Result<SongRecord, ChordParseError> {
        Ok(self.extract_text(&fragment_text(fragment)))
    }
}

/// Elements that break the flow of text onto a new line.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "pre", "li", "ul", "ol", "tr", "table", "h1", "h2", "h3", "h4", "h5", "h6", "section",
    "article", "blockquote",
];

/// Plain text of a fragment with `<br>` and block boundaries kept as line breaks.
pub fn fragment_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    let mut text = String::new();
    push_text(doc.root_element(), &mut text);
    text
}

fn push_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            Node::Element(el) => {
                let block = BLOCK_ELEMENTS.contains(&el.name());
                if block {
                    out.push('\n');
                }
                if let Some(inner) = ElementRef::wrap(child) {
                    push_text(inner, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Attribute-based extraction
// ============================================================================

pub struct AttributeExtractor {
    attribute: String,
    selector: Selector,
    sections: bool,
}

impl AttributeExtractor {
    pub fn new(attribute: &str, sections: bool) -> Result<Self, ChordParseError> {
        let selector = parse_selector(&format!("[{}]", attribute))
            .map_err(|_| ChordParseError::InvalidAttribute(attribute.to_string()))?;
        Ok(Self {
            attribute: attribute.to_string(),
            selector,
            sections,
        })
    }

    fn chord_text(element: ElementRef) -> Option<String> {
        let text: String = element.text().collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    fn flat(&self, doc: &Html) -> SongRecord {
        let chords = doc.select(&self.selector).filter_map(Self::chord_text).collect();
        SongRecord::from_chords(chords)
    }

    /// Markers present but none readable means the chart layout changed
    /// under us, which is not the same as a chart without chords.
    fn check_markers(&self, doc: &Html, record: &SongRecord) -> Result<(), ChordParseError> {
        let markers = doc.select(&self.selector).count();
        if markers > 0 && record.count == 0 {
            return Err(ChordParseError::Malformed(format!(
                "{markers} '{}' markers carry no chord text",
                self.attribute
            )));
        }
        Ok(())
    }

    /// Walk the fragment in document order, splitting it into lines. A line
    /// whose non-chord text opens with `[Label]` starts a new section; its
    /// chords and those of following lines belong to that section.
    fn sectioned(&self, doc: &Html) -> SongRecord {
        let mut lines = LineSplitter {
            builder: SectionBuilder::new(),
            text: String::new(),
            chords: Vec::new(),
        };
        self.walk(doc.root_element(), &mut lines);
        lines.finish_line();
        lines.builder.finish()
    }

    fn walk(&self, element: ElementRef, lines: &mut LineSplitter) {
        for child in element.children() {
            match child.value() {
                Node::Element(el) if el.attr(&self.attribute).is_some() => {
                    if let Some(chord) = ElementRef::wrap(child).and_then(Self::chord_text) {
                        lines.chords.push(chord);
                    }
                }
                Node::Element(el) if el.name() == "br" => lines.finish_line(),
                Node::Element(_) => {
                    if let Some(inner) = ElementRef::wrap(child) {
                        self.walk(inner, lines);
                    }
                }
                Node::Text(text) => {
                    let mut pieces = text.split('\n');
                    if let Some(first) = pieces.next() {
                        lines.text.push_str(first);
                    }
                    for piece in pieces {
                        lines.finish_line();
                        lines.text.push_str(piece);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Accumulates the current line of an attribute-marked chart.
struct LineSplitter {
    builder: SectionBuilder,
    text: String,
    chords: Vec<String>,
}

impl LineSplitter {
    fn finish_line(&mut self) {
        if let Some((label, _)) = split_header(&self.text) {
            self.builder.start(label);
        }
        for chord in self.chords.drain(..) {
            self.builder.push(chord);
        }
        self.text.clear();
    }
}

impl ChordExtractor for AttributeExtractor {
    fn extract(&self, fragment: &str) -> Result<SongRecord, ChordParseError> {
        let doc = Html::parse_fragment(fragment);
        let record = if self.sections {
            self.sectioned(&doc)
        } else {
            self.flat(&doc)
        };
        self.check_markers(&doc, &record)?;
        Ok(record)
    }
}

// ============================================================================
// TESTS
// ============================================================================
