// Text Processing Service
// Transcript normalization, sentence segmentation and fixed-size chunking

use crate::models::{TextUnit, UnitKind};
use crate::services::analysis::AnalysisError;
use regex::Regex;
use std::sync::OnceLock;

fn sentence_boundary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("valid sentence boundary regex"))
}

/// Normalize transcript text before segmentation.
pub fn normalize_transcript(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut s = text
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{00A0}', '\u{3000}'], " ");

    // Normalize line endings
    s = s.replace("\r\n", "\n").replace('\r', "\n");

    let ws_re = Regex::new(r"[ \t\x0C\x0B]+").expect("valid whitespace regex");
    s = ws_re.replace_all(&s, " ").to_string();

    s.lines()
        .map(|ln| ln.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Split text after `.`, `!` or `?` followed by whitespace.
///
/// The punctuation stays with the preceding sentence. Abbreviations
/// ("Dr. Smith"), decimals followed by a space and quoted punctuation are
/// not special-cased and will split.
pub fn split_sentences(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![];
    }

    let mut sentences = Vec::new();
    let mut cursor = 0;
    for m in sentence_boundary_re().find_iter(text) {
        // terminal punctuation is a single ASCII byte
        let end = m.start() + 1;
        push_trimmed(&mut sentences, &text[cursor..end]);
        cursor = m.end();
    }
    push_trimmed(&mut sentences, &text[cursor..]);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Partition `text` into windows of at most `chunk_size` characters.
pub fn chunk_text(text: &str, chunk_size: usize) -> Result<Vec<&str>, AnalysisError> {
    if chunk_size == 0 {
        return Err(AnalysisError::InvalidConfiguration(
            "chunk size must be positive".to_string(),
        ));
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == chunk_size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    Ok(chunks)
}

/// Sentence units for a document.
pub fn sentence_units(source: &str, text: &str) -> Vec<TextUnit> {
    split_sentences(text)
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextUnit {
            index,
            source: source.to_string(),
            kind: UnitKind::Sentence,
            text,
        })
        .collect()
}

/// Chunk units for a document. Whitespace-only chunks are kept so that
/// unit indices always match chunk positions.
pub fn chunk_units(source: &str, text: &str, chunk_size: usize) -> Result<Vec<TextUnit>, AnalysisError> {
    Ok(chunk_text(text, chunk_size)?
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| TextUnit {
            index,
            source: source.to_string(),
            kind: UnitKind::Chunk,
            text: chunk.to_string(),
        })
        .collect())
}

/// Truncate to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
