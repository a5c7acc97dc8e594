//! Word-level diff between document text and OCR text
//!
//! Both sides are normalized first (whitespace removed, one trailing
//! sentence period dropped). The diff runs from the OCR text to the document
//! text, so `Added` marks document text OCR did not find and `Removed` marks
//! text that only OCR produced.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use shared_types::Verification;
use similar::{capture_diff_slices, Algorithm, DiffOp};

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref TRAILING_PERIOD: Regex = Regex::new(r"[。.]$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Equal,
    /// In the document only
    Added,
    /// In the OCR text only
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffToken {
    pub text: String,
    pub kind: DiffKind,
}

impl DiffToken {
    fn new(text: impl Into<String>, kind: DiffKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Strip all whitespace and one trailing `。` or `.`
pub fn normalize(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text, "");
    TRAILING_PERIOD.replace(&collapsed, "").into_owned()
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == '_'
        // Latin-1 supplement and Latin extended letters, minus × and ÷
        || matches!(c, '\u{C0}'..='\u{FF}' if c != '\u{D7}' && c != '\u{F7}')
        || matches!(c, '\u{100}'..='\u{24F}' | '\u{1E00}'..='\u{1EFF}')
}

fn is_standalone(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '\'' | '"')
}

#[derive(Clone, Copy, PartialEq)]
enum Class {
    Word,
    Other,
    Space,
}

fn class_of(c: char) -> Class {
    if is_word_char(c) {
        Class::Word
    } else if c.is_whitespace() {
        Class::Space
    } else {
        Class::Other
    }
}

/// Split into runs of word characters, runs of whitespace and runs of other
/// characters. Brackets and quotes are always tokens of their own.
pub fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut current: Option<Class> = None;

    for (i, c) in text.char_indices() {
        if is_standalone(c) {
            if i > start {
                tokens.push(&text[start..i]);
            }
            let end = i + c.len_utf8();
            tokens.push(&text[i..end]);
            start = end;
            current = None;
            continue;
        }

        let class = class_of(c);
        if current.is_some_and(|prev| prev != class) {
            tokens.push(&text[start..i]);
            start = i;
        }
        current = Some(class);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

/// Diff normalized `document` against normalized `ocr`
pub fn compute_diff(document: &str, ocr: &str) -> Vec<DiffToken> {
    let document = normalize(document);
    let ocr = normalize(ocr);
    diff_tokens(&tokenize(&ocr), &tokenize(&document))
}

/// Myers diff from `old` to `new`, grouping each change point as removals
/// followed by additions
fn diff_tokens(old: &[&str], new: &[&str]) -> Vec<DiffToken> {
    let mut out: Vec<DiffToken> = Vec::new();
    let mut removed = String::new();
    let mut added = String::new();

    for op in capture_diff_slices(Algorithm::Myers, old, new) {
        match op {
            DiffOp::Equal { old_index, len, .. } => {
                flush(&mut out, &mut removed, &mut added);
                push(&mut out, old[old_index..old_index + len].concat(), DiffKind::Equal);
            }
            DiffOp::Delete {
                old_index, old_len, ..
            } => removed.push_str(&old[old_index..old_index + old_len].concat()),
            DiffOp::Insert {
                new_index, new_len, ..
            } => added.push_str(&new[new_index..new_index + new_len].concat()),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                removed.push_str(&old[old_index..old_index + old_len].concat());
                added.push_str(&new[new_index..new_index + new_len].concat());
            }
        }
    }
    flush(&mut out, &mut removed, &mut added);
    out
}

fn flush(out: &mut Vec<DiffToken>, removed: &mut String, added: &mut String) {
    push(out, std::mem::take(removed), DiffKind::Removed);
    push(out, std::mem::take(added), DiffKind::Added);
}

/// Append, merging with the previous token of the same kind
fn push(out: &mut Vec<DiffToken>, text: String, kind: DiffKind) {
    if text.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(last) if last.kind == kind => last.text.push_str(&text),
        _ => out.push(DiffToken::new(text, kind)),
    }
}

/// One labelled field of a completed verification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldComparison {
    pub field: String,
    pub document: String,
    pub ocr: String,
    pub tokens: Vec<DiffToken>,
}

impl FieldComparison {
    pub fn has_differences(&self) -> bool {
        self.tokens.iter().any(|t| t.kind != DiffKind::Equal)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Comparisons {
    pub invalid_titles: Vec<String>,
    /// Sorted by field name
    pub fields: Vec<FieldComparison>,
}

/// Diff rows for every field the backend compared
pub fn comparisons(verification: &Verification) -> Comparisons {
    let Some(result) = verification.compare_result() else {
        return Comparisons::default();
    };

    let fields = result
        .differences
        .iter()
        .map(|(field, diff)| {
            let document = diff.docx.clone().unwrap_or_default();
            let ocr = diff.ocr.clone().unwrap_or_default();
            FieldComparison {
                field: field.clone(),
                tokens: compute_diff(&document, &ocr),
                document,
                ocr,
            }
        })
        .collect();

    Comparisons {
        invalid_titles: result.invalid_titles.clone(),
        fields,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: equal and removed tokens rebuild the OCR side, equal and
        /// added tokens rebuild the document side
        #[test]
        fn diff_reconstructs_inputs(doc in "[a-c1-2 。.()台北]{0,24}", ocr in "[a-c1-2 。.()台北]{0,24}") {
            let tokens = compute_diff(&doc, &ocr);
            let rebuilt_doc: String = tokens
                .iter()
                .filter(|t| t.kind != DiffKind::Removed)
                .map(|t| t.text.as_str())
                .collect();
            let rebuilt_ocr: String = tokens
                .iter()
                .filter(|t| t.kind != DiffKind::Added)
                .map(|t| t.text.as_str())
                .collect();
            prop_assert_eq!(rebuilt_doc, normalize(&doc));
            prop_assert_eq!(rebuilt_ocr, normalize(&ocr));
        }

        /// Property: a text compared with itself has no changes
        #[test]
        fn identical_inputs_are_equal(text in "\\PC{0,40}") {
            let tokens = compute_diff(&text, &text);
            prop_assert!(tokens.iter().all(|t| t.kind == DiffKind::Equal));
        }

        /// Property: adjacent tokens never share a kind
        #[test]
        fn tokens_are_merged(doc in "[ab台 ]{0,16}", ocr in "[ab台 ]{0,16}") {
            let tokens = compute_diff(&doc, &ocr);
            for pair in tokens.windows(2) {
                prop_assert_ne!(pair[0].kind, pair[1].kind);
            }
        }
    }
}
