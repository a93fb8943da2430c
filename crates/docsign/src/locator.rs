//! Finds where a stage's approver signs.
//!
//! Only the first page is searched. Among the text blocks containing any of
//! the stage keywords as a whole word (case-insensitive), the one lowest on
//! the page wins; signature lines sit below the form body, so the lowest
//! mention is the label next to the signing space.

use lopdf::Document;
use regex::Regex;
use serde::Serialize;

use crate::error::PdfError;
use crate::pdf::{self, TextBlock};

/// Top-left corner of the matched text block.
///
/// `x` is in PDF user space; `y` is measured downward from the top of the
/// page's MediaBox, so larger values are lower on the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anchor {
    pub page: usize,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct KeywordSet {
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl KeywordSet {
    /// Blank keywords are ignored. Internal whitespace in a keyword matches
    /// any run of whitespace in the text.
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self, PdfError> {
        let mut kept = Vec::new();
        let mut patterns = Vec::new();

        for keyword in keywords {
            let words: Vec<&str> = keyword.as_ref().split_whitespace().collect();
            if words.is_empty() {
                continue;
            }
            let body = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join(r"\s+");
            let pattern = format!(r"(?i)\b{}\b", body);
            let regex = Regex::new(&pattern).map_err(|e| PdfError::InvalidKeyword {
                keyword: keyword.as_ref().to_string(),
                reason: e.to_string(),
            })?;
            kept.push(words.join(" "));
            patterns.push(regex);
        }

        Ok(Self {
            keywords: kept,
            patterns,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Locates the signing anchor in a serialized PDF.
///
/// `Ok(None)` means the document parsed but no keyword matched; callers
/// must treat that as a failure and never sign at a default position.
pub fn locate<S: AsRef<str>>(pdf_bytes: &[u8], keywords: &[S]) -> Result<Option<Anchor>, PdfError> {
    let keywords = KeywordSet::new(keywords)?;
    let doc = pdf::load(pdf_bytes)?;
    locate_in_document(&doc, &keywords)
}

pub fn locate_in_document(doc: &Document, keywords: &KeywordSet) -> Result<Option<Anchor>, PdfError> {
    let _span = tracing::debug_span!("locator.first_page").entered();

    if keywords.is_empty() {
        return Ok(None);
    }

    let page_id = pdf::page_id(doc, 0)?;
    let page = pdf::extract_page_text(doc, page_id)?;
    tracing::debug!(blocks = page.blocks.len(), "extracted first page text");

    Ok(select_anchor(&page.blocks, keywords).map(|block| Anchor {
        page: 0,
        x: block.x0,
        y: block.y0,
    }))
}

/// The lowest matching block; among blocks at the same height the one that
/// appears first in reading order is kept.
pub fn select_anchor<'a>(blocks: &'a [TextBlock], keywords: &KeywordSet) -> Option<&'a TextBlock> {
    let mut best: Option<&TextBlock> = None;
    for block in blocks.iter().filter(|b| keywords.matches(&b.text)) {
        if best.map_or(true, |current| block.y0 > current.y0) {
            best = Some(block);
        }
    }
    best
}
