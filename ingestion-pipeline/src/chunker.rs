//! Splits uploaded documents into bounded, page-aware text chunks.
//!
//! Chunking is deterministic: the same bytes and [`ChunkerConfig`] always
//! produce the same chunk sequence.

use std::path::Path;

use common::{error::AppError, types::DocumentChunk};
use lopdf::Document;
use text_splitter::{Characters, ChunkConfig, MarkdownSplitter, TextSplitter};
use tracing::warn;

/// Reported in place of an extension when the filename has none.
pub const MISSING_EXTENSION: &str = "(none)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Upper bound on characters per chunk.
    pub max_chars: usize,
    /// Characters shared between neighbouring chunks. Must be below `max_chars`.
    pub overlap_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    PlainText,
    Markdown,
    Pdf,
}

impl DocumentFormat {
    fn from_filename(filename: &str) -> Self {
        match extension_of(filename).as_deref() {
            Some(".pdf") => Self::Pdf,
            Some(".md" | ".markdown") => Self::Markdown,
            _ => Self::PlainText,
        }
    }
}

/// Lower-cased extension of `filename` including the leading dot, e.g. `".pdf"`.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self, AppError> {
        if config.max_chars == 0 {
            return Err(AppError::Validation(
                "max_chunk_chars must be greater than zero".into(),
            ));
        }
        if config.overlap_chars >= config.max_chars {
            return Err(AppError::Validation(format!(
                "chunk overlap of {} must be smaller than max_chunk_chars of {}",
                config.overlap_chars, config.max_chars
            )));
        }

        let chunker = Self { config };
        chunker.splitter_config()?;
        Ok(chunker)
    }

    /// Decodes `content` according to the extension of `filename` and splits it.
    ///
    /// Unknown extensions are decoded as UTF-8 text; allow-listing happens
    /// before the chunker is reached. Chunks are numbered sequentially across
    /// pages. Plain-text and markdown documents are a single page numbered 1.
    pub fn chunk(&self, filename: &str, content: &[u8]) -> Result<Vec<DocumentChunk>, AppError> {
        let format = DocumentFormat::from_filename(filename);
        let pages = decode_pages(format, content)?;

        if pages.iter().all(|(_, text)| text.trim().is_empty()) {
            return Err(AppError::Validation(
                "Document contains no readable text".into(),
            ));
        }

        let splitter = Splitter::new(format, self.splitter_config()?);
        let mut chunks = Vec::new();
        for (page, text) in &pages {
            for piece in splitter
                .split(text)
                .into_iter()
                .filter(|piece| !piece.trim().is_empty())
            {
                let index = chunks.len();
                chunks.push(DocumentChunk::new(piece.to_string(), filename, *page, index));
            }
        }

        if chunks.is_empty() {
            return Err(AppError::Validation(
                "Document contains no readable text".into(),
            ));
        }

        Ok(chunks)
    }

    fn splitter_config(&self) -> Result<ChunkConfig<Characters>, AppError> {
        ChunkConfig::new(self.config.max_chars)
            .with_overlap(self.config.overlap_chars)
            .map_err(|err| AppError::Validation(format!("invalid chunk overlap: {err}")))
    }
}

enum Splitter {
    Text(TextSplitter<Characters>),
    Markdown(MarkdownSplitter<Characters>),
}

impl Splitter {
    fn new(format: DocumentFormat, config: ChunkConfig<Characters>) -> Self {
        match format {
            DocumentFormat::Markdown => Self::Markdown(MarkdownSplitter::new(config)),
            DocumentFormat::PlainText | DocumentFormat::Pdf => Self::Text(TextSplitter::new(config)),
        }
    }

    fn split<'text>(&self, text: &'text str) -> Vec<&'text str> {
        match self {
            Self::Text(splitter) => splitter.chunks(text).collect(),
            Self::Markdown(splitter) => splitter.chunks(text).collect(),
        }
    }
}

fn decode_pages(format: DocumentFormat, content: &[u8]) -> Result<Vec<(u32, String)>, AppError> {
    match format {
        DocumentFormat::PlainText | DocumentFormat::Markdown => {
            let text = String::from_utf8_lossy(content);
            Ok(vec![(1, normalize_text(&text))])
        }
        DocumentFormat::Pdf => pdf_pages(content),
    }
}

/// Extracts text per page with lopdf, skipping pages it cannot decode.
///
/// When no page decodes at all, the whole document is retried with
/// `pdf-extract`, which understands more font encodings.
fn pdf_pages(content: &[u8]) -> Result<Vec<(u32, String)>, AppError> {
    let document = Document::load_mem(content)
        .map_err(|err| AppError::Validation(format!("Failed to read PDF: {err}")))?;

    let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    let (pages, unreadable) = readable_pages(
        page_numbers
            .into_iter()
            .map(|page| (page, document.extract_text(&[page]).map_err(|err| err.to_string()))),
    );

    if pages.is_empty() && unreadable > 0 {
        warn!(unreadable, "no PDF page decoded with lopdf, retrying with pdf-extract");
        return pdf_extract_pages(content);
    }
    Ok(pages)
}

/// Keeps the pages that decoded and counts the ones that did not.
fn readable_pages(
    extracted: impl IntoIterator<Item = (u32, Result<String, String>)>,
) -> (Vec<(u32, String)>, usize) {
    let mut unreadable = 0usize;
    let pages = extracted
        .into_iter()
        .filter_map(|(page, text)| match text {
            Ok(text) => Some((page, normalize_text(&text))),
            Err(err) => {
                warn!(page, error = %err, "skipping unreadable PDF page");
                unreadable = unreadable.saturating_add(1);
                None
            }
        })
        .collect();
    (pages, unreadable)
}

fn pdf_extract_pages(content: &[u8]) -> Result<Vec<(u32, String)>, AppError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(content)
        .map_err(|err| AppError::Validation(format!("Failed to extract text from PDF: {err}")))?;

    Ok((1u32..)
        .zip(pages)
        .map(|(page, text)| (page, normalize_text(&text)))
        .collect())
}

fn normalize_text(text: &str) -> String {
    text.trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}
