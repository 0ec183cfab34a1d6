use crate::chunking::{make_chunk_id, normalize_whitespace, split_text};
use crate::error::IngestError;
use crate::extractor::{LopdfExtractor, PageText, PdfExtractor};
use crate::models::{ChunkingOptions, DocumentChunk, DocumentFingerprint, UploadedDocument};
use chrono::Utc;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub fingerprint: DocumentFingerprint,
    pub chunks: Vec<DocumentChunk>,
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Full document text plus the char offset where each page starts.
pub fn join_pages(pages: &[PageText]) -> (String, Vec<(u32, usize)>) {
    let mut text = String::new();
    let mut page_starts = Vec::with_capacity(pages.len());
    let mut offset = 0usize;

    for page in pages {
        let normalized = normalize_whitespace(&page.text);
        if normalized.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push('\n');
            offset += 1;
        }
        page_starts.push((page.number, offset));
        offset += normalized.chars().count();
        text.push_str(&normalized);
    }

    (text, page_starts)
}

fn page_at(page_starts: &[(u32, usize)], char_offset: usize) -> u32 {
    page_starts
        .iter()
        .take_while(|(_, start)| *start <= char_offset)
        .last()
        .map_or(1, |(number, _)| *number)
}

pub fn ingest_pdf(
    document: &UploadedDocument,
    options: ChunkingOptions,
) -> Result<IngestedDocument, IngestError> {
    ingest_with(&LopdfExtractor, document, options)
}

pub fn ingest_with<X: PdfExtractor>(
    extractor: &X,
    document: &UploadedDocument,
    options: ChunkingOptions,
) -> Result<IngestedDocument, IngestError> {
    options.validate()?;

    let extracted = extractor.extract(&document.bytes)?;
    let (text, page_starts) = join_pages(&extracted.pages);
    let spans = split_text(&text, options)?;

    if spans.is_empty() {
        return Err(IngestError::NoText(format!(
            "{} has only whitespace text",
            document.filename
        )));
    }

    let chunks = spans
        .into_iter()
        .enumerate()
        .map(|(index, span)| {
            let index = index as u64;
            DocumentChunk {
                chunk_id: make_chunk_id(&document.document_id, index),
                document_id: document.document_id.clone(),
                chunk_index: index,
                page_start: page_at(&page_starts, span.char_start),
                page_end: page_at(&page_starts, span.char_end.saturating_sub(1)),
                text: span.text,
                char_start: span.char_start,
                char_end: span.char_end,
            }
        })
        .collect();

    Ok(IngestedDocument {
        fingerprint: DocumentFingerprint {
            document_id: document.document_id.clone(),
            filename: document.filename.clone(),
            checksum: digest_bytes(&document.bytes),
            byte_len: document.bytes.len(),
            page_count: extracted.page_count,
            ingested_at: Utc::now(),
        },
        chunks,
    })
}
