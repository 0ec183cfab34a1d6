use crate::error::IngestError;
use lopdf::Document;

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Text-bearing pages of a PDF plus its total page count, blank pages included.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPdf {
    pub page_count: u32,
    pub pages: Vec<PageText>,
}

pub trait PdfExtractor {
    /// Returns the text of every page that has any, in page order.
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedPdf, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedPdf, IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::EmptyUpload);
        }
        if !looks_like_pdf(bytes) {
            return Err(IngestError::NotPdf(
                "missing %PDF- header".to_string(),
            ));
        }

        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let page_count = document.get_pages().len();
        let mut pages = Vec::new();
        // get_pages is a BTreeMap keyed by page number, so this walks reading order.
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::NoText(format!(
                "none of {page_count} page(s) contain text; scanned documents are not supported"
            )));
        }

        Ok(ExtractedPdf {
            page_count: page_count as u32,
            pages,
        })
    }
}

pub fn extract_page_texts(bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
    Ok(LopdfExtractor.extract(bytes)?.pages)
}

fn looks_like_pdf(bytes: &[u8]) -> bool {
    // The header may follow a few bytes of junk; readers accept it within the first KiB.
    let window = &bytes[..bytes.len().min(1024)];
    window
        .windows(PDF_MAGIC.len())
        .any(|candidate| candidate == PDF_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::pdf_with_pages;

    #[test]
    fn pages_come_back_in_reading_order() {
        let bytes = pdf_with_pages(&["First page text", "Second page text"]);
        let pages = extract_page_texts(&bytes).expect("fixture pdf should parse");

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("First page text"));
        assert_eq!(pages[1].number, 2);
        assert!(pages[1].text.contains("Second page text"));
    }

    #[test]
    fn blank_pages_are_skipped() {
        let bytes = pdf_with_pages(&["", "Only this page has words"]);
        let pages = extract_page_texts(&bytes).expect("fixture pdf should parse");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 2);
    }

    #[test]
    fn page_count_includes_blank_pages() {
        let bytes = pdf_with_pages(&["", "Middle page", ""]);
        let extracted = LopdfExtractor.extract(&bytes).expect("fixture pdf should parse");

        assert_eq!(extracted.page_count, 3);
        assert_eq!(extracted.pages.len(), 1);
        assert_eq!(extracted.pages[0].number, 2);
    }

    #[test]
    fn pdf_without_text_is_rejected() {
        let bytes = pdf_with_pages(&["", ""]);
        let error = extract_page_texts(&bytes).unwrap_err();
        assert!(matches!(error, IngestError::NoText(_)));
    }

    #[test]
    fn non_pdf_bytes_are_rejected() {
        let error = extract_page_texts(b"just some notes").unwrap_err();
        assert!(matches!(error, IngestError::NotPdf(_)));
    }

    #[test]
    fn empty_upload_is_rejected() {
        let error = extract_page_texts(&[]).unwrap_err();
        assert!(matches!(error, IngestError::EmptyUpload));
    }

    #[test]
    fn truncated_pdf_is_a_parse_error() {
        let error = extract_page_texts(b"%PDF-1.4\n%broken").unwrap_err();
        assert!(matches!(error, IngestError::PdfParse(_)));
    }
}
