use crate::error::ExtractionError;
use lopdf::Document;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
        let document =
            Document::load_mem(bytes).map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

/// Joins page texts in page order, one newline between pages.
///
/// A structurally valid PDF whose pages carry no text comes back as
/// [`ExtractionError::NoExtractableText`] so callers can report it apart
/// from unreadable input.
pub fn extract_document_text(
    extractor: &dyn PdfExtractor,
    bytes: &[u8],
) -> Result<String, ExtractionError> {
    let mut pages = extractor.extract_pages(bytes)?;
    pages.sort_by_key(|page| page.number);

    let text = pages
        .iter()
        .map(|page| page.text.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    if text.trim().is_empty() {
        return Err(ExtractionError::NoExtractableText);
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blank_pdf, text_pdf};

    struct FixedPages(Vec<PageText>);

    impl PdfExtractor for FixedPages {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn pages_are_joined_in_page_order() {
        let extractor = FixedPages(vec![
            PageText {
                number: 2,
                text: "second".to_string(),
            },
            PageText {
                number: 1,
                text: "first\n".to_string(),
            },
        ]);

        let text = extract_document_text(&extractor, b"").expect("text should be joined");
        assert_eq!(text, "first\nsecond");
    }

    #[test]
    fn whitespace_only_pages_mean_no_text() {
        let extractor = FixedPages(vec![PageText {
            number: 1,
            text: "  \n\t".to_string(),
        }]);

        let result = extract_document_text(&extractor, b"");
        assert!(matches!(result, Err(ExtractionError::NoExtractableText)));
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let result = extract_document_text(&LopdfExtractor, b"%PDF-1.4\n%broken");
        assert!(matches!(result, Err(ExtractionError::PdfParse(_))));
    }

    #[test]
    fn lopdf_reads_every_page() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = text_pdf(&["Alpha page.", "Beta page.", "Gamma page."])?;
        let text = extract_document_text(&LopdfExtractor, &bytes)?;

        let alpha = text.find("Alpha").ok_or("missing page 1")?;
        let beta = text.find("Beta").ok_or("missing page 2")?;
        let gamma = text.find("Gamma").ok_or("missing page 3")?;
        assert!(alpha < beta && beta < gamma);
        Ok(())
    }

    #[test]
    fn pdf_without_text_layer_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = blank_pdf(2)?;
        let result = extract_document_text(&LopdfExtractor, &bytes);
        assert!(matches!(result, Err(ExtractionError::NoExtractableText)));
        Ok(())
    }
}
