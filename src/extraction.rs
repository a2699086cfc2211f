//! Per-page text extraction from source documents.

use std::path::Path;

use crate::error::{Error, Result};

/// Form feed, the page separator in plain-text exports.
const PAGE_BREAK: char = '\x0c';

/// Text of one document page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
}

/// Turns a document on disk into ordered pages of text.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Vec<Page>>;
}

/// Extracts PDF, plain text and markdown files, chosen by extension.
///
/// Plain text and markdown files are split into pages on form feed
/// characters; a file without form feeds is a single page.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileExtractor;

/// Extensions [`FileExtractor`] understands.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

pub fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn extraction_error(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::Extraction {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

impl DocumentExtractor for FileExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Page>> {
        match extension(path).as_deref() {
            Some("pdf") => extract_pdf(path),
            Some("txt" | "md") => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| extraction_error(path, e))?;
                Ok(split_pages(&content))
            }
            _ => Err(extraction_error(path, "unsupported file type")),
        }
    }
}

fn extract_pdf(path: &Path) -> Result<Vec<Page>> {
    let mut document = pdf_oxide::PdfDocument::open(path)
        .map_err(|e| extraction_error(path, e))?;
    let page_count = document
        .page_count()
        .map_err(|e| extraction_error(path, e))?;

    let mut pages = Vec::with_capacity(page_count);
    for index in 0..page_count {
        let text = document
            .extract_text(index)
            .map_err(|e| extraction_error(path, e))?;
        pages.push(Page {
            number: page_number(index),
            text,
        });
    }
    Ok(pages)
}

/// Split text on form feeds into numbered pages.
///
/// # Examples
///
/// ```
/// use lectern::extraction::split_pages;
///
/// let pages = split_pages("first\x0csecond");
/// assert_eq!(pages.len(), 2);
/// assert_eq!(pages[1].number, 2);
/// assert_eq!(pages[1].text, "second");
/// ```
pub fn split_pages(content: &str) -> Vec<Page> {
    content
        .split(PAGE_BREAK)
        .enumerate()
        .map(|(index, text)| Page {
            number: page_number(index),
            text: text.to_string(),
        })
        .collect()
}

fn page_number(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_file_is_one_page() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "Cells are the unit of life.").unwrap();

        let pages = FileExtractor.extract(&path).unwrap();
        assert_eq!(
            pages,
            [Page {
                number: 1,
                text: "Cells are the unit of life.".to_string()
            }]
        );
    }

    #[test]
    fn form_feeds_separate_pages() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("chapter.md");
        std::fs::write(&path, "# One\nalpha\x0c\x0c# Three\ngamma").unwrap();

        let pages = FileExtractor.extract(&path).unwrap();
        let numbers: Vec<_> = pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, [1, 2, 3]);
        assert!(pages[1].text.is_empty());
        assert!(pages[2].text.contains("gamma"));
    }

    #[test]
    fn unsupported_extension_is_an_extraction_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("slides.pptx");
        std::fs::write(&path, "x").unwrap();
        assert!(matches!(
            FileExtractor.extract(&path),
            Err(Error::Extraction { .. })
        ));
    }

    #[test]
    fn corrupt_pdf_is_an_extraction_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, "definitely not a pdf").unwrap();
        assert!(matches!(
            FileExtractor.extract(&path),
            Err(Error::Extraction { .. })
        ));
    }

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(is_supported(Path::new("Histology.PDF")));
        assert!(is_supported(Path::new("notes.md")));
        assert!(!is_supported(Path::new("image.png")));
        assert!(!is_supported(Path::new("README")));
    }
}
