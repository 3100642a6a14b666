//! PDF text extraction.
//!
//! Turns uploaded PDF bytes into plain UTF-8 text. Page texts are joined
//! without separators, first in upload order and then in page order, so the
//! output is exactly the concatenation the chunker expects.

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::UploadedFile;

/// Extracts the text of every page of a PDF, in page order.
///
/// The line breaks `pdf_extract` emits before the first glyph of each page
/// are removed.
pub fn extract_pdf_pages(name: &str, bytes: &[u8]) -> Result<Vec<String>> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| Error::Extract {
        file: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(pages
        .into_iter()
        .map(|page| page.trim_start_matches(['\n', '\r']).to_string())
        .collect())
}

/// Concatenates the text of all uploaded PDFs.
///
/// Zero files produce an empty string. The first file that fails to parse
/// aborts the whole extraction; no partial text is returned.
pub fn extract_documents(files: &[UploadedFile]) -> Result<String> {
    let mut text = String::new();
    for file in files {
        let pages = extract_pdf_pages(&file.name, &file.bytes)?;
        debug!(file = %file.name, pages = pages.len(), "extracted pdf");
        for page in pages {
            text.push_str(&page);
        }
    }
    Ok(text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal single-page PDF showing `phrase` in Helvetica.
    pub(crate) fn pdf_with_text(phrase: &str) -> Vec<u8> {
        let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let o1 = out.len();
        out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        let o2 = out.len();
        out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
        let o3 = out.len();
        out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
        let o4 = out.len();
        out.extend_from_slice(
            format!(
                "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                stream.len(),
                stream
            )
            .as_bytes(),
        );
        let o5 = out.len();
        out.extend_from_slice(
            b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
        );
        let xref_start = out.len();
        out.extend_from_slice(b"xref\n0 6\n");
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for offset in [o1, o2, o3, o4, o5] {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
        out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    #[test]
    fn no_files_yield_empty_text() {
        assert_eq!(extract_documents(&[]).unwrap(), "");
    }

    #[test]
    fn invalid_pdf_names_the_file() {
        let files = vec![UploadedFile::new("notes.pdf", b"not a pdf".to_vec())];
        let err = extract_documents(&files).unwrap_err();
        match err {
            Error::Extract { file, .. } => assert_eq!(file, "notes.pdf"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_file_aborts_whole_extraction() {
        let files = vec![
            UploadedFile::new("good.pdf", pdf_with_text("Hello world")),
            UploadedFile::new("bad.pdf", b"garbage".to_vec()),
        ];
        assert!(extract_documents(&files).is_err());
    }

    #[test]
    fn single_page_text_is_extracted() {
        let files = vec![UploadedFile::new("hello.pdf", pdf_with_text("Hello world"))];
        let text = extract_documents(&files).unwrap();
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn files_concatenate_in_upload_order() {
        let first = pdf_with_text("alpha phrase");
        let second = pdf_with_text("omega phrase");
        let files = vec![
            UploadedFile::new("a.pdf", first),
            UploadedFile::new("b.pdf", second),
        ];
        let text = extract_documents(&files).unwrap();
        assert_eq!(text, "alpha phraseomega phrase");
    }
}
