//! Document discovery and text extraction

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// File extensions picked up from the documents directory.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

static HORIZONTAL_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\u{00A0}\u{000C}]+").expect("valid regex"));
static SPACE_AROUND_NEWLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" ?\n ?").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// A source legal text with its extracted content.
#[derive(Debug, Clone)]
pub struct Document {
    /// File name, used as the document name in citations
    pub name: String,
    pub path: PathBuf,
    pub text: String,
}

impl Document {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            name,
            text: text.into(),
        }
    }
}

/// List supported files directly inside `dir`, sorted by name.
///
/// A missing directory is created and yields no files.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        info!("Created documents directory {}", dir.display());
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported(path))
        .collect();

    files.sort();
    debug!("Found {} documents in {}", files.len(), dir.display());
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Name a document by its file name.
pub fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a document and extract normalized text.
pub async fn load(path: &Path) -> Result<Document> {
    let shown = path.display().to_string();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::document_read(&shown, e.to_string()))?;

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    let raw = if is_pdf {
        // pdf-extract can panic on malformed files; the join error catches it
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| Error::document_read(&shown, format!("PDF extraction aborted: {}", e)))?
            .map_err(|e| Error::document_read(&shown, format!("PDF extraction error: {}", e)))?
    } else {
        String::from_utf8(bytes)
            .map_err(|e| Error::document_read(&shown, format!("not valid UTF-8: {}", e)))?
    };

    let text = normalize_text(&raw);
    if text.is_empty() {
        return Err(Error::document_read(
            &shown,
            "no extractable text (image-based or encrypted PDF?)",
        ));
    }

    debug!("Extracted {} characters from {}", text.chars().count(), shown);

    Ok(Document {
        name: document_name(path),
        path: path.to_path_buf(),
        text,
    })
}

/// Collapse extraction noise while keeping paragraph breaks.
pub fn normalize_text(raw: &str) -> String {
    let text = raw.replace('\r', "");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = SPACE_AROUND_NEWLINE.replace_all(&text, "\n");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn normalize_collapses_whitespace() {
        let raw = "Article 1\r\n\n\n\n  Sovereignty   of\tthe people \n\nArticle 2 ";
        assert_eq!(
            normalize_text(raw),
            "Article 1\n\nSovereignty of the people\n\nArticle 2"
        );
    }

    #[test]
    fn normalize_empty_text() {
        assert_eq!(normalize_text(" \n\t \r\n"), "");
    }

    #[test]
    fn discover_filters_and_sorts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b_criminal_code.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("a_constitution.TXT"), b"text").unwrap();
        std::fs::write(dir.path().join("notes.docx"), b"skip").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("inner.pdf"), b"%PDF").unwrap();

        let files = discover(dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|p| document_name(p)).collect();

        assert_eq!(names, vec!["a_constitution.TXT", "b_criminal_code.pdf"]);
    }

    #[test]
    fn discover_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let docs = dir.path().join("docs");

        let files = discover(&docs).unwrap();
        assert!(files.is_empty());
        assert!(docs.is_dir());
    }

    #[tokio::test]
    async fn load_plain_text_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Criminal Code.txt");
        std::fs::write(&path, "Theft is punishable   by imprisonment.\r\n").unwrap();

        let doc = load(&path).await.unwrap();
        assert_eq!(doc.name, "Criminal Code.txt");
        assert_eq!(doc.text, "Theft is punishable by imprisonment.");
    }

    #[tokio::test]
    async fn load_missing_file_is_document_read_error() {
        let err = load(Path::new("/nonexistent/constitution.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DocumentReadError { .. }));
    }

    #[tokio::test]
    async fn load_corrupt_pdf_is_document_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf at all").unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, Error::DocumentReadError { .. }));
        assert!(err.to_string().contains("broken.pdf"));
    }

    #[tokio::test]
    async fn load_blank_document_is_document_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blank.md");
        std::fs::write(&path, "   \n\n  ").unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(err.to_string().contains("no extractable text"));
    }
}
