//! Document ingestion: read uploaded files and extract per-section originals

use crate::calls::{self, SectionExtraction};
use crate::error::IngestionError;
use crate::oracle::TextOracle;
use crate::types::{Catalog, SectionKey};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where an uploaded file's bytes come from. `Path` is for in-process
/// callers only; the HTTP surface accepts inline content.
#[derive(Debug, Clone)]
pub enum SourceLocation {
    Path(PathBuf),
    Content(String),
}

/// One uploaded file
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub location: SourceLocation,
}

impl SourceFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            mime_type: None,
            location: SourceLocation::Path(path),
        }
    }

    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: Some("text/plain".to_string()),
            location: SourceLocation::Content(content.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Markdown,
    Unsupported,
}

/// Dispatch on declared type first, file extension second
pub fn classify(file: &SourceFile) -> DocumentKind {
    if let Some(mime) = file.mime_type.as_deref() {
        let mime = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match mime.as_str() {
            "text/plain" => return DocumentKind::PlainText,
            "text/markdown" | "text/x-markdown" => return DocumentKind::Markdown,
            "" | "application/octet-stream" => {}
            _ => return DocumentKind::Unsupported,
        }
    }

    let ext = Path::new(&file.name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") | Some("text") => DocumentKind::PlainText,
        Some("md") | Some("markdown") => DocumentKind::Markdown,
        _ => DocumentKind::Unsupported,
    }
}

/// Plain text of one file. Unsupported types yield empty text.
pub async fn extract_text(file: &SourceFile) -> Result<String, IngestionError> {
    if classify(file) == DocumentKind::Unsupported {
        debug!("Skipping unsupported file type: {}", file.name);
        return Ok(String::new());
    }

    match &file.location {
        SourceLocation::Content(text) => Ok(text.clone()),
        SourceLocation::Path(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|source| IngestionError::Read {
                name: file.name.clone(),
                source,
            }),
    }
}

/// Read a batch concurrently; any single failure fails the batch
pub async fn read_batch(files: &[SourceFile]) -> Result<Vec<(String, String)>, IngestionError> {
    if files.is_empty() {
        return Err(IngestionError::NoFiles);
    }

    let reads = files.iter().map(|file| async move {
        let text = extract_text(file).await?;
        Ok::<_, IngestionError>((file.name.clone(), text))
    });

    let docs = futures::future::try_join_all(reads).await?;
    info!(
        "Read {} file(s), {} chars total",
        docs.len(),
        docs.iter().map(|(_, t)| t.len()).sum::<usize>()
    );
    Ok(docs)
}

/// Append newly read documents to the combined source text
pub fn merge_sources(existing: &str, docs: &[(String, String)]) -> String {
    let mut combined = existing.to_string();
    for (name, text) in docs {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if !combined.is_empty() {
            combined.push_str("\n\n");
        }
        combined.push_str(&format!("--- {} ---\n{}", name, text));
    }
    combined
}

/// Extract every authored section in catalog order, one oracle call each
pub async fn extract_sections(
    oracle: &dyn TextOracle,
    catalog: &Catalog,
    combined: &str,
) -> Vec<(SectionKey, SectionExtraction)> {
    let mut out = Vec::new();
    if combined.trim().is_empty() {
        debug!("Combined source is empty; skipping extraction");
        return out;
    }
    for section in catalog.authored() {
        let extraction = calls::extract_section(oracle, &section.title, combined).await;
        out.push((section.key, extraction));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_classify_by_mime_then_extension() {
        let mut file = SourceFile::inline("notes.md", "x");
        assert_eq!(classify(&file), DocumentKind::PlainText);

        file.mime_type = None;
        assert_eq!(classify(&file), DocumentKind::Markdown);

        file.mime_type = Some("application/pdf".to_string());
        assert_eq!(classify(&file), DocumentKind::Unsupported);

        let docx = SourceFile::from_path("/tmp/thesis.docx");
        assert_eq!(classify(&docx), DocumentKind::Unsupported);
    }

    #[tokio::test]
    async fn test_unsupported_yields_empty_text() {
        let file = SourceFile::from_path("/nonexistent/thesis.pdf");
        assert_eq!(extract_text(&file).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_batch_fails_when_one_read_fails() {
        let mut good = tempfile::NamedTempFile::new().unwrap();
        write!(good, "hello").unwrap();
        let mut ok = SourceFile::from_path(good.path());
        ok.mime_type = Some("text/plain".to_string());

        let missing = SourceFile::from_path("/nonexistent/missing.txt");

        let err = read_batch(&[ok, missing]).await.unwrap_err();
        assert!(matches!(err, IngestionError::Read { ref name, .. } if name == "missing.txt"));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        assert!(matches!(read_batch(&[]).await, Err(IngestionError::NoFiles)));
    }

    #[test]
    fn test_merge_sources_skips_empty() {
        let docs = vec![
            ("a.txt".to_string(), "Alpha".to_string()),
            ("b.pdf".to_string(), String::new()),
        ];
        let merged = merge_sources("", &docs);
        assert_eq!(merged, "--- a.txt ---\nAlpha");

        let again = merge_sources(&merged, &[("c.txt".to_string(), "Gamma".to_string())]);
        assert_eq!(again, "--- a.txt ---\nAlpha\n\n--- c.txt ---\nGamma");
    }
}
