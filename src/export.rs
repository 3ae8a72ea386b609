//! Export of the rewritten article to downloadable documents

use crate::error::ExportError;
use crate::types::{Article, Catalog};
use serde::Serialize;
use std::io::{Cursor, Write};
use std::path::Path;
use std::str::FromStr;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    PlainText,
    Docx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::PlainText => "txt",
            ExportFormat::Docx => "docx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::PlainText => "text/plain; charset=utf-8",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "txt" | "text" | "plain" => Ok(ExportFormat::PlainText),
            "docx" | "word" => Ok(ExportFormat::Docx),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// A rendered document ready for download
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Heading plus non-blank paragraphs, for every non-empty section in order
fn blocks<'a>(article: &'a Article, catalog: &'a Catalog) -> Vec<(&'a str, Vec<&'a str>)> {
    catalog
        .iter()
        .filter_map(|section| {
            let text = article.get(section.key);
            let paragraphs: Vec<&str> = text
                .lines()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            (!paragraphs.is_empty()).then(|| (section.title.as_str(), paragraphs))
        })
        .collect()
}

/// `{stem}_improved.{ext}` of the first uploaded file
pub fn export_file_name(file_names: &[String], format: ExportFormat) -> String {
    let stem = file_names
        .first()
        .and_then(|name| Path::new(name).file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "article".to_string());
    format!("{}_improved.{}", stem, format.extension())
}

pub fn render_markdown(article: &Article, catalog: &Catalog) -> String {
    let mut out = String::new();
    for (title, paragraphs) in blocks(article, catalog) {
        out.push_str(&format!("## {}\n\n", title));
        for p in paragraphs {
            out.push_str(p);
            out.push_str("\n\n");
        }
    }
    out
}

pub fn render_plain_text(article: &Article, catalog: &Catalog) -> String {
    let mut out = String::new();
    for (title, paragraphs) in blocks(article, catalog) {
        out.push_str(&title.to_uppercase());
        out.push_str("\n\n");
        for p in paragraphs {
            out.push_str(p);
            out.push_str("\n\n");
        }
    }
    out
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

fn docx_body(article: &Article, catalog: &Catalog) -> String {
    let mut body = String::new();
    for (title, paragraphs) in blocks(article, catalog) {
        // Headings are bold 16pt runs; no styles part is shipped
        body.push_str(&format!(
            "<w:p><w:r><w:rPr><w:b/><w:sz w:val=\"32\"/></w:rPr><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
            xml_escape(title)
        ));
        for p in paragraphs {
            body.push_str(&format!(
                "<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
                xml_escape(p)
            ));
        }
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    )
}

pub fn render_docx(article: &Article, catalog: &Catalog) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(RELS_XML.as_bytes())?;
    zip.start_file("word/document.xml", options)?;
    zip.write_all(docx_body(article, catalog).as_bytes())?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

pub fn export_article(
    article: &Article,
    catalog: &Catalog,
    format: ExportFormat,
    file_names: &[String],
) -> Result<ExportedDocument, ExportError> {
    let bytes = match format {
        ExportFormat::Markdown => render_markdown(article, catalog).into_bytes(),
        ExportFormat::PlainText => render_plain_text(article, catalog).into_bytes(),
        ExportFormat::Docx => render_docx(article, catalog)?,
    };
    Ok(ExportedDocument {
        file_name: export_file_name(file_names, format),
        content_type: format.content_type(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SectionKey;
    use std::io::Read;

    fn article() -> Article {
        let mut article = Article::default();
        article.set(SectionKey::Problem, "First line.\n\n  Second line.  ");
        article.set(SectionKey::Methodology, "Surveys & <interviews>.");
        article.set(SectionKey::Results, "   \n ");
        article
    }

    #[test]
    fn test_markdown_skips_empty_sections() {
        let md = render_markdown(&article(), &Catalog::academic());
        assert_eq!(
            md,
            "## 1. Problem Statement\n\nFirst line.\n\nSecond line.\n\n## 5. Methodology\n\nSurveys & <interviews>.\n\n"
        );
        assert!(!md.contains("Expected Results"));
    }

    #[test]
    fn test_docx_contains_escaped_paragraphs() {
        let bytes = render_docx(&article(), &Catalog::academic()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        assert!(xml.contains("Surveys &amp; &lt;interviews&gt;."));
        assert!(xml.contains("1. Problem Statement"));
        assert!(!xml.contains("Expected Results"));
        assert!(archive.by_name("[Content_Types].xml").is_ok());
    }

    #[test]
    fn test_export_file_name() {
        let names = vec!["thesis.draft.txt".to_string()];
        assert_eq!(export_file_name(&names, ExportFormat::Docx), "thesis.draft_improved.docx");
        assert_eq!(export_file_name(&[], ExportFormat::Markdown), "article_improved.md");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("DOCX".parse::<ExportFormat>().unwrap(), ExportFormat::Docx);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }
}
