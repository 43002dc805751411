//! Word (`.docx`) templates with `{tag}` placeholders.
//!
//! Supported tags: `{name}` substitutes a value, `{#name}`...`{/name}`
//! repeats or conditionally includes its content, `{^name}`...`{/name}` is
//! the inverted form and `{.}` is the current loop item. Names may be dotted
//! paths into nested objects.

mod archive;
mod merge;

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

pub use archive::DocxPackage;
pub use merge::merge_part;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid docx archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("template has no {0} part")]
    MissingPart(String),

    #[error("malformed template xml: {0}")]
    Xml(String),

    #[error("unclosed tag {0:?}")]
    UnclosedTag(String),

    #[error("empty tag {0:?}")]
    EmptyTag(String),

    #[error("closing tag {{/{0}}} has no matching opening tag")]
    UnopenedSection(String),

    #[error("section {{#{0}}} is never closed")]
    UnclosedSection(String),

    #[error("section {{#{expected}}} closed by {{/{found}}}")]
    MismatchedSection { expected: String, found: String },

    #[error("section {0:?} overlaps another section")]
    OverlappingSections(String),

    #[error("section {{#{0}}} opens and closes at different table levels")]
    UnbalancedSection(String),

    #[error("{part}: {source}")]
    InPart {
        part: String,
        #[source]
        source: Box<TemplateError>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Drop paragraphs (or table rows) that hold nothing but a section tag
    /// instead of repeating them with the section
    pub paragraph_loop: bool,
    /// Render `\n` in values as line breaks
    pub linebreaks: bool,
}

const MAIN_PART: &str = "word/document.xml";

/// Parts that may carry tags besides the main document.
fn is_mergeable(name: &str) -> bool {
    let Some(file) = name.strip_prefix("word/") else {
        return false;
    };
    if file.contains('/') || !file.ends_with(".xml") {
        return false;
    }
    file == "document.xml"
        || file.starts_with("header")
        || file.starts_with("footer")
        || file == "footnotes.xml"
        || file == "endnotes.xml"
}

/// A loaded template package, ready to be rendered any number of times.
#[derive(Debug)]
pub struct DocxTemplate {
    package: DocxPackage,
}

impl DocxTemplate {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        Self::from_package(DocxPackage::open(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TemplateError> {
        Self::from_package(DocxPackage::from_bytes(bytes)?)
    }

    fn from_package(package: DocxPackage) -> Result<Self, TemplateError> {
        if package.get(MAIN_PART).is_none() {
            return Err(TemplateError::MissingPart(MAIN_PART.to_string()));
        }
        Ok(Self { package })
    }

    /// Merge `data` into every tagged part and return the new `.docx` bytes.
    pub fn render(&self, data: &Value, options: &MergeOptions) -> Result<Vec<u8>, TemplateError> {
        let mut output = DocxPackage::new();

        for (name, contents) in self.package.entries() {
            if !is_mergeable(name) {
                output.set(name, contents.to_vec());
                continue;
            }

            let in_part = |source: TemplateError| TemplateError::InPart {
                part: name.to_string(),
                source: Box::new(source),
            };
            let xml = std::str::from_utf8(contents)
                .map_err(|e| in_part(TemplateError::Xml(e.to_string())))?;
            let merged = merge_part(xml, data, options).map_err(in_part)?;
            output.set(name, merged.into_bytes());
        }

        output.to_bytes()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{docx_with_paragraphs, document_text};
    use super::*;
    use serde_json::json;

    const LOOPS: MergeOptions = MergeOptions {
        paragraph_loop: true,
        linebreaks: true,
    };

    #[test]
    fn renders_document_and_keeps_other_parts() {
        let template = DocxTemplate::from_bytes(&docx_with_paragraphs(&["Hello {name}"])).unwrap();
        let out = template.render(&json!({"name": "Ada"}), &LOOPS).unwrap();

        assert_eq!(document_text(&out), "Hello Ada");
        let pkg = DocxPackage::from_bytes(&out).unwrap();
        assert_eq!(
            pkg.get("[Content_Types].xml"),
            Some(&b"<?xml version=\"1.0\"?><Types/>"[..])
        );
    }

    #[test]
    fn template_can_be_rendered_repeatedly() {
        let template = DocxTemplate::from_bytes(&docx_with_paragraphs(&["{n}"])).unwrap();
        let first = template.render(&json!({"n": 1}), &LOOPS).unwrap();
        let second = template.render(&json!({"n": 2}), &LOOPS).unwrap();
        assert_eq!(document_text(&first), "1");
        assert_eq!(document_text(&second), "2");
    }

    #[test]
    fn headers_and_footers_are_merged() {
        let mut pkg = DocxPackage::from_bytes(&docx_with_paragraphs(&["body"])).unwrap();
        pkg.set(
            "word/header1.xml",
            b"<w:hdr><w:p><w:r><w:t>{company}</w:t></w:r></w:p></w:hdr>".to_vec(),
        );
        pkg.set("word/styles.xml", b"<w:styles>{not a tag}</w:styles>".to_vec());

        let template = DocxTemplate::from_bytes(&pkg.to_bytes().unwrap()).unwrap();
        let out = template.render(&json!({"company": "Acme"}), &LOOPS).unwrap();
        let out = DocxPackage::from_bytes(&out).unwrap();

        let header = std::str::from_utf8(out.get("word/header1.xml").unwrap()).unwrap();
        assert!(header.contains(">Acme</w:t>"));
        assert_eq!(
            out.get("word/styles.xml"),
            Some(&b"<w:styles>{not a tag}</w:styles>"[..])
        );
    }

    #[test]
    fn missing_main_part_is_rejected() {
        let mut pkg = DocxPackage::new();
        pkg.set("[Content_Types].xml", b"<Types/>".to_vec());
        let err = DocxTemplate::from_bytes(&pkg.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(err, TemplateError::MissingPart(ref p) if p == "word/document.xml"));
    }

    #[test]
    fn errors_name_the_part() {
        let template = DocxTemplate::from_bytes(&docx_with_paragraphs(&["{#items}"])).unwrap();
        let err = template.render(&json!({}), &LOOPS).unwrap_err();
        assert_eq!(
            err.to_string(),
            "word/document.xml: section {#items} is never closed"
        );
    }

    #[test]
    fn mergeable_parts() {
        assert!(is_mergeable("word/document.xml"));
        assert!(is_mergeable("word/header2.xml"));
        assert!(is_mergeable("word/footer1.xml"));
        assert!(is_mergeable("word/footnotes.xml"));
        assert!(!is_mergeable("word/styles.xml"));
        assert!(!is_mergeable("word/_rels/document.xml.rels"));
        assert!(!is_mergeable("docProps/core.xml"));
    }
}
