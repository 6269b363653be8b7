use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Declaration emitted at the top of every composed document.
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// One top-level element of a Moodle quiz document.
///
/// The element text is sliced verbatim from the source document, so
/// re-emitting it is byte-exact: entities, CDATA sections and internal
/// whitespace all survive untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizElement {
    /// Full element text from `<` to `>`
    pub xml: String,

    /// Content of `<name><text>` for payload questions
    pub name: Option<String>,

    /// True for `type="category"` pseudo-questions and any other element
    /// that carries document context rather than a question
    pub is_context: bool,
}

impl QuizElement {
    /// Returns true if this element is a payload question.
    #[must_use]
    pub const fn is_payload(&self) -> bool {
        !self.is_context
    }

    /// Returns the element size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.xml.len()
    }
}

/// A parsed Moodle quiz document.
///
/// Holds the root element's open/close tags and all top-level elements in
/// document order. Payload questions (non-category `<question>` elements)
/// are the splittable content; everything else is context that every
/// composed output document repeats.
#[derive(Debug, Clone)]
pub struct QuizXml {
    path: PathBuf,
    stem: String,
    root_open: String,
    root_close: String,
    elements: Vec<QuizElement>,
}

impl QuizXml {
    /// Parses a Moodle quiz XML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not well-formed
    /// XML. Nothing is written before parsing succeeds.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse_str(path, &text)
    }

    /// Parses a Moodle quiz document from a string.
    ///
    /// `path` is used only for error messages and output naming.
    pub(crate) fn parse_str(path: &Path, text: &str) -> Result<Self> {
        let doc =
            roxmltree::Document::parse(text).map_err(|e| Error::parse(path, e.to_string()))?;
        let root = doc.root_element();

        let mut elements = Vec::new();
        for child in root.children().filter(roxmltree::Node::is_element) {
            let xml = text[child.range()].to_string();

            if child.tag_name().name() == "question"
                && child.attribute("type") != Some("category")
            {
                let name = question_name(child);
                trace!(
                    "Parsed question '{}' ({} bytes)",
                    name.as_deref().unwrap_or("unnamed"),
                    xml.len()
                );
                elements.push(QuizElement {
                    xml,
                    name,
                    is_context: false,
                });
            } else {
                elements.push(QuizElement {
                    xml,
                    name: None,
                    is_context: true,
                });
            }
        }

        let stem = path
            .file_stem()
            .map_or_else(|| "quiz".to_string(), |s| s.to_string_lossy().into_owned());

        let quiz = Self {
            path: path.to_path_buf(),
            stem,
            root_open: open_tag(root),
            root_close: format!("</{}>", root.tag_name().name()),
            elements,
        };

        debug!(
            "Parsed '{}': {} questions, {} context elements",
            path.display(),
            quiz.payload_count(),
            quiz.elements.len() - quiz.payload_count()
        );

        Ok(quiz)
    }

    /// Returns the path the document was parsed from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the input file stem, used to name split outputs.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Returns all top-level elements in document order.
    #[must_use]
    pub fn elements(&self) -> &[QuizElement] {
        &self.elements
    }

    /// Iterates the payload questions in document order.
    pub fn payload(&self) -> impl Iterator<Item = &QuizElement> {
        self.elements.iter().filter(|e| e.is_payload())
    }

    /// Returns the number of payload questions.
    #[must_use]
    pub fn payload_count(&self) -> usize {
        self.payload().count()
    }

    /// Composes an independently valid document from the replicated context
    /// elements plus the given payload questions.
    #[must_use]
    pub fn compose_batch(&self, payload: &[&QuizElement]) -> String {
        let context: Vec<&QuizElement> = self.elements.iter().filter(|e| e.is_context).collect();
        self.compose(&context, payload)
    }

    /// Composes a document from all of this document's elements in their
    /// original order, followed by the given extra questions.
    #[must_use]
    pub fn compose_with_appended(&self, extra: &[&QuizElement]) -> String {
        let own: Vec<&QuizElement> = self.elements.iter().collect();
        self.compose(&own, extra)
    }

    /// Returns the byte cost of an output document before any payload is
    /// added: declaration, root tags and replicated context elements.
    #[must_use]
    pub fn wrapper_overhead(&self) -> usize {
        self.compose_batch(&[]).len()
    }

    fn compose(&self, head: &[&QuizElement], tail: &[&QuizElement]) -> String {
        let body: usize = head.iter().chain(tail).map(|e| e.xml.len() + 1).sum();
        let mut out = String::with_capacity(
            XML_DECLARATION.len() + self.root_open.len() + self.root_close.len() + body + 3,
        );

        out.push_str(XML_DECLARATION);
        out.push('\n');
        out.push_str(&self.root_open);
        out.push('\n');
        for element in head.iter().chain(tail) {
            out.push_str(&element.xml);
            out.push('\n');
        }
        out.push_str(&self.root_close);
        out.push('\n');
        out
    }
}

/// Merges parsed documents: the first document keeps its full element list
/// in order, then the payload questions of each further document are
/// appended.
///
/// # Errors
///
/// Returns a configuration error when there is nothing to merge.
pub(crate) fn merge_documents(docs: &[QuizXml]) -> Result<String> {
    let Some((base, rest)) = docs.split_first() else {
        return Err(Error::config("No XML documents to merge"));
    };

    let extra: Vec<&QuizElement> = rest.iter().flat_map(QuizXml::payload).collect();
    debug!(
        "Merging {} documents: {} base elements + {} appended questions",
        docs.len(),
        base.elements().len(),
        extra.len()
    );

    Ok(base.compose_with_appended(&extra))
}

/// Extracts the `<name><text>` content of a question element.
fn question_name(question: roxmltree::Node<'_, '_>) -> Option<String> {
    question
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "name")?
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "text")?
        .text()
        .map(str::to_string)
}

/// Rebuilds the root's open tag with its namespace declarations and
/// attributes.
fn open_tag(root: roxmltree::Node<'_, '_>) -> String {
    let mut tag = String::from("<");
    tag.push_str(root.tag_name().name());

    for ns in root.namespaces() {
        match ns.name() {
            Some(prefix) => {
                tag.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape_xml(ns.uri())));
            }
            None => {
                tag.push_str(&format!(" xmlns=\"{}\"", escape_xml(ns.uri())));
            }
        }
    }

    for attr in root.attributes() {
        tag.push_str(&format!(" {}=\"{}\"", attr.name(), escape_xml(attr.value())));
    }

    tag.push('>');
    tag
}

/// Escapes text for inclusion in XML content or attribute values.
pub(crate) fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
