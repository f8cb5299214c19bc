//! Output strategies for document generation, one per template format.

pub mod docx;
pub mod pdf;
pub mod text;

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::templates::TemplateFileType;

/// Message attached to a result when rendering failed and the template
/// bytes were written unchanged.
pub const FALLBACK_MESSAGE: &str =
    "Document generated (template copied - field replacement failed)";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Template is not valid UTF-8 text")]
    Encoding,

    #[error("Failed to read document package: {0}")]
    Package(String),

    #[error("Failed to process document XML: {0}")]
    Xml(String),
}

/// One `{{name}}` token and the formatted value that replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pub name: String,
    pub value: String,
}

/// Placeholder table for a single generation run.
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    values: Vec<String>,
    index: HashMap<String, usize>,
}

impl Substitutions {
    pub fn new(items: Vec<Substitution>) -> Self {
        let mut values = Vec::with_capacity(items.len());
        let mut index = HashMap::with_capacity(items.len());
        for item in items {
            index.entry(item.name).or_insert(values.len());
            values.push(item.value);
        }
        Self { values, index }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Replaces every `{{name}}` with a known name in one left-to-right pass.
    /// Values are never rescanned, so a value that itself looks like a
    /// placeholder is emitted as-is. Indices of substitutions that matched
    /// at least once are added to `hits`.
    pub fn apply(&self, text: &str, hits: &mut BTreeSet<usize>) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };

            match self.index.get(&after[..end]) {
                Some(&idx) => {
                    out.push_str(&self.values[idx]);
                    hits.insert(idx);
                    rest = &after[end + 2..];
                }
                None => {
                    // Step one brace so "{{{name}}}" still matches.
                    out.push('{');
                    rest = &rest[start + 1..];
                }
            }
        }

        out.push_str(rest);
        out
    }

    /// Convenience for callers that only need the replacement count.
    pub fn apply_counted(&self, text: &str) -> (String, usize) {
        let mut hits = BTreeSet::new();
        let out = self.apply(text, &mut hits);
        (out, hits.len())
    }
}

/// What a renderer produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    /// Placeholders were substituted; `fields_replaced` counts mappings
    /// whose placeholder occurred in the template.
    Substituted { bytes: Vec<u8>, fields_replaced: usize },
    /// The template bytes are returned unchanged.
    Copied { bytes: Vec<u8>, message: String },
}

impl RenderOutcome {
    pub(crate) fn fallback(template: &[u8]) -> Self {
        RenderOutcome::Copied {
            bytes: template.to_vec(),
            message: FALLBACK_MESSAGE.to_string(),
        }
    }
}

pub trait DocumentRenderer: Send + Sync {
    fn supports(&self, file_type: TemplateFileType) -> bool;

    /// Never fails: renderers fall back to a verbatim copy.
    fn render(&self, template: &[u8], substitutions: &Substitutions) -> RenderOutcome;
}

pub struct RendererRegistry {
    renderers: Vec<Box<dyn DocumentRenderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        let renderers: Vec<Box<dyn DocumentRenderer>> = vec![
            Box::new(pdf::PdfRenderer::new()),
            Box::new(docx::DocxRenderer::new()),
            Box::new(text::TextRenderer::new()),
        ];
        Self { renderers }
    }

    pub fn render(
        &self,
        file_type: TemplateFileType,
        template: &[u8],
        substitutions: &Substitutions,
    ) -> RenderOutcome {
        for renderer in &self.renderers {
            if renderer.supports(file_type) {
                return renderer.render(template, substitutions);
            }
        }

        log::warn!("No renderer registered for {} templates", file_type);
        RenderOutcome::fallback(template)
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new()
    }
}
