use super::{DocumentRenderer, RenderOutcome, Substitutions};
use crate::templates::TemplateFileType;

pub const PDF_COPY_MESSAGE: &str =
    "PDF generated (template copied - field replacement is not supported for PDF templates)";

/// PDF templates are written out unchanged.
pub struct PdfRenderer;

impl PdfRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRenderer for PdfRenderer {
    fn supports(&self, file_type: TemplateFileType) -> bool {
        file_type == TemplateFileType::Pdf
    }

    fn render(&self, template: &[u8], _substitutions: &Substitutions) -> RenderOutcome {
        RenderOutcome::Copied {
            bytes: template.to_vec(),
            message: PDF_COPY_MESSAGE.to_string(),
        }
    }
}
