use super::{DocumentRenderer, RenderError, RenderOutcome, Substitutions};
use crate::templates::TemplateFileType;

/// Plain text substitution for `txt` and legacy `doc` templates.
pub struct TextRenderer;

impl TextRenderer {
    pub fn new() -> Self {
        Self
    }

    fn substitute(
        &self,
        template: &[u8],
        substitutions: &Substitutions,
    ) -> Result<(String, usize), RenderError> {
        let text = std::str::from_utf8(template).map_err(|_| RenderError::Encoding)?;
        Ok(substitutions.apply_counted(text))
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRenderer for TextRenderer {
    fn supports(&self, file_type: TemplateFileType) -> bool {
        matches!(file_type, TemplateFileType::Txt | TemplateFileType::Doc)
    }

    fn render(&self, template: &[u8], substitutions: &Substitutions) -> RenderOutcome {
        match self.substitute(template, substitutions) {
            Ok((text, fields_replaced)) => RenderOutcome::Substituted {
                bytes: text.into_bytes(),
                fields_replaced,
            },
            Err(e) => {
                log::warn!("Text substitution failed, copying template: {}", e);
                RenderOutcome::fallback(template)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::render::{Substitution, FALLBACK_MESSAGE};

    #[test]
    fn test_substitutes_text() {
        let subs = Substitutions::new(vec![Substitution {
            name: "address".to_string(),
            value: "12 Elm St".to_string(),
        }]);
        let outcome = TextRenderer::new().render(b"Property: {{address}}\n", &subs);
        assert_eq!(
            outcome,
            RenderOutcome::Substituted {
                bytes: b"Property: 12 Elm St\n".to_vec(),
                fields_replaced: 1
            }
        );
    }

    #[test]
    fn test_binary_doc_falls_back_to_copy() {
        let bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0xFF];
        let outcome = TextRenderer::new().render(&bytes, &Substitutions::default());
        assert_eq!(
            outcome,
            RenderOutcome::Copied {
                bytes,
                message: FALLBACK_MESSAGE.to_string()
            }
        );
    }
}
