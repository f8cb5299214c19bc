//! Document generation: fills a mapped template with one loop's values and
//! writes the result to the generated-documents store.
//!
//! Generated files are not tracked in the database. A document belongs to
//! a loop when its name contains `_{loop_id}_`, which is how
//! [`DocumentGenerator::list_for_loop`] finds them.

pub mod format;
pub mod render;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info_span;

use crate::actor::{Actor, RequestContext};
use crate::db::{loop_repo, template_repo, Database};
use crate::error::{LoopdeskError, Result};
use crate::hooks::{CommitEvent, CommitKind, HookRunner};
use crate::loops::service::loop_from_row;
use crate::loops::Loop;
use crate::sanitize::filename_token;
use crate::storage::{validate_handle, BlobStore};
use crate::templates::service::template_from_row;
use crate::templates::{DocumentTemplate, TemplateFileType};

use format::{format_value, resolve_field};
use render::{RenderOutcome, RendererRegistry, Substitution, Substitutions, FALLBACK_MESSAGE};

/// Outcome of one generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub success: bool,
    pub file_name: String,
    pub file_type: TemplateFileType,
    pub generated_at: DateTime<Utc>,
    pub template_id: i64,
    pub template_name: String,
    pub loop_id: i64,
    pub size: u64,
    /// Set when placeholders were substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields_replaced: Option<usize>,
    /// Set when the template was copied instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A previously generated file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDocument {
    pub file_name: String,
    pub file_type: Option<String>,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Bytes of a generated file, ready for download.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Output name: `<token>_<loop id>_<millis>.<ext>`.
pub fn output_file_name(template_name: &str, loop_id: i64, at: DateTime<Utc>, file_type: TemplateFileType) -> String {
    format!(
        "{}_{}_{}.{}",
        filename_token(template_name),
        loop_id,
        at.timestamp_millis(),
        file_type.extension()
    )
}

/// Builds the placeholder table for one template and loop.
pub fn substitutions_for(template: &DocumentTemplate, record: &Loop) -> Substitutions {
    Substitutions::new(
        template
            .field_mappings
            .iter()
            .map(|m| Substitution {
                name: m.name.clone(),
                value: format_value(&resolve_field(record, m.loop_field), m.field_type),
            })
            .collect(),
    )
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[derive(Clone)]
pub struct DocumentGenerator {
    db: Database,
    templates: Arc<dyn BlobStore>,
    output: Arc<dyn BlobStore>,
    renderers: Arc<RendererRegistry>,
    hooks: HookRunner,
}

impl DocumentGenerator {
    pub fn new(
        db: Database,
        templates: Arc<dyn BlobStore>,
        output: Arc<dyn BlobStore>,
        hooks: HookRunner,
    ) -> Self {
        Self {
            db,
            templates,
            output,
            renderers: Arc::new(RendererRegistry::new()),
            hooks,
        }
    }

    /// Generates a document from a template for a loop the actor can see.
    pub fn generate(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        template_id: i64,
        loop_id: i64,
    ) -> Result<GenerationResult> {
        self.generate_at(actor, ctx, template_id, loop_id, Utc::now())
    }

    pub(crate) fn generate_at(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        template_id: i64,
        loop_id: i64,
        now: DateTime<Utc>,
    ) -> Result<GenerationResult> {
        let _span = info_span!("generate_document", template_id, loop_id).entered();

        let template = {
            let row = template_repo::find_by_id(&self.db, template_id)?
                .ok_or_else(|| LoopdeskError::not_found("Template", template_id))?;
            template_from_row(row)?
        };
        let record = {
            let row = loop_repo::find_by_id(&self.db, loop_id)?
                .ok_or_else(|| LoopdeskError::not_found("Loop", loop_id))?;
            loop_from_row(row)
        };
        if !actor.can_access(record.creator_id) {
            return Err(LoopdeskError::PermissionDenied(format!(
                "loop #{} belongs to another user",
                loop_id
            )));
        }

        if !template.fields_mapped || template.field_mappings.is_empty() {
            return Err(LoopdeskError::InvalidState(format!(
                "template '{}' has no field mappings",
                template.name
            )));
        }
        if !self.templates.exists(&template.stored_file) {
            return Err(LoopdeskError::not_found("Template file", &template.file_name));
        }

        let source = {
            let _step = info_span!("read_template").entered();
            self.templates.get(&template.stored_file)?
        };

        let outcome = {
            let _step = info_span!("render", file_type = %template.file_type).entered();
            let substitutions = substitutions_for(&template, &record);
            self.renderers
                .render(template.file_type, &source, &substitutions)
        };

        let wanted = output_file_name(&template.name, record.id, now, template.file_type);
        let (file_name, size, fields_replaced, message) = {
            let _step = info_span!("write_output").entered();
            self.write_output(&wanted, &source, outcome)?
        };

        log::info!(
            "Generated {} from template #{} for loop #{}{}",
            file_name,
            template.id,
            record.id,
            message
                .as_deref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        );

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::DocumentGenerated {
                template_id: template.id,
                template_name: template.name.clone(),
                loop_id: record.id,
                file_name: file_name.clone(),
            },
        ));

        Ok(GenerationResult {
            success: true,
            file_name,
            file_type: template.file_type,
            generated_at: now,
            template_id: template.id,
            template_name: template.name,
            loop_id: record.id,
            size,
            fields_replaced,
            message,
        })
    }

    /// Writes the rendered bytes. A failed write of substituted output is
    /// retried once as a plain template copy.
    fn write_output(
        &self,
        wanted: &str,
        source: &[u8],
        outcome: RenderOutcome,
    ) -> Result<(String, u64, Option<usize>, Option<String>)> {
        match outcome {
            RenderOutcome::Substituted {
                bytes,
                fields_replaced,
            } => match self.output.put_named(wanted, &bytes) {
                Ok(name) => Ok((name, bytes.len() as u64, Some(fields_replaced), None)),
                Err(e) => {
                    log::warn!("Writing generated document {} failed, copying template: {}", wanted, e);
                    let name = self.output.put_named(wanted, source)?;
                    Ok((
                        name,
                        source.len() as u64,
                        None,
                        Some(FALLBACK_MESSAGE.to_string()),
                    ))
                }
            },
            RenderOutcome::Copied { bytes, message } => {
                let name = self.output.put_named(wanted, &bytes)?;
                Ok((name, bytes.len() as u64, None, Some(message)))
            }
        }
    }

    /// Every generated file whose name carries `_{loop_id}_`, newest first.
    pub fn list_for_loop(&self, loop_id: i64) -> Result<Vec<GeneratedDocument>> {
        let token = format!("_{}_", loop_id);
        let mut documents: Vec<GeneratedDocument> = self
            .output
            .list()?
            .into_iter()
            .filter(|f| f.name.contains(&token))
            .map(|f| GeneratedDocument {
                file_type: extension_of(&f.name),
                file_name: f.name,
                size: f.size,
                created_at: f.created_at,
                modified_at: f.modified_at,
            })
            .collect();

        documents.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(documents)
    }

    /// Reads a generated file for download. Names that could leave the
    /// output directory are reported as not found.
    pub fn open_generated(&self, file_name: &str) -> Result<GeneratedFile> {
        if validate_handle(file_name).is_err() || !self.output.exists(file_name) {
            return Err(LoopdeskError::not_found("Generated document", file_name));
        }
        let bytes = self.output.get(file_name)?;
        let content_type = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(GeneratedFile {
            file_name: file_name.to_string(),
            content_type,
            bytes,
        })
    }

    /// Deletes a generated file. `Ok(false)` when it did not exist.
    pub fn delete_generated(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        file_name: &str,
    ) -> Result<bool> {
        actor.require_admin("delete generated documents")?;
        if validate_handle(file_name).is_err() {
            return Err(LoopdeskError::not_found("Generated document", file_name));
        }

        let deleted = self.output.delete(file_name)?;
        if deleted {
            log::info!("Deleted generated document {}", file_name);
            self.hooks.run(CommitEvent::new(
                actor,
                ctx,
                CommitKind::DocumentDeleted {
                    file_name: file_name.to_string(),
                },
            ));
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::loops::{LoopService, NewLoop};
    use crate::storage::FileStorage;
    use crate::templates::{FieldMappingInput, TemplateService, TemplateUpload, MIME_PDF, MIME_TEXT};
    use crate::test_support::{admin, agent};
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        output_dir: std::path::PathBuf,
        loops: LoopService,
        templates: TemplateService,
        generator: DocumentGenerator,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let template_store: Arc<dyn BlobStore> =
            Arc::new(FileStorage::create(dir.path().join("templates")).unwrap());
        let output_dir = dir.path().join("generated");
        let output: Arc<dyn BlobStore> = Arc::new(FileStorage::create(&output_dir).unwrap());
        let images: Arc<dyn BlobStore> =
            Arc::new(FileStorage::create(dir.path().join("images")).unwrap());

        Fixture {
            loops: LoopService::new(db.clone(), images, Limits::default(), 3, HookRunner::default()),
            templates: TemplateService::new(
                db.clone(),
                template_store.clone(),
                Limits::default(),
                HookRunner::default(),
            ),
            generator: DocumentGenerator::new(db, template_store, output, HookRunner::default()),
            output_dir,
            _dir: dir,
        }
    }

    fn new_loop(f: &Fixture, actor: &Actor) -> Loop {
        f.loops
            .create(
                actor,
                &RequestContext::default(),
                &NewLoop {
                    loop_type: Some("Purchase".into()),
                    property_address: Some("123 Main St".into()),
                    client_name: Some("Jane Doe".into()),
                    sale: Some("450000".into()),
                    ..Default::default()
                },
            )
            .unwrap()
    }

    fn template(f: &Fixture, name: &str, mimetype: &str, body: &[u8]) -> DocumentTemplate {
        f.templates
            .upload(
                &admin(),
                &RequestContext::default(),
                &TemplateUpload {
                    name: name.to_string(),
                    description: None,
                    category: "contract".to_string(),
                    file_name: "source".to_string(),
                    mimetype: mimetype.to_string(),
                    bytes: body.to_vec(),
                },
            )
            .unwrap()
    }

    fn map(f: &Fixture, id: i64, mappings: &[FieldMappingInput]) {
        f.templates
            .set_field_mappings(&admin(), &RequestContext::default(), id, mappings)
            .unwrap();
    }

    #[test]
    fn test_output_file_name() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            output_file_name("Purchase Agreement (v2)", 42, at, TemplateFileType::Docx),
            "Purchase_Agreement__v2__42_1700000000123.docx"
        );
    }

    #[test]
    fn test_text_generation_substitutes_values() {
        let f = fixture();
        let record = new_loop(&f, &admin());
        let t = template(
            &f,
            "Offer",
            MIME_TEXT,
            b"Buyer: {{buyer}}\nPrice: {{price}}\nKeep: {{unmapped}}",
        );
        map(
            &f,
            t.id,
            &[
                FieldMappingInput::new("buyer", "client_name", "text"),
                FieldMappingInput::new("price", "sale", "currency"),
                FieldMappingInput::new("closing", "end_date", "date"),
            ],
        );

        let result = f
            .generator
            .generate(&admin(), &RequestContext::default(), t.id, record.id)
            .unwrap();
        assert!(result.success);
        assert_eq!(result.fields_replaced, Some(2));
        assert_eq!(result.message, None);
        assert!(result.file_name.starts_with(&format!("Offer_{}_", record.id)));
        assert!(result.file_name.ends_with(".txt"));

        let written = std::fs::read_to_string(f.output_dir.join(&result.file_name)).unwrap();
        assert_eq!(written, "Buyer: Jane Doe\nPrice: $450,000.00\nKeep: {{unmapped}}");
        assert_eq!(result.size, written.len() as u64);
    }

    #[test]
    fn test_pdf_generation_copies_template() {
        let f = fixture();
        let record = new_loop(&f, &admin());
        let t = template(&f, "Listing", MIME_PDF, b"%PDF-1.4 {{client_name}}");
        map(&f, t.id, &[FieldMappingInput::new("client_name", "client_name", "text")]);

        let result = f
            .generator
            .generate(&admin(), &RequestContext::default(), t.id, record.id)
            .unwrap();
        assert!(result.success);
        assert_eq!(result.fields_replaced, None);
        assert_eq!(result.message.as_deref(), Some(render::pdf::PDF_COPY_MESSAGE));
        assert_eq!(
            std::fs::read(f.output_dir.join(&result.file_name)).unwrap(),
            b"%PDF-1.4 {{client_name}}"
        );
    }

    #[test]
    fn test_unmapped_template_is_invalid_state_and_writes_nothing() {
        let f = fixture();
        let record = new_loop(&f, &admin());
        let t = template(&f, "Blank", MIME_TEXT, b"{{x}}");

        let err = f
            .generator
            .generate(&admin(), &RequestContext::default(), t.id, record.id)
            .unwrap_err();
        assert!(matches!(err, LoopdeskError::InvalidState(_)));
        assert_eq!(std::fs::read_dir(&f.output_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_records_and_files() {
        let f = fixture();
        let record = new_loop(&f, &admin());
        let t = template(&f, "T", MIME_TEXT, b"{{a}}");
        map(&f, t.id, &[FieldMappingInput::new("a", "notes", "text")]);
        let ctx = RequestContext::default();

        assert!(matches!(
            f.generator.generate(&admin(), &ctx, 999, record.id),
            Err(LoopdeskError::NotFound { entity: "Template", .. })
        ));
        assert!(matches!(
            f.generator.generate(&admin(), &ctx, t.id, 999),
            Err(LoopdeskError::NotFound { entity: "Loop", .. })
        ));

        f.templates.preview(t.id).unwrap();
        let stored = f._dir.path().join("templates").join(&t.stored_file);
        std::fs::remove_file(stored).unwrap();
        assert!(matches!(
            f.generator.generate(&admin(), &ctx, t.id, record.id),
            Err(LoopdeskError::NotFound { entity: "Template file", .. })
        ));
    }

    #[test]
    fn test_agent_cannot_generate_for_foreign_loop() {
        let f = fixture();
        let record = new_loop(&f, &admin());
        let t = template(&f, "T", MIME_TEXT, b"{{a}}");
        map(&f, t.id, &[FieldMappingInput::new("a", "notes", "text")]);

        assert!(matches!(
            f.generator
                .generate(&agent(), &RequestContext::default(), t.id, record.id),
            Err(LoopdeskError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_list_open_and_delete_generated() {
        let f = fixture();
        let first = new_loop(&f, &admin());
        let second = new_loop(&f, &admin());
        let t = template(&f, "Offer", MIME_TEXT, b"{{a}}");
        map(&f, t.id, &[FieldMappingInput::new("a", "client_name", "text")]);
        let ctx = RequestContext::default();

        let early = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let late = Utc.timestamp_millis_opt(1_700_000_001_000).unwrap();
        let a = f.generator.generate_at(&admin(), &ctx, t.id, first.id, early).unwrap();
        let b = f.generator.generate_at(&admin(), &ctx, t.id, first.id, late).unwrap();
        f.generator.generate_at(&admin(), &ctx, t.id, second.id, late).unwrap();

        let listed = f.generator.list_for_loop(first.id).unwrap();
        let names: Vec<&str> = listed.iter().map(|d| d.file_name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&a.file_name.as_str()));
        assert!(names.contains(&b.file_name.as_str()));
        assert_eq!(listed[0].file_type.as_deref(), Some("txt"));
        assert_eq!(f.generator.list_for_loop(first.id).unwrap(), listed);

        let file = f.generator.open_generated(&a.file_name).unwrap();
        assert_eq!(file.bytes, b"Jane Doe");
        assert_eq!(file.content_type, "text/plain");

        assert!(matches!(
            f.generator.open_generated("../secrets.txt"),
            Err(LoopdeskError::NotFound { .. })
        ));
        assert!(matches!(
            f.generator.delete_generated(&agent(), &ctx, &a.file_name),
            Err(LoopdeskError::PermissionDenied(_))
        ));
        assert!(f.generator.delete_generated(&admin(), &ctx, &a.file_name).unwrap());
        assert!(!f.generator.delete_generated(&admin(), &ctx, &a.file_name).unwrap());
        assert_eq!(f.generator.list_for_loop(first.id).unwrap().len(), 1);
    }
}
