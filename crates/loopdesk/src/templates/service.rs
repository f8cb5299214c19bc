//! Template store operations: upload, metadata, mappings, preview, delete.

use std::sync::Arc;

use chrono::Utc;

use super::mapping::{validate_mappings, FieldMapping, FieldMappingInput};
use super::{
    DocumentTemplate, TemplateCategory, TemplateFile, TemplateFileType, TemplateInfo,
    TemplateStats, TemplateUpload,
};
use crate::actor::{Actor, RequestContext};
use crate::config::Limits;
use crate::db::template_repo::{self, NewTemplateRow, TemplateRow};
use crate::db::{format_timestamp, parse_timestamp, user_repo, Database, DatabaseError};
use crate::error::{LoopdeskError, Result, ValidationError};
use crate::hooks::{CommitEvent, CommitKind, HookRunner};
use crate::storage::BlobStore;

pub(crate) fn template_from_row(row: TemplateRow) -> std::result::Result<DocumentTemplate, DatabaseError> {
    let field_mappings: Vec<FieldMapping> = match row.field_mappings.as_deref().map(str::trim) {
        None | Some("") | Some("null") => Vec::new(),
        Some(json) => serde_json::from_str(json).map_err(|source| DatabaseError::CorruptJson {
            table: "document_templates",
            column: "field_mappings",
            source,
        })?,
    };

    let category = TemplateCategory::parse(&row.category).unwrap_or_else(|| {
        log::warn!(
            "Template {} has unknown category '{}', treating as other",
            row.id,
            row.category
        );
        TemplateCategory::Other
    });

    // An unrecognised type is only ever copied, never substituted.
    let file_type = TemplateFileType::parse(&row.file_type).unwrap_or_else(|| {
        log::warn!(
            "Template {} has unknown file type '{}', output will be a copy",
            row.id,
            row.file_type
        );
        TemplateFileType::Pdf
    });

    Ok(DocumentTemplate {
        id: row.id,
        name: row.name,
        description: row.description,
        category,
        stored_file: row.stored_file,
        file_name: row.file_name,
        file_type,
        file_size: row.file_size.max(0) as u64,
        fields_mapped: row.fields_mapped,
        field_mappings,
        created_by: row.created_by,
        created_by_name: row.created_by_name,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_category(raw: &str) -> std::result::Result<TemplateCategory, ValidationError> {
    TemplateCategory::parse(raw)
        .ok_or_else(|| ValidationError::invalid("category", format!("unknown category '{}'", raw)))
}

#[derive(Clone)]
pub struct TemplateService {
    db: Database,
    templates: Arc<dyn BlobStore>,
    limits: Limits,
    hooks: HookRunner,
}

impl TemplateService {
    pub fn new(
        db: Database,
        templates: Arc<dyn BlobStore>,
        limits: Limits,
        hooks: HookRunner,
    ) -> Self {
        Self {
            db,
            templates,
            limits,
            hooks,
        }
    }

    /// Validates and stores a new template. Admin only.
    pub fn upload(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        upload: &TemplateUpload,
    ) -> Result<DocumentTemplate> {
        actor.require_admin("upload templates")?;

        let name = non_blank(Some(upload.name.as_str()))
            .ok_or(ValidationError::MissingField { field: "name" })?;
        let category = parse_category(
            non_blank(Some(upload.category.as_str()))
                .ok_or(ValidationError::MissingField { field: "category" })?,
        )?;
        let file_type = TemplateFileType::from_mime(&upload.mimetype).ok_or_else(|| {
            ValidationError::UnsupportedFileType(format!(
                "{} ({}), only PDF, Word and text files are allowed",
                upload.file_name, upload.mimetype
            ))
        })?;

        let size = upload.bytes.len() as u64;
        if size == 0 {
            return Err(ValidationError::invalid("templateFile", "file is empty").into());
        }
        if size > self.limits.max_template_bytes {
            return Err(ValidationError::FileTooLarge {
                name: upload.file_name.clone(),
                size,
                limit: self.limits.max_template_bytes,
            }
            .into());
        }

        let stored_file = self.templates.put(&upload.bytes, file_type.extension())?;
        let now = format_timestamp(Utc::now());

        let inserted = user_repo::remember(&self.db, actor, &now).and_then(|_| {
            template_repo::insert(
                &self.db,
                &NewTemplateRow {
                    name,
                    description: non_blank(upload.description.as_deref()),
                    category,
                    stored_file: &stored_file,
                    file_name: &upload.file_name,
                    file_type: file_type.extension(),
                    file_size: size as i64,
                    created_by: Some(actor.id),
                },
                &now,
            )
        });
        let id = match inserted {
            Ok(id) => id,
            Err(e) => {
                self.discard_file(&stored_file);
                return Err(e.into());
            }
        };

        let template = self.get(id)?;
        log::info!(
            "Template #{} '{}' uploaded ({} bytes, {})",
            id,
            template.name,
            size,
            file_type
        );

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::TemplateUploaded {
                template_id: id,
                name: template.name.clone(),
                file_name: template.file_name.clone(),
            },
        ));
        Ok(template)
    }

    /// All templates, newest first.
    pub fn list(&self) -> Result<Vec<DocumentTemplate>> {
        let rows = template_repo::list_all(&self.db)?;
        Ok(rows
            .into_iter()
            .map(template_from_row)
            .collect::<std::result::Result<_, _>>()?)
    }

    pub fn list_by_category(&self, category: &str) -> Result<Vec<DocumentTemplate>> {
        let category = parse_category(category)?;
        let rows = template_repo::list_by_category(&self.db, category)?;
        Ok(rows
            .into_iter()
            .map(template_from_row)
            .collect::<std::result::Result<_, _>>()?)
    }

    pub fn get(&self, id: i64) -> Result<DocumentTemplate> {
        let row = template_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| LoopdeskError::not_found("Template", id))?;
        Ok(template_from_row(row)?)
    }

    pub fn stats(&self) -> Result<TemplateStats> {
        Ok(template_repo::stats(&self.db)?)
    }

    /// Updates name, description and category. Absent fields keep their
    /// values; an empty description clears it.
    pub fn update_info(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        id: i64,
        info: &TemplateInfo,
    ) -> Result<DocumentTemplate> {
        actor.require_admin("edit templates")?;
        let current = self.get(id)?;

        let name = match info.name.as_deref() {
            Some(raw) => non_blank(Some(raw))
                .ok_or(ValidationError::MissingField { field: "name" })?
                .to_string(),
            None => current.name.clone(),
        };
        let description = match info.description.as_deref() {
            Some(raw) => non_blank(Some(raw)).map(str::to_string),
            None => current.description.clone(),
        };
        let category = match non_blank(info.category.as_deref()) {
            Some(raw) => parse_category(raw)?,
            None => current.category,
        };

        let now = format_timestamp(Utc::now());
        if template_repo::update_info(&self.db, id, &name, description.as_deref(), category, &now)? == 0 {
            return Err(LoopdeskError::not_found("Template", id));
        }
        let template = self.get(id)?;

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::TemplateUpdated {
                template_id: id,
                name: template.name.clone(),
            },
        ));
        Ok(template)
    }

    /// Validates and replaces the whole mapping set. An empty set clears the
    /// mappings and marks the template unmapped.
    pub fn set_field_mappings(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        id: i64,
        inputs: &[FieldMappingInput],
    ) -> Result<DocumentTemplate> {
        actor.require_admin("map template fields")?;
        let mappings = validate_mappings(inputs)?;
        let current = self.get(id)?;

        let json = serde_json::to_string(&mappings).map_err(|source| DatabaseError::CorruptJson {
            table: "document_templates",
            column: "field_mappings",
            source,
        })?;
        let now = format_timestamp(Utc::now());
        if template_repo::update_field_mappings(&self.db, id, &json, !mappings.is_empty(), &now)? == 0 {
            return Err(LoopdeskError::not_found("Template", id));
        }
        let template = self.get(id)?;
        log::info!(
            "Template #{} '{}' now has {} field mapping(s)",
            id,
            current.name,
            mappings.len()
        );

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::TemplateFieldsMapped {
                template_id: id,
                name: template.name.clone(),
                mapping_count: mappings.len(),
            },
        ));
        Ok(template)
    }

    /// Raw template bytes with the original file name and content type.
    pub fn preview(&self, id: i64) -> Result<TemplateFile> {
        let template = self.get(id)?;
        if !self.templates.exists(&template.stored_file) {
            return Err(LoopdeskError::not_found("Template file", &template.file_name));
        }
        let bytes = self.templates.get(&template.stored_file)?;
        Ok(TemplateFile {
            file_name: template.file_name,
            content_type: template.file_type.content_type(),
            bytes,
        })
    }

    /// Deletes the metadata row and, best-effort, the stored file.
    pub fn delete(&self, actor: &Actor, ctx: &RequestContext, id: i64) -> Result<()> {
        actor.require_admin("delete templates")?;
        let template = self.get(id)?;

        self.discard_file(&template.stored_file);
        if template_repo::delete(&self.db, id)? == 0 {
            return Err(LoopdeskError::not_found("Template", id));
        }
        log::info!("Template #{} '{}' deleted", id, template.name);

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::TemplateDeleted {
                template_id: id,
                name: template.name,
            },
        ));
        Ok(())
    }

    fn discard_file(&self, stored_file: &str) {
        match self.templates.delete(stored_file) {
            Ok(true) => {}
            Ok(false) => log::warn!("Template file {} was already missing", stored_file),
            Err(e) => log::warn!("Failed to delete template file {}: {}", stored_file, e),
        }
    }
}
