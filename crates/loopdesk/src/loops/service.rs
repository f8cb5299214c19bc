//! Loop operations with ownership checks, image handling and post-commit
//! hooks.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};

use super::export;
use super::images::{check_uploads, decode_manifest, encode_manifest, image_extension};
use super::validation::{apply_patch, validate_new};
use super::{
    DashboardStats, ImageRecord, ImageUpload, Loop, LoopPatch, LoopQuery, LoopStats, LoopStatus,
    NewLoop,
};
use crate::actor::{Actor, RequestContext};
use crate::config::Limits;
use crate::db::loop_repo::{self, LoopRow};
use crate::db::{format_timestamp, parse_date, parse_timestamp, user_repo, Database, DatabaseError};
use crate::error::{LoopdeskError, Result, ValidationError};
use crate::hooks::{CommitEvent, CommitKind, HookRunner};
use crate::storage::BlobStore;

pub(crate) fn loop_from_row(row: LoopRow) -> Loop {
    let images = decode_manifest(row.images.as_deref()).unwrap_or_else(|e| {
        log::warn!("Ignoring unreadable image manifest on loop {}: {}", row.id, e);
        Vec::new()
    });

    Loop {
        id: row.id,
        loop_type: row.loop_type,
        sale: row.sale,
        status: LoopStatus::from_column(&row.status),
        property_address: row.property_address,
        client_name: row.client_name,
        client_email: row.client_email,
        client_phone: row.client_phone,
        notes: row.notes,
        tags: row.tags,
        start_date: row.start_date.as_deref().and_then(parse_date),
        end_date: row.end_date.as_deref().and_then(parse_date),
        images,
        archived: row.archived,
        creator_id: row.creator_id,
        creator_name: row.creator_name,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

fn encode_images(images: &[ImageRecord]) -> std::result::Result<Option<String>, DatabaseError> {
    encode_manifest(images).map_err(|source| DatabaseError::CorruptJson {
        table: "loops",
        column: "images",
        source,
    })
}

/// An image blob with its manifest entry.
#[derive(Debug, Clone)]
pub struct LoopImage {
    pub record: ImageRecord,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct LoopService {
    db: Database,
    images: Arc<dyn BlobStore>,
    limits: Limits,
    closing_soon_days: u32,
    hooks: HookRunner,
}

impl LoopService {
    pub fn new(
        db: Database,
        images: Arc<dyn BlobStore>,
        limits: Limits,
        closing_soon_days: u32,
        hooks: HookRunner,
    ) -> Self {
        Self {
            db,
            images,
            limits,
            closing_soon_days,
            hooks,
        }
    }

    fn load(&self, id: i64) -> Result<Loop> {
        loop_repo::find_by_id(&self.db, id)?
            .map(loop_from_row)
            .ok_or_else(|| LoopdeskError::not_found("Loop", id))
    }

    pub fn create(&self, actor: &Actor, ctx: &RequestContext, input: &NewLoop) -> Result<Loop> {
        let fields = validate_new(input)?;
        let now = format_timestamp(Utc::now());

        user_repo::remember(&self.db, actor, &now)?;
        let id = loop_repo::insert(&self.db, &fields, actor.id, &now)?;
        let record = self.load(id)?;
        log::info!("Loop #{} created by user {}", id, actor.id);

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::LoopCreated {
                record: record.clone(),
            },
        ));
        Ok(record)
    }

    /// Reads one loop. Agents may only read their own.
    pub fn get(&self, actor: &Actor, id: i64) -> Result<Loop> {
        let record = self.load(id)?;
        if !actor.can_access(record.creator_id) {
            return Err(LoopdeskError::PermissionDenied(format!(
                "loop #{} belongs to another user",
                id
            )));
        }
        Ok(record)
    }

    /// Applies a partial update. Absent fields keep their stored values;
    /// concurrent updates are last-write-wins for the fields they carry.
    pub fn update(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        id: i64,
        patch: &LoopPatch,
    ) -> Result<Loop> {
        let current = self.get(actor, id)?;
        let (fields, changed) = apply_patch(&current.fields(), patch)?;
        if changed.is_empty() {
            return Ok(current);
        }

        let now = format_timestamp(Utc::now());
        if loop_repo::update(&self.db, id, &fields, &now)? == 0 {
            return Err(LoopdeskError::not_found("Loop", id));
        }
        let record = self.load(id)?;
        log::info!("Loop #{} updated by user {}: {}", id, actor.id, changed.join(", "));

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::LoopUpdated {
                record: record.clone(),
                changed,
            },
        ));
        Ok(record)
    }

    /// Deletes a loop and its image blobs. Admin only.
    pub fn delete(&self, actor: &Actor, ctx: &RequestContext, id: i64) -> Result<()> {
        actor.require_admin("delete loops")?;
        let record = self.load(id)?;

        self.discard_images(&record.images);
        if loop_repo::delete(&self.db, id)? == 0 {
            return Err(LoopdeskError::not_found("Loop", id));
        }
        log::info!("Loop #{} deleted by user {}", id, actor.id);

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::LoopDeleted {
                loop_id: id,
                property_address: record.property_address,
            },
        ));
        Ok(())
    }

    pub fn archive(&self, actor: &Actor, ctx: &RequestContext, id: i64) -> Result<Loop> {
        self.set_archived(actor, ctx, id, true)
    }

    pub fn unarchive(&self, actor: &Actor, ctx: &RequestContext, id: i64) -> Result<Loop> {
        self.set_archived(actor, ctx, id, false)
    }

    fn set_archived(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        id: i64,
        archived: bool,
    ) -> Result<Loop> {
        actor.require_admin(if archived {
            "archive loops"
        } else {
            "unarchive loops"
        })?;

        let now = format_timestamp(Utc::now());
        if loop_repo::set_archived(&self.db, id, archived, &now)? == 0 {
            return Err(LoopdeskError::not_found("Loop", id));
        }
        let record = self.load(id)?;

        let kind = if archived {
            CommitKind::LoopArchived {
                loop_id: id,
                property_address: record.property_address.clone(),
            }
        } else {
            CommitKind::LoopUnarchived {
                loop_id: id,
                property_address: record.property_address.clone(),
            }
        };
        self.hooks.run(CommitEvent::new(actor, ctx, kind));
        Ok(record)
    }

    /// Lists loops. Agents only ever see loops they created.
    pub fn list(&self, actor: &Actor, query: &LoopQuery) -> Result<Vec<Loop>> {
        let query = if actor.is_admin() {
            query.clone()
        } else {
            query.clone().owned_by(actor.id)
        };
        let rows = loop_repo::query(&self.db, &query)?;
        Ok(rows.into_iter().map(loop_from_row).collect())
    }

    /// Aggregates over live loops. Read-only; legacy statuses are
    /// normalized once when the application starts.
    pub fn stats(&self) -> Result<LoopStats> {
        Ok(loop_repo::stats(&self.db)?)
    }

    pub fn dashboard_stats(&self) -> Result<DashboardStats> {
        let stats = self.stats()?;
        let closing_soon = self.closing_soon_at(Utc::now().date_naive())?.len() as u64;
        Ok(DashboardStats {
            stats,
            closing_soon,
        })
    }

    /// Open loops whose end date falls within the configured window,
    /// soonest first, restricted to what the actor may see.
    pub fn closing_soon(&self, actor: &Actor) -> Result<Vec<Loop>> {
        let loops = self.closing_soon_at(Utc::now().date_naive())?;
        Ok(loops
            .into_iter()
            .filter(|l| actor.can_access(l.creator_id))
            .collect())
    }

    pub(crate) fn closing_soon_at(&self, today: NaiveDate) -> Result<Vec<Loop>> {
        let until = today + Duration::days(i64::from(self.closing_soon_days));
        let rows = loop_repo::closing_between(&self.db, today, until)?;
        Ok(rows.into_iter().map(loop_from_row).collect())
    }

    /// Stores uploaded images and appends them to the manifest, or
    /// replaces the manifest (deleting the old blobs) when `replace` is set.
    pub fn add_images(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        id: i64,
        uploads: &[ImageUpload],
        replace: bool,
    ) -> Result<Loop> {
        let current = self.get(actor, id)?;
        if uploads.is_empty() {
            return Err(ValidationError::MissingField { field: "images" }.into());
        }
        check_uploads(uploads, &self.limits)?;

        let upload_date = Utc::now();
        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.images.put(&upload.bytes, &image_extension(upload)) {
                Ok(filename) => stored.push(ImageRecord {
                    filename,
                    original_name: upload.original_name.clone(),
                    size: upload.bytes.len() as u64,
                    mimetype: upload.mimetype.clone(),
                    upload_date,
                }),
                Err(e) => {
                    self.discard_images(&stored);
                    return Err(e.into());
                }
            }
        }

        let (manifest, replaced) = if replace {
            (stored.clone(), current.images.clone())
        } else {
            let mut manifest = current.images.clone();
            manifest.extend(stored.iter().cloned());
            (manifest, Vec::new())
        };

        let now = format_timestamp(upload_date);
        let written = encode_images(&manifest)
            .and_then(|encoded| loop_repo::set_images(&self.db, id, encoded.as_deref(), &now));
        match written {
            Ok(0) => {
                self.discard_images(&stored);
                return Err(LoopdeskError::not_found("Loop", id));
            }
            Ok(_) => {}
            Err(e) => {
                self.discard_images(&stored);
                return Err(e.into());
            }
        }
        self.discard_images(&replaced);

        let record = self.load(id)?;
        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::LoopImagesChanged {
                record: record.clone(),
                added: stored.len(),
                removed: replaced.len(),
            },
        ));
        Ok(record)
    }

    /// Removes one image from the manifest and deletes its blob. The
    /// manifest is stored as NULL once empty.
    pub fn remove_image(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        id: i64,
        filename: &str,
    ) -> Result<Loop> {
        let current = self.get(actor, id)?;
        let mut manifest = current.images;
        let position = manifest
            .iter()
            .position(|img| img.filename == filename)
            .ok_or_else(|| LoopdeskError::not_found("Image", filename))?;
        let removed = manifest.remove(position);

        let now = format_timestamp(Utc::now());
        let encoded = encode_images(&manifest)?;
        if loop_repo::set_images(&self.db, id, encoded.as_deref(), &now)? == 0 {
            return Err(LoopdeskError::not_found("Loop", id));
        }
        self.discard_images(std::slice::from_ref(&removed));

        let record = self.load(id)?;
        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::LoopImagesChanged {
                record: record.clone(),
                added: 0,
                removed: 1,
            },
        ));
        Ok(record)
    }

    /// Bytes of one image listed on the loop's manifest.
    pub fn image_bytes(&self, actor: &Actor, id: i64, filename: &str) -> Result<LoopImage> {
        let record = self.get(actor, id)?;
        let image = record
            .images
            .into_iter()
            .find(|img| img.filename == filename)
            .ok_or_else(|| LoopdeskError::not_found("Image", filename))?;

        if !self.images.exists(&image.filename) {
            return Err(LoopdeskError::not_found("Image file", filename));
        }
        let bytes = self.images.get(&image.filename)?;
        Ok(LoopImage {
            record: image,
            bytes,
        })
    }

    /// CSV of the loops the actor can see under `query`.
    pub fn export_csv(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        query: &LoopQuery,
    ) -> Result<String> {
        let loops = self.list(actor, query)?;
        let csv = export::csv::loops_to_csv(&loops);

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::DataExported {
                format: "csv",
                rows: loops.len(),
            },
        ));
        Ok(csv)
    }

    /// Two-column CSV of the dashboard counters.
    pub fn export_stats_csv(&self, actor: &Actor, ctx: &RequestContext) -> Result<String> {
        let stats = self.dashboard_stats()?;
        let csv = export::csv::stats_to_csv(&stats);

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::DataExported {
                format: "csv",
                rows: 1,
            },
        ));
        Ok(csv)
    }

    /// Single-loop PDF report with up to the configured number of images.
    pub fn export_pdf(&self, actor: &Actor, ctx: &RequestContext, id: i64) -> Result<Vec<u8>> {
        let record = self.get(actor, id)?;

        let images: Vec<export::pdf::ReportImage> = record
            .images
            .iter()
            .take(self.limits.pdf_export_max_images)
            .filter_map(|img| match self.images.get(&img.filename) {
                Ok(bytes) => Some(export::pdf::ReportImage {
                    name: img.original_name.clone(),
                    bytes,
                }),
                Err(e) => {
                    log::warn!("Skipping image {} in PDF export: {}", img.filename, e);
                    None
                }
            })
            .collect();

        let pdf = export::pdf::loop_report(&record, &images)?;

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::DataExported {
                format: "pdf",
                rows: 1,
            },
        ));
        Ok(pdf)
    }

    /// Best-effort blob cleanup.
    fn discard_images(&self, images: &[ImageRecord]) {
        for image in images {
            if let Err(e) = self.images.delete(&image.filename) {
                log::warn!("Failed to delete image {}: {}", image.filename, e);
            }
        }
    }
}
