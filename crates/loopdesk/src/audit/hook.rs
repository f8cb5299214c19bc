use std::sync::Arc;

use serde_json::json;

use super::{ActionType, AuditSink, NewActivity};
use crate::hooks::{CommitEvent, CommitKind, HookError, PostCommitHook};

/// Writes one activity entry per committed mutation.
pub struct AuditHook {
    sink: Arc<dyn AuditSink>,
}

impl AuditHook {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

impl PostCommitHook for AuditHook {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn after_commit(&self, event: &CommitEvent) -> Result<(), HookError> {
        self.sink.record(describe(event));
        Ok(())
    }
}

pub(crate) fn describe(event: &CommitEvent) -> NewActivity {
    let (action, description, data) = match &event.kind {
        CommitKind::LoopCreated { record } => (
            ActionType::LoopCreated,
            format!("Created loop #{} ({})", record.id, record.property_address),
            json!({ "loop_id": record.id, "type": record.loop_type }),
        ),
        CommitKind::LoopUpdated { record, changed } => (
            ActionType::LoopUpdated,
            format!("Updated loop #{} ({})", record.id, record.property_address),
            json!({ "loop_id": record.id, "changes": changed }),
        ),
        CommitKind::LoopImagesChanged {
            record,
            added,
            removed,
        } => (
            ActionType::LoopUpdated,
            format!("Updated images on loop #{}", record.id),
            json!({ "loop_id": record.id, "images_added": added, "images_removed": removed }),
        ),
        CommitKind::LoopDeleted {
            loop_id,
            property_address,
        } => (
            ActionType::LoopDeleted,
            format!("Deleted loop #{} ({})", loop_id, property_address),
            json!({ "loop_id": loop_id }),
        ),
        CommitKind::LoopArchived {
            loop_id,
            property_address,
        } => (
            ActionType::LoopArchived,
            format!("Archived loop #{} ({})", loop_id, property_address),
            json!({ "loop_id": loop_id }),
        ),
        CommitKind::LoopUnarchived {
            loop_id,
            property_address,
        } => (
            ActionType::LoopUnarchived,
            format!("Unarchived loop #{} ({})", loop_id, property_address),
            json!({ "loop_id": loop_id }),
        ),
        CommitKind::TemplateUploaded {
            template_id,
            name,
            file_name,
        } => (
            ActionType::TemplateUploaded,
            format!("Uploaded template: {}", name),
            json!({ "template_id": template_id, "file_name": file_name }),
        ),
        CommitKind::TemplateUpdated { template_id, name } => (
            ActionType::TemplateUpdated,
            format!("Updated template: {}", name),
            json!({ "template_id": template_id }),
        ),
        CommitKind::TemplateFieldsMapped {
            template_id,
            name,
            mapping_count,
        } => (
            ActionType::TemplateFieldsMapped,
            format!("Mapped {} fields for template: {}", mapping_count, name),
            json!({ "template_id": template_id, "mappings": mapping_count }),
        ),
        CommitKind::TemplateDeleted { template_id, name } => (
            ActionType::TemplateDeleted,
            format!("Deleted template: {}", name),
            json!({ "template_id": template_id }),
        ),
        CommitKind::DocumentGenerated {
            template_id,
            template_name,
            loop_id,
            file_name,
        } => (
            ActionType::DocumentGenerated,
            format!(
                "Generated document from template '{}' for loop #{}",
                template_name, loop_id
            ),
            json!({ "template_id": template_id, "loop_id": loop_id, "file_name": file_name }),
        ),
        CommitKind::DocumentDeleted { file_name } => (
            ActionType::DocumentDeleted,
            format!("Deleted generated document {}", file_name),
            json!({ "file_name": file_name }),
        ),
        CommitKind::DataExported { format, rows } => (
            ActionType::ExportData,
            format!("Exported {} loop(s) as {}", rows, format.to_uppercase()),
            json!({ "format": format, "rows": rows }),
        ),
        CommitKind::SettingsUpdated {
            notify_on_new_loops,
            notify_on_updated_loops,
        } => (
            ActionType::SettingsUpdated,
            "Updated notification preferences".to_string(),
            json!({
                "notify_on_new_loops": notify_on_new_loops,
                "notify_on_updated_loops": notify_on_updated_loops,
            }),
        ),
    };

    NewActivity::new(&event.actor, action, description)
        .with_context(&event.context)
        .with_data(data)
}
