//! Template store scenarios: upload, mapping, preview and deletion.

mod common;

use common::*;
use loopdesk::{LoopField, LoopdeskError, TemplateCategory, TemplateInfo, ValidationError};

#[test]
fn test_upload_map_and_list() {
    let h = TestHarness::new();
    let admin = h.admin();

    let listing = h.mapped_template(
        TemplateBuilder::pdf("Listing").category("listing").build(),
        &mappings(&[("client_name", "client_name", "text")]),
    );
    let contract = h.mapped_template(
        TemplateBuilder::text("Offer", "{{price}}")
            .description("Standard offer")
            .build(),
        &[],
    );

    assert!(listing.fields_mapped);
    assert_eq!(listing.field_mappings[0].loop_field, LoopField::ClientName);
    assert!(!contract.fields_mapped);
    assert_eq!(contract.description.as_deref(), Some("Standard offer"));

    let all = h.app.templates().list().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, contract.id, "newest first");

    let listings = h.app.templates().list_by_category("listing").unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].category, TemplateCategory::Listing);

    let stats = h.app.templates().stats().unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.mapped, 1);
    assert_eq!(stats.contracts, 1);
    assert_eq!(stats.listings, 1);

    let renamed = h
        .app
        .templates()
        .update_info(
            &admin,
            &h.ctx(),
            contract.id,
            &TemplateInfo {
                name: Some("Offer v2".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(renamed.name, "Offer v2");
    assert_eq!(renamed.description.as_deref(), Some("Standard offer"));
}

#[test]
fn test_duplicate_mapping_names_are_rejected() {
    let h = TestHarness::new();
    let template = h.mapped_template(TemplateBuilder::text("T", "x").build(), &[]);

    let err = h
        .app
        .templates()
        .set_field_mappings(
            &h.admin(),
            &h.ctx(),
            template.id,
            &mappings(&[("a", "notes", "text"), ("a", "tags", "text")]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        LoopdeskError::Validation(ValidationError::InvalidMapping { index: 1, .. })
    ));
    assert!(!h.app.templates().get(template.id).unwrap().fields_mapped);
}

#[test]
fn test_agents_cannot_manage_templates() {
    let h = TestHarness::new();
    let agent = h.agent(9);
    let err = h
        .app
        .templates()
        .upload(&agent, &h.ctx(), &TemplateBuilder::text("T", "x").build())
        .unwrap_err();
    assert!(matches!(err, LoopdeskError::PermissionDenied(_)));
}

#[test]
fn test_oversized_upload_is_rejected() {
    let mut limits = loopdesk::Limits::default();
    limits.max_template_bytes = 8;
    let h = TestHarness::with_limits(limits);

    let err = h
        .app
        .templates()
        .upload(&h.admin(), &h.ctx(), &TemplateBuilder::text("T", "more than eight bytes").build())
        .unwrap_err();
    assert!(matches!(
        err,
        LoopdeskError::Validation(ValidationError::FileTooLarge { limit: 8, .. })
    ));
    assert!(h.app.templates().list().unwrap().is_empty());
}

#[test]
fn test_preview_returns_original_file() {
    let h = TestHarness::new();
    let template = h.mapped_template(TemplateBuilder::text("T", "Dear {{client}}").build(), &[]);

    let file = h.app.templates().preview(template.id).unwrap();
    assert_eq!(file.file_name, "template.txt");
    assert_eq!(file.content_type, "text/plain");
    assert_eq!(file.bytes, b"Dear {{client}}");
}

#[test]
fn test_delete_survives_missing_file() {
    let h = TestHarness::new();
    let template = h.mapped_template(TemplateBuilder::text("T", "x").build(), &[]);
    std::fs::remove_file(h.template_path(&template)).unwrap();

    h.app
        .templates()
        .delete(&h.admin(), &h.ctx(), template.id)
        .unwrap();
    assert!(matches!(
        h.app.templates().get(template.id),
        Err(LoopdeskError::NotFound { .. })
    ));
}

#[test]
fn test_delete_removes_stored_file() {
    let h = TestHarness::new();
    let template = h.mapped_template(TemplateBuilder::text("T", "x").build(), &[]);
    let path = h.template_path(&template);
    assert!(path.exists());

    h.app
        .templates()
        .delete(&h.admin(), &h.ctx(), template.id)
        .unwrap();
    assert!(!path.exists());
}
