//! Test harness for isolated test execution.
//!
//! Each `TestHarness` owns a temporary directory with its own upload
//! stores and an in-memory database, wired together exactly as the
//! server wires them.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use loopdesk::{
    Actor, Database, DocumentTemplate, FieldMappingInput, LogMailer, Loop, Loopdesk, Limits,
    NewLoop, RequestContext, Role, Stores, TemplateUpload,
};

pub struct TestHarness {
    temp_dir: TempDir,
    pub app: Loopdesk,
    pub templates_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let stores = Stores::under(root).expect("Failed to create stores");
        let db = Database::open_in_memory().expect("Failed to open database");
        let app = Loopdesk::new(db, stores, limits, 3, Arc::new(LogMailer))
            .expect("Failed to build services");

        Self {
            templates_dir: root.join("templates"),
            generated_dir: root.join("generated"),
            images_dir: root.join("images"),
            app,
            temp_dir,
        }
    }

    pub fn admin(&self) -> Actor {
        Actor::new(1, "Alice Admin", Role::Admin)
    }

    pub fn agent(&self, id: i64) -> Actor {
        Actor::new(id, format!("Agent {}", id), Role::Agent)
    }

    pub fn ctx(&self) -> RequestContext {
        RequestContext::new(Some("127.0.0.1".to_string()), Some("integration-tests".to_string()))
    }

    pub fn create_loop(&self, actor: &Actor, input: NewLoop) -> Loop {
        self.app
            .loops()
            .create(actor, &self.ctx(), &input)
            .expect("Failed to create loop")
    }

    /// Uploads a template as the admin and applies the given mappings.
    pub fn mapped_template(
        &self,
        upload: TemplateUpload,
        mappings: &[FieldMappingInput],
    ) -> DocumentTemplate {
        let admin = self.admin();
        let template = self
            .app
            .templates()
            .upload(&admin, &self.ctx(), &upload)
            .expect("Failed to upload template");
        if mappings.is_empty() {
            return template;
        }
        self.app
            .templates()
            .set_field_mappings(&admin, &self.ctx(), template.id, mappings)
            .expect("Failed to map template fields")
    }

    pub fn generated_bytes(&self, file_name: &str) -> Vec<u8> {
        std::fs::read(self.generated_dir.join(file_name)).expect("Generated file missing")
    }

    pub fn generated_count(&self) -> usize {
        std::fs::read_dir(&self.generated_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn template_path(&self, template: &DocumentTemplate) -> PathBuf {
        self.templates_dir.join(&template.stored_file)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
