//! Post-commit hooks.
//!
//! Services describe each committed mutation as a [`CommitEvent`] and hand
//! it to a [`HookRunner`]. Hooks run after the write is durable; a failing
//! or panicking hook is logged and never affects the caller or the other
//! hooks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::actor::{Actor, RequestContext};
use crate::loops::Loop;

#[derive(Error, Debug)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

/// What was committed.
#[derive(Debug, Clone)]
pub enum CommitKind {
    LoopCreated {
        record: Loop,
    },
    LoopUpdated {
        record: Loop,
        changed: Vec<&'static str>,
    },
    LoopDeleted {
        loop_id: i64,
        property_address: String,
    },
    LoopArchived {
        loop_id: i64,
        property_address: String,
    },
    LoopUnarchived {
        loop_id: i64,
        property_address: String,
    },
    LoopImagesChanged {
        record: Loop,
        added: usize,
        removed: usize,
    },
    TemplateUploaded {
        template_id: i64,
        name: String,
        file_name: String,
    },
    TemplateUpdated {
        template_id: i64,
        name: String,
    },
    TemplateFieldsMapped {
        template_id: i64,
        name: String,
        mapping_count: usize,
    },
    TemplateDeleted {
        template_id: i64,
        name: String,
    },
    DocumentGenerated {
        template_id: i64,
        template_name: String,
        loop_id: i64,
        file_name: String,
    },
    DocumentDeleted {
        file_name: String,
    },
    DataExported {
        format: &'static str,
        rows: usize,
    },
    SettingsUpdated {
        notify_on_new_loops: bool,
        notify_on_updated_loops: bool,
    },
}

#[derive(Debug, Clone)]
pub struct CommitEvent {
    pub actor: Actor,
    pub context: RequestContext,
    pub kind: CommitKind,
}

impl CommitEvent {
    pub fn new(actor: &Actor, context: &RequestContext, kind: CommitKind) -> Self {
        Self {
            actor: actor.clone(),
            context: context.clone(),
            kind,
        }
    }
}

pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn after_commit(&self, event: &CommitEvent) -> Result<(), HookError>;
}

#[derive(Clone, Default)]
pub struct HookRunner {
    hooks: Vec<Arc<dyn PostCommitHook>>,
}

impl HookRunner {
    pub fn new(hooks: Vec<Arc<dyn PostCommitHook>>) -> Self {
        Self { hooks }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn run(&self, event: CommitEvent) {
        for hook in &self.hooks {
            match catch_unwind(AssertUnwindSafe(|| hook.after_commit(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Post-commit hook '{}' failed: {}", hook.name(), e),
                Err(_) => log::error!("Post-commit hook '{}' panicked", hook.name()),
            }
        }
    }
}
