use std::sync::Arc;

use loopdesk::Loopdesk;

use crate::auth::jwt::JwtKeys;

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub app: Loopdesk,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(app: Loopdesk, jwt: JwtKeys) -> Self {
        Self {
            app,
            jwt: Arc::new(jwt),
        }
    }
}
