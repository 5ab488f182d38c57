use std::sync::Arc;

use crate::editing::EditOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Holds the text generator and edit policy; shared read-only across turns.
    pub orchestrator: Arc<EditOrchestrator>,
}
