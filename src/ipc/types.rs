use std::path::PathBuf;

use serde::Deserialize;

use crate::backend::Backend;
use crate::cache::QueryCache;
use crate::config::Config;
use crate::keys::EntityId;
use crate::modal::{ModalStack, PageSurface};
use crate::registration::Wizards;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub backend: Option<Box<dyn Backend>>,
    pub cache: QueryCache,
    pub modals: ModalStack<PageSurface>,
    pub wizards: Wizards,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        AppState {
            cache: QueryCache::new(config.cache_stale, config.cache_gc),
            modals: ModalStack::new(PageSurface::default(), config.modal_settle),
            wizards: Wizards::new(config.wizard_idle),
            config,
            workspace: None,
            backend: None,
        }
    }

    /// Swaps the backend. Cached data from the previous one is meaningless now.
    pub fn set_backend(&mut self, backend: Box<dyn Backend>) {
        self.backend = Some(backend);
        self.cache.clear();
    }

    pub fn institution(&self, params: &serde_json::Value) -> EntityId {
        params
            .get("institutionId")
            .and_then(EntityId::from_json)
            .unwrap_or(self.config.institution)
    }
}
