use crate::{config::AppConfig, storage::GraphStore, warehouse::Warehouse};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: GraphStore,
    pub warehouse: Arc<dyn Warehouse>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: GraphStore, warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            config,
            store,
            warehouse,
        }
    }
}
