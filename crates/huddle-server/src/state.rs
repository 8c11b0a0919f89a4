use std::sync::Arc;

use huddle_db::sea_orm::DatabaseConnection;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub hub: crate::hub::Hub,
    pub cache: Arc<dyn crate::cache::Cache>,
    pub jobs: Arc<dyn crate::jobs::JobQueue>,
}
