//! 应用共享状态

use pathodx_classifier::{Classifier, PathologyCatalog};
use pathodx_database::DatabasePool;
use pathodx_report::ReportRenderer;
use pathodx_storage::{StorageLayout, UploadStore};
use std::sync::Arc;

use crate::auth::{AuthConfig, AuthService};

/// 所有处理器共享的状态
pub struct AppState {
    pub db: DatabasePool,
    pub auth: AuthService,
    pub layout: StorageLayout,
    pub uploads: UploadStore,
    pub classifier: Arc<dyn Classifier>,
    pub renderer: ReportRenderer,
    pub catalog: PathologyCatalog,
}

impl AppState {
    pub fn new(
        db: DatabasePool,
        auth: AuthConfig,
        layout: StorageLayout,
        max_upload_bytes: usize,
        classifier: Arc<dyn Classifier>,
        renderer: ReportRenderer,
    ) -> Self {
        let uploads = UploadStore::new(layout.upload_dir(), max_upload_bytes);
        Self {
            auth: AuthService::new(db.clone(), auth),
            db,
            layout,
            uploads,
            classifier,
            renderer,
            catalog: PathologyCatalog::new(),
        }
    }
}
