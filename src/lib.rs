use std::sync::Arc;

use services::auth::SessionResolver;
use services::export::ExportService;

pub mod config;
pub mod modules;
pub mod services;
pub mod shutdown;

#[derive(Clone)]
pub struct AppState {
    pub export: ExportService,
    pub sessions: Arc<dyn SessionResolver>,
}
