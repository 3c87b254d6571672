use crate::config::settings::AppConfig;
use crate::infrastructure::redis::client::TokenBlocklist;
use crate::modules::media::repository::StatusStore;
use crate::workers::encoding_queue::EncodingQueue;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub status: Arc<dyn StatusStore>,
    pub queue: EncodingQueue,
    pub blocklist: Arc<dyn TokenBlocklist>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        status: Arc<dyn StatusStore>,
        queue: EncodingQueue,
        blocklist: Arc<dyn TokenBlocklist>,
    ) -> Self {
        Self {
            config,
            status,
            queue,
            blocklist,
        }
    }
}
