use crate::ai::chat::SessionRegistry;
use crate::core::AppConfig;

pub struct AppState {
    pub config: AppConfig,
    // Every open chat socket has a session here
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(config: AppConfig, registry: SessionRegistry) -> Self {
        Self { config, registry }
    }
}
