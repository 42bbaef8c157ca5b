use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::gateway::GatewayState;
use crate::services::{ChatService, MessageService};

/// Everything the HTTP handlers and the gateway share: both entry points
/// persist through the same services and fan out through the same rooms.
pub struct AppState {
    pub config: Config,
    pub gateway: Arc<GatewayState>,
    pub chats: ChatService,
    pub messages: MessageService,
}

impl AppState {
    pub fn new(config: Config, db: Arc<Database>) -> Self {
        Self {
            config,
            gateway: Arc::new(GatewayState::new()),
            chats: ChatService::new(db.clone()),
            messages: MessageService::new(db),
        }
    }
}
