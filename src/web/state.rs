use crate::db::MessageStore;
use crate::web::client_ip::ClientIpResolver;
use std::sync::Arc;

/// Application state for web handlers
#[derive(Clone, Debug)]
pub struct AppState {
    pub store: MessageStore,
    pub client_ip: Arc<ClientIpResolver>,
}

impl AppState {
    pub fn new(store: MessageStore, client_ip: ClientIpResolver) -> Self {
        Self {
            store,
            client_ip: Arc::new(client_ip),
        }
    }
}
