//! Application state shared across routes

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::game::SyncScheduler;
use crate::matchmaking::Lobby;
use crate::store::{GameStore, MemoryStore, SupabaseClient, SupabaseStore};
use crate::ws::hub::ConnectionHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn GameStore>,
    pub hub: Arc<ConnectionHub>,
    pub scheduler: Arc<SyncScheduler>,
    pub lobby: Arc<Lobby>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let store: Arc<dyn GameStore> = match config.supabase() {
            Some((url, key)) => {
                info!(url = %url, "Using Supabase store");
                Arc::new(SupabaseStore::new(SupabaseClient::new(url, key)))
            }
            None => {
                warn!("SUPABASE_URL not set, ratings and match history stay in memory");
                Arc::new(MemoryStore::new())
            }
        };

        let hub = Arc::new(ConnectionHub::new());
        let scheduler = Arc::new(SyncScheduler::new(hub.clone()));
        let lobby = Arc::new(Lobby::new(
            scheduler.clone(),
            hub.clone(),
            store.clone(),
            config.game.clone(),
        ));

        Self {
            config,
            store,
            hub,
            scheduler,
            lobby,
        }
    }
}
