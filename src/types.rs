use std::sync::Arc;

use crate::config::Config;
use crate::ingest::Harvester;
use crate::resolve::Resolver;
use crate::storage::SnapshotStore;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<SnapshotStore>,
    pub resolver: Resolver,
    pub harvester: Arc<Harvester>,
}
