use std::sync::Arc;

use anyhow::Result;
use calsync_core::store::{
    AppointmentStore, ConnectionStore, MemoryAppointmentStore, MemoryConnectionStore,
    MemoryCustomerDirectory,
};
use calsync_core::{Collaborators, Fetcher, SyncConfig, SyncEngine};

use crate::seed::SeedData;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub connections: Arc<dyn ConnectionStore>,
    pub appointments: Arc<dyn AppointmentStore>,
}

impl AppState {
    pub fn new(engine: SyncEngine, collaborators: &Collaborators) -> Self {
        AppState {
            engine: Arc::new(engine),
            connections: collaborators.connections.clone(),
            appointments: collaborators.appointments.clone(),
        }
    }

    /// In-memory stores filled from `seed`, fetching over HTTP.
    pub fn in_memory(seed: SeedData, config: &SyncConfig) -> Result<Self> {
        Self::in_memory_with(seed, Fetcher::http(config)?, config)
    }

    pub fn in_memory_with(seed: SeedData, fetcher: Fetcher, config: &SyncConfig) -> Result<Self> {
        let collaborators = Collaborators {
            connections: Arc::new(MemoryConnectionStore::new(seed.connections)),
            customers: Arc::new(MemoryCustomerDirectory::new(seed.customers)),
            appointments: Arc::new(MemoryAppointmentStore::new()),
        };
        let engine = SyncEngine::new(collaborators.clone(), fetcher, config)?;
        Ok(Self::new(engine, &collaborators))
    }
}
