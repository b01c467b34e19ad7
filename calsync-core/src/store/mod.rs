//! Collaborator stores the sync engine reads from and writes to.
//!
//! The application owns the real stores; the engine only sees these traits.
//! [`memory`] provides in-process implementations.

pub mod memory;

use async_trait::async_trait;

use crate::appointment::{Appointment, AppointmentChanges, NewAppointment};
use crate::connection::{CalendarConnection, SyncRecord};
use crate::error::StoreError;
use crate::matcher::Customer;

pub use memory::{MemoryAppointmentStore, MemoryConnectionStore, MemoryCustomerDirectory};

/// Read/write access to appointments.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// The appointment previously imported for this feed entry, if any.
    async fn find_by_external_id(
        &self,
        external_id: &str,
        connection_id: &str,
    ) -> Result<Option<Appointment>, StoreError>;

    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, StoreError>;

    async fn update(&self, id: &str, changes: AppointmentChanges) -> Result<Appointment, StoreError>;

    async fn list_for_connection(&self, connection_id: &str) -> Result<Vec<Appointment>, StoreError>;
}

/// Read-only access to a provider's customers.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customers_for_owner(&self, owner_id: &str) -> Result<Vec<Customer>, StoreError>;
}

/// Access to calendar connections.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<CalendarConnection>, StoreError>;

    /// Write a run's outcome onto the connection.
    async fn record_sync(&self, id: &str, record: &SyncRecord) -> Result<(), StoreError>;
}
