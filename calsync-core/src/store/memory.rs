//! In-memory stores.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::appointment::{Appointment, AppointmentChanges, NewAppointment};
use crate::connection::{CalendarConnection, SyncRecord};
use crate::error::StoreError;
use crate::matcher::Customer;
use crate::store::{AppointmentStore, ConnectionStore, CustomerDirectory};

/// Appointments kept in insertion order.
#[derive(Default)]
pub struct MemoryAppointmentStore {
    rows: RwLock<Vec<Appointment>>,
}

impl MemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Appointment> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl AppointmentStore for MemoryAppointmentStore {
    async fn find_by_external_id(
        &self,
        external_id: &str,
        connection_id: &str,
    ) -> Result<Option<Appointment>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|a| {
                a.external_id.as_deref() == Some(external_id)
                    && a.connection_id.as_deref() == Some(connection_id)
            })
            .cloned())
    }

    async fn insert(&self, appointment: NewAppointment) -> Result<Appointment, StoreError> {
        let mut rows = self.rows.write().await;
        let draft = appointment.draft;

        let duplicate = rows.iter().any(|a| {
            a.external_id.as_deref() == Some(draft.external_id.as_str())
                && a.connection_id.as_deref() == Some(draft.connection_id.as_str())
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "appointment for '{}' on connection '{}' already exists",
                draft.external_id, draft.connection_id
            )));
        }

        let now = Utc::now();
        let row = Appointment {
            id: Uuid::new_v4().to_string(),
            provider_id: appointment.provider_id,
            customer_id: draft.customer_id,
            booking_date: draft.booking_date,
            booking_time: draft.booking_time,
            duration_minutes: draft.duration_minutes,
            notes: draft.notes,
            status: appointment.status,
            source: draft.source,
            external_id: Some(draft.external_id),
            connection_id: Some(draft.connection_id),
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, id: &str, changes: AppointmentChanges) -> Result<Appointment, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("appointment {id}")))?;
        row.apply(changes, Utc::now());
        Ok(row.clone())
    }

    async fn list_for_connection(&self, connection_id: &str) -> Result<Vec<Appointment>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|a| a.connection_id.as_deref() == Some(connection_id))
            .cloned()
            .collect())
    }
}

/// Customers in the order they were added.
#[derive(Default)]
pub struct MemoryCustomerDirectory {
    customers: RwLock<Vec<Customer>>,
}

impl MemoryCustomerDirectory {
    pub fn new(customers: Vec<Customer>) -> Self {
        MemoryCustomerDirectory {
            customers: RwLock::new(customers),
        }
    }
}

#[async_trait]
impl CustomerDirectory for MemoryCustomerDirectory {
    async fn customers_for_owner(&self, owner_id: &str) -> Result<Vec<Customer>, StoreError> {
        let customers = self.customers.read().await;
        Ok(customers
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryConnectionStore {
    connections: RwLock<HashMap<String, CalendarConnection>>,
}

impl MemoryConnectionStore {
    pub fn new(connections: Vec<CalendarConnection>) -> Self {
        MemoryConnectionStore {
            connections: RwLock::new(connections.into_iter().map(|c| (c.id.clone(), c)).collect()),
        }
    }

    pub async fn upsert(&self, connection: CalendarConnection) {
        self.connections
            .write()
            .await
            .insert(connection.id.clone(), connection);
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn get(&self, id: &str) -> Result<Option<CalendarConnection>, StoreError> {
        Ok(self.connections.read().await.get(id).cloned())
    }

    async fn record_sync(&self, id: &str, record: &SyncRecord) -> Result<(), StoreError> {
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("connection {id}")))?;
        connection.apply_sync(record);
        Ok(())
    }
}
