//! Upserting drafts into the appointment store.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::appointment::{AppointmentChanges, AppointmentDraft, NewAppointment};
use crate::error::{PersistError, StoreError};
use crate::store::AppointmentStore;

/// What happened to one draft.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Imported,
    Updated,
    Failed(PersistError),
}

/// Counts for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub imported_count: u32,
    pub updated_count: u32,
    pub skipped_count: u32,
    pub errors: Vec<String>,
}

impl ReconcileReport {
    /// Fold one item outcome into the report.
    pub fn tally(mut self, outcome: ItemOutcome) -> Self {
        match outcome {
            ItemOutcome::Imported => self.imported_count += 1,
            ItemOutcome::Updated => self.updated_count += 1,
            ItemOutcome::Failed(e) => self.errors.push(e.to_string()),
        }
        self
    }

    pub fn from_outcomes(outcomes: impl IntoIterator<Item = ItemOutcome>) -> Self {
        outcomes
            .into_iter()
            .fold(ReconcileReport::default(), ReconcileReport::tally)
    }
}

/// What an update does with the draft's customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerUpdate {
    /// Write the draft's match, including no match.
    Overwrite,
    /// Matching did not run; keep whatever customer the row has.
    Keep,
}

/// Upserts drafts keyed by (external id, connection id).
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn AppointmentStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Reconciler { store }
    }

    /// Write every draft, one at a time. A failing draft is recorded and the
    /// rest still go through.
    pub async fn reconcile(&self, drafts: Vec<AppointmentDraft>, provider_id: &str) -> ReconcileReport {
        self.reconcile_with(drafts, provider_id, CustomerUpdate::Overwrite)
            .await
    }

    pub async fn reconcile_with(
        &self,
        drafts: Vec<AppointmentDraft>,
        provider_id: &str,
        customers: CustomerUpdate,
    ) -> ReconcileReport {
        let mut outcomes = Vec::with_capacity(drafts.len());
        for draft in drafts {
            outcomes.push(self.upsert(draft, provider_id, customers).await);
        }
        ReconcileReport::from_outcomes(outcomes)
    }

    /// Insert or update a single draft.
    pub async fn upsert(
        &self,
        draft: AppointmentDraft,
        provider_id: &str,
        customers: CustomerUpdate,
    ) -> ItemOutcome {
        let external_id = draft.external_id.clone();

        match self.write(draft, provider_id, customers).await {
            Ok(outcome) => {
                debug!(uid = %external_id, ?outcome, "reconciled event");
                outcome
            }
            Err(source) => {
                warn!(uid = %external_id, error = %source, "failed to persist event");
                ItemOutcome::Failed(PersistError {
                    external_id,
                    source,
                })
            }
        }
    }

    async fn write(
        &self,
        draft: AppointmentDraft,
        provider_id: &str,
        customers: CustomerUpdate,
    ) -> Result<ItemOutcome, StoreError> {
        let existing = self
            .store
            .find_by_external_id(&draft.external_id, &draft.connection_id)
            .await?;

        match existing {
            Some(appointment) => {
                let changes = match customers {
                    CustomerUpdate::Overwrite => AppointmentChanges::from(&draft),
                    CustomerUpdate::Keep => AppointmentChanges::from(&draft).keeping_customer(),
                };
                self.store.update(&appointment.id, changes).await?;
                Ok(ItemOutcome::Updated)
            }
            None => {
                self.store
                    .insert(NewAppointment::imported(draft, provider_id))
                    .await?;
                Ok(ItemOutcome::Imported)
            }
        }
    }
}
