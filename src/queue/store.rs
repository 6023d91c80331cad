use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::PersistenceError;
use super::visit::LedgerChange;
use crate::models::{Barber, Branch, Customer, NewCustomer, Service, Visit, VisitStatus};

/// Persistence collaborator for the queue engine.
///
/// Implementations own storage and transactions; the engine owns the rules.
/// `commit` must apply the customer row and the ledger change atomically and
/// refuse with [`PersistenceError::Conflict`] when the stored row version is
/// no longer `expected_version`.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn customer(&self, id: i64) -> Result<Option<Customer>, PersistenceError>;

    async fn customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, PersistenceError>;

    async fn insert_customer(&self, new: &NewCustomer) -> Result<Customer, PersistenceError>;

    async fn service(&self, id: i64) -> Result<Option<Service>, PersistenceError>;

    async fn services(&self) -> Result<Vec<Service>, PersistenceError>;

    async fn barber(&self, id: i64) -> Result<Option<Barber>, PersistenceError>;

    async fn branch(&self, code: &str) -> Result<Option<Branch>, PersistenceError>;

    /// Customers at `branch` in `status`, ordered by the status' timestamp
    /// then id.
    async fn customers_at(
        &self,
        branch: &str,
        status: VisitStatus,
    ) -> Result<Vec<Customer>, PersistenceError>;

    async fn count_assigned_to(&self, barber_id: i64) -> Result<i64, PersistenceError>;

    async fn count_completed_since(
        &self,
        branch: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, PersistenceError>;

    async fn visits_for(&self, customer_id: i64) -> Result<Vec<Visit>, PersistenceError>;

    async fn commit(
        &self,
        expected_version: i64,
        next: &Customer,
        ledger: &LedgerChange,
    ) -> Result<Customer, PersistenceError>;

    /// Deletes the barber unless someone is assigned to them. Returns
    /// whether a row was deleted.
    async fn delete_barber_if_idle(&self, barber_id: i64) -> Result<bool, PersistenceError>;

    async fn delete_customer(&self, id: i64) -> Result<bool, PersistenceError>;
}

/// Builds the ledger row opened by an enqueue.
pub fn opened_visit(customer: &Customer) -> Result<Visit, PersistenceError> {
    let (Some(id), Some(branch), Some(enqueued_at)) = (
        customer.visit_id.clone(),
        customer.branch.clone(),
        customer.enqueued_at,
    ) else {
        return Err(PersistenceError::Corrupt(format!(
            "customer {} has no open visit to record",
            customer.id
        )));
    };
    Ok(Visit {
        id,
        customer_id: Some(customer.id),
        service_id: customer.service_id,
        barber_id: None,
        branch,
        enqueued_at,
        completed_at: None,
        removed_at: None,
        price: None,
        notes: customer.notes.clone(),
    })
}

#[cfg(test)]
pub use memory::MemoryStore;
