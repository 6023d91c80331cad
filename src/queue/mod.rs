//! Walk-in queue engine.
//!
//! Owns the customer-visit state machine, per-branch ordering, queue
//! positions and wait estimates. Storage and time come from injected
//! collaborators; authentication happens before a call gets here and
//! arrives as an [`ActorScope`].

pub mod clock;
pub mod error;
pub mod order;
pub mod scope;
pub mod store;
pub mod visit;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

pub use self::clock::{Clock, SystemClock};
pub use self::error::{PersistenceError, QueueError, QueueStateError};
pub use self::order::{WaitEstimate, WaitPolicy};
pub use self::scope::ActorScope;
pub use self::store::QueueStore;

use self::visit::{EnqueueParams, LedgerChange};
use crate::models::{new_id, Barber, Branch, Customer, NewCustomer, Visit, VisitStatus};

const MAX_NAME_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 20;

/// Who is being queued: a known customer or identity fields for a walk-in.
#[derive(Debug, Clone)]
pub enum CustomerRef {
    Existing(i64),
    New(NewCustomer),
}

#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub customer: CustomerRef,
    pub service_id: i64,
    pub branch: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitingEntry {
    pub customer: Customer,
    pub position: usize,
    pub estimate: WaitEstimate,
}

/// Everything a display board needs for one branch, read in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub branch: Option<Branch>,
    pub waiting: Vec<WaitingEntry>,
    pub assigned: Vec<Customer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchSummary {
    pub branch: String,
    pub waiting: usize,
    pub assigned: usize,
    pub completed_today: i64,
}

#[derive(Clone)]
pub struct QueueEngine {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    policy: WaitPolicy,
}

impl QueueEngine {
    pub fn new(store: Arc<dyn QueueStore>, clock: Arc<dyn Clock>, policy: WaitPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Creates a customer identity, or returns the one already holding the
    /// phone number. A visit at a branch the actor may not act on is
    /// stripped from the returned value.
    pub async fn register(
        &self,
        new: NewCustomer,
        scope: &ActorScope,
    ) -> Result<Customer, QueueError> {
        let new = validate_identity(new)?;
        if let Some(existing) = self.store.customer_by_phone(&new.phone).await? {
            return Ok(identity_for(existing, scope));
        }
        let customer = self.store.insert_customer(&new).await?;
        log::info!("Registered customer {} ({})", customer.id, customer.name);
        Ok(customer)
    }

    pub async fn enqueue(
        &self,
        request: EnqueueRequest,
        scope: &ActorScope,
    ) -> Result<Customer, QueueError> {
        let branch_code = request.branch.trim();
        if branch_code.is_empty() {
            return Err(QueueError::Validation("branch is required".to_string()));
        }
        let customer_ref = match request.customer {
            CustomerRef::New(new) => CustomerRef::New(validate_identity(new)?),
            existing => existing,
        };
        if !scope.may_act_on(branch_code) {
            return Err(QueueError::Authorization("cannot manage this branch's queue"));
        }

        let branch = self
            .store
            .branch(branch_code)
            .await?
            .ok_or_else(|| QueueError::not_found("branch", branch_code))?;
        if !branch.active {
            return Err(refused("enqueue", QueueStateError::BranchInactive(branch.code)));
        }
        let service = self
            .store
            .service(request.service_id)
            .await?
            .ok_or_else(|| QueueError::not_found("service", request.service_id))?;
        if !service.active {
            return Err(refused("enqueue", QueueStateError::ServiceInactive(service.id)));
        }

        let customer = match customer_ref {
            CustomerRef::Existing(id) => self.load(id).await?,
            CustomerRef::New(new) => match self.store.customer_by_phone(&new.phone).await? {
                Some(known) => known,
                None => {
                    let created = self.store.insert_customer(&new).await?;
                    log::info!("Registered customer {} ({})", created.id, created.name);
                    created
                }
            },
        };
        if customer.status.is_active() {
            return Err(refused(
                "enqueue",
                visible_to(already_queued(&customer), scope),
            ));
        }

        let params = EnqueueParams {
            service_id: service.id,
            branch: &branch.code,
            notes: clean_notes(request.notes),
            visit_id: new_id(),
        };
        let next = visit::begin(&customer, params, self.clock.now())
            .map_err(|err| refused("enqueue", visible_to(err, scope)))?;
        let stored = self.commit(&customer, next, LedgerChange::Open).await?;
        log::info!(
            "Customer {} queued at {} for {}",
            stored.id,
            branch.code,
            service.name
        );
        Ok(stored)
    }

    pub async fn assign(
        &self,
        customer_id: i64,
        barber_id: i64,
        scope: &ActorScope,
    ) -> Result<Customer, QueueError> {
        let customer = self.load(customer_id).await?;
        authorize_queue_work(&customer, scope)?;
        let next = visit::assign(&customer, barber_id, self.clock.now())
            .map_err(|err| refused("assign", err))?;

        let barber = self
            .store
            .barber(barber_id)
            .await?
            .ok_or_else(|| QueueError::not_found("barber", barber_id))?;
        if customer.branch.as_deref() != Some(barber.branch.as_str()) {
            return Err(refused(
                "assign",
                QueueStateError::BarberNotInBranch { barber: barber.id },
            ));
        }
        if !barber.active {
            return Err(refused("assign", QueueStateError::BarberInactive(barber.id)));
        }

        let stored = self
            .commit(&customer, next, LedgerChange::SetBarber(Some(barber.id)))
            .await?;
        log::info!("Customer {} assigned to barber {}", stored.id, barber.name);
        Ok(stored)
    }

    pub async fn complete(
        &self,
        customer_id: i64,
        scope: &ActorScope,
    ) -> Result<Customer, QueueError> {
        let customer = self.load(customer_id).await?;
        authorize_queue_work(&customer, scope)?;
        let now = self.clock.now();
        let next = visit::complete(&customer, now).map_err(|err| refused("complete", err))?;

        let price = match customer.service_id {
            Some(service_id) => self
                .store
                .service(service_id)
                .await?
                .and_then(|service| service.price),
            None => None,
        };
        let ledger = LedgerChange::Close {
            completed_at: now,
            price,
        };
        let stored = self.commit(&customer, next, ledger).await?;
        log::info!("Customer {} completed their visit", stored.id);
        Ok(stored)
    }

    pub async fn cancel(
        &self,
        customer_id: i64,
        scope: &ActorScope,
    ) -> Result<Customer, QueueError> {
        let customer = self.load(customer_id).await?;
        authorize_queue_work(&customer, scope)?;
        let next = visit::cancel(&customer).map_err(|err| refused("cancel", err))?;
        let stored = self
            .commit(&customer, next, LedgerChange::SetBarber(None))
            .await?;
        log::info!("Customer {} returned to the waiting queue", stored.id);
        Ok(stored)
    }

    pub async fn remove(&self, customer_id: i64, scope: &ActorScope) -> Result<(), QueueError> {
        let customer = self.load(customer_id).await?;
        authorize_queue_work(&customer, scope)?;
        let next = visit::remove(&customer).map_err(|err| refused("remove", err))?;
        let ledger = match customer.visit_id.clone() {
            Some(visit_id) => LedgerChange::Withdraw {
                visit_id,
                removed_at: self.clock.now(),
            },
            None => LedgerChange::Keep,
        };
        self.commit(&customer, next, ledger).await?;
        log::info!("Customer {} removed from the queue", customer.id);
        Ok(())
    }

    pub async fn list_waiting(&self, branch: &str) -> Result<Vec<Customer>, QueueError> {
        let mut waiting = self.store.customers_at(branch, VisitStatus::Waiting).await?;
        order::sort_waiting(&mut waiting);
        Ok(waiting)
    }

    pub async fn list_assigned(&self, branch: &str) -> Result<Vec<Customer>, QueueError> {
        let mut assigned = self
            .store
            .customers_at(branch, VisitStatus::Assigned)
            .await?;
        order::sort_assigned(&mut assigned);
        Ok(assigned)
    }

    /// 1-based place in the waiting queue, `None` unless waiting.
    pub async fn position_of(&self, customer_id: i64) -> Result<Option<usize>, QueueError> {
        let customer = self.load(customer_id).await?;
        let Some(branch) = waiting_branch(&customer) else {
            return Ok(None);
        };
        let waiting = self.list_waiting(branch).await?;
        Ok(order::position_in(&waiting, customer.id))
    }

    /// Minutes of service ahead of a waiting customer, `None` otherwise.
    pub async fn estimate_wait(
        &self,
        customer_id: i64,
    ) -> Result<Option<WaitEstimate>, QueueError> {
        let customer = self.load(customer_id).await?;
        let Some(branch) = waiting_branch(&customer) else {
            return Ok(None);
        };
        let waiting = self.list_waiting(branch).await?;
        let durations = order::durations(&self.store.services().await?);
        let minutes = order::minutes_ahead(&waiting, &customer, &durations);
        Ok(Some(self.policy.estimate(minutes)))
    }

    pub async fn snapshot(&self, branch: &str) -> Result<QueueSnapshot, QueueError> {
        let info = self.store.branch(branch).await?;
        let waiting = self.list_waiting(branch).await?;
        let assigned = self.list_assigned(branch).await?;
        let durations = order::durations(&self.store.services().await?);

        let mut ahead = 0;
        let mut entries = Vec::with_capacity(waiting.len());
        for (index, customer) in waiting.into_iter().enumerate() {
            let minutes = order::service_minutes(&customer, &durations);
            entries.push(WaitingEntry {
                position: index + 1,
                estimate: self.policy.estimate(ahead),
                customer,
            });
            ahead = ahead.saturating_add(minutes);
        }

        Ok(QueueSnapshot {
            branch: info,
            waiting: entries,
            assigned,
        })
    }

    pub async fn branch_summary(
        &self,
        branch: &str,
        scope: &ActorScope,
    ) -> Result<BranchSummary, QueueError> {
        if !scope.may_act_on(branch) {
            return Err(QueueError::Authorization("cannot view this branch"));
        }
        let waiting = self.store.customers_at(branch, VisitStatus::Waiting).await?;
        let assigned = self.store.customers_at(branch, VisitStatus::Assigned).await?;
        let completed_today = self
            .store
            .count_completed_since(branch, start_of_day(self.clock.now()))
            .await?;
        Ok(BranchSummary {
            branch: branch.to_string(),
            waiting: waiting.len(),
            assigned: assigned.len(),
            completed_today,
        })
    }

    /// Ledger rows for a customer, limited to branches the actor may act on.
    pub async fn history(
        &self,
        customer_id: i64,
        scope: &ActorScope,
    ) -> Result<Vec<Visit>, QueueError> {
        self.load(customer_id).await?;
        let mut visits = self.store.visits_for(customer_id).await?;
        visits.retain(|visit| scope.may_act_on(&visit.branch));
        visits.sort_by(|a, b| (a.enqueued_at, &a.id).cmp(&(b.enqueued_at, &b.id)));
        Ok(visits)
    }

    pub async fn delete_barber(
        &self,
        barber_id: i64,
        scope: &ActorScope,
    ) -> Result<Barber, QueueError> {
        let barber = self
            .store
            .barber(barber_id)
            .await?
            .ok_or_else(|| QueueError::not_found("barber", barber_id))?;
        if !scope.may_administer(&barber.branch) {
            return Err(QueueError::Authorization("cannot manage this branch's barbers"));
        }

        let busy = self.store.count_assigned_to(barber.id).await?;
        if busy > 0 || !self.store.delete_barber_if_idle(barber.id).await? {
            let customers = self.store.count_assigned_to(barber.id).await?.max(1);
            return Err(refused(
                "delete barber",
                QueueStateError::BarberBusy {
                    barber: barber.id,
                    customers,
                },
            ));
        }
        log::info!("Barber {} ({}) deleted", barber.id, barber.name);
        Ok(barber)
    }

    /// Deletes the customer identity. Ledger rows stay behind.
    pub async fn purge_customer(
        &self,
        customer_id: i64,
        scope: &ActorScope,
    ) -> Result<(), QueueError> {
        let customer = self.load(customer_id).await?;
        let allowed = match customer.branch.as_deref() {
            Some(branch) => scope.may_administer(branch),
            None => scope.is_master(),
        };
        if !allowed {
            return Err(QueueError::Authorization("cannot delete this customer"));
        }
        if customer.status.is_active() {
            return Err(refused("purge", QueueStateError::ActiveVisit));
        }
        if !self.store.delete_customer(customer.id).await? {
            return Err(QueueError::not_found("customer", customer.id));
        }
        log::info!("Customer {} purged", customer.id);
        Ok(())
    }

    async fn load(&self, customer_id: i64) -> Result<Customer, QueueError> {
        self.store
            .customer(customer_id)
            .await?
            .ok_or_else(|| QueueError::not_found("customer", customer_id))
    }

    async fn commit(
        &self,
        before: &Customer,
        next: Customer,
        ledger: LedgerChange,
    ) -> Result<Customer, QueueError> {
        self.store
            .commit(before.version, &next, &ledger)
            .await
            .map_err(|err| {
                log::warn!("Customer {} write failed: {err}", before.id);
                QueueError::Persistence(err)
            })
    }
}

fn validate_identity(new: NewCustomer) -> Result<NewCustomer, QueueError> {
    let name = new.name.trim().to_string();
    let phone = new.phone.trim().to_string();
    if name.is_empty() {
        return Err(QueueError::Validation("name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(QueueError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if phone.is_empty() {
        return Err(QueueError::Validation("phone is required".to_string()));
    }
    if phone.chars().count() > MAX_PHONE_LEN {
        return Err(QueueError::Validation(format!(
            "phone must be at most {MAX_PHONE_LEN} characters"
        )));
    }
    Ok(NewCustomer {
        name,
        phone,
        email: clean_notes(new.email),
        address: clean_notes(new.address),
        photo: clean_notes(new.photo),
    })
}

fn clean_notes(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn authorize_queue_work(customer: &Customer, scope: &ActorScope) -> Result<(), QueueError> {
    match customer.branch.as_deref() {
        Some(branch) if !scope.may_act_on(branch) => {
            Err(QueueError::Authorization("customer is not in your branch"))
        }
        _ => Ok(()),
    }
}

fn waiting_branch(customer: &Customer) -> Option<&str> {
    if customer.status == VisitStatus::Waiting {
        customer.branch.as_deref()
    } else {
        None
    }
}

fn already_queued(customer: &Customer) -> QueueStateError {
    QueueStateError::AlreadyQueued {
        branch: customer.branch.clone(),
    }
}

/// Drops current-visit details recorded at a branch the actor may not see.
fn identity_for(customer: Customer, scope: &ActorScope) -> Customer {
    let foreign = customer
        .branch
        .as_deref()
        .is_some_and(|branch| !scope.may_act_on(branch));
    if !foreign {
        return customer;
    }
    Customer {
        service_id: None,
        barber_id: None,
        branch: None,
        enqueued_at: None,
        assigned_at: None,
        completed_at: None,
        notes: None,
        visit_id: None,
        ..customer
    }
}

/// Hides the other branch from actors who may not see it.
fn visible_to(err: QueueStateError, scope: &ActorScope) -> QueueStateError {
    match err {
        QueueStateError::AlreadyQueued {
            branch: Some(branch),
        } if !scope.may_act_on(&branch) => QueueStateError::AlreadyQueued { branch: None },
        other => other,
    }
}

fn refused(operation: &str, err: QueueStateError) -> QueueError {
    log::debug!("{operation} refused: {err}");
    QueueError::State(err)
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(now)
}
