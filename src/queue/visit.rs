//! Customer-visit state machine.
//!
//! Each function takes the current customer value and returns the next one,
//! or the guard that refused. Nothing here touches storage; the engine
//! commits the returned value together with the matching [`LedgerChange`].

use chrono::{DateTime, Utc};

use super::error::QueueStateError;
use crate::models::{Customer, VisitStatus};

/// What a transition does to the visit ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerChange {
    /// Append a new row for the visit that just started.
    Open,
    /// Point the open row at a barber, or clear it.
    SetBarber(Option<i64>),
    /// Fill completion time and price paid.
    Close {
        completed_at: DateTime<Utc>,
        price: Option<f64>,
    },
    /// Mark the open row as left without service.
    Withdraw {
        visit_id: String,
        removed_at: DateTime<Utc>,
    },
    /// Leave the ledger alone.
    Keep,
}

pub struct EnqueueParams<'a> {
    pub service_id: i64,
    pub branch: &'a str,
    pub notes: Option<String>,
    pub visit_id: String,
}

pub fn begin(
    customer: &Customer,
    params: EnqueueParams<'_>,
    now: DateTime<Utc>,
) -> Result<Customer, QueueStateError> {
    if customer.status.is_active() {
        return Err(QueueStateError::AlreadyQueued {
            branch: customer.branch.clone(),
        });
    }
    Ok(Customer {
        status: VisitStatus::Waiting,
        service_id: Some(params.service_id),
        barber_id: None,
        branch: Some(params.branch.to_string()),
        enqueued_at: Some(now),
        assigned_at: None,
        completed_at: None,
        notes: params.notes,
        visit_id: Some(params.visit_id),
        ..customer.clone()
    })
}

pub fn assign(
    customer: &Customer,
    barber_id: i64,
    now: DateTime<Utc>,
) -> Result<Customer, QueueStateError> {
    expect_waiting(customer)?;
    Ok(Customer {
        status: VisitStatus::Assigned,
        barber_id: Some(barber_id),
        assigned_at: Some(now),
        ..customer.clone()
    })
}

pub fn complete(customer: &Customer, now: DateTime<Utc>) -> Result<Customer, QueueStateError> {
    expect_assigned(customer)?;
    Ok(Customer {
        status: VisitStatus::Completed,
        completed_at: Some(now),
        total_visits: customer.total_visits + 1,
        last_visit_at: Some(now),
        ..customer.clone()
    })
}

/// Back to waiting. The enqueue time is kept so the customer regains the
/// place they held before assignment.
pub fn cancel(customer: &Customer) -> Result<Customer, QueueStateError> {
    expect_assigned(customer)?;
    Ok(Customer {
        status: VisitStatus::Waiting,
        barber_id: None,
        assigned_at: None,
        ..customer.clone()
    })
}

/// Drops the current visit. Identity and visit aggregates survive.
pub fn remove(customer: &Customer) -> Result<Customer, QueueStateError> {
    expect_waiting(customer)?;
    Ok(Customer {
        status: VisitStatus::Registered,
        service_id: None,
        barber_id: None,
        branch: None,
        enqueued_at: None,
        assigned_at: None,
        completed_at: None,
        notes: None,
        visit_id: None,
        ..customer.clone()
    })
}

fn expect_waiting(customer: &Customer) -> Result<(), QueueStateError> {
    if customer.status == VisitStatus::Waiting {
        Ok(())
    } else {
        Err(QueueStateError::NotWaiting {
            actual: customer.status,
        })
    }
}

fn expect_assigned(customer: &Customer) -> Result<(), QueueStateError> {
    if customer.status == VisitStatus::Assigned {
        Ok(())
    } else {
        Err(QueueStateError::NotAssigned {
            actual: customer.status,
        })
    }
}
