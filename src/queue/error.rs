use thiserror::Error;

use crate::models::VisitStatus;

/// Everything a queue operation can reject with.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    State(#[from] QueueStateError),

    #[error("not permitted: {0}")]
    Authorization(&'static str),

    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl QueueError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        QueueError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

/// A state-machine guard that refused the transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueStateError {
    #[error("customer is already queued{}", at_branch(.branch))]
    AlreadyQueued { branch: Option<String> },

    #[error("service {0} is not active")]
    ServiceInactive(i64),

    #[error("branch {0} is not active")]
    BranchInactive(String),

    #[error("barber {0} is not active")]
    BarberInactive(i64),

    #[error("barber {barber} does not work at this branch")]
    BarberNotInBranch { barber: i64 },

    #[error("customer is {actual}, expected waiting")]
    NotWaiting { actual: VisitStatus },

    #[error("customer is {actual}, expected assigned")]
    NotAssigned { actual: VisitStatus },

    #[error("barber {barber} still has {customers} assigned customer(s)")]
    BarberBusy { barber: i64, customers: i64 },

    #[error("customer has an active visit")]
    ActiveVisit,
}

fn at_branch(branch: &Option<String>) -> String {
    branch
        .as_deref()
        .map(|code| format!(" at branch {code}"))
        .unwrap_or_default()
}

/// Faults from the persistence collaborator. Never retried by the engine.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: i64 },

    #[error("{entity} {key} already exists")]
    Duplicate { entity: &'static str, key: String },

    #[error("stored value is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl PersistenceError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            PersistenceError::Conflict { .. } | PersistenceError::Duplicate { .. }
        )
    }
}
