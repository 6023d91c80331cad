use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub const ROLE_MASTER_ADMIN: &str = "master_admin";
pub const ROLE_BRANCH_ADMIN: &str = "branch_admin";
pub const ROLE_STAFF: &str = "staff";

pub const STATUS_REGISTERED: &str = "registered";
pub const STATUS_WAITING: &str = "waiting";
pub const STATUS_ASSIGNED: &str = "assigned";
pub const STATUS_COMPLETED: &str = "completed";

/// Stored state of a customer's current visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Registered,
    Waiting,
    Assigned,
    Completed,
}

impl VisitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VisitStatus::Registered => STATUS_REGISTERED,
            VisitStatus::Waiting => STATUS_WAITING,
            VisitStatus::Assigned => STATUS_ASSIGNED,
            VisitStatus::Completed => STATUS_COMPLETED,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            STATUS_REGISTERED => Some(VisitStatus::Registered),
            STATUS_WAITING => Some(VisitStatus::Waiting),
            STATUS_ASSIGNED => Some(VisitStatus::Assigned),
            STATUS_COMPLETED => Some(VisitStatus::Completed),
            _ => None,
        }
    }

    /// Waiting and assigned visits occupy a place in some branch's queue.
    pub fn is_active(self) -> bool {
        matches!(self, VisitStatus::Waiting | VisitStatus::Assigned)
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    MasterAdmin,
    BranchAdmin,
    Staff,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::MasterAdmin => ROLE_MASTER_ADMIN,
            Role::BranchAdmin => ROLE_BRANCH_ADMIN,
            Role::Staff => ROLE_STAFF,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            ROLE_MASTER_ADMIN => Some(Role::MasterAdmin),
            ROLE_BRANCH_ADMIN => Some(Role::BranchAdmin),
            ROLE_STAFF => Some(Role::Staff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub photo: Option<String>,
    pub status: VisitStatus,
    pub service_id: Option<i64>,
    pub barber_id: Option<i64>,
    pub branch: Option<String>,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub visit_id: Option<String>,
    pub total_visits: i64,
    pub last_visit_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub version: i64,
}

/// Identity fields for a customer that does not exist yet.
#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub duration_minutes: Option<u32>,
    pub price: Option<f64>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Barber {
    pub id: i64,
    pub name: String,
    pub branch: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Branch {
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub active: bool,
}

/// One row of the visit ledger, appended on every enqueue.
///
/// A row with neither `completed_at` nor `removed_at` is still in progress.
/// `removed_at` marks a visit taken off the queue without service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visit {
    pub id: String,
    pub customer_id: Option<i64>,
    pub service_id: Option<i64>,
    pub barber_id: Option<i64>,
    pub branch: String,
    pub enqueued_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub removed_at: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub notes: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub branch: String,
    pub password_hash: String,
    pub active: i64,
    pub created_at: String,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fixed-width UTC timestamp, so lexical order in SQL matches time order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
