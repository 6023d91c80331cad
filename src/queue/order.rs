use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Customer, Service};

pub const DEFAULT_SOON_MINUTES: u32 = 5;

/// Sort key for the waiting sub-queue. The id breaks timestamp ties.
pub fn waiting_key(customer: &Customer) -> (Option<DateTime<Utc>>, i64) {
    (customer.enqueued_at, customer.id)
}

pub fn assigned_key(customer: &Customer) -> (Option<DateTime<Utc>>, i64) {
    (customer.assigned_at, customer.id)
}

pub fn sort_waiting(customers: &mut [Customer]) {
    customers.sort_by_key(waiting_key);
}

pub fn sort_assigned(customers: &mut [Customer]) {
    customers.sort_by_key(assigned_key);
}

/// 1-based rank of `customer_id` in an already sorted waiting list.
pub fn position_in(waiting: &[Customer], customer_id: i64) -> Option<usize> {
    waiting
        .iter()
        .position(|entry| entry.id == customer_id)
        .map(|index| index + 1)
}

/// Minutes of service booked by everyone strictly ahead of `target`.
/// Unknown services and missing durations count as zero.
pub fn minutes_ahead(
    waiting: &[Customer],
    target: &Customer,
    durations: &HashMap<i64, Option<u32>>,
) -> u32 {
    let target_key = waiting_key(target);
    waiting
        .iter()
        .filter(|entry| entry.id != target.id && waiting_key(entry) < target_key)
        .map(|entry| service_minutes(entry, durations))
        .fold(0u32, u32::saturating_add)
}

pub fn durations(services: &[Service]) -> HashMap<i64, Option<u32>> {
    services
        .iter()
        .map(|service| (service.id, service.duration_minutes))
        .collect()
}

pub fn service_minutes(customer: &Customer, durations: &HashMap<i64, Option<u32>>) -> u32 {
    customer
        .service_id
        .and_then(|id| durations.get(&id).copied().flatten())
        .unwrap_or(0)
}

/// Raw minutes plus the label shown on the display board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitEstimate {
    pub minutes: u32,
    pub label: String,
}

/// Presentation thresholds for wait labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub soon_minutes: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            soon_minutes: DEFAULT_SOON_MINUTES,
        }
    }
}

impl WaitPolicy {
    pub fn estimate(&self, minutes: u32) -> WaitEstimate {
        let label = if minutes == 0 {
            "Up next".to_string()
        } else if minutes <= self.soon_minutes {
            "Very soon".to_string()
        } else {
            format!("~{minutes} min")
        };
        WaitEstimate { minutes, label }
    }
}
