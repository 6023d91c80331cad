use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    models::{
        format_ts, parse_ts, Barber, Branch, Customer, NewCustomer, Service, Visit, VisitStatus,
        STATUS_ASSIGNED, STATUS_REGISTERED,
    },
    queue::{
        store::opened_visit,
        visit::LedgerChange,
        PersistenceError, QueueStore,
    },
};

/// [`QueueStore`] over the application's SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: i64,
    name: String,
    phone: String,
    email: Option<String>,
    address: Option<String>,
    photo: Option<String>,
    status: String,
    service_id: Option<i64>,
    barber_id: Option<i64>,
    branch: Option<String>,
    enqueued_at: Option<String>,
    assigned_at: Option<String>,
    completed_at: Option<String>,
    notes: Option<String>,
    visit_id: Option<String>,
    total_visits: i64,
    last_visit_at: Option<String>,
    version: i64,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = PersistenceError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let status = VisitStatus::parse(&row.status).ok_or_else(|| {
            PersistenceError::Corrupt(format!("customer {} has status {:?}", row.id, row.status))
        })?;
        Ok(Customer {
            id: row.id,
            name: row.name,
            phone: row.phone,
            email: row.email,
            address: row.address,
            photo: row.photo,
            status,
            service_id: row.service_id,
            barber_id: row.barber_id,
            branch: row.branch,
            enqueued_at: timestamp(row.enqueued_at)?,
            assigned_at: timestamp(row.assigned_at)?,
            completed_at: timestamp(row.completed_at)?,
            notes: row.notes,
            visit_id: row.visit_id,
            total_visits: row.total_visits,
            last_visit_at: timestamp(row.last_visit_at)?,
            version: row.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    id: i64,
    name: String,
    duration_minutes: Option<i64>,
    price: Option<f64>,
    active: i64,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            id: row.id,
            name: row.name,
            duration_minutes: row
                .duration_minutes
                .and_then(|minutes| u32::try_from(minutes).ok()),
            price: row.price,
            active: row.active == 1,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BarberRow {
    id: i64,
    name: String,
    branch: String,
    active: i64,
}

impl From<BarberRow> for Barber {
    fn from(row: BarberRow) -> Self {
        Barber {
            id: row.id,
            name: row.name,
            branch: row.branch,
            active: row.active == 1,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BranchRow {
    code: String,
    name: String,
    address: Option<String>,
    phone: Option<String>,
    active: i64,
}

impl From<BranchRow> for Branch {
    fn from(row: BranchRow) -> Self {
        Branch {
            code: row.code,
            name: row.name,
            address: row.address,
            phone: row.phone,
            active: row.active == 1,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VisitRow {
    id: String,
    customer_id: Option<i64>,
    service_id: Option<i64>,
    barber_id: Option<i64>,
    branch: String,
    enqueued_at: String,
    completed_at: Option<String>,
    removed_at: Option<String>,
    price: Option<f64>,
    notes: Option<String>,
}

impl TryFrom<VisitRow> for Visit {
    type Error = PersistenceError;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        let enqueued_at = parse_ts(&row.enqueued_at).ok_or_else(|| {
            PersistenceError::Corrupt(format!("visit {} has bad enqueue time", row.id))
        })?;
        Ok(Visit {
            id: row.id,
            customer_id: row.customer_id,
            service_id: row.service_id,
            barber_id: row.barber_id,
            branch: row.branch,
            enqueued_at,
            completed_at: timestamp(row.completed_at)?,
            removed_at: timestamp(row.removed_at)?,
            price: row.price,
            notes: row.notes,
        })
    }
}

fn timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>, PersistenceError> {
    match value {
        None => Ok(None),
        Some(text) => parse_ts(&text)
            .map(Some)
            .ok_or_else(|| PersistenceError::Corrupt(format!("bad timestamp {text:?}"))),
    }
}

fn customers(rows: Vec<CustomerRow>) -> Result<Vec<Customer>, PersistenceError> {
    rows.into_iter().map(Customer::try_from).collect()
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn customer(&self, id: i64) -> Result<Option<Customer>, PersistenceError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r#"SELECT id, name, phone, email, address, photo, status, service_id, barber_id,
                      branch, enqueued_at, assigned_at, completed_at, notes, visit_id,
                      total_visits, last_visit_at, version
               FROM customers
               WHERE id = ?
               LIMIT 1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Customer::try_from).transpose()
    }

    async fn customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, PersistenceError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r#"SELECT id, name, phone, email, address, photo, status, service_id, barber_id,
                      branch, enqueued_at, assigned_at, completed_at, notes, visit_id,
                      total_visits, last_visit_at, version
               FROM customers
               WHERE phone = ?
               LIMIT 1"#,
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Customer::try_from).transpose()
    }

    async fn insert_customer(&self, new: &NewCustomer) -> Result<Customer, PersistenceError> {
        let result = sqlx::query(
            r#"INSERT INTO customers (name, phone, email, address, photo, status, total_visits, version)
               VALUES (?, ?, ?, ?, ?, ?, 0, 0)"#,
        )
        .bind(&new.name)
        .bind(&new.phone)
        .bind(&new.email)
        .bind(&new.address)
        .bind(&new.photo)
        .bind(STATUS_REGISTERED)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            let duplicate = err
                .as_database_error()
                .is_some_and(|db_err| db_err.is_unique_violation());
            if duplicate {
                PersistenceError::Duplicate {
                    entity: "customer",
                    key: new.phone.clone(),
                }
            } else {
                PersistenceError::Database(err)
            }
        })?;

        let id = result.last_insert_rowid();
        self.customer(id)
            .await?
            .ok_or_else(|| PersistenceError::Corrupt(format!("customer {id} vanished after insert")))
    }

    async fn service(&self, id: i64) -> Result<Option<Service>, PersistenceError> {
        let row = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, name, duration_minutes, price, active FROM services WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Service::from))
    }

    async fn services(&self) -> Result<Vec<Service>, PersistenceError> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, name, duration_minutes, price, active FROM services ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Service::from).collect())
    }

    async fn barber(&self, id: i64) -> Result<Option<Barber>, PersistenceError> {
        let row = sqlx::query_as::<_, BarberRow>(
            "SELECT id, name, branch, active FROM barbers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Barber::from))
    }

    async fn branch(&self, code: &str) -> Result<Option<Branch>, PersistenceError> {
        let row = sqlx::query_as::<_, BranchRow>(
            "SELECT code, name, address, phone, active FROM branches WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Branch::from))
    }

    async fn customers_at(
        &self,
        branch: &str,
        status: VisitStatus,
    ) -> Result<Vec<Customer>, PersistenceError> {
        let query = if status == VisitStatus::Assigned {
            r#"SELECT id, name, phone, email, address, photo, status, service_id, barber_id,
                      branch, enqueued_at, assigned_at, completed_at, notes, visit_id,
                      total_visits, last_visit_at, version
               FROM customers
               WHERE branch = ? AND status = ?
               ORDER BY assigned_at ASC, id ASC"#
        } else {
            r#"SELECT id, name, phone, email, address, photo, status, service_id, barber_id,
                      branch, enqueued_at, assigned_at, completed_at, notes, visit_id,
                      total_visits, last_visit_at, version
               FROM customers
               WHERE branch = ? AND status = ?
               ORDER BY enqueued_at ASC, id ASC"#
        };
        let rows = sqlx::query_as::<_, CustomerRow>(query)
            .bind(branch)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        customers(rows)
    }

    async fn count_assigned_to(&self, barber_id: i64) -> Result<i64, PersistenceError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM customers WHERE barber_id = ? AND status = ?",
        )
        .bind(barber_id)
        .bind(STATUS_ASSIGNED)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_completed_since(
        &self,
        branch: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, PersistenceError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM visits WHERE branch = ? AND completed_at >= ?",
        )
        .bind(branch)
        .bind(format_ts(since))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn visits_for(&self, customer_id: i64) -> Result<Vec<Visit>, PersistenceError> {
        let rows = sqlx::query_as::<_, VisitRow>(
            r#"SELECT id, customer_id, service_id, barber_id, branch, enqueued_at,
                      completed_at, removed_at, price, notes
               FROM visits
               WHERE customer_id = ?
               ORDER BY enqueued_at ASC, id ASC"#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Visit::try_from).collect()
    }

    async fn commit(
        &self,
        expected_version: i64,
        next: &Customer,
        ledger: &LedgerChange,
    ) -> Result<Customer, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE customers
               SET name = ?, email = ?, address = ?, photo = ?, status = ?, service_id = ?,
                   barber_id = ?, branch = ?, enqueued_at = ?, assigned_at = ?,
                   completed_at = ?, notes = ?, visit_id = ?, total_visits = ?,
                   last_visit_at = ?, version = version + 1
               WHERE id = ? AND version = ?"#,
        )
        .bind(&next.name)
        .bind(&next.email)
        .bind(&next.address)
        .bind(&next.photo)
        .bind(next.status.as_str())
        .bind(next.service_id)
        .bind(next.barber_id)
        .bind(&next.branch)
        .bind(next.enqueued_at.map(format_ts))
        .bind(next.assigned_at.map(format_ts))
        .bind(next.completed_at.map(format_ts))
        .bind(&next.notes)
        .bind(&next.visit_id)
        .bind(next.total_visits)
        .bind(next.last_visit_at.map(format_ts))
        .bind(next.id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(PersistenceError::Conflict {
                entity: "customer",
                id: next.id,
            });
        }

        match ledger {
            LedgerChange::Open => {
                let visit = opened_visit(next)?;
                sqlx::query(
                    r#"INSERT INTO visits (id, customer_id, service_id, barber_id, branch,
                                           enqueued_at, completed_at, price, notes)
                       VALUES (?, ?, ?, NULL, ?, ?, NULL, NULL, ?)"#,
                )
                .bind(&visit.id)
                .bind(visit.customer_id)
                .bind(visit.service_id)
                .bind(&visit.branch)
                .bind(format_ts(visit.enqueued_at))
                .bind(&visit.notes)
                .execute(&mut *tx)
                .await?;
            }
            LedgerChange::SetBarber(barber_id) => {
                sqlx::query(
                    r#"UPDATE visits SET barber_id = ?
                       WHERE id = ? AND completed_at IS NULL AND removed_at IS NULL"#,
                )
                .bind(*barber_id)
                .bind(&next.visit_id)
                .execute(&mut *tx)
                .await?;
            }
            LedgerChange::Close {
                completed_at,
                price,
            } => {
                sqlx::query(
                    r#"UPDATE visits SET completed_at = ?, price = ?
                       WHERE id = ? AND completed_at IS NULL AND removed_at IS NULL"#,
                )
                .bind(format_ts(*completed_at))
                .bind(*price)
                .bind(&next.visit_id)
                .execute(&mut *tx)
                .await?;
            }
            LedgerChange::Withdraw {
                visit_id,
                removed_at,
            } => {
                sqlx::query(
                    r#"UPDATE visits SET removed_at = ?
                       WHERE id = ? AND completed_at IS NULL AND removed_at IS NULL"#,
                )
                .bind(format_ts(*removed_at))
                .bind(visit_id)
                .execute(&mut *tx)
                .await?;
            }
            LedgerChange::Keep => {}
        }

        tx.commit().await?;
        log::debug!("Customer {} stored at version {}", next.id, expected_version + 1);

        Ok(Customer {
            version: expected_version + 1,
            ..next.clone()
        })
    }

    async fn delete_barber_if_idle(&self, barber_id: i64) -> Result<bool, PersistenceError> {
        let result = sqlx::query(
            r#"DELETE FROM barbers
               WHERE id = ?
                 AND NOT EXISTS (
                   SELECT 1 FROM customers WHERE barber_id = ? AND status = ?
                 )"#,
        )
        .bind(barber_id)
        .bind(barber_id)
        .bind(STATUS_ASSIGNED)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_customer(&self, id: i64) -> Result<bool, PersistenceError> {
        let result = sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
