use sqlx::SqlitePool;

use crate::queue::QueueEngine;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: QueueEngine,
}
