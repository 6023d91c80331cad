use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::hash_password,
    models::{format_ts, Role},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// First-run data: the home branch, a master admin, and optionally a
/// sample catalog.
pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let branch = env::var("ADMIN_BRANCH").unwrap_or_else(|_| "main".to_string());
    seed_branch(pool, &branch).await?;

    let username = env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let display_name =
        env::var("ADMIN_DISPLAY_NAME").unwrap_or_else(|_| "Master Admin".to_string());
    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }
    seed_admin(pool, &username, &display_name, &password, &branch).await?;

    let sample = env::var("SEED_SAMPLE_DATA").unwrap_or_else(|_| "false".to_string());
    if sample == "true" {
        seed_sample(pool, &branch).await?;
    }
    Ok(())
}

async fn seed_branch(pool: &SqlitePool, code: &str) -> Result<(), sqlx::Error> {
    let exists = sqlx::query_as::<_, (String,)>("SELECT code FROM branches WHERE code = ? LIMIT 1")
        .bind(code)
        .fetch_optional(pool)
        .await?;
    if exists.is_some() {
        return Ok(());
    }
    insert_branch(pool, code, &title_case(code), None, None).await
}

async fn seed_admin(
    pool: &SqlitePool,
    username: &str,
    display_name: &str,
    password: &str,
    branch: &str,
) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (i64,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(Role::MasterAdmin.as_str())
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    insert_user(pool, username, display_name, password, Role::MasterAdmin, branch).await?;
    log::info!("Created master admin '{username}'");
    Ok(())
}

async fn seed_sample(pool: &SqlitePool, branch: &str) -> Result<(), sqlx::Error> {
    let services = [
        ("Classic Cut", 30, 35.0),
        ("Beard Styling", 20, 25.0),
        ("Hot Towel Shave", 25, 30.0),
        ("Full Service", 60, 55.0),
        ("Quick Trim", 15, 20.0),
        ("Hair Wash & Style", 25, 28.0),
    ];
    for (name, minutes, price) in services {
        let exists = sqlx::query_as::<_, (i64,)>("SELECT id FROM services WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        if exists.is_none() {
            insert_service(pool, name, Some(minutes), Some(price)).await?;
        }
    }

    for name in ["Alex Rodriguez", "Jordan Smith", "Casey Johnson"] {
        let exists = sqlx::query_as::<_, (i64,)>(
            "SELECT id FROM barbers WHERE name = ? AND branch = ? LIMIT 1",
        )
        .bind(name)
        .bind(branch)
        .fetch_optional(pool)
        .await?;
        if exists.is_none() {
            insert_barber(pool, name, branch).await?;
        }
    }

    let staff = sqlx::query_as::<_, (i64,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(Role::Staff.as_str())
        .fetch_optional(pool)
        .await?;
    if staff.is_none() {
        let username = env::var("STAFF_USER").unwrap_or_else(|_| "staff".to_string());
        let password = env::var("STAFF_PASSWORD").unwrap_or_else(|_| "change-me".to_string());
        if password == "change-me" {
            log::warn!("STAFF_PASSWORD not set. Using default password 'change-me'. Set STAFF_PASSWORD in production.");
        }
        insert_user(pool, &username, "Front Desk", &password, Role::Staff, branch).await?;
    }

    log::info!("Sample catalog seeded for branch '{branch}'");
    Ok(())
}

pub async fn insert_branch(
    pool: &SqlitePool,
    code: &str,
    name: &str,
    address: Option<&str>,
    phone: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO branches (code, name, address, phone, active)
           VALUES (?, ?, ?, ?, 1)"#,
    )
    .bind(code)
    .bind(name)
    .bind(address)
    .bind(phone)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_service(
    pool: &SqlitePool,
    name: &str,
    duration_minutes: Option<u32>,
    price: Option<f64>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"INSERT INTO services (name, duration_minutes, price, active)
           VALUES (?, ?, ?, 1)"#,
    )
    .bind(name)
    .bind(duration_minutes.map(i64::from))
    .bind(price)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Flips the active flag. Returns the new value, or `None` if missing.
pub async fn toggle_service(pool: &SqlitePool, id: i64) -> Result<Option<bool>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE services SET active = 1 - active WHERE id = ? RETURNING active",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map(|active| active.map(|value| value == 1))
}

pub async fn insert_barber(pool: &SqlitePool, name: &str, branch: &str) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO barbers (name, branch, active) VALUES (?, ?, 1)")
        .bind(name)
        .bind(branch)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn toggle_barber(pool: &SqlitePool, id: i64) -> Result<Option<bool>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE barbers SET active = 1 - active WHERE id = ? RETURNING active",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map(|active| active.map(|value| value == 1))
}

pub async fn barber_branch(pool: &SqlitePool, id: i64) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT branch FROM barbers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn insert_user(
    pool: &SqlitePool,
    username: &str,
    display_name: &str,
    password: &str,
    role: Role,
    branch: &str,
) -> Result<i64, sqlx::Error> {
    let password_hash =
        hash_password(password).map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;

    let result = sqlx::query(
        r#"INSERT INTO users (username, display_name, role, branch, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(username)
    .bind(display_name)
    .bind(role.as_str())
    .bind(branch)
    .bind(password_hash)
    .bind(format_ts(Utc::now()))
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

fn title_case(code: &str) -> String {
    let mut chars = code.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
