mod auth;
mod db;
mod models;
mod queue;
mod routes;
mod state;
mod store;

use actix_web::{middleware, web, App, HttpServer};
use actix_web_httpauth::extractors::basic;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::env;
use std::str::FromStr;
use std::sync::Arc;

use crate::{
    auth::AUTH_REALM,
    queue::{QueueEngine, SystemClock, WaitPolicy},
    state::AppState,
    store::SqliteStore,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./data/trimq.db".to_string());
    db::ensure_sqlite_dir(&db_url)?;

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    db::run_migrations(&pool).await?;
    db::seed_defaults(&pool).await?;

    let policy = WaitPolicy {
        soon_minutes: env::var("WAIT_SOON_MINUTES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(WaitPolicy::default().soon_minutes),
    };
    let engine = QueueEngine::new(
        Arc::new(SqliteStore::new(pool.clone())),
        Arc::new(SystemClock),
        policy,
    );
    let state = AppState { db: pool, engine };

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080);

    let address = format!("0.0.0.0:{port}");
    log::info!("Starting TrimQ on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(basic::Config::default().realm(AUTH_REALM))
            .wrap(middleware::Logger::default())
            .configure(routes::public::configure)
            .configure(routes::staff::configure)
            .configure(routes::admin::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
