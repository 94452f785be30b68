#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod backup;
mod config;
mod db;
mod error;
mod export;
mod models;
mod telemetry;
#[cfg(test)]
mod test;

use api::{
    api_backup, api_create_entry, api_delete_entry, api_export_entries, api_get_kids,
    api_list_entries, api_login, api_logout, api_update_entry, bad_request, forbidden, health,
    internal_error, not_found, unauthorized, unprocessable,
};
use config::AppConfig;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing};
use tracing::{error, info};

#[launch]
async fn rocket() -> _ {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::load().expect("Invalid configuration");

    let pool = SqlitePool::connect(&config.database_url)
        .await
        .expect("Failed to connect to SQLite database");

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    init_rocket(pool, config)
}

pub fn init_rocket(pool: SqlitePool, config: AppConfig) -> Rocket<Build> {
    info!("Starting behaviour journal");

    rocket::build()
        .manage(pool)
        .manage(config)
        .mount(
            "/api",
            routes![
                api_login,
                api_logout,
                api_get_kids,
                api_list_entries,
                api_create_entry,
                api_update_entry,
                api_delete_entry,
                api_export_entries,
                api_backup,
                health,
            ],
        )
        .register(
            "/api",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                internal_error,
            ],
        )
        .attach(TelemetryFairing)
}
