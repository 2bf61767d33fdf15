use axum::Router;
use chrono::Duration;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use icue_checkin::config::Config;
use icue_checkin::notify::LogNotifier;
use icue_checkin::routes::create_routes;
use icue_checkin::state::AppState;
use icue_checkin::store::{CheckInStore, PgStore};
use icue_checkin::token::TokenCodec;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let store: Arc<dyn CheckInStore> = Arc::new(PgStore::new(pool));
    let state = AppState::new(
        store,
        TokenCodec::new(config.token_secret.as_bytes()),
        Arc::new(LogNotifier),
        Duration::minutes(config.grace_minutes),
    );

    let app: Router = create_routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🎫 Check-in service running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
