// src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use staff_portal::config::Config;
use staff_portal::error::AppError;
use staff_portal::notify::{Notifier, NullNotifier, WebhookNotifier};
use staff_portal::roles::Role;
use staff_portal::routes;
use staff_portal::state::AppState;
use staff_portal::store::{NewActor, PgStore, Store};
use staff_portal::utils::hash::hash_password;

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {})",
                    retry_count
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    // Seed Owner Account
    if let Err(e) = seed_owner_actor(store.as_ref(), &config).await {
        tracing::error!("Failed to seed owner account: {:?}", e);
    }

    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => {
            tracing::info!("No WEBHOOK_URL configured, staff notifications disabled");
            Arc::new(NullNotifier)
        }
    };

    // Create AppState
    let state = AppState {
        store,
        notifier,
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    // Start the server. Connect info is required by the rate limiter's
    // per-client key extraction.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// Seeds the owner account from OWNER_USERNAME / OWNER_PASSWORD.
///
/// This is the only place `is_owner` is ever set. Skipped silently when the
/// variables are absent or the account already exists.
async fn seed_owner_actor(store: &dyn Store, config: &Config) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.owner_username, &config.owner_password) else {
        return Ok(());
    };

    if store.actor_by_username(username).await?.is_some() {
        return Ok(());
    }

    tracing::info!("Seeding owner account: {}", username);
    let password_hash = hash_password(password)?;
    store
        .create_actor(NewActor {
            username: username.clone(),
            password_hash,
            role: Role::TopManagement,
            departments: vec![],
            is_owner: true,
        })
        .await?;
    tracing::info!("Owner account created successfully.");
    Ok(())
}
