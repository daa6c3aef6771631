use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

/// Connects to `DATABASE_URL` and applies pending migrations.
pub async fn establish_connection() -> Result<MySqlPool, Box<dyn std::error::Error + Send + Sync>> {
    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(5);

    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to the database: {}", e);
            e
        })?;
    tracing::info!("DB connection successful");

    run_migrations(&pool).await?;
    tracing::info!("Database migrations applied successfully");

    Ok(pool)
}

pub async fn run_migrations(pool: &MySqlPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
