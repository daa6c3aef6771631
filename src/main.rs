use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use natours::config::{self, Config};
use natours::middlewares::rate_limiter::spawn_bucket_purger;
use natours::utils::email::{LogMailer, Mailer, SmtpMailer};
use natours::{AppState, create_app};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load environment variables from .env file (if present)
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Friendly check for required env before we attempt to connect
    if std::env::var("DATABASE_URL").is_err() {
        return Err(BoxError::from(
            "DATABASE_URL is not set. Copy `.env.example` to `.env` and update credentials, or set DATABASE_URL in your environment.",
        ));
    }
    let config = Config::from_env()?;

    // Establish database connection (and run migrations)
    let db_pool = config::database::establish_connection().await?;

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, port = smtp.port, "sending email through SMTP");
            Arc::new(SmtpMailer::new(smtp)?)
        }
        None => {
            tracing::warn!("EMAIL_HOST is not set; emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| BoxError::from(format!("APP_HOST:APP_PORT must form a valid socket address: {}", e)))?;
    let env = config.env;

    let state = AppState::new(db_pool, config, mailer)?;
    let app = create_app(state);

    let _purger = spawn_bucket_purger();

    tracing::info!(?env, "Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
    };

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| BoxError::from(format!("Failed to serve application: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}
