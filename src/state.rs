use std::sync::Arc;

use minijinja::Environment;
use sqlx::MySqlPool;

use crate::config::Config;
use crate::utils::email::Mailer;
use crate::utils::stripe::StripeClient;

/// Shared handles, cloned into every request through an `Extension` layer.
#[derive(Clone)]
pub struct AppState {
    pub db: MySqlPool,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
    pub stripe: Arc<StripeClient>,
    pub templates: Arc<Environment<'static>>,
}

impl AppState {
    pub fn new(db: MySqlPool, config: Config, mailer: Arc<dyn Mailer>) -> Result<Self, minijinja::Error> {
        let stripe = StripeClient::new(
            config.stripe_secret_key.clone(),
            config.stripe_webhook_secret.clone(),
            config.stripe_api_base.clone(),
        );
        Ok(Self {
            db,
            config: Arc::new(config),
            mailer,
            stripe: Arc::new(stripe),
            templates: Arc::new(crate::utils::templates::environment()?),
        })
    }
}
