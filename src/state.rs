use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::config::Config;
use crate::relay::SubscriptionRegistry;
use crate::services::dispatcher::NotificationDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub redis: redis::Client,
    pub registry: SubscriptionRegistry,
    pub config: Arc<Config>,
    pub dispatcher: Arc<NotificationDispatcher>,
}
