use std::sync::Arc;

use marketplace_messaging::services::dispatcher::NotificationDispatcher;
use marketplace_messaging::services::email_service::{EmailService, Mailer};
use marketplace_messaging::{config, db, error, logging, relay, routes, state::AppState};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let db = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Schema must be in sync before serving traffic.
    db::run_migrations(&db)
        .await
        .map_err(|e| error::AppError::StartServer(format!("migrations: {e}")))?;

    let redis = redis::Client::open(cfg.redis_url.as_str())
        .map_err(|e| error::AppError::StartServer(format!("redis: {e}")))?;

    let registry = relay::SubscriptionRegistry::new();

    // Cross-instance fanout: events published by any instance reach this
    // one's subscribers through redis pub/sub.
    {
        let client = redis.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = relay::pubsub::start_relay_listener(client, registry).await {
                tracing::error!(error=%e, "relay listener failed");
            }
        });
    }

    let mailer: Option<Arc<dyn Mailer>> = match cfg.smtp.as_ref() {
        Some(smtp_cfg) => match EmailService::new(smtp_cfg.clone()) {
            Ok(service) => Some(Arc::new(service)),
            Err(e) => {
                tracing::warn!(error=%e, "failed to initialize SMTP transport; email escalation disabled");
                None
            }
        },
        None => {
            tracing::info!("SMTP not configured; email escalation disabled");
            None
        }
    };

    let dispatcher = Arc::new(NotificationDispatcher::new(&cfg, mailer));

    let state = AppState {
        db,
        redis,
        registry,
        config: cfg.clone(),
        dispatcher,
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting marketplace-messaging");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    axum::serve(listener, routes::router(state))
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    Ok(())
}
