use dotenvy::dotenv;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Base URL used for deep links in notifications and emails.
    pub public_url: String,
    pub smtp: Option<SmtpConfig>,
    /// Hard daily cap on outbound emails, kept under the provider's ceiling.
    pub email_daily_limit: i64,
    /// A recipient active within this window is not emailed.
    pub presence_active_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| AppError::Config("JWT_SECRET missing".into()))?;
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| "http://localhost:3000".into());

        // Email is optional: without an SMTP host the dispatcher still writes
        // in-app notifications and only skips the escalation step.
        let smtp = match env::var("SMTP_HOST") {
            Ok(host) if !host.trim().is_empty() => Some(SmtpConfig {
                host,
                port: env::var("SMTP_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(587),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                from_email: env::var("SMTP_FROM_EMAIL")
                    .unwrap_or_else(|_| "noreply@campusmarket.app".into()),
                from_name: env::var("SMTP_FROM_NAME")
                    .unwrap_or_else(|_| "CampusMarket".into()),
            }),
            _ => None,
        };

        let email_daily_limit = env::var("EMAIL_DAILY_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(280);
        let presence_active_minutes = env::var("PRESENCE_ACTIVE_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        if email_daily_limit < 0 {
            return Err(AppError::Config("EMAIL_DAILY_LIMIT must be >= 0".into()));
        }

        Ok(Self {
            database_url,
            redis_url,
            port,
            jwt_secret,
            public_url,
            smtp,
            email_daily_limit,
            presence_active_minutes,
        })
    }
}
