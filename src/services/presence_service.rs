use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::User;

/// Snapshot of the activity signal the dispatcher consults. The timestamp is
/// global per user, not per conversation; reading any page re-arms nothing
/// and reading none re-arms everything (the source system's literal rule).
#[derive(Debug, Clone)]
pub struct PresenceSnapshot {
    pub email: Option<String>,
    pub last_active_at: DateTime<Utc>,
}

impl PresenceSnapshot {
    pub fn is_active_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_active_at) < window
    }
}

pub struct PresenceService;

impl PresenceService {
    /// Bumps the caller's last-active timestamp. Called from the auth layer
    /// on every authenticated request; failures are the caller's to swallow.
    pub async fn touch(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_active_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn snapshot(
        db: &Pool<Postgres>,
        user_id: Uuid,
    ) -> AppResult<Option<PresenceSnapshot>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(db)
            .await?;

        Ok(user.map(|u| PresenceSnapshot {
            email: u.email,
            last_active_at: u.last_active_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_window_is_exclusive_at_the_boundary() {
        let now = Utc::now();
        let snapshot = PresenceSnapshot {
            email: None,
            last_active_at: now - Duration::minutes(5),
        };
        assert!(!snapshot.is_active_within(Duration::minutes(5), now));
        assert!(snapshot.is_active_within(Duration::minutes(6), now));
    }
}
