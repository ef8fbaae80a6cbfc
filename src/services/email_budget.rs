use sqlx::{Pool, Postgres};

use crate::error::AppResult;

/// Global daily email budget, keyed by calendar day in the counter table.
/// The cap defaults below the upstream provider's ceiling so a concurrent
/// overshoot of one reservation still never reaches it.
pub struct DailyEmailBudget;

impl DailyEmailBudget {
    /// Emails already reserved today. Read before deciding eligibility.
    pub async fn used_today(db: &Pool<Postgres>) -> AppResult<i64> {
        let sent: Option<i32> =
            sqlx::query_scalar("SELECT sent FROM email_daily_counter WHERE day = CURRENT_DATE")
                .fetch_optional(db)
                .await?;
        Ok(i64::from(sent.unwrap_or(0)))
    }

    /// Atomic increment-and-read-back. Two concurrent reservations both get
    /// distinct post-increment values, so the caller can detect when its own
    /// reservation crossed the cap and abort the send. The counter itself is
    /// allowed to overshoot slightly; no email goes out once it has.
    pub async fn reserve(db: &Pool<Postgres>) -> AppResult<i64> {
        let sent: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO email_daily_counter (day, sent)
            VALUES (CURRENT_DATE, 1)
            ON CONFLICT (day) DO UPDATE SET sent = email_daily_counter.sent + 1
            RETURNING sent
            "#,
        )
        .fetch_one(db)
        .await?;
        Ok(i64::from(sent))
    }
}
